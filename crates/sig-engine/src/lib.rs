//! SIG Engine
//!
//! Derives the standard French-GAAP indicator cascade ("soldes
//! intermédiaires de gestion") from a resolved figure set:
//!
//! 1. commercial margin = goods sales − goods purchases
//! 2. production = services revenue + inventory change + capitalized production
//! 3. value added = commercial margin + production − external charges
//! 4. EBE = value added + operating subsidies − taxes − personnel charges
//! 5. operating result = EBE + other operating income − other operating
//!    charges − depreciation
//! 6. current result = operating result + financial result
//! 7. net result = current result + exceptional result − income tax
//!
//! Pre-computed tier-1 indicators take precedence over recomputation; the
//! formulas are fallback-only so that partial and heuristic sources still
//! produce a complete set. Losses are preserved exactly, never clamped.

use analysis_core::{IndicatorValue, RawFigures, ResolvedYearFigures, SigIndicators, SigResult};

/// Days basis used for the BFR-in-days conversion
const DAYS_BASIS: f64 = 360.0;

/// Compute the full indicator set for one resolved year.
pub fn compute_sig(resolved: &ResolvedYearFigures) -> SigResult {
    let f = &resolved.figures;
    let pre = resolved.indicators.as_ref();

    // Both goods purchases and external charges missing: substitute zeros
    // and flag the year instead of failing.
    let degraded = f.goods_purchases.is_none() && f.external_charges.is_none() && pre.is_none();
    if degraded {
        tracing::warn!(
            year = resolved.year,
            "goods purchases and external charges both absent, substituting 0"
        );
    }

    let goods_sales = f.goods_sales.unwrap_or(0.0);
    let goods_purchases = f.goods_purchases.unwrap_or(0.0);
    let services_revenue = f.services_revenue.unwrap_or(0.0);
    let external_charges = f.external_charges.unwrap_or(0.0);
    let operating_subsidies = f.operating_subsidies.unwrap_or(0.0);
    let taxes_and_duties = f.taxes_and_duties.unwrap_or(0.0);
    let personnel_charges = f.personnel_charges.unwrap_or(0.0);
    let other_operating_income = f.other_operating_income.unwrap_or(0.0);
    let other_operating_charges = f.other_operating_charges.unwrap_or(0.0);
    let depreciation_charges = f.depreciation_charges.unwrap_or(0.0);
    let financial_result = f.financial_result.unwrap_or(0.0);
    let exceptional_result = f.exceptional_result.unwrap_or(0.0);
    let income_tax = f.income_tax.unwrap_or(0.0);

    let revenue = pre
        .and_then(|p| p.revenue)
        .or(f.revenue)
        .unwrap_or_else(|| derived_revenue(f));

    // Cascade, each step preferring the pre-computed value and falling back
    // to the closed-form formula over the previous step.
    let commercial_margin = pre
        .and_then(|p| p.commercial_margin)
        .unwrap_or(goods_sales - goods_purchases);
    let production = pre
        .and_then(|p| p.production)
        .unwrap_or(services_revenue + f.inventory_change_production.unwrap_or(0.0) + f.capitalized_production.unwrap_or(0.0));
    let value_added = pre
        .and_then(|p| p.value_added)
        .unwrap_or(commercial_margin + production - external_charges);
    let ebe = pre
        .and_then(|p| p.ebe)
        .or(f.ebe)
        .unwrap_or(value_added + operating_subsidies - taxes_and_duties - personnel_charges);
    let operating_result = pre
        .and_then(|p| p.operating_result)
        .unwrap_or(ebe + other_operating_income - other_operating_charges - depreciation_charges);
    let current_result = pre
        .and_then(|p| p.current_result)
        .unwrap_or(operating_result + financial_result);
    let net_result = pre
        .and_then(|p| p.net_result)
        .unwrap_or(current_result + exceptional_result - income_tax);

    // Self-financing capacity: the cash-flow proxy for a small business
    let caf = net_result + depreciation_charges;

    // Working-capital requirement, only when the balance sheet was extracted
    let bfr_raw = match (f.inventory, f.receivables, f.payables) {
        (None, None, None) => None,
        (inv, rec, pay) => Some(inv.unwrap_or(0.0) + rec.unwrap_or(0.0) - pay.unwrap_or(0.0)),
    };
    let bfr = bfr_raw.map(|b| IndicatorValue::from_value(b, revenue));
    let bfr_days = bfr_raw.and_then(|b| {
        if revenue > 0.0 {
            Some(((b / revenue * DAYS_BASIS) * 100.0).round() / 100.0)
        } else {
            None
        }
    });

    let iv = |value: f64| IndicatorValue::from_value(value, revenue);

    let indicators = SigIndicators {
        revenue: iv(revenue),
        commercial_margin: iv(commercial_margin),
        production: iv(production),
        value_added: iv(value_added),
        ebe: iv(ebe),
        operating_result: iv(operating_result),
        current_result: iv(current_result),
        net_result: iv(net_result),
        goods_sales: iv(goods_sales),
        goods_purchases: iv(goods_purchases),
        services_revenue: iv(services_revenue),
        external_charges: iv(external_charges),
        operating_subsidies: iv(operating_subsidies),
        taxes_and_duties: iv(taxes_and_duties),
        personnel_charges: iv(personnel_charges),
        other_operating_income: iv(other_operating_income),
        other_operating_charges: iv(other_operating_charges),
        depreciation_charges: iv(depreciation_charges),
        financial_result: iv(financial_result),
        exceptional_result: iv(exceptional_result),
        income_tax: iv(income_tax),
        caf: iv(caf),
        bfr,
    };

    SigResult {
        year: resolved.year,
        revenue: indicators.revenue.value,
        ebe: indicators.ebe.value,
        net_result: indicators.net_result.value,
        bfr_days,
        degraded,
        precomputed: pre.is_some(),
        source_method: resolved.source_method,
        confidence: resolved.confidence,
        low_confidence: resolved.low_confidence || degraded,
        indicators,
    }
}

/// Last-resort revenue when no explicit figure was extracted: the sum of
/// the activity lines that were.
fn derived_revenue(f: &RawFigures) -> f64 {
    f.goods_sales.unwrap_or(0.0) + f.services_revenue.unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{PrecomputedIndicators, SourceMethod};

    fn resolved(figures: RawFigures) -> ResolvedYearFigures {
        ResolvedYearFigures {
            year: 2023,
            figures,
            indicators: None,
            source_method: SourceMethod::VisionKeyValues,
            confidence: 0.85,
            low_confidence: false,
        }
    }

    #[test]
    fn cascade_matches_closed_forms_exactly() {
        let figures = RawFigures {
            revenue: Some(500_000.0),
            goods_sales: Some(400_000.0),
            goods_purchases: Some(250_000.0),
            services_revenue: Some(100_000.0),
            external_charges: Some(60_000.0),
            operating_subsidies: Some(5_000.0),
            taxes_and_duties: Some(8_000.0),
            personnel_charges: Some(120_000.0),
            other_operating_income: Some(2_000.0),
            other_operating_charges: Some(3_000.0),
            depreciation_charges: Some(25_000.0),
            financial_result: Some(-4_000.0),
            exceptional_result: Some(1_000.0),
            income_tax: Some(9_000.0),
            ..RawFigures::default()
        };
        let sig = compute_sig(&resolved(figures));
        let i = &sig.indicators;

        assert_eq!(i.commercial_margin.value, 150_000.0);
        assert_eq!(i.production.value, 100_000.0);
        assert_eq!(i.value_added.value, 190_000.0);
        // EBE = value_added + subsidies − taxes − personnel, exactly
        assert_eq!(i.ebe.value, 190_000.0 + 5_000.0 - 8_000.0 - 120_000.0);
        assert_eq!(i.operating_result.value, 67_000.0 + 2_000.0 - 3_000.0 - 25_000.0);
        assert_eq!(i.current_result.value, 41_000.0 - 4_000.0);
        assert_eq!(i.net_result.value, 37_000.0 + 1_000.0 - 9_000.0);
        assert_eq!(sig.net_result, 29_000.0);
        assert!(!sig.degraded);
        assert!(!sig.precomputed);
    }

    #[test]
    fn percent_of_revenue_is_rounded_to_two_decimals() {
        let figures = RawFigures {
            revenue: Some(300_000.0),
            goods_sales: Some(100_000.0),
            goods_purchases: Some(0.0),
            ..RawFigures::default()
        };
        let sig = compute_sig(&resolved(figures));
        // 100000 / 300000 * 100 = 33.3333… → 33.33
        assert_eq!(sig.indicators.commercial_margin.percent_of_revenue, 33.33);
    }

    #[test]
    fn zero_revenue_yields_zero_percent_but_keeps_values() {
        let figures = RawFigures {
            revenue: Some(0.0),
            ebe: Some(-30_000.0),
            ..RawFigures::default()
        };
        let sig = compute_sig(&resolved(figures));
        assert_eq!(sig.indicators.ebe.value, -30_000.0);
        assert_eq!(sig.indicators.ebe.percent_of_revenue, 0.0);
    }

    #[test]
    fn losses_are_preserved_not_clamped() {
        let figures = RawFigures {
            revenue: Some(100_000.0),
            goods_sales: Some(100_000.0),
            goods_purchases: Some(80_000.0),
            personnel_charges: Some(50_000.0),
            ..RawFigures::default()
        };
        let sig = compute_sig(&resolved(figures));
        assert_eq!(sig.indicators.ebe.value, -30_000.0);
        assert_eq!(sig.indicators.net_result.value, -30_000.0);
        assert_eq!(sig.indicators.ebe.percent_of_revenue, -30.0);
    }

    #[test]
    fn precomputed_indicators_take_precedence_over_formulas() {
        let mut r = resolved(RawFigures {
            revenue: Some(490_000.0),
            goods_sales: Some(400_000.0),
            goods_purchases: Some(250_000.0),
            ..RawFigures::default()
        });
        r.indicators = Some(PrecomputedIndicators {
            revenue: Some(500_000.0),
            commercial_margin: Some(160_000.0),
            ebe: Some(55_000.0),
            net_result: Some(28_000.0),
            ..PrecomputedIndicators::default()
        });
        r.source_method = SourceMethod::StructuredExtraction;

        let sig = compute_sig(&r);
        assert!(sig.precomputed);
        assert_eq!(sig.revenue, 500_000.0);
        // Verbatim, not the 150 000 the raw figures would give
        assert_eq!(sig.indicators.commercial_margin.value, 160_000.0);
        assert_eq!(sig.ebe, 55_000.0);
        assert_eq!(sig.net_result, 28_000.0);
    }

    #[test]
    fn missing_purchases_and_charges_degrades_gracefully() {
        let figures = RawFigures {
            revenue: Some(200_000.0),
            goods_sales: Some(200_000.0),
            ..RawFigures::default()
        };
        let sig = compute_sig(&resolved(figures));
        assert!(sig.degraded);
        assert!(sig.low_confidence);
        // Zeros substituted: margin collapses to goods sales
        assert_eq!(sig.indicators.commercial_margin.value, 200_000.0);
    }

    #[test]
    fn extracted_ebe_wins_over_formula_for_partial_sources() {
        let figures = RawFigures {
            revenue: Some(450_000.0),
            ebe: Some(60_000.0),
            goods_sales: Some(450_000.0),
            goods_purchases: Some(300_000.0),
            ..RawFigures::default()
        };
        let sig = compute_sig(&resolved(figures));
        assert_eq!(sig.ebe, 60_000.0);
    }

    #[test]
    fn bfr_and_days_require_balance_sheet_aggregates() {
        let no_balance = compute_sig(&resolved(RawFigures {
            revenue: Some(100_000.0),
            ..RawFigures::default()
        }));
        assert!(no_balance.indicators.bfr.is_none());
        assert!(no_balance.bfr_days.is_none());

        let with_balance = compute_sig(&resolved(RawFigures {
            revenue: Some(360_000.0),
            inventory: Some(30_000.0),
            receivables: Some(50_000.0),
            payables: Some(20_000.0),
            ..RawFigures::default()
        }));
        assert_eq!(with_balance.indicators.bfr.unwrap().value, 60_000.0);
        assert_eq!(with_balance.bfr_days, Some(60.0));
    }
}
