//! The alert-rule table.
//!
//! Rules are declared in a fixed order, grouped by category. Threshold
//! bands within a category are non-overlapping: every numeric value lands
//! in at most one severity tier, so the table can be boundary-tested
//! mechanically. Changing a threshold or adding a rule is a data edit;
//! the evaluator in `lib.rs` never changes.

use std::collections::BTreeMap;

use analysis_core::{AlertCategory, AlertSeverity, Position, RatioName};

use crate::AlertRule;

// Profitability
pub const EBE_MARGIN_WEAK_PCT: f64 = 5.0;
pub const NET_MARGIN_THIN_PCT: f64 = 2.0;
// Growth (decline measured earliest → latest, positive = shrinking)
pub const REVENUE_COLLAPSE_PCT: f64 = 30.0;
pub const REVENUE_DECLINE_PCT: f64 = 15.0;
pub const REVENUE_SLUMP_PCT: f64 = 5.0;
// Leverage
pub const LEVERAGE_EXCESSIVE_PCT: f64 = 200.0;
pub const LEVERAGE_HIGH_PCT: f64 = 100.0;
// Liquidity
pub const BFR_DAYS_HEAVY: f64 = 90.0;
// Real estate
pub const RENT_CRUSHING_PCT: f64 = 15.0;
pub const RENT_HEAVY_PCT: f64 = 8.0;
pub const LEASE_EXPIRING_YEARS: f64 = 3.0;
// Data quality
pub const DATA_STALE_YEARS: i32 = 3;
pub const DATA_AGING_YEARS: i32 = 2;
// Benchmark
pub const SECTOR_EBE_LAG_PCT: f64 = -25.0;

fn v(values: &BTreeMap<String, f64>, key: &str) -> f64 {
    values.get(key).copied().unwrap_or(0.0)
}

fn one(key: &str, value: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([(key.to_string(), value)])
}

/// The full ordered rule table.
pub fn rules() -> Vec<AlertRule> {
    vec![
        // --- Profitability ---
        // Fires when EBE < 0. The margin tiers below only apply at EBE ≥ 0.
        AlertRule {
            id: "ebe_negative",
            category: AlertCategory::Profitability,
            severity: AlertSeverity::Critical,
            title: "Negative EBE margin",
            impact: "The business loses money on its core operations before financing and depreciation.",
            recommendation: "Request a detailed P&L and ask the seller to explain the operating loss.",
            condition: |ctx| ctx.latest().is_some_and(|l| l.ebe < 0.0),
            values: |ctx| {
                let l = ctx.latest().map(|l| (l.ebe, l.indicators.ebe.percent_of_revenue));
                let (ebe, pct) = l.unwrap_or((0.0, 0.0));
                BTreeMap::from([
                    ("ebe".to_string(), ebe),
                    ("ebe_margin_pct".to_string(), pct),
                ])
            },
            message: |values| {
                format!(
                    "EBE is negative at {:.0} € ({:.1}% of revenue).",
                    v(values, "ebe"),
                    v(values, "ebe_margin_pct")
                )
            },
        },
        // Band: 0 ≤ EBE margin < 5%. Exactly 5% does not fire.
        AlertRule {
            id: "ebe_margin_weak",
            category: AlertCategory::Profitability,
            severity: AlertSeverity::Warning,
            title: "Weak EBE margin",
            impact: "Little operating headroom to absorb a rent increase, a hire or a downturn.",
            recommendation: "Compare the margin against the sector and probe for non-recurring charges.",
            condition: |ctx| {
                ctx.latest().is_some_and(|l| {
                    l.ebe >= 0.0 && l.indicators.ebe.percent_of_revenue < EBE_MARGIN_WEAK_PCT
                })
            },
            values: |ctx| {
                one(
                    "ebe_margin_pct",
                    ctx.latest().map(|l| l.indicators.ebe.percent_of_revenue).unwrap_or(0.0),
                )
            },
            message: |values| {
                format!(
                    "EBE margin is only {:.1}% of revenue (below {}%).",
                    v(values, "ebe_margin_pct"),
                    EBE_MARGIN_WEAK_PCT
                )
            },
        },
        // Net loss while operations stay positive: the drain is below the
        // EBE line (depreciation, financing, exceptional items).
        AlertRule {
            id: "net_result_negative",
            category: AlertCategory::Profitability,
            severity: AlertSeverity::Warning,
            title: "Net loss despite positive EBE",
            impact: "Depreciation, financial or exceptional charges absorb the whole operating surplus.",
            recommendation: "Review depreciation schedules and the debt service burden.",
            condition: |ctx| ctx.latest().is_some_and(|l| l.net_result < 0.0 && l.ebe >= 0.0),
            values: |ctx| {
                BTreeMap::from([
                    ("net_result".to_string(), ctx.latest().map(|l| l.net_result).unwrap_or(0.0)),
                    ("ebe".to_string(), ctx.latest().map(|l| l.ebe).unwrap_or(0.0)),
                ])
            },
            message: |values| {
                format!(
                    "Net result is {:.0} € while EBE stands at {:.0} €.",
                    v(values, "net_result"),
                    v(values, "ebe")
                )
            },
        },
        // Band: 0 ≤ net margin < 2%. Negative net results are covered above.
        AlertRule {
            id: "net_margin_thin",
            category: AlertCategory::Profitability,
            severity: AlertSeverity::Info,
            title: "Thin net margin",
            impact: "Profitability leaves little room for buyer debt service.",
            recommendation: "Model the post-acquisition debt service against this margin.",
            condition: |ctx| {
                ctx.latest().is_some_and(|l| {
                    l.net_result >= 0.0
                        && l.indicators.net_result.percent_of_revenue < NET_MARGIN_THIN_PCT
                })
            },
            values: |ctx| {
                one(
                    "net_margin_pct",
                    ctx.latest()
                        .map(|l| l.indicators.net_result.percent_of_revenue)
                        .unwrap_or(0.0),
                )
            },
            message: |values| {
                format!("Net margin is {:.1}% of revenue.", v(values, "net_margin_pct"))
            },
        },
        // --- Growth --- (bands: >30 critical; (15, 30] warning; (5, 15] info)
        AlertRule {
            id: "revenue_collapse",
            category: AlertCategory::Growth,
            severity: AlertSeverity::Critical,
            title: "Revenue collapse",
            impact: "The activity is shrinking fast; the asking price may rest on obsolete figures.",
            recommendation: "Obtain the current-year interim accounts before going further.",
            condition: |ctx| ctx.revenue_decline_pct().is_some_and(|d| d > REVENUE_COLLAPSE_PCT),
            values: |ctx| one("decline_pct", ctx.revenue_decline_pct().unwrap_or(0.0)),
            message: |values| {
                format!(
                    "Revenue dropped {:.1}% over the period covered by the accounts.",
                    v(values, "decline_pct")
                )
            },
        },
        AlertRule {
            id: "revenue_decline",
            category: AlertCategory::Growth,
            severity: AlertSeverity::Warning,
            title: "Declining revenue",
            impact: "A sustained downward trend erodes the valuation basis.",
            recommendation: "Ask for an explanation of the trend and the current order book.",
            condition: |ctx| {
                ctx.revenue_decline_pct()
                    .is_some_and(|d| d > REVENUE_DECLINE_PCT && d <= REVENUE_COLLAPSE_PCT)
            },
            values: |ctx| one("decline_pct", ctx.revenue_decline_pct().unwrap_or(0.0)),
            message: |values| {
                format!("Revenue declined {:.1}% over the period.", v(values, "decline_pct"))
            },
        },
        AlertRule {
            id: "revenue_slump",
            category: AlertCategory::Growth,
            severity: AlertSeverity::Info,
            title: "Slight revenue erosion",
            impact: "Mild contraction, worth understanding before committing.",
            recommendation: "Check whether the dip is seasonal or structural.",
            condition: |ctx| {
                ctx.revenue_decline_pct()
                    .is_some_and(|d| d > REVENUE_SLUMP_PCT && d <= REVENUE_DECLINE_PCT)
            },
            values: |ctx| one("decline_pct", ctx.revenue_decline_pct().unwrap_or(0.0)),
            message: |values| {
                format!("Revenue slipped {:.1}% over the period.", v(values, "decline_pct"))
            },
        },
        // --- Leverage ---
        AlertRule {
            id: "equity_negative",
            category: AlertCategory::Leverage,
            severity: AlertSeverity::Critical,
            title: "Negative equity",
            impact: "Accumulated losses exceed the capital; the company may be legally required to recapitalize.",
            recommendation: "Request the latest statutes and verify any recapitalization decisions.",
            condition: |ctx| {
                ctx.latest_figures()
                    .and_then(|f| f.equity)
                    .is_some_and(|e| e < 0.0)
            },
            values: |ctx| {
                one(
                    "equity",
                    ctx.latest_figures().and_then(|f| f.equity).unwrap_or(0.0),
                )
            },
            message: |values| format!("Equity is negative at {:.0} €.", v(values, "equity")),
        },
        // Bands: leverage > 200% critical; (100, 200] warning. Exactly 100
        // does not fire. Requires positive equity (negative equity is the
        // dedicated rule above).
        AlertRule {
            id: "leverage_excessive",
            category: AlertCategory::Leverage,
            severity: AlertSeverity::Critical,
            title: "Excessive financial leverage",
            impact: "Existing debt already eats the financing capacity a buyer would need.",
            recommendation: "Obtain the full debt schedule and outstanding guarantees.",
            condition: |ctx| ctx.leverage_pct().is_some_and(|l| l > LEVERAGE_EXCESSIVE_PCT),
            values: |ctx| one("leverage_pct", ctx.leverage_pct().unwrap_or(0.0)),
            message: |values| {
                format!(
                    "Financial debt represents {:.0}% of equity.",
                    v(values, "leverage_pct")
                )
            },
        },
        AlertRule {
            id: "leverage_high",
            category: AlertCategory::Leverage,
            severity: AlertSeverity::Warning,
            title: "High financial leverage",
            impact: "Debt service weighs on the cash available to the buyer.",
            recommendation: "Check maturities and covenants on the existing loans.",
            condition: |ctx| {
                ctx.leverage_pct()
                    .is_some_and(|l| l > LEVERAGE_HIGH_PCT && l <= LEVERAGE_EXCESSIVE_PCT)
            },
            values: |ctx| one("leverage_pct", ctx.leverage_pct().unwrap_or(0.0)),
            message: |values| {
                format!(
                    "Financial debt represents {:.0}% of equity.",
                    v(values, "leverage_pct")
                )
            },
        },
        // --- Liquidity ---
        AlertRule {
            id: "caf_negative",
            category: AlertCategory::Liquidity,
            severity: AlertSeverity::Critical,
            title: "Negative self-financing capacity",
            impact: "The business does not generate the cash to fund itself, let alone an acquisition loan.",
            recommendation: "Reconstruct the cash flow statement with an accountant before any offer.",
            condition: |ctx| ctx.latest().is_some_and(|l| l.indicators.caf.value < 0.0),
            values: |ctx| {
                one(
                    "caf",
                    ctx.latest().map(|l| l.indicators.caf.value).unwrap_or(0.0),
                )
            },
            message: |values| {
                format!("Self-financing capacity (CAF) is {:.0} €.", v(values, "caf"))
            },
        },
        // Band: BFR > 90 days of revenue.
        AlertRule {
            id: "bfr_days_heavy",
            category: AlertCategory::Liquidity,
            severity: AlertSeverity::Warning,
            title: "Heavy working-capital requirement",
            impact: "A large BFR must be financed on top of the purchase price.",
            recommendation: "Size the acquisition financing to include the working-capital need.",
            condition: |ctx| {
                ctx.latest()
                    .and_then(|l| l.bfr_days)
                    .is_some_and(|d| d > BFR_DAYS_HEAVY)
            },
            values: |ctx| one("bfr_days", ctx.latest().and_then(|l| l.bfr_days).unwrap_or(0.0)),
            message: |values| {
                format!(
                    "Working-capital requirement amounts to {:.0} days of revenue.",
                    v(values, "bfr_days")
                )
            },
        },
        AlertRule {
            id: "cash_negative",
            category: AlertCategory::Liquidity,
            severity: AlertSeverity::Warning,
            title: "Negative cash position",
            impact: "The business runs on overdraft; treasury facilities may not transfer to a buyer.",
            recommendation: "Ask for the last twelve monthly bank statements.",
            condition: |ctx| {
                ctx.latest_figures()
                    .and_then(|f| f.cash)
                    .is_some_and(|c| c < 0.0)
            },
            values: |ctx| {
                one("cash", ctx.latest_figures().and_then(|f| f.cash).unwrap_or(0.0))
            },
            message: |values| format!("Cash position is {:.0} €.", v(values, "cash")),
        },
        // --- Valuation --- (bands relative to the recommended range:
        // asking > high critical; (recommended, high] warning; < low info)
        AlertRule {
            id: "price_above_range",
            category: AlertCategory::Valuation,
            severity: AlertSeverity::Critical,
            title: "Asking price above the valuation range",
            impact: "The premium over the computed range has no support in the accounts.",
            recommendation: "Negotiate from the valuation range or ask what justifies the premium.",
            condition: |ctx| {
                let asking = ctx.business.asking_price;
                let high = ctx.valuation.and_then(|v| v.recommended_high);
                matches!((asking, high), (Some(a), Some(h)) if a > h)
            },
            values: |ctx| {
                BTreeMap::from([
                    ("asking_price".to_string(), ctx.business.asking_price.unwrap_or(0.0)),
                    (
                        "recommended_high".to_string(),
                        ctx.valuation.and_then(|v| v.recommended_high).unwrap_or(0.0),
                    ),
                ])
            },
            message: |values| {
                format!(
                    "Asking price {:.0} € exceeds the top of the valuation range ({:.0} €).",
                    v(values, "asking_price"),
                    v(values, "recommended_high")
                )
            },
        },
        AlertRule {
            id: "price_rich",
            category: AlertCategory::Valuation,
            severity: AlertSeverity::Warning,
            title: "Asking price in the upper valuation range",
            impact: "Paying the top of the range leaves no margin for surprises found later.",
            recommendation: "Use the remaining due-diligence findings as negotiation levers.",
            condition: |ctx| {
                let asking = ctx.business.asking_price;
                let mid = ctx.valuation.and_then(|v| v.recommended_value);
                let high = ctx.valuation.and_then(|v| v.recommended_high);
                matches!(
                    (asking, mid, high),
                    (Some(a), Some(m), Some(h)) if a > m && a <= h
                )
            },
            values: |ctx| {
                BTreeMap::from([
                    ("asking_price".to_string(), ctx.business.asking_price.unwrap_or(0.0)),
                    (
                        "recommended_value".to_string(),
                        ctx.valuation.and_then(|v| v.recommended_value).unwrap_or(0.0),
                    ),
                ])
            },
            message: |values| {
                format!(
                    "Asking price {:.0} € sits above the recommended value of {:.0} €.",
                    v(values, "asking_price"),
                    v(values, "recommended_value")
                )
            },
        },
        AlertRule {
            id: "price_below_range",
            category: AlertCategory::Valuation,
            severity: AlertSeverity::Info,
            title: "Asking price below the valuation range",
            impact: "A price under the computed range can signal urgency or an undisclosed issue.",
            recommendation: "Understand why the seller prices under the range before celebrating.",
            condition: |ctx| {
                let asking = ctx.business.asking_price;
                let low = ctx.valuation.and_then(|v| v.recommended_low);
                matches!((asking, low), (Some(a), Some(l)) if a < l)
            },
            values: |ctx| {
                BTreeMap::from([
                    ("asking_price".to_string(), ctx.business.asking_price.unwrap_or(0.0)),
                    (
                        "recommended_low".to_string(),
                        ctx.valuation.and_then(|v| v.recommended_low).unwrap_or(0.0),
                    ),
                ])
            },
            message: |values| {
                format!(
                    "Asking price {:.0} € is below the bottom of the valuation range ({:.0} €).",
                    v(values, "asking_price"),
                    v(values, "recommended_low")
                )
            },
        },
        // --- Real estate --- (rent ratio bands: ≥15% critical; [8, 15) warning)
        AlertRule {
            id: "rent_crushing",
            category: AlertCategory::RealEstate,
            severity: AlertSeverity::Critical,
            title: "Rent absorbs an unsustainable share of revenue",
            impact: "At this rent level the premises cost alone can wipe out the operating margin.",
            recommendation: "Renegotiate the lease before purchase or walk away.",
            condition: |ctx| ctx.rent_ratio_pct().is_some_and(|r| r >= RENT_CRUSHING_PCT),
            values: |ctx| {
                BTreeMap::from([
                    ("rent_ratio_pct".to_string(), ctx.rent_ratio_pct().unwrap_or(0.0)),
                    ("annual_rent".to_string(), ctx.annual_rent().unwrap_or(0.0)),
                    (
                        "revenue".to_string(),
                        ctx.latest().map(|l| l.revenue).unwrap_or(0.0),
                    ),
                ])
            },
            message: |values| {
                format!(
                    "Annual rent of {:.0} € represents {:.1}% of revenue ({:.0} €).",
                    v(values, "annual_rent"),
                    v(values, "rent_ratio_pct"),
                    v(values, "revenue")
                )
            },
        },
        AlertRule {
            id: "rent_heavy",
            category: AlertCategory::RealEstate,
            severity: AlertSeverity::Warning,
            title: "Heavy rent burden",
            impact: "Premises costs sit well above what the margin structure supports.",
            recommendation: "Compare against market rents for the area and factor into the offer.",
            condition: |ctx| {
                ctx.rent_ratio_pct()
                    .is_some_and(|r| r >= RENT_HEAVY_PCT && r < RENT_CRUSHING_PCT)
            },
            values: |ctx| {
                BTreeMap::from([
                    ("rent_ratio_pct".to_string(), ctx.rent_ratio_pct().unwrap_or(0.0)),
                    ("annual_rent".to_string(), ctx.annual_rent().unwrap_or(0.0)),
                ])
            },
            message: |values| {
                format!(
                    "Annual rent of {:.0} € represents {:.1}% of revenue.",
                    v(values, "annual_rent"),
                    v(values, "rent_ratio_pct")
                )
            },
        },
        AlertRule {
            id: "lease_expiring",
            category: AlertCategory::RealEstate,
            severity: AlertSeverity::Warning,
            title: "Commercial lease nearing its term",
            impact: "Renewal terms, and possibly the location itself, are uncertain.",
            recommendation: "Have the lease reviewed and secure renewal terms before closing.",
            condition: |ctx| {
                ctx.real_estate
                    .and_then(|re| re.remaining_lease_years)
                    .is_some_and(|y| y < LEASE_EXPIRING_YEARS)
            },
            values: |ctx| {
                one(
                    "remaining_years",
                    ctx.real_estate
                        .and_then(|re| re.remaining_lease_years)
                        .unwrap_or(0.0),
                )
            },
            message: |values| {
                format!(
                    "Only {:.1} years remain on the commercial lease.",
                    v(values, "remaining_years")
                )
            },
        },
        AlertRule {
            id: "rent_review_pending",
            category: AlertCategory::RealEstate,
            severity: AlertSeverity::Info,
            title: "Rent review pending",
            impact: "The rent shown in the accounts may rise shortly after purchase.",
            recommendation: "Quantify the likely revision with the lease's indexation clause.",
            condition: |ctx| {
                ctx.real_estate
                    .and_then(|re| re.rent_review_pending)
                    .unwrap_or(false)
            },
            values: |_ctx| BTreeMap::new(),
            message: |_values| "A rent review is pending on the commercial lease.".to_string(),
        },
        // --- Data quality ---
        AlertRule {
            id: "no_accounting_documents",
            category: AlertCategory::DataQuality,
            severity: AlertSeverity::Critical,
            title: "No accounting documents",
            impact: "Without a balance sheet or income statement every figure here is unverifiable.",
            recommendation: "Request the last three annual filings before relying on this analysis.",
            condition: |ctx| !ctx.has_accounting_documents(),
            values: |_ctx| BTreeMap::new(),
            message: |_values| {
                "Neither a balance sheet nor an income statement was provided.".to_string()
            },
        },
        AlertRule {
            id: "extraction_low_confidence",
            category: AlertCategory::DataQuality,
            severity: AlertSeverity::Warning,
            title: "Low-confidence extraction",
            impact: "At least one year rests on figures the extractor itself does not trust.",
            recommendation: "Provide cleaner document scans or the original PDFs for re-extraction.",
            condition: |ctx| ctx.any_low_confidence(),
            values: |ctx| {
                one(
                    "low_confidence_years",
                    ctx.resolutions
                        .iter()
                        .filter_map(|r| r.as_resolved())
                        .filter(|r| r.low_confidence)
                        .count() as f64,
                )
            },
            message: |values| {
                format!(
                    "{:.0} fiscal year(s) were resolved below the confidence gate.",
                    v(values, "low_confidence_years")
                )
            },
        },
        // Bands: as_of − latest year ≥ 3 critical; exactly 2 warning.
        AlertRule {
            id: "data_stale",
            category: AlertCategory::DataQuality,
            severity: AlertSeverity::Critical,
            title: "Accounts are seriously out of date",
            impact: "The business may look nothing like these figures today.",
            recommendation: "Demand the most recent annual accounts and interim figures.",
            condition: |ctx| ctx.years_behind().is_some_and(|y| y >= DATA_STALE_YEARS),
            values: |ctx| one("years_behind", ctx.years_behind().unwrap_or(0) as f64),
            message: |values| {
                format!(
                    "The latest accounts are {:.0} years older than the analysis date.",
                    v(values, "years_behind")
                )
            },
        },
        AlertRule {
            id: "data_aging",
            category: AlertCategory::DataQuality,
            severity: AlertSeverity::Warning,
            title: "Accounts are getting old",
            impact: "A full fiscal year is missing from the picture.",
            recommendation: "Ask for the latest closed fiscal year before finalizing an offer.",
            condition: |ctx| ctx.years_behind().is_some_and(|y| y == DATA_AGING_YEARS),
            values: |ctx| one("years_behind", ctx.years_behind().unwrap_or(0) as f64),
            message: |values| {
                format!(
                    "The latest accounts are {:.0} years older than the analysis date.",
                    v(values, "years_behind")
                )
            },
        },
        AlertRule {
            id: "single_year_only",
            category: AlertCategory::DataQuality,
            severity: AlertSeverity::Info,
            title: "Single fiscal year available",
            impact: "No trend can be established from one year of accounts.",
            recommendation: "Collect at least the two preceding annual filings.",
            condition: |ctx| ctx.resolved_count() == 1,
            values: |_ctx| BTreeMap::new(),
            message: |_values| {
                "Only one fiscal year could be resolved; trends are unavailable.".to_string()
            },
        },
        // --- Benchmark-backed profitability ---
        // Fires when the EBE margin trails the sector by more than 25%.
        AlertRule {
            id: "ebe_margin_below_sector",
            category: AlertCategory::Profitability,
            severity: AlertSeverity::Warning,
            title: "EBE margin well below the sector",
            impact: "The business under-performs comparable operations in its own sector.",
            recommendation: "Identify the cost lines driving the gap against the sector profile.",
            condition: |ctx| {
                ctx.comparison(RatioName::EbeMargin).is_some_and(|c| {
                    c.position == Position::Below && c.deviation_pct < SECTOR_EBE_LAG_PCT
                })
            },
            values: |ctx| {
                let c = ctx.comparison(RatioName::EbeMargin);
                BTreeMap::from([
                    ("value".to_string(), c.map(|c| c.value).unwrap_or(0.0)),
                    (
                        "sector_average".to_string(),
                        c.map(|c| c.sector_average).unwrap_or(0.0),
                    ),
                    (
                        "deviation_pct".to_string(),
                        c.map(|c| c.deviation_pct).unwrap_or(0.0),
                    ),
                ])
            },
            message: |values| {
                format!(
                    "EBE margin of {:.1}% trails the sector average of {:.1}% by {:.0}%.",
                    v(values, "value"),
                    v(values, "sector_average"),
                    v(values, "deviation_pct").abs()
                )
            },
        },
    ]
}
