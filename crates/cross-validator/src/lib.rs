//! Cross-Validator / Anomaly Detector
//!
//! Checks agreement between independently derived figures that should
//! agree, and flags values that are logically impossible or extreme.
//! Every check is independent and order-insensitive; no check reads
//! another check's result. Disagreement is reported, never thrown.

use std::collections::BTreeMap;

use analysis_core::{
    Anomaly, AnomalySeverity, CheckStatus, CoherenceCheck, CoherenceReport, ExtractionRecord,
    RatioSet, SigResult, ValuationContext, YearResolution,
};

/// Revenue deviation bands (percent of the indicator-side figure):
/// below 2% ok, 2–10% warning, above 10% error.
pub const REVENUE_OK_BAND_PCT: f64 = 2.0;
pub const REVENUE_ERROR_BAND_PCT: f64 = 10.0;
/// EBE used for valuation vs EBE from indicators: beyond 5% is an error.
pub const EBE_VALUATION_BAND_PCT: f64 = 5.0;
/// Leverage beyond this is treated as a probable data error.
pub const LEVERAGE_EXTREME_PCT: f64 = 500.0;
/// Absolute tolerance for formula re-derivation. Figures are absolute
/// currency amounts rounded to the unit, so the band is absolute too.
pub const DERIVATION_TOLERANCE: f64 = 2.0;

/// Run every coherence check and anomaly scan over the computed artifacts.
pub fn validate(
    records: &[ExtractionRecord],
    resolutions: &[YearResolution],
    indicators: &BTreeMap<i32, SigResult>,
    ratios: Option<&RatioSet>,
    valuation: Option<&ValuationContext>,
) -> CoherenceReport {
    let mut checks: Vec<CoherenceCheck> = Vec::new();
    let mut anomalies: Vec<Anomaly> = Vec::new();

    presence_checks(records, indicators, &mut checks);
    year_coverage_check(records, indicators, &mut checks);
    revenue_consistency_checks(records, indicators, &mut checks);
    ebe_valuation_check(indicators, valuation, &mut checks);

    impossibility_scan(indicators, ratios, &mut anomalies);
    rederivation_scan(resolutions, indicators, &mut anomalies);

    let mut report = CoherenceReport {
        checks,
        anomalies,
        ..CoherenceReport::default()
    };
    for check in &report.checks {
        match check.status {
            CheckStatus::Ok => report.checks_ok += 1,
            CheckStatus::Warning => report.checks_warning += 1,
            CheckStatus::Error => report.checks_error += 1,
        }
    }
    for anomaly in &report.anomalies {
        match anomaly.severity {
            AnomalySeverity::Info => report.anomalies_info += 1,
            AnomalySeverity::Warning => report.anomalies_warning += 1,
            AnomalySeverity::Critical => report.anomalies_critical += 1,
        }
    }
    tracing::debug!(
        checks = report.checks.len(),
        errors = report.checks_error,
        anomalies = report.anomalies.len(),
        "cross-validation complete"
    );
    report
}

fn check(name: &str, status: CheckStatus, description: String) -> CoherenceCheck {
    CoherenceCheck {
        name: name.to_string(),
        status,
        description,
        involved: BTreeMap::new(),
        recommendation: None,
    }
}

fn presence_checks(
    records: &[ExtractionRecord],
    indicators: &BTreeMap<i32, SigResult>,
    checks: &mut Vec<CoherenceCheck>,
) {
    if records.is_empty() {
        let mut c = check(
            "extraction-presence",
            CheckStatus::Error,
            "No extraction records were produced from the documents.".to_string(),
        );
        c.recommendation = Some("Upload the accounting documents for processing.".to_string());
        checks.push(c);
    } else {
        checks.push(check(
            "extraction-presence",
            CheckStatus::Ok,
            format!("{} extraction record(s) available.", records.len()),
        ));
    }

    if indicators.is_empty() {
        let mut c = check(
            "accounting-presence",
            CheckStatus::Error,
            "No financial indicators could be computed.".to_string(),
        );
        c.recommendation =
            Some("Provide at least one income statement or balance sheet.".to_string());
        checks.push(c);
    } else {
        checks.push(check(
            "accounting-presence",
            CheckStatus::Ok,
            format!("Indicators computed for {} fiscal year(s).", indicators.len()),
        ));
    }
}

/// Years visible in the raw extraction must all surface in the computed
/// indicators.
fn year_coverage_check(
    records: &[ExtractionRecord],
    indicators: &BTreeMap<i32, SigResult>,
    checks: &mut Vec<CoherenceCheck>,
) {
    if records.is_empty() {
        return;
    }
    let mut missing: Vec<i32> = records
        .iter()
        .filter(|r| r.figures.has_revenue_or_ebe() || r.indicators.is_some())
        .map(|r| r.year)
        .filter(|y| !indicators.contains_key(y))
        .collect();
    missing.sort_unstable();
    missing.dedup();

    if missing.is_empty() {
        checks.push(check(
            "year-coverage",
            CheckStatus::Ok,
            "Every extracted fiscal year has computed indicators.".to_string(),
        ));
    } else {
        let years = missing
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let mut c = check(
            "year-coverage",
            CheckStatus::Warning,
            format!("Extracted year(s) {years} are missing from the indicators."),
        );
        c.recommendation = Some("Re-run the analysis or inspect the resolver output.".to_string());
        checks.push(c);
    }
}

/// Revenue as independently extracted vs revenue inside the computed
/// indicators, per year. Deviation is measured against the indicator side.
fn revenue_consistency_checks(
    records: &[ExtractionRecord],
    indicators: &BTreeMap<i32, SigResult>,
    checks: &mut Vec<CoherenceCheck>,
) {
    for (year, sig) in indicators {
        if sig.revenue <= 0.0 {
            continue;
        }
        // Independent side: the highest-confidence raw figure for the year
        let extracted = records
            .iter()
            .filter(|r| r.year == *year)
            .filter_map(|r| r.figures.revenue.map(|v| (r.confidence, v)))
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, v)| v);
        let Some(extracted) = extracted else {
            continue;
        };

        let deviation_pct = (extracted - sig.revenue).abs() / sig.revenue * 100.0;
        let status = if deviation_pct < REVENUE_OK_BAND_PCT {
            CheckStatus::Ok
        } else if deviation_pct <= REVENUE_ERROR_BAND_PCT {
            CheckStatus::Warning
        } else {
            CheckStatus::Error
        };

        let mut c = check(
            &format!("revenue-consistency-{year}"),
            status,
            format!(
                "Extracted revenue {extracted:.0} € vs {:.0} € in the indicators ({deviation_pct:.1}% deviation).",
                sig.revenue
            ),
        );
        c.involved.insert("extracted_revenue".to_string(), extracted);
        c.involved.insert("indicator_revenue".to_string(), sig.revenue);
        c.involved.insert(
            "deviation_pct".to_string(),
            (deviation_pct * 100.0).round() / 100.0,
        );
        if status != CheckStatus::Ok {
            c.recommendation =
                Some("Verify which document the revenue figure was read from.".to_string());
        }
        checks.push(c);
    }
}

/// EBE the valuation was based on vs EBE from the indicators (latest year).
fn ebe_valuation_check(
    indicators: &BTreeMap<i32, SigResult>,
    valuation: Option<&ValuationContext>,
    checks: &mut Vec<CoherenceCheck>,
) {
    let Some(basis) = valuation.and_then(|v| v.ebe_basis) else {
        return;
    };
    let Some(latest) = indicators.values().next_back() else {
        return;
    };
    if latest.ebe == 0.0 {
        return;
    }

    let deviation_pct = (basis - latest.ebe).abs() / latest.ebe.abs() * 100.0;
    let status = if deviation_pct > EBE_VALUATION_BAND_PCT {
        CheckStatus::Error
    } else {
        CheckStatus::Ok
    };
    let mut c = check(
        "ebe-valuation-consistency",
        status,
        format!(
            "Valuation rests on an EBE of {basis:.0} € while the indicators show {:.0} € ({deviation_pct:.1}% deviation).",
            latest.ebe
        ),
    );
    c.involved.insert("valuation_ebe".to_string(), basis);
    c.involved.insert("indicator_ebe".to_string(), latest.ebe);
    if status == CheckStatus::Error {
        c.recommendation = Some("Recompute the valuation from the resolved EBE.".to_string());
    }
    checks.push(c);
}

fn anomaly(
    kind: &str,
    severity: AnomalySeverity,
    description: String,
    involved: BTreeMap<String, f64>,
    recommendation: &str,
) -> Anomaly {
    Anomaly {
        kind: kind.to_string(),
        severity,
        description,
        involved,
        recommendation: Some(recommendation.to_string()),
    }
}

/// Logically impossible or extreme values across all years.
fn impossibility_scan(
    indicators: &BTreeMap<i32, SigResult>,
    ratios: Option<&RatioSet>,
    anomalies: &mut Vec<Anomaly>,
) {
    for (year, sig) in indicators {
        if sig.revenue > 0.0 && sig.net_result.abs() > sig.revenue {
            anomalies.push(anomaly(
                "net-result-exceeds-revenue",
                AnomalySeverity::Critical,
                format!(
                    "In {year} the net result ({:.0} €) exceeds revenue ({:.0} €) in absolute value.",
                    sig.net_result, sig.revenue
                ),
                BTreeMap::from([
                    ("net_result".to_string(), sig.net_result),
                    ("revenue".to_string(), sig.revenue),
                ]),
                "One of the two figures was almost certainly misread; re-extract the year.",
            ));
        }

        let margins = [
            ("commercial-margin", sig.indicators.commercial_margin.percent_of_revenue),
            ("value-added", sig.indicators.value_added.percent_of_revenue),
            ("ebe", sig.indicators.ebe.percent_of_revenue),
            ("net-result", sig.indicators.net_result.percent_of_revenue),
        ];
        for (name, pct) in margins {
            if pct > 100.0 {
                anomalies.push(anomaly(
                    "margin-over-hundred",
                    AnomalySeverity::Critical,
                    format!("In {year} the {name} ratio reaches {pct:.1}% of revenue."),
                    BTreeMap::from([("percent_of_revenue".to_string(), pct)]),
                    "A ratio above 100% of revenue points at a unit or extraction error.",
                ));
            }
        }

        if sig.indicators.caf.value < 0.0 {
            anomalies.push(anomaly(
                "negative-self-financing",
                AnomalySeverity::Warning,
                format!(
                    "In {year} the self-financing capacity is negative ({:.0} €).",
                    sig.indicators.caf.value
                ),
                BTreeMap::from([("caf".to_string(), sig.indicators.caf.value)]),
                "Check the depreciation and net result lines feeding the CAF.",
            ));
        }
    }

    if let Some(leverage) = ratios.and_then(|r| r.leverage) {
        if leverage > LEVERAGE_EXTREME_PCT {
            anomalies.push(anomaly(
                "leverage-extreme",
                AnomalySeverity::Critical,
                format!("Leverage of {leverage:.0}% of equity is beyond any plausible structure."),
                BTreeMap::from([("leverage_pct".to_string(), leverage)]),
                "Verify the financial debt and equity figures before using any ratio.",
            ));
        }
    }
}

/// Recompute commercial margin and net result from the raw figures and
/// compare against the stored indicator values.
fn rederivation_scan(
    resolutions: &[YearResolution],
    indicators: &BTreeMap<i32, SigResult>,
    anomalies: &mut Vec<Anomaly>,
) {
    for resolution in resolutions {
        let Some(resolved) = resolution.as_resolved() else {
            continue;
        };
        let Some(sig) = indicators.get(&resolved.year) else {
            continue;
        };
        let f = &resolved.figures;

        if f.goods_sales.is_some() || f.goods_purchases.is_some() {
            let expected = f.goods_sales.unwrap_or(0.0) - f.goods_purchases.unwrap_or(0.0);
            let stored = sig.indicators.commercial_margin.value;
            if (expected - stored).abs() > DERIVATION_TOLERANCE {
                anomalies.push(anomaly(
                    "commercial-margin-mismatch",
                    AnomalySeverity::Critical,
                    format!(
                        "In {} the stored commercial margin ({stored:.0} €) differs from goods sales minus purchases ({expected:.0} €).",
                        resolved.year
                    ),
                    BTreeMap::from([
                        ("stored".to_string(), stored),
                        ("recomputed".to_string(), expected),
                    ]),
                    "Re-extract the goods lines or discard the pre-computed margin.",
                ));
            }
        }

        // Only meaningful when the raw cascade has an activity basis
        if f.goods_sales.is_some() || f.services_revenue.is_some() {
            let expected = recompute_net_result(f);
            let stored = sig.indicators.net_result.value;
            if (expected - stored).abs() > DERIVATION_TOLERANCE {
                anomalies.push(anomaly(
                    "net-result-mismatch",
                    AnomalySeverity::Critical,
                    format!(
                        "In {} the stored net result ({stored:.0} €) differs from the recomputed cascade ({expected:.0} €).",
                        resolved.year
                    ),
                    BTreeMap::from([
                        ("stored".to_string(), stored),
                        ("recomputed".to_string(), expected),
                    ]),
                    "Walk the SIG cascade line by line against the income statement.",
                ));
            }
        }
    }
}

/// The §4.2 cascade in pure closed form over raw figures, ignoring any
/// pre-computed or directly extracted intermediate.
fn recompute_net_result(f: &analysis_core::RawFigures) -> f64 {
    let commercial_margin = f.goods_sales.unwrap_or(0.0) - f.goods_purchases.unwrap_or(0.0);
    let production = f.services_revenue.unwrap_or(0.0)
        + f.inventory_change_production.unwrap_or(0.0)
        + f.capitalized_production.unwrap_or(0.0);
    let value_added = commercial_margin + production - f.external_charges.unwrap_or(0.0);
    let ebe = value_added + f.operating_subsidies.unwrap_or(0.0)
        - f.taxes_and_duties.unwrap_or(0.0)
        - f.personnel_charges.unwrap_or(0.0);
    let operating = ebe + f.other_operating_income.unwrap_or(0.0)
        - f.other_operating_charges.unwrap_or(0.0)
        - f.depreciation_charges.unwrap_or(0.0);
    let current = operating + f.financial_result.unwrap_or(0.0);
    current + f.exceptional_result.unwrap_or(0.0) - f.income_tax.unwrap_or(0.0)
}
