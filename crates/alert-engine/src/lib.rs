//! Alert Rule Engine
//!
//! Evaluates a fixed, declarative rule table over the assembled analysis
//! context and emits severity-tagged alerts with templated messages.
//!
//! Determinism contract: given an identical context the engine produces
//! identical alerts in identical order: rules are evaluated in declared
//! order, conditions are pure and total (missing data is a non-firing
//! state, not an error), and the only date involved is the injected
//! `as_of` year. The final list is stable-sorted by severity, so rule
//! declaration order breaks ties.

use std::collections::BTreeMap;

use analysis_core::{
    Alert, AlertCategory, AlertSeverity, BusinessInfo, DocumentKind, ExtractionRecord,
    RatioComparison, RatioName, RawFigures, RealEstateContext, SigResult, ValuationContext,
    YearResolution,
};

pub mod rules;

pub use rules::rules;

/// Everything a rule condition may look at. Borrowed views over the
/// upstream artifacts; building one allocates nothing.
pub struct RuleContext<'a> {
    pub indicators: &'a BTreeMap<i32, SigResult>,
    pub resolutions: &'a [YearResolution],
    pub comparisons: &'a [RatioComparison],
    pub records: &'a [ExtractionRecord],
    pub business: &'a BusinessInfo,
    pub valuation: Option<&'a ValuationContext>,
    pub real_estate: Option<&'a RealEstateContext>,
    /// Calendar year injected by the caller, never read from the clock
    pub as_of_year: i32,
}

impl<'a> RuleContext<'a> {
    pub fn latest(&self) -> Option<&'a SigResult> {
        self.indicators.values().next_back()
    }

    pub fn earliest(&self) -> Option<&'a SigResult> {
        self.indicators.values().next()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|r| r.as_resolved().is_some())
            .count()
    }

    /// Canonical figures of the latest resolved year (balance-sheet
    /// aggregates included)
    pub fn latest_figures(&self) -> Option<&'a RawFigures> {
        self.resolutions
            .iter()
            .filter_map(|r| r.as_resolved())
            .max_by_key(|r| r.year)
            .map(|r| &r.figures)
    }

    /// Revenue decline from earliest to latest year, as a positive
    /// percentage rounded to 2 decimals. Needs at least two years and a
    /// non-zero starting point. Thresholds apply to the rounded figure.
    pub fn revenue_decline_pct(&self) -> Option<f64> {
        let earliest = self.earliest()?;
        let latest = self.latest()?;
        if earliest.year == latest.year || earliest.revenue <= 0.0 {
            return None;
        }
        Some(round2(
            (earliest.revenue - latest.revenue) / earliest.revenue * 100.0,
        ))
    }

    pub fn leverage_pct(&self) -> Option<f64> {
        let figures = self.latest_figures()?;
        let debt = figures.financial_debt?;
        let equity = figures.equity?;
        (equity > 0.0).then(|| round2(debt / equity * 100.0))
    }

    pub fn annual_rent(&self) -> Option<f64> {
        Some(self.real_estate?.monthly_rent? * 12.0)
    }

    /// Annual rent as a percentage of the latest year's revenue, rounded
    /// to 2 decimals
    pub fn rent_ratio_pct(&self) -> Option<f64> {
        let rent = self.annual_rent()?;
        let revenue = self.latest()?.revenue;
        (revenue > 0.0).then(|| round2(rent / revenue * 100.0))
    }

    /// Calendar years between `as_of` and the most recent data year
    pub fn years_behind(&self) -> Option<i32> {
        self.latest().map(|l| self.as_of_year - l.year)
    }

    pub fn any_low_confidence(&self) -> bool {
        self.resolutions
            .iter()
            .filter_map(|r| r.as_resolved())
            .any(|r| r.low_confidence)
    }

    pub fn has_accounting_documents(&self) -> bool {
        self.records.iter().any(|r| {
            matches!(
                r.document_kind,
                DocumentKind::BalanceSheet
                    | DocumentKind::IncomeStatement
                    | DocumentKind::ConsolidatedFiling
            )
        })
    }

    pub fn comparison(&self, ratio: RatioName) -> Option<&'a RatioComparison> {
        self.comparisons.iter().find(|c| c.ratio == ratio)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub type ConditionFn = fn(&RuleContext<'_>) -> bool;
pub type ValuesFn = fn(&RuleContext<'_>) -> BTreeMap<String, f64>;
pub type MessageFn = fn(&BTreeMap<String, f64>) -> String;

/// One declarative rule: a pure condition, a pure value extractor and the
/// message templates. Immutable; the whole table is data.
pub struct AlertRule {
    pub id: &'static str,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: &'static str,
    pub impact: &'static str,
    pub recommendation: &'static str,
    pub condition: ConditionFn,
    pub values: ValuesFn,
    pub message: MessageFn,
}

/// Walk the rule table in declared order and instantiate an alert for each
/// firing rule, then stable-sort by severity (critical, warning, info).
pub fn evaluate(ctx: &RuleContext<'_>) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = Vec::new();
    for rule in rules() {
        if !(rule.condition)(ctx) {
            continue;
        }
        let values = (rule.values)(ctx);
        let message = (rule.message)(&values);
        tracing::debug!(rule = rule.id, severity = rule.severity.as_str(), "rule fired");
        alerts.push(Alert {
            rule_id: rule.id.to_string(),
            category: rule.category,
            severity: rule.severity,
            title: rule.title.to_string(),
            message,
            impact: rule.impact.to_string(),
            recommendation: rule.recommendation.to_string(),
            values,
        });
    }
    alerts.sort_by_key(|a| a.severity.rank());
    alerts
}

/// Backward-compatible plain-text digest: the top (≤5) non-info alerts,
/// title, message and recommendation concatenated. A pure projection of
/// the alert list, not a separate data source.
pub fn vigilance_digest(alerts: &[Alert]) -> Vec<String> {
    alerts
        .iter()
        .filter(|a| a.severity != AlertSeverity::Info)
        .take(5)
        .map(|a| format!("{}: {} {}", a.title, a.message, a.recommendation))
        .collect()
}
