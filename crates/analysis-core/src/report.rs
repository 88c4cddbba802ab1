//! Derived artifacts: indicators, ratio comparisons, alerts, coherence
//! checks and the aggregate confidence score.
//!
//! Everything here is recomputed in full on each evaluation pass; these
//! types are never persisted as a source of truth.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{SourceMethod, YearResolution};

/// A financial indicator as a value plus its share of revenue.
///
/// Invariant: `percent_of_revenue = round(value / revenue * 100, 2)` when
/// revenue > 0, else 0. Values are rounded to the unit; losses stay
/// negative, never clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub value: f64,
    pub percent_of_revenue: f64,
}

impl IndicatorValue {
    pub fn from_value(value: f64, revenue: f64) -> Self {
        let value = value.round();
        let percent_of_revenue = if revenue > 0.0 {
            (value / revenue * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            value,
            percent_of_revenue,
        }
    }
}

/// The SIG cascade ("soldes intermédiaires de gestion") plus secondary
/// indicators, each tagged with its share of revenue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigIndicators {
    pub revenue: IndicatorValue,
    pub commercial_margin: IndicatorValue,
    pub production: IndicatorValue,
    pub value_added: IndicatorValue,
    pub ebe: IndicatorValue,
    pub operating_result: IndicatorValue,
    pub current_result: IndicatorValue,
    pub net_result: IndicatorValue,
    // Secondary indicators
    pub goods_sales: IndicatorValue,
    pub goods_purchases: IndicatorValue,
    pub services_revenue: IndicatorValue,
    pub external_charges: IndicatorValue,
    pub operating_subsidies: IndicatorValue,
    pub taxes_and_duties: IndicatorValue,
    pub personnel_charges: IndicatorValue,
    pub other_operating_income: IndicatorValue,
    pub other_operating_charges: IndicatorValue,
    pub depreciation_charges: IndicatorValue,
    pub financial_result: IndicatorValue,
    pub exceptional_result: IndicatorValue,
    pub income_tax: IndicatorValue,
    /// Self-financing capacity (CAF): net result plus depreciation
    pub caf: IndicatorValue,
    /// Working-capital requirement, absent when the balance-sheet
    /// aggregates were not extracted
    #[serde(default)]
    pub bfr: Option<IndicatorValue>,
}

/// Full indicator set for one fiscal year.
///
/// `revenue`, `ebe` and `net_result` are legacy scalar mirrors of the
/// structured indicators, kept for older report consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigResult {
    pub year: i32,
    pub indicators: SigIndicators,
    pub revenue: f64,
    pub ebe: f64,
    pub net_result: f64,
    /// BFR in days of revenue, absent with the BFR itself
    #[serde(default)]
    pub bfr_days: Option<f64>,
    /// Both goods purchases and external charges were missing: zeros were
    /// substituted and the year flagged low confidence
    pub degraded: bool,
    /// Tier-1 pre-computed indicators were used verbatim
    pub precomputed: bool,
    pub source_method: SourceMethod,
    pub confidence: f64,
    pub low_confidence: bool,
}

/// Named ratios compared against the sector benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatioName {
    EbeMargin,
    NetMargin,
    ValueAddedRate,
    PersonnelRate,
    ReceivableDays,
    PayableDays,
    InventoryDays,
    BfrDays,
    Leverage,
}

impl RatioName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioName::EbeMargin => "ebe-margin",
            RatioName::NetMargin => "net-margin",
            RatioName::ValueAddedRate => "value-added-rate",
            RatioName::PersonnelRate => "personnel-rate",
            RatioName::ReceivableDays => "receivable-days",
            RatioName::PayableDays => "payable-days",
            RatioName::InventoryDays => "inventory-days",
            RatioName::BfrDays => "bfr-days",
            RatioName::Leverage => "leverage",
        }
    }

    /// Ratios where a lower figure is favorable: the above/below banding
    /// flips for these. Hard-coded, not user-configurable.
    pub fn lower_is_better(&self) -> bool {
        matches!(
            self,
            RatioName::ReceivableDays
                | RatioName::PayableDays
                | RatioName::InventoryDays
                | RatioName::BfrDays
                | RatioName::Leverage
        )
    }
}

/// Ratio values for one year (normally the latest). A ratio whose
/// denominator was undefined is simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioSet {
    pub year: i32,
    pub ebe_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub value_added_rate: Option<f64>,
    pub personnel_rate: Option<f64>,
    pub receivable_days: Option<f64>,
    pub payable_days: Option<f64>,
    pub inventory_days: Option<f64>,
    pub bfr_days: Option<f64>,
    pub leverage: Option<f64>,
}

impl RatioSet {
    /// Present ratios in declaration order
    pub fn entries(&self) -> Vec<(RatioName, f64)> {
        [
            (RatioName::EbeMargin, self.ebe_margin),
            (RatioName::NetMargin, self.net_margin),
            (RatioName::ValueAddedRate, self.value_added_rate),
            (RatioName::PersonnelRate, self.personnel_rate),
            (RatioName::ReceivableDays, self.receivable_days),
            (RatioName::PayableDays, self.payable_days),
            (RatioName::InventoryDays, self.inventory_days),
            (RatioName::BfrDays, self.bfr_days),
            (RatioName::Leverage, self.leverage),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Standing relative to the sector, after lower-is-better inversion:
/// `Above` always reads as favorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    Above,
    Inline,
    Below,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Above => "above",
            Position::Inline => "inline",
            Position::Below => "below",
        }
    }
}

/// One compared ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioComparison {
    pub ratio: RatioName,
    pub value: f64,
    pub sector_average: f64,
    pub deviation_pct: f64,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertCategory {
    Profitability,
    Leverage,
    Growth,
    Liquidity,
    Valuation,
    RealEstate,
    DataQuality,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Profitability => "profitability",
            AlertCategory::Leverage => "leverage",
            AlertCategory::Growth => "growth",
            AlertCategory::Liquidity => "liquidity",
            AlertCategory::Valuation => "valuation",
            AlertCategory::RealEstate => "real-estate",
            AlertCategory::DataQuality => "data-quality",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
        }
    }

    /// Sort key: critical first
    pub fn rank(&self) -> u8 {
        match self {
            AlertSeverity::Critical => 0,
            AlertSeverity::Warning => 1,
            AlertSeverity::Info => 2,
        }
    }
}

/// One rule firing against the current context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub rule_id: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub impact: String,
    pub recommendation: String,
    /// Values extracted for the message template, kept for audit
    pub values: BTreeMap<String, f64>,
}

/// Alert counts by severity and category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub by_category: BTreeMap<String, usize>,
}

impl AlertSummary {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut summary = Self {
            total: alerts.len(),
            ..Self::default()
        };
        for alert in alerts {
            match alert.severity {
                AlertSeverity::Critical => summary.critical += 1,
                AlertSeverity::Warning => summary.warning += 1,
                AlertSeverity::Info => summary.info += 1,
            }
            *summary
                .by_category
                .entry(alert.category.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warning => "warning",
            CheckStatus::Error => "error",
        }
    }
}

/// Result of one consistency check between independently derived figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceCheck {
    pub name: String,
    pub status: CheckStatus,
    pub description: String,
    #[serde(default)]
    pub involved: BTreeMap<String, f64>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalySeverity {
    Info,
    Warning,
    Critical,
}

impl AnomalySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySeverity::Info => "info",
            AnomalySeverity::Warning => "warning",
            AnomalySeverity::Critical => "critical",
        }
    }
}

/// A logically impossible or statistically extreme value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: String,
    pub severity: AnomalySeverity,
    pub description: String,
    #[serde(default)]
    pub involved: BTreeMap<String, f64>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// Full cross-validation output: every check and anomaly plus counts.
/// Checks are independent and order-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub checks: Vec<CoherenceCheck>,
    pub anomalies: Vec<Anomaly>,
    pub checks_ok: usize,
    pub checks_warning: usize,
    pub checks_error: usize,
    pub anomalies_info: usize,
    pub anomalies_warning: usize,
    pub anomalies_critical: usize,
}

/// Score breakdown per upstream component, each in [0, 100]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub extraction: f64,
    pub accounting: f64,
    pub valuation: f64,
    pub real_estate: f64,
}

/// Weighted aggregate confidence: completeness 35%, reliability 40%,
/// recency 25%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub overall: f64,
    pub completeness: f64,
    pub reliability: f64,
    pub recency: f64,
    pub breakdown: ConfidenceBreakdown,
    pub interpretation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentPriority {
    Blocking,
    Important,
    Useful,
}

impl DocumentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentPriority::Blocking => "blocking",
            DocumentPriority::Important => "important",
            DocumentPriority::Useful => "useful",
        }
    }
}

/// One document or action to request from the seller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub document: String,
    pub priority: DocumentPriority,
    pub reason: String,
}

/// The complete due-diligence output for one evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueDiligenceReport {
    pub as_of: NaiveDate,
    pub sector_code: String,
    pub resolutions: Vec<YearResolution>,
    pub indicators: BTreeMap<i32, SigResult>,
    pub ratios: Option<RatioSet>,
    pub comparisons: Vec<RatioComparison>,
    pub alerts: Vec<Alert>,
    pub alert_summary: AlertSummary,
    /// Top vigilance points: plain-text projection of the top (≤5)
    /// non-info alerts
    pub vigilance_points: Vec<String>,
    pub coherence: CoherenceReport,
    pub confidence: ConfidenceScore,
    pub document_requests: Vec<DocumentRequest>,
}
