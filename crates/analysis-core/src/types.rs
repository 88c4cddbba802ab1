use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Kind of source document a figure set was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    BalanceSheet,
    IncomeStatement,
    ConsolidatedFiling,
    Lease,
    SaleOffer,
    TransactionCost,
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::BalanceSheet => "balance-sheet",
            DocumentKind::IncomeStatement => "income-statement",
            DocumentKind::ConsolidatedFiling => "consolidated-filing",
            DocumentKind::Lease => "lease",
            DocumentKind::SaleOffer => "sale-offer",
            DocumentKind::TransactionCost => "transaction-cost",
            DocumentKind::Other => "other",
        }
    }

    /// Preference order when two records of the same extraction tier tie
    /// on confidence (income statements carry the richest figure set).
    pub fn preference_rank(&self) -> u8 {
        match self {
            DocumentKind::IncomeStatement => 0,
            DocumentKind::BalanceSheet => 1,
            DocumentKind::ConsolidatedFiling => 2,
            DocumentKind::Lease => 3,
            DocumentKind::SaleOffer => 4,
            DocumentKind::TransactionCost => 5,
            DocumentKind::Other => 6,
        }
    }
}

/// How the figures were extracted, ordered by trust (descending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMethod {
    StructuredExtraction,
    VisionKeyValues,
    HeuristicTableParse,
}

impl SourceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMethod::StructuredExtraction => "structured-extraction",
            SourceMethod::VisionKeyValues => "vision-key-values",
            SourceMethod::HeuristicTableParse => "heuristic-table-parse",
        }
    }
}

/// Raw financial figures for one fiscal year, as extracted from a document.
///
/// Every field is optional: extraction is lossy and each document kind only
/// carries a subset. Figures are already numeric; locale normalization
/// ("1 234,56") happens upstream in the extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFigures {
    // Income statement
    pub revenue: Option<f64>,
    pub goods_sales: Option<f64>,
    pub goods_purchases: Option<f64>,
    pub services_revenue: Option<f64>,
    pub inventory_change_production: Option<f64>,
    pub capitalized_production: Option<f64>,
    pub external_charges: Option<f64>,
    pub operating_subsidies: Option<f64>,
    pub taxes_and_duties: Option<f64>,
    pub personnel_charges: Option<f64>,
    pub other_operating_income: Option<f64>,
    pub other_operating_charges: Option<f64>,
    pub depreciation_charges: Option<f64>,
    pub financial_result: Option<f64>,
    pub exceptional_result: Option<f64>,
    pub income_tax: Option<f64>,
    pub ebe: Option<f64>,
    // Balance sheet aggregates
    pub total_assets: Option<f64>,
    pub equity: Option<f64>,
    pub financial_debt: Option<f64>,
    pub receivables: Option<f64>,
    pub payables: Option<f64>,
    pub inventory: Option<f64>,
    pub cash: Option<f64>,
}

impl RawFigures {
    fn fields(&self) -> [Option<f64>; 24] {
        [
            self.revenue,
            self.goods_sales,
            self.goods_purchases,
            self.services_revenue,
            self.inventory_change_production,
            self.capitalized_production,
            self.external_charges,
            self.operating_subsidies,
            self.taxes_and_duties,
            self.personnel_charges,
            self.other_operating_income,
            self.other_operating_charges,
            self.depreciation_charges,
            self.financial_result,
            self.exceptional_result,
            self.income_tax,
            self.ebe,
            self.total_assets,
            self.equity,
            self.financial_debt,
            self.receivables,
            self.payables,
            self.inventory,
            self.cash,
        ]
    }

    /// Number of figures the extraction actually produced
    pub fn present_count(&self) -> usize {
        self.fields().iter().filter(|f| f.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    /// A figure set is only usable downstream if it anchors on at least
    /// revenue or EBE; everything else can be derived or defaulted.
    pub fn has_revenue_or_ebe(&self) -> bool {
        self.revenue.is_some() || self.ebe.is_some()
    }
}

/// Indicator set pre-computed by the tier-1 structured extraction.
///
/// When present and complete (revenue, EBE, net result all non-null) these
/// values are used verbatim instead of re-deriving them from raw figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecomputedIndicators {
    pub revenue: Option<f64>,
    pub commercial_margin: Option<f64>,
    pub production: Option<f64>,
    pub value_added: Option<f64>,
    pub ebe: Option<f64>,
    pub operating_result: Option<f64>,
    pub current_result: Option<f64>,
    pub net_result: Option<f64>,
}

impl PrecomputedIndicators {
    /// The three load-bearing indicators that gate tier-1 resolution
    pub fn has_core_trio(&self) -> bool {
        self.revenue.is_some() && self.ebe.is_some() && self.net_result.is_some()
    }
}

/// One document's contribution for one fiscal year.
///
/// Produced by the external extraction collaborator; immutable once created.
/// Several records may exist for the same year (one per document/method).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub year: i32,
    pub document_kind: DocumentKind,
    #[serde(default)]
    pub figures: RawFigures,
    #[serde(default)]
    pub indicators: Option<PrecomputedIndicators>,
    /// Self-reported extraction confidence in [0, 1]
    pub confidence: f64,
    pub source_method: SourceMethod,
}

/// Identity of the business under review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessInfo {
    #[serde(default)]
    pub name: Option<String>,
    /// NAF activity code, matched exactly against the benchmark table
    pub sector_code: String,
    #[serde(default)]
    pub asking_price: Option<f64>,
}

/// Externally computed valuation inputs (EBE multiple, revenue multiple,
/// asset-based), plus the recommended value and range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationContext {
    pub ebe_multiple_value: Option<f64>,
    pub revenue_multiple_value: Option<f64>,
    pub asset_based_value: Option<f64>,
    pub recommended_value: Option<f64>,
    pub recommended_low: Option<f64>,
    pub recommended_high: Option<f64>,
    /// EBE figure the valuation was computed from, cross-checked against
    /// the EBE in the computed indicators
    pub ebe_basis: Option<f64>,
}

/// Lease and premises inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealEstateContext {
    pub monthly_rent: Option<f64>,
    pub remaining_lease_years: Option<f64>,
    pub rent_review_pending: Option<bool>,
}

/// The full evaluation context handed to the engine.
///
/// `as_of` is injected by the caller; the engine never reads the system
/// clock, so two evaluations of the same context are byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub records: Vec<ExtractionRecord>,
    pub business: BusinessInfo,
    #[serde(default)]
    pub valuation: Option<ValuationContext>,
    #[serde(default)]
    pub real_estate: Option<RealEstateContext>,
    pub as_of: NaiveDate,
}

impl AnalysisContext {
    /// Boundary constructor: the only place a malformed input can halt the
    /// pipeline. Anything that parses is evaluated; missing figures surface
    /// as alerts and score penalties downstream, never as errors.
    pub fn from_json(value: serde_json::Value) -> Result<Self, AnalysisError> {
        serde_json::from_value(value).map_err(|e| AnalysisError::MalformedContext(e.to_string()))
    }
}

/// Canonical figure set for one year after priority resolution.
///
/// Derived, never mutated after creation; keeps the winning source method
/// and confidence for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedYearFigures {
    pub year: i32,
    pub figures: RawFigures,
    /// Only populated for tier-1 (structured) resolutions
    pub indicators: Option<PrecomputedIndicators>,
    pub source_method: SourceMethod,
    pub confidence: f64,
    /// Winning confidence below 0.7. The year is kept, not dropped, and
    /// the flag propagates to the quality scorer
    pub low_confidence: bool,
}

/// Resolution outcome for one fiscal year. `Unresolved` is distinct from a
/// resolved year with zero revenue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum YearResolution {
    Resolved(ResolvedYearFigures),
    Unresolved { year: i32, reason: String },
}

impl YearResolution {
    pub fn year(&self) -> i32 {
        match self {
            YearResolution::Resolved(r) => r.year,
            YearResolution::Unresolved { year, .. } => *year,
        }
    }

    pub fn as_resolved(&self) -> Option<&ResolvedYearFigures> {
        match self {
            YearResolution::Resolved(r) => Some(r),
            YearResolution::Unresolved { .. } => None,
        }
    }
}
