//! Quality & Confidence Scorer
//!
//! Aggregates completeness, reliability and recency into one weighted
//! confidence score, with a per-component breakdown and a prioritized
//! list of documents to request. Reads only already-computed artifacts;
//! it never re-runs upstream computations.

use std::collections::{BTreeMap, BTreeSet};

use analysis_core::{
    CoherenceReport, ConfidenceBreakdown, ConfidenceScore, DocumentKind, DocumentPriority,
    DocumentRequest, ExtractionRecord, RealEstateContext, SigResult, ValuationContext,
    YearResolution,
};

pub const COMPLETENESS_WEIGHT: f64 = 0.35;
pub const RELIABILITY_WEIGHT: f64 = 0.40;
pub const RECENCY_WEIGHT: f64 = 0.25;

// Per-issue reliability penalties, applied to a base of 100
pub const ERROR_PENALTY: f64 = 15.0;
pub const CRITICAL_ANOMALY_PENALTY: f64 = 8.0;
pub const WARNING_PENALTY: f64 = 5.0;

/// Everything the scorer reads, borrowed from the evaluation pass
pub struct ScoreInputs<'a> {
    pub records: &'a [ExtractionRecord],
    pub resolutions: &'a [YearResolution],
    pub indicators: &'a BTreeMap<i32, SigResult>,
    pub valuation: Option<&'a ValuationContext>,
    pub real_estate: Option<&'a RealEstateContext>,
    pub coherence: &'a CoherenceReport,
    pub as_of_year: i32,
}

impl<'a> ScoreInputs<'a> {
    fn has_document(&self, kind: DocumentKind) -> bool {
        self.records.iter().any(|r| r.document_kind == kind)
    }

    fn resolved_count(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|r| r.as_resolved().is_some())
            .count()
    }

    fn latest_data_year(&self) -> Option<i32> {
        self.indicators.keys().next_back().copied()
    }
}

/// Compute the weighted confidence score.
pub fn score(inputs: &ScoreInputs<'_>) -> ConfidenceScore {
    let completeness = completeness_score(inputs);
    let reliability = reliability_score(inputs.coherence);
    let recency = recency_score(inputs);

    let overall = round1(
        completeness * COMPLETENESS_WEIGHT
            + reliability * RELIABILITY_WEIGHT
            + recency * RECENCY_WEIGHT,
    );
    tracing::debug!(overall, completeness, reliability, recency, "confidence scored");

    ConfidenceScore {
        overall,
        completeness,
        reliability,
        recency,
        breakdown: breakdown(inputs),
        interpretation: interpretation(overall).to_string(),
    }
}

/// Is the required data present? Component weights sum to 100.
fn completeness_score(inputs: &ScoreInputs<'_>) -> f64 {
    let mut score = 0.0;
    if inputs.has_document(DocumentKind::BalanceSheet) {
        score += 25.0;
    }
    if inputs.has_document(DocumentKind::IncomeStatement) {
        score += 25.0;
    }
    if inputs.resolved_count() >= 2 {
        score += 20.0;
    }
    if inputs.valuation.is_some() {
        score += 15.0;
    }
    if inputs
        .real_estate
        .is_some_and(|re| re.monthly_rent.is_some())
    {
        score += 15.0;
    }
    score
}

/// Starts at 100 and subtracts a fixed penalty per issue, floored at 0.
fn reliability_score(coherence: &CoherenceReport) -> f64 {
    let penalty = coherence.checks_error as f64 * ERROR_PENALTY
        + coherence.anomalies_critical as f64 * CRITICAL_ANOMALY_PENALTY
        + (coherence.checks_warning + coherence.anomalies_warning) as f64 * WARNING_PENALTY;
    (100.0 - penalty).max(0.0)
}

/// Step function of "analysis year minus latest data year"
fn recency_score(inputs: &ScoreInputs<'_>) -> f64 {
    let Some(latest) = inputs.latest_data_year() else {
        return 0.0;
    };
    match (inputs.as_of_year - latest).max(0) {
        0 => 100.0,
        1 => 90.0,
        2 => 70.0,
        3 => 50.0,
        4 => 30.0,
        _ => 10.0,
    }
}

fn breakdown(inputs: &ScoreInputs<'_>) -> ConfidenceBreakdown {
    // Extraction: mean self-reported confidence across records
    let extraction = if inputs.records.is_empty() {
        0.0
    } else {
        let sum: f64 = inputs.records.iter().map(|r| r.confidence).sum();
        round1(sum / inputs.records.len() as f64 * 100.0)
    };

    // Accounting: share of extracted years that resolved, docked for
    // degraded (zero-substituted) years
    let record_years: BTreeSet<i32> = inputs.records.iter().map(|r| r.year).collect();
    let accounting = if record_years.is_empty() {
        0.0
    } else {
        let base = inputs.resolved_count() as f64 / record_years.len() as f64 * 100.0;
        let degraded = inputs.indicators.values().filter(|s| s.degraded).count() as f64;
        round1((base - degraded * 10.0).clamp(0.0, 100.0))
    };

    // Valuation and real estate: share of fields actually supplied
    let valuation = inputs.valuation.map_or(0.0, |v| {
        let fields = [
            v.ebe_multiple_value,
            v.revenue_multiple_value,
            v.asset_based_value,
            v.recommended_value,
            v.recommended_low,
            v.recommended_high,
            v.ebe_basis,
        ];
        let present = fields.iter().filter(|f| f.is_some()).count();
        round1(present as f64 / fields.len() as f64 * 100.0)
    });
    let real_estate = inputs.real_estate.map_or(0.0, |re| {
        let present = [
            re.monthly_rent.is_some(),
            re.remaining_lease_years.is_some(),
            re.rent_review_pending.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        round1(present as f64 / 3.0 * 100.0)
    });

    ConfidenceBreakdown {
        extraction,
        accounting,
        valuation,
        real_estate,
    }
}

fn interpretation(overall: f64) -> &'static str {
    match overall {
        o if o >= 80.0 => "High confidence: the data is complete, consistent and recent.",
        o if o >= 60.0 => "Good confidence: the analysis is usable with minor reservations.",
        o if o >= 40.0 => "Fair confidence: corroborate the key figures before relying on them.",
        o if o >= 20.0 => "Low confidence: significant gaps or inconsistencies remain.",
        _ => "Insufficient data: collect the missing documents before drawing conclusions.",
    }
}

/// Prioritized, deduplicated list of documents and actions to request.
pub fn document_requests(inputs: &ScoreInputs<'_>) -> Vec<DocumentRequest> {
    let mut requests: Vec<DocumentRequest> = Vec::new();

    if !inputs.has_document(DocumentKind::IncomeStatement) {
        requests.push(request(
            "Income statements for the last three fiscal years",
            DocumentPriority::Blocking,
            "No income statement was provided; the indicator cascade rests on nothing.",
        ));
    }
    if !inputs.has_document(DocumentKind::BalanceSheet) {
        requests.push(request(
            "Balance sheets for the last three fiscal years",
            DocumentPriority::Blocking,
            "Without a balance sheet, leverage and working-capital ratios cannot be computed.",
        ));
    }

    let unresolved: Vec<i32> = inputs
        .resolutions
        .iter()
        .filter(|r| r.as_resolved().is_none())
        .map(|r| r.year())
        .collect();
    if !unresolved.is_empty() {
        let years = unresolved
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        requests.push(request(
            &format!("Legible accounts for fiscal year(s) {years}"),
            DocumentPriority::Important,
            "These years produced no usable revenue or EBE figure.",
        ));
    }

    if inputs.resolved_count() < 3 {
        requests.push(request(
            "Complete three-year accounting history",
            DocumentPriority::Important,
            "Fewer than three resolved years; trends cannot be established reliably.",
        ));
    }

    if inputs
        .latest_data_year()
        .is_some_and(|y| inputs.as_of_year - y >= 2)
    {
        requests.push(request(
            "Accounts for the latest closed fiscal year",
            DocumentPriority::Important,
            "The most recent resolved year is at least two years old.",
        ));
    }

    let shaky = inputs.resolutions.iter().filter_map(|r| r.as_resolved()).any(|r| r.low_confidence)
        || inputs.indicators.values().any(|s| s.degraded);
    if shaky {
        requests.push(request(
            "Original PDF documents for re-extraction",
            DocumentPriority::Important,
            "At least one year was resolved from low-confidence or incomplete figures.",
        ));
    }

    if inputs.real_estate.is_none() && !inputs.has_document(DocumentKind::Lease) {
        requests.push(request(
            "Commercial lease agreement",
            DocumentPriority::Important,
            "Rent burden and lease horizon are blind spots without the lease.",
        ));
    }

    if inputs.valuation.is_none() {
        requests.push(request(
            "Valuation workup or the seller's price justification",
            DocumentPriority::Useful,
            "The asking price cannot be positioned without a valuation basis.",
        ));
    }

    // Deduplicate by document name, keep the first (highest-signal) entry
    let mut seen = BTreeSet::new();
    requests.retain(|r| seen.insert(r.document.clone()));
    requests.sort_by_key(|r| r.priority);
    requests
}

fn request(document: &str, priority: DocumentPriority, reason: &str) -> DocumentRequest {
    DocumentRequest {
        document: document.to_string(),
        priority,
        reason: reason.to_string(),
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        IndicatorValue, RawFigures, ResolvedYearFigures, SigIndicators, SourceMethod,
    };

    fn sig(year: i32, revenue: f64) -> SigResult {
        let iv = |v: f64| IndicatorValue::from_value(v, revenue);
        SigResult {
            year,
            indicators: SigIndicators {
                revenue: iv(revenue),
                ..SigIndicators::default()
            },
            revenue,
            ebe: 0.0,
            net_result: 0.0,
            bfr_days: None,
            degraded: false,
            precomputed: false,
            source_method: SourceMethod::StructuredExtraction,
            confidence: 0.9,
            low_confidence: false,
        }
    }

    fn record(year: i32, kind: DocumentKind, confidence: f64) -> ExtractionRecord {
        ExtractionRecord {
            year,
            document_kind: kind,
            figures: RawFigures::default(),
            indicators: None,
            confidence,
            source_method: SourceMethod::StructuredExtraction,
        }
    }

    fn resolution(year: i32) -> YearResolution {
        YearResolution::Resolved(ResolvedYearFigures {
            year,
            figures: RawFigures::default(),
            indicators: None,
            source_method: SourceMethod::StructuredExtraction,
            confidence: 0.9,
            low_confidence: false,
        })
    }

    struct Fixture {
        records: Vec<ExtractionRecord>,
        resolutions: Vec<YearResolution>,
        indicators: BTreeMap<i32, SigResult>,
        valuation: Option<ValuationContext>,
        real_estate: Option<RealEstateContext>,
        coherence: CoherenceReport,
        as_of_year: i32,
    }

    impl Fixture {
        fn complete() -> Self {
            let mut indicators = BTreeMap::new();
            indicators.insert(2022, sig(2022, 480_000.0));
            indicators.insert(2023, sig(2023, 500_000.0));
            Self {
                records: vec![
                    record(2022, DocumentKind::IncomeStatement, 0.9),
                    record(2023, DocumentKind::IncomeStatement, 0.9),
                    record(2023, DocumentKind::BalanceSheet, 0.8),
                ],
                resolutions: vec![resolution(2022), resolution(2023)],
                indicators,
                valuation: Some(ValuationContext {
                    recommended_value: Some(400_000.0),
                    recommended_low: Some(300_000.0),
                    recommended_high: Some(500_000.0),
                    ebe_basis: Some(60_000.0),
                    ebe_multiple_value: Some(420_000.0),
                    revenue_multiple_value: Some(380_000.0),
                    asset_based_value: Some(350_000.0),
                }),
                real_estate: Some(RealEstateContext {
                    monthly_rent: Some(2_000.0),
                    remaining_lease_years: Some(6.0),
                    rent_review_pending: Some(false),
                }),
                coherence: CoherenceReport::default(),
                as_of_year: 2023,
            }
        }

        fn inputs(&self) -> ScoreInputs<'_> {
            ScoreInputs {
                records: &self.records,
                resolutions: &self.resolutions,
                indicators: &self.indicators,
                valuation: self.valuation.as_ref(),
                real_estate: self.real_estate.as_ref(),
                coherence: &self.coherence,
                as_of_year: self.as_of_year,
            }
        }
    }

    #[test]
    fn complete_current_clean_data_scores_100() {
        let fixture = Fixture::complete();
        let score = score(&fixture.inputs());
        assert_eq!(score.completeness, 100.0);
        assert_eq!(score.reliability, 100.0);
        assert_eq!(score.recency, 100.0);
        assert_eq!(score.overall, 100.0);
        assert!(score.interpretation.starts_with("High confidence"));
    }

    #[test]
    fn recency_step_table() {
        let mut fixture = Fixture::complete();
        let expectations = [
            (2023, 100.0),
            (2024, 90.0),
            (2025, 70.0),
            (2026, 50.0),
            (2027, 30.0),
            (2028, 10.0),
            (2030, 10.0),
        ];
        for (as_of_year, expected) in expectations {
            fixture.as_of_year = as_of_year;
            assert_eq!(score(&fixture.inputs()).recency, expected, "as_of {as_of_year}");
        }
    }

    #[test]
    fn reliability_subtracts_fixed_penalties_and_floors_at_zero() {
        let mut fixture = Fixture::complete();
        fixture.coherence.checks_error = 2; // −30
        fixture.coherence.checks_warning = 1; // −5
        fixture.coherence.anomalies_critical = 1; // −8
        fixture.coherence.anomalies_warning = 1; // −5
        assert_eq!(score(&fixture.inputs()).reliability, 52.0);

        fixture.coherence.checks_error = 10;
        assert_eq!(score(&fixture.inputs()).reliability, 0.0);
    }

    #[test]
    fn overall_applies_the_fixed_weights() {
        let mut fixture = Fixture::complete();
        // completeness 100, reliability 70 (2 errors), recency 90
        fixture.coherence.checks_error = 2;
        fixture.as_of_year = 2024;
        let s = score(&fixture.inputs());
        // 0.35 · 100 + 0.40 · 70 + 0.25 · 90
        assert_eq!(s.overall, 85.5);
    }

    #[test]
    fn completeness_components_add_up() {
        let mut fixture = Fixture::complete();
        fixture.valuation = None; // −15
        fixture.real_estate = None; // −15
        fixture.records.retain(|r| r.document_kind != DocumentKind::BalanceSheet); // −25
        let s = score(&fixture.inputs());
        assert_eq!(s.completeness, 45.0);
    }

    #[test]
    fn no_data_lands_in_the_insufficient_band() {
        let fixture = Fixture {
            records: Vec::new(),
            resolutions: Vec::new(),
            indicators: BTreeMap::new(),
            valuation: None,
            real_estate: None,
            coherence: CoherenceReport {
                checks_error: 2,
                ..CoherenceReport::default()
            },
            as_of_year: 2024,
        };
        let s = score(&fixture.inputs());
        assert_eq!(s.completeness, 0.0);
        assert_eq!(s.recency, 0.0);
        assert_eq!(s.reliability, 70.0);
        assert!(s.interpretation.starts_with("Low confidence"));
    }

    #[test]
    fn breakdown_reflects_each_component() {
        let fixture = Fixture::complete();
        let s = score(&fixture.inputs());
        // Mean record confidence: (0.9 + 0.9 + 0.8) / 3
        assert_eq!(s.breakdown.extraction, 86.7);
        assert_eq!(s.breakdown.accounting, 100.0);
        assert_eq!(s.breakdown.valuation, 100.0);
        assert_eq!(s.breakdown.real_estate, 100.0);
    }

    #[test]
    fn requests_are_prioritized_and_deduplicated() {
        let fixture = Fixture {
            records: vec![record(2023, DocumentKind::Other, 0.9)],
            resolutions: vec![resolution(2023)],
            indicators: BTreeMap::from([(2023, sig(2023, 100_000.0))]),
            valuation: None,
            real_estate: None,
            coherence: CoherenceReport::default(),
            as_of_year: 2024,
        };
        let requests = document_requests(&fixture.inputs());

        // Blocking entries come first
        assert_eq!(requests[0].priority, DocumentPriority::Blocking);
        assert_eq!(requests[1].priority, DocumentPriority::Blocking);
        // No duplicate documents
        let mut names: Vec<&str> = requests.iter().map(|r| r.document.as_str()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);
        // Priorities are monotonically non-increasing in urgency
        let ranks: Vec<DocumentPriority> = requests.iter().map(|r| r.priority).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn complete_inputs_request_little() {
        let mut fixture = Fixture::complete();
        fixture.resolutions.push(resolution(2021));
        fixture.indicators.insert(2021, sig(2021, 450_000.0));
        let requests = document_requests(&fixture.inputs());
        assert!(requests.is_empty(), "unexpected requests: {requests:?}");
    }
}
