//! Analysis Orchestrator
//!
//! Runs the full due-diligence pipeline as one synchronous pass:
//! resolve → indicators → ratios & benchmark → (alerts, coherence) →
//! confidence. Every stage is a pure function of the context; invoking
//! the pipeline again on the same context reproduces the same report,
//! and new extraction records simply mean a fresh full recomputation;
//! there is no incremental update path.

use std::collections::BTreeMap;

use analysis_core::{
    AlertSummary, AnalysisContext, AnalysisError, DueDiligenceReport, RatioSet, SigResult,
    YearResolution,
};
use chrono::Datelike;
use sector_benchmark::SectorBenchmark;

/// Evaluate a JSON context. Parse failure is the single structural error
/// path: the engine reports it and produces nothing partial.
pub fn analyze_json(value: serde_json::Value) -> Result<DueDiligenceReport, AnalysisError> {
    let context = AnalysisContext::from_json(value)?;
    Ok(analyze(&context))
}

/// Evaluate a well-formed context. Infallible by design: missing data
/// surfaces as alerts, checks and score penalties, never as an error.
pub fn analyze(context: &AnalysisContext) -> DueDiligenceReport {
    let as_of_year = context.as_of.year();
    tracing::info!(
        records = context.records.len(),
        sector = %context.business.sector_code,
        as_of = %context.as_of,
        "starting due-diligence analysis"
    );

    // 1. Priority resolution, one canonical figure set per year
    let resolutions = value_resolver::resolve_years(&context.records);

    // 2. SIG cascade per resolved year
    let indicators: BTreeMap<i32, SigResult> = resolutions
        .iter()
        .filter_map(YearResolution::as_resolved)
        .map(|resolved| (resolved.year, sig_engine::compute_sig(resolved)))
        .collect();
    tracing::info!(years = indicators.len(), "indicators computed");

    // 3. Ratios for the latest year, positioned against the sector
    let benchmark = SectorBenchmark::for_code(&context.business.sector_code);
    let latest_resolved = resolutions
        .iter()
        .filter_map(YearResolution::as_resolved)
        .max_by_key(|r| r.year);
    let ratios: Option<RatioSet> = latest_resolved.and_then(|resolved| {
        indicators
            .get(&resolved.year)
            .map(|sig| sector_benchmark::compute_ratios(sig, &resolved.figures))
    });
    let comparisons = ratios
        .as_ref()
        .map(|r| sector_benchmark::compare(r, benchmark))
        .unwrap_or_default();

    // 4a. Declarative alert rules over the full context
    let rule_ctx = alert_engine::RuleContext {
        indicators: &indicators,
        resolutions: &resolutions,
        comparisons: &comparisons,
        records: &context.records,
        business: &context.business,
        valuation: context.valuation.as_ref(),
        real_estate: context.real_estate.as_ref(),
        as_of_year,
    };
    let alerts = alert_engine::evaluate(&rule_ctx);
    let alert_summary = AlertSummary::from_alerts(&alerts);
    let vigilance_points = alert_engine::vigilance_digest(&alerts);
    tracing::info!(
        total = alert_summary.total,
        critical = alert_summary.critical,
        "alerts evaluated"
    );

    // 4b. Cross-validation over the same upstream artifacts
    let coherence = cross_validator::validate(
        &context.records,
        &resolutions,
        &indicators,
        ratios.as_ref(),
        context.valuation.as_ref(),
    );

    // 5. Weighted confidence and the documents still worth requesting
    let score_inputs = quality_scorer::ScoreInputs {
        records: &context.records,
        resolutions: &resolutions,
        indicators: &indicators,
        valuation: context.valuation.as_ref(),
        real_estate: context.real_estate.as_ref(),
        coherence: &coherence,
        as_of_year,
    };
    let confidence = quality_scorer::score(&score_inputs);
    let document_requests = quality_scorer::document_requests(&score_inputs);
    tracing::info!(overall = confidence.overall, "analysis complete");

    DueDiligenceReport {
        as_of: context.as_of,
        sector_code: context.business.sector_code.clone(),
        resolutions,
        indicators,
        ratios,
        comparisons,
        alerts,
        alert_summary,
        vigilance_points,
        coherence,
        confidence,
        document_requests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        AlertSeverity, BusinessInfo, DocumentKind, ExtractionRecord, RawFigures,
        RealEstateContext, SourceMethod,
    };
    use chrono::NaiveDate;
    use serde_json::json;

    fn income_record(year: i32, revenue: f64, confidence: f64) -> ExtractionRecord {
        ExtractionRecord {
            year,
            document_kind: DocumentKind::IncomeStatement,
            figures: RawFigures {
                revenue: Some(revenue),
                goods_sales: Some(revenue),
                goods_purchases: Some(revenue * 0.55),
                external_charges: Some(revenue * 0.12),
                personnel_charges: Some(revenue * 0.20),
                depreciation_charges: Some(revenue * 0.03),
                ..RawFigures::default()
            },
            indicators: None,
            confidence,
            source_method: SourceMethod::VisionKeyValues,
        }
    }

    fn context() -> AnalysisContext {
        AnalysisContext {
            records: vec![
                income_record(2022, 480_000.0, 0.9),
                income_record(2023, 500_000.0, 0.9),
            ],
            business: BusinessInfo {
                name: Some("Boulangerie du Port".to_string()),
                sector_code: "1071C".to_string(),
                asking_price: None,
            },
            valuation: None,
            real_estate: None,
            as_of: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn full_pipeline_produces_every_artifact() {
        let report = analyze(&context());

        assert_eq!(report.indicators.len(), 2);
        assert!(report.ratios.is_some());
        assert!(!report.comparisons.is_empty());
        assert!(report.coherence.checks_ok > 0);
        assert!(report.confidence.overall > 0.0);
        assert_eq!(report.sector_code, "1071C");
    }

    #[test]
    fn two_passes_over_the_same_context_agree() {
        let ctx = context();
        let first = analyze(&ctx);
        let second = analyze(&ctx);

        assert_eq!(first.alerts, second.alerts);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn unknown_sector_still_yields_comparisons() {
        let mut ctx = context();
        ctx.business.sector_code = "XXXXX".to_string();
        let report = analyze(&ctx);
        assert!(!report.comparisons.is_empty());
    }

    #[test]
    fn loss_year_flows_through_to_critical_alerts() {
        let mut ctx = context();
        // Revenue 100 000 with charges far above it: EBE goes negative
        ctx.records = vec![ExtractionRecord {
            year: 2023,
            document_kind: DocumentKind::IncomeStatement,
            figures: RawFigures {
                revenue: Some(100_000.0),
                goods_sales: Some(100_000.0),
                goods_purchases: Some(80_000.0),
                personnel_charges: Some(50_000.0),
                ..RawFigures::default()
            },
            indicators: None,
            confidence: 0.9,
            source_method: SourceMethod::VisionKeyValues,
        }];

        let report = analyze(&ctx);
        assert_eq!(report.indicators[&2023].ebe, -30_000.0);
        assert!(report
            .alerts
            .iter()
            .any(|a| a.rule_id == "ebe_negative" && a.severity == AlertSeverity::Critical));
        assert!(!report.vigilance_points.is_empty());
    }

    #[test]
    fn excessive_rent_scenario_end_to_end() {
        let mut ctx = context();
        ctx.records = vec![income_record(2023, 450_000.0, 0.9)];
        ctx.real_estate = Some(RealEstateContext {
            monthly_rent: Some(15_000.0),
            remaining_lease_years: Some(6.0),
            rent_review_pending: None,
        });

        let report = analyze(&ctx);
        let rent = report
            .alerts
            .iter()
            .find(|a| a.rule_id == "rent_crushing")
            .expect("critical rent alert");
        assert!(rent.message.contains("40.0"));
    }

    #[test]
    fn json_boundary_accepts_well_formed_context() -> anyhow::Result<()> {
        let report = analyze_json(json!({
            "records": [{
                "year": 2023,
                "document_kind": "income-statement",
                "figures": { "revenue": 250000.0, "ebe": 30000.0 },
                "confidence": 0.85,
                "source_method": "vision-key-values"
            }],
            "business": { "sector_code": "5610A" },
            "as_of": "2024-03-15"
        }))?;
        assert_eq!(report.indicators[&2023].ebe, 30_000.0);
        Ok(())
    }

    #[test]
    fn json_boundary_rejects_malformed_context() {
        let result = analyze_json(json!({ "business": "not an object" }));
        assert!(matches!(result, Err(AnalysisError::MalformedContext(_))));
    }

    #[test]
    fn empty_record_set_degrades_instead_of_failing() {
        let ctx = AnalysisContext {
            records: Vec::new(),
            business: BusinessInfo {
                name: None,
                sector_code: "5610A".to_string(),
                asking_price: None,
            },
            valuation: None,
            real_estate: None,
            as_of: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        };
        let report = analyze(&ctx);
        assert!(report.indicators.is_empty());
        assert!(report.coherence.checks_error >= 2);
        assert!(report
            .alerts
            .iter()
            .any(|a| a.rule_id == "no_accounting_documents"));
        assert!(report.confidence.overall < 40.0);
    }
}
