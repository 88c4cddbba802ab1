//! Value Resolver
//!
//! Merges the extraction records available for each fiscal year into one
//! canonical figure set, following a strict source-priority policy:
//!
//! 1. structured extraction carrying a complete pre-computed indicator
//!    trio (revenue, EBE, net result), used verbatim;
//! 2. vision key-values with at least revenue or EBE, remainder derived
//!    downstream by the SIG engine;
//! 3. heuristic table parse with at least revenue or EBE, same derivation.
//!
//! A winning record with confidence below 0.7 is kept and tagged low
//! confidence rather than dropped. A year where no record carries a
//! parsable revenue or EBE resolves to an explicit `Unresolved` marker so
//! consumers can tell "no data" from "zero revenue".

use std::collections::BTreeMap;

use analysis_core::{ExtractionRecord, ResolvedYearFigures, SourceMethod, YearResolution};

/// Confidence below which a resolved year is tagged for the quality scorer
pub const LOW_CONFIDENCE_GATE: f64 = 0.7;

type TierFn = fn(&[&ExtractionRecord]) -> Option<usize>;

/// The priority policy as an explicit ordered list: the first applicable
/// tier wins. Auditable and testable in isolation from the formulas.
const TIERS: &[(&str, TierFn)] = &[
    ("structured-indicators", tier_structured),
    ("vision-key-values", tier_vision),
    ("heuristic-table-parse", tier_heuristic),
];

/// Resolve every year present in the record set, ascending by year.
pub fn resolve_years(records: &[ExtractionRecord]) -> Vec<YearResolution> {
    let mut by_year: BTreeMap<i32, Vec<&ExtractionRecord>> = BTreeMap::new();
    for record in records {
        by_year.entry(record.year).or_default().push(record);
    }

    by_year
        .into_iter()
        .map(|(year, candidates)| resolve_year(year, &candidates))
        .collect()
}

/// Resolve a single year from its candidate records.
pub fn resolve_year(year: i32, candidates: &[&ExtractionRecord]) -> YearResolution {
    for (tier_name, tier) in TIERS {
        if let Some(index) = tier(candidates) {
            let record = candidates[index];
            tracing::debug!(
                year,
                tier = tier_name,
                method = record.source_method.as_str(),
                confidence = record.confidence,
                "resolved year"
            );
            let mut resolved = build_resolution(record);
            backfill_balance_aggregates(&mut resolved.figures, candidates, index);
            return YearResolution::Resolved(resolved);
        }
    }

    YearResolution::Unresolved {
        year,
        reason: "no record carries a parsable revenue or EBE figure".to_string(),
    }
}

fn build_resolution(record: &ExtractionRecord) -> ResolvedYearFigures {
    let low_confidence = record.confidence < LOW_CONFIDENCE_GATE;
    if low_confidence {
        tracing::warn!(
            year = record.year,
            confidence = record.confidence,
            "winning record below confidence gate, tagging year low-confidence"
        );
    }
    // Pre-computed indicators are only trusted when the record would pass
    // the tier-1 gate: structured extraction with the full core trio. A
    // structured record resolved through the raw-figure fallback keeps
    // nothing; its figures go through the formulas like any other source.
    let indicators = match record.source_method {
        SourceMethod::StructuredExtraction => record
            .indicators
            .clone()
            .filter(|i| i.has_core_trio()),
        _ => None,
    };
    ResolvedYearFigures {
        year: record.year,
        figures: record.figures.clone(),
        indicators,
        source_method: record.source_method,
        confidence: record.confidence,
        low_confidence,
    }
}

/// The winning record rarely carries the whole balance sheet (an income
/// statement usually wins the year). Balance-sheet aggregates the winner
/// lacks are taken from the losing records, best confidence first.
/// Income-statement lines are never mixed across records.
fn backfill_balance_aggregates(
    figures: &mut analysis_core::RawFigures,
    candidates: &[&ExtractionRecord],
    winner: usize,
) {
    let mut others: Vec<&ExtractionRecord> = candidates
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner)
        .map(|(_, r)| *r)
        .collect();
    others.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.document_kind.preference_rank().cmp(&b.document_kind.preference_rank()))
    });

    for other in others {
        let f = &other.figures;
        figures.total_assets = figures.total_assets.or(f.total_assets);
        figures.equity = figures.equity.or(f.equity);
        figures.financial_debt = figures.financial_debt.or(f.financial_debt);
        figures.receivables = figures.receivables.or(f.receivables);
        figures.payables = figures.payables.or(f.payables);
        figures.inventory = figures.inventory.or(f.inventory);
        figures.cash = figures.cash.or(f.cash);
    }
}

/// Tier 1: structured extraction whose pre-computed set carries the three
/// load-bearing indicators.
fn tier_structured(candidates: &[&ExtractionRecord]) -> Option<usize> {
    best_candidate(candidates, |r| {
        r.source_method == SourceMethod::StructuredExtraction
            && r.indicators.as_ref().is_some_and(|i| i.has_core_trio())
    })
}

/// Tier 2: vision key-values with a non-empty bag anchored on revenue or EBE.
fn tier_vision(candidates: &[&ExtractionRecord]) -> Option<usize> {
    best_candidate(candidates, |r| {
        r.source_method == SourceMethod::VisionKeyValues
            && !r.figures.is_empty()
            && r.figures.has_revenue_or_ebe()
    })
}

/// Tier 3: heuristic table parse, same anchoring requirement. Structured
/// records that failed the tier-1 indicator gate also land here: their
/// raw figures are still the best remaining source.
fn tier_heuristic(candidates: &[&ExtractionRecord]) -> Option<usize> {
    best_candidate(candidates, |r| r.figures.has_revenue_or_ebe())
}

/// Pick the best matching candidate: highest confidence first, then
/// document-kind preference, then input order. Deterministic for any
/// input ordering of equal records.
fn best_candidate(
    candidates: &[&ExtractionRecord],
    applies: impl Fn(&ExtractionRecord) -> bool,
) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, r)| applies(**r))
        .min_by(|(ia, a), (ib, b)| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.document_kind.preference_rank().cmp(&b.document_kind.preference_rank()))
                .then(ia.cmp(ib))
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{DocumentKind, PrecomputedIndicators, RawFigures};

    fn record(
        year: i32,
        method: SourceMethod,
        confidence: f64,
        figures: RawFigures,
        indicators: Option<PrecomputedIndicators>,
    ) -> ExtractionRecord {
        ExtractionRecord {
            year,
            document_kind: DocumentKind::IncomeStatement,
            figures,
            indicators,
            confidence,
            source_method: method,
        }
    }

    fn full_indicators(revenue: f64) -> PrecomputedIndicators {
        PrecomputedIndicators {
            revenue: Some(revenue),
            ebe: Some(revenue * 0.1),
            net_result: Some(revenue * 0.05),
            ..PrecomputedIndicators::default()
        }
    }

    fn figures_with_revenue(revenue: f64) -> RawFigures {
        RawFigures {
            revenue: Some(revenue),
            ..RawFigures::default()
        }
    }

    #[test]
    fn structured_record_wins_over_conflicting_sources() {
        let structured = record(
            2023,
            SourceMethod::StructuredExtraction,
            0.9,
            figures_with_revenue(500_000.0),
            Some(full_indicators(500_000.0)),
        );
        let vision = record(
            2023,
            SourceMethod::VisionKeyValues,
            0.95,
            figures_with_revenue(480_000.0),
            None,
        );
        let heuristic = record(
            2023,
            SourceMethod::HeuristicTableParse,
            0.99,
            figures_with_revenue(460_000.0),
            None,
        );

        let all = [&structured, &vision, &heuristic];
        let resolved = resolve_year(2023, &all);
        let r = resolved.as_resolved().expect("resolved");
        assert_eq!(r.source_method, SourceMethod::StructuredExtraction);
        assert_eq!(r.figures.revenue, Some(500_000.0));
        assert!(r.indicators.is_some());
    }

    #[test]
    fn falls_back_to_vision_then_heuristic() {
        let vision = record(
            2023,
            SourceMethod::VisionKeyValues,
            0.8,
            figures_with_revenue(480_000.0),
            None,
        );
        let heuristic = record(
            2023,
            SourceMethod::HeuristicTableParse,
            0.9,
            figures_with_revenue(460_000.0),
            None,
        );

        let without_structured = [&vision, &heuristic];
        let r = resolve_year(2023, &without_structured);
        assert_eq!(
            r.as_resolved().unwrap().source_method,
            SourceMethod::VisionKeyValues
        );

        let heuristic_only = [&heuristic];
        let r = resolve_year(2023, &heuristic_only);
        assert_eq!(
            r.as_resolved().unwrap().source_method,
            SourceMethod::HeuristicTableParse
        );
    }

    #[test]
    fn structured_without_indicator_trio_drops_to_raw_figures() {
        let incomplete = PrecomputedIndicators {
            revenue: Some(500_000.0),
            ebe: None,
            net_result: Some(25_000.0),
            ..PrecomputedIndicators::default()
        };
        let structured = record(
            2023,
            SourceMethod::StructuredExtraction,
            0.9,
            figures_with_revenue(500_000.0),
            Some(incomplete),
        );

        let r = resolve_year(2023, &[&structured]);
        let resolved = r.as_resolved().unwrap();
        // Resolved through the raw-figure fallback tier, not tier 1
        assert!(resolved.indicators.is_none() || !resolved.indicators.as_ref().unwrap().has_core_trio());
        assert_eq!(resolved.figures.revenue, Some(500_000.0));
    }

    #[test]
    fn low_confidence_is_tagged_not_dropped() {
        let shaky = record(
            2022,
            SourceMethod::VisionKeyValues,
            0.5,
            figures_with_revenue(300_000.0),
            None,
        );
        let r = resolve_year(2022, &[&shaky]);
        let resolved = r.as_resolved().expect("kept despite low confidence");
        assert!(resolved.low_confidence);
        assert_eq!(resolved.figures.revenue, Some(300_000.0));
    }

    #[test]
    fn year_without_revenue_or_ebe_is_unresolved() {
        let lease_only = ExtractionRecord {
            year: 2021,
            document_kind: DocumentKind::Lease,
            figures: RawFigures {
                payables: Some(12_000.0),
                ..RawFigures::default()
            },
            indicators: None,
            confidence: 0.9,
            source_method: SourceMethod::HeuristicTableParse,
        };
        let r = resolve_year(2021, &[&lease_only]);
        assert!(matches!(r, YearResolution::Unresolved { year: 2021, .. }));
    }

    #[test]
    fn years_are_resolved_in_ascending_order() {
        let records = vec![
            record(
                2023,
                SourceMethod::VisionKeyValues,
                0.8,
                figures_with_revenue(500_000.0),
                None,
            ),
            record(
                2021,
                SourceMethod::VisionKeyValues,
                0.8,
                figures_with_revenue(420_000.0),
                None,
            ),
            record(
                2022,
                SourceMethod::VisionKeyValues,
                0.8,
                figures_with_revenue(460_000.0),
                None,
            ),
        ];
        let years: Vec<i32> = resolve_years(&records).iter().map(|r| r.year()).collect();
        assert_eq!(years, vec![2021, 2022, 2023]);
    }

    #[test]
    fn balance_aggregates_are_backfilled_from_losing_records() {
        let income = record(
            2023,
            SourceMethod::VisionKeyValues,
            0.9,
            figures_with_revenue(500_000.0),
            None,
        );
        let balance = ExtractionRecord {
            year: 2023,
            document_kind: DocumentKind::BalanceSheet,
            figures: RawFigures {
                equity: Some(120_000.0),
                financial_debt: Some(60_000.0),
                receivables: Some(45_000.0),
                ..RawFigures::default()
            },
            indicators: None,
            confidence: 0.8,
            source_method: SourceMethod::VisionKeyValues,
        };

        let r = resolve_year(2023, &[&income, &balance]);
        let resolved = r.as_resolved().unwrap();
        // The income statement won the year, yet the balance sheet's
        // aggregates made it into the canonical set
        assert_eq!(resolved.figures.revenue, Some(500_000.0));
        assert_eq!(resolved.figures.equity, Some(120_000.0));
        assert_eq!(resolved.figures.financial_debt, Some(60_000.0));
        assert_eq!(resolved.figures.receivables, Some(45_000.0));
    }

    #[test]
    fn within_tier_highest_confidence_wins() {
        let a = record(
            2023,
            SourceMethod::VisionKeyValues,
            0.75,
            figures_with_revenue(490_000.0),
            None,
        );
        let b = record(
            2023,
            SourceMethod::VisionKeyValues,
            0.92,
            figures_with_revenue(510_000.0),
            None,
        );
        let r = resolve_year(2023, &[&a, &b]);
        assert_eq!(r.as_resolved().unwrap().figures.revenue, Some(510_000.0));
    }
}
