//! Ratio & Benchmark Comparator
//!
//! Computes margin, turnover and leverage ratios from the latest year's
//! indicators plus balance-sheet aggregates, then positions each against a
//! sector benchmark looked up by NAF code (exact match only; unknown codes
//! fall back to the default benchmark).
//!
//! The benchmark table is versioned, hand-authored reference data: adding a
//! sector or adjusting an average is a data change, not an engine change.

use analysis_core::{Position, RatioComparison, RatioName, RatioSet, RawFigures, SigResult};
use serde::Serialize;

/// Deviation band (±%) inside which a ratio is considered in line with the
/// sector
pub const INLINE_BAND_PCT: f64 = 10.0;

const DAYS_BASIS: f64 = 360.0;

/// Reference ratio set for one sector. Static reference data: serialized
/// into reports, never parsed back.
#[derive(Debug, Clone, Serialize)]
pub struct SectorBenchmark {
    pub code: &'static str,
    pub label: &'static str,
    pub ebe_margin: f64,
    pub net_margin: f64,
    pub value_added_rate: f64,
    pub personnel_rate: f64,
    pub receivable_days: f64,
    pub payable_days: f64,
    pub inventory_days: f64,
    pub bfr_days: f64,
    pub leverage: f64,
}

impl SectorBenchmark {
    /// Exact NAF-code lookup. No fuzzy or prefix matching: an unknown code
    /// falls back to the cross-sector default.
    pub fn for_code(code: &str) -> &'static SectorBenchmark {
        let found = BENCHMARKS.iter().find(|b| b.code == code);
        match found {
            Some(b) => b,
            None => {
                tracing::debug!(code, "no benchmark for sector code, using default");
                &DEFAULT_BENCHMARK
            }
        }
    }

    pub fn default_benchmark() -> &'static SectorBenchmark {
        &DEFAULT_BENCHMARK
    }

    pub fn average(&self, ratio: RatioName) -> f64 {
        match ratio {
            RatioName::EbeMargin => self.ebe_margin,
            RatioName::NetMargin => self.net_margin,
            RatioName::ValueAddedRate => self.value_added_rate,
            RatioName::PersonnelRate => self.personnel_rate,
            RatioName::ReceivableDays => self.receivable_days,
            RatioName::PayableDays => self.payable_days,
            RatioName::InventoryDays => self.inventory_days,
            RatioName::BfrDays => self.bfr_days,
            RatioName::Leverage => self.leverage,
        }
    }
}

/// Cross-sector fallback for unmatched NAF codes
static DEFAULT_BENCHMARK: SectorBenchmark = SectorBenchmark {
    code: "default",
    label: "All sectors (default)",
    ebe_margin: 10.0,
    net_margin: 4.0,
    value_added_rate: 40.0,
    personnel_rate: 28.0,
    receivable_days: 35.0,
    payable_days: 45.0,
    inventory_days: 30.0,
    bfr_days: 25.0,
    leverage: 80.0,
};

static BENCHMARKS: &[SectorBenchmark] = &[
    SectorBenchmark {
        code: "5610A",
        label: "Traditional restaurants",
        ebe_margin: 12.0,
        net_margin: 5.0,
        value_added_rate: 50.0,
        personnel_rate: 35.0,
        receivable_days: 3.0,
        payable_days: 30.0,
        inventory_days: 10.0,
        bfr_days: -15.0,
        leverage: 90.0,
    },
    SectorBenchmark {
        code: "1071C",
        label: "Bakery and pastry",
        ebe_margin: 14.0,
        net_margin: 6.0,
        value_added_rate: 55.0,
        personnel_rate: 38.0,
        receivable_days: 2.0,
        payable_days: 25.0,
        inventory_days: 8.0,
        bfr_days: -12.0,
        leverage: 100.0,
    },
    SectorBenchmark {
        code: "4711B",
        label: "Convenience stores",
        ebe_margin: 6.0,
        net_margin: 2.0,
        value_added_rate: 22.0,
        personnel_rate: 13.0,
        receivable_days: 2.0,
        payable_days: 35.0,
        inventory_days: 25.0,
        bfr_days: -10.0,
        leverage: 70.0,
    },
    SectorBenchmark {
        code: "4711D",
        label: "Supermarkets",
        ebe_margin: 5.0,
        net_margin: 1.5,
        value_added_rate: 18.0,
        personnel_rate: 11.0,
        receivable_days: 2.0,
        payable_days: 40.0,
        inventory_days: 28.0,
        bfr_days: -12.0,
        leverage: 75.0,
    },
    SectorBenchmark {
        code: "9602A",
        label: "Hairdressing",
        ebe_margin: 15.0,
        net_margin: 8.0,
        value_added_rate: 60.0,
        personnel_rate: 42.0,
        receivable_days: 1.0,
        payable_days: 20.0,
        inventory_days: 12.0,
        bfr_days: -5.0,
        leverage: 60.0,
    },
    SectorBenchmark {
        code: "4399C",
        label: "Masonry and structural work",
        ebe_margin: 9.0,
        net_margin: 4.0,
        value_added_rate: 45.0,
        personnel_rate: 32.0,
        receivable_days: 60.0,
        payable_days: 50.0,
        inventory_days: 15.0,
        bfr_days: 35.0,
        leverage: 85.0,
    },
    SectorBenchmark {
        code: "7022Z",
        label: "Business consulting",
        ebe_margin: 18.0,
        net_margin: 10.0,
        value_added_rate: 70.0,
        personnel_rate: 48.0,
        receivable_days: 55.0,
        payable_days: 30.0,
        inventory_days: 0.0,
        bfr_days: 40.0,
        leverage: 40.0,
    },
];

/// Compute the ratio set for one year. Ratios whose denominator is
/// undefined are omitted rather than reported as zero.
pub fn compute_ratios(sig: &SigResult, figures: &RawFigures) -> RatioSet {
    let revenue = sig.indicators.revenue.value;
    let has_revenue = revenue > 0.0;

    let pct = |i: analysis_core::IndicatorValue| has_revenue.then_some(i.percent_of_revenue);

    let days_of_revenue = |amount: Option<f64>| {
        amount.and_then(|a| has_revenue.then(|| round2(a / revenue * DAYS_BASIS)))
    };

    // Supplier delay runs against purchases, not revenue
    let purchase_basis =
        figures.goods_purchases.unwrap_or(0.0) + figures.external_charges.unwrap_or(0.0);
    let payable_days = figures.payables.and_then(|p| {
        (purchase_basis > 0.0).then(|| round2(p / purchase_basis * DAYS_BASIS))
    });

    let leverage = match (figures.financial_debt, figures.equity) {
        (Some(debt), Some(equity)) if equity > 0.0 => Some(round2(debt / equity * 100.0)),
        _ => None,
    };

    RatioSet {
        year: sig.year,
        ebe_margin: pct(sig.indicators.ebe),
        net_margin: pct(sig.indicators.net_result),
        value_added_rate: pct(sig.indicators.value_added),
        personnel_rate: pct(sig.indicators.personnel_charges),
        receivable_days: days_of_revenue(figures.receivables),
        payable_days,
        inventory_days: days_of_revenue(figures.inventory),
        bfr_days: sig.bfr_days,
        leverage,
    }
}

/// Position every present ratio against the sector averages.
pub fn compare(ratios: &RatioSet, benchmark: &SectorBenchmark) -> Vec<RatioComparison> {
    ratios
        .entries()
        .into_iter()
        .map(|(name, value)| {
            let sector_average = benchmark.average(name);
            let deviation_pct = if sector_average == 0.0 {
                0.0
            } else {
                round2((value - sector_average) / sector_average.abs() * 100.0)
            };
            RatioComparison {
                ratio: name,
                value,
                sector_average,
                deviation_pct,
                position: position_for(name, deviation_pct),
            }
        })
        .collect()
}

/// ±10% is in line with the sector; beyond that the standing depends on
/// whether a lower figure is favorable for this ratio.
fn position_for(ratio: RatioName, deviation_pct: f64) -> Position {
    if deviation_pct.abs() <= INLINE_BAND_PCT {
        return Position::Inline;
    }
    let higher_than_sector = deviation_pct > 0.0;
    match (higher_than_sector, ratio.lower_is_better()) {
        (true, false) | (false, true) => Position::Above,
        (true, true) | (false, false) => Position::Below,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
