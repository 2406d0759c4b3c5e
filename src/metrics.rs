use std::collections::HashMap;

use crate::types::StratumLabel;

/// Aggregate skew metrics for per-stratum draw counts.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageSkew {
    /// Total draws counted.
    pub total: usize,
    /// Number of strata with at least one draw.
    pub strata: usize,
    /// Smallest per-stratum count.
    pub min: usize,
    /// Largest per-stratum count.
    pub max: usize,
    /// Mean draws per stratum.
    pub mean: f64,
    /// Share of draws taken by the largest stratum.
    pub max_share: f64,
    /// Share of draws taken by the smallest stratum.
    pub min_share: f64,
    /// `max / min`; infinite when a stratum has zero draws.
    pub ratio: f64,
    /// Per-stratum breakdown, largest first.
    pub per_stratum: Vec<StratumShare>,
}

/// Per-stratum share of draws for coverage inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct StratumShare {
    /// Rendered stratum label.
    pub stratum: StratumLabel,
    /// Draws from this stratum.
    pub count: usize,
    /// Fraction of all draws.
    pub share: f64,
}

/// Compute coverage metrics from per-stratum draw counts.
pub fn coverage_skew(counts: &HashMap<StratumLabel, usize>) -> Option<CoverageSkew> {
    let min = *counts.values().min()?;
    let max = *counts.values().max()?;
    let total: usize = counts.values().sum();
    let strata = counts.len();
    let mean = total as f64 / strata as f64;
    let share_of = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_stratum: Vec<StratumShare> = counts
        .iter()
        .map(|(stratum, count)| StratumShare {
            stratum: stratum.clone(),
            count: *count,
            share: share_of(*count),
        })
        .collect();
    per_stratum.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.stratum.cmp(&b.stratum)));
    Some(CoverageSkew {
        total,
        strata,
        min,
        max,
        mean,
        max_share: share_of(max),
        min_share: share_of(min),
        ratio,
        per_stratum,
    })
}
