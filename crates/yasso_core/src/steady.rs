//! Reduction of a steady-state ensemble into initial-state records.

use std::collections::BTreeMap;

use crate::litter::{Estimate, LitterRecord, Masses, SizeClass, COMPONENTS};

/// Steady-state end states grouped by size class, one per sample.
#[derive(Clone, Debug, Default)]
pub struct SteadyStateCollector {
    by_class: BTreeMap<SizeClass, Vec<Masses>>,
}

impl SteadyStateCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, size_class: SizeClass, end_state: Masses) {
        self.by_class.entry(size_class).or_default().push(end_state);
    }

    /// Fold another sample's end states into this collector.
    pub fn merge(&mut self, other: SteadyStateCollector) {
        for (size_class, states) in other.by_class {
            self.by_class.entry(size_class).or_default().extend(states);
        }
    }

    pub fn sample_count(&self, size_class: SizeClass) -> usize {
        self.by_class.get(&size_class).map_or(0, Vec::len)
    }

    /// One record per size class, ascending: mean total mass and the mean
    /// of each sample's own fractional composition, each with its sample
    /// standard deviation.
    pub fn finish(self) -> Vec<LitterRecord> {
        self.by_class
            .into_iter()
            .map(|(size_class, states)| reduce_class(size_class, &states))
            .collect()
    }
}

fn reduce_class(size_class: SizeClass, states: &[Masses]) -> LitterRecord {
    let masses: Vec<f64> = states.iter().map(|s| s.iter().sum()).collect();
    let mut fractions = [Estimate::ZERO; COMPONENTS];
    for (pool, fraction) in fractions.iter_mut().enumerate() {
        let shares: Vec<f64> = states
            .iter()
            .zip(&masses)
            .map(|(state, &mass)| state[pool] / if mass > 0.0 { mass } else { 1.0 })
            .collect();
        *fraction = estimate(&shares);
    }
    LitterRecord::from_parts(estimate(&masses), fractions, size_class.value())
}

/// Mean and `n - 1` standard deviation; the deviation is 0 unless the
/// variance is positive.
fn estimate(values: &[f64]) -> Estimate {
    if values.is_empty() {
        return Estimate::ZERO;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    let std = if variance > 0.0 { variance.sqrt() } else { 0.0 };
    Estimate::new(mean, std)
}
