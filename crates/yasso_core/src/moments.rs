//! Cross-sample statistics per timestep for every tracked quantity.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::results::ResultTables;

/// Column order of moment tables.
pub const MOMENT_COLUMNS: [&str; 8] = [
    "timestep", "mean", "mode", "variance", "skewness", "kurtosis", "lower", "upper",
];

/// A tracked quantity: one column of the stock, change or CO2 table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    StockTotal,
    StockWoody,
    StockNonWoody,
    StockAcid,
    StockWater,
    StockEthanol,
    StockNonSoluble,
    StockHumus,
    ChangeTotal,
    ChangeWoody,
    ChangeNonWoody,
    ChangeAcid,
    ChangeWater,
    ChangeEthanol,
    ChangeNonSoluble,
    ChangeHumus,
    Co2,
}

impl Quantity {
    pub const ALL: [Quantity; 17] = [
        Quantity::StockTotal,
        Quantity::StockWoody,
        Quantity::StockNonWoody,
        Quantity::StockAcid,
        Quantity::StockWater,
        Quantity::StockEthanol,
        Quantity::StockNonSoluble,
        Quantity::StockHumus,
        Quantity::ChangeTotal,
        Quantity::ChangeWoody,
        Quantity::ChangeNonWoody,
        Quantity::ChangeAcid,
        Quantity::ChangeWater,
        Quantity::ChangeEthanol,
        Quantity::ChangeNonSoluble,
        Quantity::ChangeHumus,
        Quantity::Co2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::StockTotal => "stock_total",
            Quantity::StockWoody => "stock_woody",
            Quantity::StockNonWoody => "stock_non_woody",
            Quantity::StockAcid => "stock_acid",
            Quantity::StockWater => "stock_water",
            Quantity::StockEthanol => "stock_ethanol",
            Quantity::StockNonSoluble => "stock_non_soluble",
            Quantity::StockHumus => "stock_humus",
            Quantity::ChangeTotal => "change_total",
            Quantity::ChangeWoody => "change_woody",
            Quantity::ChangeNonWoody => "change_non_woody",
            Quantity::ChangeAcid => "change_acid",
            Quantity::ChangeWater => "change_water",
            Quantity::ChangeEthanol => "change_ethanol",
            Quantity::ChangeNonSoluble => "change_non_soluble",
            Quantity::ChangeHumus => "change_humus",
            Quantity::Co2 => "co2",
        }
    }

    /// `(timestep, value)` pairs of this quantity across all samples.
    fn observations(self, tables: &ResultTables) -> Vec<(u32, f64)> {
        let column = self as usize % 8;
        match self {
            Quantity::Co2 => tables.co2.rows().iter().map(|r| (r.timestep, r.co2)).collect(),
            q if q < Quantity::ChangeTotal => tables
                .stock
                .rows()
                .iter()
                .map(|r| (r.timestep, r.values()[column]))
                .collect(),
            _ => tables
                .change
                .rows()
                .iter()
                .map(|r| (r.timestep, r.values()[column]))
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MomentRow {
    pub timestep: u32,
    pub mean: f64,
    pub mode: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub lower: f64,
    pub upper: f64,
}

impl MomentRow {
    pub fn values(&self) -> [f64; 7] {
        [
            self.mean,
            self.mode,
            self.variance,
            self.skewness,
            self.kurtosis,
            self.lower,
            self.upper,
        ]
    }
}

/// Moment rows per quantity, timesteps ascending.
pub type MomentTables = BTreeMap<Quantity, Vec<MomentRow>>;

/// Reduce the raw tables across the sample dimension.
pub fn reduce(tables: &ResultTables) -> MomentTables {
    Quantity::ALL
        .into_iter()
        .map(|quantity| (quantity, reduce_quantity(quantity, tables)))
        .collect()
}

pub fn reduce_quantity(quantity: Quantity, tables: &ResultTables) -> Vec<MomentRow> {
    let mut by_timestep: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for (timestep, value) in quantity.observations(tables) {
        by_timestep.entry(timestep).or_default().push(value);
    }
    by_timestep
        .into_iter()
        .map(|(timestep, values)| moment_row(timestep, &values))
        .collect()
}

/// Statistics of one timestep's sample values.
///
/// Variance uses `n - 1`. Skewness and kurtosis are the population moment
/// ratios `m3 / m2^1.5` and `m4 / m2^2`, zero when the values do not vary.
/// The band is `mean ± 2·sqrt(variance)` and collapses onto the mean for
/// zero variance. A sample of identical values yields exactly that value
/// for every location statistic and zero for every spread statistic.
pub fn moment_row(timestep: u32, values: &[f64]) -> MomentRow {
    if let Some(&first) = values.first() {
        if values.iter().all(|v| *v == first) {
            let value = first + 0.0;
            return MomentRow {
                timestep,
                mean: value,
                mode: value,
                variance: 0.0,
                skewness: 0.0,
                kurtosis: 0.0,
                lower: value,
                upper: value,
            };
        }
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let central = |power: i32| values.iter().map(|v| (v - mean).powi(power)).sum::<f64>() / n;
    let m2 = central(2);
    let variance = if values.len() > 1 { m2 * n / (n - 1.0) } else { 0.0 };
    let (skewness, kurtosis) = if m2 > 0.0 {
        (central(3) / m2.powf(1.5), central(4) / (m2 * m2))
    } else {
        (0.0, 0.0)
    };
    let half_width = if variance > 0.0 {
        2.0 * variance.sqrt()
    } else {
        0.0
    };
    MomentRow {
        timestep,
        mean,
        mode: mode(values),
        variance,
        skewness,
        kurtosis,
        lower: mean - half_width,
        upper: mean + half_width,
    }
}

/// Most frequent value; ties go to the lowest. Signed zeros count as one
/// value.
pub fn mode(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().map(|v| v + 0.0).collect();
    sorted.sort_by(f64::total_cmp);
    let mut best = (0usize, f64::NAN);
    let mut at = 0;
    while at < sorted.len() {
        let value = sorted[at];
        let run = sorted[at..]
            .iter()
            .take_while(|v| v.total_cmp(&value) == Ordering::Equal)
            .count();
        if run > best.0 {
            best = (run, value);
        }
        at += run;
    }
    best.1
}
