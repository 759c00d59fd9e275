//! Per-sample, per-timestep result tables.
//!
//! Stock and change rows are keyed by `(sample, timestep)`. Several size
//! classes contribute to the same key, so writes to an existing key are added
//! component-wise instead of appended.

use std::collections::HashMap;

use serde::Serialize;

use crate::litter::{Masses, COMPONENTS};

/// Column order of stock and change tables.
pub const MASS_COLUMNS: [&str; 10] = [
    "sample",
    "timestep",
    "total",
    "woody",
    "non_woody",
    "acid",
    "water",
    "ethanol",
    "non_soluble",
    "humus",
];

/// Column order of the CO2 yield table.
pub const CO2_COLUMNS: [&str; 3] = ["sample", "timestep", "co2"];

/// Size classes at or above this diameter count as woody by default.
pub const DEFAULT_WOODY_SIZE_LIMIT: f64 = 3.0;

type Key = (usize, u32);

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MassRow {
    pub sample: usize,
    pub timestep: u32,
    pub total: f64,
    pub woody: f64,
    pub non_woody: f64,
    pub pools: Masses,
}

impl MassRow {
    /// Split an end state into woody and non-woody totals by size class.
    pub fn classify(
        sample: usize,
        timestep: u32,
        size_class: f64,
        woody_size_limit: f64,
        pools: &Masses,
    ) -> Self {
        let total: f64 = pools.iter().sum();
        let (woody, non_woody) = if size_class >= woody_size_limit {
            (total, 0.0)
        } else {
            (0.0, total)
        };
        Self {
            sample,
            timestep,
            total,
            woody,
            non_woody,
            pools: *pools,
        }
    }

    pub fn key(&self) -> Key {
        (self.sample, self.timestep)
    }

    /// Non-key columns in table order.
    pub fn values(&self) -> [f64; 3 + COMPONENTS] {
        let mut values = [0.0; 3 + COMPONENTS];
        values[0] = self.total;
        values[1] = self.woody;
        values[2] = self.non_woody;
        values[3..].copy_from_slice(&self.pools);
        values
    }

    fn accumulate(&mut self, other: &MassRow) {
        self.total += other.total;
        self.woody += other.woody;
        self.non_woody += other.non_woody;
        for (pool, value) in self.pools.iter_mut().zip(&other.pools) {
            *pool += value;
        }
    }

    fn difference(&self, earlier: &MassRow) -> MassRow {
        let mut pools = self.pools;
        for (pool, value) in pools.iter_mut().zip(&earlier.pools) {
            *pool -= value;
        }
        MassRow {
            sample: self.sample,
            timestep: self.timestep,
            total: self.total - earlier.total,
            woody: self.woody - earlier.woody,
            non_woody: self.non_woody - earlier.non_woody,
            pools,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Co2Row {
    pub sample: usize,
    pub timestep: u32,
    pub co2: f64,
}

impl Co2Row {
    pub fn key(&self) -> Key {
        (self.sample, self.timestep)
    }
}

/// Rows in insertion order with O(1) lookup by key.
#[derive(Clone, Debug)]
pub struct KeyedTable<R> {
    rows: Vec<R>,
    index: HashMap<Key, usize>,
}

impl<R> Default for KeyedTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> KeyedTable<R> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, sample: usize, timestep: u32) -> Option<&R> {
        self.index.get(&(sample, timestep)).map(|&at| &self.rows[at])
    }

    fn upsert_with(&mut self, key: Key, row: R, merge: impl FnOnce(&mut R, &R)) {
        match self.index.get(&key) {
            Some(&at) => merge(&mut self.rows[at], &row),
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }
}

pub type MassTable = KeyedTable<MassRow>;
pub type Co2Table = KeyedTable<Co2Row>;

impl KeyedTable<MassRow> {
    /// Append `row`, or add it into the existing row with the same key.
    pub fn upsert(&mut self, row: MassRow) {
        self.upsert_with(row.key(), row, MassRow::accumulate);
    }

    /// Fold another table into this one, key by key.
    pub fn merge(&mut self, other: MassTable) {
        for row in other.rows {
            self.upsert(row);
        }
    }
}

impl KeyedTable<Co2Row> {
    pub fn upsert(&mut self, row: Co2Row) {
        self.upsert_with(row.key(), row, |into, from| into.co2 += from.co2);
    }

    pub fn merge(&mut self, other: Co2Table) {
        for row in other.rows {
            self.upsert(row);
        }
    }
}

/// The three raw result tables of a run.
#[derive(Clone, Debug, Default)]
pub struct ResultTables {
    pub stock: MassTable,
    pub change: MassTable,
    pub co2: Co2Table,
}

impl ResultTables {
    pub fn merge(&mut self, other: ResultTables) {
        self.stock.merge(other.stock);
        self.change.merge(other.change);
        self.co2.merge(other.co2);
    }
}

/// Collects the results of one sample. Finished samples are merged into the
/// run tables with [`ResultTables::merge`].
#[derive(Clone, Debug)]
pub struct ResultAccumulator {
    woody_size_limit: f64,
    tables: ResultTables,
    initial_mass: f64,
    litter_mass: f64,
}

impl ResultAccumulator {
    pub fn new(woody_size_limit: f64) -> Self {
        Self {
            woody_size_limit,
            tables: ResultTables::default(),
            initial_mass: 0.0,
            litter_mass: 0.0,
        }
    }

    /// Add one size class's stock for `(sample, timestep)`.
    pub fn record_stock(&mut self, sample: usize, timestep: u32, size_class: f64, pools: &Masses) {
        let row = MassRow::classify(sample, timestep, size_class, self.woody_size_limit, pools);
        self.tables.stock.upsert(row);
    }

    /// Count a transition's drawn inputs towards the current timestep's mass
    /// balance.
    pub fn record_inputs(&mut self, initial: &Masses, litter: &Masses) {
        self.initial_mass += initial.iter().sum::<f64>();
        self.litter_mass += litter.iter().sum::<f64>();
    }

    /// Derive the change and CO2 rows ending at `timestep` once every size
    /// class has been recorded, then reset the mass balance.
    ///
    /// A change row needs both the current and the previous stock row. The
    /// CO2 row is always written; it stays zero when no stock exists.
    pub fn close_timestep(&mut self, sample: usize, timestep: u32) {
        let now = self.tables.stock.get(sample, timestep).copied();
        let previous = timestep
            .checked_sub(1)
            .and_then(|earlier| self.tables.stock.get(sample, earlier).copied());
        if let (Some(now), Some(previous)) = (now, previous) {
            self.tables.change.upsert(now.difference(&previous));
        }

        let co2 = now
            .map(|row| self.initial_mass + self.litter_mass - row.total)
            .unwrap_or(0.0);
        self.tables.co2.upsert(Co2Row {
            sample,
            timestep,
            co2,
        });
        self.initial_mass = 0.0;
        self.litter_mass = 0.0;
    }

    pub fn into_tables(self) -> ResultTables {
        self.tables
    }

    pub fn tables(&self) -> &ResultTables {
        &self.tables
    }
}
