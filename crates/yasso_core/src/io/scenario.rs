use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

use crate::scenario::Scenario;

impl Scenario {
    /// Load a scenario JSON document from disk.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open scenario file {:?}", path))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Deserialize a scenario from an arbitrary reader. The scenario is not
    /// validated here; the engine does that before sampling.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).context("invalid scenario json")
    }
}
