//! Scenario definition: initial state, litter input, climate and run
//! settings for one simulation.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::calendar::SeriesUnit;
use crate::climate::{ClimateMode, ClimateSource, ConstantClimate, MonthlyClimate, YearlyClimate};
use crate::error::{EngineError, EngineResult};
use crate::litter::{AreaChange, LitterRecord, TimedLitterRecord};
use crate::results::DEFAULT_WOODY_SIZE_LIMIT;
use crate::rng::seed_from_phrase;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialMode {
    #[default]
    Zero,
    NonZero,
    SteadyState,
}

impl InitialMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InitialMode::Zero => "zero",
            InitialMode::NonZero => "non zero",
            InitialMode::SteadyState => "steady state",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LitterMode {
    Zero,
    #[default]
    ConstantYearly,
    Monthly,
    Yearly,
}

impl LitterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LitterMode::Zero => "zero",
            LitterMode::ConstantYearly => "constant yearly",
            LitterMode::Monthly => "monthly",
            LitterMode::Yearly => "yearly",
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub parameter_set: String,
    pub sample_size: usize,
    /// Timestep length in years.
    pub timestep_length: u32,
    /// Number of timesteps.
    pub simulation_length: u32,
    /// Non-positive leaching coefficient.
    pub leaching: f64,
    pub woody_size_limit: f64,
    pub seed: Option<u64>,
    pub seed_phrase: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parameter_set: "Yasso15".to_string(),
            sample_size: 10,
            timestep_length: 1,
            simulation_length: 10,
            leaching: 0.0,
            woody_size_limit: DEFAULT_WOODY_SIZE_LIMIT,
            seed: None,
            seed_phrase: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    pub run: RunSettings,

    pub initial_mode: InitialMode,
    pub initial_litter: Vec<LitterRecord>,
    pub steady_state: Vec<LitterRecord>,

    pub litter_mode: LitterMode,
    pub constant_litter: Vec<LitterRecord>,
    pub monthly_litter: Vec<TimedLitterRecord>,
    pub yearly_litter: Vec<TimedLitterRecord>,
    pub area_change: Vec<AreaChange>,

    pub climate_mode: ClimateMode,
    pub constant_climate: ConstantClimate,
    pub monthly_climate: Vec<MonthlyClimate>,
    pub yearly_climate: Vec<YearlyClimate>,
}

impl Scenario {
    /// Reject combinations that cannot produce a meaningful run.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |message: &str| Err(EngineError::InvalidScenario(message.to_string()));
        if self.initial_mode == InitialMode::Zero && self.litter_mode == LitterMode::Zero {
            return invalid("soil carbon input and initial state may not both be zero");
        }
        if self.climate_mode == ClimateMode::Yearly && self.yearly_climate.is_empty() {
            return invalid("climate mode may not be yearly without yearly climate records");
        }
        if self.run.leaching > 0.0 {
            return invalid("leaching may not be larger than 0");
        }
        if self.climate_mode == ClimateMode::Monthly && self.monthly_climate.is_empty() {
            return invalid("climate mode may not be monthly without monthly climate records");
        }
        if self.initial_mode == InitialMode::SteadyState && self.litter_mode == LitterMode::Zero {
            return invalid("soil carbon input cannot be zero when using steady state");
        }
        if self.run.sample_size == 0 {
            return invalid("sample size must be at least 1");
        }
        if self.run.timestep_length == 0 {
            return invalid("timestep length must be at least 1 year");
        }
        if self.run.simulation_length == 0 {
            return invalid("simulation length must be at least 1 timestep");
        }
        Ok(())
    }

    /// Leaching passed to the decomposition model. Runs starting from a
    /// steady state never leach.
    pub fn effective_leaching(&self) -> f64 {
        match self.initial_mode {
            InitialMode::SteadyState => 0.0,
            _ => self.run.leaching,
        }
    }

    pub fn run_seed(&self) -> u64 {
        match &self.run.seed_phrase {
            Some(phrase) => seed_from_phrase(phrase),
            None => self.run.seed.unwrap_or(0),
        }
    }

    pub fn climate_source(&self) -> ClimateSource<'_> {
        match self.climate_mode {
            ClimateMode::ConstantYearly => ClimateSource::Constant(&self.constant_climate),
            ClimateMode::Monthly => ClimateSource::Monthly(&self.monthly_climate),
            ClimateMode::Yearly => ClimateSource::Yearly(&self.yearly_climate),
        }
    }

    /// Dated litter records and their unit. Non-series modes use an empty
    /// yearly series so area changes are still read in years.
    pub fn litter_series(&self) -> (&[TimedLitterRecord], SeriesUnit) {
        match self.litter_mode {
            LitterMode::Monthly => (&self.monthly_litter, SeriesUnit::Month),
            LitterMode::Yearly => (&self.yearly_litter, SeriesUnit::Year),
            LitterMode::Zero | LitterMode::ConstantYearly => (&[], SeriesUnit::Year),
        }
    }

    /// Records describing the state at timestep 0.
    pub fn initial_records(&self) -> &[LitterRecord] {
        match self.initial_mode {
            InitialMode::Zero => &[],
            InitialMode::NonZero => &self.initial_litter,
            InitialMode::SteadyState => &self.steady_state,
        }
    }
}
