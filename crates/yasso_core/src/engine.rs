//! Monte Carlo orchestration: the steady-state ensemble and the full
//! simulation over samples, timesteps and size classes.
//!
//! Every sample owns its random stream, seeded from the run seed and the
//! sample index, and writes into its own [`ResultAccumulator`]. Only samples
//! that ran to completion are merged into the run tables, so cancellation
//! and calendar overflow both leave well-formed partial results.

use tracing::{debug, info, warn};

use crate::calendar::CalendarMapper;
use crate::climate::ClimateCursor;
use crate::error::{EngineError, EngineResult};
use crate::kernels::{DecompositionModel, ModelGeneration};
use crate::litter::{
    merge_by_size_class, pad_size_classes, Composition, LitterRecord, SizeClassSet,
};
use crate::moments::{reduce, MomentTables};
use crate::params::ParameterEnsemble;
use crate::phase::{RunKind, RunPhase};
use crate::results::{ResultAccumulator, ResultTables};
use crate::rng::{stream_label, Stream};
use crate::scenario::{InitialMode, LitterMode, Scenario};
use crate::steady::SteadyStateCollector;
use crate::transition::{Step, TransitionInvoker};

pub const SIMULATION_STAGE: &str = "engine:simulation";
pub const STEADY_STATE_STAGE: &str = "engine:steady_state";

/// Answer of a [`Progress`] observer before each sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Stop quietly, keeping finished samples.
    Skip,
    /// Abort early, keeping finished samples.
    Cancel,
}

/// Observer consulted once per sample, before the sample starts.
pub trait Progress {
    fn on_sample(&mut self, kind: RunKind, sample: usize, total: usize) -> Control;
}

impl<F> Progress for F
where
    F: FnMut(RunKind, usize, usize) -> Control,
{
    fn on_sample(&mut self, kind: RunKind, sample: usize, total: usize) -> Control {
        self(kind, sample, total)
    }
}

/// Progress observer that never interrupts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn on_sample(&mut self, _kind: RunKind, _sample: usize, _total: usize) -> Control {
        Control::Continue
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunStatus {
    Completed,
    Cancelled {
        samples_completed: usize,
    },
    /// The run stopped at `(sample, timestep)`; that sample was discarded.
    Aborted {
        sample: usize,
        timestep: u32,
        reason: String,
    },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

#[derive(Clone, Debug)]
pub struct RunOutput {
    pub tables: ResultTables,
    pub moments: MomentTables,
    pub status: RunStatus,
}

#[derive(Clone, Debug)]
pub struct SteadyStateOutput {
    /// One initial-state record per size class.
    pub records: Vec<LitterRecord>,
    pub status: RunStatus,
}

pub struct SimulationEngine<'a> {
    scenario: &'a Scenario,
    ensemble: &'a ParameterEnsemble,
    model: Box<dyn DecompositionModel>,
}

impl<'a> SimulationEngine<'a> {
    pub fn new(
        scenario: &'a Scenario,
        ensemble: &'a ParameterEnsemble,
        model: Box<dyn DecompositionModel>,
    ) -> Self {
        Self {
            scenario,
            ensemble,
            model,
        }
    }

    /// Select the decomposition model named by the scenario's parameter set.
    pub fn for_parameter_set(
        scenario: &'a Scenario,
        ensemble: &'a ParameterEnsemble,
    ) -> EngineResult<Self> {
        let generation: ModelGeneration = scenario.run.parameter_set.parse()?;
        Ok(Self::new(scenario, ensemble, generation.model()))
    }

    fn invoker(&self) -> EngineResult<TransitionInvoker<'_>> {
        TransitionInvoker::new(
            self.model.as_ref(),
            self.ensemble,
            self.scenario.climate_source().duration(),
            self.scenario.effective_leaching(),
        )
    }

    /// Solve the equilibrium state for the scenario's litter input.
    ///
    /// Every sample draws its own parameter row and litter input; nothing is
    /// simulated on the calendar beyond the first year of the series.
    pub fn compute_steady_state(
        &self,
        progress: &mut dyn Progress,
    ) -> EngineResult<SteadyStateOutput> {
        self.scenario.validate()?;
        let invoker = self.invoker()?;
        let run = &self.scenario.run;
        let seed = self.scenario.run_seed();
        let (series, unit) = self.scenario.litter_series();
        let mut calendar = CalendarMapper::new(1, unit, series, &self.scenario.area_change);

        let (climate, _) = self.scenario.climate_source().summarize_timestep(
            &calendar,
            0,
            RunKind::SteadyState,
            ClimateCursor::default(),
        )?;
        let mut litter = match self.scenario.litter_mode {
            LitterMode::Zero => SizeClassSet::new(),
            LitterMode::ConstantYearly => merge_by_size_class(&self.scenario.constant_litter),
            LitterMode::Monthly | LitterMode::Yearly => {
                let indices = calendar.steady_state_indices();
                merge_by_size_class(indices.iter().map(|&i| &series[i].litter))
            }
        };
        let mut initial = SizeClassSet::new();
        pad_size_classes(&mut initial, &mut litter);

        info!(
            samples = run.sample_size,
            size_classes = initial.len(),
            parameter_set = %self.model.generation(),
            "computing steady state"
        );
        let mut collector = SteadyStateCollector::new();
        let mut status = RunStatus::Completed;
        for sample in 0..run.sample_size {
            if progress.on_sample(RunKind::SteadyState, sample, run.sample_size) != Control::Continue
            {
                warn!(sample, "steady state stopped before completion");
                status = RunStatus::Cancelled {
                    samples_completed: sample,
                };
                break;
            }
            let mut rng = Stream::from(seed, STEADY_STATE_STAGE, sample as u64);
            let mut phase = RunPhase::opening(RunKind::SteadyState, sample);
            let row = invoker.sample_row(phase, &mut rng.derive(stream_label("parameters")));
            let mut solved = SteadyStateCollector::new();
            for (size_class, start) in &initial {
                let input = litter.get(size_class).copied().unwrap_or(Composition::ZERO);
                let step = Step {
                    phase,
                    row,
                    size_class: size_class.value(),
                    initial: start,
                    litter: &input,
                    climate: &climate,
                    steady_state: true,
                };
                let transition = invoker.invoke(&step, &mut rng)?;
                solved.record(*size_class, transition.end_state);
                phase = phase.following();
            }
            debug!(sample, row, "steady state sample solved");
            collector.merge(solved);
        }

        Ok(SteadyStateOutput {
            records: collector.finish(),
            status,
        })
    }

    /// Simulate every sample over the scenario's timesteps starting from
    /// `initial`, then reduce the ensemble into moment tables.
    pub fn run_model(
        &self,
        initial: &[LitterRecord],
        progress: &mut dyn Progress,
    ) -> EngineResult<RunOutput> {
        self.scenario.validate()?;
        let invoker = self.invoker()?;
        let run = &self.scenario.run;
        let seed = self.scenario.run_seed();
        let (series, unit) = self.scenario.litter_series();
        let mut calendar =
            CalendarMapper::new(run.timestep_length, unit, series, &self.scenario.area_change);
        let start = merge_by_size_class(initial);

        info!(
            samples = run.sample_size,
            timesteps = run.simulation_length,
            parameter_set = %self.model.generation(),
            seed,
            "simulation started"
        );
        let mut tables = ResultTables::default();
        let mut status = RunStatus::Completed;
        for sample in 0..run.sample_size {
            match progress.on_sample(RunKind::Simulation, sample, run.sample_size) {
                Control::Continue => {}
                control => {
                    warn!(sample, ?control, "simulation stopped before completion");
                    status = RunStatus::Cancelled {
                        samples_completed: sample,
                    };
                    break;
                }
            }
            match self.simulate_sample(sample, seed, &invoker, &mut calendar, &start) {
                Ok(sample_tables) => {
                    debug!(sample, rows = sample_tables.stock.len(), "sample finished");
                    tables.merge(sample_tables);
                }
                Err(EngineError::CalendarOverflow { timestep }) => {
                    let reason = EngineError::CalendarOverflow { timestep }.to_string();
                    warn!(sample, timestep, "{reason}");
                    status = RunStatus::Aborted {
                        sample,
                        timestep,
                        reason,
                    };
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let moments = reduce(&tables);
        info!(stock_rows = tables.stock.len(), ?status, "simulation finished");
        Ok(RunOutput {
            tables,
            moments,
            status,
        })
    }

    /// Run the scenario as configured: solve the steady state first when the
    /// initial mode asks for it, then simulate.
    pub fn simulate(&self, progress: &mut dyn Progress) -> EngineResult<RunOutput> {
        match self.scenario.initial_mode {
            InitialMode::SteadyState => {
                let steady = self.compute_steady_state(progress)?;
                if !steady.status.is_completed() {
                    return Ok(RunOutput {
                        tables: ResultTables::default(),
                        moments: MomentTables::new(),
                        status: steady.status,
                    });
                }
                self.run_model(&steady.records, progress)
            }
            InitialMode::Zero | InitialMode::NonZero => {
                self.run_model(self.scenario.initial_records(), progress)
            }
        }
    }

    fn simulate_sample(
        &self,
        sample: usize,
        seed: u64,
        invoker: &TransitionInvoker<'_>,
        calendar: &mut CalendarMapper<'_>,
        start: &SizeClassSet,
    ) -> EngineResult<ResultTables> {
        let climate_source = self.scenario.climate_source();
        let mut rng = Stream::from(seed, SIMULATION_STAGE, sample as u64);
        let mut phase = RunPhase::opening(RunKind::Simulation, sample);
        let row = invoker.sample_row(phase, &mut rng.derive(stream_label("parameters")));
        let mut accumulator = ResultAccumulator::new(self.scenario.run.woody_size_limit);
        let mut cursor = ClimateCursor::default();
        let mut state = start.clone();

        for timestep in 0..self.scenario.run.simulation_length {
            let (climate, next_cursor) = climate_source.summarize_timestep(
                calendar,
                timestep,
                RunKind::Simulation,
                cursor,
            )?;
            cursor = next_cursor;
            let (mut litter, area_factor) = self.litter_at(calendar, timestep)?;
            pad_size_classes(&mut state, &mut litter);

            let mut carried = SizeClassSet::new();
            for (size_class, initial) in &state {
                let input = litter.get(size_class).copied().unwrap_or(Composition::ZERO);
                let step = Step {
                    phase,
                    row,
                    size_class: size_class.value(),
                    initial,
                    litter: &input,
                    climate: &climate,
                    steady_state: false,
                };
                let transition = invoker.invoke(&step, &mut rng)?;
                accumulator.record_inputs(&transition.initial, &transition.litter);
                if timestep == 0 {
                    accumulator.record_stock(sample, 0, step.size_class, &transition.initial);
                }
                accumulator.record_stock(sample, timestep + 1, step.size_class, &transition.end_state);
                carried.insert(
                    *size_class,
                    Composition::from_end_state(&transition.end_state, area_factor),
                );
                phase = phase.following();
            }
            accumulator.close_timestep(sample, timestep + 1);
            state = carried;
        }
        Ok(accumulator.into_tables())
    }

    /// Litter input for a timestep and the factor its area changes apply to
    /// the carried-over mass. Area changes only count for dated litter.
    fn litter_at(
        &self,
        calendar: &mut CalendarMapper<'_>,
        timestep: u32,
    ) -> EngineResult<(SizeClassSet, f64)> {
        let scenario = self.scenario;
        match scenario.litter_mode {
            LitterMode::Zero => Ok((SizeClassSet::new(), 1.0)),
            LitterMode::ConstantYearly => Ok((merge_by_size_class(&scenario.constant_litter), 1.0)),
            LitterMode::Monthly | LitterMode::Yearly => {
                let (series, _) = scenario.litter_series();
                let indices = calendar.indices(timestep)?;
                let litter = merge_by_size_class(indices.litter.iter().map(|&i| &series[i].litter));
                let area_factor: f64 = indices
                    .area
                    .iter()
                    .map(|&i| 1.0 + scenario.area_change[i].rel_change)
                    .product();
                Ok((litter, area_factor))
            }
        }
    }
}
