//! One decomposition step for one size class: draw inputs according to the
//! run phase, call the decomposition model, hand back owned vectors.

use crate::climate::ClimateSummary;
use crate::error::EngineResult;
use crate::kernels::{DecompositionModel, TransitionInput};
use crate::litter::{draw_from_distribution, Composition, Masses};
use crate::params::ParameterEnsemble;
use crate::phase::RunPhase;
use crate::rng::Stream;

/// Drawn inputs and the resulting end state of one transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub initial: Masses,
    pub litter: Masses,
    pub end_state: Masses,
}

/// One size class at one timestep.
#[derive(Clone, Copy, Debug)]
pub struct Step<'a> {
    pub phase: RunPhase,
    /// Parameter row held by the current sample.
    pub row: usize,
    pub size_class: f64,
    pub initial: &'a Composition,
    pub litter: &'a Composition,
    pub climate: &'a ClimateSummary,
    pub steady_state: bool,
}

pub struct TransitionInvoker<'a> {
    model: &'a dyn DecompositionModel,
    ensemble: &'a ParameterEnsemble,
    duration: f64,
    leaching: f64,
}

impl<'a> TransitionInvoker<'a> {
    /// Fails when the ensemble rows do not have the width every model needs.
    pub fn new(
        model: &'a dyn DecompositionModel,
        ensemble: &'a ParameterEnsemble,
        duration: f64,
        leaching: f64,
    ) -> EngineResult<Self> {
        ensemble.require_usable()?;
        Ok(Self {
            model,
            ensemble,
            duration,
            leaching,
        })
    }

    /// Row a sample opening in `phase` keeps for all of its transitions.
    pub fn sample_row(&self, phase: RunPhase, rng: &mut Stream) -> usize {
        match phase {
            RunPhase::MaximumLikelihood => 0,
            RunPhase::Draw | RunPhase::Continuation => self.ensemble.draw_index(rng),
        }
    }

    pub fn invoke(&self, step: &Step<'_>, rng: &mut Stream) -> EngineResult<Transition> {
        let initial = draw_from_distribution(step.initial, step.phase.randomizes_initial(), rng);
        let litter = draw_from_distribution(step.litter, step.phase.randomizes_litter(), rng);
        let input = TransitionInput {
            parameters: self.ensemble.row(step.row),
            duration: self.duration,
            temperature: &step.climate.temperature,
            rainfall: step.climate.rainfall,
            initial: &initial,
            litter: &litter,
            size_class: step.size_class,
            leaching: self.leaching,
            steady_state: step.steady_state,
        };
        let end_state = self.model.end_state(&input)?;
        Ok(Transition {
            initial,
            litter,
            end_state,
        })
    }
}
