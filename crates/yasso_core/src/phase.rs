//! Run-phase values threaded through sampling, climate aggregation and
//! transition invocation.

/// Which kind of ensemble is being advanced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunKind {
    /// Multi-timestep simulation over the calendar.
    Simulation,
    /// Single equilibrium solve per sample.
    SteadyState,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Simulation => "simulation",
            RunKind::SteadyState => "steady_state",
        }
    }
}

/// Position of a transition inside the sample/timestep loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Sample 0 of a simulation: maximum-likelihood parameters, mean inputs.
    MaximumLikelihood,
    /// First transition of any other sample: a fresh parameter row is drawn.
    Draw,
    /// Later transitions of a drawn sample: the row drawn in `Draw` is kept.
    Continuation,
}

impl RunPhase {
    /// Phase of the first transition of `sample`.
    pub fn opening(kind: RunKind, sample: usize) -> Self {
        match kind {
            RunKind::Simulation if sample == 0 => RunPhase::MaximumLikelihood,
            _ => RunPhase::Draw,
        }
    }

    /// Phase of every transition after the first one of the same sample.
    pub fn following(self) -> Self {
        match self {
            RunPhase::MaximumLikelihood => RunPhase::MaximumLikelihood,
            RunPhase::Draw | RunPhase::Continuation => RunPhase::Continuation,
        }
    }

    /// Whether litter input is drawn from its distribution.
    pub fn randomizes_litter(self) -> bool {
        !matches!(self, RunPhase::MaximumLikelihood)
    }

    /// Whether the initial state is drawn from its distribution. Never: only
    /// litter input carries sampling noise into the ensemble.
    pub fn randomizes_initial(self) -> bool {
        false
    }
}
