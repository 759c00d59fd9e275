pub mod calendar;
pub mod climate;
pub mod engine;
pub mod error;
pub mod io;
pub mod kernels;
pub mod litter;
pub mod moments;
pub mod params;
pub mod phase;
pub mod results;
pub mod rng;
pub mod scenario;
pub mod steady;
pub mod transition;

pub use engine::{Control, NoProgress, Progress, RunOutput, RunStatus, SimulationEngine};
pub use error::{EngineError, EngineResult};
pub use params::ParameterEnsemble;
pub use scenario::Scenario;
