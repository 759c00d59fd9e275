//! AWENH pool decomposition shared by the Yasso07, Yasso15 and Yasso20
//! parameter generations.
//!
//! Pools evolve as `x' = A x + b`, where `b` is the annual litter input and
//! `A` holds climate- and size-modified decomposition rates on the diagonal
//! and mass flows between pools off the diagonal. Generations differ only in
//! how the climate modifiers are read from the parameter row.

use super::linalg::{self, Matrix};
use super::{DecompositionModel, ModelGeneration, TransitionInput};
use crate::climate::Temperature;
use crate::error::{EngineError, EngineResult};
use crate::litter::Masses;
use crate::params::PARAMETER_COUNT;

/// Number of non-humus pools (A, W, E, N).
const AWEN: usize = 4;
const NON_SOLUBLE: usize = 3;
const HUMUS: usize = 4;

// Zero-based offsets into the parameter row.
const RATES: usize = 0;
const TRANSFERS: usize = 4;
const HUMUS_FORMATION: usize = 30;
const HUMUS_RATE: usize = 31;
const SIZE_LINEAR: usize = 32;
const SIZE_QUADRATIC: usize = 33;
const SIZE_EXPONENT: usize = 34;

/// Modifiers at or below this value mean nothing decomposes.
const DORMANT: f64 = 1e-16;

#[derive(Clone, Copy, Debug, PartialEq)]
struct ClimateResponse {
    beta1: f64,
    beta2: f64,
    gamma: f64,
}

impl ClimateResponse {
    fn at(p: &[f64], beta1: usize, beta2: usize, gamma: usize) -> Self {
        Self {
            beta1: p[beta1],
            beta2: p[beta2],
            gamma: p[gamma],
        }
    }

    /// Mean temperature response over the profile times the drought factor.
    fn modifier(&self, temperature: &Temperature, rainfall: f64) -> f64 {
        let values = temperature.values();
        let warmth = values
            .iter()
            .map(|t| (self.beta1 * t + self.beta2 * t * t).exp())
            .sum::<f64>()
            / values.len() as f64;
        warmth * (1.0 - (self.gamma * rainfall / 1000.0).exp())
    }
}

/// Climate modifiers for the acid/water/ethanol pools, the non-soluble pool
/// and humus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Modifiers {
    pub awe: f64,
    pub non_soluble: f64,
    pub humus: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct Yasso {
    generation: ModelGeneration,
}

impl Yasso {
    pub fn new(generation: ModelGeneration) -> Self {
        Self { generation }
    }

    fn responses(&self, p: &[f64]) -> [ClimateResponse; 3] {
        match self.generation {
            ModelGeneration::Yasso07 => [ClimateResponse::at(p, 21, 22, 23); 3],
            ModelGeneration::Yasso15 => [
                ClimateResponse::at(p, 21, 22, 23),
                ClimateResponse::at(p, 24, 25, 26),
                ClimateResponse::at(p, 27, 28, 29),
            ],
            ModelGeneration::Yasso20 => [
                ClimateResponse::at(p, 21, 22, 27),
                ClimateResponse::at(p, 23, 24, 28),
                ClimateResponse::at(p, 25, 26, 29),
            ],
        }
    }

    pub fn modifiers(&self, p: &[f64], temperature: &Temperature, rainfall: f64) -> Modifiers {
        let [awe, non_soluble, humus] = self
            .responses(p)
            .map(|response| response.modifier(temperature, rainfall));
        Modifiers {
            awe,
            non_soluble,
            humus,
        }
    }

    /// Assemble the rate matrix `A`.
    pub fn kinetics(
        &self,
        p: &[f64],
        modifiers: &Modifiers,
        size_class: f64,
        leaching: f64,
        rainfall: f64,
    ) -> Matrix {
        let size = size_dependence(p, size_class);
        let mut a = Matrix::zeros();
        for pool in 0..AWEN {
            let climate = if pool == NON_SOLUBLE {
                modifiers.non_soluble
            } else {
                modifiers.awe
            };
            a[(pool, pool)] = -p[RATES + pool].abs() * climate * size;
        }

        // transfer fractions, row-major over the off-diagonal AWEN entries
        let mut transfer = TRANSFERS;
        for to in 0..AWEN {
            for from in 0..AWEN {
                if to == from {
                    continue;
                }
                a[(to, from)] = p[transfer] * a[(from, from)].abs();
                transfer += 1;
            }
        }

        for from in 0..AWEN {
            a[(HUMUS, from)] = p[HUMUS_FORMATION] * a[(from, from)].abs();
        }
        a[(HUMUS, HUMUS)] = -p[HUMUS_RATE].abs() * modifiers.humus;

        for pool in 0..AWEN {
            a[(pool, pool)] += leaching * rainfall / 1000.0;
        }
        a
    }
}

/// Slow-down of woody litter with diameter `size_class` (cm), capped at 1.
pub fn size_dependence(p: &[f64], size_class: f64) -> f64 {
    let d = size_class;
    let base = 1.0 + p[SIZE_LINEAR] * d + p[SIZE_QUADRATIC] * d * d;
    base.powf(-p[SIZE_EXPONENT].abs()).min(1.0)
}

impl DecompositionModel for Yasso {
    fn generation(&self) -> ModelGeneration {
        self.generation
    }

    fn end_state(&self, input: &TransitionInput<'_>) -> EngineResult<Masses> {
        let p = input.parameters;
        if p.len() != PARAMETER_COUNT {
            return Err(EngineError::ParameterWidth {
                found: p.len(),
                expected: PARAMETER_COUNT,
            });
        }
        let singular = || EngineError::SingularSystem {
            size_class: input.size_class,
        };

        let modifiers = self.modifiers(p, input.temperature, input.rainfall);
        if modifiers.awe <= DORMANT {
            return Ok(accumulate(input.initial, input.litter, input.duration));
        }

        let a = self.kinetics(
            p,
            &modifiers,
            input.size_class,
            input.leaching,
            input.rainfall,
        );
        let litter = linalg::vector(input.litter);
        let end = if input.steady_state {
            linalg::equilibrium(&a, &litter)
        } else {
            linalg::propagate(&a, &linalg::vector(input.initial), &litter, input.duration)
        };
        end.map(|state| linalg::masses(&state)).ok_or_else(singular)
    }
}

/// Pools that only receive input over `duration` years.
fn accumulate(initial: &Masses, litter: &Masses, duration: f64) -> Masses {
    let mut end = *initial;
    for (pool, b) in end.iter_mut().zip(litter) {
        *pool += b * duration;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterEnsemble;

    fn fitted() -> Vec<f64> {
        let text = include_str!("../../data/yasso15_demo.dat");
        let ensemble = ParameterEnsemble::from_reader(text.as_bytes()).unwrap();
        ensemble.maximum_likelihood().to_vec()
    }

    fn seasonal() -> Temperature {
        Temperature::Monthly([
            -8.0, -7.5, -3.0, 2.5, 8.5, 13.0, 16.0, 14.5, 9.5, 4.0, -1.5, -6.0,
        ])
    }

    fn total(masses: &Masses) -> f64 {
        masses.iter().sum()
    }

    fn run(
        generation: ModelGeneration,
        p: &[f64],
        initial: &Masses,
        litter: &Masses,
        size_class: f64,
        steady_state: bool,
    ) -> Masses {
        let temperature = seasonal();
        let input = TransitionInput {
            parameters: p,
            duration: 1.0,
            temperature: &temperature,
            rainfall: 600.0,
            initial,
            litter,
            size_class,
            leaching: 0.0,
            steady_state,
        };
        Yasso::new(generation).end_state(&input).unwrap()
    }

    #[test]
    fn steady_state_is_a_fixed_point() {
        let p = fitted();
        let litter = [40.0, 10.0, 5.0, 45.0, 0.0];
        let equilibrium = run(ModelGeneration::Yasso15, &p, &[0.0; 5], &litter, 0.0, true);
        assert!(equilibrium.iter().all(|x| *x > 0.0));
        let next = run(ModelGeneration::Yasso15, &p, &equilibrium, &litter, 0.0, false);
        for (a, b) in next.iter().zip(&equilibrium) {
            assert!((a - b).abs() <= 1e-6 * b.abs().max(1.0), "{a} vs {b}");
        }
    }

    #[test]
    fn decay_without_input_loses_mass() {
        let p = fitted();
        let initial = [30.0, 20.0, 10.0, 30.0, 10.0];
        let end = run(ModelGeneration::Yasso15, &p, &initial, &[0.0; 5], 0.0, false);
        assert!(total(&end) < total(&initial));
        assert!(end.iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn woody_litter_decays_slower() {
        let p = fitted();
        let initial = [60.0, 5.0, 5.0, 30.0, 0.0];
        let fine = run(ModelGeneration::Yasso15, &p, &initial, &[0.0; 5], 0.0, false);
        let coarse = run(ModelGeneration::Yasso15, &p, &initial, &[0.0; 5], 10.0, false);
        assert!(total(&coarse) > total(&fine));
        assert!(size_dependence(&p, 10.0) < 1.0);
        assert_eq!(size_dependence(&p, 0.0), 1.0);
    }

    #[test]
    fn dry_climate_only_accumulates() {
        let p = fitted();
        let temperature = seasonal();
        let initial = [1.0, 2.0, 3.0, 4.0, 5.0];
        let litter = [10.0, 0.0, 0.0, 5.0, 0.0];
        let input = TransitionInput {
            parameters: &p,
            duration: 0.5,
            temperature: &temperature,
            rainfall: 0.0,
            initial: &initial,
            litter: &litter,
            size_class: 0.0,
            leaching: 0.0,
            steady_state: false,
        };
        let end = Yasso::new(ModelGeneration::Yasso15).end_state(&input).unwrap();
        assert_eq!(end, [6.0, 2.0, 3.0, 6.5, 5.0]);
    }

    #[test]
    fn leaching_removes_extra_mass() {
        let p = fitted();
        let temperature = seasonal();
        let initial = [30.0, 20.0, 10.0, 30.0, 10.0];
        let mut input = TransitionInput {
            parameters: &p,
            duration: 1.0,
            temperature: &temperature,
            rainfall: 600.0,
            initial: &initial,
            litter: &[0.0; 5],
            size_class: 0.0,
            leaching: 0.0,
            steady_state: false,
        };
        let model = Yasso::new(ModelGeneration::Yasso15);
        let kept = model.end_state(&input).unwrap();
        input.leaching = -0.001;
        let leached = model.end_state(&input).unwrap();
        assert!(total(&leached) < total(&kept));
    }

    #[test]
    fn generations_read_different_climate_columns() {
        let p = fitted();
        let initial = [10.0, 10.0, 10.0, 60.0, 10.0];
        let y07 = run(ModelGeneration::Yasso07, &p, &initial, &[0.0; 5], 0.0, false);
        let y15 = run(ModelGeneration::Yasso15, &p, &initial, &[0.0; 5], 0.0, false);
        assert_ne!(y07[NON_SOLUBLE], y15[NON_SOLUBLE]);
    }

    #[test]
    fn yasso20_layout_matches_yasso15_when_columns_are_permuted() {
        let p15 = fitted();
        let mut p20 = p15.clone();
        // Yasso15: b1 b2 g | bN1 bN2 gN | bH1 bH2 gH
        // Yasso20: b1 b2 bN1 bN2 bH1 bH2 | g gN gH
        let order = [21, 22, 24, 25, 27, 28, 23, 26, 29];
        for (slot, source) in (21..30).zip(order) {
            p20[slot] = p15[source];
        }
        let initial = [10.0, 10.0, 10.0, 60.0, 10.0];
        let litter = [5.0, 1.0, 1.0, 3.0, 0.0];
        let y15 = run(ModelGeneration::Yasso15, &p15, &initial, &litter, 2.0, false);
        let y20 = run(ModelGeneration::Yasso20, &p20, &initial, &litter, 2.0, false);
        assert_eq!(y15, y20);
    }

    #[test]
    fn short_parameter_row_is_rejected() {
        let temperature = Temperature::Annual(5.0);
        let input = TransitionInput {
            parameters: &[0.5; 10],
            duration: 1.0,
            temperature: &temperature,
            rainfall: 500.0,
            initial: &[0.0; 5],
            litter: &[1.0; 5],
            size_class: 0.0,
            leaching: 0.0,
            steady_state: false,
        };
        let err = Yasso::new(ModelGeneration::Yasso07).end_state(&input).unwrap_err();
        assert!(matches!(err, EngineError::ParameterWidth { found: 10, .. }));
    }
}
