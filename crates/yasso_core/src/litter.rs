//! Litter and initial-state records and the size-class aggregation applied to
//! them before each transition.
//!
//! Chemical composition is carried as fractions of total mass in AWENH order
//! (acid hydrolyzable, water soluble, ethanol soluble, non-soluble, humus).
//! The water fraction is never drawn: it absorbs whatever mass the other four
//! components leave behind, so a drawn record always sums to its drawn mass.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rng::Stream;

/// Number of chemical pools tracked per size class.
pub const COMPONENTS: usize = 5;

/// Index of the water soluble pool, the mass-balance remainder.
pub const WATER: usize = 1;

/// Pool labels in storage order.
pub const COMPONENT_NAMES: [&str; COMPONENTS] =
    ["acid", "water", "ethanol", "non_soluble", "humus"];

/// Absolute masses per pool, AWENH order.
pub type Masses = [f64; COMPONENTS];

/// A mean with its standard deviation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub mean: f64,
    #[serde(default)]
    pub std: f64,
}

impl Estimate {
    pub const ZERO: Self = Self { mean: 0.0, std: 0.0 };

    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    pub fn exact(mean: f64) -> Self {
        Self { mean, std: 0.0 }
    }

    /// Draw a value when asked to randomize and the deviation is positive,
    /// otherwise return the mean.
    fn sample(&self, randomize: bool, rng: &mut Stream) -> f64 {
        if randomize && self.std > 0.0 {
            rng.gauss(self.mean, self.std)
        } else {
            self.mean
        }
    }
}

/// One litter (or initial state) entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LitterRecord {
    pub mass: Estimate,
    pub acid: Estimate,
    pub water: Estimate,
    pub ethanol: Estimate,
    pub non_soluble: Estimate,
    pub humus: Estimate,
    /// 0 for non-woody litter, otherwise the woody diameter in cm.
    #[serde(default)]
    pub size_class: f64,
}

impl LitterRecord {
    pub fn fractions(&self) -> [Estimate; COMPONENTS] {
        [
            self.acid,
            self.water,
            self.ethanol,
            self.non_soluble,
            self.humus,
        ]
    }

    pub fn from_parts(mass: Estimate, fractions: [Estimate; COMPONENTS], size_class: f64) -> Self {
        let [acid, water, ethanol, non_soluble, humus] = fractions;
        Self {
            mass,
            acid,
            water,
            ethanol,
            non_soluble,
            humus,
            size_class,
        }
    }
}

/// A litter record positioned in a monthly or yearly time series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedLitterRecord {
    /// Month or year ordinal; the first month/year of the series is 1.
    pub timestep: i32,
    #[serde(flatten)]
    pub litter: LitterRecord,
}

/// Relative change of the simulated area at a given month or year.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaChange {
    pub timestep: i32,
    pub rel_change: f64,
}

/// Size class key with a total order so it can index a `BTreeMap`.
#[derive(Clone, Copy, Debug)]
pub struct SizeClass(f64);

impl SizeClass {
    pub fn new(value: f64) -> Self {
        // collapse -0.0 onto 0.0 so both land on the non-woody key
        Self(if value == 0.0 { 0.0 } else { value })
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for SizeClass {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SizeClass {}

impl PartialOrd for SizeClass {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SizeClass {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Merged description of one size class: total mass and mass-weighted
/// fractional composition, each with a standard deviation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Composition {
    pub mass: Estimate,
    pub fractions: [Estimate; COMPONENTS],
}

/// One merged composition per size class, iterated in ascending class order.
pub type SizeClassSet = BTreeMap<SizeClass, Composition>;

impl Composition {
    pub const ZERO: Self = Self {
        mass: Estimate::ZERO,
        fractions: [Estimate::ZERO; COMPONENTS],
    };

    /// Re-express an end state as the next timestep's initial condition.
    ///
    /// Fractions are taken relative to the end-state total (divisor 1 when the
    /// total is not positive), deviations are zero, and the carried mass is
    /// scaled by `area_factor`.
    pub fn from_end_state(end_state: &Masses, area_factor: f64) -> Self {
        let mass: f64 = end_state.iter().sum();
        let divisor = if mass > 0.0 { mass } else { 1.0 };
        let mut fractions = [Estimate::ZERO; COMPONENTS];
        for (fraction, value) in fractions.iter_mut().zip(end_state) {
            *fraction = Estimate::exact(value / divisor);
        }
        Self {
            mass: Estimate::exact(mass * area_factor),
            fractions,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Turn a composition into absolute pool masses.
///
/// Mass is drawn first, then every non-water fraction is drawn and multiplied
/// by the drawn mass. Water receives the remainder. With `randomize == false`
/// (or zero deviations) the means are used and no randomness is consumed.
pub fn draw_from_distribution(
    composition: &Composition,
    randomize: bool,
    rng: &mut Stream,
) -> Masses {
    let mass = composition.mass.sample(randomize, rng);
    let mut masses = [0.0; COMPONENTS];
    let mut remaining = mass;
    for (index, fraction) in composition.fractions.iter().enumerate() {
        if index == WATER {
            continue;
        }
        let component = mass * fraction.sample(randomize, rng);
        masses[index] = component;
        remaining -= component;
    }
    masses[WATER] = remaining;
    masses
}

/// Merge records into one composition per size class.
///
/// Fractions and deviations are mass-weighted averages and masses are summed.
/// A size class whose total mass is not positive yields an all-zero entry.
pub fn merge_by_size_class<'a, I>(records: I) -> SizeClassSet
where
    I: IntoIterator<Item = &'a LitterRecord>,
{
    #[derive(Default)]
    struct Sums {
        mass: f64,
        mass_std: f64,
        fractions: [f64; COMPONENTS],
        fraction_stds: [f64; COMPONENTS],
    }

    let mut grouped: BTreeMap<SizeClass, Sums> = BTreeMap::new();
    for record in records {
        let sums = grouped.entry(SizeClass::new(record.size_class)).or_default();
        let mass = record.mass.mean;
        sums.mass += mass;
        sums.mass_std += mass * record.mass.std;
        for (index, fraction) in record.fractions().iter().enumerate() {
            sums.fractions[index] += mass * fraction.mean;
            sums.fraction_stds[index] += mass * fraction.std;
        }
    }

    grouped
        .into_iter()
        .map(|(size_class, sums)| {
            if sums.mass <= 0.0 {
                return (size_class, Composition::ZERO);
            }
            let m = sums.mass;
            let mut fractions = [Estimate::ZERO; COMPONENTS];
            for (index, fraction) in fractions.iter_mut().enumerate() {
                *fraction = Estimate::new(sums.fractions[index] / m, sums.fraction_stds[index] / m);
            }
            let composition = Composition {
                mass: Estimate::new(m, sums.mass_std / m),
                fractions,
            };
            (size_class, composition)
        })
        .collect()
}

/// Give both sets the same size classes, inserting zero compositions where a
/// class is missing on one side.
pub fn pad_size_classes(initial: &mut SizeClassSet, litter: &mut SizeClassSet) {
    for size_class in initial.keys() {
        litter.entry(*size_class).or_insert(Composition::ZERO);
    }
    for size_class in litter.keys() {
        initial.entry(*size_class).or_insert(Composition::ZERO);
    }
}
