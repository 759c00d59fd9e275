//! Calendar arithmetic for timesteps and time-series records.
//!
//! Timestep `k` of a run with a timestep length of `L` years covers
//! `[Jan 1 of year 2 + k·L, Dec 31 of year 2 + (k+1)·L − 1]`. Series records
//! carry a month or year ordinal where ordinal 1 is the first month/year of
//! the epoch, so month `t` lands on the first day of month `t` of year 2 and
//! year `t` on Jan 1 of year `1 + t`.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::error::{EngineError, EngineResult};
use crate::litter::{AreaChange, TimedLitterRecord};

/// Calendar year of the first timestep.
pub const EPOCH_YEAR: i32 = 2;

/// Date range covered by one timestep, both ends inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar years touched by the period.
    pub fn year_count(&self) -> usize {
        (self.end.year() - self.start.year() + 1).max(1) as usize
    }

    /// Whether the period closes on the last day of a year.
    pub fn ends_on_year_end(&self) -> bool {
        self.end.month() == 12 && self.end.day() == 31
    }
}

/// Map a timestep ordinal onto its date range.
///
/// Returns [`EngineError::CalendarOverflow`] when either end falls outside
/// what the date library can represent.
pub fn timestep_period(timestep: u32, length_years: u32) -> EngineResult<Period> {
    let overflow = || EngineError::CalendarOverflow { timestep };
    let offset = i32::try_from(timestep)
        .ok()
        .and_then(|ts| ts.checked_mul(i32::try_from(length_years).ok()?))
        .ok_or_else(overflow)?;
    let start_year = EPOCH_YEAR.checked_add(offset).ok_or_else(overflow)?;
    let next_year = i32::try_from(length_years)
        .ok()
        .and_then(|length| start_year.checked_add(length))
        .ok_or_else(overflow)?;
    let start = NaiveDate::from_ymd_opt(start_year, 1, 1).ok_or_else(overflow)?;
    let end = NaiveDate::from_ymd_opt(next_year, 1, 1)
        .and_then(|next| next.pred_opt())
        .ok_or_else(overflow)?;
    Ok(Period { start, end })
}

/// Granularity of a time series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesUnit {
    Month,
    Year,
}

impl SeriesUnit {
    /// Nominal date of a series record, `None` when unrepresentable.
    pub fn nominal_date(self, tag: i32) -> Option<NaiveDate> {
        match self {
            SeriesUnit::Year => {
                let year = (EPOCH_YEAR - 1).checked_add(tag)?;
                NaiveDate::from_ymd_opt(year, 1, 1)
            }
            SeriesUnit::Month => {
                // zero-based month count of Dec, year EPOCH_YEAR - 1, plus tag
                let months = ((EPOCH_YEAR - 1) * 12 + 11).checked_add(tag)?;
                let year = months.div_euclid(12);
                let month = months.rem_euclid(12) as u32 + 1;
                NaiveDate::from_ymd_opt(year, month, 1)
            }
        }
    }
}

/// Series indices that fall inside one timestep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimestepIndices {
    pub litter: Vec<usize>,
    pub area: Vec<usize>,
}

/// Maps litter and area-change series onto timesteps, memoised per timestep.
pub struct CalendarMapper<'a> {
    length_years: u32,
    unit: SeriesUnit,
    litter: &'a [TimedLitterRecord],
    area: &'a [AreaChange],
    cache: HashMap<u32, TimestepIndices>,
    steady_state: Option<Vec<usize>>,
}

impl<'a> CalendarMapper<'a> {
    pub fn new(
        length_years: u32,
        unit: SeriesUnit,
        litter: &'a [TimedLitterRecord],
        area: &'a [AreaChange],
    ) -> Self {
        Self {
            length_years,
            unit,
            litter,
            area,
            cache: HashMap::new(),
            steady_state: None,
        }
    }

    pub fn period(&self, timestep: u32) -> EngineResult<Period> {
        timestep_period(timestep, self.length_years)
    }

    /// Records whose nominal date falls inside the timestep.
    ///
    /// Only direct containment counts: a series shorter than the run leaves
    /// later timesteps empty.
    pub fn indices(&mut self, timestep: u32) -> EngineResult<&TimestepIndices> {
        if !self.cache.contains_key(&timestep) {
            let period = self.period(timestep)?;
            let unit = self.unit;
            let litter = contained(self.litter.iter().map(|r| r.timestep), unit, &period);
            let area = contained(self.area.iter().map(|r| r.timestep), unit, &period);
            self.cache.insert(timestep, TimestepIndices { litter, area });
        }
        Ok(&self.cache[&timestep])
    }

    /// Records used for the steady-state solve: months 1–12 of a monthly
    /// series, or year 0 of a yearly series (year 1 if there is no year 0).
    pub fn steady_state_indices(&mut self) -> &[usize] {
        let unit = self.unit;
        let litter = self.litter;
        self.steady_state.get_or_insert_with(|| match unit {
            SeriesUnit::Month => tagged(litter, |tag| (1..=12).contains(&tag)),
            SeriesUnit::Year => {
                let first = tagged(litter, |tag| tag == 0);
                if first.is_empty() {
                    tagged(litter, |tag| tag == 1)
                } else {
                    first
                }
            }
        })
    }
}

fn contained<I>(tags: I, unit: SeriesUnit, period: &Period) -> Vec<usize>
where
    I: Iterator<Item = i32>,
{
    tags.enumerate()
        .filter(|(_, tag)| {
            unit.nominal_date(*tag)
                .map(|date| period.contains(date))
                .unwrap_or(false)
        })
        .map(|(index, _)| index)
        .collect()
}

fn tagged<F>(records: &[TimedLitterRecord], keep: F) -> Vec<usize>
where
    F: Fn(i32) -> bool,
{
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| keep(record.timestep))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::litter::{Estimate, LitterRecord};

    fn timed(tag: i32) -> TimedLitterRecord {
        TimedLitterRecord {
            timestep: tag,
            litter: LitterRecord::from_parts(
                Estimate::exact(1.0),
                [Estimate::exact(0.2); 5],
                0.0,
            ),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_timestep_is_epoch_year() {
        let period = timestep_period(0, 1).unwrap();
        assert_eq!(period.start, date(2, 1, 1));
        assert_eq!(period.end, date(2, 12, 31));
        assert!(period.ends_on_year_end());
        assert_eq!(period.year_count(), 1);
    }

    #[test]
    fn multi_year_timesteps_advance_by_length() {
        let period = timestep_period(3, 2).unwrap();
        assert_eq!(period.start, date(8, 1, 1));
        assert_eq!(period.end, date(9, 12, 31));
        assert_eq!(period.year_count(), 2);
    }

    #[test]
    fn far_future_timestep_overflows() {
        let err = timestep_period(300_000, 1).unwrap_err();
        assert!(matches!(err, EngineError::CalendarOverflow { timestep: 300_000 }));
        assert!(timestep_period(u32::MAX, 1).is_err());
    }

    #[test]
    fn nominal_dates_follow_ordinals() {
        assert_eq!(SeriesUnit::Year.nominal_date(1), Some(date(2, 1, 1)));
        assert_eq!(SeriesUnit::Year.nominal_date(0), Some(date(1, 1, 1)));
        assert_eq!(SeriesUnit::Month.nominal_date(1), Some(date(2, 1, 1)));
        assert_eq!(SeriesUnit::Month.nominal_date(12), Some(date(2, 12, 1)));
        assert_eq!(SeriesUnit::Month.nominal_date(13), Some(date(3, 1, 1)));
        assert_eq!(SeriesUnit::Month.nominal_date(0), Some(date(1, 12, 1)));
    }

    #[test]
    fn yearly_series_has_no_wraparound() {
        let litter: Vec<_> = [1, 2, 3].into_iter().map(timed).collect();
        let mut mapper = CalendarMapper::new(1, SeriesUnit::Year, &litter, &[]);
        assert_eq!(mapper.indices(0).unwrap().litter, vec![0]);
        assert_eq!(mapper.indices(2).unwrap().litter, vec![2]);
        assert!(mapper.indices(3).unwrap().litter.is_empty());
    }

    #[test]
    fn monthly_series_groups_by_year() {
        let litter: Vec<_> = (1..=24).map(timed).collect();
        let mut mapper = CalendarMapper::new(1, SeriesUnit::Month, &litter, &[]);
        assert_eq!(mapper.indices(0).unwrap().litter, (0..12).collect::<Vec<_>>());
        assert_eq!(mapper.indices(1).unwrap().litter, (12..24).collect::<Vec<_>>());
    }

    #[test]
    fn area_changes_use_series_unit() {
        let area = vec![
            AreaChange { timestep: 2, rel_change: -0.1 },
            AreaChange { timestep: 3, rel_change: 0.2 },
        ];
        let mut mapper = CalendarMapper::new(2, SeriesUnit::Year, &[], &area);
        let indices = mapper.indices(1).unwrap();
        assert!(indices.litter.is_empty());
        assert_eq!(indices.area, vec![1]);
        assert_eq!(mapper.indices(0).unwrap().area, vec![0]);
    }

    #[test]
    fn overflowing_timestep_is_not_cached() {
        let litter: Vec<_> = [1].into_iter().map(timed).collect();
        let mut mapper = CalendarMapper::new(1, SeriesUnit::Year, &litter, &[]);
        assert!(mapper.indices(300_000).is_err());
        assert!(mapper.indices(300_000).is_err());
    }

    #[test]
    fn steady_state_prefers_year_zero() {
        let litter: Vec<_> = [1, 0, 2].into_iter().map(timed).collect();
        let mut mapper = CalendarMapper::new(1, SeriesUnit::Year, &litter, &[]);
        assert_eq!(mapper.steady_state_indices(), &[1]);

        let without_zero: Vec<_> = [2, 1, 1].into_iter().map(timed).collect();
        let mut mapper = CalendarMapper::new(1, SeriesUnit::Year, &without_zero, &[]);
        assert_eq!(mapper.steady_state_indices(), &[1, 2]);
    }

    #[test]
    fn steady_state_takes_first_twelve_months() {
        let litter: Vec<_> = (0..=14).map(timed).collect();
        let mut mapper = CalendarMapper::new(5, SeriesUnit::Month, &litter, &[]);
        assert_eq!(mapper.steady_state_indices(), (1..=12).collect::<Vec<_>>().as_slice());
    }
}
