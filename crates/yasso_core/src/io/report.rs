//! Plain-text export of raw and moment result tables.
//!
//! Every file opens with a `#` block describing the run, followed by a `#`
//! column line and whitespace-separated rows.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::moments::{MomentTables, Quantity};
use crate::results::{MassTable, ResultTables};
use crate::scenario::Scenario;

const RULE: &str = "#########################################################";

const COMPONENT_LABELS: [&str; 8] = [
    "tom",
    "woody",
    "non-woody",
    "acid",
    "water",
    "ethanol",
    "non-soluble",
    "humus",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    #[default]
    Stock,
    Change,
    Co2,
}

impl ResultType {
    pub fn label(self) -> &'static str {
        match self {
            ResultType::Stock => "C stock",
            ResultType::Change => "C change",
            ResultType::Co2 => "CO2 production",
        }
    }

    fn raw_columns(self) -> &'static str {
        match self {
            ResultType::Stock | ResultType::Change => {
                "# sample, time step, total om, woody om, non-woody om, acid, water, ethanol, non-soluble, humus"
            }
            ResultType::Co2 => "# sample, time step, CO2 production (in carbon)",
        }
    }

    /// Moment quantities exported for this result type, paired with their
    /// row prefix.
    fn components(self) -> Vec<(Quantity, &'static str)> {
        let offset = match self {
            ResultType::Stock => Quantity::StockTotal as usize,
            ResultType::Change => Quantity::ChangeTotal as usize,
            ResultType::Co2 => return vec![(Quantity::Co2, "CO2")],
        };
        COMPONENT_LABELS
            .iter()
            .enumerate()
            .map(|(column, label)| (Quantity::ALL[offset + column], *label))
            .collect()
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResultType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "stock" | "C stock" => Ok(ResultType::Stock),
            "change" | "C change" => Ok(ResultType::Change),
            "co2" | "CO2 production" => Ok(ResultType::Co2),
            other => Err(format!("unknown result type {other:?}")),
        }
    }
}

/// Write the run description block. `datafile` names the parameter file the
/// run used.
pub fn write_header<W: Write>(
    out: &mut W,
    result_type: ResultType,
    scenario: &Scenario,
    datafile: &str,
) -> io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "# {}", result_type.label())?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "# Scenario: {}", scenario.name)?;
    writeln!(out, "# Datafile used: {datafile}")?;
    writeln!(out, "# Settings:")?;
    writeln!(out, "#   parameter set: {}", scenario.run.parameter_set)?;
    writeln!(out, "#   initial state: {}", scenario.initial_mode.as_str())?;
    writeln!(out, "#   soil carbon input: {}", scenario.litter_mode.as_str())?;
    writeln!(out, "#   climate: {}", scenario.climate_mode.as_str())?;
    writeln!(out, "#   sample size: {}", scenario.run.sample_size)?;
    writeln!(out, "#   timestep length: {}", scenario.run.timestep_length)?;
    writeln!(
        out,
        "#   woody litter size limit: {}",
        scenario.run.woody_size_limit
    )?;
    writeln!(out, "#")
}

/// Export one raw table: `sample timestep values...` per row.
pub fn write_raw<W: Write>(
    out: &mut W,
    result_type: ResultType,
    scenario: &Scenario,
    datafile: &str,
    tables: &ResultTables,
) -> io::Result<()> {
    write_header(out, result_type, scenario, datafile)?;
    writeln!(out, "{}", result_type.raw_columns())?;
    match result_type {
        ResultType::Stock => write_mass_rows(out, &tables.stock),
        ResultType::Change => write_mass_rows(out, &tables.change),
        ResultType::Co2 => {
            for row in tables.co2.rows() {
                writeln!(out, "{} {} {}", row.sample, row.timestep, row.co2)?;
            }
            Ok(())
        }
    }
}

fn write_mass_rows<W: Write>(out: &mut W, table: &MassTable) -> io::Result<()> {
    for row in table.rows() {
        write!(out, "{} {}", row.sample, row.timestep)?;
        for value in row.values() {
            write!(out, " {value}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Export the moment rows of every component of `result_type`, each row
/// prefixed by its component name.
pub fn write_moments<W: Write>(
    out: &mut W,
    result_type: ResultType,
    scenario: &Scenario,
    datafile: &str,
    moments: &MomentTables,
) -> io::Result<()> {
    write_header(out, result_type, scenario, datafile)?;
    writeln!(
        out,
        "# component, time step, mean, mode, var, skewness, kurtosis, 95% confidence lower limit, 95% upper limit"
    )?;
    for (quantity, label) in result_type.components() {
        let Some(rows) = moments.get(&quantity) else {
            continue;
        };
        for row in rows {
            write!(out, "{label} {}", row.timestep)?;
            for value in row.values() {
                write!(out, " {value}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moments::reduce;
    use crate::results::{Co2Row, MassRow};

    fn scenario() -> Scenario {
        Scenario {
            name: "plot 7".into(),
            ..Scenario::default()
        }
    }

    fn tables() -> ResultTables {
        let mut tables = ResultTables::default();
        for sample in 0..2 {
            let pools = [1.0, 2.0, 3.0, 4.0, 5.0 + sample as f64];
            tables
                .stock
                .upsert(MassRow::classify(sample, 0, 0.0, 3.0, &pools));
            tables.co2.upsert(Co2Row {
                sample,
                timestep: 1,
                co2: 0.5,
            });
        }
        tables
    }

    fn render(write: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn header_describes_the_run() {
        let text = render(|out| write_header(out, ResultType::Co2, &scenario(), "yasso15.dat"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "# CO2 production");
        assert!(lines.contains(&"# Datafile used: yasso15.dat"));
        assert!(lines.contains(&"#   initial state: zero"));
        assert!(lines.contains(&"#   soil carbon input: constant yearly"));
        assert!(lines.contains(&"#   climate: constant yearly"));
        assert!(lines.contains(&"#   sample size: 10"));
        assert!(lines.contains(&"#   woody litter size limit: 3"));
        assert!(lines.iter().all(|line| line.starts_with('#')));
    }

    #[test]
    fn raw_stock_rows_follow_column_order() {
        let text = render(|out| write_raw(out, ResultType::Stock, &scenario(), "p.dat", &tables()));
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows, vec!["0 0 15 0 15 1 2 3 4 5", "1 0 16 0 16 1 2 3 4 6"]);
    }

    #[test]
    fn raw_co2_rows_have_three_columns() {
        let text = render(|out| write_raw(out, ResultType::Co2, &scenario(), "p.dat", &tables()));
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows, vec!["0 1 0.5", "1 1 0.5"]);
    }

    #[test]
    fn moment_rows_are_prefixed_by_component() {
        let moments = reduce(&tables());
        let text = render(|out| {
            write_moments(out, ResultType::Stock, &scenario(), "p.dat", &moments)
        });
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows.len(), 8);
        assert!(rows[0].starts_with("tom 0 15.5 "));
        assert!(rows[2].starts_with("non-woody 0 15.5 "));
        assert!(rows[7].starts_with("humus 0 5.5 "));
        assert!(rows.iter().all(|row| row.split_whitespace().count() == 9));

        let text = render(|out| write_moments(out, ResultType::Co2, &scenario(), "p.dat", &moments));
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows, vec!["CO2 1 0.5 0.5 0 0 0 0.5 0.5"]);
    }

    #[test]
    fn result_type_names_parse() {
        assert_eq!("change".parse::<ResultType>(), Ok(ResultType::Change));
        assert_eq!("CO2 production".parse::<ResultType>(), Ok(ResultType::Co2));
        assert!("flux".parse::<ResultType>().is_err());
    }
}
