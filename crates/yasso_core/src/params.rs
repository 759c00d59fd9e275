//! Parameter ensembles: row 0 holds the maximum-likelihood estimates, rows
//! `1..N` are posterior draws.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::rng::Stream;

/// Width of every usable parameter row.
pub const PARAMETER_COUNT: usize = 35;

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterEnsemble {
    rows: Vec<Vec<f64>>,
    width: usize,
}

impl ParameterEnsemble {
    pub fn load_from_path(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse whitespace-separated rows. Blank lines are skipped, every other
    /// line must have the width of the first one.
    pub fn from_reader<R: Read>(reader: R) -> EngineResult<Self> {
        let mut rows = Vec::new();
        let mut width = None;
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let number = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|_| EngineError::ParameterParse {
                        line: number,
                        token: token.to_string(),
                    })
                })
                .collect::<EngineResult<Vec<f64>>>()?;
            match width {
                None => width = Some(row.len()),
                Some(expected) if expected != row.len() => {
                    return Err(EngineError::RaggedParameterRow {
                        line: number,
                        found: row.len(),
                        expected,
                    })
                }
                Some(_) => {}
            }
            rows.push(row);
        }
        let width = width.ok_or(EngineError::EmptyEnsemble)?;
        Ok(Self { rows, width })
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> EngineResult<Self> {
        let width = rows.first().map(Vec::len).ok_or(EngineError::EmptyEnsemble)?;
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(EngineError::RaggedParameterRow {
                line: index + 1,
                found: row.len(),
                expected: width,
            });
        }
        Ok(Self { rows, width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the rows carry exactly [`PARAMETER_COUNT`] values.
    pub fn is_usable(&self) -> bool {
        self.width == PARAMETER_COUNT
    }

    pub fn require_usable(&self) -> EngineResult<()> {
        if self.is_usable() {
            Ok(())
        } else {
            Err(EngineError::ParameterWidth {
                found: self.width,
                expected: PARAMETER_COUNT,
            })
        }
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn maximum_likelihood(&self) -> &[f64] {
        self.row(0)
    }

    /// Pick a posterior row uniformly from `1..N`. An ensemble holding only
    /// the maximum-likelihood row hands that row out instead.
    pub fn draw_index(&self, rng: &mut Stream) -> usize {
        if self.rows.len() > 1 {
            rng.index_in(1, self.rows.len())
        } else {
            0
        }
    }
}
