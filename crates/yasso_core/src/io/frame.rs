use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::engine::{RunOutput, RunStatus};
use crate::moments::{MomentTables, Quantity};
use crate::phase::RunKind;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Progress,
    Summary,
}

/// Mean and two-sigma band of one quantity at one timestep.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BandPoint {
    pub timestep: u32,
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// One line of the progress stream. Progress frames announce the sample that
/// is about to start; the single summary frame closes the stream.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub stage: Option<String>,
    pub sample: Option<usize>,
    pub total: Option<usize>,
    pub status: Option<String>,
    pub samples_completed: Option<usize>,
    pub aborted_at: Option<u32>,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stock_total: Vec<BandPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub co2: Vec<BandPoint>,
}

impl Frame {
    fn empty(kind: FrameKind) -> Self {
        Self {
            kind,
            stage: None,
            sample: None,
            total: None,
            status: None,
            samples_completed: None,
            aborted_at: None,
            reason: None,
            stock_total: Vec::new(),
            co2: Vec::new(),
        }
    }

    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }
}

pub fn progress_frame(kind: RunKind, sample: usize, total: usize) -> Frame {
    Frame {
        stage: Some(kind.as_str().to_string()),
        sample: Some(sample),
        total: Some(total),
        ..Frame::empty(FrameKind::Progress)
    }
}

pub fn summary_frame(output: &RunOutput) -> Frame {
    let mut frame = Frame {
        stock_total: bands(&output.moments, Quantity::StockTotal),
        co2: bands(&output.moments, Quantity::Co2),
        ..Frame::empty(FrameKind::Summary)
    };
    match &output.status {
        RunStatus::Completed => frame.status = Some("completed".into()),
        RunStatus::Cancelled { samples_completed } => {
            frame.status = Some("cancelled".into());
            frame.samples_completed = Some(*samples_completed);
        }
        RunStatus::Aborted {
            sample,
            timestep,
            reason,
        } => {
            frame.status = Some("aborted".into());
            frame.samples_completed = Some(*sample);
            frame.aborted_at = Some(*timestep);
            frame.reason = Some(reason.clone());
        }
    }
    frame
}

fn bands(moments: &MomentTables, quantity: Quantity) -> Vec<BandPoint> {
    moments
        .get(&quantity)
        .map(|rows| {
            rows.iter()
                .map(|row| BandPoint {
                    timestep: row.timestep,
                    mean: row.mean,
                    lower: row.lower,
                    upper: row.upper,
                })
                .collect()
        })
        .unwrap_or_default()
}
