//! Detection decoding.
//!
//! Engines emit bare float tensors. Which columns hold the box, the class id
//! and the score is a property of the loaded model, so it is described by a
//! `ColumnLayout` value handed in from configuration.
//!
//! Every output tensor is read as a table: the last axis holds the columns
//! of one row and all leading axes are flattened into rows. A `[1, N, 6]`
//! tensor therefore yields `N` rows of six columns.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::detect::result::{BoundingBox, Detection};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::InputSize;

/// One raw engine output.
pub type OutputTensor = ArrayD<f32>;

/// Coordinate space the model reports boxes in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Already in source-frame pixels.
    #[default]
    Pixels,
    /// Fractions of the frame width/height.
    Normalized,
    /// Pixels of the model input tensor.
    ModelInput,
}

/// Column positions within one output row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    /// First of four consecutive columns `x1, y1, x2, y2`.
    pub box_start: usize,
    pub label: usize,
    pub score: usize,
    pub coordinates: CoordinateSpace,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            box_start: 0,
            label: 4,
            score: 5,
            coordinates: CoordinateSpace::Pixels,
        }
    }
}

impl ColumnLayout {
    /// Minimum number of columns a row must have. Saturates for column
    /// indices no tensor can reach.
    pub fn required_columns(&self) -> usize {
        self.box_start
            .saturating_add(3)
            .max(self.label)
            .max(self.score)
            .saturating_add(1)
    }

    /// Check that every column is addressable and box, label and score
    /// columns do not overlap.
    pub fn validate(&self) -> Result<(), String> {
        let box_end = self
            .box_start
            .checked_add(4)
            .ok_or_else(|| format!("box_start {} is out of range", self.box_start))?;
        if self.label.max(self.score) == usize::MAX {
            return Err("label and score columns must be below usize::MAX".to_string());
        }
        let box_cols = self.box_start..box_end;
        if box_cols.contains(&self.label) {
            return Err(format!("label column {} overlaps box columns", self.label));
        }
        if box_cols.contains(&self.score) {
            return Err(format!("score column {} overlaps box columns", self.score));
        }
        if self.label == self.score {
            return Err(format!(
                "label and score share column {}",
                self.label
            ));
        }
        Ok(())
    }
}

/// Decode every row of every output into a detection.
///
/// Order follows the outputs: output index first, then row index. Tensors
/// with zero rows contribute nothing.
pub fn decode(outputs: &[OutputTensor], layout: &ColumnLayout) -> PipelineResult<Vec<Detection>> {
    let required = layout.required_columns();
    let mut detections = Vec::new();

    for (index, output) in outputs.iter().enumerate() {
        if output.is_empty() {
            log::debug!("output {} has no rows", index);
            continue;
        }

        let columns = output.shape().last().copied().unwrap_or(1);
        if columns < required {
            return Err(PipelineError::MalformedOutput {
                output: index,
                reason: format!(
                    "row has {} columns, layout requires {}",
                    columns, required
                ),
            });
        }

        let values: Vec<f32> = output.iter().copied().collect();
        let rows = values.len() / columns;
        log::debug!(
            "output {}: shape {:?}, {} rows of {} columns",
            index,
            output.shape(),
            rows,
            columns
        );

        for row in values.chunks_exact(columns) {
            let b = &row[layout.box_start..layout.box_start + 4];
            detections.push(Detection::new(
                BoundingBox::new(b[0], b[1], b[2], b[3]),
                row[layout.label] as i64,
                row[layout.score],
            ));
        }
    }

    Ok(detections)
}

/// Map decoded boxes from `space` into source-frame pixels.
pub fn project(
    detections: &mut [Detection],
    space: CoordinateSpace,
    input: InputSize,
    frame_width: u32,
    frame_height: u32,
) {
    let (sx, sy) = match space {
        CoordinateSpace::Pixels => return,
        CoordinateSpace::Normalized => (frame_width as f32, frame_height as f32),
        CoordinateSpace::ModelInput => {
            if input.is_empty() {
                return;
            }
            (
                frame_width as f32 / input.width as f32,
                frame_height as f32 / input.height as f32,
            )
        }
    };
    for det in detections.iter_mut() {
        det.bbox = det.bbox.scaled(sx, sy);
    }
}
