use serde::Serialize;

/// Axis-aligned box, corner coordinates in source-frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub(crate) fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

/// One decoded object hypothesis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Model class id.
    pub label: i64,
    /// Confidence as reported by the model.
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: i64, score: f32) -> Self {
        Self { bbox, label, score }
    }

    /// Text rendered next to the box.
    pub fn caption(&self) -> String {
        format!("Label: {}, Score: {:.2}", self.label, self.score)
    }
}
