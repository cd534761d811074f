mod backends;
mod decode;
mod engine;
mod result;

pub use backends::{open_engine, StubEngine};
#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
pub use decode::{decode, project, ColumnLayout, CoordinateSpace, OutputTensor};
pub use engine::InferenceEngine;
pub use result::{BoundingBox, Detection};
