//! Snapshot detector
//!
//! Polls a network video stream on a fixed interval, runs an object
//! detection model over each captured frame, and writes both the raw and
//! the annotated frame to disk.
//!
//! # Pipeline
//!
//! capture -> preprocess -> infer -> decode -> render -> save -> sleep
//!
//! A failure in any stage abandons that iteration only. The loop itself
//! runs until shutdown is requested.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (HTTP MJPEG/still, RTSP via GStreamer, synthetic)
//! - `frame`: Captured frames and model input sizes
//! - `preprocess`: Area resize and normalization into the model input tensor
//! - `detect`: Inference engines and output decoding
//! - `render`: Box and caption drawing
//! - `sink`: PNG persistence
//! - `pipeline`: The loop and its state machine
//! - `config`: Startup configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod sink;

pub use config::PipelineConfig;
pub use detect::{
    decode, open_engine, BoundingBox, ColumnLayout, CoordinateSpace, Detection, InferenceEngine,
    OutputTensor, StubEngine,
};
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, InputSize};
pub use ingest::{open_source, FrameSource, SourceStats};
pub use pipeline::{IterationOutcome, Pipeline, PipelineState, PipelineStats, ShutdownFlag};
pub use preprocess::InputTensor;
pub use render::Renderer;
