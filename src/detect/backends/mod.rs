pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubEngine;

#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;

use anyhow::Result;

use crate::detect::engine::InferenceEngine;
use crate::frame::InputSize;

/// Load the engine named by `model_path`.
///
/// `stub://` paths select the stub engine (a fixed demo detection);
/// anything else is loaded as an ONNX model with tract.
pub fn open_engine(
    model_path: &str,
    input_size: Option<InputSize>,
) -> Result<Box<dyn InferenceEngine>> {
    if model_path.starts_with("stub://") {
        let mut engine = StubEngine::demo();
        if let Some(size) = input_size {
            engine = engine.with_input_size(size);
        }
        log::info!("using stub engine for {}", model_path);
        return Ok(Box::new(engine));
    }

    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(TractEngine::load(model_path, input_size)?))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        anyhow::bail!(
            "loading {} requires the backend-tract feature",
            model_path
        )
    }
}
