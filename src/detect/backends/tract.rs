#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ndarray::{ArrayD, IxDyn};
use tract_onnx::prelude::*;

use crate::detect::decode::OutputTensor;
use crate::detect::engine::InferenceEngine;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{InputSize, RGB_CHANNELS};
use crate::preprocess::InputTensor;

/// Tract-based engine for ONNX detection models.
///
/// The model is loaded once from a local file. It must take a single NHWC
/// `f32` input of shape `[1, H, W, 3]`. When the model leaves `H`/`W`
/// symbolic, pass an explicit input size.
pub struct TractEngine {
    model: TypedRunnableModel<TypedModel>,
    input_size: InputSize,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: Option<InputSize>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let mut model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?;

        if let Some(size) = input_size {
            model = model
                .with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, size.height as usize, size.width as usize, RGB_CHANNELS),
                    ),
                )
                .context("failed to set input fact")?;
        }

        let model = model
            .into_optimized()
            .context("failed to optimize ONNX model")?;

        let shape = model
            .input_fact(0)
            .context("model has no input")?
            .shape
            .as_concrete()
            .map(|s| s.to_vec())
            .ok_or_else(|| {
                anyhow!("model input shape is symbolic; configure input_size explicitly")
            })?;
        let input_size = nhwc_input_size(&shape)?;

        let model = model
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX model {} (input {})",
            model_path.display(),
            input_size
        );

        Ok(Self { model, input_size })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        let expected = [
            1,
            self.input_size.height as usize,
            self.input_size.width as usize,
            RGB_CHANNELS,
        ];
        if input.shape() != expected {
            return Err(anyhow!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                expected
            ));
        }
        let data: Vec<f32> = input.iter().copied().collect();
        Tensor::from_shape(&expected, &data).context("failed to build input tensor")
    }

    fn run(&self, input: &InputTensor) -> Result<Vec<OutputTensor>> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;

        outputs
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let value = value
                    .cast_to::<f32>()
                    .with_context(|| format!("output {} is not numeric", i))?;
                let view = value.to_array_view::<f32>()?;
                log::debug!("output tensor {} shape: {:?}", i, view.shape());
                ArrayD::from_shape_vec(IxDyn(view.shape()), view.iter().copied().collect())
                    .with_context(|| format!("output {} has an inconsistent shape", i))
            })
            .collect()
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> InputSize {
        self.input_size
    }

    fn infer(&mut self, input: &InputTensor) -> PipelineResult<Vec<OutputTensor>> {
        self.run(input).map_err(|e| PipelineError::InferenceFailed {
            engine: self.name().to_string(),
            reason: format!("{:#}", e),
        })
    }
}

fn nhwc_input_size(shape: &[usize]) -> Result<InputSize> {
    match shape {
        [1, h, w, c] if *c == RGB_CHANNELS && *h > 0 && *w > 0 => {
            Ok(InputSize::new(*h as u32, *w as u32))
        }
        other => Err(anyhow!(
            "unsupported model input shape {:?}; expected [1, H, W, 3]",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nhwc_rgb_inputs() {
        assert_eq!(
            nhwc_input_size(&[1, 320, 320, 3]).unwrap(),
            InputSize::new(320, 320)
        );
    }

    #[test]
    fn rejects_nchw_inputs() {
        assert!(nhwc_input_size(&[1, 3, 320, 320]).is_err());
        assert!(nhwc_input_size(&[320, 320, 3]).is_err());
    }

    #[test]
    fn missing_model_fails_to_load() {
        assert!(TractEngine::load("/nonexistent/model.onnx", None).is_err());
    }
}
