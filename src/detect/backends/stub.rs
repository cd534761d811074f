use ndarray::arr2;

use crate::detect::decode::OutputTensor;
use crate::detect::engine::InferenceEngine;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::InputSize;
use crate::preprocess::InputTensor;

/// Default input size of the stub engine.
pub const STUB_INPUT_SIZE: InputSize = InputSize {
    height: 300,
    width: 300,
};

/// Stub engine for testing. Returns the same outputs for every input.
pub struct StubEngine {
    input_size: InputSize,
    outputs: Vec<OutputTensor>,
    calls: u64,
}

impl StubEngine {
    /// An engine that detects nothing.
    pub fn new(input_size: InputSize) -> Self {
        Self {
            input_size,
            outputs: Vec::new(),
            calls: 0,
        }
    }

    /// An engine reporting one fixed detection in the default row layout.
    pub fn demo() -> Self {
        Self::new(STUB_INPUT_SIZE)
            .with_outputs(vec![arr2(&[[10.0f32, 10.0, 50.0, 50.0, 2.0, 0.87]]).into_dyn()])
    }

    pub fn with_input_size(mut self, input_size: InputSize) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<OutputTensor>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Number of completed `infer` calls.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> InputSize {
        self.input_size
    }

    fn infer(&mut self, input: &InputTensor) -> PipelineResult<Vec<OutputTensor>> {
        let expected = [
            1,
            self.input_size.height as usize,
            self.input_size.width as usize,
            3,
        ];
        if input.shape() != expected {
            return Err(PipelineError::InferenceFailed {
                engine: self.name().to_string(),
                reason: format!(
                    "input shape {:?} does not match model input {:?}",
                    input.shape(),
                    expected
                ),
            });
        }
        self.calls += 1;
        Ok(self.outputs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn stub_engine_returns_configured_outputs() {
        let mut engine = StubEngine::demo();
        let input = Array4::<f32>::zeros((1, 300, 300, 3));

        let outputs = engine.infer(&input).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].shape(), &[1, 6]);
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn stub_engine_rejects_wrong_input_shape() {
        let mut engine = StubEngine::new(InputSize::new(4, 4));
        let input = Array4::<f32>::zeros((1, 5, 4, 3));

        let err = engine.infer(&input).unwrap_err();
        assert!(matches!(err, PipelineError::InferenceFailed { .. }));
        assert_eq!(engine.calls(), 0);
    }
}
