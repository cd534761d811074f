use crate::detect::decode::OutputTensor;
use crate::error::PipelineResult;
use crate::frame::InputSize;
use crate::preprocess::InputTensor;

/// Inference engine trait.
///
/// An engine is loaded once at startup and then owned by exactly one
/// pipeline. `infer` takes `&mut self`; engines are not expected to be
/// usable from several threads at once.
pub trait InferenceEngine: Send {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Spatial size `infer` expects its input tensor to have.
    fn input_size(&self) -> InputSize;

    /// Run the model on a `[1, H, W, 3]` tensor.
    ///
    /// Returns the outputs in the order declared by the model.
    fn infer(&mut self, input: &InputTensor) -> PipelineResult<Vec<OutputTensor>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn input_size(&self) -> InputSize {
        (**self).input_size()
    }

    fn infer(&mut self, input: &InputTensor) -> PipelineResult<Vec<OutputTensor>> {
        (**self).infer(input)
    }

    fn warm_up(&mut self) -> PipelineResult<()> {
        (**self).warm_up()
    }
}
