//! Synchronous per-item transform run as one stage of a [`crate::Pipeline`] or
//! [`crate::ChannelPipeline`].

use std::sync::Arc;

use crate::{PipelineError, StreamerContext};

/// A single pipeline stage.
///
/// `process` is called once per input item and may emit zero or more output
/// items through `output`. `finish` is called once after the input stream is
/// exhausted so a stage can flush any buffered state.
pub trait Processor<T> {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &'static str;

    fn process(
        &mut self,
        context: &Arc<StreamerContext>,
        item: T,
        output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;

    fn finish(
        &mut self,
        context: &Arc<StreamerContext>,
        output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;
}
