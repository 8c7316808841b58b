use std::sync::Arc;

use ndarray::prelude::*;

use crate::errors::Result;
use crate::model::Device;
use crate::reporter::Reporter;

/// Segmentation network seen as an opaque tensor function.
///
/// Implementations take a normalized `1x3xHxW` batch and return the logits of
/// the final prediction stage as `1x1xHxW`. Calls must not mutate the model in
/// a way that changes later results.
pub trait SegmentationModel: Send + Sync {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// Loads a segmentation model and chooses the device it runs on.
pub trait ModelProvider {
    type Model: SegmentationModel;

    /// Loads the model. Any failure here is fatal for the run.
    fn load(&self, reporter: &Reporter) -> Result<(Arc<Self::Model>, Device)>;

    /// Returns the supplied pair when both halves are present, otherwise loads.
    fn resolve_or_load(
        &self,
        model: Option<Arc<Self::Model>>,
        device: Option<Device>,
        reporter: &Reporter,
    ) -> Result<(Arc<Self::Model>, Device)> {
        match (model, device) {
            (Some(model), Some(device)) => Ok((model, device)),
            _ => self.load(reporter),
        }
    }
}
