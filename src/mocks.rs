use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use ndarray::prelude::*;

use crate::errors::{RembgError, Result};
use crate::model::Device;
use crate::reporter::Reporter;
use crate::traits::{ModelProvider, SegmentationModel};

/// Deterministic stand-in for the segmentation network.
///
/// `Radial` predicts a centered disc whose edge fades out over several pixels,
/// which is enough to exercise soft alpha handling without real weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockSegmentationModel {
    Radial { radius: f32, steepness: f32 },
    Constant(f32),
}

impl MockSegmentationModel {
    pub const fn radial() -> Self {
        Self::Radial {
            radius: 0.35,
            steepness: 200.0,
        }
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch, _, height, width) = tensor.dim();
        let logits = match *self {
            Self::Constant(logit) => Array4::from_elem((batch, 1, height, width), logit),
            Self::Radial { radius, steepness } => {
                let (cy, cx) = (height as f32 / 2.0, width as f32 / 2.0);
                let scale = height.max(width).max(1) as f32;
                Array4::from_shape_fn((batch, 1, height, width), |(_, _, y, x)| {
                    let dy = (y as f32 + 0.5 - cy) / scale;
                    let dx = (x as f32 + 0.5 - cx) / scale;
                    steepness * (radius - (dx * dx + dy * dy).sqrt())
                })
            }
        };
        Ok(logits)
    }
}

/// Provider that hands out a mock model and counts how often it was asked to.
#[derive(Debug, Default)]
pub struct MockModelProvider {
    model: Option<MockSegmentationModel>,
    loads: AtomicUsize,
}

impl MockModelProvider {
    pub fn new(model: MockSegmentationModel) -> Self {
        Self {
            model: Some(model),
            loads: AtomicUsize::new(0),
        }
    }

    /// Provider whose every load fails like an unreachable hub.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelProvider for MockModelProvider {
    type Model = MockSegmentationModel;

    fn load(&self, reporter: &Reporter) -> Result<(Arc<MockSegmentationModel>, Device)> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        reporter.info("Loading mock segmentation model...");
        let model = self.model.ok_or_else(|| {
            RembgError::model(
                "model download",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "hub unreachable"),
            )
        })?;
        Ok((Arc::new(model), Device::Cpu))
    }
}
