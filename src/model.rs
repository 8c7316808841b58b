use std::{
    env, fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use hf_hub::api::sync::ApiBuilder;
use ndarray::prelude::*;
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
        ExecutionProvider, ExecutionProviderDispatch,
    },
    session::Session,
    value::TensorRef,
};
use parking_lot::Mutex;

use crate::{
    errors::{RembgError, Result},
    pipeline::PROCESSING_SIZE,
    reporter::Reporter,
    traits::{ModelProvider, SegmentationModel},
};

pub const DEFAULT_MODEL_REPO: &str = "briaai/RMBG-2.0";
pub const DEFAULT_MODEL_FILE: &str = "onnx/model.onnx";
/// Environment variable pointing at a local `.onnx` file to use instead of the hub.
pub const MODEL_PATH_ENV: &str = "RMBG_MODEL";

/// Compute target the session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda { device_id: i32 },
    CoreMl,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda { device_id } => write!(f, "CUDA device {device_id}"),
            Self::CoreMl => f.write_str("CoreML (Apple silicon GPU)"),
            Self::Cpu => f.write_str("CPU"),
        }
    }
}

impl Device {
    /// Devices to try, best first: CUDA, then CoreML, then CPU.
    ///
    /// A provider compiled into the runtime may still fail to register (no
    /// GPU, broken driver), so callers fall through this list with
    /// [`first_working`].
    pub fn candidates() -> Vec<Self> {
        Self::candidates_from(cuda_available(), coreml_available())
    }

    pub fn candidates_from(cuda: bool, coreml: bool) -> Vec<Self> {
        let mut devices = Vec::with_capacity(3);
        if cuda {
            devices.push(Self::Cuda { device_id: 0 });
        }
        if coreml {
            devices.push(Self::CoreMl);
        }
        devices.push(Self::Cpu);
        devices
    }

    fn execution_provider(self) -> ExecutionProviderDispatch {
        match self {
            Self::Cuda { device_id } => CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()
                .error_on_failure(),
            Self::CoreMl => CoreMLExecutionProvider::default().build().error_on_failure(),
            Self::Cpu => CPUExecutionProvider::default().build(),
        }
    }

    fn announce(self, reporter: &Reporter) {
        match self {
            Self::Cuda { .. } | Self::CoreMl => reporter.info(format!("Using {self}")),
            Self::Cpu => reporter.warn("Using CPU for processing (this may be slow)"),
        }
    }
}

/// Runs `build` for each device in order and keeps the first success.
///
/// Failures on earlier devices are logged and skipped. When every device
/// fails, the last error is returned.
pub fn first_working<T>(
    devices: &[Device],
    mut build: impl FnMut(Device) -> Result<T>,
) -> Result<(T, Device)> {
    let mut last_error = None;
    for &device in devices {
        match build(device) {
            Ok(value) => return Ok((value, device)),
            Err(e) => {
                log::warn!("{device} unavailable, trying the next device: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        RembgError::model(
            "device selection",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no device to try"),
        )
    }))
}

fn cuda_available() -> bool {
    provider_available(&CUDAExecutionProvider::default(), "CUDA")
}

fn coreml_available() -> bool {
    provider_available(&CoreMLExecutionProvider::default(), "CoreML")
}

/// Whether the provider is compiled into the runtime. Registration can still fail.
fn provider_available(provider: &impl ExecutionProvider, name: &str) -> bool {
    match provider.is_available() {
        Ok(available) => available,
        Err(e) => {
            log::debug!("{name} availability check failed: {e}");
            false
        }
    }
}

/// Where the ONNX weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Hub { repo: String, file: String },
    File(PathBuf),
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Hub {
            repo: DEFAULT_MODEL_REPO.to_string(),
            file: DEFAULT_MODEL_FILE.to_string(),
        }
    }
}

impl ModelSource {
    /// Uses [`MODEL_PATH_ENV`] when set and non-empty, otherwise the hub default.
    pub fn from_env() -> Self {
        match env::var_os(MODEL_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::default(),
        }
    }

    fn fetch(&self, verbose: bool) -> Result<PathBuf> {
        match self {
            Self::File(path) => {
                if !path.is_file() {
                    return Err(RembgError::model(
                        format!("model file lookup: {}", path.display()),
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "model file does not exist",
                        ),
                    ));
                }
                Ok(path.clone())
            }
            Self::Hub { repo, file } => {
                let api = ApiBuilder::from_env().with_progress(verbose).build()?;
                let path = api.model(repo.clone()).get(file)?;
                log::debug!("resolved {repo}/{file} to {}", path.display());
                Ok(path)
            }
        }
    }
}

/// Loads RMBG-2.0 into an ONNX Runtime session.
#[derive(Debug, Clone, Default)]
pub struct OnnxModelProvider {
    source: ModelSource,
}

impl OnnxModelProvider {
    pub const fn new(source: ModelSource) -> Self {
        Self { source }
    }
}

impl ModelProvider for OnnxModelProvider {
    type Model = OnnxModel;

    fn load(&self, reporter: &Reporter) -> Result<(Arc<OnnxModel>, Device)> {
        reporter.info("Loading RMBG-2.0 model...");
        let model_path = self.source.fetch(reporter.is_verbose())?;

        let (model, device) =
            first_working(&Device::candidates(), |device| OnnxModel::new(&model_path, device))?;
        device.announce(reporter);
        Ok((Arc::new(model), device))
    }
}

pub struct OnnxModel {
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxModel {
    pub fn new(model_path: &Path, device: Device) -> Result<Self> {
        // Only the message of builder errors is kept.
        let mut session = Session::builder()
            .map_err(|e| RembgError::model("session builder initialization", e.to_string()))?
            .with_execution_providers([device.execution_provider()])
            .map_err(|e| {
                RembgError::model(format!("execution provider setup ({device})"), e.to_string())
            })?
            .with_memory_pattern(true)
            .map_err(|e| RembgError::model("memory pattern setup", e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| {
                RembgError::model(
                    format!("model file loading: {}", model_path.display()),
                    e.to_string(),
                )
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| signature_error("model declares no inputs"))?;
        // Earlier outputs are intermediate predictions; the last one is the final mask.
        let output_name = session
            .outputs
            .last()
            .map(|output| output.name.clone())
            .ok_or_else(|| signature_error("model declares no outputs"))?;
        log::debug!("model signature: input `{input_name}`, output `{output_name}`");

        // initialize model
        let size = PROCESSING_SIZE as usize;
        let data = Array4::<f32>::zeros((1, 3, size, size));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| RembgError::model("warm-up tensor creation", e))?])
            .map_err(|e| RembgError::model("warm-up inference", e))?;

        Ok(Self {
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl SegmentationModel for OnnxModel {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

fn signature_error(reason: &str) -> RembgError {
    RembgError::model(
        "model signature inspection",
        std::io::Error::new(std::io::ErrorKind::InvalidData, reason.to_string()),
    )
}
