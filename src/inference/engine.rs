//! Inference engines behind the crop classifier
//!
//! [`InferenceEngine`] is the seam between the classifier's control flow
//! (device choice, memory fallback, softmax, ranking) and the tensor code.
//! [`BurnEngine`] is the production implementation over a
//! [`CropDiseaseNet`] checkpoint.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use thiserror::Error;

use crate::backend::{CpuBackend, Device};
use crate::model::{CropDiseaseNet, CropDiseaseNetConfig};
use crate::utils::error::{AdvisoryError, Result, ResultExt};

/// Why a forward pass failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineFailure {
    /// The accelerator ran out of memory; the same input may succeed on the CPU
    #[error("device out of memory: {0}")]
    OutOfMemory(String),

    #[error("inference runtime failure: {0}")]
    Runtime(String),
}

/// A loaded model that maps a normalized CHW input to one logit per class
pub trait InferenceEngine: Send + Sync {
    /// Raw logits for a single image
    fn forward(&self, input: &[f32], device: Device) -> std::result::Result<Vec<f32>, EngineFailure>;

    /// Whether this engine holds weights on an accelerator
    fn supports_accelerator(&self) -> bool {
        false
    }
}

/// Paths of the artefacts for one crop
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    /// Checkpoint path without the `.mpk` extension, as the recorder expects
    pub checkpoint: PathBuf,
    pub classes: PathBuf,
}

impl ModelArtifacts {
    pub fn for_crop(models_dir: &Path, crop: &str) -> Self {
        Self {
            checkpoint: models_dir.join(format!("{}_model", crop)),
            classes: models_dir.join(format!("{}_classes.txt", crop)),
        }
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoint.with_extension("mpk")
    }
}

/// Read one label per line, skipping blanks
pub fn load_class_names(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read classes {}", path.display()))?;

    let names: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if names.is_empty() {
        return Err(AdvisoryError::Config(format!(
            "Class list {} is empty",
            path.display()
        )));
    }
    Ok(names)
}

/// Copies of one model, each behind its own lock
///
/// A request takes the first free copy, so up to `len()` forward passes run
/// at once. When every copy is busy the request waits on the next one in turn.
pub struct ReplicaPool<M> {
    replicas: Vec<Mutex<M>>,
    next: AtomicUsize,
}

impl<M: Clone> ReplicaPool<M> {
    pub fn new(model: M, count: usize) -> Self {
        let count = count.max(1);
        let mut replicas = Vec::with_capacity(count);
        for _ in 1..count {
            replicas.push(Mutex::new(model.clone()));
        }
        replicas.push(Mutex::new(model));
        Self {
            replicas,
            next: AtomicUsize::new(0),
        }
    }
}

impl<M> ReplicaPool<M> {
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// A backend panic poisons a replica's lock but leaves its weights intact
    fn checkout(&self) -> MutexGuard<'_, M> {
        let len = self.replicas.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            match self.replicas[(start + offset) % len].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
        }
        self.replicas[start]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Burn-backed engine for one crop
pub struct BurnEngine {
    input_size: usize,
    cpu: ReplicaPool<CropDiseaseNet<CpuBackend>>,
    #[cfg(feature = "cuda")]
    gpu: Option<Mutex<CropDiseaseNet<crate::backend::GpuBackend>>>,
}

impl BurnEngine {
    /// Load the checkpoint on the CPU and, when requested and possible, on the accelerator
    ///
    /// The CPU model is replicated `cpu_replicas` times. The accelerator
    /// holds a single copy since device memory is the scarcer resource.
    pub fn load(
        artifacts: &ModelArtifacts,
        num_classes: usize,
        input_size: usize,
        use_accelerator: bool,
        cpu_replicas: usize,
    ) -> Result<Self> {
        if !artifacts.checkpoint_file().exists() {
            return Err(AdvisoryError::Config(format!(
                "Model checkpoint not found at {}",
                artifacts.checkpoint_file().display()
            )));
        }

        let config = CropDiseaseNetConfig::new(num_classes).with_input_size(input_size);
        let cpu = load_on::<CpuBackend>(&config, &artifacts.checkpoint, &Default::default())?;

        #[cfg(feature = "cuda")]
        let gpu = if use_accelerator && crate::backend::is_gpu_available() {
            let device = burn_cuda::CudaDevice::new(0);
            match load_on::<crate::backend::GpuBackend>(&config, &artifacts.checkpoint, &device) {
                Ok(model) => Some(Mutex::new(model)),
                Err(e) => {
                    tracing::warn!("Accelerator load failed, using CPU only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        #[cfg(not(feature = "cuda"))]
        let _ = use_accelerator;

        Ok(Self {
            input_size,
            cpu: ReplicaPool::new(cpu, cpu_replicas),
            #[cfg(feature = "cuda")]
            gpu,
        })
    }
}

fn load_on<B: Backend>(
    config: &CropDiseaseNetConfig,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<CropDiseaseNet<B>> {
    let recorder = CompactRecorder::new();
    config
        .init::<B>(device)
        .load_file(checkpoint, &recorder, device)
        .map_err(|e| AdvisoryError::Config(format!("Failed to load model: {:?}", e)))
}

/// Run one forward pass, turning backend panics into [`EngineFailure`]
fn run_forward<B: Backend>(
    model: &CropDiseaseNet<B>,
    input: &[f32],
    input_size: usize,
    device: &B::Device,
) -> std::result::Result<Vec<f32>, EngineFailure> {
    let expected = 3 * input_size * input_size;
    if input.len() != expected {
        return Err(EngineFailure::Runtime(format!(
            "expected {} input values, got {}",
            expected,
            input.len()
        )));
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let tensor = Tensor::<B, 4>::from_floats(
            TensorData::new(input.to_vec(), [1, 3, input_size, input_size]),
            device,
        );
        model.forward(tensor).into_data().to_vec::<f32>()
    }));

    match outcome {
        Ok(Ok(logits)) => Ok(logits),
        Ok(Err(e)) => Err(EngineFailure::Runtime(format!("{:?}", e))),
        Err(payload) => Err(classify_panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Allocation failures on the device are recoverable, anything else is not
pub fn classify_panic(message: String) -> EngineFailure {
    let lower = message.to_lowercase();
    if lower.contains("out of memory") || lower.contains("out_of_memory") {
        EngineFailure::OutOfMemory(message)
    } else {
        EngineFailure::Runtime(message)
    }
}

impl BurnEngine {
    fn forward_cpu(&self, input: &[f32]) -> std::result::Result<Vec<f32>, EngineFailure> {
        let model = self.cpu.checkout();
        run_forward(&model, input, self.input_size, &Default::default())
    }
}

impl InferenceEngine for BurnEngine {
    fn forward(&self, input: &[f32], device: Device) -> std::result::Result<Vec<f32>, EngineFailure> {
        match device {
            Device::Cpu => self.forward_cpu(input),
            #[cfg(feature = "cuda")]
            Device::Gpu(index) => match &self.gpu {
                Some(gpu) => {
                    let model = gpu.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    run_forward(
                        &model,
                        input,
                        self.input_size,
                        &burn_cuda::CudaDevice::new(index),
                    )
                }
                None => self.forward_cpu(input),
            },
            #[cfg(not(feature = "cuda"))]
            Device::Gpu(_) => self.forward_cpu(input),
        }
    }

    fn supports_accelerator(&self) -> bool {
        #[cfg(feature = "cuda")]
        {
            self.gpu.is_some()
        }
        #[cfg(not(feature = "cuda"))]
        {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_artifact_paths() {
        let artifacts = ModelArtifacts::for_crop(Path::new("/models"), "chilli");
        assert_eq!(artifacts.checkpoint_file(), PathBuf::from("/models/chilli_model.mpk"));
        assert_eq!(artifacts.classes, PathBuf::from("/models/chilli_classes.txt"));
    }

    #[test]
    fn test_load_class_names_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chilli_healthy\n\n  chilli_leafspot \nchilli_whitefly").unwrap();

        let names = load_class_names(file.path()).unwrap();
        assert_eq!(names, vec!["chilli_healthy", "chilli_leafspot", "chilli_whitefly"]);
    }

    #[test]
    fn test_empty_class_list_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_class_names(file.path()).is_err());
    }

    #[test]
    fn test_missing_checkpoint_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ModelArtifacts::for_crop(dir.path(), "rice");
        let err = BurnEngine::load(&artifacts, 4, 224, false, 2).err().unwrap();
        assert!(err.to_string().contains("rice_model.mpk"));
    }

    #[test]
    fn test_classify_panic() {
        assert!(matches!(
            classify_panic("CUDA error: out of memory".into()),
            EngineFailure::OutOfMemory(_)
        ));
        assert!(matches!(
            classify_panic("index out of bounds".into()),
            EngineFailure::Runtime(_)
        ));
    }

    #[test]
    fn test_cpu_forward_with_fresh_weights() {
        let device = Default::default();
        let config = CropDiseaseNetConfig::new(3)
            .with_input_size(32)
            .with_base_filters(4);
        let engine = BurnEngine {
            input_size: 32,
            cpu: ReplicaPool::new(config.init::<CpuBackend>(&device), 2),
            #[cfg(feature = "cuda")]
            gpu: None,
        };

        let logits = engine.forward(&vec![0.1; 3 * 32 * 32], Device::Cpu).unwrap();
        assert_eq!(logits.len(), 3);

        let err = engine.forward(&[0.0; 10], Device::Cpu).unwrap_err();
        assert!(matches!(err, EngineFailure::Runtime(_)));

        // both replicas answer at once and agree
        let input = vec![0.1; 3 * 32 * 32];
        let (a, b) = std::thread::scope(|scope| {
            let first = scope.spawn(|| engine.forward(&input, Device::Cpu));
            let second = scope.spawn(|| engine.forward(&input, Device::Cpu));
            (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
        });
        assert_eq!(a, b);
        assert_eq!(a, logits);
    }

    #[test]
    fn test_pool_hands_out_free_replicas_first() {
        let pool = ReplicaPool::new(vec![1.0f32], 3);
        assert_eq!(pool.len(), 3);

        let first = pool.checkout();
        let second = pool.checkout();
        let third = pool.checkout();
        let addresses = [&*first as *const Vec<f32>, &*second as *const _, &*third as *const _];
        assert_ne!(addresses[0], addresses[1]);
        assert_ne!(addresses[1], addresses[2]);
        assert_ne!(addresses[0], addresses[2]);
    }

    #[test]
    fn test_busy_pool_waits_for_a_replica() {
        let pool = ReplicaPool::new(0u32, 1);
        let held = pool.checkout();

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| *pool.checkout() + 1);
            std::thread::sleep(std::time::Duration::from_millis(20));
            drop(held);
            assert_eq!(waiter.join().unwrap(), 1);
        });
    }

    #[test]
    fn test_poisoned_replica_is_still_used() {
        let pool = ReplicaPool::new(7u32, 1);
        let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = pool.checkout();
            panic!("backend failure");
        }));
        assert_eq!(*pool.checkout(), 7);
    }
}
