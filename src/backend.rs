//! Backend selection for classifier inference
//!
//! Every crop model can run on the CPU through NdArray. With the `cuda`
//! feature the same weights are also loaded on a CUDA device, and the
//! classifier prefers it until the device runs out of memory.

use serde::{Deserialize, Serialize};

/// CPU backend, always compiled in
pub type CpuBackend = burn_ndarray::NdArray;

/// Accelerated backend
#[cfg(feature = "cuda")]
pub type GpuBackend = burn_cuda::Cuda;

/// Device a forward pass runs on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Device {
    /// CPU backend
    Cpu,
    /// GPU backend (when available)
    Gpu(usize),
}

impl Default for Device {
    fn default() -> Self {
        if is_gpu_available() {
            Device::Gpu(0)
        } else {
            Device::Cpu
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu(id) => write!(f, "GPU:{}", id),
        }
    }
}

impl Device {
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Device::Gpu(_))
    }
}

/// Get a human-readable name for the compiled backends
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU) with NdArray (CPU) fallback"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

/// Check if a usable accelerator is present
///
/// Always false without the `cuda` feature, since there is no backend to run on it.
pub fn is_gpu_available() -> bool {
    cfg!(feature = "cuda") && has_nvidia_gpu()
}

/// Check for NVIDIA GPU (CUDA)
fn has_nvidia_gpu() -> bool {
    if std::env::var("CUDA_VISIBLE_DEVICES")
        .map(|v| v.trim() == "-1" || v.trim().is_empty())
        .unwrap_or(false)
    {
        return false;
    }

    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/proc/driver/nvidia/version").exists()
            || std::path::Path::new("/dev/nvidia0").exists()
    }

    #[cfg(not(target_os = "linux"))]
    {
        std::process::Command::new("nvidia-smi")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
