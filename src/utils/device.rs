//! Compute context: the device every tensor of a run is placed on

use tch::Device;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Device selection resolved once at startup and threaded through
/// model construction, data loading and training
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeContext {
    device: Device,
}

impl ComputeContext {
    /// CPU-only context
    pub fn cpu() -> Self {
        Self { device: Device::Cpu }
    }

    /// Resolve a device name: "auto", "cpu", "cuda", "cuda:N" or "mps"
    ///
    /// Requesting CUDA without an available GPU falls back to CPU with a warning.
    pub fn resolve(name: &str) -> Result<Self> {
        let name = name.trim().to_lowercase();
        let device = match name.as_str() {
            "auto" => Device::cuda_if_available(),
            "cpu" => Device::Cpu,
            "mps" => Device::Mps,
            "cuda" | "gpu" => cuda_or_cpu(0),
            other => match other.strip_prefix("cuda:") {
                Some(index) => {
                    let index: usize = index
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid CUDA device index in {other:?}")))?;
                    cuda_or_cpu(index)
                }
                None => return Err(Error::Config(format!("unknown device {other:?}"))),
            },
        };

        info!("Using device: {:?}", device);
        Ok(Self { device })
    }

    /// The resolved device
    pub fn device(&self) -> Device {
        self.device
    }
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self::cpu()
    }
}

fn cuda_or_cpu(index: usize) -> Device {
    if tch::Cuda::is_available() && index < tch::Cuda::device_count() as usize {
        Device::Cuda(index)
    } else {
        warn!("CUDA device {} requested but not available, falling back to CPU", index);
        Device::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cpu() {
        let ctx = ComputeContext::resolve("CPU").unwrap();
        assert_eq!(ctx.device(), Device::Cpu);
    }

    #[test]
    fn test_resolve_unknown_device() {
        assert!(matches!(
            ComputeContext::resolve("tpu"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ComputeContext::resolve("cuda:x"),
            Err(Error::Config(_))
        ));
    }
}
