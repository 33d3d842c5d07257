//! # Compute Device Selection
//!
//! Picks the candle device the Whisper model runs on. GPU backends are only
//! usable when candle was built with the matching feature; otherwise requests
//! for them fall back to the CPU.

use candle_core::Device;
use tracing::{debug, info, warn};

/// Device preference from `model.device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// First available of CUDA, Metal, CPU
    #[default]
    Auto,
    Cpu,
    /// Falls back to CPU if unavailable
    Cuda,
    /// Falls back to CPU if unavailable
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!(
                "Unknown device '{}' (expected auto, cpu, cuda or metal)",
                s
            )),
        }
    }
}

/// Resolve a preference to a concrete device.
pub fn select_device(preference: DevicePreference) -> Device {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or_else(|| {
            warn!("CUDA requested but not available, using CPU");
            Device::Cpu
        }),
        DevicePreference::Metal => metal_device().unwrap_or_else(|| {
            warn!("Metal requested but not available, using CPU");
            Device::Cpu
        }),
        DevicePreference::Auto => cuda_device().or_else(metal_device).unwrap_or(Device::Cpu),
    };

    info!("Speech model will run on {}", describe_device(&device));
    device
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(err) => {
            debug!("CUDA not available: {}", err);
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(err) => {
            debug!("Metal not available: {}", err);
            None
        }
    }
}

pub fn describe_device(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA GPU",
        Device::Metal(_) => "Metal GPU",
    }
}
