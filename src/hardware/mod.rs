//! Hardware detection module
//!
//! Probes RAM, CPU, disk and GPU, and aggregates them into one
//! immutable [`HardwareSpecs`] snapshot. RAM is the only probe allowed
//! to fail the snapshot; everything else degrades to a safe default.

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod ram;

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

pub use gpu::GpuVendor;

/// VRAM floor below which an adapter is treated as not usable for
/// inference (filters out integrated and placeholder devices).
const USABLE_VRAM_FLOOR_GB: f64 = 1.0;

/// Snapshot assembly errors. Only RAM is mandatory: every model profile
/// declares a RAM floor, so there is no safe default for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("unable to detect total system RAM; supply hardware specs manually")]
    RamUndetectable,
}

/// Snapshot of the machine's resources relevant to local model selection.
///
/// Constructed once per process through [`SnapshotCache`] and never
/// mutated afterwards. Tests build synthetic instances directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSpecs {
    /// Total system RAM in GB, always > 0 for a detected snapshot.
    pub total_ram_gb: f64,
    /// Physical core count, at least 1.
    pub cpu_physical_cores: usize,
    /// Detected GPU vendor; `Unknown` when no strategy succeeded.
    pub gpu_vendor: GpuVendor,
    /// Total VRAM across same-vendor devices in GB; 0 means no usable
    /// GPU memory was determined (the vendor may still be known).
    pub gpu_vram_gb: f64,
    /// Free space on the working directory's filesystem; 0 if
    /// undetermined.
    pub available_disk_space_gb: f64,
}

impl HardwareSpecs {
    /// Whether the machine has a GPU worth scheduling work on.
    pub fn has_gpu(&self) -> bool {
        self.gpu_vram_gb >= USABLE_VRAM_FLOOR_GB
    }

    /// Probe the current machine. Prefer [`SnapshotCache::get_or_detect`]
    /// so repeated callers share one snapshot.
    pub fn detect() -> Result<Self, SnapshotError> {
        let total_ram_gb =
            ram::detect_total_ram_gb().ok_or(SnapshotError::RamUndetectable)?;
        let cpu_physical_cores = cpu::detect_physical_cores();
        let gpu = gpu::detect();
        let available_disk_space_gb = disk::detect_available_space_gb().unwrap_or(0.0);

        Ok(HardwareSpecs {
            total_ram_gb,
            cpu_physical_cores,
            gpu_vendor: gpu.vendor,
            gpu_vram_gb: mb_to_gb(gpu.vram_mb),
            available_disk_space_gb,
        })
    }
}

fn mb_to_gb(mb: u64) -> f64 {
    (mb as f64 / 1024.0 * 10.0).round() / 10.0
}

/// Write-once, process-lifetime cache for the hardware snapshot.
///
/// Owned by the caller and passed by reference to consumers; tests
/// construct their own instance (or preload a synthetic snapshot) so
/// nothing re-probes the OS behind their back.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    cell: OnceLock<Result<HardwareSpecs, SnapshotError>>,
}

impl SnapshotCache {
    pub const fn new() -> Self {
        SnapshotCache {
            cell: OnceLock::new(),
        }
    }

    /// A cache already holding the given snapshot; detection never runs.
    pub fn preloaded(specs: HardwareSpecs) -> Self {
        let cache = SnapshotCache::new();
        let _ = cache.cell.set(Ok(specs));
        cache
    }

    /// Detect on first call, then hand out the same snapshot forever.
    pub fn get_or_detect(&self) -> Result<&HardwareSpecs, SnapshotError> {
        self.cell
            .get_or_init(HardwareSpecs::detect)
            .as_ref()
            .map_err(Clone::clone)
    }
}
