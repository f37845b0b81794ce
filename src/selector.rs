//! Model selection logic
//!
//! Pure function from a hardware snapshot and a catalog to the single
//! best-fitting profile. Filtering and ranking are deterministic;
//! catalog order breaks remaining ties.

use std::cmp::Ordering;

use thiserror::Error;

use crate::catalog::{ModelProfile, PreferredDevice};
use crate::hardware::HardwareSpecs;

/// Absorbs floating point rounding in the resource comparisons.
const TOLERANCE: f64 = 1e-6;

/// The expected outcome when hardware sits below every profile floor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no local model fits the detected hardware")]
pub struct NoSuitableModelError;

/// Pick the best-fitting profile for the given hardware.
///
/// Surviving candidates are ranked by GPU-preference bonus, then
/// context window, then parameter size; the first catalog entry wins
/// any remaining tie.
pub fn select<'a>(
    specs: &HardwareSpecs,
    catalog: &'a [ModelProfile],
) -> Result<&'a ModelProfile, NoSuitableModelError> {
    let mut best: Option<(&'a ModelProfile, (u8, u32, f64))> = None;

    for profile in catalog.iter().filter(|p| meets_requirements(p, specs)) {
        let score = score(profile, specs);
        match best {
            // Strictly-greater keeps the earliest max, so catalog order
            // decides full ties.
            Some((_, best_score)) if score_cmp(score, best_score) != Ordering::Greater => {}
            _ => best = Some((profile, score)),
        }
    }

    best.map(|(profile, _)| profile).ok_or(NoSuitableModelError)
}

/// Filtering predicate, monotone in each resource dimension.
fn meets_requirements(profile: &ModelProfile, specs: &HardwareSpecs) -> bool {
    if specs.total_ram_gb + TOLERANCE < profile.min_ram_gb {
        return false;
    }
    if specs.cpu_physical_cores < profile.min_cpu_cores {
        return false;
    }
    match profile.min_vram_gb {
        Some(min_vram) => {
            if specs.gpu_vram_gb + TOLERANCE < min_vram {
                return false;
            }
        }
        None => {
            // A GPU-preferring but CPU-capable profile is still a poor
            // recommendation on a machine with no usable GPU.
            if profile.preferred_device == PreferredDevice::Gpu && !specs.has_gpu() {
                return false;
            }
        }
    }
    true
}

fn score(profile: &ModelProfile, specs: &HardwareSpecs) -> (u8, u32, f64) {
    let gpu_bonus = u8::from(profile.preferred_device == PreferredDevice::Gpu && specs.has_gpu());
    (gpu_bonus, profile.context_window, profile.parameter_size_b)
}

/// Total order over scores. `total_cmp` on the parameter-size key keeps
/// the ranking well-defined even if a hand-edited catalog sneaks a
/// non-finite value past validation.
fn score_cmp(a: (u8, u32, f64), b: (u8, u32, f64)) -> Ordering {
    a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.total_cmp(&b.2))
}
