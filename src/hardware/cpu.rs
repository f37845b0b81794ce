//! CPU detection module
//!
//! Detects the physical core count using sysinfo, falling back to the
//! logical CPU count when physical topology is unavailable.

use sysinfo::System;
use tracing::debug;

/// Detect the number of physical CPU cores.
///
/// Never fails: an undetectable core count degrades to 1 so that every
/// model profile with `min_cpu_cores = 1` stays reachable.
pub fn detect_physical_cores() -> usize {
    let mut sys = System::new();
    sys.refresh_cpu_all();

    if let Some(cores) = sys.physical_core_count() {
        if cores >= 1 {
            return cores;
        }
    }

    let logical = sys.cpus().len();
    if logical >= 1 {
        debug!(logical, "physical core count unavailable, using logical count");
        return logical;
    }

    debug!("CPU core count undetectable, assuming a single core");
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_core_count_is_at_least_one() {
        assert!(detect_physical_cores() >= 1);
    }
}
