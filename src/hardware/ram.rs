//! RAM detection module
//!
//! Detects total system RAM using:
//! - Cross-platform: sysinfo
//! - Linux: /proc/meminfo fallback

use sysinfo::System;
use tracing::debug;

#[cfg(target_os = "linux")]
use std::fs;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Detect total system RAM in GB.
///
/// Returns `None` only when every detection source fails. Zero is never
/// reported as a valid total; an undetectable total must stay
/// distinguishable from an empty reading.
pub fn detect_total_ram_gb() -> Option<f64> {
    if let Some(gb) = sysinfo_total_ram_gb() {
        return Some(gb);
    }

    #[cfg(target_os = "linux")]
    if let Some(gb) = meminfo_total_ram_gb() {
        return Some(gb);
    }

    debug!("total RAM undetectable on this system");
    None
}

fn sysinfo_total_ram_gb() -> Option<f64> {
    let mut sys = System::new();
    sys.refresh_memory();

    let total_bytes = sys.total_memory();
    if total_bytes == 0 {
        return None;
    }
    Some(bytes_to_gb(total_bytes))
}

/// Read MemTotal from /proc/meminfo (Linux only).
#[cfg(target_os = "linux")]
fn meminfo_total_ram_gb() -> Option<f64> {
    let content = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total(&content)
}

/// Extract the MemTotal value from /proc/meminfo contents.
///
/// Format: "MemTotal:       16384000 kB"
#[cfg(target_os = "linux")]
fn parse_meminfo_total(content: &str) -> Option<f64> {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            if kb == 0 {
                return None;
            }
            return Some(bytes_to_gb(kb * 1024));
        }
    }
    None
}

/// Convert bytes to GB, rounded to one decimal place.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    (bytes as f64 / GIB * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_gb_rounds_to_one_decimal() {
        assert_eq!(bytes_to_gb(16 * 1024 * 1024 * 1024), 16.0);
        assert_eq!(bytes_to_gb(17_100_000_000), 15.9);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn parse_meminfo_extracts_mem_total() {
        let content = "MemTotal:       16384000 kB\nMemFree:         1024000 kB\n";
        let gb = parse_meminfo_total(content).expect("expected MemTotal");
        assert!((gb - 15.6).abs() < 0.1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn parse_meminfo_rejects_zero_and_garbage() {
        assert_eq!(parse_meminfo_total("MemTotal:       0 kB\n"), None);
        assert_eq!(parse_meminfo_total("MemFree: 12 kB\n"), None);
        assert_eq!(parse_meminfo_total("MemTotal: lots\n"), None);
    }
}
