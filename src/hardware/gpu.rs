//! GPU detection module
//!
//! Detects GPU vendor and total VRAM through an ordered cascade:
//! 1. Vendor compute runtime libraries (CUDA/HIP via dlopen)
//! 2. Vendor system tools (nvidia-smi, rocm-smi; wmic on Windows) and
//!    /sys/class/drm pseudo-files on Linux
//! 3. Metal recommended working set on macOS (unified memory)
//!
//! Every probe is best-effort: a missing library, absent tool, parse
//! failure or timeout means "this strategy found nothing" and the next
//! one runs. The detector itself never fails; a machine with no usable
//! GPU reports `(Unknown, 0)`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound for one vendor-tool invocation. A tool that exists but
/// hangs must not stall the whole snapshot.
const TOOL_TIMEOUT: Duration = Duration::from_secs(2);

const MIB: u64 = 1024 * 1024;

/// GPU vendor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GpuVendor {
    Unknown,
    Nvidia,
    Amd,
    AppleSilicon,
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuVendor::Unknown => write!(f, "Unknown"),
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::AppleSilicon => write!(f, "Apple Silicon"),
        }
    }
}

/// One detection result: vendor plus total VRAM summed across all
/// devices of that vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuReading {
    pub vendor: GpuVendor,
    pub vram_mb: u64,
}

impl GpuReading {
    /// The "no usable GPU" reading every failed cascade degrades to.
    pub const NONE: GpuReading = GpuReading {
        vendor: GpuVendor::Unknown,
        vram_mb: 0,
    };
}

/// Probe inputs for one detection run. [`detect`] always uses the host
/// environment; tests substitute unloadable libraries, absent tools and
/// an empty drm tree to exercise the composed fallback order.
struct ProbeEnvironment<'a> {
    runtimes: &'a [ComputeRuntime],
    nvidia_smi: &'a str,
    rocm_smi: &'a str,
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    wmic: &'a str,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    drm_root: &'a Path,
}

impl ProbeEnvironment<'static> {
    fn host() -> Self {
        ProbeEnvironment {
            runtimes: COMPUTE_RUNTIMES,
            nvidia_smi: "nvidia-smi",
            rocm_smi: "rocm-smi",
            wmic: "wmic",
            drm_root: Path::new("/sys/class/drm"),
        }
    }
}

/// Detect the GPU vendor and total VRAM.
///
/// First strategy reporting a device wins; all internal failures are
/// swallowed and this function never errors.
pub fn detect() -> GpuReading {
    detect_with(&ProbeEnvironment::host())
}

fn detect_with(env: &ProbeEnvironment<'_>) -> GpuReading {
    if let Some(reading) = runtime_library_probe(env.runtimes) {
        debug!(vendor = %reading.vendor, vram_mb = reading.vram_mb, "GPU found via compute runtime");
        return reading;
    }

    if let Some(reading) = system_tool_probe(env) {
        debug!(vendor = %reading.vendor, vram_mb = reading.vram_mb, "GPU found via system tool");
        return reading;
    }

    #[cfg(target_os = "macos")]
    if let Some(reading) = unified_memory_probe() {
        debug!(vram_mb = reading.vram_mb, "GPU found via Metal working set");
        return reading;
    }

    debug!("no usable GPU detected");
    GpuReading::NONE
}

// ---------------------------------------------------------------------------
// Strategy 1: vendor compute runtime libraries
// ---------------------------------------------------------------------------

/// A loadable vendor runtime and the symbols we need from it. CUDA and
/// HIP expose the same shapes under different names, so one generic
/// prober walks this table instead of duplicating per-vendor branches.
struct ComputeRuntime {
    vendor: GpuVendor,
    /// Candidate shared library names, newest version first.
    libraries: &'static [&'static str],
    device_count: &'static [u8],
    set_device: &'static [u8],
    mem_get_info: &'static [u8],
}

#[cfg(target_os = "linux")]
const CUDA_LIBRARIES: &[&str] = &[
    "libcudart.so.13",
    "libcudart.so.12",
    "libcudart.so.11.0",
    "libcudart.so",
];
#[cfg(target_os = "windows")]
const CUDA_LIBRARIES: &[&str] = &[
    "cudart64_13.dll",
    "cudart64_12.dll",
    "cudart64_110.dll",
    "cudart64_102.dll",
];
#[cfg(target_os = "macos")]
const CUDA_LIBRARIES: &[&str] = &[];

#[cfg(target_os = "linux")]
const HIP_LIBRARIES: &[&str] = &["libamdhip64.so.6", "libamdhip64.so.5", "libamdhip64.so"];
#[cfg(target_os = "windows")]
const HIP_LIBRARIES: &[&str] = &["amdhip64_6.dll", "amdhip64.dll"];
#[cfg(target_os = "macos")]
const HIP_LIBRARIES: &[&str] = &[];

const COMPUTE_RUNTIMES: &[ComputeRuntime] = &[
    ComputeRuntime {
        vendor: GpuVendor::Nvidia,
        libraries: CUDA_LIBRARIES,
        device_count: b"cudaGetDeviceCount",
        set_device: b"cudaSetDevice",
        mem_get_info: b"cudaMemGetInfo",
    },
    ComputeRuntime {
        vendor: GpuVendor::Amd,
        libraries: HIP_LIBRARIES,
        device_count: b"hipGetDeviceCount",
        set_device: b"hipSetDevice",
        mem_get_info: b"hipMemGetInfo",
    },
];

type DeviceCountFn = unsafe extern "C" fn(*mut i32) -> i32;
type SetDeviceFn = unsafe extern "C" fn(i32) -> i32;
type MemGetInfoFn = unsafe extern "C" fn(*mut usize, *mut usize) -> i32;

fn runtime_library_probe(runtimes: &[ComputeRuntime]) -> Option<GpuReading> {
    for runtime in runtimes {
        for name in runtime.libraries {
            if let Some(vram_mb) = probe_runtime_library(runtime, name) {
                return Some(GpuReading {
                    vendor: runtime.vendor,
                    vram_mb,
                });
            }
        }
    }
    None
}

/// Load one candidate library and ask it how many devices it sees.
///
/// A library that loads and reports at least one device wins even when
/// the per-device memory query fails; the reading then carries whatever
/// the partial sum came to, possibly 0.
fn probe_runtime_library(runtime: &ComputeRuntime, name: &str) -> Option<u64> {
    let lib = match unsafe { libloading::Library::new(name) } {
        Ok(lib) => lib,
        Err(err) => {
            debug!(library = name, %err, "runtime library not loadable");
            return None;
        }
    };

    let device_count: libloading::Symbol<DeviceCountFn> =
        unsafe { lib.get(runtime.device_count) }.ok()?;
    let mut count: i32 = 0;
    if unsafe { device_count(&mut count) } != 0 || count <= 0 {
        return None;
    }

    let mut total_bytes: u64 = 0;
    let set_device: Result<libloading::Symbol<SetDeviceFn>, _> =
        unsafe { lib.get(runtime.set_device) };
    let mem_get_info: Result<libloading::Symbol<MemGetInfoFn>, _> =
        unsafe { lib.get(runtime.mem_get_info) };
    if let (Ok(set_device), Ok(mem_get_info)) = (set_device, mem_get_info) {
        for device in 0..count {
            if unsafe { set_device(device) } != 0 {
                continue;
            }
            let mut free: usize = 0;
            let mut total: usize = 0;
            if unsafe { mem_get_info(&mut free, &mut total) } == 0 {
                total_bytes += total as u64;
            }
        }
    }

    Some(total_bytes / MIB)
}

// ---------------------------------------------------------------------------
// Strategy 2: vendor system tools and kernel pseudo-files
// ---------------------------------------------------------------------------

fn system_tool_probe(env: &ProbeEnvironment<'_>) -> Option<GpuReading> {
    if let Some(reading) = nvidia_smi_probe(env.nvidia_smi) {
        return Some(reading);
    }
    if let Some(reading) = rocm_smi_probe(env.rocm_smi) {
        return Some(reading);
    }

    #[cfg(target_os = "windows")]
    if let Some(reading) = wmic_probe(env.wmic) {
        return Some(reading);
    }

    #[cfg(target_os = "linux")]
    if let Some(reading) = scan_drm_devices(env.drm_root) {
        return Some(reading);
    }

    None
}

fn nvidia_smi_probe(tool: &str) -> Option<GpuReading> {
    let stdout = run_with_timeout(
        tool,
        &["--query-gpu=memory.total", "--format=csv,noheader,nounits"],
        TOOL_TIMEOUT,
    )?;
    let vram_mb = parse_nvidia_smi_memory(&stdout)?;
    Some(GpuReading {
        vendor: GpuVendor::Nvidia,
        vram_mb,
    })
}

/// Sum memory.total values, one MiB figure per line per device.
/// Any unparseable line taints the whole reading; this strategy then
/// reports nothing rather than a partial total.
fn parse_nvidia_smi_memory(stdout: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut devices = 0usize;
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        total += line.parse::<u64>().ok()?;
        devices += 1;
    }
    (devices > 0 && total > 0).then_some(total)
}

fn rocm_smi_probe(tool: &str) -> Option<GpuReading> {
    let stdout = run_with_timeout(tool, &["--showmeminfo", "vram"], TOOL_TIMEOUT)?;
    let vram_mb = parse_rocm_smi_memory(&stdout)?;
    Some(GpuReading {
        vendor: GpuVendor::Amd,
        vram_mb,
    })
}

/// Sum the "VRAM Total Memory" key-value lines across devices.
///
/// Example line: `GPU[0]  : VRAM Total Memory (B): 17163091968`
fn parse_rocm_smi_memory(stdout: &str) -> Option<u64> {
    let mut total_mb = 0u64;
    for line in stdout.lines() {
        if !line.contains("VRAM Total") && !line.contains("Total Memory") {
            continue;
        }
        // rocm-smi also prints "VRAM Total Used Memory" right below the
        // capacity line; counting it would double-report.
        if line.contains("Used") {
            continue;
        }
        let value = line.rsplit(':').next().unwrap_or("").trim();
        let Ok(number) = value.parse::<u64>() else {
            continue;
        };
        total_mb += normalize_to_mb(number);
    }
    (total_mb > 0).then_some(total_mb)
}

/// rocm-smi reports bytes on current builds and megabytes on older ones.
fn normalize_to_mb(value: u64) -> u64 {
    if value >= 1 << 30 {
        value / MIB
    } else {
        value
    }
}

#[cfg(target_os = "windows")]
fn wmic_probe(tool: &str) -> Option<GpuReading> {
    let stdout = run_with_timeout(
        tool,
        &[
            "path",
            "win32_VideoController",
            "get",
            "AdapterRAM,Name",
            "/format:csv",
        ],
        TOOL_TIMEOUT,
    )?;
    parse_wmic_adapters(&stdout)
}

/// Parse wmic CSV output (Node,AdapterRAM,Name with a header row).
/// Adapters of unrecognized vendors are skipped; a machine whose only
/// GPU we cannot attribute falls through to the next strategy.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_wmic_adapters(stdout: &str) -> Option<GpuReading> {
    let mut nvidia_mb = 0u64;
    let mut amd_mb = 0u64;
    for line in stdout.lines().map(str::trim) {
        if line.is_empty() || line.contains("AdapterRAM") {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 3 {
            continue;
        }
        let Ok(bytes) = parts[1].trim().parse::<u64>() else {
            continue;
        };
        let name = parts[2].trim();
        match vendor_from_name(name) {
            GpuVendor::Nvidia => nvidia_mb += bytes / MIB,
            GpuVendor::Amd => amd_mb += bytes / MIB,
            _ => {}
        }
    }
    pick_vendor_total(nvidia_mb, amd_mb)
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn vendor_from_name(name: &str) -> GpuVendor {
    if name.contains("NVIDIA") || name.contains("GeForce") || name.contains("Quadro") {
        GpuVendor::Nvidia
    } else if name.contains("AMD") || name.contains("Radeon") || name.contains("ATI") {
        GpuVendor::Amd
    } else {
        GpuVendor::Unknown
    }
}

/// Walk a drm sysfs tree (card0, card1, ... without connector suffixes)
/// and sum mem_info_vram_total per PCI vendor id.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn scan_drm_devices(root: &Path) -> Option<GpuReading> {
    let mut nvidia_mb = 0u64;
    let mut amd_mb = 0u64;

    let entries = fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("card") || name.contains('-') {
            continue;
        }

        let device = entry.path().join("device");
        let Ok(vendor_id) = fs::read_to_string(device.join("vendor")) else {
            continue;
        };
        let Ok(vram) = fs::read_to_string(device.join("mem_info_vram_total")) else {
            continue;
        };
        let Ok(bytes) = vram.trim().parse::<u64>() else {
            continue;
        };

        match vendor_id.trim() {
            "0x10de" => nvidia_mb += bytes / MIB,
            "0x1002" => amd_mb += bytes / MIB,
            _ => {}
        }
    }

    pick_vendor_total(nvidia_mb, amd_mb)
}

/// With devices from mixed vendors present, report the vendor holding
/// the larger total. Per-card readings are out of scope here.
#[cfg_attr(target_os = "macos", allow(dead_code))]
fn pick_vendor_total(nvidia_mb: u64, amd_mb: u64) -> Option<GpuReading> {
    if nvidia_mb == 0 && amd_mb == 0 {
        return None;
    }
    if nvidia_mb >= amd_mb {
        Some(GpuReading {
            vendor: GpuVendor::Nvidia,
            vram_mb: nvidia_mb,
        })
    } else {
        Some(GpuReading {
            vendor: GpuVendor::Amd,
            vram_mb: amd_mb,
        })
    }
}

// ---------------------------------------------------------------------------
// Strategy 3: unified memory (macOS)
// ---------------------------------------------------------------------------

/// Apple Silicon shares one memory pool between CPU and GPU; the Metal
/// default device's recommended working set is the closest analogue to
/// dedicated VRAM.
#[cfg(target_os = "macos")]
fn unified_memory_probe() -> Option<GpuReading> {
    let device = metal::Device::system_default()?;
    let bytes = device.recommended_max_working_set_size();
    if bytes == 0 {
        return None;
    }
    Some(GpuReading {
        vendor: GpuVendor::AppleSilicon,
        vram_mb: bytes / MIB,
    })
}

// ---------------------------------------------------------------------------
// Subprocess plumbing
// ---------------------------------------------------------------------------

/// Run a tool and capture stdout, killing it past the deadline.
/// Returns `None` for a missing tool, non-zero exit, or timeout.
fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    debug!(program, "tool probe timed out");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                thread::sleep(Duration::from_millis(25));
            }
            Err(_) => return None,
        }
    }

    let output = child.wait_with_output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn nvidia_smi_memory_sums_all_devices() {
        let stdout = "24576\n24576\n";
        assert_eq!(parse_nvidia_smi_memory(stdout), Some(49152));
    }

    #[test]
    fn nvidia_smi_memory_rejects_unparseable_output() {
        assert_eq!(parse_nvidia_smi_memory(""), None);
        assert_eq!(parse_nvidia_smi_memory("NVIDIA-SMI has failed\n"), None);
        assert_eq!(parse_nvidia_smi_memory("24576\noops\n"), None);
    }

    #[test]
    fn rocm_smi_memory_handles_bytes_and_megabytes() {
        let bytes = "GPU[0]\t\t: VRAM Total Memory (B): 17163091968\n";
        assert_eq!(parse_rocm_smi_memory(bytes), Some(16368));

        let megabytes = "GPU[0] VRAM Total: 16368\n";
        assert_eq!(parse_rocm_smi_memory(megabytes), Some(16368));
    }

    #[test]
    fn rocm_smi_memory_sums_multiple_gpus() {
        let stdout = "GPU[0] : VRAM Total Memory (B): 17163091968\n\
                      GPU[1] : VRAM Total Memory (B): 17163091968\n";
        assert_eq!(parse_rocm_smi_memory(stdout), Some(32736));
    }

    #[test]
    fn rocm_smi_memory_skips_used_memory_lines() {
        let stdout = "======= ROCm System Management Interface =======\n\
                      GPU[0] : VRAM Total Memory (B): 17163091968\n\
                      GPU[0] : VRAM Total Used Memory (B): 5000000\n";
        assert_eq!(parse_rocm_smi_memory(stdout), Some(16368));
        assert_eq!(parse_rocm_smi_memory("no memory lines here\n"), None);
    }

    #[test]
    fn wmic_adapters_skip_header_and_pick_known_vendor() {
        let stdout = "\r\nNode,AdapterRAM,Name\r\n\
                      DESKTOP,12884901888,NVIDIA GeForce RTX 4070 Super\r\n\
                      DESKTOP,1073741824,Some Integrated Adapter\r\n";
        let reading = parse_wmic_adapters(stdout).expect("expected a reading");
        assert_eq!(reading.vendor, GpuVendor::Nvidia);
        assert_eq!(reading.vram_mb, 12288);
    }

    #[test]
    fn wmic_adapters_with_no_known_vendor_yield_nothing() {
        let stdout = "Node,AdapterRAM,Name\nDESKTOP,1073741824,Mystery Adapter\n";
        assert_eq!(parse_wmic_adapters(stdout), None);
    }

    #[test]
    fn drm_scan_sums_same_vendor_cards_and_skips_connectors() {
        let root = tempfile::tempdir().expect("tempdir");

        for (card, vendor, bytes) in [
            ("card0", "0x1002", 17_179_869_184u64),
            ("card1", "0x1002", 8_589_934_592),
        ] {
            let device = root.path().join(card).join("device");
            fs::create_dir_all(&device).unwrap();
            fs::write(device.join("vendor"), format!("{vendor}\n")).unwrap();
            fs::write(device.join("mem_info_vram_total"), format!("{bytes}\n")).unwrap();
        }
        // Connector entries carry a '-' and must not be scanned.
        fs::create_dir_all(root.path().join("card0-DP-1")).unwrap();

        let reading = scan_drm_devices(root.path()).expect("expected a reading");
        assert_eq!(reading.vendor, GpuVendor::Amd);
        assert_eq!(reading.vram_mb, 16384 + 8192);
    }

    #[test]
    fn drm_scan_without_vram_files_yields_nothing() {
        let root = tempfile::tempdir().expect("tempdir");
        let device = root.path().join("card0").join("device");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("vendor"), "0x8086\n").unwrap();
        assert_eq!(scan_drm_devices(root.path()), None);
    }

    #[test]
    fn mixed_vendor_totals_prefer_the_larger_pool() {
        let reading = pick_vendor_total(8192, 16384).unwrap();
        assert_eq!(reading.vendor, GpuVendor::Amd);
        assert_eq!(pick_vendor_total(0, 0), None);
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_captures_output() {
        let stdout = run_with_timeout("echo", &["hello"], Duration::from_secs(2));
        assert_eq!(stdout.as_deref().map(str::trim), Some("hello"));
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_kills_hanging_tools() {
        let started = Instant::now();
        let stdout = run_with_timeout("sleep", &["10"], Duration::from_millis(200));
        assert_eq!(stdout, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn run_with_timeout_handles_missing_tools() {
        let stdout = run_with_timeout(
            "definitely-not-a-real-gpu-tool",
            &[],
            Duration::from_millis(200),
        );
        assert_eq!(stdout, None);
    }

    #[test]
    fn none_reading_reports_no_vendor_and_no_memory() {
        assert_eq!(GpuReading::NONE.vendor, GpuVendor::Unknown);
        assert_eq!(GpuReading::NONE.vram_mb, 0);
    }

    #[test]
    fn unloadable_runtime_library_probes_nothing() {
        assert_eq!(
            probe_runtime_library(&COMPUTE_RUNTIMES[0], "libdoesnotexist-gpu-runtime.so"),
            None
        );
    }

    // On macOS the unified-memory strategy would report the real GPU,
    // so the all-strategies-fail cascade is only observable elsewhere.
    #[cfg(not(target_os = "macos"))]
    #[test]
    fn cascade_degrades_to_none_when_every_strategy_fails() {
        let missing_runtimes = [ComputeRuntime {
            vendor: GpuVendor::Nvidia,
            libraries: &["libdoesnotexist-gpu-runtime.so"],
            device_count: b"cudaGetDeviceCount",
            set_device: b"cudaSetDevice",
            mem_get_info: b"cudaMemGetInfo",
        }];
        let empty_drm = tempfile::tempdir().expect("tempdir");

        let env = ProbeEnvironment {
            runtimes: &missing_runtimes,
            nvidia_smi: "definitely-not-nvidia-smi",
            rocm_smi: "definitely-not-rocm-smi",
            wmic: "definitely-not-wmic",
            drm_root: empty_drm.path(),
        };

        assert_eq!(detect_with(&env), GpuReading::NONE);
    }
}
