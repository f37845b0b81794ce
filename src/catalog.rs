//! Model catalog definitions
//!
//! A catalog is an ordered list of [`ModelProfile`] entries. The
//! built-in catalog covers common local builds; a custom catalog can be
//! loaded from a TOML file via the config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which device a profile runs best on. A `Gpu` preference without a
/// `min_vram_gb` floor is soft: the build also runs on CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredDevice {
    Cpu,
    Gpu,
}

impl std::fmt::Display for PreferredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreferredDevice::Cpu => write!(f, "cpu"),
            PreferredDevice::Gpu => write!(f, "gpu"),
        }
    }
}

/// A local model build and its resource floors.
///
/// `min_vram_gb` present means the profile strictly requires a GPU with
/// at least that much VRAM; absent means the build is CPU-capable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    pub parameter_size_b: f64,
    pub context_window: u32,
    pub min_ram_gb: f64,
    pub min_cpu_cores: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_vram_gb: Option<f64>,
    pub preferred_device: PreferredDevice,
    #[serde(default)]
    pub notes: String,
}

/// The built-in catalog, ordered; earlier entries win selection ties.
pub fn default_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile {
            name: "llama3-70b-instruct-q4".to_string(),
            parameter_size_b: 70.0,
            context_window: 8192,
            min_ram_gb: 96.0,
            min_cpu_cores: 24,
            min_vram_gb: Some(48.0),
            preferred_device: PreferredDevice::Gpu,
            notes: "Top-tier quality when multiple high-end GPUs are present.".to_string(),
        },
        ModelProfile {
            name: "llama3-8b-instruct-q4".to_string(),
            parameter_size_b: 8.0,
            context_window: 8192,
            min_ram_gb: 16.0,
            min_cpu_cores: 4,
            min_vram_gb: Some(10.0),
            preferred_device: PreferredDevice::Gpu,
            notes: "Balanced GPU option with strong general-purpose performance.".to_string(),
        },
        ModelProfile {
            name: "mistral-7b-instruct-q4".to_string(),
            parameter_size_b: 7.0,
            context_window: 8192,
            min_ram_gb: 12.0,
            min_cpu_cores: 4,
            min_vram_gb: Some(8.0),
            preferred_device: PreferredDevice::Gpu,
            notes: "Reliable on mid-range GPUs with modest VRAM budgets.".to_string(),
        },
        ModelProfile {
            name: "qwen2.5-7b-instruct-gguf".to_string(),
            parameter_size_b: 7.0,
            context_window: 32768,
            min_ram_gb: 16.0,
            min_cpu_cores: 6,
            min_vram_gb: None,
            preferred_device: PreferredDevice::Cpu,
            notes: "Great for CPU-bound setups needing long context windows.".to_string(),
        },
        ModelProfile {
            name: "phi-3-mini-4k-instruct".to_string(),
            parameter_size_b: 3.8,
            context_window: 4096,
            min_ram_gb: 8.0,
            min_cpu_cores: 4,
            min_vram_gb: None,
            preferred_device: PreferredDevice::Cpu,
            notes: "Lightweight CPU baseline for compact machines.".to_string(),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "profile")]
    profiles: Vec<ModelProfile>,
}

/// Load a catalog from a TOML file of `[[profile]]` tables, in file
/// order.
pub fn load_from_file(path: &Path) -> Result<Vec<ModelProfile>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog from {}", path.display()))?;
    let parsed: CatalogFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse catalog from {}", path.display()))?;
    if parsed.profiles.is_empty() {
        anyhow::bail!("Catalog at {} contains no profiles", path.display());
    }
    for profile in &parsed.profiles {
        // TOML admits nan/inf float literals; they would poison the
        // selection ranking.
        let fields = [
            ("parameter_size_b", profile.parameter_size_b),
            ("min_ram_gb", profile.min_ram_gb),
            ("min_vram_gb", profile.min_vram_gb.unwrap_or(0.0)),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                anyhow::bail!(
                    "Profile '{}' in {} has a non-finite {}",
                    profile.name,
                    path.display(),
                    field
                );
            }
        }
    }
    Ok(parsed.profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_catalog_mixes_gpu_and_cpu_profiles() {
        let profiles = default_profiles();
        assert!(profiles
            .iter()
            .any(|p| p.preferred_device == PreferredDevice::Gpu));
        assert!(profiles
            .iter()
            .any(|p| p.preferred_device == PreferredDevice::Cpu));
    }

    #[test]
    fn strict_gpu_profiles_declare_a_vram_floor() {
        for profile in default_profiles() {
            if profile.min_vram_gb.is_some() {
                assert_eq!(profile.preferred_device, PreferredDevice::Gpu, "{}", profile.name);
            }
        }
    }

    #[test]
    fn profiles_serialize_without_absent_vram_floors() {
        let profiles = default_profiles();
        let json = serde_json::to_string(&profiles).expect("serializable catalog");
        assert!(json.contains("\"qwen2.5-7b-instruct-gguf\""));
        let cpu_entry = &profiles[4];
        let json = serde_json::to_string(cpu_entry).unwrap();
        assert!(!json.contains("min_vram_gb"));
    }

    #[test]
    fn catalog_loads_from_toml_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().expect("temp catalog");
        write!(
            file,
            r#"
[[profile]]
name = "tiny-test-model"
parameter_size_b = 1.0
context_window = 2048
min_ram_gb = 4.0
min_cpu_cores = 2
preferred_device = "cpu"

[[profile]]
name = "big-test-model"
parameter_size_b = 13.0
context_window = 8192
min_ram_gb = 32.0
min_cpu_cores = 8
min_vram_gb = 12.0
preferred_device = "gpu"
notes = "needs a real GPU"
"#
        )
        .expect("write catalog");

        let profiles = load_from_file(file.path()).expect("parsed catalog");
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "tiny-test-model");
        assert_eq!(profiles[0].min_vram_gb, None);
        assert_eq!(profiles[1].min_vram_gb, Some(12.0));
        assert_eq!(profiles[1].preferred_device, PreferredDevice::Gpu);
    }

    #[test]
    fn non_finite_floors_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp catalog");
        write!(
            file,
            r#"
[[profile]]
name = "nan-model"
parameter_size_b = nan
context_window = 2048
min_ram_gb = 4.0
min_cpu_cores = 2
preferred_device = "cpu"
"#
        )
        .expect("write catalog");

        let err = load_from_file(file.path()).expect_err("nan should be rejected");
        assert!(err.to_string().contains("non-finite parameter_size_b"));
    }

    #[test]
    fn empty_catalog_files_are_rejected() {
        let file = tempfile::NamedTempFile::new().expect("temp catalog");
        assert!(load_from_file(file.path()).is_err());
    }
}
