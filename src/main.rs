//! bestllm - recommends the best-fitting local LLM for this machine
//!
//! Probes the local hardware (RAM, CPU cores, GPU/VRAM, disk) once per
//! process and matches the snapshot against a catalog of model resource
//! profiles. Exit codes: 1 when no model fits, 2 when the hardware is
//! undetectable.

mod catalog;
mod config;
mod hardware;
mod selector;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::catalog::ModelProfile;
use crate::config::Config;
use crate::hardware::{HardwareSpecs, SnapshotCache};
use crate::selector::select;

const EXIT_NO_SUITABLE_MODEL: u8 = 1;
const EXIT_HARDWARE_UNDETECTABLE: u8 = 2;

/// bestllm - pick a local model your machine can actually run
#[derive(Parser)]
#[command(name = "bestllm")]
#[command(version)]
#[command(about = "Recommend the best-fitting local LLM for this machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect hardware and print the recommended model (default)
    Recommend,

    /// Print the detected hardware snapshot
    Hardware {
        /// Emit the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the model catalog in selection order
    Catalog {
        /// Emit the catalog as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("BESTLLM_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let snapshot = SnapshotCache::new();

    let result = match cli.command.unwrap_or(Commands::Recommend) {
        Commands::Recommend => run_recommend(&snapshot),
        Commands::Hardware { json } => run_hardware(&snapshot, json),
        Commands::Catalog { json } => run_catalog(json),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run_recommend(snapshot: &SnapshotCache) -> Result<ExitCode> {
    let config = Config::load()?;
    let profiles = config.model_profiles()?;

    let specs = match snapshot.get_or_detect() {
        Ok(specs) => specs,
        Err(err) => {
            eprintln!("bestllm: {err}");
            return Ok(ExitCode::from(EXIT_HARDWARE_UNDETECTABLE));
        }
    };

    match select(specs, &profiles) {
        Ok(profile) => {
            print_recommendation(specs, profile);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("bestllm: {err}");
            Ok(ExitCode::from(EXIT_NO_SUITABLE_MODEL))
        }
    }
}

fn print_recommendation(specs: &HardwareSpecs, profile: &ModelProfile) {
    println!(
        "Recommended model: {} ({} token context window).",
        profile.name.green().bold(),
        group_thousands(profile.context_window)
    );

    let vram_requirement = profile
        .min_vram_gb
        .map(|v| format!("{v}GB"))
        .unwrap_or_else(|| "no".to_string());
    println!(
        "Summary: requires >= {}GB RAM, >= {} CPU cores, {} GPU VRAM requirement.",
        profile.min_ram_gb, profile.min_cpu_cores, vram_requirement
    );

    if specs.has_gpu() {
        println!(
            "Detected {} GPU with {:.1}GB VRAM; using a GPU-friendly profile.",
            specs.gpu_vendor, specs.gpu_vram_gb
        );
    } else {
        println!("Detected CPU-only environment; recommending a CPU-optimized build.");
    }

    if !profile.notes.is_empty() {
        println!("{}", profile.notes.dimmed());
    }
}

fn run_hardware(snapshot: &SnapshotCache, json: bool) -> Result<ExitCode> {
    let specs = match snapshot.get_or_detect() {
        Ok(specs) => specs,
        Err(err) => {
            eprintln!("bestllm: {err}");
            return Ok(ExitCode::from(EXIT_HARDWARE_UNDETECTABLE));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(specs)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("RAM:  {:.1} GB", specs.total_ram_gb);
    println!("CPU:  {} physical cores", specs.cpu_physical_cores);
    if specs.has_gpu() {
        println!("GPU:  {} ({:.1} GB VRAM)", specs.gpu_vendor, specs.gpu_vram_gb);
    } else {
        println!("GPU:  none usable");
    }
    println!("Disk: {:.1} GB free", specs.available_disk_space_gb);

    Ok(ExitCode::SUCCESS)
}

fn run_catalog(json: bool) -> Result<ExitCode> {
    let config = Config::load()?;
    let profiles = config.model_profiles()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(ExitCode::SUCCESS);
    }

    for profile in &profiles {
        let vram = profile
            .min_vram_gb
            .map(|v| format!("{v}GB VRAM"))
            .unwrap_or_else(|| "no VRAM floor".to_string());
        println!(
            "{}  {}B params, {} context, >= {}GB RAM, >= {} cores, {}, prefers {}",
            profile.name.bold(),
            profile.parameter_size_b,
            group_thousands(profile.context_window),
            profile.min_ram_gb,
            profile.min_cpu_cores,
            vram,
            profile.preferred_device
        );
        if !profile.notes.is_empty() {
            println!("    {}", profile.notes.dimmed());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Format an integer with comma-grouped thousands (32768 -> "32,768").
fn group_thousands(value: u32) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
