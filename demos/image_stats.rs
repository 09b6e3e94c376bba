//! Image statistics for a MIRIAD or FITS image
//!
//! This example demonstrates:
//! - Environment/JSON configuration (`APERCAL_TMPDIR`, `APERCAL_MIRIAD_FITS`)
//! - Format resolution and MIRIAD → FITS conversion
//! - NaN-aware min/max/rms
//!
//! Run with: cargo run --example image_stats -- <image> [config.json]
//! Without arguments a small demo FITS image is generated.
//! Set `RUST_LOG=debug` to see classification and conversion details.

use anyhow::Context;
use apercal_imstats::fits::write_primary_image;
use apercal_imstats::{classify, StatsConfig, TempWorkspaceManager};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    // Holds the generated demo image; removed on drop
    let mut demo_workspace = None;
    let image = if let Some(path) = args.next() {
        PathBuf::from(path)
    } else {
        let mut workspace = TempWorkspaceManager::default().acquire("demo")?;
        let path = workspace.artifact_path("fits");
        let samples: Vec<f64> = (0..100)
            .map(|i| if i % 10 == 0 { f64::NAN } else { (f64::from(i) * 0.1).sin() })
            .collect();
        write_primary_image(&path, &[10, 10], &samples)?;
        demo_workspace = Some(workspace);
        path
    };

    let config = match args.next() {
        Some(config_path) => {
            let json = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {config_path}"))?;
            StatsConfig::from_json(&json)?
        }
        None => StatsConfig::from_env(),
    };

    println!("=== apercal-imstats ===\n");
    println!("Image:   {}", image.display());
    println!("Format:  {}", classify(&image));

    let computer = config.builder().build();
    let stats = computer
        .compute_stats(&image)
        .with_context(|| format!("computing statistics for {}", image.display()))?;

    println!("Backend: {:?}\n", computer.backend());
    println!("  min = {}", stats.min());
    println!("  max = {}", stats.max());
    println!("  rms = {}", stats.rms());
    if stats.is_undefined() {
        println!("\n  (no valid samples)");
    }
    println!("\n{}", serde_json::to_string_pretty(&stats)?);

    drop(demo_workspace);
    Ok(())
}
