//! Equicity CLI - run the suitability model over layer files on disk.
//!
//! Usage:
//!   equicity district_boundary.geojson roads.geojson depots.csv --output grid.geojson

use anyhow::{Context, Result};
use clap::Parser;
use equicity_core::{
    grid_to_geojson_string, BoundingBox, GridQuality, LayerHandle, PipelineConfig,
    SuitabilityPipeline, Summary,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Logistics-hub suitability grid for a district")]
struct Args {
    /// Layer files; the one named like "district" or "boundary" is the study area
    layers: Vec<PathBuf>,

    /// Grid cell size in meters
    #[arg(long)]
    cell_size_m: Option<f64>,

    /// Seed for reproducible scores
    #[arg(long)]
    seed: Option<u64>,

    /// Bounds used when no boundary layer is usable: minx,miny,maxx,maxy
    #[arg(long, value_parser = parse_bounds)]
    fallback_bounds: Option<BoundingBox>,

    /// Write the scored grid as GeoJSON
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    summary: &'a Summary,
    quality: GridQuality,
    warnings: &'a [String],
    generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

fn parse_bounds(value: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in bounds: {e}"))?;
    match parts.as_slice() {
        [min_x, min_y, max_x, max_y] => Ok(BoundingBox::new(*min_x, *min_y, *max_x, *max_y)),
        _ => Err(format!("expected 4 comma-separated values, got {}", parts.len())),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "equicity_core=info,equicity=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(cell_size_m) = args.cell_size_m {
        config = config.with_cell_size(cell_size_m);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(bounds) = args.fallback_bounds {
        config = config.with_fallback_bounds(bounds);
    }

    let mut layers = Vec::with_capacity(args.layers.len());
    for path in &args.layers {
        match LayerHandle::from_path(path) {
            Ok(layer) => layers.push(layer),
            Err(e) => tracing::warn!("Skipping unreadable layer {}: {}", path.display(), e),
        }
    }
    tracing::info!("Loaded {} of {} layers", layers.len(), args.layers.len());

    let run = SuitabilityPipeline::new(config).run(&layers);

    if let Some(output) = &args.output {
        let geojson = grid_to_geojson_string(&run.grid)?;
        std::fs::write(output, geojson)
            .with_context(|| format!("failed to write {}", output.display()))?;
        tracing::info!("Wrote {} cells to {}", run.grid.len(), output.display());
    }

    let report = Report {
        summary: &run.summary,
        quality: run.quality,
        warnings: &run.warnings,
        generated_at: run.generated_at.to_rfc3339(),
        output: args.output.as_ref().map(|p| p.display().to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
