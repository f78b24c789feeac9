//! Batch-runs a `.mpn` net description and writes traces and summary files.

use std::fs;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use macchiato::batch::{self, BatchConfig};
use macchiato::cli::Cli;
use macchiato::summary;
use macchiato::trace::Projection;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {:?}", cli.input))?;
    let net = macchiato::parser::parse(&text).context("parsing net description")?;

    let config = BatchConfig {
        fixed_runs: cli.runs,
        concatenate: cli.concatenate,
        out_dir: cli.out_dir.clone(),
        projection: Projection {
            places: cli.places.clone(),
            transitions: cli.transitions.clone(),
        },
        seed: cli.seed,
        sequential: cli.sequential,
    };

    tracing::info!(name = %net.config.name, mode = net.config.run_mode.as_str(), "starting batch");
    let started = Instant::now();
    let (tally, stats) = batch::run_batch(&net, &config).context("running batch")?;
    let wall_time = started.elapsed();

    summary::write_summary(&net, &tally, wall_time, &cli.out_dir)
        .context("writing summary")?;
    if let Some(stats) = &stats {
        summary::write_bucket_stats(&net, stats, &cli.out_dir)
            .context("writing bucket statistics")?;
    }

    tracing::info!(
        runs = tally.runs,
        wall_time_s = wall_time.as_secs_f64(),
        "batch complete"
    );

    Ok(())
}
