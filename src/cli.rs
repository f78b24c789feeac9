//! Command-line argument surface for the `macchiato` binary (`spec.md` §6).

use std::path::PathBuf;

use clap::Parser;

/// Runs a Monte Carlo batch of an extended, timed Petri net described in a
/// `.mpn` file.
#[derive(Parser, Debug)]
#[command(name = "macchiato", version, about)]
pub struct Cli {
    /// Path to the `.mpn` net description.
    pub input: PathBuf,

    /// Number of independent runs. Overrides the net's `simsFactor` budget
    /// when given; omit to stop once `maxClock * simsFactor` simulated time
    /// has been spent.
    pub runs: Option<u64>,

    /// Directory under which `<name>/` trace, summary, and stats files are
    /// written. Defaults to the current directory.
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Appends every run's trace rows into one shared file per stream
    /// instead of writing a file per run.
    #[arg(long)]
    pub concatenate: bool,

    /// Only emit trace columns for these place labels (comma-separated).
    /// Defaults to every place in the net.
    #[arg(long, value_delimiter = ',')]
    pub places: Option<Vec<String>>,

    /// Only emit trace columns for these transition labels (comma-separated).
    /// Defaults to every transition in the net.
    #[arg(long, value_delimiter = ',')]
    pub transitions: Option<Vec<String>>,

    /// Base RNG seed. Each run uses `seed ^ run_index`.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Forces the single-threaded run path even when a fixed run count
    /// would otherwise run in parallel. Useful for debugging and for
    /// reproducing a batch deterministically on a single core.
    #[arg(long)]
    pub sequential: bool,

    /// Enables `info`-level logging in addition to the default `warn`.
    #[arg(short, long)]
    pub verbose: bool,
}
