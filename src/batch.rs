//! Monte Carlo batch runner (`spec.md` §4.7).

use std::path::PathBuf;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::prelude::*;

use crate::engine;
use crate::error::EngineError;
use crate::net::Net;
use crate::trace::{Projection, TraceWriter};

/// Output destination and projection shared by every run in a batch.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Fixed number of runs, or `None` to stop by the `simsFactor` budget.
    pub fixed_runs: Option<u64>,
    /// Whether per-run trace files are appended into one shared file per stream.
    pub concatenate: bool,
    /// Directory under which `<name>/` trace and summary files are written.
    pub out_dir: PathBuf,
    /// Which places/transitions to emit trace columns for.
    pub projection: Projection,
    /// Base RNG seed; each run uses `seed ^ run_index`.
    pub seed: u64,
    /// Forces the sequential path even for a fixed run count, instead of
    /// the default `rayon`-parallel one.
    pub sequential: bool,
}

/// Cumulative per-place/transition totals across every run in a batch, used
/// to render the `<name>_Summary.txt` file (`spec.md` §6).
#[derive(Clone, Debug, Default)]
pub struct RunTally {
    /// Number of runs folded into this tally.
    pub runs: u64,
    /// Sum of each run's final simulated clock.
    pub total_clock: f64,
    /// Cumulative token-in count per place, across runs.
    pub place_ins: IndexMap<String, u64>,
    /// Cumulative token-out count per place, across runs.
    pub place_outs: IndexMap<String, u64>,
    /// Cumulative reset count per place, across runs.
    pub place_resets: IndexMap<String, u64>,
    /// Cumulative firing count per transition, across runs.
    pub trans_fired: IndexMap<String, u64>,
}

/// Mean, standard error, and sample count for one (bucket, label) cell.
#[derive(Copy, Clone, Debug, Default)]
pub struct BucketStat {
    /// Sample mean over the runs that covered this bucket.
    pub mean: f64,
    /// Standard error of the mean.
    pub se: f64,
    /// Number of runs that covered this bucket.
    pub n: u64,
}

/// Bucketed aggregation over `[0, maxClock]` in `analysisStep`-wide buckets
/// (`spec.md` §4.7 step 5); only populated when `RunConfig::history` is set.
#[derive(Clone, Debug)]
pub struct BatchStats {
    /// Width, in clock units, of each analysis bucket.
    pub bucket_width: f64,
    /// Per-place time-weighted token-count statistics, one series per bucket.
    pub place_tokens: IndexMap<String, Vec<BucketStat>>,
    /// Per-place reset-count statistics, one series per bucket.
    pub place_resets: IndexMap<String, Vec<BucketStat>>,
    /// Per-transition firing-count statistics, one series per bucket.
    pub trans_fired: IndexMap<String, Vec<BucketStat>>,
}

/// Per-run, per-bucket samples collected while the step loop runs, before
/// being folded into the batch-wide `BatchStats`.
struct RunBuckets {
    /// `Σ tokens·overlap` per bucket; divided by `coverage` to get the
    /// time-weighted average once the run finishes.
    place_tokens: IndexMap<String, Vec<f64>>,
    /// Total time each bucket was covered by a step interval this run.
    coverage: Vec<f64>,
    place_resets: IndexMap<String, Vec<u64>>,
    trans_fired: IndexMap<String, Vec<u64>>,
}

struct RunResult {
    final_clock: f64,
    place_ins: IndexMap<String, u64>,
    place_outs: IndexMap<String, u64>,
    place_resets: IndexMap<String, u64>,
    trans_fired: IndexMap<String, u64>,
    buckets: Option<RunBuckets>,
}

/// Runs `template` repeatedly, writing per-run traces and returning the
/// cumulative tally plus (if `template.config.history`) bucketed stats.
pub fn run_batch(
    template: &Net,
    config: &BatchConfig,
) -> Result<(RunTally, Option<BatchStats>), EngineError> {
    let results: Vec<RunResult> = if let Some(n) = config.fixed_runs {
        if config.sequential {
            (0..n)
                .map(|i| run_one(template, config, i))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            (0..n)
                .into_par_iter()
                .map(|i| run_one(template, config, i))
                .collect::<Result<Vec<_>, _>>()?
        }
    } else {
        let budget = template.config.max_clock * template.config.sims_factor;
        let mut runs = Vec::new();
        let mut spent = 0.0;
        let mut i = 0;
        while spent < budget {
            let result = run_one(template, config, i)?;
            spent += result.final_clock;
            runs.push(result);
            i += 1;
        }
        runs
    };

    let mut tally = RunTally {
        runs: results.len() as u64,
        ..RunTally::default()
    };
    for r in &results {
        tally.total_clock += r.final_clock;
        merge_counts(&mut tally.place_ins, &r.place_ins);
        merge_counts(&mut tally.place_outs, &r.place_outs);
        merge_counts(&mut tally.place_resets, &r.place_resets);
        merge_counts(&mut tally.trans_fired, &r.trans_fired);
    }

    let stats = if template.config.history {
        Some(aggregate_buckets(template, &results))
    } else {
        None
    };

    Ok((tally, stats))
}

fn merge_counts(into: &mut IndexMap<String, u64>, from: &IndexMap<String, u64>) {
    for (label, v) in from {
        *into.entry(label.clone()).or_insert(0) += v;
    }
}

fn run_one(template: &Net, config: &BatchConfig, run_index: u64) -> Result<RunResult, EngineError> {
    let mut net = template.clone();
    let mut rng = Pcg64::seed_from_u64(config.seed ^ run_index);
    let mut writer = TraceWriter::create(
        &net,
        &config.out_dir,
        run_index,
        config.concatenate,
        &config.projection,
    )?;

    let bucket_width = net.config.analysis_step;
    let num_buckets = if net.config.history && bucket_width > 0.0 {
        (net.config.max_clock / bucket_width).ceil() as usize + 1
    } else {
        0
    };
    let mut buckets = (num_buckets > 0).then(|| RunBuckets {
        place_tokens: net
            .places
            .keys()
            .map(|l| (l.clone(), vec![0.0; num_buckets]))
            .collect(),
        coverage: vec![0.0; num_buckets],
        place_resets: net
            .places
            .keys()
            .map(|l| (l.clone(), vec![0u64; num_buckets]))
            .collect(),
        trans_fired: net
            .transitions
            .keys()
            .map(|l| (l.clone(), vec![0u64; num_buckets]))
            .collect(),
    });

    loop {
        if net.clock >= net.config.max_clock || net.step >= net.config.max_steps {
            break;
        }
        let pre_tokens: IndexMap<String, u64> = net
            .places
            .iter()
            .map(|(l, p)| (l.clone(), p.tokens))
            .collect();
        let Some(outcome) = engine::step(&mut net, &mut rng) else {
            break;
        };
        if let Some(buckets) = buckets.as_mut() {
            accumulate_bucket(buckets, &net, &outcome, &pre_tokens, bucket_width, num_buckets);
        }
        writer.record_step(&net, &outcome)?;
        if net.terminated() {
            break;
        }
    }

    writer.finish(&net)?;

    Ok(RunResult {
        final_clock: net.clock,
        place_ins: net.places.iter().map(|(l, p)| (l.clone(), p.ins)).collect(),
        place_outs: net
            .places
            .iter()
            .map(|(l, p)| (l.clone(), p.outs))
            .collect(),
        place_resets: net
            .places
            .iter()
            .map(|(l, p)| (l.clone(), p.reset_count))
            .collect(),
        trans_fired: net
            .transitions
            .iter()
            .map(|(l, t)| (l.clone(), t.fired_count))
            .collect(),
        buckets,
    })
}

/// Attributes the interval `[clock_before, clock_before + dt)` — during
/// which the *pre-firing* marking was held — to the buckets it overlaps.
fn accumulate_bucket(
    buckets: &mut RunBuckets,
    net: &Net,
    outcome: &engine::StepOutcome,
    pre_tokens: &IndexMap<String, u64>,
    width: f64,
    num_buckets: usize,
) {
    let clock_after = net.clock;
    let clock_before = clock_after - outcome.dt;
    if outcome.dt > 0.0 && width > 0.0 {
        let first = (clock_before / width).floor() as usize;
        let last = ((clock_after / width).ceil() as usize).min(num_buckets.saturating_sub(1));
        for bucket in first..=last.max(first) {
            if bucket >= num_buckets {
                break;
            }
            let bucket_start = bucket as f64 * width;
            let bucket_end = bucket_start + width;
            let overlap = clock_after.min(bucket_end) - clock_before.max(bucket_start);
            if overlap <= 0.0 {
                continue;
            }
            for (label, series) in buckets.place_tokens.iter_mut() {
                series[bucket] += pre_tokens[label] as f64 * overlap;
            }
            buckets.coverage[bucket] += overlap;
        }
    }

    let bucket = (clock_after / width.max(f64::MIN_POSITIVE)).floor() as usize;
    let bucket = bucket.min(num_buckets.saturating_sub(1));
    for label in &outcome.fired {
        if let Some(series) = buckets.trans_fired.get_mut(label) {
            series[bucket] += 1;
        }
    }
    for (label, place) in &net.places {
        if place.just_reset {
            if let Some(series) = buckets.place_resets.get_mut(label) {
                series[bucket] += 1;
            }
        }
    }
}

fn aggregate_buckets(template: &Net, results: &[RunResult]) -> BatchStats {
    let bucket_width = template.config.analysis_step;
    let mut place_tokens = IndexMap::new();
    let mut place_resets = IndexMap::new();
    let mut trans_fired = IndexMap::new();

    for label in template.places.keys() {
        let samples: Vec<Vec<Option<f64>>> = results
            .iter()
            .filter_map(|r| r.buckets.as_ref())
            .map(|b| {
                b.place_tokens[label]
                    .iter()
                    .zip(&b.coverage)
                    .map(|(&weighted, &cov)| (cov > 0.0).then(|| weighted / cov))
                    .collect()
            })
            .collect();
        place_tokens.insert(label.clone(), stat_series(&samples));

        let reset_samples: Vec<Vec<Option<f64>>> = results
            .iter()
            .filter_map(|r| r.buckets.as_ref())
            .map(|b| {
                b.place_resets[label]
                    .iter()
                    .zip(&b.coverage)
                    .map(|(&n, &cov)| (cov > 0.0).then_some(n as f64))
                    .collect()
            })
            .collect();
        place_resets.insert(label.clone(), stat_series(&reset_samples));
    }
    for label in template.transitions.keys() {
        let samples: Vec<Vec<Option<f64>>> = results
            .iter()
            .filter_map(|r| r.buckets.as_ref())
            .map(|b| {
                b.trans_fired[label]
                    .iter()
                    .zip(&b.coverage)
                    .map(|(&n, &cov)| (cov > 0.0).then_some(n as f64))
                    .collect()
            })
            .collect();
        trans_fired.insert(label.clone(), stat_series(&samples));
    }

    BatchStats {
        bucket_width,
        place_tokens,
        place_resets,
        trans_fired,
    }
}

/// Computes per-bucket mean/SE/n across the runs that passed through each
/// bucket (`None` entries mark a run that had already terminated).
fn stat_series(runs: &[Vec<Option<f64>>]) -> Vec<BucketStat> {
    let Some(num_buckets) = runs.first().map(Vec::len) else {
        return Vec::new();
    };
    (0..num_buckets)
        .map(|bucket| {
            let values: Vec<f64> = runs.iter().filter_map(|r| r[bucket]).collect();
            let n = values.len() as u64;
            if n == 0 {
                return BucketStat::default();
            }
            let mean = values.iter().sum::<f64>() / n as f64;
            let variance = if n > 1 {
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
            } else {
                0.0
            };
            let se = (variance / n as f64).sqrt();
            BucketStat { mean, se, n }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::arc::InArc;
    use crate::net::{RunConfig, RunMode, Timing};
    use tempfile::tempdir;

    fn decay_net() -> Net {
        let mut net = Net::new(RunConfig {
            name: "Decay".into(),
            run_mode: RunMode::Schedule,
            max_clock: 20.0,
            sims_factor: 1.0,
            history: false,
            ..RunConfig::default()
        });
        net.add_place("P", 3).unwrap();
        net.add_place("Q", 0).unwrap();
        net.add_trans("T", Timing::Delay(1.0)).unwrap();
        net.add_in_arc(
            "T",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_out_arc("T", "Q", 1).unwrap();
        net
    }

    #[test]
    fn fixed_run_count_produces_that_many_results() {
        let net = decay_net();
        let dir = tempdir().unwrap();
        let config = BatchConfig {
            fixed_runs: Some(3),
            concatenate: false,
            out_dir: dir.path().to_path_buf(),
            projection: Projection::default(),
            seed: 7,
            sequential: false,
        };
        let (tally, stats) = run_batch(&net, &config).unwrap();
        assert_eq!(tally.runs, 3);
        assert!(stats.is_none());
        assert_eq!(*tally.trans_fired.get("T").unwrap(), 9);
    }

    #[test]
    fn dynamic_run_count_stops_at_clock_budget() {
        let net = decay_net();
        let dir = tempdir().unwrap();
        let config = BatchConfig {
            fixed_runs: None,
            concatenate: false,
            out_dir: dir.path().to_path_buf(),
            projection: Projection::default(),
            seed: 1,
            sequential: false,
        };
        let (tally, _) = run_batch(&net, &config).unwrap();
        assert!(tally.runs >= 1);
        assert!(tally.total_clock >= net.config.max_clock * net.config.sims_factor);
    }

    #[test]
    fn history_enabled_produces_bucket_stats() {
        let mut net = decay_net();
        net.config.history = true;
        net.config.analysis_step = 5.0;
        let dir = tempdir().unwrap();
        let config = BatchConfig {
            fixed_runs: Some(2),
            concatenate: false,
            out_dir: dir.path().to_path_buf(),
            projection: Projection::default(),
            seed: 2,
            sequential: false,
        };
        let (_, stats) = run_batch(&net, &config).unwrap();
        let stats = stats.unwrap();
        let p = &stats.place_tokens["P"];
        assert!(!p.is_empty());
        // Both runs fire identically (fixed delay, no randomness involved),
        // so the first bucket — which both runs pass through — has 2 samples.
        assert_eq!(p[0].n, 2);
    }
}
