//! Batch summary and aggregated-statistics file writers (`spec.md` §6).

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::Local;

use crate::batch::{BatchStats, RunTally};
use crate::error::EngineError;
use crate::net::Net;

/// Writes `<name>_Summary.txt`: wall-clock duration and per-place/
/// transition cumulative totals across the batch.
pub fn write_summary(
    net: &Net,
    tally: &RunTally,
    wall_time: Duration,
    out_dir: &Path,
) -> Result<(), EngineError> {
    let dir = out_dir.join(&net.config.name);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}_Summary.txt", net.config.name));
    let mut f = fs::File::create(path)?;

    writeln!(f, "Macchiato batch summary for {:?}", net.config.name)?;
    writeln!(f, "Completed {} (local time)", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(f, "Runs: {}", tally.runs)?;
    writeln!(f, "Wall time: {:.3}s", wall_time.as_secs_f64())?;
    writeln!(f, "Total simulated clock: {:.6}", tally.total_clock)?;
    writeln!(f)?;

    writeln!(f, "Places (ins / outs / resets):")?;
    for label in net.places.keys() {
        writeln!(
            f,
            "  {label}: {} / {} / {}",
            tally.place_ins.get(label).copied().unwrap_or(0),
            tally.place_outs.get(label).copied().unwrap_or(0),
            tally.place_resets.get(label).copied().unwrap_or(0),
        )?;
    }
    writeln!(f)?;

    writeln!(f, "Transitions (fired):")?;
    for label in net.transitions.keys() {
        writeln!(
            f,
            "  {label}: {}",
            tally.trans_fired.get(label).copied().unwrap_or(0)
        )?;
    }
    Ok(())
}

/// Writes the three bucketed-aggregation CSVs: `<name>_tokenStats_<ts>.csv`,
/// `<name>_resetStats_<ts>.csv`, `<name>_transStats_<ts>.csv`.
pub fn write_bucket_stats(net: &Net, stats: &BatchStats, out_dir: &Path) -> Result<(), EngineError> {
    let dir = out_dir.join(&net.config.name);
    fs::create_dir_all(&dir)?;
    let ts = Local::now().format("%Y%m%dT%H%M%S");

    write_stat_csv(
        &dir.join(format!("{}_tokenStats_{ts}.csv", net.config.name)),
        stats.bucket_width,
        &stats.place_tokens,
    )?;
    write_stat_csv(
        &dir.join(format!("{}_resetStats_{ts}.csv", net.config.name)),
        stats.bucket_width,
        &stats.place_resets,
    )?;
    write_stat_csv(
        &dir.join(format!("{}_transStats_{ts}.csv", net.config.name)),
        stats.bucket_width,
        &stats.trans_fired,
    )?;
    Ok(())
}

fn write_stat_csv(
    path: &Path,
    bucket_width: f64,
    series: &indexmap::IndexMap<String, Vec<crate::batch::BucketStat>>,
) -> Result<(), EngineError> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["Step".to_string(), "Clock".to_string()];
    for label in series.keys() {
        header.push(format!("{label} av"));
        header.push(format!("{label} se"));
        header.push(format!("{label} n"));
    }
    wtr.write_record(&header)?;

    let num_buckets = series.values().next().map(Vec::len).unwrap_or(0);
    for bucket in 0..num_buckets {
        let mut row = vec![bucket.to_string(), (bucket as f64 * bucket_width).to_string()];
        for values in series.values() {
            let b = values[bucket];
            row.push(b.mean.to_string());
            row.push(b.se.to_string());
            row.push(b.n.to_string());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::RunConfig;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn writes_summary_file_with_expected_sections() {
        let mut net = Net::new(RunConfig {
            name: "Demo".into(),
            ..RunConfig::default()
        });
        net.add_place("P", 1).unwrap();
        net.add_trans("T", crate::net::Timing::Instant).unwrap();
        let tally = RunTally {
            runs: 5,
            total_clock: 12.5,
            ..RunTally::default()
        };
        let dir = tempdir().unwrap();
        write_summary(&net, &tally, Duration::from_secs(1), dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join("Demo").join("Demo_Summary.txt")).unwrap();
        assert!(text.contains("Runs: 5"));
        assert!(text.contains("P:"));
        assert!(text.contains("T:"));
    }
}
