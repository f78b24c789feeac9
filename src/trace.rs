//! CSV trace writer (`spec.md` §4.6).
//!
//! Three parallel streams are kept per run: place markings, transition
//! cumulative firing counts, and the list of labels that fired each step.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::engine::StepOutcome;
use crate::error::EngineError;
use crate::net::Net;

const FILE_PREFIX: &str = "Macchiato_PetriNet";

/// Delimiter line written between runs in a concatenated batch file.
fn delimiter_record(run_index: u64) -> Vec<String> {
    vec![">>>>>".to_string(), run_index.to_string(), "<<<<<".to_string()]
}

/// Which places/transitions to emit columns for, and in what order.
#[derive(Clone, Debug, Default)]
pub struct Projection {
    /// Place labels to include, or `None` for every place in net order.
    pub places: Option<Vec<String>>,
    /// Transition labels to include, or `None` for every transition in net order.
    pub transitions: Option<Vec<String>>,
}

/// Writes the Places/Transitions/FireList streams for one run, optionally
/// appending into shared batch-level files (`concatenate`) or retaining
/// only the final row (`endOnly`).
pub struct TraceWriter {
    clock_column: bool,
    end_only: bool,
    place_labels: Vec<String>,
    trans_labels: Vec<String>,
    places: csv::Writer<File>,
    transitions: csv::Writer<File>,
    fire_list: csv::Writer<File>,
    pending: Option<PendingRow>,
}

struct PendingRow {
    step: u64,
    clock: f64,
    place_tokens: Vec<u64>,
    trans_counts: Vec<u64>,
    fired: Vec<String>,
}

impl TraceWriter {
    /// Opens (or, under `concatenate`, appends to) the three CSV streams
    /// for run `run_index` of net `net` under `out_dir/<net.config.name>/`.
    pub fn create(
        net: &Net,
        out_dir: &Path,
        run_index: u64,
        concatenate: bool,
        projection: &Projection,
    ) -> Result<Self, EngineError> {
        let dir = out_dir.join(&net.config.name);
        fs::create_dir_all(&dir)?;

        let place_labels = projection
            .places
            .clone()
            .unwrap_or_else(|| net.places.keys().cloned().collect());
        let trans_labels = projection
            .transitions
            .clone()
            .unwrap_or_else(|| net.transitions.keys().cloned().collect());

        let (places_path, trans_path, fire_path) = if concatenate {
            (
                dir.join(format!("{FILE_PREFIX}_Places.csv")),
                dir.join(format!("{FILE_PREFIX}_Trans.csv")),
                dir.join(format!("{FILE_PREFIX}_FireList.csv")),
            )
        } else {
            (
                dir.join(format!("{FILE_PREFIX}_Places_{run_index}.csv")),
                dir.join(format!("{FILE_PREFIX}_Trans_{run_index}.csv")),
                dir.join(format!("{FILE_PREFIX}_FireList_{run_index}.csv")),
            )
        };

        let mut places = open_stream(&places_path, concatenate)?;
        let mut transitions = open_stream(&trans_path, concatenate)?;
        let mut fire_list = open_stream(&fire_path, concatenate)?;

        if concatenate {
            places.write_record(delimiter_record(run_index))?;
            transitions.write_record(delimiter_record(run_index))?;
            fire_list.write_record(delimiter_record(run_index))?;
        }

        let clock_column = net.config.run_mode.has_clock_column();
        write_header(&mut places, clock_column, &place_labels)?;
        write_header(&mut transitions, clock_column, &trans_labels)?;
        write_header(&mut fire_list, clock_column, &["fired".to_string()])?;

        Ok(Self {
            clock_column,
            end_only: net.config.end_only,
            place_labels,
            trans_labels,
            places,
            transitions,
            fire_list,
            pending: None,
        })
    }

    /// Records one committed step. Under `endOnly` this only buffers the
    /// row; the buffer is flushed by `finish`.
    pub fn record_step(&mut self, net: &Net, outcome: &StepOutcome) -> Result<(), EngineError> {
        let row = PendingRow {
            step: net.step,
            clock: net.clock,
            place_tokens: self
                .place_labels
                .iter()
                .map(|l| net.places[l].tokens)
                .collect(),
            trans_counts: self
                .trans_labels
                .iter()
                .map(|l| net.transitions[l].fired_count)
                .collect(),
            fired: outcome.fired.clone(),
        };
        if self.end_only {
            self.pending = Some(row);
        } else {
            self.write_row(&row)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: &PendingRow) -> Result<(), EngineError> {
        let mut place_rec = leading_columns(self.clock_column, row.step, row.clock);
        place_rec.extend(row.place_tokens.iter().map(u64::to_string));
        self.places.write_record(&place_rec)?;

        let mut trans_rec = leading_columns(self.clock_column, row.step, row.clock);
        trans_rec.extend(row.trans_counts.iter().map(u64::to_string));
        self.transitions.write_record(&trans_rec)?;

        let mut fire_rec = leading_columns(self.clock_column, row.step, row.clock);
        fire_rec.extend(row.fired.iter().cloned());
        self.fire_list.write_record(&fire_rec)?;

        Ok(())
    }

    /// Flushes any buffered `endOnly` row, appends the four place-stream
    /// summary rows (`In`, `Out`, `Net`, `Reset`), and flushes all streams.
    pub fn finish(mut self, net: &Net) -> Result<(), EngineError> {
        if let Some(row) = self.pending.take() {
            self.write_row(&row)?;
        }

        for (label, suffix) in [
            ("In", Summary::Ins),
            ("Out", Summary::Outs),
            ("Net", Summary::Net),
            ("Reset", Summary::Reset),
        ] {
            let mut rec = vec![label.to_string()];
            if self.clock_column {
                rec.push(String::new());
            }
            rec.extend(self.place_labels.iter().map(|l| {
                let p = &net.places[l];
                match suffix {
                    Summary::Ins => p.ins.to_string(),
                    Summary::Outs => p.outs.to_string(),
                    Summary::Net => (p.ins as i64 - p.outs as i64).to_string(),
                    Summary::Reset => p.reset_count.to_string(),
                }
            }));
            self.places.write_record(&rec)?;
        }

        self.places.flush()?;
        self.transitions.flush()?;
        self.fire_list.flush()?;
        Ok(())
    }
}

enum Summary {
    Ins,
    Outs,
    Net,
    Reset,
}

fn leading_columns(clock_column: bool, step: u64, clock: f64) -> Vec<String> {
    let mut cols = vec![step.to_string()];
    if clock_column {
        cols.push(clock.to_string());
    }
    cols
}

fn write_header(
    wtr: &mut csv::Writer<File>,
    clock_column: bool,
    labels: &[String],
) -> Result<(), EngineError> {
    let mut header = vec!["step".to_string()];
    if clock_column {
        header.push("clock".to_string());
    }
    header.extend(labels.iter().cloned());
    wtr.write_record(&header)?;
    Ok(())
}

fn open_stream(path: &PathBuf, append: bool) -> Result<csv::Writer<File>, EngineError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(csv::WriterBuilder::new().from_writer(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{RunConfig, RunMode};
    use tempfile::tempdir;

    fn small_net(mode: RunMode, end_only: bool) -> Net {
        let mut net = Net::new(RunConfig {
            name: "TestNet".into(),
            run_mode: mode,
            end_only,
            ..RunConfig::default()
        });
        net.add_place("P", 1).unwrap();
        net.add_trans("T", crate::net::Timing::Instant).unwrap();
        net
    }

    #[test]
    fn creates_files_under_net_named_directory() {
        let dir = tempdir().unwrap();
        let net = small_net(RunMode::All, false);
        let writer = TraceWriter::create(&net, dir.path(), 0, false, &Projection::default())
            .unwrap();
        writer.finish(&net).unwrap();
        assert!(dir
            .path()
            .join("TestNet")
            .join("Macchiato_PetriNet_Places_0.csv")
            .exists());
    }

    #[test]
    fn end_only_buffers_until_finish() {
        let dir = tempdir().unwrap();
        let mut net = small_net(RunMode::Schedule, true);
        let mut writer =
            TraceWriter::create(&net, dir.path(), 0, false, &Projection::default()).unwrap();
        net.step = 1;
        net.clock = 5.0;
        writer
            .record_step(&net, &StepOutcome { fired: vec!["T".into()], dt: 5.0 })
            .unwrap();
        writer.finish(&net).unwrap();
        let text = fs::read_to_string(
            dir.path()
                .join("TestNet")
                .join("Macchiato_PetriNet_Places_0.csv"),
        )
        .unwrap();
        assert_eq!(text.lines().count(), 1 + 1 + 4); // header + 1 row + 4 summary rows
    }

    #[test]
    fn concatenate_writes_run_delimiter() {
        let dir = tempdir().unwrap();
        let net = small_net(RunMode::All, false);
        let writer = TraceWriter::create(&net, dir.path(), 2, true, &Projection::default())
            .unwrap();
        writer.finish(&net).unwrap();
        let text = fs::read_to_string(
            dir.path()
                .join("TestNet")
                .join("Macchiato_PetriNet_Places.csv"),
        )
        .unwrap();
        assert!(text.lines().next().unwrap().starts_with(">>>>>,2,<<<<<"));
    }
}
