//! Petri net data model.

pub mod arc;
pub mod place;
pub mod transition;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::NetError;
use crate::net::arc::{InArc, OutArc};
pub use crate::net::place::{Bound, Place};
pub use crate::net::transition::{Timing, Transition, Waiting};

/// Which of the four interchangeable stepper strategies drives a run.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RunMode {
    /// Fires every ready transition each step, resolving conflicts by
    /// randomly dropping one of each conflicting pair.
    All,
    /// Fires one ready transition, chosen uniformly at random, each step.
    Single,
    /// Samples a delay from each ready transition's distribution and fires
    /// whichever is due first, with fixed-delay transitions pre-empting.
    Stochastic,
    /// Maintains a persistent event schedule of pending absolute fire times.
    Schedule,
}

impl RunMode {
    /// Parses a header `runMode` value; `None` if unrecognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(RunMode::All),
            "single" => Some(RunMode::Single),
            "stochastic" => Some(RunMode::Stochastic),
            "schedule" => Some(RunMode::Schedule),
            _ => None,
        }
    }

    /// Returns the header spelling of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::All => "all",
            RunMode::Single => "single",
            RunMode::Stochastic => "stochastic",
            RunMode::Schedule => "schedule",
        }
    }

    /// `stochastic`/`schedule` modes advance an explicit clock and emit a
    /// clock column in the trace streams (`spec.md` §4.6).
    pub fn has_clock_column(&self) -> bool {
        matches!(self, RunMode::Stochastic | RunMode::Schedule)
    }
}

/// Net-level run parameters parsed from the header of a `.mpn` file
/// (`spec.md` §6). Visualisation-only keys are stored for round-trip
/// fidelity but never interpreted (dot/graphviz rendering is out of scope).
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Net name; also the subdirectory name under which files are written.
    pub name: String,
    /// Display-only label for the simulated clock's units (e.g. `"hrs"`).
    pub units: String,
    /// Which stepper strategy drives the run.
    pub run_mode: RunMode,
    /// Whether a Graphviz `.dot` rendering should be produced (unused; kept
    /// for round-trip fidelity).
    pub dot: bool,
    /// Visualisation backend name (unused; kept for round-trip fidelity).
    pub visualise: Option<String>,
    /// Whether verbose per-step detail should be printed (unused; kept for
    /// round-trip fidelity).
    pub details: bool,
    /// Whether `GROUP` annotations affect legacy place-line token parsing.
    pub use_group: bool,
    /// Graph layout orientation (unused; kept for round-trip fidelity).
    pub orientation: Option<String>,
    /// Whether debug-level tracing is enabled for this net.
    pub debug: bool,
    /// Graph layout location hint (unused; kept for round-trip fidelity).
    pub dot_loc: Option<String>,
    /// Upper bound on the simulated clock for one run.
    pub max_clock: f64,
    /// Upper bound on the step count for one run.
    pub max_steps: u64,
    /// Multiplier on `max_clock` giving the total simulated-time budget for
    /// a dynamically-sized batch.
    pub sims_factor: f64,
    /// Whether bucketed aggregate statistics are collected across a batch.
    pub history: bool,
    /// Width, in clock units, of each analysis bucket.
    pub analysis_step: f64,
    /// Whether trace files are written at all.
    pub file_output: bool,
    /// Whether trace streams retain only the final row of each run.
    pub end_only: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            units: "hrs".to_string(),
            run_mode: RunMode::Schedule,
            dot: false,
            visualise: None,
            details: true,
            use_group: true,
            orientation: None,
            debug: false,
            dot_loc: None,
            max_clock: 1e6,
            max_steps: 1_000_000_000_000,
            sims_factor: 1.5e3,
            history: false,
            analysis_step: 1e2,
            file_output: true,
            end_only: false,
        }
    }
}

/// A Petri net: an ordered collection of places and transitions plus the
/// run-level clock/step/termination state. Entities are constructed up
/// front from the parser; once a run starts, only runtime state mutates.
#[derive(Clone, Debug)]
pub struct Net {
    /// Run-level parameters parsed from the net description's header.
    pub config: RunConfig,
    /// Places in declaration order, keyed by label.
    pub places: IndexMap<String, Place>,
    /// Transitions in declaration order, keyed by label.
    pub transitions: IndexMap<String, Transition>,

    /// Number of steps committed so far.
    pub step: u64,
    /// Simulated clock, advanced by each step's `dt`.
    pub clock: f64,
    /// Absolute fire times pending under `schedule` mode
    /// (transition label → clock at which it would fire).
    pub schedule: IndexMap<String, f64>,

    /// Set once a place's `term_limits` condition is met.
    pub place_exit: bool,
    /// Set once a transition's firing-count condition is met.
    pub trans_exit: bool,
}

impl Net {
    /// Returns a new, empty net with the given run configuration.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            places: IndexMap::new(),
            transitions: IndexMap::new(),
            step: 0,
            clock: 0.0,
            schedule: IndexMap::new(),
            place_exit: false,
            trans_exit: false,
        }
    }

    /// Adds a place. Labels must be unique, whitespace-free, and free of
    /// glob metacharacters (since reset lists may name them via glob).
    pub fn add_place(&mut self, label: impl Into<String>, tokens: u64) -> Result<(), NetError> {
        let label = label.into();
        validate_label(&label)?;
        if self.places.contains_key(&label) {
            return Err(NetError::DuplicateLabel(label));
        }
        self.places.insert(label.clone(), Place::new(label, tokens));
        Ok(())
    }

    /// Adds a transition with no arcs yet; arcs are attached afterwards via
    /// `add_in_arc`/`add_out_arc`.
    pub fn add_trans(&mut self, label: impl Into<String>, timing: Timing) -> Result<(), NetError> {
        let label = label.into();
        validate_label(&label)?;
        if self.transitions.contains_key(&label) {
            return Err(NetError::DuplicateLabel(label));
        }
        self.transitions
            .insert(label.clone(), Transition::new(label, timing));
        Ok(())
    }

    /// Adds an incoming arc to `trans`, verifying the referenced place
    /// exists.
    pub fn add_in_arc(&mut self, trans: &str, arc: InArc) -> Result<(), NetError> {
        self.verify_place_ref(trans, arc.place())?;
        let t = self.transitions.get_mut(trans).ok_or_else(|| {
            NetError::Construction(format!("unknown transition {trans:?}"))
        })?;
        t.in_arcs.push(arc);
        Ok(())
    }

    /// Adds an outgoing arc to `trans`, verifying the referenced place
    /// exists. Outgoing arcs are always standard.
    pub fn add_out_arc(&mut self, trans: &str, place: impl Into<String>, weight: u64) -> Result<(), NetError> {
        let place = place.into();
        self.verify_place_ref(trans, &place)?;
        let t = self.transitions.get_mut(trans).ok_or_else(|| {
            NetError::Construction(format!("unknown transition {trans:?}"))
        })?;
        t.out_arcs.push(OutArc { place, weight });
        Ok(())
    }

    /// Expands a reset-list entry (possibly containing `*`, `?`, `[...]`
    /// glob metacharacters) against the currently registered places and
    /// assigns the expansion to `trans.reset`. Called at construction time,
    /// per `spec.md` §9.
    pub fn set_reset_list(&mut self, trans: &str, patterns: &[String]) -> Result<(), NetError> {
        let mut expanded = Vec::new();
        for pat in patterns {
            let is_literal = !pat.contains(['*', '?', '[']);
            if is_literal {
                if !self.places.contains_key(pat) {
                    return Err(NetError::Reference {
                        trans: trans.to_string(),
                        place: pat.clone(),
                    });
                }
                expanded.push(pat.clone());
                continue;
            }
            let glob = glob::Pattern::new(pat).map_err(|e| {
                NetError::Construction(format!("invalid glob {pat:?} in RESET: {e}"))
            })?;
            let mut matched = false;
            for label in self.places.keys() {
                if glob.matches(label) {
                    expanded.push(label.clone());
                    matched = true;
                }
            }
            if !matched {
                warn!(pattern = %pat, transition = %trans, "RESET glob matched no places");
            }
        }
        if let Some(t) = self.transitions.get_mut(trans) {
            t.reset = expanded;
        }
        Ok(())
    }

    fn verify_place_ref(&self, trans: &str, place: &str) -> Result<(), NetError> {
        if !self.places.contains_key(place) {
            return Err(NetError::Reference {
                trans: trans.to_string(),
                place: place.to_string(),
            });
        }
        Ok(())
    }

    /// Verifies every arc endpoint names a place in `self.places` and every
    /// transition-level invariant holds. Called once before the first step.
    pub fn verify(&self) -> Result<(), NetError> {
        for (label, t) in &self.transitions {
            for arc in &t.in_arcs {
                if !self.places.contains_key(arc.place()) {
                    return Err(NetError::Reference {
                        trans: label.clone(),
                        place: arc.place().to_string(),
                    });
                }
            }
            for arc in &t.out_arcs {
                if !self.places.contains_key(&arc.place) {
                    return Err(NetError::Reference {
                        trans: label.clone(),
                        place: arc.place.clone(),
                    });
                }
            }
            if let Some(k) = t.vote {
                if k == 0 {
                    return Err(NetError::Construction(format!(
                        "transition {label:?} has a non-positive vote threshold"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns `true` iff either termination flag is set.
    pub fn terminated(&self) -> bool {
        self.place_exit || self.trans_exit
    }
}

/// Labels must be non-empty, whitespace-free, and free of glob
/// metacharacters (`*`, `?`, `[`, `]`) so that reset-list glob expansion
/// can never be ambiguous about whether a pattern is literal.
fn validate_label(label: &str) -> Result<(), NetError> {
    if label.is_empty() {
        return Err(NetError::Construction("empty label".to_string()));
    }
    if label.chars().any(char::is_whitespace) {
        return Err(NetError::Construction(format!(
            "label {label:?} contains whitespace"
        )));
    }
    if label.contains(['*', '?', '[', ']']) {
        return Err(NetError::Construction(format!(
            "label {label:?} contains glob metacharacters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_net() -> Net {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 1).unwrap();
        net.add_place("Q", 0).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.add_in_arc(
            "T",
            InArc::Std {
                place: "P".to_string(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_out_arc("T", "Q", 1).unwrap();
        net
    }

    #[test]
    fn verify_accepts_well_formed_net() {
        assert!(small_net().verify().is_ok());
    }

    #[test]
    fn verify_rejects_dangling_arc_reference() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("T", Timing::Instant).unwrap();
        // Bypass add_in_arc's own check by constructing the net manually.
        net.transitions.get_mut("T").unwrap().in_arcs.push(InArc::Std {
            place: "Ghost".to_string(),
            weight: 1,
        });
        assert!(matches!(net.verify(), Err(NetError::Reference { .. })));
    }

    #[test]
    fn duplicate_place_label_is_an_error() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 0).unwrap();
        assert!(matches!(
            net.add_place("P", 0),
            Err(NetError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn label_with_whitespace_is_rejected() {
        let mut net = Net::new(RunConfig::default());
        assert!(net.add_place("P 0", 0).is_err());
    }

    #[test]
    fn reset_glob_expands_against_current_places() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("A1", 0).unwrap();
        net.add_place("A2", 0).unwrap();
        net.add_place("B1", 0).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.set_reset_list("T", &["A*".to_string()]).unwrap();
        let mut reset = net.transitions["T"].reset.clone();
        reset.sort();
        assert_eq!(reset, vec!["A1".to_string(), "A2".to_string()]);
    }

    #[test]
    fn reset_literal_naming_missing_place_is_an_error() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("T", Timing::Instant).unwrap();
        assert!(net.set_reset_list("T", &["Ghost".to_string()]).is_err());
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("Z", 0).unwrap();
        net.add_place("A", 0).unwrap();
        net.add_place("M", 0).unwrap();
        let labels: Vec<&str> = net.places.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["Z", "A", "M"]);
    }
}
