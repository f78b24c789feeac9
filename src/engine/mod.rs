//! Fire/commit/reset operator and the per-run step loop (`spec.md` §4.5).

pub mod modes;

use std::collections::HashMap;

use indexmap::IndexMap;
use rand::Rng;

use crate::enabling::{self, Readiness};
use crate::net::arc::InArc;
use crate::net::{Net, RunMode};

/// One committed step: the transitions that fired and the clock advance.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Labels of the transitions committed this step.
    pub fired: Vec<String>,
    /// Clock advance applied by this step (`0.0` outside `stochastic`/`schedule`).
    pub dt: f64,
}

/// Advances `net` by exactly one step, or returns `None` if nothing is ready
/// to fire (the caller should stop the run without emitting a trace row for
/// this call).
pub fn step(net: &mut Net, rng: &mut impl Rng) -> Option<StepOutcome> {
    for p in net.places.values_mut() {
        p.just_reset = false;
    }

    let readiness = enabling::evaluate(net);
    enabling::apply(net, &readiness);
    update_waiting(net, net.config.run_mode);

    let ready_labels: Vec<String> = net
        .transitions
        .iter()
        .filter(|(_, t)| t.ready)
        .map(|(label, _)| label.clone())
        .collect();

    let selection = match net.config.run_mode {
        RunMode::All => {
            let set = modes::select_all(net, rng, &ready_labels);
            if set.is_empty() {
                None
            } else {
                Some((set, 0.0))
            }
        }
        RunMode::Single => {
            if ready_labels.is_empty() {
                None
            } else {
                let idx = rng.gen_range(0..ready_labels.len());
                Some((vec![ready_labels[idx].clone()], 0.0))
            }
        }
        RunMode::Stochastic => modes::select_stochastic(net, rng, &ready_labels),
        RunMode::Schedule => modes::select_schedule(net, rng),
    };

    let (fire, dt) = selection?;
    commit(net, &fire, dt, &readiness);
    Some(StepOutcome { fired: fire, dt })
}

/// Sets/clears `Transition::waiting` per the enabling analyser's side
/// effect (`spec.md` §4.1): only meaningful outside `all`/`single`, which
/// never advance the clock and so have no notion of a pending delay.
fn update_waiting(net: &mut Net, mode: RunMode) {
    if !matches!(mode, RunMode::Schedule | RunMode::Stochastic) {
        return;
    }
    let step = net.step;
    let clock = net.clock;
    for t in net.transitions.values_mut() {
        if t.ready {
            if t.waiting.is_none() {
                t.waiting = Some(crate::net::Waiting { step, clock });
            }
        } else {
            t.waiting = None;
        }
    }
}

/// Applies a chosen fire set atomically: token-time accounting, delta
/// computation, commit, reset, counter advance, and termination check
/// (`spec.md` §4.5 steps 1-6).
fn commit(net: &mut Net, fire: &[String], dt: f64, readiness: &IndexMap<String, Readiness>) {
    for p in net.places.values_mut() {
        if p.tokens > 0 {
            p.total_token_time += dt;
        }
    }

    let mut delta: HashMap<String, i64> = HashMap::new();
    for label in fire {
        let in_arcs = net.transitions[label].in_arcs.clone();
        let out_arcs = net.transitions[label].out_arcs.clone();
        let voting = net.transitions[label].vote.is_some();
        let skipped = &readiness[label].skipped_places;

        for arc in &in_arcs {
            if let InArc::Std { place, weight } = arc {
                if voting && skipped.contains(place) {
                    continue;
                }
                *delta.entry(place.clone()).or_insert(0) -= *weight as i64;
                net.places.get_mut(place).unwrap().outs += weight;
            }
        }
        for out in &out_arcs {
            if voting && skipped.contains(&out.place) {
                continue;
            }
            *delta.entry(out.place.clone()).or_insert(0) += out.weight as i64;
            net.places.get_mut(&out.place).unwrap().ins += out.weight;
        }

        let t = net.transitions.get_mut(label).unwrap();
        t.fired_count += 1;
        t.last_fired = Some(net.clock + dt);
        t.waiting = None;
    }

    for (place, d) in &delta {
        let p = net.places.get_mut(place).unwrap();
        let new_tokens = p.tokens as i64 + d;
        assert!(
            new_tokens >= 0,
            "commit produced a negative marking for place {place:?}"
        );
        p.tokens = new_tokens as u64;
        assert!(
            !p.violates_bounds(),
            "commit violated min/max bounds for place {place:?}"
        );
    }

    for label in fire {
        let reset_places = net.transitions[label].reset.clone();
        for place in reset_places {
            net.places.get_mut(&place).unwrap().reset();
        }
    }

    for t in net.transitions.values_mut() {
        t.ready = false;
    }
    net.step += 1;
    net.clock += dt;

    if net.places.values().any(|p| p.violates_termination()) {
        net.place_exit = true;
    }
    if net.transitions.values().any(|t| t.exhausted()) {
        net.trans_exit = true;
    }
}

/// Runs `net` to completion (bounded by `maxClock`/`maxSteps`), invoking
/// `on_step` with the net state after every committed step.
pub fn run_to_completion(
    net: &mut Net,
    rng: &mut impl Rng,
    mut on_step: impl FnMut(&Net, &StepOutcome),
) {
    loop {
        if net.clock >= net.config.max_clock || net.step >= net.config.max_steps {
            break;
        }
        match step(net, rng) {
            None => break,
            Some(outcome) => {
                on_step(net, &outcome);
                if net.terminated() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{RunConfig, Timing};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn rng() -> Pcg64 {
        Pcg64::seed_from_u64(1)
    }

    #[test]
    fn single_shot_instant_fires_once_then_halts() {
        let mut net = Net::new(RunConfig {
            run_mode: RunMode::Schedule,
            ..RunConfig::default()
        });
        net.add_place("P", 1).unwrap();
        net.add_place("Q", 0).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.add_in_arc(
            "T",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_out_arc("T", "Q", 1).unwrap();

        let mut r = rng();
        let outcome = step(&mut net, &mut r).unwrap();
        assert_eq!(outcome.fired, vec!["T".to_string()]);
        assert_eq!(net.step, 1);
        assert_eq!(net.clock, 0.0);
        assert_eq!(net.places["P"].tokens, 0);
        assert_eq!(net.places["Q"].tokens, 1);
        assert_eq!(net.transitions["T"].fired_count, 1);

        assert!(step(&mut net, &mut r).is_none());
    }

    #[test]
    fn fixed_delay_advances_clock_by_delay() {
        let mut net = Net::new(RunConfig {
            run_mode: RunMode::Schedule,
            ..RunConfig::default()
        });
        net.add_place("P", 1).unwrap();
        net.add_place("Q", 0).unwrap();
        net.add_trans("T", Timing::Delay(5.0)).unwrap();
        net.add_in_arc(
            "T",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_out_arc("T", "Q", 1).unwrap();

        let mut r = rng();
        let outcome = step(&mut net, &mut r).unwrap();
        assert_eq!(net.step, 1);
        assert_eq!(net.clock, 5.0);
        assert_eq!(net.places["P"].tokens, 0);
        assert_eq!(net.places["Q"].tokens, 1);
        assert_eq!(net.transitions["T"].last_fired, Some(5.0));
        let _ = outcome;
    }

    #[test]
    fn inhibit_arc_blocks_firing_entirely() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 1).unwrap();
        net.add_place("Q", 1).unwrap();
        net.add_place("R", 0).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.add_in_arc(
            "T",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_in_arc(
            "T",
            InArc::Inh {
                place: "Q".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_out_arc("T", "R", 1).unwrap();

        let mut r = rng();
        assert!(step(&mut net, &mut r).is_none());
        assert_eq!(net.places["P"].tokens, 1);
    }

    #[test]
    fn voting_transition_commits_only_satisfied_arcs() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P1", 1).unwrap();
        net.add_place("P2", 1).unwrap();
        net.add_place("P3", 0).unwrap();
        net.add_place("R", 0).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.transitions.get_mut("T").unwrap().vote = Some(2);
        for p in ["P1", "P2", "P3"] {
            net.add_in_arc(
                "T",
                InArc::Std {
                    place: p.into(),
                    weight: 1,
                },
            )
            .unwrap();
        }
        net.add_out_arc("T", "R", 1).unwrap();

        let mut r = rng();
        let outcome = step(&mut net, &mut r).unwrap();
        assert_eq!(outcome.fired, vec!["T".to_string()]);
        assert_eq!(net.places["P1"].tokens, 0);
        assert_eq!(net.places["P2"].tokens, 0);
        assert_eq!(net.places["P3"].tokens, 0);
        assert_eq!(net.places["R"].tokens, 1);
    }

    #[test]
    fn reset_restores_place_on_firing() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("A", 0).unwrap();
        net.add_place("B", 3).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.places.get_mut("A").unwrap().tokens = 1;
        net.add_in_arc(
            "T",
            InArc::Std {
                place: "A".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_out_arc("T", "A", 1).unwrap();
        net.places.get_mut("B").unwrap().tokens = 0;
        net.set_reset_list("T", &["B".to_string()]).unwrap();

        let mut r = rng();
        step(&mut net, &mut r).unwrap();
        assert_eq!(net.places["A"].tokens, 1);
        assert_eq!(net.places["B"].tokens, 3);
        assert_eq!(net.places["B"].reset_count, 1);
        assert!(net.places["B"].just_reset);
    }
}
