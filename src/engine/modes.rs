//! The four mode-specific fire-set selectors (`spec.md` §4.3, §4.4).

use rand::Rng;

use crate::dist;
use crate::net::arc::InArc;
use crate::net::transition::Timing;
use crate::net::{Net, Transition};
use crate::schedule;

/// `all` mode: fire every ready transition, then resolve pairwise conflicts
/// by removing one transition uniformly at random until no conflict
/// remains (`spec.md` §4.3). When no conflict is found the whole ready set
/// survives — the reference's ambiguous branch is resolved this way per
/// `SPEC_FULL.md`'s open-question decision.
pub fn select_all(net: &Net, rng: &mut impl Rng, ready: &[String]) -> Vec<String> {
    let mut set = ready.to_vec();
    loop {
        let mut pair = None;
        'search: for i in 0..set.len() {
            for j in (i + 1)..set.len() {
                if conflicts(net, &net.transitions[&set[i]], &net.transitions[&set[j]]) {
                    pair = Some((i, j));
                    break 'search;
                }
            }
        }
        match pair {
            None => break,
            Some((i, j)) => {
                let loser = if rng.gen_bool(0.5) { i } else { j };
                set.remove(loser);
            }
        }
    }
    set
}

fn std_in_weight(t: &Transition, place: &str) -> Option<u64> {
    t.in_arcs.iter().find_map(|a| match a {
        InArc::Std { place: p, weight } if p == place => Some(*weight),
        _ => None,
    })
}

fn std_out_weight(t: &Transition, place: &str) -> Option<u64> {
    t.out_arcs
        .iter()
        .find_map(|a| (a.place == place).then_some(a.weight))
}

/// Two transitions conflict if they share a `std` incoming place that
/// cannot absorb both withdrawals, or a shared `std` outgoing place that
/// cannot absorb both additions (`spec.md` §4.3).
fn conflicts(net: &Net, a: &Transition, b: &Transition) -> bool {
    for arc in &a.in_arcs {
        if let InArc::Std { place, weight: wa } = arc {
            if let Some(wb) = std_in_weight(b, place) {
                let p = &net.places[place];
                if p.tokens < wa + wb || p.tokens - (wa + wb) < p.min {
                    return true;
                }
            }
        }
    }
    for out in &a.out_arcs {
        if let Some(wb) = std_out_weight(b, &out.place) {
            let p = &net.places[&out.place];
            if !p.max.admits(p.tokens, out.weight + wb) {
                return true;
            }
        }
    }
    false
}

/// `stochastic` mode: instant transitions pre-empt, then rate-typed
/// transitions build a cumulative table, then any waiting fixed-delay
/// transition due at or before the sampled `Δt` pre-empts that draw
/// (`spec.md` §4.3).
pub fn select_stochastic(
    net: &mut Net,
    rng: &mut impl Rng,
    ready: &[String],
) -> Option<(Vec<String>, f64)> {
    let instants: Vec<String> = ready
        .iter()
        .filter(|l| net.transitions[*l].timing.is_instant())
        .cloned()
        .collect();
    if !instants.is_empty() {
        let chosen = instants[rng.gen_range(0..instants.len())].clone();
        return Some((vec![chosen], 0.0));
    }

    let rate_labels: Vec<(String, f64)> = ready
        .iter()
        .filter_map(|l| match net.transitions[l].timing {
            Timing::Rate(rate) => Some((l.clone(), rate)),
            _ => None,
        })
        .collect();

    let rate_pick = if rate_labels.is_empty() {
        None
    } else {
        let sum: f64 = rate_labels.iter().map(|(_, r)| r).sum();
        assert!(sum >= 0.0, "negative rate encountered in stochastic table");
        let u: f64 = rng.gen::<f64>();
        let dt = -(1.0 - u).ln() / sum;
        let mut target = rng.gen::<f64>() * sum;
        let mut chosen = rate_labels[0].0.clone();
        for (label, r) in &rate_labels {
            if target < *r {
                chosen = label.clone();
                break;
            }
            target -= r;
        }
        Some((chosen, dt))
    };

    let horizon = rate_pick
        .as_ref()
        .map(|(_, dt)| net.clock + dt)
        .unwrap_or(f64::INFINITY);

    let mut earliest: Option<(String, f64)> = None;
    for label in ready {
        let t = &net.transitions[label];
        let Timing::Delay(delay) = t.timing else {
            continue;
        };
        let Some(waiting) = t.waiting else { continue };
        let c = dist::con(net, t);
        let abs_fire = waiting.clock + delay / c;
        if abs_fire <= horizon {
            match &earliest {
                None => earliest = Some((label.clone(), abs_fire)),
                Some((_, best)) if abs_fire < *best => earliest = Some((label.clone(), abs_fire)),
                _ => {}
            }
        }
    }

    if let Some((_, best_time)) = earliest {
        // Open question (b): ties among waiting delay transitions due at
        // the same absolute time are broken uniformly at random.
        let tied: Vec<String> = ready
            .iter()
            .filter(|l| {
                let t = &net.transitions[*l];
                let Timing::Delay(d) = t.timing else {
                    return false;
                };
                let Some(w) = t.waiting else { return false };
                let c = dist::con(net, t);
                (w.clock + d / c - best_time).abs() < f64::EPSILON
            })
            .cloned()
            .collect();
        let chosen = tied[rng.gen_range(0..tied.len())].clone();
        let w = net.transitions[&chosen].waiting.unwrap();
        let d = match net.transitions[&chosen].timing {
            Timing::Delay(d) => d,
            _ => unreachable!("tied set only contains Delay transitions"),
        };
        let new_dt = d - (net.clock - w.clock);
        return Some((vec![chosen], new_dt));
    }

    rate_pick.map(|(label, dt)| (vec![label], dt))
}

/// `schedule` mode: prune/populate the persistent table, let instant
/// transitions pre-empt, otherwise fire the earliest scheduled entry
/// (`spec.md` §4.4).
pub fn select_schedule(net: &mut Net, rng: &mut impl Rng) -> Option<(Vec<String>, f64)> {
    schedule::prune(net);
    schedule::populate(net, rng);

    let instant_candidates = schedule::take_instant_priority(net);
    if !instant_candidates.is_empty() {
        let idx = rng.gen_range(0..instant_candidates.len());
        return Some((vec![instant_candidates[idx].clone()], 0.0));
    }

    schedule::select_earliest(net, rng).map(|(label, dt)| (vec![label], dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Bound, RunConfig};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn rng() -> Pcg64 {
        Pcg64::seed_from_u64(3)
    }

    #[test]
    fn select_all_keeps_non_conflicting_transitions() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 2).unwrap();
        net.add_place("Q", 0).unwrap();
        net.add_trans("A", Timing::Instant).unwrap();
        net.add_trans("B", Timing::Instant).unwrap();
        net.add_in_arc(
            "A",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_in_arc(
            "B",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        let mut r = rng();
        let mut set = select_all(&net, &mut r, &["A".to_string(), "B".to_string()]);
        set.sort();
        assert_eq!(set, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn select_all_drops_one_of_a_conflicting_pair() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 1).unwrap();
        net.add_trans("A", Timing::Instant).unwrap();
        net.add_trans("B", Timing::Instant).unwrap();
        net.add_in_arc(
            "A",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        net.add_in_arc(
            "B",
            InArc::Std {
                place: "P".into(),
                weight: 1,
            },
        )
        .unwrap();
        let mut r = rng();
        let set = select_all(&net, &mut r, &["A".to_string(), "B".to_string()]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn select_all_detects_outgoing_conflicts_via_max_bound() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("Q", 0).unwrap();
        net.places.get_mut("Q").unwrap().max = Bound::Finite(1);
        net.add_trans("A", Timing::Instant).unwrap();
        net.add_trans("B", Timing::Instant).unwrap();
        net.add_out_arc("A", "Q", 1).unwrap();
        net.add_out_arc("B", "Q", 1).unwrap();
        let mut r = rng();
        let set = select_all(&net, &mut r, &["A".to_string(), "B".to_string()]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn select_stochastic_prefers_instant_over_rate() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("Inst", Timing::Instant).unwrap();
        net.add_trans("Rate", Timing::Rate(1.0)).unwrap();
        let mut r = rng();
        let (fire, dt) = select_stochastic(
            &mut net,
            &mut r,
            &["Inst".to_string(), "Rate".to_string()],
        )
        .unwrap();
        assert_eq!(fire, vec!["Inst".to_string()]);
        assert_eq!(dt, 0.0);
    }

    #[test]
    fn select_stochastic_preempts_with_due_delay_transition() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("Rate", Timing::Rate(100.0)).unwrap();
        net.add_trans("Delayed", Timing::Delay(0.0)).unwrap();
        net.transitions.get_mut("Delayed").unwrap().waiting =
            Some(crate::net::Waiting { step: 0, clock: 0.0 });
        let mut r = rng();
        let (fire, dt) = select_stochastic(
            &mut net,
            &mut r,
            &["Rate".to_string(), "Delayed".to_string()],
        )
        .unwrap();
        assert_eq!(fire, vec!["Delayed".to_string()]);
        assert_eq!(dt, 0.0);
    }
}
