//! Persistent schedule table for `schedule` mode (`spec.md` §4.4).
//!
//! The schedule survives across steps so a pending delay is not resampled
//! when other transitions fire; only loss of enabling invalidates it.

use rand::Rng;

use crate::dist;
use crate::net::Net;

/// Removes schedule entries for transitions that are no longer ready,
/// resetting their `pcn_status` to 1 (`spec.md` §4.4 step 2).
pub fn prune(net: &mut Net) {
    let stale: Vec<String> = net
        .schedule
        .keys()
        .filter(|label| !net.transitions[*label].ready)
        .cloned()
        .collect();
    for label in stale {
        net.schedule.shift_remove(&label);
        if let Some(t) = net.transitions.get_mut(&label) {
            t.pcn_status = 1.0;
        }
    }
}

/// Inserts newly ready, non-instant transitions into the schedule, and
/// reschedules entries whose place-conditional multiplier has changed
/// since it was last sampled (`spec.md` §4.4 step 3).
pub fn populate(net: &mut Net, rng: &mut impl Rng) {
    let candidates: Vec<String> = net
        .transitions
        .iter()
        .filter(|(_, t)| t.ready && !t.timing.is_instant())
        .map(|(label, _)| label.clone())
        .collect();

    for label in candidates {
        if !net.schedule.contains_key(&label) {
            let wait = dist::sample_wait(net, &label, rng);
            let fire_at = net.clock + wait;
            net.schedule.insert(label.clone(), fire_at);
            continue;
        }
        let t = &net.transitions[&label];
        if !t.has_pcn() {
            continue;
        }
        let fresh_con = dist::con(net, t);
        let changed = (fresh_con - t.pcn_status).abs() > f64::EPSILON;
        let waiting = t.waiting;
        if changed {
            if let Some(w) = waiting {
                let sampled = dist::sample_wait(net, &label, rng);
                let new_time = net.clock.max(w.clock + sampled);
                net.schedule.insert(label.clone(), new_time);
            }
        }
    }
}

/// Returns every ready transition that should pre-empt the schedule this
/// step: instant transitions, and transitions with a zero-weight
/// place-conditional arc whose place currently holds tokens
/// (`spec.md` §4.4 step 4). Removes each from the schedule.
pub fn take_instant_priority(net: &mut Net) -> Vec<String> {
    let mut collected = Vec::new();
    for (label, t) in &net.transitions {
        if !t.ready {
            continue;
        }
        let forced_instant = t
            .zero_weight_pcn_places()
            .any(|place| net.places[place].tokens > 0);
        if t.timing.is_instant() || forced_instant {
            collected.push(label.clone());
        }
    }
    for label in &collected {
        net.schedule.shift_remove(label);
    }
    collected
}

/// Picks the earliest-due schedule entry (ties broken uniformly at
/// random), removes it, and returns `(label, Δt)` (`spec.md` §4.4 step 5).
pub fn select_earliest(net: &mut Net, rng: &mut impl Rng) -> Option<(String, f64)> {
    let min = net
        .schedule
        .values()
        .copied()
        .fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return None;
    }
    let candidates: Vec<String> = net
        .schedule
        .iter()
        .filter(|(_, &t)| (t - min).abs() < f64::EPSILON)
        .map(|(label, _)| label.clone())
        .collect();
    let chosen = candidates[rng.gen_range(0..candidates.len())].clone();
    net.schedule.shift_remove(&chosen);
    let dt = min - net.clock;
    Some((chosen, dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{RunConfig, Timing};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn rng() -> Pcg64 {
        Pcg64::seed_from_u64(7)
    }

    #[test]
    fn prune_removes_entries_for_no_longer_ready_transitions() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("T", Timing::Delay(1.0)).unwrap();
        net.schedule.insert("T".to_string(), 5.0);
        net.transitions.get_mut("T").unwrap().ready = false;
        net.transitions.get_mut("T").unwrap().pcn_status = 3.0;
        prune(&mut net);
        assert!(!net.schedule.contains_key("T"));
        assert_eq!(net.transitions["T"].pcn_status, 1.0);
    }

    #[test]
    fn populate_inserts_ready_timed_transitions() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("T", Timing::Delay(4.0)).unwrap();
        net.transitions.get_mut("T").unwrap().ready = true;
        let mut r = rng();
        populate(&mut net, &mut r);
        assert_eq!(net.schedule.get("T").copied(), Some(4.0));
    }

    #[test]
    fn populate_does_not_insert_instant_transitions() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("T", Timing::Instant).unwrap();
        net.transitions.get_mut("T").unwrap().ready = true;
        let mut r = rng();
        populate(&mut net, &mut r);
        assert!(net.schedule.is_empty());
    }

    #[test]
    fn instant_priority_preempts_schedule() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("Timed", Timing::Delay(1.0)).unwrap();
        net.add_trans("Inst", Timing::Instant).unwrap();
        net.transitions.get_mut("Timed").unwrap().ready = true;
        net.transitions.get_mut("Inst").unwrap().ready = true;
        net.schedule.insert("Timed".to_string(), 1.0);
        net.schedule.insert("Inst".to_string(), 0.0);
        let collected = take_instant_priority(&mut net);
        assert_eq!(collected, vec!["Inst".to_string()]);
        assert!(!net.schedule.contains_key("Inst"));
        assert!(net.schedule.contains_key("Timed"));
    }

    #[test]
    fn select_earliest_picks_minimum_and_removes_it() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("A", Timing::Delay(1.0)).unwrap();
        net.add_trans("B", Timing::Delay(1.0)).unwrap();
        net.schedule.insert("A".to_string(), 3.0);
        net.schedule.insert("B".to_string(), 5.0);
        let mut r = rng();
        let (label, dt) = select_earliest(&mut net, &mut r).unwrap();
        assert_eq!(label, "A");
        assert_eq!(dt, 3.0);
        assert!(!net.schedule.contains_key("A"));
    }
}
