//! Enabling analyser (`spec.md` §4.1).

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::net::arc::InArc;
use crate::net::Net;

/// The outcome of evaluating one transition's enabling predicate.
#[derive(Clone, Debug, Default)]
pub struct Readiness {
    /// Whether the transition is enabled this step.
    pub ready: bool,
    /// Labels of places reached by a standard incoming arc whose condition
    /// (`tokens >= weight && tokens - weight >= min`) did *not* hold. Only
    /// meaningful for voting transitions — a non-voting transition is only
    /// ready when this set is empty.
    pub skipped_places: HashSet<String>,
}

/// Evaluates the ready predicate for every transition in `net`, without
/// mutating anything. Call `apply` to write the results back onto
/// `Transition::ready`.
pub fn evaluate(net: &Net) -> IndexMap<String, Readiness> {
    net.transitions
        .iter()
        .map(|(label, t)| {
            let r = if t.in_arcs.is_empty() && t.out_arcs.is_empty() {
                Readiness::default()
            } else {
                evaluate_one(net, t)
            };
            (label.clone(), r)
        })
        .collect()
}

fn evaluate_one(net: &Net, t: &crate::net::Transition) -> Readiness {
    // Rule 3: any violated inhibit arc disables T outright, discarding any
    // vote tally.
    for arc in &t.in_arcs {
        if let InArc::Inh { place, weight } = arc {
            let tokens = net.places[place].tokens;
            if tokens >= *weight {
                return Readiness {
                    ready: false,
                    skipped_places: HashSet::new(),
                };
            }
        }
    }

    // Rule 4: every standard outgoing arc must leave room under the
    // target's max bound.
    for out in &t.out_arcs {
        let place = &net.places[&out.place];
        if !place.max.admits(place.tokens, out.weight) {
            return Readiness {
                ready: false,
                skipped_places: HashSet::new(),
            };
        }
    }

    // Rule 2 / 5: standard incoming arcs, possibly relaxed by a vote
    // threshold.
    let mut satisfied = 0u32;
    let mut total_std = 0u32;
    let mut skipped_places = HashSet::new();
    for arc in &t.in_arcs {
        if let InArc::Std { place, weight } = arc {
            total_std += 1;
            let p = &net.places[place];
            let holds = p.tokens >= *weight && p.tokens - *weight >= p.min;
            if holds {
                satisfied += 1;
            } else {
                skipped_places.insert(place.clone());
            }
        }
    }

    let ready = match t.vote {
        Some(k) => satisfied >= k,
        None => total_std == 0 || satisfied == total_std,
    };

    if ready && t.vote.is_none() {
        // Non-voting transitions only fire with every std arc satisfied, so
        // there is nothing to skip on commit.
        skipped_places.clear();
    }

    Readiness {
        ready,
        skipped_places,
    }
}

/// Writes `readiness` back onto each transition's `ready` flag.
pub fn apply(net: &mut Net, readiness: &IndexMap<String, Readiness>) {
    for (label, r) in readiness {
        if let Some(t) = net.transitions.get_mut(label) {
            t.ready = r.ready;
        }
    }
}
