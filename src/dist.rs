//! Distribution-driven delay sampling (`spec.md` §4.2).

use rand::Rng;
use rand_distr::{Beta as BetaDist, Distribution, LogNormal, Normal};

use crate::net::arc::InArc;
use crate::net::transition::Timing;
use crate::net::{Net, Transition};

/// Computes the place-conditional multiplier
/// `con = 1 + Σ pcn.weight * place.tokens` over `t`'s `pcn` incoming arcs.
pub fn con(net: &Net, t: &Transition) -> f64 {
    1.0 + t
        .in_arcs
        .iter()
        .filter_map(|a| match a {
            InArc::Pcn { place, weight } => Some(weight * net.places[place].tokens as f64),
            _ => None,
        })
        .sum::<f64>()
}

/// Draws a non-negative wait for `label` per its configured distribution
/// (`spec.md` §4.2 table), storing the resulting `con` into
/// `Transition::pcn_status`. Panics (a runtime-invariant bug, not a user
/// error — `spec.md` §7) if the sampled wait would be negative or a
/// negative rate is encountered.
pub fn sample_wait(net: &mut Net, label: &str, rng: &mut impl Rng) -> f64 {
    let c = con(net, &net.transitions[label]);
    let clock = net.clock;
    let t = &net.transitions[label];
    let wait = match &t.timing {
        Timing::Instant => 0.0,
        Timing::Rate(rate) => {
            assert!(
                *rate >= 0.0,
                "negative rate encountered for transition {label:?}"
            );
            let u = one_minus_unit(rng);
            -u.ln() / (rate * c)
        }
        Timing::Uniform(bound) => {
            let u = one_minus_unit(rng);
            u * (bound / c)
        }
        Timing::Delay(d) => d / c,
        Timing::Weibull { eta, beta, sigma } => {
            let jittered_eta = if *sigma > 0.0 {
                Normal::new(*eta, *sigma)
                    .expect("valid weibull jitter parameters")
                    .sample(rng)
                    .max(0.0)
            } else {
                *eta
            };
            let u = one_minus_unit(rng);
            (jittered_eta / c) * (-(1.0 - u).ln()).powf(1.0 / beta)
        }
        Timing::Beta { alpha, beta, scale } => {
            let sample = BetaDist::new(*alpha, *beta)
                .expect("valid beta parameters")
                .sample(rng);
            sample * (scale / c)
        }
        Timing::LogNorm { mu, sigma } => LogNormal::new(mu / c, *sigma)
            .expect("valid lognormal parameters")
            .sample(rng),
        Timing::Cyclic { period, offset } => {
            let p = period / c;
            // elapsed in [0, p); on a phase boundary this is 0 and the
            // next fire is a full period away, not immediate.
            p - (clock - offset).rem_euclid(p)
        }
    };
    assert!(wait >= 0.0, "sampled negative wait for transition {label:?}");
    net.transitions.get_mut(label).unwrap().pcn_status = c;
    wait
}

/// Samples `U(0,1)` and flips it to `(0,1]` so formulas dividing by `-ln(u)`
/// never see exactly zero.
fn one_minus_unit(rng: &mut impl Rng) -> f64 {
    1.0 - rng.gen::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::RunConfig;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn rng() -> Pcg64 {
        Pcg64::seed_from_u64(42)
    }

    #[test]
    fn con_is_one_without_pcn_arcs() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 3).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        assert_eq!(con(&net, &net.transitions["T"]), 1.0);
    }

    #[test]
    fn con_scales_with_pcn_weight_and_tokens() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 3).unwrap();
        net.add_trans("T", Timing::Instant).unwrap();
        net.add_in_arc(
            "T",
            InArc::Pcn {
                place: "P".into(),
                weight: 2.0,
            },
        )
        .unwrap();
        assert_eq!(con(&net, &net.transitions["T"]), 7.0);
    }

    #[test]
    fn delay_wait_scales_inversely_with_con() {
        let mut net = Net::new(RunConfig::default());
        net.add_place("P", 1).unwrap();
        net.add_trans("T", Timing::Delay(10.0)).unwrap();
        net.add_in_arc(
            "T",
            InArc::Pcn {
                place: "P".into(),
                weight: 1.0,
            },
        )
        .unwrap();
        let mut r = rng();
        let wait = sample_wait(&mut net, "T", &mut r);
        assert!((wait - 5.0).abs() < 1e-9);
        assert_eq!(net.transitions["T"].pcn_status, 2.0);
    }

    #[test]
    fn cyclic_wait_is_a_full_period_from_a_phase_boundary() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans(
            "T",
            Timing::Cyclic {
                period: 10.0,
                offset: 0.0,
            },
        )
        .unwrap();
        net.clock = 0.0;
        let mut r = rng();
        assert!((sample_wait(&mut net, "T", &mut r) - 10.0).abs() < 1e-9);

        net.clock = 10.0;
        assert!((sample_wait(&mut net, "T", &mut r) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn cyclic_wait_counts_down_from_mid_period() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans(
            "T",
            Timing::Cyclic {
                period: 10.0,
                offset: 0.0,
            },
        )
        .unwrap();
        net.clock = 3.0;
        let mut r = rng();
        assert!((sample_wait(&mut net, "T", &mut r) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn sampled_waits_are_never_negative() {
        let mut net = Net::new(RunConfig::default());
        net.add_trans("T", Timing::Rate(0.5)).unwrap();
        let mut r = rng();
        for _ in 0..1000 {
            assert!(sample_wait(&mut net, "T", &mut r) >= 0.0);
        }
    }
}
