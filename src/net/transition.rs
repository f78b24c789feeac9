//! Petri net transitions.

use statrs::function::gamma::gamma;

use crate::error::NetError;
use crate::net::arc::{InArc, OutArc};

/// A transition's timing policy. Exactly one of these is stored — the
/// construction-time validation in `Timing::new_*` is what makes "both rate
/// and delay on one transition" unrepresentable rather than merely
/// forbidden by convention.
#[derive(Clone, Debug)]
pub enum Timing {
    /// Fires with zero delay as soon as it is ready.
    Instant,
    /// Exponential: wait `-ln(u) / (rate * con)`.
    Rate(f64),
    /// Uniform: wait sampled in `(0, bound/con]`.
    Uniform(f64),
    /// Fixed delay: wait `delay / con`.
    Delay(f64),
    /// Weibull, parameterised by `eta` (already converted from a
    /// user-supplied mean), shape `beta`, and jitter `sigma`.
    Weibull {
        /// Scale parameter, already converted from a user-supplied mean.
        eta: f64,
        /// Shape parameter.
        beta: f64,
        /// Jitter applied to the sample.
        sigma: f64,
    },
    /// Beta distribution scaled by `scale / con`.
    Beta {
        /// Alpha (first shape) parameter.
        alpha: f64,
        /// Beta (second shape) parameter.
        beta: f64,
        /// Scale applied to the sample.
        scale: f64,
    },
    /// Log-normal with location shifted by `con`.
    LogNorm {
        /// Location parameter (mean of the underlying normal).
        mu: f64,
        /// Scale parameter (standard deviation of the underlying normal).
        sigma: f64,
    },
    /// Phase-aligned periodic wait with period `period` and phase `offset`.
    Cyclic {
        /// Period of the cycle.
        period: f64,
        /// Phase offset within the cycle.
        offset: f64,
    },
}

impl Timing {
    /// Constructs a `Rate` timing, rejecting a non-positive rate.
    pub fn rate(rate: f64) -> Result<Self, NetError> {
        if rate <= 0.0 {
            return Err(NetError::Construction(format!(
                "invalid rate parameter: rate={rate}"
            )));
        }
        Ok(Timing::Rate(rate))
    }

    /// Constructs a `Uniform` timing, rejecting a non-positive bound.
    pub fn uniform(bound: f64) -> Result<Self, NetError> {
        if bound <= 0.0 {
            return Err(NetError::Construction(format!(
                "invalid uniform parameter: bound={bound}"
            )));
        }
        Ok(Timing::Uniform(bound))
    }

    /// Constructs a `Delay` timing, rejecting a negative delay.
    pub fn delay(delay: f64) -> Result<Self, NetError> {
        if delay < 0.0 {
            return Err(NetError::Construction(format!(
                "invalid delay parameter: delay={delay}"
            )));
        }
        Ok(Timing::Delay(delay))
    }

    /// Constructs a `LogNorm` timing, rejecting a negative sigma.
    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self, NetError> {
        if sigma < 0.0 {
            return Err(NetError::Construction(format!(
                "invalid lognorm parameters: mu={mu}, sigma={sigma}"
            )));
        }
        Ok(Timing::LogNorm { mu, sigma })
    }

    /// Constructs a `Weibull` timing from a user-supplied *mean* wait,
    /// converting it to the scale parameter `eta = mean / Γ(1 + 1/beta)`
    /// per the net description format (`spec.md` §3).
    pub fn weibull_from_mean(mean: f64, beta: f64, sigma: f64) -> Result<Self, NetError> {
        if mean <= 0.0 || beta <= 0.0 || sigma < 0.0 {
            return Err(NetError::Construction(format!(
                "invalid weibull parameters: mean={mean}, beta={beta}, sigma={sigma}"
            )));
        }
        let eta = mean / gamma(1.0 + 1.0 / beta);
        Ok(Timing::Weibull { eta, beta, sigma })
    }

    /// Constructs a `Beta` timing, validating arity/ranges.
    pub fn beta(alpha: f64, beta: f64, scale: f64) -> Result<Self, NetError> {
        if alpha <= 0.0 || beta <= 0.0 || scale <= 0.0 {
            return Err(NetError::Construction(format!(
                "invalid beta parameters: alpha={alpha}, beta={beta}, scale={scale}"
            )));
        }
        Ok(Timing::Beta { alpha, beta, scale })
    }

    /// Returns `true` iff this timing fires with zero delay.
    pub fn is_instant(&self) -> bool {
        matches!(self, Timing::Instant)
    }
}

/// State tracked while a transition may be waiting in `schedule`/
/// `stochastic` mode (see `spec.md` §4.1).
#[derive(Copy, Clone, Debug)]
pub struct Waiting {
    /// Step at which this transition first became ready.
    pub step: u64,
    /// Clock at which this transition first became ready.
    pub clock: f64,
}

/// A timed or instant rule that atomically consumes and produces tokens.
#[derive(Clone, Debug)]
pub struct Transition {
    /// Unique textual label.
    pub label: String,
    /// Timing policy governing how long this transition waits once ready.
    pub timing: Timing,
    /// Incoming arcs (standard, inhibit, or place-conditional).
    pub in_arcs: Vec<InArc>,
    /// Outgoing (always standard) arcs.
    pub out_arcs: Vec<OutArc>,
    /// Cap on firing count; reaching it is a termination condition.
    pub max_fire: Option<u64>,
    /// `k`-of-`N` voting threshold over standard incoming arcs.
    pub vote: Option<u32>,
    /// Place labels to reset when this transition fires (already
    /// glob-expanded at construction time).
    pub reset: Vec<String>,
    /// Visualisation-only grouping.
    pub group: Option<i64>,

    // Runtime state.
    /// Number of times this transition has fired.
    pub fired_count: u64,
    /// Clock at which this transition last fired.
    pub last_fired: Option<f64>,
    /// When this transition became ready, if it is currently waiting under
    /// `schedule`/`stochastic` mode.
    pub waiting: Option<Waiting>,
    /// Last computed place-conditional multiplier, `con`.
    pub pcn_status: f64,
    /// Whether this transition is enabled as of the current step.
    pub ready: bool,
}

impl Transition {
    /// Returns a new, arc-less transition with the given timing.
    pub fn new(label: impl Into<String>, timing: Timing) -> Self {
        Self {
            label: label.into(),
            timing,
            in_arcs: Vec::new(),
            out_arcs: Vec::new(),
            max_fire: None,
            vote: None,
            reset: Vec::new(),
            group: None,
            fired_count: 0,
            last_fired: None,
            waiting: None,
            pcn_status: 1.0,
            ready: false,
        }
    }

    /// Returns `true` iff this transition has any place-conditional
    /// incoming arc.
    pub fn has_pcn(&self) -> bool {
        self.in_arcs.iter().any(|a| matches!(a, InArc::Pcn { .. }))
    }

    /// Returns the place-conditional arcs with weight zero, if any — these
    /// force instant behaviour whenever their place holds tokens
    /// (`spec.md` §4.2).
    pub fn zero_weight_pcn_places<'a>(&'a self) -> impl Iterator<Item = &'a str> + 'a {
        self.in_arcs.iter().filter_map(|a| match a {
            InArc::Pcn { place, weight } if *weight == 0.0 => Some(place.as_str()),
            _ => None,
        })
    }

    /// Returns `true` iff `max_fire` has been reached.
    pub fn exhausted(&self) -> bool {
        matches!(self.max_fire, Some(cap) if self.fired_count >= cap)
    }
}
