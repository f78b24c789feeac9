//! `.mpn` net description parser/emitter (`spec.md` §6).
//!
//! Line-oriented: blank lines and `#`-prefixed comments are ignored,
//! trailing `#`-comments are stripped. A header of key/value lines sets
//! run parameters before either a `Places` or `Transitions` marker line
//! switches the parser into the corresponding section.

use crate::error::{NetError, ParseError};
use crate::net::arc::InArc;
use crate::net::transition::Timing;
use crate::net::{Net, RunConfig, RunMode};

enum Section {
    Header,
    Places,
    Transitions,
}

/// Parses a complete `.mpn` document into a [`Net`].
pub fn parse(text: &str) -> Result<Net, ParseError> {
    let mut config = RunConfig::default();
    let mut section = Section::Header;
    let mut net: Option<Net> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens[0] {
            "Places" => {
                net.get_or_insert_with(|| Net::new(config.clone()));
                section = Section::Places;
                continue;
            }
            "Transitions" => {
                net.get_or_insert_with(|| Net::new(config.clone()));
                section = Section::Transitions;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Header => parse_header_line(&mut config, &tokens, line_no)?,
            Section::Places => {
                let net = net
                    .as_mut()
                    .expect("Places marker always constructs the net first");
                parse_place_line(net, &tokens, line_no)?;
            }
            Section::Transitions => {
                let net = net
                    .as_mut()
                    .expect("Transitions marker always constructs the net first");
                parse_transition_line(net, &tokens, line_no)?;
            }
        }
    }

    let net = net.unwrap_or_else(|| Net::new(config));
    net.verify()
        .map_err(|source| ParseError::Net { source, line: 0 })?;
    Ok(net)
}

fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

fn parse_optional(s: &str) -> Option<String> {
    if s == "None" {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_header_line(config: &mut RunConfig, tokens: &[&str], line_no: usize) -> Result<(), ParseError> {
    let key = tokens[0];
    let value = |i: usize| -> Result<&str, ParseError> {
        tokens.get(i).copied().ok_or_else(|| ParseError::MalformedLine {
            line: line_no,
            text: format!("key {key:?} has no value"),
        })
    };
    let float_value = |i: usize| -> Result<f64, ParseError> {
        value(i)?.parse().map_err(|_| ParseError::MalformedLine {
            line: line_no,
            text: format!("key {key:?} expects a number"),
        })
    };

    match key {
        "name" => config.name = value(1)?.to_string(),
        "units" => config.units = value(1)?.to_string(),
        "runMode" => {
            config.run_mode = RunMode::parse(value(1)?).ok_or_else(|| ParseError::MalformedLine {
                line: line_no,
                text: format!("unknown runMode {:?}", value(1).unwrap_or("")),
            })?
        }
        "dot" => config.dot = parse_bool(value(1)?),
        "visualise" => config.visualise = parse_optional(value(1)?),
        "details" => config.details = parse_bool(value(1)?),
        "useGroup" => config.use_group = parse_bool(value(1)?),
        "orientation" => config.orientation = parse_optional(value(1)?),
        "debug" => config.debug = parse_bool(value(1)?),
        "dotLoc" => {
            let joined = tokens[1..].join(" ");
            config.dot_loc = parse_optional(&joined);
        }
        "maxClock" => config.max_clock = float_value(1)?,
        "maxSteps" => config.max_steps = float_value(1)? as u64,
        "simsFactor" => config.sims_factor = float_value(1)?,
        "history" => config.history = parse_bool(value(1)?),
        "analysisStep" => config.analysis_step = float_value(1)?,
        "fileOutput" => config.file_output = parse_bool(value(1)?),
        "endOnly" => config.end_only = parse_bool(value(1)?),
        other => {
            return Err(ParseError::UnknownParam {
                line: line_no,
                key: other.to_string(),
            })
        }
    }
    Ok(())
}

fn parse_place_line(net: &mut Net, tokens: &[&str], line_no: usize) -> Result<(), ParseError> {
    let label = tokens[0];
    let rest = &tokens[1..];

    let (tokens_count, group) = if let Some(group_idx) = rest.iter().position(|t| *t == "GROUP") {
        let group_str = rest.get(group_idx + 1).ok_or_else(|| ParseError::MalformedLine {
            line: line_no,
            text: format!("place {label:?} has GROUP with no value"),
        })?;
        let group: i64 = group_str.parse().map_err(|_| ParseError::MalformedLine {
            line: line_no,
            text: format!("place {label:?} has a non-integer GROUP"),
        })?;
        if group < 0 {
            return Err(ParseError::MalformedLine {
                line: line_no,
                text: format!("place {label:?} has a negative GROUP"),
            });
        }
        let tokens_count = if group_idx > 0 {
            rest[0].parse().map_err(|_| ParseError::MalformedLine {
                line: line_no,
                text: format!("place {label:?} has a non-integer token count"),
            })?
        } else {
            0
        };
        (tokens_count, Some(group))
    } else if let Some(tok) = rest.first() {
        let tokens_count = tok.parse().map_err(|_| ParseError::MalformedLine {
            line: line_no,
            text: format!("place {label:?} has a non-integer token count"),
        })?;
        (tokens_count, None)
    } else {
        (0, None)
    };

    net.add_place(label, tokens_count)
        .map_err(|source| ParseError::Net { source, line: line_no })?;
    if let Some(group) = group {
        net.places.get_mut(label).unwrap().group = Some(group);
    }
    Ok(())
}

enum TransMode {
    None,
    In,
    Out,
    Reset,
    Max,
    Vote,
    Group,
}

fn parse_transition_line(net: &mut Net, tokens: &[&str], line_no: usize) -> Result<(), ParseError> {
    let mut mode = TransMode::None;
    let mut label = String::new();
    let mut reset_patterns = Vec::new();

    for info in tokens {
        match *info {
            "IN" => {
                mode = TransMode::In;
                continue;
            }
            "OUT" => {
                mode = TransMode::Out;
                continue;
            }
            "RESET" => {
                mode = TransMode::Reset;
                continue;
            }
            "MAX" => {
                mode = TransMode::Max;
                continue;
            }
            "VOTE" => {
                mode = TransMode::Vote;
                continue;
            }
            "GROUP" => {
                mode = TransMode::Group;
                continue;
            }
            _ => {}
        }

        match mode {
            TransMode::None => {
                let parts: Vec<&str> = info.split(':').collect();
                label = parts[0].to_string();
                let kind = parts.get(1).ok_or_else(|| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} names no distribution"),
                })?;
                let timing = parse_timing(kind, &parts[2..], &label, line_no)?;
                net.add_trans(&label, timing)
                    .map_err(|source| ParseError::Net { source, line: line_no })?;
            }
            TransMode::In => {
                let arc = parse_in_arc(info, line_no)?;
                net.add_in_arc(&label, arc)
                    .map_err(|source| ParseError::Net { source, line: line_no })?;
            }
            TransMode::Out => {
                let parts: Vec<&str> = info.split(':').collect();
                if parts.len() > 2 {
                    return Err(ParseError::UnknownArcKind {
                        line: line_no,
                        kind: format!("{}:{}", parts[0], parts[1..].join(":")),
                    });
                }
                if parts.iter().any(|p| matches!(*p, "inh" | "pcn" | "pch")) {
                    return Err(ParseError::MalformedLine {
                        line: line_no,
                        text: format!(
                            "outgoing arc on {label:?} to {:?} may only be std",
                            parts[0]
                        ),
                    });
                }
                let weight = parse_weight_u64(&parts, line_no, &label)?;
                net.add_out_arc(&label, parts[0], weight)
                    .map_err(|source| ParseError::Net { source, line: line_no })?;
            }
            TransMode::Reset => {
                reset_patterns.extend(info.split(':').map(str::to_string));
            }
            TransMode::Max => {
                let max: u64 = info.parse().map_err(|_| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} has a non-integer MAX"),
                })?;
                net.transitions.get_mut(&label).unwrap().max_fire = Some(max);
            }
            TransMode::Vote => {
                let vote: u32 = info.parse().map_err(|_| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} has a non-integer VOTE"),
                })?;
                net.transitions.get_mut(&label).unwrap().vote = Some(vote);
            }
            TransMode::Group => {
                let group: i64 = info.parse().map_err(|_| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} has a non-integer GROUP"),
                })?;
                if group < 0 {
                    return Err(ParseError::MalformedLine {
                        line: line_no,
                        text: format!("transition {label:?} has a negative GROUP"),
                    });
                }
                net.transitions.get_mut(&label).unwrap().group = Some(group);
            }
        }
    }

    if !reset_patterns.is_empty() {
        net.set_reset_list(&label, &reset_patterns)
            .map_err(|source| ParseError::Net { source, line: line_no })?;
    }
    Ok(())
}

fn parse_weight_u64(parts: &[&str], line_no: usize, label: &str) -> Result<u64, ParseError> {
    match parts.get(1) {
        Some(w) => w.parse().map_err(|_| ParseError::MalformedLine {
            line: line_no,
            text: format!("transition {label:?} has a non-integer arc weight"),
        }),
        None => Ok(1),
    }
}

/// Incoming arc tokens are `place[:weight][:inh|:pcn]`: the kind tag, if
/// any, is identified anywhere in the colon-separated parts (matching
/// legacy inputs that omit an explicit weight), and an explicit weight
/// occupies the first remaining slot (`spec.md` §6; `pch` accepted as a
/// legacy synonym for `pcn`). Any other, unrecognised third segment — or
/// more than one leftover segment once the kind tag is set aside — is a
/// fatal unknown-arc-kind error rather than being silently dropped.
fn parse_in_arc(info: &str, line_no: usize) -> Result<InArc, ParseError> {
    let parts: Vec<&str> = info.split(':').collect();
    let place = parts[0].to_string();
    let is_kind_tag = |s: &&str| matches!(*s, "inh" | "pcn" | "pch");

    let kind_tag = parts[1..].iter().find(|p| is_kind_tag(p)).copied();
    let mut rest: Vec<&str> = parts[1..].iter().filter(|p| !is_kind_tag(p)).copied().collect();
    if rest.len() > 1 {
        return Err(ParseError::UnknownArcKind {
            line: line_no,
            kind: format!("{place}:{}", parts[1..].join(":")),
        });
    }
    let weight_token = rest.pop();

    match kind_tag {
        Some("inh") => {
            let weight = parse_arc_weight(weight_token, 1, line_no, &place)?;
            Ok(InArc::Inh { place, weight })
        }
        Some(_) => {
            let weight: f64 = parse_arc_weight(weight_token, 0.0, line_no, &place)?;
            if weight < 0.0 {
                return Err(ParseError::MalformedLine {
                    line: line_no,
                    text: format!("place-conditional arc on {place:?} has a negative weight"),
                });
            }
            Ok(InArc::Pcn { place, weight })
        }
        None => {
            let weight = parse_arc_weight(weight_token, 1, line_no, &place)?;
            Ok(InArc::Std { place, weight })
        }
    }
}

fn parse_arc_weight<T: std::str::FromStr>(
    token: Option<&str>,
    default: T,
    line_no: usize,
    place: &str,
) -> Result<T, ParseError> {
    match token {
        None => Ok(default),
        Some(w) => w.parse().map_err(|_| ParseError::UnknownArcKind {
            line: line_no,
            kind: format!("{place}:{w}"),
        }),
    }
}

fn parse_timing(kind: &str, params: &[&str], label: &str, line_no: usize) -> Result<Timing, ParseError> {
    let num = |i: usize| -> Result<f64, ParseError> {
        params
            .get(i)
            .ok_or_else(|| ParseError::MalformedLine {
                line: line_no,
                text: format!("transition {label:?} distribution {kind:?} needs a parameter"),
            })
            .and_then(|s| {
                s.parse().map_err(|_| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} distribution {kind:?} has a non-numeric parameter"),
                })
            })
    };
    let net_err = |e: NetError| ParseError::Net { source: e, line: line_no };

    match kind {
        "instant" => Ok(Timing::Instant),
        "rate" => Timing::rate(num(0)?).map_err(net_err),
        "uniform" => Timing::uniform(num(0)?).map_err(net_err),
        "delay" => Timing::delay(num(0)?).map_err(net_err),
        "weibull" => {
            let mean = num(0)?;
            let beta = num(1)?;
            let sigma = params.get(2).map_or(Ok(0.0), |s| {
                s.parse().map_err(|_| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} has a non-numeric weibull sigma"),
                })
            })?;
            Timing::weibull_from_mean(mean, beta, sigma).map_err(net_err)
        }
        "beta" => {
            let alpha = num(0)?;
            let beta = num(1)?;
            let scale = params.get(2).map_or(Ok(1.0), |s| {
                s.parse().map_err(|_| ParseError::MalformedLine {
                    line: line_no,
                    text: format!("transition {label:?} has a non-numeric beta scale"),
                })
            })?;
            Timing::beta(alpha, beta, scale).map_err(net_err)
        }
        "lognorm" => Timing::log_normal(num(0)?, num(1)?).map_err(net_err),
        "cyclic" => Ok(Timing::Cyclic {
            period: num(0)?,
            offset: num(1)?,
        }),
        other => Err(ParseError::UnknownDistribution {
            line: line_no,
            kind: other.to_string(),
        }),
    }
}

/// Emits `net` back into `.mpn` text (the inverse of [`parse`]).
pub fn emit(net: &Net) -> String {
    let c = &net.config;
    let mut out = String::new();
    out.push_str("# Petri Net Parameters\n");
    out.push_str(&format!("\tname {}\n", c.name));
    out.push_str(&format!("\tunits {}\n", c.units));
    out.push_str(&format!("\trunMode {}\n", c.run_mode.as_str()));
    out.push_str(&format!("\tdot {}\n", bool_str(c.dot)));
    out.push_str(&format!("\tvisualise {}\n", opt_str(&c.visualise)));
    out.push_str(&format!("\tdetails {}\n", bool_str(c.details)));
    out.push_str(&format!("\tuseGroup {}\n", bool_str(c.use_group)));
    out.push_str(&format!("\torientation {}\n", opt_str(&c.orientation)));
    out.push_str(&format!("\tdebug {}\n", bool_str(c.debug)));
    out.push_str(&format!("\tdotLoc {}\n", opt_str(&c.dot_loc)));
    out.push('\n');
    out.push_str("# Run Parameters\n");
    out.push_str(&format!("\tmaxClock {}\n", c.max_clock));
    out.push_str(&format!("\tmaxSteps {}\n", c.max_steps));
    out.push_str(&format!("\tsimsFactor {}\n", c.sims_factor));
    out.push_str(&format!("\thistory {}\n", bool_str(c.history)));
    out.push_str(&format!("\tanalysisStep {}\n", c.analysis_step));
    out.push_str(&format!("\tfileOutput {}\n", bool_str(c.file_output)));
    out.push_str(&format!("\tendOnly {}\n", bool_str(c.end_only)));
    out.push('\n');

    out.push_str("# Build Petri Net\n");
    out.push_str("Places\n");
    for (label, p) in &net.places {
        out.push('\t');
        out.push_str(label);
        if p.tokens != 0 {
            out.push_str(&format!(" {}", p.tokens));
        }
        if let Some(g) = p.group {
            out.push_str(&format!(" GROUP {g}"));
        }
        out.push('\n');
    }
    out.push('\n');

    out.push_str("Transitions\n");
    for (label, t) in &net.transitions {
        out.push('\t');
        out.push_str(label);
        out.push(':');
        out.push_str(&timing_str(&t.timing));
        if !t.in_arcs.is_empty() {
            out.push_str(" IN");
            for arc in &t.in_arcs {
                out.push(' ');
                out.push_str(&in_arc_str(arc));
            }
        }
        if !t.out_arcs.is_empty() {
            out.push_str(" OUT");
            for arc in &t.out_arcs {
                out.push(' ');
                out.push_str(&arc.place);
                if arc.weight != 1 {
                    out.push_str(&format!(":{}", arc.weight));
                }
            }
        }
        if !t.reset.is_empty() {
            out.push_str(" RESET ");
            out.push_str(&t.reset.join(":"));
        }
        if let Some(k) = t.vote {
            out.push_str(&format!(" VOTE {k}"));
        }
        if let Some(m) = t.max_fire {
            out.push_str(&format!(" MAX {m}"));
        }
        if let Some(g) = t.group {
            out.push_str(&format!(" GROUP {g}"));
        }
        out.push('\n');
    }
    out
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn opt_str(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "None".to_string())
}

fn timing_str(t: &Timing) -> String {
    match t {
        Timing::Instant => "instant".to_string(),
        Timing::Rate(r) => format!("rate:{r}"),
        Timing::Uniform(u) => format!("uniform:{u}"),
        Timing::Delay(d) => format!("delay:{d}"),
        Timing::Weibull { eta, beta, sigma } => format!("weibull:{eta}:{beta}:{sigma}"),
        Timing::Beta { alpha, beta, scale } => format!("beta:{alpha}:{beta}:{scale}"),
        Timing::LogNorm { mu, sigma } => format!("lognorm:{mu}:{sigma}"),
        Timing::Cyclic { period, offset } => format!("cyclic:{period}:{offset}"),
    }
}

fn in_arc_str(arc: &InArc) -> String {
    match arc {
        InArc::Std { place, weight } if *weight == 1 => place.clone(),
        InArc::Std { place, weight } => format!("{place}:{weight}"),
        InArc::Inh { place, weight } => format!("{place}:{weight}:inh"),
        InArc::Pcn { place, weight } => format!("{place}:{weight}:pcn"),
    }
}
