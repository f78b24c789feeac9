//! Monte Carlo simulation engine for extended, timed Petri nets.
//!
//! A net is built from [`net::Net`] — places, transitions, and arcs,
//! including inhibit and place-conditional arcs, voting transitions, and
//! per-transition reset lists — then driven to completion either once
//! ([`engine::run_to_completion`]) or across an independently-seeded batch
//! of runs ([`batch::run_batch`]) under one of four stepper modes
//! ([`net::RunMode`]). Nets round-trip through a line-oriented text format
//! ([`parser`]); traces and aggregate statistics are written as CSV
//! ([`trace`], [`summary`]).

#![deny(missing_docs)]
#![deny(clippy::all)]

pub mod batch;
pub mod cli;
pub mod dist;
pub mod enabling;
pub mod engine;
pub mod error;
pub mod net;
pub mod parser;
pub mod schedule;
pub mod summary;
pub mod trace;
