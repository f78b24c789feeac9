//! Crate-wide error types (`spec.md` §7).

use thiserror::Error;

/// Fatal errors detected at construction or arc-verification time. These
/// are the only error classes a caller can legitimately recover from — a
/// bad net description. Runtime invariant violations are assertion bugs
/// and deliberately do not appear here (see `spec.md` §7).
#[derive(Error, Debug)]
pub enum NetError {
    /// A net was constructed with an invalid or inconsistent definition.
    #[error("construction error: {0}")]
    Construction(String),

    /// An arc on a transition names a place that does not exist.
    #[error("reference error: arc on transition {trans:?} names unknown place {place:?}")]
    Reference {
        /// Name of the transition owning the offending arc.
        trans: String,
        /// Name of the place that could not be found.
        place: String,
    },

    /// Two elements in the net share the same label.
    #[error("duplicate label: {0:?}")]
    DuplicateLabel(String),
}

/// Errors surfaced while running a simulation or writing its traces.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The underlying net was invalid.
    #[error("net error: {0}")]
    Net(#[from] NetError),

    /// Writing trace or summary output failed.
    #[error("trace I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing or reading CSV output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors surfaced while parsing or emitting a `.mpn` net description.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A parameter line used a key that is not recognised.
    #[error("line {line}: unknown parameter key {key:?}")]
    UnknownParam {
        /// Line number in the source file.
        line: usize,
        /// The unrecognised key.
        key: String,
    },

    /// An arc line used a kind that is not recognised.
    #[error("line {line}: unknown arc kind {kind:?}")]
    UnknownArcKind {
        /// Line number in the source file.
        line: usize,
        /// The unrecognised arc kind.
        kind: String,
    },

    /// A transition line named a distribution that is not recognised.
    #[error("line {line}: unrecognised transition distribution {kind:?}")]
    UnknownDistribution {
        /// Line number in the source file.
        line: usize,
        /// The unrecognised distribution kind.
        kind: String,
    },

    /// A line could not be parsed into any recognised entry form.
    #[error("line {line}: malformed entry: {text}")]
    MalformedLine {
        /// Line number in the source file.
        line: usize,
        /// The raw text of the offending line.
        text: String,
    },

    /// The parsed net failed construction or arc verification.
    #[error("line {line}: net error: {source}")]
    Net {
        /// The underlying net error.
        #[source]
        source: NetError,
        /// Line number at which the error was detected.
        line: usize,
    },

    /// Reading or writing the net description failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
