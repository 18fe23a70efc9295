//! Records handed to callers for every processed fragment.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them verbatim (the CLI prints them as JSON lines).

pub mod events;

pub use events::{
    AlignmentMatch, AyaRange, FragmentOutcome, FragmentReport, MatchStatus, RecitationEvent,
    SequenceError, SequenceErrorType, Severity,
};
