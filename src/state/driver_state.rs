/// Pagination driver states
///
/// This module defines the lifecycle of one pagination run.
use std::fmt;

/// Represents the current state of the pagination driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// Driver created, job URL not yet fetched
    Init,

    /// Fetching page 1 to learn the page count and result total
    FetchingFirst,

    /// Walking pages and handing records to the checkpoint writer
    Iterating,

    // ===== Terminal States =====
    /// Last page processed and final batch flushed
    Done,

    /// Unrecoverable fetch or parse failure
    Error,
}

impl DriverState {
    /// Returns true if no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// `Error` is reachable from every non-terminal state. `FetchingFirst` may
    /// go straight to `Done` when the listing reports no pages or no results.
    pub fn can_transition_to(&self, next: DriverState) -> bool {
        match (self, next) {
            (s, Self::Error) => !s.is_terminal(),
            (Self::Init, Self::FetchingFirst) => true,
            (Self::FetchingFirst, Self::Iterating) => true,
            (Self::FetchingFirst, Self::Done) => true,
            (Self::Iterating, Self::Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FetchingFirst => "fetching_first",
            Self::Iterating => "iterating",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
