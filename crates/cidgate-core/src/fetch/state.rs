// ── Fetch state machine ──

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a smart fetch is. Indices point into the ordered candidate list.
///
/// `Idle → Ranking → Trying(i) → Verifying(i) → Success(i)`, or back to
/// `Trying(i + 1)` on any gateway failure, or `Exhausted` when the list
/// runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "candidate", rename_all = "snake_case")]
pub enum FetchState {
    Idle,
    Ranking,
    Trying(usize),
    Verifying(usize),
    Success(usize),
    Exhausted,
}

impl FetchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success(_) | Self::Exhausted)
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Ranking => f.write_str("ranking"),
            Self::Trying(i) => write!(f, "trying({i})"),
            Self::Verifying(i) => write!(f, "verifying({i})"),
            Self::Success(i) => write!(f, "success({i})"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}
