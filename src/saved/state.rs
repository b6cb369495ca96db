use serde::{Deserialize, Serialize};

/// Per-listing lifecycle of an optimistic save/unsave.
///
/// `Idle -> Pending -> Confirmed | RolledBack`, and any settled state may
/// start a new `Pending`. The `bool`s are "saved" memberships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveState {
    #[default]
    Idle,
    Pending { intended: bool, previous: bool },
    Confirmed { saved: bool },
    RolledBack { saved: bool },
}

impl SaveState {
    pub fn is_pending(&self) -> bool {
        matches!(self, SaveState::Pending { .. })
    }

    /// Start a toggle from the current membership. `None` while one is in flight.
    pub fn begin(self, currently_saved: bool) -> Option<SaveState> {
        if self.is_pending() {
            return None;
        }
        Some(SaveState::Pending {
            intended: !currently_saved,
            previous: currently_saved,
        })
    }

    /// Remote write succeeded: the optimistic value stands.
    pub fn confirm(self) -> SaveState {
        match self {
            SaveState::Pending { intended, .. } => SaveState::Confirmed { saved: intended },
            other => other,
        }
    }

    /// Remote write failed: fall back to the value before the toggle.
    pub fn roll_back(self) -> SaveState {
        match self {
            SaveState::Pending { previous, .. } => SaveState::RolledBack { saved: previous },
            other => other,
        }
    }

    /// Membership this state implies, if it implies one
    pub fn saved(&self) -> Option<bool> {
        match *self {
            SaveState::Idle => None,
            SaveState::Pending { intended, .. } => Some(intended),
            SaveState::Confirmed { saved } | SaveState::RolledBack { saved } => Some(saved),
        }
    }
}

/// Result of a toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Saved,
    Unsaved,
    /// Another toggle for the same listing was still in flight
    Skipped,
}
