//! Per-file date cells driven by the deploy scan.

use chrono::{DateTime, Utc};

/// A single date cell.
///
/// While pending, the value keeps advancing as older deploys are scanned;
/// establishing freezes it, and further writes are no-ops. Expressing the
/// frozen flag as a variant makes a write-after-freeze unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateState {
    Pending(DateTime<Utc>),
    Established(DateTime<Utc>),
}

impl DateState {
    /// The current value, frozen or not.
    pub fn value(&self) -> DateTime<Utc> {
        match self {
            Self::Pending(value) | Self::Established(value) => *value,
        }
    }

    /// Whether the cell is frozen.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Established(_))
    }

    /// Overwrite the pending value. A no-op once established.
    pub fn record(&mut self, value: DateTime<Utc>) {
        if matches!(self, Self::Pending(_)) {
            *self = Self::Pending(value);
        }
    }

    /// Freeze the current value.
    pub fn establish(&mut self) {
        if let Self::Pending(value) = *self {
            *self = Self::Established(value);
        }
    }
}

/// The pair of date cells tracked per target file during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDates {
    pub published: DateState,
    pub modified: DateState,
}

impl FileDates {
    /// Both cells start at the run's default date, unestablished.
    pub fn new(default_date: DateTime<Utc>) -> Self {
        Self {
            published: DateState::Pending(default_date),
            modified: DateState::Pending(default_date),
        }
    }

    /// Freeze both cells at their current values.
    pub fn establish(&mut self) {
        self.published.establish();
        self.modified.establish();
    }

    /// Copy the final values out of the run's working state.
    pub fn resolved(&self) -> ResolvedDates {
        ResolvedDates {
            published: self.published.value(),
            modified: self.modified.value(),
        }
    }
}

/// The resolved date pair returned per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    pub published: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}
