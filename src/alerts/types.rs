//! Alert domain types
//!
//! Alert kinds identify per-channel conditions; their display behavior and
//! mutual supersession are defined in the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one per-channel alert condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// Wavemeter failed in an unclassified way
    UnknownWavemeterError,
    /// CCD under-exposed for the current signal
    UnderExposed,
    /// CCD over-exposed for the current signal
    OverExposed,
    /// No light on the interferometer
    NoSignal,
    /// Unusable signal (multimode, poor contrast)
    BadSignal,
    /// DAC command failed in an unclassified way
    DacUnknownError,
    /// Frequency left the error bound recently
    ErrorOutOfBoundTemporal,
    /// Frequency has been out of bound long enough to count as lost lock
    ErrorOutOfBoundLasting,
    /// DAC output saturated at a rail
    DacRailed,
    /// Channel registered but not monitored
    Idle,
    /// Channel waits for its turn in the poll cycle
    QueuedForMonitoring,
    /// Channel is being serviced right now
    Monitoring,
    /// PID feedback is engaged for this channel
    PidEngaged,
    /// Frequency has stayed within bound long enough to count as locked
    PidLocked,
}

impl AlertKind {
    /// Every alert kind, in catalog order
    pub const ALL: [AlertKind; 14] = [
        AlertKind::UnknownWavemeterError,
        AlertKind::UnderExposed,
        AlertKind::OverExposed,
        AlertKind::NoSignal,
        AlertKind::BadSignal,
        AlertKind::DacUnknownError,
        AlertKind::ErrorOutOfBoundTemporal,
        AlertKind::ErrorOutOfBoundLasting,
        AlertKind::DacRailed,
        AlertKind::Idle,
        AlertKind::QueuedForMonitoring,
        AlertKind::Monitoring,
        AlertKind::PidEngaged,
        AlertKind::PidLocked,
    ];
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWavemeterError => write!(f, "unknown_wavemeter_error"),
            Self::UnderExposed => write!(f, "under_exposed"),
            Self::OverExposed => write!(f, "over_exposed"),
            Self::NoSignal => write!(f, "no_signal"),
            Self::BadSignal => write!(f, "bad_signal"),
            Self::DacUnknownError => write!(f, "dac_unknown_error"),
            Self::ErrorOutOfBoundTemporal => write!(f, "error_out_of_bound_temporal"),
            Self::ErrorOutOfBoundLasting => write!(f, "error_out_of_bound_lasting"),
            Self::DacRailed => write!(f, "dac_railed"),
            Self::Idle => write!(f, "idle"),
            Self::QueuedForMonitoring => write!(f, "queued_for_monitoring"),
            Self::Monitoring => write!(f, "monitoring"),
            Self::PidEngaged => write!(f, "pid_engaged"),
            Self::PidLocked => write!(f, "pid_locked"),
        }
    }
}

/// How the display should react to a channel's top alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlertAction {
    /// No visual action
    #[default]
    Nothing,
    /// Blinking warning
    FlashWarning,
    /// Blinking error
    FlashError,
    /// Steady warning
    StaticWarning,
    /// Steady error
    StaticError,
}

impl fmt::Display for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "nothing"),
            Self::FlashWarning => write!(f, "flash-warning"),
            Self::FlashError => write!(f, "flash-error"),
            Self::StaticWarning => write!(f, "static-warning"),
            Self::StaticError => write!(f, "static-error"),
        }
    }
}

/// Immutable per-kind alert policy
#[derive(Debug, Clone, Copy)]
pub struct AlertDefinition {
    /// The kind this definition describes
    pub kind: AlertKind,
    /// 0 = lowest; ties broken by posting order
    pub priority: u32,
    /// Short display message
    pub message: &'static str,
    /// Display action while this alert tops the active list
    pub action: AlertAction,
    /// Alerts hidden from the active list while this one is active
    pub supersedes: &'static [AlertKind],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_kind() {
        // Display impl doubles as an exhaustiveness check; make sure ALL
        // has no duplicates.
        let mut seen = std::collections::HashSet::new();
        for kind in AlertKind::ALL {
            assert!(seen.insert(kind), "duplicate kind {kind}");
        }
        assert_eq!(seen.len(), 14);
    }

    #[test]
    fn test_default_action_is_nothing() {
        assert_eq!(AlertAction::default(), AlertAction::Nothing);
    }
}
