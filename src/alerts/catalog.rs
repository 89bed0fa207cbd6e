//! Alert catalog
//!
//! Static policy table: one definition per alert kind with priority, display
//! action and supersede edges. Policy invariant: a superseding alert's
//! priority is never below the priority of any alert it supersedes, and the
//! supersede graph is acyclic. Both are asserted at construction time.

use super::types::{AlertAction, AlertDefinition, AlertKind};

const DEFINITIONS: [AlertDefinition; 14] = [
    AlertDefinition {
        kind: AlertKind::UnknownWavemeterError,
        priority: 100,
        message: "WMT UNKNOWN ERR",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::UnderExposed,
        priority: 100,
        message: "UNDER EXPOSED",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::OverExposed,
        priority: 100,
        message: "OVER EXPOSED",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::NoSignal,
        priority: 100,
        message: "WMT NO SIGNAL",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::BadSignal,
        priority: 100,
        message: "WMT BAD SIGNAL",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::DacUnknownError,
        priority: 90,
        message: "DAC UNKNOWN ERR",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::DacRailed,
        priority: 90,
        message: "DAC RAILED",
        action: AlertAction::FlashError,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::ErrorOutOfBoundLasting,
        priority: 80,
        message: "OUT OF LOCK",
        action: AlertAction::FlashError,
        supersedes: &[AlertKind::ErrorOutOfBoundTemporal],
    },
    AlertDefinition {
        kind: AlertKind::ErrorOutOfBoundTemporal,
        priority: 70,
        message: "FREQ DEVIATING",
        action: AlertAction::FlashWarning,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::Idle,
        priority: 0,
        message: "IDLE",
        action: AlertAction::Nothing,
        supersedes: &[],
    },
    AlertDefinition {
        kind: AlertKind::QueuedForMonitoring,
        priority: 0,
        message: "QUEUED",
        action: AlertAction::Nothing,
        supersedes: &[AlertKind::Idle],
    },
    // Priority 20, not the historical 10: Monitoring supersedes PidLocked,
    // so it cannot rank below it.
    AlertDefinition {
        kind: AlertKind::Monitoring,
        priority: 20,
        message: "MONITORING",
        action: AlertAction::Nothing,
        supersedes: &[
            AlertKind::QueuedForMonitoring,
            AlertKind::PidEngaged,
            AlertKind::PidLocked,
        ],
    },
    AlertDefinition {
        kind: AlertKind::PidEngaged,
        priority: 10,
        message: "PID ENGAGED",
        action: AlertAction::Nothing,
        supersedes: &[AlertKind::QueuedForMonitoring],
    },
    AlertDefinition {
        kind: AlertKind::PidLocked,
        priority: 20,
        message: "LOCKED",
        action: AlertAction::Nothing,
        supersedes: &[AlertKind::PidEngaged],
    },
];

/// Read-only alert policy table, populated once at engine construction
#[derive(Debug, Clone, Copy)]
pub struct AlertCatalog;

impl AlertCatalog {
    /// Build the catalog and assert the policy invariants
    pub fn new() -> Self {
        let catalog = Self;
        catalog.validate();
        catalog
    }

    /// Look up the definition for a kind
    pub fn definition(&self, kind: AlertKind) -> &'static AlertDefinition {
        DEFINITIONS
            .iter()
            .find(|def| def.kind == kind)
            .unwrap_or_else(|| unreachable!("catalog covers every alert kind"))
    }

    /// Priority of a kind
    pub fn priority(&self, kind: AlertKind) -> u32 {
        self.definition(kind).priority
    }

    fn validate(&self) {
        assert_eq!(
            DEFINITIONS.len(),
            AlertKind::ALL.len(),
            "catalog must define every alert kind exactly once"
        );
        for kind in AlertKind::ALL {
            let def = self.definition(kind);
            for &superseded in def.supersedes {
                assert!(
                    def.priority >= self.definition(superseded).priority,
                    "{kind} (priority {}) cannot supersede {superseded} (priority {})",
                    def.priority,
                    self.definition(superseded).priority,
                );
            }
        }
        // No cycles through supersede edges
        for kind in AlertKind::ALL {
            let mut stack: Vec<AlertKind> = self.definition(kind).supersedes.to_vec();
            let mut visited = Vec::new();
            while let Some(current) = stack.pop() {
                assert!(current != kind, "supersede cycle through {kind}");
                if visited.contains(&current) {
                    continue;
                }
                visited.push(current);
                stack.extend_from_slice(self.definition(current).supersedes);
            }
        }
    }
}

impl Default for AlertCatalog {
    fn default() -> Self {
        Self::new()
    }
}
