//! Alert coordination engine
//!
//! Serializes concurrent alert mutations per channel and maintains the
//! alert-list invariants: the active list is sorted by descending priority
//! with posting order breaking ties, superseded alerts stay hidden until
//! their superseder clears, and the cached display action always reflects
//! the top active alert.
//!
//! Each channel slot owns its own lock; operations on different channels
//! never block each other. Notifications are emitted while the slot lock is
//! held, which is why sinks must not re-enter the engine (see
//! [`crate::events`]).

use super::catalog::AlertCatalog;
use super::types::{AlertAction, AlertKind};
use crate::domain::{ChannelId, MAX_CHANNELS};
use crate::events::{EventBus, MonitorEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-channel alert bookkeeping
#[derive(Debug, Default)]
struct ChannelAlertState {
    /// Alerts posted and not yet cleared, in posting order
    total: Vec<AlertKind>,
    /// Alerts shown to the user, sorted by (priority desc, posting order)
    active: Vec<AlertKind>,
    /// Alerts removed from view by the user but not cleared
    dismissed: Vec<AlertKind>,
    /// For each active superseder, the alerts it currently hides
    superseded: HashMap<AlertKind, Vec<AlertKind>>,
    /// Cached action of the top active alert
    action: AlertAction,
}

/// Read-only copy of a channel's alert state
#[derive(Debug, Clone, Serialize)]
pub struct AlertSnapshot {
    /// All posted alerts
    pub total: Vec<AlertKind>,
    /// Displayed alerts, highest priority first
    pub active: Vec<AlertKind>,
    /// Dismissed alerts
    pub dismissed: Vec<AlertKind>,
    /// Current display action
    pub action: AlertAction,
}

/// Stateful per-channel alert lifecycle manager
pub struct AlertEngine {
    catalog: AlertCatalog,
    slots: [Mutex<Option<ChannelAlertState>>; MAX_CHANNELS],
    bus: Arc<EventBus>,
}

impl AlertEngine {
    /// Create an engine publishing notifications on `bus`
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            catalog: AlertCatalog::new(),
            slots: std::array::from_fn(|_| Mutex::new(None)),
            bus,
        }
    }

    /// The policy table backing this engine
    pub fn catalog(&self) -> &AlertCatalog {
        &self.catalog
    }

    /// Register a channel. Idempotent.
    pub fn register(&self, id: ChannelId) {
        let mut slot = self.lock_slot(id);
        if slot.is_none() {
            *slot = Some(ChannelAlertState::default());
        }
    }

    /// Drop a channel's alert state
    pub fn unregister(&self, id: ChannelId) {
        *self.lock_slot(id) = None;
    }

    /// Whether a channel is registered
    pub fn is_registered(&self, id: ChannelId) -> bool {
        self.lock_slot(id).is_some()
    }

    /// Post an alert on a channel
    ///
    /// Handles supersession in both directions, reactivation of dismissed
    /// alerts and priority reordering of an already-active alert. Operating
    /// on an unregistered channel is a programming error and panics.
    pub fn add_alert(&self, id: ChannelId, kind: AlertKind) {
        let mut slot = self.lock_slot(id);
        let state = Self::state(&mut slot, id);
        let definition = self.catalog.definition(kind);

        let changed;
        if !state.total.contains(&kind) {
            state.total.push(kind);

            // Hide everything the new alert supersedes
            let to_supersede: Vec<AlertKind> = state
                .total
                .iter()
                .copied()
                .filter(|existing| definition.supersedes.contains(existing))
                .collect();
            if !to_supersede.is_empty() {
                for hidden in &to_supersede {
                    state.active.retain(|k| k != hidden);
                    state.dismissed.retain(|k| k != hidden);
                }
                state.superseded.insert(kind, to_supersede);
            }

            // The new alert itself may be superseded by an existing one
            let mut is_superseded = false;
            let existing: Vec<AlertKind> = state
                .total
                .iter()
                .copied()
                .filter(|k| *k != kind)
                .collect();
            for superseder in existing {
                if self.catalog.definition(superseder).supersedes.contains(&kind) {
                    is_superseded = true;
                    state.superseded.entry(superseder).or_default().push(kind);
                }
            }
            if is_superseded {
                // Stays hidden; no active-list mutation, no notification
                return;
            }

            self.insert_into_active(state, kind);
            changed = true;
        } else if !state.active.contains(&kind) {
            if let Some(pos) = state.dismissed.iter().position(|k| *k == kind) {
                // Reactivate a dismissed alert
                state.dismissed.remove(pos);
                self.insert_into_active(state, kind);
                changed = true;
            } else {
                // Currently superseded by something else
                return;
            }
        } else {
            // Already active; reposition if its priority now ranks higher
            changed = self.insert_into_active(state, kind);
        }

        if changed {
            self.refresh(id, state);
        }
    }

    /// Remove an alert from a channel, restoring anything it superseded
    pub fn clear_alert(&self, id: ChannelId, kind: AlertKind) {
        let mut slot = self.lock_slot(id);
        let state = Self::state(&mut slot, id);

        let mut need_refresh = false;
        if let Some(pos) = state.total.iter().position(|k| *k == kind) {
            state.total.remove(pos);
        }

        if let Some(pos) = state.active.iter().position(|k| *k == kind) {
            state.active.remove(pos);
            need_refresh = true;
        } else if let Some(pos) = state.dismissed.iter().position(|k| *k == kind) {
            state.dismissed.remove(pos);
        }

        if let Some(restored) = state.superseded.remove(&kind) {
            for candidate in restored {
                let still_posted = state.total.contains(&candidate);
                let still_hidden = state
                    .superseded
                    .values()
                    .any(|hidden| hidden.contains(&candidate));
                if still_posted && !still_hidden {
                    self.insert_into_active(state, candidate);
                    need_refresh = true;
                }
            }
        }

        if need_refresh {
            self.refresh(id, state);
        }
    }

    /// Move an active alert to the dismissed list (user action)
    pub fn dismiss_alert(&self, id: ChannelId, kind: AlertKind) {
        let mut slot = self.lock_slot(id);
        let state = Self::state(&mut slot, id);

        let Some(pos) = state.active.iter().position(|k| *k == kind) else {
            return;
        };
        state.active.remove(pos);
        state.dismissed.push(kind);

        self.refresh(id, state);
    }

    /// Forget the dismissed list (user action); total/active untouched
    pub fn clear_dismissed_alerts(&self, id: ChannelId) {
        let mut slot = self.lock_slot(id);
        let state = Self::state(&mut slot, id);
        state.dismissed.clear();
    }

    /// Whether an alert is currently posted (active, dismissed or hidden)
    pub fn is_posted(&self, id: ChannelId, kind: AlertKind) -> bool {
        let mut slot = self.lock_slot(id);
        Self::state(&mut slot, id).total.contains(&kind)
    }

    /// Current display action of a channel
    pub fn current_action(&self, id: ChannelId) -> AlertAction {
        let mut slot = self.lock_slot(id);
        Self::state(&mut slot, id).action
    }

    /// Consistent copy of a channel's alert state
    pub fn snapshot(&self, id: ChannelId) -> AlertSnapshot {
        let mut slot = self.lock_slot(id);
        let state = Self::state(&mut slot, id);
        AlertSnapshot {
            total: state.total.clone(),
            active: state.active.clone(),
            dismissed: state.dismissed.clone(),
            action: state.action,
        }
    }

    /// Display message for a kind, from the catalog
    pub fn message(&self, kind: AlertKind) -> &'static str {
        self.catalog.definition(kind).message
    }

    fn lock_slot(&self, id: ChannelId) -> MutexGuard<'_, Option<ChannelAlertState>> {
        self.slots[id.index()].lock().expect("alert slot lock poisoned")
    }

    fn state<'a>(
        slot: &'a mut MutexGuard<'_, Option<ChannelAlertState>>,
        id: ChannelId,
    ) -> &'a mut ChannelAlertState {
        match slot.as_mut() {
            Some(state) => state,
            None => panic!("alert engine: channel {id} not registered"),
        }
    }

    /// Insert or reposition `kind` in the active list
    ///
    /// The list is sorted by descending priority; among equal priorities the
    /// earlier posting stays earlier. The insertion index is the first
    /// element with priority <= the new alert's priority. An already-active
    /// alert can only move earlier, never later.
    ///
    /// Returns whether the active list changed.
    fn insert_into_active(&self, state: &mut ChannelAlertState, kind: AlertKind) -> bool {
        let priority = self.catalog.priority(kind);
        let current = state.active.iter().position(|k| *k == kind);

        let mut insert_at = state.active.len();
        for (idx, other) in state.active.iter().enumerate() {
            if self.catalog.priority(*other) <= priority {
                insert_at = idx;
                break;
            }
        }

        match current {
            Some(pos) if insert_at == pos => false,
            Some(pos) => {
                debug_assert!(insert_at < pos, "an active alert can only move earlier");
                state.active.remove(pos);
                state.active.insert(insert_at, kind);
                true
            }
            None => {
                state.active.insert(insert_at, kind);
                true
            }
        }
    }

    /// Recompute the cached action and notify observers
    ///
    /// A display refresh is emitted whenever the composition changed; the
    /// action-changed event fires only when the action value differs from
    /// the cached one.
    fn refresh(&self, id: ChannelId, state: &mut ChannelAlertState) {
        let action = state
            .active
            .first()
            .map(|&kind| self.catalog.definition(kind).action)
            .unwrap_or(AlertAction::Nothing);

        self.bus.emit(MonitorEvent::RefreshAlertDisplay(id));
        if action != state.action {
            state.action = action;
            self.bus.emit(MonitorEvent::AlertActionChanged(id, action));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSink, Subscription};
    use std::sync::Mutex as StdMutex;

    fn engine() -> AlertEngine {
        AlertEngine::new(Arc::new(EventBus::new()))
    }

    fn ch(n: u8) -> ChannelId {
        ChannelId::new(n).unwrap()
    }

    fn registered(n: u8) -> (AlertEngine, ChannelId) {
        let engine = engine();
        let id = ch(n);
        engine.register(id);
        (engine, id)
    }

    struct RecordingSink {
        events: StdMutex<Vec<MonitorEvent>>,
    }

    impl EventSink for RecordingSink {
        fn on_event(&self, event: &MonitorEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_priority_ordering() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::Idle); // 0
        engine.add_alert(id, AlertKind::ErrorOutOfBoundTemporal); // 70
        engine.add_alert(id, AlertKind::DacRailed); // 90
        engine.add_alert(id, AlertKind::NoSignal); // 100

        let snapshot = engine.snapshot(id);
        assert_eq!(
            snapshot.active,
            vec![
                AlertKind::NoSignal,
                AlertKind::DacRailed,
                AlertKind::ErrorOutOfBoundTemporal,
                AlertKind::Idle,
            ]
        );
    }

    #[test]
    fn test_equal_priority_preserves_posting_order() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::NoSignal);
        engine.add_alert(id, AlertKind::BadSignal);
        engine.add_alert(id, AlertKind::OverExposed);

        let snapshot = engine.snapshot(id);
        assert_eq!(
            snapshot.active,
            vec![
                AlertKind::NoSignal,
                AlertKind::BadSignal,
                AlertKind::OverExposed,
            ]
        );
    }

    #[test]
    fn test_add_is_idempotent() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::DacRailed);
        let once = engine.snapshot(id);
        engine.add_alert(id, AlertKind::DacRailed);
        let twice = engine.snapshot(id);

        assert_eq!(once.active, twice.active);
        assert_eq!(once.total, twice.total);
        assert_eq!(twice.total.iter().filter(|&&k| k == AlertKind::DacRailed).count(), 1);
    }

    #[test]
    fn test_supersede_hides_and_restores() {
        // Lasting (80) supersedes Temporal (70)
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::ErrorOutOfBoundTemporal);
        assert_eq!(engine.snapshot(id).active, vec![AlertKind::ErrorOutOfBoundTemporal]);

        engine.add_alert(id, AlertKind::ErrorOutOfBoundLasting);
        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::ErrorOutOfBoundLasting]);
        assert!(snapshot.total.contains(&AlertKind::ErrorOutOfBoundTemporal));

        engine.clear_alert(id, AlertKind::ErrorOutOfBoundLasting);
        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::ErrorOutOfBoundTemporal]);
    }

    #[test]
    fn test_new_alert_superseded_by_existing_stays_hidden() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::Monitoring);
        engine.add_alert(id, AlertKind::QueuedForMonitoring);

        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::Monitoring]);
        assert!(snapshot.total.contains(&AlertKind::QueuedForMonitoring));

        // Clearing the superseder restores the hidden alert
        engine.clear_alert(id, AlertKind::Monitoring);
        assert_eq!(engine.snapshot(id).active, vec![AlertKind::QueuedForMonitoring]);
    }

    #[test]
    fn test_no_restore_while_still_superseded_elsewhere() {
        // Both Monitoring and PidEngaged supersede QueuedForMonitoring
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::QueuedForMonitoring);
        engine.add_alert(id, AlertKind::PidEngaged);
        engine.add_alert(id, AlertKind::Monitoring);

        // Clearing Monitoring must not restore Queued: PidEngaged still
        // hides it
        engine.clear_alert(id, AlertKind::Monitoring);
        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::PidEngaged]);
        assert!(snapshot.total.contains(&AlertKind::QueuedForMonitoring));

        engine.clear_alert(id, AlertKind::PidEngaged);
        assert_eq!(engine.snapshot(id).active, vec![AlertKind::QueuedForMonitoring]);
    }

    #[test]
    fn test_cleared_alert_not_restored() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::ErrorOutOfBoundTemporal);
        engine.add_alert(id, AlertKind::ErrorOutOfBoundLasting);

        // Independently cleared while hidden
        engine.clear_alert(id, AlertKind::ErrorOutOfBoundTemporal);
        engine.clear_alert(id, AlertKind::ErrorOutOfBoundLasting);

        assert!(engine.snapshot(id).active.is_empty());
        assert!(engine.snapshot(id).total.is_empty());
    }

    #[test]
    fn test_dismiss_and_reactivate() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::DacRailed);
        engine.add_alert(id, AlertKind::NoSignal);

        engine.dismiss_alert(id, AlertKind::NoSignal);
        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::DacRailed]);
        assert_eq!(snapshot.dismissed, vec![AlertKind::NoSignal]);

        engine.add_alert(id, AlertKind::NoSignal);
        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::NoSignal, AlertKind::DacRailed]);
        assert!(snapshot.dismissed.is_empty());
    }

    #[test]
    fn test_dismiss_not_active_is_noop() {
        let (engine, id) = registered(1);
        engine.dismiss_alert(id, AlertKind::NoSignal);
        assert!(engine.snapshot(id).dismissed.is_empty());
    }

    #[test]
    fn test_clear_dismissed_only_touches_dismissed() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::DacRailed);
        engine.add_alert(id, AlertKind::NoSignal);
        engine.dismiss_alert(id, AlertKind::DacRailed);

        engine.clear_dismissed_alerts(id);
        let snapshot = engine.snapshot(id);
        assert!(snapshot.dismissed.is_empty());
        assert_eq!(snapshot.active, vec![AlertKind::NoSignal]);
    }

    #[test]
    fn test_action_follows_top_alert() {
        let (engine, id) = registered(1);
        assert_eq!(engine.current_action(id), AlertAction::Nothing);

        engine.add_alert(id, AlertKind::ErrorOutOfBoundTemporal);
        assert_eq!(engine.current_action(id), AlertAction::FlashWarning);

        engine.add_alert(id, AlertKind::NoSignal);
        assert_eq!(engine.current_action(id), AlertAction::FlashError);

        engine.clear_alert(id, AlertKind::NoSignal);
        assert_eq!(engine.current_action(id), AlertAction::FlashWarning);
    }

    #[test]
    fn test_action_changed_emitted_only_on_value_change() {
        let bus = Arc::new(EventBus::new());
        let sink = Arc::new(RecordingSink {
            events: StdMutex::new(Vec::new()),
        });
        bus.subscribe(sink.clone(), Subscription::default());
        let engine = AlertEngine::new(bus);
        let id = ch(2);
        engine.register(id);

        engine.add_alert(id, AlertKind::NoSignal); // Nothing -> FlashError
        engine.add_alert(id, AlertKind::BadSignal); // still FlashError

        let events = sink.events.lock().unwrap();
        let refreshes = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::RefreshAlertDisplay(_)))
            .count();
        let action_changes = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::AlertActionChanged(_, _)))
            .count();
        assert_eq!(refreshes, 2);
        assert_eq!(action_changes, 1);
    }

    #[test]
    fn test_channels_are_independent() {
        let engine = engine();
        let a = ch(1);
        let b = ch(2);
        engine.register(a);
        engine.register(b);

        engine.add_alert(a, AlertKind::NoSignal);
        assert!(engine.snapshot(b).active.is_empty());
        assert_eq!(engine.snapshot(a).active, vec![AlertKind::NoSignal]);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_unregistered_channel_panics() {
        let engine = engine();
        engine.add_alert(ch(5), AlertKind::Idle);
    }

    #[test]
    fn test_unregister_drops_state() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::NoSignal);
        engine.unregister(id);
        assert!(!engine.is_registered(id));
        engine.register(id);
        assert!(engine.snapshot(id).total.is_empty());
    }

    #[test]
    fn test_superseded_never_active_invariant() {
        let (engine, id) = registered(1);
        engine.add_alert(id, AlertKind::QueuedForMonitoring);
        engine.add_alert(id, AlertKind::PidEngaged);
        engine.add_alert(id, AlertKind::Monitoring);
        engine.add_alert(id, AlertKind::NoSignal);

        let snapshot = engine.snapshot(id);
        assert!(!snapshot.active.contains(&AlertKind::QueuedForMonitoring));
        assert!(!snapshot.active.contains(&AlertKind::PidEngaged));

        // active stays sorted by non-increasing priority
        let priorities: Vec<u32> = snapshot
            .active
            .iter()
            .map(|&k| engine.catalog().priority(k))
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }
}
