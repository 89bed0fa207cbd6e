//! Monitor event delivery
//!
//! Consumers (a dashboard, the CLI) register sinks on the [`EventBus`] and
//! receive typed events. Delivery is synchronous on the emitting thread, so
//! events for one channel arrive in the order they were produced. Sinks must
//! not call back into the alert engine from inside `on_event`; they should
//! re-read the published state afterwards instead.

use crate::alerts::AlertAction;
use crate::domain::ChannelId;
use std::sync::{Arc, RwLock};

/// Events observable by consumers
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The poll task has been started
    Started,
    /// A stop has been requested; the poll task will exit shortly
    StopRequested,
    /// The poll task has exited and lifecycle alerts were cleaned up
    Stopped,
    /// The poll task died from a device command error and needs a restart
    Faulted(String),
    /// The poll task is about to service this channel
    MonitoringChannel(ChannelId),
    /// A new frequency sample was recorded for this channel
    FrequencyChanged(ChannelId),
    /// A new interferometer pattern was recorded for this channel
    PatternChanged(ChannelId),
    /// A new wide interferometer pattern was recorded for this channel
    WidePatternChanged(ChannelId),
    /// The PID produced a new DAC output for this channel
    PidChanged(ChannelId),
    /// The channel's alert composition changed; re-read the alert snapshot
    RefreshAlertDisplay(ChannelId),
    /// The channel's highest-priority display action changed
    AlertActionChanged(ChannelId, AlertAction),
}

/// Receiver of monitor events
pub trait EventSink: Send + Sync {
    /// Handle one event. Called synchronously from the emitting thread.
    fn on_event(&self, event: &MonitorEvent);

    /// Sink name for identification
    fn name(&self) -> &str;
}

/// What a sink wants beyond the always-delivered events
///
/// Pattern reads are comparatively expensive device I/O; the poll task skips
/// them entirely unless some sink declares interest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subscription {
    /// Deliver interferometer pattern updates
    pub patterns: bool,
    /// Deliver wide interferometer pattern updates
    pub wide_patterns: bool,
}

struct Registration {
    sink: Arc<dyn EventSink>,
    subscription: Subscription,
}

/// Fan-out of monitor events to registered sinks
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Registration>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink with its subscription
    pub fn subscribe(&self, sink: Arc<dyn EventSink>, subscription: Subscription) {
        self.sinks
            .write()
            .expect("event bus lock poisoned")
            .push(Registration { sink, subscription });
    }

    /// Deliver an event to every sink
    pub fn emit(&self, event: MonitorEvent) {
        let sinks = self.sinks.read().expect("event bus lock poisoned");
        for registration in sinks.iter() {
            registration.sink.on_event(&event);
        }
    }

    /// Whether any sink subscribed to pattern updates
    pub fn wants_patterns(&self) -> bool {
        self.sinks
            .read()
            .expect("event bus lock poisoned")
            .iter()
            .any(|r| r.subscription.patterns)
    }

    /// Whether any sink subscribed to wide pattern updates
    pub fn wants_wide_patterns(&self) -> bool {
        self.sinks
            .read()
            .expect("event bus lock poisoned")
            .iter()
            .any(|r| r.subscription.wide_patterns)
    }

    /// Number of registered sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.read().expect("event bus lock poisoned").len()
    }
}

/// Sink that forwards events to the log, used by the CLI monitor command
pub struct LogSink;

impl EventSink for LogSink {
    fn on_event(&self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Started => log::info!("monitoring started"),
            MonitorEvent::StopRequested => log::info!("monitoring stop requested"),
            MonitorEvent::Stopped => log::info!("monitoring stopped"),
            MonitorEvent::Faulted(reason) => log::error!("poll task faulted: {}", reason),
            MonitorEvent::MonitoringChannel(id) => log::debug!("monitoring channel {}", id),
            MonitorEvent::FrequencyChanged(id) => log::trace!("channel {} frequency updated", id),
            MonitorEvent::PatternChanged(id) => log::trace!("channel {} pattern updated", id),
            MonitorEvent::WidePatternChanged(id) => {
                log::trace!("channel {} wide pattern updated", id)
            }
            MonitorEvent::PidChanged(id) => log::trace!("channel {} pid output updated", id),
            MonitorEvent::RefreshAlertDisplay(id) => {
                log::debug!("channel {} alert display refresh", id)
            }
            MonitorEvent::AlertActionChanged(id, action) => {
                log::info!("channel {} alert action changed: {}", id, action)
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<MonitorEvent>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
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
    fn test_emit_reaches_all_sinks() {
        let bus = EventBus::new();
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        bus.subscribe(a.clone(), Subscription::default());
        bus.subscribe(b.clone(), Subscription::default());

        bus.emit(MonitorEvent::Started);

        assert_eq!(a.events.lock().unwrap().len(), 1);
        assert_eq!(b.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_pattern_interest() {
        let bus = EventBus::new();
        assert!(!bus.wants_patterns());
        assert!(!bus.wants_wide_patterns());

        bus.subscribe(
            Arc::new(RecordingSink::new()),
            Subscription {
                patterns: true,
                wide_patterns: false,
            },
        );
        assert!(bus.wants_patterns());
        assert!(!bus.wants_wide_patterns());
    }

    #[test]
    fn test_event_order_preserved() {
        let bus = EventBus::new();
        let sink = Arc::new(RecordingSink::new());
        bus.subscribe(sink.clone(), Subscription::default());

        let id = crate::domain::ChannelId::new(4).unwrap();
        bus.emit(MonitorEvent::MonitoringChannel(id));
        bus.emit(MonitorEvent::FrequencyChanged(id));
        bus.emit(MonitorEvent::PidChanged(id));

        let events = sink.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                MonitorEvent::MonitoringChannel(id),
                MonitorEvent::FrequencyChanged(id),
                MonitorEvent::PidChanged(id),
            ]
        );
    }
}
