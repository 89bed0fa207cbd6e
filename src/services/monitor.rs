//! Channel monitoring control loop
//!
//! One background poll task walks the enabled channels in registration
//! order: switch, settle, acquire, track deviation, feed the PID. Device
//! signal errors become alerts and the loop continues; device command errors
//! kill the task and surface as a `Faulted` event.
//!
//! At most one poll task runs at a time. `stop_monitoring` blocks until the
//! task has exited and posted Idle for every previously enabled channel.

use crate::alerts::{AlertEngine, AlertKind};
use crate::domain::{Channel, ChannelConfig, ChannelId, ChannelRuntime, Frequency};
use crate::error::{AppError, DomainError, Result, WavemeterError};
use crate::events::{EventBus, MonitorEvent};
use crate::hardware::{Dac, FiberSwitch, Wavemeter};
use crate::services::pid::{self, PidOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Timing and retention knobs of the poll loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Wait after commanding the fiber switch
    pub switch_settle: Duration,
    /// Wait when revisiting the channel already selected
    pub same_channel_delay: Duration,
    /// Fast acquisition retries before the final attempt
    pub retry_attempts: u32,
    /// Wait between acquisition retries
    pub retry_backoff: Duration,
    /// Out-of-bound time before the deviation warning posts
    pub deviate_warning_after: Duration,
    /// Out-of-bound time before the out-of-lock alert posts
    pub out_of_lock_after: Duration,
    /// In-bound time before the locked alert posts
    pub locked_after: Duration,
    /// Wait for the instrument's auto-exposure to converge
    pub auto_expo_settle: Duration,
    /// Samples kept per channel history series; None keeps everything
    pub longterm_limit: Option<usize>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            switch_settle: Duration::from_millis(200),
            same_channel_delay: Duration::from_millis(50),
            retry_attempts: 5,
            retry_backoff: Duration::from_millis(50),
            deviate_warning_after: Duration::from_secs(5),
            out_of_lock_after: Duration::from_secs(10),
            locked_after: Duration::from_secs(10),
            auto_expo_settle: Duration::from_secs(1),
            longterm_limit: None,
        }
    }
}

struct Devices<W, S, D> {
    wavemeter: W,
    switch: S,
    dac: D,
}

struct Shared<W, S, D> {
    channels: Mutex<Vec<Arc<Channel>>>,
    engine: Arc<AlertEngine>,
    bus: Arc<EventBus>,
    config: MonitorConfig,
    running: Mutex<bool>,
    running_cv: Condvar,
    stop_requested: AtomicBool,
    // None exactly while the poll task owns the devices
    devices: Mutex<Option<Devices<W, S, D>>>,
}

/// Control loop coordinating the fiber switch, wavemeter and DAC
pub struct Monitor<W, S, D> {
    shared: Arc<Shared<W, S, D>>,
}

const WAVEMETER_ALERTS: [AlertKind; 5] = [
    AlertKind::NoSignal,
    AlertKind::BadSignal,
    AlertKind::UnderExposed,
    AlertKind::OverExposed,
    AlertKind::UnknownWavemeterError,
];

impl<W, S, D> Monitor<W, S, D>
where
    W: Wavemeter + 'static,
    S: FiberSwitch + 'static,
    D: Dac + 'static,
{
    /// Wrap the three devices into a monitor
    pub fn new(
        wavemeter: W,
        switch: S,
        dac: D,
        engine: Arc<AlertEngine>,
        bus: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: Mutex::new(Vec::new()),
                engine,
                bus,
                config,
                running: Mutex::new(false),
                running_cv: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                devices: Mutex::new(Some(Devices {
                    wavemeter,
                    switch,
                    dac,
                })),
            }),
        }
    }

    /// Register a channel. Idempotent: an existing registration is returned
    /// unchanged.
    pub fn add_channel(&self, config: ChannelConfig) -> Result<Arc<Channel>> {
        config.validate()?;
        let mut channels = self.lock_channels();
        if let Some(existing) = channels.iter().find(|c| c.id() == config.channel) {
            return Ok(Arc::clone(existing));
        }
        let id = config.channel;
        let channel = Arc::new(Channel::with_history_limit(
            config,
            self.shared.config.longterm_limit,
        ));
        self.shared.engine.register(id);
        self.shared.engine.add_alert(id, AlertKind::Idle);
        channels.push(Arc::clone(&channel));
        log::info!("channel {} registered", id);
        Ok(channel)
    }

    /// Unregister a channel. Stops the poll loop first when the channel was
    /// being monitored; the caller restarts monitoring if wanted.
    pub fn remove_channel(&self, id: ChannelId) -> Result<()> {
        let monitored = {
            let channels = self.lock_channels();
            let channel = channels
                .iter()
                .find(|c| c.id() == id)
                .ok_or(AppError::ChannelNotRegistered(id.get()))?;
            channel.monitor_enabled()
        };
        if monitored && self.is_monitoring() {
            log::info!("channel {} is monitored, stopping the loop first", id);
            self.stop_monitoring();
        }
        self.lock_channels().retain(|c| c.id() != id);
        self.shared.engine.unregister(id);
        log::info!("channel {} removed", id);
        Ok(())
    }

    /// Toggle a channel's participation in the poll cycle
    ///
    /// While the poll task runs, enabling a channel queues it into the
    /// cycle and disabling returns it to idle.
    pub fn set_channel_enabled(&self, id: ChannelId, enabled: bool) -> Result<()> {
        let channel = self
            .channel(id)
            .ok_or(AppError::ChannelNotRegistered(id.get()))?;
        channel.set_monitor_enabled(enabled);
        if !self.is_monitoring() {
            return Ok(());
        }
        let engine = &self.shared.engine;
        if enabled {
            if engine.is_posted(id, AlertKind::Idle) {
                engine.clear_alert(id, AlertKind::Idle);
            }
            engine.add_alert(id, AlertKind::QueuedForMonitoring);
            if pid_active(&channel.config()) {
                engine.add_alert(id, AlertKind::PidEngaged);
            }
            channel.with_runtime(ChannelRuntime::reset_pid_state);
        } else {
            for kind in [
                AlertKind::Monitoring,
                AlertKind::QueuedForMonitoring,
                AlertKind::PidEngaged,
                AlertKind::PidLocked,
            ] {
                if engine.is_posted(id, kind) {
                    engine.clear_alert(id, kind);
                }
            }
            engine.add_alert(id, AlertKind::Idle);
        }
        Ok(())
    }

    /// Registered channels in registration order
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.lock_channels().clone()
    }

    /// Look up one registered channel
    pub fn channel(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.lock_channels().iter().find(|c| c.id() == id).cloned()
    }

    /// Whether the poll task is running
    pub fn is_monitoring(&self) -> bool {
        *self.shared.running.lock().expect("running lock poisoned")
    }

    /// Spawn the poll task. No-op when already running.
    pub fn start_monitoring(&self) -> Result<()> {
        let mut running = self.shared.running.lock().expect("running lock poisoned");
        if *running {
            log::debug!("start_monitoring ignored, already running");
            return Ok(());
        }
        let devices = self
            .shared
            .devices
            .lock()
            .expect("devices lock poisoned")
            .take()
            .ok_or_else(|| {
                AppError::Domain(DomainError::InvalidValue(
                    "devices unavailable while not running".into(),
                ))
            })?;
        *running = true;
        self.shared.stop_requested.store(false, Ordering::Release);
        drop(running);

        self.shared.bus.emit(MonitorEvent::Started);
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("wavectl-poll".into())
            .spawn(move || run_poll_task(shared, devices))?;
        Ok(())
    }

    /// Request a stop and block until the poll task has exited
    ///
    /// No timeout: the task checks the stop flag between channels, so the
    /// wait is bounded by one channel update. No-op when not running.
    pub fn stop_monitoring(&self) {
        let mut running = self.shared.running.lock().expect("running lock poisoned");
        if !*running {
            return;
        }
        self.shared.bus.emit(MonitorEvent::StopRequested);
        self.shared.stop_requested.store(true, Ordering::Release);
        while *running {
            running = self
                .shared
                .running_cv
                .wait(running)
                .expect("running lock poisoned");
        }
    }

    /// One-shot auto-exposure measurement for a channel
    ///
    /// Switches to the channel, lets the instrument's automatic exposure
    /// converge, reads the result back and disables automatic exposure
    /// again. Only valid while the poll task is stopped.
    pub fn get_auto_expo_params(&self, id: ChannelId) -> Result<(u32, u32)> {
        let mut guard = self.shared.devices.lock().expect("devices lock poisoned");
        let devices = guard.as_mut().ok_or_else(|| {
            AppError::Domain(DomainError::InvalidValue(
                "auto exposure requires the monitor to be stopped".into(),
            ))
        })?;
        devices.switch.switch_channel(id)?;
        thread::sleep(self.shared.config.switch_settle);
        devices.wavemeter.set_auto_exposure(true)?;
        thread::sleep(self.shared.config.auto_expo_settle);
        let exposure = devices.wavemeter.exposure()?;
        devices.wavemeter.set_auto_exposure(false)?;
        Ok(exposure)
    }

    /// Reset a channel's DAC output to midscale
    pub fn reset_channel_dac(&self, id: ChannelId) -> Result<()> {
        let channel = self
            .channel(id)
            .ok_or(AppError::ChannelNotRegistered(id.get()))?;
        let dac_channel = channel.config().dac_channel.ok_or_else(|| {
            AppError::Domain(DomainError::InvalidValue(format!(
                "channel {id} has no dac_channel assigned"
            )))
        })?;
        let mut guard = self.shared.devices.lock().expect("devices lock poisoned");
        let devices = guard.as_mut().ok_or_else(|| {
            AppError::Domain(DomainError::InvalidValue(
                "dac reset requires the monitor to be stopped".into(),
            ))
        })?;
        devices.dac.reset_dac(dac_channel)?;
        channel.with_runtime(|rt| {
            rt.dac_railed = false;
            rt.pid_i = 0.0;
        });
        if self.shared.engine.is_posted(id, AlertKind::DacRailed) {
            self.shared.engine.clear_alert(id, AlertKind::DacRailed);
        }
        Ok(())
    }

    fn lock_channels(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Channel>>> {
        self.shared.channels.lock().expect("channel registry lock poisoned")
    }
}

fn pid_active(config: &ChannelConfig) -> bool {
    config.pid.enabled && config.dac_channel.is_some() && config.pid.setpoint.is_some()
}

fn run_poll_task<W: Wavemeter, S: FiberSwitch, D: Dac>(
    shared: Arc<Shared<W, S, D>>,
    mut devices: Devices<W, S, D>,
) {
    let fault = poll_task(&shared, &mut devices).err();

    // Lifecycle cleanup for every channel that was part of the run
    let channels: Vec<Arc<Channel>> = shared
        .channels
        .lock()
        .expect("channel registry lock poisoned")
        .clone();
    for channel in channels.iter().filter(|c| c.monitor_enabled()) {
        let id = channel.id();
        for kind in [
            AlertKind::Monitoring,
            AlertKind::QueuedForMonitoring,
            AlertKind::PidEngaged,
            AlertKind::PidLocked,
        ] {
            if shared.engine.is_posted(id, kind) {
                shared.engine.clear_alert(id, kind);
            }
        }
        shared.engine.clear_dismissed_alerts(id);
        shared.engine.add_alert(id, AlertKind::Idle);
    }

    match fault {
        Some(reason) => {
            log::error!("poll task faulted: {}", reason);
            shared.bus.emit(MonitorEvent::Faulted(reason));
        }
        None => shared.bus.emit(MonitorEvent::Stopped),
    }

    *shared.devices.lock().expect("devices lock poisoned") = Some(devices);
    let mut running = shared.running.lock().expect("running lock poisoned");
    *running = false;
    shared.running_cv.notify_all();
}

fn poll_task<W: Wavemeter, S: FiberSwitch, D: Dac>(
    shared: &Shared<W, S, D>,
    devices: &mut Devices<W, S, D>,
) -> std::result::Result<(), String> {
    let channels: Vec<Arc<Channel>> = shared
        .channels
        .lock()
        .expect("channel registry lock poisoned")
        .clone();

    // Setup: lifecycle alerts and fresh feedback state for the run
    for channel in channels.iter().filter(|c| c.monitor_enabled()) {
        let id = channel.id();
        if shared.engine.is_posted(id, AlertKind::Idle) {
            shared.engine.clear_alert(id, AlertKind::Idle);
        }
        shared.engine.add_alert(id, AlertKind::QueuedForMonitoring);
        if pid_active(&channel.config()) {
            shared.engine.add_alert(id, AlertKind::PidEngaged);
        }
        channel.with_runtime(ChannelRuntime::reset_pid_state);
        for kind in [
            AlertKind::ErrorOutOfBoundTemporal,
            AlertKind::ErrorOutOfBoundLasting,
        ] {
            if shared.engine.is_posted(id, kind) {
                shared.engine.clear_alert(id, kind);
            }
        }
    }

    // Exposure is managed explicitly per channel
    devices
        .wavemeter
        .set_auto_exposure(false)
        .map_err(|e| format!("disabling auto exposure: {e}"))?;

    let mut last: Option<ChannelId> = None;
    while !shared.stop_requested.load(Ordering::Acquire) {
        let channels: Vec<Arc<Channel>> = shared
            .channels
            .lock()
            .expect("channel registry lock poisoned")
            .clone();
        let mut serviced = false;
        for channel in &channels {
            if shared.stop_requested.load(Ordering::Acquire) {
                break;
            }
            if !channel.monitor_enabled() {
                continue;
            }
            serviced = true;
            let id = channel.id();
            shared.bus.emit(MonitorEvent::MonitoringChannel(id));
            shared.engine.add_alert(id, AlertKind::Monitoring);
            let result = service_channel(shared, devices, channel, &mut last);
            shared.engine.clear_alert(id, AlertKind::Monitoring);
            result?;
        }
        if !serviced {
            thread::sleep(shared.config.same_channel_delay);
        }
    }
    Ok(())
}

/// One full update of a single channel
fn service_channel<W: Wavemeter, S: FiberSwitch, D: Dac>(
    shared: &Shared<W, S, D>,
    devices: &mut Devices<W, S, D>,
    channel: &Arc<Channel>,
    last: &mut Option<ChannelId>,
) -> std::result::Result<(), String> {
    let id = channel.id();
    let config = channel.config();

    if *last != Some(id) {
        devices
            .switch
            .switch_channel(id)
            .map_err(|e| format!("switching to channel {id}: {e}"))?;
        *last = Some(id);
        thread::sleep(shared.config.switch_settle);
        if let Some(expo) = config.expo_time {
            let expo2 = config.expo2_time.unwrap_or(expo);
            devices
                .wavemeter
                .set_exposure(expo, expo2)
                .map_err(|e| format!("setting exposure on channel {id}: {e}"))?;
        }
    } else {
        thread::sleep(shared.config.same_channel_delay);
    }

    let frequency = match acquire(&shared.config, &mut devices.wavemeter) {
        Ok(frequency) => frequency,
        Err(error) if error.is_signal_error() => {
            let kind = classify_signal_error(&error);
            log::warn!("channel {}: {} after retries", id, error);
            if config.alerts.wavemeter && !shared.engine.is_posted(id, kind) {
                shared.engine.add_alert(id, kind);
            }
            // No PID step on a failed acquisition
            return Ok(());
        }
        Err(error) => return Err(format!("acquisition on channel {id}: {error}")),
    };

    for kind in WAVEMETER_ALERTS {
        if shared.engine.is_posted(id, kind) {
            shared.engine.clear_alert(id, kind);
        }
    }

    let now = Instant::now();
    channel.with_runtime(|rt| {
        rt.frequency = Some(frequency);
        rt.freq_longterm.append(frequency.as_hz());
        track_deviation(&shared.engine, id, rt, &config, &shared.config, now);
    });
    shared.bus.emit(MonitorEvent::FrequencyChanged(id));

    deliver_patterns(shared, devices, channel)?;

    if pid_active(&config) {
        run_pid_step(shared, devices, channel, &config, now)?;
    }
    Ok(())
}

/// Bounded-retry frequency acquisition
///
/// A handful of fast retries absorbs a wavemeter servo that has not settled
/// after the switch; one final attempt follows the last backoff.
fn acquire<W: Wavemeter>(
    config: &MonitorConfig,
    wavemeter: &mut W,
) -> std::result::Result<Frequency, WavemeterError> {
    for _ in 0..config.retry_attempts {
        match wavemeter.frequency() {
            Ok(frequency) => return Ok(frequency),
            Err(error) if error.is_signal_error() => thread::sleep(config.retry_backoff),
            Err(error) => return Err(error),
        }
    }
    wavemeter.frequency()
}

fn classify_signal_error(error: &WavemeterError) -> AlertKind {
    match error {
        WavemeterError::NoSignal => AlertKind::NoSignal,
        WavemeterError::BadSignal => AlertKind::BadSignal,
        WavemeterError::LowSignal => AlertKind::UnderExposed,
        WavemeterError::HighSignal => AlertKind::OverExposed,
        _ => AlertKind::UnknownWavemeterError,
    }
}

/// Deviation and lock debouncing
///
/// Runs on every successful acquisition with the runtime lock held; posts
/// and clears the out-of-bound and locked alerts based on how long the
/// error has stayed on one side of the bound.
fn track_deviation(
    engine: &AlertEngine,
    id: ChannelId,
    runtime: &mut ChannelRuntime,
    config: &ChannelConfig,
    timing: &MonitorConfig,
    now: Instant,
) {
    let (Some(setpoint), Some(max_error)) = (config.pid.setpoint, config.pid.max_error) else {
        return;
    };
    let Some(frequency) = runtime.frequency else {
        return;
    };
    let error = frequency.error_to(setpoint);
    runtime.error = error;

    if error.abs() > max_error {
        runtime.stable_since = None;
        let since = *runtime.deviate_since.get_or_insert(now);
        let elapsed = now.saturating_duration_since(since);
        if !config.alerts.out_of_bound {
            return;
        }
        if elapsed >= timing.out_of_lock_after {
            if !engine.is_posted(id, AlertKind::ErrorOutOfBoundLasting) {
                engine.add_alert(id, AlertKind::ErrorOutOfBoundLasting);
            }
        } else if elapsed >= timing.deviate_warning_after {
            if pid_active(config) && engine.is_posted(id, AlertKind::PidLocked) {
                engine.clear_alert(id, AlertKind::PidLocked);
            }
            if !engine.is_posted(id, AlertKind::ErrorOutOfBoundTemporal) {
                engine.add_alert(id, AlertKind::ErrorOutOfBoundTemporal);
            }
        }
    } else {
        runtime.deviate_since = None;
        match runtime.stable_since {
            None => {
                runtime.stable_since = Some(now);
                for kind in [
                    AlertKind::ErrorOutOfBoundTemporal,
                    AlertKind::ErrorOutOfBoundLasting,
                ] {
                    if engine.is_posted(id, kind) {
                        engine.clear_alert(id, kind);
                    }
                }
            }
            Some(since) => {
                if now.saturating_duration_since(since) >= timing.locked_after
                    && pid_active(config)
                    && !engine.is_posted(id, AlertKind::PidLocked)
                {
                    engine.add_alert(id, AlertKind::PidLocked);
                }
            }
        }
    }
}

/// Pattern reads only happen when a consumer subscribed; they are expensive
/// device I/O compared to the rest of the update.
fn deliver_patterns<W: Wavemeter, S: FiberSwitch, D: Dac>(
    shared: &Shared<W, S, D>,
    devices: &mut Devices<W, S, D>,
    channel: &Arc<Channel>,
) -> std::result::Result<(), String> {
    let id = channel.id();
    if shared.bus.wants_patterns() {
        let pattern = devices
            .wavemeter
            .next_pattern(false)
            .map_err(|e| format!("pattern read on channel {id}: {e}"))?;
        if let Some(pattern) = pattern {
            channel.with_runtime(|rt| rt.pattern = Some(pattern));
            shared.bus.emit(MonitorEvent::PatternChanged(id));
        }
    }
    if shared.bus.wants_wide_patterns() {
        let pattern = devices
            .wavemeter
            .next_pattern(true)
            .map_err(|e| format!("wide pattern read on channel {id}: {e}"))?;
        if let Some(pattern) = pattern {
            channel.with_runtime(|rt| rt.wide_pattern = Some(pattern));
            shared.bus.emit(MonitorEvent::WidePatternChanged(id));
        }
    }
    Ok(())
}

fn run_pid_step<W: Wavemeter, S: FiberSwitch, D: Dac>(
    shared: &Shared<W, S, D>,
    devices: &mut Devices<W, S, D>,
    channel: &Arc<Channel>,
    config: &ChannelConfig,
    now: Instant,
) -> std::result::Result<(), String> {
    let id = channel.id();
    let Some(dac_channel) = config.dac_channel else {
        return Ok(());
    };
    // Snapshot, step without the lock (the step talks to the DAC), commit
    let mut state = channel.with_runtime(|rt| pid::PidState::capture(rt));
    let outcome = pid::step(&mut state, &config.pid, &mut devices.dac, dac_channel, now);
    channel.with_runtime(|rt| {
        state.write_back(rt, &outcome);
        if !matches!(outcome, PidOutcome::Failed(_)) {
            rt.dac_longterm.append(rt.dac_output);
        }
    });
    apply_pid_outcome(&shared.engine, id, &config.alerts, &outcome);
    if !matches!(outcome, PidOutcome::Failed(_)) {
        shared.bus.emit(MonitorEvent::PidChanged(id));
    }
    Ok(())
}

/// Translate a feedback step outcome into alert state
///
/// DAC failures stay channel-local: the step is skipped, an alert posts,
/// the loop continues.
fn apply_pid_outcome(
    engine: &AlertEngine,
    id: ChannelId,
    alerts: &crate::domain::AlertFlags,
    outcome: &PidOutcome,
) {
    match outcome {
        PidOutcome::Updated { .. } => {
            for kind in [AlertKind::DacRailed, AlertKind::DacUnknownError] {
                if engine.is_posted(id, kind) {
                    engine.clear_alert(id, kind);
                }
            }
        }
        PidOutcome::Railed { .. } => {
            if alerts.dac_railed && !engine.is_posted(id, AlertKind::DacRailed) {
                engine.add_alert(id, AlertKind::DacRailed);
            }
        }
        PidOutcome::Failed(error) => {
            log::warn!("channel {}: dac command failed: {}", id, error);
            if !engine.is_posted(id, AlertKind::DacUnknownError) {
                engine.add_alert(id, AlertKind::DacUnknownError);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PidConfig;
    use crate::error::DacError;
    use crate::events::{EventSink, Subscription};
    use crate::mock::{MockDac, MockFiberSwitch, MockWavemeter};
    use std::sync::Mutex as StdMutex;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            switch_settle: Duration::from_millis(1),
            same_channel_delay: Duration::from_millis(1),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(1),
            auto_expo_settle: Duration::from_millis(1),
            ..MonitorConfig::default()
        }
    }

    fn ch(n: u8) -> ChannelId {
        ChannelId::new(n).unwrap()
    }

    fn locked_channel_config(id: ChannelId) -> ChannelConfig {
        let mut config = ChannelConfig::new(id);
        config.dac_channel = Some(id.get());
        config.pid = PidConfig {
            enabled: true,
            setpoint: Some(Frequency::from_hz(100e12)),
            max_error: Some(1e6),
            kp: 0.0,
            ki: 0.0,
            integral_clamp: None,
        };
        config
    }

    fn mock_monitor() -> (
        Monitor<MockWavemeter, MockFiberSwitch, MockDac>,
        MockWavemeter,
        MockFiberSwitch,
        MockDac,
        Arc<AlertEngine>,
        Arc<EventBus>,
    ) {
        let bus = Arc::new(EventBus::new());
        let engine = Arc::new(AlertEngine::new(Arc::clone(&bus)));
        let wavemeter = MockWavemeter::with_frequency(Frequency::from_hz(100e12));
        let switch = MockFiberSwitch::new();
        let dac = MockDac::new();
        let monitor = Monitor::new(
            wavemeter.clone(),
            switch.clone(),
            dac.clone(),
            Arc::clone(&engine),
            Arc::clone(&bus),
            fast_config(),
        );
        (monitor, wavemeter, switch, dac, engine, bus)
    }

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    struct RecordingSink {
        events: StdMutex<Vec<MonitorEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: StdMutex::new(Vec::new()),
            })
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
    fn test_registration_posts_idle() {
        let (monitor, _, _, _, engine, _) = mock_monitor();
        monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        assert_eq!(engine.snapshot(ch(1)).active, vec![AlertKind::Idle]);
    }

    #[test]
    fn test_add_channel_idempotent() {
        let (monitor, _, _, _, _, _) = mock_monitor();
        let first = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        let second = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(monitor.channels().len(), 1);
    }

    #[test]
    fn test_start_stop_round_trip() {
        let (monitor, wavemeter, switch, _, engine, _) = mock_monitor();
        // Auto exposure gets switched off during setup
        let mut handle = wavemeter.clone();
        handle.set_auto_exposure(true).unwrap();

        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);

        monitor.start_monitoring().unwrap();
        assert!(monitor.is_monitoring());
        wait_until("first acquisition", || wavemeter.reads() > 0);

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
        assert!(!wavemeter.auto_exposure());
        assert!(switch.switches().contains(&1));
        // Lifecycle cleanup leaves the channel idle
        let snapshot = engine.snapshot(ch(1));
        assert!(snapshot.active.contains(&AlertKind::Idle));
        assert!(!snapshot.total.contains(&AlertKind::QueuedForMonitoring));
        assert!(!snapshot.total.contains(&AlertKind::Monitoring));
    }

    #[test]
    fn test_start_twice_is_noop() {
        let (monitor, _, _, _, _, _) = mock_monitor();
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);
        monitor.start_monitoring().unwrap();
        monitor.start_monitoring().unwrap();
        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
    }

    #[test]
    fn test_frequency_recorded_during_run() {
        let (monitor, _, _, _, _, _) = mock_monitor();
        let channel = monitor.add_channel(ChannelConfig::new(ch(2))).unwrap();
        channel.set_monitor_enabled(true);
        monitor.start_monitoring().unwrap();
        wait_until("frequency sample", || {
            channel.with_runtime(|rt| !rt.freq_longterm.is_empty())
        });
        monitor.stop_monitoring();
        let frequency = channel.with_runtime(|rt| rt.frequency);
        assert_eq!(frequency.unwrap().as_hz(), 100e12);
    }

    #[test]
    fn test_signal_error_becomes_alert_not_fault() {
        let (monitor, wavemeter, _, _, engine, _) = mock_monitor();
        wavemeter.set_default(Err(WavemeterError::NoSignal));
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);

        monitor.start_monitoring().unwrap();
        wait_until("no-signal alert", || {
            engine.is_posted(ch(1), AlertKind::NoSignal)
        });
        // Still running: signal errors never kill the task
        assert!(monitor.is_monitoring());
        monitor.stop_monitoring();
    }

    #[test]
    fn test_signal_alert_clears_on_recovery() {
        let (monitor, wavemeter, _, _, engine, _) = mock_monitor();
        wavemeter.set_default(Err(WavemeterError::NoSignal));
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);

        monitor.start_monitoring().unwrap();
        wait_until("no-signal alert", || {
            engine.is_posted(ch(1), AlertKind::NoSignal)
        });
        // Signal comes back: the alert retracts without operator action
        wavemeter.set_default(Ok(Frequency::from_hz(100e12)));
        wait_until("alert retraction", || {
            !engine.is_posted(ch(1), AlertKind::NoSignal)
        });
        monitor.stop_monitoring();
        assert!(channel.with_runtime(|rt| rt.frequency.is_some()));
    }

    #[test]
    fn test_acquisition_recovers_after_retries() {
        let (monitor, wavemeter, _, _, engine, _) = mock_monitor();
        wavemeter.script([
            Err(WavemeterError::LowSignal),
            Err(WavemeterError::LowSignal),
        ]);
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);

        monitor.start_monitoring().unwrap();
        wait_until("recovered sample", || {
            channel.with_runtime(|rt| rt.frequency.is_some())
        });
        monitor.stop_monitoring();
        assert!(!engine.is_posted(ch(1), AlertKind::UnderExposed));
    }

    #[test]
    fn test_command_error_faults_the_task() {
        let (monitor, _, switch, _, _, bus) = mock_monitor();
        let sink = RecordingSink::new();
        bus.subscribe(sink.clone(), Subscription::default());
        switch.fail_on(1);
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);

        monitor.start_monitoring().unwrap();
        wait_until("fault exit", || !monitor.is_monitoring());

        let events = sink.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, MonitorEvent::Faulted(reason) if reason.contains("channel 1"))));
        assert!(!events.iter().any(|e| matches!(e, MonitorEvent::Stopped)));
    }

    #[test]
    fn test_remove_monitored_channel_stops_loop() {
        let (monitor, _, _, _, engine, _) = mock_monitor();
        let channel = monitor.add_channel(ChannelConfig::new(ch(3))).unwrap();
        channel.set_monitor_enabled(true);
        monitor.start_monitoring().unwrap();

        monitor.remove_channel(ch(3)).unwrap();
        assert!(!monitor.is_monitoring());
        assert!(monitor.channel(ch(3)).is_none());
        assert!(!engine.is_registered(ch(3)));
    }

    #[test]
    fn test_enable_while_running_queues_channel() {
        let (monitor, _, _, _, engine, _) = mock_monitor();
        let active = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        active.set_monitor_enabled(true);
        monitor.add_channel(ChannelConfig::new(ch(2))).unwrap();
        monitor.start_monitoring().unwrap();

        monitor.set_channel_enabled(ch(2), true).unwrap();
        assert!(engine.is_posted(ch(2), AlertKind::QueuedForMonitoring));
        assert!(!engine.is_posted(ch(2), AlertKind::Idle));

        monitor.set_channel_enabled(ch(2), false).unwrap();
        assert!(engine.is_posted(ch(2), AlertKind::Idle));
        assert!(!engine.is_posted(ch(2), AlertKind::QueuedForMonitoring));

        monitor.stop_monitoring();
    }

    #[test]
    fn test_auto_expo_rejected_while_running() {
        let (monitor, _, _, _, _, _) = mock_monitor();
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.set_monitor_enabled(true);
        monitor.start_monitoring().unwrap();
        assert!(monitor.get_auto_expo_params(ch(1)).is_err());
        monitor.stop_monitoring();
        assert!(monitor.get_auto_expo_params(ch(1)).is_ok());
    }

    #[test]
    fn test_auto_expo_reads_back_exposure() {
        let (monitor, wavemeter, switch, _, _, _) = mock_monitor();
        monitor.add_channel(ChannelConfig::new(ch(4))).unwrap();
        let (expo, expo2) = monitor.get_auto_expo_params(ch(4)).unwrap();
        assert_eq!((expo, expo2), (10, 10));
        assert_eq!(switch.current(), Some(4));
        assert!(!wavemeter.auto_exposure());
    }

    // Deviation and lock tracking with synthetic time

    fn deviation_fixture() -> (Arc<AlertEngine>, ChannelId, ChannelConfig, ChannelRuntime) {
        let engine = Arc::new(AlertEngine::new(Arc::new(EventBus::new())));
        let id = ch(1);
        engine.register(id);
        let config = locked_channel_config(id);
        (engine, id, config, ChannelRuntime::default())
    }

    #[test]
    fn test_lasting_after_eleven_seconds_out_of_bound() {
        let (engine, id, config, mut runtime) = deviation_fixture();
        let timing = MonitorConfig::default();
        let t0 = Instant::now();
        runtime.frequency = Some(Frequency::from_hz(100e12 + 5e6));

        track_deviation(&engine, id, &mut runtime, &config, &timing, t0);
        assert!(engine.snapshot(id).active.is_empty());

        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t0 + Duration::from_secs(6),
        );
        assert!(engine.is_posted(id, AlertKind::ErrorOutOfBoundTemporal));

        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t0 + Duration::from_secs(11),
        );
        let snapshot = engine.snapshot(id);
        assert_eq!(snapshot.active, vec![AlertKind::ErrorOutOfBoundLasting]);

        // Back in bound: both deviation alerts clear at once
        runtime.frequency = Some(Frequency::from_hz(100e12));
        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t0 + Duration::from_secs(12),
        );
        let snapshot = engine.snapshot(id);
        assert!(snapshot.active.is_empty());
        assert!(runtime.deviate_since.is_none());
        assert!(runtime.stable_since.is_some());
    }

    #[test]
    fn test_locked_after_stable_window() {
        let (engine, id, config, mut runtime) = deviation_fixture();
        let timing = MonitorConfig::default();
        let t0 = Instant::now();
        runtime.frequency = Some(Frequency::from_hz(100e12));

        track_deviation(&engine, id, &mut runtime, &config, &timing, t0);
        assert!(!engine.is_posted(id, AlertKind::PidLocked));

        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t0 + Duration::from_secs(10),
        );
        assert!(engine.is_posted(id, AlertKind::PidLocked));
    }

    #[test]
    fn test_deviation_warning_clears_locked() {
        let (engine, id, config, mut runtime) = deviation_fixture();
        let timing = MonitorConfig::default();
        let t0 = Instant::now();

        runtime.frequency = Some(Frequency::from_hz(100e12));
        track_deviation(&engine, id, &mut runtime, &config, &timing, t0);
        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t0 + Duration::from_secs(10),
        );
        assert!(engine.is_posted(id, AlertKind::PidLocked));

        runtime.frequency = Some(Frequency::from_hz(100e12 + 5e6));
        let t1 = t0 + Duration::from_secs(11);
        track_deviation(&engine, id, &mut runtime, &config, &timing, t1);
        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t1 + Duration::from_secs(6),
        );
        assert!(!engine.is_posted(id, AlertKind::PidLocked));
        assert!(engine.is_posted(id, AlertKind::ErrorOutOfBoundTemporal));
    }

    #[test]
    fn test_out_of_bound_alerts_gated_by_flag() {
        let (engine, id, mut config, mut runtime) = deviation_fixture();
        config.alerts.out_of_bound = false;
        let timing = MonitorConfig::default();
        let t0 = Instant::now();
        runtime.frequency = Some(Frequency::from_hz(100e12 + 5e6));

        track_deviation(&engine, id, &mut runtime, &config, &timing, t0);
        track_deviation(
            &engine,
            id,
            &mut runtime,
            &config,
            &timing,
            t0 + Duration::from_secs(11),
        );
        assert!(!engine.is_posted(id, AlertKind::ErrorOutOfBoundTemporal));
        assert!(!engine.is_posted(id, AlertKind::ErrorOutOfBoundLasting));
        // Bookkeeping still runs, only the alerts are muted
        assert!(runtime.deviate_since.is_some());
    }

    #[test]
    fn test_dac_railed_posted_once() {
        let engine = Arc::new(AlertEngine::new(Arc::new(EventBus::new())));
        let id = ch(1);
        engine.register(id);
        let flags = crate::domain::AlertFlags::default();

        let railed = PidOutcome::Railed { output: 32_000.0 };
        apply_pid_outcome(&engine, id, &flags, &railed);
        apply_pid_outcome(&engine, id, &flags, &railed);

        let snapshot = engine.snapshot(id);
        let count = snapshot
            .total
            .iter()
            .filter(|&&k| k == AlertKind::DacRailed)
            .count();
        assert_eq!(count, 1);

        // A clean step clears the rail alert again
        apply_pid_outcome(&engine, id, &flags, &PidOutcome::Updated { output: 100.0 });
        assert!(!engine.is_posted(id, AlertKind::DacRailed));
    }

    #[test]
    fn test_dac_failure_posts_unknown_error() {
        let engine = Arc::new(AlertEngine::new(Arc::new(EventBus::new())));
        let id = ch(2);
        engine.register(id);
        let flags = crate::domain::AlertFlags::default();

        apply_pid_outcome(
            &engine,
            id,
            &flags,
            &PidOutcome::Failed(DacError::Protocol("garbled".into())),
        );
        assert!(engine.is_posted(id, AlertKind::DacUnknownError));
    }

    /// DAC that checks on every command whether the channel's runtime lock
    /// is free, the way an interactive reader would find it.
    #[derive(Clone, Default)]
    struct LockWatchingDac {
        target: Arc<StdMutex<Option<Arc<Channel>>>>,
        blocked: Arc<AtomicBool>,
        sets: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl LockWatchingDac {
        fn observe(&self) {
            let target = self.target.lock().unwrap().clone();
            if let Some(channel) = target {
                if channel.try_with_runtime(|_| ()).is_none() {
                    self.blocked.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    impl Dac for LockWatchingDac {
        fn get_dac_value(&mut self, _channel: u8) -> std::result::Result<f64, DacError> {
            self.observe();
            Ok(16_000.0)
        }

        fn set_dac_value(&mut self, _channel: u8, _value: f64) -> std::result::Result<(), DacError> {
            self.observe();
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn reset_dac(&mut self, _channel: u8) -> std::result::Result<(), DacError> {
            Ok(())
        }
    }

    #[test]
    fn test_runtime_lock_free_during_dac_io() {
        let bus = Arc::new(EventBus::new());
        let engine = Arc::new(AlertEngine::new(Arc::clone(&bus)));
        let wavemeter = MockWavemeter::with_frequency(Frequency::from_hz(100e12));
        let dac = LockWatchingDac::default();
        let monitor = Monitor::new(
            wavemeter,
            MockFiberSwitch::new(),
            dac.clone(),
            engine,
            bus,
            fast_config(),
        );
        let channel = monitor.add_channel(locked_channel_config(ch(1))).unwrap();
        *dac.target.lock().unwrap() = Some(Arc::clone(&channel));
        channel.set_monitor_enabled(true);

        monitor.start_monitoring().unwrap();
        wait_until("a few feedback steps", || {
            dac.sets.load(Ordering::SeqCst) >= 3
        });
        monitor.stop_monitoring();

        assert!(!dac.blocked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_configured_history_limit_applies() {
        let bus = Arc::new(EventBus::new());
        let engine = Arc::new(AlertEngine::new(Arc::clone(&bus)));
        let monitor = Monitor::new(
            MockWavemeter::with_frequency(Frequency::from_hz(100e12)),
            MockFiberSwitch::new(),
            MockDac::new(),
            engine,
            bus,
            MonitorConfig {
                longterm_limit: Some(2),
                ..fast_config()
            },
        );
        let channel = monitor.add_channel(ChannelConfig::new(ch(1))).unwrap();
        channel.with_runtime(|rt| {
            for i in 0..4 {
                rt.freq_longterm.append(i as f64);
            }
            assert_eq!(rt.freq_longterm.len(), 2);
        });
    }
}
