//! Mock instruments for testing without hardware
//!
//! Each mock exposes a cloneable handle onto its shared state, so a test can
//! keep scripting and inspecting a device after moving it into the poll
//! task.

use crate::domain::{ChannelId, Frequency};
use crate::error::{DacError, SwitchError, WavemeterError};
use crate::hardware::{Dac, FiberSwitch, Wavemeter};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const MOCK_DAC_MIN: f64 = 0.0;
const MOCK_DAC_MAX: f64 = 32_000.0;
const MOCK_DAC_MID: f64 = 16_000.0;

#[derive(Debug)]
struct WavemeterState {
    script: VecDeque<Result<Frequency, WavemeterError>>,
    default: Result<Frequency, WavemeterError>,
    exposure: (u32, u32),
    auto_exposure: bool,
    exposures_set: Vec<(u32, u32)>,
    pattern: Option<Vec<u16>>,
    wide_pattern: Option<Vec<u16>>,
    reads: usize,
}

/// Scriptable wavemeter
#[derive(Clone)]
pub struct MockWavemeter {
    state: Arc<Mutex<WavemeterState>>,
}

impl MockWavemeter {
    /// Wavemeter that always reports the given frequency
    pub fn with_frequency(frequency: Frequency) -> Self {
        Self {
            state: Arc::new(Mutex::new(WavemeterState {
                script: VecDeque::new(),
                default: Ok(frequency),
                exposure: (10, 10),
                auto_exposure: false,
                exposures_set: Vec::new(),
                pattern: None,
                wide_pattern: None,
                reads: 0,
            })),
        }
    }

    /// Wavemeter that always fails with the given error
    pub fn with_error(error: WavemeterError) -> Self {
        let mock = Self::with_frequency(Frequency::from_thz(0.0));
        mock.state.lock().unwrap().default = Err(error);
        mock
    }

    /// Queue results returned before falling back to the default
    pub fn script(&self, results: impl IntoIterator<Item = Result<Frequency, WavemeterError>>) {
        self.state.lock().unwrap().script.extend(results);
    }

    /// Replace the fallback result
    pub fn set_default(&self, result: Result<Frequency, WavemeterError>) {
        self.state.lock().unwrap().default = result;
    }

    /// Provide pattern traces to hand out
    pub fn set_patterns(&self, pattern: Option<Vec<u16>>, wide: Option<Vec<u16>>) {
        let mut state = self.state.lock().unwrap();
        state.pattern = pattern;
        state.wide_pattern = wide;
    }

    /// Exposure pairs recorded from `set_exposure` calls
    pub fn exposures_set(&self) -> Vec<(u32, u32)> {
        self.state.lock().unwrap().exposures_set.clone()
    }

    /// Whether automatic exposure is currently enabled
    pub fn auto_exposure(&self) -> bool {
        self.state.lock().unwrap().auto_exposure
    }

    /// Number of frequency reads so far
    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }
}

impl Wavemeter for MockWavemeter {
    fn frequency(&mut self) -> Result<Frequency, WavemeterError> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        match state.script.pop_front() {
            Some(result) => result,
            None => state.default.clone(),
        }
    }

    fn set_exposure(&mut self, expo: u32, expo2: u32) -> Result<(), WavemeterError> {
        let mut state = self.state.lock().unwrap();
        state.exposure = (expo, expo2);
        state.exposures_set.push((expo, expo2));
        Ok(())
    }

    fn exposure(&mut self) -> Result<(u32, u32), WavemeterError> {
        Ok(self.state.lock().unwrap().exposure)
    }

    fn set_auto_exposure(&mut self, enabled: bool) -> Result<(), WavemeterError> {
        self.state.lock().unwrap().auto_exposure = enabled;
        Ok(())
    }

    fn next_pattern(&mut self, wide: bool) -> Result<Option<Vec<u16>>, WavemeterError> {
        let state = self.state.lock().unwrap();
        Ok(if wide {
            state.wide_pattern.clone()
        } else {
            state.pattern.clone()
        })
    }
}

#[derive(Debug, Default)]
struct SwitchState {
    current: Option<u8>,
    switches: Vec<u8>,
    fail: Option<u8>,
}

/// Recording fiber switch
#[derive(Clone, Default)]
pub struct MockFiberSwitch {
    state: Arc<Mutex<SwitchState>>,
}

impl MockFiberSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make switching to the given channel report a readback mismatch
    pub fn fail_on(&self, channel: u8) {
        self.state.lock().unwrap().fail = Some(channel);
    }

    /// Channels switched to, in order
    pub fn switches(&self) -> Vec<u8> {
        self.state.lock().unwrap().switches.clone()
    }

    /// Currently selected channel
    pub fn current(&self) -> Option<u8> {
        self.state.lock().unwrap().current
    }
}

impl FiberSwitch for MockFiberSwitch {
    fn switch_channel(&mut self, channel: ChannelId) -> Result<(), SwitchError> {
        let mut state = self.state.lock().unwrap();
        if state.fail == Some(channel.get()) {
            return Err(SwitchError::ReadbackMismatch {
                requested: channel.get(),
                actual: state.current.unwrap_or(0),
            });
        }
        state.current = Some(channel.get());
        state.switches.push(channel.get());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct DacState {
    values: HashMap<u8, f64>,
    sets: Vec<(u8, f64)>,
    fail_unknown: bool,
}

/// In-memory DAC with the real 0..=32000 count range
#[derive(Clone, Default)]
pub struct MockDac {
    state: Arc<Mutex<DacState>>,
}

impl MockDac {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a channel's output
    pub fn preset(&self, channel: u8, value: f64) {
        self.state.lock().unwrap().values.insert(channel, value);
    }

    /// Make every set fail with a protocol error
    pub fn fail_unknown(&self) {
        self.state.lock().unwrap().fail_unknown = true;
    }

    /// Requested (channel, value) pairs before clamping, in order
    pub fn sets(&self) -> Vec<(u8, f64)> {
        self.state.lock().unwrap().sets.clone()
    }

    /// Current output of a channel
    pub fn value(&self, channel: u8) -> f64 {
        *self
            .state
            .lock()
            .unwrap()
            .values
            .get(&channel)
            .unwrap_or(&MOCK_DAC_MID)
    }
}

impl Dac for MockDac {
    fn get_dac_value(&mut self, channel: u8) -> Result<f64, DacError> {
        Ok(*self
            .state
            .lock()
            .unwrap()
            .values
            .get(&channel)
            .unwrap_or(&MOCK_DAC_MID))
    }

    fn set_dac_value(&mut self, channel: u8, value: f64) -> Result<(), DacError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_unknown {
            return Err(DacError::Protocol("scripted failure".into()));
        }
        state.sets.push((channel, value));
        let clamped = value.clamp(MOCK_DAC_MIN, MOCK_DAC_MAX);
        state.values.insert(channel, clamped);
        if clamped != value {
            return Err(DacError::OutOfBound {
                requested: value,
                min: MOCK_DAC_MIN,
                max: MOCK_DAC_MAX,
            });
        }
        Ok(())
    }

    fn reset_dac(&mut self, channel: u8) -> Result<(), DacError> {
        self.state.lock().unwrap().values.insert(channel, MOCK_DAC_MID);
        Ok(())
    }
}
