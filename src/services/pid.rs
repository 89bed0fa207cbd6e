//! PID feedback step
//!
//! One step per poll visit: accumulate the integral over the elapsed time,
//! read the DAC back and write the corrected output. Errors are expressed in
//! THz so the configured gains stay in DAC counts per THz.
//!
//! The step works on a [`PidState`] snapshot instead of the channel runtime
//! directly: the caller captures the state under the runtime lock, releases
//! it for the DAC I/O, and writes the result back afterwards. No channel
//! lock is ever held across a device call.

use crate::domain::{ChannelRuntime, PidConfig};
use crate::error::DacError;
use crate::hardware::Dac;
use std::time::Instant;

const HZ_PER_THZ: f64 = 1e12;

/// Feedback-relevant slice of a channel's runtime state
#[derive(Debug, Clone, Copy)]
pub struct PidState {
    /// Signed frequency error in Hz
    pub error: f64,
    /// Integral accumulator, THz-seconds
    pub pid_i: f64,
    /// Time of the last step; None before the first
    pub last_update: Option<Instant>,
    /// Last commanded output in counts
    pub output: f64,
    /// Whether the output sits at a rail
    pub railed: bool,
}

impl PidState {
    /// Snapshot the feedback fields of a runtime
    pub fn capture(runtime: &ChannelRuntime) -> Self {
        Self {
            error: runtime.error,
            pid_i: runtime.pid_i,
            last_update: runtime.pid_last_update,
            output: runtime.dac_output,
            railed: runtime.dac_railed,
        }
    }

    /// Write the stepped fields back into a runtime
    ///
    /// After a failed step only the integral and timestamp land, so the next
    /// step sees the elapsed time; the output bookkeeping stays untouched.
    pub fn write_back(&self, runtime: &mut ChannelRuntime, outcome: &PidOutcome) {
        runtime.pid_i = self.pid_i;
        runtime.pid_last_update = self.last_update;
        if !matches!(outcome, PidOutcome::Failed(_)) {
            runtime.dac_output = self.output;
            runtime.dac_railed = self.railed;
        }
    }
}

/// Result of one feedback step
#[derive(Debug)]
pub enum PidOutcome {
    /// Output written inside the DAC range
    Updated { output: f64 },
    /// Output clamped at a rail; the clamped value was written
    Railed { output: f64 },
    /// DAC command failed; no output bookkeeping was done
    Failed(DacError),
}

/// Run one feedback step
///
/// `state.error` must hold the fresh signed frequency error in Hz. The
/// first step after a reset has no elapsed time and contributes nothing to
/// the integral.
pub fn step(
    state: &mut PidState,
    pid: &PidConfig,
    dac: &mut impl Dac,
    dac_channel: u8,
    now: Instant,
) -> PidOutcome {
    let error_thz = state.error / HZ_PER_THZ;

    let dt = state
        .last_update
        .map(|last| now.saturating_duration_since(last).as_secs_f64())
        .unwrap_or(0.0);
    state.last_update = Some(now);

    state.pid_i += error_thz * dt;
    if let Some(clamp) = pid.integral_clamp {
        state.pid_i = state.pid_i.clamp(-clamp, clamp);
    }

    let readback = match dac.get_dac_value(dac_channel) {
        Ok(value) => value,
        Err(e) => return PidOutcome::Failed(e),
    };

    let output = readback + pid.kp * error_thz + pid.ki * state.pid_i;
    match dac.set_dac_value(dac_channel, output) {
        Ok(()) => {
            state.output = output;
            state.railed = false;
            PidOutcome::Updated { output }
        }
        Err(DacError::OutOfBound { min, max, .. }) => {
            let railed = output.clamp(min, max);
            state.output = railed;
            state.railed = true;
            PidOutcome::Railed { output: railed }
        }
        Err(e) => PidOutcome::Failed(e),
    }
}
