//! Mutual exclusion between microphone capture and speaker playback
//!
//! The assistant never records while it is speaking. Recording may preempt
//! playback; playback may only start from idle.

use crate::{ParrotError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Recording,
    Playing,
}

/// Result of acquiring the device for recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingGrant {
    /// Device was idle
    Clean,
    /// Playback was in progress; the caller must stop the sink
    PreemptedPlayback,
}

/// Shared two-way lock over the audio device
#[derive(Debug, Clone)]
pub struct DeviceLock {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for DeviceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::Idle)),
        }
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    pub fn begin_recording(&self) -> Result<RecordingGrant> {
        let mut state = self.state.lock();
        let grant = match *state {
            DeviceState::Idle => RecordingGrant::Clean,
            DeviceState::Playing => RecordingGrant::PreemptedPlayback,
            DeviceState::Recording => {
                return Err(ParrotError::DeviceBusy("already recording".into()));
            }
        };
        *state = DeviceState::Recording;
        debug!("Device: recording ({:?})", grant);
        Ok(grant)
    }

    pub fn begin_playback(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            DeviceState::Idle => {
                *state = DeviceState::Playing;
                debug!("Device: playing");
                Ok(())
            }
            DeviceState::Recording => Err(ParrotError::DeviceBusy("recording in progress".into())),
            DeviceState::Playing => Err(ParrotError::DeviceBusy("already playing".into())),
        }
    }

    /// Release after recording. No-op unless currently recording.
    pub fn finish_recording(&self) {
        self.release(DeviceState::Recording);
    }

    /// Release after playback. No-op if recording already took over.
    pub fn finish_playback(&self) {
        self.release(DeviceState::Playing);
    }

    fn release(&self, holder: DeviceState) {
        let mut state = self.state.lock();
        if *state == holder {
            *state = DeviceState::Idle;
            debug!("Device: idle");
        }
    }
}
