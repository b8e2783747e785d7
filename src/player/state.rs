/// Decoder-confirmed player state
///
/// The driver never changes state optimistically: every field here is written
/// by the response reader after the decoder said so.
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::protocol::{factor_to_pitch, DecoderMessage, Reply, ReportedState};

/// Playback state of the decoder
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Paused,
    Playing,
    /// The decoder was shut down; absorbing
    Terminated,
}

impl PlayerState {
    pub fn description(&self) -> &'static str {
        match self {
            PlayerState::Stopped => "STOPPED",
            PlayerState::Paused => "PAUSED",
            PlayerState::Playing => "PLAYING",
            PlayerState::Terminated => "TERMINATED",
        }
    }
}

impl From<ReportedState> for PlayerState {
    fn from(state: ReportedState) -> Self {
        match state {
            ReportedState::Stopped => PlayerState::Stopped,
            ReportedState::Paused => PlayerState::Paused,
            ReportedState::Playing => PlayerState::Playing,
        }
    }
}

/// Position snapshot taken by a `SAMPLE` round trip
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PlaybackPosition {
    pub current_samples: u64,
    pub total_samples: u64,
    pub length_ms: u64,
}

impl PlaybackPosition {
    pub fn position_ms(&self) -> u64 {
        if self.total_samples == 0 {
            return 0;
        }
        (self.current_samples as f64 / self.total_samples as f64 * self.length_ms as f64).round()
            as u64
    }

    pub fn samples_for(&self, position_ms: u64) -> u64 {
        if self.length_ms == 0 {
            return 0;
        }
        (position_ms as f64 / self.length_ms as f64 * self.total_samples as f64).round() as u64
    }
}

/// What the reader learned from the decoder
#[derive(Debug, Default)]
pub(crate) struct Status {
    pub state: PlayerState,
    pub volume: Option<f64>,
    pub decoder_pitch: u32,
    pub position: PlaybackPosition,
    pub sample_rate: Option<u32>,
    pub current_file: Option<PathBuf>,

    /// Command currently waiting for its reply
    pub pending: Option<Pending>,
    pub outcome: Option<Outcome>,
    pub ready: bool,
    pub alive: bool,

    /// Cleared on terminate so a deliberate exit is not reported as a fault
    pub report_faults: bool,
}

/// Reply the driver is blocked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pending {
    pub reply: Reply,
    pub rejectable: bool,
    pub moot_when_stopped: bool,
}

/// How a pending command was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Answered,
    Rejected,
    /// The track ended on its own before the decoder answered
    TrackEnded,
}

/// What the reader thread must do after applying a line
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Notice {
    None,
    Stopped,
}

impl Status {
    pub fn new() -> Self {
        Self {
            decoder_pitch: 100,
            alive: true,
            report_faults: true,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, message: DecoderMessage) -> Notice {
        let mut notice = Notice::None;

        match &message {
            DecoderMessage::Ready => self.ready = true,
            DecoderMessage::Error(text) => {
                if self.pending.map_or(false, |pending| pending.rejectable) {
                    tracing::warn!("decoder error: {}", text);
                    self.settle(Outcome::Rejected);
                } else {
                    tracing::warn!("unsolicited decoder error: {}", text);
                }
            }
            DecoderMessage::State(reported) => {
                if self.state != PlayerState::Terminated {
                    self.state = (*reported).into();
                    tracing::debug!("state={}", self.state.description());
                    if self.state == PlayerState::Stopped {
                        self.current_file = None;
                        notice = Notice::Stopped;
                    }
                }
            }
            DecoderMessage::Sample { current, total } => {
                self.position.current_samples = *current;
                self.position.total_samples = *total;
                tracing::debug!("current position: {} / {}", current, total);
            }
            DecoderMessage::StreamInfo { sample_rate } => {
                self.sample_rate = Some(*sample_rate);
                let per_ms = *sample_rate as f64 / 1000.0;
                if per_ms > 0.0 {
                    self.position.length_ms =
                        (self.position.total_samples as f64 / per_ms).round() as u64;
                }
                tracing::debug!("track length: {}ms", self.position.length_ms);
            }
            DecoderMessage::SeekAck => {}
            DecoderMessage::Volume(percent) => {
                self.volume = Some(*percent);
                tracing::debug!("volume: {}", percent);
            }
            DecoderMessage::Pitch(factor) => {
                self.decoder_pitch = factor_to_pitch(*factor);
                tracing::debug!("pitch: {}", self.decoder_pitch);
            }
        }

        if let (Some(pending), Some(reply)) = (self.pending, message.reply()) {
            if reply == pending.reply {
                self.settle(Outcome::Answered);
            } else if pending.moot_when_stopped && reply == Reply::State(ReportedState::Stopped) {
                self.settle(Outcome::TrackEnded);
            }
        }
        notice
    }

    /// First outcome wins; later lines belong to nobody
    fn settle(&mut self, outcome: Outcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    /// Whether the pending command may stop waiting
    pub fn answered(&self) -> bool {
        !self.alive || self.outcome.is_some()
    }
}

/// Status plus the "response arrived" signal
#[derive(Debug)]
pub(crate) struct Shared {
    status: Mutex<Status>,
    signal: Condvar,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Status::new()),
            signal: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock()
    }

    pub fn notify(&self) {
        self.signal.notify_all();
    }

    /// Block until `done` holds or `deadline` passes; returns whether `done` held
    pub fn wait_until(
        &self,
        guard: &mut MutexGuard<'_, Status>,
        deadline: Instant,
        done: impl Fn(&Status) -> bool,
    ) -> bool {
        while !done(guard) {
            if self.signal.wait_until(guard, deadline).timed_out() {
                return done(guard);
            }
        }
        true
    }
}
