/// mpg123 remote-control driver
///
/// Owns one decoder subprocess for the lifetime of the appliance. Public
/// operations are synchronous: each writes one command and blocks, bounded by
/// the IPC timeout, until the response reader has seen the matching reply.
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::protocol::{DecoderCommand, DecoderMessage, ReportedState};
use super::state::{Notice, Outcome, Pending, PlaybackPosition, PlayerState, Shared};
use super::AudioControl;
use crate::config::{check_range, AudioConfig, PITCH_RANGE, VOLUME_RANGE};
use crate::error::{CoreError, Result};
use crate::messaging::{Event, EventPublisher};

const LOG_TARGET: &str = "tagbox::mpg123";

/// Decoder subprocess driver
pub struct Mpg123Player {
    input: Box<dyn Write + Send>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    events: EventPublisher,
    ipc_timeout: Duration,

    /// Configured pitch; only transmitted while a track is loaded
    pitch: u32,

    /// Set after a timeout: the session is over, nothing is retried
    faulted: bool,
}

impl Mpg123Player {
    /// Start the decoder binary in remote mode
    pub fn spawn(config: &AudioConfig, events: EventPublisher) -> Result<Self> {
        let mut child = Command::new(&config.decoder_binary)
            .arg("--remote")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CoreError::io("starting decoder", e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or(CoreError::InvalidState("decoder stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(CoreError::InvalidState("decoder stdout not captured"))?;

        tracing::info!(target: LOG_TARGET, "started {} (pid {})", config.decoder_binary, child.id());
        Self::start(Box::new(stdin), stdout, Some(child), config, events)
    }

    /// Drive a decoder reachable over an arbitrary byte channel
    pub fn with_channel<W, R>(
        input: W,
        output: R,
        config: &AudioConfig,
        events: EventPublisher,
    ) -> Result<Self>
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
    {
        Self::start(Box::new(input), output, None, config, events)
    }

    fn start<R: Read + Send + 'static>(
        input: Box<dyn Write + Send>,
        output: R,
        child: Option<Child>,
        config: &AudioConfig,
        events: EventPublisher,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new());

        let reader = {
            let shared = Arc::clone(&shared);
            let events = events.clone();
            thread::Builder::new()
                .name("decoder-reader".to_string())
                .spawn(move || read_responses(BufReader::new(output), shared, events))
                .map_err(|e| CoreError::io("spawning decoder reader", e))?
        };

        let mut player = Self {
            input,
            child,
            reader: Some(reader),
            shared,
            events,
            ipc_timeout: config.ipc_timeout(),
            pitch: config.default_pitch,
            faulted: false,
        };

        player.await_ready(config.startup_timeout())?;
        // Keeps the decoder from spamming frame positions
        player.send(DecoderCommand::Silence)?;
        player.set_volume(config.default_volume)?;
        player.set_pitch(config.default_pitch)?;

        tracing::info!(target: LOG_TARGET, "decoder initialized");
        Ok(player)
    }

    fn await_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut status = self.shared.lock();
        self.shared
            .wait_until(&mut status, deadline, |s| s.ready || !s.alive);

        if status.ready {
            Ok(())
        } else if !status.alive {
            Err(CoreError::InvalidState("decoder exited during startup"))
        } else {
            Err(CoreError::IpcTimeout {
                command: "startup".to_string(),
                timeout,
            })
        }
    }

    /// Write one command and wait for its own reply.
    ///
    /// Replies to anything else are applied to the status but do not end the
    /// wait. Returns `Ok(false)` when the decoder refused the command.
    fn send(&mut self, command: DecoderCommand<'_>) -> Result<bool> {
        if self.faulted {
            return Err(CoreError::InvalidState("decoder session faulted"));
        }

        let expected = command.expects();
        {
            let mut status = self.shared.lock();
            if !status.alive {
                return Err(CoreError::InvalidState("decoder process has exited"));
            }
            status.pending = expected.map(|reply| Pending {
                reply,
                rejectable: command.may_be_rejected(),
                moot_when_stopped: command.moot_when_stopped(),
            });
            status.outcome = None;
        }

        let line = command.to_string();
        tracing::trace!(target: LOG_TARGET, "> {}", line);
        self.write_line(&line)?;

        if expected.is_none() {
            return Ok(true);
        }

        let deadline = Instant::now() + self.ipc_timeout;
        let mut status = self.shared.lock();
        let settled = self
            .shared
            .wait_until(&mut status, deadline, |s| s.answered());
        status.pending = None;
        let outcome = status.outcome.take();
        drop(status);

        if !settled {
            tracing::error!(
                target: LOG_TARGET,
                "no answer to `{}` within {:?}",
                line,
                self.ipc_timeout
            );
            self.faulted = true;
            self.events.publish(Event::AudioFault);
            return Err(CoreError::IpcTimeout {
                command: line,
                timeout: self.ipc_timeout,
            });
        }

        match outcome {
            Some(Outcome::Answered) => Ok(true),
            Some(Outcome::Rejected) => Ok(false),
            Some(Outcome::TrackEnded) => {
                tracing::debug!(target: LOG_TARGET, "track ended before `{}` was answered", line);
                Ok(true)
            }
            // Reader saw end of output; it has already reported the fault
            None => Err(CoreError::InvalidState("decoder process has exited")),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.input, "{}", line)
            .and_then(|_| self.input.flush())
            .map_err(|e| CoreError::io("writing to decoder", e))
    }

    fn query_position(&mut self) -> Result<PlaybackPosition> {
        self.send(DecoderCommand::Sample)?;
        Ok(self.shared.lock().position)
    }

    fn require_loaded(&self) -> Result<()> {
        if self.shared.lock().current_file.is_none() {
            return Err(CoreError::InvalidState("no track loaded"));
        }
        Ok(())
    }

    fn await_stream_info(&self) {
        let deadline = Instant::now() + self.ipc_timeout;
        let mut status = self.shared.lock();
        if !self
            .shared
            .wait_until(&mut status, deadline, |s| s.sample_rate.is_some() || !s.alive)
        {
            tracing::warn!(target: LOG_TARGET, "decoder did not report stream info; track length unknown");
        }
    }

    /// Shut the decoder down. Idempotent.
    ///
    /// Tries `Q` first and kills the process if that fails or the process
    /// lingers. Always joins the response reader before returning.
    pub fn terminate(&mut self) -> Result<()> {
        tracing::info!(target: LOG_TARGET, "terminating...");
        {
            let mut status = self.shared.lock();
            if status.state == PlayerState::Terminated {
                tracing::debug!(target: LOG_TARGET, "already terminated");
                return Ok(());
            }
            status.state = PlayerState::Terminated;
            status.report_faults = false;
        }

        let graceful = !self.faulted && self.quit().is_ok();

        // Closing stdin makes a well-behaved decoder exit on its own
        self.input = Box::new(io::sink());

        if let Some(mut child) = self.child.take() {
            if graceful {
                wait_or_kill(&mut child, self.ipc_timeout)?;
            } else {
                tracing::warn!(target: LOG_TARGET, "graceful quit failed, killing decoder");
                let _ = child.kill();
                child
                    .wait()
                    .map_err(|e| CoreError::io("reaping decoder", e))?;
            }
        }

        tracing::debug!(target: LOG_TARGET, "waiting for reader thread");
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!(target: LOG_TARGET, "reader thread panicked");
            }
        }

        tracing::info!(target: LOG_TARGET, "ok, finished");
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        if !self.shared.lock().alive {
            return Ok(());
        }
        tracing::trace!(target: LOG_TARGET, "> {}", DecoderCommand::Quit);
        self.write_line(&DecoderCommand::Quit.to_string())?;

        let deadline = Instant::now() + self.ipc_timeout;
        let mut status = self.shared.lock();
        if self.shared.wait_until(&mut status, deadline, |s| !s.alive) {
            Ok(())
        } else {
            Err(CoreError::IpcTimeout {
                command: DecoderCommand::Quit.to_string(),
                timeout: self.ipc_timeout,
            })
        }
    }
}

impl AudioControl for Mpg123Player {
    fn load(&mut self, path: &Path) -> Result<()> {
        {
            let mut status = self.shared.lock();
            if status.current_file.as_deref() == Some(path) {
                tracing::debug!(target: LOG_TARGET, "file already loaded");
                return Ok(());
            }
            status.current_file = Some(path.to_path_buf());
            status.sample_rate = None;
            status.position = PlaybackPosition::default();
        }

        if !self.send(DecoderCommand::LoadPaused(path))? {
            self.shared.lock().current_file = None;
            return Err(CoreError::Rejected(format!("loading {}", path.display())));
        }

        self.query_position()?;

        // The decoder only reports stream info (and so the track length)
        // once it has actually played; do that silently.
        let volume_before = self.volume();
        self.set_volume(0)?;
        self.play()?;
        self.await_stream_info();
        self.pause()?;
        if let Some(volume) = volume_before {
            self.set_volume(volume)?;
        }

        self.set_position_ms(0)?;

        let decoder_pitch = self.shared.lock().decoder_pitch;
        if self.pitch != decoder_pitch {
            self.set_pitch(self.pitch)?;
        }

        tracing::info!(
            target: LOG_TARGET,
            "loaded {} ({}ms)",
            path.display(),
            self.track_length_ms()
        );
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        match self.state() {
            PlayerState::Playing => {
                tracing::debug!(target: LOG_TARGET, "already playing");
                Ok(())
            }
            PlayerState::Paused => self
                .send(DecoderCommand::Toggle(ReportedState::Playing))
                .map(|_| ()),
            PlayerState::Stopped => Err(CoreError::InvalidState("no track loaded")),
            PlayerState::Terminated => Err(CoreError::InvalidState("player terminated")),
        }
    }

    fn pause(&mut self) -> Result<()> {
        match self.state() {
            PlayerState::Playing => self
                .send(DecoderCommand::Toggle(ReportedState::Paused))
                .map(|_| ()),
            PlayerState::Paused | PlayerState::Stopped => {
                tracing::debug!(target: LOG_TARGET, "already paused");
                Ok(())
            }
            PlayerState::Terminated => Err(CoreError::InvalidState("player terminated")),
        }
    }

    fn stop(&mut self) -> Result<()> {
        match self.state() {
            PlayerState::Stopped => {
                tracing::debug!(target: LOG_TARGET, "already stopped");
                Ok(())
            }
            PlayerState::Terminated => Err(CoreError::InvalidState("player terminated")),
            _ => self.send(DecoderCommand::Stop).map(|_| ()),
        }
    }

    fn set_volume(&mut self, volume: u32) -> Result<()> {
        check_range("volume", volume, VOLUME_RANGE)?;

        if self.volume() == Some(volume) {
            tracing::debug!(target: LOG_TARGET, "volume already set");
            return Ok(());
        }

        self.send(DecoderCommand::Volume(volume)).map(|_| ())
    }

    fn volume(&self) -> Option<u32> {
        self.shared.lock().volume.map(|v| v.round() as u32)
    }

    fn set_pitch(&mut self, pitch: u32) -> Result<()> {
        check_range("pitch", pitch, PITCH_RANGE)?;
        self.pitch = pitch;

        if !matches!(self.state(), PlayerState::Playing | PlayerState::Paused) {
            return Ok(());
        }

        self.send(DecoderCommand::Pitch(pitch)).map(|_| ())
    }

    fn pitch(&self) -> u32 {
        self.pitch
    }

    fn position_ms(&mut self) -> Result<u64> {
        self.require_loaded()?;
        Ok(self.query_position()?.position_ms())
    }

    fn set_position_ms(&mut self, position_ms: u64) -> Result<()> {
        self.require_loaded()?;
        let sample = self.shared.lock().position.samples_for(position_ms);
        self.send(DecoderCommand::Seek(sample)).map(|_| ())
    }

    fn track_length_ms(&self) -> u64 {
        self.shared.lock().position.length_ms
    }

    fn state(&self) -> PlayerState {
        self.shared.lock().state
    }
}

impl Drop for Mpg123Player {
    fn drop(&mut self) {
        if self.state() != PlayerState::Terminated {
            if let Err(e) = self.terminate() {
                tracing::warn!(target: LOG_TARGET, "terminate on drop failed: {}", e);
            }
        }
    }
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(target: LOG_TARGET, "decoder exited with {}", status);
                return Ok(());
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Ok(None) => {
                tracing::warn!(target: LOG_TARGET, "decoder still running after quit, killing");
                let _ = child.kill();
                child
                    .wait()
                    .map_err(|e| CoreError::io("reaping decoder", e))?;
                return Ok(());
            }
            Err(e) => return Err(CoreError::io("waiting for decoder", e)),
        }
    }
}

/// Response reader loop, one per decoder
fn read_responses(mut output: impl BufRead, shared: Arc<Shared>, events: EventPublisher) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match output.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, "decoder output unreadable: {}", e);
                break;
            }
        }

        // Tag lines may carry non-UTF-8 metadata
        let line = String::from_utf8_lossy(&buf);
        tracing::trace!(target: LOG_TARGET, "< {}", line.trim_end());

        let Some(message) = DecoderMessage::parse(&line) else {
            continue;
        };

        let notice = {
            let mut status = shared.lock();
            let notice = status.apply(message);
            shared.notify();
            notice
        };

        if notice == Notice::Stopped {
            events.publish(Event::SongStopped);
        }
    }

    tracing::debug!(target: LOG_TARGET, "decoder died");
    let report = {
        let mut status = shared.lock();
        status.alive = false;
        shared.notify();
        status.report_faults
    };

    if report {
        tracing::error!(target: LOG_TARGET, "decoder output closed unexpectedly");
        events.publish(Event::AudioFault);
    }
}
