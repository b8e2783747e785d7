/// Animation engine
///
/// [`LedStrip`] owns the worker thread and the command queue feeding it.
/// Every public operation only enqueues and returns; the worker executes one
/// animation at a time and the most recent command always wins.
///
/// ```rust,ignore
/// let mut leds = LedStrip::spawn(Box::new(NullDriver), &LedConfig::default(), None)?;
/// leds.startup();
/// leds.volume(3);      // preempts the sweep at its next frame
/// leds.terminate()?;   // strip dark, worker joined
/// ```
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

use crate::config::LedConfig;
use crate::error::{CoreError, Result};
use crate::messaging::{Event, EventPublisher};

pub mod color;
pub mod command;
pub mod driver;
pub mod layout;
pub mod preempt;
mod worker;

pub use color::Rgb;
pub use command::AnimationCommand;
pub use driver::{LedDriver, NullDriver, SpiWs2812Driver};
pub use preempt::{wait_or_preempt, Wait};

use worker::Worker;

const LOG_TARGET: &str = "tagbox::leds";

/// Handle to the animation worker
pub struct LedStrip {
    commands: Sender<AnimationCommand>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl LedStrip {
    /// Open the configured strip, or run headless when no device is set
    pub fn open(config: &LedConfig, events: Option<EventPublisher>) -> Result<Self> {
        let driver: Box<dyn LedDriver> = match &config.spi_device {
            Some(path) => Box::new(SpiWs2812Driver::open(path)?),
            None => {
                tracing::info!(target: LOG_TARGET, "no LED device configured, running headless");
                Box::new(NullDriver)
            }
        };
        Self::spawn(driver, config, events)
    }

    /// Start the worker on `driver`.
    ///
    /// With `events` set, a driver failure publishes `Interrupt` so the
    /// dispatcher shuts down.
    pub fn spawn(
        driver: Box<dyn LedDriver>,
        config: &LedConfig,
        events: Option<EventPublisher>,
    ) -> Result<Self> {
        let (tx, rx) = unbounded();
        let worker = Worker::new(driver, rx, config.pixel_count, config.brightness);

        let handle = thread::Builder::new()
            .name("led-worker".to_string())
            .spawn(move || {
                let result = worker.run();
                if let Err(e) = &result {
                    tracing::error!(target: LOG_TARGET, "LED worker failed: {}", e);
                    if let Some(events) = events {
                        events.publish(Event::Interrupt);
                    }
                }
                result
            })
            .map_err(|e| CoreError::io("spawning LED worker", e))?;

        Ok(Self {
            commands: tx,
            worker: Some(handle),
        })
    }

    fn send(&self, command: AnimationCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!(target: LOG_TARGET, "worker gone, command dropped");
        }
    }

    pub fn startup(&self) {
        self.send(AnimationCommand::StartupSweep);
    }

    pub fn shutdown(&self) {
        self.send(AnimationCommand::ShutdownSweep);
    }

    pub fn rainbow(&self) {
        self.send(AnimationCommand::RainbowLoop);
    }

    /// Volume bar for table index `level`
    pub fn volume(&self, level: usize) {
        self.send(AnimationCommand::VolumeLevel(level));
    }

    pub fn fade(&self, color: Rgb) {
        self.send(AnimationCommand::Fade(color));
    }

    pub fn track_progress(&self, index: usize, total: usize, forward: bool) {
        self.send(AnimationCommand::TrackProgress {
            index,
            total,
            forward,
        });
    }

    pub fn clear(&self) {
        self.send(AnimationCommand::Clear);
    }

    /// Stop the worker, blanking the strip. Idempotent.
    ///
    /// Returns the driver fault if the worker died on one.
    pub fn terminate(&mut self) -> Result<()> {
        tracing::debug!(target: LOG_TARGET, "led strip terminating");
        let Some(handle) = self.worker.take() else {
            tracing::debug!(target: LOG_TARGET, "already terminated");
            return Ok(());
        };

        self.send(AnimationCommand::Terminate);
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(CoreError::InvalidState("LED worker panicked")),
        }
    }
}

impl Drop for LedStrip {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::warn!(target: LOG_TARGET, "terminate on drop failed: {}", e);
        }
    }
}
