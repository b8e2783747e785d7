/// Tilt producer
///
/// Once per period the monitor takes a burst of accelerometer samples,
/// averages the middle of the sorted burst, and reports the rotation when
/// either axis moved more than the threshold since the last report.
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::TiltConfig;
use crate::error::{CoreError, Result};
use crate::messaging::{Event, EventPublisher};

const LOG_TARGET: &str = "tagbox::tilt";

const SAMPLES: usize = 16;
const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);
/// Dropped from each end of the sorted burst
const TRIMMED: usize = 5;
/// Rough time one burst takes, read time included
const BURST_TIME: Duration = Duration::from_micros(SAMPLES as u64 * 13_750);

/// Raw counts per g at the ±2g range
const COUNTS_PER_G: f64 = 16384.0;

/// Source of raw 3-axis acceleration readings
pub trait Accelerometer: Send {
    fn read_raw(&mut self) -> Result<[i16; 3]>;
}

/// Rotation around x and y in degrees
pub fn rotation(raw: [i16; 3]) -> (f64, f64) {
    let [ax, ay, az] = raw.map(|v| v as f64 / COUNTS_PER_G);
    let x = ay.atan2(ax.hypot(az)).to_degrees();
    let y = -ax.atan2(ay.hypot(az)).to_degrees();
    (x, y)
}

/// Mean of `values` without the `TRIMMED` lowest and highest entries
pub fn trimmed_mean(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let kept = if values.len() > 2 * TRIMMED {
        &values[TRIMMED..values.len() - TRIMMED]
    } else {
        &values[..]
    };
    kept.iter().sum::<f64>() / kept.len().max(1) as f64
}

/// Outcome of an interruptible wait
enum Pause {
    Elapsed,
    Stopped,
}

fn pause(stop: &Receiver<()>, duration: Duration) -> Pause {
    match stop.recv_timeout(duration) {
        Err(RecvTimeoutError::Timeout) => Pause::Elapsed,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => Pause::Stopped,
    }
}

struct Sampler {
    sensor: Box<dyn Accelerometer>,
    stop: Receiver<()>,
    events: EventPublisher,
    period: Duration,
    threshold: f64,
}

impl Sampler {
    fn run(mut self) -> Result<()> {
        let mut last: Option<(f64, f64)> = None;

        loop {
            if let Pause::Stopped = pause(&self.stop, self.period.saturating_sub(BURST_TIME)) {
                tracing::debug!(target: LOG_TARGET, "stop event received");
                return Ok(());
            }

            let Some((x, y)) = self.average_rotation()? else {
                tracing::debug!(target: LOG_TARGET, "terminated while sampling");
                return Ok(());
            };

            let moved = match last {
                Some((old_x, old_y)) => {
                    (x - old_x).abs() > self.threshold || (y - old_y).abs() > self.threshold
                }
                None => true,
            };
            if moved {
                last = Some((x, y));
                self.events.publish(Event::TiltChanged { x, y });
            }
        }
    }

    fn average_rotation(&mut self) -> Result<Option<(f64, f64)>> {
        let mut xs = Vec::with_capacity(SAMPLES);
        let mut ys = Vec::with_capacity(SAMPLES);

        for _ in 0..SAMPLES {
            let (x, y) = rotation(self.sensor.read_raw()?);
            xs.push(x);
            ys.push(y);
            if let Pause::Stopped = pause(&self.stop, SAMPLE_INTERVAL) {
                return Ok(None);
            }
        }

        Ok(Some((trimmed_mean(&mut xs), trimmed_mean(&mut ys))))
    }
}

/// Sampling thread handle
pub struct TiltMonitor {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl TiltMonitor {
    pub fn spawn(
        sensor: Box<dyn Accelerometer>,
        config: &TiltConfig,
        events: EventPublisher,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded(1);
        let sampler = Sampler {
            sensor,
            stop: stop_rx,
            events: events.clone(),
            period: Duration::from_millis(config.period_ms),
            threshold: config.threshold_degrees,
        };

        let thread = thread::Builder::new()
            .name("tilt-monitor".to_string())
            .spawn(move || {
                let result = sampler.run();
                if let Err(e) = &result {
                    tracing::error!(target: LOG_TARGET, "tilt sensor failed: {}", e);
                    events.publish(Event::Interrupt);
                }
                result
            })
            .map_err(|e| CoreError::io("spawning tilt monitor", e))?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop sampling and join the thread. Idempotent.
    ///
    /// Returns the sensor fault if the thread died on one.
    pub fn terminate(&mut self) -> Result<()> {
        tracing::debug!(target: LOG_TARGET, "tilt monitor terminating");
        // Dropping the sender wakes any pending wait
        self.stop.take();

        let Some(thread) = self.thread.take() else {
            tracing::debug!(target: LOG_TARGET, "already terminated");
            return Ok(());
        };
        tracing::debug!(target: LOG_TARGET, "waiting for tilt thread");
        match thread.join() {
            Ok(result) => result,
            Err(_) => Err(CoreError::InvalidState("tilt thread panicked")),
        }
    }
}

impl Drop for TiltMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::warn!(target: LOG_TARGET, "terminate on drop failed: {}", e);
        }
    }
}
