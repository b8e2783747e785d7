/// Animation worker
///
/// Runs on its own thread and is the only code that touches the LED driver.
/// Every animation is a sequence of frames separated by interruptible waits;
/// a command arriving during a wait abandons the current animation and is
/// executed next.
use std::time::Duration;

use crossbeam_channel::Receiver;

use super::color::{spread_wheel, Rgb, VOLUME_GRADIENT};
use super::command::AnimationCommand;
use super::driver::LedDriver;
use super::layout::{span, StripLayout};
use super::preempt::{wait_or_preempt, Wait};
use crate::error::Result;

const LOG_TARGET: &str = "tagbox::leds";

const WALK_INTERVAL: Duration = Duration::from_millis(30);
const FADE_INTERVAL: Duration = Duration::from_millis(50);
const FADE_HOLD: Duration = Duration::from_millis(500);
const RAINBOW_INTERVAL: Duration = Duration::from_millis(20);
const PROGRESS_HOLD: Duration = Duration::from_secs(1);

/// `Some` carries the command that preempted the animation
type Step = Result<Option<AnimationCommand>>;

/// Propagate a preemption out of the current animation
macro_rules! preemptible {
    ($step:expr) => {
        if let Some(next) = $step? {
            return Ok(Some(next));
        }
    };
}

pub(super) struct Worker {
    driver: Box<dyn LedDriver>,
    commands: Receiver<AnimationCommand>,
    layout: StripLayout,
    brightness: u8,

    /// Colours as animated, before brightness
    pixels: Vec<Rgb>,
    frame: Vec<Rgb>,
}

impl Worker {
    pub fn new(
        driver: Box<dyn LedDriver>,
        commands: Receiver<AnimationCommand>,
        pixel_count: usize,
        brightness: u8,
    ) -> Self {
        Self {
            driver,
            commands,
            layout: StripLayout::new(pixel_count),
            brightness,
            pixels: vec![Rgb::BLACK; pixel_count],
            frame: Vec::with_capacity(pixel_count),
        }
    }

    /// Execute commands until terminated; the strip is left dark
    pub fn run(mut self) -> Result<()> {
        tracing::debug!(target: LOG_TARGET, "worker started");
        let mut carried: Option<AnimationCommand> = None;

        loop {
            let command = match carried.take() {
                Some(command) => command,
                None => self
                    .commands
                    .recv()
                    .unwrap_or(AnimationCommand::Terminate),
            };

            tracing::debug!(target: LOG_TARGET, "event: {}", command.description());
            if command == AnimationCommand::Terminate {
                break;
            }

            carried = self.execute(command)?;
        }

        self.clear_all()?;
        tracing::debug!(target: LOG_TARGET, "worker stopped");
        Ok(())
    }

    fn execute(&mut self, command: AnimationCommand) -> Step {
        match command {
            AnimationCommand::StartupSweep => self.startup(),
            AnimationCommand::ShutdownSweep => self.shutdown(),
            AnimationCommand::RainbowLoop => self.rainbow(),
            AnimationCommand::VolumeLevel(level) => self.volume(level),
            AnimationCommand::Fade(color) => self.fade(color),
            AnimationCommand::TrackProgress {
                index,
                total,
                forward,
            } => self.track_progress(index, total, forward),
            AnimationCommand::Clear => self.clear_all().map(|_| None),
            AnimationCommand::Terminate => Ok(Some(AnimationCommand::Terminate)),
        }
    }

    fn show(&mut self) -> Result<()> {
        let brightness = self.brightness;
        self.frame.clear();
        self.frame
            .extend(self.pixels.iter().map(|pixel| pixel.dimmed(brightness)));
        self.driver.write(&self.frame)
    }

    fn sleep(&self, interval: Duration) -> Step {
        Ok(match wait_or_preempt(&self.commands, interval) {
            Wait::Elapsed => None,
            Wait::Preempted(next) => Some(next),
        })
    }

    fn clear_all(&mut self) -> Result<()> {
        self.pixels.fill(Rgb::BLACK);
        self.show()
    }

    fn fade_up(&mut self, leds: &[usize], colors: &[Rgb]) -> Step {
        for step in 0..=10 {
            let factor = step as f64 * 0.1;
            for (&led, color) in leds.iter().zip(colors) {
                self.pixels[led] = color.scaled(factor);
            }
            self.show()?;
            preemptible!(self.sleep(FADE_INTERVAL));
        }
        Ok(None)
    }

    /// Fade from 90% of the current colours down to black
    fn fade_down(&mut self, leds: &[usize]) -> Step {
        let initial: Vec<Rgb> = leds.iter().map(|&led| self.pixels[led]).collect();

        for step in (0..=9).rev() {
            let factor = step as f64 * 0.1;
            for (&led, color) in leds.iter().zip(&initial) {
                self.pixels[led] = color.scaled(factor);
            }
            self.show()?;
            preemptible!(self.sleep(FADE_INTERVAL));
        }
        Ok(None)
    }

    fn fade_up_and_down(&mut self, leds: &[usize], colors: &[Rgb]) -> Step {
        preemptible!(self.fade_up(leds, colors));
        preemptible!(self.sleep(FADE_HOLD));
        self.fade_down(leds)
    }

    fn walk_around(&mut self, leds: &[usize], paint: impl Fn(usize) -> Rgb) -> Step {
        for &led in leds {
            self.pixels[led] = paint(led);
            self.show()?;
            preemptible!(self.sleep(WALK_INTERVAL));
        }
        Ok(None)
    }

    fn startup(&mut self) -> Step {
        let order = self.layout.walk().to_vec();
        let count = self.layout.pixel_count();

        preemptible!(self.walk_around(&order, |_| Rgb::GREEN));
        preemptible!(self.walk_around(&order, |led| spread_wheel(led, count, 0)));
        self.walk_around(&order, |_| Rgb::BLACK)
    }

    fn shutdown(&mut self) -> Step {
        let order = self.layout.walk().to_vec();
        let count = self.layout.pixel_count();

        preemptible!(self.walk_around(&order, |led| spread_wheel(led, count, 0)));
        preemptible!(self.walk_around(&order, |_| Rgb::RED));
        self.walk_around(&order, |_| Rgb::BLACK)
    }

    /// Rotating rainbow; only ends when preempted
    fn rainbow(&mut self) -> Step {
        let count = self.layout.pixel_count();
        loop {
            for offset in 0..=255u8 {
                for (i, pixel) in self.pixels.iter_mut().enumerate() {
                    *pixel = spread_wheel(i, count, offset);
                }
                self.show()?;
                preemptible!(self.sleep(RAINBOW_INTERVAL));
            }
        }
    }

    fn volume(&mut self, level: usize) -> Step {
        tracing::debug!(target: LOG_TARGET, "animating volume {}", level);
        self.clear_all()?;

        let volume = self.layout.volume();
        let leds = span(&volume, 0, level + 1);
        self.fade_up_and_down(leds, &VOLUME_GRADIENT)
    }

    fn fade(&mut self, color: Rgb) -> Step {
        tracing::debug!(target: LOG_TARGET, "fading {}", color);
        self.clear_all()?;

        let leds = self.layout.all();
        let colors = vec![color; leds.len()];
        self.fade_up_and_down(&leds, &colors)
    }

    /// Position `index` of `total`: anchors mark both ends, a yellow walk
    /// runs to the position and a blue pixel marks it.
    fn track_progress(&mut self, index: usize, total: usize, forward: bool) -> Step {
        tracing::debug!(target: LOG_TARGET, "song {} {}", index, total);
        let song = self.layout.song().to_vec();

        let walk: Vec<usize> = if forward {
            span(&song, 2, 2 + index).to_vec()
        } else {
            span(&song, 3 + index, 2 + total)
                .iter()
                .rev()
                .copied()
                .collect()
        };
        tracing::debug!(target: LOG_TARGET, "walk={:?}", walk);

        let start = span(&song, 0, 2);
        let end = span(&song, 2 + total, 4 + total);
        let position = span(&song, 2 + index, 3 + index);

        let anchors: Vec<usize> = start.iter().chain(end).copied().collect();
        let anchor_colors: Vec<Rgb> = start
            .iter()
            .map(|_| Rgb::GREEN)
            .chain(end.iter().map(|_| Rgb::RED))
            .collect();

        self.clear_all()?;
        preemptible!(self.fade_up(&anchors, &anchor_colors));
        preemptible!(self.walk_around(&walk, |_| Rgb::YELLOW));
        preemptible!(self.fade_up(position, &[Rgb::BLUE]));

        let back: Vec<usize> = walk.iter().rev().copied().collect();
        preemptible!(self.walk_around(&back, |_| Rgb::BLACK));
        preemptible!(self.sleep(PROGRESS_HOLD));

        let lit: Vec<usize> = start.iter().chain(position).chain(end).copied().collect();
        self.fade_down(&lit)
    }
}
