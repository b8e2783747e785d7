/// Handler state machine
///
/// The dispatcher is the only consumer of the event bus and the only thread
/// that calls into handlers. It holds the active handler and a monotonic
/// deadline; running out of events until the deadline ends the session.
use std::fmt;
use std::time::{Duration, Instant};

use crate::animation::LedStrip;
use crate::error::Result;
use crate::handlers::{Handler, HandlerContext, HandlerKey, HandlerRegistry, TimeoutResult};
use crate::messaging::{ButtonSource, Event, EventReceiver, Received};
use crate::player::AudioControl;
use crate::tag::TagId;

const LOG_TARGET: &str = "tagbox::dispatcher";

/// Why the dispatcher loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The active handler's deadline passed
    IdleTimeout,
    Interrupted,
    AudioFault,
    PowerButton,
    /// The debug interrupt tag was placed
    InterruptTag,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownReason::IdleTimeout => "timeout occurred",
            ShutdownReason::Interrupted => "interrupt event",
            ShutdownReason::AudioFault => "audio fault event",
            ShutdownReason::PowerButton => "power button event",
            ShutdownReason::InterruptTag => "interrupt tag event",
        };
        f.write_str(text)
    }
}

pub struct Dispatcher<'a> {
    events: &'a EventReceiver,
    registry: HandlerRegistry,
    leds: &'a LedStrip,
    player: &'a mut dyn AudioControl,
    interrupt_tag: Option<TagId>,

    active: HandlerKey,
    deadline: Instant,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        events: &'a EventReceiver,
        registry: HandlerRegistry,
        leds: &'a LedStrip,
        player: &'a mut dyn AudioControl,
        interrupt_tag: Option<TagId>,
    ) -> Self {
        Self {
            events,
            registry,
            leds,
            player,
            interrupt_tag,
            active: HandlerKey::Default,
            deadline: Instant::now(),
        }
    }

    /// Key of the handler currently in control
    pub fn active(&self) -> &HandlerKey {
        &self.active
    }

    /// Run until a critical event or the idle deadline.
    ///
    /// Handler errors end the loop and are returned as-is. On a normal end the
    /// active handler is uninitialized before returning.
    pub fn run(&mut self) -> Result<ShutdownReason> {
        self.activate(HandlerKey::Default)?;

        let reason = self.event_loop()?;
        tracing::info!(target: LOG_TARGET, "shutting down: {}", reason);

        // The session is over either way; a failing uninitialize must not
        // hide why it ended.
        if let Err(e) = self.call(|handler, ctx| handler.uninitialize(ctx)) {
            tracing::warn!(target: LOG_TARGET, "uninitialize on shutdown failed: {}", e);
        }
        Ok(reason)
    }

    fn event_loop(&mut self) -> Result<ShutdownReason> {
        loop {
            let now = Instant::now();
            if now >= self.deadline {
                return Ok(ShutdownReason::IdleTimeout);
            }

            let wait = self.deadline - now;
            tracing::debug!(target: LOG_TARGET, "waiting for {:?}", wait);

            let event = match self.events.receive(wait) {
                Received::Event(event) => event,
                // The deadline is re-checked against the monotonic clock
                Received::Timeout => {
                    tracing::debug!(target: LOG_TARGET, "possible timeout");
                    continue;
                }
                Received::Closed => {
                    tracing::warn!(target: LOG_TARGET, "event bus closed");
                    return Ok(ShutdownReason::Interrupted);
                }
            };

            if let Some(reason) = self.critical(&event) {
                tracing::info!(target: LOG_TARGET, "critical: {}", event.description());
                return Ok(reason);
            }

            if let Event::TagPresence { tag: Some(tag) } = &event {
                self.switch_for(tag)?;
            }

            tracing::debug!(target: LOG_TARGET, "{} -> {}", event.description(), self.active);
            let result = self.dispatch(event)?;
            self.apply(result)?;
        }
    }

    fn critical(&self, event: &Event) -> Option<ShutdownReason> {
        match event {
            Event::Interrupt => Some(ShutdownReason::Interrupted),
            Event::AudioFault => Some(ShutdownReason::AudioFault),
            Event::ButtonPress {
                source: ButtonSource::Power,
                ..
            } => Some(ShutdownReason::PowerButton),
            Event::TagPresence { tag: Some(tag) } if Some(tag) == self.interrupt_tag.as_ref() => {
                Some(ShutdownReason::InterruptTag)
            }
            _ => None,
        }
    }

    /// Switch to the tag's own handler if it has one and isn't already active
    fn switch_for(&mut self, tag: &TagId) -> Result<()> {
        if !self.registry.contains(tag) {
            return Ok(());
        }

        let key = HandlerKey::Tag(tag.clone());
        if self.active == key {
            tracing::debug!(target: LOG_TARGET, "handler for {} already active", tag);
            return Ok(());
        }

        self.call(|handler, ctx| handler.uninitialize(ctx))?;
        self.activate(key)
    }

    fn activate(&mut self, key: HandlerKey) -> Result<()> {
        tracing::info!(target: LOG_TARGET, "activating handler for {}", key);
        self.active = key;
        let timeout = self.call(|handler, ctx| handler.initialize(ctx))?;
        self.extend(timeout);
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<TimeoutResult> {
        match event {
            Event::TagPresence { tag } => self.call(|handler, ctx| handler.on_tag(ctx, tag.as_ref())),
            Event::TiltChanged { x, y } => self.call(|handler, ctx| handler.on_tilt(ctx, x, y)),
            Event::SongStopped => self.call(|handler, ctx| handler.on_player_stopped(ctx)),
            Event::ButtonPress {
                source,
                duration_ms,
            } => self.call(|handler, ctx| handler.on_button(ctx, source, duration_ms)),
            // Critical events never get here
            Event::Interrupt | Event::AudioFault => Ok(TimeoutResult::Unchanged),
        }
    }

    fn apply(&mut self, result: TimeoutResult) -> Result<()> {
        match result {
            TimeoutResult::Unchanged => {
                tracing::debug!(target: LOG_TARGET, "not changing the timeout");
                Ok(())
            }
            TimeoutResult::ExtendBy(timeout) => {
                self.extend(timeout);
                Ok(())
            }
            TimeoutResult::Done => {
                tracing::debug!(target: LOG_TARGET, "handler {} is done", self.active);
                self.call(|handler, ctx| handler.uninitialize(ctx))?;
                self.activate(HandlerKey::Default)
            }
        }
    }

    fn extend(&mut self, timeout: Duration) {
        tracing::debug!(target: LOG_TARGET, "deadline in {:?}", timeout);
        self.deadline = Instant::now() + timeout;
    }

    /// Run `f` against the active handler
    fn call<T>(
        &mut self,
        f: impl FnOnce(&mut dyn Handler, &mut HandlerContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let handler = self.registry.get(&self.active)?;
        let mut ctx = HandlerContext {
            leds: self.leds,
            player: &mut *self.player,
        };
        f(handler, &mut ctx)
    }
}
