/// Handler contract
///
/// A handler is the active "mode" of the box. The dispatcher owns exactly one
/// active handler and forwards every non-critical event to it; each callback
/// tells the dispatcher what to do with the idle deadline.
use std::time::Duration;

use crate::animation::LedStrip;
use crate::error::Result;
use crate::messaging::ButtonSource;
use crate::player::AudioControl;
use crate::tag::TagId;

pub mod button_light;
pub mod music;
pub mod rainbow;
pub mod registry;

pub use button_light::ButtonLightHandler;
pub use music::MusicHandler;
pub use rainbow::RainbowHandler;
pub use registry::{factory, HandlerFactory, HandlerKey, HandlerRegistry};

/// What a callback wants done with the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutResult {
    /// Keep the current deadline
    Unchanged,
    /// Deadline = now + duration
    ExtendBy(Duration),
    /// Hand control back to the default handler
    Done,
}

/// Services a handler may drive. Only ever built on the dispatcher thread.
pub struct HandlerContext<'a> {
    pub leds: &'a LedStrip,
    pub player: &'a mut dyn AudioControl,
}

/// Callbacks a handler implements; all but `initialize` default to doing nothing
pub trait Handler: Send {
    fn name(&self) -> &'static str;

    /// Called when the handler becomes active; returns the initial idle timeout
    fn initialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<Duration>;

    /// Called before another handler becomes active, and on shutdown
    fn uninitialize(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    /// A tag was placed (`Some`) or removed (`None`)
    fn on_tag(&mut self, _ctx: &mut HandlerContext<'_>, _tag: Option<&TagId>) -> Result<TimeoutResult> {
        Ok(TimeoutResult::Unchanged)
    }

    fn on_tilt(&mut self, _ctx: &mut HandlerContext<'_>, _x: f64, _y: f64) -> Result<TimeoutResult> {
        Ok(TimeoutResult::Unchanged)
    }

    fn on_player_stopped(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<TimeoutResult> {
        Ok(TimeoutResult::Unchanged)
    }

    fn on_button(
        &mut self,
        _ctx: &mut HandlerContext<'_>,
        _source: ButtonSource,
        _duration_ms: u64,
    ) -> Result<TimeoutResult> {
        Ok(TimeoutResult::Unchanged)
    }
}
