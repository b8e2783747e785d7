use std::time::Duration;

use super::{Handler, HandlerContext, TimeoutResult};
use crate::animation::Rgb;
use crate::error::Result;
use crate::messaging::ButtonSource;
use crate::tag::TagId;

const LOG_TARGET: &str = "tagbox::button_light";

/// Every colour button flashes the strip in its own colour
pub struct ButtonLightHandler {
    timeout: Duration,
}

impl ButtonLightHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn button_color(source: ButtonSource) -> Option<Rgb> {
    match source {
        ButtonSource::Blue => Some(Rgb::BLUE),
        ButtonSource::Red => Some(Rgb::RED),
        ButtonSource::Green => Some(Rgb::GREEN),
        ButtonSource::Yellow => Some(Rgb::YELLOW),
        ButtonSource::Power => None,
    }
}

impl Handler for ButtonLightHandler {
    fn name(&self) -> &'static str {
        "button_light"
    }

    fn initialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<Duration> {
        ctx.leds.fade(Rgb::WHITE);
        tracing::debug!(target: LOG_TARGET, "init");
        Ok(self.timeout)
    }

    fn uninitialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        ctx.leds.fade(Rgb::WHITE);
        tracing::debug!(target: LOG_TARGET, "uninit");
        Ok(())
    }

    fn on_tag(&mut self, _ctx: &mut HandlerContext<'_>, tag: Option<&TagId>) -> Result<TimeoutResult> {
        tracing::debug!(target: LOG_TARGET, "tag: {:?}", tag);
        Ok(match tag {
            None => TimeoutResult::Done,
            Some(_) => TimeoutResult::Unchanged,
        })
    }

    fn on_button(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        source: ButtonSource,
        _duration_ms: u64,
    ) -> Result<TimeoutResult> {
        if let Some(color) = button_color(source) {
            ctx.leds.fade(color);
        }
        Ok(TimeoutResult::ExtendBy(self.timeout))
    }
}
