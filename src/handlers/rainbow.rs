use std::time::Duration;

use super::{Handler, HandlerContext, TimeoutResult};
use crate::error::Result;
use crate::tag::TagId;

const LOG_TARGET: &str = "tagbox::rainbow";

/// Ambient light mode: a rainbow for as long as its tag is in place
pub struct RainbowHandler {
    timeout: Duration,
}

impl RainbowHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Handler for RainbowHandler {
    fn name(&self) -> &'static str {
        "rainbow"
    }

    fn initialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<Duration> {
        tracing::debug!(target: LOG_TARGET, "init");
        ctx.leds.rainbow();
        Ok(self.timeout)
    }

    fn uninitialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        ctx.leds.clear();
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
}
