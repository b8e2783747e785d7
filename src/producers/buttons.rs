/// Button events
///
/// Edge detection and debouncing live in the GPIO layer; it only needs a
/// [`ButtonPublisher`] to report a finished press.
use crate::error::{CoreError, Result};
use crate::messaging::{ButtonSource, Event, EventPublisher};

/// BCM pin numbers of the buttons
pub const POWER_PIN: u8 = 17;
pub const YELLOW_PIN: u8 = 5;
pub const BLUE_PIN: u8 = 6;
pub const RED_PIN: u8 = 13;
pub const GREEN_PIN: u8 = 26;

/// Button wired to `pin`, if any
pub fn source_for_pin(pin: u8) -> Option<ButtonSource> {
    match pin {
        POWER_PIN => Some(ButtonSource::Power),
        YELLOW_PIN => Some(ButtonSource::Yellow),
        BLUE_PIN => Some(ButtonSource::Blue),
        RED_PIN => Some(ButtonSource::Red),
        GREEN_PIN => Some(ButtonSource::Green),
        _ => None,
    }
}

/// Cloneable handle for the GPIO edge callbacks
#[derive(Debug, Clone)]
pub struct ButtonPublisher {
    events: EventPublisher,
}

impl ButtonPublisher {
    pub fn new(events: EventPublisher) -> Self {
        Self { events }
    }

    pub fn press(&self, source: ButtonSource, duration_ms: u64) {
        tracing::debug!("button {} ({}ms)", source, duration_ms);
        self.events.publish(Event::ButtonPress {
            source,
            duration_ms,
        });
    }

    /// Report a press by BCM pin number; unmapped pins publish nothing
    pub fn press_pin(&self, pin: u8, duration_ms: u64) -> Result<()> {
        let source = source_for_pin(pin)
            .ok_or_else(|| CoreError::UnknownEvent(format!("button on unmapped pin {}", pin)))?;
        self.press(source, duration_ms);
        Ok(())
    }
}
