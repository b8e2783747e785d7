/// Event types for the control core
///
/// Events represent things that have happened (past tense). Each one is
/// produced by exactly one producer thread and consumed exactly once by the
/// dispatcher.
use std::fmt;

use crate::tag::TagId;

/// Bus events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The decoder reported that playback stopped
    SongStopped,

    /// A tag entered the reader field (`Some`) or left it (`None`)
    TagPresence { tag: Option<TagId> },

    /// A button was released after being held for `duration_ms`
    ButtonPress {
        source: ButtonSource,
        duration_ms: u64,
    },

    /// The decoder process died or stopped answering
    AudioFault,

    /// The box was tilted; angles in degrees
    TiltChanged { x: f64, y: f64 },

    /// External interrupt (SIGINT, hardware fault in a producer)
    Interrupt,
}

/// Physical buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonSource {
    Yellow,
    Blue,
    Red,
    Green,
    /// Not a user button: pressing it shuts the box down
    Power,
}

impl fmt::Display for ButtonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonSource::Yellow => write!(f, "YELLOW"),
            ButtonSource::Blue => write!(f, "BLUE"),
            ButtonSource::Red => write!(f, "RED"),
            ButtonSource::Green => write!(f, "GREEN"),
            ButtonSource::Power => write!(f, "POWER"),
        }
    }
}

impl Event {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            Event::SongStopped => "Song stopped".to_string(),
            Event::TagPresence { tag: Some(tag) } => format!("Tag {} present", tag),
            Event::TagPresence { tag: None } => "Tag removed".to_string(),
            Event::ButtonPress {
                source,
                duration_ms,
            } => format!("Button {} pressed for {}ms", source, duration_ms),
            Event::AudioFault => "Audio fault".to_string(),
            Event::TiltChanged { x, y } => format!("Tilt x={:.1} y={:.1}", x, y),
            Event::Interrupt => "Interrupt".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_description() {
        let event = Event::TagPresence { tag: None };
        assert_eq!(event.description(), "Tag removed");

        let event = Event::ButtonPress {
            source: ButtonSource::Green,
            duration_ms: 120,
        };
        assert_eq!(event.description(), "Button GREEN pressed for 120ms");

        let event = Event::TagPresence {
            tag: Some(TagId::new("5500ACB96121").unwrap()),
        };
        assert_eq!(event.description(), "Tag 5500ACB96121 present");
    }
}
