/// Messaging module for the control core
///
/// Hardware producers publish [`Event`]s; the dispatcher is the only
/// consumer.
///
/// ## Architecture
///
/// ```text
/// ┌─────────┐
/// │ Buttons │──┐
/// └─────────┘  │
/// ┌─────────┐  │   publish    ┌───────────┐   receive(timeout)   ┌────────────┐
/// │  RFID   │──┼────────────> │ Event Bus │ ───────────────────> │ Dispatcher │
/// └─────────┘  │              └───────────┘                      └────────────┘
/// ┌─────────┐  │                    ▲                                  │
/// │  Tilt   │──┘                    │ SongStopped / AudioFault         │ commands
/// └─────────┘                 ┌─────────────┐ <────────────────────────┘
///                             │ Audio driver│
///                             └─────────────┘
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let (publisher, receiver) = messaging::channel();
///
/// // Producers keep a clone of the publisher
/// publisher.publish(Event::TagPresence { tag: None });
///
/// // The dispatcher waits with an explicit timeout
/// match receiver.receive(Duration::from_secs(5)) {
///     Received::Event(event) => { /* route */ }
///     Received::Timeout => { /* re-check deadline */ }
///     Received::Closed => { /* all producers gone */ }
/// }
/// ```

pub mod bus;
pub mod events;

// Re-export commonly used types
pub use bus::{channel, EventPublisher, EventReceiver, Received};
pub use events::{ButtonSource, Event};
