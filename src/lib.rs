//! Control core of an RFID tag-triggered audio box.
//!
//! Hardware producers (RFID reader, buttons, tilt sensor, the decoder's
//! reader thread) publish [`messaging::Event`]s onto one bus. The
//! [`dispatcher::Dispatcher`] consumes them on a single thread and routes
//! them to the active [`handlers::Handler`], which drives the
//! [`animation::LedStrip`] and an [`player::AudioControl`].

pub mod animation;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod library;
pub mod messaging;
pub mod player;
pub mod producers;
pub mod tag;

pub use app::Appliance;
pub use config::Config;
pub use dispatcher::{Dispatcher, ShutdownReason};
pub use error::{CoreError, ErrorKind, Result};
pub use tag::TagId;
