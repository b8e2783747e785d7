/// Hardware event producers
///
/// Each producer runs on its own thread (buttons run on the GPIO layer's) and
/// only ever talks to the rest of the box through an [`EventPublisher`].
///
/// [`EventPublisher`]: crate::messaging::EventPublisher

pub mod buttons;
pub mod mpu6050;
pub mod rfid;
mod serial;
pub mod tilt;

pub use buttons::ButtonPublisher;
pub use mpu6050::Mpu6050;
pub use rfid::{RfidReader, TagTracker};
pub use tilt::{Accelerometer, TiltMonitor};
