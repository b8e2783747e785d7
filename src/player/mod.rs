/// Audio playback
///
/// [`AudioControl`] is the surface handlers see; [`Mpg123Player`] drives the
/// real decoder subprocess over its line-based remote protocol.
use std::path::Path;

use crate::error::Result;

pub mod mpg123;
pub mod protocol;
pub mod state;

pub use mpg123::Mpg123Player;
pub use state::{PlaybackPosition, PlayerState};

/// Synchronous playback commands.
///
/// Every call returns only after the decoder confirmed it (or the IPC timeout
/// fired). Getters report decoder-confirmed values.
pub trait AudioControl: Send {
    /// Load a file paused at position 0. A no-op if it is already loaded.
    fn load(&mut self, path: &Path) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Volume in percent, 0-100
    fn set_volume(&mut self, volume: u32) -> Result<()>;

    fn volume(&self) -> Option<u32>;

    /// Pitch in percent, 50-200; recorded and applied on the next load when
    /// nothing is loaded
    fn set_pitch(&mut self, pitch: u32) -> Result<()>;

    fn pitch(&self) -> u32;

    fn position_ms(&mut self) -> Result<u64>;

    fn set_position_ms(&mut self, position_ms: u64) -> Result<()>;

    /// Length of the loaded track; 0 if unknown
    fn track_length_ms(&self) -> u64;

    fn state(&self) -> PlayerState;

    fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }
}
