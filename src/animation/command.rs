use super::color::Rgb;

/// Instruction for the animation worker
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationCommand {
    StartupSweep,
    ShutdownSweep,
    /// Loops until preempted
    RainbowLoop,
    /// Volume bar for a table index (0-9)
    VolumeLevel(usize),
    /// Fade the whole strip up to a colour and back down
    Fade(Rgb),
    TrackProgress {
        index: usize,
        total: usize,
        forward: bool,
    },
    Clear,
    /// Stop the worker and blank the strip
    Terminate,
}

impl AnimationCommand {
    pub fn description(&self) -> &'static str {
        match self {
            AnimationCommand::StartupSweep => "STARTUP",
            AnimationCommand::ShutdownSweep => "SHUTDOWN",
            AnimationCommand::RainbowLoop => "RAINBOW",
            AnimationCommand::VolumeLevel(_) => "VOLUME",
            AnimationCommand::Fade(_) => "FADE",
            AnimationCommand::TrackProgress { .. } => "TRACK_PROGRESS",
            AnimationCommand::Clear => "CLEAR",
            AnimationCommand::Terminate => "TERMINATE",
        }
    }
}
