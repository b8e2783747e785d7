use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::command::AnimationCommand;

/// Result of an interruptible frame wait
#[derive(Debug, PartialEq)]
pub enum Wait {
    /// The full interval passed with nothing queued
    Elapsed,
    /// A newer command arrived; the current animation must be abandoned
    Preempted(AnimationCommand),
}

/// Block for up to `interval`, returning early with the next queued command.
///
/// A closed queue counts as a terminate request.
pub fn wait_or_preempt(commands: &Receiver<AnimationCommand>, interval: Duration) -> Wait {
    match commands.recv_timeout(interval) {
        Ok(command) => Wait::Preempted(command),
        Err(RecvTimeoutError::Timeout) => Wait::Elapsed,
        Err(RecvTimeoutError::Disconnected) => Wait::Preempted(AnimationCommand::Terminate),
    }
}
