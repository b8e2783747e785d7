/// mpg123 remote-control protocol
///
/// Outbound commands are single text lines. Inbound lines start with an `@`
/// token; only the prefixes listed in [`DecoderMessage`] matter, everything
/// else (`@I` tags, `@F` frame spam) is ignored.
use std::fmt;
use std::path::Path;

/// Play state as reported by `@P`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedState {
    Stopped,
    Paused,
    Playing,
}

/// Parsed inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderMessage {
    /// `@R MPG123 ...`
    Ready,
    /// `@P 0|1|2`
    State(ReportedState),
    /// `@SAMPLE <current> <total>`
    Sample { current: u64, total: u64 },
    /// `@S <version> <layer> <rate> ...`
    StreamInfo { sample_rate: u32 },
    /// `@K <sample>`
    SeekAck,
    /// `@V <percent>%`
    Volume(f64),
    /// `@PITCH <factor>` where 0.0 is normal speed
    Pitch(f64),
    /// `@E <message>`
    Error(String),
}

/// Which reply a command waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `@P` reporting this particular state
    State(ReportedState),
    Sample,
    Seek,
    Volume,
    Pitch,
}

impl DecoderMessage {
    /// Parse one line. Unrecognized or malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();

        if line.starts_with("@R ") || line == "@R" {
            return Some(DecoderMessage::Ready);
        }
        if let Some(rest) = line.strip_prefix("@E ") {
            return Some(DecoderMessage::Error(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("@P ") {
            let state = match rest.trim() {
                "0" => ReportedState::Stopped,
                "1" => ReportedState::Paused,
                "2" => ReportedState::Playing,
                _ => return None,
            };
            return Some(DecoderMessage::State(state));
        }
        if let Some(rest) = line.strip_prefix("@SAMPLE ") {
            let mut fields = rest.split_whitespace();
            let current = fields.next()?.parse().ok()?;
            let total = fields.next()?.parse().ok()?;
            return Some(DecoderMessage::Sample { current, total });
        }
        if let Some(rest) = line.strip_prefix("@S ") {
            let sample_rate = rest.split_whitespace().nth(2)?.parse().ok()?;
            return Some(DecoderMessage::StreamInfo { sample_rate });
        }
        if line.starts_with("@K ") || line == "@K" {
            return Some(DecoderMessage::SeekAck);
        }
        if let Some(rest) = line.strip_prefix("@V ") {
            let percent = rest.split('%').next()?.trim().parse().ok()?;
            return Some(DecoderMessage::Volume(percent));
        }
        if let Some(rest) = line.strip_prefix("@PITCH ") {
            let factor = rest.split_whitespace().next()?.parse().ok()?;
            return Some(DecoderMessage::Pitch(factor));
        }

        None
    }

    /// The reply class this message satisfies, if any
    pub fn reply(&self) -> Option<Reply> {
        match self {
            DecoderMessage::State(state) => Some(Reply::State(*state)),
            DecoderMessage::Sample { .. } => Some(Reply::Sample),
            DecoderMessage::SeekAck => Some(Reply::Seek),
            DecoderMessage::Volume(_) => Some(Reply::Volume),
            DecoderMessage::Pitch(_) => Some(Reply::Pitch),
            DecoderMessage::Ready
            | DecoderMessage::StreamInfo { .. }
            | DecoderMessage::Error(_) => None,
        }
    }
}

/// Outbound command
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderCommand<'a> {
    Silence,
    Volume(u32),
    Pitch(u32),
    LoadPaused(&'a Path),
    /// Play/pause toggle, carrying the state it should end in
    Toggle(ReportedState),
    Stop,
    Sample,
    Seek(u64),
    Quit,
}

impl DecoderCommand<'_> {
    /// Reply to wait for; `None` for fire-and-forget commands
    pub fn expects(&self) -> Option<Reply> {
        match self {
            DecoderCommand::Silence | DecoderCommand::Quit => None,
            DecoderCommand::Volume(_) => Some(Reply::Volume),
            DecoderCommand::Pitch(_) => Some(Reply::Pitch),
            DecoderCommand::LoadPaused(_) => Some(Reply::State(ReportedState::Paused)),
            DecoderCommand::Toggle(to) => Some(Reply::State(*to)),
            DecoderCommand::Stop => Some(Reply::State(ReportedState::Stopped)),
            DecoderCommand::Sample => Some(Reply::Sample),
            DecoderCommand::Seek(_) => Some(Reply::Seek),
        }
    }

    /// Whether an `@E` while this command is pending means it was refused
    pub fn may_be_rejected(&self) -> bool {
        matches!(self, DecoderCommand::LoadPaused(_))
    }

    /// Whether the track ending on its own makes the command moot
    pub fn moot_when_stopped(&self) -> bool {
        matches!(self, DecoderCommand::Toggle(_))
    }
}

impl fmt::Display for DecoderCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderCommand::Silence => write!(f, "SILENCE"),
            DecoderCommand::Volume(volume) => write!(f, "V {}", volume),
            DecoderCommand::Pitch(pitch) => write!(f, "PITCH {:.6}", pitch_to_factor(*pitch)),
            DecoderCommand::LoadPaused(path) => write!(f, "LP {}", path.display()),
            DecoderCommand::Toggle(_) => write!(f, "P"),
            DecoderCommand::Stop => write!(f, "S"),
            DecoderCommand::Sample => write!(f, "SAMPLE"),
            DecoderCommand::Seek(sample) => write!(f, "K {}", sample),
            DecoderCommand::Quit => write!(f, "Q"),
        }
    }
}

/// Percent pitch (100 = normal) to the decoder's speed offset
pub fn pitch_to_factor(pitch: u32) -> f64 {
    pitch as f64 / 100.0 - 1.0
}

/// Decoder speed offset back to percent pitch
pub fn factor_to_pitch(factor: f64) -> u32 {
    ((factor + 1.0) * 100.0).round().max(0.0) as u32
}
