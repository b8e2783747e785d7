/// Default handler: plays the album bound to whichever tag is placed
///
/// Buttons while playing:
/// - blue: restart the song, or go to the previous one near its start
/// - yellow: next song
/// - green / red: step volume (or pitch, while tilted) down / up
///
/// Playback positions are bookmarked per tag in memory when the tag is
/// removed and resumed when it comes back.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{Handler, HandlerContext, TimeoutResult};
use crate::animation::Rgb;
use crate::error::Result;
use crate::library::MusicLibrary;
use crate::messaging::ButtonSource;
use crate::player::PlayerState;
use crate::tag::TagId;

const LOG_TARGET: &str = "tagbox::music";

pub const VOLUMES: [u32; 10] = [1, 2, 3, 5, 7, 9, 12, 15, 18, 22];
pub const PITCHES: [u32; 10] = [55, 70, 85, 100, 115, 130, 145, 160, 175, 190];

/// Within this many milliseconds of the start, blue goes to the previous song
const RESTART_THRESHOLD_MS: u64 = 2_000;

/// Tilt angle (x axis) above which green/red change the pitch
const PITCH_TILT_DEGREES: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Volume,
    Pitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Bookmark {
    song: usize,
    position_ms: u64,
}

#[derive(Debug)]
struct Playlist {
    tag: TagId,
    songs: Vec<PathBuf>,
    index: usize,
}

impl Playlist {
    fn current(&self) -> &PathBuf {
        &self.songs[self.index]
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % self.songs.len();
    }

    fn back(&mut self) {
        self.index = (self.index + self.songs.len() - 1) % self.songs.len();
    }
}

pub struct MusicHandler {
    library: Arc<MusicLibrary>,
    playing_timeout: Duration,
    idle_timeout: Duration,

    controlling: Control,
    playlist: Option<Playlist>,
    bookmarks: HashMap<TagId, Bookmark>,

    /// Set before a deliberate stop so its `SongStopped` is not taken as
    /// the end of a song
    expected_stop: bool,
}

impl MusicHandler {
    pub fn new(library: Arc<MusicLibrary>, playing_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            library,
            playing_timeout,
            idle_timeout,
            controlling: Control::Volume,
            playlist: None,
            bookmarks: HashMap::new(),
            expected_stop: false,
        }
    }

    fn timeout(&self) -> TimeoutResult {
        match self.playlist {
            Some(_) => TimeoutResult::ExtendBy(self.playing_timeout),
            None => TimeoutResult::ExtendBy(self.idle_timeout),
        }
    }

    fn show_position(&self, ctx: &HandlerContext<'_>, forward: bool) {
        let Some(playlist) = &self.playlist else {
            return;
        };
        if playlist.songs.len() == 1 {
            ctx.leds.fade(Rgb::GREEN);
        } else {
            ctx.leds
                .track_progress(playlist.index, playlist.songs.len(), forward);
        }
    }

    fn play_current(&mut self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        if let Some(playlist) = &self.playlist {
            ctx.player.load(playlist.current())?;
            ctx.player.play()?;
        }
        Ok(())
    }

    /// Pause, remember where we were and stop; the playlist is dropped
    fn put_away(&mut self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let Some(playlist) = self.playlist.take() else {
            return Ok(());
        };

        if ctx.player.state() != PlayerState::Stopped {
            ctx.player.pause()?;
        }

        // A song that just ended left nothing loaded to query
        let stopped = ctx.player.state() == PlayerState::Stopped;
        let position_ms = if stopped { 0 } else { ctx.player.position_ms()? };
        tracing::debug!(
            target: LOG_TARGET,
            "bookmark {}: song {} at {}ms",
            playlist.tag,
            playlist.index,
            position_ms
        );
        self.bookmarks.insert(
            playlist.tag,
            Bookmark {
                song: playlist.index,
                position_ms,
            },
        );

        if !stopped {
            self.expected_stop = true;
            ctx.player.stop()?;
        }
        Ok(())
    }

    fn tag_placed(&mut self, ctx: &mut HandlerContext<'_>, tag: &TagId) -> Result<TimeoutResult> {
        let library = Arc::clone(&self.library);
        let Some(songs) = library.songs(tag).filter(|songs| !songs.is_empty()) else {
            tracing::warn!(target: LOG_TARGET, "no music for tag {}", tag);
            return Ok(TimeoutResult::Unchanged);
        };

        self.put_away(ctx)?;

        let bookmark = self.bookmarks.get(tag).copied().unwrap_or_default();
        let index = if bookmark.song < songs.len() { bookmark.song } else { 0 };
        tracing::debug!(target: LOG_TARGET, "tag {}: {} songs, resuming song {}", tag, songs.len(), index);

        let playlist = Playlist {
            tag: tag.clone(),
            songs: songs.to_vec(),
            index,
        };
        ctx.player.load(playlist.current())?;
        if bookmark.position_ms != 0 && index == bookmark.song {
            ctx.player.set_position_ms(bookmark.position_ms)?;
        }
        self.playlist = Some(playlist);

        self.show_position(ctx, true);
        ctx.player.play()?;
        Ok(TimeoutResult::ExtendBy(self.playing_timeout))
    }

    fn tag_removed(&mut self, ctx: &mut HandlerContext<'_>) -> Result<TimeoutResult> {
        tracing::debug!(target: LOG_TARGET, "tag removed");
        if self.playlist.is_some() {
            ctx.leds.fade(Rgb::RED);
            self.put_away(ctx)?;
        }
        Ok(TimeoutResult::ExtendBy(self.idle_timeout))
    }

    fn step_value(&mut self, ctx: &mut HandlerContext<'_>, up: bool) -> Result<()> {
        let (table, current) = match self.controlling {
            Control::Volume => (&VOLUMES, ctx.player.volume().unwrap_or(VOLUMES[0])),
            Control::Pitch => (&PITCHES, ctx.player.pitch()),
        };

        let mut index = table_index(table, current);
        let next = if up { index.checked_add(1) } else { index.checked_sub(1) };

        match next.filter(|&next| next < table.len()) {
            Some(next) => {
                match self.controlling {
                    Control::Volume => {
                        tracing::debug!(target: LOG_TARGET, "new volume: {}", table[next]);
                        ctx.player.set_volume(table[next])?;
                    }
                    Control::Pitch => {
                        tracing::debug!(target: LOG_TARGET, "new pitch: {}", table[next]);
                        ctx.player.set_pitch(table[next])?;
                    }
                }
                index = next;
            }
            None => tracing::debug!(target: LOG_TARGET, "would be out of bounds"),
        }

        ctx.leds.volume(index);
        Ok(())
    }
}

/// Position of `value` in `table`, or of the first larger entry
fn table_index(table: &[u32], value: u32) -> usize {
    table
        .iter()
        .position(|&entry| entry >= value)
        .unwrap_or(table.len() - 1)
}

impl Handler for MusicHandler {
    fn name(&self) -> &'static str {
        "music"
    }

    fn initialize(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<Duration> {
        tracing::debug!(target: LOG_TARGET, "init");
        // A stop from our last uninitialize went to whoever was active then
        self.expected_stop = false;
        Ok(self.idle_timeout)
    }

    fn uninitialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<()> {
        tracing::debug!(target: LOG_TARGET, "uninitialize");
        self.put_away(ctx)
    }

    fn on_tag(&mut self, ctx: &mut HandlerContext<'_>, tag: Option<&TagId>) -> Result<TimeoutResult> {
        match tag {
            Some(tag) => self.tag_placed(ctx, tag),
            None => self.tag_removed(ctx),
        }
    }

    fn on_tilt(&mut self, ctx: &mut HandlerContext<'_>, x: f64, _y: f64) -> Result<TimeoutResult> {
        match self.controlling {
            Control::Volume if x > PITCH_TILT_DEGREES => {
                self.controlling = Control::Pitch;
                ctx.leds.fade(Rgb::YELLOW);
                tracing::debug!(target: LOG_TARGET, "now controlling pitch");
            }
            Control::Pitch if x <= PITCH_TILT_DEGREES => {
                self.controlling = Control::Volume;
                ctx.leds.fade(Rgb::BLUE);
                tracing::debug!(target: LOG_TARGET, "now controlling volume");
            }
            _ => {}
        }
        Ok(TimeoutResult::Unchanged)
    }

    fn on_player_stopped(&mut self, ctx: &mut HandlerContext<'_>) -> Result<TimeoutResult> {
        if self.expected_stop {
            self.expected_stop = false;
            tracing::debug!(target: LOG_TARGET, "ignoring expected stop");
            return Ok(TimeoutResult::Unchanged);
        }

        let Some(playlist) = self.playlist.as_mut() else {
            return Ok(TimeoutResult::Unchanged);
        };
        playlist.advance();

        self.show_position(ctx, true);
        self.play_current(ctx)?;
        Ok(TimeoutResult::Unchanged)
    }

    fn on_button(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        source: ButtonSource,
        _duration_ms: u64,
    ) -> Result<TimeoutResult> {
        tracing::debug!(target: LOG_TARGET, "button: {}", source);

        match source {
            ButtonSource::Blue | ButtonSource::Yellow if !ctx.player.is_playing() => {
                tracing::debug!(target: LOG_TARGET, "player is not playing, ignore");
            }
            ButtonSource::Blue => {
                let position = ctx.player.position_ms()?;
                tracing::debug!(target: LOG_TARGET, "pos={}", position);

                if position > RESTART_THRESHOLD_MS {
                    ctx.player.set_position_ms(0)?;
                } else if let Some(playlist) = self.playlist.as_mut() {
                    playlist.back();
                    self.expected_stop = true;
                    ctx.player.stop()?;
                    self.play_current(ctx)?;
                }
                self.show_position(ctx, false);
            }
            ButtonSource::Yellow => {
                if let Some(playlist) = self.playlist.as_mut() {
                    playlist.advance();
                    self.expected_stop = true;
                    ctx.player.stop()?;
                    self.play_current(ctx)?;
                }
                self.show_position(ctx, true);
            }
            ButtonSource::Green => self.step_value(ctx, false)?,
            ButtonSource::Red => self.step_value(ctx, true)?,
            ButtonSource::Power => {}
        }

        Ok(self.timeout())
    }
}
