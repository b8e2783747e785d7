/// Appliance lifecycle
///
/// Owns every subsystem for the lifetime of the process: wires them to the
/// bus on start, hands them to the dispatcher while running and releases
/// them in a fixed order on shutdown.
use std::path::Path;
use std::time::{Duration, Instant};

use crate::animation::LedStrip;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, ShutdownReason};
use crate::error::Result;
use crate::handlers::HandlerRegistry;
use crate::library::MusicLibrary;
use crate::messaging::{self, Event, EventPublisher, EventReceiver, Received};
use crate::player::{AudioControl, Mpg123Player};
use crate::producers::{ButtonPublisher, Mpu6050, RfidReader, TiltMonitor};

const LOG_TARGET: &str = "tagbox::app";

/// Fallback limit when the decoder could not tell the sound's length
const SOUND_WAIT_FALLBACK: Duration = Duration::from_secs(10);

/// Upper bound for the shutdown sound to finish
const SHUTDOWN_SOUND_LIMIT: Duration = Duration::from_secs(4);

/// Lets late presses and the startup sound's stop notice arrive before the
/// queue is emptied
const SETTLE_TIME: Duration = Duration::from_millis(100);

pub struct Appliance {
    config: Config,
    publisher: EventPublisher,
    events: EventReceiver,
    leds: LedStrip,
    player: Mpg123Player,
    tilt: Option<TiltMonitor>,
    rfid: Option<RfidReader>,
    buttons: Option<ButtonPublisher>,
}

impl Appliance {
    /// Bring up all subsystems and play the startup cue
    pub fn start(config: Config) -> Result<Self> {
        tracing::info!(target: LOG_TARGET, "starting");
        let (publisher, events) = messaging::channel();

        let leds = LedStrip::open(&config.leds, Some(publisher.clone()))?;
        let player = Mpg123Player::spawn(&config.audio, publisher.clone())?;
        // No GPIO driver lives in this crate: an external edge source reports
        // presses through `Appliance::buttons()`.
        let buttons = ButtonPublisher::new(publisher.clone());

        let mut appliance = Self {
            config,
            publisher,
            events,
            leds,
            player,
            tilt: None,
            rfid: None,
            buttons: Some(buttons),
        };

        appliance.startup_cue()?;
        appliance.start_producers()?;

        tracing::info!(target: LOG_TARGET, "started");
        Ok(appliance)
    }

    /// Publisher for outside producers such as a signal handler
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Handle for the GPIO edge callbacks; `None` after shutdown
    pub fn buttons(&self) -> Option<ButtonPublisher> {
        self.buttons.clone()
    }

    fn startup_cue(&mut self) -> Result<()> {
        let sound = self.config.audio.startup_sound.clone();
        self.player.set_volume(self.config.audio.system_volume)?;

        self.leds.startup();
        match self.play_sound(&sound) {
            Ok(limit) => self.wait_for_song_end(limit),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!(target: LOG_TARGET, "no startup sound: {}", e),
        }

        // The sound left the player stopped; music starts from a clean slate
        self.player.set_volume(self.config.audio.default_volume)?;

        std::thread::sleep(SETTLE_TIME);
        let dropped = self.events.drain();
        tracing::debug!(target: LOG_TARGET, "dropped {} events queued during startup", dropped);
        Ok(())
    }

    fn start_producers(&mut self) -> Result<()> {
        let tilt = &self.config.tilt;
        if tilt.enabled {
            let sensor = Mpu6050::open(&tilt.i2c_device)?;
            self.tilt = Some(TiltMonitor::spawn(
                Box::new(sensor),
                tilt,
                self.publisher.clone(),
            )?);
        } else {
            tracing::info!(target: LOG_TARGET, "tilt sensor disabled");
        }

        let rfid = &self.config.rfid;
        if rfid.enabled {
            self.rfid = Some(RfidReader::open(&rfid.device, self.publisher.clone())?);
        } else {
            tracing::info!(target: LOG_TARGET, "RFID reader disabled");
        }

        Ok(())
    }

    /// Load and start a system sound; returns how long to wait for it at most
    fn play_sound(&mut self, path: &Path) -> Result<Duration> {
        self.player.load(path)?;
        self.player.play()?;

        let length = self.player.track_length_ms();
        Ok(if length == 0 {
            SOUND_WAIT_FALLBACK
        } else {
            Duration::from_millis(length) + Duration::from_secs(1)
        })
    }

    /// Block until the player reports the end of the song or `limit` passes
    fn wait_for_song_end(&self, limit: Duration) {
        let deadline = Instant::now() + limit;
        loop {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(target: LOG_TARGET, "sound still playing after {:?}", limit);
                return;
            }
            match self.events.receive(deadline - now) {
                Received::Event(Event::SongStopped) => return,
                Received::Event(Event::AudioFault) | Received::Closed => return,
                Received::Event(event) => {
                    tracing::debug!(target: LOG_TARGET, "ignoring {}", event.description());
                }
                Received::Timeout => {}
            }
        }
    }

    /// Run the dispatcher until a critical event or the idle timeout
    pub fn run(&mut self) -> Result<ShutdownReason> {
        let library = match MusicLibrary::scan(&self.config.tags.music_root) {
            Ok(library) => {
                tracing::info!(target: LOG_TARGET, "music library holds {} tags", library.len());
                library
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, "music library unusable, starting empty: {}", e);
                MusicLibrary::default()
            }
        };

        let registry = HandlerRegistry::from_config(&self.config, library);
        let mut dispatcher = Dispatcher::new(
            &self.events,
            registry,
            &self.leds,
            &mut self.player,
            self.config.tags.interrupt_tag.clone(),
        );
        dispatcher.run()
    }

    /// Release every subsystem. Each step runs even if earlier ones failed.
    pub fn shutdown(&mut self) {
        tracing::info!(target: LOG_TARGET, "shutting down");

        let sound_limit = match self.shutdown_cue() {
            Ok(limit) => Some(limit),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, "shutdown sound failed: {}", e);
                None
            }
        };

        self.leds.shutdown();
        if let Some(limit) = sound_limit {
            self.wait_for_song_end(limit.min(SHUTDOWN_SOUND_LIMIT));
        }

        if let Some(mut tilt) = self.tilt.take() {
            if let Err(e) = tilt.terminate() {
                tracing::warn!(target: LOG_TARGET, "tilt monitor: {}", e);
            }
        }

        if let Err(e) = self.player.terminate() {
            tracing::warn!(target: LOG_TARGET, "audio driver: {}", e);
        }

        if let Some(mut rfid) = self.rfid.take() {
            rfid.terminate();
        }

        if let Err(e) = self.leds.terminate() {
            tracing::warn!(target: LOG_TARGET, "LED strip: {}", e);
        }

        if self.buttons.take().is_some() {
            tracing::debug!(target: LOG_TARGET, "buttons released");
        }

        tracing::info!(target: LOG_TARGET, "shutdown complete");
    }

    fn shutdown_cue(&mut self) -> Result<Duration> {
        self.events.drain();
        self.player.set_volume(self.config.audio.system_volume)?;
        self.player.set_pitch(100)?;

        let sound = self.config.audio.shutdown_sound.clone();
        self.play_sound(&sound)
    }
}
