// Integration tests for the tagbox control core
// These drive the public API end to end with in-process fakes for the
// hardware and the decoder process

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tagbox::animation::color::VOLUME_GRADIENT;
use tagbox::animation::{LedDriver, LedStrip, NullDriver, Rgb};
use tagbox::config::{AudioConfig, LedConfig};
use tagbox::error::{CoreError, ErrorKind, Result};
use tagbox::handlers::{factory, Handler, HandlerContext, HandlerRegistry, TimeoutResult};
use tagbox::messaging::{self, ButtonSource, Event, EventPublisher, Received};
use tagbox::player::{AudioControl, Mpg123Player, PlayerState};
use tagbox::producers::ButtonPublisher;
use tagbox::{Dispatcher, ShutdownReason, TagId};

type Log = Arc<Mutex<Vec<String>>>;

const LONG: Duration = Duration::from_secs(30);

/// Handler that writes every callback into a shared log
struct Recording {
    name: &'static str,
    log: Log,
    timeout: Duration,
    done_on_removal: bool,
}

impl Recording {
    fn record(&self, what: String) {
        self.log.lock().push(format!("{}:{}", self.name, what));
    }
}

impl Handler for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<Duration> {
        self.record("init".into());
        Ok(self.timeout)
    }

    fn uninitialize(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        self.record("uninit".into());
        Ok(())
    }

    fn on_tag(&mut self, _ctx: &mut HandlerContext<'_>, tag: Option<&TagId>) -> Result<TimeoutResult> {
        match tag {
            Some(tag) => self.record(format!("tag {}", tag)),
            None => self.record("tag none".into()),
        }
        if tag.is_none() && self.done_on_removal {
            return Ok(TimeoutResult::Done);
        }
        Ok(TimeoutResult::Unchanged)
    }

    fn on_button(
        &mut self,
        _ctx: &mut HandlerContext<'_>,
        source: ButtonSource,
        _duration_ms: u64,
    ) -> Result<TimeoutResult> {
        self.record(format!("button {}", source));
        if source == ButtonSource::Red {
            return Err(CoreError::InvalidState("red button failure"));
        }
        Ok(TimeoutResult::ExtendBy(self.timeout))
    }
}

fn recording(name: &'static str, log: &Log, timeout: Duration, done_on_removal: bool) -> Recording {
    Recording {
        name,
        log: Arc::clone(log),
        timeout,
        done_on_removal,
    }
}

/// Player stand-in that accepts everything
#[derive(Default)]
struct SilentPlayer {
    volume: u32,
    pitch: u32,
    state: PlayerState,
}

impl AudioControl for SilentPlayer {
    fn load(&mut self, _path: &Path) -> Result<()> {
        self.state = PlayerState::Paused;
        Ok(())
    }
    fn play(&mut self) -> Result<()> {
        self.state = PlayerState::Playing;
        Ok(())
    }
    fn pause(&mut self) -> Result<()> {
        self.state = PlayerState::Paused;
        Ok(())
    }
    fn stop(&mut self) -> Result<()> {
        self.state = PlayerState::Stopped;
        Ok(())
    }
    fn set_volume(&mut self, volume: u32) -> Result<()> {
        self.volume = volume;
        Ok(())
    }
    fn volume(&self) -> Option<u32> {
        Some(self.volume)
    }
    fn set_pitch(&mut self, pitch: u32) -> Result<()> {
        self.pitch = pitch;
        Ok(())
    }
    fn pitch(&self) -> u32 {
        self.pitch
    }
    fn position_ms(&mut self) -> Result<u64> {
        Ok(0)
    }
    fn set_position_ms(&mut self, _position_ms: u64) -> Result<()> {
        Ok(())
    }
    fn track_length_ms(&self) -> u64 {
        0
    }
    fn state(&self) -> PlayerState {
        self.state
    }
}

fn tag(raw: &str) -> TagId {
    TagId::new(raw).unwrap()
}

fn headless_strip() -> LedStrip {
    LedStrip::spawn(Box::new(NullDriver), &LedConfig::default(), None).unwrap()
}

/// Registry with a recording default handler and tag `A` bound to handler `a`
fn registry(log: &Log) -> HandlerRegistry {
    let default = {
        let log = Arc::clone(log);
        factory(move || recording("default", &log, LONG, false))
    };
    let mut registry = HandlerRegistry::new(default);

    let log = Arc::clone(log);
    registry.bind(tag(TAG_A), factory(move || recording("a", &log, LONG, true)));
    registry
}

const TAG_A: &str = "5500ACB96121";
const TAG_UNBOUND: &str = "AAAA11112222";
const TAG_INTERRUPT: &str = "5600C7AC4B76";

/// Publish `events` then run a dispatcher over them
fn dispatch(log: &Log, events: Vec<Event>) -> Result<ShutdownReason> {
    let (publisher, receiver) = messaging::channel();
    for event in events {
        publisher.publish(event);
    }

    let leds = headless_strip();
    let mut player = SilentPlayer::default();
    let mut dispatcher = Dispatcher::new(
        &receiver,
        registry(log),
        &leds,
        &mut player,
        Some(tag(TAG_INTERRUPT)),
    );
    dispatcher.run()
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

#[test]
fn test_switch_uninitializes_before_initializing() {
    let log = Log::default();
    let reason = dispatch(
        &log,
        vec![Event::TagPresence { tag: Some(tag(TAG_A)) }, Event::Interrupt],
    )
    .unwrap();

    assert_eq!(reason, ShutdownReason::Interrupted);
    assert_eq!(
        entries(&log),
        vec![
            "default:init",
            "default:uninit",
            "a:init",
            "a:tag 5500ACB96121",
            "a:uninit"
        ]
    );
}

#[test]
fn test_unbound_tag_goes_to_active_handler() {
    let log = Log::default();
    dispatch(
        &log,
        vec![
            Event::TagPresence { tag: Some(tag(TAG_UNBOUND)) },
            Event::Interrupt,
        ],
    )
    .unwrap();

    assert_eq!(
        entries(&log),
        vec!["default:init", "default:tag AAAA11112222", "default:uninit"]
    );
}

#[test]
fn test_same_tag_twice_does_not_switch() {
    let log = Log::default();
    let placed = Event::TagPresence { tag: Some(tag(TAG_A)) };
    dispatch(&log, vec![placed.clone(), placed, Event::Interrupt]).unwrap();

    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| *e == "a:init").count(), 1);
    assert_eq!(log.iter().filter(|e| e.starts_with("a:tag")).count(), 2);
}

#[test]
fn test_done_returns_to_default_handler() {
    let log = Log::default();
    dispatch(
        &log,
        vec![
            Event::TagPresence { tag: Some(tag(TAG_A)) },
            Event::TagPresence { tag: None },
            Event::Interrupt,
        ],
    )
    .unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "default:init",
            "default:uninit",
            "a:init",
            "a:tag 5500ACB96121",
            "a:tag none",
            "a:uninit",
            "default:init",
            "default:uninit"
        ]
    );
}

#[test]
fn test_critical_events_end_the_loop() {
    let cases = [
        (Event::Interrupt, ShutdownReason::Interrupted),
        (Event::AudioFault, ShutdownReason::AudioFault),
        (
            Event::ButtonPress {
                source: ButtonSource::Power,
                duration_ms: 100,
            },
            ShutdownReason::PowerButton,
        ),
        (
            Event::TagPresence { tag: Some(tag(TAG_INTERRUPT)) },
            ShutdownReason::InterruptTag,
        ),
    ];

    for (event, expected) in cases {
        let log = Log::default();
        // Anything queued after the critical event is never delivered
        let reason = dispatch(
            &log,
            vec![
                event,
                Event::ButtonPress {
                    source: ButtonSource::Yellow,
                    duration_ms: 100,
                },
            ],
        )
        .unwrap();

        assert_eq!(reason, expected);
        assert_eq!(entries(&log), vec!["default:init", "default:uninit"]);
    }
}

#[test]
fn test_power_press_from_button_publisher_shuts_down() {
    let (publisher, receiver) = messaging::channel();
    let buttons = ButtonPublisher::new(publisher);
    buttons.press(ButtonSource::Yellow, 80);
    buttons.press(ButtonSource::Power, 1_500);

    let log = Log::default();
    let leds = headless_strip();
    let mut player = SilentPlayer::default();
    let reason = Dispatcher::new(&receiver, registry(&log), &leds, &mut player, None)
        .run()
        .unwrap();

    assert_eq!(reason, ShutdownReason::PowerButton);
    assert_eq!(
        entries(&log),
        vec!["default:init", "default:button YELLOW", "default:uninit"]
    );
}

#[test]
fn test_handler_error_ends_the_loop() {
    let log = Log::default();
    let err = dispatch(
        &log,
        vec![Event::ButtonPress {
            source: ButtonSource::Red,
            duration_ms: 100,
        }],
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    // No uninitialize on the error path
    assert_eq!(entries(&log), vec!["default:init", "default:button RED"]);
}

fn idle_dispatch(log: &Log, initial: Duration, extend: Duration) -> (EventPublisher, thread::JoinHandle<Result<ShutdownReason>>) {
    let (publisher, receiver) = messaging::channel();
    let log = Arc::clone(log);

    let handle = thread::spawn(move || {
        let mut registry = {
            let log = Arc::clone(&log);
            HandlerRegistry::new(factory(move || recording("default", &log, initial, false)))
        };
        // Extensions come from the button handler's own timeout
        registry.bind(tag(TAG_A), factory(move || recording("a", &log, extend, true)));

        let leds = headless_strip();
        let mut player = SilentPlayer::default();
        let mut dispatcher = Dispatcher::new(&receiver, registry, &leds, &mut player, None);
        dispatcher.run()
    });

    (publisher, handle)
}

#[test]
fn test_idle_timeout_fires() {
    let log = Log::default();
    let start = Instant::now();
    let (_publisher, handle) = idle_dispatch(&log, Duration::from_millis(200), LONG);

    assert_eq!(handle.join().unwrap().unwrap(), ShutdownReason::IdleTimeout);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    assert_eq!(entries(&log), vec!["default:init", "default:uninit"]);
}

#[test]
fn test_extend_pushes_the_deadline() {
    let log = Log::default();
    let start = Instant::now();
    let (publisher, handle) =
        idle_dispatch(&log, Duration::from_millis(200), Duration::from_millis(300));

    // Hand control to `a`, which extends by 300ms on every button
    publisher.publish(Event::TagPresence { tag: Some(tag(TAG_A)) });
    for _ in 0..4 {
        thread::sleep(Duration::from_millis(150));
        publisher.publish(Event::ButtonPress {
            source: ButtonSource::Yellow,
            duration_ms: 50,
        });
    }

    assert_eq!(handle.join().unwrap().unwrap(), ShutdownReason::IdleTimeout);
    // Last press at ~600ms plus the 300ms extension
    assert!(start.elapsed() >= Duration::from_millis(850), "{:?}", start.elapsed());
    assert_eq!(
        entries(&log).iter().filter(|e| e.starts_with("a:button")).count(),
        4
    );
}

/// Decoder stand-in on the far side of two socket pairs. Answers the
/// startup handshake and volume changes; everything else goes unanswered.
fn unresponsive_decoder(
    commands: UnixStream,
    mut output: UnixStream,
) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        writeln!(output, "@R MPG123 (unresponsive)").unwrap();

        let mut seen = Vec::new();
        for line in BufReader::new(commands).lines() {
            let Ok(line) = line else { break };
            if let Some(volume) = line.strip_prefix("V ") {
                let _ = writeln!(output, "@V {}.000000%", volume);
            }
            seen.push(line);
        }
        seen
    })
}

fn audio_config() -> AudioConfig {
    AudioConfig {
        startup_timeout_ms: 1_000,
        ipc_timeout_ms: 250,
        ..AudioConfig::default()
    }
}

#[test]
fn test_audio_timeout_is_fatal() {
    let (stdin, commands) = UnixStream::pair().unwrap();
    let (output, stdout) = UnixStream::pair().unwrap();
    let decoder = unresponsive_decoder(commands, output);

    let (publisher, receiver) = messaging::channel();
    let mut player = Mpg123Player::with_channel(stdin, stdout, &audio_config(), publisher).unwrap();
    assert_eq!(player.volume(), Some(2));

    let start = Instant::now();
    let err = player.load(Path::new("/music/song.mp3")).unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.kind(), ErrorKind::IpcTimeout);
    assert!(err.is_fatal());
    assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    assert_eq!(
        receiver.receive(Duration::from_secs(1)),
        Received::Event(Event::AudioFault)
    );

    // The session is over: no retries, not even for answered commands
    assert!(player.set_volume(40).is_err());

    player.terminate().unwrap();
    player.terminate().unwrap();
    assert_eq!(player.state(), PlayerState::Terminated);

    let seen = decoder.join().unwrap();
    assert_eq!(seen.first().map(String::as_str), Some("SILENCE"));
    assert!(seen.contains(&"LP /music/song.mp3".to_string()));
    assert!(!seen.contains(&"V 40".to_string()));
}

/// Decoder stand-in that plays along while a track is loaded, then stops
/// answering play/pause toggles.
fn decoder_quiet_after_load(
    commands: UnixStream,
    mut output: UnixStream,
) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        writeln!(output, "@R MPG123 (quiet after load)").unwrap();

        let mut toggles = 0;
        let mut seen = Vec::new();
        for line in BufReader::new(commands).lines() {
            let Ok(line) = line else { break };
            let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            let reply = match verb {
                "V" => Some(format!("@V {}.000000%", arg)),
                "LP" => Some("@P 1".to_string()),
                "SAMPLE" => Some("@SAMPLE 0 441000".to_string()),
                "K" => Some(format!("@K {}", arg)),
                "PITCH" => Some(format!("@PITCH {}", arg)),
                // Loading plays silently once to learn the length, then pauses
                "P" if toggles == 0 => {
                    Some("@P 2\n@S 1.0 3 44100 Joint-Stereo 0 417 2 0 0 0 320 0 1".to_string())
                }
                "P" if toggles == 1 => Some("@P 1".to_string()),
                _ => None,
            };
            if verb == "P" {
                toggles += 1;
            }
            if let Some(reply) = reply {
                let _ = writeln!(output, "{}", reply);
            }
            seen.push(line);
        }
        seen
    })
}

/// Loads a track when activated and starts it on any button
struct PlaysOnButton {
    log: Log,
}

impl Handler for PlaysOnButton {
    fn name(&self) -> &'static str {
        "player"
    }

    fn initialize(&mut self, ctx: &mut HandlerContext<'_>) -> Result<Duration> {
        self.log.lock().push("player:init".into());
        ctx.player.load(Path::new("/music/song.mp3"))?;
        Ok(LONG)
    }

    fn uninitialize(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<()> {
        self.log.lock().push("player:uninit".into());
        Ok(())
    }

    fn on_button(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        source: ButtonSource,
        _duration_ms: u64,
    ) -> Result<TimeoutResult> {
        self.log.lock().push(format!("player:button {}", source));
        ctx.player.play()?;
        Ok(TimeoutResult::Unchanged)
    }
}

#[test]
fn test_unanswered_play_ends_the_dispatcher() {
    let (stdin, commands) = UnixStream::pair().unwrap();
    let (output, stdout) = UnixStream::pair().unwrap();
    let decoder = decoder_quiet_after_load(commands, output);

    let (publisher, receiver) = messaging::channel();
    let mut player =
        Mpg123Player::with_channel(stdin, stdout, &audio_config(), publisher.clone()).unwrap();

    for source in [ButtonSource::Yellow, ButtonSource::Blue] {
        publisher.publish(Event::ButtonPress {
            source,
            duration_ms: 100,
        });
    }

    let log = Log::default();
    let registry = {
        let log = Arc::clone(&log);
        HandlerRegistry::new(factory(move || PlaysOnButton {
            log: Arc::clone(&log),
        }))
    };
    let leds = headless_strip();

    let start = Instant::now();
    let err = Dispatcher::new(&receiver, registry, &leds, &mut player, None)
        .run()
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.kind(), ErrorKind::IpcTimeout);
    assert!(err.is_fatal());
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    // The loop ended on the first press: no second button, no uninitialize
    assert_eq!(entries(&log), vec!["player:init", "player:button YELLOW"]);

    // The fault was still announced on the bus behind the unread press
    let mut rest = Vec::new();
    while let Received::Event(event) = receiver.receive(Duration::from_millis(200)) {
        rest.push(event);
    }
    assert!(rest.contains(&Event::AudioFault), "{:?}", rest);
    assert_eq!(player.state(), PlayerState::Paused);

    player.terminate().unwrap();
    drop(publisher);
    let seen = decoder.join().unwrap();
    assert_eq!(seen.iter().filter(|line| *line == "P").count(), 3);
}

/// LED driver that keeps every frame
#[derive(Clone, Default)]
struct FrameRecorder {
    frames: Arc<Mutex<Vec<Vec<Rgb>>>>,
}

impl LedDriver for FrameRecorder {
    fn write(&mut self, pixels: &[Rgb]) -> Result<()> {
        self.frames.lock().push(pixels.to_vec());
        Ok(())
    }
}

impl FrameRecorder {
    fn last(&self) -> Vec<Rgb> {
        self.frames.lock().last().cloned().unwrap_or_default()
    }

    fn count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Block until no frame has been drawn for `quiet`
    fn wait_until_idle(&self, quiet: Duration) {
        let give_up = Instant::now() + Duration::from_secs(10);
        let mut seen = self.count();
        let mut since = Instant::now();
        while Instant::now() < give_up {
            thread::sleep(Duration::from_millis(50));
            let now = self.count();
            if now != seen {
                seen = now;
                since = Instant::now();
            } else if since.elapsed() >= quiet {
                return;
            }
        }
        panic!("animation never settled");
    }
}

#[test]
fn test_only_the_last_of_many_commands_completes() {
    let recorder = FrameRecorder::default();
    let mut leds =
        LedStrip::spawn(Box::new(recorder.clone()), &LedConfig::default(), None).unwrap();

    leds.rainbow();
    leds.fade(Rgb::BLUE);
    leds.track_progress(3, 10, true);
    leds.volume(2);

    // Longer than the volume bar's 500ms hold, when no frames are drawn
    recorder.wait_until_idle(Duration::from_millis(800));
    let frames = recorder.frames.lock().clone();

    // The fade never reached full blue
    assert!(!frames
        .iter()
        .any(|frame| frame.iter().all(|pixel| *pixel == Rgb::BLUE)));
    // Track progress never placed its blue position marker
    assert!(!frames
        .iter()
        .any(|frame| frame.iter().any(|pixel| *pixel == Rgb::BLUE)));

    // The volume bar faded fully up on pixels 4..7, then all the way down
    let bar = &VOLUME_GRADIENT[..3];
    let full = frames
        .iter()
        .position(|frame| &frame[4..7] == bar)
        .expect("volume bar never fully lit");
    assert!(frames[full]
        .iter()
        .enumerate()
        .all(|(index, pixel)| (4..7).contains(&index) || *pixel == Rgb::BLACK));
    let last = frames.last().unwrap();
    assert!(last.iter().all(|pixel| *pixel == Rgb::BLACK));
    assert_eq!(frames[frames.len() - 2][4], VOLUME_GRADIENT[0].scaled(0.1));

    leds.terminate().unwrap();
}

#[test]
fn test_latest_animation_preempts_rainbow() {
    let recorder = FrameRecorder::default();
    let mut leds =
        LedStrip::spawn(Box::new(recorder.clone()), &LedConfig::default(), None).unwrap();

    leds.rainbow();
    thread::sleep(Duration::from_millis(150));
    assert!(recorder.last().iter().any(|pixel| *pixel != Rgb::BLACK));

    // Volume level 2 lights the first three bar pixels; the fade-up is done
    // after ~550ms and held for 500ms
    leds.volume(2);
    thread::sleep(Duration::from_millis(800));

    let frame = recorder.last();
    assert_eq!(frame.len(), 28);
    for (index, pixel) in frame.iter().enumerate() {
        let lit = (4..7).contains(&index);
        assert_eq!(*pixel != Rgb::BLACK, lit, "pixel {}: {}", index, pixel);
    }

    // Terminate cuts the hold short and leaves the strip dark
    let start = Instant::now();
    leds.terminate().unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));
    assert!(recorder.last().iter().all(|pixel| *pixel == Rgb::BLACK));
}

#[test]
fn test_terminate_interrupts_endless_rainbow() {
    let recorder = FrameRecorder::default();
    let mut leds =
        LedStrip::spawn(Box::new(recorder.clone()), &LedConfig::default(), None).unwrap();

    leds.rainbow();
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    leds.terminate().unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));
    assert!(recorder.last().iter().all(|pixel| *pixel == Rgb::BLACK));

    // Commands after terminate are dropped quietly
    leds.clear();
    leds.terminate().unwrap();
}
