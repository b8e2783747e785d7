/// RDM6300 tag reader
///
/// ```text
/// | 00 | 01 02 | 03 .. 10 | 11 12    | 13 |
/// | 02 | VER   | TAG      | CHECKSUM | 03 |
///        <----- 12 ASCII hex chars --->
/// ```
///
/// The checksum is the XOR of the five data bytes (version + tag). While a
/// tag stays in the field the reader repeats its frame; silence for one read
/// timeout means the tag is gone.
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::serial;
use crate::error::{CoreError, Result};
use crate::messaging::{Event, EventPublisher};
use crate::tag::{TagId, TAG_ID_LEN};

const LOG_TARGET: &str = "tagbox::rfid";

const FRAME_START: u8 = 0x02;
const FRAME_END: u8 = 0x03;

/// Header + identifier + tail
pub const FRAME_LEN: usize = TAG_ID_LEN + 2;

/// Read timeout in tenths of a second
const READ_TIMEOUT_DS: u8 = 5;

/// Validate one frame and extract its identifier
pub fn decode_frame(frame: &[u8]) -> Result<TagId> {
    if frame.len() != FRAME_LEN {
        return Err(CoreError::ProtocolViolation(format!(
            "frame of {} bytes",
            frame.len()
        )));
    }
    if frame[0] != FRAME_START || frame[FRAME_LEN - 1] != FRAME_END {
        return Err(CoreError::ProtocolViolation("bad frame delimiters".into()));
    }

    let body = &frame[1..FRAME_LEN - 1];
    if !body.iter().all(u8::is_ascii_hexdigit) {
        return Err(CoreError::ProtocolViolation(format!(
            "non-hex frame body {:02X?}",
            body
        )));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| CoreError::ProtocolViolation("non-ASCII frame body".into()))?;

    let mut bytes = [0u8; TAG_ID_LEN / 2];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16)
            .map_err(|_| CoreError::ProtocolViolation(format!("non-hex frame body {:?}", text)))?;
    }

    let (data, checksum) = bytes.split_at(bytes.len() - 1);
    let computed = data.iter().fold(0u8, |acc, b| acc ^ b);
    if computed != checksum[0] {
        return Err(CoreError::ProtocolViolation(format!(
            "checksum mismatch: {:02X} != {:02X}",
            computed, checksum[0]
        )));
    }

    TagId::new(text)
}

/// Presence bookkeeping: events strictly alternate between a tag and `None`
#[derive(Debug, Default)]
pub struct TagTracker {
    current: Option<TagId>,
}

impl TagTracker {
    /// A valid frame arrived
    pub fn frame(&mut self, tag: TagId) -> Vec<Event> {
        if self.current.as_ref() == Some(&tag) {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if self.current.is_some() {
            events.push(Event::TagPresence { tag: None });
        }
        events.push(Event::TagPresence {
            tag: Some(tag.clone()),
        });
        self.current = Some(tag);
        events
    }

    /// A read timed out without data
    pub fn silence(&mut self) -> Option<Event> {
        self.current.take().map(|_| Event::TagPresence { tag: None })
    }
}

/// Reader thread handle
pub struct RfidReader {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RfidReader {
    /// Open the serial device and start reading
    pub fn open(device: &Path, events: EventPublisher) -> Result<Self> {
        let port = serial::open_9600_8n1(device, READ_TIMEOUT_DS)?;
        Self::spawn(port, events)
    }

    /// Read frames from any byte source whose reads time out with `Ok(0)`
    pub fn spawn<R: Read + Send + 'static>(port: R, events: EventPublisher) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("rfid-reader".to_string())
                .spawn(move || read_loop(port, &stop, &events))
                .map_err(|e| CoreError::io("spawning RFID reader", e))?
        };

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop reading and join the thread. Idempotent.
    pub fn terminate(&mut self) {
        tracing::debug!(target: LOG_TARGET, "rfid terminating");
        let Some(thread) = self.thread.take() else {
            tracing::debug!(target: LOG_TARGET, "already terminated");
            return;
        };

        self.stop.store(true, Ordering::Relaxed);
        if thread.join().is_err() {
            tracing::warn!(target: LOG_TARGET, "reader thread panicked");
        }
    }
}

impl Drop for RfidReader {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn read_loop<R: Read>(mut port: R, stop: &AtomicBool, events: &EventPublisher) {
    let mut tracker = TagTracker::default();
    let mut head = [0u8; 1];

    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut head) {
            Ok(0) => {
                if let Some(event) = tracker.silence() {
                    events.publish(event);
                }
            }
            Ok(_) if head[0] == FRAME_START => {
                let mut frame = [0u8; FRAME_LEN];
                frame[0] = FRAME_START;
                if let Err(e) = port.read_exact(&mut frame[1..]) {
                    tracing::debug!(target: LOG_TARGET, "incomplete frame: {}", e);
                    continue;
                }

                match decode_frame(&frame) {
                    Ok(tag) => {
                        for event in tracker.frame(tag) {
                            events.publish(event);
                        }
                    }
                    Err(e) => tracing::debug!(target: LOG_TARGET, "discarding frame: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::error!(target: LOG_TARGET, "serial read failed: {}", e);
                events.publish(Event::Interrupt);
                break;
            }
        }
    }

    tracing::debug!(target: LOG_TARGET, "reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::messaging::{self, Received};
    use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
    use std::time::Duration;

    fn frame(body: &str) -> Vec<u8> {
        let mut frame = vec![FRAME_START];
        frame.extend_from_slice(body.as_bytes());
        frame.push(FRAME_END);
        frame
    }

    /// Serial stand-in: chunks from a channel, `Ok(0)` on read timeout
    struct FakePort {
        rx: Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(chunk) => self.pending = chunk,
                    Err(RecvTimeoutError::Timeout) => return Ok(0),
                    Err(RecvTimeoutError::Disconnected) => {
                        thread::sleep(Duration::from_millis(50));
                        return Ok(0);
                    }
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn test_decode_known_tags() {
        for raw in ["5A00834F9204", "5500ACB96121", "5600C7AC4B76"] {
            assert_eq!(decode_frame(&frame(raw)).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        let bad_checksum = decode_frame(&frame("5A00834F9205")).unwrap_err();
        assert_eq!(bad_checksum.kind(), ErrorKind::ProtocolViolation);

        let mut bad_tail = frame("5A00834F9204");
        bad_tail[FRAME_LEN - 1] = 0x04;
        assert!(decode_frame(&bad_tail).is_err());

        assert!(decode_frame(&frame("5A00834F92ZZ")).is_err());
        assert!(decode_frame(&frame("5A00834F92")).is_err());
    }

    #[test]
    fn test_tracker_alternates() {
        let a = TagId::new("5A00834F9204").unwrap();
        let b = TagId::new("5500ACB96121").unwrap();
        let mut tracker = TagTracker::default();

        assert_eq!(tracker.silence(), None);
        assert_eq!(tracker.frame(a.clone()).len(), 1);
        assert!(tracker.frame(a.clone()).is_empty());
        assert_eq!(
            tracker.frame(b.clone()),
            vec![
                Event::TagPresence { tag: None },
                Event::TagPresence { tag: Some(b) }
            ]
        );
        assert_eq!(tracker.silence(), Some(Event::TagPresence { tag: None }));
        assert_eq!(tracker.silence(), None);
    }

    #[test]
    fn test_reader_thread() {
        let (tx, rx) = unbounded();
        let (publisher, receiver) = messaging::channel();
        let mut reader = RfidReader::spawn(
            FakePort {
                rx,
                pending: Vec::new(),
            },
            publisher,
        )
        .unwrap();

        // Garbage, a corrupt frame, then the same tag twice
        tx.send(vec![0xFF, 0x00]).unwrap();
        tx.send(frame("5A00834F9205")).unwrap();
        tx.send(frame("5A00834F9204")).unwrap();
        tx.send(frame("5A00834F9204")).unwrap();

        let tag = TagId::new("5A00834F9204").unwrap();
        assert_eq!(
            receiver.receive(Duration::from_secs(1)),
            Received::Event(Event::TagPresence { tag: Some(tag) })
        );
        // Silence after the last frame reports removal
        assert_eq!(
            receiver.receive(Duration::from_secs(1)),
            Received::Event(Event::TagPresence { tag: None })
        );

        reader.terminate();
        reader.terminate();
        assert_eq!(receiver.drain(), 0);
    }
}
