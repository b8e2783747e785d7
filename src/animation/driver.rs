/// LED strip hardware access
///
/// The engine hands every finished frame to a [`LedDriver`]. On the box the
/// strip is a WS2812 chain clocked from an SPI data line; anywhere else the
/// [`NullDriver`] swallows frames.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use super::color::Rgb;
use crate::error::{CoreError, Result};

/// Something that can show a frame
pub trait LedDriver: Send {
    /// Latch `pixels` onto the strip, pixel 0 first
    fn write(&mut self, pixels: &[Rgb]) -> Result<()>;
}

/// Headless driver
#[derive(Debug, Default)]
pub struct NullDriver;

impl LedDriver for NullDriver {
    fn write(&mut self, _pixels: &[Rgb]) -> Result<()> {
        Ok(())
    }
}

/// Three SPI bits per WS2812 bit at 800 kHz
const SPI_SPEED_HZ: u32 = 2_400_000;

/// Low time after the last pixel that latches the frame (> 50µs at 2.4 MHz)
const RESET_BYTES: usize = 24;

// _IOC(_IOC_WRITE, 'k', 4, sizeof(u32))
// Direction: 2 bits at 30-31, Size: 14 bits at 16-29, Type: 8 bits at 8-15, Nr: 8 bits at 0-7
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = (1 << 30) | (4 << 16) | ((b'k' as u32) << 8) | 4;

/// WS2812 chain on a spidev node
pub struct SpiWs2812Driver {
    device: File,
    name: String,
    buffer: Vec<u8>,
}

impl SpiWs2812Driver {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let device = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| CoreError::hardware(name.clone(), e))?;

        let speed: u32 = SPI_SPEED_HZ;
        let ret = unsafe {
            libc::ioctl(
                device.as_raw_fd(),
                SPI_IOC_WR_MAX_SPEED_HZ as _,
                &speed as *const u32,
            )
        };
        if ret < 0 {
            return Err(CoreError::hardware(name, std::io::Error::last_os_error()));
        }

        tracing::info!("LED strip on {} at {} Hz", name, SPI_SPEED_HZ);
        Ok(Self {
            device,
            name,
            buffer: Vec::new(),
        })
    }
}

impl LedDriver for SpiWs2812Driver {
    fn write(&mut self, pixels: &[Rgb]) -> Result<()> {
        encode_frame(pixels, &mut self.buffer);
        self.device
            .write_all(&self.buffer)
            .map_err(|e| CoreError::hardware(self.name.clone(), e))
    }
}

/// Encode a frame as SPI bytes: GRB order, each data bit as `110` (one) or
/// `100` (zero), followed by the reset gap
pub fn encode_frame(pixels: &[Rgb], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(pixels.len() * 9 + RESET_BYTES);
    for pixel in pixels {
        for byte in [pixel.g, pixel.r, pixel.b] {
            out.extend_from_slice(&encode_byte(byte));
        }
    }
    out.resize(out.len() + RESET_BYTES, 0);
}

fn encode_byte(byte: u8) -> [u8; 3] {
    let mut bits: u32 = 0;
    for i in (0..8).rev() {
        let symbol = if byte & (1 << i) != 0 { 0b110 } else { 0b100 };
        bits = (bits << 3) | symbol;
    }
    [(bits >> 16) as u8, (bits >> 8) as u8, bits as u8]
}
