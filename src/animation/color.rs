use std::fmt;

/// One pixel colour, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    pub const YELLOW: Rgb = Rgb::new(255, 255, 0);
    pub const PURPLE: Rgb = Rgb::new(255, 0, 255);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const ORANGE: Rgb = Rgb::new(0xFF, 0x8C, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `0xRRGGBB`
    pub const fn from_hex(hex: u32) -> Self {
        Self::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    /// Scale every channel by `factor` (0.0..=1.0), rounding to nearest
    pub fn scaled(self, factor: f64) -> Self {
        let channel = |c: u8| (c as f64 * factor).round().clamp(0.0, 255.0) as u8;
        Self::new(channel(self.r), channel(self.g), channel(self.b))
    }

    /// Apply the strip's global brightness the way WS281x drivers do
    pub fn dimmed(self, brightness: u8) -> Self {
        let scale = brightness as u16 + 1;
        let channel = |c: u8| ((c as u16 * scale) >> 8) as u8;
        Self::new(channel(self.r), channel(self.g), channel(self.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Colour wheel: green → red → blue → green over 0..=255
pub fn wheel(pos: u8) -> Rgb {
    match pos {
        0..=84 => Rgb::new(pos * 3, 255 - pos * 3, 0),
        85..=169 => {
            let pos = pos - 85;
            Rgb::new(255 - pos * 3, 0, pos * 3)
        }
        _ => {
            let pos = pos - 170;
            Rgb::new(0, pos * 3, 255 - pos * 3)
        }
    }
}

/// Wheel colour for pixel `index` spread evenly over `count` pixels, shifted by `offset`
pub fn spread_wheel(index: usize, count: usize, offset: u8) -> Rgb {
    let base = (index * 256 / count.max(1)) as u32;
    wheel(((base + offset as u32) & 255) as u8)
}

/// Volume bar gradient, green to red
pub const VOLUME_GRADIENT: [Rgb; 10] = [
    Rgb::from_hex(0x00FF00),
    Rgb::from_hex(0x1CE200),
    Rgb::from_hex(0x38C600),
    Rgb::from_hex(0x55AA00),
    Rgb::from_hex(0x718D00),
    Rgb::from_hex(0x8D7100),
    Rgb::from_hex(0xAA5500),
    Rgb::from_hex(0xC63800),
    Rgb::from_hex(0xE21C00),
    Rgb::from_hex(0xFF0000),
];
