/// Pixel index sets for the strip
///
/// The strip is mounted as a ring. Walks start at pixel 2 and wrap around;
/// the volume bar sits on pixels 4..14; track progress uses the walk order
/// without its first and last two pixels.
use std::ops::Range;

const WALK_START: usize = 2;
const VOLUME_PIXELS: Range<usize> = 4..14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripLayout {
    count: usize,
    walk: Vec<usize>,
}

impl StripLayout {
    pub fn new(count: usize) -> Self {
        let start = WALK_START.min(count);
        let walk = (start..count).chain(0..start).collect();
        Self { count, walk }
    }

    pub fn pixel_count(&self) -> usize {
        self.count
    }

    pub fn all(&self) -> Vec<usize> {
        (0..self.count).collect()
    }

    /// Every pixel, starting from the middle
    pub fn walk(&self) -> &[usize] {
        &self.walk
    }

    pub fn volume(&self) -> Vec<usize> {
        VOLUME_PIXELS.filter(|&i| i < self.count).collect()
    }

    /// Pixels available to the track-progress indicator
    pub fn song(&self) -> &[usize] {
        if self.walk.len() <= 4 {
            return &[];
        }
        &self.walk[2..self.walk.len() - 2]
    }
}

/// `pixels[start..end]` with both ends clamped to the slice
pub fn span(pixels: &[usize], start: usize, end: usize) -> &[usize] {
    let end = end.min(pixels.len());
    let start = start.min(end);
    &pixels[start..end]
}
