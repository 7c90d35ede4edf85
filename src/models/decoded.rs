//! Decoded image model

use image::{DynamicImage, RgbaImage};

/// A decoded image: either a still bitmap or an animated movie.
#[derive(Debug, Clone)]
pub enum Image {
    /// Still bitmap
    Static(DynamicImage),
    /// Animated frames
    Animated(Movie),
}

impl Image {
    /// Width in pixels
    pub fn width(&self) -> u32 {
        match self {
            Self::Static(bitmap) => bitmap.width(),
            Self::Animated(movie) => movie.width(),
        }
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        match self {
            Self::Static(bitmap) => bitmap.height(),
            Self::Animated(movie) => movie.height(),
        }
    }

    /// The bitmap, if this is a still image
    pub const fn bitmap(&self) -> Option<&DynamicImage> {
        match self {
            Self::Static(bitmap) => Some(bitmap),
            Self::Animated(_) => None,
        }
    }

    /// The movie, if this is an animated image
    pub const fn movie(&self) -> Option<&Movie> {
        match self {
            Self::Static(_) => None,
            Self::Animated(movie) => Some(movie),
        }
    }

    /// Approximate memory cost in bytes, used for cache accounting.
    ///
    /// Still images report their pixel buffer length. Movies report
    /// `width * height * max(duration_secs, 1)`, a rough proxy since the
    /// real cost of keeping frames around isn't cheaply knowable.
    pub fn byte_cost(&self) -> usize {
        match self {
            Self::Static(bitmap) => bitmap.as_bytes().len(),
            Self::Animated(movie) => {
                let seconds = (movie.duration_ms() / 1000).max(1);
                (movie.width() as usize)
                    .saturating_mul(movie.height() as usize)
                    .saturating_mul(seconds as usize)
            }
        }
    }
}

/// One frame of a movie and how long it stays on screen
#[derive(Debug, Clone)]
pub struct MovieFrame {
    /// Frame pixels, already composited to the full canvas
    pub buffer: RgbaImage,
    /// Display time in milliseconds
    pub delay_ms: u32,
}

/// An animated image
#[derive(Debug, Clone)]
pub struct Movie {
    width: u32,
    height: u32,
    frames: Vec<MovieFrame>,
}

impl Movie {
    /// Build a movie from frames on a `width` x `height` canvas
    pub const fn new(width: u32, height: u32, frames: Vec<MovieFrame>) -> Self {
        Self {
            width,
            height,
            frames,
        }
    }

    /// Canvas width
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// All frames in display order
    pub fn frames(&self) -> &[MovieFrame] {
        &self.frames
    }

    /// Total running time of one loop
    pub fn duration_ms(&self) -> u32 {
        self.frames
            .iter()
            .fold(0u32, |total, f| total.saturating_add(f.delay_ms))
    }

    /// Frame visible `elapsed_ms` into playback, looping
    pub fn frame_at(&self, elapsed_ms: u64) -> Option<&MovieFrame> {
        let duration = u64::from(self.duration_ms());
        if duration == 0 {
            return self.frames.first();
        }
        let mut position = elapsed_ms % duration;
        for frame in &self.frames {
            let delay = u64::from(frame.delay_ms);
            if position < delay {
                return Some(frame);
            }
            position -= delay;
        }
        self.frames.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(width: u32, height: u32, delays: &[u32]) -> Movie {
        let frames = delays
            .iter()
            .map(|&delay_ms| MovieFrame {
                buffer: RgbaImage::new(width, height),
                delay_ms,
            })
            .collect();
        Movie::new(width, height, frames)
    }

    #[test]
    fn test_static_cost_is_pixel_bytes() {
        let image = Image::Static(DynamicImage::new_rgba8(10, 20));
        assert_eq!(image.byte_cost(), 10 * 20 * 4);

        let image = Image::Static(DynamicImage::new_rgb8(10, 20));
        assert_eq!(image.byte_cost(), 10 * 20 * 3);
    }

    #[test]
    fn test_movie_cost_uses_whole_seconds() {
        // Under a second still counts as one
        assert_eq!(Image::Animated(movie(10, 10, &[100, 200])).byte_cost(), 100);
        assert_eq!(Image::Animated(movie(10, 10, &[1500, 1000])).byte_cost(), 200);
        assert_eq!(Image::Animated(movie(10, 10, &[])).byte_cost(), 100);
    }

    #[test]
    fn test_frame_at_loops() {
        let m = movie(1, 1, &[100, 50]);
        assert_eq!(m.duration_ms(), 150);
        assert_eq!(m.frame_at(0).unwrap().delay_ms, 100);
        assert_eq!(m.frame_at(120).unwrap().delay_ms, 50);
        assert_eq!(m.frame_at(160).unwrap().delay_ms, 100);
    }

    #[test]
    fn test_variant_accessors() {
        let still = Image::Static(DynamicImage::new_rgba8(3, 4));
        assert!(still.bitmap().is_some() && still.movie().is_none());
        assert_eq!((still.width(), still.height()), (3, 4));

        let anim = Image::Animated(movie(5, 6, &[10]));
        assert!(anim.movie().is_some() && anim.bitmap().is_none());
        assert_eq!((anim.width(), anim.height()), (5, 6));
    }
}
