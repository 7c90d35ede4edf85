//! Turning downloaded bytes into an [`Image`].

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageFormat};

use crate::error::Result;
use crate::models::{Image, ImageKind, Movie, MovieFrame};

/// Decode `bytes` as `kind`, downscaling still images to fit the bounds.
///
/// A zero bound leaves that dimension unconstrained. Movies are kept at
/// their native size; scaling them is up to whatever renders the frames.
pub fn decode(bytes: &[u8], kind: ImageKind, max_width: u32, max_height: u32) -> Result<Image> {
    match kind {
        ImageKind::Static => {
            let bitmap = image::load_from_memory(bytes)?;
            Ok(Image::Static(scale_to_fit(bitmap, max_width, max_height)))
        }
        ImageKind::Animated => decode_movie(bytes).map(Image::Animated),
    }
}

fn decode_movie(bytes: &[u8]) -> Result<Movie> {
    if image::guess_format(bytes)? != ImageFormat::Gif {
        // Anything else plays as a single still frame
        let buffer = image::load_from_memory(bytes)?.into_rgba8();
        let (width, height) = buffer.dimensions();
        return Ok(Movie::new(width, height, vec![MovieFrame { buffer, delay_ms: 0 }]));
    }

    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions();
    let frames = decoder
        .into_frames()
        .collect_frames()?
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            MovieFrame {
                delay_ms: numer / denom.max(1),
                buffer: frame.into_buffer(),
            }
        })
        .collect();

    Ok(Movie::new(width, height, frames))
}

/// Shrink `bitmap` to fit inside the bounds, keeping its aspect ratio.
///
/// Never enlarges.
pub fn scale_to_fit(bitmap: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = fit_within(bitmap.width(), bitmap.height(), max_width, max_height);
    if (width, height) == (bitmap.width(), bitmap.height()) {
        return bitmap;
    }
    bitmap.resize_exact(width, height, FilterType::Triangle)
}

fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let ratio_for = |bound: u32, actual: u32| {
        if bound == 0 {
            f64::INFINITY
        } else {
            f64::from(bound) / f64::from(actual)
        }
    };
    let ratio = ratio_for(max_width, width).min(ratio_for(max_height, height));
    if ratio >= 1.0 {
        return (width, height);
    }
    let scale = |side: u32| ((f64::from(side) * ratio).round() as u32).max(1);
    (scale(width), scale(height))
}
