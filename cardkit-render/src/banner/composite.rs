use std::io::Cursor;

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, DynamicImage, Frame, ImageFormat, RgbaImage};

use super::{BannerError, GifFrame};

/// Map GIF quality (0-100) onto the encoder's speed (30 fastest, 1 best).
pub fn encoder_speed(quality: u8) -> i32 {
    let quality = i32::from(quality.min(100));
    30 - quality * 29 / 100
}

fn cover(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    image
        .resize_to_fill(width, height, FilterType::Triangle)
        .to_rgba8()
}

/// Card over a cover-fitted static banner, as PNG.
pub fn composite_static(card_png: &[u8], banner: &[u8]) -> Result<Vec<u8>, BannerError> {
    let card = image::load_from_memory(card_png)?.to_rgba8();
    let (width, height) = card.dimensions();
    let mut canvas = cover(&image::load_from_memory(banner)?, width, height);
    imageops::overlay(&mut canvas, &card, 0, 0);

    let mut out = Cursor::new(Vec::new());
    canvas.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Card blended at `alpha` over every banner frame, at half the card's size.
pub fn composite_animated(
    card_png: &[u8],
    frames: &[GifFrame],
    alpha: f32,
    quality: u8,
) -> Result<Vec<u8>, BannerError> {
    let card = image::load_from_memory(card_png)?;
    let width = (card.width() / 2).max(1);
    let height = (card.height() / 2).max(1);

    let mut overlay = card.resize_exact(width, height, FilterType::Lanczos3).to_rgba8();
    let alpha = alpha.clamp(0.0, 1.0);
    for pixel in overlay.pixels_mut() {
        pixel.0[3] = (f32::from(pixel.0[3]) * alpha).round() as u8;
    }

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, encoder_speed(quality));
        encoder.set_repeat(Repeat::Infinite)?;
        for frame in frames {
            let mut canvas = cover(
                &DynamicImage::ImageRgba8(frame.buffer.clone()),
                width,
                height,
            );
            imageops::overlay(&mut canvas, &overlay, 0, 0);
            encoder.encode_frame(Frame::from_parts(
                canvas,
                0,
                0,
                Delay::from_numer_denom_ms(frame.delay_ms, 1),
            ))?;
        }
    }
    Ok(out)
}
