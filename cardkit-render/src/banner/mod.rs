//! Banner compositing.
//!
//! A rendered card can sit on top of a banner image. Static banners are
//! cover-fitted to the card and flattened to PNG; animated GIF banners are
//! sub-sampled to at most `max_frames`, shrunk to half size, and re-encoded
//! with the card blended over every frame.
//!
//! Every failure here is recoverable: the caller falls back to the plain
//! card.

pub mod composite;
pub mod fetch;
pub mod frames;

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use cardkit_core::config::BannerSettings;
use cardkit_core::{ContentType, RenderResult};
use image::ImageReader;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

pub use fetch::BannerFetcher;
pub use frames::{FrameCache, GifFrame};

#[derive(Debug, Error)]
pub enum BannerError {
    #[error("invalid banner URL: {0}")]
    InvalidUrl(String),

    #[error("banner request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("banner returned status {0}")]
    Status(u16),

    #[error("banner content type {0:?} is not an image")]
    ContentType(Option<String>),

    #[error("banner {what} of {actual} exceeds limit of {limit}")]
    TooLarge {
        what: &'static str,
        actual: u64,
        limit: u64,
    },

    #[error("banner image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("frame manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("banner task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Static,
    Animated,
}

/// GIFs with more than one frame are animated; anything else is static.
pub fn detect_kind(bytes: &[u8]) -> BannerKind {
    if image::guess_format(bytes).ok() != Some(ImageFormat::Gif) {
        return BannerKind::Static;
    }
    let frames = GifDecoder::new(Cursor::new(bytes))
        .map(|decoder| decoder.into_frames().take(2).count())
        .unwrap_or(0);
    if frames > 1 {
        BannerKind::Animated
    } else {
        BannerKind::Static
    }
}

/// Reject sources wider or taller than `max_dimension` without decoding them.
pub fn check_dimensions(bytes: &[u8], max_dimension: u32) -> Result<(u32, u32), BannerError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    let largest = width.max(height);
    if largest > max_dimension {
        return Err(BannerError::TooLarge {
            what: "dimension",
            actual: u64::from(largest),
            limit: u64::from(max_dimension),
        });
    }
    Ok((width, height))
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fetches a banner and puts a rendered card on top of it.
#[derive(Debug, Clone)]
pub struct Compositor {
    settings: BannerSettings,
    fetcher: BannerFetcher,
    frames: Arc<FrameCache>,
}

impl Compositor {
    pub fn new(settings: &BannerSettings, cache_root: PathBuf) -> Result<Self, BannerError> {
        Ok(Self {
            settings: settings.clone(),
            fetcher: BannerFetcher::new(settings)?,
            frames: Arc::new(FrameCache::new(cache_root.join("frames"))),
        })
    }

    /// Composite `card_png` over the banner at `url`.
    pub async fn apply(&self, card_png: Vec<u8>, url: &str) -> Result<RenderResult, BannerError> {
        let source = self.fetcher.fetch(url).await?;
        check_dimensions(&source, self.settings.max_dimension)?;

        match detect_kind(&source) {
            BannerKind::Static => {
                let data = tokio::task::spawn_blocking(move || {
                    composite::composite_static(&card_png, &source)
                })
                .await??;
                Ok(RenderResult {
                    content_type: ContentType::Png,
                    data,
                })
            }
            BannerKind::Animated => {
                let frames = self.frames_for(source).await?;
                debug!(frames = frames.len(), "animated banner frames ready");
                let alpha = self.settings.animated_overlay_alpha;
                let quality = self.settings.quality;
                let data = tokio::task::spawn_blocking(move || {
                    composite::composite_animated(&card_png, &frames, alpha, quality)
                })
                .await??;
                Ok(RenderResult {
                    content_type: ContentType::Gif,
                    data,
                })
            }
        }
    }

    async fn frames_for(&self, source: Vec<u8>) -> Result<Vec<GifFrame>, BannerError> {
        let hash = content_hash(&source);
        if let Some(frames) = self.frames.load(&hash).await {
            debug!(hash = %hash, "frame cache hit");
            return Ok(frames);
        }

        let max_frames = self.settings.max_frames;
        let max_dimension = self.settings.max_dimension;
        let frames = tokio::task::spawn_blocking(move || {
            frames::extract_frames(&source, max_frames, max_dimension)
        })
        .await??;
        self.frames.store(&hash, &frames).await?;
        Ok(frames)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};

    /// GIF with `count` frames of `delay_ms` each, alternating colours.
    pub fn synthetic_gif(count: usize, width: u32, height: u32, delay_ms: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(Cursor::new(&mut out), 30);
            let frames = (0..count).map(|i| {
                let shade = if i % 2 == 0 { 40 } else { 220 };
                Frame::from_parts(
                    RgbaImage::from_pixel(width, height, Rgba([shade, 90, 160, 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(delay_ms, 1),
                )
            });
            encoder.encode_frames(frames).unwrap();
        }
        out
    }

    pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(rgba)))
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([30, 120, 200]),
        ))
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
        out.into_inner()
    }
}
