//! Animated banner frame extraction and its on-disk cache.

use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Frame, ImageDecoder, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::BannerError;
use crate::assets::write_atomic;

#[derive(Debug, Clone, PartialEq)]
pub struct GifFrame {
    pub index: usize,
    pub buffer: RgbaImage,
    pub delay_ms: u32,
}

impl GifFrame {
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }
}

fn delay_ms(frame: &Frame) -> u32 {
    let (numer, denom) = frame.delay().numer_denom_ms();
    if denom == 0 { 0 } else { numer / denom }
}

/// Frames kept when sub-sampling `total` frames down to `max_frames`.
pub fn stride(total: usize, max_frames: usize) -> usize {
    if max_frames == 0 || total <= max_frames {
        1
    } else {
        total.div_ceil(max_frames)
    }
}

/// Decode an animated GIF into at most `max_frames` full frames.
///
/// When the source has more frames than that, every `stride`-th frame is
/// kept and inherits the delays of the frames skipped after it, so the
/// total running time is unchanged.
pub fn extract_frames(
    source: &[u8],
    max_frames: usize,
    max_dimension: u32,
) -> Result<Vec<GifFrame>, BannerError> {
    let decoder = GifDecoder::new(Cursor::new(source))?;
    let (width, height) = decoder.dimensions();
    if width.max(height) > max_dimension {
        return Err(BannerError::TooLarge {
            what: "dimension",
            actual: u64::from(width.max(height)),
            limit: u64::from(max_dimension),
        });
    }

    // First pass: only count frames, dropping each buffer as it decodes.
    let mut total = 0usize;
    for frame in decoder.into_frames() {
        frame?;
        total += 1;
    }
    let step = stride(total, max_frames);

    let mut kept: Vec<GifFrame> = Vec::with_capacity(total.div_ceil(step));
    for (i, frame) in GifDecoder::new(Cursor::new(source))?
        .into_frames()
        .enumerate()
    {
        let frame = frame?;
        let delay = delay_ms(&frame);
        if i % step == 0 {
            kept.push(GifFrame {
                index: kept.len(),
                buffer: frame.into_buffer(),
                delay_ms: delay,
            });
        } else if let Some(last) = kept.last_mut() {
            last.delay_ms += delay;
        }
    }

    debug!(total, kept = kept.len(), step, "banner frames extracted");
    Ok(kept)
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    frames: Vec<ManifestFrame>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFrame {
    index: usize,
    delay_ms: u32,
    width: u32,
    height: u32,
    file: String,
}

/// Extracted frames keyed by the SHA-256 of the source bytes.
///
/// Layout: `<root>/<hash>/manifest.json` plus one PNG per frame. The
/// manifest is written last, so a directory without one is ignored.
/// Nothing is ever evicted.
#[derive(Debug)]
pub struct FrameCache {
    root: PathBuf,
}

impl FrameCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn load(&self, hash: &str) -> Option<Vec<GifFrame>> {
        let dir = self.root.join(hash);
        let manifest = tokio::fs::read(dir.join("manifest.json")).await.ok()?;
        let manifest: Manifest = match serde_json::from_slice(&manifest) {
            Ok(m) => m,
            Err(e) => {
                warn!(hash, "ignoring corrupt frame manifest: {e}");
                return None;
            }
        };

        let mut frames = Vec::with_capacity(manifest.frames.len());
        for entry in manifest.frames {
            let bytes = tokio::fs::read(dir.join(&entry.file)).await.ok()?;
            let buffer = image::load_from_memory(&bytes).ok()?.to_rgba8();
            if buffer.dimensions() != (entry.width, entry.height) {
                return None;
            }
            frames.push(GifFrame {
                index: entry.index,
                buffer,
                delay_ms: entry.delay_ms,
            });
        }
        Some(frames)
    }

    pub async fn store(&self, hash: &str, frames: &[GifFrame]) -> Result<(), BannerError> {
        let dir = self.root.join(hash);
        let mut entries = Vec::with_capacity(frames.len());
        for frame in frames {
            let file = format!("frame-{:04}.png", frame.index);
            let mut png = Cursor::new(Vec::new());
            frame
                .buffer
                .write_to(&mut png, image::ImageFormat::Png)?;
            write_atomic(&dir, &file, png.get_ref()).await?;
            entries.push(ManifestFrame {
                index: frame.index,
                delay_ms: frame.delay_ms,
                width: frame.width(),
                height: frame.height(),
                file,
            });
        }
        let manifest = serde_json::to_vec(&Manifest { frames: entries })?;
        write_atomic(&dir, "manifest.json", &manifest).await?;
        Ok(())
    }
}
