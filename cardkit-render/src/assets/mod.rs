//! Asset resolution for templates: emoji glyphs and remote images.
//!
//! Templates never touch the network; the engine collects what a layout
//! references and asks an [`AssetLoader`] for it. Everything comes back as
//! PNG so the SVG only ever embeds one image type.

pub mod emoji;

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cardkit_core::config::AssetSettings;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::engine::MAX_SCALE;
use crate::error::AssetError;
pub use emoji::{EmojiCache, EmojiKey};

/// Largest remote image accepted for embedding.
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[async_trait::async_trait]
pub trait AssetLoader: Send + Sync {
    /// PNG of the emoji with the given codepoint key, rendered at `scale`.
    async fn load_emoji(&self, code: &str, scale: f32) -> Result<Arc<Vec<u8>>, AssetError>;

    /// PNG of a remote image.
    async fn load_image(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write through a temp file and rename, so concurrent writers of the same
/// content never expose a partial file.
pub(crate) async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!(".{name}.{}.{seq}.tmp", std::process::id()));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, dir.join(name)).await
}

/// `data:` URI for embedding PNG bytes in SVG.
pub fn png_data_uri(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, AssetError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Fetches emoji from a CDN template and images over HTTP.
#[derive(Debug)]
pub struct HttpAssetLoader {
    client: reqwest::Client,
    emoji: EmojiCache,
    emoji_url_template: String,
}

impl HttpAssetLoader {
    pub fn new(settings: &AssetSettings) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.fetch_timeout_ms))
            .build()?;
        let emoji = EmojiCache::new(
            settings.emoji_cache_capacity,
            Some(settings.resolved_cache_dir().join("emoji")),
        );
        Ok(Self {
            client,
            emoji,
            emoji_url_template: settings.emoji_url_template.clone(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| AssetError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            _ => return Err(AssetError::InvalidUrl(url.to_string())),
        }

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status(status.as_u16()));
        }
        if let Some(len) = response.content_length()
            && len as usize > MAX_IMAGE_BYTES
        {
            return Err(AssetError::TooLarge(len as usize));
        }
        let bytes = response.bytes().await?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AssetError::TooLarge(bytes.len()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl AssetLoader for HttpAssetLoader {
    async fn load_emoji(&self, code: &str, scale: f32) -> Result<Arc<Vec<u8>>, AssetError> {
        if !scale.is_finite() || scale <= 0.0 || scale > MAX_SCALE {
            return Err(AssetError::InvalidScale(scale));
        }
        let key = EmojiKey::new(code, scale);
        if let Some(bytes) = self.emoji.get(&key).await {
            return Ok(bytes);
        }

        let url = self.emoji_url_template.replace("{code}", code);
        let raw = self.fetch(&url).await?;
        let decoded = image::load_from_memory(&raw)?;
        let image = if key.scale_milli != 1000 {
            let w = ((decoded.width() as f32 * scale).round() as u32).max(1);
            let h = ((decoded.height() as f32 * scale).round() as u32).max(1);
            decoded.resize_exact(w, h, FilterType::Lanczos3)
        } else {
            decoded
        };
        let png = encode_png(&image)?;
        debug!(emoji = %code, scale, bytes = png.len(), "emoji fetched");
        Ok(self.emoji.put(key, png).await)
    }

    async fn load_image(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let raw = self.fetch(url).await?;
        if image::guess_format(&raw).ok() == Some(ImageFormat::Png) {
            return Ok(raw);
        }
        encode_png(&image::load_from_memory(&raw)?)
    }
}
