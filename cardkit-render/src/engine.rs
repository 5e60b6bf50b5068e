//! Layout → SVG → PNG.
//!
//! The font database is loaded once per engine. Everything derived from the
//! request `config` (parsed [`RenderConfig`], usvg options, the asset memo)
//! lives in a generation that is rebuilt only when a request arrives with a
//! different `config` than the previous one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cardkit_core::Scaling;
use cardkit_core::config::AssetSettings;
use futures::future::join_all;
use resvg::tiny_skia;
use resvg::usvg::{self, fontdb};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assets::{AssetLoader, png_data_uri};
use crate::error::RenderError;
use crate::layout::compute::{intrinsic_size, layout};
use crate::layout::svg::{AssetRefs, ResolvedAssets, collect_assets, write_svg};
use crate::registry::ComponentSpec;

/// Upper bound on `scaling.image`.
pub const MAX_SCALE: f32 = 8.0;
/// Upper bound on a declared canvas side, in layout units.
pub const MAX_CANVAS: f32 = 4096.0;
/// Upper bound on the rasterized pixel count (8192 x 8192, 256 MiB RGBA).
pub const MAX_RASTER_PIXELS: u64 = 8192 * 8192;

/// Caller-supplied layout context.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Canvas width; the template's own size when unset
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub font_family: Option<String>,
    /// Accent colour override for the built-in palette
    pub accent: Option<String>,
    pub background: Option<String>,
}

impl RenderConfig {
    pub fn from_value(value: &Value) -> Result<Self, RenderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        if !value.is_object() {
            return Err(RenderError::InvalidRequest(
                "config must be an object".to_string(),
            ));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| RenderError::InvalidRequest(format!("config: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AssetKey {
    Emoji { code: String, scale_milli: u32 },
    Image(String),
}

struct Generation {
    id: u64,
    config: Value,
    render_config: RenderConfig,
    font_family: String,
    options: Arc<usvg::Options<'static>>,
    /// Resolved data URIs; failures are not remembered
    memo: Mutex<HashMap<AssetKey, String>>,
}

/// Vector document ready for rasterization.
pub struct SvgDocument {
    pub svg: String,
    /// Declared size in layout units
    pub width: f32,
    pub height: f32,
    pub generation: u64,
    options: Arc<usvg::Options<'static>>,
}

impl std::fmt::Debug for SvgDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgDocument")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("generation", &self.generation)
            .field("svg_len", &self.svg.len())
            .finish()
    }
}

pub struct Engine {
    fontdb: Arc<fontdb::Database>,
    default_font_family: String,
    loader: Arc<dyn AssetLoader>,
    current: Mutex<Option<Arc<Generation>>>,
    generations: AtomicU64,
}

impl Engine {
    /// Load fonts and build the engine.
    ///
    /// Scanning system fonts can block for seconds; call from a blocking
    /// context.
    pub fn new(settings: &AssetSettings, loader: Arc<dyn AssetLoader>) -> Result<Self, RenderError> {
        let mut db = fontdb::Database::new();
        if settings.load_system_fonts {
            db.load_system_fonts();
        }
        for dir in &settings.font_dirs {
            db.load_fonts_dir(dir);
        }
        db.set_sans_serif_family(settings.default_font_family.clone());

        if db.is_empty() {
            if settings.require_fonts {
                return Err(RenderError::FontsUnavailable);
            }
            warn!("font database is empty; text will not render");
        }
        info!(faces = db.len(), "font database loaded");

        Ok(Self {
            fontdb: Arc::new(db),
            default_font_family: settings.default_font_family.clone(),
            loader,
            current: Mutex::new(None),
            generations: AtomicU64::new(0),
        })
    }

    pub fn font_count(&self) -> usize {
        self.fontdb.len()
    }

    fn generation(&self, config: &Value) -> Result<Arc<Generation>, RenderError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| RenderError::Raster("engine state poisoned".to_string()))?;
        if let Some(generation) = current.as_ref()
            && generation.config == *config
        {
            return Ok(Arc::clone(generation));
        }

        let render_config = RenderConfig::from_value(config)?;
        let font_family = render_config
            .font_family
            .clone()
            .unwrap_or_else(|| self.default_font_family.clone());
        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&self.fontdb);
        options.font_family = font_family.clone();

        let id = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(generation = id, "engine generation rebuilt");
        let generation = Arc::new(Generation {
            id,
            config: config.clone(),
            render_config,
            font_family,
            options: Arc::new(options),
            memo: Mutex::new(HashMap::new()),
        });
        *current = Some(Arc::clone(&generation));
        Ok(generation)
    }

    /// Run the component template and write the SVG document.
    pub async fn vectorize(
        &self,
        spec: &ComponentSpec,
        props: &Value,
        config: &Value,
        scaling: Scaling,
    ) -> Result<SvgDocument, RenderError> {
        let generation = self.generation(config)?;
        let node = spec.build(props, &generation.render_config)?;

        let (natural_w, natural_h) = intrinsic_size(&node);
        let width = generation.render_config.width.unwrap_or(natural_w);
        let height = generation.render_config.height.unwrap_or(natural_h);
        for (name, side) in [("width", width), ("height", height)] {
            if !side.is_finite() || side <= 0.0 || side > MAX_CANVAS {
                return Err(RenderError::InvalidRequest(format!(
                    "canvas {name} {side} outside (0, {MAX_CANVAS}]"
                )));
            }
        }

        let placed = layout(&node, width, height);
        let refs = collect_assets(&placed);
        let assets = self.resolve(&generation, &refs, scaling.emoji).await;
        let svg = write_svg(&placed, width, height, &assets, &generation.font_family);

        Ok(SvgDocument {
            svg,
            width,
            height,
            generation: generation.id,
            options: Arc::clone(&generation.options),
        })
    }

    async fn resolve(&self, generation: &Generation, refs: &AssetRefs, emoji_scale: f32) -> ResolvedAssets {
        let scale_milli = (emoji_scale.max(0.0) * 1000.0).round() as u32;
        let wanted: Vec<AssetKey> = refs
            .emoji
            .iter()
            .map(|code| AssetKey::Emoji {
                code: code.clone(),
                scale_milli,
            })
            .chain(refs.images.iter().cloned().map(AssetKey::Image))
            .collect();

        let mut resolved = ResolvedAssets::default();
        let mut missing = Vec::new();
        {
            let memo = generation.memo.lock().unwrap_or_else(|e| e.into_inner());
            for key in wanted {
                match memo.get(&key) {
                    Some(uri) => insert(&mut resolved, &key, uri.clone()),
                    None => missing.push(key),
                }
            }
        }

        let loads = missing.iter().map(|key| async move {
            match key {
                AssetKey::Emoji { code, .. } => self
                    .loader
                    .load_emoji(code, emoji_scale)
                    .await
                    .map(|png| png_data_uri(&png)),
                AssetKey::Image(url) => self
                    .loader
                    .load_image(url)
                    .await
                    .map(|png| png_data_uri(&png)),
            }
        });
        let results = join_all(loads).await;

        let mut memo = generation.memo.lock().unwrap_or_else(|e| e.into_inner());
        for (key, result) in missing.into_iter().zip(results) {
            match result {
                Ok(uri) => {
                    insert(&mut resolved, &key, uri.clone());
                    memo.insert(key, uri);
                }
                Err(e) => warn!(asset = ?key, "asset omitted: {e}"),
            }
        }
        resolved
    }
}

fn insert(resolved: &mut ResolvedAssets, key: &AssetKey, uri: String) {
    match key {
        AssetKey::Emoji { code, .. } => {
            resolved.emoji.insert(code.clone(), uri);
        }
        AssetKey::Image(url) => {
            resolved.images.insert(url.clone(), uri);
        }
    }
}

/// Reject a scale factor outside `(0, MAX_SCALE]`.
pub fn check_scale(name: &str, scale: f32) -> Result<(), RenderError> {
    if !scale.is_finite() || scale <= 0.0 || scale > MAX_SCALE {
        return Err(RenderError::InvalidRequest(format!(
            "{name} scale {scale} outside (0, {MAX_SCALE}]"
        )));
    }
    Ok(())
}

/// Rasterize at `scale`: output is `ceil(width * scale)` × `ceil(height * scale)`.
pub fn rasterize(doc: &SvgDocument, scale: f32) -> Result<Vec<u8>, RenderError> {
    check_scale("image", scale)?;

    let width = (doc.width * scale).ceil() as u32;
    let height = (doc.height * scale).ceil() as u32;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_RASTER_PIXELS {
        return Err(RenderError::InvalidRequest(format!(
            "{width}x{height} output exceeds {MAX_RASTER_PIXELS} pixels"
        )));
    }

    let tree = usvg::Tree::from_str(&doc.svg, &doc.options)
        .map_err(|e| RenderError::Raster(format!("SVG parse: {e}")))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| RenderError::Raster("pixmap allocation failed".to_string()))?;

    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    pixmap
        .encode_png()
        .map_err(|e| RenderError::Raster(format!("PNG encode: {e}")))
}
