use std::sync::Arc;

use cardkit_core::props::coerce_fields;
use cardkit_core::{ContentType, RenderRequest, RenderResult, Settings};
use tracing::{debug, info, warn};

use crate::assets::{AssetLoader, HttpAssetLoader};
use crate::banner::Compositor;
use crate::engine::{Engine, check_scale, rasterize};
use crate::error::RenderError;
use crate::registry::Registry;

/// Full request path: registry lookup, coercion, layout, raster, banner.
pub struct Renderer {
    registry: Registry,
    engine: Arc<Engine>,
    compositor: Option<Compositor>,
}

impl Renderer {
    /// Build the production renderer. Loads fonts, so call it from a
    /// blocking context.
    pub fn new(settings: &Settings) -> Result<Self, RenderError> {
        let loader: Arc<dyn AssetLoader> = Arc::new(
            HttpAssetLoader::new(&settings.assets)
                .map_err(|e| RenderError::Setup(e.to_string()))?,
        );
        let engine = Engine::new(&settings.assets, loader)?;
        let compositor = Compositor::new(&settings.banner, settings.assets.resolved_cache_dir())
            .map_err(|e| RenderError::Setup(e.to_string()))?;
        Ok(Self::with_parts(Registry::builtin(), engine, Some(compositor)))
    }

    pub fn with_parts(registry: Registry, engine: Engine, compositor: Option<Compositor>) -> Self {
        Self {
            registry,
            engine: Arc::new(engine),
            compositor,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let spec = self.registry.get(&request.component)?;
        let scale = request.scaling.image;
        check_scale("image", scale)?;
        check_scale("emoji", request.scaling.emoji)?;

        let mut props = request.props.clone();
        let coerced = coerce_fields(&mut props, spec.numeric_fields);
        if coerced > 0 {
            debug!(request_id = %request.id, coerced, "numeric props coerced");
        }

        let doc = self
            .engine
            .vectorize(spec, &props, &request.config, request.scaling)
            .await?;
        let png = tokio::task::spawn_blocking(move || rasterize(&doc, scale))
            .await
            .map_err(|e| RenderError::Raster(format!("raster task failed: {e}")))??;

        let banner_url = props
            .get("banner_url")
            .and_then(|v| v.as_str())
            .filter(|url| !url.is_empty());
        if let (Some(url), Some(compositor)) = (banner_url, &self.compositor) {
            match compositor.apply(png.clone(), url).await {
                Ok(result) => {
                    info!(
                        request_id = %request.id,
                        component = %request.component,
                        banner_outcome = "applied",
                        content_type = %result.content_type,
                        "banner composited"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        component = %request.component,
                        banner_outcome = "skipped",
                        reason = %e,
                        "banner dropped, returning plain card"
                    );
                }
            }
        }

        Ok(RenderResult {
            content_type: ContentType::Png,
            data: png,
        })
    }
}
