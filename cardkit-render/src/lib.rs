pub mod assets;
pub mod banner;
pub mod components;
pub mod engine;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod registry;

pub use assets::{AssetLoader, HttpAssetLoader};
pub use engine::{Engine, RenderConfig, SvgDocument, rasterize};
pub use error::{AssetError, RenderError, TemplateError};
pub use pipeline::Renderer;
pub use registry::{ComponentSpec, Registry};
