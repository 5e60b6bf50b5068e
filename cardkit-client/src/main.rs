use std::path::PathBuf;

use cardkit_client::Dispatcher;
use cardkit_core::{Scaling, Settings};
use cardkit_render::Registry;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "cardkit", version, about = "Render cardkit components through the worker pool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render one component to an image file
    Render {
        /// Registered component name, e.g. Balance
        component: String,

        /// Component props as a JSON object
        #[arg(long, default_value = "{}")]
        props: String,

        /// Render config as a JSON object (width, height, accent, ...)
        #[arg(long, default_value = "{}")]
        config: String,

        /// Image scale factor
        #[arg(long, default_value_t = 1.0)]
        scale: f32,

        /// Emoji scale factor
        #[arg(long, default_value_t = 1.0)]
        emoji_scale: f32,

        /// Banner image URL composited behind the card
        #[arg(long)]
        banner: Option<String>,

        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// List registered components
    Components,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load_with_env()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.logging.level.as_str().into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Components => {
            for name in Registry::builtin().names() {
                println!("{name}");
            }
        }
        Commands::Render {
            component,
            props,
            config,
            scale,
            emoji_scale,
            banner,
            out,
        } => {
            let mut props: Value = serde_json::from_str(&props)?;
            let config: Value = serde_json::from_str(&config)?;
            if let Some(url) = banner
                && let Some(map) = props.as_object_mut()
            {
                map.insert("banner_url".to_string(), Value::String(url));
            }

            let dispatcher = Dispatcher::new(settings)?;
            let scaling = Scaling {
                image: scale,
                emoji: emoji_scale,
            };
            let result = dispatcher.render(&component, props, config, scaling).await;
            dispatcher.shutdown().await;
            let result = result?;

            tokio::fs::write(&out, &result.data).await?;
            info!(path = %out.display(), "output written");
            println!(
                "{} bytes ({}) written to {}",
                result.data.len(),
                result.content_type,
                out.display()
            );
        }
    }
    Ok(())
}
