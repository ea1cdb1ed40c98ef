use anyhow::Context;
use flightdeck_server::{ServerBuilder, apply_logging_level, init_tracing, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config_path = resolve_config_path();
    let config = load_config(config_path.as_deref())
        .with_context(|| format!("loading config from {config_path:?}"))?;
    apply_logging_level(&config.logging.level);

    tracing::info!(
        config = config_path.as_deref().unwrap_or("<defaults>"),
        "Starting flightdeck-server"
    );

    ServerBuilder::new(config).build().run().await
}

/// Config path precedence: `--config <path>`, then `FLIGHTDECK_CONFIG`,
/// then `flightdeck.toml` in the working directory.
fn resolve_config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }

    if let Ok(path) = std::env::var("FLIGHTDECK_CONFIG") {
        return Some(path);
    }

    Some("flightdeck.toml".to_string())
}
