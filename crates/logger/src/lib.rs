use std::env;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the process-wide tracing subscriber.
///
/// `RUST_LOG` selects levels (default: info); `RUST_LOG_FORMAT=json`
/// switches the output to line-delimited JSON.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let layer = match env::var("RUST_LOG_FORMAT").unwrap_or_default().as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry().with(layer).init();
}
