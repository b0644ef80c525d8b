//! Structured logging initialization for the pipeline core.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize a global `tracing` subscriber.
///
/// Honors `RUST_LOG` if set; otherwise defaults to `forge=info,warn`, or
/// `forge=debug,info` when `verbose` is requested.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("forge=debug,info")
            } else {
                EnvFilter::try_new("forge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(use_color())
                .with_thread_ids(false),
        )
        .try_init()?;

    Ok(())
}
