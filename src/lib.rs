//! SquareCam - record a short camera clip, crop it square, resize it.
//!
//! This is the main library crate for the SquareCam command line tool.
//! It provides the capture session, the recording state machine, the
//! countdown timer and the post-capture transform pipeline.

pub mod capture;
pub mod commands;
pub mod config;
pub mod export;
pub mod recorder;
pub mod timer;
pub mod utils;

#[cfg(test)]
mod testing;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "squarecam=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting SquareCam v{}", env!("CARGO_PKG_VERSION"));
}
