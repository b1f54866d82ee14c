//! ytpmix Core Library
//!
//! Compiles declarative YTP-style effect configurations (stutter, scramble,
//! reverse, pitch shift, chroma key, overlays, subtitle burn-in) into FFmpeg
//! filter graphs and drives the export through the external engine.
//!
//! The interesting part lives in [`core::effects`]: the segment planner, the
//! tempo decomposer, the typed filter graph and the pipeline orchestrator.
//! Everything around it (project state, plugins, jobs, settings) is plumbing
//! for getting a compiled graph in front of FFmpeg.

pub mod core;

use std::path::Path;
use std::sync::OnceLock;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// Logs go to stderr, keeping stdout free for command output, and to a daily
/// rolling file when `log_dir` is given. `RUST_LOG` refines the default INFO
/// level. Calling this twice is harmless; the second subscriber is simply not
/// installed.
pub fn init_logging(log_dir: Option<&Path>) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {}", dir.display(), e);
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(dir, "ytpmix.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    // Avoid panics if already initialized (tests, repeated CLI setup).
    let _ = tracing::subscriber::set_global_default(subscriber);
}
