use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize diagnostics logging on stderr.
///
/// The level comes from `level` unless `RUST_LOG` is set. User-facing
/// progress lines are not logged here; they go through the CLI output writer.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let default_filter = format!("gmat_sweep={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    tracing::debug!("logging initialized (filter={default_filter})");
    Ok(())
}
