use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr tracing subscriber
///
/// `RUST_LOG` takes precedence over `default_directive`. Noisy HTTP client
/// targets are capped at `warn`. Calling this when a global subscriber is
/// already set is a no-op.
pub fn init_logging(default_directive: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .with_context(|| format!("invalid log directive {:?}", default_directive))?
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper=warn".parse()?),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .try_init();
    if installed.is_err() {
        tracing::debug!("[logging] subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("info").unwrap();
        init_logging("debug").unwrap();
    }

    #[test]
    fn test_rejects_garbage_directive() {
        // Only reachable when RUST_LOG is unset
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_logging("dav_sync=loud").is_err());
        }
    }
}
