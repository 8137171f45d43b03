//! Subscriber set-up shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber. `RUST_LOG` wins when set; otherwise
/// `info`, or `debug` with `verbose`.
pub fn init_tracing(verbose: bool) {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(from_env.as_deref(), verbose))
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter(directives: Option<&str>, verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn defaults_to_info() {
        assert_eq!(env_filter(None, false).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn verbose_raises_to_debug() {
        assert_eq!(env_filter(None, true).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn rust_log_overrides_verbose() {
        assert_eq!(env_filter(Some("warn"), true).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn malformed_rust_log_falls_back() {
        assert_eq!(
            env_filter(Some("catloss=loud"), false).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
