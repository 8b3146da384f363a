//! Centralised tracing initialisation for the fixcheck binary.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter` and optional JSON formatting.
//!
//! Log lines always go to stderr. Stdout belongs to the check report, which
//! CI logs and `--format json` consumers parse, so the two never interleave.
//!
//! Safe to call more than once: subsequent calls are silently ignored
//! (the global subscriber can only be set once per process).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Targets whose verbosity follows `--verbose`.
const HARNESS_TARGETS: &[&str] = &["fixcheck", "fixcheck_cli", "fixcheck_ci", "fixcheck_core"];

/// Filter directives used when `RUST_LOG` is not set.
///
/// The harness crates log at `level`; everything else (tokio, dependency
/// crates) stays at `warn` so `--verbose` does not drown the step events.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        HARNESS_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_lowercase())),
    );
    directives.join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines
///   (for CI systems that ingest structured logs).
/// * `level`: verbosity of the harness crates when `RUST_LOG` is not set.
///
/// Respects the `RUST_LOG` environment variable for fine-grained filtering.
/// If `RUST_LOG` is not set, falls back to [`default_directives`].
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging after second init");
    }

    #[test]
    fn default_directives_scope_level_to_harness() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("fixcheck_ci=debug"));
        assert!(directives.contains("fixcheck_core=debug"));
        assert!(!directives.contains("tokio"));
    }

    #[test]
    fn default_directives_parse() {
        for level in [Level::INFO, Level::DEBUG] {
            assert!(EnvFilter::try_new(default_directives(level)).is_ok());
        }
    }
}
