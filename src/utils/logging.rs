use std::{path::Path, sync::LazyLock};

use anyhow::{anyhow, Result};
use tracing::{debug, level_filters::LevelFilter};
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::MakeWriterExt},
    EnvFilter,
};

pub const CLI_PREFIX: &str = "cli";

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");
const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;
/// Http plumbing is noisy below warn and never useful for attendance issues.
const QUIET_TARGETS: &[&str] = &["reqwest", "hyper"];

/// Builds the filter for the subscriber. An explicit level wins, then `RUST_LOG`. A bare level in
/// `RUST_LOG` is scoped to this crate, anything with targets is taken as is.
pub fn filter_directive(level: Option<LevelFilter>, rust_log: Option<&str>) -> String {
    let rust_log = rust_log.map(str::trim).filter(|v| !v.is_empty());
    if let (None, Some(raw)) = (level, rust_log) {
        if raw.contains('=') || raw.contains(',') {
            return raw.to_string();
        }
    }

    let level = level
        .or_else(|| rust_log.and_then(|v| v.parse::<LevelFilter>().ok()))
        .unwrap_or(DEFAULT_LEVEL);
    let mut directive = format!("{CRATE_TARGET}={}", level.to_string().to_lowercase());
    for target in QUIET_TARGETS {
        directive.push_str(&format!(",{target}=warn"));
    }
    directive
}

/// Sends events to daily rotated files named after `prefix`, and to stdout when `show_std` is set.
pub fn enable_logging(
    prefix: &str,
    log_dir: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(prefix)
        .build(log_dir)?;

    let stdout = std::io::stdout.with_filter(move |_| show_std);
    let directive = filter_directive(log_level, std::env::var("RUST_LOG").ok().as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&directive)?)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stdout.and(appender))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {e}"))?;

    debug!(?log_dir, %directive, "Logging enabled");
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::EnvFilter;

    use super::filter_directive;

    #[test]
    fn defaults_to_info_for_the_crate() {
        assert_eq!(
            filter_directive(None, None),
            "shiftclock=info,reqwest=warn,hyper=warn"
        );
        assert_eq!(
            filter_directive(None, Some("  ")),
            "shiftclock=info,reqwest=warn,hyper=warn"
        );
    }

    #[test]
    fn explicit_level_beats_the_environment() {
        assert_eq!(
            filter_directive(Some(LevelFilter::TRACE), Some("shiftclock=error")),
            "shiftclock=trace,reqwest=warn,hyper=warn"
        );
    }

    #[test]
    fn bare_env_level_is_scoped_to_the_crate() {
        assert_eq!(
            filter_directive(None, Some("debug")),
            "shiftclock=debug,reqwest=warn,hyper=warn"
        );
        assert_eq!(
            filter_directive(None, Some("loud")),
            "shiftclock=info,reqwest=warn,hyper=warn"
        );
    }

    #[test]
    fn targeted_env_filter_is_kept() {
        let directive = filter_directive(None, Some("shiftclock=warn,reqwest=debug"));
        assert_eq!(directive, "shiftclock=warn,reqwest=debug");
        assert!(EnvFilter::try_new(&directive).is_ok());
    }
}
