//! Logging setup
//!
//! Installs a `tracing-subscriber` registry writing to stderr, so stdout stays
//! reserved for command output (tree listings, bindings, log streams).
//!
//! ## Environment Variables
//!
//! * `NOCALHOST_LOG_FORMAT` - "json" for structured output, anything else for text
//! * `NOCALHOST_LOG` - filter directives (falls back to `RUST_LOG`, then `info`)
//! * `NOCALHOST_LOG_SPAN_EVENTS` - comma separated span events (`none,new,close,enter,exit,active,full`)

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize logging once; later calls are no-ops.
///
/// `format` takes precedence over `NOCALHOST_LOG_FORMAT`; the default is text.
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("NOCALHOST_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("NOCALHOST_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid NOCALHOST_LOG directive '{}', using default 'info'",
                spec
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn span_events_for_format(format: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    if let Ok(raw) = std::env::var("NOCALHOST_LOG_SPAN_EVENTS") {
        return parse_span_events(&raw);
    }

    match format {
        "json" => FmtSpan::NEW | FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

fn parse_span_events(raw: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    let mut acc = FmtSpan::NONE;
    for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
        acc |= match token.as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        };
    }
    acc
}

/// Whether [`init`] has already run
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing_subscriber::fmt::format::FmtSpan;

    #[test]
    #[serial]
    fn test_init_multiple_calls_safe() {
        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("invalid")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_parse_span_events() {
        assert_eq!(parse_span_events("none"), FmtSpan::NONE);
        assert_eq!(parse_span_events("new,close"), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(parse_span_events("NEW | exit"), FmtSpan::NEW | FmtSpan::EXIT);
        assert_eq!(parse_span_events("bogus"), FmtSpan::NONE);
    }

    #[test]
    #[serial]
    fn test_span_events_default_by_format() {
        std::env::remove_var("NOCALHOST_LOG_SPAN_EVENTS");
        assert_eq!(span_events_for_format("text"), FmtSpan::NONE);
        assert_eq!(
            span_events_for_format("json"),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
    }

    #[test]
    #[serial]
    fn test_env_filter_with_env_vars() {
        std::env::set_var("NOCALHOST_LOG", "nocalhost_core=trace");
        let _filter = create_env_filter();
        std::env::set_var("NOCALHOST_LOG", "invalid_spec_@@[");
        let _filter = create_env_filter();
        std::env::remove_var("NOCALHOST_LOG");
    }
}
