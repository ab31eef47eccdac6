//! tracing configuration

use anyhow::Result;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        self,
        format::{Format, PrettyFields},
    },
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// log as "json", "pretty" or "standard" (unstructured)
static DEFAULT_LOG_FORMAT: &str = "standard";

/// Initialize the tracing subscriber. Level comes from the cli/env log
/// argument, format from LOG_FORMAT.
pub fn init(log: &str) -> Result<()> {
    let log_frmt =
        std::env::var("LOG_FORMAT").unwrap_or_else(|_| DEFAULT_LOG_FORMAT.to_owned());

    let filter = EnvFilter::try_new(log).or_else(|_| EnvFilter::try_new("info"))?;

    match &log_frmt[..] {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(Format::default().pretty().with_source_location(false))
                        .fmt_fields(PrettyFields::new()),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}
