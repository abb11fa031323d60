//! Logger configuration and output formatting.
//!
//! Two formats, chosen at startup: JSON lines for log aggregation (the
//! default in deployments) and an aligned, optionally colored text format
//! for interactive runs. Level filtering follows `RUST_LOG`; `NO_COLOR`
//! disables coloring in text mode.

use chrono::Utc;
use env_logger::Builder;
use serde_json::json;
use std::env;
use std::io::Write;

/// Visible width of the `[LEVEL]` column including padding.
const LEVEL_FIELD_WIDTH: usize = 8;

/// Configure and initialize the logging system.
///
/// Call once during startup, before any component logs. `json_format`
/// selects JSON lines; otherwise the aligned text format is used.
///
/// # JSON Format
///
/// ```text
/// {"timestamp":"2026-03-15T10:30:00Z","level":"INFO","target":"hermes_rs::routes::gateway","message":"..."}
/// ```
///
/// # Text Format
///
/// ```text
/// 2026-03-15T10:30:00Z | [INFO]  | hermes_rs::routes::gateway | Gateway starting on 127.0.0.1:8880
/// ```
pub fn configure_logger(json_format: bool) {
    let mut builder = Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if json_format {
        builder.format(|buf, record| {
            let line = json!({
                "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "level": record.level().to_string(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    } else {
        let no_color = env::var("NO_COLOR").is_ok();

        builder.format(move |buf, record| {
            let level = record.level();
            let level_plain = format!("[{}]", level);
            let padding = LEVEL_FIELD_WIDTH.saturating_sub(level_plain.len()).max(1);

            let level_display = if no_color {
                level_plain
            } else {
                let color = match level {
                    log::Level::Error => "\x1b[31m",
                    log::Level::Warn => "\x1b[33m",
                    log::Level::Info => "\x1b[32m",
                    log::Level::Debug => "\x1b[34m",
                    log::Level::Trace => "\x1b[35m",
                };
                format!("{}{}\x1b[0m", color, level_plain)
            };

            writeln!(
                buf,
                "{} | {}{}| {} | {}",
                Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                level_display,
                " ".repeat(padding),
                record.target(),
                record.args(),
            )
        });
    }

    // try_init so repeated calls in tests stay harmless
    let _ = builder.try_init();
}
