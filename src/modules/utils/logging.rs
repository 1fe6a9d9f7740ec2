use env_logger::{Builder, WriteStyle};
use log::{info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize the logging system, writing to `path`.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn initialize_logging(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Auto)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Helper function to format sensitive data for logging
pub(crate) fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured logging for authentication events.
///
/// `subject` is an email or account id and is always masked.
pub fn log_auth_event(event_type: &str, subject: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Auth event: type={}, subject={}, success=true, details={:?}",
            event_type,
            format_sensitive(subject),
            details
        );
    } else {
        warn!(
            "Auth event: type={}, subject={}, success=false, details={:?}",
            event_type,
            format_sensitive(subject),
            details
        );
    }
}
