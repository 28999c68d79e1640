use clap::ArgMatches;
use tracing::warn;

use scanwatch_config::apply_env_overrides;
use scanwatch_core::{InvoiceId, InvoiceStatusSnapshot, ScanwatchConfig};

use crate::color;

/// Load configuration with warning on errors.
///
/// Falls back to defaults (environment overrides still applied) if config
/// loading fails, but notifies the user via:
/// - stderr message for immediate visibility
/// - structured log event `cli.config.load_failed` for debugging
pub fn load_config_with_warning() -> ScanwatchConfig {
    match ScanwatchConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{}",
                color::warning(&format!(
                    "Warning: Could not load config: {}. Using defaults.\n\
                     Tip: Check ~/.scanwatch/config.toml and ./.scanwatch/config.toml for syntax errors.",
                    e
                ))
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                "Config load failed, using defaults"
            );
            apply_env_overrides(ScanwatchConfig::default()).unwrap_or_default()
        }
    }
}

/// Read the positional invoice id, rejecting non-positive values.
pub fn invoice_id_arg(matches: &ArgMatches) -> Result<InvoiceId, Box<dyn std::error::Error>> {
    let raw = *matches
        .get_one::<i64>("invoice-id")
        .ok_or("Invoice id argument is required")?;
    InvoiceId::new(raw).map_err(|e| {
        eprintln!("{}", color::error(&format!("❌ {}", e)));
        e.into()
    })
}

/// Runtime for the async core. Commands are otherwise synchronous.
pub fn build_runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Multi-line human-readable rendering of a snapshot.
pub fn print_snapshot(snapshot: &InvoiceStatusSnapshot) {
    println!("{}", color::bold(&format!("📄 Invoice {}", snapshot.invoice_id)));
    println!("   Status:   {}", color::status(snapshot.status));
    println!("   Progress: {}%", snapshot.progress);
    if !snapshot.message.is_empty() {
        println!("   Message:  {}", snapshot.message);
    }
    if !snapshot.log_events.is_empty() {
        println!("   Events:   {}", snapshot.log_events.join(", "));
    }
    println!(
        "   Received: {}",
        color::muted(&snapshot.received_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    );
}

/// One-line rendering used for each change while watching.
pub fn format_change_line(snapshot: &InvoiceStatusSnapshot) -> String {
    let mut line = format!(
        "{} {:<20} {:>3}%",
        color::muted(&snapshot.received_at.format("%H:%M:%S").to_string()),
        color::status(snapshot.status),
        snapshot.progress
    );
    if !snapshot.message.is_empty() {
        line.push_str("  ");
        line.push_str(&snapshot.message);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwatch_core::InvoiceStatus;

    #[test]
    fn test_format_change_line_includes_progress_and_message() {
        crate::color::set_no_color();
        let snapshot = InvoiceStatusSnapshot {
            status: InvoiceStatus::Processing,
            progress: 45,
            message: "OCR in progress".to_string(),
            ..InvoiceStatusSnapshot::seed(InvoiceId::new(42).unwrap())
        };
        let line = format_change_line(&snapshot);
        assert!(line.contains("processing"));
        assert!(line.contains(" 45%"));
        assert!(line.ends_with("OCR in progress"));
    }
}
