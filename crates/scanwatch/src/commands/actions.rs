use clap::ArgMatches;
use tracing::{error, info};

use scanwatch_core::{ActionResponse, InvoiceActions, InvoiceId, SyncError};

use super::helpers::{build_runtime, invoice_id_arg, load_config_with_warning};
use crate::color;

pub(crate) fn handle_retry_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let invoice_id = invoice_id_arg(matches)?;
    let config = load_config_with_warning();
    info!(event = "cli.retry_started", invoice_id = %invoice_id);

    let actions = InvoiceActions::from_config(&config)?;
    let result = build_runtime()?.block_on(actions.retry(invoice_id));
    report("retry", invoice_id, result)
}

pub(crate) fn handle_confirm_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let invoice_id = invoice_id_arg(matches)?;
    let config = load_config_with_warning();
    info!(event = "cli.confirm_started", invoice_id = %invoice_id);

    let actions = InvoiceActions::from_config(&config)?;
    let result = build_runtime()?.block_on(actions.confirm(invoice_id));
    report("confirm", invoice_id, result)
}

pub(crate) fn handle_reject_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let invoice_id = invoice_id_arg(matches)?;
    let reason = matches
        .get_one::<String>("reason")
        .ok_or("Reason argument is required")?;
    let config = load_config_with_warning();
    info!(event = "cli.reject_started", invoice_id = %invoice_id);

    let actions = InvoiceActions::from_config(&config)?;
    let result = build_runtime()?.block_on(actions.reject(invoice_id, reason));
    report("reject", invoice_id, result)
}

fn report(
    action: &str,
    invoice_id: InvoiceId,
    result: Result<ActionResponse, SyncError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(response) => {
            println!("✅ {} accepted for invoice {}", action, invoice_id);
            println!("   Status: {}", color::status(response.status));
            if !response.message.is_empty() {
                println!("   {}", response.message);
            }
            info!(
                event = "cli.action_completed",
                action = action,
                invoice_id = %invoice_id,
                status = %response.status,
            );
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                color::error(&format!(
                    "❌ Failed to {} invoice {}: {}",
                    action, invoice_id, e
                ))
            );
            error!(
                event = "cli.action_failed",
                action = action,
                invoice_id = %invoice_id,
                error = %e,
                error_code = e.error_code(),
            );
            Err(e.into())
        }
    }
}
