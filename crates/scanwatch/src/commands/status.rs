use std::sync::Arc;

use clap::ArgMatches;
use tracing::{error, info};

use scanwatch_core::{HttpStatusFetcher, StatusSync};

use super::helpers::{build_runtime, invoice_id_arg, load_config_with_warning, print_snapshot};
use crate::color;

pub(crate) fn handle_status_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let invoice_id = invoice_id_arg(matches)?;
    let json_output = matches.get_flag("json");
    let config = load_config_with_warning();

    info!(
        event = "cli.status_started",
        invoice_id = %invoice_id,
        json_output = json_output,
        backend = %config.backend.base_url(),
    );

    let fetcher = Arc::new(HttpStatusFetcher::from_config(&config)?);
    let runtime = build_runtime()?;

    let result = runtime.block_on(async {
        let sync = StatusSync::new(&config, fetcher);
        let view = sync.view(Some(invoice_id));
        view.refresh().await
    });

    match result {
        Ok(Some(snapshot)) => {
            if json_output {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
            info!(
                event = "cli.status_completed",
                invoice_id = %invoice_id,
                status = %snapshot.status,
            );
            Ok(())
        }
        Ok(None) => Err("No invoice selected".into()),
        Err(e) => {
            eprintln!(
                "{}",
                color::error(&format!(
                    "❌ Failed to fetch status for invoice {}: {}",
                    invoice_id, e
                ))
            );
            error!(
                event = "cli.status_failed",
                invoice_id = %invoice_id,
                error = %e,
                error_code = e.error_code(),
            );
            Err(e.into())
        }
    }
}
