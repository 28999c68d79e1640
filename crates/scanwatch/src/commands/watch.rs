use std::path::PathBuf;
use std::sync::Arc;

use clap::ArgMatches;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use scanwatch_core::{
    HttpStatusFetcher, InvoiceId, ScanwatchConfig, StatusSync, SyncError, ViewState,
};
use scanwatch_paths::ScanwatchPaths;

use super::helpers::{build_runtime, format_change_line, invoice_id_arg, load_config_with_warning};
use super::json_types::WatchEvent;
use crate::color;

/// Log file for `watch --log-file`, if that was requested and home resolves.
pub fn watch_log_path(matches: &ArgMatches) -> Option<PathBuf> {
    let (name, sub_matches) = matches.subcommand()?;
    if name != "watch" || !sub_matches.get_flag("log-file") {
        return None;
    }
    let invoice_id = *sub_matches.get_one::<i64>("invoice-id")?;

    match ScanwatchPaths::resolve() {
        Ok(paths) => Some(paths.watch_log_file(invoice_id)),
        Err(e) => {
            eprintln!(
                "{}",
                color::warning(&format!("Warning: Cannot write log file: {}", e))
            );
            None
        }
    }
}

struct WatchOptions {
    invoice_id: InvoiceId,
    json_output: bool,
    push_stdin: bool,
}

pub(crate) fn handle_watch_command(
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = WatchOptions {
        invoice_id: invoice_id_arg(matches)?,
        json_output: matches.get_flag("json"),
        push_stdin: matches.get_flag("push-stdin"),
    };

    let mut config = load_config_with_warning();
    if let Some(interval_ms) = matches.get_one::<u64>("interval-ms") {
        config.polling.interval_ms = Some(*interval_ms);
    }

    info!(
        event = "cli.watch_started",
        invoice_id = %options.invoice_id,
        backend = %config.backend.base_url(),
        interval_ms = config.polling.interval().as_millis() as u64,
        push_stdin = options.push_stdin,
    );

    let runtime = build_runtime()?;
    let result = runtime.block_on(run_watch(config, &options));
    // A pending stdin read would otherwise keep the runtime alive.
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            info!(event = "cli.watch_completed", invoice_id = %options.invoice_id);
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                color::error(&format!(
                    "❌ Failed to watch invoice {}: {}",
                    options.invoice_id, e
                ))
            );
            error!(
                event = "cli.watch_failed",
                invoice_id = %options.invoice_id,
                error = %e,
            );
            Err(e.into())
        }
    }
}

async fn run_watch(config: ScanwatchConfig, options: &WatchOptions) -> Result<(), SyncError> {
    let invoice_id = options.invoice_id;
    let fetcher = Arc::new(HttpStatusFetcher::from_config(&config)?);
    let sync = StatusSync::new(&config, fetcher);
    let view = sync.view(Some(invoice_id));
    let mut changes = view.changes();

    let cancel = CancellationToken::new();
    let push_feed = options.push_stdin.then(|| {
        let adapter = sync.push_adapter();
        let cancel = cancel.clone();
        tokio::spawn(async move { adapter.run(stdin_frames(), cancel).await })
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printer = ChangePrinter::new(invoice_id, options.json_output);
    let mut state = changes.borrow_and_update().clone();

    loop {
        printer.print(&state);

        if let Some(snapshot) = &state.status
            && snapshot.status.is_terminal()
        {
            info!(
                event = "cli.watch_settled",
                invoice_id = %invoice_id,
                status = %snapshot.status,
            );
            break;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                info!(event = "cli.watch_interrupted", invoice_id = %invoice_id);
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        state = changes.borrow_and_update().clone();
    }

    cancel.cancel();
    if let Some(feed) = push_feed {
        match feed.await {
            Ok(stats) => info!(
                event = "cli.watch_push_stats",
                frames = stats.frames,
                applied = stats.applied,
                malformed = stats.malformed,
            ),
            Err(e) => warn!(event = "cli.watch_push_task_failed", error = %e),
        }
    }
    if let Some(stats) = sync.driver().stats(invoice_id) {
        info!(
            event = "cli.watch_poll_stats",
            fetches = stats.fetches,
            skipped_ticks = stats.skipped_ticks,
            failures = stats.failures,
        );
    }

    Ok(())
}

/// Lines of stdin as push frames. Ends at EOF or on a read error.
fn stdin_frames() -> impl Stream<Item = String> + Send + 'static {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    futures::stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                warn!(event = "cli.watch_stdin_failed", error = %e);
                None
            }
        }
    })
}

/// Prints each published view state.
struct ChangePrinter {
    invoice_id: InvoiceId,
    json_output: bool,
    last_error: Option<SyncError>,
}

impl ChangePrinter {
    fn new(invoice_id: InvoiceId, json_output: bool) -> Self {
        Self {
            invoice_id,
            json_output,
            last_error: None,
        }
    }

    fn print(&mut self, state: &ViewState) {
        if self.json_output {
            match serde_json::to_string(&WatchEvent::from_state(self.invoice_id, state)) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(event = "cli.watch_serialize_failed", error = %e),
            }
        } else {
            self.print_human(state);
        }
        self.last_error = state.error.clone();
    }

    fn print_human(&self, state: &ViewState) {
        if state.error != self.last_error
            && let Some(e) = &state.error
        {
            eprintln!("{}", color::warning(&format!("⚠️  {}", e)));
        }

        match &state.status {
            Some(snapshot) if snapshot.observed_at.0 > 0 => {
                println!("{}", format_change_line(snapshot));
            }
            _ if state.loading => println!("{}", color::muted("… loading")),
            _ => {}
        }
    }
}
