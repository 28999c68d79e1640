use clap::ArgMatches;
use tracing::error;

mod actions;
mod helpers;
mod json_types;
mod status;
mod watch;

pub use watch::watch_log_path;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    match matches.subcommand() {
        Some(("status", sub_matches)) => status::handle_status_command(sub_matches),
        Some(("watch", sub_matches)) => watch::handle_watch_command(sub_matches),
        Some(("retry", sub_matches)) => actions::handle_retry_command(sub_matches),
        Some(("confirm", sub_matches)) => actions::handle_confirm_command(sub_matches),
        Some(("reject", sub_matches)) => actions::handle_reject_command(sub_matches),
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    }
}
