mod global;
mod invoice;


use clap::Command;

pub fn build_cli() -> Command {
    global::root_command()
        .subcommand(invoice::status_command())
        .subcommand(invoice::watch_command())
        .subcommand(invoice::retry_command())
        .subcommand(invoice::confirm_command())
        .subcommand(invoice::reject_command())
}
