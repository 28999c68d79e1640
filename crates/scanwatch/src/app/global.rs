use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("scanwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Follow invoice processing status from the terminal")
        .long_about("scanwatch keeps a live view of an invoice's processing status by polling the invoice backend and merging push notifications. It can print a single status, watch an invoice until it settles, and retry or reject invoices.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
