use clap::{Arg, ArgAction, Command};

fn invoice_id_arg() -> Arg {
    Arg::new("invoice-id")
        .help("Backend id of the invoice")
        .required(true)
        .index(1)
        .value_parser(clap::value_parser!(i64))
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .help("Output in JSON format")
        .action(ArgAction::SetTrue)
}

pub fn status_command() -> Command {
    Command::new("status")
        .about("Fetch and show the current status of an invoice")
        .arg(invoice_id_arg())
        .arg(json_arg())
}

pub fn watch_command() -> Command {
    Command::new("watch")
        .about("Follow an invoice's status until it settles or Ctrl-C")
        .arg(invoice_id_arg())
        .arg(json_arg().help("Print one JSON object per change"))
        .arg(
            Arg::new("push-stdin")
                .long("push-stdin")
                .help("Merge push frames read from stdin, one JSON object per line")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .help("Polling interval in milliseconds (overrides config)")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write debug logs to ~/.scanwatch/logs/watch-<id>.jsonl")
                .action(ArgAction::SetTrue),
        )
}

pub fn retry_command() -> Command {
    Command::new("retry")
        .about("Send a failed or rejected invoice back through processing")
        .arg(invoice_id_arg())
}

pub fn confirm_command() -> Command {
    Command::new("confirm")
        .about("Confirm the extracted data of an invoice waiting for validation")
        .arg(invoice_id_arg())
}

pub fn reject_command() -> Command {
    Command::new("reject")
        .about("Reject an invoice")
        .arg(invoice_id_arg())
        .arg(
            Arg::new("reason")
                .long("reason")
                .short('r')
                .help("Why the invoice is rejected")
                .required(true),
        )
}
