use scanwatch_core::{init_file_logging, init_logging};

mod app;
pub(crate) mod color;
mod commands;

fn main() {
    let app = app::build_cli();
    let matches = app.get_matches();

    // Handle --no-color before any output
    if matches.get_flag("no-color") {
        color::set_no_color();
    }

    let verbose = matches.get_flag("verbose");
    let quiet = !verbose;
    match commands::watch_log_path(&matches) {
        Some(path) => init_file_logging(&path, quiet),
        None => init_logging(quiet),
    }

    if let Err(e) = commands::run_command(&matches) {
        // Error already printed to user via eprintln! in command handlers.
        // Exit with non-zero code without printing Rust's Debug representation.
        drop(e);
        std::process::exit(1);
    }
}
