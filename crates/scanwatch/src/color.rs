//! CLI color helpers.
//!
//! All functions respect `NO_COLOR`, `FORCE_COLOR` and TTY detection via
//! `owo-colors`' `if_supports_color()`. The `--no-color` flag sets an
//! in-process flag that bypasses owo-colors entirely.

use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use owo_colors::Stream::{Stderr, Stdout};
use scanwatch_core::InvoiceStatus;

static NO_COLOR_FLAG: AtomicBool = AtomicBool::new(false);

/// Call once from main.rs when `--no-color` is passed.
pub fn set_no_color() {
    NO_COLOR_FLAG.store(true, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl Rgb {
    const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }
}

const INK: Rgb = Rgb::from_hex(0x7CB4C8); // In progress
const STAMP: Rgb = Rgb::from_hex(0x6B8F5E); // Processed
const AMBER: Rgb = Rgb::from_hex(0xC49A5C); // Needs a human
const SEAL: Rgb = Rgb::from_hex(0xB87060); // Failed/rejected
const MUTED: Rgb = Rgb::from_hex(0x5C6370);

fn no_color() -> bool {
    NO_COLOR_FLAG.load(Ordering::Relaxed)
}

fn paint(text: &str, rgb: Rgb) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stdout, |t| t.truecolor(rgb.r, rgb.g, rgb.b))
        .to_string()
}

pub fn bold(text: &str) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stdout, |t| t.bold()).to_string()
}

pub fn muted(text: &str) -> String {
    paint(text, MUTED)
}

/// Color-code an invoice lifecycle state.
pub fn status(status: InvoiceStatus) -> String {
    let text = status.as_str();
    match status {
        InvoiceStatus::Pending | InvoiceStatus::Processing => paint(text, INK),
        InvoiceStatus::WaitingValidation => paint(text, AMBER),
        InvoiceStatus::Processed => paint(text, STAMP),
        InvoiceStatus::Failed | InvoiceStatus::Rejected => paint(text, SEAL),
        InvoiceStatus::Duplicated => paint(text, MUTED),
    }
}

/// Apply error styling (for stderr messages).
pub fn error(text: &str) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stderr, |t| t.truecolor(SEAL.r, SEAL.g, SEAL.b))
        .to_string()
}

/// Apply warning styling (for stderr messages).
pub fn warning(text: &str) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stderr, |t| t.truecolor(AMBER.r, AMBER.g, AMBER.b))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_hex() {
        let c = Rgb::from_hex(0x7CB4C8);
        assert_eq!(c.r, 124);
        assert_eq!(c.g, 180);
        assert_eq!(c.b, 200);
    }

    #[test]
    fn test_status_keeps_text_when_disabled() {
        set_no_color();
        for status_value in InvoiceStatus::ALL {
            assert_eq!(status(status_value), status_value.as_str());
        }
        assert_eq!(error("boom"), "boom");
    }
}
