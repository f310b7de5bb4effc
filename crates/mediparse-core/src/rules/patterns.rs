//! Common regex patterns for German price tables.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Amounts with German separators: 1.234,56 / 1234,5 / 1234
    pub static ref AMOUNT_GERMAN: Regex = Regex::new(
        r"^-?(?:\d{1,3}(?:\.\d{3})+|\d+)(?:,\d+)?$"
    ).unwrap();

    // Amounts with a decimal point: 125.50
    pub static ref AMOUNT_DOT_DECIMAL: Regex = Regex::new(
        r"^-?\d+\.\d{1,2}$"
    ).unwrap();

    // Currency markers around amounts
    pub static ref CURRENCY_MARKER: Regex = Regex::new(
        r"(?i)€|\bEUR\b|\bEuro\b"
    ).unwrap();

    // German dates: 01.04.2024 / 1.4.24
    pub static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})\.(\d{1,2})\.(\d{4}|\d{2})$"
    ).unwrap();

    // ISO dates: 2024-04-01
    pub static ref DATE_ISO: Regex = Regex::new(
        r"^(\d{4})-(\d{1,2})-(\d{1,2})$"
    ).unwrap();

    // Runs of whitespace, including line breaks inside header cells
    pub static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Lowercase and collapse whitespace for header comparison.
pub fn normalize_header(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_lowercase()
}
