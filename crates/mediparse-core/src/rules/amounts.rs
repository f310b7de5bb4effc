//! Price amounts in German notation.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{AMOUNT_DOT_DECIMAL, AMOUNT_GERMAN, CURRENCY_MARKER};

/// Parse a German-formatted amount (e.g., "1.234,56 €" or "125.50").
pub fn parse_german_amount(s: &str) -> Option<Decimal> {
    let without_currency = CURRENCY_MARKER.replace_all(s, "");
    let cleaned: String = without_currency
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    // Thousands dots win over a decimal point: "1.500" is fifteen hundred
    let normalized = if AMOUNT_GERMAN.is_match(&cleaned) {
        cleaned.replace('.', "").replace(',', ".")
    } else if AMOUNT_DOT_DECIMAL.is_match(&cleaned) {
        cleaned
    } else {
        return None;
    };

    Decimal::from_str(&normalized).ok()
}

/// Format amount in German style (1.234,56).
pub fn format_german_amount(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.round_dp(2));
    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };

    let Some((integer_part, decimal_part)) = unsigned.split_once('.') else {
        return s;
    };

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*c);
    }

    format!("{}{},{}", sign, formatted, decimal_part)
}
