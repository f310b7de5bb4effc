//! Validity dates in German or ISO notation.

use chrono::NaiveDate;

use super::patterns::{DATE_DMY, DATE_ISO};

/// Parse "01.04.2024", "1.4.24" or "2024-04-01".
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Some(caps) = DATE_ISO.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_DMY.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = parse_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// ISO form of a date string, if it parses.
pub fn normalize_date(s: &str) -> Option<String> {
    parse_date(s).map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(if s.len() == 2 { 2000 + year } else { year })
}
