//! Matching of physical header rows to table types.

use serde::Serialize;

use crate::models::rules::{ExtractionRuleDocument, HeaderMatcher, MatchingStrategy, TableType};
use crate::rules::patterns::normalize_header;

/// Outcome of matching one header row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
    pub matched: bool,
    pub required_found: usize,
    pub required_total: usize,
    pub optional_found: usize,
    pub optional_total: usize,
}

impl HeaderMatch {
    /// Share of configured headers found (0.0 - 1.0); 1.0 for an empty matcher.
    pub fn confidence(&self) -> f32 {
        if !self.matched {
            return 0.0;
        }
        let total = self.required_total + self.optional_total;
        if total == 0 {
            return 1.0;
        }
        (self.required_found + self.optional_found) as f32 / total as f32
    }
}

impl HeaderMatcher {
    /// Match a header row.
    ///
    /// A configured header is present when some cell contains it, compared
    /// case-insensitively with whitespace collapsed. An empty required set
    /// matches every row except under `MINIMUM_COUNT` with a positive minimum.
    pub fn evaluate(&self, headers: &[String]) -> HeaderMatch {
        let cells: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let present = |wanted: &str| {
            let wanted = normalize_header(wanted);
            !wanted.is_empty() && cells.iter().any(|c| c.contains(&wanted))
        };

        let required_found = self.required_headers.iter().filter(|h| present(h.as_str())).count();
        let optional_found = self.optional_headers.iter().filter(|h| present(h.as_str())).count();
        let required_total = self.required_headers.len();

        let matched = match self.matching_strategy {
            MatchingStrategy::AllRequired => required_found == required_total,
            MatchingStrategy::AnyRequired => required_total == 0 || required_found > 0,
            MatchingStrategy::MinimumCount => {
                required_found >= self.minimum_match_count.unwrap_or(required_total)
            }
        };

        HeaderMatch {
            matched,
            required_found,
            required_total,
            optional_found,
            optional_total: self.optional_headers.len(),
        }
    }
}

/// First table type whose matcher accepts the header row.
pub fn detect_table_type<'a>(
    doc: &'a ExtractionRuleDocument,
    headers: &[String],
) -> Option<(usize, &'a TableType)> {
    doc.table_types
        .iter()
        .enumerate()
        .find(|(_, table)| table.header_matcher.evaluate(headers).matched)
}
