//! Reading whitespace-separated `code text` records.
//!
//! Dictionary files, training corpora, and evaluation corpora all share
//! one row format: a code string and a text string per line. Blank and
//! malformed lines are skipped with a warning; I/O errors are passed
//! through to the caller.

use std::io::{self, BufRead};

use tracing::warn;

/// Split one record line into `(code, text)`.
///
/// Returns `None` for blank lines and lines with fewer than two fields.
/// Extra fields after the second are ignored.
pub fn parse_pair(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.split_whitespace();
    let code = fields.next()?;
    let text = fields.next()?;
    Some((code, text))
}

/// Iterate `(code, text)` pairs from a reader.
pub fn pairs<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<(String, String)>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(no, line)| match line {
            Ok(line) => match parse_pair(&line) {
                Some((code, text)) => Some(Ok((code.to_string(), text.to_string()))),
                None => {
                    if !line.trim().is_empty() {
                        warn!(line = no + 1, "skipping malformed record");
                    }
                    None
                }
            },
            Err(e) => Some(Err(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_splits_on_whitespace() {
        assert_eq!(parse_pair("nihao 你好"), Some(("nihao", "你好")));
        assert_eq!(parse_pair("  nihao\t你好  "), Some(("nihao", "你好")));
        assert_eq!(parse_pair("nihao 你好 extra"), Some(("nihao", "你好")));
    }

    #[test]
    fn parse_pair_rejects_short_lines() {
        assert_eq!(parse_pair(""), None);
        assert_eq!(parse_pair("   "), None);
        assert_eq!(parse_pair("nihao"), None);
    }

    #[test]
    fn pairs_skips_malformed_lines() {
        let input = "nihao 你好\n\nbroken\nceshi 测试\n";
        let got: Vec<(String, String)> = pairs(input.as_bytes()).map(|p| p.unwrap()).collect();
        assert_eq!(
            got,
            vec![
                ("nihao".to_string(), "你好".to_string()),
                ("ceshi".to_string(), "测试".to_string()),
            ]
        );
    }
}
