//! Parses A1 cell/range references and `Table[Column]` structured
//! references, and rewrites formulas for relative fill.

use crate::core::errors::CoreError;
use once_cell::sync::Lazy;
use regex::Regex;

/// A resolved or resolvable reference. `TableColumn` only becomes a concrete
/// `Range` once resolved against a workbook context (see `core::workbook`).
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Cell { sheet: Option<String>, row: u32, col: u32 },
    Range { sheet: Option<String>, min_row: u32, min_col: u32, max_row: u32, max_col: u32 },
    TableColumn { table: String, column: String, include_header: bool },
}

static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:([^!]+)!)?(\$?)([A-Za-z]{1,3})(\$?)(\d+)$").unwrap());

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([^!]+)!)?(\$?[A-Za-z]{1,3}\$?\d+):(\$?[A-Za-z]{1,3}\$?\d+)$").unwrap()
});

static TABLE_COL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_]\w*)\[([^\[\]]+)\]$").unwrap());

/// Token matched during formula rewrite: optional `$`, 1-3 column letters,
/// optional `$`, digits. The `regex` crate has no lookaround, so the
/// boundary checks the spec describes as a lookbehind/lookahead are applied
/// by hand in `shift_segment` against the characters immediately
/// surrounding each match: a preceding word character rules a match out
/// (it's part of a longer identifier), and a following word character or
/// `(` rules it out too (it's a function call or longer identifier). The
/// `!` before a sheet-qualified token (`Sheet1!A1`) is not a word
/// character, so such tokens still match starting at `A1`.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)([A-Za-z]{1,3})(\$?)(\d+)").unwrap());

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Column letters (`A`, `Z`, `AA`, ...) to a 1-based index.
pub fn col_from_letters(letters: &str) -> u32 {
    letters.chars().fold(0u32, |acc, c| {
        acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
    })
}

/// 1-based column index to letters.
pub fn col_to_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    letters.reverse();
    letters.into_iter().collect()
}

/// Parse `[Sheet!]A1`, `[Sheet!]A1:B10`, or `Table[Column]` into a
/// `Reference`. `Table[Column]` is parsed structurally only — resolving it
/// to a concrete range requires a workbook context.
pub fn parse_reference(text: &str) -> Result<Reference, CoreError> {
    let text = text.trim();

    if let Some(caps) = TABLE_COL_RE.captures(text) {
        return Ok(Reference::TableColumn {
            table: caps[1].to_string(),
            column: caps[2].to_string(),
            include_header: false,
        });
    }

    if let Some(caps) = RANGE_RE.captures(text) {
        let sheet = caps.get(1).map(|m| m.as_str().to_string());
        let (min_row, min_col) = parse_cell_part(&caps[2])?;
        let (max_row, max_col) = parse_cell_part(&caps[3])?;
        if min_row > max_row || min_col > max_col {
            return Err(CoreError::RangeInvalid(format!(
                "range min must be <= max in {text}"
            )));
        }
        return Ok(Reference::Range { sheet, min_row, min_col, max_row, max_col });
    }

    if let Some(caps) = CELL_RE.captures(text) {
        let sheet = caps.get(1).map(|m| m.as_str().to_string());
        let col = col_from_letters(&caps[3]);
        let row: u32 = caps[5]
            .parse()
            .map_err(|_| CoreError::RangeInvalid(format!("bad row in {text}")))?;
        if row == 0 || col == 0 {
            return Err(CoreError::RangeInvalid(format!("row/col must be >= 1 in {text}")));
        }
        return Ok(Reference::Cell { sheet, row, col });
    }

    Err(CoreError::RangeInvalid(format!("unrecognized reference: {text}")))
}

fn parse_cell_part(part: &str) -> Result<(u32, u32), CoreError> {
    static PART_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?(\d+)$").unwrap());
    let caps = PART_RE
        .captures(part)
        .ok_or_else(|| CoreError::RangeInvalid(format!("bad range endpoint: {part}")))?;
    let col = col_from_letters(&caps[1]);
    let row: u32 = caps[2]
        .parse()
        .map_err(|_| CoreError::RangeInvalid(format!("bad row in {part}")))?;
    Ok((row, col))
}

/// Render `(row, col)` as `A1`-style text.
pub fn cell_address(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letters(col), row)
}

/// Rewrite every A1-style reference outside double-quoted string literals by
/// `(delta_row, delta_col)`. `$`-marked axes are never shifted. Column/row
/// shifts clamp to 1 rather than going negative or to zero.
pub fn shift_formula(formula: &str, delta_row: i64, delta_col: i64) -> String {
    let mut out = String::with_capacity(formula.len());
    for (i, segment) in formula.split('"').enumerate() {
        if i > 0 {
            out.push('"');
        }
        if i % 2 == 1 {
            // inside a quoted literal: never rewritten.
            out.push_str(segment);
            continue;
        }
        out.push_str(&shift_segment(segment, delta_row, delta_col));
    }
    out
}

fn shift_segment(segment: &str, delta_row: i64, delta_col: i64) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut last_end = 0usize;

    for caps in TOKEN_RE.captures_iter(segment) {
        let m = caps.get(0).unwrap();
        let (start, end) = (m.start(), m.end());

        let prev_is_word = start > 0 && is_word_byte(bytes[start - 1]);
        let next_is_word_or_paren =
            end < bytes.len() && (is_word_byte(bytes[end]) || bytes[end] == b'(');

        out.push_str(&segment[last_end..start]);
        if prev_is_word || next_is_word_or_paren {
            out.push_str(m.as_str());
        } else {
            let col_abs = !caps[1].is_empty();
            let row_abs = !caps[3].is_empty();
            let col = col_from_letters(&caps[2]) as i64;
            let row: i64 = caps[4].parse().unwrap_or(1);

            let new_col = if col_abs { col } else { (col + delta_col).max(1) };
            let new_row = if row_abs { row } else { (row + delta_row).max(1) };

            out.push_str(&format!(
                "{}{}{}{}",
                if col_abs { "$" } else { "" },
                col_to_letters(new_col as u32),
                if row_abs { "$" } else { "" },
                new_row,
            ));
        }
        last_end = end;
    }
    out.push_str(&segment[last_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_cell() {
        let r = parse_reference("C4").unwrap();
        assert_eq!(r, Reference::Cell { sheet: None, row: 4, col: 3 });
    }

    #[test]
    fn parses_sheet_qualified_range() {
        let r = parse_reference("Sheet1!A1:B10").unwrap();
        assert_eq!(
            r,
            Reference::Range { sheet: Some("Sheet1".into()), min_row: 1, min_col: 1, max_row: 10, max_col: 2 }
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(parse_reference("A10:B1").is_err());
    }

    #[test]
    fn parses_table_column() {
        let r = parse_reference("Sales[Region]").unwrap();
        assert_eq!(
            r,
            Reference::TableColumn { table: "Sales".into(), column: "Region".into(), include_header: false }
        );
    }

    #[test]
    fn fully_absolute_is_identity() {
        assert_eq!(shift_formula("=$A$1", 3, 5), "=$A$1");
    }

    #[test]
    fn absolute_row_shifts_column_only() {
        // A$1: row fixed, column relative.
        assert_eq!(shift_formula("=A$1", 2, 1), "=B$1");
    }

    #[test]
    fn absolute_column_shifts_row_only() {
        assert_eq!(shift_formula("=$A1", 2, 1), "=$A3");
    }

    #[test]
    fn relative_fill_shifts_both_axes() {
        assert_eq!(shift_formula("=C2*D2", 1, 0), "=C3*D3");
    }

    #[test]
    fn string_literal_contents_never_rewritten() {
        assert_eq!(shift_formula(r#"=CONCAT(A1,"B2")"#, 1, 0), r#"=CONCAT(A2,"B2")"#);
    }

    #[test]
    fn cross_sheet_reference_shifts_correctly() {
        assert_eq!(shift_formula("=Sheet1!A1", 1, 1), "=Sheet1!B2");
    }

    #[test]
    fn clamps_at_row_and_column_one() {
        assert_eq!(shift_formula("=A1", -5, -5), "=A1");
    }

    #[test]
    fn does_not_mangle_function_names() {
        assert_eq!(shift_formula("=SUM(A1:A3)", 1, 0), "=SUM(A2:A4)");
    }
}
