//! CSV codec: parse raw CSV text into row records and serialize row
//! records back to CSV text.
//!
//! Rows are JSON objects keyed by column name. Each parsed row carries a
//! synthetic sequence field, [`SEQ_FIELD`], equal to its zero-based
//! position among the data lines. The sequence field is never a data
//! column: it is excluded from serialized output and protected from
//! overwrite during merges.

use serde_json::{json, Map, Value};

use crate::error::{CsvError, CsvResult};

/// Name of the synthetic per-row sequence field.
pub const SEQ_FIELD: &str = "id";

// =============================================================================
// Decoding
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to text using the detected encoding.
///
/// Unknown encodings fall back to lossy UTF-8.
pub fn decode(bytes: &[u8]) -> CsvResult<String> {
    let encoding = detect_encoding(bytes);
    match encoding.as_str() {
        "utf-8" => Ok(String::from_utf8(bytes.to_vec())
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).to_string())),
        "iso-8859-1" => Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string()),
        "windows-1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        _ => Ok(String::from_utf8_lossy(bytes).to_string()),
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse raw CSV text into row records.
///
/// The first non-empty line is the header and defines the column
/// sequence. Each data line is tokenized by [`parse_line`]; row `i` gets
/// `SEQ_FIELD = i`. Lines with fewer tokens than headers are padded with
/// empty strings; extra tokens are dropped. Duplicate headers assign in
/// order, so the last occurrence wins.
///
/// Empty input (after filtering blank lines) yields an empty dataset.
///
/// # Example
/// ```
/// use cleandata::codec::parse;
///
/// let rows = parse("name,age\nAlice,30\nBob,25");
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0]["name"], "Alice");
/// assert_eq!(rows[1]["id"], 1);
/// ```
pub fn parse(text: &str) -> Vec<Value> {
    let lines: Vec<&str> = text.split('\n').filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let headers = parse_line(lines[0]);

    lines[1..]
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let values = parse_line(line);
            let mut row = Map::new();
            row.insert(SEQ_FIELD.to_string(), json!(idx));
            for (i, header) in headers.iter().enumerate() {
                let value = values.get(i).cloned().unwrap_or_default();
                row.insert(header.clone(), json!(value));
            }
            Value::Object(row)
        })
        .collect()
}

/// Tokenize a single CSV line, honoring double-quoted fields.
///
/// A doubled quote inside a quoted field is an escaped literal quote; a
/// comma inside an open quote is data; any other quote toggles the
/// in-quotes state. Tokens are trimmed.
fn parse_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1);

        if c == '"' && in_quotes && next == Some(&'"') {
            // Escaped quote
            current.push('"');
            i += 1;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c == ',' && !in_quotes {
            result.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
        i += 1;
    }

    result.push(current.trim().to_string());
    result
}

// =============================================================================
// Serialization
// =============================================================================

/// Serialize row records to CSV text.
///
/// The column order for all rows is taken from the first row's keys,
/// minus [`SEQ_FIELD`]. Missing values serialize as empty strings. A
/// field is quote-wrapped, with internal quotes doubled, iff it contains
/// a comma, a double quote or a newline. Empty datasets produce an empty
/// string.
pub fn serialize(rows: &[Value]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let headers = columns(rows);

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));

    for row in rows {
        let fields: Vec<String> = headers
            .iter()
            .map(|h| escape_field(&stringify(row.get(h))))
            .collect();
        lines.push(fields.join(","));
    }

    lines.join("\n")
}

/// Column set of a dataset: the first row's keys minus [`SEQ_FIELD`].
pub fn columns(rows: &[Value]) -> Vec<String> {
    rows.first()
        .and_then(|r| r.as_object())
        .map(|obj| {
            obj.keys()
                .filter(|k| k.as_str() != SEQ_FIELD)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Best-effort string conversion of a cell value.
fn stringify(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Quote-wrap a field if it contains a comma, quote or newline.
fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Size helpers
// =============================================================================

/// Byte-size estimate of a dataset: the UTF-8 length of its CSV form.
pub fn estimated_size(rows: &[Value]) -> usize {
    serialize(rows).len()
}

/// Human-readable byte size, 1024-based with one decimal.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const SIZES: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let i = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let i = i.min(SIZES.len() - 1);
    let value = bytes as f64 / 1024f64.powi(i as i32);
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{} {}", rounded as u64, SIZES[i])
    } else {
        format!("{:.1} {}", rounded, SIZES[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_parse() {
        let rows = parse("name,age\nAlice,30\nBob,25");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Alice");
        assert_eq!(rows[0]["age"], "30");
        assert_eq!(rows[1]["name"], "Bob");
        assert_eq!(rows[1]["age"], "25");
    }

    #[test]
    fn test_sequence_field_assignment() {
        let rows = parse("a\nx\ny\nz");

        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[SEQ_FIELD], i);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n  \n").is_empty());
    }

    #[test]
    fn test_header_only() {
        assert!(parse("a,b,c").is_empty());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let rows = parse("a,b\n1,2\n\n3,4\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], "3");
    }

    #[test]
    fn test_missing_trailing_fields_padded() {
        let rows = parse("a,b,c\n1,2");
        assert_eq!(rows[0]["a"], "1");
        assert_eq!(rows[0]["b"], "2");
        assert_eq!(rows[0]["c"], "");
    }

    #[test]
    fn test_extra_tokens_dropped() {
        let rows = parse("a,b\n1,2,3,4");
        let obj = rows[0].as_object().unwrap();
        assert_eq!(obj.len(), 3); // id + a + b
        assert_eq!(rows[0]["a"], "1");
        assert_eq!(rows[0]["b"], "2");
    }

    #[test]
    fn test_quoted_comma() {
        let rows = parse("name,address\nAlice,\"1 Main St, Springfield\"");
        assert_eq!(rows[0]["address"], "1 Main St, Springfield");
    }

    #[test]
    fn test_escaped_quote() {
        let rows = parse("name,quote\nAlice,\"she said \"\"hi\"\"\"");
        assert_eq!(rows[0]["quote"], "she said \"hi\"");
    }

    #[test]
    fn test_duplicate_headers_last_wins() {
        let rows = parse("a,a\n1,2");
        assert_eq!(rows[0]["a"], "2");
    }

    #[test]
    fn test_serialize_empty() {
        assert_eq!(serialize(&[]), "");
    }

    #[test]
    fn test_serialize_excludes_sequence_field() {
        let rows = parse("name,age\nAlice,30");
        let csv = serialize(&rows);
        assert_eq!(csv, "name,age\nAlice,30");
        assert!(!csv.contains("id"));
    }

    #[test]
    fn test_serialize_quotes_special_fields() {
        let rows = vec![json!({
            "id": 0,
            "a": "plain",
            "b": "has,comma",
            "c": "has\"quote",
        })];
        let csv = serialize(&rows);
        assert_eq!(csv, "a,b,c\nplain,\"has,comma\",\"has\"\"quote\"");
    }

    #[test]
    fn test_serialize_missing_key_as_empty() {
        let rows = vec![
            json!({"id": 0, "a": "1", "b": "2"}),
            json!({"id": 1, "a": "3"}),
        ];
        let csv = serialize(&rows);
        assert_eq!(csv, "a,b\n1,2\n3,");
    }

    #[test]
    fn test_round_trip() {
        let input = "name,note,count\nAlice,\"likes, commas\",3\nBob,\"say \"\"hi\"\"\",7";
        let rows = parse(input);
        let reparsed = parse(&serialize(&rows));

        assert_eq!(rows.len(), reparsed.len());
        for (a, b) in rows.iter().zip(reparsed.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_round_trip_preserves_header_order() {
        let rows = parse("zeta,alpha,mid\n1,2,3");
        assert_eq!(columns(&rows), vec!["zeta", "alpha", "mid"]);
        assert!(serialize(&rows).starts_with("zeta,alpha,mid"));
    }

    #[test]
    fn test_stringify_numbers() {
        let rows = vec![json!({"id": 0, "n": 42})];
        assert_eq!(serialize(&rows), "n\n42");
    }

    #[test]
    fn test_decode_utf8() {
        let text = decode("name,age\nAlice,30".as_bytes()).unwrap();
        assert!(text.starts_with("name,age"));
    }

    #[test]
    fn test_decode_latin1() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode(bytes).unwrap();
        assert!(decoded.contains("Soci"));
    }

    #[test]
    fn test_estimated_size() {
        let rows = parse("a,b\n1,2");
        assert_eq!(estimated_size(&rows), "a,b\n1,2".len());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_size(1536), "1.5 KB");
    }
}
