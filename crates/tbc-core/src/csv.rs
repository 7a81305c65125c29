//! Minimal RFC 4180 reading/writing for the input list and results file.
//!
//! Only what the checker needs: comma separator, double-quote quoting,
//! quoted newlines, CRLF or LF line endings.

/// Quote a field if it contains a separator, quote, or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One CSV line (with trailing `\n`).
pub fn format_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Split CSV text into records. Blank lines yield empty records.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(finish(std::mem::take(&mut record)));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(finish(record));
    }
    records
}

fn finish(record: Vec<String>) -> Vec<String> {
    if record.len() == 1 && record[0].is_empty() {
        Vec::new()
    } else {
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(format_record(&["x", "", "y z"]), "x,,y z\n");
    }

    #[test]
    fn parses_quotes_blank_lines_and_crlf() {
        let text = "\u{feff}input,note\r\n@telegram,\"a, b\"\r\n\r\n\"multi\nline\",\"q\"\"x\"\nlast";
        let records = parse_records(text);
        assert_eq!(
            records,
            vec![
                vec!["input".to_string(), "note".to_string()],
                vec!["@telegram".to_string(), "a, b".to_string()],
                vec![],
                vec!["multi\nline".to_string(), "q\"x".to_string()],
                vec!["last".to_string()],
            ]
        );
    }

    #[test]
    fn stray_quotes_are_kept_literally() {
        // Quoting only starts at the beginning of a field.
        assert_eq!(
            parse_records("ab\"c,d\n\"ab\"c,e\n"),
            vec![
                vec!["ab\"c".to_string(), "d".to_string()],
                vec!["abc".to_string(), "e".to_string()],
            ]
        );
    }

    #[test]
    fn written_records_parse_back() {
        let fields = ["Title, with comma", "\"quoted\"", "plain"];
        let parsed = parse_records(&format_record(&fields));
        assert_eq!(parsed, vec![fields.iter().map(|s| s.to_string()).collect::<Vec<_>>()]);
    }
}
