//! Measurement series extraction
//!
//! Turns the captured output of one invocation into an ordered sequence of
//! numbers. Extraction never fails: noise is dropped and an output with no
//! numbers at all yields an empty series. Whether an empty series is fatal is
//! decided by the caller.

/// Characters that separate tokens inside a line, besides whitespace.
const TOKEN_SEPARATORS: [char; 4] = [',', ';', '=', ':'];

/// Extract one value per measurement line from free-form text.
///
/// A line counts as a measurement when it is, or contains, a non-negative
/// integer or float token; the first such token is the line's value. A
/// trailing unit suffix (`123us`, `4.5ms`) is ignored. Everything else is
/// skipped silently.
///
/// ```rust
/// use cachebench::series::extract_series;
///
/// let text = "warming up\n120\nlatency: 95us\n\n-- done --\n";
/// assert_eq!(extract_series(text), vec![120.0, 95.0]);
/// ```
#[must_use]
pub fn extract_series(text: &str) -> Vec<f64> {
    text.lines().filter_map(parse_line).collect()
}

/// Extract the values of `column` from a CSV table with a header row.
///
/// Rows whose cell is missing, malformed or negative are skipped, as is any
/// row the CSV reader cannot decode. A table without the column yields an
/// empty series.
#[must_use]
pub fn extract_column(csv_text: &str, column: &str) -> Vec<f64> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let Some(index) = reader
        .headers()
        .ok()
        .and_then(|headers| headers.iter().position(|h| h == column))
    else {
        return Vec::new();
    };

    reader
        .records()
        .filter_map(std::result::Result::ok)
        .filter_map(|record| record.get(index).and_then(parse_token))
        .collect()
}

fn parse_line(line: &str) -> Option<f64> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.split(|c: char| c.is_whitespace() || TOKEN_SEPARATORS.contains(&c))
        .find_map(parse_token)
}

fn parse_token(token: &str) -> Option<f64> {
    let token = token.trim().trim_end_matches(char::is_alphabetic);
    // Reject signs, `inf`, `NaN` and words that merely start like a number
    if !token.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}
