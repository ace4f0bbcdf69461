//! Cell value parsing.

/// Parse a numeric cell.
///
/// Accepts a `.` decimal point or a single `,` decimal comma. Empty cells,
/// non-numeric text, NaN and infinities yield `None` (the value is dropped).
pub fn parse_value(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = match s.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) if s.matches(',').count() == 1 && !s.contains('.') => {
            s.replacen(',', ".", 1).parse::<f64>().ok()
        }
        Err(_) => None,
    };

    parsed.filter(|v| v.is_finite())
}
