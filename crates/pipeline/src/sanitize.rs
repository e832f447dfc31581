/// Cosmetic cleanup of model-written SQL.
///
/// Trims surrounding whitespace and trailing `;`, and unwraps a markdown code
/// fence if the model added one. Steps repeat until nothing changes, so the
/// result is stable under another pass. This is not a safety check.
pub fn sanitize(sql: &str) -> String {
    let mut current = sql;
    loop {
        let next = step(current);
        if next.len() == current.len() {
            return next.to_string();
        }
        current = next;
    }
}

fn step(s: &str) -> &str {
    let s = s
        .trim_start()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    let s = s.strip_prefix("```").map(strip_info_string).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s)
}

/// Drop a fence info string (`sql`, `SQL`, `postgresql`, ...) up to its newline.
fn strip_info_string(s: &str) -> &str {
    let Some((first, rest)) = s.split_once('\n') else {
        return s;
    };
    let info = first.trim_end();
    let is_info = !info.is_empty()
        && info
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
        && !STATEMENT_STARTS
            .iter()
            .any(|kw| info.eq_ignore_ascii_case(kw));
    if is_info { rest } else { s }
}

// a single-word first line that is really the query
const STATEMENT_STARTS: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE", "EXPLAIN"];
