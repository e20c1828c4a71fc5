//! Quote handling for question extraction.
//!
//! Smart punctuation is folded to its ASCII form before any matching so that
//! macOS-style curly quotes behave exactly like the straight quotes the user
//! thinks they typed. Every mapping is one character to one character, which
//! keeps the buffer's character count equal to what the host application
//! received.

/// Fold curly quotes to their ASCII equivalents. All other characters pass
/// through unchanged.
pub fn normalize_char(c: char) -> char {
    match c {
        '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
        '\u{2018}' | '\u{2019}' | '\u{201A}' => '\'',
        _ => c,
    }
}

pub fn normalize(s: &str) -> String {
    s.chars().map(normalize_char).collect()
}

fn closing_quote(open: char) -> Option<char> {
    match open {
        '"' => Some('"'),
        '\'' => Some('\''),
        '`' => Some('`'),
        _ => None,
    }
}

/// Strip one layer of quoting. If `s` opens with a quote character, returns
/// the text up to the matching close, or everything after the opener when the
/// close was never typed. Unquoted text comes back untouched.
pub fn unwrap_quoted(s: &str) -> &str {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return s;
    };
    let Some(close) = closing_quote(first) else {
        return s;
    };
    let inner = &s[first.len_utf8()..];
    match inner.find(close) {
        Some(idx) => &inner[..idx],
        None => inner,
    }
}

/// Extract the question text from everything typed after a trigger phrase:
/// normalize smart quotes, trim whitespace, then peel off optional quoting.
pub fn extract(raw: &str) -> String {
    let normalized = normalize(raw);
    let trimmed = normalized.trim();
    unwrap_quoted(trimmed).trim().to_string()
}
