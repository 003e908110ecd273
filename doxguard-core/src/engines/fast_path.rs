//! Regex-free recognition of platform identifiers.
//!
//! Kept independent of the exception store's compiled pattern on purpose: when the
//! two disagree on the same input, the stored pattern has drifted.

/// Shortest identifier length, in digits.
pub const MIN_IDENTIFIER_DIGITS: usize = 17;
/// Longest identifier length, in digits.
pub const MAX_IDENTIFIER_DIGITS: usize = 19;

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(digits: &str) -> bool {
    (MIN_IDENTIFIER_DIGITS..=MAX_IDENTIFIER_DIGITS).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
}

/// True when `text` contains a run of 17-19 ASCII digits with no ASCII word character
/// directly before or after it.
pub fn contains_platform_identifier(text: &str) -> bool {
    // (start of the digit run, whether a word character precedes it)
    let mut run: Option<(usize, bool)> = None;
    let mut previous: Option<char> = None;

    for (i, c) in text.char_indices() {
        if c.is_ascii_digit() {
            if run.is_none() {
                run = Some((i, previous.is_some_and(is_word_char)));
            }
        } else if let Some((start, glued)) = run.take() {
            if !glued && !is_word_char(c) && is_identifier(&text[start..i]) {
                return true;
            }
        }
        previous = Some(c);
    }

    matches!(run, Some((start, false)) if is_identifier(&text[start..]))
}

/// True when the trimmed `text` is exactly one identifier, or one mention
/// (`<@id>`, `<@!id>`, `<#id>`, `<@&id>`, `<:name:id>`, `<a:name:id>`).
pub fn is_platform_identifier(text: &str) -> bool {
    let text = text.trim();
    if is_identifier(text) {
        return true;
    }
    let Some(inner) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
        return false;
    };

    if let Some(rest) = inner.strip_prefix("@!").or_else(|| inner.strip_prefix("@&")) {
        return is_identifier(rest);
    }
    if let Some(rest) = inner.strip_prefix('@').or_else(|| inner.strip_prefix('#')) {
        return is_identifier(rest);
    }

    let emoji = inner.strip_prefix("a:").or_else(|| inner.strip_prefix(':'));
    match emoji.and_then(|rest| rest.split_once(':')) {
        Some((name, id)) => {
            (2..=32).contains(&name.chars().count()) && name.chars().all(is_word_char) && is_identifier(id)
        }
        None => false,
    }
}
