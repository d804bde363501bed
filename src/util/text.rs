use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

use regex::Regex;

/// Marker appended to text cut by [`truncate_chars`].
pub const ELLIPSIS: &str = "...";

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    // Invariant: the pattern is a compile-time literal, covered by the tests below
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static tag pattern is valid"))
}

/// Removes every `<...>` span from `s`.
///
/// This is pattern removal, not HTML parsing: everything from a `<` to the
/// next `>` goes, so a `<` survives only when no `>` follows it. Entities
/// are not decoded.
///
/// # Examples
///
/// ```
/// use feedboard::util::strip_tags;
///
/// assert_eq!(strip_tags("<p>Rust <b>1.80</b> released</p>"), "Rust 1.80 released");
/// assert_eq!(strip_tags("a < b"), "a < b");
/// ```
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    tag_pattern().replace_all(s, "")
}

/// Truncates `s` to at most `max_chars` characters.
///
/// When truncation happens, exactly `max_chars` characters are kept and
/// [`ELLIPSIS`] is appended. Text that already fits is returned borrowed and
/// unchanged. Counting is by `char`, so multi-byte text never splits a
/// code point.
///
/// # Examples
///
/// ```
/// use feedboard::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello...");
/// assert_eq!(truncate_chars("日本語テキスト", 3), "日本語...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        None => Cow::Borrowed(s),
        Some((cut, _)) => Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS)),
    }
}

/// Strips terminal control characters and ANSI escape sequences.
///
/// Feed titles and descriptions are attacker-controlled and end up on a
/// terminal. Removes C0 controls (except tab, newline, carriage return),
/// DEL, CSI sequences (`ESC [` ... final byte), OSC sequences (`ESC ]` ...
/// BEL or `ESC \`), and bare ESC.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            skip_escape_sequence(&mut chars);
        } else if !is_stripped(c) {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Consumes the body of an escape sequence whose ESC was already read.
fn skip_escape_sequence(chars: &mut Peekable<Chars<'_>>) {
    match chars.peek() {
        Some('[') => {
            chars.next();
            for c in chars.by_ref() {
                if ('\x40'..='\x7e').contains(&c) {
                    break;
                }
            }
        }
        Some(']') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '\x07' {
                    break;
                }
                if c == '\x1b' && chars.peek() == Some(&'\\') {
                    chars.next();
                    break;
                }
            }
        }
        _ => {}
    }
}
