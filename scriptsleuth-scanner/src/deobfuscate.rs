//! Script text normalization applied before matching.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Normalizes obfuscated script text.
///
/// Implementations must be pure: the same input always yields the same output
/// and returning the input unchanged means "not obfuscated".
pub trait Deobfuscator: Send + Sync {
    fn deobfuscate(&self, text: &str) -> String;
}

impl<F> Deobfuscator for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn deobfuscate(&self, text: &str) -> String {
        self(text)
    }
}

/// Leaves every script untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Deobfuscator for PassThrough {
    fn deobfuscate(&self, text: &str) -> String {
        text.to_string()
    }
}

static ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\x([0-9A-Fa-f]{2})|\\u\{([0-9A-Fa-f]{1,6})\}|\\u([0-9A-Fa-f]{4})")
        .expect("escape pattern is valid")
});

/// Decodes JavaScript hex and unicode escapes (`\x66`, `\u0066`, `\u{66}`),
/// the most common way trackers hide identifiers like `fbq` or `_gaq` from
/// plain text search.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeDecoder;

impl Deobfuscator for EscapeDecoder {
    fn deobfuscate(&self, text: &str) -> String {
        if !text.contains('\\') {
            return text.to_string();
        }

        ESCAPE
            .replace_all(text, |caps: &Captures<'_>| {
                let digits = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();

                // Lone surrogates and out-of-range code points stay escaped.
                u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}
