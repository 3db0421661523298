//! URL pattern compilation.
//!
//! A pattern is a literal path with typed capture segments from the
//! closed set `<int>`, `<str>` and `<path>`; each expands to a capturing
//! group and the whole pattern is anchored and compiled once at route
//! construction.

use regex::Regex;
use smallvec::SmallVec;

/// Most routes have few captures; stack-allocate up to this many.
pub const MAX_INLINE_CAPTURES: usize = 8;

/// Positional URL captures; index 0 is the full match, captures are
/// 1-based.
pub type CaptureVec = SmallVec<[String; MAX_INLINE_CAPTURES]>;

const TOKEN_EXPANSIONS: &[(&str, &str)] = &[
    ("<int>", "([0-9]+)"),
    ("<str>", r"([A-Za-z0-9_\.\-]+)"),
    ("<path>", r"([A-Za-z0-9_/\.\-]+)"),
];

/// A compiled URL pattern.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    regex: Regex,
}

impl UrlPattern {
    /// Compile a pattern.
    ///
    /// # Panics
    ///
    /// Panics if the expanded pattern is not a valid regex; patterns are
    /// authored at route-table construction, so this surfaces at startup.
    pub fn compile(pattern: &str) -> Self {
        let mut expanded = pattern.to_string();
        for (token, group) in TOKEN_EXPANSIONS {
            expanded = expanded.replace(token, group);
        }
        let regex = Regex::new(&format!("^{expanded}$")).expect("invalid route pattern");
        UrlPattern {
            raw: pattern.to_string(),
            regex,
        }
    }

    /// The pattern as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of capture groups.
    pub fn capture_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// Match a bare URL, returning its positional captures.
    pub fn captures(&self, url: &str) -> Option<CaptureVec> {
        self.regex.captures(url).map(|caps| {
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
    }
}
