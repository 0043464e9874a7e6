//! Shell-style glob patterns for query segments
//!
//! `*` matches any run of characters, `?` a single character, `[abc]` /
//! `[a-z]` a character class and `[!abc]` a negated class. An unterminated
//! `[` is matched literally. Patterns are anchored at both ends.

use regex::Regex;

/// Characters that make a query segment a wildcard segment
pub const GLOB_CHARS: &[char] = &['*', '?', '[', ']'];

/// True if `segment` contains any glob metacharacter
pub fn has_glob_chars(segment: &str) -> bool {
    segment.contains(GLOB_CHARS)
}

/// Split a dotted pattern at the first segment containing a glob character
///
/// Returns `(literal_prefix, wildcard_segment, suffix)`. Without any glob
/// segment the whole pattern is the literal prefix.
///
/// ```rust
/// use kuba_namespace::namespace::glob::split_on_glob;
///
/// assert_eq!(split_on_glob("a.b*.c.d"), ("a".to_string(), Some("b*".to_string()), "c.d".to_string()));
/// assert_eq!(split_on_glob("*.cpu"), (String::new(), Some("*".to_string()), "cpu".to_string()));
/// assert_eq!(split_on_glob("a.b"), ("a.b".to_string(), None, String::new()));
/// ```
pub fn split_on_glob(pattern: &str) -> (String, Option<String>, String) {
    let segments: Vec<&str> = pattern.split('.').collect();
    match segments.iter().position(|s| has_glob_chars(s)) {
        Some(idx) => (
            segments[..idx].join("."),
            Some(segments[idx].to_string()),
            segments[idx + 1..].join("."),
        ),
        None => (pattern.to_string(), None, String::new()),
    }
}

/// A compiled glob
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile `glob` into an anchored regular expression
    pub fn compile(glob: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&translate(glob))?;
        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    /// True if the whole of `text` matches
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The original glob text
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Translate a glob to regex source
fn translate(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Find the closing bracket; a leading `!` or `]` belongs to the class
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }

                if j >= chars.len() {
                    out.push_str("\\[");
                    continue;
                }

                let body = &chars[i..j];
                i = j + 1;

                out.push('[');
                let rest = match body.first() {
                    Some('!') => {
                        out.push('^');
                        &body[1..]
                    },
                    _ => body,
                };
                for &ch in rest {
                    if matches!(ch, '\\' | '[' | ']' | '^' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push(']');
            },
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            },
        }
    }

    out.push('$');
    out
}
