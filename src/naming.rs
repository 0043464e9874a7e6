//! Metric name rules
//!
//! Validation is applied once, when a leaf name is first created in the
//! namespace. Sanitization is applied on ingestion, before validation, and
//! rewrites characters that commonly leak into metric paths from hostnames,
//! URLs and free-form labels.

use crate::error::NamingError;

/// Default minimum number of dot-separated segments in a leaf name
pub const DEFAULT_MIN_SEGMENTS: usize = 3;

/// Characters replaced with `_` by [`sanitize_metric_name`]
pub const SANITIZED_CHARS: &[char] = &[' ', '/', '*', '?', '[', ']', ':', '(', ')', ',', '+'];

/// True if `c` may appear in a metric name
#[inline]
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Validate a metric name
///
/// Checks run in order and the first failure is returned:
/// empty name, leading dot, empty segment, too few segments, embedded
/// space, characters outside `[A-Za-z0-9_\-.:]`.
///
/// # Example
///
/// ```rust
/// use kuba_namespace::naming::validate_metric_name;
///
/// assert!(validate_metric_name("servers.web01.cpu", 3).is_ok());
/// assert!(validate_metric_name("servers.web01", 3).is_err());
/// assert!(validate_metric_name("servers..cpu", 3).is_err());
/// ```
pub fn validate_metric_name(name: &str, min_segments: usize) -> Result<(), NamingError> {
    if name.is_empty() {
        return Err(NamingError::Empty);
    }

    let segments: Vec<&str> = name.split('.').collect();
    if name.starts_with('.') {
        return Err(NamingError::LeadingDot(name.to_string()));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(NamingError::EmptySegment(name.to_string()));
    }
    if segments.len() < min_segments {
        return Err(NamingError::TooFewSegments {
            name: name.to_string(),
            min: min_segments,
        });
    }
    if name.contains(' ') {
        return Err(NamingError::EmbeddedSpace(name.to_string()));
    }

    let bad: Vec<char> = name.chars().filter(|c| !is_allowed_char(*c)).collect();
    if !bad.is_empty() {
        return Err(NamingError::InvalidCharacters {
            name: name.to_string(),
            chars: bad,
        });
    }

    Ok(())
}

/// Replace every character in [`SANITIZED_CHARS`] with `_`
///
/// Other characters pass through untouched; anything still invalid is
/// caught by [`validate_metric_name`].
pub fn sanitize_metric_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if SANITIZED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_metric_name("a.b.c", 3).is_ok());
        assert!(validate_metric_name("obu.sites.web-01.cpu_idle", 3).is_ok());
        assert!(validate_metric_name("host:8080.net.rx", 3).is_ok());
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(validate_metric_name("", 3), Err(NamingError::Empty));
    }

    #[test]
    fn test_leading_dot() {
        assert!(matches!(
            validate_metric_name(".a.b.c", 3),
            Err(NamingError::LeadingDot(_))
        ));
    }

    #[test]
    fn test_empty_segment() {
        assert!(matches!(
            validate_metric_name("a..c", 3),
            Err(NamingError::EmptySegment(_))
        ));
        assert!(matches!(
            validate_metric_name("a.b.c.", 3),
            Err(NamingError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_too_few_segments() {
        assert_eq!(
            validate_metric_name("a.b", 3),
            Err(NamingError::TooFewSegments {
                name: "a.b".to_string(),
                min: 3
            })
        );
        // Configurable minimum
        assert!(validate_metric_name("a.b", 2).is_ok());
    }

    #[test]
    fn test_embedded_space() {
        assert!(matches!(
            validate_metric_name("a.b c.d", 3),
            Err(NamingError::EmbeddedSpace(_))
        ));
    }

    #[test]
    fn test_invalid_characters_reported() {
        match validate_metric_name("a.b$.c#", 3) {
            Err(NamingError::InvalidCharacters { chars, .. }) => {
                assert_eq!(chars, vec!['$', '#']);
            },
            other => panic!("expected InvalidCharacters, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_replaces_reserved_chars() {
        assert_eq!(sanitize_metric_name("a.b c/d*e"), "a.b_c_d_e");
        assert_eq!(sanitize_metric_name("disk.(sda1).used+free"), "disk._sda1_.used_free");
        assert_eq!(sanitize_metric_name("plain.metric.name"), "plain.metric.name");
    }

    #[test]
    fn test_sanitized_name_validates() {
        let cleaned = sanitize_metric_name("servers.web 01.cpu[0]");
        assert!(validate_metric_name(&cleaned, 3).is_ok());
    }
}
