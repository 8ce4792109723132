use std::fmt::Write;
use std::time::Duration;
use url::Url;

/// Extension of every screenshot written to disk.
pub const SCREENSHOT_EXTENSION: &str = "png";

/// Turns a page URL into a single file name component.
///
/// ASCII alphanumerics and `-`, `.`, `~` pass through; every other byte,
/// including `_`, becomes `_XX` in uppercase hex. `_` only ever appears as an
/// escape marker, so distinct URLs always map to distinct names and the result
/// never contains a path separator.
pub fn escape_url_filename(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len() + SCREENSHOT_EXTENSION.len() + 1);
    for byte in url.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'~' => {
                escaped.push(byte as char)
            }
            _ => {
                // Writing to a String cannot fail.
                let _ = write!(escaped, "_{byte:02X}");
            }
        }
    }
    escaped.push('.');
    escaped.push_str(SCREENSHOT_EXTENSION);
    escaped
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn validate_url(url: &str) -> Result<Url, url::ParseError> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(url::ParseError::InvalidPort),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_escape_keeps_unreserved() {
        assert_eq!(escape_url_filename("abc-1.2~x"), "abc-1.2~x.png");
    }

    #[test]
    fn test_escape_url() {
        assert_eq!(
            escape_url_filename("https://example.com/a?b=c"),
            "https_3A_2F_2Fexample.com_2Fa_3Fb_3Dc.png"
        );
    }

    #[test]
    fn test_escape_has_no_separators() {
        let name = escape_url_filename("https://example.com/dir\\file/../x y");
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert!(!name.contains(' '));
    }

    #[test]
    fn test_escape_underscore_is_not_ambiguous() {
        // "/" escapes to "_2F"; a literal "_2F" must not collide with it.
        let slash = escape_url_filename("https://example.com/");
        let literal = escape_url_filename("https:_2F_2Fexample.com_2F");
        assert_ne!(slash, literal);
        assert_eq!(escape_url_filename("_"), "_5F.png");
    }

    #[test]
    fn test_escape_non_ascii() {
        assert_eq!(escape_url_filename("é"), "_C3_A9.png");
    }

    #[test]
    fn test_escape_distinct_urls_stay_distinct() {
        let urls = [
            "https://example.com/a b",
            "https://example.com/a+b",
            "https://example.com/a%20b",
            "https://example.com/a_20b",
            "https://example.com/a/b",
            "https://example.com/a_b",
            "http://example.com/a/b",
        ];
        let names: HashSet<String> = urls.iter().map(|u| escape_url_filename(u)).collect();
        assert_eq!(names.len(), urls.len());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/sitemap.xml").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("invalid-url").is_err());
        assert!(validate_url("").is_err());
    }
}
