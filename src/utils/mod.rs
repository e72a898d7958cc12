//! Utility functions and helpers.

use url::Url;

/// Last path segment of an asset URL, used as its display name.
///
/// Falls back to the host, then to the raw string, when the path is empty
/// or the URL does not parse.
pub fn file_name(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(|s| s.to_string())
            .or_else(|| url.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url_str.to_string()),
        Err(_) => url_str
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(url_str)
            .to_string(),
    }
}

/// File-system-safe name for a domain, used for per-domain documents.
///
/// ASCII alphanumerics, `.` and `-` pass through; every other byte becomes
/// `%XX`. Distinct domains always map to distinct names.
pub fn storage_key(domain: &str) -> String {
    let mut key = String::with_capacity(domain.len());
    for byte in domain.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-') {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("%{byte:02X}"));
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_is_injective_for_ports() {
        assert_eq!(storage_key("example.com"), "example.com");
        assert_eq!(storage_key("host:8080"), "host%3A8080");
        assert_eq!(storage_key("host_8080"), "host%5F8080");
        assert_ne!(storage_key("host:8080"), storage_key("host_8080"));
        assert_eq!(storage_key("../etc"), "..%2Fetc");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("https://example.com/static/js/app.min.js"), "app.min.js");
        assert_eq!(file_name("https://example.com/js/app.js?v=3#x"), "app.js");
        assert_eq!(file_name("https://example.com/js/"), "js");
        assert_eq!(file_name("https://example.com/"), "example.com");
        assert_eq!(file_name("not a url/chunk.js"), "chunk.js");
    }
}
