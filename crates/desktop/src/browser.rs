//! Opening pages in the default browser.

use crate::{OsError, OsResult};
use tokio::process::Command;

fn validate_url(url: &str) -> OsResult<()> {
    if url.trim().is_empty() {
        return Err(OsError::InvalidArgument("url cannot be empty".to_string()));
    }
    if url.contains('\0') || url.contains('\n') {
        return Err(OsError::InvalidArgument(
            "url contains invalid control characters".to_string(),
        ));
    }
    let lower = url.to_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("file://"))
    {
        return Err(OsError::InvalidArgument(
            "url must start with http://, https://, or file://".to_string(),
        ));
    }
    Ok(())
}

fn encode_query(query: &str) -> String {
    query
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Add `https://` to bare hosts such as `docs.rs/tokio`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Search page URL for `query` on the given engine (google, bing, duckduckgo).
pub fn search_url(query: &str, engine: &str) -> String {
    let encoded = encode_query(query);
    match engine.to_lowercase().as_str() {
        "bing" => format!("https://www.bing.com/search?q={encoded}"),
        "duckduckgo" => format!("https://duckduckgo.com/?q={encoded}"),
        _ => format!("https://www.google.com/search?q={encoded}"),
    }
}

/// URL to open for a navigate target: addresses pass through `normalize_url`,
/// anything that does not look like one becomes a search on `engine`.
pub fn navigation_url(target: &str, engine: &str) -> String {
    let target = target.trim();
    let looks_like_address = target.contains("://")
        || (!target.contains(char::is_whitespace) && target.contains('.'));
    if looks_like_address {
        normalize_url(target)
    } else {
        search_url(target, engine)
    }
}

/// Open a URL with xdg-open.
pub async fn open_url(url: &str) -> OsResult<()> {
    let url = normalize_url(url);
    validate_url(&url)?;
    Command::new("xdg-open")
        .arg(&url)
        .spawn()
        .map_err(OsError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("docs.rs"), "https://docs.rs");
        assert_eq!(normalize_url(" http://a.b "), "http://a.b");
    }

    #[test]
    fn test_search_url_encodes() {
        assert_eq!(
            search_url("rust async & tokio", "bing"),
            "https://www.bing.com/search?q=rust+async+%26+tokio"
        );
        assert!(search_url("x", "unknown").starts_with("https://www.google.com/"));
    }

    #[test]
    fn test_navigation_url_falls_back_to_search() {
        assert_eq!(navigation_url("docs.rs/tokio", "bing"), "https://docs.rs/tokio");
        assert_eq!(navigation_url("file:///tmp/a.html", "bing"), "file:///tmp/a.html");
        assert_eq!(
            navigation_url("weather today", "duckduckgo"),
            "https://duckduckgo.com/?q=weather+today"
        );
        assert_eq!(
            navigation_url("localhost", "google"),
            "https://www.google.com/search?q=localhost"
        );
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("").is_err());
    }
}
