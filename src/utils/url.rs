//! URL processing utilities.
//!
//! Provides consistent URL handling across the codebase:
//! - joining a base URL with a relative file part
//! - scheme-less, query-less "clean" URLs used as registry keys
//! - extracting the path component of a URL

/// Join a base URL and a relative part with exactly one `/` between them.
///
/// # Examples
/// ```ignore
/// assert_eq!(join_url("https://a.test/wp-admin/", "/css/x.css"), "https://a.test/wp-admin/css/x.css");
/// ```
pub fn join_url(base: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

/// Drop the scheme, query string and fragment of a URL.
///
/// `https://a.test/x/y.png?ver=1#top` becomes `//a.test/x/y.png`, so http
/// and https variants of the same URL compare equal.
pub fn clean_url(url: &str) -> String {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    match url.find("//") {
        Some(pos)
            if url[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | ':')) =>
        {
            url[pos..].to_string()
        }
        _ => url.to_string(),
    }
}

/// Extract the path component of an absolute or scheme-relative URL.
///
/// Plain paths are returned without their query string.
pub fn url_path(url: &str) -> String {
    let absolute = if url.starts_with("//") {
        format!("http:{url}")
    } else {
        url.to_string()
    };
    match ::url::Url::parse(&absolute) {
        Ok(parsed) => percent_encoding::percent_decode_str(parsed.path())
            .decode_utf8_lossy()
            .into_owned(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}
