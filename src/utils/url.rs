//! Endpoint construction for the REST base URL.

/// Strip trailing slashes so endpoints can be appended with a single `/`.
///
/// ```
/// use parlor::utils::url::normalize_base_url;
///
/// assert_eq!(
///     normalize_base_url("https://generativelanguage.googleapis.com/v1beta/"),
///     "https://generativelanguage.googleapis.com/v1beta"
/// );
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path without doubling slashes.
///
/// ```
/// use parlor::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8080/v1beta/", "/models/m:generateContent"),
///     "http://localhost:8080/v1beta/models/m:generateContent"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://example.test/v1beta"),
            "https://example.test/v1beta"
        );
        assert_eq!(
            normalize_base_url("https://example.test/v1beta///"),
            "https://example.test/v1beta"
        );
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_model_endpoints() {
        assert_eq!(
            construct_api_url(
                "https://example.test/v1beta/",
                "models/gemini-3-flash-preview:streamGenerateContent"
            ),
            "https://example.test/v1beta/models/gemini-3-flash-preview:streamGenerateContent"
        );
        assert_eq!(
            construct_api_url("https://example.test/v1beta", "///models/x:generateContent"),
            "https://example.test/v1beta/models/x:generateContent"
        );
    }
}
