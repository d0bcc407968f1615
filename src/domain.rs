use url::Url;

/// Key used when a response carries no usable media type or host.
pub const UNKNOWN_KEY: &str = "unknown";

/// Strips parameters from a `Content-Type` value: `text/html; charset=utf-8` -> `text/html`.
/// Missing or blank values map to [`UNKNOWN_KEY`].
pub fn normalize_media_type(content_type: Option<&str>) -> String {
    let media_type = content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .unwrap_or("");

    if media_type.is_empty() {
        UNKNOWN_KEY.to_string()
    } else {
        media_type.to_string()
    }
}

/// Host of a target URI, with `:port` appended when the port is not the scheme default.
/// URIs without a host component (`dns:`, `urn:`) map to [`UNKNOWN_KEY`].
pub fn extract_host(target_uri: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(target_uri.trim())?;

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Ok(UNKNOWN_KEY.to_string()),
    };

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
