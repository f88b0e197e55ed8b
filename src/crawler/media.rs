//! Binary and media URL detection.

/// Path suffixes that are never fetched or crawled. Matching is case-sensitive.
const MEDIA_SUFFIXES: [&str; 12] = [
    ".pdf", ".jpg", ".png", ".jpeg", ".gif", ".svg", ".PDF", ".JPG", ".PNG", ".JPEG", ".GIF",
    ".SVG",
];

/// True if a URL path ends in a known media suffix
pub fn is_media_path(path: &str) -> bool {
    MEDIA_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// True if the path component of a URL, absolute or relative, is media
pub fn is_media_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => is_media_path(parsed.path()),
        Err(_) => {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            is_media_path(&url[..end])
        }
    }
}
