//! Deterministic file names for accepted images.

use std::path::Path;

use url::Url;

/// Maximum number of characters kept from a title.
pub const MAX_TITLE_CHARS: usize = 100;

/// Extension used when neither the URL nor the response says otherwise.
pub const FALLBACK_EXTENSION: &str = ".jpg";

/// File name for an accepted image: `{sequence:03}_{title}{ext}`.
#[must_use]
pub fn image_file_name(sequence: u64, title: &str, extension: &str) -> String {
    format!("{sequence:03}_{}{extension}", sanitize_title(title))
}

/// Make a title safe to embed in a file name.
///
/// Characters that filesystems or shells choke on become underscores, runs
/// of underscores collapse, and the result is cut to [`MAX_TITLE_CHARS`].
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '%' | '&' => '_',
            '(' | ')' | '[' | ']' | '-' | '_' | '.' => c,
            c if c.is_alphanumeric() => c,
            // Whitespace, control characters, punctuation
            _ => '_',
        })
        .collect();

    let collapsed = replaced
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let truncated: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    let trimmed = truncated.trim_matches(|c| c == '_' || c == '.');

    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extension (with leading dot) taken from the last path segment of a URL.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let ext = Path::new(last).extension()?.to_str()?;
    let is_image = mime_guess::from_ext(ext)
        .first()
        .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE);
    if !is_image {
        return None;
    }
    normalize_extension(ext)
}

/// Extension (with leading dot) for a response `Content-Type`.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let known = match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    };
    if let Some(ext) = known {
        return Some(format!(".{ext}"));
    }
    if !essence.starts_with("image/") {
        return None;
    }
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .and_then(|ext| normalize_extension(ext))
}

/// Pick the stored extension: URL path first, then content type, then `.jpg`.
#[must_use]
pub fn choose_extension(url: &str, content_type: Option<&str>) -> String {
    extension_from_url(url)
        .or_else(|| content_type.and_then(extension_from_content_type))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn normalize_extension(ext: &str) -> Option<String> {
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}
