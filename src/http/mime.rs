//! MIME type detection based on file extensions.

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Looks up the MIME type for a path or a bare extension (`"json"`, `".html"`).
pub fn lookup(path_or_ext: &str) -> Option<String> {
    let ext = path_or_ext.trim_start_matches('.');
    let guess = if ext.contains('.') || ext.contains('/') {
        mime_guess::from_path(Path::new(path_or_ext))
    } else {
        mime_guess::from_ext(ext)
    };
    guess.first().map(|m| m.essence_str().to_string())
}

/// Turns a short type name into a full MIME type. Values that already
/// contain a `/` are returned untouched.
pub fn normalize(ty: &str) -> String {
    if ty.contains('/') {
        return ty.to_string();
    }
    lookup(ty).unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Adds `charset=utf-8` to textual types that do not carry one.
pub fn with_charset(ty: &str) -> String {
    if ty.to_ascii_lowercase().contains("charset=") {
        return ty.to_string();
    }
    let essence = ty.split(';').next().unwrap_or(ty).trim().to_ascii_lowercase();
    let textual = essence.starts_with("text/")
        || matches!(
            essence.as_str(),
            "application/json" | "application/javascript" | "application/xml"
        );
    if textual {
        format!("{ty}; charset=utf-8")
    } else {
        ty.to_string()
    }
}

/// Content type for a file on disk, falling back to `application/octet-stream`.
pub fn for_path(path: &Path) -> String {
    let ty = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string());
    with_charset(&ty)
}
