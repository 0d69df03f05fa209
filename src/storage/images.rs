//! Image-file recognition shared by the upload and resolve paths.

use std::path::Path;

/// Extension allow-list; anything else is ignored at both upload and
/// resolve time.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Case-insensitive allow-list check on the file name or object key.
pub fn is_allowed_image(file_name: &str) -> bool {
    extension_of(file_name)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Content type for an allow-listed file. The octet-stream fallback should
/// be unreachable behind `is_allowed_image`, but uploads never depend on
/// that being true.
pub fn content_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Object keys are namespaced by entity name, so no two entities' images can
/// collide.
pub fn object_key(entity: &str, file_name: &str) -> String {
    format!("{entity}/{file_name}")
}
