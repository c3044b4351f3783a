use std::path::Path;

use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;

/// Generates a stored filename: a random v4 UUID (122 random bits) in simple
/// form, followed by the original file's extension when it has a usable one.
pub fn new_stored_name(original_name: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match extension_of(original_name) {
        Some(ext) => format!("{}.{}", token, ext),
        None => token,
    }
}

/// The file ID is the stored name without its extension.
pub fn file_id_of(stored_name: &str) -> &str {
    match stored_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => stored_name,
    }
}

/// IDs end up in filesystem paths, so anything outside `[A-Za-z0-9_-]` is refused.
pub fn is_valid_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && file_id.len() <= 64
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extension of an untrusted client filename, without the dot.
pub fn extension_of(name: &str) -> Option<&str> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
}
