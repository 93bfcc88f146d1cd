//! Deterministic, DNS-1123 legal names for the objects created per catalog.

/// Maximum length of a DNS-1123 label.
pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;

/// Derives a resource name from an image reference.
///
/// Runs of characters outside `[a-z0-9]` (after lowercasing) collapse into a single `-`,
/// and the result is trimmed of separators and truncated to a DNS-1123 label.
/// Distinct references that only differ past the length limit map to the same name.
pub fn derive_name(image: &str) -> String {
    let mut name = String::with_capacity(image.len());
    let mut pending_separator = false;
    for ch in image.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !name.is_empty() {
                name.push('-');
            }
            pending_separator = false;
            name.push(ch);
        } else {
            pending_separator = true;
        }
    }

    truncate_label(name)
}

/// The catalog source name used for a package.
pub fn catalog_name(package: &str) -> String {
    derive_name(&format!("{package}-catalog"))
}

fn truncate_label(mut name: String) -> String {
    if name.len() > DNS1123_LABEL_MAX_LENGTH {
        // only ASCII is pushed above, so any byte index is a char boundary
        name.truncate(DNS1123_LABEL_MAX_LENGTH);
        let trimmed = name.trim_end_matches('-').len();
        name.truncate(trimmed);
    }
    name
}
