//! Slug rules for organizations and tenants.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

pub const MAX_SLUG_LENGTH: usize = 63;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").expect("valid slug regex"));

/// Derive a URL-safe slug from a display name.
///
/// Lowercases, replaces runs of non-alphanumerics with a single `-`, and
/// trims leading/trailing dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(MAX_SLUG_LENGTH);
    slug.trim_end_matches('-').to_string()
}

pub fn validate_slug(slug: &str) -> Result<(), CoreError> {
    if slug.len() > MAX_SLUG_LENGTH || !SLUG_RE.is_match(slug) {
        return Err(CoreError::Validation(format!(
            "Invalid slug '{slug}': use lowercase letters, digits and dashes"
        )));
    }
    Ok(())
}
