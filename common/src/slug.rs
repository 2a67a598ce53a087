//! Slug, SKU and text-field normalization shared by categories and products.

use rand::Rng;

use crate::error::{CatalogError, CatalogResult};
use crate::identity::CategoryId;

/// Derive a URL slug: lowercase ASCII letters and digits, runs of whitespace
/// or dashes collapsed to a single `-`, everything else dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}

/// Use the caller's slug when given, otherwise derive one from `name`.
pub fn resolve_slug(explicit: Option<&str>, name: &str) -> CatalogResult<String> {
    let source = explicit.filter(|s| !s.trim().is_empty()).unwrap_or(name);
    let slug = slugify(source);
    if slug.is_empty() {
        return Err(CatalogError::Validation(format!(
            "cannot derive a slug from '{source}'"
        )));
    }
    Ok(slug)
}

/// Trimmed, uppercased SKU; `None` when the caller left it blank.
pub fn normalize_sku(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}

/// `<PREFIX>-<NNNN>` where the prefix is the last four characters of the
/// category id.
pub fn generate_sku(category: Option<&CategoryId>) -> String {
    let prefix = match category {
        Some(id) => {
            let chars: Vec<char> = id.as_str().chars().collect();
            let start = chars.len().saturating_sub(4);
            chars[start..].iter().collect::<String>().to_uppercase()
        }
        None => "PROD".to_string(),
    };
    let number: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{prefix}-{number:04}")
}

/// Trim a required text field and enforce its length limit (in characters).
pub fn required_text(field: &str, value: &str, max_chars: usize) -> CatalogResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Validation(format!("{field} is required")));
    }
    check_length(field, trimmed, max_chars)?;
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank input becomes `None`.
pub fn optional_text(
    field: &str,
    value: Option<&str>,
    max_chars: usize,
) -> CatalogResult<Option<String>> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => {
            check_length(field, text, max_chars)?;
            Ok(Some(text.to_string()))
        }
        None => Ok(None),
    }
}

fn check_length(field: &str, text: &str, max_chars: usize) -> CatalogResult<()> {
    if text.chars().count() > max_chars {
        return Err(CatalogError::Validation(format!(
            "{field} cannot exceed {max_chars} characters"
        )));
    }
    Ok(())
}
