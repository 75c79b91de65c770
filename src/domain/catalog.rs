//! Field rules for catalog submissions.

use super::error::DomainError;
use super::slug::derive_slug;

/// Colour used when a submission does not pick one.
pub const DEFAULT_COLOR: &str = "#1db954";

pub const NAME_MAX_CHARS: usize = 60;
pub const OWNER_MAX_CHARS: usize = 60;
pub const EXTERNAL_ID_MAX_CHARS: usize = 30;

/// Unvalidated submission as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub name: String,
    pub owner: String,
    pub external_id: String,
    pub color: Option<String>,
}

/// A submission that passed every field rule and carries its derived slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalogEntry {
    pub name: String,
    pub owner: String,
    pub slug: String,
    pub external_id: String,
    pub color: String,
}

impl EntryDraft {
    pub fn validate(self) -> Result<NewCatalogEntry, DomainError> {
        let name = bounded_text("name", &self.name, NAME_MAX_CHARS)?;
        let owner = bounded_text("owner", &self.owner, OWNER_MAX_CHARS)?;
        let external_id = bounded_text("external_id", &self.external_id, EXTERNAL_ID_MAX_CHARS)?;
        let color = normalize_color(self.color.as_deref())?;
        let slug = derive_slug(&name)?;

        Ok(NewCatalogEntry {
            name,
            owner,
            slug,
            external_id,
            color,
        })
    }
}

fn bounded_text(field: &'static str, value: &str, max_chars: usize) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "value is required"));
    }
    let length = trimmed.chars().count();
    if length > max_chars {
        return Err(DomainError::validation(
            field,
            format!("must be at most {max_chars} characters, got {length}"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Accepts `#RGB` or `#RRGGBB`; a missing or blank value falls back to [`DEFAULT_COLOR`].
pub fn normalize_color(value: Option<&str>) -> Result<String, DomainError> {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(DEFAULT_COLOR.to_string());
    };

    let valid = raw
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()));

    if valid {
        Ok(raw.to_string())
    } else {
        Err(DomainError::validation(
            "color",
            format!("`{raw}` is not a #RGB or #RRGGBB hex colour"),
        ))
    }
}
