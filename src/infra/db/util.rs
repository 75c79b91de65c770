use crate::application::repos::RepoError;

const SLUG_CONSTRAINT: &str = "playlists_slug_key";

/// Classify a sqlx failure; `slug` names the value a unique violation refers to.
pub fn map_sqlx_error(err: sqlx::Error, slug: Option<&str>) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.constraint() == Some(SLUG_CONSTRAINT) =>
        {
            RepoError::DuplicateSlug {
                slug: slug.unwrap_or_default().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.is_check_violation() || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        other => RepoError::from_persistence(other),
    }
}
