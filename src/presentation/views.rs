use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};

use crate::application::error::{AppError, ErrorReport};
use crate::domain::entities::{CatalogEntry, ExternalPlaylistSnapshot};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl From<TemplateRenderError> for AppError {
    fn from(err: TemplateRenderError) -> Self {
        AppError::unexpected(format!("{} ({}): {}", err.public_message, err.source, err.error))
    }
}

pub fn render_template<T: Template>(template: T) -> Result<String, AppError> {
    template.render().map_err(|error| {
        TemplateRenderError {
            source: "presentation::views::render_template",
            public_message: "Template rendering failed",
            error,
        }
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let mut response = render_template_response(
        MessageTemplate {
            view: MessageView::not_found(),
        },
        StatusCode::NOT_FOUND,
    );
    ErrorReport::from_error(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        &AppError::not_found("page"),
    )
    .attach(&mut response);
    response
}

/// A page that could not be built and has no earlier rendering to fall back on.
pub fn render_unavailable_response(err: &AppError) -> Response {
    let status = StatusCode::SERVICE_UNAVAILABLE;
    let mut response = render_template_response(
        MessageTemplate {
            view: MessageView::unavailable(err.presentation_message()),
        },
        status,
    );
    ErrorReport::from_error("presentation::views::render_unavailable_response", status, err)
        .attach(&mut response);
    response
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute] UTC");
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub struct PlaylistCard {
    pub rank: usize,
    pub href: String,
    pub name: String,
    pub owner: String,
    pub color: String,
    pub upvotes: u64,
}

impl PlaylistCard {
    pub fn new(rank: usize, entry: &CatalogEntry) -> Self {
        Self {
            rank,
            href: format!("/playlist/{}", entry.id),
            name: entry.name.clone(),
            owner: entry.owner.clone(),
            color: entry.color.clone(),
            upvotes: entry.upvotes,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub cards: Vec<PlaylistCard>,
    pub generated_at: String,
}

impl IndexTemplate {
    pub fn new(entries: &[CatalogEntry], generated_at: OffsetDateTime) -> Self {
        Self {
            cards: entries
                .iter()
                .enumerate()
                .map(|(index, entry)| PlaylistCard::new(index + 1, entry))
                .collect(),
            generated_at: format_timestamp(generated_at),
        }
    }
}

pub struct TrackRow {
    pub position: u32,
    pub title: String,
    pub artists: String,
    pub duration: String,
}

pub struct PlaylistDetailView {
    pub name: String,
    pub owner: String,
    pub slug: String,
    pub color: String,
    pub upvotes: u64,
    pub external_id: String,
    pub has_live_data: bool,
    pub external_url: String,
    pub image_url: String,
    pub has_image: bool,
    pub tracks: Vec<TrackRow>,
}

impl PlaylistDetailView {
    /// Stored fields always come from the entry; links, artwork and tracks
    /// only when the provider answered.
    pub fn new(entry: &CatalogEntry, snapshot: Option<&ExternalPlaylistSnapshot>) -> Self {
        let image_url = snapshot.and_then(|s| s.image_url.clone());
        let tracks = snapshot
            .map(|s| {
                s.tracks
                    .iter()
                    .map(|track| TrackRow {
                        position: track.position,
                        title: track.title.clone(),
                        artists: track.artists_label(),
                        duration: track.duration_label(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: entry.name.clone(),
            owner: entry.owner.clone(),
            slug: entry.slug.clone(),
            color: entry.color.clone(),
            upvotes: entry.upvotes,
            external_id: entry.external_id.clone(),
            has_live_data: snapshot.is_some(),
            external_url: snapshot
                .and_then(|s| s.external_url.clone())
                .unwrap_or_default(),
            has_image: image_url.is_some(),
            image_url: image_url.unwrap_or_default(),
            tracks,
        }
    }
}

#[derive(Template)]
#[template(path = "playlist.html")]
pub struct PlaylistTemplate {
    pub view: PlaylistDetailView,
    pub generated_at: String,
}

#[derive(Template)]
#[template(path = "placeholder.html")]
pub struct PlaceholderTemplate {
    pub path: String,
}

pub struct MessageView {
    pub title: String,
    pub message: String,
}

impl MessageView {
    pub fn not_found() -> Self {
        Self {
            title: "Playlist Not Found".to_string(),
            message: "Nothing lives at this address. The catalog might have more for you."
                .to_string(),
        }
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            title: "Temporarily Unavailable".to_string(),
            message: format!("{message}. Please try again in a moment."),
        }
    }
}

#[derive(Template)]
#[template(path = "message.html")]
pub struct MessageTemplate {
    pub view: MessageView,
}
