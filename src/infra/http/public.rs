use axum::{
    Router,
    extract::{Path, State},
    http::{
        HeaderName, HeaderValue, StatusCode,
        header::CACHE_CONTROL,
    },
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use uuid::Uuid;

use crate::{
    application::{
        catalog::CatalogService,
        error::{AppError, ErrorReport},
    },
    presentation::views::{
        PlaceholderTemplate, render_not_found_response, render_template_response,
        render_unavailable_response,
    },
    regen::{PageKey, PageOutcome, PageScheduler},
};

use super::{
    RouterState,
    middleware::{log_responses, set_request_context},
};

pub const PAGE_STATE_HEADER: HeaderName = HeaderName::from_static("x-mixboard-page");

#[derive(Clone)]
pub struct HttpState {
    pub scheduler: PageScheduler,
    pub catalog: CatalogService,
}

pub fn build_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route("/", get(index))
        .route("/playlist/{id}", get(playlist_detail))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(State(state): State<HttpState>) -> Response {
    page_response(PageKey::List, state.scheduler.render_list().await)
}

async fn playlist_detail(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    // Anything that is not an id cannot name a playlist.
    let Ok(id) = Uuid::parse_str(&id) else {
        return render_not_found_response();
    };
    page_response(PageKey::Detail(id), state.scheduler.render_detail(id).await)
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.catalog.health().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

fn page_response(key: PageKey, outcome: Result<PageOutcome, AppError>) -> Response {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => return render_unavailable_response(&err),
    };
    let label = outcome.label();

    let mut response = match outcome {
        PageOutcome::Fresh(page) | PageOutcome::Stale(page) => {
            (StatusCode::OK, Html(page.html.clone())).into_response()
        }
        PageOutcome::Placeholder => {
            let mut response = render_template_response(
                PlaceholderTemplate {
                    path: key.to_string(),
                },
                StatusCode::OK,
            );
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        PageOutcome::NotFound => return render_not_found_response(),
    };

    response
        .headers_mut()
        .insert(PAGE_STATE_HEADER, HeaderValue::from_static(label));
    response
}
