use crate::application::error::{AppError, ErrorReport};
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const VALIDATION: &str = "validation_failed";
    pub const DUPLICATE_SLUG: &str = "duplicate_slug";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UNREACHABLE: &str = "provider_unreachable";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    retry_after: Option<u64>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            retry_after: None,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        let code = match &err {
            AppError::ValidationFailed(_) => codes::VALIDATION,
            AppError::DuplicateSlug { .. } => codes::DUPLICATE_SLUG,
            AppError::NotFound { .. } => codes::NOT_FOUND,
            AppError::RateLimited { .. } => codes::RATE_LIMITED,
            AppError::Unreachable(_) => codes::UNREACHABLE,
            AppError::StoreUnavailable(_) => codes::STORE_UNAVAILABLE,
            AppError::Infra(_) | AppError::Unexpected(_) => {
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    codes::STORE_UNAVAILABLE
                } else {
                    codes::INTERNAL
                }
            }
        };
        // Only caller-actionable detail is echoed back.
        let hint = match &err {
            AppError::ValidationFailed(message) => Some(message.clone()),
            AppError::DuplicateSlug { slug } => {
                Some(format!("slug `{slug}` is taken; choose another name"))
            }
            AppError::RateLimited {
                retry_after: Some(after),
            } => Some(format!("Retry after {} seconds", after.as_secs())),
            _ => None,
        };
        let retry_after = match &err {
            AppError::RateLimited { retry_after } => retry_after.map(|after| after.as_secs()),
            _ => None,
        };

        Self {
            status,
            code,
            message: err.presentation_message(),
            hint,
            retry_after,
            report: Some(ErrorReport::from_error("infra::http::api", status, &err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| ErrorReport {
            source: "infra::http::api",
            status: self.status,
            messages: vec![format!(
                "{}: {}",
                self.code,
                self.hint.as_deref().unwrap_or(self.message)
            )],
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(value) = self
            .retry_after
            .and_then(|seconds| HeaderValue::from_str(&seconds.to_string()).ok())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn duplicate_slug_maps_to_conflict_with_hint() {
        let err = ApiError::from(AppError::DuplicateSlug {
            slug: "friday-mix".into(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), codes::DUPLICATE_SLUG);
        assert!(err.hint.as_deref().unwrap_or_default().contains("friday-mix"));
    }

    #[test]
    fn rate_limit_sets_retry_after_header() {
        let response = ApiError::from(AppError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("7"))
        );
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ApiError::from(AppError::unexpected("secret connection string"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), codes::INTERNAL);
        assert!(err.hint.is_none());
    }
}
