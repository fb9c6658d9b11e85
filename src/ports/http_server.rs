use axum::{
    body::Body as AxumBody,
    http::{StatusCode, header},
    response::Response,
};
use thiserror::Error;

use crate::core::i18n::{Language, Message};

/// Error type for HTTP handler operations.
///
/// `BadRequest` and `NotFound` carry the already localized text sent to the
/// client. `Internal` carries the real cause, which is logged and replaced by
/// the generic localized message.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0:#}")]
    Internal(eyre::Report),
}

impl From<eyre::Report> for HandlerError {
    fn from(report: eyre::Report) -> Self {
        HandlerError::Internal(report)
    }
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::NotFound(_) => StatusCode::NOT_FOUND,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into the single terminal response for the request
    pub fn into_localized_response(self, language: Language) -> Response<AxumBody> {
        let status = self.status();
        let body = match self {
            HandlerError::BadRequest(message) | HandlerError::NotFound(message) => message,
            HandlerError::Internal(report) => {
                tracing::error!("Error while handling request: {:?}", report);
                Message::InternalError.text(language).to_string()
            }
        };

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(AxumBody::from(body.clone()))
            .unwrap_or_else(|_| {
                let mut response = Response::new(AxumBody::from(body));
                *response.status_mut() = status;
                response
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_hides_cause() {
        let err = HandlerError::from(eyre::eyre!("database exploded"));
        let response = err.into_localized_response(Language::EnUs);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_client_errors_keep_status() {
        assert_eq!(
            HandlerError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::NotFound("x".into())
                .into_localized_response(Language::ZhCn)
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
