use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};

use super::auth::BASIC_CHALLENGE;
use super::render;
use crate::error::ConsoleError;

impl ConsoleError {
    /// HTTP status for this error.
    ///
    /// Collaborator failures are upstream problems (502); everything the console cannot
    /// attribute to the operator or a collaborator is a 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConsoleError::Unauthorized => StatusCode::UNAUTHORIZED,
            ConsoleError::RequestNotFound(_) | ConsoleError::FileMissing(_) => {
                StatusCode::NOT_FOUND
            }
            ConsoleError::InvalidTransition { .. } | ConsoleError::DeliveryInProgress(_) => {
                StatusCode::CONFLICT
            }
            ConsoleError::Generation(_) | ConsoleError::Send(_) => StatusCode::BAD_GATEWAY,
            ConsoleError::Validation(_) => StatusCode::BAD_REQUEST,
            #[cfg(feature = "postgres")]
            ConsoleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ConsoleError::Config(_)
            | ConsoleError::Io(_)
            | ConsoleError::Serialization(_)
            | ConsoleError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the operator. Internal failures are not described.
    fn public_message(&self) -> String {
        if self.status_code().is_server_error() && !self.is_collaborator_failure() {
            "Internal error, see the console logs".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Admin action failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Admin action rejected");
        }

        let mut response =
            (status, Html(render::error_page(status, &self.public_message()))).into_response();
        if matches!(self, ConsoleError::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BASIC_CHALLENGE),
            );
        }
        response
    }
}
