use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        let message = error.to_string();
        match error {
            AppErr::NotFound { .. } => ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            AppErr::Unauthenticated => ApiError::unauthorized(message),
            AppErr::SelfTarget => ApiError::new(StatusCode::BAD_REQUEST, "SELF_TARGET", message),
            AppErr::AlreadyFriends => {
                ApiError::new(StatusCode::BAD_REQUEST, "ALREADY_FRIENDS", message)
            }
            AppErr::AlreadyRequested => {
                ApiError::new(StatusCode::BAD_REQUEST, "ALREADY_REQUESTED", message)
            }
            AppErr::InvalidArgument { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", message)
            }
            AppErr::NotInvited => ApiError::new(StatusCode::FORBIDDEN, "NOT_INVITED", message),
            AppErr::NotInParty => ApiError::new(StatusCode::NOT_FOUND, "NOT_IN_PARTY", message),
            AppErr::AlreadyInParty => {
                ApiError::new(StatusCode::CONFLICT, "ALREADY_IN_PARTY", message)
            }
            AppErr::AlreadyExists { .. } => {
                ApiError::new(StatusCode::CONFLICT, "ALREADY_EXISTS", message)
            }
            AppErr::Conflict => ApiError::new(StatusCode::CONFLICT, "CONFLICT", message),
            AppErr::Unavailable { .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
            }
            AppErr::Storage { message } => {
                tracing::error!(%message, "storage failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "storage error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_errors_map_to_status_codes() {
        let cases = [
            (ApplicationError::not_found("party"), StatusCode::NOT_FOUND),
            (ApplicationError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ApplicationError::SelfTarget, StatusCode::BAD_REQUEST),
            (ApplicationError::AlreadyRequested, StatusCode::BAD_REQUEST),
            (ApplicationError::NotInvited, StatusCode::FORBIDDEN),
            (ApplicationError::NotInParty, StatusCode::NOT_FOUND),
            (ApplicationError::AlreadyInParty, StatusCode::CONFLICT),
            (ApplicationError::Conflict, StatusCode::CONFLICT),
            (ApplicationError::unavailable("timeout"), StatusCode::SERVICE_UNAVAILABLE),
            (
                ApplicationError::Storage {
                    message: "disk".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let api = ApiError::from(ApplicationError::Storage {
            message: "password=hunter2".into(),
        });
        assert_eq!(api.code(), "STORAGE_ERROR");
        assert!(!api.message().contains("hunter2"));
    }
}
