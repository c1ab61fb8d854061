use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::utils::auth::TokenRejection;

pub(crate) const ALLOWED_UPDATES: [&str; 6] =
    ["title", "description", "price", "category", "contact", "status"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Database migration error: {0}")]
    DatabaseMigration(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Validation failed: {0:?}")]
    InvalidFields(BTreeMap<&'static str, &'static str>),
    #[error("Invalid update fields")]
    InvalidUpdateFields,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Email already registered")]
    EmailTaken,
    #[error("User not found")]
    UserNotFound,
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("Product not found")]
    ProductNotFound,
    #[error("No credentials provided")]
    NoCredentials,
    #[error("Invalid credential: {0:?}")]
    InvalidCredential(TokenRejection),
    #[error("Forbidden")]
    Forbidden,
    #[error("No file uploaded")]
    MissingFile,
    #[error("Only image uploads are allowed")]
    UnsupportedFileType,
    #[error("Upload exceeds {0} bytes")]
    FileTooLarge(usize),
    #[error("Path escapes the upload directory: {0}")]
    InvalidPath(String),
    #[error("Invalid request body: {0}")]
    JsonBody(#[from] JsonRejection),
    #[error("Invalid query: {0}")]
    Query(#[from] QueryRejection),
    #[error("Invalid path: {0}")]
    PathParam(#[from] PathRejection),
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Not a multipart request: {0}")]
    MultipartRequest(#[from] MultipartRejection),
    #[error("Route not found")]
    RouteNotFound,
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::InvalidFields(_)
            | Error::InvalidUpdateFields
            | Error::UsernameTaken
            | Error::EmailTaken
            | Error::IncorrectPassword
            | Error::MissingFile
            | Error::UnsupportedFileType
            | Error::InvalidPath(_)
            | Error::JsonBody(_)
            | Error::Query(_) => StatusCode::BAD_REQUEST,
            Error::NoCredentials | Error::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::UserNotFound | Error::ProductNotFound | Error::RouteNotFound => {
                StatusCode::NOT_FOUND
            }
            Error::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::PathParam(e) => e.status(),
            Error::Multipart(e) => e.status(),
            Error::MultipartRequest(e) => e.status(),
            Error::Sql(_) | Error::Bcrypt(_) | Error::Jwt(_) | Error::IO(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        match self {
            Error::Validation(message) => message.clone(),
            Error::InvalidFields(_) => "Validation failed".into(),
            Error::InvalidUpdateFields => "Invalid update fields".into(),
            Error::UsernameTaken => "Username already exists".into(),
            Error::EmailTaken => "Email is already registered".into(),
            Error::UserNotFound => "User not found".into(),
            Error::IncorrectPassword => "Incorrect password".into(),
            Error::ProductNotFound => "Product not found".into(),
            Error::NoCredentials => "Missing credential".into(),
            // every token failure looks the same to the client
            Error::InvalidCredential(_) => "Invalid or expired credential".into(),
            Error::Forbidden => "Forbidden".into(),
            Error::MissingFile => "Please upload a file".into(),
            Error::UnsupportedFileType => "Only image files may be uploaded".into(),
            Error::FileTooLarge(limit) => format!("File must not exceed {limit} bytes"),
            Error::RouteNotFound => "Not found".into(),
            Error::InvalidPath(_) => "Invalid file path".into(),
            Error::JsonBody(e) => e.body_text(),
            Error::Query(e) => e.body_text(),
            Error::PathParam(e) => e.body_text(),
            Error::Multipart(e) => e.body_text(),
            Error::MultipartRequest(e) => e.body_text(),
            Error::Sql(_) | Error::Bcrypt(_) | Error::Jwt(_) | Error::IO(_) => {
                "Internal server error".into()
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("{:?}", self);
        } else {
            tracing::debug!("{:?}", self);
        }

        let mut body = json!({
            "code": status.as_u16(),
            "message": self.message(),
        });

        match &self {
            Error::InvalidFields(errors) => {
                body["errors"] = json!(errors);
            }
            Error::InvalidUpdateFields => {
                body["allowedUpdates"] = Value::from(ALLOWED_UPDATES.to_vec());
            }
            _ => (),
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: Error) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn envelope_code_mirrors_status() {
        let (status, body) = body_of(Error::Forbidden).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], 403);
        assert_eq!(body["message"], "Forbidden");
    }

    #[tokio::test]
    async fn token_failures_share_one_message() {
        let (_, expired) = body_of(Error::InvalidCredential(TokenRejection::Expired)).await;
        let (_, forged) = body_of(Error::InvalidCredential(TokenRejection::BadSignature)).await;
        let (status, malformed) = body_of(Error::InvalidCredential(TokenRejection::Malformed)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(expired, forged);
        assert_eq!(forged, malformed);
    }

    #[tokio::test]
    async fn internal_details_are_not_exposed() {
        let (status, body) = body_of(Error::Sql(sqlx::Error::PoolTimedOut)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn field_errors_are_listed() {
        let errors = BTreeMap::from([("qq", "QQ number must be 5-12 digits")]);
        let (status, body) = body_of(Error::InvalidFields(errors)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["qq"], "QQ number must be 5-12 digits");
    }

    #[tokio::test]
    async fn invalid_update_lists_allowed_fields() {
        let (_, body) = body_of(Error::InvalidUpdateFields).await;
        assert_eq!(body["allowedUpdates"].as_array().map(Vec::len), Some(6));
    }
}
