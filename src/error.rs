use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SMS delivery error: {0}")]
    Sms(#[from] SmsError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::Database(DatabaseError::NotFound),
            _ => AppError::Database(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Auth(AuthError::TokenExpired)
            }
            _ => AppError::Auth(AuthError::InvalidToken),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Business failures carry their stable message; infrastructure
        // failures stay opaque to the caller.
        let message = if status.is_server_error() {
            match self {
                AppError::Sms(_) => "Failed to send OTP. Please try again later.".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            match self {
                AppError::Auth(e) => e.to_string(),
                AppError::Validation(msg) => msg.clone(),
                other => other.to_string(),
            }
        };
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(e) => match e {
                AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                AuthError::Blocked(_) => StatusCode::FORBIDDEN,
                AuthError::InvalidRegistrationToken => StatusCode::FORBIDDEN,
                AuthError::InvalidOtp => StatusCode::BAD_REQUEST,
                AuthError::AlreadyExists => StatusCode::BAD_REQUEST,
                AuthError::PhoneNotRegistered => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Sms(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Too many OTP requests. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    Blocked(&'static str),

    #[error("Incorrect OTP.")]
    InvalidOtp,

    #[error("Invalid or expired registration token.")]
    InvalidRegistrationToken,

    #[error("User already exists.")]
    AlreadyExists,

    #[error("Phone number not registered.")]
    PhoneNotRegistered,

    #[error("Incorrect password.")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("store operation failed: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum SmsError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("gateway rejected message: {0}")]
    Gateway(String),
}

impl From<reqwest::Error> for SmsError {
    fn from(err: reqwest::Error) -> Self {
        SmsError::Request(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,
}
