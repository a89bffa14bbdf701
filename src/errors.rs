use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Coarse classification of a failure, used by the transport to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ServiceUnavailable,
    NotFound,
    BadRequest,
    Unauthorized,
    PermissionDenied,
    RateLimitExceeded,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    #[error("Backend is shutting down")]
    #[diagnostic(code(tungsten::request::shutdown))]
    Shutdown,

    #[error("Invalid request body")]
    #[diagnostic(code(tungsten::request::invalid_body))]
    InvalidBody,

    #[error("Missing argument \"{0}\"")]
    #[diagnostic(code(tungsten::request::missing_argument))]
    MissingArgument(String),

    #[error("Wrong type for argument \"{name}\" (expected: {expected})")]
    #[diagnostic(code(tungsten::request::invalid_type))]
    InvalidType { name: String, expected: &'static str },

    #[error("Invalid email format")]
    #[diagnostic(code(tungsten::request::email_format))]
    InvalidEmailFormat,

    #[error("Rate limit exceeded for action {resource}:{action}")]
    #[diagnostic(code(tungsten::request::rate_limit))]
    RateLimitExceeded { resource: String, action: String },

    #[error("Duplicate URL: \"{0}\"")]
    #[diagnostic(
        code(tungsten::http::duplicate_url),
        help("Two routes normalize to the same verb and path; parameter names do not disambiguate")
    )]
    DuplicateUrl(String),

    #[error("URL not found: \"{0}\"")]
    #[diagnostic(code(tungsten::http::url_not_found))]
    UrlNotFound(String),

    #[error("Cannot attach path {path}: no action {action} for controller {resource}")]
    #[diagnostic(code(tungsten::http::missing_action))]
    MissingAction {
        path: String,
        resource: String,
        action: String,
    },

    #[error("File not found: \"{0}\"")]
    #[diagnostic(code(tungsten::http::file_not_found))]
    FileNotFound(String),

    #[error("Operation \"{0}\" is already registered")]
    #[diagnostic(code(tungsten::bus::duplicate_operation))]
    DuplicateOperation(&'static str),

    #[error("No handler registered for operation \"{0}\"")]
    #[diagnostic(code(tungsten::bus::unknown_operation))]
    UnknownOperation(&'static str),

    #[error("Operation \"{0}\" was registered with different argument or result types")]
    #[diagnostic(code(tungsten::bus::type_mismatch))]
    OperationTypeMismatch(&'static str),

    #[error("Username already taken")]
    #[diagnostic(code(tungsten::user::username_taken))]
    UsernameTaken,

    #[error("Email already taken")]
    #[diagnostic(code(tungsten::user::email_taken))]
    EmailTaken,

    #[error("User with id \"{0}\" not found")]
    #[diagnostic(code(tungsten::user::not_found))]
    UserWithIdNotFound(i32),

    #[error("Invalid Username or Password")]
    #[diagnostic(code(tungsten::user::invalid_credentials))]
    InvalidCredentials,

    #[error("Password too short, should be at least {0} characters")]
    #[diagnostic(code(tungsten::user::password_too_short))]
    PasswordTooShort(usize),

    #[error("Password too weak, should include at least 1 Capital letter and 1 Number")]
    #[diagnostic(code(tungsten::user::password_too_weak))]
    PasswordTooWeak,

    #[error("Username too short, should be at least {0} characters")]
    #[diagnostic(code(tungsten::user::username_too_short))]
    UsernameTooShort(usize),

    #[error("Failed to generate new token")]
    #[diagnostic(code(tungsten::token::creation_failed))]
    TokenCreationFailed,

    #[error("User not authenticated")]
    #[diagnostic(code(tungsten::user::not_authenticated))]
    NotAuthenticated,

    #[error("User does not have the required permissions to execute \"{resource}:{action}\"")]
    #[diagnostic(code(tungsten::permission::denied))]
    PermissionDenied { resource: String, action: String },

    #[error("Bank account not found")]
    #[diagnostic(code(tungsten::bank_account::not_found))]
    BankAccountNotFound,

    #[error("Could not verify bank account details")]
    #[diagnostic(code(tungsten::bank_account::verification_failed))]
    BankAccountVerificationFailed,

    #[error("Failed to create bank account")]
    #[diagnostic(code(tungsten::bank_account::creation_failed))]
    BankAccountCreationFailed,

    #[error("Product \"{0}\" not found")]
    #[diagnostic(code(tungsten::product::not_found))]
    ProductNotFound(String),

    #[error("Failed to store product \"{0}\"")]
    #[diagnostic(code(tungsten::product::add_failed))]
    ProductAddFailed(String),

    #[error("Transaction Rejected: {0}")]
    #[diagnostic(code(tungsten::transaction::rejected))]
    TransactionRejected(String),

    #[error("Fund insufficient to complete transaction")]
    #[diagnostic(code(tungsten::transaction::insufficient_funds))]
    InsufficientFunds,

    #[error("Database error: {0}")]
    #[diagnostic(code(tungsten::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(tungsten::jose))]
    Jose(String),

    #[error("Upstream request failed: {0}")]
    #[diagnostic(code(tungsten::upstream))]
    Upstream(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    #[diagnostic(code(tungsten::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(tungsten::serde))]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    #[diagnostic(code(tungsten::other))]
    Other(String),
}

impl From<josekit::JoseError> for BackendError {
    fn from(value: josekit::JoseError) -> Self {
        BackendError::Jose(value.to_string())
    }
}

impl BackendError {
    /// Stable machine-readable code rendered to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Shutdown => "request:discarded:shutdown",
            BackendError::InvalidBody => "request:invalid:body",
            BackendError::MissingArgument(_) => "request:invalid:missing_argument",
            BackendError::InvalidType { .. } => "request:invalid:invalid_type",
            BackendError::InvalidEmailFormat => "request:invalid:email_format",
            BackendError::RateLimitExceeded { .. } => "request:rate:limit_exceeded",
            BackendError::DuplicateUrl(_) => "network:http:duplicate_url",
            BackendError::UrlNotFound(_) => "network:http:url_not_found",
            BackendError::MissingAction { .. } => "network:http:missing_action",
            BackendError::FileNotFound(_) => "network:file:not_found",
            BackendError::DuplicateOperation(_) => "core:bus:duplicate_operation",
            BackendError::UnknownOperation(_) => "core:bus:unknown_operation",
            BackendError::OperationTypeMismatch(_) => "core:bus:type_mismatch",
            BackendError::UsernameTaken => "security:user:username_taken",
            BackendError::EmailTaken => "security:user:email_taken",
            BackendError::UserWithIdNotFound(_) => "security:user:with_id_not_found",
            BackendError::InvalidCredentials => "security:user:invalid_credentials",
            BackendError::PasswordTooShort(_) => "security:user:password_too_short",
            BackendError::PasswordTooWeak => "security:user:password_too_weak",
            BackendError::UsernameTooShort(_) => "security:user:username_too_short",
            BackendError::TokenCreationFailed => "security:token:creation_failed",
            BackendError::NotAuthenticated => "security:user:not_authenticated",
            BackendError::PermissionDenied { .. } => "security:permission:denied",
            BackendError::BankAccountNotFound => "api:bankAccount:not_found",
            BackendError::BankAccountVerificationFailed => "api:bankAccount:verification_failed",
            BackendError::BankAccountCreationFailed => "api:bankAccount:creation_failed",
            BackendError::ProductNotFound(_) => "api:product:not_found",
            BackendError::ProductAddFailed(_) => "api:product:add_failed",
            BackendError::TransactionRejected(_) => "security:transaction:rejected",
            BackendError::InsufficientFunds => "security:transaction:insufficient_funds",
            BackendError::Db(_) => "core:storage:database",
            BackendError::Jose(_)
            | BackendError::Upstream(_)
            | BackendError::Io(_)
            | BackendError::Serde(_)
            | BackendError::Other(_) => "core:internal",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Shutdown => ErrorKind::ServiceUnavailable,
            BackendError::UrlNotFound(_)
            | BackendError::FileNotFound(_)
            | BackendError::UserWithIdNotFound(_)
            | BackendError::BankAccountNotFound
            | BackendError::ProductNotFound(_) => ErrorKind::NotFound,
            BackendError::InvalidBody
            | BackendError::MissingArgument(_)
            | BackendError::InvalidType { .. }
            | BackendError::InvalidEmailFormat
            | BackendError::PasswordTooShort(_)
            | BackendError::PasswordTooWeak
            | BackendError::UsernameTooShort(_)
            | BackendError::TransactionRejected(_) => ErrorKind::BadRequest,
            BackendError::InvalidCredentials | BackendError::NotAuthenticated => {
                ErrorKind::Unauthorized
            }
            BackendError::PermissionDenied { .. }
            | BackendError::BankAccountVerificationFailed
            | BackendError::InsufficientFunds => ErrorKind::PermissionDenied,
            BackendError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            BackendError::DuplicateUrl(_)
            | BackendError::DuplicateOperation(_)
            | BackendError::UsernameTaken
            | BackendError::EmailTaken => ErrorKind::Conflict,
            BackendError::MissingAction { .. }
            | BackendError::UnknownOperation(_)
            | BackendError::OperationTypeMismatch(_)
            | BackendError::TokenCreationFailed
            | BackendError::BankAccountCreationFailed
            | BackendError::ProductAddFailed(_)
            | BackendError::Db(_)
            | BackendError::Jose(_)
            | BackendError::Upstream(_)
            | BackendError::Io(_)
            | BackendError::Serde(_)
            | BackendError::Other(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        // Storage and library failures stay in the logs.
        let message = match &self {
            BackendError::Db(_)
            | BackendError::Jose(_)
            | BackendError::Upstream(_)
            | BackendError::Io(_)
            | BackendError::Serde(_)
            | BackendError::Other(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };
        let body = json!({ "error": { "code": self.code(), "message": message } });
        (kind.status(), Json(body)).into_response()
    }
}
