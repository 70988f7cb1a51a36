use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{domain}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Identity and profile errors
/// - E2xxx: Friend graph errors
/// - E3xxx: Messaging errors
/// - E4xxx: Forum errors
/// - E5xxx: Notification errors
/// - E6xxx: Event errors
/// - E7xxx: Leaderboard errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    ServiceUnavailable,
    BadRequest,
    TokenExpired,
    TokenInvalid,

    // Identity (E1xxx)
    UserNotFound,
    ProfileNotFound,
    AccountSuspended,
    InvalidRole,

    // Friend graph (E2xxx)
    CannotFriendSelf,
    AlreadyFriends,
    DuplicatePendingRequest,
    FriendRequestNotFound,
    FriendRequestResolved,
    NotFriends,

    // Messaging (E3xxx)
    ConversationNotFound,
    NotConversationMember,
    EmptyMessageBody,
    GroupNameRequired,
    GroupTooSmall,
    CannotMessageSelf,
    AlreadyConversationMember,

    // Forum (E4xxx)
    PostNotFound,
    CommentNotFound,
    InvalidPrivacy,
    InvalidTag,
    CommentParentMismatch,
    CommentTooDeep,

    // Notification (E5xxx)
    NotificationNotFound,

    // Events (E6xxx)
    EventNotFound,
    NotCio,
    InvalidEventWindow,

    // Leaderboard (E7xxx)
    TaskNotFound,
    ProofRequired,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::ServiceUnavailable => "E0006",
            Self::BadRequest => "E0007",
            Self::TokenExpired => "E0008",
            Self::TokenInvalid => "E0009",

            // Identity
            Self::UserNotFound => "E1001",
            Self::ProfileNotFound => "E1002",
            Self::AccountSuspended => "E1003",
            Self::InvalidRole => "E1004",

            // Friend graph
            Self::CannotFriendSelf => "E2001",
            Self::AlreadyFriends => "E2002",
            Self::DuplicatePendingRequest => "E2003",
            Self::FriendRequestNotFound => "E2004",
            Self::FriendRequestResolved => "E2005",
            Self::NotFriends => "E2006",

            // Messaging
            Self::ConversationNotFound => "E3001",
            Self::NotConversationMember => "E3002",
            Self::EmptyMessageBody => "E3003",
            Self::GroupNameRequired => "E3004",
            Self::GroupTooSmall => "E3005",
            Self::CannotMessageSelf => "E3006",
            Self::AlreadyConversationMember => "E3007",

            // Forum
            Self::PostNotFound => "E4001",
            Self::CommentNotFound => "E4002",
            Self::InvalidPrivacy => "E4003",
            Self::InvalidTag => "E4004",
            Self::CommentParentMismatch => "E4005",
            Self::CommentTooDeep => "E4006",

            // Notification
            Self::NotificationNotFound => "E5001",

            // Events
            Self::EventNotFound => "E6001",
            Self::NotCio => "E6002",
            Self::InvalidEventWindow => "E6003",

            // Leaderboard
            Self::TaskNotFound => "E7001",
            Self::ProofRequired => "E7002",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ValidationError | Self::BadRequest | Self::InvalidRole
            | Self::EmptyMessageBody | Self::GroupNameRequired | Self::GroupTooSmall
            | Self::InvalidPrivacy | Self::InvalidTag | Self::CommentParentMismatch
            | Self::CommentTooDeep | Self::InvalidEventWindow | Self::ProofRequired
            | Self::CannotFriendSelf | Self::CannotMessageSelf => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::UserNotFound | Self::ProfileNotFound
            | Self::FriendRequestNotFound | Self::NotFriends | Self::ConversationNotFound
            | Self::PostNotFound | Self::CommentNotFound | Self::NotificationNotFound
            | Self::EventNotFound | Self::TaskNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::AccountSuspended | Self::NotConversationMember
            | Self::NotCio => StatusCode::FORBIDDEN,
            Self::AlreadyFriends | Self::DuplicatePendingRequest | Self::FriendRequestResolved
            | Self::AlreadyConversationMember => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The known error code, if any. Infrastructure failures have none.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            AppError::Validation(_) => Some(ErrorCode::ValidationError),
            _ => None,
        }
    }

    /// Translate a unique-constraint violation into a known conflict,
    /// passing every other database error through untouched.
    pub fn from_unique_violation(
        err: diesel::result::Error,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        if is_unique_violation(&err) {
            Self::new(code, message)
        } else {
            Self::Database(err)
        }
    }
}

pub fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
