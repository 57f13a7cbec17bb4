//! Error types for the translation layer
//!
//! Every error renders as a Kubernetes `Status` object so `kubectl` prints
//! the message the same way it does for built-in resources.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kube::core::ErrorResponse;

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, Error>;

/// REST operation an error occurred in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// create
    Create,
    /// get
    Get,
    /// list
    List,
    /// update
    Update,
    /// patch
    Patch,
    /// delete
    Delete,
    /// watch
    Watch,
    /// convert-to-table
    ConvertToTable,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::List => "list",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Watch => "watch",
            Self::ConvertToTable => "convert-to-table",
        };
        f.write_str(s)
    }
}

/// Error type for translation operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request carried no namespace
    #[error("namespace is required for {operation}")]
    NamespaceRequired {
        /// Operation that was attempted
        operation: Operation,
    },

    /// A record could not be converted between shapes
    #[error("conversion error during {operation} of {name}: {message}")]
    Conversion {
        /// Operation that was attempted
        operation: Operation,
        /// Record name
        name: String,
        /// What failed
        message: String,
    },

    /// The backing record does not exist (or is out of scope)
    #[error("{}", .status.message)]
    BackingNotFound {
        /// Synthetic name that was requested
        name: String,
        /// Status returned by the backing store, kept verbatim
        status: ErrorResponse,
    },

    /// The backing store rejected or failed a call
    #[error("failed to {operation} {name}: {source}")]
    BackingOperationFailed {
        /// Operation that was attempted
        operation: Operation,
        /// Record name
        name: String,
        /// Backing client error
        #[source]
        source: kube::Error,
    },

    /// The object cannot be rendered in the requested representation
    #[error("{message}")]
    NotAcceptable {
        /// Resource the request addressed (e.g. "postgreses.apps.cozystack.io")
        resource: String,
        /// Description of what was unsupported
        message: String,
    },

    /// Malformed request (body, patch type, query)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No resource type is configured under the requested path
    #[error("the server could not find the requested resource ({0})")]
    ResourceNotFound(String),
}

impl Error {
    /// Wrap a backing client error, keeping a backing 404 verbatim
    pub fn from_backing(operation: Operation, name: impl Into<String>, err: kube::Error) -> Self {
        let name = name.into();
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Error::BackingNotFound { name, status: ae },
            source => Error::BackingOperationFailed {
                operation,
                name,
                source,
            },
        }
    }

    /// Synthesize a not-found for a record that exists but is out of scope
    pub fn not_found(resource: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Error::BackingNotFound {
            status: ErrorResponse {
                status: "Failure".to_string(),
                message: format!("{} \"{}\" not found", resource, name),
                reason: "NotFound".to_string(),
                code: 404,
            },
            name,
        }
    }

    /// Create a conversion error
    pub fn conversion(
        operation: Operation,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Conversion {
            operation,
            name: name.into(),
            message: message.into(),
        }
    }

    /// HTTP status code of the rendered `Status`
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NamespaceRequired { .. } | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Conversion { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::BackingNotFound { .. } | Error::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            Error::BackingOperationFailed { source, .. } => match source {
                kube::Error::Api(ae) => StatusCode::from_u16(ae.code)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
        }
    }

    /// Machine-readable `Status.reason`
    pub fn reason(&self) -> &str {
        match self {
            Error::NamespaceRequired { .. } | Error::BadRequest(_) => "BadRequest",
            Error::Conversion { .. } => "InternalError",
            Error::BackingNotFound { status, .. } => status.reason.as_str(),
            Error::ResourceNotFound(_) => "NotFound",
            Error::BackingOperationFailed { source, .. } => match source {
                kube::Error::Api(ae) if !ae.reason.is_empty() => ae.reason.as_str(),
                _ => "InternalError",
            },
            Error::NotAcceptable { .. } => "NotAcceptable",
        }
    }

    /// Render as a Kubernetes `Status` object
    pub fn to_status(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": self.to_string(),
            "reason": self.reason(),
            "code": self.status_code().as_u16()
        })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status_code(), axum::Json(self.to_status())).into_response()
    }
}
