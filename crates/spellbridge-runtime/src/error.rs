//! Error types for the bridge runtime.
//!
//! Every failure surfaced to a script is a [`BridgeError`]. Errors carry a
//! stable [`ErrorKind`] so scripts can branch on the kind, and can be
//! rendered as a [`DynamicValue`] with [`BridgeError::to_value`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::DynamicValue;

/// Errors that can occur while registering, initializing or calling bridges.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Bridge is registered but not initialized.
    #[error("Bridge not initialized: {0}")]
    NotInitialized(String),

    /// No bridge with the requested id is registered.
    #[error("Bridge not found: {0}")]
    BridgeNotFound(String),

    /// Bridge does not expose the requested method.
    #[error("Method not found: {bridge}.{method}")]
    MethodNotFound { bridge: String, method: String },

    /// Wrong number of arguments, or arguments that fit no accepted shape.
    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    /// A value had a different kind than the one required.
    #[error("Type mismatch for {argument}: expected {expected}, got {actual}")]
    TypeMismatch {
        argument: String,
        expected: String,
        actual: String,
    },

    /// The caller's execution context was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// A bridge with the same id is already registered.
    #[error("Bridge already registered: {0}")]
    AlreadyRegistered(String),

    /// A bridge lists a method in its catalog without handling it.
    #[error("Method {bridge}.{method} is listed in the catalog but has no handler")]
    UnwiredMethod { bridge: String, method: String },

    /// The registry's permission policy refused the bridge.
    #[error("Permission denied for bridge {bridge}: {reason}")]
    PermissionDenied { bridge: String, reason: String },

    /// A declared dependency is not registered.
    #[error("Missing dependency: {bridge} requires {dependency}")]
    MissingDependency { bridge: String, dependency: String },

    /// Bridge dependencies form a cycle.
    #[error("Circular dependency detected involving bridge: {0}")]
    DependencyCycle(String),

    /// Bridge failed to initialize.
    #[error("Bridge initialization failed: {bridge}: {source}")]
    InitializationFailed {
        bridge: String,
        #[source]
        source: Box<BridgeError>,
    },

    /// One or more resources failed to release.
    #[error("Cleanup failed: {}", join_messages(.0))]
    Cleanup(Vec<BridgeError>),

    /// Configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error raised inside a bridge method, tagged with its origin.
    #[error("{bridge}.{method}: {source}")]
    Annotated {
        bridge: String,
        method: String,
        #[source]
        source: Box<BridgeError>,
    },

    /// Failure raised by an underlying bridge operation.
    #[error(transparent)]
    Operation(Box<dyn std::error::Error + Send + Sync>),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Stable classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInitialized,
    BridgeNotFound,
    MethodNotFound,
    InvalidArguments,
    TypeMismatch,
    Cancelled,
    Registration,
    PermissionDenied,
    Dependency,
    Initialization,
    Cleanup,
    Config,
    Io,
    Operation,
}

impl ErrorKind {
    /// Convert the kind to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::BridgeNotFound => "bridge_not_found",
            ErrorKind::MethodNotFound => "method_not_found",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Registration => "registration",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Initialization => "initialization",
            ErrorKind::Cleanup => "cleanup",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Operation => "operation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    /// Build an [`BridgeError::InvalidArguments`] error.
    pub fn invalid_arguments(method: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::InvalidArguments {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`BridgeError::TypeMismatch`] error.
    pub fn type_mismatch(
        argument: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        BridgeError::TypeMismatch {
            argument: argument.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Build a [`BridgeError::MethodNotFound`] error.
    pub fn method_not_found(bridge: impl Into<String>, method: impl Into<String>) -> Self {
        BridgeError::MethodNotFound {
            bridge: bridge.into(),
            method: method.into(),
        }
    }

    /// Wrap an arbitrary error raised by a bridge operation.
    pub fn operation<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BridgeError::Operation(Box::new(err))
    }

    /// Tag the error with the bridge and method it came from.
    ///
    /// The kind of the error is unchanged.
    pub fn annotate(self, bridge: impl Into<String>, method: impl Into<String>) -> Self {
        BridgeError::Annotated {
            bridge: bridge.into(),
            method: method.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Annotated { source, .. } => source.kind(),
            BridgeError::NotInitialized(_) => ErrorKind::NotInitialized,
            BridgeError::BridgeNotFound(_) => ErrorKind::BridgeNotFound,
            BridgeError::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            BridgeError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            BridgeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            BridgeError::Cancelled => ErrorKind::Cancelled,
            BridgeError::AlreadyRegistered(_) | BridgeError::UnwiredMethod { .. } => {
                ErrorKind::Registration
            }
            BridgeError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            BridgeError::MissingDependency { .. } | BridgeError::DependencyCycle(_) => {
                ErrorKind::Dependency
            }
            BridgeError::InitializationFailed { .. } => ErrorKind::Initialization,
            BridgeError::Cleanup(_) => ErrorKind::Cleanup,
            BridgeError::InvalidConfig(_) | BridgeError::Toml(_) => ErrorKind::Config,
            BridgeError::Io(_) => ErrorKind::Io,
            BridgeError::Operation(_) | BridgeError::Json(_) => ErrorKind::Operation,
        }
    }

    /// Returns true if the error reports a cancelled context.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Render the error as a script-visible object with `kind` and `message`.
    ///
    /// Aggregated cleanup failures also carry a `causes` array.
    pub fn to_value(&self) -> DynamicValue {
        let mut fields = vec![
            ("kind", DynamicValue::from(self.kind().as_str())),
            ("message", DynamicValue::from(self.to_string())),
        ];
        if let BridgeError::Cleanup(causes) = self {
            let causes = causes.iter().map(BridgeError::to_value).collect::<Vec<_>>();
            fields.push(("causes", DynamicValue::Array(causes)));
        }
        DynamicValue::object(fields)
    }
}

fn join_messages(errors: &[BridgeError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
