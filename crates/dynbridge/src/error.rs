//! Failure model shared by every bridge operation.
//!
//! The bridge distinguishes exactly two failure kinds: the dynamic engine
//! raised (or is in an error state), or the requested operation is not
//! defined for the value's kind.  Both map onto the numeric status codes
//! the embedding ABI expects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::ObjectError;

pub const EXCEPTION_ERROR_CODE: &str = "DB-EXC-0001";
pub const TYPE_ERROR_CODE: &str = "DB-TYPE-0002";

// ---------------------------------------------------------------------------
// Status — numeric result codes
// ---------------------------------------------------------------------------

/// Result code returned by mutation and coercion operations at the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Exception,
    TypeErr,
}

impl Status {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Exception => -1,
            Self::TypeErr => -2,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            -1 => Some(Self::Exception),
            -2 => Some(Self::TypeErr),
            _ => None,
        }
    }

    /// Status of a finished operation.
    pub fn of<T>(result: &Result<T, BridgeError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(error) => error.status(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Exception => "exception",
            Self::TypeErr => "type_error",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BridgeError {
    /// The dynamic engine raised, failed to allocate, or rejected its input.
    #[error("exception: {message}")]
    Exception { message: String },
    /// The operation is not defined for the value's kind.
    #[error("TypeError: {message}")]
    TypeError { message: String },
}

impl BridgeError {
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Exception { .. } => Status::Exception,
            Self::TypeError { .. } => Status::TypeErr,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Exception { .. } => EXCEPTION_ERROR_CODE,
            Self::TypeError { .. } => TYPE_ERROR_CODE,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Exception { message } | Self::TypeError { message } => message,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::TypeError { .. })
    }
}

impl From<ObjectError> for BridgeError {
    fn from(error: ObjectError) -> Self {
        Self::exception(error.to_string())
    }
}
