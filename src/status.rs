//! Status codes at the boundary with the database layer
//!
//! The core itself only fails with [`FasterError`]; the database layer above
//! reports results with this taxonomy, so fatal core errors are folded into it
//! here.

use std::fmt;

use crate::error::FasterError;

/// Status code returned across the database boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Ok = 0,
    /// Key was not found
    NotFound = 1,
    /// Data or internal state is corrupt
    Corruption = 2,
    /// Feature or operation not supported
    NotSupported = 3,
    /// Invalid argument provided
    InvalidArgument = 4,
    /// I/O error occurred
    IoError = 5,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the key was not found
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound)
    }

    /// Check if the status indicates an error
    ///
    /// `NotFound` is an ordinary lookup outcome, not an error.
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Status::Corruption | Status::NotSupported | Status::InvalidArgument | Status::IoError
        )
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::NotFound => "NotFound",
            Status::Corruption => "Corruption",
            Status::NotSupported => "NotSupported",
            Status::InvalidArgument => "InvalidArgument",
            Status::IoError => "IoError",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&FasterError> for Status {
    fn from(err: &FasterError) -> Self {
        match err {
            FasterError::Config(_) => Status::InvalidArgument,
            _ => Status::Corruption,
        }
    }
}

impl From<FasterError> for Status {
    fn from(err: FasterError) -> Self {
        Status::from(&err)
    }
}
