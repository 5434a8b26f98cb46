//! Policy error model and the admin wire result codes.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result type used across the policy layer.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Stable numeric outcome codes returned to admin clients.
///
/// The numbering is part of the wire contract with existing dashboards and
/// must not be reordered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0,
    ParamError = 1,
    UserExist = 2,
    UserNotExist = 3,
    SaveError = 4,
    UserFormatError = 5,
    TokenFormatError = 6,
    CommentFormatError = 7,
    PortsFormatError = 8,
    DomainsFormatError = 9,
    SubdomainsFormatError = 10,
    ExpireDateFormatError = 11,
    FrpServerError = 12,
}

impl ResultCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// The record field whose format check failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValidationField {
    User,
    Token,
    Comment,
    Ports,
    Domains,
    Subdomains,
    ExpireDate,
}

impl ValidationField {
    pub fn code(self) -> ResultCode {
        match self {
            ValidationField::User => ResultCode::UserFormatError,
            ValidationField::Token => ResultCode::TokenFormatError,
            ValidationField::Comment => ResultCode::CommentFormatError,
            ValidationField::Ports => ResultCode::PortsFormatError,
            ValidationField::Domains => ResultCode::DomainsFormatError,
            ValidationField::Subdomains => ResultCode::SubdomainsFormatError,
            ValidationField::ExpireDate => ResultCode::ExpireDateFormatError,
        }
    }
}

/// Policy-level error.
///
/// Decision-path denials are not errors; they are `Decision::Reject` values in
/// `portgate-auth`. This enum covers admin and persistence failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A record field failed its format check.
    #[error("{message}")]
    Validation {
        field: ValidationField,
        message: String,
    },

    /// The user already exists (add).
    #[error("operate failed, user [{0}] exist ")]
    Conflict(String),

    /// The user does not exist (update/remove/enable/disable).
    #[error("operate failed, user [{0}] not exist ")]
    NotFound(String),

    /// The request itself was malformed or inconsistent.
    #[error("{0}")]
    InvalidRequest(String),

    /// The persistent store rejected or failed a read/write.
    #[error("{0}")]
    Persistence(String),

    /// An upstream reverse-proxy server call failed.
    #[error("{0}")]
    Upstream(String),
}

impl PolicyError {
    pub fn validation(field: ValidationField, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn code(&self) -> ResultCode {
        match self {
            PolicyError::Validation { field, .. } => field.code(),
            PolicyError::Conflict(_) => ResultCode::UserExist,
            PolicyError::NotFound(_) => ResultCode::UserNotExist,
            PolicyError::InvalidRequest(_) => ResultCode::ParamError,
            PolicyError::Persistence(_) => ResultCode::SaveError,
            PolicyError::Upstream(_) => ResultCode::FrpServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_serialize_as_integers() {
        let json = serde_json::to_string(&ResultCode::SubdomainsFormatError).unwrap();
        assert_eq!(json, "10");
        assert_eq!(ResultCode::Success.as_u8(), 0);
        assert_eq!(ResultCode::FrpServerError.as_u8(), 12);
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(PolicyError::Conflict("a".into()).code(), ResultCode::UserExist);
        assert_eq!(PolicyError::NotFound("a".into()).code(), ResultCode::UserNotExist);
        assert_eq!(
            PolicyError::validation(ValidationField::Ports, "bad").code(),
            ResultCode::PortsFormatError
        );
        assert_eq!(PolicyError::persistence("db").code(), ResultCode::SaveError);
    }
}
