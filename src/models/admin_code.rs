//! Admin verification code entry and related requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Live verification code for one email address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminVerificationCode {
    pub email: String,
    /// Six-digit numeric string
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// Wrong guesses recorded against this entry
    pub attempts: u32,
}

impl AdminVerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn matches(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Request admin code body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RequestAdminCode {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
}

/// Verify admin code body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyAdminCode {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 characters"))]
    pub code: String,
}

/// A code is six ASCII digits
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}
