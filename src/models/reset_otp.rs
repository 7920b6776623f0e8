use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;

/// One outstanding password-reset attempt per email. The `reset_otps`
/// collection holds a unique index on `email` and a TTL index on
/// `last_requested_time`, so stale records age out on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetOtp {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub email: String,

    /// bcrypt hash of the 4-digit code. The plaintext only exists between
    /// generation and the mail dispatch.
    pub otp: String,

    /// Incremented on each resend; never on creation.
    pub request_attempts: i32,

    /// Incremented on each submit attempt, correct or not.
    pub verify_attempts: i32,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_requested_time: DateTime<Utc>,
}

impl ResetOtp {
    pub fn new(email: &str, otp_hash: String) -> Self {
        ResetOtp {
            _id: None,
            email: email.to_string(),
            otp: otp_hash,
            request_attempts: 0,
            verify_attempts: 0,
            last_requested_time: Utc::now(),
        }
    }
}
