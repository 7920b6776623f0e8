use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use std::time::Duration;

use crate::errors::Result;
use crate::models::reset_otp::ResetOtp;
use crate::services::reset_password::{
    CreateOutcome, OtpStore, MAX_REQUEST_ATTEMPTS, MAX_VERIFY_ATTEMPTS,
};

/// Abandoned and exhausted records age out after an hour, which is the wait
/// the cap refusals promise the caller.
const RECORD_TTL_SECS: u64 = 3600;

#[derive(Clone)]
pub struct MongoOtpStore {
    collection: Collection<ResetOtp>,
}

impl MongoOtpStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("reset_otps"),
        }
    }

    /// Unique index keeps "at most one record per email" true under
    /// concurrent requests; the TTL index is the expiry policy.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(unique_email).await?;

        let ttl = IndexModel::builder()
            .keys(doc! { "last_requested_time": 1 })
            .options(
                IndexOptions::builder()
                    .expire_after(Duration::from_secs(RECORD_TTL_SECS))
                    .build(),
            )
            .build();
        self.collection.create_index(ttl).await?;

        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

#[async_trait]
impl OtpStore for MongoOtpStore {
    async fn get(&self, email: &str) -> Result<Option<ResetOtp>> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn create(&self, record: ResetOtp) -> Result<CreateOutcome> {
        match self.collection.insert_one(&record).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if is_duplicate_key(&e) => Ok(CreateOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_resend(
        &self,
        email: &str,
        otp_hash: &str,
        now: DateTime<Utc>,
        resend_after: DateTime<Utc>,
    ) -> Result<bool> {
        // The filter restates the cooldown and cap, so the increment only
        // lands while both still hold. Document atomicity is the per-email
        // serialization point.
        let filter = doc! {
            "email": email,
            "request_attempts": { "$lte": MAX_REQUEST_ATTEMPTS },
            "last_requested_time": { "$lte": BsonDateTime::from_chrono(resend_after) },
        };
        let update = doc! {
            "$set": {
                "otp": otp_hash,
                "last_requested_time": BsonDateTime::from_chrono(now),
            },
            "$inc": { "request_attempts": 1 },
        };

        let result = self.collection.update_one(filter, update).await?;
        Ok(result.modified_count > 0)
    }

    async fn consume_verify_attempt(&self, email: &str) -> Result<Option<ResetOtp>> {
        let filter = doc! {
            "email": email,
            "verify_attempts": { "$lte": MAX_VERIFY_ATTEMPTS },
        };
        let update = doc! { "$inc": { "verify_attempts": 1 } };

        let record = self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::Before)
            .await?;
        Ok(record)
    }

    async fn delete(&self, email: &str) -> Result<()> {
        self.collection.delete_one(doc! { "email": email }).await?;
        Ok(())
    }
}
