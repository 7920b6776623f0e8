use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::errors::{AppError, Result};
use crate::models::reset_otp::ResetOtp;
use crate::services::hashing::{hash_secret, verify_secret};

/// Cooldown between consecutive (re)sends for one email.
pub const RESEND_COOLDOWN_SECS: i64 = 60;
/// A resend is refused once `request_attempts` has gone past this value.
pub const MAX_REQUEST_ATTEMPTS: i32 = 3;
/// A submit is refused once `verify_attempts` has gone past this value.
pub const MAX_VERIFY_ATTEMPTS: i32 = 3;

const MSG_NO_USER: &str = "No user found";
const MSG_NOT_REQUESTED: &str = "OTP not requested";
const MSG_COOLDOWN: &str = "Please wait atleast 60 seconds before requesting new OTP";
const MSG_MAX_REQUESTS: &str = "Maximum amount of requests reached. Please try after 1hr";
const MSG_MAX_TRIES: &str = "Maximum amount of tries reached. Please try after 1hr";
const MSG_WRONG_OTP: &str = "Wrong OTP, please try again";

/// Lookup and credential update against the users collection.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Fails with `NotFound` if no user carries this email.
    async fn update_password(&self, email: &str, password_hash: &str) -> Result<()>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another request won the insert race; the unique index on `email`
    /// surfaced it as a duplicate key.
    Duplicate,
}

/// Persistence for the single outstanding reset record per email.
///
/// The mutating operations are conditional writes: the filter re-checks the
/// cap/cooldown invariants so that two concurrent calls cannot both pass a
/// read-side gate and then clobber each other's counters.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn get(&self, email: &str) -> Result<Option<ResetOtp>>;

    async fn create(&self, record: ResetOtp) -> Result<CreateOutcome>;

    /// Install a new code hash, bump `request_attempts` and refresh
    /// `last_requested_time` in one write, but only while
    /// `last_requested_time <= resend_after` and the request cap still holds.
    /// Returns false when the record was missing or the condition failed.
    async fn record_resend(
        &self,
        email: &str,
        otp_hash: &str,
        now: DateTime<Utc>,
        resend_after: DateTime<Utc>,
    ) -> Result<bool>;

    /// Increment `verify_attempts` while under the cap, returning the record
    /// as it was before the increment. None means absent or capped.
    async fn consume_verify_attempt(&self, email: &str) -> Result<Option<ResetOtp>>;

    async fn delete(&self, email: &str) -> Result<()>;
}

/// Delivery of the plaintext code. Best-effort from the engine's point of
/// view: a failed send is logged, never propagated.
#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str) -> Result<()>;
}

pub struct ResetPasswordService {
    users: Arc<dyn UserDirectory>,
    store: Arc<dyn OtpStore>,
    mailer: Arc<dyn OtpMailer>,
}

impl ResetPasswordService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        store: Arc<dyn OtpStore>,
        mailer: Arc<dyn OtpMailer>,
    ) -> Self {
        Self {
            users,
            store,
            mailer,
        }
    }

    // Generate 4-digit OTP
    pub fn generate_otp() -> String {
        let mut rng = rand::thread_rng();
        format!("{:04}", rng.gen_range(0..10_000))
    }

    pub async fn request_otp(&self, email: &str) -> Result<&'static str> {
        if !self.users.email_exists(email).await? {
            return Err(AppError::not_found(MSG_NO_USER));
        }

        // Duplicate request is a no-op, not an error.
        if self.store.get(email).await?.is_some() {
            return Ok("OTP already requested");
        }

        let code = Self::generate_otp();
        let otp_hash = hash_secret(&code)?;

        // Awaited on purpose: the caller's success must mean the record is
        // durable before the code goes out.
        match self.store.create(ResetOtp::new(email, otp_hash)).await? {
            CreateOutcome::Duplicate => return Ok("OTP already requested"),
            CreateOutcome::Created => {}
        }

        self.dispatch_code(email, &code).await;

        Ok("OTP requested successfully")
    }

    pub async fn resend_otp(&self, email: &str) -> Result<&'static str> {
        let record = self
            .store
            .get(email)
            .await?
            .ok_or_else(|| AppError::not_found(MSG_NOT_REQUESTED))?;

        let now = Utc::now();
        Self::check_resend_gates(&record, now)?;

        let code = Self::generate_otp();
        let otp_hash = hash_secret(&code)?;
        let resend_after = now - Duration::seconds(RESEND_COOLDOWN_SECS);

        if !self
            .store
            .record_resend(email, &otp_hash, now, resend_after)
            .await?
        {
            // Lost a race against a concurrent mutation. Re-read so the
            // refusal names the gate that actually tripped.
            let fresh = self
                .store
                .get(email)
                .await?
                .ok_or_else(|| AppError::not_found(MSG_NOT_REQUESTED))?;
            Self::check_resend_gates(&fresh, Utc::now())?;
            return Err(AppError::rate_limited(MSG_COOLDOWN));
        }

        self.dispatch_code(email, &code).await;

        Ok("OTP resent successfully")
    }

    pub async fn submit_otp(
        &self,
        email: &str,
        new_password: &str,
        candidate_code: &str,
    ) -> Result<&'static str> {
        // Every attempt, right or wrong, consumes one slot; the increment
        // happens before the code is even looked at.
        let record = match self.store.consume_verify_attempt(email).await? {
            Some(record) => record,
            None => {
                return match self.store.get(email).await? {
                    None => Err(AppError::not_found(MSG_NOT_REQUESTED)),
                    Some(_) => Err(AppError::rate_limited(MSG_MAX_TRIES)),
                };
            }
        };

        if !verify_secret(candidate_code, &record.otp)? {
            return Err(AppError::invalid_credential(MSG_WRONG_OTP));
        }

        let password_hash = hash_secret(new_password)?;
        self.users.update_password(email, &password_hash).await?;

        // Delete closes the flow; the same code can never be replayed.
        self.store.delete(email).await?;

        Ok("Password updated successfully")
    }

    fn check_resend_gates(record: &ResetOtp, now: DateTime<Utc>) -> Result<()> {
        if now - record.last_requested_time < Duration::seconds(RESEND_COOLDOWN_SECS) {
            return Err(AppError::rate_limited(MSG_COOLDOWN));
        }
        if record.request_attempts > MAX_REQUEST_ATTEMPTS {
            return Err(AppError::rate_limited(MSG_MAX_REQUESTS));
        }
        Ok(())
    }

    async fn dispatch_code(&self, email: &str, code: &str) {
        if let Err(e) = self.mailer.send_otp(email, code).await {
            tracing::warn!("Failed to send reset OTP to {}: {}", email, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct MemoryDirectory {
        users: Mutex<HashMap<String, String>>,
    }

    impl MemoryDirectory {
        fn with_user(email: &str) -> Arc<Self> {
            let mut users = HashMap::new();
            users.insert(email.to_string(), "old-hash".to_string());
            Arc::new(Self {
                users: Mutex::new(users),
            })
        }

        fn password_hash(&self, email: &str) -> Option<String> {
            self.users.lock().unwrap().get(email).cloned()
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryDirectory {
        async fn email_exists(&self, email: &str) -> Result<bool> {
            Ok(self.users.lock().unwrap().contains_key(email))
        }

        async fn update_password(&self, email: &str, password_hash: &str) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            match users.get_mut(email) {
                Some(slot) => {
                    *slot = password_hash.to_string();
                    Ok(())
                }
                None => Err(AppError::not_found(MSG_NO_USER)),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<String, ResetOtp>>,
        duplicate_next_create: AtomicBool,
        refuse_next_resend: AtomicBool,
    }

    impl MemoryStore {
        fn record(&self, email: &str) -> Option<ResetOtp> {
            self.records.lock().unwrap().get(email).cloned()
        }

        /// Shift `last_requested_time` into the past so tests can cross the
        /// cooldown without sleeping.
        fn backdate(&self, email: &str, secs: i64) {
            let mut records = self.records.lock().unwrap();
            if let Some(record) = records.get_mut(email) {
                record.last_requested_time = record.last_requested_time - Duration::seconds(secs);
            }
        }
    }

    #[async_trait]
    impl OtpStore for MemoryStore {
        async fn get(&self, email: &str) -> Result<Option<ResetOtp>> {
            Ok(self.record(email))
        }

        async fn create(&self, record: ResetOtp) -> Result<CreateOutcome> {
            if self.duplicate_next_create.swap(false, Ordering::SeqCst) {
                return Ok(CreateOutcome::Duplicate);
            }
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&record.email) {
                return Ok(CreateOutcome::Duplicate);
            }
            records.insert(record.email.clone(), record);
            Ok(CreateOutcome::Created)
        }

        async fn record_resend(
            &self,
            email: &str,
            otp_hash: &str,
            now: DateTime<Utc>,
            resend_after: DateTime<Utc>,
        ) -> Result<bool> {
            if self.refuse_next_resend.swap(false, Ordering::SeqCst) {
                return Ok(false);
            }
            let mut records = self.records.lock().unwrap();
            match records.get_mut(email) {
                Some(record)
                    if record.last_requested_time <= resend_after
                        && record.request_attempts <= MAX_REQUEST_ATTEMPTS =>
                {
                    record.otp = otp_hash.to_string();
                    record.request_attempts += 1;
                    record.last_requested_time = now;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn consume_verify_attempt(&self, email: &str) -> Result<Option<ResetOtp>> {
            let mut records = self.records.lock().unwrap();
            match records.get_mut(email) {
                Some(record) if record.verify_attempts <= MAX_VERIFY_ATTEMPTS => {
                    let before = record.clone();
                    record.verify_attempts += 1;
                    Ok(Some(before))
                }
                _ => Ok(None),
            }
        }

        async fn delete(&self, email: &str) -> Result<()> {
            self.records.lock().unwrap().remove(email);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryMailer {
        sent: Mutex<Vec<(String, String)>>,
        fail: AtomicBool,
    }

    impl MemoryMailer {
        fn last_code(&self, email: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, code)| code.clone())
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OtpMailer for MemoryMailer {
        async fn send_otp(&self, email: &str, code: &str) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::internal("mail provider down"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    const EMAIL: &str = "a@x.com";

    fn service_for(
        email: &str,
    ) -> (
        ResetPasswordService,
        Arc<MemoryDirectory>,
        Arc<MemoryStore>,
        Arc<MemoryMailer>,
    ) {
        let users = MemoryDirectory::with_user(email);
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(MemoryMailer::default());
        let service =
            ResetPasswordService::new(users.clone(), store.clone(), mailer.clone());
        (service, users, store, mailer)
    }

    fn assert_rate_limited(err: AppError, expected: &str) {
        match err {
            AppError::RateLimited(msg) => assert_eq!(msg, expected),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn generated_otp_is_four_digits() {
        for _ in 0..50 {
            let code = ResetPasswordService::generate_otp();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn request_for_unknown_email_is_rejected() {
        let (service, _, store, mailer) = service_for(EMAIL);

        let err = service.request_otp("nobody@x.com").await.unwrap_err();
        match err {
            AppError::NotFound(msg) => assert_eq!(msg, MSG_NO_USER),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert!(store.record("nobody@x.com").is_none());
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn request_creates_record_and_mails_plaintext_code() {
        let (service, _, store, mailer) = service_for(EMAIL);

        let msg = service.request_otp(EMAIL).await.unwrap();
        assert_eq!(msg, "OTP requested successfully");

        let record = store.record(EMAIL).expect("record should exist");
        assert_eq!(record.request_attempts, 0);
        assert_eq!(record.verify_attempts, 0);

        let code = mailer.last_code(EMAIL).expect("one mail dispatched");
        assert_eq!(code.len(), 4);
        // Only the hash is persisted, and it matches what was mailed.
        assert_ne!(record.otp, code);
        assert!(verify_secret(&code, &record.otp).unwrap());
    }

    #[tokio::test]
    async fn duplicate_request_is_an_idempotent_no_op() {
        let (service, _, store, mailer) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        let first = store.record(EMAIL).unwrap();

        let msg = service.request_otp(EMAIL).await.unwrap();
        assert_eq!(msg, "OTP already requested");
        assert_eq!(mailer.sent_count(), 1);
        // Same code hash, nothing rotated.
        assert_eq!(store.record(EMAIL).unwrap().otp, first.otp);
    }

    #[tokio::test]
    async fn lost_create_race_reports_already_requested() {
        let (service, _, store, mailer) = service_for(EMAIL);
        store.duplicate_next_create.store(true, Ordering::SeqCst);

        let msg = service.request_otp(EMAIL).await.unwrap();
        assert_eq!(msg, "OTP already requested");
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_the_request() {
        let (service, _, store, mailer) = service_for(EMAIL);
        mailer.fail.store(true, Ordering::SeqCst);

        let msg = service.request_otp(EMAIL).await.unwrap();
        assert_eq!(msg, "OTP requested successfully");
        assert!(store.record(EMAIL).is_some());
    }

    #[tokio::test]
    async fn resend_without_request_is_rejected() {
        let (service, _, _, _) = service_for(EMAIL);

        let err = service.resend_otp(EMAIL).await.unwrap_err();
        match err {
            AppError::NotFound(msg) => assert_eq!(msg, MSG_NOT_REQUESTED),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resend_inside_cooldown_is_rejected() {
        let (service, _, _, mailer) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        let err = service.resend_otp(EMAIL).await.unwrap_err();
        assert_rate_limited(err, MSG_COOLDOWN);
        assert_eq!(mailer.sent_count(), 1);
    }

    #[tokio::test]
    async fn resend_after_cooldown_rotates_the_code() {
        let (service, _, store, mailer) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        let old_code = mailer.last_code(EMAIL).unwrap();
        store.backdate(EMAIL, RESEND_COOLDOWN_SECS + 1);

        let msg = service.resend_otp(EMAIL).await.unwrap();
        assert_eq!(msg, "OTP resent successfully");

        let record = store.record(EMAIL).unwrap();
        assert_eq!(record.request_attempts, 1);
        assert_eq!(mailer.sent_count(), 2);

        let new_code = mailer.last_code(EMAIL).unwrap();
        assert!(verify_secret(&new_code, &record.otp).unwrap());
        if new_code != old_code {
            assert!(!verify_secret(&old_code, &record.otp).unwrap());
        }
    }

    #[tokio::test]
    async fn fifth_resend_is_rejected() {
        let (service, _, store, _) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        for _ in 0..4 {
            store.backdate(EMAIL, RESEND_COOLDOWN_SECS + 1);
            service.resend_otp(EMAIL).await.unwrap();
        }
        assert_eq!(store.record(EMAIL).unwrap().request_attempts, 4);

        store.backdate(EMAIL, RESEND_COOLDOWN_SECS + 1);
        let err = service.resend_otp(EMAIL).await.unwrap_err();
        assert_rate_limited(err, MSG_MAX_REQUESTS);
    }

    #[tokio::test]
    async fn resend_losing_the_conditional_write_is_rate_limited() {
        let (service, _, store, _) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        store.backdate(EMAIL, RESEND_COOLDOWN_SECS + 1);
        store.refuse_next_resend.store(true, Ordering::SeqCst);

        let err = service.resend_otp(EMAIL).await.unwrap_err();
        match err {
            AppError::RateLimited(_) => {}
            other => panic!("expected RateLimited, got {:?}", other),
        }
        // The lost write must not have consumed a request slot.
        assert_eq!(store.record(EMAIL).unwrap().request_attempts, 0);
    }

    #[tokio::test]
    async fn submit_without_request_is_rejected() {
        let (service, _, _, _) = service_for(EMAIL);

        let err = service.submit_otp(EMAIL, "new-password", "1234").await.unwrap_err();
        match err {
            AppError::NotFound(msg) => assert_eq!(msg, MSG_NOT_REQUESTED),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_and_consumes_an_attempt() {
        let (service, _, store, mailer) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        let code = mailer.last_code(EMAIL).unwrap();
        let wrong = if code == "0000" { "9999" } else { "0000" };

        let err = service.submit_otp(EMAIL, "new-password", wrong).await.unwrap_err();
        match err {
            AppError::InvalidCredential(msg) => assert_eq!(msg, MSG_WRONG_OTP),
            other => panic!("expected InvalidCredential, got {:?}", other),
        }
        assert_eq!(store.record(EMAIL).unwrap().verify_attempts, 1);
    }

    #[tokio::test]
    async fn fifth_submit_is_rejected_even_with_the_correct_code() {
        let (service, _, store, mailer) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        let code = mailer.last_code(EMAIL).unwrap();
        let wrong = if code == "0000" { "9999" } else { "0000" };

        for _ in 0..4 {
            service.submit_otp(EMAIL, "new-password", wrong).await.unwrap_err();
        }
        assert_eq!(store.record(EMAIL).unwrap().verify_attempts, 4);

        let err = service.submit_otp(EMAIL, "new-password", &code).await.unwrap_err();
        assert_rate_limited(err, MSG_MAX_TRIES);
        // The exhausted record stays until the TTL sweeps it.
        assert!(store.record(EMAIL).is_some());
    }

    #[tokio::test]
    async fn correct_code_updates_password_and_deletes_the_record() {
        let (service, users, store, mailer) = service_for(EMAIL);

        service.request_otp(EMAIL).await.unwrap();
        let code = mailer.last_code(EMAIL).unwrap();

        let msg = service.submit_otp(EMAIL, "brand-new-pass", &code).await.unwrap();
        assert_eq!(msg, "Password updated successfully");

        let hash = users.password_hash(EMAIL).unwrap();
        assert!(verify_secret("brand-new-pass", &hash).unwrap());
        assert!(store.record(EMAIL).is_none());

        // Replay is impossible: the flow is closed on both paths.
        let err = service.submit_otp(EMAIL, "another-pass", &code).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = service.resend_otp(EMAIL).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
