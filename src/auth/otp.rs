//! OTP generation and verification.
//!
//! One live code per phone number. Verification never deletes the code:
//! a mismatch leaves it in place for further attempts (bounded by the
//! wrong-code counter), and a match leaves it in place behind the
//! verified flag — the registration token is the single-use credential.

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use tracing::{info, warn};

use crate::cache::KeyValueStore;
use crate::config::OtpConfig;
use crate::error::CacheError;

use super::keys::CacheKey;

/// Outcome of a single verification attempt, returned by value.
/// Only infrastructure faults surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Candidate matched the live code; the phone is now verified.
    Success,
    /// Candidate did not match the live code.
    Mismatch,
    /// No live code for this phone (never generated, or TTL elapsed).
    Expired,
    /// The phone is blocked after too many wrong codes; the candidate
    /// was not compared.
    Blocked,
}

#[derive(Clone)]
pub struct OtpEngine {
    store: Arc<dyn KeyValueStore>,
    code_ttl: Duration,
    verified_ttl: Duration,
    attempt_window: Duration,
    block_ttl: Duration,
    max_wrong_attempts: i64,
}

impl OtpEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &OtpConfig) -> Self {
        Self {
            store,
            code_ttl: Duration::seconds(config.code_ttl_seconds),
            verified_ttl: Duration::seconds(config.verified_ttl_seconds),
            attempt_window: Duration::seconds(config.attempt_window_seconds),
            block_ttl: Duration::seconds(config.block_seconds),
            max_wrong_attempts: config.max_attempts,
        }
    }

    /// Generates a fresh 6-digit code for `phone`, overwriting any live
    /// code and resetting its TTL.
    pub async fn generate(&self, phone: &str) -> Result<String, CacheError> {
        let code = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        self.store
            .set(&CacheKey::Otp { phone }.to_string(), &code, self.code_ttl)
            .await?;
        info!("Generated OTP for phone: {}", phone);
        Ok(code)
    }

    /// Compares `candidate` against the live code for `phone`.
    pub async fn verify(&self, phone: &str, candidate: &str) -> Result<VerifyOutcome, CacheError> {
        let block_key = CacheKey::PhoneBlock { phone }.to_string();
        if self.store.get(&block_key).await?.is_some() {
            return Ok(VerifyOutcome::Blocked);
        }

        let expected = match self.store.get(&CacheKey::Otp { phone }.to_string()).await? {
            Some(code) => code,
            None => return Ok(VerifyOutcome::Expired),
        };

        if candidate != expected {
            let wrong = self
                .store
                .incr(
                    &CacheKey::WrongAttempts { phone }.to_string(),
                    self.attempt_window,
                )
                .await?;
            if wrong >= self.max_wrong_attempts {
                self.store.set(&block_key, "1", self.block_ttl).await?;
                warn!(
                    "Phone {} blocked after {} wrong OTP attempts",
                    phone, wrong
                );
                return Ok(VerifyOutcome::Blocked);
            }
            return Ok(VerifyOutcome::Mismatch);
        }

        self.store
            .delete(&CacheKey::WrongAttempts { phone }.to_string())
            .await?;
        self.store
            .set(
                &CacheKey::Verified { phone }.to_string(),
                "1",
                self.verified_ttl,
            )
            .await?;
        info!("OTP verified for phone: {}", phone);
        Ok(VerifyOutcome::Success)
    }

    /// Whether `phone` passed verification within the verified-flag TTL.
    pub async fn is_verified(&self, phone: &str) -> Result<bool, CacheError> {
        Ok(self
            .store
            .get(&CacheKey::Verified { phone }.to_string())
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::Settings;

    fn engine() -> (OtpEngine, Arc<MemoryStore>) {
        let settings = Settings::new_for_test().unwrap();
        let store = Arc::new(MemoryStore::new());
        (OtpEngine::new(store.clone(), &settings.otp), store)
    }

    #[tokio::test]
    async fn test_generate_stores_six_digit_code() {
        let (otp, store) = engine();
        let code = otp.generate("+100").await.unwrap();

        assert_eq!(code.len(), 6);
        assert!(code.parse::<u32>().unwrap() >= 100_000);
        assert_eq!(store.get("otp:+100").await.unwrap(), Some(code));
    }

    #[tokio::test]
    async fn test_verify_success_sets_verified_and_clears_counter() {
        let (otp, store) = engine();
        let code = otp.generate("+100").await.unwrap();

        // A prior mismatch leaves a counter behind.
        assert_eq!(otp.verify("+100", "000000").await.unwrap(), VerifyOutcome::Mismatch);
        assert_eq!(store.get("otp:wrong:phone:+100").await.unwrap(), Some("1".to_string()));

        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Success);
        assert!(otp.is_verified("+100").await.unwrap());
        assert_eq!(store.get("otp:wrong:phone:+100").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_verify_is_repeatable_while_code_lives() {
        let (otp, _) = engine();
        let code = otp.generate("+100").await.unwrap();

        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Success);
        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Success);
    }

    #[tokio::test]
    async fn test_verify_without_code_is_expired() {
        let (otp, _) = engine();
        assert_eq!(otp.verify("+100", "123456").await.unwrap(), VerifyOutcome::Expired);
    }

    #[tokio::test]
    async fn test_code_expires_after_ttl() {
        let (otp, store) = engine();
        let code = otp.generate("+100").await.unwrap();

        store.advance_clock(Duration::seconds(301)).await;
        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Expired);
    }

    #[tokio::test]
    async fn test_regeneration_invalidates_previous_code() {
        let (otp, _) = engine();
        let old = otp.generate("+100").await.unwrap();
        let new = otp.generate("+100").await.unwrap();

        // 1-in-900000 collision would make this flaky; regenerate once more.
        let new = if new == old { otp.generate("+100").await.unwrap() } else { new };
        assert_eq!(otp.verify("+100", &old).await.unwrap(), VerifyOutcome::Mismatch);
        assert_eq!(otp.verify("+100", &new).await.unwrap(), VerifyOutcome::Success);
    }

    #[tokio::test]
    async fn test_three_wrong_codes_block_the_phone() {
        let (otp, _) = engine();
        let code = otp.generate("+100").await.unwrap();

        assert_eq!(otp.verify("+100", "000001").await.unwrap(), VerifyOutcome::Mismatch);
        assert_eq!(otp.verify("+100", "000002").await.unwrap(), VerifyOutcome::Mismatch);
        // Third wrong code crosses the threshold.
        assert_eq!(otp.verify("+100", "000003").await.unwrap(), VerifyOutcome::Blocked);
        // Even the correct code is rejected without comparison now.
        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Blocked);
    }

    #[tokio::test]
    async fn test_phone_block_expires() {
        let (otp, store) = engine();
        let code = otp.generate("+100").await.unwrap();

        for candidate in ["000001", "000002", "000003"] {
            otp.verify("+100", candidate).await.unwrap();
        }
        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Blocked);

        // Block and code both lapse; the cycle restarts at Expired.
        store.advance_clock(Duration::seconds(3601)).await;
        assert_eq!(otp.verify("+100", &code).await.unwrap(), VerifyOutcome::Expired);
    }
}
