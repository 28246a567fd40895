//! Short-lived registration tokens bridging "phone verified" to
//! "account created."

use std::sync::Arc;

use chrono::Duration;
use tracing::info;
use uuid::Uuid;

use crate::cache::KeyValueStore;
use crate::config::OtpConfig;
use crate::error::CacheError;

use super::keys::CacheKey;

#[derive(Clone)]
pub struct RegistrationTokens {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl RegistrationTokens {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &OtpConfig) -> Self {
        Self {
            store,
            ttl: Duration::seconds(config.registration_token_ttl_seconds),
        }
    }

    /// Issues an opaque token bound to `phone`.
    pub async fn issue(&self, phone: &str) -> Result<String, CacheError> {
        let token = Uuid::new_v4().simple().to_string();
        self.store
            .set(
                &CacheKey::RegistrationToken { token: &token }.to_string(),
                phone,
                self.ttl,
            )
            .await?;
        info!("Issued registration token for phone: {}", phone);
        Ok(token)
    }

    /// Looks up the phone bound to `token`. Does not invalidate: the caller
    /// deletes the token once the account exists, so a crash in between can
    /// leave the token resolvable for the rest of its TTL.
    pub async fn resolve(&self, token: &str) -> Result<Option<String>, CacheError> {
        self.store
            .get(&CacheKey::RegistrationToken { token }.to_string())
            .await
    }

    pub async fn invalidate(&self, token: &str) -> Result<(), CacheError> {
        self.store
            .delete(&CacheKey::RegistrationToken { token }.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::Settings;

    fn broker() -> (RegistrationTokens, Arc<MemoryStore>) {
        let settings = Settings::new_for_test().unwrap();
        let store = Arc::new(MemoryStore::new());
        (RegistrationTokens::new(store.clone(), &settings.otp), store)
    }

    #[tokio::test]
    async fn test_issue_and_resolve() {
        let (broker, _) = broker();
        let token = broker.issue("+100").await.unwrap();

        assert_eq!(token.len(), 32);
        assert_eq!(broker.resolve(&token).await.unwrap(), Some("+100".to_string()));
        // Resolving alone does not consume.
        assert_eq!(broker.resolve(&token).await.unwrap(), Some("+100".to_string()));
    }

    #[tokio::test]
    async fn test_invalidate_consumes() {
        let (broker, _) = broker();
        let token = broker.issue("+100").await.unwrap();

        broker.invalidate(&token).await.unwrap();
        assert_eq!(broker.resolve(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_token_resolves_to_none() {
        let (broker, _) = broker();
        assert_eq!(broker.resolve("deadbeef").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_expires() {
        let (broker, store) = broker();
        let token = broker.issue("+100").await.unwrap();

        store.advance_clock(Duration::seconds(601)).await;
        assert_eq!(broker.resolve(&token).await.unwrap(), None);
    }
}
