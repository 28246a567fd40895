//! Request-level sequencing of the auth flows: check-phone-or-send-OTP,
//! verify, register, login, refresh, and profile operations.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::KeyValueStore;
use crate::config::Settings;
use crate::db::{ProfileUpdate, User, UserStore};
use crate::error::{AppError, AuthError};
use crate::sms::SmsSender;

use super::guard::AbuseGuard;
use super::keys::GuardKey;
use super::otp::{OtpEngine, VerifyOutcome};
use super::password::PasswordService;
use super::registration::RegistrationTokens;
use super::tokens::{TokenIssuer, TokenPair};

const MSG_VERIFY_BLOCKED: &str = "Too many attempts. You are blocked.";
const MSG_PHONE_BLOCKED: &str = "Too many wrong OTP attempts. You are blocked.";
const MSG_LOGIN_BLOCKED: &str = "Temporary access blocked.";
const MSG_LOGIN_ESCALATED: &str = "You are blocked due to too many failed login attempts.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhoneOutcome {
    /// The phone already has an account; nothing was sent.
    Exists,
    /// The phone is unregistered and an OTP is on its way.
    OtpSent,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sms: Arc<dyn SmsSender>,
    otp: OtpEngine,
    guard: AbuseGuard,
    reg_tokens: RegistrationTokens,
    tokens: TokenIssuer,
    passwords: PasswordService,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sms: Arc<dyn SmsSender>,
        store: Arc<dyn KeyValueStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            otp: OtpEngine::new(store.clone(), &settings.otp),
            guard: AbuseGuard::new(store.clone(), &settings.otp),
            reg_tokens: RegistrationTokens::new(store, &settings.otp),
            tokens: TokenIssuer::new(&settings.auth),
            passwords: PasswordService,
            users,
            sms,
        }
    }

    /// Reports whether `phone` is registered; if not, generates an OTP and
    /// delivers it by SMS, throttled per client IP.
    pub async fn check_phone_or_send_otp(
        &self,
        phone: &str,
        ip: &str,
    ) -> Result<CheckPhoneOutcome, AppError> {
        if self.users.exists_by_phone(phone).await? {
            return Ok(CheckPhoneOutcome::Exists);
        }

        let key = GuardKey::SendOtp { ip };
        if self.guard.is_blocked(&key).await? {
            warn!("OTP send rejected for blocked IP: {}", ip);
            return Err(AuthError::RateLimited.into());
        }

        let code = self.otp.generate(phone).await?;
        // Delivery failure aborts the request before any attempt is counted.
        self.sms.send_code(phone, &code).await?;

        let attempts = self.guard.record_attempt(&key).await?;
        if attempts >= self.guard.threshold() {
            self.guard.block(&key).await?;
        }

        Ok(CheckPhoneOutcome::OtpSent)
    }

    /// Verifies an OTP and, on success, issues a registration token for the
    /// now-verified phone.
    pub async fn verify_otp(&self, phone: &str, code: &str, ip: &str) -> Result<String, AppError> {
        let key = GuardKey::VerifyOtp { phone, ip };
        if self.guard.is_blocked(&key).await? {
            return Err(AuthError::Blocked(MSG_VERIFY_BLOCKED).into());
        }

        match self.otp.verify(phone, code).await? {
            VerifyOutcome::Success => Ok(self.reg_tokens.issue(phone).await?),
            outcome => {
                let attempts = self.guard.record_attempt(&key).await?;
                if attempts >= self.guard.threshold() {
                    self.guard.block(&key).await?;
                }
                match outcome {
                    VerifyOutcome::Blocked => Err(AuthError::Blocked(MSG_PHONE_BLOCKED).into()),
                    _ => Err(AuthError::InvalidOtp.into()),
                }
            }
        }
    }

    /// Creates the account a registration token authorizes and signs the
    /// new user in.
    pub async fn register(
        &self,
        token: &str,
        password: &str,
        profile: &ProfileUpdate,
    ) -> Result<(User, TokenPair), AppError> {
        let phone = match self.reg_tokens.resolve(token).await? {
            Some(phone) => phone,
            None => return Err(AuthError::InvalidRegistrationToken.into()),
        };

        // The token and the verified flag expire together; a missing flag
        // means the verification lapsed.
        if !self.otp.is_verified(&phone).await? {
            return Err(AuthError::InvalidRegistrationToken.into());
        }

        if self.users.exists_by_phone(&phone).await? {
            return Err(AuthError::AlreadyExists.into());
        }

        if password.is_empty() {
            return Err(AppError::Validation("Password is required.".to_string()));
        }

        let mut user = User::new(phone, self.passwords.hash(password)?);
        user.first_name = profile.first_name.clone();
        user.last_name = profile.last_name.clone();
        user.email = profile.email.clone();

        let user = self.users.create(&user).await?;
        self.reg_tokens.invalidate(token).await?;
        info!("Registered user for phone: {}", user.phone);

        let pair = self.tokens.issue_pair(user.id)?;
        Ok((user, pair))
    }

    /// Password login, throttled per (phone, IP).
    pub async fn login(
        &self,
        phone: &str,
        password: &str,
        ip: &str,
    ) -> Result<(User, TokenPair), AppError> {
        let user = match self.users.find_by_phone(phone).await? {
            Some(user) => user,
            None => return Err(AuthError::PhoneNotRegistered.into()),
        };

        let key = GuardKey::Login { phone, ip };
        if self.guard.is_blocked(&key).await? {
            return Err(AuthError::Blocked(MSG_LOGIN_BLOCKED).into());
        }

        if !self.passwords.verify(password, &user.password_hash)? {
            let attempts = self.guard.record_attempt(&key).await?;
            if attempts >= self.guard.threshold() {
                self.guard.block(&key).await?;
                warn!("Login blocked for phone {} from {}", phone, ip);
                return Err(AuthError::Blocked(MSG_LOGIN_ESCALATED).into());
            }
            return Err(AuthError::InvalidCredentials.into());
        }

        info!("Login successful for phone: {}", phone);
        let pair = self.tokens.issue_pair(user.id)?;
        Ok((user, pair))
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<String, AppError> {
        self.tokens.refresh(refresh_token)
    }

    pub fn validate_access(&self, token: &str) -> Result<Uuid, AppError> {
        self.tokens.validate_access(token)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| crate::error::DatabaseError::NotFound.into())
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<User, AppError> {
        self.users.update_profile(user_id, update).await
    }

    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), AppError> {
        self.users.delete(user_id).await
    }
}
