//! Typed builders for every cache key the auth flows touch.
//!
//! Key shapes are part of the wire-compatible state layout; building them
//! in one place keeps the three throttle namespaces from colliding.

use std::fmt;

/// Keys owned by the OTP engine and the registration token broker.
#[derive(Debug, Clone, Copy)]
pub enum CacheKey<'a> {
    /// Live OTP code for a phone number.
    Otp { phone: &'a str },
    /// Wrong-code counter for a phone number.
    WrongAttempts { phone: &'a str },
    /// Phone-level block set after too many wrong codes.
    PhoneBlock { phone: &'a str },
    /// Marker that the phone passed OTP verification.
    Verified { phone: &'a str },
    /// Opaque registration token mapping back to a phone number.
    RegistrationToken { token: &'a str },
}

impl fmt::Display for CacheKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Otp { phone } => write!(f, "otp:{}", phone),
            CacheKey::WrongAttempts { phone } => write!(f, "otp:wrong:phone:{}", phone),
            CacheKey::PhoneBlock { phone } => write!(f, "block:phone:{}", phone),
            CacheKey::Verified { phone } => write!(f, "verified:{}", phone),
            CacheKey::RegistrationToken { token } => write!(f, "reg_token:{}", token),
        }
    }
}

/// Identities the abuse guard counts and blocks on. Each variant is an
/// independent throttle namespace.
#[derive(Debug, Clone, Copy)]
pub enum GuardKey<'a> {
    /// OTP delivery requests per client IP.
    SendOtp { ip: &'a str },
    /// OTP verification attempts per (phone, IP) pair.
    VerifyOtp { phone: &'a str, ip: &'a str },
    /// Password login attempts per (phone, IP) pair.
    Login { phone: &'a str, ip: &'a str },
}

impl fmt::Display for GuardKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardKey::SendOtp { ip } => write!(f, "otp_send_{}", ip),
            GuardKey::VerifyOtp { phone, ip } => write!(f, "otp_verify_{}_{}", phone, ip),
            GuardKey::Login { phone, ip } => write!(f, "login_{}_{}", phone, ip),
        }
    }
}

impl GuardKey<'_> {
    /// Key of the block flag paired with this throttle counter.
    pub fn blocked(&self) -> String {
        format!("blocked:{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_formats() {
        assert_eq!(CacheKey::Otp { phone: "+100" }.to_string(), "otp:+100");
        assert_eq!(
            CacheKey::WrongAttempts { phone: "+100" }.to_string(),
            "otp:wrong:phone:+100"
        );
        assert_eq!(
            CacheKey::PhoneBlock { phone: "+100" }.to_string(),
            "block:phone:+100"
        );
        assert_eq!(CacheKey::Verified { phone: "+100" }.to_string(), "verified:+100");
        assert_eq!(
            CacheKey::RegistrationToken { token: "abc123" }.to_string(),
            "reg_token:abc123"
        );
    }

    #[test]
    fn test_guard_key_formats() {
        assert_eq!(GuardKey::SendOtp { ip: "1.2.3.4" }.to_string(), "otp_send_1.2.3.4");
        assert_eq!(
            GuardKey::VerifyOtp { phone: "+100", ip: "1.2.3.4" }.to_string(),
            "otp_verify_+100_1.2.3.4"
        );
        assert_eq!(
            GuardKey::Login { phone: "+100", ip: "1.2.3.4" }.to_string(),
            "login_+100_1.2.3.4"
        );
    }

    #[test]
    fn test_blocked_flag_namespacing() {
        let send = GuardKey::SendOtp { ip: "1.2.3.4" };
        let login = GuardKey::Login { phone: "+100", ip: "1.2.3.4" };
        assert_eq!(send.blocked(), "blocked:otp_send_1.2.3.4");
        assert_ne!(send.blocked(), login.blocked());
    }
}
