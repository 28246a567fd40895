use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::db::{ProfileUpdate, User};
use crate::error::{AppError, AuthError};
use crate::AppState;

use super::service::CheckPhoneOutcome;
use super::tokens::TokenPair;

/// Client IP used as the throttle identity.
fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Deserialize)]
pub struct CheckPhoneRequest {
    pub phone: String,
}

pub async fn check_phone(
    req: web::Json<CheckPhoneRequest>,
    http: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.phone.trim().is_empty() {
        return Err(AppError::Validation("Phone number is required.".to_string()));
    }

    let ip = client_ip(&http);
    info!("Received check-phone request for phone: {}", req.phone);

    match state.auth.check_phone_or_send_otp(&req.phone, &ip).await? {
        CheckPhoneOutcome::Exists => Ok(HttpResponse::Ok().json(json!({ "exists": true }))),
        CheckPhoneOutcome::OtpSent => Ok(HttpResponse::Ok().json(json!({
            "exists": false,
            "message": "OTP sent successfully."
        }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub message: String,
    pub registration_token: String,
}

pub async fn verify(
    req: web::Json<VerifyRequest>,
    http: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.phone.trim().is_empty() || req.code.trim().is_empty() {
        return Err(AppError::Validation(
            "Phone number and code are required.".to_string(),
        ));
    }

    let ip = client_ip(&http);
    match state.auth.verify_otp(&req.phone, &req.code, &ip).await {
        Ok(registration_token) => Ok(HttpResponse::Ok().json(VerifyResponse {
            message: "Phone verified.".to_string(),
            registration_token,
        })),
        Err(e) => {
            error!("OTP verification failed for phone {}: {}", req.phone, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub registration_token: String,
    #[serde(default)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub tokens: TokenPair,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let profile = ProfileUpdate {
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
    };

    match state
        .auth
        .register(&req.registration_token, &req.password, &profile)
        .await
    {
        Ok((user, tokens)) => {
            info!("Registration successful for phone: {}", user.phone);
            Ok(HttpResponse::Created().json(SessionResponse {
                message: "User registered successfully!".to_string(),
                tokens,
            }))
        }
        Err(e) => {
            error!("Registration failed: {}", e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    http: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.phone.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Phone number and password are required.".to_string(),
        ));
    }

    let ip = client_ip(&http);
    match state.auth.login(&req.phone, &req.password, &ip).await {
        Ok((_, tokens)) => Ok(HttpResponse::Ok().json(SessionResponse {
            message: "Login successful.".to_string(),
            tokens,
        })),
        Err(e) => {
            error!("Login failed for phone {}: {}", req.phone, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.refresh.is_empty() {
        return Err(AppError::Validation("Refresh token is required.".to_string()));
    }

    let access = state.auth.refresh(&req.refresh)?;
    Ok(HttpResponse::Ok().json(json!({ "access": access })))
}

/// Extractor for routes behind Bearer authentication. Resolves the access
/// token to a live user row; a token for a deleted user is rejected the
/// same way as a bad token.
pub struct AuthenticatedUser(pub User);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_owned);

        Box::pin(async move {
            let state = state
                .ok_or_else(|| AppError::Internal("application state missing".to_string()))?;
            let token = token.ok_or(AuthError::InvalidToken)?;
            let user_id = state.auth.validate_access(&token)?;
            let user = state
                .auth
                .profile(user_id)
                .await
                .map_err(|_| AppError::Auth(AuthError::InvalidToken))?;
            Ok(AuthenticatedUser(user))
        })
    }
}

pub async fn get_profile(user: AuthenticatedUser) -> Result<HttpResponse, AppError> {
    let user = user.0;
    Ok(HttpResponse::Ok().json(json!({
        "phone": user.phone,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "email": user.email,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

pub async fn update_profile(
    user: AuthenticatedUser,
    req: web::Json<UpdateProfileRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let update = ProfileUpdate {
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
    };

    let updated = state.auth.update_profile(user.0.id, &update).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "data": {
            "first_name": updated.first_name,
            "last_name": updated.last_name,
            "email": updated.email,
        }
    })))
}

pub async fn delete_profile(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth.delete_account(user.0.id).await?;
    info!("Deleted account for phone: {}", user.0.phone);
    Ok(HttpResponse::NoContent().finish())
}
