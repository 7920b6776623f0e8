use axum::{
    extract::State,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::errors::Result;
use crate::state::AppState;

// The three-phase reset flow. Handlers stay thin; every invariant lives in
// ResetPasswordService.

#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 4, max = 4, message = "OTP must be 4 digits"))]
    pub otp: String,
}

pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let message = state.reset_password.request_otp(&payload.email).await?;

    Ok(Json(json!({
        "message": message,
        "success": true,
    })))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let message = state.reset_password.resend_otp(&payload.email).await?;

    Ok(Json(json!({
        "message": message,
        "success": true,
    })))
}

pub async fn submit_otp(
    State(state): State<AppState>,
    Json(payload): Json<SubmitOtpRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let message = state
        .reset_password
        .submit_otp(&payload.email, &payload.password, &payload.otp)
        .await?;

    Ok(Json(json!({
        "message": message,
        "success": true,
    })))
}
