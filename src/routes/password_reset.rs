use axum::{
    routing::post,
    Router,
};

use crate::{
    handlers::password_reset,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        // Request OTP for password reset
        .route("/request-otp", post(password_reset::request_otp))

        // Resend after the cooldown window
        .route("/resend-otp", post(password_reset::resend_otp))

        // Submit the code with the new password
        .route("/submit-otp", post(password_reset::submit_otp))
}
