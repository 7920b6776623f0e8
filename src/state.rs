use std::sync::Arc;
use mongodb::Database;

use crate::services::reset_password::ResetPasswordService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub jwt_secret: String,
    pub reset_password: Arc<ResetPasswordService>,
}

impl AppState {
    pub fn new(
        db: Database,
        jwt_secret: String,
        reset_password: Arc<ResetPasswordService>,
    ) -> Self {
        AppState {
            db,
            jwt_secret,
            reset_password,
        }
    }
}
