use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};

use crate::{
    handlers::user_profile,
    middleware::auth::auth_middleware,
    state::AppState,
};

/// Everything under /api/profile requires a valid bearer token.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/details", get(user_profile::get_user_details))
        .route("/update", patch(user_profile::update_profile))
        .route("/update-location", patch(user_profile::update_location))
        .route("/delete", delete(user_profile::delete_profile))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}
