use axum::{
    routing::get,
    Router,
};

use crate::{
    handlers::username,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/get-id-by-username/:username", get(username::get_id_by_username))

        // Polled very frequently by signup forms
        .route("/is-username-available/:username", get(username::is_username_available))

        .route("/autocomplete-username/:username", get(username::autocomplete_username))
}
