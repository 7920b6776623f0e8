use axum::{
    extract::{Path, State},
    response::Json,
};
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Collection;
use serde_json::{json, Value};

use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::services::username::{escape_regex, is_valid_username};
use crate::state::AppState;

const AUTOCOMPLETE_LIMIT: i64 = 10;

pub async fn get_id_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>> {
    let collection: Collection<User> = state.db.collection("users");

    let user = collection
        .find_one(doc! { "username": &username })
        .await?
        .ok_or_else(|| AppError::not_found("No user found with this username"))?;

    Ok(Json(json!({
        "id": user._id.map(|id| id.to_hex()),
        "success": true,
    })))
}

/// Polled from signup forms, so an invalid shape is just "not available"
/// instead of an error.
pub async fn is_username_available(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>> {
    if !is_valid_username(&username) {
        return Ok(Json(json!({
            "available": false,
            "reason": "Invalid username format",
            "success": true,
        })));
    }

    let collection: Collection<User> = state.db.collection("users");
    let taken = collection
        .find_one(doc! { "username": &username })
        .await?
        .is_some();

    Ok(Json(json!({
        "available": !taken,
        "success": true,
    })))
}

pub async fn autocomplete_username(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> Result<Json<Value>> {
    let collection: Collection<User> = state.db.collection("users");

    let filter = doc! {
        "username": {
            "$regex": format!("^{}", escape_regex(&prefix)),
            "$options": "i",
        }
    };

    let cursor = collection.find(filter).limit(AUTOCOMPLETE_LIMIT).await?;
    let users: Vec<User> = cursor.try_collect().await?;

    let usernames: Vec<String> = users.into_iter().map(|user| user.username).collect();

    Ok(Json(json!({
        "usernames": usernames,
        "success": true,
    })))
}
