use axum::{
    extract::State,
    response::Json,
    Extension,
};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, Document, DateTime as BsonDateTime};
use mongodb::Collection;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::user::{Claims, GeoPoint, User, UserResponse};
use crate::services::hashing::hash_secret;
use crate::services::username::is_valid_username;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 40, message = "Nickname must be at most 40 characters"))]
    pub nickname: Option<String>,
    pub username: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLocationRequest {
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub lng: f64,
}

pub async fn get_user_details(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>> {
    let collection: Collection<User> = state.db.collection("users");

    let user_id = ObjectId::parse_str(&claims.sub)?;
    let user = collection
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::not_found("No user found"))?;

    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let collection: Collection<User> = state.db.collection("users");
    let user_id = ObjectId::parse_str(&claims.sub)?;

    let mut set = Document::new();

    if let Some(nickname) = &payload.nickname {
        set.insert("nickname", nickname.as_str());
    }

    if let Some(username) = &payload.username {
        if !is_valid_username(username) {
            return Err(AppError::validation(
                "Username must be 3-20 lowercase letters, digits or underscores, starting with a letter",
            ));
        }
        let taken = collection
            .find_one(doc! { "username": username, "_id": { "$ne": user_id } })
            .await?;
        if taken.is_some() {
            return Err(AppError::conflict("Username already taken"));
        }
        set.insert("username", username.as_str());
    }

    if let Some(password) = &payload.password {
        set.insert("password_hash", hash_secret(password)?);
    }

    if set.is_empty() {
        return Err(AppError::validation("Nothing to update"));
    }
    set.insert("updated_at", BsonDateTime::from_chrono(Utc::now()));

    let result = collection
        .update_one(doc! { "_id": user_id }, doc! { "$set": set })
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::not_found("No user found"));
    }

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "success": true,
    })))
}

pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let collection: Collection<User> = state.db.collection("users");
    let user_id = ObjectId::parse_str(&claims.sub)?;

    let location = GeoPoint::new(payload.lat, payload.lng);
    let update = doc! {
        "$set": {
            "location": mongodb::bson::to_bson(&location)
                .map_err(|e| AppError::internal(format!("BSON conversion failed: {}", e)))?,
            "updated_at": BsonDateTime::from_chrono(Utc::now()),
        }
    };

    let result = collection
        .update_one(doc! { "_id": user_id }, update)
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::not_found("No user found"));
    }

    Ok(Json(json!({
        "message": "Location updated successfully",
        "success": true,
    })))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>> {
    let collection: Collection<User> = state.db.collection("users");
    let user_id = ObjectId::parse_str(&claims.sub)?;

    let result = collection.delete_one(doc! { "_id": user_id }).await?;

    if result.deleted_count == 0 {
        return Err(AppError::not_found("No user found"));
    }

    Ok(Json(json!({
        "message": "Profile deleted successfully",
        "success": true,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_request_rejects_out_of_range_coordinates() {
        let bad_lat = UpdateLocationRequest { lat: 91.0, lng: 0.0 };
        assert!(bad_lat.validate().is_err());

        let bad_lng = UpdateLocationRequest { lat: 0.0, lng: -181.0 };
        assert!(bad_lng.validate().is_err());

        let ok = UpdateLocationRequest { lat: 44.98, lng: -93.27 };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn geo_point_stores_lng_before_lat() {
        let point = GeoPoint::new(44.98, -93.27);
        assert_eq!(point.point_type, "Point");
        assert_eq!(point.coordinates, [-93.27, 44.98]);
    }

    #[test]
    fn profile_request_rejects_short_password() {
        let req = UpdateProfileRequest {
            nickname: None,
            username: None,
            password: Some("short".to_string()),
        };
        assert!(req.validate().is_err());
    }
}
