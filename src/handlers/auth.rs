use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Collection;
use serde_json::{json, Value};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::user::{AuthResponse, Claims, LoginRequest, SignupRequest, User, UserResponse};
use crate::services::hashing::{hash_secret, verify_secret};
use crate::services::username::{generate_random_username, is_valid_username};
use crate::state::AppState;

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<AuthResponse>> {
    payload.validate()?;

    let collection: Collection<User> = state.db.collection("users");

    if collection
        .find_one(doc! { "email": &payload.email })
        .await?
        .is_some()
    {
        return Err(AppError::conflict("Email already registered"));
    }

    let username = match payload.username {
        Some(username) => {
            if !is_valid_username(&username) {
                return Err(AppError::validation(
                    "Username must be 3-20 lowercase letters, digits or underscores, starting with a letter",
                ));
            }
            if collection
                .find_one(doc! { "username": &username })
                .await?
                .is_some()
            {
                return Err(AppError::conflict("Username already taken"));
            }
            username
        }
        None => pick_free_username(&collection).await?,
    };

    let password_hash = hash_secret(&payload.password)?;

    let user = User {
        _id: Some(ObjectId::new()),
        username,
        email: payload.email,
        password_hash,
        nickname: None,
        location: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    collection.insert_one(&user).await?;

    let token = issue_token(&user, &state.jwt_secret)?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
        token,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    payload.validate()?;

    let collection: Collection<User> = state.db.collection("users");

    let user = collection
        .find_one(doc! { "email": &payload.email })
        .await?
        .ok_or_else(|| AppError::invalid_credential("Invalid email or password"))?;

    if !verify_secret(&payload.password, &user.password_hash)? {
        return Err(AppError::invalid_credential("Invalid email or password"));
    }

    let token = issue_token(&user, &state.jwt_secret)?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
        token,
    }))
}

/// Stateless check of a bearer token; 401 when missing, expired or forged.
pub async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let token = headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::Auth)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )?;

    Ok(Json(json!({
        "valid": true,
        "user_id": token_data.claims.sub,
        "username": token_data.claims.username,
        "email": token_data.claims.email,
    })))
}

fn issue_token(user: &User, secret: &str) -> Result<String> {
    let claims = Claims::for_user(user);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| AppError::internal(format!("Token generation failed: {}", e)))
}

async fn pick_free_username(collection: &Collection<User>) -> Result<String> {
    // A couple of tries is plenty against a 22k-name space.
    for _ in 0..5 {
        let candidate = generate_random_username();
        if collection
            .find_one(doc! { "username": &candidate })
            .await?
            .is_none()
        {
            return Ok(candidate);
        }
    }
    Err(AppError::internal("Could not generate a free username"))
}
