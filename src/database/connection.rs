use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

use crate::config::AppConfig;
use crate::models::user::User;

pub async fn get_db_client(config: &AppConfig) -> Database {
    let client = Client::with_uri_str(&config.database_url)
        .await
        .expect("Failed to connect to MongoDB");

    let db = client.database(&config.database_name);

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!(
                "Connected to database '{}', collections: {:?}",
                config.database_name,
                collections
            );
        }
        Err(e) => {
            tracing::warn!(
                "Database '{}' may not exist or is inaccessible: {}",
                config.database_name,
                e
            );
        }
    }

    db
}

/// Index bootstrap for the users collection. The reset_otps indexes live with
/// the OTP store, next to the queries that rely on them.
pub async fn ensure_user_indexes(db: &Database) -> crate::errors::Result<()> {
    let users: mongodb::Collection<User> = db.collection("users");

    let unique_email = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    users.create_index(unique_email).await?;

    let unique_username = IndexModel::builder()
        .keys(doc! { "username": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    users.create_index(unique_username).await?;

    let geo = IndexModel::builder()
        .keys(doc! { "location": "2dsphere" })
        .build();
    users.create_index(geo).await?;

    Ok(())
}
