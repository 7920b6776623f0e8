use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::{Collection, Database};

use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::services::reset_password::UserDirectory;

#[derive(Clone)]
pub struct MongoUserDirectory {
    collection: Collection<User>,
}

impl MongoUserDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let user = self.collection.find_one(doc! { "email": email }).await?;
        Ok(user.is_some())
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<()> {
        let update = doc! {
            "$set": {
                "password_hash": password_hash,
                "updated_at": BsonDateTime::from_chrono(Utc::now()),
            }
        };

        let result = self
            .collection
            .update_one(doc! { "email": email }, update)
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::not_found("No user found"));
        }
        Ok(())
    }
}
