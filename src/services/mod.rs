pub mod hashing;
pub mod mail_service;
pub mod otp_store;
pub mod reset_password;
pub mod user_directory;
pub mod username;
