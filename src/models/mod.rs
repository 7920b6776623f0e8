pub mod reset_otp;
pub mod user;
