pub mod clerk;
pub mod kiosk_token;

pub use clerk::{fetch_primary_email, validate_jwt, JwksCache};
pub use kiosk_token::{generate_kiosk_token, validate_kiosk_token};
