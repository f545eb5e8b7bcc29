pub mod auth;
pub mod permissions;

pub use auth::{AuthenticatedUser, KioskDevice};
pub use permissions::Permission;
