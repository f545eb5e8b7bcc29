pub mod assignments_handler;
pub mod audit_handler;
pub mod auth_handler;
pub mod employees_handler;
pub mod health;
pub mod invitations_handler;
pub mod kiosk_punch_handler;
pub mod kiosks_handler;
pub mod metrics;
pub mod preferences_handler;
pub mod reports_handler;
pub mod time_entries_handler;

pub use health::health_check;
pub use metrics::{metrics_handler, setup_metrics_recorder, MetricsState};
