pub mod messages;
pub mod sms;

pub use messages::{auto_closed_message, reminder_message, Language, MessageContext};
pub use sms::{HttpSmsSender, LogSmsSender, SmsSender};
