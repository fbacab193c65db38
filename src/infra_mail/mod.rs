mod log_sender;
mod smtp_sender;
mod template;

pub use log_sender::*;
pub use smtp_sender::*;
pub use template::MailContent;
