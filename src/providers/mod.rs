pub mod cookie;
pub mod telegram;
pub mod telegram_user;
pub mod twitter;
