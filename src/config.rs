use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::analysis::{
    correlator::{PollPolicy, RetryPolicy, DEFAULT_REQUEST_TEMPLATE},
    dispatcher::DelayPolicy,
    extractor::{DEFAULT_ADDRESS_LIMIT, DEFAULT_ADDRESS_PATTERN},
};

pub const DEFAULT_ANALYZER_BOT: &str = "AgentScarlettBot";
pub const DEFAULT_COOKIE_URL: &str = "https://www.cookie.fun/";
pub const DEFAULT_SESSION_FILE: &str = "./storage/telegram.session";

#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// MTProto user account that talks to the analyzer. Bots never see other
/// bots' messages, so analysis requests go out from a real user.
#[derive(Debug, Clone)]
pub struct TelegramUserCredentials {
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: String,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub twitter: TwitterCredentials,
    pub telegram_bot_token: String,
    pub telegram_user: TelegramUserCredentials,
    pub chat_id: i64,
    pub thread_id: Option<i32>,
    pub analyzer_bot: String,
    pub request_template: String,
    pub allowed_room_id: i64,
    pub allowed_user_ids: Vec<u64>,
    pub zenrows_api_key: String,
    pub cookie_url: String,
    pub address_pattern: String,
    pub address_limit: usize,
    pub poll: PollPolicy,
    pub retry: RetryPolicy,
    pub request_delay: DelayPolicy,
    pub tweet_delay: DelayPolicy,
    pub schedule_minutes: Vec<u32>,
    pub watchlist: Vec<String>,
    pub watchlist_interval_minutes: u32,
    pub character_name: String,
    pub tweet_mode: Option<bool>,
    pub debug_mode: Option<bool>,
}

impl Config {
    /// Reads the process environment. Call after `dotenv()`.
    pub fn from_env() -> Result<Self> {
        let chat_id: i64 = parse_required("TELEGRAM_CHAT_ID")?;

        Ok(Config {
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            twitter: TwitterCredentials {
                consumer_key: required("TWITTER_CONSUMER_KEY")?,
                consumer_secret: required("TWITTER_CONSUMER_SECRET")?,
                access_token: required("TWITTER_ACCESS_TOKEN")?,
                access_token_secret: required("TWITTER_ACCESS_TOKEN_SECRET")?,
            },
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_user: TelegramUserCredentials {
                api_id: parse_required("TELEGRAM_API_ID")?,
                api_hash: required("TELEGRAM_API_HASH")?,
                session_file: optional("TELEGRAM_SESSION_FILE")
                    .unwrap_or_else(|| DEFAULT_SESSION_FILE.to_string()),
                phone_number: optional("TELEGRAM_PHONE_NUMBER"),
                password: optional("TELEGRAM_PASSWORD"),
            },
            chat_id,
            thread_id: parse_optional("TELEGRAM_THREAD_ID")?,
            analyzer_bot: optional("ANALYZER_BOT_USERNAME")
                .unwrap_or_else(|| DEFAULT_ANALYZER_BOT.to_string()),
            request_template: optional("ANALYZE_REQUEST_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_REQUEST_TEMPLATE.to_string()),
            allowed_room_id: parse_optional("ALLOWED_ROOM_ID")?.unwrap_or(chat_id),
            allowed_user_ids: parse_list(optional("ALLOWED_USER_IDS").as_deref().unwrap_or(""))
                .context("ALLOWED_USER_IDS")?,
            zenrows_api_key: required("ZENROWS_API_KEY")?,
            cookie_url: optional("COOKIE_URL").unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string()),
            address_pattern: optional("ADDRESS_PATTERN")
                .unwrap_or_else(|| DEFAULT_ADDRESS_PATTERN.to_string()),
            address_limit: parse_or("ADDRESS_LIMIT", DEFAULT_ADDRESS_LIMIT)?,
            poll: PollPolicy {
                settle_delay: Duration::from_secs(parse_or("SETTLE_DELAY_SECS", 10)?),
                poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 2)?),
                jitter: Duration::from_millis(parse_or("POLL_JITTER_MS", 500)?),
                timeout: Duration::from_secs(parse_or("REPLY_TIMEOUT_SECS", 60)?),
                history_limit: parse_or("HISTORY_LIMIT", 5)?,
            },
            retry: RetryPolicy {
                max_attempts: parse_or("MAX_ATTEMPTS", 3)?,
                backoff: Duration::from_secs(parse_or("RETRY_BACKOFF_SECS", 5)?),
            },
            request_delay: DelayPolicy::from_secs(
                parse_or("REQUEST_DELAY_MIN_SECS", 10)?,
                parse_or("REQUEST_DELAY_MAX_SECS", 30)?,
            ),
            tweet_delay: DelayPolicy::from_secs(
                parse_or("TWEET_DELAY_MIN_SECS", 3)?,
                parse_or("TWEET_DELAY_MAX_SECS", 5)?,
            ),
            schedule_minutes: parse_list(optional("SCHEDULE_MINUTES").as_deref().unwrap_or("0"))
                .context("SCHEDULE_MINUTES")?,
            watchlist: parse_list(optional("WATCHLIST_ADDRESSES").as_deref().unwrap_or(""))
                .context("WATCHLIST_ADDRESSES")?,
            watchlist_interval_minutes: parse_or("WATCHLIST_INTERVAL_MINUTES", 10)?,
            character_name: optional("CHARACTER_NAME").unwrap_or_else(|| "analyst".to_string()),
            tweet_mode: parse_optional("TWEET_MODE")?,
            debug_mode: parse_optional("DEBUG_MODE")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| anyhow!("{} not set", key))
}

fn parse_required<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(key)?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

/// Comma separated values, blanks ignored.
pub fn parse_list<T>(raw: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| anyhow!("invalid entry '{}': {}", s, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list::<u32>("0, 15,30 ,45").unwrap(), vec![0, 15, 30, 45]);
        assert_eq!(parse_list::<u64>("").unwrap(), Vec::<u64>::new());
        assert_eq!(parse_list::<u64>(" 12 ,, ").unwrap(), vec![12]);
        assert!(parse_list::<u32>("1,two").is_err());
        assert_eq!(
            parse_list::<String>("AAA, BBB").unwrap(),
            vec!["AAA".to_string(), "BBB".to_string()]
        );
    }
}
