use log::info;
use regex::Regex;

const COOKIE_THREAD_SIMILES: &[&str] = &[
    "cookie_thread",
    "cookie thread",
    "thread cookie",
    "make a cookie thread",
];

const FUND_THREAD_SIMILES: &[&str] = &[
    "fund_thread",
    "fund thread",
    "thread fund",
    "make a fund thread",
];

const COIN_INFO_SIMILES: &[&str] = &[
    "get_coin_info",
    "coin_info",
    "get coin info",
    "coin info",
    "get info",
    "info",
];

const MAKE_POST_SIMILES: &[&str] = &[
    "make_post",
    "send_tweet",
    "make post",
    "send tweet",
    "tweet",
    "tweet post",
    "post tweet",
    "send to twitter",
    "send to x",
    "x post",
    "make an x post",
];

const RETWEET_SIMILES: &[&str] = &["retweet", "rt", "share tweet"];

/// Operator commands accepted from the control chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Scrape cookie.fun, analyze every address, post a thread
    CookieThread,
    /// Same batch as `CookieThread` under a market-overview opener
    FundThread,
    /// Analyze one address and post a single condensed tweet
    AnalyzeCoin(String),
    /// Analyze one address and only report back to the operator
    GetCoinInfo(String),
    /// Compose and post a tweet from the latest coin report
    MakePost,
    /// Post the given text as-is
    DirectTweet(String),
    /// Retweet by status id
    Retweet(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CookieThread => "COOKIE_THREAD",
            Action::FundThread => "FUND_THREAD",
            Action::AnalyzeCoin(_) => "ANALYZE_COIN",
            Action::GetCoinInfo(_) => "GET_COIN_INFO",
            Action::MakePost => "MAKE_POST",
            Action::DirectTweet(_) => "DIRECT_TWITTER",
            Action::Retweet(_) => "RETWEET",
        }
    }
}

pub struct ActionParser {
    direct: Regex,
    quoted: Regex,
    status_url: Regex,
    address: Regex,
}

impl ActionParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(ActionParser {
            direct: Regex::new(
                r"(?is)^\s*/?(?:direct_twitter|direct tweet|direct twitter post|direct x post|post directly to twitter|post directly to x)\b\s*:?\s*(.*)$",
            )?,
            quoted: Regex::new(r#""([^"]*)""#)?,
            status_url: Regex::new(r"(?:twitter\.com|x\.com)/\w+/status/(\d+)")?,
            address: Regex::new(r"\b[A-Za-z0-9]{32,44}\b")?,
        })
    }

    /// Maps a control-chat message to an action. Direct posts are checked
    /// first since their text may itself contain links or addresses.
    pub fn parse(&self, text: &str) -> Option<Action> {
        if let Some(rest) = self.direct.captures(text).and_then(|c| c.get(1)) {
            let rest = rest.as_str();
            let body = self
                .quoted
                .captures(rest)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or(rest)
                .trim();
            return (!body.is_empty()).then(|| Action::DirectTweet(body.to_string()));
        }

        let lower = text.to_lowercase();

        if let Some(id) = self.status_url.captures(text).and_then(|c| c.get(1)) {
            if has_simile(&lower, RETWEET_SIMILES) {
                return Some(Action::Retweet(id.as_str().to_string()));
            }
        }

        if has_simile(&lower, COOKIE_THREAD_SIMILES) {
            return Some(Action::CookieThread);
        }

        if has_simile(&lower, FUND_THREAD_SIMILES) {
            return Some(Action::FundThread);
        }

        // An address always names the coin to work on
        if let Some(address) = self.address.find(text) {
            let address = address.as_str().to_string();
            return Some(if has_simile(&lower, COIN_INFO_SIMILES) {
                Action::GetCoinInfo(address)
            } else {
                Action::AnalyzeCoin(address)
            });
        }

        has_simile(&lower, MAKE_POST_SIMILES).then_some(Action::MakePost)
    }
}

fn has_simile(text: &str, similes: &[&str]) -> bool {
    similes.iter().any(|simile| {
        text.match_indices(simile).any(|(pos, _)| {
            let before = text[..pos].chars().next_back();
            let after = text[pos + simile.len()..].chars().next();
            !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
        })
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Who may trigger actions, and where. An empty user list admits anyone
/// in the allowed room.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub allowed_room: i64,
    pub allowed_users: Vec<u64>,
}

impl AccessPolicy {
    pub fn new(allowed_room: i64, allowed_users: Vec<u64>) -> Self {
        AccessPolicy {
            allowed_room,
            allowed_users,
        }
    }

    pub fn permits(&self, chat_id: i64, user_id: Option<u64>) -> bool {
        if chat_id != self.allowed_room {
            info!("Unauthorized room access attempt from chat ID: {}", chat_id);
            return false;
        }

        if self.allowed_users.is_empty() {
            return true;
        }

        match user_id {
            Some(id) if self.allowed_users.contains(&id) => true,
            _ => {
                info!("Unauthorized user access attempt from user ID: {:?}", user_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "9RjwNo6hBPkxayWHCqQD1VjaH8igSizEseNZNbddpump";

    fn parser() -> ActionParser {
        ActionParser::new().unwrap()
    }

    #[test]
    fn test_parse_cookie_thread() {
        let p = parser();
        assert_eq!(p.parse("make a cookie thread"), Some(Action::CookieThread));
        assert_eq!(p.parse("/cookie_thread"), Some(Action::CookieThread));
        assert_eq!(p.parse("/cookie_thread@relay_bot"), Some(Action::CookieThread));
        assert_eq!(p.parse("COOKIE THREAD please"), Some(Action::CookieThread));
        assert_eq!(p.parse("cookies threaded"), None);
    }

    #[test]
    fn test_parse_fund_thread() {
        let p = parser();
        assert_eq!(p.parse("FUND_THREAD"), Some(Action::FundThread));
        assert_eq!(p.parse("I need to post a fund thread"), Some(Action::FundThread));
        assert_eq!(p.parse("make a fund thread"), Some(Action::FundThread));
        assert_eq!(p.parse("refund threads"), None);
    }

    #[test]
    fn test_parse_get_coin_info() {
        let p = parser();
        assert_eq!(
            p.parse(&format!("Get info about this address {}", ADDRESS)),
            Some(Action::GetCoinInfo(ADDRESS.to_string()))
        );
        assert_eq!(
            p.parse(&format!("COIN_INFO {}", ADDRESS)),
            Some(Action::GetCoinInfo(ADDRESS.to_string()))
        );
        assert_eq!(
            p.parse(&format!("info {}", ADDRESS)),
            Some(Action::GetCoinInfo(ADDRESS.to_string()))
        );
        // "information" is not the "info" simile
        assert_eq!(
            p.parse(&format!("information on {}", ADDRESS)),
            Some(Action::AnalyzeCoin(ADDRESS.to_string()))
        );
        assert_eq!(p.parse("coin info"), None);
    }

    #[test]
    fn test_parse_make_post() {
        let p = parser();
        assert_eq!(p.parse("You should tweet that"), Some(Action::MakePost));
        assert_eq!(p.parse("SEND_TWEET"), Some(Action::MakePost));
        assert_eq!(p.parse("make an X post"), Some(Action::MakePost));
        assert_eq!(p.parse("send to twitter"), Some(Action::MakePost));
        // Other tweet commands keep their meaning
        assert_eq!(
            p.parse("direct tweet gm"),
            Some(Action::DirectTweet("gm".to_string()))
        );
        assert_eq!(p.parse("retweet"), None);
        assert_eq!(
            p.parse(&format!("tweet about {}", ADDRESS)),
            Some(Action::AnalyzeCoin(ADDRESS.to_string()))
        );
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::FundThread.name(), "FUND_THREAD");
        assert_eq!(Action::GetCoinInfo(ADDRESS.to_string()).name(), "GET_COIN_INFO");
        assert_eq!(Action::MakePost.name(), "MAKE_POST");
    }

    #[test]
    fn test_parse_analyze_coin() {
        let p = parser();
        assert_eq!(
            p.parse(&format!("analyze {}", ADDRESS)),
            Some(Action::AnalyzeCoin(ADDRESS.to_string()))
        );
        assert_eq!(p.parse(ADDRESS), Some(Action::AnalyzeCoin(ADDRESS.to_string())));
        assert_eq!(p.parse("analyze $TEST"), None);
    }

    #[test]
    fn test_parse_direct_tweet() {
        let p = parser();
        assert_eq!(
            p.parse(r#"direct tweet "gm, watching x.com/a/status/1 closely""#),
            Some(Action::DirectTweet("gm, watching x.com/a/status/1 closely".to_string()))
        );
        assert_eq!(
            p.parse("Post directly to X: markets are quiet"),
            Some(Action::DirectTweet("markets are quiet".to_string()))
        );
        assert_eq!(p.parse("direct tweet"), None);
        assert_eq!(p.parse(r#"direct tweet """#), None);
    }

    #[test]
    fn test_parse_retweet() {
        let p = parser();
        assert_eq!(
            p.parse("rt https://x.com/cookiedotfun/status/1876543210987654321"),
            Some(Action::Retweet("1876543210987654321".to_string()))
        );
        assert_eq!(
            p.parse("please retweet twitter.com/someone/status/42"),
            Some(Action::Retweet("42".to_string()))
        );
        // A link alone is not a command
        assert_eq!(p.parse("look at x.com/someone/status/42"), None);
        // "rt" must be a whole word
        assert_eq!(p.parse("start x.com/someone/status/42"), None);
    }

    #[test]
    fn test_access_policy() {
        let policy = AccessPolicy::new(-100, vec![7, 8]);
        assert!(policy.permits(-100, Some(7)));
        assert!(policy.permits(-100, Some(8)));
        assert!(!policy.permits(-200, Some(7)));
        assert!(!policy.permits(-100, Some(9)));
        assert!(!policy.permits(-100, None));
    }

    #[test]
    fn test_empty_user_list_admits_anyone_in_room() {
        let policy = AccessPolicy::new(-100, Vec::new());
        assert!(policy.permits(-100, Some(7)));
        assert!(policy.permits(-100, None));
        assert!(!policy.permits(-200, Some(7)));
    }
}
