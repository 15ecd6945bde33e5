use anyhow::{anyhow, Result};
use log::info;
use twitter_v2::authorization::Oauth1aToken;
use twitter_v2::id::NumericId;
use twitter_v2::TwitterApi;

pub const MAX_TWEET_CHARS: usize = 280;

pub struct Twitter {
    api: TwitterApi<Oauth1aToken>,
}

impl Twitter {
    pub fn new(
        consumer_key: &str,
        consumer_secret: &str,
        access_token: &str,
        access_token_secret: &str,
    ) -> Self {
        let auth = Oauth1aToken::new(
            consumer_key.to_string(),
            consumer_secret.to_string(),
            access_token.to_string(),
            access_token_secret.to_string(),
        );
        Twitter {
            api: TwitterApi::new(auth),
        }
    }

    pub async fn tweet(&self, text: String) -> Result<NumericId> {
        let tweet = self
            .api
            .post_tweet()
            .text(text)
            .send()
            .await?
            .into_data()
            .ok_or_else(|| anyhow!("Tweet response carried no data"))?;
        info!("Posted tweet {}", tweet.id);
        Ok(tweet.id)
    }

    pub async fn reply_to_tweet(&self, tweet_id: &str, text: String) -> Result<NumericId> {
        let parent: u64 = tweet_id
            .parse()
            .map_err(|_| anyhow!("Invalid tweet id: {}", tweet_id))?;
        let tweet = self
            .api
            .post_tweet()
            .text(text)
            .in_reply_to_tweet_id(parent)
            .send()
            .await?
            .into_data()
            .ok_or_else(|| anyhow!("Reply response carried no data"))?;
        info!("Posted reply {} to {}", tweet.id, tweet_id);
        Ok(tweet.id)
    }

    pub async fn get_user_id(&self) -> Result<NumericId> {
        let me = self
            .api
            .get_users_me()
            .send()
            .await?
            .into_data()
            .ok_or_else(|| anyhow!("Failed to get user data"))?;
        Ok(me.id)
    }

    pub async fn retweet(&self, user_id: u64, tweet_id: &str) -> Result<()> {
        let target: u64 = tweet_id
            .parse()
            .map_err(|_| anyhow!("Invalid tweet id: {}", tweet_id))?;
        self.api.post_user_retweet(user_id, target).await?;
        info!("Retweeted {}", tweet_id);
        Ok(())
    }
}

/// Cuts `text` to the tweet limit, marking the cut with "...".
pub fn truncate_tweet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_TWEET_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_TWEET_CHARS - 3).collect();
    format!("{}...", head.trim_end())
}

/// Splits `text` into chunks of at most `max_chars` characters, breaking on
/// whitespace where possible. Words longer than a chunk are hard-split.
pub fn split_for_thread(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > max_chars {
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current_len == 0 { word.len() } else { word.len() + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}
