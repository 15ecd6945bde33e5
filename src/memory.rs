use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::{Memory, Tweet, TweetType};

pub const DEFAULT_MEMORY_PATH: &str = "./storage/memory.json";

/// JSON-file persistence for posted tweets and runtime flags.
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MemoryStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Missing file means a fresh start
    pub fn load_memory(&self) -> io::Result<Memory> {
        if self.path.exists() {
            let data = fs::read_to_string(&self.path)?;
            let memory: Memory = serde_json::from_str(&data)?;
            Ok(memory)
        } else {
            Ok(Memory::default())
        }
    }

    pub fn save_memory(&self, memory: &Memory) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(memory)?;
        let mut file = fs::File::create(&self.path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn add_to_memory(
        &self,
        memory: &mut Memory,
        text: &str,
        source: &str,
        twitter_id: Option<String>,
    ) -> io::Result<u64> {
        self.push(memory, text, source, twitter_id, TweetType::Original, None)
    }

    pub fn add_reply_to_memory(
        &self,
        memory: &mut Memory,
        text: &str,
        source: &str,
        twitter_id: Option<String>,
        reply_to: String,
    ) -> io::Result<u64> {
        self.push(memory, text, source, twitter_id, TweetType::Reply, Some(reply_to))
    }

    pub fn add_retweet(&self, memory: &mut Memory, tweet_id: &str) -> io::Result<u64> {
        self.push(
            memory,
            "",
            "RETWEET",
            None,
            TweetType::Retweet,
            Some(tweet_id.to_string()),
        )
    }

    pub fn set_last_batch(&self, memory: &mut Memory, at: DateTime<Utc>) -> io::Result<()> {
        memory.last_batch = Some(at);
        self.save_memory(memory)
    }

    pub fn set_debug_mode(&self, memory: &mut Memory, debug: bool) -> io::Result<()> {
        memory.debug_mode = debug;
        self.save_memory(memory)
    }

    pub fn set_tweet_mode(&self, memory: &mut Memory, enabled: bool) -> io::Result<()> {
        memory.tweet_mode = enabled;
        self.save_memory(memory)
    }

    fn push(
        &self,
        memory: &mut Memory,
        text: &str,
        source: &str,
        twitter_id: Option<String>,
        tweet_type: TweetType,
        reply_to: Option<String>,
    ) -> io::Result<u64> {
        let internal_id = memory.next_id;
        memory.tweets.push(Tweet {
            internal_id,
            twitter_id,
            text: text.to_string(),
            source: source.to_string(),
            timestamp: Utc::now(),
            tweet_type,
            reply_to,
        });
        memory.next_id += 1;

        self.save_memory(memory)?;
        Ok(internal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> MemoryStore {
        let dir = std::env::temp_dir().join(format!(
            "cookie-relay-agent-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        MemoryStore::new(dir.join("storage").join("memory.json"))
    }

    #[test]
    fn test_missing_file_loads_default() {
        let store = temp_store("missing");
        let memory = store.load_memory().unwrap();
        assert!(memory.tweets.is_empty());
        assert_eq!(memory.next_id, 0);
        assert!(!memory.tweet_mode);
    }

    #[test]
    fn test_entries_persist_with_increasing_ids() {
        let store = temp_store("persist");
        let mut memory = Memory::default();

        let first = store
            .add_to_memory(&mut memory, "Market Analysis", "COOKIE_THREAD", Some("100".to_string()))
            .unwrap();
        let second = store
            .add_reply_to_memory(&mut memory, "report", "COOKIE_THREAD", Some("101".to_string()), "100".to_string())
            .unwrap();
        let third = store.add_retweet(&mut memory, "42").unwrap();
        assert_eq!((first, second, third), (0, 1, 2));

        let reloaded = store.load_memory().unwrap();
        assert_eq!(reloaded.next_id, 3);
        assert_eq!(reloaded.tweets.len(), 3);
        assert_eq!(reloaded.tweets[1].tweet_type, TweetType::Reply);
        assert_eq!(reloaded.tweets[1].reply_to.as_deref(), Some("100"));
        assert_eq!(reloaded.tweets[2].tweet_type, TweetType::Retweet);

        let _ = fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }

    #[test]
    fn test_flags_persist() {
        let store = temp_store("flags");
        let mut memory = Memory::default();
        store.set_debug_mode(&mut memory, true).unwrap();
        store.set_tweet_mode(&mut memory, true).unwrap();

        let reloaded = store.load_memory().unwrap();
        assert!(reloaded.debug_mode);
        assert!(reloaded.tweet_mode);

        let _ = fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }
}
