use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Timelike, Utc};
use log::{debug, error, info, warn};
use teloxide::prelude::*;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::{
    analysis::{
        correlator::ReplyCorrelator,
        dispatcher::{DelayPolicy, SequentialDispatcher},
        extractor::AddressExtractor,
    },
    character::CharacterConfig,
    config::Config,
    core::{
        actions::{AccessPolicy, Action, ActionParser},
        agent::{Agent, ThreadStyle},
    },
    error::DispatchError,
    memory::{MemoryStore, DEFAULT_MEMORY_PATH},
    models::{AnalysisResult, Memory},
    providers::{
        cookie::CookieScraper,
        telegram::Telegram,
        telegram_user::UserSession,
        twitter::{split_for_thread, truncate_tweet, Twitter, MAX_TWEET_CHARS},
    },
};

const BATCH_RUNNING: &str = "An analysis batch is already running, try again once it finishes.";
const NO_RECENT_REPORT: &str =
    "I don't have any recent coin analysis to tweet. Please ask me about a specific coin first!";

pub struct Runtime {
    twitter: Twitter,
    telegram: Arc<Telegram>,
    agent: Agent,
    scraper: CookieScraper,
    extractor: AddressExtractor,
    dispatcher: SequentialDispatcher<UserSession>,
    parser: ActionParser,
    access: AccessPolicy,
    store: MemoryStore,
    memory: Mutex<Memory>,
    tweet_delay: DelayPolicy,
    schedule_minutes: Vec<u32>,
    watchlist: Vec<String>,
    watchlist_interval: u32,
    watch_cursor: AtomicUsize,
    last_report: Mutex<Option<String>>,
    character: CharacterConfig,
    cached_user_id: Mutex<Option<u64>>,
}

impl Runtime {
    pub fn new(config: &Config, character: CharacterConfig, session: Arc<UserSession>) -> Result<Self> {
        let twitter = Twitter::new(
            &config.twitter.consumer_key,
            &config.twitter.consumer_secret,
            &config.twitter.access_token,
            &config.twitter.access_token_secret,
        );
        let telegram = Arc::new(Telegram::new(&config.telegram_bot_token));

        let correlator = ReplyCorrelator::new(
            session,
            config.chat_id,
            config.thread_id,
            &config.analyzer_bot,
        )
        .with_request_template(&config.request_template)
        .with_poll_policy(config.poll.clone())
        .with_retry_policy(config.retry.clone());
        let dispatcher = SequentialDispatcher::new(correlator, config.request_delay.clone());

        let store = MemoryStore::new(DEFAULT_MEMORY_PATH);
        let mut memory = store.load_memory().unwrap_or_else(|e| {
            warn!("Failed to load memory, starting fresh: {}", e);
            Memory::default()
        });
        if let Some(tweet_mode) = config.tweet_mode {
            if let Err(e) = store.set_tweet_mode(&mut memory, tweet_mode) {
                error!("Failed to save tweet mode: {}", e);
            }
        }
        if let Some(debug_mode) = config.debug_mode {
            if let Err(e) = store.set_debug_mode(&mut memory, debug_mode) {
                error!("Failed to save debug mode: {}", e);
            }
        }

        Ok(Runtime {
            twitter,
            telegram,
            agent: Agent::new(&config.anthropic_api_key, &character.prompt),
            scraper: CookieScraper::new(&config.zenrows_api_key, &config.cookie_url),
            extractor: AddressExtractor::new(&config.address_pattern, config.address_limit)?,
            dispatcher,
            parser: ActionParser::new()?,
            access: AccessPolicy::new(config.allowed_room_id, config.allowed_user_ids.clone()),
            store,
            memory: Mutex::new(memory),
            tweet_delay: config.tweet_delay.clone(),
            schedule_minutes: config.schedule_minutes.clone(),
            watchlist: config.watchlist.clone(),
            watchlist_interval: config.watchlist_interval_minutes,
            watch_cursor: AtomicUsize::new(0),
            last_report: Mutex::new(None),
            character,
            cached_user_id: Mutex::new(None),
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (tweet_mode, debug_mode) = {
            let memory = self.memory.lock().await;
            (memory.tweet_mode, memory.debug_mode)
        };

        info!("=== Starting cookie relay agent ===");
        info!("Character: {}", self.character.name);
        info!("Tweet mode enabled: {}", tweet_mode);
        info!("Debug mode enabled: {}", debug_mode);
        info!("Scheduled minutes: {:?}", self.schedule_minutes);
        if !self.watchlist.is_empty() {
            info!(
                "Watchlist of {} addresses, one every {} minutes",
                self.watchlist.len(),
                self.watchlist_interval
            );
        }

        if debug_mode && !tweet_mode {
            self.run_debug_test().await?;
            return Ok(()); // Exit after debug test
        }

        tokio::spawn(self.clone().listen());
        self.run_periodically().await
    }

    async fn listen(self: Arc<Self>) {
        let bot = self.telegram.bot.clone();
        let handler = Update::filter_message().endpoint(handle_message);

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![self])
            .default_handler(|_| async {})
            .build()
            .dispatch()
            .await;

        warn!("Telegram listener stopped");
    }

    async fn run_periodically(self: &Arc<Self>) -> Result<()> {
        loop {
            let now = Utc::now();

            if self.should_run_scheduled_action(&self.schedule_minutes) {
                info!(
                    "Starting scheduled cookie thread at {:02}:{:02}...",
                    now.hour(),
                    now.minute()
                );
                // The run guard turns an overlapping run into a no-op
                let runtime = self.clone();
                tokio::spawn(async move {
                    match runtime.analysis_thread(ThreadStyle::Cookie).await {
                        Ok(status) => info!("Scheduled cookie thread: {}", status),
                        Err(e) => error!("Error running scheduled cookie thread: {}", e),
                    }
                });
            }

            if now.second() == 0 && watchlist_due(now.minute(), self.watchlist_interval) {
                if let Some(address) = self.next_watch_target() {
                    info!("Scheduled ANALYZE_COIN for {}", address);
                    let runtime = self.clone();
                    tokio::spawn(async move {
                        match runtime.analyze_coin(&address).await {
                            Ok(status) => info!("Scheduled ANALYZE_COIN: {}", status),
                            Err(e) => error!("Error running scheduled ANALYZE_COIN: {}", e),
                        }
                    });
                }
            }

            let next_second = (now + chrono::Duration::seconds(1))
                .with_nanosecond(0)
                .unwrap_or(now + chrono::Duration::seconds(1));
            let duration_until_next = next_second.signed_duration_since(now);
            if duration_until_next.num_milliseconds() > 0 {
                sleep(Duration::from_millis(
                    duration_until_next.num_milliseconds() as u64,
                ))
                .await;
            }
        }
    }

    fn should_run_scheduled_action(&self, minutes: &[u32]) -> bool {
        let now = Utc::now();
        let is_minute_mark = minutes.contains(&now.minute()) && now.second() == 0;
        if is_minute_mark {
            debug!("Scheduled check at {:02}:{:02}", now.hour(), now.minute());
        }
        is_minute_mark
    }

    /// Watchlist addresses in rotation.
    fn next_watch_target(&self) -> Option<String> {
        if self.watchlist.is_empty() {
            return None;
        }
        let i = self.watch_cursor.fetch_add(1, Ordering::Relaxed) % self.watchlist.len();
        self.watchlist.get(i).cloned()
    }

    async fn run_debug_test(&self) -> Result<()> {
        info!("=== Running Debug Mode Analysis Test ===");

        let page = self.scraper.fetch_page().await?;
        let addresses = self.extractor.extract(&page);
        info!("Extracted {} addresses from {}", addresses.len(), self.scraper.page_url());

        let report = match self.dispatcher.run_batch(&addresses).await {
            Ok(report) => report,
            Err(DispatchError::AlreadyRunning) => {
                warn!("{}", BATCH_RUNNING);
                return Ok(());
            }
        };

        for (i, result) in report.results.iter().enumerate() {
            info!("#{} {} [{:?}]", i + 1, result.target, result.status);
            info!("{}", result.summary_line());
        }
        info!(
            "{} of {} analyses succeeded",
            report.successes().count(),
            report.len()
        );

        info!("=== Debug Test Complete ===");
        Ok(())
    }

    pub async fn handle_action(&self, action: Action) -> Result<String> {
        info!("Handling {}", action.name());
        match action {
            Action::CookieThread => self.analysis_thread(ThreadStyle::Cookie).await,
            Action::FundThread => self.analysis_thread(ThreadStyle::Fund).await,
            Action::AnalyzeCoin(address) => self.analyze_coin(&address).await,
            Action::GetCoinInfo(address) => self.get_coin_info(&address).await,
            Action::MakePost => self.make_post().await,
            Action::DirectTweet(text) => self.direct_tweet(&text).await,
            Action::Retweet(tweet_id) => self.retweet(&tweet_id).await,
        }
    }

    /// Scrape, analyze every address in order, then post the thread. The
    /// run guard is held for the whole sequence.
    async fn analysis_thread(&self, style: ThreadStyle) -> Result<String> {
        let batch = match self.dispatcher.begin() {
            Ok(batch) => batch,
            Err(DispatchError::AlreadyRunning) => return Ok(BATCH_RUNNING.to_string()),
        };

        let page = self.scraper.fetch_page().await?;
        let addresses = self.extractor.extract(&page);
        info!(
            "Extracted {} addresses (cap {}) from {}",
            addresses.len(),
            self.extractor.limit(),
            self.scraper.page_url()
        );
        if addresses.is_empty() {
            return Ok("No token addresses found on the page, nothing posted.".to_string());
        }

        let report = batch.analyze_all(&addresses).await;
        let reports: Vec<String> = report
            .successes()
            .filter_map(|r| r.response.clone())
            .collect();
        if reports.is_empty() {
            return Ok(format!(
                "None of the {} analyses came back, nothing posted.\n\n{}",
                report.len(),
                report.summary()
            ));
        }

        let opener = self.agent.compose_thread_opener(style, &reports).await?;
        let mut parts = split_for_thread(&opener, MAX_TWEET_CHARS);
        for text in &reports {
            parts.extend(split_for_thread(text, MAX_TWEET_CHARS));
        }

        let posted = self.post_thread(&parts, style.source()).await?;
        {
            let mut memory = self.memory.lock().await;
            if let Err(e) = self.store.set_last_batch(&mut memory, Utc::now()) {
                error!("Failed to save batch time: {}", e);
            }
        }

        Ok(format!(
            "Thread of {} posts covering {} of {} tokens.\n\n{}",
            posted,
            reports.len(),
            report.len(),
            report.summary()
        ))
    }

    async fn analyze_coin(&self, address: &str) -> Result<String> {
        let batch = match self.dispatcher.begin() {
            Ok(batch) => batch,
            Err(DispatchError::AlreadyRunning) => return Ok(BATCH_RUNNING.to_string()),
        };

        let result = batch.analyze_one(address).await;
        let report = match report_of(&result) {
            Ok(report) => report,
            Err(status) => return Ok(status),
        };
        self.remember_report(report).await;

        let tweet = truncate_tweet(&self.agent.shorten_analysis(report).await?);
        self.publish(&tweet, "ANALYZE_COIN", None).await?;
        Ok(format!("Analysis for {}:\n\n{}", address, tweet))
    }

    /// Analyzer report sent back to the operator as-is, nothing posted.
    async fn get_coin_info(&self, address: &str) -> Result<String> {
        let result = match self.dispatcher.begin() {
            Ok(batch) => batch.analyze_one(address).await,
            Err(DispatchError::AlreadyRunning) => return Ok(BATCH_RUNNING.to_string()),
        };
        match report_of(&result) {
            Ok(report) => {
                self.remember_report(report).await;
                Ok(report.to_string())
            }
            Err(status) => Ok(status),
        }
    }

    async fn make_post(&self) -> Result<String> {
        let Some(report) = self.last_report.lock().await.clone() else {
            return Ok(NO_RECENT_REPORT.to_string());
        };

        let tweet = truncate_tweet(&self.agent.compose_coin_post(&report).await?);
        match self.publish(&tweet, "MAKE_POST", None).await? {
            Some(id) => Ok(format!("Tweet posted: {}\n\n{}", id, tweet)),
            None => Ok(format!("Tweet mode disabled, saved: {}", tweet)),
        }
    }

    async fn remember_report(&self, report: &str) {
        *self.last_report.lock().await = Some(report.to_string());
    }

    async fn direct_tweet(&self, text: &str) -> Result<String> {
        let tweet = truncate_tweet(text);
        match self.publish(&tweet, "DIRECT_TWITTER", None).await? {
            Some(id) => Ok(format!("Tweet posted: {}", id)),
            None => Ok(format!("Tweet mode disabled, saved: {}", tweet)),
        }
    }

    async fn retweet(&self, tweet_id: &str) -> Result<String> {
        if !self.memory.lock().await.tweet_mode {
            info!("Tweet mode is disabled, skipping retweet of {}", tweet_id);
            return Ok(format!("Tweet mode disabled, not retweeting {}", tweet_id));
        }

        let user_id = self.ensure_user_id().await?;
        self.twitter.retweet(user_id, tweet_id).await?;

        let mut memory = self.memory.lock().await;
        if let Err(e) = self.store.add_retweet(&mut memory, tweet_id) {
            error!("Failed to save retweet to memory: {}", e);
        }
        Ok(format!("Retweeted {}", tweet_id))
    }

    /// Posts each part as a reply to the previous one.
    async fn post_thread(&self, parts: &[String], source: &str) -> Result<usize> {
        let mut previous: Option<String> = None;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 && self.memory.lock().await.tweet_mode {
                let delay = self.tweet_delay.sample();
                debug!("Waiting {:.1}s before next post...", delay.as_secs_f64());
                sleep(delay).await;
            }
            previous = self.publish(part, source, previous.as_deref()).await?;
        }
        Ok(parts.len())
    }

    /// Posts `text` when tweet mode is on and records it either way.
    /// Returns the tweet id when something was actually posted.
    async fn publish(&self, text: &str, source: &str, reply_to: Option<&str>) -> Result<Option<String>> {
        if !self.memory.lock().await.tweet_mode {
            info!("Tweet mode disabled, not posting: {}", text);
            self.record(text, source, None, reply_to).await;
            return Ok(None);
        }

        let posted = match reply_to {
            Some(parent) => self.twitter.reply_to_tweet(parent, text.to_string()).await,
            None => self.twitter.tweet(text.to_string()).await,
        };

        match posted {
            Ok(id) => {
                let twitter_id = id.to_string();
                self.record(text, source, Some(twitter_id.clone()), reply_to).await;
                Ok(Some(twitter_id))
            }
            Err(e) => {
                if e.to_string().contains("429") {
                    warn!("Rate limit hit while posting, giving up on this post");
                }
                Err(e)
            }
        }
    }

    async fn record(&self, text: &str, source: &str, twitter_id: Option<String>, reply_to: Option<&str>) {
        let mut memory = self.memory.lock().await;
        let saved = match reply_to {
            Some(parent) => {
                self.store
                    .add_reply_to_memory(&mut memory, text, source, twitter_id, parent.to_string())
            }
            None => self.store.add_to_memory(&mut memory, text, source, twitter_id),
        };
        match saved {
            Ok(id) => debug!("Post saved to memory as #{}", id),
            Err(e) => error!("Failed to save post to memory: {}", e),
        }
    }

    async fn ensure_user_id(&self) -> Result<u64> {
        let mut cached = self.cached_user_id.lock().await;
        if let Some(id) = *cached {
            return Ok(id);
        }
        let user = self.twitter.get_user_id().await?;
        let numeric_id = user
            .to_string()
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("Failed to parse user ID"))?;
        *cached = Some(numeric_id);
        Ok(numeric_id)
    }
}

/// Report text of a successful analysis, or the operator status explaining
/// why there is none.
fn report_of(result: &AnalysisResult) -> Result<&str, String> {
    match result.response.as_deref() {
        Some(report) if result.is_success() => Ok(report),
        _ => Err(match &result.error {
            Some(e) => format!("{}: {}", result.summary_line(), e),
            None => result.summary_line(),
        }),
    }
}

/// Minute marks on which the next watchlist address is analyzed.
fn watchlist_due(minute: u32, interval: u32) -> bool {
    interval > 0 && minute % interval == 0
}

/// Runs permitted commands off the update loop so the listener stays
/// responsive while a batch waits on the analyzer.
async fn handle_message(msg: Message, runtime: Arc<Runtime>) -> ResponseResult<()> {
    // Analyzer reports carry addresses and must not be read as commands
    if msg.from().map_or(true, |user| user.is_bot) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(action) = runtime.parser.parse(text) else {
        return Ok(());
    };
    let user_id = msg.from().map(|user| user.id.0);
    if !runtime.access.permits(msg.chat.id.0, user_id) {
        return Ok(());
    }

    let chat_id = msg.chat.id;
    let thread_id = msg.thread_id;
    tokio::spawn(async move {
        let name = action.name();
        let status = match runtime.handle_action(action).await {
            Ok(status) => status,
            Err(e) => {
                error!("{} failed: {}", name, e);
                format!("{} failed: {}", name, e)
            }
        };
        if let Err(e) = runtime.telegram.reply(chat_id, thread_id, &status).await {
            warn!("Failed to report {} status: {}", name, e);
        }
    });

    Ok(())
}
