use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use grammers_client::types::{Message, PackedChat};
use grammers_client::{Client, Config as ClientConfig, InputMessage, SignInError};
use grammers_session::Session;
use grammers_tl_types as tl;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::{
    analysis::transport::MessageTransport,
    config::TelegramUserCredentials,
    error::TransportError,
    models::{InboxMessage, SentMessage},
};

/// Messages scanned per requested message when reading one thread out of
/// the whole chat history.
const THREAD_SCAN_FACTOR: usize = 10;
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Telegram user account over MTProto. Unlike the Bot API it can read chat
/// history and sees replies posted by other bots.
pub struct UserSession {
    client: Client,
    session_file: String,
    chats: Mutex<HashMap<i64, PackedChat>>,
}

impl UserSession {
    pub async fn connect(credentials: &TelegramUserCredentials) -> Result<Self> {
        info!("Connecting Telegram user session from {}", credentials.session_file);
        if let Some(dir) = Path::new(&credentials.session_file).parent() {
            fs::create_dir_all(dir)?;
        }
        let client = Client::connect(ClientConfig {
            session: Session::load_file_or_create(&credentials.session_file)?,
            api_id: credentials.api_id,
            api_hash: credentials.api_hash.clone(),
            params: Default::default(),
        })
        .await?;

        let session = UserSession {
            client,
            session_file: credentials.session_file.clone(),
            chats: Mutex::new(HashMap::new()),
        };

        if !session.client.is_authorized().await? {
            session.sign_in(credentials).await?;
        }
        session.save()?;

        Ok(session)
    }

    async fn sign_in(&self, credentials: &TelegramUserCredentials) -> Result<()> {
        let phone = credentials.phone_number.as_deref().ok_or_else(|| {
            anyhow!(
                "Telegram session {} is not signed in and TELEGRAM_PHONE_NUMBER is not set",
                self.session_file
            )
        })?;

        info!("Signing in to Telegram as {}", phone);
        let token = self.client.request_login_code(phone).await?;
        let code = prompt("Enter the code Telegram sent you: ")?;

        match self.client.sign_in(&token, &code).await {
            Ok(_) => {}
            Err(SignInError::PasswordRequired(password_token)) => {
                let password = match &credentials.password {
                    Some(password) => password.clone(),
                    None => prompt("Enter your Telegram 2FA password: ")?,
                };
                self.client.check_password(password_token, password.trim()).await?;
            }
            Err(e) => return Err(e.into()),
        }

        info!("Signed in to Telegram");
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.client.session().save_to_file(&self.session_file)?;
        Ok(())
    }

    /// Finds the chat among the account's dialogs. The account must have
    /// joined it already.
    async fn resolve(&self, chat_id: i64) -> Result<PackedChat, String> {
        let mut chats = self.chats.lock().await;
        if let Some(chat) = chats.get(&chat_id) {
            return Ok(chat.clone());
        }

        let bare_id = bare_chat_id(chat_id);
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(|e| e.to_string())? {
            let chat = dialog.chat();
            if chat.id() == bare_id {
                let packed = chat.pack();
                debug!("Resolved chat {} as {}", chat_id, chat.name());
                chats.insert(chat_id, packed.clone());
                return Ok(packed);
            }
        }

        Err(format!("chat {} is not among this account's dialogs", chat_id))
    }
}

#[async_trait]
impl MessageTransport for UserSession {
    async fn send(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
        text: &str,
    ) -> Result<SentMessage, TransportError> {
        let chat = self.resolve(chat_id).await.map_err(TransportError::Send)?;
        let sent = self
            .client
            .send_message(chat, InputMessage::text(text).reply_to(thread_id))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        Ok(SentMessage {
            id: sent.id(),
            timestamp: sent.date(),
        })
    }

    async fn recent_messages(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
        limit: usize,
    ) -> Result<Vec<InboxMessage>, TransportError> {
        let chat = self.resolve(chat_id).await.map_err(TransportError::Poll)?;
        let scan = match thread_id {
            Some(_) => limit.saturating_mul(THREAD_SCAN_FACTOR),
            None => limit,
        };

        let mut history = self.client.iter_messages(chat).limit(scan);
        let mut messages = Vec::with_capacity(limit);
        while let Some(message) = history
            .next()
            .await
            .map_err(|e| TransportError::Poll(e.to_string()))?
        {
            let message = to_inbox_message(chat_id, &message);
            if thread_id.is_some() && message.thread_id != thread_id {
                continue;
            }
            messages.push(message);
            if messages.len() >= limit {
                break;
            }
        }

        Ok(messages)
    }
}

/// Reply metadata of a message: the message it answers, and the root of the
/// thread or forum topic it was posted in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplyHeader {
    pub reply_to: Option<i32>,
    pub top_id: Option<i32>,
}

impl ReplyHeader {
    fn of(message: &Message) -> Self {
        match &message.raw.reply_to {
            Some(tl::enums::MessageReplyHeader::Header(header)) => ReplyHeader {
                reply_to: header.reply_to_msg_id,
                top_id: header.reply_to_top_id,
            },
            _ => ReplyHeader::default(),
        }
    }

    /// A direct reply to the thread root carries no top id, the root is
    /// the message it answers.
    pub fn thread(&self) -> Option<i32> {
        self.top_id.or(self.reply_to)
    }
}

fn to_inbox_message(chat_id: i64, message: &Message) -> InboxMessage {
    let header = ReplyHeader::of(message);
    InboxMessage {
        id: message.id(),
        chat_id,
        thread_id: header.thread(),
        sender: message
            .sender()
            .and_then(|sender| sender.username().map(str::to_string)),
        text: message.text().to_string(),
        timestamp: message.date(),
        reply_to: header.reply_to,
    }
}

/// Bot API chat ids carry a `-100` prefix for supergroups and channels and a
/// minus sign for basic groups. MTProto uses the bare id.
pub fn bare_chat_id(chat_id: i64) -> i64 {
    if chat_id <= -CHANNEL_ID_OFFSET {
        -chat_id - CHANNEL_ID_OFFSET
    } else {
        chat_id.abs()
    }
}

fn prompt(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        warn!("Empty input for Telegram sign-in");
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_chat_id() {
        assert_eq!(bare_chat_id(-1001234567890), 1234567890);
        assert_eq!(bare_chat_id(-123456), 123456);
        assert_eq!(bare_chat_id(777000), 777000);
    }

    #[test]
    fn test_reply_in_topic_belongs_to_topic() {
        // Analyzer answering our request inside topic 42
        let header = ReplyHeader {
            reply_to: Some(100),
            top_id: Some(42),
        };
        assert_eq!(header.thread(), Some(42));
    }

    #[test]
    fn test_direct_reply_to_root_belongs_to_root() {
        let header = ReplyHeader {
            reply_to: Some(42),
            top_id: None,
        };
        assert_eq!(header.thread(), Some(42));
    }

    #[test]
    fn test_plain_message_has_no_thread() {
        assert_eq!(ReplyHeader::default().thread(), None);
    }
}
