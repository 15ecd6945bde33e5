use teloxide::prelude::*;

const MAX_MESSAGE_CHARS: usize = 4096;

/// Operator-facing bot. Commands arrive through its update listener and
/// status reports go back through `reply`. Analysis traffic uses the user
/// session instead.
pub struct Telegram {
    pub bot: Bot,
}

impl Telegram {
    pub fn new(token: &str) -> Self {
        Telegram {
            bot: Bot::new(token),
        }
    }

    pub async fn reply(&self, chat_id: ChatId, thread_id: Option<i32>, text: &str) -> Result<(), anyhow::Error> {
        let mut request = self.bot.send_message(chat_id, clip_message(text));
        if let Some(thread_id) = thread_id {
            request = request.message_thread_id(thread_id);
        }
        request.await?;
        Ok(())
    }
}

fn clip_message(text: &str) -> String {
    text.chars().take(MAX_MESSAGE_CHARS).collect()
}
