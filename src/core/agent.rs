use rig::agent::Agent as RigAgent;
use rig::completion::Prompt;
use rig::providers::anthropic::completion::CompletionModel;
use rig::providers::anthropic::{self, CLAUDE_3_HAIKU};

/// Which opener a multi-report thread starts with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThreadStyle {
    /// Coin-by-coin predictions
    Cookie,
    /// Market overview with key performers and an outlook
    Fund,
}

impl ThreadStyle {
    pub fn source(&self) -> &'static str {
        match self {
            ThreadStyle::Cookie => "COOKIE_THREAD",
            ThreadStyle::Fund => "FUND_THREAD",
        }
    }

    pub fn opener_prompt(&self, reports: &[String]) -> String {
        match self {
            ThreadStyle::Cookie => thread_opener_prompt(reports),
            ThreadStyle::Fund => fund_opener_prompt(reports),
        }
    }
}

/// LLM composer. Turns analysis reports into post text.
pub struct Agent {
    agent: RigAgent<CompletionModel>,
}

impl Agent {
    pub fn new(anthropic_api_key: &str, prompt: &str) -> Self {
        let client = anthropic::ClientBuilder::new(anthropic_api_key).build();
        let temperature = 0.7;

        let agent = client
            .agent(CLAUDE_3_HAIKU)
            .preamble(prompt)
            .temperature(temperature)
            .max_tokens(4096)
            .build();
        Agent { agent }
    }

    pub async fn generate_custom_response(&self, prompt: &str) -> Result<String, anyhow::Error> {
        let response = self.agent.prompt(prompt).await?;

        Ok(clean_response(&response))
    }

    /// Opening post of a thread, summarizing every report.
    pub async fn compose_thread_opener(
        &self,
        style: ThreadStyle,
        reports: &[String],
    ) -> Result<String, anyhow::Error> {
        self.generate_custom_response(&style.opener_prompt(reports)).await
    }

    /// Standalone post about the most recent coin report.
    pub async fn compose_coin_post(&self, report: &str) -> Result<String, anyhow::Error> {
        self.generate_custom_response(&coin_post_prompt(report)).await
    }

    /// Condenses a single analysis report into one post.
    pub async fn shorten_analysis(&self, report: &str) -> Result<String, anyhow::Error> {
        self.generate_custom_response(&shorten_prompt(report)).await
    }
}

pub fn thread_opener_prompt(reports: &[String]) -> String {
    format!(
        "Task: Read all of the token analysis reports below and write the opening post of a Twitter thread.\n\
        The post gives a general analysis of the market and explains our predictions.\n\n\
        Reports:\n{}\n\n\
        Requirements:\n\
        - Mention every coin that appears in the reports\n\
        - Include a prediction (hold, sell, buy, dump, rug, etc) right after each coin's info\n\
        - Use the actual prices and key values from the reports\n\
        - No markup or markdown\n\
        - Start with the line 'Market Analysis 📊'\n\
        Write ONLY the post text with no additional commentary:",
        reports.join("\n\n---\n\n")
    )
}

pub fn fund_opener_prompt(reports: &[String]) -> String {
    format!(
        "Task: Read all of the token analysis reports below and write the opening post of a fund update thread.\n\n\
        Reports:\n{}\n\n\
        Requirements:\n\
        - Open with a short market overview: total market cap, 24h volume, BTC dominance\n\
        - List the key performers with price, 24h change, support and resistance\n\
        - Give short term predictions and the reasoning behind them\n\
        - Mention the coins from the reports and say they are covered below\n\
        - Use the actual prices and key values from the reports, never invent numbers\n\
        - No markup or markdown\n\
        - Start with the line 'Crypto Market Analysis & Predictions 🧵'\n\
        - End with 'Stay informed and always DYOR!'\n\
        Write ONLY the post text with no additional commentary:",
        reports.join("\n\n---\n\n")
    )
}

pub fn coin_post_prompt(report: &str) -> String {
    format!(
        "Task: Create an engaging tweet about this coin analysis.\n\n\
        Analysis:\n{}\n\n\
        Requirements:\n\
        - Focus only on the coin analysis\n\
        - Include the coin symbol in $SYMBOL format\n\
        - Cover the price trend, trading volume and one recommendation\n\
        - Keep it informative but engaging\n\
        - No markup or markdown\n\
        Write ONLY the tweet text, do not explain it:",
        report
    )
}

pub fn shorten_prompt(report: &str) -> String {
    format!(
        "Task: Rewrite this token analysis as a single tweet.\n\n\
        Report:\n{}\n\n\
        Requirements:\n\
        - Stay under 280 characters\n\
        - Keep the token name, market cap and price\n\
        - Include a prediction (hold, sell, buy, dump, rug, etc)\n\
        - No markup or markdown\n\
        Write ONLY the tweet text:",
        report
    )
}

fn clean_response(response: &str) -> String {
    response.trim().trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_opener_prompt_includes_every_report() {
        let reports = vec!["Token: $AAA".to_string(), "Token: $BBB".to_string()];
        let prompt = thread_opener_prompt(&reports);
        assert!(prompt.contains("Token: $AAA\n\n---\n\nToken: $BBB"));
        assert!(prompt.contains("Market Analysis"));
    }

    #[test]
    fn test_fund_style_uses_its_own_opener() {
        let reports = vec!["Token: $AAA".to_string()];
        let fund = ThreadStyle::Fund.opener_prompt(&reports);
        assert!(fund.contains("Token: $AAA"));
        assert!(fund.contains("Crypto Market Analysis & Predictions"));
        assert_ne!(fund, ThreadStyle::Cookie.opener_prompt(&reports));
        assert_eq!(ThreadStyle::Fund.source(), "FUND_THREAD");
        assert_eq!(ThreadStyle::Cookie.source(), "COOKIE_THREAD");
    }

    #[test]
    fn test_coin_post_prompt_carries_report() {
        let prompt = coin_post_prompt("Token: $TEST\nMC: $4.6K");
        assert!(prompt.contains("Token: $TEST\nMC: $4.6K"));
        assert!(prompt.contains("$SYMBOL"));
    }

    #[test]
    fn test_agent_builds_from_persona() {
        let _agent = Agent::new("test-key", "You are a crypto market analyst.");
    }

    #[test]
    fn test_clean_response_strips_quotes() {
        assert_eq!(clean_response("  \"gm market\"\n"), "gm market");
        assert_eq!(clean_response("plain"), "plain");
    }
}
