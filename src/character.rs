use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

const FALLBACK_PROMPT: &str = "You are a crypto market analyst. You read on-chain token reports \
and turn them into clear, data-driven posts with concrete predictions. You never invent numbers.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub name: String,
    pub prompt: String,
}

impl CharacterConfig {
    /// Reads `characters/<name>/config.json`, falling back to a built-in
    /// analyst persona when the profile is missing.
    pub fn load(name: &str) -> Result<Self> {
        let mut config_path = PathBuf::from("characters");
        config_path.push(name);
        config_path.push("config.json");

        if !config_path.exists() {
            warn!(
                "Character config not found for '{}' at {:?}, using built-in analyst",
                name, config_path
            );
            return Ok(CharacterConfig {
                name: name.to_string(),
                prompt: FALLBACK_PROMPT.to_string(),
            });
        }

        let config_str = fs::read_to_string(&config_path)?;
        let config: CharacterConfig = serde_json::from_str(&config_str)?;

        info!("Loaded character profile: {}", config.name);
        Ok(config)
    }
}
