use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("UI config file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UI config JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid UI config: {0}")]
    Invalid(String),
}

pub const DEFAULT_SAMPLE_QUESTIONS: [&str; 8] = [
    "What was our total revenue last quarter?",
    "Show me the top 5 sales reps by revenue",
    "What's Sarah Chen's quota attainment?",
    "What approval do I need for a 15% discount on a $300,000 deal?",
    "What is our discount policy?",
    "Calculate commission for a $500,000 new business deal with 120% quota attainment",
    "Which product category is most profitable?",
    "What are the work from home policy requirements?",
];

/// Page chrome handed to clients: title line, caption and the sample
/// questions offered as one-click prompts.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    pub title: String,
    pub icon: String,
    pub caption: String,
    pub samples: Vec<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: "Business Analytics Assistant".to_string(),
            icon: "📊".to_string(),
            caption: "Ask questions about sales data, company policies, or get help with calculations.".to_string(),
            samples: DEFAULT_SAMPLE_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        }
    }
}

impl UiConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.title.trim().is_empty() {
            return Err(ConfigError::Invalid("title must not be empty".to_string()));
        }
        if let Some(pos) = self.samples.iter().position(|q| q.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("sample question #{} is empty", pos)));
        }
        Ok(())
    }

    pub fn sample(&self, index: usize) -> Option<&str> {
        self.samples.get(index).map(String::as_str)
    }

    pub fn heading(&self) -> String {
        format!("{} {}", self.icon, self.title).trim().to_string()
    }
}

pub fn load_ui_config_from_str(json: &str) -> Result<UiConfig, ConfigError> {
    let config: UiConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

pub fn load_ui_config<P: AsRef<Path>>(path: P) -> Result<UiConfig, ConfigError> {
    let content = fs::read_to_string(&path)?;
    let config = load_ui_config_from_str(&content)?;
    info!(
        "Loaded UI config from {} ({} sample questions)",
        path.as_ref().display(),
        config.samples.len()
    );
    Ok(config)
}

pub fn initialize_ui_config(path: Option<&str>) -> Result<Arc<UiConfig>, ConfigError> {
    match path {
        Some(p) if !p.trim().is_empty() => Ok(Arc::new(load_ui_config(p)?)),
        _ => {
            info!("No UI config file given, using built-in defaults");
            Ok(Arc::new(UiConfig::default()))
        }
    }
}
