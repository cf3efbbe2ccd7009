use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub premium: PremiumConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PremiumConfig {
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default = "default_duration_days")]
    pub default_duration_days: i64,
    #[serde(default = "default_demo_duration_days")]
    pub demo_duration_days: i64,
    #[serde(default = "default_expiring_soon_days")]
    pub expiring_soon_days: i64,
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            default_duration_days: default_duration_days(),
            demo_duration_days: default_demo_duration_days(),
            expiring_soon_days: default_expiring_soon_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

fn default_data_file() -> String { "premium_users.json".into() }
fn default_duration_days() -> i64 { 30 }
fn default_demo_duration_days() -> i64 { 14 }
fn default_expiring_soon_days() -> i64 { 3 }
fn default_log_format() -> String { "compact".into() }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    if std::path::Path::new(&path).exists() {
        load_from_file(&path)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        // environment wins over the file for the data path
        self.premium.normalize_from_env();
        self.premium.validate()?;
        self.logging.normalize();
        Ok(())
    }
}

impl PremiumConfig {
    pub fn normalize_from_env(&mut self) {
        if let Ok(path) = std::env::var("PREMIUM_DATA_FILE") {
            if !path.trim().is_empty() {
                self.data_file = path;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_file.trim().is_empty() {
            return Err(anyhow!("premium.data_file must not be empty"));
        }
        if self.default_duration_days <= 0 {
            return Err(anyhow!("premium.default_duration_days must be >= 1"));
        }
        if self.demo_duration_days <= 0 {
            return Err(anyhow!("premium.demo_duration_days must be >= 1"));
        }
        if self.expiring_soon_days <= 0 {
            return Err(anyhow!("premium.expiring_soon_days must be >= 1"));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        let lower = self.format.trim().to_ascii_lowercase();
        self.format = if lower == "json" { lower } else { "compact".into() };
    }
}
