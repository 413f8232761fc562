#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    ConfigFile,
    ConversationLimit,
    ConversationMessageLimit,
    GeminiModel,
    GeminiPriority,
    GeminiToken,
    GeminiURL,
    HealthCheckTimeout,
    HistoryDir,
    HistoryLimit,
    #[strum(serialize = "openai-chat-model")]
    OpenAiChatModel,
    #[strum(serialize = "openai-image-model")]
    OpenAiImageModel,
    #[strum(serialize = "openai-priority")]
    OpenAiPriority,
    #[strum(serialize = "openai-token")]
    OpenAiToken,
    #[strum(serialize = "openai-url")]
    OpenAiURL,
    ResponseCache,
    ServeAddress,
    StabilityEngine,
    StabilityPriority,
    StabilityToken,
    StabilityURL,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    /// Numeric config value, falling back to the default when the stored
    /// value does not parse.
    pub fn get_usize(key: ConfigKey) -> usize {
        return Config::get(key)
            .parse::<usize>()
            .unwrap_or_else(|_| return Config::default(key).parse::<usize>().unwrap_or(0));
    }

    pub fn get_bool(key: ConfigKey) -> bool {
        return matches!(Config::get(key).as_str(), "true" | "1" | "yes");
    }

    pub fn data_dir() -> path::PathBuf {
        return dirs::data_local_dir()
            .unwrap_or_else(env::temp_dir)
            .join("wayne");
    }

    pub fn cache_dir() -> path::PathBuf {
        return dirs::cache_dir().unwrap_or_else(env::temp_dir).join("wayne");
    }

    pub fn default(key: ConfigKey) -> String {
        #[cfg(not(target_os = "macos"))]
        let config_path = dirs::config_dir()
            .unwrap_or_else(env::temp_dir)
            .join("wayne/config.toml");
        #[cfg(target_os = "macos")]
        let config_path = dirs::home_dir()
            .unwrap_or_else(env::temp_dir)
            .join(".config/wayne/config.toml");

        let history_dir = Config::data_dir().join("history");

        let res = match key {
            ConfigKey::ConversationLimit => "20",
            ConfigKey::ConversationMessageLimit => "50",
            ConfigKey::GeminiModel => "gemini-pro",
            ConfigKey::GeminiPriority => "1",
            ConfigKey::GeminiToken => "",
            ConfigKey::GeminiURL => "https://generativelanguage.googleapis.com",
            ConfigKey::HealthCheckTimeout => "1000",
            ConfigKey::HistoryLimit => "50",
            ConfigKey::OpenAiChatModel => "gpt-3.5-turbo",
            ConfigKey::OpenAiImageModel => "dall-e-3",
            ConfigKey::OpenAiPriority => "2",
            ConfigKey::OpenAiToken => "",
            ConfigKey::OpenAiURL => "https://api.openai.com",
            ConfigKey::ResponseCache => "false",
            ConfigKey::ServeAddress => "127.0.0.1:8787",
            ConfigKey::StabilityEngine => "stable-diffusion-xl-1024-v1-0",
            ConfigKey::StabilityPriority => "1",
            ConfigKey::StabilityToken => "",
            ConfigKey::StabilityURL => "https://api.stability.ai",

            // Special
            ConfigKey::ConfigFile => return config_path.to_string_lossy().to_string(),
            ConfigKey::HistoryDir => return history_dir.to_string_lossy().to_string(),
        };

        return res.to_string();
    }

    fn possible_values(cmd: &Command, key: ConfigKey) -> Vec<String> {
        let name = key.to_string();
        return cmd
            .get_arguments()
            .find(|e| return e.get_long() == Some(name.as_str()))
            .map(|arg| {
                return arg
                    .get_possible_values()
                    .iter()
                    .map(|e| return e.get_name().to_string())
                    .collect::<Vec<String>>();
            })
            .unwrap_or_default();
    }

    /// Flattens a TOML value into the string form the store keeps. Empty
    /// strings read as unset.
    fn toml_value(cmd: &Command, key: ConfigKey, item: &toml_edit::Item) -> Result<Option<String>> {
        if let Some(val_int) = item.as_integer() {
            return Ok(Some(val_int.to_string()));
        }
        if let Some(val_bool) = item.as_bool() {
            return Ok(Some(val_bool.to_string()));
        }

        let Some(val_str) = item.as_str() else {
            bail!(format!(
                "config.toml has an unsupported value type for key '{key}'"
            ));
        };
        if val_str.is_empty() {
            return Ok(None);
        }

        let possible_values = Config::possible_values(cmd, key);
        if !possible_values.is_empty() && !possible_values.iter().any(|e| return e == val_str) {
            bail!(format!(
                "config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}",
                possible_values.join(", ")
            ));
        }

        return Ok(Some(val_str.to_string()));
    }

    async fn load_file(cmd: &Command, config_path: &path::Path) -> Result<()> {
        if !config_path.exists() {
            return Ok(());
        }

        let toml_str = fs::read_to_string(config_path).await?;
        let doc = toml_str.parse::<toml_edit::Document>()?;
        for key in ConfigKey::iter() {
            let Some(item) = doc.get(&key.to_string()) else {
                continue;
            };
            if let Some(val) = Config::toml_value(cmd, key, item)? {
                Config::set(key, &val);
            }
        }

        return Ok(());
    }

    /// Defaults first, then the config file, then flags and `WAYNE_*`
    /// environment variables.
    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let config_file = clap_arg_matches
            .iter()
            .filter_map(|matches| {
                return matches
                    .try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
                    .ok()
                    .flatten();
            })
            .last()
            .cloned()
            .unwrap_or_else(|| return Config::default(ConfigKey::ConfigFile));
        Config::load_file(&cmd, &path::PathBuf::from(config_file)).await?;

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.iter() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if !val.is_empty() {
                        Config::set(key, val);
                    }
                }
            }
        }

        tracing::debug!(
            gemini_enabled = !Config::get(ConfigKey::GeminiToken).is_empty(),
            openai_enabled = !Config::get(ConfigKey::OpenAiToken).is_empty(),
            stability_enabled = !Config::get(ConfigKey::StabilityToken).is_empty(),
            history_dir = %Config::get(ConfigKey::HistoryDir),
            response_cache = %Config::get(ConfigKey::ResponseCache),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {}]", possible_values);
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() || val.parse::<bool>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{}\"", val.replace('\\', "\\\\"));
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
