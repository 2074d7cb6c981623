//! Configuration management for the Nova gate
//!
//! Layered: built-in defaults, overlaid by an optional TOML file at
//! `~/.config/nova/config.toml`, overlaid by environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::gate::GateTiming;
use crate::wake::{WAKE_MARKER, WAKE_PREFIX};
use crate::{Error, Result};

/// Nova gate configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the enrollment profile record
    pub data_dir: PathBuf,

    /// Wake-phrase grammar
    pub wake: WakeConfig,

    /// Capture windows and pauses
    pub capture: CaptureConfig,

    /// Speaker verification settings
    pub verify: VerifyConfig,

    /// Voice I/O models
    pub voice: VoiceConfig,

    /// Assistant settings
    pub assistant: AssistantConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,
}

/// Wake-phrase grammar configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Greeting the transcript must begin with
    pub prefix: String,
    /// Identity marker the transcript must contain
    pub marker: String,
}

/// Capture durations in seconds
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Wake-attempt window
    pub wake_secs: u64,
    /// Command window
    pub command_secs: u64,
    /// Enrollment sample window
    pub enroll_secs: u64,
    /// Pause after a rejected attempt
    pub cooldown_secs: u64,
    /// Pause after a spoken command response
    pub response_pause_secs: u64,
}

/// Speaker verification configuration
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Cosine-similarity threshold for a match
    pub threshold: f32,
    /// Speaker-encoder embedding endpoint
    pub embedding_url: String,
}

/// STT/TTS model configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: String,
    /// TTS model (e.g. "tts-1")
    pub tts_model: String,
    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: String,
    /// TTS speed multiplier
    pub tts_speed: f32,
}

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Gemini model identifier
    pub model: String,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// OpenAI key (Whisper STT + TTS)
    pub openai: Option<String>,
    /// Gemini key (assistant completions)
    pub gemini: Option<String>,
}

impl Config {
    /// Load configuration from defaults, file, and environment
    ///
    /// # Errors
    ///
    /// Returns error if no usable data directory can be determined
    pub fn load() -> Result<Self> {
        let file = load_config_file();

        let data_dir = std::env::var("NOVA_DATA_DIR").map_or_else(
            |_| default_data_dir(),
            |dir| Ok(PathBuf::from(dir)),
        )?;

        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY")
                .ok()
                .or(file.api_keys.openai),
            gemini: std::env::var("GEMINI_API_KEY")
                .ok()
                .or(file.api_keys.gemini),
        };

        let embedding_url = std::env::var("NOVA_EMBEDDING_URL")
            .ok()
            .or(file.verify.embedding_url)
            .unwrap_or_else(|| "http://127.0.0.1:8383/embed".to_string());

        Ok(Self {
            data_dir,
            wake: WakeConfig {
                prefix: file.wake.prefix.unwrap_or_else(|| WAKE_PREFIX.to_string()),
                marker: file.wake.marker.unwrap_or_else(|| WAKE_MARKER.to_string()),
            },
            capture: CaptureConfig {
                wake_secs: file.capture.wake_secs.unwrap_or(4),
                command_secs: file.capture.command_secs.unwrap_or(4),
                enroll_secs: file.capture.enroll_secs.unwrap_or(3),
                cooldown_secs: file.capture.cooldown_secs.unwrap_or(2),
                response_pause_secs: file.capture.response_pause_secs.unwrap_or(2),
            },
            verify: VerifyConfig {
                threshold: file.verify.threshold.unwrap_or(0.75),
                embedding_url,
            },
            voice: VoiceConfig {
                stt_model: file.voice.stt_model.unwrap_or_else(|| "whisper-1".to_string()),
                tts_model: file.voice.tts_model.unwrap_or_else(|| "tts-1".to_string()),
                tts_voice: file.voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
                tts_speed: file.voice.tts_speed.unwrap_or(1.0),
            },
            assistant: AssistantConfig {
                model: file
                    .assistant
                    .model
                    .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            },
            api_keys,
        })
    }

    /// Gate timing derived from the capture settings
    #[must_use]
    pub const fn gate_timing(&self) -> GateTiming {
        GateTiming {
            wake_capture: Duration::from_secs(self.capture.wake_secs),
            command_capture: Duration::from_secs(self.capture.command_secs),
            cooldown: Duration::from_secs(self.capture.cooldown_secs),
            response_pause: Duration::from_secs(self.capture.response_pause_secs),
        }
    }
}

/// Top-level TOML configuration file schema
///
/// All fields optional; the file is a partial overlay on top of defaults.
#[derive(Debug, Default, Deserialize)]
struct NovaConfigFile {
    #[serde(default)]
    wake: WakeFileConfig,

    #[serde(default)]
    capture: CaptureFileConfig,

    #[serde(default)]
    verify: VerifyFileConfig,

    #[serde(default)]
    voice: VoiceFileConfig,

    #[serde(default)]
    assistant: AssistantFileConfig,

    #[serde(default)]
    api_keys: ApiKeysFileConfig,
}

#[derive(Debug, Default, Deserialize)]
struct WakeFileConfig {
    prefix: Option<String>,
    marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptureFileConfig {
    wake_secs: Option<u64>,
    command_secs: Option<u64>,
    enroll_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    response_pause_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyFileConfig {
    threshold: Option<f32>,
    embedding_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    stt_model: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
    tts_speed: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantFileConfig {
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeysFileConfig {
    openai: Option<String>,
    gemini: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns defaults if the file doesn't exist or can't be parsed.
fn load_config_file() -> NovaConfigFile {
    let Some(path) = config_file_path() else {
        return NovaConfigFile::default();
    };

    if !path.exists() {
        return NovaConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NovaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            NovaConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/nova/config.toml`
fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("nova").join("config.toml"))
}

/// Return the default data directory: `~/.local/share/nova`
fn default_data_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.data_dir().join("nova"))
        .ok_or_else(|| Error::Config("could not determine a data directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_overlay_is_fully_optional() {
        let file: NovaConfigFile = toml::from_str("").unwrap();
        assert!(file.wake.prefix.is_none());
        assert!(file.verify.threshold.is_none());
    }

    #[test]
    fn test_partial_file_parses() {
        let file: NovaConfigFile = toml::from_str(
            r#"
            [wake]
            prefix = "hey nova"

            [verify]
            threshold = 0.8

            [capture]
            wake_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(file.wake.prefix.as_deref(), Some("hey nova"));
        assert_eq!(file.verify.threshold, Some(0.8));
        assert_eq!(file.capture.wake_secs, Some(5));
        assert!(file.voice.stt_model.is_none());
    }
}
