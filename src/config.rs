//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::commands::DEFAULT_CUTOFF;
use crate::speech::PhonemeTiming;

/// Words and phrases the assistant speaks with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    /// Assistant name, used in "what is your name"
    pub name: String,

    /// Phrase that moves the dialogue out of Idle
    pub wake_phrase: String,

    /// Other transcripts accepted as the wake phrase (common mishearings,
    /// translations); also stripped from commands as filler
    pub wake_aliases: Vec<String>,

    /// Who to credit for "who built you"
    pub creator: String,

    pub wake_ack: String,
    pub cancel_notice: String,
    pub not_understood: String,
    pub silence_notice: String,
    pub goodbye: String,
    pub hello: String,
    pub how_are_you: String,
    pub timer_unavailable: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Sonny".to_string(),
            wake_phrase: "hey sonny".to_string(),
            wake_aliases: vec!["hey sunny".to_string(), "sonny".to_string()],
            creator: "the Robo workshop".to_string(),
            wake_ack: "How can I help you? Say 'cancel' to exit command mode.".to_string(),
            cancel_notice: "Exiting command mode.".to_string(),
            not_understood: "I did not understand that command. Please repeat.".to_string(),
            silence_notice: "I didn't hear anything.".to_string(),
            goodbye: "Goodbye!".to_string(),
            hello: "Hello! I am awake and ready for commands.".to_string(),
            how_are_you: "I am just a robot, but I am feeling functional!".to_string(),
            timer_unavailable: "Timers are not active in this version.".to_string(),
        }
    }
}

impl Persona {
    /// Wake phrase followed by its aliases
    pub fn wake_phrases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.wake_phrase.as_str()).chain(self.wake_aliases.iter().map(String::as_str))
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial device of the servo microcontroller
    pub serial_port: String,

    pub baud_rate: u32,

    /// Time to let the microcontroller reset after the port opens
    pub serial_settle_ms: u64,

    /// Upper bound on one listening attempt
    pub listen_timeout_secs: u64,

    /// Minimum similarity for a command match
    pub match_cutoff: f64,

    /// Consecutive empty attempts before the "nothing heard" notice
    pub silence_limit: u32,

    /// Speak "Listening for ..." before each attempt
    pub announce_listening: bool,

    /// Mouth open time per phoneme in the primary language
    pub lip_open_ms: u64,

    /// Mouth closed time after each phoneme
    pub lip_close_ms: u64,

    /// espeak voice for the primary language
    pub primary_voice: String,

    /// espeak voice for the secondary language
    pub secondary_voice: String,

    /// espeak-ng executable
    pub espeak_binary: String,

    /// Command that plays a WAV stream from stdin
    pub player_command: Vec<String>,

    /// Command that writes 16 kHz mono s16le PCM to stdout
    pub microphone_command: Vec<String>,

    /// Command that reads PCM on stdin and prints `{"text": ...}` lines
    pub recognizer_command: Vec<String>,

    pub persona: Persona,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            serial_settle_ms: 2000,
            listen_timeout_secs: 5,
            match_cutoff: DEFAULT_CUTOFF,
            silence_limit: 3,
            announce_listening: false,
            lip_open_ms: 100,
            lip_close_ms: 50,
            primary_voice: "en-us".to_string(),
            secondary_voice: "hi".to_string(),
            espeak_binary: "espeak-ng".to_string(),
            player_command: vec!["aplay".to_string(), "-q".to_string()],
            microphone_command: ["arecord", "-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-t", "raw"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recognizer_command: Vec::new(),
            persona: Persona::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional JSON file and the environment
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// `load` with environment lookups going through `lookup`.
    ///
    /// A file named by `SONNY_CONFIG` must exist; the per-user file
    /// `~/.config/sonny/config.json` is optional.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if let Some(path) = lookup("SONNY_CONFIG") {
            Self::from_file(Path::new(&path)).context("SONNY_CONFIG names an unusable config file")?
        } else {
            match Self::user_config_path(&lookup) {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            }
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn user_config_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        let home = lookup("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("sonny")
                .join("config.json"),
        )
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply `SONNY_*` overrides through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("SONNY_SERIAL_PORT") {
            self.serial_port = port;
        }
        if let Some(baud) = lookup("SONNY_BAUD_RATE") {
            self.baud_rate = baud.parse().context("SONNY_BAUD_RATE must be an integer")?;
        }
        if let Some(secs) = lookup("SONNY_LISTEN_TIMEOUT_SECS") {
            self.listen_timeout_secs = secs
                .parse()
                .context("SONNY_LISTEN_TIMEOUT_SECS must be an integer")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_cutoff) {
            bail!("match_cutoff must be between 0.0 and 1.0");
        }
        if self.listen_timeout_secs == 0 {
            bail!("listen_timeout_secs must be positive");
        }
        if self.silence_limit == 0 {
            bail!("silence_limit must be positive");
        }
        if self.persona.wake_phrase.trim().is_empty() {
            bail!("persona.wake_phrase must not be empty");
        }
        Ok(())
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn serial_settle(&self) -> Duration {
        Duration::from_millis(self.serial_settle_ms)
    }

    pub fn phoneme_timing(&self) -> PhonemeTiming {
        PhonemeTiming {
            open: Duration::from_millis(self.lip_open_ms),
            close: Duration::from_millis(self.lip_close_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.listen_timeout(), Duration::from_secs(5));
        assert_eq!(config.serial_settle(), Duration::from_secs(2));
        assert_eq!(config.phoneme_timing(), PhonemeTiming::default());
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let missing = std::env::temp_dir().join("sonny-no-such-dir").join("config.json");
        let path = missing.to_string_lossy().into_owned();

        let err = Config::load_with(|key| (key == "SONNY_CONFIG").then(|| path.clone())).unwrap_err();
        assert!(format!("{:#}", err).contains("SONNY_CONFIG"));
    }

    #[test]
    fn test_missing_user_config_falls_back_to_defaults() {
        let home = std::env::temp_dir().join("sonny-no-such-home");
        let home = home.to_string_lossy().into_owned();

        let config = Config::load_with(|key| (key == "HOME").then(|| home.clone())).unwrap();
        assert_eq!(config.serial_port, Config::default().serial_port);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(
            r#"{"serial_port": "/dev/ttyUSB1", "persona": {"creator": "Ada"}}"#,
        )
        .unwrap();

        assert_eq!(config.serial_port, "/dev/ttyUSB1");
        assert_eq!(config.persona.creator, "Ada");
        assert_eq!(config.persona.wake_phrase, "hey sonny");
        assert_eq!(config.baud_rate, 9600);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                "SONNY_BAUD_RATE" => Some("115200".to_string()),
                "SONNY_LISTEN_TIMEOUT_SECS" => Some("30".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.listen_timeout_secs, 30);
        assert_eq!(config.serial_port, "/dev/ttyACM0");
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "SONNY_BAUD_RATE").then(|| "fast".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.match_cutoff = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.silence_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.persona.wake_phrase = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wake_phrases_lead_with_primary() {
        let persona = Persona::default();
        let phrases: Vec<_> = persona.wake_phrases().collect();
        assert_eq!(phrases[0], "hey sonny");
        assert!(phrases.contains(&"sonny"));
    }
}
