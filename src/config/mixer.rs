// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 22050;
const DEFAULT_CHANNELS: usize = 16;
const DEFAULT_LATENCY: Duration = Duration::from_millis(100);
const DEFAULT_SLOT_CAPACITY: usize = 48;
const DEFAULT_PERCENT: f64 = 75.0;
const DEFAULT_VOLUME_RAMP: Duration = Duration::from_millis(250);

/// A YAML representation of the mixer configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct MixerConfig {
    /// The output device. "mock" selects the recording mixer.
    device: Option<String>,

    /// Output sample rate in Hz (default: 22050).
    sample_rate: Option<u32>,

    /// Number of logical mixer channels whose volume and mode are tracked (default: 16).
    channels: Option<usize>,

    /// The latency reported to callers (default: 100ms).
    latency: Option<String>,

    /// Number of handle-bearing slots (default: 48).
    slot_capacity: Option<usize>,

    /// Initial global gain knobs, in percent (default: 75).
    music_percent: Option<f64>,
    speech_percent: Option<f64>,
    master_percent: Option<f64>,
    parrot_percent: Option<f64>,

    /// Ramp used when every channel volume is recomputed (default: 250ms).
    volume_ramp: Option<String>,

    /// Directory that sound names are resolved against.
    sounds_path: Option<PathBuf>,

    /// Directory holding the config file, used to resolve relative paths.
    #[serde(skip)]
    base_path: Option<PathBuf>,
}

impl MixerConfig {
    /// Creates a configuration for the given device with every other value defaulted.
    pub fn new(device: &str) -> MixerConfig {
        MixerConfig {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Parses a mixer configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<MixerConfig, ConfigError> {
        let mut mixer_config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<MixerConfig>()?;
        mixer_config.base_path = path.parent().map(Path::to_path_buf);
        mixer_config.validate()?;
        Ok(mixer_config)
    }

    /// Parses a mixer configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<MixerConfig, ConfigError> {
        let mixer_config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<MixerConfig>()?;
        mixer_config.validate()?;
        Ok(mixer_config)
    }

    /// Checks the values that can't be expressed through the types alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid("sample_rate must be non-zero".into()));
        }
        if self.channels() == 0 {
            return Err(ConfigError::Invalid("channels must be non-zero".into()));
        }
        if self.slot_capacity() < self.channels() {
            return Err(ConfigError::Invalid(format!(
                "slot_capacity ({}) must be at least the channel count ({})",
                self.slot_capacity(),
                self.channels()
            )));
        }
        if self.slot_capacity() > u16::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "slot_capacity ({}) must fit in 16 bits",
                self.slot_capacity()
            )));
        }
        self.latency()?;
        self.volume_ramp()?;
        Ok(())
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate (default: 22050).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the number of logical mixer channels (default: 16).
    pub fn channels(&self) -> usize {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the reported latency (default: 100ms).
    pub fn latency(&self) -> Result<Duration, ConfigError> {
        parse_duration("latency", self.latency.as_deref(), DEFAULT_LATENCY)
    }

    /// Returns the number of handle-bearing slots (default: 48).
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity.unwrap_or(DEFAULT_SLOT_CAPACITY)
    }

    pub fn music_percent(&self) -> f64 {
        self.music_percent.unwrap_or(DEFAULT_PERCENT)
    }

    pub fn speech_percent(&self) -> f64 {
        self.speech_percent.unwrap_or(DEFAULT_PERCENT)
    }

    pub fn master_percent(&self) -> f64 {
        self.master_percent.unwrap_or(DEFAULT_PERCENT)
    }

    pub fn parrot_percent(&self) -> f64 {
        self.parrot_percent.unwrap_or(DEFAULT_PERCENT)
    }

    /// Returns the ramp used when all channel volumes are recomputed (default: 250ms).
    pub fn volume_ramp(&self) -> Result<Duration, ConfigError> {
        parse_duration("volume_ramp", self.volume_ramp.as_deref(), DEFAULT_VOLUME_RAMP)
    }

    /// Returns the directory sound names are resolved against. Relative paths are taken
    /// relative to the directory holding the config file.
    pub fn sounds_path(&self) -> PathBuf {
        let sounds_path = self
            .sounds_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        match &self.base_path {
            Some(base) if sounds_path.is_relative() => base.join(sounds_path),
            _ => sounds_path,
        }
    }
}

fn parse_duration(
    field: &'static str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.to_string())
            .map_err(|e| ConfigError::Duration {
                field,
                value: value.to_string(),
                reason: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MixerConfig::from_yaml("device: mock").unwrap();

        assert_eq!(config.device(), "mock");
        assert_eq!(config.sample_rate(), 22050);
        assert_eq!(config.channels(), 16);
        assert_eq!(config.slot_capacity(), 48);
        assert_eq!(config.latency().unwrap(), Duration::from_millis(100));
        assert_eq!(config.volume_ramp().unwrap(), Duration::from_millis(250));
        assert_eq!(config.music_percent(), 75.0);
        assert_eq!(config.speech_percent(), 75.0);
        assert_eq!(config.master_percent(), 75.0);
        assert_eq!(config.parrot_percent(), 75.0);
        assert_eq!(config.sounds_path(), PathBuf::from("."));
    }

    #[test]
    fn test_overrides() {
        let yaml = r#"
            device: mock
            sample_rate: 44100
            channels: 12
            latency: 40ms
            slot_capacity: 24
            music_percent: 50.0
            speech_percent: 60.5
            master_percent: 100.0
            parrot_percent: 10.0
            volume_ramp: 1s
            sounds_path: /opt/sounds
        "#;
        let config = MixerConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.channels(), 12);
        assert_eq!(config.slot_capacity(), 24);
        assert_eq!(config.latency().unwrap(), Duration::from_millis(40));
        assert_eq!(config.volume_ramp().unwrap(), Duration::from_secs(1));
        assert_eq!(config.music_percent(), 50.0);
        assert_eq!(config.speech_percent(), 60.5);
        assert_eq!(config.master_percent(), 100.0);
        assert_eq!(config.parrot_percent(), 10.0);
        assert_eq!(config.sounds_path(), PathBuf::from("/opt/sounds"));
    }

    #[test]
    fn test_rejects_small_slot_table() {
        let yaml = r#"
            channels: 16
            slot_capacity: 8
        "#;
        assert!(matches!(
            MixerConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let yaml = "latency: soon";
        assert!(matches!(
            MixerConfig::from_yaml(yaml),
            Err(ConfigError::Duration {
                field: "latency",
                ..
            })
        ));
    }

    #[test]
    fn test_sounds_path_relative_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer.yaml");
        std::fs::write(&path, "device: mock\nsounds_path: waves\n").unwrap();

        let config = MixerConfig::deserialize(&path).unwrap();
        assert_eq!(config.sounds_path(), dir.path().join("waves"));
    }
}
