use std::path::PathBuf;

use clap::Args;
use log::error;

use crate::config::{settings_path, ConfigError, Framing, Settings};

/// Link options shared by the GUI and the command-line tool.
#[derive(Args, Debug, Clone, Default)]
pub struct LinkArgs {
    /// Settings file (defaults to ./serial-wave.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Serial device, e.g. /dev/ttyACM0 or COM3
    #[arg(long)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud: Option<u32>,
    /// How the byte stream is split into records: line or chunk
    #[arg(long)]
    pub framing: Option<Framing>,
    /// Idle animation starts after this long without input
    #[arg(long)]
    pub fallback_ms: Option<u64>,
}

impl LinkArgs {
    /// File settings first, then any flag given on the command line.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::load_from(&settings_path())?,
        };
        self.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    /// Like [`LinkArgs::resolve`], but never fails. An unreadable file leaves the flags
    /// applied to the defaults; flags that fail validation are dropped too.
    pub fn resolve_or_default(&self) -> Settings {
        let err = match self.resolve() {
            Ok(settings) => return settings,
            Err(e) => e,
        };
        error!("{}; using default settings", err);
        let mut settings = Settings::default();
        self.apply(&mut settings);
        match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                error!("{}; ignoring command-line overrides", e);
                Settings::default()
            }
        }
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(framing) = self.framing {
            settings.framing = framing;
        }
        if let Some(ms) = self.fallback_ms {
            settings.fallback_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let mut settings = Settings::default();
        let args = LinkArgs {
            port: Some("COM4".to_string()),
            baud: Some(115_200),
            framing: Some(Framing::Chunk),
            ..LinkArgs::default()
        };
        args.apply(&mut settings);
        assert_eq!(settings.port.as_deref(), Some("COM4"));
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.framing, Framing::Chunk);
        assert_eq!(settings.fallback_ms, 1000);
    }

    #[test]
    fn zero_baud_flag_fails_validation() {
        let path = std::env::temp_dir().join(format!("serial-wave-cli-{}.json", std::process::id()));
        std::fs::write(&path, "{}").unwrap();
        let args = LinkArgs {
            config: Some(path.clone()),
            baud: Some(0),
            ..LinkArgs::default()
        };
        let result = args.resolve();
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    fn broken_config(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("serial-wave-{}-{}.json", name, std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        path
    }

    #[test]
    fn unreadable_file_keeps_valid_flags() {
        let path = broken_config("broken-keep");
        let args = LinkArgs {
            config: Some(path.clone()),
            baud: Some(57_600),
            ..LinkArgs::default()
        };
        let settings = args.resolve_or_default();
        std::fs::remove_file(&path).ok();
        assert_eq!(settings.baud_rate, 57_600);
    }

    #[test]
    fn unreadable_file_with_invalid_flags_gives_defaults() {
        let path = broken_config("broken-invalid");
        let args = LinkArgs {
            config: Some(path.clone()),
            port: Some("COM4".to_string()),
            baud: Some(0),
            ..LinkArgs::default()
        };
        let settings = args.resolve_or_default();
        std::fs::remove_file(&path).ok();
        assert_eq!(settings, Settings::default());
        assert!(settings.validate().is_ok());
    }
}
