//! Language configuration for the form engine
//!
//! The engine never reads ambient global state: a `LanguageConfig` value is
//! passed explicitly into every builder. This module supports loading one
//! from:
//! - Default values
//! - Config file (forms.toml)
//! - Environment variables (FORMSYNC_*)
//!
//! ## Example config file (forms.toml):
//! ```toml
//! default_language = "en"
//!
//! [[languages]]
//! code = "en"
//! name = "English"
//!
//! [[languages]]
//! code = "ar"
//! name = "Arabic"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// A single configured language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Language code used as the translation-row key (e.g., "en")
    pub code: String,

    /// Display name (e.g., "English")
    pub name: String,
}

impl Language {
    /// Create a new language entry
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// The per-engine language list
///
/// Every multilanguage field produces exactly one content-variant row per
/// entry in `languages` on each save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Configured languages, in display order
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,

    /// Language used when resolving display labels
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            default_language: default_language(),
        }
    }
}

impl LanguageConfig {
    /// Create a config from an explicit language list
    pub fn new(languages: Vec<Language>, default_language: impl Into<String>) -> Self {
        Self {
            languages,
            default_language: default_language.into(),
        }
    }

    /// Iterate configured language codes in order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.languages.iter().map(|l| l.code.as_str())
    }

    /// Whether a language code is configured
    pub fn contains(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l.code == code)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["forms.toml", ".forms.toml", "config/forms.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "formsync") {
            let xdg_config = config_dir.config_dir().join("forms.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (FORMSYNC_*)
        builder = builder.add_source(
            Environment::with_prefix("FORMSYNC")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

// Default value functions
fn default_languages() -> Vec<Language> {
    vec![
        Language::new("en", "English"),
        Language::new("ar", "Arabic"),
    ]
}

fn default_language() -> String {
    "en".to_string()
}
