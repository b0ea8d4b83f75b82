//! Session configuration loaded from TOML.
//!
//! ```toml
//! keep_blanks = false
//! set = ["nocdata"]
//! clear = ["nobasefix"]
//!
//! [xinclude]
//! process = true
//! generate_nodes = false
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use xmldom_engine::ParseFlags;

use crate::options::{ParserOptions, XIncludeOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown parser option \"{0}\"")]
    UnknownOption(String),
}

/// Everything a [`ParseSession`](crate::ParseSession) can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    /// Keep whitespace-only text nodes.
    pub keep_blanks: bool,
    pub xinclude: XIncludeOptions,
    /// Parser options forced on, by name.
    pub set: Vec<String>,
    /// Parser options forced off, by name.
    pub clear: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            keep_blanks: true,
            xinclude: XIncludeOptions::default(),
            set: Vec::new(),
            clear: Vec::new(),
        }
    }
}

impl ParserConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.parser_options()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded parser config");
        Self::from_toml_str(&content)
    }

    /// The `set`/`clear` name lists as override masks.
    pub fn parser_options(&self) -> Result<ParserOptions, ConfigError> {
        Ok(ParserOptions::new(
            flags_from_names(&self.set)?,
            flags_from_names(&self.clear)?,
        ))
    }
}

fn flags_from_names(names: &[String]) -> Result<ParseFlags, ConfigError> {
    names.iter().try_fold(ParseFlags::NONE, |flags, name| {
        ParseFlags::from_name(name)
            .map(|flag| flags | flag)
            .ok_or_else(|| ConfigError::UnknownOption(name.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(ParserConfig::from_toml_str("").unwrap(), ParserConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = ParserConfig::from_toml_str(
            r#"
keep_blanks = false
set = ["nocdata", "NoBlanks"]
clear = ["nobasefix"]

[xinclude]
process = true
generate_nodes = false
"#,
        )
        .unwrap();

        assert!(!config.keep_blanks);
        assert_eq!(config.xinclude, XIncludeOptions::new(true, false, true));

        let options = config.parser_options().unwrap();
        assert_eq!(options.set, ParseFlags::NOCDATA | ParseFlags::NOBLANKS);
        assert_eq!(options.clear, ParseFlags::NOBASEFIX);
    }

    #[test]
    fn test_unknown_option_name() {
        let err = ParserConfig::from_toml_str(r#"set = ["recover"]"#).unwrap_err();
        assert_eq!(err.to_string(), "unknown parser option \"recover\"");
    }

    #[test]
    fn test_unknown_key() {
        let err = ParserConfig::from_toml_str("validate = true").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xmldom.toml");
        std::fs::write(&path, "[xinclude]\nprocess = true\n").unwrap();

        let config = ParserConfig::from_file(&path).unwrap();
        assert!(config.xinclude.process);

        let missing = ParserConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
