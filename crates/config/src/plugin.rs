//! Plugin configuration documents.
//!
//! Each command or scheduled task may own a file named after its identifier,
//! e.g. `<root>/slack/weather.yaml`. A document is decoded on top of the
//! plugin's current config value, so keys missing from the file keep their
//! current values.

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result};

/// Supported plugin config encodings, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

/// File extensions recognised for plugin configs, in lookup order.
pub const SUPPORTED_EXTENSIONS: &[(&str, ConfigFormat)] = &[
    ("yaml", ConfigFormat::Yaml),
    ("yml", ConfigFormat::Yaml),
    ("json", ConfigFormat::Json),
];

impl ConfigFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        SUPPORTED_EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, format)| *format)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Resolve a changed file to the plugin identifier it configures.
///
/// Returns `None` for files without a supported extension.
pub fn plugin_id_from_path(path: &Path) -> Option<String> {
    ConfigFormat::from_path(path)?;
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Raw contents of one plugin config file.
#[derive(Debug, Clone)]
pub struct RawConfig {
    pub path: PathBuf,
    pub format: ConfigFormat,
    pub body: String,
}

impl RawConfig {
    /// Build from in-memory text; mainly useful for tests and custom watchers.
    pub fn new(path: impl Into<PathBuf>, format: ConfigFormat, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format,
            body: body.into(),
        }
    }

    /// Read a plugin config file, inferring the format from its extension.
    pub fn read(path: &Path) -> Result<Self> {
        let format =
            ConfigFormat::from_path(path).ok_or_else(|| Error::unsupported_format(path))?;
        let body = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
        Ok(Self::new(path, format, body))
    }

    /// Find `<dir>/<id>.{yaml,yml,json}` and read the first one present.
    pub fn find(dir: &Path, id: &str) -> Result<Option<Self>> {
        for (ext, _) in SUPPORTED_EXTENSIONS {
            let candidate = dir.join(format!("{id}.{ext}"));
            if candidate.is_file() {
                return Self::read(&candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// Decode the document as a standalone value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        match self.format {
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(&self.body)?),
            ConfigFormat::Json => Ok(serde_json::from_str(&self.body)?),
        }
    }

    /// Decode the document on top of `current`.
    ///
    /// Object keys present in the file replace the corresponding fields of
    /// `current` (recursively); everything else is carried over.
    pub fn merge_into<T>(&self, current: &T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut base = serde_json::to_value(current)?;
        let overlay: serde_json::Value = if self.body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            self.parse()?
        };
        merge_values(&mut base, overlay);
        serde_json::from_value(base).map_err(|source| Error::InvalidPluginConfig {
            path: self.path.clone(),
            source,
        })
    }
}

fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base.insert(key, value);
                    },
                }
            }
        },
        // An empty document (`null`) leaves the current value untouched.
        (_, serde_json::Value::Null) => {},
        (slot, value) => *slot = value,
    }
}
