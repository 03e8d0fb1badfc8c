use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result, env_subst::substitute_env, schema::SarahConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["sarah.toml", "sarah.yaml", "sarah.yml", "sarah.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SarahConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    let config = parse_config(&raw, path)?;
    config.validate()?;
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./sarah.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/sarah/sarah.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SarahConfig::default()` if no config file is found or the one
/// found cannot be loaded.
pub fn discover_and_load() -> SarahConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    SarahConfig::default()
}

/// Returns the user-global config directory (`~/.config/sarah/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sarah").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<SarahConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::unsupported_format(path)),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarah.toml");
        std::fs::write(
            &path,
            "[runner]\ntimezone = \"Asia/Tokyo\"\n\n[worker]\nqueue_size = 3\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.runner.timezone, "Asia/Tokyo");
        assert_eq!(cfg.worker.queue_size, 3);
        assert_eq!(cfg.worker.worker_num, 100);
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarah.yaml");
        std::fs::write(
            &path,
            "runner:\n  plugin_config_root: /etc/sarah/plugins\ncontext_cache:\n  expires_in_secs: 30\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(
            cfg.runner.plugin_config_root.as_deref(),
            Some(Path::new("/etc/sarah/plugins"))
        );
        assert_eq!(cfg.context_cache.expires_in_secs, 30);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarah.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here/sarah.toml")).unwrap_err();
        assert!(err.to_string().starts_with("failed to read"));
    }
}
