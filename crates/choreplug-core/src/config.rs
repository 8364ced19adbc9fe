use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_API_BASE: &str = "https://tasklist-backend-8eky.onrender.com";

/// Settings from the rc file (`key = value` lines) plus overrides.
#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    pub fn defaults() -> Self {
        let mut cfg = Config {
            map: HashMap::new(),
            loaded_files: vec![],
        };

        cfg.map
            .insert("data.location".to_string(), "~/.choreplug".to_string());
        cfg.map
            .insert("default.command".to_string(), "today".to_string());
        cfg.map.insert("color".to_string(), "on".to_string());
        cfg.map
            .insert("api.base".to_string(), DEFAULT_API_BASE.to_string());
        cfg
    }

    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Self::defaults();

        let rc = resolve_rc_path(rc_override)?;
        if let Some(path) = rc {
            info!(rc = %path.display(), "loading rc file");
            cfg.load_file(&path)?;
        } else {
            warn!("no choreplugrc found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    /// Reads an on/off switch; an unrecognised value is an error.
    pub fn get_bool(&self, key: &str) -> anyhow::Result<Option<bool>> {
        self.map
            .get(key)
            .map(|v| parse_bool(v).ok_or_else(|| anyhow!("invalid {key} setting: {v}")))
            .transpose()
    }

    pub fn api_base(&self) -> String {
        self.get("api.base")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
    }

    /// `http.timeout` in seconds; unset means the transport default.
    pub fn http_timeout(&self) -> anyhow::Result<Option<Duration>> {
        let Some(raw) = self.get("http.timeout") else {
            return Ok(None);
        };
        let secs: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid http.timeout: {raw}"))?;
        Ok(Some(Duration::from_secs(secs)))
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }

            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(&base_dir, include_rest.trim())?;
                debug!(
                    file = %path.display(),
                    include = %include_path.display(),
                    line = line_num + 1,
                    "processing include"
                );

                if include_path.exists() {
                    self.load_file(&include_path)?;
                } else {
                    warn!(
                        include = %include_path.display(),
                        "include file does not exist; skipping"
                    );
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[tracing::instrument(skip(override_path))]
fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(rc_env) = std::env::var("CHOREPLUGRC") {
        if rc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(rc_env)));
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let candidate = home.join(".choreplugrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".choreplug"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let raw = PathBuf::from(include);
    let expanded = expand_tilde(&raw);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn rc_file_with_comments_includes_and_overrides() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("extra.rc"), "http.timeout = 5\n").expect("write include");
        let rc = temp.path().join("choreplugrc");
        fs::write(
            &rc,
            "# plug settings\n\
             api.base = https://relay.example # hosted\n\
             color=off\n\
             include extra.rc\n\
             include missing.rc\n",
        )
        .expect("write rc");

        let mut cfg = Config::load(Some(&rc)).expect("load rc");
        assert_eq!(cfg.api_base(), "https://relay.example");
        assert_eq!(cfg.get_bool("color").expect("color"), Some(false));
        assert_eq!(cfg.http_timeout().expect("timeout"), Some(Duration::from_secs(5)));
        assert_eq!(cfg.loaded_files.len(), 2);

        cfg.apply_overrides([("rc.color".to_string(), "on".to_string())]);
        assert_eq!(cfg.get_bool("color").expect("color"), Some(true));
    }

    #[test]
    fn unrecognised_switch_is_an_error() {
        let mut cfg = Config::defaults();
        assert_eq!(cfg.get_bool("missing").expect("unset"), None);

        cfg.apply_overrides([("color".to_string(), "sometimes".to_string())]);
        let err = cfg.get_bool("color").expect_err("should fail");
        assert_eq!(err.to_string(), "invalid color setting: sometimes");
    }

    #[test]
    fn defaults_have_no_timeout_and_hosted_api() {
        let cfg = Config::defaults();
        assert_eq!(cfg.http_timeout().expect("timeout"), None);
        assert_eq!(cfg.api_base(), DEFAULT_API_BASE);
        assert_eq!(cfg.get("default.command").as_deref(), Some("today"));
    }

    #[test]
    fn malformed_line_names_file_and_line() {
        let temp = tempdir().expect("tempdir");
        let rc = temp.path().join("bad.rc");
        fs::write(&rc, "color = on\njust words\n").expect("write rc");

        let err = Config::load(Some(&rc)).expect_err("should fail");
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn bad_timeout_is_an_error() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("http.timeout".to_string(), "soon".to_string())]);
        assert!(cfg.http_timeout().is_err());
    }
}
