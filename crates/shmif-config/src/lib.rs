//! Broker whitelist and connection-point policy, loaded the way
//! `core-config` loads editor settings: TOML with `serde` defaults,
//! tolerant of a missing or unparsable file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Device-access mode a whitelist entry grants. Matches the original
/// broker's bitflag-combinable modes (`MODE_PREFIX|MODE_TTY` style),
/// modeled here as a small set rather than raw bits since the broker
/// only ever checks membership, never arithmetic on the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// Exact path match.
    Exact,
    /// Path-prefix match (`/dev/input/event3` matches `/dev/input/`).
    Prefix,
    /// Prefix match that additionally grants DRM master on open.
    Drm,
    /// Prefix match that additionally permits `TIOCSCTTY`/VT ioctls.
    Tty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistEntry {
    pub path: String,
    pub mode: DeviceMode,
}

fn default_whitelist() -> Vec<WhitelistEntry> {
    vec![
        WhitelistEntry { path: "/dev/input/".into(), mode: DeviceMode::Prefix },
        WhitelistEntry { path: "/dev/dri/".into(), mode: DeviceMode::Drm },
        WhitelistEntry { path: "/sys/class/backlight/".into(), mode: DeviceMode::Prefix },
        WhitelistEntry { path: "/dev/tty".into(), mode: DeviceMode::Tty },
    ]
}

fn default_keylimit() -> usize {
    32
}

fn default_max_width() -> u32 {
    shmif_proto::layout::MAX_W
}

fn default_max_height() -> u32 {
    shmif_proto::layout::MAX_H
}

fn default_resize_timeout_ms() -> u64 {
    2_000
}

/// On-disk configuration shape. Every field has a default so a partial or
/// absent file is never a hard error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default = "default_whitelist")]
    pub whitelist: Vec<WhitelistEntry>,
    #[serde(default = "default_keylimit")]
    pub connpoint_keylimit: usize,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_resize_timeout_ms")]
    pub resize_timeout_ms: u64,
}

impl ConfigFile {
    fn with_defaults() -> Self {
        ConfigFile {
            whitelist: default_whitelist(),
            connpoint_keylimit: default_keylimit(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            resize_timeout_ms: default_resize_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub file: ConfigFile,
}

impl Default for Config {
    fn default() -> Self {
        Config { file: ConfigFile::with_defaults() }
    }
}

/// Looks for `shmif.toml` in the current directory first, then in the
/// platform config directory (`$XDG_CONFIG_HOME/shmif/config.toml` and
/// friends via the `dirs` crate).
pub fn discover() -> Option<PathBuf> {
    let local = PathBuf::from("shmif.toml");
    if local.is_file() {
        return Some(local);
    }
    let xdg = dirs::config_dir()?.join("shmif").join("config.toml");
    if xdg.is_file() {
        return Some(xdg);
    }
    None
}

/// Loads configuration from `path`. A missing file or a file that fails
/// to parse both fall back to [`Config::default`] rather than failing
/// startup — a broker with no working config still has a safe, minimal
/// whitelist to run with.
pub fn load_from(path: &Path) -> Config {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(target: "shmif.config", path = %path.display(), %err, "could not read config file, using defaults");
            return Config::default();
        }
    };
    match toml::from_str::<ConfigFile>(&raw) {
        Ok(file) => Config { file },
        Err(err) => {
            tracing::warn!(target: "shmif.config", path = %path.display(), %err, "could not parse config file, using defaults");
            Config::default()
        }
    }
}

/// Convenience wrapper: [`discover`] then [`load_from`], or defaults if
/// nothing was found.
pub fn load() -> Config {
    match discover() {
        Some(path) => load_from(&path),
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_from(Path::new("/nonexistent/shmif.toml"));
        assert_eq!(cfg.file.connpoint_keylimit, default_keylimit());
    }

    #[test]
    fn parses_whitelist_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shmif.toml");
        std::fs::write(
            &path,
            r#"
            connpoint_keylimit = 16

            [[whitelist]]
            path = "/dev/dri/card0"
            mode = "drm"
            "#,
        )
        .unwrap();

        let cfg = load_from(&path);
        assert_eq!(cfg.file.connpoint_keylimit, 16);
        assert_eq!(cfg.file.whitelist.len(), 1);
        assert_eq!(cfg.file.whitelist[0].mode, DeviceMode::Drm);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shmif.toml");
        std::fs::write(&path, "not = [valid toml").unwrap();
        let cfg = load_from(&path);
        assert_eq!(cfg.file.connpoint_keylimit, default_keylimit());
    }
}
