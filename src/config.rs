//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::keys::ButtonConvention;
use crate::snapshot::MotionSettings;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Give up on a hook that never confirms it is running
    pub start_timeout: Option<Duration>,

    /// Mouse button numbering of the hook backend
    pub convention: ButtonConvention,

    /// Pointer motion settings used for poll responses
    pub motion: MotionSettings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME")
            .or_else(|| lookup("USERPROFILE"))
            .context("neither HOME nor USERPROFILE is set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("input-overlay");

        let socket_path = lookup("INPUT_OVERLAY_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("hook.sock"));

        let start_timeout = parse_var::<u64>(&lookup, "INPUT_OVERLAY_START_TIMEOUT_MS")?
            .map(Duration::from_millis);

        let convention = match lookup("INPUT_OVERLAY_BUTTON_SWAP").as_deref() {
            None => ButtonConvention::native(),
            Some("0") => ButtonConvention::Primary,
            Some("1") => ButtonConvention::Swapped,
            Some(other) => bail!("INPUT_OVERLAY_BUTTON_SWAP must be 0 or 1, got {:?}", other),
        };

        let defaults = MotionSettings::default();
        let motion = MotionSettings {
            dead_zone: parse_var(&lookup, "INPUT_OVERLAY_DEAD_ZONE")?.unwrap_or(defaults.dead_zone),
            max_movement: parse_var(&lookup, "INPUT_OVERLAY_MAX_MOVEMENT")?
                .unwrap_or(defaults.max_movement),
            center: lookup("INPUT_OVERLAY_CENTER")
                .map(|value| parse_center(&value))
                .transpose()
                .context("invalid INPUT_OVERLAY_CENTER")?,
        };

        Ok(Self {
            socket_path,
            data_dir,
            start_timeout,
            convention,
            motion,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid {}: {:?}", key, value))
        })
        .transpose()
}

fn parse_center(value: &str) -> Result<(i32, i32)> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected \"x,y\", got {:?}", value))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[("HOME", "/home/user")]).unwrap();
        assert_eq!(
            config.socket_path,
            PathBuf::from("/home/user/.local/share/input-overlay/hook.sock")
        );
        assert_eq!(config.start_timeout, None);
        assert_eq!(config.convention, ButtonConvention::native());
        assert_eq!(config.motion, MotionSettings::default());
    }

    #[test]
    fn test_config_falls_back_to_userprofile() {
        let config = load(&[("USERPROFILE", "/users/me")]).unwrap();
        assert!(config.data_dir.starts_with("/users/me"));
    }

    #[test]
    fn test_config_overrides() {
        let config = load(&[
            ("HOME", "/home/user"),
            ("INPUT_OVERLAY_SOCKET", "/tmp/overlay.sock"),
            ("INPUT_OVERLAY_START_TIMEOUT_MS", "2500"),
            ("INPUT_OVERLAY_BUTTON_SWAP", "0"),
            ("INPUT_OVERLAY_DEAD_ZONE", "4"),
            ("INPUT_OVERLAY_MAX_MOVEMENT", "120"),
            ("INPUT_OVERLAY_CENTER", "960, 540"),
        ])
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/overlay.sock"));
        assert_eq!(config.start_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.convention, ButtonConvention::Primary);
        assert_eq!(config.motion.dead_zone, 4);
        assert_eq!(config.motion.max_movement, 120);
        assert_eq!(config.motion.center, Some((960, 540)));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[("HOME", "/h"), ("INPUT_OVERLAY_BUTTON_SWAP", "yes")]).is_err());
        assert!(load(&[("HOME", "/h"), ("INPUT_OVERLAY_START_TIMEOUT_MS", "-1")]).is_err());
        assert!(load(&[("HOME", "/h"), ("INPUT_OVERLAY_CENTER", "12")]).is_err());
    }
}
