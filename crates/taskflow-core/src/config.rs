#[cfg(feature = "native")]
use std::fs;
#[cfg(feature = "native")]
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Duration;
use serde::{
  Deserialize,
  Serialize
};
use tracing::debug;
#[cfg(feature = "native")]
use tracing::{
  info,
  warn
};

use crate::scheduler::SchedulerConfig;
use crate::storage::DEFAULT_STORAGE_KEY;

#[cfg(feature = "native")]
pub const CONFIG_FILE: &str = "taskflow.toml";
#[cfg(feature = "native")]
pub const CONFIG_ENV: &str = "TASKFLOW_CONFIG";

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub data_dir:      Option<String>,
  pub storage_key:   String,
  pub color:         bool,
  pub notifications: NotificationSettings
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_dir:      None,
      storage_key:   DEFAULT_STORAGE_KEY
        .to_string(),
      color:         true,
      notifications:
        NotificationSettings::default()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationSettings {
  pub enabled:             bool,
  pub sweep_period_secs:   u64,
  pub renotify_after_secs: u64,
  pub toast_secs:          u64
}

impl Default for NotificationSettings {
  fn default() -> Self {
    Self {
      enabled:             true,
      sweep_period_secs:   60,
      renotify_after_secs: 3600,
      toast_secs:          5
    }
  }
}

impl NotificationSettings {
  pub fn scheduler_config(
    &self
  ) -> SchedulerConfig {
    SchedulerConfig {
      sweep_period:   secs(
        self.sweep_period_secs.max(1)
      ),
      renotify_after: secs(
        self.renotify_after_secs
      ),
      toast_duration: secs(self.toast_secs)
    }
  }
}

/// Upper bound for every `*_secs` setting: 100 years.
pub const MAX_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn secs(value: u64) -> Duration {
  i64::try_from(value.min(MAX_SECS))
    .ok()
    .and_then(Duration::try_seconds)
    .unwrap_or(Duration::MAX)
}

impl NotificationSettings {
  fn validate(&self) -> anyhow::Result<()> {
    check_secs(
      "notifications.sweep_period_secs",
      self.sweep_period_secs
    )?;
    check_secs(
      "notifications.renotify_after_secs",
      self.renotify_after_secs
    )?;
    check_secs(
      "notifications.toast_secs",
      self.toast_secs
    )?;
    Ok(())
  }
}

impl Config {
  pub fn from_toml(
    text: &str
  ) -> anyhow::Result<Self> {
    let cfg: Self = toml::from_str(text)
      .context("invalid taskflow config")?;
    cfg.notifications.validate()?;
    Ok(cfg)
  }

  /// Loads the config file, or defaults when none exists.
  #[cfg(feature = "native")]
  #[tracing::instrument(skip(
    path_override
  ))]
  pub fn load(
    path_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let Some(path) =
      resolve_config_path(path_override)?
    else {
      warn!(
        "no config file found; using \
         defaults"
      );
      return Ok(Self::default());
    };

    info!(config = %path.display(), "loading config");
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    Self::from_toml(&text).with_context(
      || format!("in {}", path.display())
    )
  }

  /// Applies `key=value` overrides. Nested keys use dots, as in
  /// `notifications.toast_secs`.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      debug!(key = %key, value = %value, "applying override");
      self.set(&key, &value)?;
    }
    Ok(())
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let n = &mut self.notifications;
    match key {
      | "data_dir" => {
        self.data_dir =
          Some(value.to_string());
      }
      | "storage_key" => {
        if value.trim().is_empty() {
          return Err(anyhow!(
            "storage_key cannot be empty"
          ));
        }
        self.storage_key = value.to_string();
      }
      | "color" => {
        self.color = parse_bool(key, value)?;
      }
      | "notifications.enabled" => {
        n.enabled = parse_bool(key, value)?;
      }
      | "notifications.sweep_period_secs" => {
        n.sweep_period_secs =
          parse_secs(key, value)?;
      }
      | "notifications.renotify_after_secs" => {
        n.renotify_after_secs =
          parse_secs(key, value)?;
      }
      | "notifications.toast_secs" => {
        n.toast_secs = parse_secs(key, value)?;
      }
      | other => {
        return Err(anyhow!(
          "unknown config key: {other}"
        ));
      }
    }
    Ok(())
  }
}

/// Directory the file storage lives in: `--data`, then `data_dir`
/// from the config, then the platform data directory.
#[cfg(feature = "native")]
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  if let Some(path) = override_dir {
    return Ok(path.to_path_buf());
  }
  if let Some(dir) = &cfg.data_dir {
    return Ok(expand_tilde(Path::new(dir)));
  }
  let base = dirs::data_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine data directory"
    )
  })?;
  Ok(base.join("taskflow"))
}

#[cfg(feature = "native")]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(env_path) =
    std::env::var(CONFIG_ENV)
  {
    if env_path == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      env_path
    )));
  }

  let Some(base) = dirs::config_dir() else {
    return Ok(None);
  };
  let candidate =
    base.join("taskflow").join(CONFIG_FILE);
  Ok(candidate.exists().then_some(candidate))
}

#[cfg(feature = "native")]
fn expand_tilde(path: &Path) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) = text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(
  key: &str,
  value: &str
) -> anyhow::Result<bool> {
  match value
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on" | "true" => {
      Ok(true)
    }
    | "0" | "n" | "no" | "off" | "false" => {
      Ok(false)
    }
    | other => {
      Err(anyhow!(
        "invalid boolean for {key}: {other}"
      ))
    }
  }
}

fn parse_secs(
  key: &str,
  value: &str
) -> anyhow::Result<u64> {
  let secs = value
    .trim()
    .parse::<u64>()
    .with_context(|| {
      format!("invalid seconds for {key}")
    })?;
  check_secs(key, secs)
}

fn check_secs(
  key: &str,
  secs: u64
) -> anyhow::Result<u64> {
  if secs > MAX_SECS {
    return Err(anyhow!(
      "{key} must be at most {MAX_SECS} seconds"
    ));
  }
  Ok(secs)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_reminder_timings() {
    let cfg = Config::default();
    let sched =
      cfg.notifications.scheduler_config();
    assert_eq!(
      sched.sweep_period,
      Duration::seconds(60)
    );
    assert_eq!(
      sched.renotify_after,
      Duration::hours(1)
    );
    assert_eq!(
      sched.toast_duration,
      Duration::seconds(5)
    );
    assert_eq!(cfg.storage_key, "taskflow-data");
  }

  #[test]
  fn toml_file_overrides_defaults() {
    let cfg = Config::from_toml(
      r#"
data_dir = "/tmp/tf"
color = false

[notifications]
renotify_after_secs = 600
"#
    )
    .unwrap();
    assert_eq!(cfg.data_dir.as_deref(), Some("/tmp/tf"));
    assert!(!cfg.color);
    assert_eq!(cfg.notifications.renotify_after_secs, 600);
    assert_eq!(cfg.notifications.sweep_period_secs, 60);
    assert!(Config::from_toml("colour = true").is_err());
  }

  #[test]
  fn overrides_use_dotted_keys() {
    let mut cfg = Config::default();
    cfg
      .apply_overrides(vec![
        (
          "notifications.toast_secs".to_string(),
          "9".to_string()
        ),
        ("color".to_string(), "off".to_string()),
      ])
      .unwrap();
    assert_eq!(cfg.notifications.toast_secs, 9);
    assert!(!cfg.color);

    assert!(cfg.set("nope", "1").is_err());
    assert!(
      cfg
        .set("notifications.enabled", "maybe")
        .is_err()
    );
  }

  #[test]
  fn oversized_intervals_are_rejected() {
    let mut cfg = Config::default();
    assert!(
      cfg
        .set(
          "notifications.renotify_after_secs",
          "9223372036854775807"
        )
        .is_err()
    );
    assert_eq!(cfg.notifications.renotify_after_secs, 3600);
    assert!(
      Config::from_toml(
        "[notifications]\nsweep_period_secs = 9223372036854775807\n"
      )
      .is_err()
    );

    cfg
      .set(
        "notifications.toast_secs",
        &MAX_SECS.to_string()
      )
      .unwrap();
    let sched =
      cfg.notifications.scheduler_config();
    assert_eq!(
      sched.toast_duration,
      Duration::days(36_500)
    );
  }
}
