use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Outage;
use crate::error::{AppError, PLUGIN_CONFIGURATION};

fn default_warning_duration() -> i64 {
    3_600
}

fn default_wait_max_sleep() -> i64 {
    crate::automation::DEFAULT_MAX_SLEEP
}

fn default_title() -> String {
    "System maintenance".to_string()
}

fn default_description() -> String {
    "The site is unavailable from {{start}} to {{stop}} ({{duration}}).".to_string()
}

/// Site-wide outage settings, read from a TOML file. Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Planned length of a new outage. Automation refuses to run without it.
    #[serde(default)]
    pub default_duration: Option<i64>,
    #[serde(default = "default_warning_duration")]
    pub default_warning_duration: i64,
    #[serde(default)]
    pub default_autostart: bool,
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_description")]
    pub default_description: String,
    #[serde(default = "default_wait_max_sleep")]
    pub wait_max_sleep: i64,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub static_page_path: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            default_duration: None,
            default_warning_duration: default_warning_duration(),
            default_autostart: false,
            default_title: default_title(),
            default_description: default_description(),
            wait_max_sleep: default_wait_max_sleep(),
            database_path: None,
            static_page_path: None,
        }
    }
}

impl PluginConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| {
            AppError::configuration("Invalid outage configuration").with_details(e.to_string())
        })
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(PLUGIN_CONFIGURATION, "Failed to read outage configuration")
                .with_details(format!("path={}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Fails with `PLUGIN_CONFIGURATION` unless the settings automation depends on are present.
    pub fn require_ready(&self) -> Result<i64, AppError> {
        match self.default_duration {
            Some(d) if d > 0 => Ok(d),
            Some(d) => Err(AppError::new(
                PLUGIN_CONFIGURATION,
                "Default outage duration must be positive",
            )
            .with_details(format!("default_duration={d}"))),
            None => Err(AppError::new(
                PLUGIN_CONFIGURATION,
                "Default outage duration is not configured",
            )),
        }
    }
}

/// Options recognised by the `create` automation command. Offsets are seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Seconds from now until the outage starts. Required.
    pub start: Option<i64>,
    pub duration: Option<i64>,
    /// Warning lead time before `start`.
    pub warn: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub autostart: Option<bool>,
    /// Copy title, description, durations and autostart from this outage.
    pub clone: Option<i64>,
    /// Print only the new id.
    pub only_id: bool,
    /// Wait for the new outage to start before returning.
    pub block: bool,
}

fn parse_seconds(key: &str, value: &str) -> Result<i64, AppError> {
    value.trim().parse::<i64>().map_err(|e| {
        AppError::invalid_argument(format!("Option {key} must be a whole number of seconds"))
            .with_details(format!("value={value}; err={e}"))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        other => Err(AppError::invalid_argument(format!("Option {key} must be a boolean"))
            .with_details(format!("value={other}"))),
    }
}

impl CreateOptions {
    /// Build from `key=value` style pairs. Unknown keys fail with `CONFIGURATION`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut opts = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "start" => opts.start = Some(parse_seconds(key, value)?),
                "duration" => opts.duration = Some(parse_seconds(key, value)?),
                "warn" => opts.warn = Some(parse_seconds(key, value)?),
                "title" => opts.title = Some(value.to_string()),
                "description" => opts.description = Some(value.to_string()),
                "autostart" => opts.autostart = Some(parse_flag(key, value)?),
                "clone" => opts.clone = Some(parse_seconds(key, value)?),
                "onlyid" | "only_id" => opts.only_id = parse_flag(key, value)?,
                "block" => opts.block = parse_flag(key, value)?,
                other => {
                    return Err(AppError::configuration("Unknown create option")
                        .with_details(other.to_string()))
                }
            }
        }
        Ok(opts)
    }

    /// Build from `key=value` strings; a bare `key` is a flag set to true.
    pub fn from_assignments<I, S>(items: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = items
            .into_iter()
            .map(|item| match item.as_ref().split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.to_string()),
                None => (item.as_ref().trim().to_string(), String::new()),
            })
            .collect();
        Self::from_pairs(pairs)
    }

    /// Turn the options into an unsaved outage, filling gaps from `source` (when cloning) and
    /// then from `config`.
    pub fn build_outage(
        &self,
        config: &PluginConfig,
        now: i64,
        source: Option<&Outage>,
    ) -> Result<Outage, AppError> {
        let configured_duration = config.require_ready()?;

        let start = self
            .start
            .ok_or_else(|| AppError::invalid_argument("Option start is required"))?;
        if start < 0 {
            return Err(AppError::invalid_argument("Option start must not be negative")
                .with_details(format!("start={start}")));
        }

        let duration = self
            .duration
            .or_else(|| source.and_then(Outage::duration_planned))
            .unwrap_or(configured_duration);
        if duration <= 0 {
            return Err(AppError::invalid_argument("Option duration must be positive")
                .with_details(format!("duration={duration}")));
        }

        let warn = self
            .warn
            .or_else(|| source.and_then(Outage::warning_duration))
            .unwrap_or(config.default_warning_duration);
        if warn < 0 {
            return Err(AppError::invalid_argument("Option warn must not be negative")
                .with_details(format!("warn={warn}")));
        }

        let title = self
            .title
            .clone()
            .or_else(|| source.and_then(|s| s.title.clone()))
            .unwrap_or_else(|| config.default_title.clone());
        let description = self
            .description
            .clone()
            .or_else(|| source.and_then(|s| s.description.clone()))
            .unwrap_or_else(|| config.default_description.clone());
        let autostart = self
            .autostart
            .or_else(|| source.and_then(|s| s.autostart))
            .unwrap_or(config.default_autostart);

        let out_of_range = || {
            AppError::invalid_argument("Outage window is out of range").with_details(format!(
                "now={now}; start={start}; duration={duration}; warn={warn}"
            ))
        };
        let starttime = now.checked_add(start).ok_or_else(out_of_range)?;
        let warntime = starttime.checked_sub(warn).ok_or_else(out_of_range)?;
        let stoptime = starttime.checked_add(duration).ok_or_else(out_of_range)?;
        Ok(Outage {
            autostart: Some(autostart),
            warntime: Some(warntime),
            starttime: Some(starttime),
            stoptime: Some(stoptime),
            title: Some(title),
            description: Some(description),
            ..Outage::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ready_config() -> PluginConfig {
        PluginConfig {
            default_duration: Some(7_200),
            ..PluginConfig::default()
        }
    }

    #[test]
    fn toml_defaults_and_unknown_keys() {
        let cfg = PluginConfig::from_toml_str("default_duration = 1800\n").unwrap();
        assert_eq!(cfg.default_duration, Some(1_800));
        assert_eq!(cfg.default_warning_duration, 3_600);
        assert_eq!(cfg.wait_max_sleep, 300);

        let err = PluginConfig::from_toml_str("default_duraton = 1800\n").unwrap_err();
        assert_eq!(err.code, "CONFIGURATION");
    }

    #[test]
    fn missing_default_duration_is_a_plugin_configuration_error() {
        let err = PluginConfig::default().require_ready().unwrap_err();
        assert_eq!(err.code, "PLUGIN_CONFIGURATION");
        let err = CreateOptions {
            start: Some(60),
            ..CreateOptions::default()
        }
        .build_outage(&PluginConfig::default(), 1_000, None)
        .unwrap_err();
        assert_eq!(err.code, "PLUGIN_CONFIGURATION");
    }

    #[test]
    fn from_pairs_parses_known_options() {
        let opts = CreateOptions::from_pairs([
            ("start", "600"),
            ("duration", "1200"),
            ("warn", "300"),
            ("title", "Upgrade"),
            ("autostart", "yes"),
            ("onlyid", ""),
        ])
        .unwrap();
        assert_eq!(
            opts,
            CreateOptions {
                start: Some(600),
                duration: Some(1_200),
                warn: Some(300),
                title: Some("Upgrade".to_string()),
                autostart: Some(true),
                only_id: true,
                ..CreateOptions::default()
            }
        );
    }

    #[test]
    fn from_pairs_rejects_unknown_and_malformed() {
        let err = CreateOptions::from_pairs([("strat", "600")]).unwrap_err();
        assert_eq!(err.code, "CONFIGURATION");
        let err = CreateOptions::from_pairs([("start", "soon")]).unwrap_err();
        assert_eq!(err.code, "INVALID_ARGUMENT");
    }

    #[test]
    fn from_assignments_splits_on_the_first_equals_sign() {
        let opts = CreateOptions::from_assignments([
            "start=60",
            "description=a=b",
            "block",
        ])
        .unwrap();
        assert_eq!(opts.start, Some(60));
        assert_eq!(opts.description.as_deref(), Some("a=b"));
        assert!(opts.block);

        let err = CreateOptions::from_assignments(["colour=red"]).unwrap_err();
        assert_eq!(err.code, "CONFIGURATION");
    }

    #[test]
    fn build_outage_rejects_windows_out_of_range() {
        for opts in [
            CreateOptions {
                start: Some(i64::MAX),
                ..CreateOptions::default()
            },
            CreateOptions {
                start: Some(0),
                duration: Some(i64::MAX),
                ..CreateOptions::default()
            },
        ] {
            let err = opts.build_outage(&ready_config(), i64::MAX - 10, None).unwrap_err();
            assert_eq!(err.code, "INVALID_ARGUMENT");
        }
    }

    #[test]
    fn build_outage_uses_config_defaults() {
        let opts = CreateOptions {
            start: Some(600),
            ..CreateOptions::default()
        };
        let outage = opts.build_outage(&ready_config(), 10_000, None).unwrap();
        assert_eq!(outage.id, None);
        assert_eq!(outage.starttime, Some(10_600));
        assert_eq!(outage.stoptime, Some(17_800));
        assert_eq!(outage.warntime, Some(7_000));
        assert_eq!(outage.autostart, Some(false));
        assert_eq!(outage.title.as_deref(), Some("System maintenance"));
    }

    #[test]
    fn build_outage_clones_from_source() {
        let source = Outage {
            id: Some(3),
            autostart: Some(true),
            warntime: Some(100),
            starttime: Some(160),
            stoptime: Some(460),
            title: Some("Nightly".to_string()),
            description: Some("Reindex".to_string()),
            ..Outage::default()
        };
        let opts = CreateOptions {
            start: Some(0),
            title: Some("Override".to_string()),
            clone: Some(3),
            ..CreateOptions::default()
        };
        let outage = opts.build_outage(&ready_config(), 5_000, Some(&source)).unwrap();
        assert_eq!(outage.warntime, Some(4_940));
        assert_eq!(outage.stoptime, Some(5_300));
        assert_eq!(outage.title.as_deref(), Some("Override"));
        assert_eq!(outage.description.as_deref(), Some("Reindex"));
        assert_eq!(outage.autostart, Some(true));
    }

    #[test]
    fn build_outage_requires_start() {
        let err = CreateOptions::default()
            .build_outage(&ready_config(), 5_000, None)
            .unwrap_err();
        assert_eq!(err.code, "INVALID_ARGUMENT");
    }
}
