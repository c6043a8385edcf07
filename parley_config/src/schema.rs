use parley_core::TimeUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub timeouts: TimeoutDefaults,
    #[serde(default)]
    pub log: LogConfig,
    /// Directory searched for scripts given by bare file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
}

/// Timeout applied to script questions that declare none.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutDefaults {
    #[serde(default = "TimeoutDefaults::default_amount")]
    pub default_amount: u64,
    #[serde(default = "TimeoutDefaults::default_unit")]
    pub default_unit: TimeUnit,
}

impl Default for TimeoutDefaults {
    fn default() -> Self {
        Self {
            default_amount: Self::default_amount(),
            default_unit: Self::default_unit(),
        }
    }
}

impl TimeoutDefaults {
    const fn default_amount() -> u64 {
        60
    }

    const fn default_unit() -> TimeUnit {
        TimeUnit::Seconds
    }

    /// `None` when the amount is zero, which disables the default timeout.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        if self.default_amount == 0 {
            None
        } else {
            Some(self.default_unit.duration(self.default_amount))
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "LogConfig::default_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: Self::default_filter(),
        }
    }
}

impl LogConfig {
    fn default_filter() -> String {
        "warn".to_string()
    }
}

const CONFIG_TEMPLATE: &str = r#"{
  "timeouts": {
    "default_amount": 60,
    "default_unit": "seconds"
  },
  "log": {
    "filter": "warn"
  }
}"#;

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join("parley"))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'parley init' to create config.",
                config_path.display()
            );
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;

        Ok(config)
    }

    /// Load the config file, falling back to defaults when there is none.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            debug!("No config at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;

        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, CONFIG_TEMPLATE)?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Write a wizard script (see 'parley check <script>')");
        println!("   2. Run 'parley run <script>' to start it on this terminal");
        println!();
        println!("🔧 Configuration options:");
        println!("   - timeouts: applied to questions without their own timeout (0 disables)");
        println!("   - log.filter: tracing filter used when RUST_LOG is unset");
        println!("   - scripts_dir: where bare script names are looked up");
        println!();
        Ok(())
    }

    /// Resolve a script argument: existing paths are used as given, bare
    /// names are looked up in `scripts_dir`.
    #[must_use]
    pub fn resolve_script(&self, script: &Path) -> PathBuf {
        match &self.scripts_dir {
            Some(dir) if !script.exists() && script.is_relative() => dir.join(script),
            _ => script.to_path_buf(),
        }
    }
}
