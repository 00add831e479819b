//! Configuration for the WeWrite renderer.
//!
//! Reads `ww.toml` with serde, searching the current directory and its
//! parents when no path is given. CLI flags are layered on top through
//! [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! - `${VAR}` expands to the value of VAR, errors if unset
//! - `${VAR:-default}` falls back to `default`
//!
//! Expanded fields: `render.failure_text`, `links.references_title`,
//! `links.internal_domains`, `vault.root`, `cache.dir`.

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const CONFIG_FILENAME: &str = "ww.toml";

/// Upper bound for `render.max_embed_depth`.
pub const MAX_EMBED_DEPTH_LIMIT: usize = 32;

/// CLI values that override the configuration file.
#[derive(Debug, Default)]
pub struct CliSettings {
    pub vault_root: Option<PathBuf>,
    pub line_numbers: Option<bool>,
    pub cache_enabled: Option<bool>,
    pub strict_resource_counts: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub host: HostConfig,
    pub links: LinksConfig,
    pub code: CodeConfig,
    vault: VaultConfigRaw,
    cache: CacheConfigRaw,

    /// Vault settings with paths resolved against the config directory.
    #[serde(skip)]
    pub vault_resolved: VaultConfig,
    /// Cache settings with paths resolved against the config directory.
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Set when the configuration was read from a file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Rendering behavior.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Text shown in place of a construct that could not be rendered.
    pub failure_text: String,
    /// Compare per-selector resource demand with the host DOM before walking.
    pub strict_resource_counts: bool,
    /// How many levels of note-in-note embeds are expanded.
    pub max_embed_depth: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            failure_text: "渲染失败".to_owned(),
            strict_resource_counts: true,
            max_embed_depth: 5,
        }
    }
}

/// Polling of the host renderer until its output settles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub settle_interval_ms: u64,
    pub settle_max_polls: u32,
    /// Consecutive identical frames after which output counts as settled.
    pub settle_stable_polls: u32,
}

impl HostConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: 50,
            settle_max_polls: 40,
            settle_stable_polls: 2,
        }
    }
}

/// Link and reference-list rendering.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    pub references_title: String,
    /// Hosts whose links stay clickable in the published article.
    pub internal_domains: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            references_title: "参考链接".to_owned(),
            internal_domains: vec!["mp.weixin.qq.com".to_owned()],
        }
    }
}

/// Code block rendering.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    /// Default when a note does not set `show-code-line-number`.
    pub line_numbers: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct VaultConfigRaw {
    root: Option<String>,
}

/// Resolved vault location.
#[derive(Debug, Default)]
pub struct VaultConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    dir: Option<String>,
}

/// Resolved embed cache settings.
#[derive(Debug, Default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar { field: String, message: String },
}

impl Config {
    /// Load configuration, then apply CLI overrides.
    ///
    /// An explicit `config_path` must exist. Without one, `ww.toml` is
    /// searched from the current directory upwards and defaults are used
    /// when none is found.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, expanded or
    /// validated.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(root) = &settings.vault_root {
            self.vault_resolved.root.clone_from(root);
        }
        if let Some(line_numbers) = settings.line_numbers {
            self.code.line_numbers = line_numbers;
        }
        if let Some(enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = enabled;
        }
        if let Some(strict) = settings.strict_resource_counts {
            self.render.strict_resource_counts = strict;
        }
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            render: RenderConfig::default(),
            host: HostConfig::default(),
            links: LinksConfig::default(),
            code: CodeConfig::default(),
            vault: VaultConfigRaw::default(),
            cache: CacheConfigRaw::default(),
            vault_resolved: VaultConfig {
                root: base.to_path_buf(),
            },
            cache_resolved: CacheConfig {
                enabled: true,
                dir: base.join(".wewrite").join("cache"),
            },
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Check value ranges. Called automatically after loading from a file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render.failure_text.trim().is_empty() {
            return Err(ConfigError::Validation(
                "render.failure_text cannot be empty".to_owned(),
            ));
        }
        if self.render.max_embed_depth > MAX_EMBED_DEPTH_LIMIT {
            return Err(ConfigError::Validation(format!(
                "render.max_embed_depth cannot exceed {MAX_EMBED_DEPTH_LIMIT}"
            )));
        }
        if self.host.settle_max_polls == 0 {
            return Err(ConfigError::Validation(
                "host.settle_max_polls must be greater than 0".to_owned(),
            ));
        }
        if self.host.settle_stable_polls == 0 {
            return Err(ConfigError::Validation(
                "host.settle_stable_polls must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.render.failure_text =
            expand::expand_env(&self.render.failure_text, "render.failure_text")?;
        self.links.references_title =
            expand::expand_env(&self.links.references_title, "links.references_title")?;
        self.links.internal_domains = self
            .links
            .internal_domains
            .iter()
            .map(|domain| expand::expand_env(domain, "links.internal_domains"))
            .collect::<Result<_, _>>()?;
        if let Some(root) = &self.vault.root {
            self.vault.root = Some(expand::expand_env(root, "vault.root")?);
        }
        if let Some(dir) = &self.cache.dir {
            self.cache.dir = Some(expand::expand_env(dir, "cache.dir")?);
        }
        Ok(())
    }

    fn resolve_paths(&mut self, config_dir: &Path) {
        self.vault_resolved = VaultConfig {
            root: config_dir.join(self.vault.root.as_deref().unwrap_or(".")),
        };
        self.cache_resolved = CacheConfig {
            enabled: self.cache.enabled.unwrap_or(true),
            dir: config_dir.join(self.cache.dir.as_deref().unwrap_or(".wewrite/cache")),
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/vault"));
        assert_eq!(config.render.failure_text, "渲染失败");
        assert!(config.render.strict_resource_counts);
        assert_eq!(config.render.max_embed_depth, 5);
        assert_eq!(config.host.settle_interval(), Duration::from_millis(50));
        assert_eq!(config.links.internal_domains, vec!["mp.weixin.qq.com"]);
        assert!(!config.code.line_numbers);
        assert_eq!(config.vault_resolved.root, PathBuf::from("/vault"));
        assert_eq!(
            config.cache_resolved.dir,
            PathBuf::from("/vault/.wewrite/cache")
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
[render]
failure_text = "failed"
max_embed_depth = 2

[host]
settle_interval_ms = 10
settle_max_polls = 5

[links]
references_title = "References"
internal_domains = []

[code]
line_numbers = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.render.failure_text, "failed");
        assert_eq!(config.render.max_embed_depth, 2);
        assert!(config.render.strict_resource_counts);
        assert_eq!(config.host.settle_max_polls, 5);
        assert_eq!(config.host.settle_stable_polls, 2);
        assert_eq!(config.links.references_title, "References");
        assert!(config.links.internal_domains.is_empty());
        assert!(config.code.line_numbers);
    }

    #[test]
    fn test_resolve_paths() {
        let toml = r#"
[vault]
root = "notes"

[cache]
enabled = false
dir = "tmp/cache"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.vault_resolved.root, PathBuf::from("/project/notes"));
        assert!(!config.cache_resolved.enabled);
        assert_eq!(config.cache_resolved.dir, PathBuf::from("/project/tmp/cache"));
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/vault"));
        config.apply_cli_settings(&CliSettings {
            vault_root: Some(PathBuf::from("/elsewhere")),
            line_numbers: Some(true),
            cache_enabled: Some(false),
            strict_resource_counts: Some(false),
        });
        assert_eq!(config.vault_resolved.root, PathBuf::from("/elsewhere"));
        assert!(config.code.line_numbers);
        assert!(!config.cache_resolved.enabled);
        assert!(!config.render.strict_resource_counts);
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default_with_base(Path::new("/vault"));
        config.apply_cli_settings(&CliSettings::default());
        assert_eq!(config.vault_resolved.root, PathBuf::from("/vault"));
        assert!(config.cache_resolved.enabled);
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("WW_TEST_DOMAIN", "example.com");
        }
        let toml = r#"
[links]
internal_domains = ["${WW_TEST_DOMAIN}", "static.test"]
references_title = "${WW_TEST_TITLE_UNSET:-Refs}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();
        assert_eq!(config.links.internal_domains, vec!["example.com", "static.test"]);
        assert_eq!(config.links.references_title, "Refs");
        unsafe {
            std::env::remove_var("WW_TEST_DOMAIN");
        }
    }

    #[test]
    fn test_validate_rejects_zero_polls() {
        let mut config = Config::default();
        config.host.settle_max_polls = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host.settle_max_polls"));

        let mut config = Config::default();
        config.host.settle_stable_polls = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_failure_text() {
        let mut config = Config::default();
        config.render.failure_text = "  ".to_owned();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_deep_embeds() {
        let mut config = Config::default();
        config.render.max_embed_depth = MAX_EMBED_DEPTH_LIMIT + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ww.toml");
        std::fs::write(&path, "[vault]\nroot = \"vault\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.vault_resolved.root, tmp.path().join("vault"));
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/ww.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ww.toml");
        std::fs::write(&path, "[host]\nsettle_max_polls = 0\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path), None),
            Err(ConfigError::Validation(_))
        ));
    }
}
