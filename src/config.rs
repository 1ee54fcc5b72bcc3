use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "SITENOTES";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub discussions: DiscussionsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    /// Annotated pages land here; defaults to rewriting the docs tree in
    /// place.
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub measurement_id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            out_dir: None,
            measurement_id: String::new(),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GithubConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_profile_host")]
    pub profile_host: String,
    /// handle -> display name; known contributors render without a lookup.
    #[serde(default)]
    pub known_profiles: HashMap<String, String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            api_base: None,
            profile_host: default_profile_host(),
            known_profiles: HashMap::new(),
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "sitenotes/{} (+https://github.com/allenneuraldynamics/sitenotes)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_profile_host() -> String {
    "github.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiscussionsConfig {
    /// "owner/name" slug; discussion links are skipped when unset.
    #[serde(default)]
    pub repo: String,
    /// page identifier -> known discussion, consulted before any lookup.
    #[serde(default)]
    pub known: HashMap<String, KnownDiscussionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownDiscussionEntry {
    pub number: i64,
    #[serde(default)]
    pub comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl: default_cache_ttl(),
            enabled: default_cache_enabled(),
        }
    }
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_cache_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if other.site.docs_dir != default_docs_dir() {
        base.site.docs_dir = other.site.docs_dir;
    }
    if other.site.out_dir.is_some() {
        base.site.out_dir = other.site.out_dir;
    }
    if !other.site.measurement_id.is_empty() {
        base.site.measurement_id = other.site.measurement_id;
    }

    if !other.github.user_agent.is_empty() && other.github.user_agent != default_user_agent() {
        base.github.user_agent = other.github.user_agent;
    }
    if other.github.api_base.is_some() {
        base.github.api_base = other.github.api_base;
    }
    if !other.github.profile_host.is_empty() && other.github.profile_host != default_profile_host()
    {
        base.github.profile_host = other.github.profile_host;
    }
    if !other.github.known_profiles.is_empty() {
        base.github.known_profiles = other.github.known_profiles;
    }

    if !other.discussions.repo.is_empty() {
        base.discussions.repo = other.discussions.repo;
    }
    if !other.discussions.known.is_empty() {
        base.discussions.known = other.discussions.known;
    }

    if other.cache.path.is_some() {
        base.cache.path = other.cache.path;
    }
    if other.cache.ttl != default_cache_ttl() {
        base.cache.ttl = other.cache.ttl;
    }
    if other.cache.enabled != default_cache_enabled() {
        base.cache.enabled = other.cache.enabled;
    }

    if other.resolver.workers != 0 && other.resolver.workers != default_workers() {
        base.resolver.workers = other.resolver.workers;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    if map.is_empty() {
        return Ok(Config::default());
    }

    let mut cfg = Config::default();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "site.docs_dir" => cfg.site.docs_dir = PathBuf::from(value),
        "site.out_dir" => cfg.site.out_dir = Some(PathBuf::from(value)),
        "site.measurement_id" => cfg.site.measurement_id = value,
        "github.user_agent" => cfg.github.user_agent = value,
        "github.api_base" => cfg.github.api_base = Some(value),
        "github.profile_host" => cfg.github.profile_host = value,
        "discussions.repo" => cfg.discussions.repo = value,
        "cache.path" => cfg.cache.path = Some(PathBuf::from(value)),
        "cache.ttl" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.cache.ttl = duration;
            }
        }
        "cache.enabled" => {
            cfg.cache.enabled = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "resolver.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.resolver.workers = parsed;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sitenotes").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/sitenotes.yaml")),
            env_prefix: Some("SITENOTES_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.site.docs_dir, PathBuf::from("docs"));
        assert_eq!(cfg.github.profile_host, "github.com");
        assert_eq!(cfg.cache.ttl, Duration::from_secs(24 * 60 * 60));
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.resolver.workers, 4);
    }

    #[test]
    fn reads_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "discussions:\n  repo: org/docs\n  known:\n    session-01:\n      number: 22\n      comments: 4\ncache:\n  ttl: 12h\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("SITENOTES_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.discussions.repo, "org/docs");
        assert_eq!(cfg.discussions.known["session-01"].number, 22);
        assert_eq!(cfg.cache.ttl, Duration::from_secs(12 * 60 * 60));
    }

    #[test]
    fn env_overrides() {
        env::set_var("SITENOTES_TEST_ENV_DISCUSSIONS__REPO", "org/override");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/sitenotes.yaml")),
            env_prefix: Some("SITENOTES_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.discussions.repo, "org/override");
        env::remove_var("SITENOTES_TEST_ENV_DISCUSSIONS__REPO");
    }
}
