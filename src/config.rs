use crate::{
    error::{Error, Result},
    retry::RetryPolicy,
};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OAuthMode {
    /// A service account key impersonating `subject`
    #[default]
    Delegated,
    /// Application default credentials
    Default,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            cap_delay_ms: 32000,
            jitter_ms: 500,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(rc: RetryConfig) -> Self {
        Self {
            max_attempts: rc.max_attempts,
            base: Duration::from_millis(rc.base_delay_ms),
            cap: Duration::from_millis(rc.cap_delay_ms),
            jitter: Duration::from_millis(rc.jitter_ms),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub credentials_file: Option<String>,
    pub oauth_mode: OAuthMode,
    /// The user a delegated service account acts as
    pub subject: Option<String>,
    pub scopes: Vec<String>,
    /// Hard cap on concurrent workers
    pub threads: usize,
    /// Pause after each batch row
    pub batch_delay_ms: u64,
    pub retry: RetryConfig,
    pub api_root: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_file: None,
            oauth_mode: OAuthMode::default(),
            subject: None,
            scopes: Vec::new(),
            threads: crate::batch::MAX_THREADS,
            batch_delay_ms: 200,
            retry: RetryConfig::default(),
            api_root: None,
        }
    }
}

impl Config {
    /// Parses a config, resolving a relative credentials path against `dir`
    pub fn from_yaml(yaml: &str, dir: &Utf8Path) -> Result<Self> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|err| Error::config(format!("invalid config: {err}")))?
        };

        if let Some(creds) = &config.credentials_file {
            let creds = Utf8Path::new(creds);
            if creds.is_relative() {
                config.credentials_file = Some(dir.join(creds).into_string());
            }
        }

        if config.threads == 0 {
            config.threads = crate::batch::MAX_THREADS;
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// The credentials file, required in delegated mode
    pub fn credentials(&self) -> Result<&Utf8Path> {
        self.credentials_file
            .as_deref()
            .map(Utf8Path::new)
            .ok_or_else(|| Error::config("credentialsFile is not set"))
    }
}

/// `.<name>.yaml`
pub fn file_name(name: &str) -> String {
    format!(".{name}.yaml")
}

/// The directories searched for a config, in order
pub fn search_path() -> Vec<Utf8PathBuf> {
    let mut search = Vec::new();

    if let Some(cwd) = std::env::current_dir()
        .ok()
        .and_then(|cwd| Utf8PathBuf::from_path_buf(cwd).ok())
    {
        search.push(cwd);
    }

    if let Some(config_dir) = dirs::config_dir().and_then(|d| Utf8PathBuf::from_path_buf(d).ok()) {
        search.push(config_dir.join("gsm"));
    }

    search
}

/// Finds the first `.<name>.yaml` along `search`
pub fn locate(name: &str, search: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
    let file_name = file_name(name);
    search
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|path| path.is_file())
}

/// Locates and parses the named config
pub fn load(name: &str, search: &[Utf8PathBuf]) -> Result<(Config, Utf8PathBuf)> {
    let path = locate(name, search).ok_or_else(|| {
        let searched: Vec<_> = search.iter().map(|d| d.as_str()).collect();
        Error::config(format!(
            "no {} found in [{}]",
            file_name(name),
            searched.join(", ")
        ))
    })?;

    let yaml = std::fs::read_to_string(&path)
        .map_err(|err| Error::config(format!("unable to read {path}: {err}")))?;
    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let config = Config::from_yaml(&yaml, dir)?;

    tracing::debug!(%path, "loaded config");
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        let c = Config::from_yaml("", Utf8Path::new("/x")).unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.threads, 16);
        assert_eq!(c.batch_delay(), Duration::from_millis(200));
        assert_eq!(c.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn fields_are_camel_case() {
        let yaml = r#"
credentialsFile: sa.json
oauthMode: delegated
subject: admin@example.com
scopes: [a, b]
threads: 4
batchDelayMs: 0
retry:
  maxAttempts: 2
apiRoot: http://localhost:9999
"#;
        let c = Config::from_yaml(yaml, Utf8Path::new("/etc/gsm")).unwrap();
        assert_eq!(c.credentials_file.as_deref(), Some("/etc/gsm/sa.json"));
        assert_eq!(c.subject.as_deref(), Some("admin@example.com"));
        assert_eq!(c.scopes, vec!["a", "b"]);
        assert_eq!(c.threads, 4);
        assert_eq!(c.batch_delay(), Duration::ZERO);
        assert_eq!(c.retry.max_attempts, 2);
        assert_eq!(c.retry.base_delay_ms, 1000);
        assert_eq!(c.api_root.as_deref(), Some("http://localhost:9999"));
    }

    #[test]
    fn absolute_credentials_are_kept() {
        let c = Config::from_yaml("credentialsFile: /keys/sa.json", Utf8Path::new("/etc")).unwrap();
        assert_eq!(c.credentials().unwrap(), "/keys/sa.json");
    }

    #[test]
    fn default_mode() {
        let c = Config::from_yaml("oauthMode: default", Utf8Path::new("/")).unwrap();
        assert_eq!(c.oauth_mode, OAuthMode::Default);
        assert!(c.credentials().is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(matches!(
            Config::from_yaml("oauthMode: telepathy", Utf8Path::new("/")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn search_order() {
        let first_tmp = tempfile::tempdir().unwrap();
        let second_tmp = tempfile::tempdir().unwrap();
        let first = Utf8PathBuf::from_path_buf(first_tmp.path().to_owned()).unwrap();
        let second_dir = Utf8PathBuf::from_path_buf(second_tmp.path().to_owned()).unwrap();

        let search = vec![first.clone(), second_dir.clone()];
        assert!(locate("work", &search).is_none());
        assert!(matches!(load("work", &search), Err(Error::Config(_))));

        std::fs::write(second_dir.join(".work.yaml"), "threads: 3\n").unwrap();
        let (c, path) = load("work", &search).unwrap();
        assert_eq!(c.threads, 3);
        assert_eq!(path, second_dir.join(".work.yaml"));

        std::fs::write(first.join(".work.yaml"), "threads: 7\n").unwrap();
        let (c, _) = load("work", &search).unwrap();
        assert_eq!(c.threads, 7);
    }
}
