use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
    sync::OnceLock,
};

use anyhow::{anyhow, bail, Context, Result};
use epicsync_domain::{DEFAULT_EPIC_TYPE, DEFAULT_STATUS_FIELD};
use regex::Regex;
use serde::Deserialize;

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn parse(value: &str) -> Option<Self> {
        let (owner, name) = value.trim().split_once('/')?;
        let owner = non_empty_str(owner)?;
        let name = non_empty_str(name)?;
        if name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectRef {
    Id(String),
    Number { owner: String, number: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpicSyncConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub repository: Option<Repository>,
    pub project: Option<ProjectRef>,
    pub status_field: String,
    pub epic_type: String,
    pub workers: usize,
    pub page_size: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for EpicSyncConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default(), |_| None)
    }
}

#[derive(Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    github: RawGithub,
    #[serde(default)]
    project: RawProject,
    #[serde(default)]
    sync: RawSync,
}

#[derive(Default, Deserialize)]
struct RawGithub {
    api_url: Option<String>,
    token: Option<String>,
    repository: Option<String>,
}

#[derive(Default, Deserialize)]
struct RawProject {
    id: Option<String>,
    owner: Option<String>,
    number: Option<u64>,
    url: Option<String>,
    status_field: Option<String>,
    epic_type: Option<String>,
}

#[derive(Default, Deserialize)]
struct RawSync {
    workers: Option<usize>,
    page_size: Option<usize>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
}

impl EpicSyncConfig {
    /// Loads `explicit` when given (it must exist), otherwise the default path
    /// if present. Environment variables fill whatever the file leaves unset.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_path(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load_from_path(&path)
                } else {
                    Ok(Self::from_raw(RawConfig::default(), process_env))
                }
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_yaml(&payload, process_env)
    }

    fn from_yaml<E>(payload: &str, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = if payload.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(payload).with_context(|| "invalid YAML config format")?
        };
        Ok(Self::from_raw(raw, env))
    }

    pub fn require_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            anyhow!("github token not configured (set github.token or GITHUB_TOKEN)")
        })
    }

    pub fn require_repository(&self) -> Result<&Repository> {
        self.repository.as_ref().ok_or_else(|| {
            anyhow!("repository not configured (set github.repository or GITHUB_REPOSITORY)")
        })
    }

    pub fn require_project(&self) -> Result<&ProjectRef> {
        self.project.as_ref().ok_or_else(|| {
            anyhow!("project not configured (set project.id, project.number or project.url)")
        })
    }

    pub fn graphql_url(&self) -> String {
        graphql_url_for(&self.api_url)
    }

    pub fn validate(&self) -> Result<()> {
        self.require_token()?;
        self.require_repository()?;
        self.require_project()?;
        if self.status_field.is_empty() {
            bail!("project.status_field cannot be empty");
        }
        Ok(())
    }

    fn from_raw<E>(raw: RawConfig, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let api_url = first_some(raw.github.api_url, env("GITHUB_API_URL"))
            .and_then(normalize_api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = first_some(
            raw.github.token.and_then(resolve_token),
            env("GITHUB_TOKEN").and_then(non_empty),
        );
        let repository = first_some(raw.github.repository, env("GITHUB_REPOSITORY"))
            .and_then(|value| Repository::parse(&value));

        let project = resolve_project(
            raw.project.id,
            raw.project.url,
            raw.project.number,
            raw.project.owner,
        )
        .or_else(|| {
            let owner = env("PROJECT_OWNER")
                .and_then(non_empty)
                .or_else(|| repository.as_ref().map(|repo| repo.owner.clone()));
            resolve_project(
                env("PROJECT_ID"),
                None,
                env("PROJECT_NUMBER").and_then(|value| value.trim().parse().ok()),
                owner,
            )
        });

        let status_field = raw
            .project
            .status_field
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_STATUS_FIELD.to_string());
        let epic_type = raw
            .project
            .epic_type
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_EPIC_TYPE.to_string());

        Self {
            api_url,
            token,
            repository,
            project,
            status_field,
            epic_type,
            workers: raw.sync.workers.unwrap_or(DEFAULT_WORKERS).max(1),
            page_size: raw
                .sync
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            timeout_secs: raw.sync.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1),
            max_attempts: raw.sync.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            initial_backoff_ms: raw
                .sync
                .initial_backoff_ms
                .unwrap_or(DEFAULT_INITIAL_BACKOFF_MS),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(override_path) = env::var_os("EPICSYNC_CONFIG_FILE") {
        return PathBuf::from(override_path);
    }

    let mut base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("epicsync");
    base.push("config.yaml");
    base
}

/// Parses `https://github.com/orgs/<owner>/projects/<n>` (or `/users/`).
pub fn parse_project_url(url: &str) -> Option<ProjectRef> {
    static PROJECT_URL: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = PROJECT_URL
        .get_or_init(|| {
            Regex::new(r"^https?://[^/]+/(?:orgs|users)/([^/]+)/projects/(\d+)").ok()
        })
        .as_ref()?;
    let captures = regex.captures(url.trim())?;
    Some(ProjectRef::Number {
        owner: captures.get(1)?.as_str().to_string(),
        number: captures.get(2)?.as_str().parse().ok()?,
    })
}

/// `https://api.github.com` serves GraphQL at `/graphql`; Enterprise servers
/// expose REST at `/api/v3` and GraphQL at `/api/graphql`.
pub fn graphql_url_for(api_url: &str) -> String {
    match api_url.strip_suffix("/api/v3") {
        Some(base) => format!("{base}/api/graphql"),
        None => format!("{api_url}/graphql"),
    }
}

fn resolve_project(
    id: Option<String>,
    url: Option<String>,
    number: Option<u64>,
    owner: Option<String>,
) -> Option<ProjectRef> {
    if let Some(id) = id.and_then(non_empty) {
        return Some(ProjectRef::Id(id));
    }
    if let Some(project) = url.and_then(non_empty).and_then(|url| parse_project_url(&url)) {
        return Some(project);
    }
    let owner = owner.and_then(non_empty)?;
    Some(ProjectRef::Number {
        owner,
        number: number?,
    })
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed)
}

fn normalize_api_url(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.trim_end_matches('/').to_string())
    } else {
        Some(format!("https://{}", trimmed.trim_end_matches('/')))
    }
}

fn first_some<T>(first: Option<T>, second: Option<T>) -> Option<T> {
    first.or(second)
}

fn resolve_token(value: String) -> Option<String> {
    resolve_token_with(value, fetch_secret_from_manager)
}

fn resolve_token_with<F>(value: String, fetch: F) -> Option<String>
where
    F: Fn(&str, &str) -> Option<String>,
{
    let token = non_empty(value)?;
    let Some((provider, key)) = parse_secret_reference(token.as_str()) else {
        return Some(token);
    };
    fetch(provider, key)
}

fn parse_secret_reference(value: &str) -> Option<(&str, &str)> {
    let (provider, key) = value.split_once("::")?;
    if key.trim().is_empty() {
        return None;
    }
    if provider == "pass" || provider == "passage" {
        Some((provider, key.trim()))
    } else {
        None
    }
}

fn fetch_secret_from_manager(provider: &str, key: &str) -> Option<String> {
    let output = Command::new(provider).arg("show").arg(key).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    non_empty(stdout.lines().next().unwrap_or_default().to_string())
}
