// ActionManager: turns `uses:` references into a local directory plus parsed
// metadata, downloading GitHub-hosted actions and caching the result in the
// run state.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ghexec_common::constants::{self, variables, WellKnownDirectory};
use ghexec_common::HostContext;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::action_manifest_manager::ActionManifestManager;
use crate::run_state::{ActionState, RunState};

static REMOTE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^/@]+)/([^/@]+)(?:/([^@]+))?@(.+)$").expect("reference regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionReferenceError {
    #[error("invalid action reference '{0}': expected {{owner}}/{{repo}}[/{{path}}]@{{ref}} or a local path")]
    Malformed(String),
}

/// A parsed `uses:` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReference {
    /// `./path` or an absolute path.
    Local(PathBuf),
    /// `{owner}/{repo}[/{path}]@{ref}`
    Remote {
        owner: String,
        repo: String,
        path: Option<String>,
        git_ref: String,
    },
}

impl ActionReference {
    pub fn parse(source: &str) -> Result<Self, ActionReferenceError> {
        let source = source.trim();
        if source.starts_with("./") || source.starts_with("../") || Path::new(source).is_absolute() {
            return Ok(ActionReference::Local(PathBuf::from(source)));
        }

        let caps = REMOTE_REFERENCE
            .captures(source)
            .ok_or_else(|| ActionReferenceError::Malformed(source.to_string()))?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string());

        let path = group(3).filter(|p| !p.trim_matches('/').is_empty());
        match (group(1), group(2), group(4)) {
            (Some(owner), Some(repo), Some(git_ref))
                if [&owner, &repo, &git_ref]
                    .into_iter()
                    .chain(path.as_ref())
                    .all(|part| stays_inside(part)) =>
            {
                Ok(ActionReference::Remote {
                    owner,
                    repo,
                    path,
                    git_ref,
                })
            }
            _ => Err(ActionReferenceError::Malformed(source.to_string())),
        }
    }
}

/// True when `part` joins onto a directory without leaving it.
fn stays_inside(part: &str) -> bool {
    Path::new(part)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

impl fmt::Display for ActionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionReference::Local(path) => write!(f, "{}", path.display()),
            ActionReference::Remote {
                owner,
                repo,
                path: Some(path),
                git_ref,
            } => write!(f, "{owner}/{repo}/{path}@{git_ref}"),
            ActionReference::Remote {
                owner, repo, git_ref, ..
            } => write!(f, "{owner}/{repo}@{git_ref}"),
        }
    }
}

/// Materializes an action's files on disk.
#[async_trait]
pub trait ActionSourceFetcher: Send + Sync {
    /// Return the directory holding the action's manifest.
    async fn fetch(&self, reference: &ActionReference) -> Result<PathBuf>;
}

/// Fetches local actions in place and remote ones as GitHub tarballs.
pub struct GitHubActionFetcher {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    actions_directory: PathBuf,
    workspace: PathBuf,
}

impl GitHubActionFetcher {
    pub fn new(actions_directory: PathBuf, workspace: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: constants::DEFAULT_GITHUB_API_URL.to_string(),
            token: None,
            actions_directory,
            workspace,
        }
    }

    /// Configure from `GITHUB_API_URL`, `GITHUB_TOKEN` and `GITHUB_WORKSPACE`
    /// (falling back to the current directory for local actions).
    pub fn from_environment(host: &HostContext, env: &BTreeMap<String, String>) -> Result<Self> {
        let non_empty = |name: &str| env.get(name).filter(|v| !v.is_empty()).cloned();

        let workspace = match non_empty("GITHUB_WORKSPACE") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().context("Failed to determine the current directory")?,
        };

        let mut fetcher = Self::new(host.get_directory(WellKnownDirectory::Actions), workspace);
        if let Some(url) = non_empty(variables::GITHUB_API_URL) {
            fetcher.api_url = url.trim_end_matches('/').to_string();
        }
        fetcher.token = non_empty(variables::GITHUB_TOKEN);
        Ok(fetcher)
    }

    async fn download_tarball(&self, owner: &str, repo: &str, git_ref: &str) -> Result<Vec<u8>> {
        let url = format!("{}/repos/{}/{}/tarball/{}", self.api_url, owner, repo, git_ref);
        tracing::info!("Downloading action '{}/{}@{}'", owner, repo, git_ref);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, constants::USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("token {}", token));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("HTTP request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Failed to download {}", url))?;

        let bytes = response.bytes().await.context("Failed to read response body")?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ActionSourceFetcher for GitHubActionFetcher {
    async fn fetch(&self, reference: &ActionReference) -> Result<PathBuf> {
        match reference {
            ActionReference::Local(path) => Ok(self.workspace.join(path)),
            ActionReference::Remote {
                owner,
                repo,
                path,
                git_ref,
            } => {
                let action_dir = self.actions_directory.join(owner).join(repo).join(git_ref);

                if action_dir.exists() {
                    tracing::debug!("Reusing downloaded action at {}", action_dir.display());
                } else {
                    let archive = self.download_tarball(owner, repo, git_ref).await?;
                    if let Err(e) = extract_tarball(&archive, &action_dir) {
                        let _ = std::fs::remove_dir_all(&action_dir);
                        return Err(e).with_context(|| format!("Failed to extract {}", reference));
                    }
                }

                match path {
                    Some(sub) if !stays_inside(sub) => {
                        anyhow::bail!("Action path '{}' escapes {}", sub, reference)
                    }
                    Some(sub) => Ok(action_dir.join(sub)),
                    None => Ok(action_dir),
                }
            }
        }
    }
}

/// Unpack a `.tar.gz` into `destination`, dropping the archive's top-level
/// directory (GitHub tarballs wrap everything in `owner-repo-sha/`).
pub(crate) fn extract_tarball(archive: &[u8], destination: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    std::fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(archive)));
    for entry in archive.entries().context("Failed to read archive")? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let stripped: PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty()
            || stripped
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            continue;
        }

        let target = destination.join(&stripped);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("Failed to unpack {}", stripped.display()))?;
    }

    Ok(())
}

/// Resolves action references, consulting the run state's cache first.
pub struct ActionManager {
    fetcher: Arc<dyn ActionSourceFetcher>,
}

impl ActionManager {
    pub fn new(fetcher: Arc<dyn ActionSourceFetcher>) -> Self {
        Self { fetcher }
    }

    /// Resolve `source`. A reference already in `state.actions` is returned
    /// without fetching or parsing again.
    pub async fn resolve(&self, state: &mut RunState, source: &str) -> Result<ActionState> {
        if let Some(cached) = state.action(source) {
            tracing::debug!("Action '{}' resolved from cache", source);
            return Ok(cached.clone());
        }

        let reference = ActionReference::parse(source)?;
        let path = self
            .fetcher
            .fetch(&reference)
            .await
            .with_context(|| format!("Failed to fetch action '{}'", source))?;
        let metadata = ActionManifestManager::load_action(&path)?;

        let action = ActionState {
            source: source.to_string(),
            path,
            metadata,
        };
        state.actions.insert(source.to_string(), action.clone());
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves every reference from one directory and counts fetches.
    struct CountingFetcher {
        directory: PathBuf,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActionSourceFetcher for CountingFetcher {
        async fn fetch(&self, _reference: &ActionReference) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.directory.clone())
        }
    }

    fn action_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("action.yml"),
            "name: hello\nruns:\n  using: node20\n  main: index.js\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn parse_remote_references() {
        assert_eq!(
            ActionReference::parse("actions/checkout@v4").unwrap(),
            ActionReference::Remote {
                owner: "actions".into(),
                repo: "checkout".into(),
                path: None,
                git_ref: "v4".into(),
            }
        );
        let nested = ActionReference::parse("github/codeql-action/init@v3").unwrap();
        assert_eq!(
            nested,
            ActionReference::Remote {
                owner: "github".into(),
                repo: "codeql-action".into(),
                path: Some("init".into()),
                git_ref: "v3".into(),
            }
        );
        assert_eq!(nested.to_string(), "github/codeql-action/init@v3");
    }

    #[test]
    fn parse_local_references() {
        assert_eq!(
            ActionReference::parse("./.github/actions/setup").unwrap(),
            ActionReference::Local(PathBuf::from("./.github/actions/setup"))
        );
        assert_eq!(
            ActionReference::parse("/opt/actions/hello").unwrap(),
            ActionReference::Local(PathBuf::from("/opt/actions/hello"))
        );
    }

    #[test]
    fn parse_rejects_malformed_references() {
        for bad in ["checkout", "actions/checkout", "@v1", "actions@v1", "docker://alpine"] {
            assert!(
                matches!(ActionReference::parse(bad), Err(ActionReferenceError::Malformed(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn parse_rejects_references_leaving_the_action_directory() {
        for bad in [
            "o/r/../../x@v1",
            "o/r/sub/../../../x@v1",
            "o/r//etc@v1",
            "o/..@v1",
            "o/r@../../x",
        ] {
            assert!(
                matches!(ActionReference::parse(bad), Err(ActionReferenceError::Malformed(_))),
                "{bad} should be rejected"
            );
        }
        assert!(ActionReference::parse("o/r/a/b@feature/x").is_ok());
    }

    #[tokio::test]
    async fn resolve_fetches_each_reference_once() {
        let dir = action_dir();
        let fetcher = Arc::new(CountingFetcher {
            directory: dir.path().to_path_buf(),
            calls: AtomicUsize::new(0),
        });
        let manager = ActionManager::new(fetcher.clone());
        let mut state = RunState::default();

        let first = manager.resolve(&mut state, "octo/hello@v1").await.unwrap();
        let second = manager.resolve(&mut state, "octo/hello@v1").await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first.metadata.name, "hello");
        assert_eq!(state.actions["octo/hello@v1"].path, dir.path());
    }

    #[tokio::test]
    async fn resolve_without_manifest_fails() {
        let empty = tempfile::tempdir().unwrap();
        let manager = ActionManager::new(Arc::new(CountingFetcher {
            directory: empty.path().to_path_buf(),
            calls: AtomicUsize::new(0),
        }));
        let mut state = RunState::default();

        let err = manager.resolve(&mut state, "octo/missing@v1").await.unwrap_err();
        assert!(err.to_string().contains("No action manifest found"));
        assert!(state.actions.is_empty());
    }

    #[tokio::test]
    async fn local_reference_resolves_against_workspace() {
        let workspace = action_dir();
        let data = tempfile::tempdir().unwrap();
        let fetcher = GitHubActionFetcher::new(data.path().join("actions"), workspace.path().to_path_buf());

        let path = fetcher
            .fetch(&ActionReference::parse("./").unwrap())
            .await
            .unwrap();
        assert!(path.join("action.yml").is_file());
    }

    #[tokio::test]
    async fn downloaded_action_is_reused_from_disk() {
        let data = tempfile::tempdir().unwrap();
        let actions = data.path().join("actions");
        let cached = actions.join("octo").join("tools").join("v2");
        std::fs::create_dir_all(cached.join("lint")).unwrap();

        let fetcher = GitHubActionFetcher::new(actions, data.path().to_path_buf());
        let path = fetcher
            .fetch(&ActionReference::parse("octo/tools/lint@v2").unwrap())
            .await
            .unwrap();
        assert_eq!(path, cached.join("lint"));
    }

    #[test]
    fn extract_strips_top_level_directory() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, body) in [
            ("octo-hello-abc123/action.yml", "name: hello\n"),
            ("octo-hello-abc123/dist/index.js", "console.log('hi')\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        let archive = builder.into_inner().unwrap().finish().unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract_tarball(&archive, dest.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.path().join("action.yml")).unwrap(),
            "name: hello\n"
        );
        assert!(dest.path().join("dist/index.js").is_file());
        assert!(!dest.path().join("octo-hello-abc123").exists());
    }
}
