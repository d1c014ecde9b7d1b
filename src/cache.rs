//! Local OAuth token cache
//!
//! All tokens of an installation live in one JSON file,
//! `<cache-dir>/gmail-filters/auth.json`, mapping user identifiers to tokens.
//! Reading is lenient (a broken cache behaves like an empty one) and writing
//! is best-effort, so authentication can always be retried from scratch.

use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{GmailError, Result};
use crate::models::{OAuthToken, TokenMap};

/// Subdirectory of the platform cache directory owned by this program
pub const APP_NAME: &str = "gmail-filters";

/// File name of the token cache
pub const TOKEN_FILE_NAME: &str = "auth.json";

/// Base cache directory following the platform convention.
///
/// - Linux and other Unix: `$XDG_CACHE_HOME`, else `$HOME/.cache`
/// - macOS: `$HOME/Library/Caches`
/// - Windows: `%LocalAppData%`
pub fn resolve_cache_directory() -> Result<PathBuf> {
    cache_directory_from(|name| env::var(name).ok())
}

/// Full path of the token cache file
pub fn token_cache_path() -> Result<PathBuf> {
    Ok(resolve_cache_directory()?
        .join(APP_NAME)
        .join(TOKEN_FILE_NAME))
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.is_empty())
}

#[cfg(windows)]
fn cache_directory_from<F>(lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(&lookup, "LocalAppData")
        .map(PathBuf::from)
        .ok_or_else(|| GmailError::NoHomeDirectory("%LocalAppData% is not defined".to_string()))
}

#[cfg(target_os = "macos")]
fn cache_directory_from<F>(lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(&lookup, "HOME")
        .map(|home| PathBuf::from(home).join("Library").join("Caches"))
        .ok_or_else(|| GmailError::NoHomeDirectory("$HOME is not defined".to_string()))
}

#[cfg(not(any(windows, target_os = "macos")))]
fn cache_directory_from<F>(lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = non_empty(&lookup, "XDG_CACHE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    non_empty(&lookup, "HOME")
        .map(|home| PathBuf::from(home).join(".cache"))
        .ok_or_else(|| {
            GmailError::NoHomeDirectory(
                "neither $XDG_CACHE_HOME nor $HOME are defined".to_string(),
            )
        })
}

/// Read the token map from `path`.
///
/// Never fails: a missing, unreadable or malformed file yields an empty map.
pub async fn load_token_map(path: &Path) -> TokenMap {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No token cache at {:?}", path);
            return TokenMap::new();
        }
        Err(e) => {
            warn!("Ignoring unreadable token cache {:?}: {}", path, e);
            return TokenMap::new();
        }
    };

    match serde_json::from_slice::<TokenMap>(&content) {
        Ok(tokens) => {
            debug!("Loaded {} cached token(s) from {:?}", tokens.len(), path);
            tokens
        }
        Err(e) => {
            warn!("Ignoring malformed token cache {:?}: {}", path, e);
            TokenMap::new()
        }
    }
}

/// Write the token map to `path`, owner-only.
///
/// Returns whether the write succeeded. Failures are logged, not propagated.
pub async fn save_token_map(path: &Path, tokens: &TokenMap) -> bool {
    match write_token_map(path, tokens).await {
        Ok(()) => {
            debug!("Saved {} token(s) to {:?}", tokens.len(), path);
            true
        }
        Err(e) => {
            warn!("Failed to save token cache {:?}: {}", path, e);
            false
        }
    }
}

async fn write_token_map(path: &Path, tokens: &TokenMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_private_dir(parent).await?;
        }
    }

    let json = serde_json::to_vec(tokens)?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(&json).await?;
    file.flush().await?;

    // The mode above only applies to newly created files
    secure_token_file(path).await
}

async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| GmailError::CacheError(format!("cannot create {:?}: {}", dir, e)))
}

/// Restrict the token file to read/write for its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the ACLs inherited from the profile directory
#[cfg(not(unix))]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-memory view of the token cache bound to its file
#[derive(Debug)]
pub struct TokenCache {
    path: PathBuf,
    tokens: TokenMap,
}

impl TokenCache {
    /// Load the cache stored at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = load_token_map(&path).await;
        Self { path, tokens }
    }

    /// Load the cache from the platform default location
    pub async fn open_default() -> Result<Self> {
        let path = token_cache_path()?;
        Ok(Self::open(path).await)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, user: &str) -> Option<&OAuthToken> {
        self.tokens.get(user)
    }

    /// Store `token` for `user`, replacing any previous one
    pub fn insert(&mut self, user: &str, token: OAuthToken) {
        self.tokens.insert(user.to_string(), token);
    }

    pub fn tokens(&self) -> &TokenMap {
        &self.tokens
    }

    /// Persist the whole map; best-effort
    pub async fn persist(&self) -> bool {
        let saved = save_token_map(&self.path, &self.tokens).await;
        if saved {
            info!("Token cached at {:?}", self.path);
        }
        saved
    }
}
