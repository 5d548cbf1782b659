//! Avatar uploads.
//!
//! Files land in one directory named `{user_id}_{timestamp}_{clean name}`;
//! the member row keeps only the file name.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::User;
use crate::storage::Storage;

/// Characters kept by [`secure_filename`].
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid file name pattern"));

/// Reduce an uploaded file name to a safe ASCII name.
///
/// Path separators and whitespace become `_`, every other character outside
/// `[A-Za-z0-9_.-]` is dropped, and leading or trailing dots and
/// underscores are stripped. The result may be empty.
#[must_use]
pub fn secure_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    cleaned.trim_matches(['.', '_']).to_string()
}

/// Lowercase extension of `name`, if it has one.
fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// File name an avatar is stored under.
#[must_use]
pub fn avatar_file_name(user_id: i64, now: DateTime<Utc>, original: &str) -> String {
    format!(
        "{user_id}_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        secure_filename(original)
    )
}

/// Writes avatar files and keeps member rows pointing at them.
#[derive(Debug, Clone)]
pub struct AvatarStore {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
}

impl AvatarStore {
    /// Create a store writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, allowed_extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            allowed_extensions: allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Directory holding the avatar files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the avatar directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })
    }

    /// Whether `name` carries an accepted extension.
    #[must_use]
    pub fn allowed_file(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Store a new avatar for `user` and return its file name.
    ///
    /// The previous avatar file is removed once the row points at the new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFileSelected`] for an empty file name,
    /// [`Error::UnsupportedFileType`] for a rejected extension, and I/O or
    /// database errors otherwise.
    pub fn save(
        &self,
        storage: &Storage,
        user: &User,
        original_name: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<String> {
        if original_name.trim().is_empty() {
            return Err(Error::NoFileSelected);
        }
        if !self.allowed_file(original_name) || secure_filename(original_name).is_empty() {
            return Err(Error::UnsupportedFileType {
                name: original_name.to_string(),
            });
        }

        self.ensure_dir()?;
        let file_name = avatar_file_name(user.id, now, original_name);
        let path = self.dir.join(&file_name);
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), size = bytes.len(), "Wrote avatar");

        if let Err(e) = storage.set_avatar(user.id, Some(&file_name)) {
            self.remove(&file_name);
            return Err(e);
        }

        if let Some(old) = user.avatar.as_deref().filter(|old| *old != file_name) {
            self.remove(old);
        }

        info!(user = %user.username, file = %file_name, "Avatar updated");
        Ok(file_name)
    }

    /// Delete an avatar file; a missing file is not an error.
    pub fn remove(&self, file_name: &str) {
        let name = secure_filename(file_name);
        if name.is_empty() {
            return;
        }
        match std::fs::remove_file(self.dir.join(&name)) {
            Ok(()) => debug!(file = %name, "Removed avatar"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %name, error = %e, "Failed to remove avatar"),
        }
    }
}
