//! PID file guard.
//!
//! [`PidFile::create`] refuses to start a second daemon that points at the
//! same path, and the file is removed when the guard is dropped.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

/// Removes the PID file on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current PID to `path`.
    ///
    /// The parent directory is created with mode 0700 and the file with 0600.
    /// Creation is atomic (`create_new`), so an existing file is an error.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
                return Err(anyhow::anyhow!(
                    "PID file {} already exists with PID: {}. Is another instance running?",
                    path.display(),
                    existing.trim()
                ));
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to create PID file {}: {}",
                    path.display(),
                    e
                ));
            }
        };

        if !file.metadata()?.is_file() {
            let _ = fs::remove_file(path);
            return Err(anyhow::anyhow!(
                "PID file {} is not a regular file",
                path.display()
            ));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        let pid = std::process::id();
        writeln!(file, "{pid}")?;
        tracing::info!(pid, path = %path.display(), "PID file written");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(path = %self.path.display(), "PID file removed"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove PID file"
            ),
        }
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().mode(0o700).recursive(true).create(dir)?;
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
