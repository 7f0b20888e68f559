use super::{ContentInfo, ContentProvider, open_mapped, relative_path, synthesize_metadata};
use std::path::{Path, PathBuf};
use tracing::{error, trace};

/// Serves files below a root directory, memory mapped.
#[derive(Debug, Clone)]
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ContentProvider for FilesystemProvider {
    fn resolve(&self, path: &str) -> Option<ContentInfo> {
        let relative = relative_path(path)?;
        let full_path = self.root.join(relative);

        match open_mapped(&full_path) {
            Ok(Some((file, content))) => {
                let metadata = synthesize_metadata(&full_path, content.len());
                trace!(path = %full_path.display(), len = content.len(), "file resolved");
                Some(ContentInfo { path: full_path, file, content, metadata, resolved_by: Vec::new() })
            }
            Ok(None) => None,
            Err(e) => {
                error!(cause = %e, path = %full_path.display(), "can't map file");
                None
            }
        }
    }
}
