//! Content providers resolve a logical path to bytes plus metadata.
//!
//! Two strategies are provided, [`FilesystemProvider`] and [`ThumbnailProvider`], and
//! they compose through [`ProviderChain`], an ordered list tried in sequence. A
//! resolved [`ContentInfo`] owns the open file and the memory mapped view over it until
//! it is handed back through [`ContentProvider::release`].

mod filesystem;
mod mime_type;
mod thumbnail;

pub use filesystem::FilesystemProvider;
pub use mime_type::content_type_for;
pub use thumbnail::{ImageResizer, JpegThumbnailer, ThumbnailConfig, ThumbnailProvider};

use bytes::Bytes;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Metadata key holding the content type.
pub const CONTENT_TYPE: &str = "content-type";
/// Metadata key holding the byte length.
pub const CONTENT_LENGTH: &str = "content-length";

/// String keyed metadata of a resolved content, at least [`CONTENT_TYPE`] and
/// [`CONTENT_LENGTH`].
pub type Metadata = BTreeMap<String, String>;

/// Failures inside a provider. They never leave [`ContentProvider::resolve`], which logs
/// them and reports the content as absent.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    #[error("invalid metadata: {source}")]
    Metadata {
        #[from]
        source: serde_json::Error,
    },
}

/// A resolved content: the open file, a zero-copy view of its bytes and its metadata.
pub struct ContentInfo {
    path: PathBuf,
    file: File,
    content: Bytes,
    metadata: Metadata,
    // indices of the chain members that resolved this, outermost chain last
    resolved_by: Vec<usize>,
}

impl ContentInfo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full file contents. Cloning the returned [`Bytes`] does not copy the data.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get(CONTENT_TYPE).map(String::as_str)
    }

    /// Closes the file handle and drops this view of the mapping. The mapping itself is
    /// unmapped once the last clone of [`ContentInfo::content`] is gone.
    pub fn close(self) {
        let Self { file, content, .. } = self;
        drop(content);
        drop(file);
    }
}

impl fmt::Debug for ContentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentInfo")
            .field("path", &self.path)
            .field("len", &self.content.len())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Resolves a relative path to content.
///
/// Every [`ContentInfo`] returned by `resolve` must be passed to `release` exactly once,
/// after the bytes have been written out.
pub trait ContentProvider: Send + Sync {
    fn resolve(&self, path: &str) -> Option<ContentInfo>;

    fn release(&self, info: ContentInfo) {
        info.close();
    }
}

impl<P: ContentProvider + ?Sized> ContentProvider for Box<P> {
    fn resolve(&self, path: &str) -> Option<ContentInfo> {
        (**self).resolve(path)
    }

    fn release(&self, info: ContentInfo) {
        (**self).release(info);
    }
}

/// An ordered list of providers, the first one that resolves a path answers for it and
/// gets the content back on release.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn ContentProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<P: ContentProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ContentProvider for ProviderChain {
    fn resolve(&self, path: &str) -> Option<ContentInfo> {
        self.providers.iter().enumerate().find_map(|(index, provider)| {
            let mut info = provider.resolve(path)?;
            info.resolved_by.push(index);
            Some(info)
        })
    }

    fn release(&self, mut info: ContentInfo) {
        match info.resolved_by.pop().and_then(|index| self.providers.get(index)) {
            Some(provider) => provider.release(info),
            None => info.close(),
        }
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain").field("providers", &self.providers.len()).finish()
    }
}

/// Turns a request path into a path relative to a provider root.
///
/// Returns `None` for an empty path, a directory-like path ending in `/`, or anything
/// that is not a plain sequence of normal components.
pub(crate) fn relative_path(path: &str) -> Option<&Path> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return None;
    }

    let relative = Path::new(trimmed);
    relative.components().all(|c| matches!(c, Component::Normal(_))).then_some(relative)
}

/// Opens `path` read-only and maps its full extent.
///
/// `Ok(None)` when the file does not exist or is not a regular file.
pub(crate) fn open_mapped(path: &Path) -> Result<Option<(File, Bytes)>, io::Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let file_metadata = file.metadata()?;
    if !file_metadata.is_file() {
        return Ok(None);
    }

    // zero length files can't be mapped on every platform
    if file_metadata.len() == 0 {
        return Ok(Some((file, Bytes::new())));
    }

    // SAFETY: the mapping is read-only and the served trees are not expected to be
    // truncated while a response is in flight, the same contract `sendfile` style servers
    // rely on.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some((file, Bytes::from_owner(mmap))))
}

/// Content type and length inferred from the file itself.
pub(crate) fn synthesize_metadata(path: &Path, len: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(CONTENT_TYPE.to_string(), content_type_for(path).to_string());
    metadata.insert(CONTENT_LENGTH.to_string(), len.to_string());
    metadata
}
