//! Thumbnail cache: derived images generated on first request and persisted in a shadow
//! tree next to a JSON metadata sidecar.
//!
//! For a source `<source_root>/<rel>` the derived file is
//! `<shadow_root>/<rel>.<extension>` and its sidecar `<shadow_root>/.meta/<rel>`. Once the
//! derived file exists it is served as is, generation only happens on a miss, under a
//! per-path lock so concurrent requests for the same image generate it once.

use super::{
    CONTENT_LENGTH, CONTENT_TYPE, ContentError, ContentInfo, ContentProvider, Metadata, content_type_for, open_mapped,
    relative_path, synthesize_metadata,
};
use dashmap::DashMap;
use image::ImageFormat;
use image::imageops::FilterType;
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_SHADOW_DIR: &str = ".thumb";
const META_DIR: &str = ".meta";

/// Target box and extension of the derived images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub extension: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { width: 150, height: 100, extension: "jpg".to_string() }
    }
}

/// Produces the derived image bytes from the source image bytes.
#[cfg_attr(test, mockall::automock)]
pub trait ImageResizer: Send + Sync {
    fn resize(&self, source: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ContentError>;
}

/// Scales an image to fit the target box, keeping its aspect ratio, and encodes it as
/// JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegThumbnailer;

impl ImageResizer for JpegThumbnailer {
    fn resize(&self, source: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ContentError> {
        let image = image::load_from_memory(source)?;
        let thumbnail = image.resize(width, height, FilterType::Triangle);

        // jpeg has no alpha channel
        let rgb = image::DynamicImage::ImageRgb8(thumbnail.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    }
}

pub struct ThumbnailProvider {
    source_root: PathBuf,
    shadow_root: PathBuf,
    meta_root: PathBuf,
    config: ThumbnailConfig,
    resizer: Box<dyn ImageResizer>,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl ThumbnailProvider {
    /// Creates the shadow tree and its metadata directory if missing.
    pub fn new(source_root: impl Into<PathBuf>, shadow_root: impl Into<PathBuf>) -> io::Result<Self> {
        let shadow_root = shadow_root.into();
        let meta_root = shadow_root.join(META_DIR);
        fs::create_dir_all(&meta_root)?;

        Ok(Self {
            source_root: source_root.into(),
            shadow_root,
            meta_root,
            config: ThumbnailConfig::default(),
            resizer: Box::new(JpegThumbnailer),
            locks: DashMap::new(),
        })
    }

    /// Shadow tree at `<source_root>/.thumb`.
    pub fn under_source(source_root: impl Into<PathBuf>) -> io::Result<Self> {
        let source_root = source_root.into();
        let shadow_root = source_root.join(DEFAULT_SHADOW_DIR);
        Self::new(source_root, shadow_root)
    }

    #[must_use]
    pub fn with_config(mut self, config: ThumbnailConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_resizer<R: ImageResizer + 'static>(mut self, resizer: R) -> Self {
        self.resizer = Box::new(resizer);
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn shadow_root(&self) -> &Path {
        &self.shadow_root
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    /// The source path mirrored under the shadow root, with the configured extension
    /// appended unless it is empty.
    fn derived_path(&self, relative: &Path) -> PathBuf {
        let mut name = self.shadow_root.join(relative).into_os_string();
        let extension = self.config.extension.trim_start_matches('.');
        if !extension.is_empty() {
            name.push(".");
            name.push(extension);
        }
        PathBuf::from(name)
    }

    fn lock_for(&self, derived: &Path) -> Arc<Mutex<()>> {
        let entry = self.locks.entry(derived.to_path_buf()).or_default();
        Arc::clone(entry.value())
    }

    fn resolve_relative(&self, relative: &Path) -> Result<Option<ContentInfo>, ContentError> {
        let derived = self.derived_path(relative);
        let meta_path = self.meta_root.join(relative);

        let lock = self.lock_for(&derived);
        let _guard = lock.lock();

        if !derived.is_file() && !self.generate(relative, &derived, &meta_path)? {
            return Ok(None);
        }

        let Some((file, content)) = open_mapped(&derived)? else {
            return Ok(None);
        };
        let metadata = match read_sidecar(&meta_path)? {
            Some(metadata) => metadata,
            None => {
                debug!(path = %derived.display(), "no sidecar, synthesizing thumbnail metadata");
                synthesize_metadata(&derived, content.len())
            }
        };

        Ok(Some(ContentInfo { path: derived, file, content, metadata, resolved_by: Vec::new() }))
    }

    /// `Ok(false)` when there is no source image to derive from.
    fn generate(&self, relative: &Path, derived: &Path, meta_path: &Path) -> Result<bool, ContentError> {
        let source_path = self.source_root.join(relative);
        match fs::metadata(&source_path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let source = fs::read(&source_path)?;
        let thumbnail = self.resizer.resize(&source, self.config.width, self.config.height)?;
        write_atomically(derived, &thumbnail)?;

        let mut metadata = Metadata::new();
        metadata.insert(CONTENT_TYPE.to_string(), content_type_for(derived).to_string());
        metadata.insert(CONTENT_LENGTH.to_string(), thumbnail.len().to_string());
        write_atomically(meta_path, &serde_json::to_vec(&metadata)?)?;

        info!(source = %source_path.display(), len = thumbnail.len(), "thumbnail generated");
        Ok(true)
    }
}

impl ContentProvider for ThumbnailProvider {
    fn resolve(&self, path: &str) -> Option<ContentInfo> {
        let relative = relative_path(path)?;

        match self.resolve_relative(relative) {
            Ok(info) => info,
            Err(e) => {
                warn!(cause = %e, path, "can't resolve thumbnail");
                None
            }
        }
    }
}

impl std::fmt::Debug for ThumbnailProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailProvider")
            .field("source_root", &self.source_root)
            .field("shadow_root", &self.shadow_root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reads a sidecar, keeping string values as is and any other JSON value as its text.
fn read_sidecar(meta_path: &Path) -> Result<Option<Metadata>, ContentError> {
    let raw = match fs::read(meta_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&raw)?;
    let metadata = object
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect();
    Ok(Some(metadata))
}

/// Writes through a temporary file in the target directory, so readers never observe a
/// partially written file.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ContentError> {
    let dir = path.parent().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
