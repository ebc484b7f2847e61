//! The metadata engine: adapter registry and unified operation surface.
//!
//! The registry maps file extensions to adapter instances (several
//! extensions may share one adapter). It is populated once at construction
//! and read-only afterwards, so an engine can be shared across threads —
//! but callers must serialize concurrent operations against the same file
//! path themselves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::MetadataAdapter;
use crate::adapters::{GifAdapter, JpegAdapter, PngAdapter, TiffAdapter, WebpAdapter};
use crate::config::Config;
use crate::error::{MetadataError, Result};
use crate::metadata::ImageMetadata;
use crate::safety::FileSafetyManager;

/// Fixed map from sniffed image MIME types to a canonical registry extension.
const MIME_MAP: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/tiff", "tiff"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

/// Batch operations supported by [`MetadataEngine::batch_process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    /// Strip all metadata in place (or into the output directory).
    Strip,
    /// Strip only GPS/location keys.
    StripGps,
    /// Export metadata to a `<stem>_metadata.json` sidecar.
    Export,
}

/// Central dispatcher for all metadata operations.
///
/// # Example
///
/// ```rust,no_run
/// use exif_sweep::engine::MetadataEngine;
///
/// let engine = MetadataEngine::new();
/// let meta = engine.read_metadata("photo.jpg".as_ref()).unwrap();
/// if meta.has_gps_data() {
///     engine.strip_gps_data("photo.jpg".as_ref(), None, true).unwrap();
/// }
/// ```
pub struct MetadataEngine {
    adapters: BTreeMap<String, Arc<dyn MetadataAdapter>>,
    safety: Arc<FileSafetyManager>,
    config: Config,
}

impl Default for MetadataEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataEngine {
    /// Engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Engine with an explicit configuration value.
    pub fn with_config(config: Config) -> Self {
        let safety = Arc::new(match &config.backup.directory {
            Some(dir) => FileSafetyManager::with_backup_dir(dir),
            None => FileSafetyManager::new(),
        });

        let built: [Arc<dyn MetadataAdapter>; 5] = [
            Arc::new(JpegAdapter::new(safety.clone(), config.integrity.clone())),
            Arc::new(PngAdapter::new(safety.clone(), config.integrity.clone())),
            Arc::new(TiffAdapter::new(safety.clone(), config.integrity.clone())),
            Arc::new(GifAdapter::new(safety.clone(), config.integrity.clone())),
            Arc::new(WebpAdapter::new(safety.clone(), config.integrity.clone())),
        ];

        let mut adapters: BTreeMap<String, Arc<dyn MetadataAdapter>> = BTreeMap::new();
        for adapter in built {
            for ext in adapter.supported_formats() {
                adapters.insert((*ext).to_string(), adapter.clone());
                log::debug!("Registered {} adapter for .{ext}", adapter.format_name());
            }
        }

        Self {
            adapters,
            safety,
            config,
        }
    }

    /// The file safety manager shared by every adapter.
    pub fn safety_manager(&self) -> &FileSafetyManager {
        &self.safety
    }

    /// Resolve the adapter for a file: extension lookup first, then content
    /// MIME sniffing through the fixed MIME map.
    pub fn get_adapter(&self, path: &Path) -> Result<Arc<dyn MetadataAdapter>> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if let Some(adapter) = self.adapters.get(&extension) {
            return Ok(adapter.clone());
        }

        if let Ok(Some(kind)) = infer::get_from_path(path) {
            if let Some((_, ext)) = MIME_MAP.iter().find(|(mime, _)| *mime == kind.mime_type()) {
                if let Some(adapter) = self.adapters.get(*ext) {
                    log::debug!(
                        "Resolved {} by content sniffing ({})",
                        path.display(),
                        kind.mime_type()
                    );
                    return Ok(adapter.clone());
                }
            }
        }

        Err(MetadataError::UnsupportedFormat { format: extension })
    }

    /// Read all metadata from `path`.
    pub fn read_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        let adapter = self.get_adapter(path)?;
        log::info!(
            "Reading metadata from {} using {} adapter",
            path.display(),
            adapter.format_name()
        );
        adapter.read_metadata(path)
    }

    /// Write `metadata` back to its image. `output_path` overrides the
    /// destination; when overwriting in place with `create_backup`, a backup
    /// is taken here — backup policy is the engine's job, not the adapters'.
    pub fn write_metadata(
        &self,
        metadata: &ImageMetadata,
        output_path: Option<&Path>,
        create_backup: bool,
    ) -> Result<PathBuf> {
        let adapter = self.get_adapter(&metadata.file_path)?;
        let overwrites = output_path.is_none_or(|p| p == metadata.file_path);
        if create_backup && overwrites {
            self.safety.create_backup(&metadata.file_path, None)?;
        }
        adapter.write_metadata(metadata, output_path)
    }

    /// Remove metadata from `path`. See
    /// [`MetadataAdapter::strip_metadata`] for `gps_only` semantics.
    pub fn strip_metadata(
        &self,
        path: &Path,
        output_path: Option<&Path>,
        create_backup: bool,
        gps_only: bool,
    ) -> Result<PathBuf> {
        let adapter = self.get_adapter(path)?;
        let overwrites = output_path.is_none_or(|p| p == path);
        if create_backup && overwrites {
            self.safety.create_backup(path, None)?;
        }
        adapter.strip_metadata(path, output_path, gps_only)
    }

    /// Remove GPS/location keys: a composition of read, model-level strip,
    /// and write — it inherits the target format's write-path integrity
    /// checks.
    pub fn strip_gps_data(
        &self,
        path: &Path,
        output_path: Option<&Path>,
        create_backup: bool,
    ) -> Result<PathBuf> {
        let mut metadata = self.read_metadata(path)?;
        let removed = metadata.strip_gps_data();
        log::info!("Removed {removed} GPS-related metadata entries");
        self.write_metadata(&metadata, output_path, create_backup)
    }

    /// Keep only keys whose lowercase form contains one of the `keep`
    /// patterns; remove everything else.
    pub fn strip_selective(
        &self,
        path: &Path,
        output_path: Option<&Path>,
        create_backup: bool,
        keep: &[String],
    ) -> Result<PathBuf> {
        let mut metadata = self.read_metadata(path)?;
        let removed = metadata.strip_except(keep);
        log::info!("Removed {removed} metadata entries (kept patterns: {})", keep.join(", "));
        self.write_metadata(&metadata, output_path, create_backup)
    }

    /// Export metadata as canonical JSON to `export_path`.
    pub fn export_metadata(&self, path: &Path, export_path: &Path) -> Result<PathBuf> {
        let metadata = self.read_metadata(path)?;
        std::fs::write(export_path, metadata.to_json())?;
        log::info!("Exported metadata to {}", export_path.display());
        Ok(export_path.to_path_buf())
    }

    /// Restore previously exported metadata onto `path`.
    ///
    /// The export's `file_path` is rebound to the restoration target before
    /// writing.
    pub fn restore_metadata(
        &self,
        path: &Path,
        metadata_path: &Path,
        create_backup: bool,
    ) -> Result<PathBuf> {
        let json = std::fs::read_to_string(metadata_path)?;
        let mut metadata = ImageMetadata::from_json(&json)?;
        metadata.file_path = path.to_path_buf();
        self.write_metadata(&metadata, None, create_backup)
    }

    /// All registered extensions.
    pub fn get_supported_formats(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Whether the file carries any metadata. Read failures count as "no".
    pub fn has_metadata(&self, path: &Path) -> bool {
        self.read_metadata(path)
            .map(|m| m.has_metadata())
            .unwrap_or(false)
    }

    /// Whether the file carries GPS/location keys. Read failures count as "no".
    pub fn has_gps_data(&self, path: &Path) -> bool {
        self.read_metadata(path)
            .map(|m| m.has_gps_data())
            .unwrap_or(false)
    }

    /// Delete old backups for `path` beyond the configured keep count.
    pub fn cleanup_backups(&self, path: &Path) -> usize {
        self.safety.cleanup_backups(path, self.config.backup.keep_count)
    }

    /// Run one operation over many files, collecting per-file results.
    /// One bad file never aborts the batch.
    pub fn batch_process(
        &self,
        paths: &[PathBuf],
        operation: BatchOperation,
        output_dir: Option<&Path>,
        create_backup: bool,
    ) -> BTreeMap<String, Result<PathBuf>> {
        let mut results = BTreeMap::new();

        for path in paths {
            let result = match operation {
                BatchOperation::Strip => {
                    let output = output_dir.map(|d| d.join(path.file_name().unwrap_or_default()));
                    self.strip_metadata(path, output.as_deref(), create_backup, false)
                }
                BatchOperation::StripGps => {
                    let output = output_dir.map(|d| d.join(path.file_name().unwrap_or_default()));
                    self.strip_gps_data(path, output.as_deref(), create_backup)
                }
                BatchOperation::Export => {
                    let name = format!(
                        "{}_metadata.json",
                        path.file_stem().unwrap_or_default().to_string_lossy()
                    );
                    let export = match output_dir {
                        Some(dir) => dir.join(name),
                        None => path.parent().unwrap_or(Path::new(".")).join(name),
                    };
                    self.export_metadata(path, &export)
                }
            };

            if let Err(e) = &result {
                log::error!("Batch operation failed for {}: {e}", path.display());
            }
            results.insert(path.to_string_lossy().into_owned(), result);
        }

        results
    }

    /// Privacy report for a file: `(block, key)` pairs that look sensitive.
    pub fn privacy_report(&self, path: &Path) -> Result<Vec<(String, String)>> {
        let metadata = self.read_metadata(path)?;
        Ok(metadata
            .privacy_sensitive_keys()
            .into_iter()
            .map(|(block, key)| (block.to_string(), key))
            .collect())
    }

    /// The engine's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
