//! Layer sources and sinks.
//!
//! The pipeline only sees the [`FeatureSource`] and [`FeatureSink`] traits;
//! concrete formats (shapefile, GeoJSON, in-memory) live behind them.

mod geojson;
mod memory;
mod shp;

use std::path::{Path, PathBuf};

pub use geojson::{GeoJsonSink, GeoJsonSource};
pub use memory::{MemorySink, MemorySource};
pub use shp::{ShapefileSink, ShapefileSource};

use crate::error::{SinkError, SourceError};
use crate::feature::FeatureCollection;

/// A readable layer found by [`FeatureSource::list`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LayerHandle {
    /// Layer name (file stem for file-backed sources).
    pub name: String,
    pub path: PathBuf,
}

impl LayerHandle {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }
}

/// Read-only access to layers.
pub trait FeatureSource: Send + Sync {
    /// Layers directly inside `folder`, sorted by name.
    fn list(&self, folder: &Path) -> Result<Vec<LayerHandle>, SourceError>;

    fn read(&self, handle: &LayerHandle) -> Result<FeatureCollection, SourceError>;

    /// Read a single named layer (e.g. "roads").
    fn read_layer(&self, name: &str) -> Result<FeatureCollection, SourceError>;
}

/// Write access to layers. Writing an existing name replaces it.
pub trait FeatureSink: Send {
    fn write(&mut self, name: &str, layer: &FeatureCollection) -> Result<(), SinkError>;
}

/// Resolve a layer name against a source root, adding `extension` when the
/// name has none.
fn layer_path(root: &Path, name: &str, extension: &str) -> PathBuf {
    let path = root.join(name);
    if path.extension().is_some() { path } else { path.with_extension(extension) }
}

fn layer_name(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}
