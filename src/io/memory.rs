use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{SinkError, SourceError};
use crate::feature::FeatureCollection;
use crate::io::{FeatureSink, FeatureSource, LayerHandle};

/// In-memory layers keyed by path, e.g. "birds/bird_001" or "roads".
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    layers: BTreeMap<PathBuf, FeatureCollection>,
}

impl MemorySource {
    pub fn new() -> Self { Self::default() }

    pub fn with_layer(mut self, path: impl Into<PathBuf>, layer: FeatureCollection) -> Self {
        self.insert(path, layer);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, layer: FeatureCollection) {
        self.layers.insert(path.into(), layer);
    }
}

impl FeatureSource for MemorySource {
    fn list(&self, folder: &Path) -> Result<Vec<LayerHandle>, SourceError> {
        Ok(self.layers.keys()
            .filter(|path| path.parent() == Some(folder))
            .map(|path| LayerHandle::new(super::layer_name(path), path.clone()))
            .collect())
    }

    fn read(&self, handle: &LayerHandle) -> Result<FeatureCollection, SourceError> {
        self.layers.get(&handle.path).cloned()
            .ok_or_else(|| SourceError::Missing { name: handle.path.display().to_string() })
    }

    fn read_layer(&self, name: &str) -> Result<FeatureCollection, SourceError> {
        self.layers.get(Path::new(name)).cloned()
            .ok_or_else(|| SourceError::Missing { name: name.to_string() })
    }
}

/// Collects written layers in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    layers: BTreeMap<String, FeatureCollection>,
}

impl MemorySink {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, name: &str) -> Option<&FeatureCollection> { self.layers.get(name) }

    /// Names of written layers, sorted.
    pub fn names(&self) -> Vec<&str> { self.layers.keys().map(String::as_str).collect() }

    #[inline] pub fn is_empty(&self) -> bool { self.layers.is_empty() }
}

impl FeatureSink for MemorySink {
    fn write(&mut self, name: &str, layer: &FeatureCollection) -> Result<(), SinkError> {
        self.layers.insert(name.to_string(), layer.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;
    use geoclip::Shape;

    fn layer(name: &str) -> FeatureCollection {
        FeatureCollection::from_shapes(name, vec![Shape::new(point! { x: 0.0, y: 0.0 })])
    }

    #[test]
    fn list_returns_direct_children_sorted() {
        let source = MemorySource::new()
            .with_layer("birds/b", layer("b"))
            .with_layer("birds/a", layer("a"))
            .with_layer("birds/old/c", layer("c"))
            .with_layer("roads", layer("roads"));

        let handles = source.list(Path::new("birds")).unwrap();
        assert_eq!(handles.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(source.read(&handles[1]).unwrap().name, "b");
        assert!(source.read_layer("roads").is_ok());
        assert!(matches!(source.read_layer("wetlands"), Err(SourceError::Missing { .. })));
    }

    #[test]
    fn sink_overwrites() {
        let mut sink = MemorySink::new();
        sink.write("out", &layer("first")).unwrap();
        sink.write("out", &FeatureCollection::new("second")).unwrap();
        assert_eq!(sink.names(), vec!["out"]);
        assert!(sink.get("out").unwrap().is_empty());
    }
}
