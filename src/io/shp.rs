use std::{collections::HashMap, fs, io, path::{Path, PathBuf}};

use anyhow::{anyhow, bail, Context, Result};
use geo::{Geometry, GeometryCollection, LineString};
use geoclip::{Shape, ShapeKind};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Reader, Writer};

use crate::common::{ensure_dir_exists, geo_to_shp, lines_to_shp, list_files, point_to_shp, points_to_shp, shp_to_geo};
use crate::error::{SinkError, SourceError};
use crate::feature::{AttrValue, Attributes, FeatureCollection};
use crate::io::{layer_name, layer_path, FeatureSink, FeatureSource, LayerHandle};

/// Sidecar files written next to every `.shp`.
const PARTS: [&str; 3] = ["shp", "shx", "dbf"];

/// Reads ESRI shapefiles (`.shp` + `.shx` + `.dbf`) below a root directory.
#[derive(Debug, Clone)]
pub struct ShapefileSource {
    root: PathBuf,
    epsg: Option<u32>,
}

impl ShapefileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into(), epsg: None } }

    /// Tag every layer read with this EPSG code (`.prj` files are not parsed).
    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    fn read_path(&self, path: &Path) -> Result<FeatureCollection, SourceError> {
        if !path.is_file() {
            return Err(SourceError::Missing { name: path.display().to_string() });
        }
        let mut layer = read_from_shapefile(path)
            .map_err(|err| SourceError::Parse { path: path.to_path_buf(), message: format!("{err:#}") })?;
        layer.epsg = self.epsg;
        Ok(layer)
    }
}

impl FeatureSource for ShapefileSource {
    fn list(&self, folder: &Path) -> Result<Vec<LayerHandle>, SourceError> {
        let dir = self.root.join(folder);
        let files = list_files(&dir, &["shp"])
            .map_err(|err| SourceError::Io { path: dir.clone(), source: io::Error::other(format!("{err:#}")) })?;
        Ok(files.into_iter().map(|path| LayerHandle::new(layer_name(&path), path)).collect())
    }

    fn read(&self, handle: &LayerHandle) -> Result<FeatureCollection, SourceError> {
        self.read_path(&handle.path)
    }

    fn read_layer(&self, name: &str) -> Result<FeatureCollection, SourceError> {
        self.read_path(&layer_path(&self.root, name, "shp"))
    }
}

/// Reads all shapes + attribute records from a given `.shp` file path.
pub(crate) fn read_from_shapefile(path: &Path) -> Result<FeatureCollection> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut layer = FeatureCollection::new(layer_name(path));
    for (idx, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.context("Error reading shape+record")?;
        let geometry = shp_to_geo(&shape)
            .with_context(|| format!("Error converting shape {idx} in {}", path.display()))?
            .unwrap_or_else(|| Geometry::GeometryCollection(GeometryCollection(Vec::new())));
        layer.push(Shape::new(geometry), record_to_attributes(record));
    }
    Ok(layer)
}

fn record_to_attributes(record: Record) -> Attributes {
    HashMap::<String, FieldValue>::from(record).into_iter()
        .map(|(name, value)| {
            let value = match value {
                FieldValue::Character(Some(s)) => AttrValue::Text(s.trim().to_string()),
                FieldValue::Memo(s) => AttrValue::Text(s),
                FieldValue::Numeric(Some(n)) => AttrValue::Number(n),
                FieldValue::Float(Some(f)) => AttrValue::Number(f64::from(f)),
                FieldValue::Double(d) => AttrValue::Number(d),
                FieldValue::Integer(i) => AttrValue::Integer(i64::from(i)),
                FieldValue::Logical(Some(b)) => AttrValue::Boolean(b),
                FieldValue::Date(Some(d)) => {
                    AttrValue::Date(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
                }
                _ => AttrValue::Null,
            };
            (name, value)
        })
        .collect()
}

/// Writes each layer to `<dir>/<name>.shp` with its `.shx` and `.dbf`.
///
/// Only geometry and a numeric `ID` field are stored: the feature's own
/// integer `ID` attribute when it has one, its position otherwise.
#[derive(Debug, Clone)]
pub struct ShapefileSink {
    dir: PathBuf,
}

impl ShapefileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn path(&self, name: &str) -> PathBuf { self.dir.join(format!("{name}.shp")) }
}

impl FeatureSink for ShapefileSink {
    fn write(&mut self, name: &str, layer: &FeatureCollection) -> Result<(), SinkError> {
        let path = self.path(name);
        let kind = layer.schema().kind;
        if kind == Some(ShapeKind::Collection) {
            return Err(SinkError::Unsupported { name: name.to_string(), kind: ShapeKind::Collection.to_str() });
        }

        write_to_shapefile(&self.dir, name, layer)
            .map_err(|err| SinkError::Io { path: path.clone(), source: io::Error::other(format!("{err:#}")) })?;
        tracing::debug!(layer = name, features = layer.len(), path = %path.display(), "wrote shapefile layer");
        Ok(())
    }
}

fn feature_id(idx: usize, attributes: &Attributes) -> f64 {
    match attributes.get("ID") {
        Some(AttrValue::Integer(id)) => *id as f64,
        _ => idx as f64,
    }
}

/// Write into a scratch directory next to the target, then move the three
/// files into place so a failed write never leaves a partial layer.
fn write_to_shapefile(dir: &Path, name: &str, layer: &FeatureCollection) -> Result<()> {
    ensure_dir_exists(dir)?;
    let scratch = tempfile::Builder::new().prefix(".shp-").tempdir_in(dir)
        .with_context(|| format!("Failed to create scratch directory in {}", dir.display()))?;
    let tmp_path = scratch.path().join(format!("{name}.shp"));

    {
        let id = FieldName::try_from("ID").map_err(|err| anyhow!("invalid field name: {err:?}"))?;
        let table = TableWriterBuilder::new().add_numeric_field(id, 10, 0);
        let mut writer = Writer::from_path(&tmp_path, table)
            .with_context(|| format!("Failed to create shapefile: {}", tmp_path.display()))?;
        write_shapes(&mut writer, layer)?;
    }

    for ext in PARTS {
        let from = tmp_path.with_extension(ext);
        let to = dir.join(format!("{name}.{ext}"));
        fs::rename(&from, &to)
            .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
    }
    Ok(())
}

/// Write every non-null feature with the shape type its layer kind maps to.
/// Point layers holding any multipoint are written as multipoints.
fn write_shapes<W: io::Write + io::Seek>(writer: &mut Writer<W>, layer: &FeatureCollection) -> Result<()> {
    let kind = layer.schema().kind;
    let all_points = layer.shapes.iter()
        .all(|shape| shape.is_empty() || matches!(shape.geometry(), Geometry::Point(_)));

    for (idx, (shape, attributes)) in layer.iter().enumerate() {
        if shape.is_empty() { continue }

        let mut record = Record::default();
        record.insert("ID".to_string(), FieldValue::Numeric(Some(feature_id(idx, attributes))));

        let written = match (kind, shape.geometry()) {
            (Some(ShapeKind::Point), Geometry::Point(p)) if all_points => {
                writer.write_shape_and_record(&point_to_shp(p), &record)
            }
            (Some(ShapeKind::Point), Geometry::Point(p)) => {
                writer.write_shape_and_record(&points_to_shp(&[*p]), &record)
            }
            (Some(ShapeKind::Point), Geometry::MultiPoint(mp)) => {
                writer.write_shape_and_record(&points_to_shp(&mp.0), &record)
            }
            (Some(ShapeKind::Line), Geometry::Line(l)) => {
                let ls = LineString::new(vec![l.start, l.end]);
                writer.write_shape_and_record(&lines_to_shp(&[&ls]), &record)
            }
            (Some(ShapeKind::Line), Geometry::LineString(ls)) => {
                writer.write_shape_and_record(&lines_to_shp(&[ls]), &record)
            }
            (Some(ShapeKind::Line), Geometry::MultiLineString(mls)) => {
                writer.write_shape_and_record(&lines_to_shp(&mls.0.iter().collect::<Vec<_>>()), &record)
            }
            (Some(ShapeKind::Polygon), Geometry::Polygon(p)) => {
                writer.write_shape_and_record(&geo_to_shp(&p.clone().into()), &record)
            }
            (Some(ShapeKind::Polygon), Geometry::MultiPolygon(mp)) => {
                writer.write_shape_and_record(&geo_to_shp(mp), &record)
            }
            (Some(ShapeKind::Polygon), Geometry::Rect(r)) => {
                writer.write_shape_and_record(&geo_to_shp(&r.to_polygon().into()), &record)
            }
            (Some(ShapeKind::Polygon), Geometry::Triangle(t)) => {
                writer.write_shape_and_record(&geo_to_shp(&t.to_polygon().into()), &record)
            }
            (kind, geometry) => bail!("feature {idx} ({:?}) does not fit a {kind:?} layer", ShapeKind::of(geometry)),
        };
        written.with_context(|| format!("Error writing shape {idx}"))?;
    }
    Ok(())
}
