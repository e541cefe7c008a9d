use std::{fs, io, iter, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use geoclip::Shape;
use serde_json::{json, Map, Value};

use crate::common::{list_files, write_atomic};
use crate::error::{SinkError, SourceError};
use crate::feature::{AttrValue, Attributes, FeatureCollection};
use crate::io::{layer_name, layer_path, FeatureSink, FeatureSource, LayerHandle};

const EXTENSIONS: [&str; 2] = ["geojson", "json"];

/// Reads `.geojson` / `.json` feature collections below a root directory.
#[derive(Debug, Clone)]
pub struct GeoJsonSource {
    root: PathBuf,
}

impl GeoJsonSource {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn read_path(&self, path: &Path) -> Result<FeatureCollection, SourceError> {
        if !path.is_file() {
            return Err(SourceError::Missing { name: path.display().to_string() });
        }
        let bytes = fs::read(path)
            .map_err(|source| SourceError::Io { path: path.to_path_buf(), source })?;
        read_from_geojson_bytes(&layer_name(path), &bytes)
            .map_err(|err| SourceError::Parse { path: path.to_path_buf(), message: format!("{err:#}") })
    }
}

impl FeatureSource for GeoJsonSource {
    fn list(&self, folder: &Path) -> Result<Vec<LayerHandle>, SourceError> {
        let dir = self.root.join(folder);
        let files = list_files(&dir, &EXTENSIONS)
            .map_err(|err| SourceError::Io { path: dir.clone(), source: io::Error::other(format!("{err:#}")) })?;
        Ok(files.into_iter().map(|path| LayerHandle::new(layer_name(&path), path)).collect())
    }

    fn read(&self, handle: &LayerHandle) -> Result<FeatureCollection, SourceError> {
        self.read_path(&handle.path)
    }

    fn read_layer(&self, name: &str) -> Result<FeatureCollection, SourceError> {
        self.read_path(&layer_path(&self.root, name, "geojson"))
    }
}

/// Writes each layer to `<dir>/<name>.geojson`, atomically.
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    dir: PathBuf,
}

impl GeoJsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn path(&self, name: &str) -> PathBuf { self.dir.join(format!("{name}.geojson")) }
}

impl FeatureSink for GeoJsonSink {
    fn write(&mut self, name: &str, layer: &FeatureCollection) -> Result<(), SinkError> {
        let path = self.path(name);
        let bytes = write_to_geojson_bytes(layer)
            .map_err(|err| SinkError::Encode { path: path.clone(), message: format!("{err:#}") })?;
        write_atomic(&path, &bytes)
            .map_err(|err| SinkError::Io { path: path.clone(), source: io::Error::other(format!("{err:#}")) })?;
        tracing::debug!(layer = name, features = layer.len(), path = %path.display(), "wrote GeoJSON layer");
        Ok(())
    }
}

/// Write a layer to GeoJSON bytes. Null geometries are written as `null`.
pub(crate) fn write_to_geojson_bytes(layer: &FeatureCollection) -> Result<Vec<u8>> {
    let features: Vec<Value> = layer.iter()
        .map(|(shape, attributes)| json!({
            "type": "Feature",
            "geometry": geometry_to_json(shape.geometry()),
            "properties": attributes.iter()
                .map(|(name, value)| (name.clone(), attr_to_json(value)))
                .collect::<Map<String, Value>>(),
        }))
        .collect();

    let mut collection = json!({
        "type": "FeatureCollection",
        "name": layer.name,
        "features": features,
    });
    if let Some(epsg) = layer.epsg {
        collection["crs"] = json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{epsg}") },
        });
    }

    serde_json::to_vec(&collection).context("Failed to serialize GeoJSON to bytes")
}

/// Read a layer from GeoJSON bytes (a FeatureCollection or a single Feature).
pub(crate) fn read_from_geojson_bytes(name: &str, bytes: &[u8]) -> Result<FeatureCollection> {
    let value: Value = serde_json::from_slice(bytes).context("Failed to parse GeoJSON bytes")?;
    let mut layer = FeatureCollection::new(name).with_epsg(epsg_from_crs(&value));

    match value["type"].as_str() {
        Some("FeatureCollection") => {
            let features = value["features"].as_array()
                .context("Invalid FeatureCollection: missing features array")?;
            for (idx, feature) in features.iter().enumerate() {
                let (shape, attributes) = parse_feature(feature)
                    .with_context(|| format!("Invalid feature at index {idx}"))?;
                layer.push(shape, attributes);
            }
        }
        Some("Feature") => {
            let (shape, attributes) = parse_feature(&value)?;
            layer.push(shape, attributes);
        }
        other => bail!("Expected a FeatureCollection or Feature, found {other:?}"),
    }
    Ok(layer)
}

fn parse_feature(feature: &Value) -> Result<(Shape, Attributes)> {
    let geometry = match &feature["geometry"] {
        Value::Null => Geometry::GeometryCollection(GeometryCollection(Vec::new())),
        geometry => parse_geometry(geometry)?,
    };
    let attributes = feature["properties"].as_object()
        .map(|props| props.iter().map(|(k, v)| (k.clone(), attr_from_json(v))).collect())
        .unwrap_or_default();
    Ok((Shape::new(geometry), attributes))
}

fn parse_geometry(geometry: &Value) -> Result<Geometry<f64>> {
    let coords = &geometry["coordinates"];
    Ok(match geometry["type"].as_str() {
        Some("Point") => Geometry::Point(Point::from(parse_coord(coords)?)),
        Some("MultiPoint") => Geometry::MultiPoint(MultiPoint::new(
            parse_coords(coords)?.into_iter().map(Point::from).collect()
        )),
        Some("LineString") => Geometry::LineString(LineString::new(parse_coords(coords)?)),
        Some("MultiLineString") => Geometry::MultiLineString(MultiLineString::new(
            array(coords)?.iter()
                .map(|line| parse_coords(line).map(LineString::new))
                .collect::<Result<_>>()?
        )),
        Some("Polygon") => Geometry::Polygon(parse_polygon(coords)?),
        Some("MultiPolygon") => Geometry::MultiPolygon(MultiPolygon::new(
            array(coords)?.iter().map(parse_polygon).collect::<Result<_>>()?
        )),
        Some("GeometryCollection") => Geometry::GeometryCollection(GeometryCollection(
            array(&geometry["geometries"])?.iter().map(parse_geometry).collect::<Result<_>>()?
        )),
        other => bail!("Unsupported geometry type: {other:?}"),
    })
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value.as_array().context("Expected a JSON array")
}

/// Parse a position: [x, y, ...]. Extra ordinates are ignored.
fn parse_coord(value: &Value) -> Result<Coord<f64>> {
    match array(value)?.as_slice() {
        [x, y, ..] => Ok(Coord {
            x: x.as_f64().context("Invalid coordinate: x must be a number")?,
            y: y.as_f64().context("Invalid coordinate: y must be a number")?,
        }),
        _ => bail!("Invalid coordinate: expected at least two numbers"),
    }
}

fn parse_coords(value: &Value) -> Result<Vec<Coord<f64>>> {
    array(value)?.iter().map(parse_coord).collect()
}

/// Parse polygon rings: the first is the exterior, the rest are holes.
/// Rings are closed if needed.
fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(value)?.iter()
        .map(|ring| parse_coords(ring).map(|coords| {
            let mut ring = LineString::new(coords);
            ring.close();
            ring
        }))
        .collect::<Result<Vec<_>>>()?
        .into_iter();
    let exterior = rings.next().context("Invalid Polygon: missing exterior ring")?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn geometry_to_json(geometry: &Geometry<f64>) -> Value {
    fn coord(c: &Coord<f64>) -> Value { json!([c.x, c.y]) }

    fn line(ls: &LineString<f64>) -> Value { Value::Array(ls.coords().map(coord).collect()) }

    fn polygon(p: &Polygon<f64>) -> Value {
        Value::Array(iter::once(p.exterior()).chain(p.interiors()).map(line).collect())
    }

    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": coord(&p.0) }),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| coord(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::Line(l) => json!({ "type": "LineString", "coordinates": [coord(&l.start), coord(&l.end)] }),
        Geometry::LineString(ls) => json!({ "type": "LineString", "coordinates": line(ls) }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(line).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({ "type": "Polygon", "coordinates": polygon(p) }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon).collect::<Vec<_>>(),
        }),
        Geometry::Rect(r) => json!({ "type": "Polygon", "coordinates": polygon(&r.to_polygon()) }),
        Geometry::Triangle(t) => json!({ "type": "Polygon", "coordinates": polygon(&t.to_polygon()) }),
        Geometry::GeometryCollection(gc) if gc.0.is_empty() => Value::Null,
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.0.iter().map(geometry_to_json).collect::<Vec<_>>(),
        }),
    }
}

fn attr_to_json(value: &AttrValue) -> Value {
    match value {
        AttrValue::Null => Value::Null,
        AttrValue::Text(s) | AttrValue::Date(s) => Value::String(s.clone()),
        AttrValue::Number(n) => json!(n),
        AttrValue::Integer(i) => json!(i),
        AttrValue::Boolean(b) => Value::Bool(*b),
    }
}

fn attr_from_json(value: &Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(b) => AttrValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttrValue::Integer(i),
            None => n.as_f64().map_or(AttrValue::Null, AttrValue::Number),
        },
        Value::String(s) => AttrValue::Text(s.clone()),
        other => AttrValue::Text(other.to_string()),
    }
}

/// EPSG code from a named `crs` member ("EPSG:26986" or "urn:ogc:def:crs:EPSG::26986").
fn epsg_from_crs(value: &Value) -> Option<u32> {
    let name = value["crs"]["properties"]["name"].as_str()?;
    let (authority, code) = name.rsplit_once(':')?;
    authority.to_ascii_uppercase().contains("EPSG").then(|| code.parse().ok()).flatten()
}
