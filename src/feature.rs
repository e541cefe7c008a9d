use std::{collections::BTreeMap, fmt};

use geo::MultiPolygon;
use geoclip::{Normalizer, RepairReport, Shape, ShapeKind};
use serde::{Deserialize, Serialize};

/// Fields that identify a feature and survive [`FieldPolicy::StripAll`].
pub const IDENTIFIER_FIELDS: [&str; 4] = ["FID", "OBJECTID", "OBJECTID_1", "ID"];

/// An attribute value, passed through the pipeline unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Null,
    Text(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    /// Calendar date as `YYYY-MM-DD`.
    Date(String),
}

impl AttrValue {
    /// Type of the value, `None` for nulls.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            AttrValue::Null => None,
            AttrValue::Text(_) => Some(FieldType::Text),
            AttrValue::Number(_) | AttrValue::Integer(_) => Some(FieldType::Number),
            AttrValue::Boolean(_) => Some(FieldType::Boolean),
            AttrValue::Date(_) => Some(FieldType::Date),
        }
    }
}

/// Field name to value, ordered by name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Field type as seen in the data. Integers and reals are both `Number`,
/// since one dBase numeric column can hold either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Date,
}

impl FieldType {
    pub fn to_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// `None` when every value of the field is null.
    #[serde(rename = "type")]
    pub ty: Option<FieldType>,
}

impl FieldDef {
    /// Same name, and the types agree wherever both are known.
    pub fn is_compatible(&self, other: &FieldDef) -> bool {
        self.name == other.name && match (self.ty, other.ty) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Geometry kind plus attribute fields (sorted by name) of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// `None` for a layer without features.
    pub kind: Option<ShapeKind>,
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Infer a schema from features. Null (empty) geometries are ignored, mixed
    /// geometry families yield [`ShapeKind::Collection`], and a field that is
    /// null everywhere stays untyped.
    pub fn infer(shapes: &[Shape], attributes: &[Attributes]) -> Self {
        let kind = shapes.iter()
            .filter(|shape| !shape.is_empty())
            .map(Shape::kind)
            .reduce(|a, b| if a == b { a } else { ShapeKind::Collection });

        let mut fields: BTreeMap<&str, Option<FieldType>> = BTreeMap::new();
        for (name, value) in attributes.iter().flatten() {
            let ty = fields.entry(name.as_str()).or_default();
            if ty.is_none() { *ty = value.field_type() }
        }

        Self {
            kind,
            fields: fields.into_iter()
                .map(|(name, ty)| FieldDef { name: name.to_string(), ty })
                .collect(),
        }
    }

    /// Same geometry kind and field names, with no field typed differently.
    /// Untyped (all-null) fields match any type.
    pub fn is_compatible(&self, other: &Schema) -> bool {
        self.kind == other.kind
            && self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a.is_compatible(b))
    }

    /// Fill untyped fields with the types `other` knows.
    pub fn refine(&mut self, other: &Schema) {
        for (field, known) in self.fields.iter_mut().zip(&other.fields) {
            if field.ty.is_none() && field.name == known.name { field.ty = known.ty }
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.map_or("empty", |kind| kind.to_str()))?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 { write!(f, ", ")? }
            write!(f, "{}: {}", field.name, field.ty.map_or("null", |ty| ty.to_str()))?;
        }
        write!(f, ")")
    }
}

/// Which attribute fields survive ingestion. Geometry is always kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    #[default]
    KeepAll,
    /// Drop every field except the identifier fields.
    StripAll,
    /// Keep the named fields and the identifier fields.
    Keep(Vec<String>),
}

impl FieldPolicy {
    pub fn keeps(&self, field: &str) -> bool {
        let is_identifier = IDENTIFIER_FIELDS.iter().any(|id| id.eq_ignore_ascii_case(field));
        match self {
            FieldPolicy::KeepAll => true,
            FieldPolicy::StripAll => is_identifier,
            FieldPolicy::Keep(names) => is_identifier || names.iter().any(|name| name == field),
        }
    }

    pub fn apply(&self, attributes: &mut Attributes) {
        if *self != FieldPolicy::KeepAll {
            attributes.retain(|name, _| self.keeps(name));
        }
    }
}

/// A named layer of features stored column-wise: `shapes[i]` carries `attributes[i]`.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub name: String,
    /// Coordinate system of the layer, carried for provenance only.
    pub epsg: Option<u32>,
    pub shapes: Vec<Shape>,
    pub attributes: Vec<Attributes>,
}

impl FeatureCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_epsg(mut self, epsg: Option<u32>) -> Self {
        self.epsg = epsg;
        self
    }

    /// Features without attributes.
    pub fn from_shapes(name: impl Into<String>, shapes: Vec<Shape>) -> Self {
        let attributes = vec![Attributes::new(); shapes.len()];
        Self { name: name.into(), epsg: None, shapes, attributes }
    }

    /// A dissolved polygon set as one feature with `ID = 0`,
    /// or an empty layer if the set is empty.
    pub fn from_polygons(name: impl Into<String>, polygons: &MultiPolygon<f64>) -> Self {
        let mut layer = Self::new(name);
        if !polygons.0.is_empty() {
            layer.push(
                Shape::new(polygons.clone()),
                Attributes::from([("ID".to_string(), AttrValue::Integer(0))]),
            );
        }
        layer
    }

    pub fn push(&mut self, shape: Shape, attributes: Attributes) {
        self.shapes.push(shape);
        self.attributes.push(attributes);
    }

    #[inline] pub fn len(&self) -> usize { self.shapes.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.shapes.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&Shape, &Attributes)> {
        self.shapes.iter().zip(&self.attributes)
    }

    pub fn schema(&self) -> Schema {
        Schema::infer(&self.shapes, &self.attributes)
    }

    pub fn apply_policy(&mut self, policy: &FieldPolicy) {
        self.attributes.iter_mut().for_each(|attributes| policy.apply(attributes));
    }

    /// Repair every geometry and delete nulls, keeping attributes aligned.
    pub fn normalized(&self, normalizer: &Normalizer) -> (Self, RepairReport) {
        let mut report = RepairReport::default();
        let mut out = Self::new(self.name.clone()).with_epsg(self.epsg);
        for (shape, attributes) in self.iter() {
            if let Some(shape) = normalizer.shape(shape, &mut report) {
                out.push(shape, attributes.clone());
            }
        }
        (out, report)
    }

    /// Concatenate layers in order under a new name. The first known EPSG wins.
    pub fn merge(name: impl Into<String>, layers: impl IntoIterator<Item = FeatureCollection>) -> Self {
        let mut out = Self::new(name);
        for layer in layers {
            out.epsg = out.epsg.or(layer.epsg);
            out.shapes.extend(layer.shapes);
            out.attributes.extend(layer.attributes);
        }
        out
    }
}
