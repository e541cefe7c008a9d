use std::{f64::consts::PI, io, path::PathBuf};

use geo::{line_string, point, polygon, BoundingRect, Geometry};
use sprayzone::geoclip::Shape;
use sprayzone::io::{GeoJsonSink, GeoJsonSource, MemorySink, MemorySource, ShapefileSink, ShapefileSource};
use sprayzone::{
    AttrValue, Attributes, Configuration, FeatureCollection, FeatureSink, PipelineError, SinkError,
    SprayPipeline, Stage, Warning,
};

fn id(value: i64) -> Attributes {
    Attributes::from([("ID".to_string(), AttrValue::Integer(value))])
}

fn birds(name: &str, points: &[(f64, f64)]) -> FeatureCollection {
    let mut layer = FeatureCollection::new(name);
    for (i, &(x, y)) in points.iter().enumerate() {
        layer.push(Shape::new(point! { x: x, y: y }), id(i as i64));
    }
    layer
}

/// One road through the bird at the origin, one far from every bird.
fn roads() -> FeatureCollection {
    let mut layer = FeatureCollection::new("roads");
    layer.push(Shape::new(line_string![(x: -500.0, y: 0.0), (x: 500.0, y: 0.0)]), id(0));
    layer.push(Shape::new(line_string![(x: 50_000.0, y: 0.0), (x: 51_000.0, y: 0.0)]), id(1));
    layer
}

fn wetlands(covering_road: bool) -> FeatureCollection {
    let mut layer = FeatureCollection::new("wetlands");
    let wetland = if covering_road {
        polygon![(x: -1000.0, y: -500.0), (x: 1000.0, y: -500.0), (x: 1000.0, y: 500.0), (x: -1000.0, y: 500.0)]
    } else {
        polygon![(x: 60_000.0, y: 60_000.0), (x: 61_000.0, y: 60_000.0), (x: 61_000.0, y: 61_000.0), (x: 60_000.0, y: 61_000.0)]
    };
    layer.push(Shape::new(wetland), id(0));
    layer
}

fn source(covering_wetland: bool) -> MemorySource {
    MemorySource::new()
        .with_layer("birds/bird_a", birds("bird_a", &[(0.0, 0.0), (10_000.0, 0.0)]))
        .with_layer("birds/bird_b", birds("bird_b", &[(0.0, 10_000.0)]))
        .with_layer("roads", roads())
        .with_layer("wetlands", wetlands(covering_wetland))
}

#[test]
fn road_near_one_bird_is_partly_sprayable() {
    let mut sink = MemorySink::new();
    let report = SprayPipeline::new(Configuration::default()).run(&source(false), &mut sink).unwrap();

    assert_eq!(report.counts.observation_layers, 2);
    assert_eq!(report.counts.observations, 3);
    assert_eq!(report.counts.roads, 2);
    assert_eq!(report.counts.candidate_roads, 1);
    assert_eq!(report.counts.candidate_wetlands, 0);
    assert!(report.warnings.is_empty());

    let total = 3.0 * PI * 2000.0 * 2000.0;
    assert!(((report.total_area - total) / total).abs() < 1e-3);
    let spray = 1000.0 * 100.0 + PI * 50.0 * 50.0;
    assert!(((report.spray_area - spray) / spray).abs() < 1e-2);
    assert!(report.percent > 0.0 && report.percent < 100.0);

    let region = sink.get("spray_region").unwrap();
    assert_eq!(region.len(), 1);
    let bbox = region.shapes[0].geometry().bounding_rect().unwrap();
    assert!(bbox.min().x >= -2000.0 && bbox.max().x <= 2000.0);
    assert!(bbox.min().y >= -2000.0 && bbox.max().y <= 2000.0);

    assert_eq!(
        sink.names(),
        vec!["bird_buffer", "merged_points", "road_buffer", "spray_region", "wetland_buffer"],
    );
    assert_eq!(sink.get("merged_points").unwrap().len(), 3);
    assert!(sink.get("wetland_buffer").unwrap().is_empty());
    assert_eq!(sink.get("bird_buffer").unwrap().epsg, Some(26986));
}

#[test]
fn wetland_over_the_road_leaves_nothing_to_spray() {
    let mut sink = MemorySink::new();
    let report = SprayPipeline::new(Configuration::default()).run(&source(true), &mut sink).unwrap();

    assert_eq!(report.spray_area, 0.0);
    assert_eq!(report.percent, 0.0);
    assert!(report.total_area > 0.0);
    assert!(report.warnings.contains(&Warning::EmptyResult { stage: Stage::Erase }));
    assert!(sink.get("spray_region").unwrap().is_empty());
}

#[test]
fn no_birds_is_empty_input() {
    let source = MemorySource::new()
        .with_layer("birds/bird_a", FeatureCollection::new("bird_a"))
        .with_layer("roads", roads())
        .with_layer("wetlands", wetlands(false));
    let mut sink = MemorySink::new();

    let err = SprayPipeline::new(Configuration::default()).run(&source, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInput { stage: Stage::Ingest }));
    assert!(sink.is_empty());
}

#[test]
fn mismatched_schemas_write_nothing() {
    let mut extra = birds("bird_b", &[(0.0, 10_000.0)]);
    extra.attributes[0].insert("SPECIES".to_string(), AttrValue::Text("crow".to_string()));
    let source = source(false).with_layer("birds/bird_b", extra);
    let mut sink = MemorySink::new();

    let err = SprayPipeline::new(Configuration::default()).run(&source, &mut sink).unwrap_err();
    let PipelineError::SchemaMismatch { stage, layer, .. } = err else {
        panic!("expected a schema mismatch, got {err}");
    };
    assert_eq!(stage, Stage::Ingest);
    assert_eq!(layer, "bird_b");
    assert!(sink.is_empty());
}

#[test]
fn strip_all_reconciles_differing_fields() {
    let mut extra = birds("bird_b", &[(0.0, 10_000.0)]);
    extra.attributes[0].insert("SPECIES".to_string(), AttrValue::Text("crow".to_string()));
    let source = source(false).with_layer("birds/bird_b", extra);
    let mut config = Configuration::default();
    config.field_policy = sprayzone::FieldPolicy::StripAll;

    let report = SprayPipeline::new(config).run(&source, &mut MemorySink::new()).unwrap();
    assert_eq!(report.counts.observations, 3);
}

/// Accepts writes until it sees `fail_on`.
struct FailingSink {
    inner: MemorySink,
    fail_on: &'static str,
}

impl FeatureSink for FailingSink {
    fn write(&mut self, name: &str, layer: &FeatureCollection) -> Result<(), SinkError> {
        if name == self.fail_on {
            return Err(SinkError::Io { path: PathBuf::from(name), source: io::Error::other("disk full") });
        }
        self.inner.write(name, layer)
    }
}

#[test]
fn sink_failure_keeps_earlier_writes() {
    let mut sink = FailingSink { inner: MemorySink::new(), fail_on: "road_buffer" };
    let err = SprayPipeline::new(Configuration::default()).run(&source(false), &mut sink).unwrap_err();

    let PipelineError::Write { stage, name, .. } = err else {
        panic!("expected a write error, got {err}");
    };
    assert_eq!(stage, Stage::Persist);
    assert_eq!(name, "road_buffer");
    assert_eq!(sink.inner.names(), vec!["bird_buffer", "merged_points"]);
}

#[test]
fn missing_roads_layer_fails_in_its_branch() {
    let source = MemorySource::new()
        .with_layer("birds/bird_a", birds("bird_a", &[(0.0, 0.0)]))
        .with_layer("wetlands", wetlands(false));
    let err = SprayPipeline::new(Configuration::default()).run(&source, &mut MemorySink::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Source { stage: Stage::Roads, .. }));
}

#[test]
fn invalid_configuration_is_rejected_before_reading() {
    let mut config = Configuration::default();
    config.distances.road = 0.0;
    let mut sink = MemorySink::new();

    let err = SprayPipeline::new(config).run(&MemorySource::new(), &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::Config { stage: Stage::Ingest, .. }));
    assert!(sink.is_empty());
}

#[test]
fn unconfigured_outputs_are_skipped() {
    let mut config = Configuration::default();
    config.outputs = sprayzone::Outputs::none();
    config.outputs.spray_region = Some("spray".to_string());
    let mut sink = MemorySink::new();

    SprayPipeline::new(config).run(&source(false), &mut sink).unwrap();
    assert_eq!(sink.names(), vec!["spray"]);
    assert_eq!(sink.get("spray").unwrap().name, "spray");
}

#[test]
fn shapefile_inputs_to_geojson_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = ShapefileSink::new(dir.path().join("birds"));
    input.write("bird_a", &birds("bird_a", &[(0.0, 0.0), (10_000.0, 0.0)])).unwrap();
    input.write("bird_b", &birds("bird_b", &[(0.0, 10_000.0)])).unwrap();
    let mut input = ShapefileSink::new(dir.path());
    input.write("roads", &roads()).unwrap();
    input.write("wetlands", &wetlands(false)).unwrap();

    let source = ShapefileSource::new(dir.path()).with_epsg(26986);
    let mut sink = GeoJsonSink::new(dir.path().join("out"));
    let report = SprayPipeline::new(Configuration::default()).run(&source, &mut sink).unwrap();

    assert_eq!(report.counts.observations, 3);
    assert_eq!(report.counts.candidate_roads, 1);
    assert!(report.percent > 0.0 && report.percent < 100.0);

    let written = GeoJsonSource::new(dir.path().join("out"));
    let region = sprayzone::FeatureSource::read_layer(&written, "spray_region").unwrap();
    assert_eq!(region.epsg, Some(26986));
    assert!(matches!(region.shapes[0].geometry(), Geometry::Polygon(_) | Geometry::MultiPolygon(_)));
    assert!(sink.path("merged_points").is_file());
}

#[test]
fn collapsed_bird_buffer_has_no_percentage() {
    let mut config = Configuration::default();
    // Circles this small vanish below the coordinate tolerance.
    config.distances.bird = 0.001;
    let mut sink = MemorySink::new();

    let err = SprayPipeline::new(config).run(&source(false), &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::DivideByZero { stage: Stage::Report }));
    assert_eq!(
        sink.names(),
        vec!["bird_buffer", "merged_points", "road_buffer", "wetland_buffer"],
    );
    assert!(sink.get("bird_buffer").unwrap().is_empty());
}

#[test]
fn outputs_keep_the_observations_epsg() {
    let source = source(false)
        .with_layer("birds/bird_a", birds("bird_a", &[(0.0, 0.0), (10_000.0, 0.0)]).with_epsg(Some(2249)));
    let mut sink = MemorySink::new();

    SprayPipeline::new(Configuration::default()).run(&source, &mut sink).unwrap();
    for name in ["merged_points", "bird_buffer", "road_buffer", "spray_region"] {
        assert_eq!(sink.get(name).unwrap().epsg, Some(2249), "{name}");
    }
}

#[test]
fn blank_field_in_one_file_still_merges() {
    let mut counted = birds("bird_a", &[(0.0, 0.0), (10_000.0, 0.0)]);
    for (i, attributes) in counted.attributes.iter_mut().enumerate() {
        attributes.insert("COUNT".to_string(), AttrValue::Number(i as f64 + 0.5));
    }
    let mut blank = birds("bird_b", &[(0.0, 10_000.0)]);
    blank.attributes[0].insert("COUNT".to_string(), AttrValue::Null);
    let source = source(false)
        .with_layer("birds/bird_a", counted)
        .with_layer("birds/bird_b", blank);

    let report = SprayPipeline::new(Configuration::default()).run(&source, &mut MemorySink::new()).unwrap();
    assert_eq!(report.counts.observations, 3);
}
