//! One-off cleanup of the reference layers: strip attribute fields, repair
//! geometry and delete nulls, then write the fixed layers back out.

use geoclip::{Normalizer, RepairReport};

use crate::config::Configuration;
use crate::error::{PipelineError, Stage};
use crate::feature::{FeatureCollection, FieldPolicy};
use crate::io::{FeatureSink, FeatureSource};
use crate::report::{LayerPrep, PrepReport};

/// Read layer `name`, apply `policy` and repair every geometry.
/// Unrepairable and null geometries are deleted along with their attributes.
pub fn prepare_layer<S: FeatureSource + ?Sized>(
    source: &S,
    name: &str,
    policy: &FieldPolicy,
    normalizer: &Normalizer,
) -> Result<(FeatureCollection, RepairReport), PipelineError> {
    clean_layer(source, name, policy, normalizer, Stage::Ingest)
}

pub(crate) fn clean_layer<S: FeatureSource + ?Sized>(
    source: &S,
    name: &str,
    policy: &FieldPolicy,
    normalizer: &Normalizer,
    stage: Stage,
) -> Result<(FeatureCollection, RepairReport), PipelineError> {
    let mut layer = source.read_layer(name)
        .map_err(|source| PipelineError::Source { stage, source })?;
    layer.apply_policy(policy);

    let (clean, report) = layer.normalized(normalizer);
    if report.dropped > 0 {
        tracing::warn!(%stage, layer = name, dropped = report.dropped, "deleted unrepairable geometries");
    }
    tracing::debug!(%stage, layer = name, read = layer.len(), kept = clean.len(), repaired = report.repaired);
    Ok((clean, report))
}

/// Clean the roads and wetlands layers named in `config` and write them to
/// `outputs.fixed_roads` / `outputs.fixed_wetlands`.
pub fn prepare<S, K>(source: &S, sink: &mut K, config: &Configuration) -> Result<PrepReport, PipelineError>
where
    S: FeatureSource + ?Sized,
    K: FeatureSink + ?Sized,
{
    config.validate().map_err(|source| PipelineError::Config { stage: Stage::Ingest, source })?;
    let normalizer = Normalizer::new(config.xy_tolerance);

    let mut prepare_one = |name: &str, output: Option<&str>| -> Result<LayerPrep, PipelineError> {
        tracing::info!(layer = name, "repairing geometry");
        let (mut clean, repairs) = prepare_layer(source, name, &config.field_policy, &normalizer)?;

        if let Some(output) = output {
            tracing::info!(layer = output, features = clean.len(), "writing fixed layer");
            clean.name = output.to_string();
            clean.epsg = clean.epsg.or(Some(config.epsg));
            sink.write(output, &clean)
                .map_err(|source| PipelineError::Write { stage: Stage::Persist, name: output.to_string(), source })?;
        }
        Ok(LayerPrep { name: name.to_string(), read: repairs.inspected, kept: clean.len(), repairs })
    };

    let roads = prepare_one(&config.inputs.roads, config.outputs.fixed_roads.as_deref())?;
    let wetlands = prepare_one(&config.inputs.wetlands, config.outputs.fixed_wetlands.as_deref())?;
    Ok(PrepReport { roads, wetlands })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon, Geometry, LineString};
    use geoclip::{ring_signed_area, Shape};

    use crate::feature::{AttrValue, Attributes};
    use crate::io::{MemorySink, MemorySource};

    fn roads() -> FeatureCollection {
        let mut layer = FeatureCollection::new("roads");
        layer.push(
            Shape::new(line_string![(x: 0.0, y: 0.0), (x: 0.0, y: 0.0), (x: 100.0, y: 0.0)]),
            Attributes::from([
                ("OBJECTID".to_string(), AttrValue::Integer(1)),
                ("NAME".to_string(), AttrValue::Text("Main St".into())),
            ]),
        );
        layer.push(
            Shape::new(LineString::<f64>::new(vec![])),
            Attributes::from([("OBJECTID".to_string(), AttrValue::Integer(2))]),
        );
        layer
    }

    fn wetlands() -> FeatureCollection {
        let mut layer = FeatureCollection::new("wetlands");
        // Clockwise on input.
        layer.push(
            Shape::new(polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 10.0), (x: 10.0, y: 10.0), (x: 10.0, y: 0.0)]),
            Attributes::from([("FID".to_string(), AttrValue::Integer(0))]),
        );
        layer
    }

    #[test]
    fn prepare_layer_strips_and_repairs() {
        let source = MemorySource::new().with_layer("roads", roads());
        let (clean, report) = prepare_layer(&source, "roads", &FieldPolicy::StripAll, &Normalizer::default()).unwrap();

        assert_eq!(report.inspected, 2);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean.attributes[0].keys().collect::<Vec<_>>(), vec!["OBJECTID"]);
    }

    #[test]
    fn prepare_writes_fixed_layers() {
        let source = MemorySource::new()
            .with_layer("roads", roads())
            .with_layer("wetlands", wetlands());
        let mut sink = MemorySink::new();

        let report = prepare(&source, &mut sink, &Configuration::default()).unwrap();
        assert_eq!(report.roads.read, 2);
        assert_eq!(report.roads.kept, 1);
        assert_eq!(report.wetlands.kept, 1);
        assert_eq!(report.wetlands.repairs.reoriented_rings, 1);
        assert_eq!(report.wetlands.repairs.repaired, 1);
        assert_eq!(sink.names(), vec!["fixed_roads", "fixed_wetlands"]);
        assert_eq!(sink.get("fixed_roads").unwrap().epsg, Some(26986));

        let Geometry::Polygon(wetland) = sink.get("fixed_wetlands").unwrap().shapes[0].geometry() else {
            panic!("expected a polygon");
        };
        assert!(ring_signed_area(wetland.exterior()) > 0.0);
    }

    #[test]
    fn prepare_skips_unnamed_outputs() {
        let source = MemorySource::new()
            .with_layer("roads", roads())
            .with_layer("wetlands", wetlands());
        let mut sink = MemorySink::new();
        let mut config = Configuration::default();
        config.outputs.fixed_wetlands = None;

        prepare(&source, &mut sink, &config).unwrap();
        assert_eq!(sink.names(), vec!["fixed_roads"]);
    }

    #[test]
    fn missing_layer_is_a_source_error() {
        let source = MemorySource::new().with_layer("roads", roads());
        let err = prepare(&source, &mut MemorySink::new(), &Configuration::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Source { stage: Stage::Ingest, .. }));
    }
}
