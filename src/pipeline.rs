//! The spray-area run: buffer the bird observations, buffer the roads and
//! wetlands near them, erase wetlands from roads, clip to the bird buffer and
//! measure.

use geo::MultiPolygon;
use geoclip::{AreaAccumulator, BufferParams, Normalizer, RepairReport, SetOps, SpatialIndex};
use rayon::prelude::*;

use crate::config::Configuration;
use crate::error::{PipelineError, Stage, Warning};
use crate::feature::{FeatureCollection, Schema};
use crate::io::{FeatureSink, FeatureSource};
use crate::prep::clean_layer;
use crate::report::SprayReport;

/// Runs the spray-area analysis for one immutable [`Configuration`].
#[derive(Debug, Clone)]
pub struct SprayPipeline {
    config: Configuration,
}

/// Buffer of the reference features that touch the bird buffer.
struct Reference {
    buffer: MultiPolygon<f64>,
    features: usize,
    candidates: usize,
    repairs: RepairReport,
}

impl SprayPipeline {
    pub fn new(config: Configuration) -> Self { Self { config } }

    #[inline] pub fn config(&self) -> &Configuration { &self.config }

    fn params(&self, distance: f64) -> BufferParams {
        BufferParams::new(distance)
            .with_arc_segments(self.config.arc_segments)
            .with_tolerance(self.config.xy_tolerance)
    }

    /// Run every stage against `source`, persisting the configured outputs
    /// to `sink` as they are produced.
    ///
    /// A failing stage aborts the run; layers already written stay written.
    pub fn run<S, K>(&self, source: &S, sink: &mut K) -> Result<SprayReport, PipelineError>
    where
        S: FeatureSource + ?Sized,
        K: FeatureSink + ?Sized,
    {
        self.config.validate()
            .map_err(|source| PipelineError::Config { stage: Stage::Ingest, source })?;

        let mut report = SprayReport::default();
        let outputs = &self.config.outputs;

        tracing::info!(stage = %Stage::Ingest, folder = %self.config.inputs.observations.display(), "merging observations");
        let points = self.ingest(source, &mut report)?;
        let epsg = points.epsg;
        self.persist(sink, outputs.merged_points.as_deref(), || points.clone())?;

        tracing::info!(stage = %Stage::BirdBuffer, distance = self.config.distances.bird, "buffering observations");
        let bird_buffer = geoclip::buffer(&points.shapes, &self.params(self.config.distances.bird))
            .map_err(|source| PipelineError::Geometry { stage: Stage::BirdBuffer, source })?;
        drop(points);
        self.persist(sink, outputs.bird_buffer.as_deref(), || polygons("bird_buffer", &bird_buffer, epsg))?;

        tracing::info!(stage = %Stage::Roads, "selecting roads and wetlands near observations");
        let (roads, wetlands) = rayon::join(
            || self.reference(source, Stage::Roads, &self.config.inputs.roads, self.config.distances.road, &bird_buffer),
            || self.reference(source, Stage::Wetlands, &self.config.inputs.wetlands, self.config.distances.wetland, &bird_buffer),
        );
        let (roads, wetlands) = (roads?, wetlands?);

        report.counts.roads = roads.features;
        report.counts.candidate_roads = roads.candidates;
        report.repairs.roads = roads.repairs;
        report.counts.wetlands = wetlands.features;
        report.counts.candidate_wetlands = wetlands.candidates;
        report.repairs.wetlands = wetlands.repairs;
        for (stage, name, repairs) in [
            (Stage::Roads, &self.config.inputs.roads, roads.repairs),
            (Stage::Wetlands, &self.config.inputs.wetlands, wetlands.repairs),
        ] {
            if repairs.dropped > 0 {
                report.warnings.push(Warning::DroppedGeometries { stage, layer: name.clone(), count: repairs.dropped });
            }
        }

        self.persist(sink, outputs.road_buffer.as_deref(), || polygons("road_buffer", &roads.buffer, epsg))?;
        self.persist(sink, outputs.wetland_buffer.as_deref(), || polygons("wetland_buffer", &wetlands.buffer, epsg))?;

        let ops = SetOps::new(self.config.xy_tolerance);

        tracing::info!(stage = %Stage::Erase, "erasing wetland buffer from road buffer");
        let erased = ops.difference(&roads.buffer, &wetlands.buffer);
        drop(roads);
        drop(wetlands);
        self.check_empty(Stage::Erase, &erased, &mut report);

        tracing::info!(stage = %Stage::Clip, "clipping to bird buffer");
        let spray = ops.intersection(&erased, &bird_buffer);
        drop(erased);
        self.check_empty(Stage::Clip, &spray, &mut report);

        tracing::info!(stage = %Stage::Report, "measuring areas");
        let mut spray_area = AreaAccumulator::new();
        spray_area.add_multipolygon(&spray);
        let total_area = geoclip::area(&bird_buffer);
        drop(bird_buffer);
        if total_area == 0.0 {
            return Err(PipelineError::DivideByZero { stage: Stage::Report });
        }

        report.spray_area = spray_area.total();
        report.total_area = total_area;
        report.percent = report.spray_area / total_area * 100.0;
        report.counts.spray_polygons = spray_area.count();

        self.persist(sink, outputs.spray_region.as_deref(), || polygons("spray_region", &spray, epsg))?;

        tracing::info!(
            spray_area = report.spray_area,
            total_area = report.total_area,
            percent = report.percent,
            "done"
        );
        Ok(report)
    }

    /// Read every observation layer in parallel, check they share one point
    /// schema, then merge and repair them.
    fn ingest<S: FeatureSource + ?Sized>(
        &self,
        source: &S,
        report: &mut SprayReport,
    ) -> Result<FeatureCollection, PipelineError> {
        let stage = Stage::Ingest;
        let handles = source.list(&self.config.inputs.observations)
            .map_err(|source| PipelineError::Source { stage, source })?;

        let layers = handles.par_iter()
            .map(|handle| source.read(handle).map(|mut layer| {
                layer.apply_policy(&self.config.field_policy);
                (handle.name.clone(), layer)
            }))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| PipelineError::Source { stage, source })?;

        check_schemas(&layers)?;
        report.counts.observation_layers = layers.len();

        let merged = FeatureCollection::merge("merged_points", layers.into_iter().map(|(_, layer)| layer));
        let epsg = merged.epsg.or(Some(self.config.epsg));
        let (points, repairs) = merged.normalized(&Normalizer::new(self.config.xy_tolerance));
        let points = points.with_epsg(epsg);

        if repairs.dropped > 0 {
            tracing::warn!(%stage, dropped = repairs.dropped, "deleted unrepairable observations");
            report.warnings.push(Warning::DroppedGeometries {
                stage,
                layer: points.name.clone(),
                count: repairs.dropped,
            });
        }
        report.repairs.observations = repairs;

        if points.is_empty() {
            return Err(PipelineError::EmptyInput { stage });
        }
        report.counts.observations = points.len();
        tracing::debug!(layers = report.counts.observation_layers, points = points.len(), "merged observations");
        Ok(points)
    }

    /// Clean one reference layer, keep the features that intersect
    /// `bird_buffer` and buffer them.
    fn reference<S: FeatureSource + ?Sized>(
        &self,
        source: &S,
        stage: Stage,
        name: &str,
        distance: f64,
        bird_buffer: &MultiPolygon<f64>,
    ) -> Result<Reference, PipelineError> {
        let normalizer = Normalizer::new(self.config.xy_tolerance);
        let (layer, repairs) = clean_layer(source, name, &self.config.field_policy, &normalizer, stage)?;

        let index = SpatialIndex::build(&layer.shapes);
        let candidates = index.intersecting(bird_buffer);
        tracing::debug!(%stage, layer = name, features = layer.len(), candidates = candidates.len(), "selected candidates");

        let buffer = geoclip::buffer(candidates.iter().map(|&i| &layer.shapes[i]), &self.params(distance))
            .map_err(|source| PipelineError::Geometry { stage, source })?;

        Ok(Reference { buffer, features: layer.len(), candidates: candidates.len(), repairs })
    }

    fn check_empty(&self, stage: Stage, polygons: &MultiPolygon<f64>, report: &mut SprayReport) {
        if polygons.0.is_empty() {
            tracing::warn!(%stage, "result is empty");
            report.warnings.push(Warning::EmptyResult { stage });
        }
    }

    /// Write a layer if the output is configured. The layer is only built
    /// when it will be written.
    fn persist<K: FeatureSink + ?Sized>(
        &self,
        sink: &mut K,
        name: Option<&str>,
        layer: impl FnOnce() -> FeatureCollection,
    ) -> Result<(), PipelineError> {
        let Some(name) = name else { return Ok(()) };
        let mut layer = layer();
        layer.name = name.to_string();

        tracing::info!(stage = %Stage::Persist, layer = name, features = layer.len(), "writing layer");
        sink.write(name, &layer)
            .map_err(|source| PipelineError::Write { stage: Stage::Persist, name: name.to_string(), source })
    }
}

/// A derived polygon layer, tagged with the coordinate system of the observations.
fn polygons(name: &str, polygons: &MultiPolygon<f64>, epsg: Option<u32>) -> FeatureCollection {
    FeatureCollection::from_polygons(name, polygons).with_epsg(epsg)
}

/// Every non-empty layer must be a point layer with the fields of the first.
/// Layers without features carry no schema and are skipped; fields that are
/// null throughout a layer match any type.
fn check_schemas(layers: &[(String, FeatureCollection)]) -> Result<(), PipelineError> {
    let mut expected: Option<Schema> = None;
    for (name, layer) in layers {
        let found = layer.schema();
        if found.kind.is_none() { continue }

        let want = expected.get_or_insert_with(|| Schema {
            kind: Some(geoclip::ShapeKind::Point),
            fields: found.fields.clone(),
        });
        if !want.is_compatible(&found) {
            return Err(PipelineError::SchemaMismatch {
                stage: Stage::Ingest,
                layer: name.clone(),
                expected: want.clone(),
                found,
            });
        }
        want.refine(&found);
    }
    Ok(())
}
