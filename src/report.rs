use std::fmt;

use geoclip::RepairReport;
use serde::{Deserialize, Serialize};

use crate::error::Warning;

/// Feature counts observed along one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Observation layers merged.
    pub observation_layers: usize,
    /// Observation points kept after repair.
    pub observations: usize,
    pub roads: usize,
    /// Roads intersecting the bird buffer.
    pub candidate_roads: usize,
    pub wetlands: usize,
    pub candidate_wetlands: usize,
    /// Polygons in the final spray region.
    pub spray_polygons: usize,
}

/// Geometry repairs per input layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repairs {
    pub observations: RepairReport,
    pub roads: RepairReport,
    pub wetlands: RepairReport,
}

impl Repairs {
    pub fn total(&self) -> RepairReport {
        let mut total = self.observations;
        total += self.roads;
        total += self.wetlands;
        total
    }
}

/// Outcome of a pipeline run. Areas are in squared map units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SprayReport {
    /// Area that can be sprayed: near roads, away from wetlands, within range of a bird.
    pub spray_area: f64,
    /// Area of the dissolved bird buffer.
    pub total_area: f64,
    /// `spray_area / total_area * 100`.
    pub percent: f64,
    pub counts: Counts,
    pub repairs: Repairs,
    pub warnings: Vec<Warning>,
}

impl SprayReport {
    /// Geometries dropped as unrepairable across all inputs.
    pub fn dropped(&self) -> usize { self.repairs.total().dropped }
}

impl fmt::Display for SprayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Area that can be sprayed: {:.2} m²", self.spray_area)?;
        writeln!(f, "Area that should be sprayed: {:.2} m²", self.total_area)?;
        writeln!(f, "Sprayable share: {:.4} %", self.percent)?;
        writeln!(
            f,
            "Inputs: {} observations from {} layers, {}/{} roads and {}/{} wetlands near a bird",
            self.counts.observations, self.counts.observation_layers,
            self.counts.candidate_roads, self.counts.roads,
            self.counts.candidate_wetlands, self.counts.wetlands,
        )?;
        let repairs = self.repairs.total();
        write!(f, "Geometry: {} repaired, {} dropped", repairs.repaired, repairs.dropped)?;
        for warning in &self.warnings {
            write!(f, "\nwarning: {warning}")?;
        }
        Ok(())
    }
}

/// Per-layer outcome of data preparation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerPrep {
    pub name: String,
    /// Features read.
    pub read: usize,
    /// Features kept after repair.
    pub kept: usize,
    pub repairs: RepairReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepReport {
    pub roads: LayerPrep,
    pub wetlands: LayerPrep,
}
