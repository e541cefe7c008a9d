use std::{fs, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, feature::FieldPolicy};

/// Buffer distances in map units (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Distances {
    pub bird: f64,
    pub road: f64,
    pub wetland: f64,
}

impl Default for Distances {
    fn default() -> Self { Self { bird: 2000.0, road: 50.0, wetland: 100.0 } }
}

/// Where the pipeline reads from, relative to the feature source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inputs {
    /// Directory holding one observation layer per file.
    pub observations: PathBuf,
    pub roads: String,
    pub wetlands: String,
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            observations: PathBuf::from("birds"),
            roads: "roads".to_string(),
            wetlands: "wetlands".to_string(),
        }
    }
}

/// Layer names written to the feature sink. `None` skips the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outputs {
    pub merged_points: Option<String>,
    pub bird_buffer: Option<String>,
    pub road_buffer: Option<String>,
    pub wetland_buffer: Option<String>,
    pub spray_region: Option<String>,
    pub fixed_roads: Option<String>,
    pub fixed_wetlands: Option<String>,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            merged_points: Some("merged_points".to_string()),
            bird_buffer: Some("bird_buffer".to_string()),
            road_buffer: Some("road_buffer".to_string()),
            wetland_buffer: Some("wetland_buffer".to_string()),
            spray_region: Some("spray_region".to_string()),
            fixed_roads: Some("fixed_roads".to_string()),
            fixed_wetlands: Some("fixed_wetlands".to_string()),
        }
    }
}

impl Outputs {
    /// No intermediate or final layers are written.
    pub fn none() -> Self {
        Self {
            merged_points: None,
            bird_buffer: None,
            road_buffer: None,
            wetland_buffer: None,
            spray_region: None,
            fixed_roads: None,
            fixed_wetlands: None,
        }
    }
}

/// Immutable run parameters, fixed before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Projected, meter-based coordinate system. Carried, never reprojected.
    pub epsg: u32,
    /// Coordinates closer than this are the same location.
    pub xy_tolerance: f64,
    /// Vertices per quarter circle in buffer arcs.
    pub arc_segments: usize,
    pub distances: Distances,
    pub field_policy: FieldPolicy,
    pub inputs: Inputs,
    pub outputs: Outputs,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            epsg: 26986, // NAD83 / Massachusetts Mainland
            xy_tolerance: geoclip::DEFAULT_TOLERANCE,
            arc_segments: geoclip::buffer::DEFAULT_ARC_SEGMENTS,
            distances: Distances::default(),
            field_policy: FieldPolicy::default(),
            inputs: Inputs::default(),
            outputs: Outputs::default(),
        }
    }
}

impl Configuration {
    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 { Ok(()) } else { Err(ConfigError::NotPositive { field, value }) }
        }

        positive("distances.bird", self.distances.bird)?;
        positive("distances.road", self.distances.road)?;
        positive("distances.wetland", self.distances.wetland)?;
        positive("xy_tolerance", self.xy_tolerance)?;

        if self.arc_segments == 0 {
            return Err(ConfigError::TooFewSegments { field: "arc_segments" });
        }
        if self.inputs.roads.is_empty() {
            return Err(ConfigError::EmptyName { field: "inputs.roads" });
        }
        if self.inputs.wetlands.is_empty() {
            return Err(ConfigError::EmptyName { field: "inputs.wetlands" });
        }
        Ok(())
    }
}
