use std::{fmt, io, path::PathBuf};

use geoclip::GeometryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::Schema;

/// Pipeline step an error or warning originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    BirdBuffer,
    Roads,
    Wetlands,
    Erase,
    Clip,
    Report,
    Persist,
}

impl Stage {
    pub fn to_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::BirdBuffer => "bird_buffer",
            Stage::Roads => "roads",
            Stage::Wetlands => "wetlands",
            Stage::Erase => "erase",
            Stage::Clip => "clip",
            Stage::Report => "report",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.to_str()) }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("layer not found: {name}")]
    Missing { name: String },

    #[error("failed to read {}", .path.display())]
    Io { path: PathBuf, #[source] source: io::Error },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {}", .path.display())]
    Io { path: PathBuf, #[source] source: io::Error },

    #[error("failed to encode {}: {message}", .path.display())]
    Encode { path: PathBuf, message: String },

    #[error("layer '{name}' has {kind} geometry, which this sink cannot store")]
    Unsupported { name: String, kind: &'static str },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be at least 1")]
    TooFewSegments { field: &'static str },

    #[error("{field} must not be empty")]
    EmptyName { field: &'static str },

    #[error("failed to read configuration {}", .path.display())]
    Read { path: PathBuf, #[source] source: io::Error },

    #[error("failed to parse configuration {}", .path.display())]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
}

/// Fatal pipeline failures. Each carries the stage it aborted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[{stage}] layer '{layer}' has schema {found}, expected {expected}")]
    SchemaMismatch { stage: Stage, layer: String, expected: Schema, found: Schema },

    #[error("[{stage}] no input features")]
    EmptyInput { stage: Stage },

    #[error("[{stage}] total buffer area is zero; the percentage is undefined")]
    DivideByZero { stage: Stage },

    #[error("[{stage}] failed to write layer '{name}'")]
    Write { stage: Stage, name: String, #[source] source: SinkError },

    #[error("[{stage}] failed to read input")]
    Source { stage: Stage, #[source] source: SourceError },

    #[error("[{stage}] invalid geometry parameters")]
    Geometry { stage: Stage, #[source] source: GeometryError },

    #[error("[{stage}] invalid configuration")]
    Config { stage: Stage, #[source] source: ConfigError },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::SchemaMismatch { stage, .. }
            | PipelineError::EmptyInput { stage }
            | PipelineError::DivideByZero { stage }
            | PipelineError::Write { stage, .. }
            | PipelineError::Source { stage, .. }
            | PipelineError::Geometry { stage, .. }
            | PipelineError::Config { stage, .. } => *stage,
        }
    }
}

/// Non-fatal conditions recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// An erase or clip produced the empty set; the run continues with it.
    EmptyResult { stage: Stage },
    /// Geometries dropped as unrepairable while reading a layer.
    DroppedGeometries { stage: Stage, layer: String, count: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptyResult { stage } => write!(f, "[{stage}] result is empty"),
            Warning::DroppedGeometries { stage, layer, count } => {
                write!(f, "[{stage}] dropped {count} unrepairable geometries from '{layer}'")
            }
        }
    }
}
