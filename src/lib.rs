#![doc = "Spray-area analysis over bird observations, roads and wetlands"]
mod common;
mod config;
mod error;
mod feature;
pub mod logging;
mod pipeline;
mod prep;
mod report;

pub mod io;

#[doc(inline)]
pub use config::{Configuration, Distances, Inputs, Outputs};

#[doc(inline)]
pub use error::{ConfigError, PipelineError, SinkError, SourceError, Stage, Warning};

#[doc(inline)]
pub use feature::{AttrValue, Attributes, FeatureCollection, FieldDef, FieldPolicy, FieldType, Schema, IDENTIFIER_FIELDS};

#[doc(inline)]
pub use io::{FeatureSink, FeatureSource, LayerHandle};

#[doc(inline)]
pub use logging::init as init_logging;

#[doc(inline)]
pub use pipeline::SprayPipeline;

#[doc(inline)]
pub use prep::{prepare, prepare_layer};

#[doc(inline)]
pub use report::{Counts, LayerPrep, PrepReport, Repairs, SprayReport};

pub use geoclip;
