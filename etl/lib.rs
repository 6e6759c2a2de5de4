#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod error;
pub mod io;
pub mod mappings;
pub mod normalize;
pub mod pipeline;
pub mod scale;
pub mod split;
pub mod table;

pub use error::PrepError;
pub use pipeline::{PipelineConfig, PipelineReport, prepare, run};
