//
// lib.rs
// dicom-forge
//
// Exposes the generator modules and re-exports the pipeline entry points for both binary and
// library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Public surface of the library: each module is one pipeline stage or a shared utility.
pub mod cli;
pub mod codec;
pub mod config;
pub mod corruption;
pub mod dicomdir;
pub mod edge_cases;
pub mod error;
pub mod identity;
pub mod layout;
pub mod modality;
pub mod models;
pub mod names;
pub mod pixels;
pub mod render;
pub mod sizing;

pub use config::GenerationConfig;
pub use error::{ForgeError, Result};
pub use models::GeneratedFile;
pub use render::{generate, NoProgress, ProgressSink, TracingProgress};
