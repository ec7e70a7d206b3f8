//
// main.rs
// dicom-forge
//
// Binary entry point: installs the tracing subscriber and hands off to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom_forge::cli;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    cli::run()
}
