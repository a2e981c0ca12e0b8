use crate::Config;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create data directory: {0}")]
    DataDirectoryCreationFailed(#[from] std::io::Error),

    #[error("Images directory does not exist: {0}")]
    ImagesDirectoryMissing(String),

    #[error("Templates directory does not exist: {0}")]
    TemplatesDirectoryMissing(String),

    #[error("Static files directory does not exist: {0}")]
    StaticDirectoryMissing(String),
}

impl StartupCheckError {
    /// Critical failures stop the server from starting.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StartupCheckError::DataDirectoryCreationFailed(_)
                | StartupCheckError::TemplatesDirectoryMissing(_)
        )
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    let data_dir = Path::new(&config.database.data_directory);
    if !data_dir.exists() {
        info!("Data directory does not exist, creating: {:?}", data_dir);
        if let Err(e) = tokio::fs::create_dir_all(data_dir).await {
            error!("Failed to create data directory {:?}: {}", data_dir, e);
            errors.push(StartupCheckError::DataDirectoryCreationFailed(e));
        }
    } else {
        info!("Data directory exists: {:?}", data_dir);
    }

    // Ingestion reports a missing directory on its own; serving still works.
    let images_dir = Path::new(&config.gallery.images_directory);
    if !images_dir.is_dir() {
        warn!("Images directory does not exist: {:?}", images_dir);
        errors.push(StartupCheckError::ImagesDirectoryMissing(
            images_dir.display().to_string(),
        ));
    }

    let templates_dir = Path::new(&config.templates.directory);
    if !templates_dir.is_dir() {
        error!("Templates directory does not exist: {:?}", templates_dir);
        errors.push(StartupCheckError::TemplatesDirectoryMissing(
            templates_dir.display().to_string(),
        ));
    } else {
        info!("Templates directory exists: {:?}", templates_dir);
    }

    let static_dir = Path::new(&config.static_files.directory);
    if !static_dir.is_dir() {
        warn!("Static files directory does not exist: {:?}", static_dir);
        errors.push(StartupCheckError::StaticDirectoryMissing(
            static_dir.display().to_string(),
        ));
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
