use std::sync::Arc;

// Public modules
pub mod config;
pub mod domains;
pub mod errors;
pub mod globals;
pub mod validation;

pub use config::CompressionSettings;
pub use domains::compression::{
    CompressionResult, CompressionService, ImageAnalysisResult, PdfAnalysisResult,
    PdfCompressionResult, PdfQualityMode, Upload,
};
pub use errors::{DomainError, ServiceError, ServiceResult, ValidationError};

// Entry point for initialization
/// Initialize the library with the given settings.
/// This function must be called before [`get_compression_service`].
pub async fn initialize(settings: CompressionSettings) -> ServiceResult<()> {
    globals::initialize(settings).await
}

/// Initialize with settings read from the environment and `.env`
pub async fn initialize_from_env() -> ServiceResult<()> {
    initialize(CompressionSettings::from_env()).await
}

/// Get the shared compression service
pub fn get_compression_service() -> ServiceResult<Arc<dyn CompressionService>> {
    globals::get_compression_service()
}

/// Settings the service was initialized with
pub fn get_settings() -> ServiceResult<CompressionSettings> {
    globals::get_settings()
}

/// Check if the library has been initialized
pub fn is_initialized() -> bool {
    globals::is_initialized()
}
