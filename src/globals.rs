use crate::config::CompressionSettings;
use crate::domains::compression::service::{CompressionService, CompressionServiceImpl};
use crate::errors::{ServiceError, ServiceResult};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// Global state definitions
lazy_static! {
    static ref INIT_MUTEX: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
    static ref INITIALIZED: AtomicBool = AtomicBool::new(false);

    static ref SETTINGS: Mutex<Option<CompressionSettings>> = Mutex::new(None);
    static ref COMPRESSION_SERVICE: Mutex<Option<Arc<dyn CompressionService>>> = Mutex::new(None);
}

pub fn get_settings() -> ServiceResult<CompressionSettings> {
    SETTINGS
        .lock()
        .map_err(|_| ServiceError::Configuration("SETTINGS lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::ServiceUnavailable("Compression settings not initialized".to_string()))
}

pub fn get_compression_service() -> ServiceResult<Arc<dyn CompressionService>> {
    COMPRESSION_SERVICE
        .lock()
        .map_err(|_| ServiceError::Configuration("COMPRESSION_SERVICE lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::ServiceUnavailable("Compression service not initialized".to_string()))
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Build the global compression service. Only the first successful call has
/// an effect; later calls return immediately.
pub async fn initialize(settings: CompressionSettings) -> ServiceResult<()> {
    // Acquire the async mutex to ensure single initialization
    let _guard = INIT_MUTEX.lock().await;

    if INITIALIZED.load(Ordering::Acquire) {
        log::debug!("Compression service already initialized");
        return Ok(());
    }

    let result = initialize_internal(settings).await;

    // Mark as initialized only if successful
    if result.is_ok() {
        INITIALIZED.store(true, Ordering::Release);
    }

    result
}

async fn initialize_internal(settings: CompressionSettings) -> ServiceResult<()> {
    log::info!(
        "Initializing compression service (image limit: {} bytes, PDF limit: {} bytes, default quality: {})",
        settings.max_image_upload_bytes,
        settings.max_pdf_upload_bytes,
        settings.default_image_quality
    );

    // Probing Ghostscript spawns a process
    let service_settings = settings.clone();
    let service = tokio::task::spawn_blocking(move || CompressionServiceImpl::new(service_settings))
        .await
        .map_err(|e| ServiceError::Configuration(format!("Failed to build compression service: {}", e)))?;

    *SETTINGS
        .lock()
        .map_err(|_| ServiceError::Configuration("SETTINGS lock poisoned".to_string()))? = Some(settings);
    *COMPRESSION_SERVICE
        .lock()
        .map_err(|_| ServiceError::Configuration("COMPRESSION_SERVICE lock poisoned".to_string()))? =
        Some(Arc::new(service));

    log::info!("Compression service initialized");
    Ok(())
}
