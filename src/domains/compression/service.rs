use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::config::CompressionSettings;
use crate::errors::{DomainError, ServiceResult};
use crate::validation::{validate_image_upload, validate_pdf_upload, validate_quality};
use super::compressors::{
    get_file_stem,
    pdf_compressor::ghostscript_version,
    ImageCodec, ImageCompressor, PdfCompressor, PdfOptimizer,
};
use super::format_policy::{resolve_encoder_quality, resolve_output_policy};
use super::types::{
    CompressionResult, ImageAnalysisResult, PdfAnalysisResult, PdfCompressionResult,
    PdfQualityMode, Upload,
};

#[async_trait]
pub trait CompressionService: Send + Sync {
    /// Re-encode an image at the given quality (the configured default when `None`)
    async fn compress_image(&self, upload: Upload, quality: Option<i64>) -> ServiceResult<CompressionResult>;

    /// Read image properties without compressing
    async fn analyze_image(&self, upload: Upload) -> ServiceResult<ImageAnalysisResult>;

    /// Optimize a PDF document
    async fn compress_pdf(&self, upload: Upload, mode: PdfQualityMode) -> ServiceResult<PdfCompressionResult>;

    /// Read PDF properties without compressing
    async fn analyze_pdf(&self, upload: Upload) -> ServiceResult<PdfAnalysisResult>;
}

pub struct CompressionServiceImpl {
    settings: CompressionSettings,
    image_codec: Arc<dyn ImageCodec>,
    pdf_optimizer: Arc<dyn PdfOptimizer>,
}

impl CompressionServiceImpl {
    /// Build the service with the bundled codecs. Ghostscript is used for PDFs
    /// when the configured binary answers `--version`.
    pub fn new(settings: CompressionSettings) -> Self {
        let pdf_compressor = match ghostscript_version(&settings.ghostscript_path) {
            Some(version) => {
                log::info!("Using Ghostscript {} at {}", version, settings.ghostscript_path);
                PdfCompressor::new(Some(settings.ghostscript_path.clone()))
            }
            None => {
                log::warn!(
                    "Ghostscript not found at '{}', PDFs will be rewritten in-process",
                    settings.ghostscript_path
                );
                PdfCompressor::new(None)
            }
        };

        Self::with_providers(settings, Arc::new(ImageCompressor), Arc::new(pdf_compressor))
    }

    pub fn with_providers(
        settings: CompressionSettings,
        image_codec: Arc<dyn ImageCodec>,
        pdf_optimizer: Arc<dyn PdfOptimizer>,
    ) -> Self {
        log::debug!(
            "Compression service using {} and {}",
            image_codec.codec_name(),
            pdf_optimizer.optimizer_name()
        );
        Self {
            settings,
            image_codec,
            pdf_optimizer,
        }
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }
}

#[async_trait]
impl CompressionService for CompressionServiceImpl {
    async fn compress_image(&self, upload: Upload, quality: Option<i64>) -> ServiceResult<CompressionResult> {
        validate_image_upload(&upload, self.settings.max_image_upload_bytes)?;
        let quality = validate_quality(quality.unwrap_or_else(|| i64::from(self.settings.default_image_quality)))?;

        let original_size = upload.size();
        let Upload { file_name, data } = upload;

        let decoded = self.image_codec.decode(data).await?;
        let input_format = decoded.format.clone();
        let input_bits_per_pixel = decoded.bits_per_pixel;

        let policy = resolve_output_policy(&input_format, input_bits_per_pixel);
        let encoder_quality = resolve_encoder_quality(policy.container, quality);

        log::info!(
            "Compressing image: Format {} -> {}, Quality {}%, BPP: {} -> {}",
            input_format, policy.container, quality, input_bits_per_pixel, policy.bits_per_pixel
        );
        log::debug!("Encoder parameter for {}: {:?}", policy.container, encoder_quality);

        let compressed = self.image_codec.encode(decoded, policy.clone(), encoder_quality).await?;
        if compressed.is_empty() {
            return Err(DomainError::Encode(format!("{} encoder produced no output", policy.container)).into());
        }

        let compressed_size = compressed.len() as u64;
        let ratio = compression_ratio(original_size, compressed_size);

        log::info!(
            "Compressed image: {}, Original: {} bytes, Compressed: {} bytes, Ratio: {:.2}%",
            file_name, original_size, compressed_size, ratio
        );

        Ok(CompressionResult {
            file_name: output_file_name(&file_name, policy.file_extension),
            original_size,
            compressed_size,
            compression_ratio: ratio,
            quality,
            format: policy.container.as_str().to_string(),
            image_data: data_uri(policy.mime_type, &compressed),
            compressed_bytes: compressed,
        })
    }

    async fn analyze_image(&self, upload: Upload) -> ServiceResult<ImageAnalysisResult> {
        validate_image_upload(&upload, self.settings.max_image_upload_bytes)?;

        let original_size = upload.size();
        let Upload { file_name, data } = upload;
        let info = self.image_codec.inspect(data).await?;

        log::debug!(
            "Analyzed image {}: {}x{}, {} bpp, {} ({})",
            file_name, info.width, info.height, info.bits_per_pixel, info.format, info.compression_type
        );

        Ok(ImageAnalysisResult {
            file_name,
            original_size,
            width: info.width,
            height: info.height,
            bits_per_pixel: info.bits_per_pixel,
            format: info.format.to_string(),
            compression_type: info.compression_type,
        })
    }

    async fn compress_pdf(&self, upload: Upload, mode: PdfQualityMode) -> ServiceResult<PdfCompressionResult> {
        validate_pdf_upload(&upload, self.settings.max_pdf_upload_bytes)?;

        let original_size = upload.size();
        let Upload { file_name, data } = upload;

        // Page count is taken before optimizing
        let document = self.pdf_optimizer.analyze(data.clone()).await?;

        log::info!(
            "Compressing PDF: {}, Pages: {}, Mode: {}",
            file_name, document.page_count, mode
        );

        let optimized = self.pdf_optimizer.optimize(data, mode.optimizer_mode()).await?;
        if optimized.data.is_empty() {
            return Err(DomainError::Pdf(format!("{} produced no output", self.pdf_optimizer.optimizer_name())).into());
        }

        let compressed_size = optimized.data.len() as u64;
        let ratio = compression_ratio(original_size, compressed_size);

        log::info!(
            "Compressed PDF: {}, Original: {} bytes, Compressed: {} bytes, Ratio: {:.2}%",
            file_name, original_size, compressed_size, ratio
        );

        Ok(PdfCompressionResult {
            file_name: output_file_name(&file_name, ".pdf"),
            original_size,
            compressed_size,
            compression_ratio: ratio,
            quality_mode: mode.as_str().to_string(),
            page_count: document.page_count,
            used_mrc_segmentation: optimized.used_mrc_segmentation,
            pdf_data: data_uri("application/pdf", &optimized.data),
            compressed_bytes: optimized.data,
        })
    }

    async fn analyze_pdf(&self, upload: Upload) -> ServiceResult<PdfAnalysisResult> {
        validate_pdf_upload(&upload, self.settings.max_pdf_upload_bytes)?;

        let file_size = upload.size();
        let Upload { file_name, data } = upload;
        let document = self.pdf_optimizer.analyze(data).await?;

        log::debug!(
            "Analyzed PDF {}: version {}, {} pages, encrypted: {}",
            file_name, document.version, document.page_count, document.is_encrypted
        );

        Ok(PdfAnalysisResult {
            file_name,
            file_size,
            page_count: document.page_count,
            version: document.version,
            producer: document.producer,
            is_linearized: document.is_linearized,
            is_encrypted: document.is_encrypted,
            pages: document.pages,
        })
    }
}

/// Percentage of the original size saved, rounded to 2 decimals. Negative
/// when the output grew; 0 for an empty original.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let ratio = (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// `compressed_<stem><extension>`; `extension` includes the dot
pub fn output_file_name(original_file_name: &str, extension: &str) -> String {
    format!("compressed_{}{}", get_file_stem(original_file_name), extension)
}

pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}
