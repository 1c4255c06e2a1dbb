//! Codec providers: the image codecs and the PDF optimizer the service drives

pub mod image_compressor;
pub mod pdf_compressor;
pub mod probe;

use async_trait::async_trait;
use image::DynamicImage;
use std::path::Path;

use crate::errors::DomainResult;
use super::types::{EncoderQuality, InputFormat, OutputPolicy, PdfOptimizerMode, PdfPageInfo};

pub use image_compressor::ImageCompressor;
pub use pdf_compressor::PdfCompressor;
pub use probe::{probe_format, ProbedFormat};

/// Header-level facts about an encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: InputFormat,
    pub compression_type: String,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
}

/// A fully decoded image together with what it was decoded from
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: InputFormat,
    pub bits_per_pixel: u16,
    pub image: DynamicImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decoding and encoding of raster images
#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Read format, dimensions and bit depth, decoding as little as possible
    async fn inspect(&self, data: Vec<u8>) -> DomainResult<ImageInfo>;

    /// Decode the whole image
    async fn decode(&self, data: Vec<u8>) -> DomainResult<DecodedImage>;

    /// Write `image` in the container and bit depth the policy names
    async fn encode(
        &self,
        image: DecodedImage,
        policy: OutputPolicy,
        quality: EncoderQuality,
    ) -> DomainResult<Vec<u8>>;

    fn codec_name(&self) -> &'static str;
}

/// Document-level facts about a PDF
#[derive(Debug, Clone, PartialEq)]
pub struct PdfDocumentInfo {
    pub page_count: u32,
    pub version: String,
    pub producer: Option<String>,
    pub is_linearized: bool,
    pub is_encrypted: bool,
    /// At most the first [`MAX_ANALYZED_PAGES`] pages
    pub pages: Vec<PdfPageInfo>,
}

/// Output of a PDF optimization run
#[derive(Debug, Clone)]
pub struct OptimizedPdf {
    pub data: Vec<u8>,
    /// Whether pages were split into text/background/image layers
    pub used_mrc_segmentation: bool,
}

pub const MAX_ANALYZED_PAGES: usize = 10;

/// PDF inspection and size optimization
#[async_trait]
pub trait PdfOptimizer: Send + Sync {
    async fn analyze(&self, data: Vec<u8>) -> DomainResult<PdfDocumentInfo>;

    async fn optimize(&self, data: Vec<u8>, mode: PdfOptimizerMode) -> DomainResult<OptimizedPdf>;

    fn optimizer_name(&self) -> &'static str;
}

/// Utility function to get file extension from filename
pub fn get_extension(filename: &str) -> Option<&str> {
    Path::new(filename).extension().and_then(|ext| ext.to_str())
}

/// File name without directory or extension
pub fn get_file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("")
}
