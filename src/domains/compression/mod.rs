// Declare submodules for the compression domain
pub mod compressors;
pub mod format_policy;
pub mod service;
pub mod types;

// Re-export key types
pub use types::{
    CompressionResult, EncoderQuality, ImageAnalysisResult, InputFormat, OutputContainer,
    OutputPolicy, PdfAnalysisResult, PdfCompressionResult, PdfOptimizerMode, PdfPageInfo,
    PdfQualityMode, Upload,
};

pub use format_policy::{resolve_encoder_quality, resolve_output_policy};
pub use service::{CompressionService, CompressionServiceImpl};
