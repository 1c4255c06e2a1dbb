//! Type definitions for the compression domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::errors::{DomainError, ValidationError};

/// Container format of a decoded input file, as reported by the format probe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputFormat {
    Jpeg,
    /// JPEG with 4:1:1 chroma subsampling
    Jpeg411,
    /// JPEG with 4:2:2 chroma subsampling
    Jpeg422,
    Png,
    Gif,
    Bmp,
    /// BMP with RLE4 or RLE8 compression
    BmpRle,
    Tif,
    TifJpeg,
    TifJpeg411,
    TifJpeg422,
    Webp,
    /// Anything the codecs can decode that has no row of its own
    Other(String),
}

impl InputFormat {
    pub fn as_str(&self) -> &str {
        match self {
            InputFormat::Jpeg => "Jpeg",
            InputFormat::Jpeg411 => "Jpeg411",
            InputFormat::Jpeg422 => "Jpeg422",
            InputFormat::Png => "Png",
            InputFormat::Gif => "Gif",
            InputFormat::Bmp => "Bmp",
            InputFormat::BmpRle => "BmpRle",
            InputFormat::Tif => "Tif",
            InputFormat::TifJpeg => "TifJpeg",
            InputFormat::TifJpeg411 => "TifJpeg411",
            InputFormat::TifJpeg422 => "TifJpeg422",
            InputFormat::Webp => "Webp",
            InputFormat::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container written by the encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputContainer {
    Jpeg,
    Png,
    Gif,
    Bmp,
    /// TIFF carrying JPEG-compressed strips
    TifJpeg,
    Webp,
}

impl OutputContainer {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputContainer::Jpeg => "Jpeg",
            OutputContainer::Png => "Png",
            OutputContainer::Gif => "Gif",
            OutputContainer::Bmp => "Bmp",
            OutputContainer::TifJpeg => "TifJpeg",
            OutputContainer::Webp => "Webp",
        }
    }
}

impl fmt::Display for OutputContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how an image gets written. Recomputed for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPolicy {
    pub container: OutputContainer,
    pub mime_type: &'static str,
    pub file_extension: &'static str,
    pub bits_per_pixel: u16,
}

/// Native quality parameter for the encoder family that will run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderQuality {
    /// Deflate effort, 0 (none) to 9 (maximum)
    PngLevel(u8),
    /// Inverted scale, 2 (best) to 255 (smallest); shared by JPEG and TIFF+JPEG
    JpegFactor(u8),
    /// 1 to 100, ascending with quality
    WebpQuality(u8),
    /// GIF and BMP have no quality knob
    None,
}

/// PDF compression quality requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PdfQualityMode {
    BestQuality,
    #[default]
    Balanced,
    BestSize,
    Custom,
}

impl PdfQualityMode {
    pub const ALL: [PdfQualityMode; 4] = [
        PdfQualityMode::BestQuality,
        PdfQualityMode::Balanced,
        PdfQualityMode::BestSize,
        PdfQualityMode::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PdfQualityMode::BestQuality => "BestQuality",
            PdfQualityMode::Balanced => "Balanced",
            PdfQualityMode::BestSize => "BestSize",
            PdfQualityMode::Custom => "Custom",
        }
    }

    /// Optimizer preset used for this mode. `Custom` has no tunables yet and
    /// runs as `BestQuality`.
    pub fn optimizer_mode(&self) -> PdfOptimizerMode {
        match self {
            PdfQualityMode::BestQuality => PdfOptimizerMode::BestQuality,
            PdfQualityMode::Balanced => PdfOptimizerMode::Balanced,
            PdfQualityMode::BestSize => PdfOptimizerMode::BestSize,
            PdfQualityMode::Custom => PdfOptimizerMode::BestQuality,
        }
    }
}

impl fmt::Display for PdfQualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PdfQualityMode {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PdfQualityMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let names: Vec<&str> = PdfQualityMode::ALL.iter().map(|m| m.as_str()).collect();
                DomainError::Validation(ValidationError::custom(&format!(
                    "Invalid quality mode. Valid options: {}",
                    names.join(", ")
                )))
            })
    }
}

/// Native preset of the PDF optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PdfOptimizerMode {
    BestQuality,
    Balanced,
    BestSize,
}

/// An uploaded file
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Result from an image compression operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percentage of the original size saved, rounded to 2 decimals
    pub compression_ratio: f64,
    pub quality: u8,
    pub format: String,
    /// `data:<mime>;base64,<payload>`
    pub image_data: String,
    #[serde(skip)]
    pub compressed_bytes: Vec<u8>,
}

/// Image properties read without compressing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResult {
    pub file_name: String,
    pub original_size: u64,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
    pub format: String,
    pub compression_type: String,
}

/// Result from a PDF compression operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfCompressionResult {
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub quality_mode: String,
    pub page_count: u32,
    pub used_mrc_segmentation: bool,
    /// `data:application/pdf;base64,<payload>`
    pub pdf_data: String,
    #[serde(skip)]
    pub compressed_bytes: Vec<u8>,
}

/// Per-page details reported by PDF analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfPageInfo {
    pub page_number: u32,
    /// Points (1/72 inch)
    pub width: f64,
    pub height: f64,
    pub image_count: u32,
}

/// PDF properties read without compressing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAnalysisResult {
    pub file_name: String,
    pub file_size: u64,
    pub page_count: u32,
    pub version: String,
    pub producer: Option<String>,
    pub is_linearized: bool,
    pub is_encrypted: bool,
    pub pages: Vec<PdfPageInfo>,
}
