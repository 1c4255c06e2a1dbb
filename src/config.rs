//! Runtime settings read from the environment (and a `.env` file if present)

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::domains::compression::format_policy::{MAX_QUALITY, MIN_QUALITY};

pub const DEFAULT_MAX_IMAGE_UPLOAD_BYTES: u64 = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_MAX_PDF_UPLOAD_BYTES: u64 = 50 * 1024 * 1024; // 50MB
pub const DEFAULT_IMAGE_QUALITY: u8 = 75;
pub const DEFAULT_GHOSTSCRIPT_PATH: &str = "gs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub max_image_upload_bytes: u64,
    pub max_pdf_upload_bytes: u64,
    /// Quality used when the caller does not send one
    pub default_image_quality: u8,
    pub ghostscript_path: String,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_image_upload_bytes: DEFAULT_MAX_IMAGE_UPLOAD_BYTES,
            max_pdf_upload_bytes: DEFAULT_MAX_PDF_UPLOAD_BYTES,
            default_image_quality: DEFAULT_IMAGE_QUALITY,
            ghostscript_path: DEFAULT_GHOSTSCRIPT_PATH.to_string(),
        }
    }
}

impl CompressionSettings {
    /// Load settings, loading `.env` first. Missing or unparseable values
    /// keep their defaults.
    pub fn from_env() -> Self {
        // A missing .env file is normal
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_image_quality = match parse_var::<u8, _>(&lookup, "DEFAULT_IMAGE_QUALITY") {
            Some(q) if (MIN_QUALITY..=MAX_QUALITY).contains(&q) => q,
            Some(q) => {
                log::warn!("DEFAULT_IMAGE_QUALITY={} is outside {}-{}, using {}", q, MIN_QUALITY, MAX_QUALITY, DEFAULT_IMAGE_QUALITY);
                defaults.default_image_quality
            }
            None => defaults.default_image_quality,
        };

        Self {
            max_image_upload_bytes: parse_var(&lookup, "MAX_IMAGE_UPLOAD_BYTES")
                .unwrap_or(defaults.max_image_upload_bytes),
            max_pdf_upload_bytes: parse_var(&lookup, "MAX_PDF_UPLOAD_BYTES")
                .unwrap_or(defaults.max_pdf_upload_bytes),
            default_image_quality,
            ghostscript_path: lookup("GHOSTSCRIPT_PATH")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.ghostscript_path),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
