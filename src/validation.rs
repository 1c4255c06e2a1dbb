use crate::domains::compression::compressors::get_extension;
use crate::domains::compression::format_policy::{MAX_QUALITY, MIN_QUALITY};
use crate::domains::compression::types::Upload;
use crate::errors::{DomainError, DomainResult, ValidationError};
use std::fmt::Display;

/// Extensions accepted for image uploads
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

/// Extensions accepted for PDF uploads
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Struct for configuring validations in a fluent style
pub struct ValidationBuilder<T> {
    field_name: String,
    value: Option<T>,
    errors: Vec<ValidationError>,
}

impl<T> ValidationBuilder<T> {
    pub fn new(field_name: &str, value: Option<T>) -> Self {
        Self {
            field_name: field_name.to_string(),
            value,
            errors: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        if self.value.is_none() {
            self.errors.push(ValidationError::required(&self.field_name));
        }
        self
    }

    pub fn validate_with<F>(mut self, validator: F) -> Self
    where F: FnOnce(&T) -> Result<(), ValidationError> {
        if let Some(value) = &self.value {
            if let Err(err) = validator(value) {
                self.errors.push(err);
            }
        }
        self
    }

    /// Complete validation and return result
    pub fn validate(self) -> DomainResult<()> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            // Return the first error for simplicity
            Some(error) => Err(DomainError::Validation(error)),
        }
    }
}

/// Numeric validations
impl<T: PartialOrd + Display> ValidationBuilder<T> {
    pub fn range(mut self, min: T, max: T) -> Self {
        if let Some(value) = &self.value {
            if *value < min || *value > max {
                self.errors.push(ValidationError::range(&self.field_name, min, max));
            }
        }
        self
    }
}

/// Check the extension against an allow-list, ignoring case
pub fn validate_file_extension(filename: &str, allowed_extensions: &[&str]) -> bool {
    get_extension(filename)
        .map(|ext| allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Check file size against a maximum
pub fn validate_file_size(size_bytes: u64, max_size_bytes: u64) -> bool {
    size_bytes <= max_size_bytes
}

/// Public quality knob; higher is better
pub fn validate_quality(quality: i64) -> DomainResult<u8> {
    ValidationBuilder::new("Quality", Some(quality))
        .range(i64::from(MIN_QUALITY), i64::from(MAX_QUALITY))
        .validate()?;
    Ok(quality as u8)
}

fn validate_upload_common(upload: &Upload, max_size_bytes: u64) -> DomainResult<()> {
    if upload.data.is_empty() {
        return Err(DomainError::Validation(ValidationError::custom("No file uploaded")));
    }
    if !validate_file_size(upload.size(), max_size_bytes) {
        return Err(DomainError::Validation(ValidationError::file_too_large(upload.size(), max_size_bytes)));
    }
    Ok(())
}

// Blank names count as missing
fn file_name_of(upload: &Upload) -> Option<&str> {
    Some(upload.file_name.trim()).filter(|name| !name.is_empty())
}

pub fn validate_image_upload(upload: &Upload, max_size_bytes: u64) -> DomainResult<()> {
    validate_upload_common(upload, max_size_bytes)?;

    ValidationBuilder::new("file name", file_name_of(upload))
        .required()
        .validate_with(|name| {
            if validate_file_extension(name, IMAGE_EXTENSIONS) {
                Ok(())
            } else {
                let allowed: Vec<String> = IMAGE_EXTENSIONS.iter().map(|e| format!(".{}", e)).collect();
                Err(ValidationError::custom(&format!(
                    "Invalid file type. Allowed types: {}",
                    allowed.join(", ")
                )))
            }
        })
        .validate()?;

    log::info!("Image file validated successfully: {}, Size: {} bytes", upload.file_name, upload.size());
    Ok(())
}

pub fn validate_pdf_upload(upload: &Upload, max_size_bytes: u64) -> DomainResult<()> {
    validate_upload_common(upload, max_size_bytes)?;

    ValidationBuilder::new("file name", file_name_of(upload))
        .required()
        .validate_with(|name| {
            if validate_file_extension(name, PDF_EXTENSIONS) {
                Ok(())
            } else {
                Err(ValidationError::custom("Invalid file type. Only PDF files are supported"))
            }
        })
        .validate()?;

    let sniffed = infer::get(&upload.data).map(|kind| kind.mime_type());
    if sniffed != Some("application/pdf") {
        return Err(DomainError::Validation(ValidationError::format(
            "file",
            "content is not a PDF document",
        )));
    }

    log::info!("PDF file validated successfully: {}, Size: {} bytes", upload.file_name, upload.size());
    Ok(())
}
