use std::env;
use std::path::{Path, PathBuf};

use media_compress_core::{CompressionSettings, PdfQualityMode, Upload, ValidationError};
use serde::Serialize;

const USAGE: &str = "\
Usage:
  compress_tool compress-image <file> [quality 1-100]
  compress_tool analyze-image <file>
  compress_tool compress-pdf <file> [BestQuality|Balanced|BestSize|Custom]
  compress_tool analyze-pdf <file>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (command, path) = match (args.first(), args.get(1)) {
        (Some(command), Some(path)) => (command.as_str(), PathBuf::from(path)),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    media_compress_core::initialize(CompressionSettings::from_env()).await?;
    let service = media_compress_core::get_compression_service()?;

    // Refuse oversized files before reading them into memory
    let settings = media_compress_core::get_settings()?;
    let limit = if command.ends_with("-pdf") {
        settings.max_pdf_upload_bytes
    } else {
        settings.max_image_upload_bytes
    };
    let size = std::fs::metadata(&path)?.len();
    if size > limit {
        return Err(ValidationError::file_too_large(size, limit).into());
    }
    let upload = read_upload(&path)?;

    match command {
        "compress-image" => {
            let quality = args
                .get(2)
                .map(|q| {
                    q.parse::<i64>()
                        .map_err(|_| ValidationError::invalid_value("quality", &format!("'{}' is not a whole number", q)))
                })
                .transpose()?;
            let result = service.compress_image(upload, quality).await?;
            let written = write_next_to(&path, &result.file_name, &result.compressed_bytes)?;
            print_json(&result, "imageData")?;
            println!("Wrote {}", written.display());
        }
        "analyze-image" => {
            let result = service.analyze_image(upload).await?;
            print_json(&result, "")?;
        }
        "compress-pdf" => {
            let mode = match args.get(2) {
                Some(mode) => mode.parse::<PdfQualityMode>()?,
                None => PdfQualityMode::default(),
            };
            let result = service.compress_pdf(upload, mode).await?;
            let written = write_next_to(&path, &result.file_name, &result.compressed_bytes)?;
            print_json(&result, "pdfData")?;
            println!("Wrote {}", written.display());
        }
        "analyze-pdf" => {
            let result = service.analyze_pdf(upload).await?;
            print_json(&result, "")?;
        }
        other => {
            eprintln!("Unknown command '{}'\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn read_upload(path: &Path) -> std::io::Result<Upload> {
    let data = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Upload::new(file_name, data))
}

fn write_next_to(input: &Path, file_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let output = input.with_file_name(file_name);
    std::fs::write(&output, bytes)?;
    Ok(output)
}

/// Print the result as JSON, leaving out the (large) base64 payload field
fn print_json<T: Serialize>(result: &T, payload_field: &str) -> serde_json::Result<()> {
    let mut value = serde_json::to_value(result)?;
    if let Some(object) = value.as_object_mut() {
        object.remove(payload_field);
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
