//! PDF compression implementation

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use tokio::task;

use crate::errors::{DomainError, DomainResult};
use super::{OptimizedPdf, PdfDocumentInfo, PdfOptimizer, MAX_ANALYZED_PAGES};
use crate::domains::compression::types::{PdfOptimizerMode, PdfPageInfo};

/// PDF optimizer using Ghostscript when it is installed, lopdf otherwise
pub struct PdfCompressor {
    ghostscript_path: Option<String>,
}

impl PdfCompressor {
    /// `None` selects the in-process lopdf rewriter.
    pub fn new(ghostscript_path: Option<String>) -> Self {
        Self { ghostscript_path }
    }

    pub fn uses_ghostscript(&self) -> bool {
        self.ghostscript_path.is_some()
    }
}

/// Ghostscript `-dPDFSETTINGS` preset for an optimizer mode
pub fn ghostscript_preset(mode: PdfOptimizerMode) -> &'static str {
    match mode {
        PdfOptimizerMode::BestQuality => "printer",
        PdfOptimizerMode::Balanced => "ebook",
        PdfOptimizerMode::BestSize => "screen",
    }
}

/// Command line for a `pdfwrite` run from `input` to `output`
pub fn ghostscript_args(mode: PdfOptimizerMode, input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-sDEVICE=pdfwrite".to_string(),
        format!("-dPDFSETTINGS=/{}", ghostscript_preset(mode)),
        "-dCompatibilityLevel=1.4".to_string(),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        format!("-sOutputFile={}", output.to_string_lossy()),
        // input last; everything after it would be read as another input file
        input.to_string_lossy().into_owned(),
    ]
}

/// Ask Ghostscript for its version; `None` when it cannot be run.
pub fn ghostscript_version(ghostscript_path: &str) -> Option<String> {
    let output = Command::new(ghostscript_path)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

#[async_trait]
impl PdfOptimizer for PdfCompressor {
    async fn analyze(&self, data: Vec<u8>) -> DomainResult<PdfDocumentInfo> {
        task::spawn_blocking(move || inspect_pdf(&data)).await?
    }

    async fn optimize(&self, data: Vec<u8>, mode: PdfOptimizerMode) -> DomainResult<OptimizedPdf> {
        let ghostscript_path = self.ghostscript_path.clone();

        // Run PDF operations in a blocking task
        let data = task::spawn_blocking(move || -> DomainResult<Vec<u8>> {
            match ghostscript_path {
                Some(path) => optimize_with_ghostscript(&path, &data, mode),
                None => optimize_with_lopdf(&data, mode),
            }
        })
        .await??;

        Ok(OptimizedPdf {
            data,
            used_mrc_segmentation: false,
        })
    }

    fn optimizer_name(&self) -> &'static str {
        if self.uses_ghostscript() {
            "Ghostscript"
        } else {
            "Lopdf"
        }
    }
}

fn optimize_with_ghostscript(ghostscript_path: &str, data: &[u8], mode: PdfOptimizerMode) -> DomainResult<Vec<u8>> {
    // Write PDF data to a temporary file
    let mut input_file = NamedTempFile::new()
        .map_err(|e| DomainError::Io(format!("Failed to create temp file: {}", e)))?;

    input_file.write_all(data)
        .map_err(|e| DomainError::Io(format!("Failed to write to temp file: {}", e)))?;

    let input_path = input_file.path();

    // Create a temporary file for output
    let output_file = NamedTempFile::new()
        .map_err(|e| DomainError::Io(format!("Failed to create output temp file: {}", e)))?;

    let output_path = output_file.path();

    let output = Command::new(ghostscript_path)
        .args(ghostscript_args(mode, input_path, output_path))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| DomainError::Pdf(format!("Failed to execute ghostscript: {}", e)))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(DomainError::Pdf(format!("Ghostscript error: {}", error)));
    }

    // Read the compressed file
    std::fs::read(output_path)
        .map_err(|e| DomainError::Io(format!("Failed to read compressed PDF: {}", e)))
}

// Drops unreachable objects and deflates every stream. Keeps the input when
// the rewrite is not smaller.
fn optimize_with_lopdf(data: &[u8], mode: PdfOptimizerMode) -> DomainResult<Vec<u8>> {
    let mut doc = Document::load_mem(data)?;

    doc.prune_objects();
    if mode == PdfOptimizerMode::BestSize {
        doc.delete_zero_length_streams();
    }
    doc.compress();

    let mut output = Vec::with_capacity(data.len());
    doc.save_to(&mut output)
        .map_err(|e| DomainError::Pdf(format!("Failed to save compressed PDF: {}", e)))?;

    if output.len() >= data.len() {
        log::debug!("lopdf rewrite did not shrink the document ({} >= {} bytes)", output.len(), data.len());
        return Ok(data.to_vec());
    }
    Ok(output)
}

fn inspect_pdf(data: &[u8]) -> DomainResult<PdfDocumentInfo> {
    let doc = Document::load_mem(data)?;
    let pages = doc.get_pages();

    let page_info = pages
        .iter()
        .take(MAX_ANALYZED_PAGES)
        .map(|(number, id)| {
            let (width, height) = page_size(&doc, *id).unwrap_or((0.0, 0.0));
            PdfPageInfo {
                page_number: *number,
                width,
                height,
                image_count: image_count(&doc, *id),
            }
        })
        .collect();

    let head = &data[..data.len().min(1024)];

    Ok(PdfDocumentInfo {
        page_count: pages.len() as u32,
        version: doc.version.clone(),
        producer: producer(&doc),
        is_linearized: contains(head, b"/Linearized"),
        // lopdf strips /Encrypt from the trailer once it decrypts with the empty password
        is_encrypted: doc.trailer.has(b"Encrypt") || doc.encryption_state.is_some(),
        pages: page_info,
    })
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

// Page attributes such as MediaBox and Resources may live on an ancestor.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..64 {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn page_size(doc: &Document, page_id: ObjectId) -> Option<(f64, f64)> {
    let Object::Array(media_box) = inherited(doc, page_id, b"MediaBox")? else {
        return None;
    };
    let coords: Vec<f64> = media_box
        .iter()
        .filter_map(|item| resolve(doc, item).and_then(number))
        .collect();
    match coords.as_slice() {
        [x1, y1, x2, y2] => Some(((x2 - x1).abs(), (y2 - y1).abs())),
        _ => None,
    }
}

fn image_count(doc: &Document, page_id: ObjectId) -> u32 {
    let Some(resources) = inherited(doc, page_id, b"Resources").and_then(|r| resolve_dict(doc, r)) else {
        return 0;
    };
    let Some(xobjects) = resources.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)) else {
        return 0;
    };
    xobjects
        .iter()
        .filter_map(|(_, value)| resolve_dict(doc, value))
        .filter(|dict| matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Image"))
        .count() as u32
}

fn producer(doc: &Document) -> Option<String> {
    let info = resolve_dict(doc, doc.trailer.get(b"Info").ok()?)?;
    match resolve(doc, info.get(b"Producer").ok()?)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

// PDF text strings are either UTF-16BE with a byte order mark or PDFDocEncoding.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
