//! Container sniffing
//!
//! `image::guess_format` only tells us the family. The policy table also
//! distinguishes JPEG subsampling, RLE bitmaps and JPEG-in-TIFF, so those are
//! read straight from the headers here, together with the stored bit depth.
//! Decoders expand palettes and packed pixels, so the decoded color type
//! says nothing about how many bits the file spent per pixel.

use image::ImageFormat;

use crate::domains::compression::types::InputFormat;
use crate::errors::{DomainError, DomainResult};

/// Container family plus the compression scheme found inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedFormat {
    pub format: InputFormat,
    pub compression_type: String,
    /// Bits per pixel as stored in the file header, when the header has them
    pub bits_per_pixel: Option<u16>,
}

impl ProbedFormat {
    fn new(format: InputFormat, compression_type: &str) -> Self {
        Self {
            format,
            compression_type: compression_type.to_string(),
            bits_per_pixel: None,
        }
    }

    fn with_bits(mut self, bits_per_pixel: Option<u16>) -> Self {
        self.bits_per_pixel = bits_per_pixel.filter(|&bits| bits > 0);
        self
    }
}

/// Identify the container of an encoded image.
pub fn probe_format(data: &[u8]) -> DomainResult<ProbedFormat> {
    let family = image::guess_format(data)
        .map_err(|e| DomainError::UnsupportedFormat(format!("Failed to detect image format: {}", e)))?;

    let probed = match family {
        ImageFormat::Jpeg => probe_jpeg(data),
        ImageFormat::Png => ProbedFormat::new(InputFormat::Png, "Deflate").with_bits(png_bits_per_pixel(data)),
        // GIF is always palette indexed
        ImageFormat::Gif => ProbedFormat::new(InputFormat::Gif, "Lzw").with_bits(Some(8)),
        ImageFormat::Bmp => probe_bmp(data),
        ImageFormat::Tiff => probe_tiff(data),
        ImageFormat::WebP => probe_webp(data),
        other => ProbedFormat::new(InputFormat::Other(format!("{:?}", other)), "Unknown"),
    };
    Ok(probed)
}

fn probe_jpeg(data: &[u8]) -> ProbedFormat {
    let Some(frame) = read_jpeg_frame(data) else {
        return ProbedFormat::new(InputFormat::Jpeg, "Jpeg");
    };

    let format = match frame.luma_sampling {
        (2, 1) => InputFormat::Jpeg422,
        (4, 1) => InputFormat::Jpeg411,
        _ => InputFormat::Jpeg,
    };
    let compression = match frame.marker {
        0xC2 | 0xC6 | 0xCA | 0xCE => "JpegProgressive",
        0xC3 | 0xC7 | 0xCB | 0xCF => "JpegLossless",
        _ => "Jpeg",
    };
    let bits = u16::from(frame.precision) * u16::from(frame.components);
    ProbedFormat::new(format, compression).with_bits(Some(bits))
}

struct JpegFrame {
    marker: u8,
    precision: u8,
    components: u8,
    /// Horizontal and vertical sampling of the first component
    luma_sampling: (u8, u8),
}

// Walks marker segments until the first start-of-frame.
fn read_jpeg_frame(data: &[u8]) -> Option<JpegFrame> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        pos += 2;

        match marker {
            0xFF => {
                // fill byte
                pos -= 1;
                continue;
            }
            0x01 | 0xD0..=0xD8 => continue,
            0xDA | 0xD9 => return None,
            _ => {}
        }

        let length = usize::from(read_u16_be(data, pos)?);
        if length < 2 {
            return None;
        }

        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            // precision(1) height(2) width(2) components(1) then id, sampling, table
            let precision = *data.get(pos + 2)?;
            let components = *data.get(pos + 7)?;
            if components == 0 {
                return None;
            }
            let sampling = *data.get(pos + 9)?;
            let luma_sampling = if components == 1 {
                (1, 1)
            } else {
                (sampling >> 4, sampling & 0x0F)
            };
            return Some(JpegFrame {
                marker,
                precision,
                components,
                luma_sampling,
            });
        }
        pos += length;
    }
    None
}

// IHDR is always the first chunk: bit depth at 24, color type at 25.
fn png_bits_per_pixel(data: &[u8]) -> Option<u16> {
    if data.get(12..16)? != b"IHDR" {
        return None;
    }
    let depth = u16::from(*data.get(24)?);
    let channels = match *data.get(25)? {
        0 | 3 => 1,
        4 => 2,
        2 => 3,
        6 => 4,
        _ => return None,
    };
    Some(depth * channels)
}

fn probe_bmp(data: &[u8]) -> ProbedFormat {
    // BITMAPINFOHEADER.biCompression; absent in the old 12-byte core header
    let header_size = read_u32_le(data, 14).unwrap_or(0);
    let (compression, bits) = if header_size >= 40 {
        (read_u32_le(data, 30), read_u16_le(data, 28))
    } else {
        (Some(0), read_u16_le(data, 24))
    };

    let probed = match compression {
        Some(1) | Some(2) => ProbedFormat::new(InputFormat::BmpRle, "Rle"),
        Some(3) | Some(6) => ProbedFormat::new(InputFormat::Bmp, "Bitfields"),
        Some(4) => ProbedFormat::new(InputFormat::Bmp, "Jpeg"),
        Some(5) => ProbedFormat::new(InputFormat::Bmp, "Png"),
        _ => ProbedFormat::new(InputFormat::Bmp, "Uncompressed"),
    };
    probed.with_bits(bits)
}

const TIFF_TAG_BITS_PER_SAMPLE: u16 = 258;
const TIFF_TAG_COMPRESSION: u16 = 259;
const TIFF_TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TIFF_TAG_YCBCR_SUBSAMPLING: u16 = 530;

fn probe_tiff(data: &[u8]) -> ProbedFormat {
    let Some(tags) = read_tiff_tags(data) else {
        return ProbedFormat::new(InputFormat::Tif, "Unknown");
    };

    let compression = tags.compression.unwrap_or(1);
    let name = match compression {
        1 => "Uncompressed",
        2 => "CcittRle",
        3 => "CcittFax3",
        4 => "CcittFax4",
        5 => "Lzw",
        6 | 7 => "Jpeg",
        8 | 32946 => "Deflate",
        32773 => "PackBits",
        _ => "Unknown",
    };

    let format = if matches!(compression, 6 | 7) {
        // TIFF defaults YCbCr subsampling to 2x2
        match tags.ycbcr_subsampling.unwrap_or((2, 2)) {
            (2, 1) => InputFormat::TifJpeg422,
            (4, 1) => InputFormat::TifJpeg411,
            _ => InputFormat::TifJpeg,
        }
    } else {
        InputFormat::Tif
    };
    let bits = tags
        .bits_per_sample
        .map(|sample_bits| sample_bits.saturating_mul(tags.samples_per_pixel.unwrap_or(1)));
    ProbedFormat::new(format, name).with_bits(bits)
}

#[derive(Default)]
struct TiffTags {
    /// First sample's bit depth
    bits_per_sample: Option<u16>,
    compression: Option<u16>,
    samples_per_pixel: Option<u16>,
    ycbcr_subsampling: Option<(u16, u16)>,
}

// Reads the first IFD of a classic (non-Big) TIFF.
fn read_tiff_tags(data: &[u8]) -> Option<TiffTags> {
    let big_endian = match data.get(0..2)? {
        b"II" => false,
        b"MM" => true,
        _ => return None,
    };
    let u16_at = |pos: usize| if big_endian { read_u16_be(data, pos) } else { read_u16_le(data, pos) };
    let u32_at = |pos: usize| if big_endian { read_u32_be(data, pos) } else { read_u32_le(data, pos) };

    if u16_at(2)? != 42 {
        return None;
    }
    let ifd = u32_at(4)? as usize;
    let count = usize::from(u16_at(ifd)?);

    let mut tags = TiffTags::default();
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        let value = entry + 8;
        match u16_at(entry)? {
            TIFF_TAG_BITS_PER_SAMPLE => {
                // More than two SHORTs do not fit the entry and live at an offset
                let pos = if u32_at(entry + 4)? > 2 { u32_at(value)? as usize } else { value };
                tags.bits_per_sample = Some(u16_at(pos)?);
            }
            TIFF_TAG_COMPRESSION => tags.compression = Some(u16_at(value)?),
            TIFF_TAG_SAMPLES_PER_PIXEL => tags.samples_per_pixel = Some(u16_at(value)?),
            TIFF_TAG_YCBCR_SUBSAMPLING => tags.ycbcr_subsampling = Some((u16_at(value)?, u16_at(value + 2)?)),
            _ => {}
        }
    }
    Some(tags)
}

const WEBP_VP8X_ALPHA: u8 = 0x10;
const WEBP_VP8L_ALPHA_BIT: u32 = 1 << 28;

fn probe_webp(data: &[u8]) -> ProbedFormat {
    // Chunk payload starts at 20
    let (compression, has_alpha) = match data.get(12..16) {
        Some(b"VP8 ") => ("Vp8", Some(false)),
        Some(b"VP8L") => ("Vp8l", read_u32_le(data, 21).map(|header| header & WEBP_VP8L_ALPHA_BIT != 0)),
        Some(b"VP8X") => ("Vp8x", data.get(20).map(|flags| flags & WEBP_VP8X_ALPHA != 0)),
        _ => ("Unknown", None),
    };
    let bits = has_alpha.map(|alpha| if alpha { 32 } else { 24 });
    ProbedFormat::new(InputFormat::Webp, compression).with_bits(bits)
}

fn read_u16_be(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_u16_le(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_be(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u32_le(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
