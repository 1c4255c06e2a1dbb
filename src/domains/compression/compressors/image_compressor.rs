//! Image codec built on the `image` crate (and libwebp for lossy WebP)

use async_trait::async_trait;
use image::codecs::{bmp, gif, jpeg, png, tiff as tiff_codec, webp as webp_codec};
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, RgbImage};
use std::collections::HashMap;
use std::io::{Cursor, Seek, Write};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tokio::task;

use crate::errors::DomainResult;
use super::{probe_format, DecodedImage, ImageCodec, ImageInfo};
use crate::domains::compression::types::{EncoderQuality, OutputContainer, OutputPolicy};

/// Image codec using the `image` crate for every container it can write
#[derive(Clone, Default)]
pub struct ImageCompressor;

#[async_trait]
impl ImageCodec for ImageCompressor {
    async fn inspect(&self, data: Vec<u8>) -> DomainResult<ImageInfo> {
        task::spawn_blocking(move || inspect_image(&data)).await?
    }

    async fn decode(&self, data: Vec<u8>) -> DomainResult<DecodedImage> {
        task::spawn_blocking(move || -> DomainResult<DecodedImage> {
            let probed = probe_format(&data)?;
            let image = image::load_from_memory(&data)?;
            Ok(DecodedImage {
                format: probed.format,
                bits_per_pixel: probed.bits_per_pixel.unwrap_or_else(|| image.color().bits_per_pixel()),
                image,
            })
        })
        .await?
    }

    async fn encode(
        &self,
        image: DecodedImage,
        policy: OutputPolicy,
        quality: EncoderQuality,
    ) -> DomainResult<Vec<u8>> {
        // Run image operations in a blocking task to avoid blocking the runtime
        task::spawn_blocking(move || encode_image(&image.image, &policy, quality)).await?
    }

    fn codec_name(&self) -> &'static str {
        "ImageCompressor"
    }
}

fn inspect_image(data: &[u8]) -> DomainResult<ImageInfo> {
    let probed = probe_format(data)?;
    let family = image::guess_format(data)?;

    let (width, height, color) = match family {
        ImageFormat::Png => header_of(png::PngDecoder::new(Cursor::new(data))?),
        ImageFormat::Jpeg => header_of(jpeg::JpegDecoder::new(Cursor::new(data))?),
        ImageFormat::Gif => header_of(gif::GifDecoder::new(Cursor::new(data))?),
        ImageFormat::Bmp => header_of(bmp::BmpDecoder::new(Cursor::new(data))?),
        ImageFormat::Tiff => header_of(tiff_codec::TiffDecoder::new(Cursor::new(data))?),
        ImageFormat::WebP => header_of(webp_codec::WebPDecoder::new(Cursor::new(data))?),
        _ => {
            let image = image::load_from_memory(data)?;
            (image.width(), image.height(), image.color())
        }
    };

    Ok(ImageInfo {
        format: probed.format,
        compression_type: probed.compression_type,
        width,
        height,
        bits_per_pixel: probed.bits_per_pixel.unwrap_or_else(|| color.bits_per_pixel()),
    })
}

fn header_of<'a, D: ImageDecoder<'a>>(decoder: D) -> (u32, u32, ColorType) {
    let (width, height) = decoder.dimensions();
    (width, height, decoder.color_type())
}

fn encode_image(img: &DynamicImage, policy: &OutputPolicy, quality: EncoderQuality) -> DomainResult<Vec<u8>> {
    match policy.container {
        OutputContainer::Jpeg => encode_jpeg(img, policy.bits_per_pixel, quality),
        OutputContainer::Png => encode_png(img, quality),
        OutputContainer::Gif => encode_gif(img),
        OutputContainer::Bmp => encode_bmp(img, policy.bits_per_pixel),
        OutputContainer::TifJpeg => encode_tiff(img, quality),
        OutputContainer::Webp => encode_webp(img, quality),
    }
}

/// Convert the inverted 2-255 JPEG factor back to the encoder's 1-100 scale.
pub fn jpeg_percent(factor: u8) -> u8 {
    let factor = u32::from(factor.max(2));
    let percent = ((257 - factor) * 100 + 126) / 253;
    percent.clamp(1, 100) as u8
}

const DEFAULT_JPEG_PERCENT: u8 = 75;

fn encode_jpeg(img: &DynamicImage, bits_per_pixel: u16, quality: EncoderQuality) -> DomainResult<Vec<u8>> {
    let percent = match quality {
        EncoderQuality::JpegFactor(factor) => jpeg_percent(factor),
        _ => DEFAULT_JPEG_PERCENT,
    };

    let mut output = Vec::new();
    let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut output, percent);
    match bits_per_pixel {
        8 | 12 => {
            if bits_per_pixel == 12 {
                log::warn!("12-bit JPEG output is not supported by the encoder, writing 8-bit grayscale");
            }
            let gray = img.to_luma8();
            encoder.encode(&gray, gray.width(), gray.height(), ColorType::L8)?;
        }
        _ => {
            let rgb = img.to_rgb8();
            encoder.encode(&rgb, rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
    }
    Ok(output)
}

fn png_compression(level: u8) -> png::CompressionType {
    match level {
        7..=u8::MAX => png::CompressionType::Best,
        4..=6 => png::CompressionType::Default,
        _ => png::CompressionType::Fast,
    }
}

fn encode_png(img: &DynamicImage, quality: EncoderQuality) -> DomainResult<Vec<u8>> {
    let compression = match quality {
        EncoderQuality::PngLevel(level) => png_compression(level),
        _ => png::CompressionType::Default,
    };

    let mut output = Vec::new();
    let encoder = png::PngEncoder::new_with_quality(&mut output, compression, png::FilterType::Adaptive);
    match img.color() {
        color @ (ColorType::L8
        | ColorType::La8
        | ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::L16
        | ColorType::La16
        | ColorType::Rgb16
        | ColorType::Rgba16) => {
            encoder.write_image(img.as_bytes(), img.width(), img.height(), color)?;
        }
        _ => {
            // Float buffers have no PNG representation
            let rgba = img.to_rgba8();
            encoder.write_image(&rgba, rgba.width(), rgba.height(), ColorType::Rgba8)?;
        }
    }
    Ok(output)
}

fn encode_gif(img: &DynamicImage) -> DomainResult<Vec<u8>> {
    let mut output = Vec::new();
    {
        // The encoder quantizes each frame down to a 256-entry palette
        let mut encoder = gif::GifEncoder::new(&mut output);
        encoder.encode_frame(image::Frame::new(img.to_rgba8()))?;
    }
    Ok(output)
}

fn encode_bmp(img: &DynamicImage, bits_per_pixel: u16) -> DomainResult<Vec<u8>> {
    let mut output = Vec::new();
    let mut encoder = bmp::BmpEncoder::new(&mut output);
    match bits_per_pixel {
        0..=8 if !img.color().has_color() => {
            let gray = img.to_luma8();
            encoder.encode(&gray, gray.width(), gray.height(), ColorType::L8)?;
        }
        0..=8 => {
            let rgb = img.to_rgb8();
            match palette_indices(&rgb) {
                Some((palette, indices)) => {
                    encoder.encode_with_palette(&indices, rgb.width(), rgb.height(), ColorType::L8, Some(&palette))?;
                }
                None => {
                    log::warn!("Image has more than {} colors, writing 24-bit BMP", BMP_PALETTE_SIZE);
                    encoder.encode(&rgb, rgb.width(), rgb.height(), ColorType::Rgb8)?;
                }
            }
        }
        9..=24 => {
            let rgb = img.to_rgb8();
            encoder.encode(&rgb, rgb.width(), rgb.height(), ColorType::Rgb8)?;
        }
        _ => {
            let rgba = img.to_rgba8();
            encoder.encode(&rgba, rgba.width(), rgba.height(), ColorType::Rgba8)?;
        }
    }
    Ok(output)
}

const BMP_PALETTE_SIZE: usize = 256;

/// Build an exact palette for `rgb`, or `None` when it has too many colors.
/// Decoded 8-bit bitmaps always fit, since they came from a palette.
fn palette_indices(rgb: &RgbImage) -> Option<(Vec<[u8; 3]>, Vec<u8>)> {
    let mut palette: Vec<[u8; 3]> = Vec::new();
    let mut lookup: HashMap<[u8; 3], u8> = HashMap::new();
    let mut indices = Vec::with_capacity(rgb.as_raw().len() / 3);

    for pixel in rgb.pixels() {
        let index = match lookup.get(&pixel.0) {
            Some(&index) => index,
            None => {
                if palette.len() == BMP_PALETTE_SIZE {
                    return None;
                }
                let index = palette.len() as u8;
                palette.push(pixel.0);
                lookup.insert(pixel.0, index);
                index
            }
        };
        indices.push(index);
    }
    Some((palette, indices))
}

// TIFF 6.0 field values for JPEG strips
const TIFF_COMPRESSION_JPEG: u16 = 7;
const TIFF_PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const TIFF_PHOTOMETRIC_YCBCR: u16 = 6;
const TIFF_PLANAR_CHUNKY: u16 = 1;
const TIFF_TAG_YCBCR_SUBSAMPLING: u16 = 530;

/// Write a TIFF whose single strip is a baseline JPEG stream at the resolved factor.
fn encode_tiff(img: &DynamicImage, quality: EncoderQuality) -> DomainResult<Vec<u8>> {
    let grayscale = !img.color().has_color();
    if img.color().has_alpha() {
        log::debug!("JPEG strips carry no alpha, dropping it from the TIFF output");
    }
    let strip = encode_jpeg(img, if grayscale { 8 } else { 24 }, quality)?;

    let mut output = Cursor::new(Vec::new());
    write_jpeg_tiff(&mut output, img.width(), img.height(), grayscale, &strip)?;
    Ok(output.into_inner())
}

fn write_jpeg_tiff<W: Write + Seek>(
    writer: &mut W,
    width: u32,
    height: u32,
    grayscale: bool,
    strip: &[u8],
) -> tiff::TiffResult<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let mut directory = encoder.new_directory()?;
    let strip_offset = directory.write_data(strip)?;

    directory.write_tag(Tag::ImageWidth, width)?;
    directory.write_tag(Tag::ImageLength, height)?;
    directory.write_tag(Tag::Compression, TIFF_COMPRESSION_JPEG)?;
    directory.write_tag(Tag::StripOffsets, u32::try_from(strip_offset)?)?;
    directory.write_tag(Tag::RowsPerStrip, height)?;
    directory.write_tag(Tag::StripByteCounts, u32::try_from(strip.len())?)?;
    directory.write_tag(Tag::PlanarConfiguration, TIFF_PLANAR_CHUNKY)?;
    if grayscale {
        directory.write_tag(Tag::BitsPerSample, 8u16)?;
        directory.write_tag(Tag::SamplesPerPixel, 1u16)?;
        directory.write_tag(Tag::PhotometricInterpretation, TIFF_PHOTOMETRIC_BLACK_IS_ZERO)?;
    } else {
        // The JPEG encoder writes every component at full resolution
        directory.write_tag(Tag::BitsPerSample, &[8u16, 8, 8][..])?;
        directory.write_tag(Tag::SamplesPerPixel, 3u16)?;
        directory.write_tag(Tag::PhotometricInterpretation, TIFF_PHOTOMETRIC_YCBCR)?;
        directory.write_tag(Tag::Unknown(TIFF_TAG_YCBCR_SUBSAMPLING), &[1u16, 1][..])?;
    }
    directory.finish()
}

#[cfg(feature = "webp")]
fn encode_webp(img: &DynamicImage, quality: EncoderQuality) -> DomainResult<Vec<u8>> {
    let quality = match quality {
        EncoderQuality::WebpQuality(value) => f32::from(value),
        _ => 75.0,
    };

    let memory = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height()).encode(quality)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(&rgb, rgb.width(), rgb.height()).encode(quality)
    };
    Ok(memory.to_vec())
}

#[cfg(not(feature = "webp"))]
fn encode_webp(_img: &DynamicImage, _quality: EncoderQuality) -> DomainResult<Vec<u8>> {
    Err(crate::errors::DomainError::UnsupportedFormat(
        "WebP encoding requires the `webp` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::compression::format_policy::{resolve_encoder_quality, resolve_output_policy};
    use crate::domains::compression::types::InputFormat;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    fn encode_as(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_jpeg_percent_inverts_factor() {
        assert_eq!(jpeg_percent(4), 100);
        assert_eq!(jpeg_percent(2), 100);
        assert_eq!(jpeg_percent(67), 75);
        assert_eq!(jpeg_percent(254), 1);
        assert_eq!(jpeg_percent(255), 1);
        for q in 1..=100u8 {
            if let EncoderQuality::JpegFactor(factor) = resolve_encoder_quality(OutputContainer::Jpeg, q) {
                assert_eq!(jpeg_percent(factor), q, "quality {}", q);
            }
        }
    }

    #[test]
    fn test_png_level_maps_to_deflate_effort() {
        assert!(matches!(png_compression(9), png::CompressionType::Best));
        assert!(matches!(png_compression(7), png::CompressionType::Best));
        assert!(matches!(png_compression(5), png::CompressionType::Default));
        assert!(matches!(png_compression(0), png::CompressionType::Fast));
    }

    #[tokio::test]
    async fn test_inspect_reads_header() {
        let png = encode_as(&gradient_rgb(33, 17), ImageFormat::Png);
        let info = ImageCompressor.inspect(png).await.unwrap();
        assert_eq!(info.format, InputFormat::Png);
        assert_eq!((info.width, info.height), (33, 17));
        assert_eq!(info.bits_per_pixel, 24);
        assert_eq!(info.compression_type, "Deflate");
    }

    #[tokio::test]
    async fn test_decode_reports_bit_depth() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 128])));
        let decoded = ImageCompressor.decode(encode_as(&rgba, ImageFormat::Png)).await.unwrap();
        assert_eq!(decoded.format, InputFormat::Png);
        assert_eq!(decoded.bits_per_pixel, 32);
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[tokio::test]
    async fn test_jpeg_round_trip_keeps_dimensions() {
        let source = encode_as(&gradient_rgb(64, 48), ImageFormat::Jpeg);
        let decoded = ImageCompressor.decode(source).await.unwrap();
        let policy = resolve_output_policy(&decoded.format, decoded.bits_per_pixel);
        let quality = resolve_encoder_quality(policy.container, 40);

        let output = ImageCompressor.encode(decoded, policy, quality).await.unwrap();
        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Jpeg);
        let reloaded = image::load_from_memory(&output).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_lower_jpeg_quality_is_smaller() {
        let source = encode_as(&gradient_rgb(128, 128), ImageFormat::Png);
        let decoded = ImageCompressor.decode(source).await.unwrap();
        let policy = resolve_output_policy(&InputFormat::Jpeg, 24);

        let low = ImageCompressor
            .encode(decoded.clone(), policy.clone(), resolve_encoder_quality(OutputContainer::Jpeg, 10))
            .await
            .unwrap();
        let high = ImageCompressor
            .encode(decoded, policy, resolve_encoder_quality(OutputContainer::Jpeg, 95))
            .await
            .unwrap();
        assert!(low.len() < high.len());
    }

    #[tokio::test]
    async fn test_grayscale_jpeg_policy_writes_single_channel() {
        let decoded = ImageCompressor
            .decode(encode_as(&gradient_rgb(16, 16), ImageFormat::Png))
            .await
            .unwrap();
        let policy = resolve_output_policy(&InputFormat::Jpeg, 8);
        let output = ImageCompressor
            .encode(decoded, policy, EncoderQuality::JpegFactor(67))
            .await
            .unwrap();
        assert_eq!(image::load_from_memory(&output).unwrap().color(), ColorType::L8);
    }

    #[test]
    fn test_every_container_produces_its_format() {
        let img = gradient_rgb(20, 10);
        let cases = [
            (InputFormat::Png, ImageFormat::Png),
            (InputFormat::Gif, ImageFormat::Gif),
            (InputFormat::Bmp, ImageFormat::Bmp),
            (InputFormat::Other("Tga".into()), ImageFormat::Jpeg),
        ];
        for (input, expected) in cases {
            let policy = resolve_output_policy(&input, 24);
            let quality = resolve_encoder_quality(policy.container, 80);
            let output = encode_image(&img, &policy, quality).unwrap();
            assert_eq!(image::guess_format(&output).unwrap(), expected, "input {}", input);
            let reloaded = image::load_from_memory(&output).unwrap();
            assert_eq!((reloaded.width(), reloaded.height()), (20, 10));
        }
    }

    fn bmp_bits(data: &[u8]) -> u16 {
        u16::from_le_bytes([data[28], data[29]])
    }

    fn eight_bit_bmp(width: u32, height: u32) -> Vec<u8> {
        let gray = GrayImage::from_fn(width, height, |x, y| Luma([((x * 3 + y * 5) % 256) as u8]));
        let mut data = Vec::new();
        bmp::BmpEncoder::new(&mut data)
            .encode(&gray, width, height, ColorType::L8)
            .unwrap();
        data
    }

    #[tokio::test]
    async fn test_eight_bit_bmp_keeps_its_header_depth() {
        let source = eight_bit_bmp(40, 30);
        assert_eq!(bmp_bits(&source), 8);

        let info = ImageCompressor.inspect(source.clone()).await.unwrap();
        assert_eq!(info.bits_per_pixel, 8);

        let decoded = ImageCompressor.decode(source.clone()).await.unwrap();
        assert_eq!(decoded.bits_per_pixel, 8);

        let policy = resolve_output_policy(&decoded.format, decoded.bits_per_pixel);
        assert_eq!(policy.bits_per_pixel, 8);
        let quality = resolve_encoder_quality(policy.container, 50);
        let output = ImageCompressor.encode(decoded, policy, quality).await.unwrap();
        assert_eq!(bmp_bits(&output), 8);
        assert!(output.len() <= source.len(), "{} > {}", output.len(), source.len());
    }

    #[test]
    fn test_palette_bmp_keeps_colors() {
        let colors = [Rgb([200, 10, 10]), Rgb([10, 200, 10]), Rgb([10, 10, 200])];
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(12, 6, |x, _| colors[(x % 3) as usize]));

        let output = encode_bmp(&img, 8).unwrap();
        assert_eq!(bmp_bits(&output), 8);
        let reloaded = image::load_from_memory(&output).unwrap().to_rgb8();
        assert_eq!(reloaded, img.to_rgb8());
    }

    #[test]
    fn test_many_colors_fall_back_to_24_bit_bmp() {
        let output = encode_bmp(&gradient_rgb(64, 64), 8).unwrap();
        assert_eq!(bmp_bits(&output), 24);
    }

    #[test]
    fn test_tiff_output_carries_jpeg_strips() {
        let img = gradient_rgb(48, 32);
        let output = encode_tiff(&img, EncoderQuality::JpegFactor(67)).unwrap();
        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Tiff);

        let probed = probe_format(&output).unwrap();
        assert_eq!(probed.format, InputFormat::TifJpeg);
        assert_eq!(probed.compression_type, "Jpeg");
        assert_eq!(probed.bits_per_pixel, Some(24));

        let mut decoder = tiff::decoder::Decoder::new(Cursor::new(&output)).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (48, 32));
        match decoder.read_image().unwrap() {
            tiff::decoder::DecodingResult::U8(pixels) => assert_eq!(pixels.len(), 48 * 32 * 3),
            _ => panic!("expected 8-bit samples"),
        }
    }

    #[test]
    fn test_tiff_size_follows_quality() {
        let img = gradient_rgb(128, 128);
        let uncompressed = encode_as(&img, ImageFormat::Tiff);
        let low = encode_tiff(&img, resolve_encoder_quality(OutputContainer::TifJpeg, 1)).unwrap();
        let high = encode_tiff(&img, resolve_encoder_quality(OutputContainer::TifJpeg, 100)).unwrap();

        assert!(low.len() < high.len(), "{} >= {}", low.len(), high.len());
        assert!(low.len() < uncompressed.len());
    }

    #[test]
    fn test_grayscale_tiff_reloads() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(20, 10, |x, y| Luma([(x * 10 + y) as u8])));
        let policy = resolve_output_policy(&InputFormat::Tif, 8);
        let output = encode_image(&img, &policy, EncoderQuality::JpegFactor(67)).unwrap();

        assert_eq!(probe_format(&output).unwrap().bits_per_pixel, Some(8));
        let reloaded = image::load_from_memory(&output).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (20, 10));
        assert_eq!(reloaded.color(), ColorType::L8);
    }

    #[cfg(feature = "webp")]
    #[test]
    fn test_webp_output_has_riff_header() {
        let img = gradient_rgb(24, 24);
        let policy = resolve_output_policy(&InputFormat::Webp, 24);
        let output = encode_image(&img, &policy, EncoderQuality::WebpQuality(60)).unwrap();
        assert_eq!(&output[0..4], b"RIFF");
        assert_eq!(&output[8..12], b"WEBP");
    }
}
