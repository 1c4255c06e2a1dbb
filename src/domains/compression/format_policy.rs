//! Output format and encoder quality selection
//!
//! Given what the format probe reported for an input file, decides which
//! container gets written, at what bit depth, and converts the public 1-100
//! quality knob into the native parameter of the encoder that will run.
//! Everything here is pure; no call can fail.

use super::types::{EncoderQuality, InputFormat, OutputContainer, OutputPolicy};

/// Lowest accepted public quality
pub const MIN_QUALITY: u8 = 1;
/// Highest accepted public quality
pub const MAX_QUALITY: u8 = 100;

const JPEG_FACTOR_MIN: u32 = 2;
const JPEG_FACTOR_MAX: u32 = 255;

/// Decide the output container, MIME type, extension and bit depth for an input.
pub fn resolve_output_policy(input_format: &InputFormat, input_bits_per_pixel: u16) -> OutputPolicy {
    match input_format {
        InputFormat::Png => OutputPolicy {
            container: OutputContainer::Png,
            mime_type: "image/png",
            file_extension: ".png",
            bits_per_pixel: input_bits_per_pixel,
        },

        InputFormat::Jpeg | InputFormat::Jpeg411 | InputFormat::Jpeg422 => jpeg_policy(input_bits_per_pixel),

        InputFormat::Gif => OutputPolicy {
            container: OutputContainer::Gif,
            mime_type: "image/gif",
            file_extension: ".gif",
            bits_per_pixel: 8, // palette only
        },

        InputFormat::Bmp | InputFormat::BmpRle => OutputPolicy {
            container: OutputContainer::Bmp,
            mime_type: "image/bmp",
            file_extension: ".bmp",
            bits_per_pixel: input_bits_per_pixel,
        },

        InputFormat::Tif
        | InputFormat::TifJpeg
        | InputFormat::TifJpeg411
        | InputFormat::TifJpeg422 => OutputPolicy {
            container: OutputContainer::TifJpeg,
            mime_type: "image/tiff",
            file_extension: ".tif",
            bits_per_pixel: input_bits_per_pixel,
        },

        InputFormat::Webp => OutputPolicy {
            container: OutputContainer::Webp,
            mime_type: "image/webp",
            file_extension: ".webp",
            bits_per_pixel: input_bits_per_pixel,
        },

        InputFormat::Other(_) => jpeg_policy(input_bits_per_pixel),
    }
}

fn jpeg_policy(input_bits_per_pixel: u16) -> OutputPolicy {
    OutputPolicy {
        container: OutputContainer::Jpeg,
        mime_type: "image/jpeg",
        file_extension: ".jpg",
        bits_per_pixel: normalize_jpeg_bits_per_pixel(input_bits_per_pixel),
    }
}

/// JPEG has no alpha channel: grayscale stays 8, 12-bit stays 12, the rest is RGB.
pub fn normalize_jpeg_bits_per_pixel(bits_per_pixel: u16) -> u16 {
    match bits_per_pixel {
        0..=8 => 8,
        12 => 12,
        _ => 24,
    }
}

/// Convert the public quality (1-100, higher is better) into the native
/// parameter of the encoder for `container`. Out-of-range input is clamped.
pub fn resolve_encoder_quality(container: OutputContainer, quality: u8) -> EncoderQuality {
    let quality = quality.clamp(MIN_QUALITY, MAX_QUALITY);
    match container {
        OutputContainer::Png => EncoderQuality::PngLevel(png_level(quality)),
        OutputContainer::Jpeg | OutputContainer::TifJpeg => EncoderQuality::JpegFactor(jpeg_factor(quality)),
        OutputContainer::Webp => EncoderQuality::WebpQuality(quality),
        OutputContainer::Gif | OutputContainer::Bmp => EncoderQuality::None,
    }
}

// 1 -> 9, 100 -> 0
fn png_level(quality: u8) -> u8 {
    let q = u32::from(quality);
    (9 - (q - 1) * 9 / 99) as u8
}

// round(257 - q * 2.53) clamped to [2, 255], in hundredths so rounding is exact.
// The numerator stays positive for q <= 100, so adding 50 rounds half up.
fn jpeg_factor(quality: u8) -> u8 {
    let q = u32::from(quality);
    let raw = (25_700 - q * 253 + 50) / 100;
    raw.clamp(JPEG_FACTOR_MIN, JPEG_FACTOR_MAX) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_named_formats() -> Vec<InputFormat> {
        vec![
            InputFormat::Jpeg,
            InputFormat::Jpeg411,
            InputFormat::Jpeg422,
            InputFormat::Png,
            InputFormat::Gif,
            InputFormat::Bmp,
            InputFormat::BmpRle,
            InputFormat::Tif,
            InputFormat::TifJpeg,
            InputFormat::TifJpeg411,
            InputFormat::TifJpeg422,
            InputFormat::Webp,
        ]
    }

    fn triple(policy: &OutputPolicy) -> (OutputContainer, &'static str, &'static str) {
        (policy.container, policy.mime_type, policy.file_extension)
    }

    #[test]
    fn test_policy_table() {
        let jpeg = (OutputContainer::Jpeg, "image/jpeg", ".jpg");
        let cases = vec![
            (InputFormat::Png, (OutputContainer::Png, "image/png", ".png")),
            (InputFormat::Jpeg, jpeg),
            (InputFormat::Jpeg411, jpeg),
            (InputFormat::Jpeg422, jpeg),
            (InputFormat::Gif, (OutputContainer::Gif, "image/gif", ".gif")),
            (InputFormat::Bmp, (OutputContainer::Bmp, "image/bmp", ".bmp")),
            (InputFormat::BmpRle, (OutputContainer::Bmp, "image/bmp", ".bmp")),
            (InputFormat::Tif, (OutputContainer::TifJpeg, "image/tiff", ".tif")),
            (InputFormat::TifJpeg, (OutputContainer::TifJpeg, "image/tiff", ".tif")),
            (InputFormat::TifJpeg411, (OutputContainer::TifJpeg, "image/tiff", ".tif")),
            (InputFormat::TifJpeg422, (OutputContainer::TifJpeg, "image/tiff", ".tif")),
            (InputFormat::Webp, (OutputContainer::Webp, "image/webp", ".webp")),
        ];
        for (input, expected) in cases {
            let policy = resolve_output_policy(&input, 24);
            assert_eq!(triple(&policy), expected, "input {}", input);
        }
    }

    #[test]
    fn test_unknown_formats_fall_back_to_jpeg() {
        for name in ["Tga", "Pnm", "Ico", ""] {
            let policy = resolve_output_policy(&InputFormat::Other(name.to_string()), 32);
            assert_eq!(triple(&policy), (OutputContainer::Jpeg, "image/jpeg", ".jpg"));
            assert_eq!(policy.bits_per_pixel, 24);
        }
    }

    #[test]
    fn test_jpeg_bit_depth_normalization() {
        assert_eq!(normalize_jpeg_bits_per_pixel(1), 8);
        assert_eq!(normalize_jpeg_bits_per_pixel(4), 8);
        assert_eq!(normalize_jpeg_bits_per_pixel(8), 8);
        assert_eq!(normalize_jpeg_bits_per_pixel(12), 12);
        assert_eq!(normalize_jpeg_bits_per_pixel(16), 24);
        assert_eq!(normalize_jpeg_bits_per_pixel(24), 24);
        assert_eq!(normalize_jpeg_bits_per_pixel(32), 24);
        assert_eq!(normalize_jpeg_bits_per_pixel(48), 24);

        let other = InputFormat::Other("Pcx".into());
        assert_eq!(resolve_output_policy(&other, 8).bits_per_pixel, 8);
        assert_eq!(resolve_output_policy(&other, 12).bits_per_pixel, 12);
        assert_eq!(resolve_output_policy(&InputFormat::Jpeg422, 9).bits_per_pixel, 24);
    }

    #[test]
    fn test_pass_through_bit_depths() {
        for format in [InputFormat::Png, InputFormat::Bmp, InputFormat::BmpRle, InputFormat::Tif, InputFormat::Webp] {
            for bpp in [1, 8, 16, 24, 32, 64] {
                assert_eq!(resolve_output_policy(&format, bpp).bits_per_pixel, bpp);
            }
        }
    }

    #[test]
    fn test_gif_always_eight_bits() {
        for bpp in [1, 4, 8, 24, 32] {
            assert_eq!(resolve_output_policy(&InputFormat::Gif, bpp).bits_per_pixel, 8);
        }
    }

    #[test]
    fn test_png_level_boundaries() {
        assert_eq!(resolve_encoder_quality(OutputContainer::Png, 1), EncoderQuality::PngLevel(9));
        assert_eq!(resolve_encoder_quality(OutputContainer::Png, 100), EncoderQuality::PngLevel(0));
        assert_eq!(resolve_encoder_quality(OutputContainer::Png, 12), EncoderQuality::PngLevel(8));
        assert_eq!(resolve_encoder_quality(OutputContainer::Png, 50), EncoderQuality::PngLevel(5));
    }

    #[test]
    fn test_jpeg_factor_boundaries() {
        // 257 - 2.53 = 254.47
        assert_eq!(resolve_encoder_quality(OutputContainer::Jpeg, 1), EncoderQuality::JpegFactor(254));
        // 257 - 253 = 4
        assert_eq!(resolve_encoder_quality(OutputContainer::Jpeg, 100), EncoderQuality::JpegFactor(4));
        // 257 - 126.5 = 130.5, rounds up
        assert_eq!(resolve_encoder_quality(OutputContainer::Jpeg, 50), EncoderQuality::JpegFactor(131));
        assert_eq!(resolve_encoder_quality(OutputContainer::TifJpeg, 1), EncoderQuality::JpegFactor(254));
        assert_eq!(resolve_encoder_quality(OutputContainer::TifJpeg, 100), EncoderQuality::JpegFactor(4));
    }

    #[test]
    fn test_jpeg_factor_matches_float_formula() {
        for q in MIN_QUALITY..=MAX_QUALITY {
            let expected = (257.0 - f64::from(q) * 2.53).round().clamp(2.0, 255.0) as u8;
            assert_eq!(
                resolve_encoder_quality(OutputContainer::Jpeg, q),
                EncoderQuality::JpegFactor(expected),
                "quality {}",
                q
            );
        }
    }

    #[test]
    fn test_out_of_range_quality_is_clamped() {
        assert_eq!(resolve_encoder_quality(OutputContainer::Jpeg, 0), EncoderQuality::JpegFactor(254));
        assert_eq!(resolve_encoder_quality(OutputContainer::Png, 0), EncoderQuality::PngLevel(9));
        assert_eq!(resolve_encoder_quality(OutputContainer::Webp, 0), EncoderQuality::WebpQuality(1));
        assert_eq!(resolve_encoder_quality(OutputContainer::Webp, 250), EncoderQuality::WebpQuality(100));
        assert_eq!(resolve_encoder_quality(OutputContainer::Jpeg, 250), EncoderQuality::JpegFactor(4));
    }

    #[test]
    fn test_webp_is_identity() {
        for q in MIN_QUALITY..=MAX_QUALITY {
            assert_eq!(resolve_encoder_quality(OutputContainer::Webp, q), EncoderQuality::WebpQuality(q));
        }
    }

    #[test]
    fn test_gif_and_bmp_have_no_quality() {
        for q in [1, 50, 100] {
            assert_eq!(resolve_encoder_quality(OutputContainer::Gif, q), EncoderQuality::None);
            assert_eq!(resolve_encoder_quality(OutputContainer::Bmp, q), EncoderQuality::None);
        }
    }

    #[test]
    fn test_quality_is_monotonic_in_perceptual_direction() {
        let mut previous: Option<(u8, u8, u8)> = None;
        for q in MIN_QUALITY..=MAX_QUALITY {
            let png = match resolve_encoder_quality(OutputContainer::Png, q) {
                EncoderQuality::PngLevel(level) => level,
                other => panic!("unexpected {:?}", other),
            };
            let jpeg = match resolve_encoder_quality(OutputContainer::Jpeg, q) {
                EncoderQuality::JpegFactor(factor) => factor,
                other => panic!("unexpected {:?}", other),
            };
            let webp = match resolve_encoder_quality(OutputContainer::Webp, q) {
                EncoderQuality::WebpQuality(value) => value,
                other => panic!("unexpected {:?}", other),
            };
            if let Some((prev_png, prev_jpeg, prev_webp)) = previous {
                // Native PNG and JPEG scales are inverted.
                assert!(png <= prev_png, "png level rose at {}", q);
                assert!(jpeg <= prev_jpeg, "jpeg factor rose at {}", q);
                assert!(webp >= prev_webp, "webp quality fell at {}", q);
            }
            assert!((JPEG_FACTOR_MIN as u8..=JPEG_FACTOR_MAX as u8).contains(&jpeg));
            assert!(png <= 9);
            previous = Some((png, jpeg, webp));
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        for format in all_named_formats() {
            for bpp in [8, 12, 24, 32] {
                assert_eq!(resolve_output_policy(&format, bpp), resolve_output_policy(&format, bpp));
            }
        }
        for q in [1, 42, 100] {
            assert_eq!(
                resolve_encoder_quality(OutputContainer::Jpeg, q),
                resolve_encoder_quality(OutputContainer::Jpeg, q)
            );
        }
    }

    #[test]
    fn test_jpeg_422_end_to_end() {
        let policy = resolve_output_policy(&InputFormat::Jpeg422, 24);
        assert_eq!(
            policy,
            OutputPolicy {
                container: OutputContainer::Jpeg,
                mime_type: "image/jpeg",
                file_extension: ".jpg",
                bits_per_pixel: 24,
            }
        );
        // round(257 - 189.75) = 67
        assert_eq!(resolve_encoder_quality(policy.container, 75), EncoderQuality::JpegFactor(67));
    }

    #[test]
    fn test_resolver_is_safe_across_threads() {
        let handles: Vec<_> = (1..=8u8)
            .map(|i| {
                std::thread::spawn(move || {
                    let q = i * 12;
                    let policy = resolve_output_policy(&InputFormat::Webp, 32);
                    let quality = resolve_encoder_quality(policy.container, q);
                    (policy, quality)
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let (policy, quality) = handle.join().unwrap();
            assert_eq!(policy.container, OutputContainer::Webp);
            assert_eq!(quality, EncoderQuality::WebpQuality((i as u8 + 1) * 12));
        }
    }
}
