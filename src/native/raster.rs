use std::collections::BTreeMap;
use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};

use super::{
    filters, rgba8_byte_size, Colorspace, ImageLoader, NativeError, NativeImage, NativeResult,
    PixelDepth,
};
use crate::operation::{KernelKind, TransformKind};

/// Decoded image held by the `image` crate.
///
/// Mutators require the normalized RGBA8 form produced by
/// `convert_depth(Eight)` followed by `convert_colorspace(Srgb)`.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: DynamicImage,
    source_format: Option<ImageFormat>,
    exif: Option<Vec<u8>>,
}

impl RasterImage {
    pub fn from_dynamic(pixels: DynamicImage) -> Self {
        Self {
            pixels,
            source_format: None,
            exif: None,
        }
    }

    pub fn open(path: &Path) -> NativeResult<Self> {
        let decode_error = |message: String| NativeError::Decode {
            path: path.to_path_buf(),
            message,
        };
        let reader = ImageReader::open(path)
            .map_err(|err| decode_error(err.to_string()))?
            .with_guessed_format()
            .map_err(|err| decode_error(err.to_string()))?;
        let source_format = reader.format();
        let mut decoder = reader
            .into_decoder()
            .map_err(|err| decode_error(err.to_string()))?;
        let exif = match decoder.exif_metadata() {
            Ok(exif) => exif,
            Err(err) => {
                tracing::debug!(path = %path.display(), ?err, "ignoring unreadable exif block");
                None
            }
        };
        let pixels =
            DynamicImage::from_decoder(decoder).map_err(|err| decode_error(err.to_string()))?;

        Ok(Self {
            pixels,
            source_format,
            exif,
        })
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.pixels
    }

    fn rgba_mut(&mut self, operation: &'static str) -> NativeResult<&mut RgbaImage> {
        match &mut self.pixels {
            DynamicImage::ImageRgba8(image) => Ok(image),
            other => Err(NativeError::Operation {
                operation,
                message: format!("expected normalized rgba8 pixels, found {:?}", other.color()),
            }),
        }
    }
}

impl NativeImage for RasterImage {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn convert_depth(&mut self, depth: PixelDepth) -> NativeResult<()> {
        let has_color = self.pixels.color().has_color();
        self.pixels = match (depth, has_color) {
            (PixelDepth::Eight, true) => DynamicImage::ImageRgba8(self.pixels.to_rgba8()),
            (PixelDepth::Eight, false) => DynamicImage::ImageLumaA8(self.pixels.to_luma_alpha8()),
            (PixelDepth::Sixteen, true) => DynamicImage::ImageRgba16(self.pixels.to_rgba16()),
            (PixelDepth::Sixteen, false) => {
                DynamicImage::ImageLumaA16(self.pixels.to_luma_alpha16())
            }
        };
        Ok(())
    }

    fn convert_colorspace(&mut self, colorspace: Colorspace) -> NativeResult<()> {
        let sixteen = self.pixels.color().bytes_per_pixel() / self.pixels.color().channel_count()
            > 1;
        self.pixels = match (colorspace, sixteen) {
            (Colorspace::Srgb, false) => DynamicImage::ImageRgba8(self.pixels.to_rgba8()),
            (Colorspace::Srgb, true) => DynamicImage::ImageRgba16(self.pixels.to_rgba16()),
            (Colorspace::Grayscale, false) => {
                DynamicImage::ImageLumaA8(self.pixels.to_luma_alpha8())
            }
            (Colorspace::Grayscale, true) => {
                DynamicImage::ImageLumaA16(self.pixels.to_luma_alpha16())
            }
        };
        Ok(())
    }

    fn contrast(&mut self, delta: f32) -> NativeResult<()> {
        filters::contrast(self.rgba_mut("contrast")?, delta);
        Ok(())
    }

    fn brightness(&mut self, delta: f32) -> NativeResult<()> {
        filters::brightness(self.rgba_mut("brightness")?, delta);
        Ok(())
    }

    fn exposure(&mut self, delta: f32, black_point: f32) -> NativeResult<()> {
        filters::exposure(self.rgba_mut("exposure")?, delta, black_point);
        Ok(())
    }

    fn hsl_adjust(&mut self, hue: f32, saturation: f32, lightness: f32) -> NativeResult<()> {
        filters::hsl_adjust(self.rgba_mut("hsl")?, hue, saturation, lightness);
        Ok(())
    }

    fn kernel(&mut self, kind: KernelKind, radius: u32) -> NativeResult<()> {
        let image = self.rgba_mut(kind.label())?;
        match kind {
            KernelKind::BoxBlur => filters::box_blur(image, radius),
            KernelKind::GaussianBlur => filters::gaussian_blur(image, radius),
            KernelKind::MedianBlur => filters::median_blur(image, radius),
            KernelKind::BilateralBlur => filters::bilateral_blur(image, radius),
            KernelKind::ContrastStretch => filters::contrast_stretch(image, radius),
        }
        Ok(())
    }

    fn transform(&mut self, kind: TransformKind) -> NativeResult<()> {
        filters::transform(self.rgba_mut(kind.label())?, kind);
        Ok(())
    }

    fn save(&self, path: &Path, format: Option<ImageFormat>) -> NativeResult<()> {
        let format = match format {
            Some(format) => format,
            None => ImageFormat::from_path(path).map_err(|_| NativeError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?,
        };
        let encode_error = |err: image::ImageError| NativeError::Encode {
            path: path.to_path_buf(),
            message: err.to_string(),
        };

        if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(self.pixels.to_rgb8())
                .save_with_format(path, format)
                .map_err(encode_error)
        } else {
            self.pixels
                .save_with_format(path, format)
                .map_err(encode_error)
        }
    }

    fn output_buffer_size(&self) -> usize {
        rgba8_byte_size(self.width(), self.height())
    }

    fn write_to_buffer(&self, buffer: &mut [u8]) -> NativeResult<()> {
        let required = self.output_buffer_size();
        if buffer.len() < required {
            return Err(NativeError::BufferTooSmall {
                required,
                available: buffer.len(),
            });
        }
        match &self.pixels {
            DynamicImage::ImageRgba8(image) => {
                buffer[..required].copy_from_slice(image.as_raw());
            }
            other => {
                buffer[..required].copy_from_slice(other.to_rgba8().as_raw());
            }
        }
        Ok(())
    }

    fn exif_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("ImageWidth".to_string(), self.width().to_string());
        metadata.insert("ImageHeight".to_string(), self.height().to_string());
        metadata.insert(
            "ColorType".to_string(),
            format!("{:?}", self.pixels.color()),
        );
        if let Some(format) = self.source_format {
            metadata.insert("Format".to_string(), format!("{format:?}"));
        }
        if let Some(exif) = &self.exif {
            metadata.insert("ExifBytes".to_string(), exif.len().to_string());
        }
        metadata
    }

    fn clone_image(&self) -> Box<dyn NativeImage> {
        Box::new(self.clone())
    }
}

/// Loads files from disk through the `image` crate decoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterLoader;

impl ImageLoader for RasterLoader {
    fn load(&self, path: &Path) -> NativeResult<Box<dyn NativeImage>> {
        RasterImage::open(path).map(|image| Box::new(image) as Box<dyn NativeImage>)
    }
}
