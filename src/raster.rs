//! Conversion of decoded images into the printer's monochrome raster lines.
//!
//! Each raster line covers the full print head (`LabelWidth::head_pins`
//! bits, MSB first). Source column `x` lands on bit `x` of the line; only the
//! first `LabelWidth::printable_dots` bits carry image content. Wider rows are
//! cropped, narrower rows and the non-printable pins are filled with
//! non-printed bits at the tail of the line.
//!
//! In landscape mode the image is turned 90° clockwise before scanning:
//! raster line `r` is source column `r`, and bit `i` of that line is the
//! source pixel at `(r, height - 1 - i)`.
//!
//! Lines are not mirrored. The QL head lays bit 0 down on the right-hand edge
//! of the label, so the printed label is the source image flipped left to
//! right; mirror the image beforehand if that matters.
//!
//! Pixels with an alpha channel are composited over white before
//! thresholding, so transparent backgrounds stay unprinted.

use log::debug;
use std::path::Path;

use crate::{error::Error, media::LabelWidth, printer::PrintOptions};

/// Luminance below this value is printed.
pub const THRESHOLD: u8 = 128;

/// Pixel layout of a [`RasterImage`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Luminance of one pixel composited over a white background.
    fn luminance(&self, px: &[u8]) -> u8 {
        let (lum, alpha) = match self {
            Self::Gray => (px[0] as u32, 255),
            Self::GrayAlpha => (px[0] as u32, px[1] as u32),
            Self::Rgb | Self::Rgba => {
                let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                let lum = (299 * r + 587 * g + 114 * b + 500) / 1000;
                let alpha = if *self == Self::Rgba { px[3] as u32 } else { 255 };
                (lum, alpha)
            }
        };
        ((lum * alpha + 255 * (255 - alpha) + 127) / 255) as u8
    }
}

/// A decoded bitmap, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channels: Channels,
    buffer: Vec<u8>,
}

impl RasterImage {
    /// Wraps a pixel buffer as is. The buffer length is checked when the
    /// image is rasterized.
    pub fn new(width: u32, height: u32, channels: Channels, buffer: Vec<u8>) -> Self {
        RasterImage {
            width,
            height,
            channels,
            buffer,
        }
    }

    pub fn from_gray(width: u32, height: u32, buffer: Vec<u8>) -> Self {
        Self::new(width, height, Channels::Gray, buffer)
    }

    pub fn from_rgba(width: u32, height: u32, buffer: Vec<u8>) -> Self {
        Self::new(width, height, Channels::Rgba, buffer)
    }

    pub fn from_dynamic(image: image::DynamicImage) -> Self {
        use image::DynamicImage::*;

        match image {
            ImageLuma8(buf) => {
                let (w, h) = buf.dimensions();
                Self::new(w, h, Channels::Gray, buf.into_raw())
            }
            ImageLumaA8(buf) => {
                let (w, h) = buf.dimensions();
                Self::new(w, h, Channels::GrayAlpha, buf.into_raw())
            }
            ImageRgb8(buf) => {
                let (w, h) = buf.dimensions();
                Self::new(w, h, Channels::Rgb, buf.into_raw())
            }
            other => {
                let buf = other.to_rgba8();
                let (w, h) = buf.dimensions();
                Self::new(w, h, Channels::Rgba, buf.into_raw())
            }
        }
    }

    /// Decodes an encoded image (PNG, or any format `image` recognises).
    pub fn load_png(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self::from_dynamic(image::load_from_memory(bytes)?))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self::from_dynamic(image::open(path)?))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Fails with [`Error::MalformedImage`] unless the buffer holds exactly
    /// `width * height * channels` bytes.
    pub fn check(&self) -> Result<(), Error> {
        let expected = self.width as usize * self.height as usize * self.channels.count();
        if self.buffer.len() != expected {
            return Err(Error::MalformedImage {
                width: self.width,
                height: self.height,
                channels: self.channels.count(),
                expected,
                actual: self.buffer.len(),
            });
        }
        Ok(())
    }

    fn is_printed(&self, x: u32, y: u32) -> bool {
        let n = self.channels.count();
        let offset = (y as usize * self.width as usize + x as usize) * n;
        self.channels.luminance(&self.buffer[offset..offset + n]) < THRESHOLD
    }
}

/// One bit-packed row at the print head's native width, MSB first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonoRasterLine(Vec<u8>);

impl MonoRasterLine {
    /// A line with no printed pixels.
    pub fn blank(label: LabelWidth) -> Self {
        MonoRasterLine(vec![0x00; label.line_bytes()])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MonoRasterLine(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_printed(&self, x: usize) -> bool {
        self.0
            .get(x / 8)
            .map_or(false, |byte| byte & (0x80 >> (x % 8)) != 0)
    }

    fn set(&mut self, x: usize) {
        self.0[x / 8] |= 0x80 >> (x % 8);
    }
}

/// A validated image ready to be scanned into raster lines.
///
/// Holds no line data; every call to [`Raster::lines`] starts a fresh scan.
#[derive(Debug, Clone, Copy)]
pub struct Raster<'a> {
    image: &'a RasterImage,
    label: LabelWidth,
    landscape: bool,
}

/// Checks `image` and prepares it for scanning with `options`.
pub fn rasterize<'a>(image: &'a RasterImage, options: &PrintOptions) -> Result<Raster<'a>, Error> {
    image.check()?;

    let raster = Raster {
        image,
        label: options.label_width(),
        landscape: options.is_landscape(),
    };
    debug!(
        "rasterize {}x{} image onto {} (landscape: {}), {} lines",
        image.width,
        image.height,
        raster.label,
        raster.landscape,
        raster.len()
    );
    if raster.columns() > raster.label.printable_dots() {
        debug!(
            "source rows are {} px, cropped to {} printable dots",
            raster.columns(),
            raster.label.printable_dots()
        );
    }
    Ok(raster)
}

impl<'a> Raster<'a> {
    /// Number of raster lines the image produces.
    pub fn len(&self) -> usize {
        if self.landscape {
            self.image.width as usize
        } else {
            self.image.height as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn label(&self) -> LabelWidth {
        self.label
    }

    // Pixels per source row after rotation.
    fn columns(&self) -> u32 {
        if self.landscape {
            self.image.height
        } else {
            self.image.width
        }
    }

    /// Scans raster line `row`, top to bottom order.
    pub fn line(&self, row: usize) -> Option<MonoRasterLine> {
        if row >= self.len() {
            return None;
        }
        let row = row as u32;
        let mut line = MonoRasterLine::blank(self.label);
        let columns = self.columns().min(self.label.printable_dots());

        for i in 0..columns {
            let printed = if self.landscape {
                self.image.is_printed(row, self.image.height - 1 - i)
            } else {
                self.image.is_printed(i, row)
            };
            if printed {
                line.set(i as usize);
            }
        }
        Some(line)
    }

    pub fn lines(&self) -> Lines<'a> {
        Lines {
            raster: *self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for Raster<'a> {
    type Item = MonoRasterLine;
    type IntoIter = Lines<'a>;

    fn into_iter(self) -> Lines<'a> {
        self.lines()
    }
}

/// Lazy iterator over the raster lines of an image.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    raster: Raster<'a>,
    next: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = MonoRasterLine;

    fn next(&mut self) -> Option<MonoRasterLine> {
        let line = self.raster.line(self.next)?;
        self.next += 1;
        Some(line)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.raster.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Lines<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(label: LabelWidth) -> PrintOptions {
        PrintOptions::new(label)
    }

    // 0 is black, 255 is white
    fn gray(width: u32, height: u32, black: &[(u32, u32)]) -> RasterImage {
        let mut buf = vec![0xFF; (width * height) as usize];
        for (x, y) in black {
            buf[(y * width + x) as usize] = 0x00;
        }
        RasterImage::from_gray(width, height, buf)
    }

    #[test]
    fn single_black_pixel_is_first_bit() {
        let image = gray(2, 2, &[(0, 0)]);
        let raster = rasterize(&image, &options(LabelWidth::Continuous62)).unwrap();
        let lines: Vec<_> = raster.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 90);
        assert_eq!(lines[0].as_bytes()[0], 0x80);
        assert!(lines[0].as_bytes()[1..].iter().all(|b| *b == 0));
        assert!(lines[1].as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn line_length_follows_the_head_not_the_image() {
        for (width, label) in &[
            (1, LabelWidth::Continuous62),
            (2000, LabelWidth::Continuous62),
            (17, LabelWidth::Continuous12),
            (3000, LabelWidth::Continuous102),
        ] {
            let image = RasterImage::from_gray(*width, 3, vec![0x00; *width as usize * 3]);
            let raster = rasterize(&image, &options(*label)).unwrap();
            for line in raster.lines() {
                assert_eq!(line.len(), label.line_bytes());
            }
        }
    }

    #[test]
    fn wide_rows_are_cropped_at_the_printable_width() {
        let image = RasterImage::from_gray(800, 1, vec![0x00; 800]);
        let raster = rasterize(&image, &options(LabelWidth::Continuous62)).unwrap();
        let line = raster.line(0).unwrap();

        assert!((0..696).all(|x| line.is_printed(x)));
        assert!((696..720).all(|x| !line.is_printed(x)));
    }

    #[test]
    fn landscape_turns_columns_into_lines() {
        // 3 wide, 2 tall, black pixels at (0, 1) and (2, 0)
        let image = gray(3, 2, &[(0, 1), (2, 0)]);
        let raster = rasterize(&image, &options(LabelWidth::Continuous62).landscape(true)).unwrap();
        let lines: Vec<_> = raster.lines().collect();

        assert_eq!(lines.len(), 3);
        // line r, bit i is source (r, height - 1 - i)
        assert!(lines[0].is_printed(0));
        assert!(!lines[0].is_printed(1));
        assert!(lines[1].as_bytes().iter().all(|b| *b == 0));
        assert!(!lines[2].is_printed(0));
        assert!(lines[2].is_printed(1));
    }

    #[test]
    fn rgb_threshold_uses_luminance() {
        let pixels = vec![
            0x00, 0x00, 0x00, 0xFF, // black
            0xFF, 0xFF, 0xFF, 0xFF, // white
            0x00, 0x00, 0xFF, 0xFF, // pure blue is dark
            0x80, 0x80, 0x80, 0xFF, // mid grey sits on the threshold
            0x7F, 0x7F, 0x7F, 0xFF, // just below it
        ];
        let image = RasterImage::from_rgba(5, 1, pixels);
        let line = rasterize(&image, &options(LabelWidth::Continuous62))
            .unwrap()
            .line(0)
            .unwrap();

        assert!(line.is_printed(0));
        assert!(!line.is_printed(1));
        assert!(line.is_printed(2));
        assert!(!line.is_printed(3));
        assert!(line.is_printed(4));
    }

    #[test]
    fn transparent_pixels_composite_over_white() {
        let pixels = vec![
            0x00, 0x00, 0x00, 0x00, // black, fully transparent
            0x00, 0x00, 0x00, 0x80, // black, half covered: 127
            0x00, 0x00, 0x00, 0x7F, // black, just under half: 128
            0xFF, 0xFF, 0xFF, 0x00, // white, transparent
        ];
        let image = RasterImage::from_rgba(4, 1, pixels);
        let line = rasterize(&image, &options(LabelWidth::Continuous62))
            .unwrap()
            .line(0)
            .unwrap();

        assert!(!line.is_printed(0));
        assert!(line.is_printed(1));
        assert!(!line.is_printed(2));
        assert!(!line.is_printed(3));

        let gray_alpha = RasterImage::new(2, 1, Channels::GrayAlpha, vec![0x00, 0x00, 0x00, 0xFF]);
        let line = rasterize(&gray_alpha, &options(LabelWidth::Continuous62))
            .unwrap()
            .line(0)
            .unwrap();
        assert!(!line.is_printed(0));
        assert!(line.is_printed(1));
    }

    #[test]
    fn scanning_is_deterministic_and_restartable() {
        let image = gray(40, 30, &[(1, 1), (39, 29), (20, 10), (5, 25)]);
        let raster = rasterize(&image, &options(LabelWidth::Continuous29)).unwrap();

        let first: Vec<_> = raster.lines().collect();
        let second: Vec<_> = raster.lines().collect();
        let again: Vec<_> = rasterize(&image, &options(LabelWidth::Continuous29))
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(first, second);
        assert_eq!(first, again);
        assert_eq!(raster.lines().len(), 30);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let image = RasterImage::from_rgba(2, 2, vec![0xFF; 15]);
        match rasterize(&image, &options(LabelWidth::Continuous62)) {
            Err(Error::MalformedImage {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 15);
            }
            other => panic!("expected MalformedImage, got {:?}", other),
        }
    }

    #[test]
    fn empty_image_has_no_lines() {
        let image = RasterImage::from_gray(0, 0, Vec::new());
        let raster = rasterize(&image, &options(LabelWidth::Continuous62)).unwrap();
        assert!(raster.is_empty());
        assert_eq!(raster.lines().count(), 0);
    }

    #[test]
    fn dynamic_images_keep_their_layout() {
        let buf = image::GrayImage::from_raw(2, 1, vec![0x00, 0xFF]).unwrap();
        let image = RasterImage::from_dynamic(image::DynamicImage::ImageLuma8(buf));
        assert_eq!(image.channels(), Channels::Gray);
        assert_eq!(image.as_bytes(), &[0x00, 0xFF]);
        assert!(image.check().is_ok());
    }
}
