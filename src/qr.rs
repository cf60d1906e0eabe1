use qrcode::{Color, QrCode};

use crate::{error::Error, raster::RasterImage};

/// Width of the light border around the code, in modules.
const QUIET_ZONE: usize = 4;

impl RasterImage {
    /// Renders `text` as a QR code, `module_px` pixels per module, with a
    /// four module quiet zone. The result is a square grayscale image.
    pub fn qr_code(text: &str, module_px: u32) -> Result<Self, Error> {
        if module_px == 0 {
            return Err(Error::InvalidConfig("QR module size must be at least 1".into()));
        }

        let code = QrCode::new(text.as_bytes()).map_err(Error::QrCode)?;
        let modules = code.width();
        let colors = code.to_colors();
        let scale = module_px as usize;
        let side = (modules + 2 * QUIET_ZONE) * scale;

        let mut buffer = vec![0xFF; side * side];
        for (i, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let left = (i % modules + QUIET_ZONE) * scale;
            let top = (i / modules + QUIET_ZONE) * scale;
            for y in top..top + scale {
                let row = y * side;
                for px in &mut buffer[row + left..row + left + scale] {
                    *px = 0x00;
                }
            }
        }

        Ok(RasterImage::from_gray(side as u32, side as u32, buffer))
    }
}
