//! Error types for label rasterization and printer transport.
//!
//! Every stage of a print job returns this error type. Pipeline errors are
//! raised before anything is written to the device, so a failed job never
//! leaves a partial command stream on the printer.

use thiserror::Error;

/// Main error type for print jobs.
#[derive(Error, Debug)]
pub enum Error {
    /// The pixel buffer does not hold `width * height * channels` bytes.
    ///
    /// Raised by the rasterizer before any raster line is produced.
    #[error(
        "Malformed image: {width}x{height} with {channels} channel(s) needs {expected} bytes, got {actual}"
    )]
    MalformedImage {
        width: u32,
        height: u32,
        channels: usize,
        expected: usize,
        actual: usize,
    },

    /// The label width is unknown, or the selected printer cannot take it.
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    /// Packbits output failed to decode back to the original line.
    ///
    /// This indicates a bug in the encoder, or a corrupted run-length payload.
    #[error("Encoding invariant violated: {0}")]
    EncodingInvariantViolation(String),

    #[error("Raster line is {actual} bytes, media expects {expected}")]
    LineWidthMismatch { expected: usize, actual: usize },

    #[error("Raster line payload of {0} bytes does not fit the transfer command")]
    RasterLineTooLong(usize),

    /// No USB device matches the requested vendor and product id.
    #[error("Device {vendor_id:04x}:{product_id:04x} not found")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// None of the device's interfaces could be claimed with a bulk OUT endpoint.
    #[error("Device is missing a bulk OUT endpoint")]
    NoEndpoint,

    /// The bulk transfer to the printer failed.
    #[error("USB transfer failed: {0}")]
    TransferError(#[source] rusb::Error),

    #[error("Short write: {written} of {expected} bytes sent, possibly timeout ?")]
    ShortWrite { written: usize, expected: usize },

    /// USB communication error outside of the data transfer.
    ///
    /// Wraps underlying rusb errors for context creation, descriptor reads
    /// or permission problems.
    #[error(transparent)]
    UsbError(#[from] rusb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("QR code error: {0:?}")]
    QrCode(qrcode::types::QrError),

    /// Invalid configuration parameter provided.
    ///
    /// This error occurs when configuration values are out of range
    /// or cannot be parsed.
    #[error("Invalid configuration parameter: {0}")]
    InvalidConfig(String),
}
