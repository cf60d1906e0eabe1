//! Brother QL Label Printing
//!
//! This crate turns decoded label images into the raster command stream
//! understood by Brother QL series label printers and sends it over USB.
//!
//! A job runs in one synchronous pass: the image is thresholded into
//! bit-packed raster lines, each line is optionally PackBits compressed, the
//! lines are framed between the printer's initialize and print commands, and
//! the finished buffer is written to the printer's bulk OUT endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use qlprint::{CompressionOptions, LabelWidth, Model, PrintOptions, Printer, RasterImage, UsbTransport};
//!
//! let image = RasterImage::open("label.png").unwrap();
//! let options = PrintOptions::new(LabelWidth::Continuous62).landscape(true);
//! let mut printer = Printer::for_model(UsbTransport::new().unwrap(), Model::QL570);
//! printer.print(&image, &options, &CompressionOptions::enabled()).unwrap();
//! ```

mod command;
mod error;
mod media;
mod model;
mod packbits;
mod printer;
mod qr;
mod raster;
mod transport;

pub use crate::{
    command::{
        frame, Command, CommandStream, ExpandedMode, Framer, MediaInfoFlags, VariousMode,
        INITIALIZE, INVALIDATE_LEN, PRINT_AND_EJECT, RASTER_TRANSFER,
    },
    error::Error,
    media::LabelWidth,
    model::{Model, BROTHER_VENDOR_ID},
    packbits::{encode, pack_bits, pack_literal, unpack_bits, EncodedLine, LineKind},
    printer::{render, AutoCut, CompressionOptions, PrintOptions, Printer, DEFAULT_FEED},
    raster::{rasterize, Channels, Lines, MonoRasterLine, Raster, RasterImage, THRESHOLD},
    transport::{
        claim_first, BulkOut, Candidate, Claim, Endpoint, MemoryTransport, SentJob, Transport,
        UsbDevice, UsbTransport, WriterTransport,
    },
};

/// Width in pixels of the print head on normal QL printers.
///
/// Every raster line is 90 bytes (720 / 8) on these models.
pub const NORMAL_PRINTER_WIDTH: u32 = 720;

/// Width in pixels of the print head on wide QL printers (QL-1050, QL-1060N,
/// QL-1100 series).
///
/// Every raster line is 162 bytes (1296 / 8) on these models.
pub const WIDE_PRINTER_WIDTH: u32 = 1296;
