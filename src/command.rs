//! Brother QL raster command framing.
//!
//! A job is framed in four phases: the invalidate/initialize preamble, the
//! mode settings derived from [`PrintOptions`], one raster transfer per line
//! in row order, and the final print-and-eject. Every line is validated
//! before the preamble is produced, so a failing job yields no bytes at all.

use bitflags::bitflags;
use log::debug;
use std::convert::TryFrom;

use crate::{
    error::Error,
    packbits::{pack_bits, pack_literal, EncodedLine},
    printer::{AutoCut, CompressionOptions, PrintOptions},
};

const ESC: u8 = 0x1B;

/// Zero bytes sent ahead of `ESC @` to flush a half-received job. Newer
/// models need more, see `Model::invalidate_len`.
pub const INVALIDATE_LEN: usize = 200;
pub const INITIALIZE: [u8; 2] = [ESC, 0x40];
pub const RASTER_TRANSFER: u8 = 0x67;
/// Control-Z: print then eject.
pub const PRINT_AND_EJECT: u8 = 0x1A;

const MEDIA_CONTINUOUS: u8 = 0x0A;

bitflags! {
    /// Valid-field flags of the `ESC i z` media information command.
    pub struct MediaInfoFlags: u8 {
        const MEDIA_TYPE = 0b0000_0010;
        const MEDIA_WIDTH = 0b0000_0100;
        const MEDIA_LENGTH = 0b0000_1000;
        const QUALITY = 0b0100_0000;
        const RECOVERY = 0b1000_0000;
    }
}

bitflags! {
    /// `ESC i M`
    pub struct VariousMode: u8 {
        const AUTO_CUT = 0b0100_0000;
    }
}

bitflags! {
    /// `ESC i K`
    pub struct ExpandedMode: u8 {
        const CUT_AT_END = 0b0000_1000;
        const HIGH_RESOLUTION = 0b0100_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `invalidate` zero bytes followed by `ESC @`.
    Initialize { invalidate: usize },
    /// `ESC i a 01`: switch to raster mode.
    RasterMode,
    /// `ESC i z`
    MediaInfo {
        flags: MediaInfoFlags,
        width_mm: u8,
        raster_lines: u32,
    },
    VariousMode(VariousMode),
    /// `ESC i A`: cut after every n labels.
    CutEvery(u8),
    ExpandedMode(ExpandedMode),
    /// `ESC i d`: feed margin in dots.
    FeedMargin(u16),
    /// `M 02` for packbits, `M 00` for uncompressed transfers.
    Compression(bool),
    /// `g 00 len` followed by the payload.
    RasterTransfer(Vec<u8>),
    PrintAndEject,
}

impl Command {
    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Self::Initialize { invalidate } => {
                buf.resize(buf.len() + invalidate, 0x00);
                buf.extend_from_slice(&INITIALIZE);
            }
            Self::RasterMode => buf.extend_from_slice(&[ESC, 0x69, 0x61, 0x01]),
            Self::MediaInfo {
                flags,
                width_mm,
                raster_lines,
            } => {
                buf.extend_from_slice(&[
                    ESC,
                    0x69,
                    0x7A,
                    flags.bits(),
                    MEDIA_CONTINUOUS,
                    *width_mm,
                    0x00, // length, none for continuous media
                ]);
                buf.extend_from_slice(&raster_lines.to_le_bytes());
                buf.extend_from_slice(&[0x00, 0x00]); // starting page
            }
            Self::VariousMode(mode) => buf.extend_from_slice(&[ESC, 0x69, 0x4D, mode.bits()]),
            Self::CutEvery(n) => buf.extend_from_slice(&[ESC, 0x69, 0x41, *n]),
            Self::ExpandedMode(mode) => buf.extend_from_slice(&[ESC, 0x69, 0x4B, mode.bits()]),
            Self::FeedMargin(dots) => {
                buf.extend_from_slice(&[ESC, 0x69, 0x64]);
                buf.extend_from_slice(&dots.to_le_bytes());
            }
            Self::Compression(true) => buf.extend_from_slice(&[0x4D, 0x02]),
            Self::Compression(false) => buf.extend_from_slice(&[0x4D, 0x00]),
            Self::RasterTransfer(payload) => {
                let len = u8::try_from(payload.len())
                    .map_err(|_| Error::RasterLineTooLong(payload.len()))?;
                buf.extend_from_slice(&[RASTER_TRANSFER, 0x00, len]);
                buf.extend_from_slice(payload);
            }
            Self::PrintAndEject => buf.push(PRINT_AND_EJECT),
        }
        Ok(())
    }
}

/// Ordered commands of one print job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandStream {
    commands: Vec<Command>,
}

impl CommandStream {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn raster_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::RasterTransfer(_)))
            .count()
    }

    fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        for command in self.commands.iter() {
            command.write_to(&mut buf)?;
        }
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Configure,
    Transfer(usize),
    Finalize,
    Done,
}

/// Walks a job through its framing phases.
pub struct Framer<'a> {
    options: &'a PrintOptions,
    compress: bool,
    payloads: Vec<Vec<u8>>,
    phase: Phase,
}

impl<'a> Framer<'a> {
    /// Prepares the raster payloads, failing before anything is framed if a
    /// line does not match the media or does not fit a transfer command.
    pub fn new(
        lines: &[EncodedLine],
        options: &'a PrintOptions,
        compression: &CompressionOptions,
    ) -> Result<Self, Error> {
        let expected = options.label_width().line_bytes();
        let payloads = lines
            .iter()
            .map(|line| {
                let raw = line.decode()?;
                if raw.len() != expected {
                    return Err(Error::LineWidthMismatch {
                        expected,
                        actual: raw.len(),
                    });
                }
                let payload = match (compression.enable, line) {
                    (false, _) => raw,
                    (true, EncodedLine::RunLength(packed)) => packed.clone(),
                    // the printer unpacks every line of a compressed job
                    (true, EncodedLine::Raw(bytes)) => shortest_packing(bytes),
                };
                if payload.len() > u8::MAX as usize {
                    return Err(Error::RasterLineTooLong(payload.len()));
                }
                Ok(payload)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Framer {
            options,
            compress: compression.enable,
            payloads,
            phase: Phase::Init,
        })
    }

    fn step(&mut self, stream: &mut CommandStream) -> Result<(), Error> {
        self.phase = match self.phase {
            Phase::Init => {
                stream.push(Command::Initialize {
                    invalidate: self.options.invalidate_len(),
                });
                Phase::Configure
            }
            Phase::Configure => {
                for command in self.settings()? {
                    stream.push(command);
                }
                Phase::Transfer(0)
            }
            Phase::Transfer(row) => match self.payloads.get_mut(row) {
                Some(payload) => {
                    stream.push(Command::RasterTransfer(std::mem::take(payload)));
                    Phase::Transfer(row + 1)
                }
                None => Phase::Finalize,
            },
            Phase::Finalize => {
                stream.push(Command::PrintAndEject);
                Phase::Done
            }
            Phase::Done => Phase::Done,
        };
        Ok(())
    }

    fn settings(&self) -> Result<Vec<Command>, Error> {
        let options = self.options;
        let raster_lines = u32::try_from(self.payloads.len())
            .map_err(|_| Error::InvalidConfig(format!("{} raster lines", self.payloads.len())))?;

        let mut flags =
            MediaInfoFlags::RECOVERY | MediaInfoFlags::MEDIA_TYPE | MediaInfoFlags::MEDIA_WIDTH;
        if options.prefers_quality() {
            flags |= MediaInfoFlags::QUALITY;
        }

        let mut commands = vec![
            Command::RasterMode,
            Command::MediaInfo {
                flags,
                width_mm: options.label_width().mm(),
                raster_lines,
            },
        ];

        match options.auto_cut() {
            AutoCut::Enabled(n) => {
                commands.push(Command::VariousMode(VariousMode::AUTO_CUT));
                commands.push(Command::CutEvery(n));
            }
            AutoCut::Disabled => commands.push(Command::VariousMode(VariousMode::empty())),
        }

        let mut expanded = ExpandedMode::empty();
        if options.is_cut_at_end() {
            expanded |= ExpandedMode::CUT_AT_END;
        }
        if options.is_high_resolution() {
            expanded |= ExpandedMode::HIGH_RESOLUTION;
        }
        debug!("Expanded mode: {:X}", expanded.bits());

        commands.push(Command::ExpandedMode(expanded));
        commands.push(Command::FeedMargin(options.feed()));
        commands.push(Command::Compression(self.compress));
        Ok(commands)
    }

    /// Runs every phase and returns the complete job.
    pub fn commands(mut self) -> Result<CommandStream, Error> {
        let mut stream = CommandStream::default();
        while self.phase != Phase::Done {
            self.step(&mut stream)?;
        }
        debug!(
            "framed {} commands, {} raster lines",
            stream.commands.len(),
            stream.raster_count()
        );
        Ok(stream)
    }
}

/// Frames encoded lines into the byte stream sent to the printer.
pub fn frame(
    lines: &[EncodedLine],
    options: &PrintOptions,
    compression: &CompressionOptions,
) -> Result<Vec<u8>, Error> {
    Framer::new(lines, options, compression)?
        .commands()?
        .into_bytes()
}

// A raw line is never shorter packed, but a tie still beats literal runs.
fn shortest_packing(bytes: &[u8]) -> Vec<u8> {
    let packed = pack_bits(bytes);
    let literal = pack_literal(bytes);
    if packed.len() <= literal.len() {
        packed
    } else {
        literal
    }
}
