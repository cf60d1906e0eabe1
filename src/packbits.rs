//! TIFF PackBits run-length coding of raster lines.
//!
//! A control byte `n` in `0..=127` is followed by `n + 1` literal bytes; a
//! control byte in `-127..=-1` (two's complement) is followed by one byte to
//! be repeated `1 - n` times. `-128` is a no-op.

use crate::{error::Error, raster::MonoRasterLine};

const MAX_RUN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Raw,
    RunLength,
}

/// A raster line as it is handed to the command framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedLine {
    /// Line bytes as they came out of the rasterizer.
    Raw(Vec<u8>),
    /// PackBits payload.
    RunLength(Vec<u8>),
}

impl EncodedLine {
    pub fn kind(&self) -> LineKind {
        match self {
            Self::Raw(_) => LineKind::Raw,
            Self::RunLength(_) => LineKind::RunLength,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Raw(bytes) | Self::RunLength(bytes) => bytes,
        }
    }

    /// Reproduces the raster line bytes the way the printer does.
    pub fn decode(&self) -> Result<Vec<u8>, Error> {
        match self {
            Self::Raw(bytes) => Ok(bytes.clone()),
            Self::RunLength(bytes) => unpack_bits(bytes),
        }
    }
}

/// Encodes one raster line.
///
/// With compression disabled the line is always sent raw. With compression
/// enabled the PackBits form is used only when it is strictly shorter than
/// the raw line; on a tie the line stays raw.
///
/// A raw line still travels packed when the job is compressed. The framer
/// then sends whichever of [`pack_bits`] and [`pack_literal`] is shorter, so
/// a tied line costs its raw length on the wire and an incompressible one
/// costs one extra byte per 128.
///
/// Debug builds decode the result again and fail with
/// [`Error::EncodingInvariantViolation`] if it does not match the input.
pub fn encode(line: &MonoRasterLine, enabled: bool) -> Result<EncodedLine, Error> {
    let raw = line.as_bytes();
    if !enabled {
        return Ok(EncodedLine::Raw(raw.to_vec()));
    }

    let packed = pack_bits(raw);
    let encoded = if packed.len() < raw.len() {
        EncodedLine::RunLength(packed)
    } else {
        EncodedLine::Raw(raw.to_vec())
    };

    if cfg!(debug_assertions) {
        verify(raw, &encoded)?;
    }
    Ok(encoded)
}

fn verify(raw: &[u8], encoded: &EncodedLine) -> Result<(), Error> {
    let decoded = encoded.decode()?;
    if decoded != raw {
        return Err(Error::EncodingInvariantViolation(format!(
            "{} byte line decoded to {} different bytes",
            raw.len(),
            decoded.len()
        )));
    }
    Ok(())
}

/// PackBits compression. Runs of two or more equal bytes become repeat runs,
/// everything else is grouped into literal runs.
pub fn pack_bits(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 1);
    let mut i = 0;

    while i < data.len() {
        let value = data[i];
        let mut run = 1;
        while i + run < data.len() && run < MAX_RUN && data[i + run] == value {
            run += 1;
        }

        if run > 1 {
            packed.push((1 - run as i16) as i8 as u8);
            packed.push(value);
            i += run;
        } else {
            // extend the literal until the next repeat starts
            let start = i;
            let mut end = i + 1;
            while end < data.len() && end - start < MAX_RUN {
                if end + 1 < data.len() && data[end] == data[end + 1] {
                    break;
                }
                end += 1;
            }

            packed.push((end - start - 1) as u8);
            packed.extend_from_slice(&data[start..end]);
            i = end;
        }
    }

    packed
}

/// Wraps `data` in literal runs only. Decodes to `data` unchanged.
pub fn pack_literal(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 1);
    for chunk in data.chunks(MAX_RUN) {
        packed.push((chunk.len() - 1) as u8);
        packed.extend_from_slice(chunk);
    }
    packed
}

pub fn unpack_bits(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut unpacked = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let control = data[i] as i8;
        i += 1;

        match control {
            -128 => {}
            0..=127 => {
                let n = control as usize + 1;
                let literal = data.get(i..i + n).ok_or_else(|| {
                    Error::EncodingInvariantViolation(format!(
                        "literal run of {} bytes truncated at offset {}",
                        n, i
                    ))
                })?;
                unpacked.extend_from_slice(literal);
                i += n;
            }
            _ => {
                let n = (1 - control as i16) as usize;
                let value = *data.get(i).ok_or_else(|| {
                    Error::EncodingInvariantViolation(format!(
                        "repeat run missing its value at offset {}",
                        i
                    ))
                })?;
                unpacked.resize(unpacked.len() + n, value);
                i += 1;
            }
        }
    }

    Ok(unpacked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(bytes: &[u8]) -> MonoRasterLine {
        MonoRasterLine::from_bytes(bytes.to_vec())
    }

    // a handful of shapes raster lines actually take
    fn samples() -> Vec<Vec<u8>> {
        let mut noisy = Vec::new();
        let mut x: u32 = 0x1234_5678;
        for _ in 0..162 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            noisy.push((x & 0xFF) as u8);
        }
        let mut mixed = vec![0x00; 40];
        mixed.extend_from_slice(&[0xF0, 0x0F, 0xAA, 0xAA, 0x55]);
        mixed.extend(vec![0xFF; 45]);

        vec![
            vec![],
            vec![0x42],
            vec![0x00; 90],
            vec![0xFF; 162],
            vec![0x01, 0x02],
            vec![0x07, 0x07],
            (0..=255).collect(),
            noisy,
            mixed,
        ]
    }

    #[test]
    fn blank_line_is_a_single_repeat_run() {
        let encoded = encode(&line(&[0x00; 90]), true).unwrap();
        assert_eq!(encoded, EncodedLine::RunLength(vec![0xA7, 0x00]));
    }

    #[test]
    fn disabled_compression_is_always_raw() {
        for sample in samples() {
            let encoded = encode(&line(&sample), false).unwrap();
            assert_eq!(encoded.kind(), LineKind::Raw);
            assert_eq!(encoded.bytes(), &sample[..]);
        }
    }

    #[test]
    fn encoding_round_trips() {
        for sample in samples() {
            for enabled in &[true, false] {
                let encoded = encode(&line(&sample), *enabled).unwrap();
                assert_eq!(encoded.decode().unwrap(), sample);
            }
            assert_eq!(unpack_bits(&pack_bits(&sample)).unwrap(), sample);
            assert_eq!(unpack_bits(&pack_literal(&sample)).unwrap(), sample);
        }
    }

    struct XorShift(u32);

    impl XorShift {
        fn next(&mut self) -> u32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            self.0
        }
    }

    // random mix of literal bytes and runs, cut to `len`
    fn runny_line(rng: &mut XorShift, len: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len);
        while bytes.len() < len {
            let value = (rng.next() & 0xFF) as u8;
            let run = match rng.next() % 4 {
                0 => 1,
                1 => 2 + (rng.next() % 6) as usize,
                2 => 126 + (rng.next() % 5) as usize,
                _ => 1 + (rng.next() % 40) as usize,
            };
            bytes.resize(bytes.len() + run, value);
        }
        bytes.truncate(len);
        bytes
    }

    #[test]
    fn random_lines_round_trip() {
        let mut rng = XorShift(0x9E37_79B9);
        for i in 0..4000 {
            let len = if i % 2 == 0 { 90 } else { 162 };
            let sample = runny_line(&mut rng, len);

            assert_eq!(unpack_bits(&pack_bits(&sample)).unwrap(), sample);
            let encoded = encode(&line(&sample), true).unwrap();
            assert_eq!(encoded.decode().unwrap(), sample);
            assert!(encoded.bytes().len() <= len);
        }
    }

    #[test]
    fn runs_around_the_run_limit_round_trip() {
        for run in &[127usize, 128, 129] {
            for len in &[90usize, 162] {
                if run > len {
                    continue;
                }
                for start in &[0, len - run] {
                    let mut sample: Vec<u8> = (0..*len).map(|i| (i * 7 + 1) as u8).collect();
                    for b in &mut sample[*start..*start + *run] {
                        *b = 0xFF;
                    }
                    assert_eq!(unpack_bits(&pack_bits(&sample)).unwrap(), sample);
                    let encoded = encode(&line(&sample), true).unwrap();
                    assert_eq!(encoded.decode().unwrap(), sample);
                }
            }
        }
    }

    #[test]
    fn incompressible_lines_stay_raw() {
        let sample: Vec<u8> = (0..90).collect();
        let encoded = encode(&line(&sample), true).unwrap();
        assert_eq!(encoded, EncodedLine::Raw(sample));
    }

    #[test]
    fn ties_prefer_raw() {
        // [07 07] packs to [FF 07], same length
        let encoded = encode(&line(&[0x07, 0x07]), true).unwrap();
        assert_eq!(encoded.kind(), LineKind::Raw);
    }

    #[test]
    fn runs_are_split_at_128_bytes() {
        let packed = pack_bits(&[0xFF; 162]);
        assert_eq!(packed, vec![0x81, 0xFF, 0xDF, 0xFF]);

        let literal: Vec<u8> = (0..130).map(|i| i as u8).collect();
        let packed = pack_bits(&literal);
        assert_eq!(packed[0], 127);
        assert_eq!(packed[129], 1);
        assert_eq!(packed.len(), 132);
    }

    #[test]
    fn literal_then_repeat() {
        assert_eq!(
            pack_bits(&[0x01, 0x02, 0x03, 0x03, 0x03]),
            vec![0x01, 0x01, 0x02, 0xFE, 0x03]
        );
    }

    #[test]
    fn decodes_tiff_reference_sample() {
        let packed = [
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(unpack_bits(&packed).unwrap(), expected.to_vec());
    }

    #[test]
    fn truncated_payloads_are_rejected() {
        assert!(matches!(
            unpack_bits(&[0x03, 0x01]),
            Err(Error::EncodingInvariantViolation(_))
        ));
        assert!(matches!(
            unpack_bits(&[0xFE]),
            Err(Error::EncodingInvariantViolation(_))
        ));
        assert_eq!(unpack_bits(&[0x80]).unwrap(), Vec::<u8>::new());
    }
}
