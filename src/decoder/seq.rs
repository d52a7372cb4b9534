//! Norpix `.seq` container decoder.
//!
//! A sequence is a fixed 1024-byte header followed by one record per frame:
//! a little-endian `u32` size (counting itself), the embedded image, and a
//! timestamp trailer whose width is settled after the first frame.

use serde::Serialize;

use super::frame_data::Frame;
use crate::error::SequenceError;

pub const MAGIC: u32 = 0xFEED;
pub const HEADER_LEN: usize = 1024;
const NAME: &str = "Norpix seq";
const SIZE_PREFIX: usize = 4;
const TRAILER: usize = 8;

/// Image encoding of the embedded frames, from the header's format code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEncoding {
    Raw,
    Jpeg,
    Png,
}

impl FrameEncoding {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            100 => Some(FrameEncoding::Raw),
            102 | 201 => Some(FrameEncoding::Jpeg),
            1 | 2 => Some(FrameEncoding::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FrameEncoding::Raw => "raw",
            FrameEncoding::Jpeg => image::ImageFormat::Jpeg.extensions_str()[0],
            FrameEncoding::Png => image::ImageFormat::Png.extensions_str()[0],
        }
    }

    fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            FrameEncoding::Raw => None,
            FrameEncoding::Jpeg => Some(image::ImageFormat::Jpeg),
            FrameEncoding::Png => Some(image::ImageFormat::Png),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeqHeader {
    pub version: i32,
    pub header_size: i32,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub bit_depth_real: u32,
    pub image_size_bytes: u32,
    pub format_code: i32,
    pub encoding: FrameEncoding,
    pub frame_count: usize,
    pub origin: i32,
    pub true_image_size: u32,
    pub fps: f64,
}

impl SeqHeader {
    pub fn parse(data: &[u8]) -> Result<Self, SequenceError> {
        if data.len() < HEADER_LEN {
            return Err(SequenceError::TooShort(data.len()));
        }

        let magic = le_u32(data, 0);
        if magic != MAGIC {
            return Err(SequenceError::BadMagic(magic));
        }

        let name = utf16_text(&data[4..28]);
        if !name.starts_with(NAME) {
            return Err(SequenceError::BadName(name));
        }

        let version = le_i32(data, 28);
        let header_size = le_i32(data, 32);
        if header_size as usize != HEADER_LEN {
            return Err(SequenceError::BadHeaderSize(header_size));
        }

        let description = utf16_text(&data[36..548]);

        // width, height, depth, real depth, image size, format, frames, origin, true size
        let mut params = [0i32; 9];
        for (i, p) in params.iter_mut().enumerate() {
            *p = le_i32(data, 548 + i * 4);
        }

        let format_code = params[5];
        let encoding = FrameEncoding::from_code(format_code)
            .ok_or(SequenceError::UnsupportedFormat(format_code))?;
        if params[6] < 0 {
            return Err(SequenceError::NegativeFrameCount(params[6]));
        }

        let mut fps = [0u8; 8];
        fps.copy_from_slice(&data[584..592]);

        Ok(Self {
            version,
            header_size,
            description,
            width: params[0] as u32,
            height: params[1] as u32,
            bit_depth: params[2] as u32,
            bit_depth_real: params[3] as u32,
            image_size_bytes: params[4] as u32,
            format_code,
            encoding,
            frame_count: params[6] as usize,
            origin: params[7],
            true_image_size: params[8] as u32,
            fps: f64::from_le_bytes(fps),
        })
    }
}

/// A parsed sequence borrowing the raw file bytes
#[derive(Clone, Debug)]
pub struct SeqFile<'a> {
    pub header: SeqHeader,
    data: &'a [u8],
}

impl<'a> SeqFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, SequenceError> {
        let header = SeqHeader::parse(data)?;
        Ok(Self { header, data })
    }

    /// Fresh iterator over the embedded frames; each call restarts at frame 0
    pub fn frames(&self) -> Frames<'a> {
        Frames {
            data: self.data,
            encoding: self.header.encoding,
            total: self.header.frame_count,
            index: 0,
            cursor: HEADER_LEN,
            trailer: TRAILER,
        }
    }
}

pub struct Frames<'a> {
    data: &'a [u8],
    encoding: FrameEncoding,
    total: usize,
    index: usize,
    cursor: usize,
    trailer: usize,
}

impl<'a> Frames<'a> {
    fn read_frame(&mut self) -> Result<Frame<'a>, SequenceError> {
        let frame = self.index;
        let start = self.cursor;
        let truncated = || SequenceError::Truncated { frame, offset: start };

        let prefix = self
            .data
            .get(start..start + SIZE_PREFIX)
            .ok_or_else(truncated)?;
        let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if (size as usize) < SIZE_PREFIX {
            return Err(SequenceError::BadRecordSize { frame, size });
        }

        let end = start.checked_add(size as usize).ok_or_else(truncated)?;
        let payload = self
            .data
            .get(start + SIZE_PREFIX..end)
            .ok_or_else(truncated)?;
        self.check_payload(frame, payload)?;

        self.cursor = end + self.trailer;
        if frame == 0 {
            // The byte after the first trailer tells whether records carry extra padding
            match self.data.get(self.cursor) {
                Some(0) => {
                    self.trailer += TRAILER;
                    self.cursor += TRAILER;
                }
                Some(_) => self.cursor -= SIZE_PREFIX,
                None => {}
            }
        }

        Ok(Frame::new(frame, payload))
    }

    fn check_payload(&self, frame: usize, payload: &[u8]) -> Result<(), SequenceError> {
        let Some(expected) = self.encoding.image_format() else {
            return Ok(());
        };
        match image::guess_format(payload) {
            Ok(found) if found == expected => Ok(()),
            _ => Err(SequenceError::UnexpectedPayload {
                frame,
                expected: self.encoding.extension(),
            }),
        }
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Frame<'a>, SequenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total {
            return None;
        }
        match self.read_frame() {
            Ok(frame) => {
                self.index += 1;
                Some(Ok(frame))
            }
            Err(e) => {
                // fuse after the first structural fault
                self.index = self.total;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.total - self.index))
    }
}

/// Whole-file decode result
#[derive(Debug)]
pub struct DecodedSequence<'a> {
    pub header: SeqHeader,
    pub frames: Vec<Frame<'a>>,
}

pub fn decode_sequence(data: &[u8]) -> Result<DecodedSequence<'_>, SequenceError> {
    let seq = SeqFile::parse(data)?;
    let frames = seq.frames().collect::<Result<Vec<_>, _>>()?;
    Ok(DecodedSequence {
        header: seq.header,
        frames,
    })
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_i32(data: &[u8], at: usize) -> i32 {
    le_u32(data, at) as i32
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}
