//! Text decoding with a fixed fallback chain.
//!
//! Files are decoded as UTF-8 first, then UTF-16 when a byte order mark says so, then
//! Windows-1252, and finally ISO-8859-1, which maps every byte and therefore never fails.
//! Decoders are incremental so callers can stream a file through them in bounded chunks.

use std::fmt;
use std::io::{self, Read};

use thiserror::Error;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Windows-1252 code points for 0x80..=0x9F. `None` marks bytes the code page leaves undefined.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Encodings tried when reading a file, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Windows1252,
    Latin1,
}

impl TextEncoding {
    pub const CHAIN: [TextEncoding; 5] = [
        TextEncoding::Utf8,
        TextEncoding::Utf16Le,
        TextEncoding::Utf16Be,
        TextEncoding::Windows1252,
        TextEncoding::Latin1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Windows1252 => "windows-1252",
            TextEncoding::Latin1 => "iso-8859-1",
        }
    }

    fn bom(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => UTF8_BOM,
            TextEncoding::Utf16Le => UTF16LE_BOM,
            TextEncoding::Utf16Be => UTF16BE_BOM,
            TextEncoding::Windows1252 | TextEncoding::Latin1 => &[],
        }
    }

    /// UTF-16 is only attempted when the file opens with the matching byte order mark.
    fn applies_to(&self, head: &[u8]) -> bool {
        match self {
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => head.starts_with(self.bom()),
            _ => true,
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {encoding} data at byte {offset}")]
pub struct DecodeError {
    pub encoding: TextEncoding,
    pub offset: u64,
}

/// Incremental decoder that carries incomplete sequences across chunk boundaries.
#[derive(Debug)]
pub struct Decoder {
    encoding: TextEncoding,
    pending: Vec<u8>,
    consumed: u64,
    bom_checked: bool,
}

impl Decoder {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
            consumed: 0,
            bom_checked: encoding.bom().is_empty(),
        }
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Decode `input`, appending text to `out`. Trailing bytes of an incomplete sequence are kept
    /// for the next call.
    pub fn decode_chunk(&mut self, input: &[u8], out: &mut String) -> Result<(), DecodeError> {
        self.pending.extend_from_slice(input);
        self.drain(out, false)
    }

    /// Flush the decoder. Leftover bytes at end of input are an error.
    pub fn finish(&mut self, out: &mut String) -> Result<(), DecodeError> {
        self.drain(out, true)
    }

    fn drain(&mut self, out: &mut String, last: bool) -> Result<(), DecodeError> {
        if !self.bom_checked {
            let bom = self.encoding.bom();
            if !last && self.pending.len() < bom.len() && bom.starts_with(&self.pending) {
                return Ok(());
            }
            if self.pending.starts_with(bom) {
                self.pending.drain(..bom.len());
                self.consumed += bom.len() as u64;
            }
            self.bom_checked = true;
        }

        let used = match self.encoding {
            TextEncoding::Utf8 => self.drain_utf8(out, last)?,
            TextEncoding::Utf16Le => self.drain_utf16(out, last, u16::from_le_bytes)?,
            TextEncoding::Utf16Be => self.drain_utf16(out, last, u16::from_be_bytes)?,
            TextEncoding::Windows1252 => self.drain_windows_1252(out)?,
            TextEncoding::Latin1 => {
                out.extend(self.pending.iter().map(|byte| char::from(*byte)));
                self.pending.len()
            }
        };

        self.pending.drain(..used);
        self.consumed += used as u64;
        Ok(())
    }

    fn error_at(&self, index: usize) -> DecodeError {
        DecodeError {
            encoding: self.encoding,
            offset: self.consumed + index as u64,
        }
    }

    fn drain_utf8(&self, out: &mut String, last: bool) -> Result<usize, DecodeError> {
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                out.push_str(text);
                Ok(self.pending.len())
            }
            Err(err) => {
                let valid = err.valid_up_to();
                if err.error_len().is_some() || last {
                    return Err(self.error_at(valid));
                }
                // Incomplete sequence at the end of the buffer.
                let text =
                    std::str::from_utf8(&self.pending[..valid]).map_err(|_| self.error_at(0))?;
                out.push_str(text);
                Ok(valid)
            }
        }
    }

    fn drain_utf16(
        &self,
        out: &mut String,
        last: bool,
        unit: fn([u8; 2]) -> u16,
    ) -> Result<usize, DecodeError> {
        let mut units: Vec<u16> = self
            .pending
            .chunks_exact(2)
            .map(|pair| unit([pair[0], pair[1]]))
            .collect();

        if last && self.pending.len() % 2 == 1 {
            return Err(self.error_at(self.pending.len() - 1));
        }
        if !last && units.last().is_some_and(|u| (0xD800..=0xDBFF).contains(u)) {
            units.pop();
        }

        for (idx, decoded) in char::decode_utf16(units.iter().copied()).enumerate() {
            match decoded {
                Ok(ch) => out.push(ch),
                Err(_) => return Err(self.error_at(idx * 2)),
            }
        }
        Ok(units.len() * 2)
    }

    fn drain_windows_1252(&self, out: &mut String) -> Result<usize, DecodeError> {
        for (idx, byte) in self.pending.iter().enumerate() {
            let ch = match byte {
                0x80..=0x9F => WINDOWS_1252_HIGH[usize::from(byte - 0x80)]
                    .ok_or_else(|| self.error_at(idx))?,
                _ => char::from(*byte),
            };
            out.push(ch);
        }
        Ok(self.pending.len())
    }
}

/// Pick the first encoding in [`TextEncoding::CHAIN`] that decodes the whole stream.
///
/// All candidates see the stream in one pass; memory stays bounded by `chunk_size`.
pub fn detect_encoding<R: Read>(reader: &mut R, chunk_size: usize) -> io::Result<TextEncoding> {
    let mut buf = vec![0; chunk_size.max(UTF8_BOM.len())];
    let mut filled = read_chunk(reader, &mut buf)?;

    let head = &buf[..filled];
    let mut candidates: Vec<(Decoder, bool)> = TextEncoding::CHAIN
        .iter()
        .filter(|encoding| encoding.applies_to(head))
        .map(|encoding| (Decoder::new(*encoding), true))
        .collect();

    let mut scratch = String::with_capacity(buf.len());
    while filled > 0 {
        for (decoder, alive) in candidates.iter_mut().filter(|(_, alive)| *alive) {
            scratch.clear();
            if decoder.decode_chunk(&buf[..filled], &mut scratch).is_err() {
                *alive = false;
            }
        }
        if first_alive(&candidates) == Some(TextEncoding::Latin1) {
            return Ok(TextEncoding::Latin1);
        }
        filled = read_chunk(reader, &mut buf)?;
    }

    for (decoder, alive) in candidates.iter_mut().filter(|(_, alive)| *alive) {
        scratch.clear();
        if decoder.finish(&mut scratch).is_err() {
            *alive = false;
        }
    }
    Ok(first_alive(&candidates).unwrap_or(TextEncoding::Latin1))
}

fn first_alive(candidates: &[(Decoder, bool)]) -> Option<TextEncoding> {
    candidates
        .iter()
        .find(|(_, alive)| *alive)
        .map(|(decoder, _)| decoder.encoding())
}

/// Fill `buf` as far as the reader allows. Returns 0 only at end of input.
pub(crate) fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
