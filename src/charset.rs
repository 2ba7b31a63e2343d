//! Text encoding by declared charset label.
//!
//! Labels are matched case-insensitively with `_` treated as `-`. A few
//! labels are resolved here before falling through to the WHATWG table in
//! `encoding_rs`, because WHATWG aliases them to other encodings: `ascii`
//! and `latin-1` both mean windows-1252 there, `iso-8859-9` means
//! windows-1254, `iso-8859-11` means windows-874, and UTF-16 has no encoder.
//! The remaining `iso-8859-N` labels map to the real ISO tables in WHATWG.

use encoding_rs::Encoding;

/// Why a text could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The label names no charset we know.
    UnknownLabel(String),
    /// The charset is known but has no encoder.
    DecodeOnly(&'static str),
    /// A character has no representation in the charset.
    Unmappable {
        charset: &'static str,
        ch: Option<char>,
        position: Option<usize>,
    },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::UnknownLabel(label) => write!(f, "unknown encoding '{label}'"),
            EncodeError::DecodeOnly(name) => write!(f, "{name} cannot be used for encoding"),
            EncodeError::Unmappable {
                charset,
                ch: Some(ch),
                position: Some(pos),
            } => write!(
                f,
                "'{charset}' codec can't encode character {ch:?} (U+{:04X}) in position {pos}",
                *ch as u32
            ),
            EncodeError::Unmappable { charset, .. } => {
                write!(f, "'{charset}' codec can't encode some characters")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// A resolved charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Ascii,
    Latin1,
    /// ISO 8859-9 (Turkish).
    Latin5,
    /// ISO 8859-11 (Thai).
    Iso8859_11,
    /// UTF-16 with a byte order mark, little-endian.
    Utf16,
    Utf16Le,
    Utf16Be,
    Whatwg(&'static Encoding),
}

impl Charset {
    /// Resolve a declared label.
    pub fn for_label(label: &str) -> Result<Self, EncodeError> {
        let norm = label.trim().to_ascii_lowercase().replace('_', "-");
        let charset = match norm.as_str() {
            "utf-8" | "utf8" | "u8" => Charset::Utf8,
            "ascii" | "us-ascii" | "646" => Charset::Ascii,
            "latin-1" | "latin1" | "l1" | "iso-8859-1" | "iso8859-1" | "iso-8859-1:1987" => {
                Charset::Latin1
            }
            "latin5" | "l5" | "iso-8859-9" | "iso8859-9" | "iso88599" | "iso-8859-9:1989"
            | "iso-ir-148" | "csisolatin5" => Charset::Latin5,
            "iso-8859-11" | "iso8859-11" | "iso885911" => Charset::Iso8859_11,
            "utf-16" | "utf16" => Charset::Utf16,
            "utf-16le" | "utf-16-le" => Charset::Utf16Le,
            "utf-16be" | "utf-16-be" => Charset::Utf16Be,
            _ => {
                let encoding = Encoding::for_label(norm.as_bytes())
                    .ok_or_else(|| EncodeError::UnknownLabel(label.to_string()))?;
                if encoding == encoding_rs::UTF_8 {
                    Charset::Utf8
                } else if encoding.output_encoding() != encoding {
                    return Err(EncodeError::DecodeOnly(encoding.name()));
                } else {
                    Charset::Whatwg(encoding)
                }
            }
        };
        Ok(charset)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Ascii => "ascii",
            Charset::Latin1 => "latin-1",
            Charset::Latin5 => "iso-8859-9",
            Charset::Iso8859_11 => "iso-8859-11",
            Charset::Utf16 => "utf-16",
            Charset::Utf16Le => "utf-16-le",
            Charset::Utf16Be => "utf-16-be",
            Charset::Whatwg(encoding) => encoding.name(),
        }
    }

    /// Encode `text`, failing on the first unmappable character.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodeError> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::Ascii => encode_single_byte(text, self.name(), |cp| (cp <= 0x7f).then_some(cp)),
            Charset::Latin1 => encode_single_byte(text, self.name(), |cp| (cp <= 0xff).then_some(cp)),
            Charset::Latin5 => encode_single_byte(text, self.name(), latin5_byte),
            Charset::Iso8859_11 => encode_single_byte(text, self.name(), thai_byte),
            Charset::Utf16 => {
                let mut out = vec![0xff, 0xfe];
                out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
                Ok(out)
            }
            Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Charset::Whatwg(encoding) => {
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    return Err(EncodeError::Unmappable {
                        charset: encoding.name(),
                        ch: None,
                        position: None,
                    });
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

/// ISO 8859-9 is Latin-1 with six Icelandic letters swapped for Turkish.
fn latin5_byte(cp: u32) -> Option<u32> {
    match cp {
        0x11e => Some(0xd0),
        0x130 => Some(0xdd),
        0x15e => Some(0xde),
        0x11f => Some(0xf0),
        0x131 => Some(0xfd),
        0x15f => Some(0xfe),
        0xd0 | 0xdd | 0xde | 0xf0 | 0xfd | 0xfe => None,
        cp if cp <= 0xff => Some(cp),
        _ => None,
    }
}

/// ISO 8859-11: ASCII, C1 and NBSP, then the Thai block at 0xA1.
fn thai_byte(cp: u32) -> Option<u32> {
    match cp {
        0..=0xa0 => Some(cp),
        0xe01..=0xe3a | 0xe3f..=0xe5b => Some(cp - 0xe01 + 0xa1),
        _ => None,
    }
}

fn encode_single_byte(
    text: &str,
    charset: &'static str,
    byte_of: impl Fn(u32) -> Option<u32>,
) -> Result<Vec<u8>, EncodeError> {
    text.chars()
        .enumerate()
        .map(|(position, ch)| {
            byte_of(ch as u32)
                .and_then(|b| u8::try_from(b).ok())
                .ok_or(EncodeError::Unmappable {
                    charset,
                    ch: Some(ch),
                    position: Some(position),
                })
        })
        .collect()
}

/// Encode `text` by `label` in one step.
pub fn encode(label: &str, text: &str) -> Result<Vec<u8>, EncodeError> {
    Charset::for_label(label)?.encode(text)
}
