//! The PRS token grammar
//!
//! A stream is a sequence of control bits interleaved with payload bytes. Control bits are
//! packed into control bytes and consumed least-significant bit first; a new control byte is
//! read from the input (at whatever position the input cursor happens to be) every time eight
//! bits have been used up.
//!
//! ```text
//! 1                     literal byte follows
//! 0 0 h l               short copy: len = (h << 1 | l) + 2, one byte d, distance = 256 - d
//! 0 1                   long copy: 16-bit little-endian field f follows
//!                         f == 0      end of stream
//!                         f & 7 != 0  len = (f & 7) + 2
//!                         f & 7 == 0  one more byte n, len = n + 1
//!                         distance = 0x2000 - (f >> 3)
//! ```

use core::iter::FusedIterator;

use crate::decompress::DecompressError;

/// Inputs shorter than this are rejected by [compress](crate::compress()) and
/// [decompress](crate::decompress())
///
/// The shortest possible stream (an empty payload) is exactly this long.
pub const MIN_INPUT_LEN: usize = 3;

/// Backreferences produced by the encoder always reach back less than this many bytes
pub const WINDOW_SIZE: usize = 0x1ff0;

/// Shortest match the encoder will emit a copy for
pub const MIN_MATCH_LEN: usize = 3;

/// Longest copy that can be expressed by a single token
pub const MAX_COPY_LEN: usize = 256;

pub(crate) const MAX_SHORT_COPY_LEN: usize = 5;
// the grammar allows 256 here, but the reference encoder never uses it
pub(crate) const MAX_SHORT_COPY_DISTANCE: usize = 0xff;
pub(crate) const MAX_PACKED_LONG_COPY_LEN: usize = 9;

const SHORT_COPY_SPAN: usize = 0x100;
const LONG_COPY_SPAN: usize = 0x2000;

/// One decoded instruction of a PRS stream
///
/// `distance` is how far back from the current output position the copy starts; a
/// `distance` of 1 repeats the previous byte. Copies may be longer than their distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Copy one byte from the input
    RawByte(u8),
    /// Copy of 2 to 5 bytes from up to 256 bytes back
    ShortCopy { distance: usize, len: usize },
    /// Copy of 1 to 256 bytes from up to 8192 bytes back
    LongCopy { distance: usize, len: usize },
    /// End-of-stream marker
    End,
}

impl Token {
    /// Pick the encoding for a match found by the encoder
    pub(crate) fn copy(distance: usize, len: usize) -> Self {
        debug_assert!(distance >= 1 && distance < WINDOW_SIZE);
        debug_assert!((MIN_MATCH_LEN..=MAX_COPY_LEN).contains(&len));

        if distance <= MAX_SHORT_COPY_DISTANCE && len <= MAX_SHORT_COPY_LEN {
            Token::ShortCopy { distance, len }
        } else {
            Token::LongCopy { distance, len }
        }
    }

    /// Number of bytes this token adds to the decompressed output
    pub fn output_len(&self) -> usize {
        match *self {
            Token::RawByte(_) => 1,
            Token::ShortCopy { len, .. } | Token::LongCopy { len, .. } => len,
            Token::End => 0,
        }
    }
}

/// Iterator over the tokens of a compressed stream
///
/// Created by [tokens]. Yields [Token::End] once and then stops. An error also ends
/// iteration.
pub struct Tokens<'a> {
    inp: &'a [u8],
    pos: usize,
    ctrl: u8,
    ctrl_bits: u8,
    done: bool,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(inp: &'a [u8]) -> Self {
        Self {
            inp,
            pos: 0,
            ctrl: 0,
            ctrl_bits: 0,
            done: false,
        }
    }

    fn byte(&mut self) -> Result<u8, DecompressError> {
        let b = *self
            .inp
            .get(self.pos)
            .ok_or(DecompressError::InputTruncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn bit(&mut self) -> Result<bool, DecompressError> {
        if self.ctrl_bits == 0 {
            self.ctrl = self.byte()?;
            self.ctrl_bits = 8;
        }

        let ret = self.ctrl & 1;
        self.ctrl >>= 1;
        self.ctrl_bits -= 1;

        Ok(ret == 1)
    }

    /// Parse the next token
    pub(crate) fn next_token(&mut self) -> Result<Token, DecompressError> {
        if self.bit()? {
            return Ok(Token::RawByte(self.byte()?));
        }

        if self.bit()? {
            let f = u16::from_le_bytes([self.byte()?, self.byte()?]);
            if f == 0 {
                return Ok(Token::End);
            }

            let distance = LONG_COPY_SPAN - (f >> 3) as usize;
            let len = match f & 0b111 {
                0 => self.byte()? as usize + 1,
                n => n as usize + 2,
            };
            Ok(Token::LongCopy { distance, len })
        } else {
            // high bit first
            let h = self.bit()? as usize;
            let l = self.bit()? as usize;
            let len = ((h << 1) | l) + 2;
            let distance = SHORT_COPY_SPAN - self.byte()? as usize;
            Ok(Token::ShortCopy { distance, len })
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token, DecompressError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let ret = self.next_token();
        self.done = matches!(ret, Ok(Token::End) | Err(_));
        Some(ret)
    }
}

impl<'a> FusedIterator for Tokens<'a> {}

/// Walk the tokens of a compressed stream without decompressing it
///
/// No length policy or backreference validation is applied; this only checks that the
/// grammar can be parsed.
pub fn tokens(inp: &[u8]) -> Tokens<'_> {
    Tokens::new(inp)
}
