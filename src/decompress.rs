use core::fmt::{self};

use log::{debug, trace};

use crate::token::{Token, Tokens, MIN_INPUT_LEN};
use crate::util::*;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

/// Decompression errors
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecompressError {
    /// The input is shorter than [MIN_INPUT_LEN](crate::MIN_INPUT_LEN)
    InputTooSmall,
    /// The input ended before the end-of-stream marker
    InputTruncated,
    /// A copy reached back before the start of the output
    InvalidBackreference,
    /// The output buffer was too small to hold all the output.
    ///
    /// Everything up to the end of the buffer has been written.
    OutputTooSmall,
    /// The output buffer could not be allocated
    AllocationFailure,
}

impl DecompressError {
    /// Whether the stream itself is corrupt, as opposed to a problem with how it was called
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DecompressError::InputTruncated | DecompressError::InvalidBackreference
        )
    }
}

impl fmt::Display for DecompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompressError::InputTooSmall => write!(f, "input is too small"),
            DecompressError::InputTruncated => write!(f, "input was truncated"),
            DecompressError::InvalidBackreference => write!(f, "invalid backreference"),
            DecompressError::OutputTooSmall => write!(f, "output buffer was insufficient"),
            DecompressError::AllocationFailure => write!(f, "could not allocate output buffer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecompressError {}

/// Where decoded bytes go
///
/// The decoder drives every sink through the same traversal, so a measurement pass
/// fails on exactly the streams a real decode would.
trait OutputSink {
    /// Append one literal byte
    fn put_lit(&mut self, lit: u8) -> Result<(), DecompressError>;
    /// Copy `len` bytes starting `distance` bytes back
    ///
    /// `len` may exceed `distance`, in which case the copy repeats its own output.
    fn put_backref(&mut self, distance: usize, len: usize) -> Result<(), DecompressError>;
}

impl<'a> OutputSink for BufOutput<'a> {
    fn put_lit(&mut self, lit: u8) -> Result<(), DecompressError> {
        if self.pos >= self.buf.len() {
            return Err(DecompressError::OutputTooSmall);
        }

        self.buf[self.pos] = lit;
        self.pos += 1;
        Ok(())
    }

    fn put_backref(&mut self, distance: usize, mut len: usize) -> Result<(), DecompressError> {
        if distance > self.pos {
            return Err(DecompressError::InvalidBackreference);
        }

        let mut did_overflow = false;
        if self.pos + len > self.buf.len() {
            did_overflow = true;
            len = self.buf.len() - self.pos;
        }

        // one byte at a time, the source may overlap what is being written
        for i in 0..len {
            self.buf[self.pos + i] = self.buf[self.pos - distance + i];
        }
        self.pos += len;

        if did_overflow {
            Err(DecompressError::OutputTooSmall)
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "alloc")]
impl OutputSink for VecOutput {
    fn put_lit(&mut self, lit: u8) -> Result<(), DecompressError> {
        self.vec.push(lit);
        Ok(())
    }

    fn put_backref(&mut self, distance: usize, len: usize) -> Result<(), DecompressError> {
        let pos = self.vec.len();
        if distance > pos {
            return Err(DecompressError::InvalidBackreference);
        }

        self.vec.resize(pos + len, 0);
        for i in 0..len {
            self.vec[pos + i] = self.vec[pos - distance + i];
        }

        Ok(())
    }
}

impl OutputSink for CountOutput {
    fn put_lit(&mut self, _lit: u8) -> Result<(), DecompressError> {
        self.pos += 1;
        Ok(())
    }

    fn put_backref(&mut self, distance: usize, len: usize) -> Result<(), DecompressError> {
        if distance > self.pos {
            return Err(DecompressError::InvalidBackreference);
        }

        self.pos += len;
        Ok(())
    }
}

fn decompress_impl(inp: &[u8], outp: &mut impl OutputSink) -> Result<(), DecompressError> {
    if inp.len() < MIN_INPUT_LEN {
        return Err(DecompressError::InputTooSmall);
    }

    let mut tokens = Tokens::new(inp);
    loop {
        let token = tokens.next_token()?;
        trace!("{:?}", token);

        match token {
            Token::RawByte(lit) => outp.put_lit(lit)?,
            Token::ShortCopy { distance, len } | Token::LongCopy { distance, len } => {
                outp.put_backref(distance, len)?
            }
            Token::End => return Ok(()),
        }
    }
}

/// Decompress the input into a preallocated buffer
///
/// Returns the decompressed size on success, or an error otherwise. A buffer of the right
/// size can be obtained from [measure_decompressed_size].
pub fn decompress_to_buf(inp: &[u8], outp: &mut [u8]) -> Result<usize, DecompressError> {
    let mut outp: BufOutput = outp.into();
    decompress_impl(inp, &mut outp)?;
    debug!("decompressed {} bytes into {} bytes", inp.len(), outp.pos);
    Ok(outp.pos)
}

/// Decompress the input into a [Vec](alloc::vec::Vec)
///
/// `capacity_hint` only sizes the initial allocation; the output grows as needed.
/// Returns the result on success, or an error otherwise
#[cfg(feature = "alloc")]
pub fn decompress_to_vec(
    inp: &[u8],
    capacity_hint: Option<usize>,
) -> Result<alloc::vec::Vec<u8>, DecompressError> {
    let mut ret = alloc::vec::Vec::new();
    if let Some(capacity_hint) = capacity_hint {
        ret.try_reserve_exact(capacity_hint)
            .map_err(|_| DecompressError::AllocationFailure)?;
    }

    let mut ret: VecOutput = ret.into();
    decompress_impl(inp, &mut ret)?;
    debug!("decompressed {} bytes into {} bytes", inp.len(), ret.vec.len());
    Ok(ret.vec)
}

/// Decompress the input into a new [Vec](alloc::vec::Vec)
#[cfg(feature = "alloc")]
pub fn decompress(inp: &[u8]) -> Result<alloc::vec::Vec<u8>, DecompressError> {
    decompress_to_vec(inp, None)
}

/// Compute the decompressed size without writing any output
///
/// Walks the stream exactly like [decompress_to_buf] does, including the same validation.
pub fn measure_decompressed_size(inp: &[u8]) -> Result<usize, DecompressError> {
    let mut outp = CountOutput::default();
    decompress_impl(inp, &mut outp)?;
    Ok(outp.pos)
}
