use core::fmt;
use core::mem;

use log::{debug, trace};

use crate::token::*;
use crate::util::*;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

const HTAB_LOG2: usize = 13;
const HTAB_SZ: usize = 1 << HTAB_LOG2;
// must be a power of two no smaller than the window
const CHAIN_SZ: usize = 0x2000;
const MAX_CHAIN_DEPTH: usize = 128;
const NIL: usize = usize::MAX;

/// The linear scan never extends a match past this, even though a copy can hold one more
const MAX_SCAN_LEN: usize = 255;

/// Compression errors
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompressError {
    /// The input is shorter than [MIN_INPUT_LEN](crate::MIN_INPUT_LEN)
    InputTooSmall,
    /// The output buffer was too small to hold all the output.
    ///
    /// What has been written is *not* a valid stream, since control bytes are only filled
    /// in as they complete.
    OutputTooSmall,
    /// The output buffer could not be allocated
    AllocationFailure,
}
impl fmt::Display for CompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressError::InputTooSmall => write!(f, "input is too small"),
            CompressError::OutputTooSmall => write!(f, "output buffer was insufficient"),
            CompressError::AllocationFailure => write!(f, "could not allocate output buffer"),
        }
    }
}
#[cfg(feature = "std")]
impl std::error::Error for CompressError {}

/// Upper bound on the compressed size of `len` bytes of input
///
/// This is exact for incompressible input: every byte becomes a literal, every eight
/// control bits cost a control byte, and the end marker adds two bits and two bytes.
pub const fn max_compressed_size(len: usize) -> usize {
    len + (len + 2) / 8 + 3
}

trait OutputHelper {
    fn putc(&mut self, c: u8) -> Result<(), CompressError>;
    fn pos(&self) -> usize;
    /// Overwrite an already written byte
    fn poke(&mut self, pos: usize, c: u8);
}
impl<'a> OutputHelper for BufOutput<'a> {
    fn putc(&mut self, c: u8) -> Result<(), CompressError> {
        if self.pos + 1 <= self.buf.len() {
            self.buf[self.pos] = c;
            self.pos += 1;
            Ok(())
        } else {
            Err(CompressError::OutputTooSmall)
        }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn poke(&mut self, pos: usize, c: u8) {
        self.buf[pos] = c;
    }
}

#[cfg(feature = "alloc")]
impl OutputHelper for VecOutput {
    fn putc(&mut self, c: u8) -> Result<(), CompressError> {
        self.vec.push(c);
        Ok(())
    }

    fn pos(&self) -> usize {
        self.vec.len()
    }

    fn poke(&mut self, pos: usize, c: u8) {
        self.vec[pos] = c;
    }
}

/// Token writer
///
/// A control byte is reserved in the output as soon as the previous one fills up, and
/// written back once its own eight bits are known. The last control bit of a literal or
/// copy is placed without reserving; the reservation then happens after the token's
/// payload. The reference decoder reads control bytes lazily, so this ordering is what
/// makes the two agree.
struct PrsOutput<O> {
    out: O,
    ctrl_pos: usize,
    ctrl: u8,
    bitpos: u8,
}

impl<O: OutputHelper> PrsOutput<O> {
    fn new(mut out: O) -> Result<Self, CompressError> {
        let ctrl_pos = out.pos();
        out.putc(0)?;
        Ok(Self {
            out,
            ctrl_pos,
            ctrl: 0,
            bitpos: 0,
        })
    }

    fn put_bit_nosave(&mut self, bit: bool) {
        debug_assert!(self.bitpos < 8);
        self.ctrl |= (bit as u8) << self.bitpos;
        self.bitpos += 1;
    }

    fn save(&mut self) -> Result<(), CompressError> {
        if self.bitpos == 8 {
            self.out.poke(self.ctrl_pos, self.ctrl);
            self.ctrl = 0;
            self.bitpos = 0;
            self.ctrl_pos = self.out.pos();
            self.out.putc(0)?;
        }
        Ok(())
    }

    fn put_bit(&mut self, bit: bool) -> Result<(), CompressError> {
        self.put_bit_nosave(bit);
        self.save()
    }

    fn put_token(&mut self, token: Token) -> Result<(), CompressError> {
        trace!("{:?}", token);

        match token {
            Token::RawByte(lit) => {
                self.put_bit_nosave(true);
                self.out.putc(lit)?;
            }
            Token::ShortCopy { distance, len } => {
                debug_assert!((1..=0x100).contains(&distance));
                debug_assert!((2..=MAX_SHORT_COPY_LEN).contains(&len));

                let size = (len - 2) as u8;
                self.put_bit(false)?;
                self.put_bit(false)?;
                self.put_bit(size & 0b10 != 0)?;
                self.put_bit_nosave(size & 0b01 != 0);
                self.out.putc((0x100 - distance) as u8)?;
            }
            Token::LongCopy { distance, len } => {
                debug_assert!((1..=0x2000).contains(&distance));
                debug_assert!((1..=MAX_COPY_LEN).contains(&len));

                let field = (((0x2000 - distance) & 0x1fff) << 3) as u16;
                self.put_bit(false)?;
                self.put_bit_nosave(true);
                // lengths of 1 and 2 would alias the 3-byte form, so they have to use it too
                if (3..=MAX_PACKED_LONG_COPY_LEN).contains(&len) {
                    let [b0, b1] = (field | (len - 2) as u16).to_le_bytes();
                    self.out.putc(b0)?;
                    self.out.putc(b1)?;
                } else {
                    let [b0, b1] = field.to_le_bytes();
                    self.out.putc(b0)?;
                    self.out.putc(b1)?;
                    self.out.putc((len - 1) as u8)?;
                }
            }
            Token::End => {
                self.put_bit(false)?;
                self.put_bit(true)?;
                // unused high bits stay zero
                self.out.poke(self.ctrl_pos, self.ctrl);
                self.out.putc(0)?;
                self.out.putc(0)?;
                return Ok(());
            }
        }

        self.save()
    }
}

/// Which match finder the encoder uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchFinder {
    /// Exhaustive backwards scan, byte-for-byte identical to the reference encoder
    ///
    /// This is slow (every position scans the whole window), but its output is known to
    /// be accepted by the console's decoder.
    #[default]
    LinearScan,
    /// Hash chains over 3-byte prefixes
    ///
    /// Much faster, and usually compresses better because it can match at the start of
    /// the input and produce copies that overlap their own output. Its output is valid
    /// PRS but is not identical to the reference encoder's.
    HashChain,
}

trait FindMatch {
    /// Best match for the input starting at `pos`, as `(distance, len)`
    fn find(&mut self, inp: &[u8], pos: usize) -> Option<(usize, usize)>;
    /// Make `pos` available as a match source for later positions
    fn insert(&mut self, inp: &[u8], pos: usize);
}

struct LinearScan;

impl FindMatch for LinearScan {
    fn find(&mut self, inp: &[u8], x: usize) -> Option<(usize, usize)> {
        // the reference encoder never considers position 0 as a match source
        if x < MIN_MATCH_LEN + 1 || x + MIN_MATCH_LEN > inp.len() {
            return None;
        }

        let lowest = usize::max(1, (x + 1).saturating_sub(WINDOW_SIZE));
        let mut best = None;
        let mut best_len = 0;

        // nearest first, so equal-length matches further back never win
        for y in (lowest..=x - MIN_MATCH_LEN).rev() {
            if inp[y..y + MIN_MATCH_LEN] != inp[x..x + MIN_MATCH_LEN] {
                continue;
            }

            // matches never run into the bytes being encoded
            let mut len = MIN_MATCH_LEN;
            while len < MAX_SCAN_LEN
                && y + len + 1 < x
                && x + len + 1 <= inp.len()
                && inp[y + len] == inp[x + len]
            {
                len += 1;
            }

            if len > best_len {
                best = Some((x - y, len));
                best_len = len;
            }
            if best_len == MAX_SCAN_LEN {
                break;
            }
        }

        best
    }

    fn insert(&mut self, _inp: &[u8], _pos: usize) {}
}

fn prs_hash(inp: &[u8], pos: usize) -> usize {
    let v = u32::from_le_bytes([inp[pos], inp[pos + 1], inp[pos + 2], 0]);
    let h = v.wrapping_mul(2654435769);
    let h = h >> (32 - HTAB_LOG2);
    h as usize
}

/// Holds state for performing compression operations
///
/// Only [MatchFinder::HashChain] uses the tables, but the same state can be used with
/// either match finder.
pub struct CompressState {
    htab: [usize; HTAB_SZ],
    chain: [usize; CHAIN_SZ],
}

impl FindMatch for CompressState {
    fn find(&mut self, inp: &[u8], x: usize) -> Option<(usize, usize)> {
        let max_len = usize::min(MAX_COPY_LEN, inp.len() - x);
        if max_len < MIN_MATCH_LEN {
            return None;
        }

        let mut best = None;
        let mut best_len = MIN_MATCH_LEN - 1;
        let mut cand = self.htab[prs_hash(inp, x)];

        for _ in 0..MAX_CHAIN_DEPTH {
            if cand == NIL {
                break;
            }
            debug_assert!(cand < x);
            let distance = x - cand;
            if distance >= WINDOW_SIZE {
                break;
            }

            // may run past x, the decoder copies one byte at a time
            let len = inp[cand..]
                .iter()
                .zip(inp[x..x + max_len].iter())
                .take_while(|(a, b)| a == b)
                .count();

            if len > best_len {
                best = Some((distance, len));
                best_len = len;
                if len == max_len {
                    break;
                }
            }

            let next = self.chain[cand % CHAIN_SZ];
            // slot was reused by a newer position, so the chain ends here
            if next != NIL && next >= cand {
                break;
            }
            cand = next;
        }

        best
    }

    fn insert(&mut self, inp: &[u8], pos: usize) {
        if pos + MIN_MATCH_LEN > inp.len() {
            return;
        }

        let hash = prs_hash(inp, pos);
        self.chain[pos % CHAIN_SZ] = mem::replace(&mut self.htab[hash], pos);
    }
}

fn compress_impl<F: FindMatch, O: OutputHelper>(
    inp: &[u8],
    finder: &mut F,
    outp: O,
) -> Result<O, CompressError> {
    if inp.len() < MIN_INPUT_LEN {
        return Err(CompressError::InputTooSmall);
    }

    let mut outp = PrsOutput::new(outp)?;

    let mut pos = 0;
    while pos < inp.len() {
        let token = match finder.find(inp, pos) {
            Some((distance, len)) => Token::copy(distance, len),
            None => Token::RawByte(inp[pos]),
        };
        outp.put_token(token)?;

        let len = token.output_len();
        for p in pos..pos + len {
            finder.insert(inp, p);
        }
        pos += len;
    }

    outp.put_token(Token::End)?;
    Ok(outp.out)
}

#[cfg(feature = "alloc")]
fn compress_to_vec_impl<F: FindMatch>(
    inp: &[u8],
    finder: &mut F,
) -> Result<alloc::vec::Vec<u8>, CompressError> {
    let mut ret = alloc::vec::Vec::new();
    ret.try_reserve_exact(max_compressed_size(inp.len()))
        .map_err(|_| CompressError::AllocationFailure)?;

    let mut ret = compress_impl(inp, finder, VecOutput::from(ret))?.vec;
    ret.shrink_to_fit();
    debug!("compressed {} bytes into {} bytes", inp.len(), ret.len());
    Ok(ret)
}

impl CompressState {
    /// Allocate a new compression state
    pub fn new() -> Self {
        Self {
            htab: [NIL; HTAB_SZ],
            chain: [NIL; CHAIN_SZ],
        }
    }
    #[cfg(feature = "alloc")]
    /// Allocate a new compression state specifically on the heap
    ///
    /// This is a workaround for non-guaranteed copy elision / RVO.
    pub fn new_boxed() -> alloc::boxed::Box<Self> {
        use core::ptr::addr_of_mut;
        let layout = core::alloc::Layout::new::<Self>();
        unsafe {
            let self_ = alloc::alloc::alloc(layout) as *mut Self;
            if self_.is_null() {
                alloc::alloc::handle_alloc_error(layout);
            }
            for i in 0..HTAB_SZ {
                addr_of_mut!((*self_).htab[i]).write(NIL);
            }
            for i in 0..CHAIN_SZ {
                addr_of_mut!((*self_).chain[i]).write(NIL);
            }
            alloc::boxed::Box::from_raw(self_)
        }
    }

    fn reset(&mut self) {
        self.htab.fill(NIL);
        self.chain.fill(NIL);
    }

    /// Compress the input into a preallocated buffer
    ///
    /// A buffer of [max_compressed_size] bytes is always big enough.
    /// Returns the compressed size on success, or an error otherwise
    pub fn compress_to_buf(
        &mut self,
        inp: &[u8],
        outp: &mut [u8],
        finder: MatchFinder,
    ) -> Result<usize, CompressError> {
        let outp: BufOutput = outp.into();
        let outp = match finder {
            MatchFinder::LinearScan => compress_impl(inp, &mut LinearScan, outp)?,
            MatchFinder::HashChain => {
                self.reset();
                compress_impl(inp, self, outp)?
            }
        };
        debug!(
            "compressed {} bytes into {} bytes ({:?})",
            inp.len(),
            outp.pos,
            finder
        );
        Ok(outp.pos)
    }

    #[cfg(feature = "alloc")]
    /// Compress the input into a [Vec](alloc::vec::Vec)
    ///
    /// Returns the result on success, or an error otherwise
    pub fn compress_to_vec(
        &mut self,
        inp: &[u8],
        finder: MatchFinder,
    ) -> Result<alloc::vec::Vec<u8>, CompressError> {
        match finder {
            MatchFinder::LinearScan => compress_to_vec_impl(inp, &mut LinearScan),
            MatchFinder::HashChain => {
                self.reset();
                compress_to_vec_impl(inp, self)
            }
        }
    }
}

impl Default for CompressState {
    fn default() -> Self {
        Self::new()
    }
}

/// Compress the input exactly the way the reference encoder does
///
/// Same as [CompressState::compress_to_vec] with [MatchFinder::LinearScan], which does not
/// need any state.
#[cfg(feature = "alloc")]
pub fn compress(inp: &[u8]) -> Result<alloc::vec::Vec<u8>, CompressError> {
    compress_to_vec_impl(inp, &mut LinearScan)
}
