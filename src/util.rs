#[cfg(feature = "alloc")]
extern crate alloc;

/// Fixed-size output: writes into a caller-provided slice
pub(crate) struct BufOutput<'a> {
    pub pos: usize,
    pub buf: &'a mut [u8],
}
impl<'a> From<&'a mut [u8]> for BufOutput<'a> {
    fn from(buf: &'a mut [u8]) -> Self {
        Self { pos: 0, buf }
    }
}

/// Growable output
#[cfg(feature = "alloc")]
pub(crate) struct VecOutput {
    pub vec: alloc::vec::Vec<u8>,
}
#[cfg(feature = "alloc")]
impl From<alloc::vec::Vec<u8>> for VecOutput {
    fn from(vec: alloc::vec::Vec<u8>) -> Self {
        Self { vec }
    }
}

/// Output that only counts how many bytes would have been written
///
/// Used for the measurement pass, which must walk the stream exactly like a
/// real decode does.
#[derive(Default)]
pub(crate) struct CountOutput {
    pub pos: usize,
}
