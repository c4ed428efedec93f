use bytes::BufMut;

/// Length-prefixed writes matching [`crate::ByteCursor::read_prefixed`].
pub trait BufMutExt: BufMut {
    /// Write a `u32` length prefix and the bytes.
    ///
    /// Callers validate lengths beforehand; a slice longer than `u32::MAX`
    /// is a programming error.
    fn put_prefixed(&mut self, bytes: &[u8]) {
        debug_assert!(u32::try_from(bytes.len()).is_ok());
        self.put_u32_le(bytes.len() as u32);
        self.put_slice(bytes);
    }

    fn put_prefixed_str(&mut self, value: &str) {
        self.put_prefixed(value.as_bytes());
    }
}

impl<B: BufMut> BufMutExt for B {}
