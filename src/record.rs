//! Fixed-width records that can be persisted verbatim in a mapped file.
//!
//! A record's bytes are written to disk and read back, possibly by a later
//! process, so records must be plain values: no pointers, no heap handles.
//! All encodings are little-endian.

/// A plain value with a fixed encoded width.
pub trait FixedRecord: Sized {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Write the record into `dst`, which is exactly [`Self::SIZE`] bytes long.
    fn encode(&self, dst: &mut [u8]);

    /// Read a record from `src`, which is exactly [`Self::SIZE`] bytes long.
    fn decode(src: &[u8]) -> Self;
}

macro_rules! impl_fixed_record_for_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FixedRecord for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn encode(&self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_le_bytes());
                }

                fn decode(src: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(src);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_fixed_record_for_int!(u8, u16, u32, u64, i32, i64);

impl<A, B> FixedRecord for (A, B)
where
    A: FixedRecord,
    B: FixedRecord,
{
    const SIZE: usize = A::SIZE + B::SIZE;

    fn encode(&self, dst: &mut [u8]) {
        let (a, b) = dst.split_at_mut(A::SIZE);
        self.0.encode(a);
        self.1.encode(b);
    }

    fn decode(src: &[u8]) -> Self {
        let (a, b) = src.split_at(A::SIZE);
        (A::decode(a), B::decode(b))
    }
}
