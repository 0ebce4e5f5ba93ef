use crate::common::{PageId, RecordId};

/// Fixed-width serialization for keys and values stored in index pages.
///
/// Implementations must encode into exactly `ENCODED_LEN` bytes and must
/// accept any byte pattern on decode; node slots are reused in place.
pub trait PageCodec: Copy + Send + Sync + 'static {
    const ENCODED_LEN: usize;

    fn encode_into(&self, buf: &mut [u8]);
    fn decode_from(buf: &[u8]) -> Self;
}

macro_rules! int_codec {
    ($($ty:ty),*) => {
        $(
            impl PageCodec for $ty {
                const ENCODED_LEN: usize = std::mem::size_of::<$ty>();

                fn encode_into(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_LEN].copy_from_slice(&self.to_le_bytes());
                }

                fn decode_from(buf: &[u8]) -> Self {
                    <$ty>::from_le_bytes(buf[..Self::ENCODED_LEN].try_into().unwrap())
                }
            }
        )*
    };
}

int_codec!(i32, i64, u32, u64);

impl PageCodec for PageId {
    const ENCODED_LEN: usize = 4;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.as_i32().to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        PageId::new(i32::from_le_bytes(buf[..4].try_into().unwrap()))
    }
}

impl PageCodec for RecordId {
    const ENCODED_LEN: usize = 8;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_id.as_i32().to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        RecordId {
            page_id: PageId::new(i32::from_le_bytes(buf[..4].try_into().unwrap())),
            slot: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        }
    }
}
