//! Fixed-width values stored in leaves.
//!
//! Spec §3 describes `V` as "a fixed-width opaque payload, typically a
//! tuple identifier". The tree never inspects it beyond copying bytes.

/// A value that can live in a fixed-width leaf slot, parallel to
/// [`crate::key::FixedKey`].
pub trait FixedValue: Clone + Send + Sync + 'static {
    const ENCODED_LEN: usize;

    fn encode(&self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Self;
}

/// A tuple identifier: the page holding a row plus its slot within that
/// page. The canonical `V` for this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: common::api::PageId,
    pub slot_index: u16,
}

impl FixedValue for RowId {
    // PageId (usize, 8 bytes on the platforms this targets) + slot_index (2
    // bytes) + 2 bytes padding.
    const ENCODED_LEN: usize = 12;

    fn encode(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&(self.page_id as u64).to_le_bytes());
        out[8..10].copy_from_slice(&self.slot_index.to_le_bytes());
        out[10..12].fill(0);
    }

    fn decode(bytes: &[u8]) -> Self {
        let page_id = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as common::api::PageId;
        let slot_index = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
        RowId { page_id, slot_index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_round_trips() {
        let value = RowId {
            page_id: 1234,
            slot_index: 7,
        };
        let mut buf = [0u8; RowId::ENCODED_LEN];
        value.encode(&mut buf);
        assert_eq!(RowId::decode(&buf), value);
    }
}
