//! The header page: one per tree, holding only `root_page_id` (spec §3,
//! §6.3). Its id is supplied at construction. Key-type/fanout bookkeeping
//! lives on `BPlusTree` construction parameters instead, since the tree is
//! generic over `K`/`V` instead of a runtime enum.

use common::api::{PageId, INVALID_PAGE_ID};

const ROOT_PAGE_ID_OFFSET: usize = 0;

/// Reads `root_page_id` from a header page's bytes.
pub fn root_page_id(data: &[u8]) -> PageId {
    usize::from_le_bytes(data[ROOT_PAGE_ID_OFFSET..ROOT_PAGE_ID_OFFSET + 8].try_into().unwrap())
}

/// Writes `root_page_id` into a header page's bytes.
pub fn set_root_page_id(data: &mut [u8], root_page_id: PageId) {
    data[ROOT_PAGE_ID_OFFSET..ROOT_PAGE_ID_OFFSET + 8].copy_from_slice(&root_page_id.to_le_bytes());
}

/// Initializes a freshly allocated header page to an empty tree.
pub fn init(data: &mut [u8]) {
    set_root_page_id(data, INVALID_PAGE_ID);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::api::PAGE_SIZE;

    #[test]
    fn init_then_round_trip() {
        let mut data = vec![0u8; PAGE_SIZE];
        init(&mut data);
        assert_eq!(root_page_id(&data), INVALID_PAGE_ID);
        set_root_page_id(&mut data, 42);
        assert_eq!(root_page_id(&data), 42);
    }
}
