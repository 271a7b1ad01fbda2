//! Property-based generators for request shapes.

use proptest::prelude::*;

/// Strategy for page sizes the cache is commonly configured with.
pub fn arb_page_size() -> impl Strategy<Value = usize> {
    prop_oneof![Just(512usize), Just(1024), Just(4096), Just(8192)]
}

/// Strategy for `(offset, length)` request shapes, biased toward page
/// boundaries where the intra-page slice cases change.
pub fn arb_request(page_size: usize) -> impl Strategy<Value = (u64, usize)> {
    let ps = page_size as u64;
    prop_oneof![
        // arbitrary placement
        (0u64..16 * ps, 1usize..4 * page_size),
        // boundary-hugging: start just before or at a page edge
        (1u64..8u64, 0u64..8 * ps, 1usize..3 * page_size)
            .prop_map(move |(delta, page, len)| ((page / ps) * ps + ps - delta, len)),
        // aligned full pages
        (0u64..8u64, 1usize..4usize)
            .prop_map(move |(page, pages)| (page * ps, pages * page_size)),
    ]
}

/// Strategy for payload bytes of a given length range.
pub fn arb_payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..max_len)
}
