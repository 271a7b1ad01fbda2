use common::PageIndex;
use std::ops::Range;

/// One page touched by a request, with the sub-range of the page the request
/// covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageOp {
    /// Page index within the backing file.
    pub index: PageIndex,
    /// Byte offset of the page start within the backing file.
    pub start: u64,
    /// Intra-page byte range to read or write.
    pub slice: Range<usize>,
}

impl PageOp {
    /// True when the request covers this page completely.
    pub fn covers_page(&self, page_size: usize) -> bool {
        self.slice.start == 0 && self.slice.len() == page_size
    }
}

/// Decompose `(offset, length)` into ordered page-aligned operations.
///
/// The first and last pages carry partial slices; middle pages are always
/// full. The slice lengths sum to `length` and the slices are contiguous
/// across consecutive pages.
///
/// # Panics
///
/// Panics if `length` or `page_size` is 0; callers short-circuit zero-length
/// requests before planning.
pub fn affected_pages(offset: u64, length: usize, page_size: usize) -> Vec<PageOp> {
    assert!(length > 0, "length must be positive");
    assert!(page_size > 0, "page_size must be positive");

    let ps = page_size as u64;
    let len = length as u64;
    let first = offset / ps;
    let last = (offset + len - 1) / ps;

    let mut ops = Vec::with_capacity((last - first + 1) as usize);
    for index in first..=last {
        let start = index * ps;
        let slice = if first == last {
            (offset - start) as usize..(offset - start + len) as usize
        } else if index == first {
            (offset - start) as usize..page_size
        } else if index == last {
            0..(offset + len - start) as usize
        } else {
            0..page_size
        };
        ops.push(PageOp { index, start, slice });
    }
    ops
}
