use serde::Serialize;

/// One page of a larger result set. Pages are 1-indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T: Clone> Page<T> {
    /// Slices `items`; a page past the end yields no items. `page` and
    /// `page_size` below 1 are treated as 1.
    pub fn of(items: &[T], page: usize, page_size: usize) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total_items = items.len();
        let start = (page - 1).saturating_mul(page_size);
        let slice = if start >= total_items {
            Vec::new()
        } else {
            items[start..(start + page_size).min(total_items)].to_vec()
        };
        Self {
            items: slice,
            page,
            page_size,
            total_items,
            total_pages: total_items.div_ceil(page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 20, 0..20)]
    #[case(2, 20, 20..40)]
    #[case(3, 20, 40..45)]
    #[case(4, 20, 0..0)]
    fn test_pages_of_forty_five(
        #[case] page: usize,
        #[case] size: usize,
        #[case] expected: std::ops::Range<usize>,
    ) {
        let items: Vec<usize> = (0..45).collect();
        let p = Page::of(&items, page, size);
        assert_eq!(p.items, expected.collect::<Vec<_>>());
        assert_eq!(p.total_items, 45);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn test_empty_input() {
        let p = Page::<u8>::of(&[], 1, 20);
        assert!(p.items.is_empty());
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn test_zero_page_is_first_page() {
        let p = Page::of(&[1, 2, 3], 0, 2);
        assert_eq!(p.page, 1);
        assert_eq!(p.items, vec![1, 2]);
    }
}
