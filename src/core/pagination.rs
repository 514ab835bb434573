/// One page of a list, with the clamping rules the feed relies on: a page
/// number past the end resolves to the last page, and an empty list still has
/// a (empty) first page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next().then_some(self.number + 1)
    }

    /// Zero-based position of the first item across the whole list.
    pub fn start_index(&self) -> usize {
        (self.number - 1) * self.per_page
    }
}

pub fn paginate<T>(items: Vec<T>, per_page: usize, requested: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let num_pages = items.len().div_ceil(per_page).max(1);
    let number = requested.clamp(1, num_pages);
    let start = (number - 1) * per_page;

    Page {
        items: items.into_iter().skip(start).take(per_page).collect(),
        number,
        num_pages,
        per_page,
    }
}
