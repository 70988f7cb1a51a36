use serde::{Deserialize, Serialize};

pub const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl PaginationParams {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    /// Saturates instead of overflowing; `page` comes straight from the
    /// query string.
    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> u64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// `offset` as a SQL `OFFSET` value. Pages past the end stay past the end.
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset()).unwrap_or(i64::MAX)
    }

    pub fn sql_limit(&self) -> i64 {
        self.limit() as i64
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        let total_pages = total.div_ceil(per_page);
        Self {
            items,
            total,
            page: params.page.max(1),
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_uses_clamped_limit() {
        let params = PaginationParams::new(3, 500);
        assert_eq!(params.limit(), MAX_PER_PAGE);
        assert_eq!(params.offset(), 200);
    }

    #[test]
    fn page_zero_behaves_like_first_page() {
        let params = PaginationParams::new(0, 10);
        assert_eq!(params.offset(), 0);
        let page: Paginated<u8> = Paginated::new(vec![], 0, &params);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn huge_page_saturates_instead_of_overflowing() {
        let params = PaginationParams::new(u64::MAX, 20);
        assert_eq!(params.offset(), u64::MAX);
        assert_eq!(params.sql_offset(), i64::MAX);
        assert_eq!(params.sql_limit(), 20);

        let past_i64 = PaginationParams::new(u64::MAX / 20, 20);
        assert!(past_i64.offset() > i64::MAX as u64);
        assert_eq!(past_i64.sql_offset(), i64::MAX);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Paginated<u8> = Paginated::new(vec![1, 2], 41, &PaginationParams::new(1, 20));
        assert_eq!(page.total_pages, 3);
    }
}
