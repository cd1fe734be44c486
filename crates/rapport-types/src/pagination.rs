use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Raw `page`/`limit` query parameters. Signed so that zero and negative
/// values fall back to defaults instead of failing to parse.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Clamped pagination window: `page >= 1`, `1 <= limit <= MAX_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageParams {
    pub fn resolve(self) -> Pagination {
        let page = match self.page {
            Some(p) if p > 0 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let limit = match self.limit {
            Some(l) if l > 0 => u32::try_from(l).unwrap_or(MAX_LIMIT).min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        };
        Pagination { page, limit }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn empty(window: Pagination) -> Self {
        Self {
            data: Vec::new(),
            page: window.page,
            limit: window.limit,
            total: 0,
            total_pages: 0,
        }
    }
}

impl Pagination {
    /// Cut one page out of an already ordered result set. Pages past the end
    /// yield an empty `data` slice.
    pub fn apply<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let limit = self.limit.max(1) as usize;
        let total_pages = total.div_ceil(limit);
        let offset = (self.page as usize).saturating_sub(1).saturating_mul(limit);

        let data = if offset < total {
            items.into_iter().skip(offset).take(limit).collect()
        } else {
            Vec::new()
        };

        Page {
            data,
            page: self.page,
            limit: self.limit,
            total,
            total_pages,
        }
    }
}
