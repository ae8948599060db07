//! Page numbers to absolute bounds, plus relative page links

use crate::error::{RestError, RestResult};
use serde::Serialize;

/// Page numbers a response can link to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    pub first: usize,
    pub last: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
}

impl PageLinks {
    /// RFC 8288 `Link` header value; page `n` lives at `<base>/page/<n>`
    pub fn header_value(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        let mut links = vec![(self.first, "first")];
        if let Some(prev) = self.prev {
            links.push((prev, "prev"));
        }
        if let Some(next) = self.next {
            links.push((next, "next"));
        }
        links.push((self.last, "last"));
        links
            .into_iter()
            .map(|(page, rel)| format!("<{}/page/{}>; rel=\"{}\"", base, page, rel))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Bounds for one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
    pub links: PageLinks,
}

pub fn paginate(page: usize, page_size: usize, total_count: usize) -> RestResult<Page> {
    if page < 1 {
        return Err(RestError::validation("page number must be at least 1"));
    }
    if page_size == 0 {
        return Err(RestError::validation("page size must be positive"));
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| RestError::validation(format!("page {} is out of range", page)))?;
    if total_count > 0 && offset >= total_count {
        return Err(RestError::validation(format!(
            "page {} is beyond the last page of {} results",
            page, total_count
        )));
    }

    let last = total_count.div_ceil(page_size).max(1);
    let links = PageLinks {
        first: 1,
        last,
        prev: (page > 1 && total_count > 0).then(|| page - 1),
        next: (page < last).then(|| page + 1),
    };
    Ok(Page {
        limit: page_size,
        offset,
        links,
    })
}
