//! Splits a newest-first listing into numbered pages. Bad page numbers never fail: anything that
//! isn't an integer shows the first page, and integers out of range show the last page.
use crate::datastore::postfilters::Window;
use serde::{Deserialize, Serialize};

/// `?page=N`. Kept as a string so that junk values fall back to page 1 instead of a 400.
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn raw(&self) -> Option<&str> {
        self.page.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    count: i64,
    per_page: i64,
}

fn is_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix(|c| c == '+' || c == '-').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl Paginator {
    pub fn new(count: i64, per_page: i64) -> Self {
        Self {
            count: count.max(0),
            per_page: per_page.max(1),
        }
    }

    /// Always at least 1, even with nothing to show.
    pub fn num_pages(&self) -> i64 {
        if self.count == 0 {
            1
        } else {
            (self.count + self.per_page - 1) / self.per_page
        }
    }

    pub fn page_number(&self, raw: Option<&str>) -> i64 {
        let last = self.num_pages();
        let raw = match raw {
            Some(raw) => raw.trim(),
            None => return 1,
        };
        match raw.parse::<i64>() {
            Ok(n) if n < 1 || n > last => last,
            Ok(n) => n,
            // An integer too large for i64 is still out of range.
            Err(_) if is_integer(raw) => last,
            Err(_) => 1,
        }
    }

    pub fn window(&self, number: i64) -> Window {
        Window {
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }

    pub fn page<T>(&self, number: i64, object_list: Vec<T>) -> Page<T> {
        let num_pages = self.num_pages();
        let has_next = number < num_pages;
        let has_previous = number > 1;
        Page {
            number,
            num_pages,
            count: self.count,
            has_next,
            has_previous,
            next_page_number: if has_next { Some(number + 1) } else { None },
            previous_page_number: if has_previous { Some(number - 1) } else { None },
            object_list,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<i64>,
    pub previous_page_number: Option<i64>,
    pub object_list: Vec<T>,
}
