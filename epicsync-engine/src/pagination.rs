//! Cursor-following enumeration of remote collections.

use std::collections::VecDeque;

use crate::error::{SyncError, SyncResult};

/// One page of a cursor-paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }

    pub fn more(items: Vec<T>, next_cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor.into()),
            has_more: true,
        }
    }
}

type FetchPage<'a, T> = Box<dyn FnMut(Option<&str>) -> SyncResult<Page<T>> + Send + 'a>;

/// Lazily walks every page of a listing. Each page fetch happens only when the
/// buffered items run out. A failed fetch yields one `Pagination` error that
/// carries the last good cursor, after which the walk is over.
pub struct PageWalker<'a, T> {
    fetch: FetchPage<'a, T>,
    cursor: Option<String>,
    buffer: VecDeque<T>,
    has_more: bool,
    pages: usize,
}

impl<'a, T> PageWalker<'a, T> {
    pub fn new<F>(fetch: F) -> Self
    where
        F: FnMut(Option<&str>) -> SyncResult<Page<T>> + Send + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            cursor: None,
            buffer: VecDeque::new(),
            has_more: true,
            pages: 0,
        }
    }

    /// Starts the walk after `cursor`, typically the `last_cursor` of an
    /// earlier `Pagination` error.
    pub fn resume_from<F>(cursor: impl Into<String>, fetch: F) -> Self
    where
        F: FnMut(Option<&str>) -> SyncResult<Page<T>> + Send + 'a,
    {
        let mut walker = Self::new(fetch);
        walker.cursor = Some(cursor.into());
        walker
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fail(&mut self, source: SyncError) -> SyncError {
        self.has_more = false;
        self.buffer.clear();
        SyncError::Pagination {
            last_cursor: self.cursor.clone(),
            source: Box::new(source),
        }
    }

    fn fetch_next(&mut self) -> SyncResult<()> {
        let page = match (self.fetch)(self.cursor.as_deref()) {
            Ok(page) => page,
            Err(error) => return Err(self.fail(error)),
        };
        self.pages += 1;
        tracing::debug!(
            page = self.pages,
            items = page.items.len(),
            has_more = page.has_more,
            "fetched page"
        );

        if page.has_more {
            match page.next_cursor {
                Some(next) if self.cursor.as_deref() != Some(next.as_str()) => {
                    self.cursor = Some(next);
                }
                Some(_) => {
                    return Err(self.fail(SyncError::Protocol(
                        "page repeated the previous cursor".to_string(),
                    )))
                }
                None => {
                    return Err(self.fail(SyncError::Protocol(
                        "page reported more results without a cursor".to_string(),
                    )))
                }
            }
        } else {
            self.has_more = false;
        }

        self.buffer.extend(page.items);
        Ok(())
    }
}

impl<T> Iterator for PageWalker<'_, T> {
    type Item = SyncResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if !self.has_more {
                return None;
            }
            if let Err(error) = self.fetch_next() {
                return Some(Err(error));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageWalker};
    use crate::error::SyncError;

    fn three_pages(cursor: Option<&str>) -> Result<Page<u32>, SyncError> {
        match cursor {
            None => Ok(Page::more(vec![1, 2], "c1")),
            Some("c1") => Ok(Page::more(vec![3], "c2")),
            Some("c2") => Ok(Page::last(vec![4, 5])),
            Some(other) => panic!("unexpected cursor {other}"),
        }
    }

    #[test]
    fn yields_every_page_once_in_order() {
        let mut walker = PageWalker::new(three_pages);
        let items = walker
            .by_ref()
            .collect::<Result<Vec<_>, _>>()
            .expect("items");
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(walker.pages_fetched(), 3);
        assert!(walker.next().is_none());
    }

    #[test]
    fn fetches_pages_lazily() {
        let mut calls = 0;
        let mut walker = PageWalker::new(|cursor| {
            calls += 1;
            three_pages(cursor)
        });
        assert_eq!(walker.next().map(Result::ok), Some(Some(1)));
        assert_eq!(walker.next().map(Result::ok), Some(Some(2)));
        assert_eq!(walker.pages_fetched(), 1);
        drop(walker);
        assert_eq!(calls, 1);
    }

    #[test]
    fn follows_empty_pages_that_report_more() {
        let walker = PageWalker::new(|cursor| match cursor {
            None => Ok(Page::more(Vec::new(), "c1")),
            Some(_) => Ok(Page::last(vec!["a"])),
        });
        let items = walker.collect::<Result<Vec<_>, _>>().expect("items");
        assert_eq!(items, vec!["a"]);
    }

    #[test]
    fn reports_last_good_cursor_on_failure() {
        let mut walker = PageWalker::new(|cursor| match cursor {
            None => Ok(Page::more(vec![1], "c1")),
            Some("c1") => Ok(Page::more(vec![2], "c2")),
            Some(_) => Err(SyncError::Transport("connection reset".to_string())),
        });

        assert_eq!(walker.next().map(Result::ok), Some(Some(1)));
        assert_eq!(walker.next().map(Result::ok), Some(Some(2)));
        match walker.next() {
            Some(Err(SyncError::Pagination { last_cursor, source })) => {
                assert_eq!(last_cursor.as_deref(), Some("c2"));
                assert!(matches!(*source, SyncError::Transport(_)));
            }
            other => panic!("expected pagination error, got {other:?}"),
        }
        assert!(walker.next().is_none());
    }

    #[test]
    fn resumes_after_a_given_cursor() {
        let walker = PageWalker::resume_from("c1", three_pages);
        let items = walker.collect::<Result<Vec<_>, _>>().expect("items");
        assert_eq!(items, vec![3, 4, 5]);
    }

    #[test]
    fn rejects_more_results_without_cursor() {
        let mut walker = PageWalker::new(|_| {
            Ok(Page {
                items: vec![1],
                next_cursor: None,
                has_more: true,
            })
        });
        match walker.next() {
            Some(Err(SyncError::Pagination { last_cursor, source })) => {
                assert_eq!(last_cursor, None);
                assert!(matches!(*source, SyncError::Protocol(_)));
            }
            other => panic!("expected pagination error, got {other:?}"),
        }
        assert!(walker.next().is_none());
    }

    #[test]
    fn rejects_repeated_cursor() {
        let walker = PageWalker::new(|_| Ok(Page::more(vec![1], "same")));
        let result = walker.collect::<Result<Vec<_>, _>>();
        assert!(matches!(result, Err(SyncError::Pagination { .. })));
    }
}
