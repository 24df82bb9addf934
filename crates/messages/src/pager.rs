//! Newest-first paging over the encrypted history.

use std::collections::VecDeque;

use crate::{
    error::Result,
    model::Message,
    repository::EncryptedRepository,
    store::PageCursor,
};

/// Pages fetched on the first load.
pub const INITIAL_LOAD_PAGES: usize = 2;
/// Pages kept in the materialized window before the oldest-loaded are dropped.
pub const MAX_WINDOW_PAGES: usize = 10;

/// Incrementally materializes the history in `(timestamp, id)` descending
/// order.
///
/// Only rows of the page being loaded are decrypted (cache first). The first
/// load fetches two pages; later loads fetch one. The window keeps at most ten
/// pages and drops the earliest loaded (newest) messages once it overflows.
pub struct MessagePager {
    repo: EncryptedRepository,
    page_size: usize,
    cursor: Option<PageCursor>,
    window: VecDeque<Message>,
    unreadable: Vec<i64>,
    exhausted: bool,
}

impl MessagePager {
    pub(crate) fn new(repo: EncryptedRepository, page_size: usize) -> Self {
        Self {
            repo,
            page_size: page_size.max(1),
            cursor: None,
            window: VecDeque::new(),
            unreadable: Vec::new(),
            exhausted: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_window(&self) -> usize {
        self.page_size * MAX_WINDOW_PAGES
    }

    /// Load the next page. `None` once the oldest message has been reached.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Message>>> {
        if self.exhausted {
            return Ok(None);
        }

        let limit = if self.cursor.is_none() {
            self.page_size * INITIAL_LOAD_PAGES
        } else {
            self.page_size
        };

        let generation = self.repo.cache().generation();
        let rows = self.repo.store().query_page(self.cursor, limit).await?;
        if rows.len() < limit {
            self.exhausted = true;
        }
        let Some(last) = rows.last() else {
            return Ok(None);
        };
        self.cursor = Some(PageCursor::from(last));

        let mut page = Vec::with_capacity(rows.len());
        for row in rows {
            match self.repo.open_row(row, generation) {
                Ok(message) => page.push(message),
                Err(e) => match e.unreadable_id() {
                    Some(id) => self.unreadable.push(id),
                    None => return Err(e),
                },
            }
        }

        self.window.extend(page.iter().cloned());
        let overflow = self.window.len().saturating_sub(self.max_window());
        self.window.drain(..overflow);

        Ok(Some(page))
    }

    /// Messages currently materialized, newest first.
    pub fn window(&self) -> impl Iterator<Item = &Message> {
        self.window.iter()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Ids skipped because they failed to decrypt.
    pub fn unreadable(&self) -> &[i64] {
        &self.unreadable
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Start over from the newest message.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.window.clear();
        self.unreadable.clear();
        self.exhausted = false;
    }
}
