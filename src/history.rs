use tracing::{debug, warn};

use crate::api::MessagingApi;
use crate::error::Result;
use crate::model::Message;

/// Cursor value meaning "nothing seen yet, start from the latest message".
pub const NO_CURSOR: i64 = -1;

/// Cursor-paginated walk over one conversation's top-level messages.
///
/// The platform includes the cursor message itself at the head of the next
/// page, so every page drops items whose id equals the previous cursor. A page
/// shorter than the requested size ends the walk, and so does a page that fails
/// to move the cursor. Once finished it stays finished.
pub struct HistoryPaginator<'a, A: MessagingApi + ?Sized> {
    api: &'a A,
    peer_id: i64,
    page_size: u32,
    cursor: i64,
    finished: bool,
    requests: usize,
    total: u64,
}

impl<'a, A: MessagingApi + ?Sized> HistoryPaginator<'a, A> {
    pub fn new(api: &'a A, peer_id: i64, page_size: u32) -> Self {
        Self {
            api,
            peer_id,
            page_size,
            cursor: NO_CURSOR,
            finished: false,
            requests: 0,
            total: 0,
        }
    }

    /// Message count from the most recent page.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Message>>> {
        if self.finished {
            return Ok(None);
        }

        let page = self
            .api
            .get_history(self.peer_id, self.cursor, self.page_size)
            .await?;
        self.requests += 1;
        self.total = page.count;
        let items = page.items.unwrap_or_default();

        let previous = self.cursor;
        let full = items.len() >= self.page_size as usize;
        self.finished = !full;
        match items.last() {
            Some(last) if last.id != previous => self.cursor = last.id,
            _ => {
                if full {
                    warn!(
                        peer_id = self.peer_id,
                        cursor = previous,
                        total = self.total,
                        "full history page did not move the cursor, stopping early"
                    );
                }
                self.finished = true;
            }
        }
        debug!(
            peer_id = self.peer_id,
            received = items.len(),
            cursor = self.cursor,
            "history page"
        );

        let fresh: Vec<Message> = items.into_iter().filter(|m| m.id != previous).collect();
        if fresh.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        Ok(Some(fresh))
    }
}
