use tracing::{debug, warn};

use crate::api::MessagingApi;
use crate::classify::sanitize_file_name;
use crate::error::Result;
use crate::model::{Conversation, ConversationItem, PeerKind};

/// Walks the conversation list page by page with offset pagination.
///
/// Pages come back raw; [`ConversationEnumerator::resolve`] does the per-item
/// lookups, so callers only pay for conversations they may actually use.
/// Stops once the offset reaches the total the platform reported, on an empty
/// page, or on a page that lacks `items` altogether. The last case is recorded
/// so the caller can abandon the run instead of processing a partial list.
pub struct ConversationEnumerator<'a, A: MessagingApi + ?Sized> {
    api: &'a A,
    page_size: u32,
    offset: u32,
    total: Option<u64>,
    finished: bool,
    malformed: bool,
}

impl<'a, A: MessagingApi + ?Sized> ConversationEnumerator<'a, A> {
    pub fn new(api: &'a A, page_size: u32) -> Self {
        Self {
            api,
            page_size,
            offset: 0,
            total: None,
            finished: false,
            malformed: false,
        }
    }

    /// Total reported by the most recent page.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn hit_malformed_page(&self) -> bool {
        self.malformed
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<ConversationItem>>> {
        if self.finished {
            return Ok(None);
        }
        if matches!(self.total, Some(total) if u64::from(self.offset) >= total) {
            self.finished = true;
            return Ok(None);
        }

        let page = self.api.list_conversations(self.offset, self.page_size).await?;
        self.offset += self.page_size;
        self.total = Some(page.count);

        let Some(items) = page.items else {
            warn!(offset = self.offset, "conversations page without items, stopping");
            self.malformed = true;
            self.finished = true;
            return Ok(None);
        };
        if items.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        Ok(Some(items))
    }

    /// Builds the display title and folder name, and counts the messages.
    pub async fn resolve(&self, item: ConversationItem) -> Result<Conversation> {
        let peer = item.conversation.peer;
        let peer_id = peer.id;
        let (title, folder) = match &peer.kind {
            PeerKind::User => {
                let user = self.api.lookup_user(peer_id).await?;
                (
                    format!("user {peer_id} ({} {})", user.first_name, user.last_name),
                    format!("{peer_id}_{}_{}", user.first_name, user.last_name),
                )
            }
            PeerKind::Chat => {
                let chat_title = item
                    .conversation
                    .chat_settings
                    .map(|s| s.title)
                    .unwrap_or_default();
                (
                    format!("chat {peer_id} ({chat_title})"),
                    format!("{peer_id}_{chat_title}"),
                )
            }
            PeerKind::Group => (
                format!("group {peer_id} (groups are not supported)"),
                format!("{peer_id}_group"),
            ),
            PeerKind::Other(tag) => (
                format!("{tag} {peer_id} ({tag}s are not supported)"),
                format!("{peer_id}_{tag}"),
            ),
        };

        // Groups never get processed, so their history is not worth a request.
        let message_count = if peer.kind == PeerKind::Group {
            0
        } else {
            self.api.get_history(peer_id, -1, 1).await?.count
        };
        debug!(peer_id, %title, message_count, "conversation resolved");

        Ok(Conversation {
            peer_id,
            kind: peer.kind,
            title,
            folder_name: sanitize_file_name(&folder),
            message_count,
        })
    }
}
