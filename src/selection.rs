use std::collections::HashSet;

use tracing::{debug, info};

use crate::api::MessagingApi;
use crate::config::Config;
use crate::conversations::ConversationEnumerator;
use crate::error::Result;
use crate::model::{Conversation, Peer, PeerKind};
use crate::prompt::Prompter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    AllowList(HashSet<i64>),
    Interactive,
}

impl SelectionMode {
    pub fn from_config(config: &Config) -> Self {
        if config.uses_allow_list() {
            SelectionMode::AllowList(config.peer_ids_to_process.iter().copied().collect())
        } else {
            SelectionMode::Interactive
        }
    }

    /// Whether `peer` can be selected at all, judged before any lookups.
    /// False for groups and, in allow-list mode, for peers not on the list.
    pub fn may_select(&self, peer: &Peer) -> bool {
        if peer.kind == PeerKind::Group {
            return false;
        }
        match self {
            SelectionMode::AllowList(ids) => ids.contains(&peer.id),
            SelectionMode::Interactive => true,
        }
    }

    /// Groups are never selected, whatever the mode says.
    pub fn decide<P: Prompter + ?Sized>(
        &self,
        conversation: &Conversation,
        prompter: &mut P,
    ) -> Result<bool> {
        if conversation.kind == PeerKind::Group {
            return Ok(false);
        }
        match self {
            SelectionMode::AllowList(ids) => Ok(ids.contains(&conversation.peer_id)),
            SelectionMode::Interactive => prompter.ask_yes_no(&format!(
                "Do you want to process {} with {} messages?",
                conversation.title, conversation.message_count
            )),
        }
    }
}

/// The fully materialized outcome of enumeration plus selection.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub selected: Vec<Conversation>,
    pub enumerated: usize,
    pub total: u64,
    /// False when a conversations page came back without items; the run should stop.
    pub complete: bool,
}

pub async fn select_conversations<A, P>(
    api: &A,
    config: &Config,
    prompter: &mut P,
) -> Result<Selection>
where
    A: MessagingApi + ?Sized,
    P: Prompter + ?Sized,
{
    let mode = SelectionMode::from_config(config);
    let mut enumerator = ConversationEnumerator::new(api, config.conversations_page_size);
    let mut selection = Selection::default();

    while let Some(page) = enumerator.next_page().await? {
        for item in page {
            selection.enumerated += 1;
            let peer = &item.conversation.peer;
            if !mode.may_select(peer) {
                debug!(peer_id = peer.id, "conversation skipped");
                continue;
            }
            let conversation = enumerator.resolve(item).await?;
            if mode.decide(&conversation, prompter)? {
                selection.selected.push(conversation);
            }
        }
    }

    selection.total = enumerator.total().unwrap_or_default();
    selection.complete = !enumerator.hit_malformed_page();
    info!(
        "conversations prepared: {} of {}",
        selection.enumerated, selection.total
    );
    info!("conversations to process: {}", selection.selected.len());
    Ok(selection)
}
