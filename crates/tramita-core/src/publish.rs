//! Publication planning: which reconciled updates to post or take down, and
//! what their posts look like.
//!
//! Submitting and removing posts is left to the caller. The drafts produced
//! here are shaped so that the forum extractor recognises them on the next
//! run: the title carries the key, author and party, and the first comment
//! opens with the `Despacho (dd/mm/yyyy)` marker.

use tracing::warn;

use crate::{CoreError, Update};

/// Forum limit on post titles, in characters.
pub const MAX_TITLE_CHARS: usize = 300;
/// Forum limit on category labels, in characters.
pub const MAX_FLAIR_CHARS: usize = 64;

/// Marker that opens the publishing identity's comment on every post.
pub const DISPATCH_MARKER: &str = "Despacho";

/// Updates that still need a post: not flagged and not posted yet.
pub fn select_for_publishing(updates: &[Update]) -> Vec<&Update> {
    updates
        .iter()
        .filter(|update| {
            if update.flagged {
                warn!(key = %update.key, "flagged, not publishing");
                return false;
            }
            if let Some(url) = &update.post_url {
                warn!(key = %update.key, url = %url, "already posted");
                return false;
            }
            true
        })
        .collect()
}

/// Updates that have a post that could be taken down.
pub fn select_for_removal(updates: &[Update]) -> Vec<&Update> {
    updates.iter().filter(|update| update.is_posted()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    /// Category label: the step-type description.
    pub flair: Option<String>,
    /// Body of the first comment.
    pub comment: String,
    /// Link target of the post: the bill's tracking page.
    pub link: Option<String>,
}

impl PostDraft {
    pub fn from_update(update: &Update) -> Result<Self, CoreError> {
        let missing = |field| CoreError::Draft {
            key: update.key.to_string(),
            field,
        };
        if update.key.sequence.is_none() {
            return Err(missing("sequence"));
        }
        let author = update.author.as_deref().ok_or_else(|| missing("author"))?;
        let occurred_at = update.occurred_at.ok_or_else(|| missing("occurred_at"))?;

        let byline = match &update.party {
            Some(party) => format!("{author} - {party}"),
            None => author.to_string(),
        };
        let title = truncate(
            &format!(
                "[{byline}] {}: {}",
                update.key,
                update.summary.as_deref().unwrap_or_default()
            ),
            MAX_TITLE_CHARS,
        );
        let flair = update
            .step_kind
            .as_deref()
            .map(|kind| truncate(kind, MAX_FLAIR_CHARS));
        let comment = format!(
            "{DISPATCH_MARKER} ({})\n\n{}",
            occurred_at.format("%d/%m/%Y"),
            update.dispatch.as_deref().unwrap_or_default()
        );

        Ok(Self {
            title,
            flair,
            comment,
            link: update.bill_url.clone(),
        })
    }
}

/// Cut `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
