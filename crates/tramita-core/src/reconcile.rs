//! Reconciliation of chamber-side and forum-side updates.
//!
//! The two sources are complementary: the chamber API knows the procedural
//! content of a step, the forum knows whether and how it was published. A
//! merge of two records with the same key normally knits the two halves into
//! one record. When both records lack the same field, they are not two halves
//! of one update but two copies of the same half (a pagination artifact on the
//! chamber side, or two posts whose titles map to the same key). Such pairs
//! are flagged for manual review and never filled.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::{Update, UpdateKey};

/// Result of merging an incoming update into the canonical one for its key.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Both records knitted into one; no field was missing on both sides.
    Merged(Update),
    /// Both records lack `missing`. `record` is the incoming update, flagged,
    /// with `conflicting_with` appended to its `related` list.
    Flagged {
        record: Update,
        conflicting_with: Update,
        missing: Vec<&'static str>,
    },
}

impl MergeOutcome {
    pub fn record(&self) -> &Update {
        match self {
            MergeOutcome::Merged(record) | MergeOutcome::Flagged { record, .. } => record,
        }
    }

    pub fn into_record(self) -> Update {
        match self {
            MergeOutcome::Merged(record) | MergeOutcome::Flagged { record, .. } => record,
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, MergeOutcome::Flagged { .. })
    }
}

/// Merge `incoming` with `existing`, both carrying the same key.
///
/// The returned record is built from `incoming`: it becomes the canonical
/// instance for the key. Present values are never overwritten.
pub fn merge(incoming: Update, existing: &Update) -> MergeOutcome {
    debug_assert_eq!(incoming.key, existing.key);

    let missing = missing_on_both(&incoming, existing);
    if !missing.is_empty() {
        error!(
            key = %incoming.key,
            ?missing,
            incoming_post = incoming.post_url.as_deref().unwrap_or("-"),
            existing_post = existing.post_url.as_deref().unwrap_or("-"),
            "field missing on both records, probably a duplicate"
        );
        let mut record = incoming;
        record.flagged = true;
        if !record.related.contains(existing) {
            record.related.push(existing.clone());
        }
        return MergeOutcome::Flagged {
            record,
            conflicting_with: existing.clone(),
            missing,
        };
    }

    let mut record = incoming;
    let key = record.key.clone();
    fill(&key, "author", &mut record.author, &existing.author);
    fill(&key, "party", &mut record.party, &existing.party);
    fill(&key, "summary", &mut record.summary, &existing.summary);
    fill(&key, "dispatch", &mut record.dispatch, &existing.dispatch);
    fill(&key, "step_kind", &mut record.step_kind, &existing.step_kind);
    fill(&key, "bill_url", &mut record.bill_url, &existing.bill_url);
    fill(&key, "occurred_at", &mut record.occurred_at, &existing.occurred_at);
    fill(&key, "posted_at", &mut record.posted_at, &existing.posted_at);
    fill(&key, "post_url", &mut record.post_url, &existing.post_url);
    fill(&key, "ups", &mut record.ups, &existing.ups);
    fill(&key, "downs", &mut record.downs, &existing.downs);
    fill(&key, "comment_count", &mut record.comment_count, &existing.comment_count);

    record.flagged |= existing.flagged;
    for related in &existing.related {
        if !record.related.contains(related) {
            record.related.push(related.clone());
        }
    }

    MergeOutcome::Merged(record)
}

fn missing_on_both(a: &Update, b: &Update) -> Vec<&'static str> {
    a.presence()
        .iter()
        .zip(b.presence().iter())
        .filter(|((_, in_a), (_, in_b))| !in_a && !in_b)
        .map(|((name, _), _)| *name)
        .collect()
}

fn fill<T: Clone>(key: &UpdateKey, field: &'static str, mine: &mut Option<T>, theirs: &Option<T>) {
    if mine.is_none() && theirs.is_some() {
        debug!(key = %key, field, "taking value from counterpart");
        *mine = theirs.clone();
    }
}

/// Canonical mapping from key to update, for one reconciliation pass.
///
/// Keys come out in first-seen order. For a key seen more than once, the
/// latest incoming instance is the one that survives (carrying the merged
/// fields, or the flag and the cross-reference).
#[derive(Debug, Default)]
pub struct Reconciler {
    order: Vec<UpdateKey>,
    canonical: HashMap<UpdateKey, Update>,
    flagged_merges: usize,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, incoming: Update) {
        match self.canonical.remove(&incoming.key) {
            None => {
                self.order.push(incoming.key.clone());
                self.canonical.insert(incoming.key.clone(), incoming);
            }
            Some(existing) => {
                let outcome = merge(incoming, &existing);
                if outcome.is_flagged() {
                    self.flagged_merges += 1;
                }
                let record = outcome.into_record();
                self.canonical.insert(record.key.clone(), record);
            }
        }
    }

    pub fn get(&self, key: &UpdateKey) -> Option<&Update> {
        self.canonical.get(key)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Number of merges that ended flagged so far.
    pub fn flagged_merges(&self) -> usize {
        self.flagged_merges
    }

    pub fn into_updates(mut self) -> Vec<Update> {
        self.order
            .iter()
            .filter_map(|key| self.canonical.remove(key))
            .collect()
    }
}

impl Extend<Update> for Reconciler {
    fn extend<I: IntoIterator<Item = Update>>(&mut self, iter: I) {
        for update in iter {
            self.push(update);
        }
    }
}

/// Reconcile candidates in the given order, one record per key.
pub fn reconcile(candidates: impl IntoIterator<Item = Update>) -> Vec<Update> {
    let mut reconciler = Reconciler::new();
    reconciler.extend(candidates);
    reconciler.into_updates()
}
