//! The canonical update record shared by both sources.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bill types tracked on the chamber side, in the order they are scanned.
pub const BILL_TYPES: &[&str] = &["PL", "PLV", "MPV", "PLP", "PEC"];

/// Composite natural key of an update: one procedural step of one bill.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpdateKey {
    pub bill_type: String,
    pub number: u32,
    pub year: i32,
    /// Nth recorded step of the bill. Forum titles may omit it.
    pub sequence: Option<u32>,
}

impl UpdateKey {
    pub fn new(bill_type: impl Into<String>, number: u32, year: i32, sequence: Option<u32>) -> Self {
        Self {
            bill_type: bill_type.into(),
            number,
            year,
            sequence,
        }
    }
}

/// Renders as `PL 1234/2019 (3)`, or `PL 1234/2019` without a sequence.
impl fmt::Display for UpdateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.bill_type, self.number, self.year)?;
        if let Some(seq) = self.sequence {
            write!(f, " ({seq})")?;
        }
        Ok(())
    }
}

/// One procedural step of a bill, as known from the chamber API, the forum,
/// or both after reconciliation.
///
/// `None` means "not known from this source". Only `party` may be
/// permanently `None` (authors that are not deputies have no party).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub key: UpdateKey,
    pub author: Option<String>,
    pub party: Option<String>,
    /// Bill summary (ementa).
    pub summary: Option<String>,
    /// Step dispatch text (despacho). Chamber only.
    pub dispatch: Option<String>,
    /// Step-type description; the forum stores it as the post's category label.
    pub step_kind: Option<String>,
    /// Tracking page of the bill on the chamber website.
    pub bill_url: Option<String>,
    /// When the step happened, in the chamber's local time.
    pub occurred_at: Option<NaiveDateTime>,
    pub posted_at: Option<DateTime<Utc>>,
    pub post_url: Option<String>,
    pub ups: Option<i64>,
    pub downs: Option<i64>,
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub flagged: bool,
    /// Records that caused this one to be flagged.
    #[serde(default)]
    pub related: Vec<Update>,
}

/// Number of fields reported by [`Update::presence`].
pub const RECONCILED_FIELDS: usize = 12;

impl Update {
    /// An update with only its key known.
    pub fn new(key: UpdateKey) -> Self {
        Self {
            key,
            author: None,
            party: None,
            summary: None,
            dispatch: None,
            step_kind: None,
            bill_url: None,
            occurred_at: None,
            posted_at: None,
            post_url: None,
            ups: None,
            downs: None,
            comment_count: None,
            flagged: false,
            related: Vec::new(),
        }
    }

    /// Whether the update already has a forum post.
    pub fn is_posted(&self) -> bool {
        self.post_url.is_some()
    }

    /// Presence of every field that takes part in reconciliation.
    ///
    /// `party` is left out: its absence carries no signal.
    pub fn presence(&self) -> [(&'static str, bool); RECONCILED_FIELDS] {
        [
            ("sequence", self.key.sequence.is_some()),
            ("author", self.author.is_some()),
            ("summary", self.summary.is_some()),
            ("dispatch", self.dispatch.is_some()),
            ("step_kind", self.step_kind.is_some()),
            ("bill_url", self.bill_url.is_some()),
            ("occurred_at", self.occurred_at.is_some()),
            ("posted_at", self.posted_at.is_some()),
            ("post_url", self.post_url.is_some()),
            ("ups", self.ups.is_some()),
            ("downs", self.downs.is_some()),
            ("comment_count", self.comment_count.is_some()),
        ]
    }
}
