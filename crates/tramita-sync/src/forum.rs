//! Forum extractor: rebuilds updates from previously published posts.
//!
//! A post title looks like `[Author - PARTY] PL 2655/2022 (3): summary`. The
//! step date is not in the title; it comes from the publishing identity's
//! first comment, which opens with `Despacho (dd/mm/yyyy)`.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, error, info, warn};
use tramita_core::{DateWindow, Update, UpdateKey};

use crate::FetchError;

/// Title shapes, most specific first. The first one that matches wins.
static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    const KEY_AND_SUMMARY: &str = r"\] (?P<type>[A-Z]+) (?P<number>[0-9]+)/(?P<year>[0-9]+)(?: \((?P<sequence>[0-9]+)\))?: (?P<summary>.*)$";
    [
        r"^\[(?P<author>[^\]]*) - (?P<party>[^\]]*)",
        r"^\[(?P<author>[^\]]*)- (?P<party>[^\]]*)",
        r"^\[(?P<author>[^\]]*)",
    ]
    .iter()
    .map(|byline| Regex::new(&format!("{byline}{KEY_AND_SUMMARY}")).expect("valid title pattern"))
    .collect()
});

static DISPATCH_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Despacho \((?P<date>[0-9]+/[0-9]+/[0-9]+)\)").expect("valid marker pattern")
});

/// A published post, as listed newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ForumPost {
    pub id: String,
    pub title: String,
    /// Link target: the bill's tracking page.
    pub url: Option<String>,
    pub shortlink: String,
    pub created_at: DateTime<Utc>,
    pub ups: i64,
    pub downs: i64,
    pub num_comments: u64,
    /// Category label: the step-type description.
    pub flair: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub author: Option<String>,
    pub body: String,
}

/// One page of the newest-first post stream.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<ForumPost>,
    /// Cursor of the next (older) page, absent on the last one.
    pub after: Option<String>,
}

/// Read access to the community the updates are published in.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn newest(&self, after: Option<&str>) -> Result<PostPage, FetchError>;
    async fn comments(&self, post_id: &str) -> Result<Vec<Comment>, FetchError>;
}

/// Fields recovered from a post title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    pub key: UpdateKey,
    pub author: String,
    pub party: Option<String>,
    pub summary: String,
}

/// Match a title against the known shapes, in order.
pub fn parse_title(title: &str) -> Option<TitleMatch> {
    let captures = TITLE_PATTERNS.iter().find_map(|pattern| pattern.captures(title))?;

    let number = captures["number"].parse().ok()?;
    let year = captures["year"].parse().ok()?;
    let sequence = match captures.name("sequence") {
        Some(seq) => Some(seq.as_str().parse().ok()?),
        None => None,
    };
    let party = captures
        .name("party")
        .map(|p| p.as_str().trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Some(TitleMatch {
        key: UpdateKey::new(&captures["type"], number, year, sequence),
        author: captures["author"].trim().to_string(),
        party,
        summary: captures["summary"].to_string(),
    })
}

/// Date in a `Despacho (dd/mm/yyyy)` comment body.
pub fn parse_dispatch_date(body: &str) -> Option<NaiveDate> {
    let captures = DISPATCH_MARKER.captures(body)?;
    NaiveDate::parse_from_str(&captures["date"], "%d/%m/%Y").ok()
}

pub struct ForumSource<S> {
    source: S,
    publisher: String,
}

impl<S: PostSource> ForumSource<S> {
    /// `publisher` is the account that posts updates and writes the
    /// `Despacho` comments.
    pub fn new(source: S, publisher: impl Into<String>) -> Self {
        Self {
            source,
            publisher: publisher.into(),
        }
    }

    /// Updates already published for steps in the window.
    ///
    /// Posts are read newest first. Posts for steps after the window are
    /// skipped; the first post for a step before the window ends the scan.
    /// Posts without a readable step date are kept, flagged.
    pub async fn updates(&self, window: &DateWindow) -> Vec<Update> {
        info!(%window, "scanning forum posts");
        let mut updates = Vec::new();
        let mut scanned = 0usize;
        let mut after: Option<String> = None;

        'pages: loop {
            let page = match self.source.newest(after.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    error!(error = %err, scanned, "listing posts failed, keeping what was read");
                    break;
                }
            };

            for post in &page.posts {
                scanned += 1;
                let Some(update) = self.infer(post).await else {
                    info!(post = %post.id, title = %post.title, "not an update");
                    continue;
                };

                match update.occurred_at.map(|at| at.date()) {
                    None => {
                        error!(post = %post.id, url = %post.shortlink, "post has no step date");
                        updates.push(update);
                    }
                    Some(day) if window.is_before_start(day) => {
                        info!(key = %update.key, url = %post.shortlink, "reached posts older than the window");
                        break 'pages;
                    }
                    Some(day) if window.is_after_end(day) => {
                        debug!(key = %update.key, url = %post.shortlink, "newer than the window, skipping");
                    }
                    Some(_) => updates.push(update),
                }
            }

            match page.after {
                Some(cursor) if !page.posts.is_empty() => after = Some(cursor),
                _ => break,
            }
        }

        info!(scanned, count = updates.len(), "forum scan complete");
        updates
    }

    /// Rebuild an update from a post, or `None` when the title is not one of
    /// ours.
    pub async fn infer(&self, post: &ForumPost) -> Option<Update> {
        let title = parse_title(&post.title)?;
        let occurred_on = self.dispatch_date(post).await;

        Some(Update {
            author: Some(title.author),
            party: title.party,
            summary: Some(title.summary),
            dispatch: None,
            step_kind: post.flair.clone(),
            bill_url: post.url.clone(),
            occurred_at: occurred_on.and_then(|day| day.and_hms_opt(0, 0, 0)),
            posted_at: Some(post.created_at),
            post_url: Some(post.shortlink.clone()),
            ups: Some(post.ups),
            downs: Some(post.downs),
            comment_count: Some(post.num_comments),
            flagged: occurred_on.is_none(),
            related: Vec::new(),
            key: title.key,
        })
    }

    async fn dispatch_date(&self, post: &ForumPost) -> Option<NaiveDate> {
        let comments = match self.source.comments(&post.id).await {
            Ok(comments) => comments,
            Err(err) => {
                warn!(post = %post.id, error = %err, "reading comments failed");
                return None;
            }
        };
        comments
            .iter()
            .filter(|comment| comment.author.as_deref() == Some(self.publisher.as_str()))
            .find_map(|comment| parse_dispatch_date(&comment.body))
    }
}
