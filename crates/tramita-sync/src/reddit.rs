//! Read-only Reddit client backing the forum extractor.
//!
//! The token request, listings and comment trees all go through the
//! [`Fetcher`], so Reddit's own 429s get the same backoff as the chamber API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::fetch::{Fetcher, Request};
use crate::forum::{Comment, ForumPost, PostPage, PostSource};
use crate::FetchError;

pub const API_URL: &str = "https://oauth.reddit.com";
pub const AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

/// Listing entry; `kind` is `t3` for posts, `t1` for comments, `more` for
/// collapsed branches.
#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    title: String,
    #[serde(default)]
    url: Option<String>,
    created_utc: f64,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    downs: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    link_flair_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
}

impl PostData {
    fn into_post(self) -> ForumPost {
        let created_at =
            DateTime::<Utc>::from_timestamp(self.created_utc as i64, 0).unwrap_or_default();
        ForumPost {
            shortlink: format!("https://redd.it/{}", self.id),
            id: self.id,
            title: self.title,
            url: self.url,
            created_at,
            ups: self.ups,
            downs: self.downs,
            num_comments: self.num_comments,
            flair: self.link_flair_text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

#[derive(Clone)]
pub struct RedditClient {
    fetcher: Fetcher,
    api_url: String,
    subreddit: String,
    token: String,
}

impl RedditClient {
    /// Client for an already obtained bearer token.
    pub fn new(fetcher: Fetcher, api_url: &str, subreddit: &str, token: String) -> Self {
        Self {
            fetcher,
            api_url: api_url.trim_end_matches('/').to_string(),
            subreddit: subreddit.to_string(),
            token,
        }
    }

    /// Obtain a token with the password grant and build a client for
    /// `subreddit`.
    pub async fn login(
        credentials: &RedditCredentials,
        fetcher: Fetcher,
        subreddit: &str,
    ) -> Result<Self, FetchError> {
        Self::login_at(AUTH_URL, API_URL, credentials, fetcher, subreddit).await
    }

    async fn login_at(
        auth_url: &str,
        api_url: &str,
        credentials: &RedditCredentials,
        fetcher: Fetcher,
        subreddit: &str,
    ) -> Result<Self, FetchError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            access_token: Option<String>,
            #[serde(default)]
            error: Option<String>,
        }

        info!(user = %credentials.username, "authenticating with reddit");
        let request = Request::json(auth_url)
            .header("User-Agent", credentials.user_agent.as_str())
            .basic_auth(credentials.client_id.as_str(), credentials.client_secret.as_str())
            .form_field("grant_type", "password")
            .form_field("username", credentials.username.as_str())
            .form_field("password", credentials.password.as_str());

        let response = match fetcher.fetch(&request).await? {
            response if response.is_success() => response,
            response => {
                return Err(FetchError::Auth(format!(
                    "{}: {}",
                    response.status, response.body
                )));
            }
        };

        let token: TokenResponse = response.json()?;
        match (token.access_token, token.error) {
            (Some(access_token), None) => Ok(Self::new(fetcher, api_url, subreddit, access_token)),
            (_, error) => Err(FetchError::Auth(
                error.unwrap_or_else(|| "no access token in response".into()),
            )),
        }
    }

    fn request(&self, path: &str) -> Request {
        Request::json(format!("{}{path}", self.api_url))
            .header("Authorization", format!("Bearer {}", self.token))
    }
}

#[async_trait]
impl PostSource for RedditClient {
    async fn newest(&self, after: Option<&str>) -> Result<PostPage, FetchError> {
        let mut request = self
            .request(&format!("/r/{}/new", self.subreddit))
            .param("limit", PAGE_SIZE)
            .param("raw_json", 1);
        if let Some(after) = after {
            request = request.param("after", after);
        }

        let listing: Listing = self.fetcher.fetch_json(&request).await?;
        let mut posts = Vec::with_capacity(listing.data.children.len());
        for thing in listing.data.children {
            if thing.kind != "t3" {
                continue;
            }
            let data: PostData = serde_json::from_value(thing.data)?;
            posts.push(data.into_post());
        }
        debug!(count = posts.len(), after = ?listing.data.after, "read post page");
        Ok(PostPage {
            posts,
            after: listing.data.after,
        })
    }

    async fn comments(&self, post_id: &str) -> Result<Vec<Comment>, FetchError> {
        let request = self.request(&format!("/comments/{post_id}")).param("raw_json", 1);
        // [post listing, comment listing]
        let listings: Vec<Listing> = self.fetcher.fetch_json(&request).await?;
        let Some(tree) = listings.into_iter().nth(1) else {
            return Ok(Vec::new());
        };

        let mut comments = Vec::new();
        for thing in tree.data.children {
            if thing.kind != "t1" {
                continue;
            }
            let data: CommentData = serde_json::from_value(thing.data)?;
            comments.push(Comment {
                author: data.author,
                body: data.body,
            });
        }
        Ok(comments)
    }
}
