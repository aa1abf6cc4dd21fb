//! Retrieval layer: rate-limit aware paginated fetching, the chamber API
//! extractor, and the forum extractor.

pub mod camara;
pub mod error;
pub mod fetch;
pub mod forum;
pub mod reddit;

#[cfg(test)]
mod testing;

pub use camara::{Bill, ChamberSource, Step};
pub use error::FetchError;
pub use fetch::{Envelope, Fetcher, Request, Response, RetryPolicy, Transport};
pub use forum::{Comment, ForumPost, ForumSource, PostPage, PostSource, TitleMatch};
pub use reddit::{RedditClient, RedditCredentials};

#[cfg(feature = "http")]
pub use fetch::ReqwestTransport;
