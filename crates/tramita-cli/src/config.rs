//! Run configuration, read from the environment (and a `.env` file when
//! present).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tramita_sync::{RedditCredentials, RetryPolicy, camara};

const DEFAULT_ALLOW_LIST: &str = "tramitacoes-selecionadas.txt";
const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_DEADLINE_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub subreddit: String,
    pub credentials: RedditCredentials,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub camara_api_url: String,
    pub allow_list_path: PathBuf,
    pub user_agent: String,
    /// `None` retries rate-limited requests forever.
    pub max_retries: Option<u32>,
    pub deadline: Duration,
    /// Present when the forum source is in use.
    pub reddit: Option<RedditConfig>,
}

impl Config {
    /// Load from the process environment. Reddit settings are only required
    /// when `with_reddit` is set.
    pub fn from_env(with_reddit: bool) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(with_reddit, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        with_reddit: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).with_context(|| format!("environment variable {name} must be set"))
        };

        let user_agent = var("REDDIT_USER_AGENT")
            .unwrap_or_else(|| format!("tramita/{}", env!("CARGO_PKG_VERSION")));

        let max_retries = match var("TRAMITA_MAX_RETRIES") {
            None => Some(DEFAULT_MAX_RETRIES),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => bail!("TRAMITA_MAX_RETRIES must be a number, got {raw:?}"),
            },
        };

        let deadline_secs = match var("TRAMITA_DEADLINE_SECS") {
            None => DEFAULT_DEADLINE_SECS,
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("TRAMITA_DEADLINE_SECS must be a number, got {raw:?}"))?,
        };

        let reddit = if with_reddit {
            Some(RedditConfig {
                subreddit: required("SUBREDDIT")?,
                credentials: RedditCredentials {
                    client_id: required("REDDIT_CLIENT_ID")?,
                    client_secret: required("REDDIT_CLIENT_SECRET")?,
                    username: required("REDDIT_USERNAME")?,
                    password: required("REDDIT_PASSWORD")?,
                    user_agent: user_agent.clone(),
                },
            })
        } else {
            None
        };

        let config = Self {
            camara_api_url: var("CAMARA_API_URL")
                .unwrap_or_else(|| camara::DEFAULT_BASE_URL.to_string()),
            allow_list_path: var("TRAMITA_ALLOW_LIST")
                .unwrap_or_else(|| DEFAULT_ALLOW_LIST.to_string())
                .into(),
            user_agent,
            max_retries,
            deadline: Duration::from_secs(deadline_secs),
            reddit,
        };
        config.log();
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    fn log(&self) {
        tracing::info!(
            camara_api_url = %self.camara_api_url,
            allow_list = %self.allow_list_path.display(),
            max_retries = ?self.max_retries,
            deadline_secs = self.deadline.as_secs(),
            subreddit = self.reddit.as_ref().map(|r| r.subreddit.as_str()).unwrap_or("<not used>"),
            "config loaded"
        );
    }
}
