//! Gather candidate updates from the selected sources and reconcile them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use tracing::info;

use tramita_core::{AllowList, DateWindow, Reconciler, Update};
use tramita_sync::{ChamberSource, Fetcher, ForumSource, RedditClient, ReqwestTransport};

use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Posts already published on the subreddit.
    Reddit,
    /// Steps registered by the chamber API.
    Camara,
}

/// Read every selected source for `window` and return the reconciled
/// updates. Forum candidates go in first, so chamber data wins the identity
/// of merged records.
///
/// The allow-list is read before any request is made.
pub async fn collect(
    config: &Config,
    window: &DateWindow,
    sources: &[Source],
) -> anyhow::Result<Vec<Update>> {
    let allow_list = load_allow_list(config, sources)?;

    let transport = Arc::new(ReqwestTransport::new(REQUEST_TIMEOUT, &config.user_agent)?);
    let fetcher = Fetcher::new(transport, config.retry_policy());
    let mut reconciler = Reconciler::new();
    let mut candidates = 0;

    if sources.contains(&Source::Reddit) {
        let reddit = config
            .reddit
            .as_ref()
            .context("reddit source selected without reddit configuration")?;
        let client = RedditClient::login(&reddit.credentials, fetcher.clone(), &reddit.subreddit)
            .await
            .context("reddit login failed")?;
        let forum = ForumSource::new(client, &reddit.credentials.username);

        let updates = forum.updates(window).await;
        info!(source = "reddit", count = updates.len(), %window, "collected");
        candidates += updates.len();
        reconciler.extend(updates);
    }

    if let Some(allow_list) = allow_list {
        let chamber = ChamberSource::new(fetcher, &config.camara_api_url, allow_list);

        let updates = chamber.updates(window).await;
        info!(source = "camara", count = updates.len(), %window, "collected");
        candidates += updates.len();
        reconciler.extend(updates);
    }

    info!(
        candidates,
        canonical = reconciler.len(),
        flagged_merges = reconciler.flagged_merges(),
        "reconciled"
    );
    Ok(reconciler.into_updates())
}

/// The step allow-list, when the chamber source is selected.
fn load_allow_list(config: &Config, sources: &[Source]) -> anyhow::Result<Option<AllowList>> {
    if !sources.contains(&Source::Camara) {
        return Ok(None);
    }
    Ok(Some(AllowList::load(&config.allow_list_path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tramita_core::CoreError;

    fn config(allow_list: &str) -> Config {
        let vars = [
            ("SUBREDDIT", "camaradosdeputados"),
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("REDDIT_USERNAME", "tramita-bot"),
            ("REDDIT_PASSWORD", "hunter2"),
            ("CAMARA_API_URL", "http://127.0.0.1:9/api/v2"),
            ("TRAMITA_ALLOW_LIST", allow_list),
            ("TRAMITA_MAX_RETRIES", "1"),
        ];
        Config::from_lookup(true, |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
        .unwrap()
    }

    fn missing_path() -> String {
        std::env::temp_dir()
            .join(format!("tramita-missing-{}.txt", std::process::id()))
            .display()
            .to_string()
    }

    #[tokio::test]
    async fn missing_allow_list_fails_before_any_request() {
        let config = config(&missing_path());
        let window = DateWindow::single_day(chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        let err = collect(&config, &window, &[Source::Reddit, Source::Camara])
            .await
            .unwrap_err();

        // A login attempt would have surfaced as "reddit login failed".
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::AllowList { .. })
        ));
    }

    #[test]
    fn allow_list_is_only_needed_for_the_chamber() {
        let config = config(&missing_path());
        assert!(load_allow_list(&config, &[Source::Reddit]).unwrap().is_none());
        assert!(load_allow_list(&config, &[Source::Camara]).is_err());
    }
}
