use serde::Serialize;
use tracing::{error, info};

use super::FeedController;
use super::state::FeedState;

/// Outcome of one feed within a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct FeedOutcome {
    pub feed_key: String,
    pub state: FeedState,
    /// Set when this feed failed. Other feeds in the batch are unaffected.
    pub error: Option<String>,
    pub retryable: bool,
}

impl FeedOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs [`FeedController::download_or_build`] for each feed in order.
///
/// A failing feed, including one with a corrupt archive, is logged and
/// recorded; the batch moves on to the next feed.
pub async fn download_or_build_all(controllers: &mut [FeedController]) -> Vec<FeedOutcome> {
    let mut outcomes = Vec::with_capacity(controllers.len());
    for controller in controllers.iter_mut() {
        let result = controller.download_or_build().await;
        let outcome = FeedOutcome {
            feed_key: controller.key().to_string(),
            state: controller.state(),
            retryable: result.as_ref().err().is_some_and(|e| e.is_retryable()),
            error: result.err().map(|e| e.to_string()),
        };
        match &outcome.error {
            Some(e) => error!(feed_key = %outcome.feed_key, error = %e, "Feed failed"),
            None => info!(feed_key = %outcome.feed_key, state = %outcome.state, "Feed ready"),
        }
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    info!(feeds = outcomes.len(), failed, "Batch finished");
    outcomes
}
