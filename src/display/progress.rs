//! Progress bars for imports and federated searches.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::search::{SearchEvent, SearchEvents};

/// Create a styled progress bar.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate progress.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .map(|style| style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Advances `bar` once per collection that finished, failed or timed out.
///
/// The task ends when the federation reports completion or the channel closes.
pub fn track_federation(events: &SearchEvents, bar: ProgressBar) -> JoinHandle<ProgressBar> {
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(SearchEvent::CollectionStarted { .. }) => {}
                Ok(SearchEvent::CollectionFinished { collection, hits, .. }) => {
                    bar.set_message(format!("collection {collection}: {hits} hits"));
                    bar.inc(1);
                }
                Ok(SearchEvent::CollectionFailed { collection, .. }) => {
                    bar.set_message(format!("collection {collection} failed"));
                    bar.inc(1);
                }
                Ok(SearchEvent::CollectionTimedOut { collection }) => {
                    bar.set_message(format!("collection {collection} timed out"));
                    bar.inc(1);
                }
                Ok(SearchEvent::Completed { hits, .. }) => {
                    bar.finish_with_message(format!("{hits} hits"));
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("[display] progress skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        bar
    })
}
