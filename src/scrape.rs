use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::feed::{fetch_feed, FetchedFeed};
use crate::models::{Feed, NewPost, Post, PostInsert};

/// Publication dates must carry a numeric timezone offset,
/// e.g. "Mon, 02 Jan 2006 15:04:05 -0700".
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

pub fn parse_pub_date(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_str(raw, PUB_DATE_FORMAT)
        .with_context(|| format!("invalid pubDate '{raw}'"))?;

    Ok(parsed.with_timezone(&Utc))
}

/// One aggregator tick: pick the feed due next, fetch it and store any
/// posts that aren't in the database yet.
pub async fn scrape_feeds(db: &SqlitePool) -> Result<()> {
    let feed = Feed::next_to_fetch(db)
        .await?
        .context("no feeds in database to fetch")?;

    info!("scraping feed {}", feed.name);

    // Marked before the fetch is attempted, so a slow or failing fetch
    // doesn't leave this feed first in line on the next tick.
    Feed::mark_fetched(db, feed.id).await?;

    let fetched = fetch_feed(&feed.url)
        .await
        .with_context(|| format!("fetching feed {}", feed.url))?;

    store_posts(db, &feed, &fetched).await
}

/// Persist the items of a fetched feed in document order.
///
/// An item whose URL is already stored is skipped. An item with a
/// malformed publication date fails the rest of the batch.
pub async fn store_posts(db: &SqlitePool, feed: &Feed, fetched: &FetchedFeed) -> Result<()> {
    for item in &fetched.items {
        let Some(link) = item.link.as_deref() else {
            debug!("got item without link in feed {}, skipping", feed.name);
            continue;
        };

        let raw_date = item.pub_date.as_deref().unwrap_or_default();
        let published_at = parse_pub_date(raw_date)?;

        let new_post = NewPost {
            url: link.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            published_at,
            feed_id: feed.id,
        };

        match Post::create(db, new_post).await? {
            PostInsert::Inserted(post) => {
                info!(
                    "stored post '{}' ({})",
                    post.title.as_deref().unwrap_or("untitled"),
                    post.url
                );
            }
            PostInsert::DuplicateUrl => {
                debug!("post url {link} already in database, ignoring");
            }
        }
    }

    Ok(())
}

/// Run the aggregator until a shutdown message arrives.
///
/// The first tick fires immediately, later ticks once per `interval`.
/// Ticks never overlap, and a failed tick is reported without stopping
/// the loop. Missed ticks are skipped rather than bursted.
pub async fn run_loop(db: SqlitePool, interval: Duration, mut shutdown: mpsc::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = scrape_feeds(&db).await {
                    warn!("scrape failed: {err:#}");
                }
            }
            _ = shutdown.recv() => {
                info!("aggregator stopped");
                break;
            }
        }
    }
}
