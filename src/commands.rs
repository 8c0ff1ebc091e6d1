use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::models::{Feed, FeedFollow, Post, User};
use crate::scrape::run_loop;

/// Everything a command handler needs: the database pool and the
/// on-disk configuration.
pub struct State {
    pub db: SqlitePool,
    pub config: Config,
}

/// Resolve the configured current user. Commands that act on behalf of
/// a user call this first and take the `User` by value.
pub async fn current_user(state: &State) -> Result<User> {
    let name = &state.config.current_user_name;

    User::find_by_name(&state.db, name)
        .await?
        .with_context(|| format!("current user '{name}' does not exist in database"))
}

pub async fn register(state: &mut State, name: &str) -> Result<()> {
    if User::find_by_name(&state.db, name).await?.is_some() {
        bail!("username '{name}' already exists in database");
    }

    let user = User::create(&state.db, name).await?;

    println!("User database record:");
    println!("\tID = {}", user.id);
    println!("\tCreated At = {}", user.created_at);
    println!("\tUpdated At = {}", user.updated_at);
    println!("\tName = {}", user.name);

    state.config.set_user(&user.name)?;
    println!("username '{}' registered and set as current user", user.name);

    Ok(())
}

pub async fn login(state: &mut State, name: &str) -> Result<()> {
    User::find_by_name(&state.db, name)
        .await?
        .with_context(|| format!("username '{name}' does not exist in database"))?;

    state.config.set_user(name)?;
    println!("current user has been set to '{name}'");

    Ok(())
}

pub async fn reset(state: &State) -> Result<()> {
    User::delete_all(&state.db)
        .await
        .context("unable to remove all users from database")?;

    println!("All users have been removed from database");

    Ok(())
}

pub async fn users(state: &State) -> Result<()> {
    for user in User::all(&state.db).await? {
        if user.name == state.config.current_user_name {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }

    Ok(())
}

pub async fn agg(state: &State, interval: &str) -> Result<()> {
    let interval = humantime::parse_duration(interval)
        .with_context(|| format!("invalid feed update interval '{interval}'"))?;
    if interval.is_zero() {
        bail!("feed update interval must be positive");
    }

    println!(
        "Collecting feeds every {}",
        humantime::format_duration(interval)
    );

    // The sender is held for the lifetime of the command, so the loop
    // runs until the process is terminated.
    let (_shutdown, receiver) = mpsc::channel(1);
    run_loop(state.db.clone(), interval, receiver).await;

    Ok(())
}

pub async fn addfeed(state: &State, user: User, name: &str, url: &str) -> Result<()> {
    if Feed::find_by_name(&state.db, name).await?.is_some() {
        bail!("feed '{name}' already exists in database");
    }

    let feed = Feed::create(&state.db, name, url, user.id).await?;

    println!("Feed database record:");
    println!("\tID = {}", feed.id);
    println!("\tCreated At = {}", feed.created_at);
    println!("\tUpdated At = {}", feed.updated_at);
    println!("\tName = {}", feed.name);
    println!("\tURL = {}", feed.url);
    println!("\tUserID = {}", feed.user_id);
    println!("feed '{}' added\n", feed.name);

    let follow = FeedFollow::create(&state.db, user.id, feed.id).await?;
    print_follow(&follow, &feed.name, &user.name);

    Ok(())
}

pub async fn feeds(state: &State) -> Result<()> {
    for feed in Feed::all(&state.db).await? {
        let owner = User::find_by_id(&state.db, feed.user_id)
            .await?
            .context("feed owner does not exist in database")?;

        println!("* {}", feed.name);
        println!("* {}", feed.url);
        println!("* {}", owner.name);
        println!();
    }

    Ok(())
}

pub async fn follow(state: &State, user: User, url: &str) -> Result<()> {
    let feed = Feed::find_by_url(&state.db, url)
        .await?
        .with_context(|| format!("feed with url '{url}' does not exist in database"))?;

    let follow = FeedFollow::create(&state.db, user.id, feed.id).await?;
    print_follow(&follow, &feed.name, &user.name);

    Ok(())
}

pub async fn following(state: &State) -> Result<()> {
    let feeds = Feed::followed_by(&state.db, &state.config.current_user_name).await?;

    for feed in feeds {
        println!("* {}", feed.name);
    }

    Ok(())
}

pub async fn unfollow(state: &State, user: User, url: &str) -> Result<()> {
    let removed = FeedFollow::delete_for(&state.db, &user.name, url).await?;
    if removed == 0 {
        bail!("'{}' is not following feed '{url}'", user.name);
    }

    println!("feed '{url}' no longer followed by '{}'", user.name);

    Ok(())
}

pub async fn browse(state: &State, user: User, limit: Option<i64>) -> Result<()> {
    let limit = limit.unwrap_or(2);

    for post in Post::for_user(&state.db, &user.name, limit).await? {
        println!("Post database record retrieved:");
        println!("\tID = {}", post.id);
        println!("\tCreated At = {}", post.created_at);
        println!("\tUpdated At = {}", post.updated_at);
        if let Some(title) = &post.title {
            println!("\tTitle = {title}");
        }
        println!("\tUrl = {}", post.url);
        if let Some(description) = &post.description {
            println!("\tDescription = {description}");
        }
        println!("\tPublication Date = {}", post.published_at);
        println!("\tFeed ID = {}", post.feed_id);
        println!();
    }

    Ok(())
}

fn print_follow(follow: &FeedFollow, feed_name: &str, user_name: &str) {
    println!("FeedFollow database record:");
    println!("\tID = {}", follow.id);
    println!("\tCreated At = {}", follow.created_at);
    println!("\tUpdated At = {}", follow.updated_at);
    println!("\tUserID = {}", follow.user_id);
    println!("\tFeedID = {}", follow.feed_id);
    println!("feed '{feed_name}' followed by '{user_name}'");
}
