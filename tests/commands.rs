//! Command handler flows: registration, login, follows and browsing.

use std::fs;
use std::str::FromStr;

use chrono::{TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use gator::commands::{self, current_user, State};
use gator::config::Config;
use gator::feed::{FetchedFeed, FetchedItem};
use gator::models::{Feed, Post, User};
use gator::scrape::store_posts;

async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    pool
}

/// A State whose config lives in a temp directory, so `set_user` has a
/// real file to rewrite.
async fn test_state(dir: &tempfile::TempDir) -> State {
    let path = dir.path().join(".gatorconfig.json");
    fs::write(&path, r#"{"db_url": "sqlite::memory:"}"#).unwrap();

    State {
        db: test_pool().await,
        config: Config::read_from(path).unwrap(),
    }
}

#[tokio::test]
async fn register_creates_user_and_sets_current() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    commands::register(&mut state, "lane").await.unwrap();

    assert!(User::find_by_name(&state.db, "lane").await.unwrap().is_some());
    assert_eq!(state.config.current_user_name, "lane");

    // The config file on disk was rewritten too.
    let reread = Config::read_from(dir.path().join(".gatorconfig.json")).unwrap();
    assert_eq!(reread.current_user_name, "lane");

    // Registering the same name twice is an error.
    assert!(commands::register(&mut state, "lane").await.is_err());
}

#[tokio::test]
async fn login_requires_existing_user() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    assert!(commands::login(&mut state, "nobody").await.is_err());

    commands::register(&mut state, "honza").await.unwrap();
    commands::register(&mut state, "lane").await.unwrap();
    commands::login(&mut state, "honza").await.unwrap();
    assert_eq!(state.config.current_user_name, "honza");
}

#[tokio::test]
async fn current_user_fails_when_configured_user_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    state.config.current_user_name = "ghost".to_string();
    assert!(current_user(&state).await.is_err());

    commands::register(&mut state, "real").await.unwrap();
    let user = current_user(&state).await.unwrap();
    assert_eq!(user.name, "real");
}

#[tokio::test]
async fn addfeed_creates_feed_and_auto_follow() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    commands::register(&mut state, "lane").await.unwrap();
    let user = current_user(&state).await.unwrap();

    commands::addfeed(&state, user.clone(), "Blog", "https://blog.example/rss")
        .await
        .unwrap();

    let feed = Feed::find_by_url(&state.db, "https://blog.example/rss")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(feed.name, "Blog");
    assert_eq!(feed.user_id, user.id);
    assert!(feed.last_fetched_at.is_none());

    let followed = Feed::followed_by(&state.db, "lane").await.unwrap();
    assert_eq!(followed.len(), 1);
    assert_eq!(followed[0].id, feed.id);

    // Same feed name again is rejected.
    let user = current_user(&state).await.unwrap();
    assert!(
        commands::addfeed(&state, user, "Blog", "https://other.example/rss")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn follow_and_unfollow_are_per_user() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    commands::register(&mut state, "owner").await.unwrap();
    let owner = current_user(&state).await.unwrap();
    commands::addfeed(&state, owner, "Blog", "https://blog.example/rss")
        .await
        .unwrap();

    commands::register(&mut state, "reader").await.unwrap();
    let reader = current_user(&state).await.unwrap();
    commands::follow(&state, reader.clone(), "https://blog.example/rss")
        .await
        .unwrap();

    assert_eq!(Feed::followed_by(&state.db, "owner").await.unwrap().len(), 1);
    assert_eq!(Feed::followed_by(&state.db, "reader").await.unwrap().len(), 1);

    // Following the same feed twice trips the (user_id, feed_id) constraint.
    assert!(
        commands::follow(&state, reader.clone(), "https://blog.example/rss")
            .await
            .is_err()
    );

    // Unfollowing only removes the reader's relation.
    commands::unfollow(&state, reader.clone(), "https://blog.example/rss")
        .await
        .unwrap();
    assert!(Feed::followed_by(&state.db, "reader").await.unwrap().is_empty());
    assert_eq!(Feed::followed_by(&state.db, "owner").await.unwrap().len(), 1);

    // Unfollowing a feed the user doesn't follow is an error.
    assert!(
        commands::unfollow(&state, reader, "https://blog.example/rss")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn follow_unknown_url_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    commands::register(&mut state, "lane").await.unwrap();
    let user = current_user(&state).await.unwrap();

    assert!(
        commands::follow(&state, user, "https://nope.example/rss")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn posts_for_user_come_from_followed_feeds_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    commands::register(&mut state, "lane").await.unwrap();
    let lane = current_user(&state).await.unwrap();
    commands::addfeed(&state, lane, "Followed", "https://followed.example/rss")
        .await
        .unwrap();

    commands::register(&mut state, "other").await.unwrap();
    let other = current_user(&state).await.unwrap();
    commands::addfeed(&state, other, "Ignored", "https://ignored.example/rss")
        .await
        .unwrap();

    let followed = Feed::find_by_url(&state.db, "https://followed.example/rss")
        .await
        .unwrap()
        .unwrap();
    let ignored = Feed::find_by_url(&state.db, "https://ignored.example/rss")
        .await
        .unwrap()
        .unwrap();

    let doc = |url: &str, title: &str, date: &str| FetchedFeed {
        title: "t".to_string(),
        description: "d".to_string(),
        items: vec![FetchedItem {
            title: Some(title.to_string()),
            link: Some(url.to_string()),
            description: None,
            pub_date: Some(date.to_string()),
        }],
    };

    store_posts(
        &state.db,
        &followed,
        &doc(
            "https://followed.example/old",
            "Old",
            "Mon, 02 Jan 2006 15:04:05 -0700",
        ),
    )
    .await
    .unwrap();
    store_posts(
        &state.db,
        &followed,
        &doc(
            "https://followed.example/new",
            "New",
            "Tue, 03 Jan 2006 15:04:05 -0700",
        ),
    )
    .await
    .unwrap();
    store_posts(
        &state.db,
        &ignored,
        &doc(
            "https://ignored.example/post",
            "Elsewhere",
            "Wed, 04 Jan 2006 15:04:05 -0700",
        ),
    )
    .await
    .unwrap();

    let posts = Post::for_user(&state.db, "lane", 10).await.unwrap();
    assert_eq!(posts.len(), 2, "only posts from followed feeds");
    assert_eq!(posts[0].url, "https://followed.example/new");
    assert_eq!(posts[1].url, "https://followed.example/old");
    assert_eq!(
        posts[0].published_at,
        Utc.with_ymd_and_hms(2006, 1, 3, 22, 4, 5).unwrap()
    );

    let limited = Post::for_user(&state.db, "lane", 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].url, "https://followed.example/new");
}

#[tokio::test]
async fn reset_removes_users_and_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(&dir).await;

    commands::register(&mut state, "lane").await.unwrap();
    let user = current_user(&state).await.unwrap();
    commands::addfeed(&state, user, "Blog", "https://blog.example/rss")
        .await
        .unwrap();

    let feed = Feed::find_by_url(&state.db, "https://blog.example/rss")
        .await
        .unwrap()
        .unwrap();
    store_posts(
        &state.db,
        &feed,
        &FetchedFeed {
            title: "t".to_string(),
            description: "d".to_string(),
            items: vec![FetchedItem {
                title: Some("Post".to_string()),
                link: Some("https://blog.example/post".to_string()),
                description: None,
                pub_date: Some("Mon, 02 Jan 2006 15:04:05 -0700".to_string()),
            }],
        },
    )
    .await
    .unwrap();

    commands::reset(&state).await.unwrap();

    for table in ["users", "feeds", "feed_follows", "posts"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count, 0, "{table} is empty after reset");
    }
}
