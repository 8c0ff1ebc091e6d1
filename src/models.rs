use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
}

impl User {
    pub async fn create(db: &SqlitePool, name: &str) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, created_at, updated_at, name)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user.id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(&user.name)
        .execute(db)
        .await?;

        Ok(user)
    }

    pub async fn find_by_name(db: &SqlitePool, name: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(db)
            .await?;

        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;

        Ok(user)
    }

    pub async fn all(db: &SqlitePool) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(db)
            .await?;

        Ok(users)
    }

    /// Delete every user. Feeds, follows and posts go with them through
    /// the foreign key cascades.
    pub async fn delete_all(db: &SqlitePool) -> Result<()> {
        sqlx::query("DELETE FROM users").execute(db).await?;

        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl Feed {
    pub async fn create(db: &SqlitePool, name: &str, url: &str, user_id: Uuid) -> Result<Feed> {
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            url: url.to_string(),
            user_id,
            last_fetched_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id, last_fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(feed.id)
        .bind(feed.created_at)
        .bind(feed.updated_at)
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.user_id)
        .execute(db)
        .await?;

        Ok(feed)
    }

    pub async fn find_by_name(db: &SqlitePool, name: &str) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE name = ?")
            .bind(name)
            .fetch_optional(db)
            .await?;

        Ok(feed)
    }

    pub async fn find_by_url(db: &SqlitePool, url: &str) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(db)
            .await?;

        Ok(feed)
    }

    pub async fn all(db: &SqlitePool) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>("SELECT * FROM feeds ORDER BY name")
            .fetch_all(db)
            .await?;

        Ok(feeds)
    }

    /// The feed due next: never-fetched feeds first, then the one with
    /// the oldest `last_fetched_at`.
    pub async fn next_to_fetch(db: &SqlitePool) -> Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT * FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST
            LIMIT 1
            "#,
        )
        .fetch_optional(db)
        .await?;

        Ok(feed)
    }

    pub async fn mark_fetched(db: &SqlitePool, id: Uuid) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Feeds followed by the named user.
    pub async fn followed_by(db: &SqlitePool, user_name: &str) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT feeds.* FROM feeds
            JOIN feed_follows ON feed_follows.feed_id = feeds.id
            JOIN users ON users.id = feed_follows.user_id
            WHERE users.name = ?
            ORDER BY feeds.name
            "#,
        )
        .bind(user_name)
        .fetch_all(db)
        .await?;

        Ok(feeds)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub feed_id: Uuid,
}

impl FeedFollow {
    pub async fn create(db: &SqlitePool, user_id: Uuid, feed_id: Uuid) -> Result<FeedFollow> {
        let now = Utc::now();
        let follow = FeedFollow {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            user_id,
            feed_id,
        };

        sqlx::query(
            r#"
            INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(follow.id)
        .bind(follow.created_at)
        .bind(follow.updated_at)
        .bind(follow.user_id)
        .bind(follow.feed_id)
        .execute(db)
        .await?;

        Ok(follow)
    }

    /// Delete the follow relation keyed by user name and feed URL.
    /// Returns the number of rows removed (0 if the user wasn't following).
    pub async fn delete_for(db: &SqlitePool, user_name: &str, feed_url: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM feed_follows
            WHERE user_id = (SELECT id FROM users WHERE name = ?)
              AND feed_id = (SELECT id FROM feeds WHERE url = ?)
            "#,
        )
        .bind(user_name)
        .bind(feed_url)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub feed_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Candidate post built from one feed item, before insertion.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub feed_id: Uuid,
}

/// Outcome of a post insert. The post URL carries a uniqueness
/// constraint, and hitting it is a normal event during ingestion.
#[derive(Debug)]
pub enum PostInsert {
    Inserted(Post),
    DuplicateUrl,
}

impl Post {
    pub async fn create(db: &SqlitePool, new_post: NewPost) -> Result<PostInsert> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            feed_id: new_post.feed_id,
            url: new_post.url,
            title: new_post.title,
            description: new_post.description,
            published_at: new_post.published_at,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO posts (id, created_at, updated_at, feed_id, url, title, description, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.id)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(post.feed_id)
        .bind(&post.url)
        .bind(&post.title)
        .bind(&post.description)
        .bind(post.published_at)
        .execute(db)
        .await;

        match result {
            Ok(_) => Ok(PostInsert::Inserted(post)),
            Err(err)
                if err
                    .as_database_error()
                    .is_some_and(|e| e.is_unique_violation()) =>
            {
                Ok(PostInsert::DuplicateUrl)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Most recent posts across all feeds followed by the named user.
    pub async fn for_user(db: &SqlitePool, user_name: &str, limit: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT posts.* FROM posts
            JOIN feed_follows ON feed_follows.feed_id = posts.feed_id
            JOIN users ON users.id = feed_follows.user_id
            WHERE users.name = ?
            ORDER BY posts.published_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_name)
        .bind(limit)
        .fetch_all(db)
        .await?;

        Ok(posts)
    }
}
