use anyhow::{bail, Context, Result};
use quick_xml::escape::unescape;

/// User-Agent header sent with every feed request.
pub const USER_AGENT: &str = "gator";

/// An RSS channel reduced to the fields the aggregator stores.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFeed {
    pub title: String,
    pub description: String,
    pub items: Vec<FetchedItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
}

/// GET a feed URL and return the raw response body.
///
/// Any status of 300 or above counts as a failed fetch.
async fn get_url(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?;

    let status = response.status();
    if status.as_u16() >= 300 {
        bail!("unable to fetch feed {url}: status {status}");
    }

    Ok(response.bytes().await?.to_vec())
}

pub async fn fetch_feed(url: &str) -> Result<FetchedFeed> {
    let body = get_url(url).await?;
    parse_feed(&body)
}

/// Decode an RSS 2.0 document and normalize its text fields.
pub fn parse_feed(body: &[u8]) -> Result<FetchedFeed> {
    let channel = rss::Channel::read_from(body).context("parsing RSS document")?;
    Ok(normalize_channel(channel))
}

fn normalize_channel(channel: rss::Channel) -> FetchedFeed {
    FetchedFeed {
        title: unescape_entities(channel.title()),
        description: unescape_entities(channel.description()),
        items: channel
            .into_items()
            .iter()
            .map(|item| FetchedItem {
                title: item.title().map(unescape_entities),
                link: item.link().map(unescape_entities),
                description: item.description().map(unescape_entities),
                pub_date: item.pub_date().map(unescape_entities),
            })
            .collect(),
    }
}

/// Resolve character entities left over after XML decoding, so that a
/// double-escaped `&amp;amp;` ends up as a plain `&`. Text the decoder
/// can't make sense of is kept as-is.
pub fn unescape_entities(text: &str) -> String {
    match unescape(text) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => text.to_string(),
    }
}
