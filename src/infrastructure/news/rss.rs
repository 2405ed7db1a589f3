use crate::domain::ports::FeedProvider;
use crate::domain::sentiment::Article;
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rss::Channel;
use std::io::Cursor;
use tracing::{debug, warn};

const MAX_SUMMARY_CHARS: usize = 500;

/// RSS feed fetcher. One call fetches and parses one feed URL; the caller
/// owns the feed lists and fallback policy. Any failure degrades to an
/// empty article list.
pub struct RssFeedProvider {
    client: ClientWithMiddleware,
}

impl RssFeedProvider {
    pub fn new() -> Self {
        Self {
            client: HttpClientFactory::create_client(),
        }
    }
}

impl Default for RssFeedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedProvider for RssFeedProvider {
    async fn fetch(&self, url: &str) -> Vec<Article> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Feed fetch failed ({url}): {e:#}");
                return Vec::new();
            }
        };

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Feed read failed ({url}): {e}");
                return Vec::new();
            }
        };

        // The XML parser is synchronous; keep it off the event loop.
        let channel = match tokio::task::spawn_blocking(move || Channel::read_from(Cursor::new(bytes)))
            .await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                warn!("Feed parse failed ({url}): {e}");
                return Vec::new();
            }
            Err(e) => {
                warn!("Feed parse task failed ({url}): {e}");
                return Vec::new();
            }
        };

        let articles: Vec<Article> = channel
            .items()
            .iter()
            .map(|item| {
                let published = item
                    .pub_date()
                    .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                    .map(|d| d.with_timezone(&Utc));
                Article {
                    title: item.title().unwrap_or("").to_string(),
                    summary: truncate_chars(item.description().unwrap_or(""), MAX_SUMMARY_CHARS),
                    link: item.link().map(str::to_string),
                    published,
                }
            })
            .collect();

        debug!("Fetched {} articles from {url}", articles.len());
        articles
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ä".repeat(600);
        let truncated = truncate_chars(&text, MAX_SUMMARY_CHARS);
        assert_eq!(truncated.chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn test_unreachable_feed_returns_empty() {
        tokio_test::block_on(async {
            let provider = RssFeedProvider::new();
            let articles = provider.fetch("http://127.0.0.1:9/feed.xml").await;
            assert!(articles.is_empty());
        });
    }
}
