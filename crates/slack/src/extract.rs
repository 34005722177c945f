//! Pulls explainable content out of a Slack message: its text, attachment
//! unfurls, the pages it links to and any images it carries.

use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use reqwest::{header::USER_AGENT, Client};
use tracing::debug;

use crate::{api::SlackApi, events::SlackMessage};

pub const MAX_LINKED_URLS: usize = 3;
pub const MAX_PAGE_TEXT_CHARS: usize = 2000;
pub const FETCH_USER_AGENT: &str = "ELI5-SlackBot/1.0";
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const IMAGE_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>|]+").expect("valid url regex"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static MESSAGE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[a-zA-Z0-9\-]+\.slack\.com/archives/([A-Z0-9]+)/p(\d+)")
        .expect("valid message link regex")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub base64: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    pub text: String,
    pub images: Vec<ImageAttachment>,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty()
    }
}

#[async_trait]
pub trait UrlFetcher: Send + Sync {
    /// Plain text of the page at `url`, or `None` when it could not be read.
    async fn fetch_text(&self, url: &str) -> Option<String>;
}

pub struct HttpUrlFetcher {
    http: Client,
}

impl HttpUrlFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self { http: Client::builder().timeout(FETCH_TIMEOUT).build()? })
    }
}

#[async_trait]
impl UrlFetcher for HttpUrlFetcher {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).header(USER_AGENT, FETCH_USER_AGENT).send().await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(event_name = "extract.fetch.status", url, status = %response.status());
                return None;
            }
            Err(error) => {
                debug!(event_name = "extract.fetch.failed", url, error = %error);
                return None;
            }
        };
        let bytes = response.bytes().await.ok()?;
        let text = html_to_text(&String::from_utf8_lossy(&bytes));
        (!text.is_empty()).then_some(text)
    }
}

pub async fn extract_message(
    message: &SlackMessage,
    fetcher: &dyn UrlFetcher,
    api: &dyn SlackApi,
) -> ExtractedContent {
    let mut text = message_text(message);

    for url in find_urls(&text).into_iter().take(MAX_LINKED_URLS) {
        if url.contains("slack.com") {
            continue;
        }
        if let Some(content) = fetcher.fetch_text(&url).await {
            text.push_str(&format!("\n\n[Content from {url}]:\n{content}"));
        }
    }

    let mut images = Vec::new();
    for file in &message.files {
        let Some(mime_type) = file.mimetype.as_deref().filter(|mime| IMAGE_MIME_TYPES.contains(mime))
        else {
            continue;
        };
        let Some(url) = file.download_url() else {
            continue;
        };
        match api.download_file(url).await {
            Ok(bytes) => images
                .push(ImageAttachment { mime_type: mime_type.to_owned(), base64: STANDARD.encode(bytes) }),
            Err(error) => debug!(event_name = "extract.image.failed", url, error = %error),
        }
    }

    ExtractedContent { text, images }
}

/// Message text followed by any attachment text it does not already contain.
pub fn message_text(message: &SlackMessage) -> String {
    let mut text = message.text.trim().to_owned();

    let extras: Vec<&str> = message
        .attachments
        .iter()
        .flat_map(|attachment| {
            [attachment.text.as_deref(), attachment.pretext.as_deref(), attachment.title.as_deref()]
        })
        .flatten()
        .filter(|value| !value.is_empty() && !text.contains(*value))
        .collect();

    if !extras.is_empty() {
        text = format!("{text}\n\n{}", extras.join("\n\n"));
    }
    text
}

pub fn find_urls(text: &str) -> Vec<String> {
    URL.find_iter(text)
        .map(|found| found.as_str().trim_end_matches(['>', '|', ')']).to_owned())
        .filter(|candidate| !candidate.is_empty())
        .collect()
}

/// Strips tags, collapses whitespace and caps the result.
pub fn html_to_text(raw: &str) -> String {
    let without_tags = HTML_TAG.replace_all(raw, " ");
    let collapsed = WHITESPACE.replace_all(&without_tags, " ");
    eli5_core::conversation::truncate_chars(collapsed.trim(), MAX_PAGE_TEXT_CHARS).to_owned()
}

/// `(channel_id, ts)` for the first Slack permalink in `text`.
pub fn parse_message_link(text: &str) -> Option<(String, String)> {
    let captures = MESSAGE_LINK.captures(text)?;
    let channel = captures.get(1)?.as_str().to_owned();
    let raw_ts = captures.get(2)?.as_str();
    if raw_ts.len() <= 10 {
        return None;
    }
    Some((channel, format!("{}.{}", &raw_ts[..10], &raw_ts[10..])))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{
        extract_message, find_urls, html_to_text, message_text, parse_message_link,
        HttpUrlFetcher, UrlFetcher, FETCH_USER_AGENT, HTML_TAG, MESSAGE_LINK, URL, WHITESPACE,
    };
    use crate::{
        api::{HistoryQuery, OutgoingMessage, SlackApi, SlackApiError},
        blocks::View,
        events::{SlackAttachment, SlackFile, SlackMessage},
    };

    #[derive(Default)]
    struct MapFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UrlFetcher for MapFetcher {
        async fn fetch_text(&self, url: &str) -> Option<String> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(url.to_owned());
            }
            self.pages.get(url).cloned()
        }
    }

    struct FileOnlyApi;

    #[async_trait]
    impl SlackApi for FileOnlyApi {
        async fn post_message(&self, _message: OutgoingMessage) -> Result<(), SlackApiError> {
            Ok(())
        }
        async fn post_ephemeral(
            &self,
            _user_id: &str,
            _message: OutgoingMessage,
        ) -> Result<(), SlackApiError> {
            Ok(())
        }
        async fn open_view(&self, _trigger_id: &str, _view: &View) -> Result<String, SlackApiError> {
            Ok("V1".to_owned())
        }
        async fn update_view(&self, _view_id: &str, _view: &View) -> Result<(), SlackApiError> {
            Ok(())
        }
        async fn publish_view(&self, _user_id: &str, _view: &View) -> Result<(), SlackApiError> {
            Ok(())
        }
        async fn open_dm(&self, _user_id: &str) -> Result<String, SlackApiError> {
            Ok("D1".to_owned())
        }
        async fn conversation_history(
            &self,
            _query: HistoryQuery,
        ) -> Result<Vec<SlackMessage>, SlackApiError> {
            Ok(Vec::new())
        }
        async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError> {
            if url.ends_with("broken.png") {
                return Err(SlackApiError::Status { method: "files.download".to_owned(), status: 404 });
            }
            Ok(b"png".to_vec())
        }
    }

    #[test]
    fn patterns_compile() {
        for pattern in [&*URL, &*HTML_TAG, &*WHITESPACE, &*MESSAGE_LINK] {
            assert!(!pattern.as_str().is_empty());
        }
    }

    #[test]
    fn attachment_text_is_appended_once() {
        let message = SlackMessage {
            text: "  Check the dashboard ".to_owned(),
            attachments: vec![SlackAttachment {
                text: Some("p99 latency up 40%".to_owned()),
                pretext: Some("dashboard".to_owned()),
                title: Some("Perf".to_owned()),
            }],
            ..SlackMessage::default()
        };

        assert_eq!(message_text(&message), "Check the dashboard\n\np99 latency up 40%\n\nPerf");
    }

    #[test]
    fn slack_link_wrappers_are_unwrapped() {
        let urls = find_urls("see <https://vercel.com/docs|the docs> and (https://nextjs.org)");
        assert_eq!(urls, vec!["https://vercel.com/docs".to_owned(), "https://nextjs.org".to_owned()]);
    }

    #[test]
    fn html_is_flattened_and_capped() {
        assert_eq!(html_to_text("<p>Hello\n\n  <b>world</b></p>"), "Hello world");
        assert_eq!(html_to_text(&"a".repeat(5_000)).chars().count(), 2000);
    }

    #[test]
    fn permalink_yields_channel_and_dotted_ts() {
        let parsed = parse_message_link(
            "what does this mean https://acme.slack.com/archives/C0123ABC/p1700000000123456",
        );
        assert_eq!(parsed, Some(("C0123ABC".to_owned(), "1700000000.123456".to_owned())));
        assert_eq!(parse_message_link("https://example.com/archives/C1/p1"), None);
    }

    #[tokio::test]
    async fn extract_fetches_first_three_non_slack_urls_and_images() {
        let mut fetcher = MapFetcher::default();
        fetcher.pages.insert("https://a.dev".to_owned(), "Alpha page".to_owned());
        let message = SlackMessage {
            text: "links https://a.dev https://acme.slack.com/x https://b.dev https://c.dev"
                .to_owned(),
            files: vec![
                SlackFile {
                    mimetype: Some("image/png".to_owned()),
                    url_private: Some("https://files.slack.com/ok.png".to_owned()),
                    url_private_download: None,
                },
                SlackFile {
                    mimetype: Some("image/png".to_owned()),
                    url_private: Some("https://files.slack.com/broken.png".to_owned()),
                    url_private_download: None,
                },
                SlackFile {
                    mimetype: Some("application/pdf".to_owned()),
                    url_private: Some("https://files.slack.com/doc.pdf".to_owned()),
                    url_private_download: None,
                },
            ],
            ..SlackMessage::default()
        };

        let content = extract_message(&message, &fetcher, &FileOnlyApi).await;

        let requested = fetcher.requested.lock().expect("lock").clone();
        assert_eq!(requested, vec!["https://a.dev".to_owned(), "https://b.dev".to_owned()]);
        assert!(content.text.ends_with("\n\n[Content from https://a.dev]:\nAlpha page"));
        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].mime_type, "image/png");
        assert_eq!(content.images[0].base64, "cG5n");
    }

    #[tokio::test]
    async fn empty_message_extracts_nothing() {
        let content =
            extract_message(&SlackMessage::default(), &MapFetcher::default(), &FileOnlyApi).await;
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn http_fetcher_sends_user_agent_and_strips_markup() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/post")
            .match_header("user-agent", FETCH_USER_AGENT)
            .with_status(200)
            .with_body("<html><body><h1>Edge</h1> <p>runs close to users</p></body></html>")
            .create_async()
            .await;
        let _missing = server.mock("GET", "/missing").with_status(404).create_async().await;

        let fetcher = HttpUrlFetcher::new().expect("fetcher");
        let text = fetcher.fetch_text(&format!("{}/post", server.url())).await;
        let missing = fetcher.fetch_text(&format!("{}/missing", server.url())).await;

        assert_eq!(text.as_deref(), Some("Edge runs close to users"));
        assert_eq!(missing, None);
    }
}
