//! Message content for a dispatch cycle.
//!
//! A [`ContentSource`] is queried once per cycle. When it fails the dispatcher
//! falls back to [`Content::fallback`] instead of skipping the cycle.

use std::time::Duration;

use async_trait::async_trait;

use crate::mail::Email;

/// Replaced by the recipient address when a message is rendered.
pub const ADDRESS_TOKEN: &str = "{{email}}";

pub const FALLBACK_SUBJECT: &str = "Hello";
pub const FALLBACK_BODY: &str = "<html><body>Hello!</body></html>";

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("content source returned an empty document")]
    Empty,
}

/// Subject and body shared by every recipient of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

impl Content {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, is_html: bool) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            is_html,
        }
    }

    pub fn fallback() -> Self {
        Self::new(FALLBACK_SUBJECT, FALLBACK_BODY, true)
    }

    /// The message for one recipient, with [`ADDRESS_TOKEN`] substituted.
    pub fn render_for(&self, address: &str) -> Email {
        Email::new(
            address,
            self.subject.clone(),
            self.body.replace(ADDRESS_TOKEN, address),
            self.is_html,
        )
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Content, ContentError>;
}

#[async_trait]
impl<C: ContentSource + ?Sized> ContentSource for Box<C> {
    async fn fetch(&self) -> Result<Content, ContentError> {
        (**self).fetch().await
    }
}

/// Fixed content, e.g. from configuration.
#[derive(Debug, Clone)]
pub struct StaticContent(pub Content);

#[async_trait]
impl ContentSource for StaticContent {
    async fn fetch(&self) -> Result<Content, ContentError> {
        Ok(self.0.clone())
    }
}

/// Fetches an HTML page; its `<title>` becomes the subject and the whole
/// document the body.
#[derive(Debug, Clone)]
pub struct HttpContent {
    client: reqwest::Client,
    url: String,
}

impl HttpContent {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ContentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ContentSource for HttpContent {
    async fn fetch(&self) -> Result<Content, ContentError> {
        let html = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if html.trim().is_empty() {
            return Err(ContentError::Empty);
        }

        let subject = extract_title(&html).unwrap_or_else(|| FALLBACK_SUBJECT.to_string());
        tracing::debug!(url = %self.url, %subject, bytes = html.len(), "fetched message content");
        Ok(Content::new(subject, html, true))
    }
}

/// Text of the first `<title>` element, whitespace collapsed and the common
/// entities decoded. `None` when absent or blank.
pub fn extract_title(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;

    let title = html[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    let title = decode_entities(&title);
    (!title.is_empty()).then_some(title)
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
