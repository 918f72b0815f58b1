//! Email message types.

use serde::{Deserialize, Serialize};

/// The body content of an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailBody {
    Text(String),
    Html(String),
}

impl EmailBody {
    pub fn new(content: impl Into<String>, is_html: bool) -> Self {
        if is_html {
            Self::Html(content.into())
        } else {
            Self::Text(content.into())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Html(s) => s,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, Self::Html(_))
    }
}

/// A single-recipient message ready to send. The sender is the transport's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: EmailBody,
}

impl Email {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        is_html: bool,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: EmailBody::new(body, is_html),
        }
    }
}
