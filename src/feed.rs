use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;

use crate::domain::{DatasetRef, RemoteDatasetInfo, is_restricted_label};
use crate::error::SyncError;
use crate::http::{build_client, send_with_retries, status_failure};

pub trait FeedClient: Send + Sync {
    fn fetch(&self, dataset: &DatasetRef) -> Result<RemoteDatasetInfo, SyncError>;
}

/// One `<entry>` of an Atom download feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    pub updated: Option<String>,
    pub categories: Vec<String>,
    pub rights: Option<String>,
}

impl FeedEntry {
    pub fn is_restricted(&self) -> bool {
        self.categories.iter().any(|term| is_restricted_label(term))
            || self.rights.as_deref().is_some_and(is_restricted_label)
    }

    pub fn into_remote_info(self) -> Result<RemoteDatasetInfo, SyncError> {
        let restricted = self.is_restricted();
        let download_url = self
            .link
            .ok_or_else(|| SyncError::FeedParse(format!("entry {:?} has no link", self.title)))?;
        let last_updated = self.updated.ok_or_else(|| {
            SyncError::FeedParse(format!("entry {:?} has no updated timestamp", self.title))
        })?;
        Ok(RemoteDatasetInfo {
            title: self.title,
            download_url,
            last_updated,
            category: self.categories.into_iter().next(),
            restricted,
        })
    }
}

struct FeedParser {
    feed: Regex,
    entry: Regex,
    title: Regex,
    link: Regex,
    href: Regex,
    rel: Regex,
    updated: Regex,
    category: Regex,
    rights: Regex,
}

impl FeedParser {
    fn new() -> Result<Self, SyncError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|err| SyncError::FeedParse(err.to_string()));
        Ok(Self {
            feed: compile(r"<(?:\w+:)?feed\b")?,
            entry: compile(r"(?s)<(?:\w+:)?entry\b[^>]*>(.*?)</(?:\w+:)?entry>")?,
            title: compile(r"(?s)<(?:\w+:)?title\b[^>]*>(.*?)</(?:\w+:)?title>")?,
            link: compile(r"<(?:\w+:)?link\b([^>]*)>")?,
            href: compile(r#"\bhref\s*=\s*["']([^"']*)["']"#)?,
            rel: compile(r#"\brel\s*=\s*["']([^"']*)["']"#)?,
            updated: compile(r"(?s)<(?:\w+:)?updated\b[^>]*>(.*?)</(?:\w+:)?updated>")?,
            category: compile(r#"<(?:\w+:)?category\b[^>]*\bterm\s*=\s*["']([^"']*)["']"#)?,
            rights: compile(r"(?s)<(?:\w+:)?rights\b[^>]*>(.*?)</(?:\w+:)?rights>")?,
        })
    }

    fn parse(&self, document: &str) -> Result<Vec<FeedEntry>, SyncError> {
        if !self.feed.is_match(document) {
            return Err(SyncError::FeedParse("document is not an Atom feed".to_string()));
        }
        Ok(self
            .entry
            .captures_iter(document)
            .filter_map(|cap| cap.get(1))
            .map(|body| self.parse_entry(body.as_str()))
            .collect())
    }

    fn parse_entry(&self, body: &str) -> FeedEntry {
        FeedEntry {
            title: self.text(&self.title, body).unwrap_or_default(),
            link: self.download_link(body),
            updated: self.text(&self.updated, body),
            categories: self
                .category
                .captures_iter(body)
                .filter_map(|cap| cap.get(1))
                .map(|term| unescape(term.as_str()))
                .collect(),
            rights: self.text(&self.rights, body),
        }
    }

    fn text(&self, re: &Regex, body: &str) -> Option<String> {
        re.captures(body)
            .and_then(|cap| cap.get(1))
            .map(|value| unescape(strip_cdata(value.as_str()).trim()))
            .filter(|value| !value.is_empty())
    }

    /// First link without a `rel` or with `rel="alternate"`/`"enclosure"`.
    fn download_link(&self, body: &str) -> Option<String> {
        self.link
            .captures_iter(body)
            .filter_map(|cap| cap.get(1))
            .filter(|attrs| {
                self.rel
                    .captures(attrs.as_str())
                    .and_then(|cap| cap.get(1))
                    .is_none_or(|rel| matches!(rel.as_str(), "alternate" | "enclosure"))
            })
            .find_map(|attrs| {
                self.href
                    .captures(attrs.as_str())
                    .and_then(|cap| cap.get(1))
                    .map(|href| unescape(href.as_str().trim()))
            })
            .filter(|href| !href.is_empty())
    }
}

pub fn parse_feed_entries(document: &str) -> Result<Vec<FeedEntry>, SyncError> {
    FeedParser::new()?.parse(document)
}

/// Picks the entry for `dataset`: same title and category, else the entry linking to the
/// dataset's previously known download URL.
pub fn select_entry(entries: Vec<FeedEntry>, dataset: &DatasetRef) -> Option<FeedEntry> {
    let by_title = entries.iter().position(|entry| {
        entry.title == dataset.title
            && dataset
                .category
                .as_ref()
                .is_none_or(|category| entry.categories.iter().any(|term| term == category))
    });
    let by_link = || {
        let url = dataset.download_url.as_deref()?;
        entries
            .iter()
            .position(|entry| entry.link.as_deref() == Some(url))
    };
    let index = by_title.or_else(by_link)?;
    entries.into_iter().nth(index)
}

pub fn remote_info_from_feed(
    document: &str,
    dataset: &DatasetRef,
) -> Result<RemoteDatasetInfo, SyncError> {
    let entries = parse_feed_entries(document)?;
    let entry = select_entry(entries, dataset)
        .ok_or_else(|| SyncError::DatasetNotInFeed(format!("{} ({})", dataset.title, dataset.source_url)))?;
    entry.into_remote_info()
}

fn strip_cdata(value: &str) -> &str {
    value
        .trim()
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
        .unwrap_or(value)
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[derive(Clone)]
pub struct AtomFeedClient {
    client: Client,
}

impl AtomFeedClient {
    pub fn new() -> Result<Self, SyncError> {
        let client = build_client(Some(Duration::from_secs(60))).map_err(SyncError::FeedHttp)?;
        Ok(Self { client })
    }
}

impl FeedClient for AtomFeedClient {
    fn fetch(&self, dataset: &DatasetRef) -> Result<RemoteDatasetInfo, SyncError> {
        let url = dataset.source_url.as_str();
        let response = send_with_retries(|| self.client.get(url))
            .map_err(|err| SyncError::FeedHttp(err.to_string()))?;
        if !response.status().is_success() {
            let (status, message) = status_failure(response, "feed request failed");
            return Err(SyncError::FeedStatus { status, message });
        }
        let document = response
            .text()
            .map_err(|err| SyncError::FeedHttp(err.to_string()))?;
        remote_info_from_feed(&document, dataset)
    }
}
