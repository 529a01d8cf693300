//! Keyset pagination over image records.
//!
//! Records are ordered by `(created_at, id)`. A page token names the last
//! record of the previous page, so listing is restartable and unaffected by
//! rows inserted behind the cursor.

use std::collections::VecDeque;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::ImageId;
use crate::record::ImageRecord;
use crate::store::MetadataStore;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Caller-supplied pagination parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
}

impl PageRequest {
    /// First page with the given size.
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size: Some(page_size),
            page_token: None,
        }
    }

    /// Continue after `token` with the given size.
    pub fn after(page_size: u32, token: impl Into<String>) -> Self {
        Self {
            page_size: Some(page_size),
            page_token: Some(token.into()),
        }
    }

    /// Effective page size. Zero or absent means the default.
    pub fn limit(&self) -> u32 {
        match self.page_size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => n.min(MAX_PAGE_SIZE),
        }
    }

    /// Decode the cursor, treating an empty token as "start from the beginning".
    pub fn cursor(&self) -> Result<Option<PageToken>> {
        match self.page_token.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => PageToken::decode(raw).map(Some),
        }
    }
}

/// One page of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<ImageRecord>,
    /// Present when more records may follow.
    pub next_page_token: Option<String>,
}

impl Page {
    /// Build a page from a query that fetched up to `limit + 1` rows.
    ///
    /// The extra row only signals that another page exists; it is dropped.
    pub fn from_overfetch(mut rows: Vec<ImageRecord>, limit: u32) -> Self {
        let limit = limit as usize;
        if rows.len() > limit {
            rows.truncate(limit);
            let next_page_token = rows.last().map(|r| PageToken::after(r).encode());
            Self {
                records: rows,
                next_page_token,
            }
        } else {
            Self {
                records: rows,
                next_page_token: None,
            }
        }
    }
}

/// Decoded position in the `(created_at, id)` ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    /// `created_at` in persisted text form.
    pub created_at: String,
    pub id: ImageId,
}

impl PageToken {
    /// Token positioned just after `record`.
    pub fn after(record: &ImageRecord) -> Self {
        Self {
            created_at: record.created_at_text(),
            id: record.id,
        }
    }

    /// Opaque, URL-safe encoding.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}|{}", self.created_at, self.id))
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let invalid = || Error::Validation("invalid page_token".into());

        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
        let text = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (created_at, id) = text.split_once('|').ok_or_else(invalid)?;
        // Stores compare the text lexically, so normalise to the persisted form.
        let created_at = crate::record::parse_timestamp(created_at).ok_or_else(invalid)?;
        let id = id.parse::<ImageId>().map_err(|_| invalid())?;

        Ok(Self {
            created_at: crate::record::format_timestamp(&created_at),
            id,
        })
    }
}

/// Lazy iterator over every record in a [`MetadataStore`].
///
/// Pages are fetched on demand. [`ImagePages::resume`] restarts from a token
/// previously handed out by a page.
pub struct ImagePages<'a> {
    store: &'a dyn MetadataStore,
    page_size: u32,
    next_token: Option<String>,
    buffer: VecDeque<ImageRecord>,
    exhausted: bool,
}

impl<'a> ImagePages<'a> {
    pub fn new(store: &'a dyn MetadataStore, page_size: u32) -> Self {
        Self {
            store,
            page_size,
            next_token: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn resume(store: &'a dyn MetadataStore, page_size: u32, token: impl Into<String>) -> Self {
        Self {
            next_token: Some(token.into()),
            ..Self::new(store, page_size)
        }
    }

    fn fetch(&mut self) -> Result<()> {
        let request = PageRequest {
            page_size: Some(self.page_size),
            page_token: self.next_token.take(),
        };
        let page = self.store.list(&request)?;
        self.buffer.extend(page.records);
        match page.next_page_token {
            Some(token) => self.next_token = Some(token),
            None => self.exhausted = true,
        }
        Ok(())
    }
}

impl Iterator for ImagePages<'_> {
    type Item = Result<ImageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
