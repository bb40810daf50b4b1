//! Core data model.
//!
//! A request is one unit of crawl work. On its way into the store it is turned
//! into a [`RequestRecord`], the plain mapping a codec serializes; callbacks are
//! carried by name and checked against the owning [`Spider`] in both directions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Multi-valued header map. Names keep the case they were given.
pub type Headers = BTreeMap<String, Vec<String>>;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A crawl request as the crawling framework hands it to a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,

    /// HTTP method, upper-case.
    pub method: String,

    pub headers: Headers,

    /// Raw body. `None` and an empty body fingerprint the same.
    pub body: Option<Vec<u8>>,

    pub cookies: BTreeMap<String, String>,

    /// Arbitrary data the framework threads through to the response.
    pub meta: serde_json::Map<String, serde_json::Value>,

    /// Higher = more urgent.
    pub priority: i32,

    /// Skip the duplicate filter for this request.
    pub dont_filter: bool,

    /// Name of the spider method that handles the response.
    pub callback: Option<String>,

    /// Name of the spider method that handles a failed download.
    pub errback: Option<String>,

    pub flags: Vec<String>,

    pub encoding: String,
}

impl Request {
    /// A `GET` request for `url` with everything else defaulted.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Headers::new(),
            body: None,
            cookies: BTreeMap::new(),
            meta: serde_json::Map::new(),
            priority: 0,
            dont_filter: false,
            callback: None,
            errback: None,
            flags: Vec::new(),
            encoding: "utf-8".to_string(),
        }
    }

    pub fn method(mut self, method: impl AsRef<str>) -> Self {
        self.method = method.as_ref().to_ascii_uppercase();
        self
    }

    /// Append a header value; repeated names accumulate.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn dont_filter(mut self, dont_filter: bool) -> Self {
        self.dont_filter = dont_filter;
        self
    }

    pub fn callback(mut self, name: impl Into<String>) -> Self {
        self.callback = Some(name.into());
        self
    }

    pub fn errback(mut self, name: impl Into<String>) -> Self {
        self.errback = Some(name.into());
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Convert to the plain record a codec serializes.
    ///
    /// # Errors
    /// `InvalidRequest` if the URL does not parse as an absolute URL,
    /// `UnknownCallback` if `spider` does not expose a named callback.
    pub fn to_record(&self, spider: &dyn Spider) -> Result<RequestRecord> {
        url::Url::parse(&self.url)
            .map_err(|e| Error::InvalidRequest(format!("{}: {e}", self.url)))?;
        check_callback(spider, self.callback.as_deref())?;
        check_callback(spider, self.errback.as_deref())?;

        Ok(RequestRecord {
            url: self.url.clone(),
            callback: self.callback.clone(),
            errback: self.errback.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            cookies: self.cookies.clone(),
            meta: self.meta.clone(),
            encoding: self.encoding.clone(),
            priority: self.priority,
            dont_filter: self.dont_filter,
            flags: self.flags.clone(),
        })
    }

    /// Rebuild a request from a decoded record.
    pub fn from_record(record: RequestRecord, spider: &dyn Spider) -> Result<Self> {
        check_callback(spider, record.callback.as_deref())?;
        check_callback(spider, record.errback.as_deref())?;

        Ok(Self {
            url: record.url,
            method: record.method,
            headers: record.headers,
            body: record.body,
            cookies: record.cookies,
            meta: record.meta,
            priority: record.priority,
            dont_filter: record.dont_filter,
            callback: record.callback,
            errback: record.errback,
            flags: record.flags,
            encoding: record.encoding,
        })
    }
}

fn check_callback(spider: &dyn Spider, callback: Option<&str>) -> Result<()> {
    match callback {
        Some(name) if !spider.has_callback(name) => Err(Error::UnknownCallback {
            spider: spider.name().to_string(),
            callback: name.to_string(),
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Plain, codec-facing form of a [`Request`].
///
/// Keys match the mapping crawlers already write to shared stores, so records
/// stay readable across producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub url: String,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub errback: Option<String>,
    pub method: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, with = "body_base64")]
    pub body: Option<Vec<u8>>,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "_encoding", default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dont_filter: bool,
    #[serde(default)]
    pub flags: Vec<String>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Bodies travel as standard base64 text.
mod body_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Spider
// ---------------------------------------------------------------------------

/// The crawler that owns a queue.
pub trait Spider: Send + Sync {
    /// Substituted into queue key templates.
    fn name(&self) -> &str;

    /// Whether `callback` names a method this spider can dispatch to.
    fn has_callback(&self, _callback: &str) -> bool {
        true
    }
}

/// A spider known only by name, optionally with an allow-list of callbacks.
#[derive(Debug, Clone)]
pub struct SpiderRef {
    name: String,
    callbacks: Option<BTreeSet<String>>,
}

impl SpiderRef {
    /// Accepts any callback name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callbacks: None,
        }
    }

    /// Restrict callbacks to the given names.
    pub fn with_callbacks<I, S>(mut self, callbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.callbacks = Some(callbacks.into_iter().map(Into::into).collect());
        self
    }
}

impl Spider for SpiderRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_callback(&self, callback: &str) -> bool {
        self.callbacks
            .as_ref()
            .is_none_or(|allowed| allowed.contains(callback))
    }
}
