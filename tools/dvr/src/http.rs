//! Minimal HTTP request/response model handed across the `Transport` seam.
//!
//! Bodies behave like the wire: a streamed body can be read once. `Body::read_all`
//! drains the stream and keeps the buffered bytes so a second owner can get a
//! complete copy.

use crate::errors::DvrError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

/// Header name to ordered values, the same shape is used for trailers.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub password: Option<String>,
}

impl UserInfo {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }

    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }
}

impl fmt::Display for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.password {
            Some(password) => write!(f, "{}:{}", self.username, password),
            None => write!(f, "{}", self.username),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUrl {
    pub scheme: String,
    pub opaque: String,
    pub user: Option<UserInfo>,
    pub host: String,
    pub path: String,
    pub raw_query: String,
    pub fragment: String,
}

impl RequestUrl {
    /// Splits `scheme:opaque` and `scheme://[user[:password]@]host/path?query#fragment`
    /// into their components. Nothing is percent-decoded.
    pub fn parse(raw: &str) -> Result<Self, DvrError> {
        if raw.trim().is_empty() {
            return Err(DvrError::InvalidUrl("empty url".to_string()));
        }
        let mut url = RequestUrl::default();

        let (rest, fragment) = split_once_or_all(raw, '#');
        url.fragment = fragment.to_string();
        let (rest, query) = split_once_or_all(rest, '?');
        url.raw_query = query.to_string();

        let rest = match scheme_split(rest) {
            Some((scheme, tail)) => {
                url.scheme = scheme.to_ascii_lowercase();
                tail
            }
            None => rest,
        };

        if let Some(after_slashes) = rest.strip_prefix("//") {
            let (authority, path) = match after_slashes.find('/') {
                Some(idx) => after_slashes.split_at(idx),
                None => (after_slashes, ""),
            };
            let host = match authority.rfind('@') {
                Some(idx) => {
                    let info = &authority[..idx];
                    url.user = Some(match info.split_once(':') {
                        Some((user, password)) => UserInfo::user_password(user, password),
                        None => UserInfo::user(info),
                    });
                    &authority[idx + 1..]
                }
                None => authority,
            };
            url.host = host.to_string();
            url.path = path.to_string();
        } else if !url.scheme.is_empty() && !rest.starts_with('/') {
            url.opaque = rest.to_string();
        } else {
            url.path = rest.to_string();
        }
        Ok(url)
    }
}

fn split_once_or_all(value: &str, sep: char) -> (&str, &str) {
    value.split_once(sep).unwrap_or((value, ""))
}

fn scheme_split(value: &str) -> Option<(&str, &str)> {
    let (scheme, tail) = value.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some((scheme, tail))
    } else {
        None
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        if !self.opaque.is_empty() {
            write!(f, "{}", self.opaque)?;
        } else {
            if !self.host.is_empty() || self.user.is_some() {
                write!(f, "//")?;
                if let Some(user) = &self.user {
                    write!(f, "{user}@")?;
                }
                write!(f, "{}", self.host)?;
                if !self.path.is_empty() && !self.path.starts_with('/') {
                    write!(f, "/")?;
                }
            }
            write!(f, "{}", self.path)?;
        }
        if !self.raw_query.is_empty() {
            write!(f, "?{}", self.raw_query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

enum BodyInner {
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

pub struct Body {
    inner: BodyInner,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: BodyInner::Bytes(bytes.into()),
        }
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: BodyInner::Stream(Box::new(reader)),
        }
    }

    /// Drains a streamed body into memory and returns a copy of the bytes.
    /// The body stays readable afterwards.
    pub fn read_all(&mut self) -> Result<Vec<u8>, DvrError> {
        if let BodyInner::Stream(reader) = &mut self.inner {
            let mut buffer = Vec::new();
            reader
                .read_to_end(&mut buffer)
                .map_err(|e| DvrError::Io(e.to_string()))?;
            self.inner = BodyInner::Bytes(buffer);
        }
        match &self.inner {
            BodyInner::Bytes(bytes) => Ok(bytes.clone()),
            BodyInner::Stream(_) => Ok(Vec::new()),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, DvrError> {
        match self.inner {
            BodyInner::Bytes(bytes) => Ok(bytes),
            BodyInner::Stream(mut reader) => {
                let mut buffer = Vec::new();
                reader
                    .read_to_end(&mut buffer)
                    .map_err(|e| DvrError::Io(e.to_string()))?;
                Ok(buffer)
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            BodyInner::Bytes(bytes) => write!(f, "Body({} bytes)", bytes.len()),
            BodyInner::Stream(_) => write!(f, "Body(<stream>)"),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::from_bytes(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::from_bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::from_bytes(value.into_bytes())
    }
}

#[derive(Debug, Default)]
pub struct HttpRequest {
    pub method: String,
    pub url: Option<RequestUrl>,
    pub headers: HeaderMap,
    pub trailers: HeaderMap,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: &str) -> Result<Self, DvrError> {
        Ok(Self {
            method: method.into(),
            url: Some(RequestUrl::parse(url)?),
            ..Self::default()
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn url_string(&self) -> String {
        self.url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }
}
