use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use percent_encoding::percent_decode_str;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::multistatus::{self, DavEntry};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:resourcetype/>
    <D:displayname/>
    <D:getcontenttype/>
    <D:getcontentlength/>
  </D:prop>
</D:propfind>"#;

/// Body of a `GET` response, yielded chunk by chunk.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes, DavError>> + Send>>;

#[derive(Debug, Error)]
pub enum DavError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("server returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed multistatus response: {0}")]
    Xml(String),
    #[error("multistatus response does not describe {0}")]
    MissingResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl DavError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DavError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.classification() == Some(ApiErrorClass::Auth)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::LOCKED)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// Username and password sent as HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `Depth` header of a `PROPFIND`. Deeper listings are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
}

impl Depth {
    fn as_header(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Folder,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DavResource {
    /// Percent-encoded href path, unique per node.
    pub identifier: String,
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl DavResource {
    fn from_entry(entry: DavEntry) -> Result<Self, DavError> {
        let identifier = normalize_href(&entry.href)?;
        let kind = if entry.is_collection {
            ResourceKind::Folder
        } else {
            ResourceKind::File
        };
        let name = entry
            .display_name
            .unwrap_or_else(|| name_from_identifier(&identifier));
        let (content_type, size) = match kind {
            ResourceKind::File => (entry.content_type, entry.content_length),
            ResourceKind::Folder => (None, None),
        };
        Ok(Self {
            identifier,
            name,
            kind,
            content_type,
            size,
        })
    }
}

#[derive(Clone)]
pub struct DavClient {
    http: Client,
    root_url: Url,
    credentials: Credentials,
}

impl DavClient {
    pub fn new(root_url: &str, credentials: Credentials) -> Result<Self, DavError> {
        Self::with_http(Client::new(), root_url, credentials)
    }

    pub fn with_http(
        http: Client,
        root_url: &str,
        credentials: Credentials,
    ) -> Result<Self, DavError> {
        let mut root_url = Url::parse(root_url)?;
        if !root_url.path().ends_with('/') {
            let path = format!("{}/", root_url.path());
            root_url.set_path(&path);
        }
        Ok(Self {
            http,
            root_url,
            credentials,
        })
    }

    /// Identifier of the synchronized root collection.
    pub fn base_identifier(&self) -> &str {
        self.root_url.path()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn root_resource(&self) -> Result<DavResource, DavError> {
        let base = self.base_identifier().to_string();
        self.propfind(&base, Depth::Zero)
            .await?
            .into_iter()
            .next()
            .ok_or(DavError::MissingResponse(base))
    }

    /// Immediate children of `parent`, in server order.
    pub async fn list_children(&self, parent: &DavResource) -> Result<Vec<DavResource>, DavError> {
        let entries = self.propfind(&parent.identifier, Depth::One).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| !same_identifier(&entry.identifier, &parent.identifier))
            .collect())
    }

    pub async fn propfind(
        &self,
        identifier: &str,
        depth: Depth,
    ) -> Result<Vec<DavResource>, DavError> {
        let url = self.resolve(identifier)?;
        let response = self
            .http
            .request(propfind_method(), url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("Depth", depth.as_header())
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        let body = Self::handle_response(response).await?;
        multistatus::parse(&body)?
            .into_iter()
            .map(DavResource::from_entry)
            .collect()
    }

    pub async fn get(&self, resource: &DavResource) -> Result<ContentStream, DavError> {
        let url = self.resolve(&resource.identifier)?;
        let response = self
            .http
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(Box::pin(response.bytes_stream().map_err(DavError::from)))
    }

    fn resolve(&self, identifier: &str) -> Result<Url, DavError> {
        Ok(self.root_url.join(identifier)?)
    }

    async fn handle_response(response: reqwest::Response) -> Result<String, DavError> {
        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> DavError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        DavError::Api { status, body }
    }
}

fn propfind_method() -> Method {
    Method::from_bytes(b"PROPFIND").expect("PROPFIND is a valid method token")
}

fn normalize_href(href: &str) -> Result<String, DavError> {
    if href.starts_with("http://") || href.starts_with("https://") {
        Ok(Url::parse(href)?.path().to_string())
    } else {
        Ok(href.to_string())
    }
}

fn same_identifier(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

fn name_from_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
