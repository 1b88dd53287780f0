//! HTTP implementation of [`OaiClient`].
//!
//! Requests are sent as form-encoded POST unless the source forces GET.
//! Responses are parsed into an [`XmlElement`] tree; OAI-PMH `<error>`
//! elements become [`RequestError::Protocol`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Credentials, SourceConfig};
use crate::harvest::traits::{ClientFactory, HarvestError, OaiClient, OaiRecord, RecordHeader};
use crate::harvest::xml::{XmlElement, XmlError};
use crate::model::HarvestSource;

pub const OAI_PMH_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// Failure of a single OAI-PMH request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    Malformed(String),

    #[error("OAI-PMH error '{code}': {message}")]
    Protocol { code: String, message: String },
}

impl From<XmlError> for RequestError {
    fn from(e: XmlError) -> Self {
        RequestError::Malformed(e.to_string())
    }
}

struct IdentifierPage {
    identifiers: Vec<String>,
    resumption_token: Option<String>,
}

enum PageCursor {
    Start,
    Resume(String),
    Done,
}

/// OAI-PMH client over `reqwest`.
pub struct HttpOaiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    force_http_get: bool,
}

impl HttpOaiClient {
    /// Creates a client for `base_url` using credentials and GET/POST mode from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::SourceUnreachable`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, config: &SourceConfig) -> Result<Self, HarvestError> {
        Self::with_timeout(base_url, config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        config: &SourceConfig,
        timeout: Duration,
    ) -> Result<Self, HarvestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("oaipmh-harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarvestError::SourceUnreachable(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            credentials: config.credentials.clone(),
            force_http_get: config.force_http_get,
        })
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<XmlElement, RequestError> {
        debug!(url = %self.base_url, ?params, get = self.force_http_get, "OAI-PMH request");

        let builder = if self.force_http_get {
            self.http.get(&self.base_url).query(params)
        } else {
            self.http.post(&self.base_url).form(params)
        };
        let builder = match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status(status.as_u16()));
        }
        let body = response.text().await?;

        let root = XmlElement::parse(&body)?;
        if !root.is(OAI_PMH_NAMESPACE, "OAI-PMH") {
            return Err(RequestError::Malformed(format!(
                "unexpected root element '{}'",
                root.name
            )));
        }
        if let Some(error) = root.child(OAI_PMH_NAMESPACE, "error") {
            return Err(RequestError::Protocol {
                code: error.attribute(None, "code").unwrap_or_default().to_string(),
                message: error.text().trim().to_string(),
            });
        }
        Ok(root)
    }

    async fn list_page(&self, params: &[(&str, String)]) -> Result<IdentifierPage, RequestError> {
        let root = match self.request(params).await {
            Ok(root) => root,
            Err(RequestError::Protocol { code, .. }) if code == NO_RECORDS_MATCH => {
                return Ok(IdentifierPage {
                    identifiers: Vec::new(),
                    resumption_token: None,
                });
            }
            Err(e) => return Err(e),
        };

        let list = root
            .child(OAI_PMH_NAMESPACE, "ListIdentifiers")
            .ok_or_else(|| RequestError::Malformed("missing ListIdentifiers".to_string()))?;

        let mut identifiers = Vec::new();
        for header in list.children_named(OAI_PMH_NAMESPACE, "header") {
            let header = parse_header(header)?;
            if header.deleted {
                debug!(identifier = %header.identifier, "Skipping deleted record");
                continue;
            }
            identifiers.push(header.identifier);
        }

        let resumption_token = list
            .child(OAI_PMH_NAMESPACE, "resumptionToken")
            .map(|t| t.text().trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(IdentifierPage {
            identifiers,
            resumption_token,
        })
    }

    async fn next_page(
        &self,
        cursor: PageCursor,
        metadata_prefix: &str,
        set_spec: Option<&str>,
    ) -> Result<Option<(Vec<String>, PageCursor)>, HarvestError> {
        let mut params = vec![("verb", "ListIdentifiers".to_string())];
        let previous_token = match cursor {
            PageCursor::Done => return Ok(None),
            PageCursor::Start => {
                params.push(("metadataPrefix", metadata_prefix.to_string()));
                // Some servers reject an empty set argument, so leave it out entirely.
                if let Some(set) = set_spec {
                    params.push(("set", set.to_string()));
                }
                None
            }
            PageCursor::Resume(token) => {
                params.push(("resumptionToken", token.clone()));
                Some(token)
            }
        };

        let page = self
            .list_page(&params)
            .await
            .map_err(|e| HarvestError::ListingFailed(e.to_string()))?;

        debug!(
            count = page.identifiers.len(),
            more = page.resumption_token.is_some(),
            "Listed identifier page"
        );

        let next = match page.resumption_token {
            Some(token) if previous_token.as_deref() == Some(token.as_str()) => {
                warn!(token = %token, "Server repeated its resumption token");
                return Err(HarvestError::ListingFailed(
                    "repeated resumption token".to_string(),
                ));
            }
            Some(token) => PageCursor::Resume(token),
            None => PageCursor::Done,
        };
        Ok(Some((page.identifiers, next)))
    }
}

fn parse_header(header: &XmlElement) -> Result<RecordHeader, RequestError> {
    let identifier = header
        .child(OAI_PMH_NAMESPACE, "identifier")
        .map(|e| e.text().trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RequestError::Malformed("header without identifier".to_string()))?;

    let datestamp = header
        .child(OAI_PMH_NAMESPACE, "datestamp")
        .map(|e| e.text().trim().to_string())
        .filter(|d| !d.is_empty());

    let set_specs = header
        .children_named(OAI_PMH_NAMESPACE, "setSpec")
        .map(|e| e.text().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(RecordHeader {
        identifier,
        datestamp,
        set_specs,
        deleted: header.attribute(None, "status") == Some("deleted"),
    })
}

#[async_trait]
impl OaiClient for HttpOaiClient {
    async fn identify(&self) -> Result<(), HarvestError> {
        let root = self
            .request(&[("verb", "Identify".to_string())])
            .await
            .map_err(|e| HarvestError::SourceUnreachable(e.to_string()))?;

        if root.child(OAI_PMH_NAMESPACE, "Identify").is_none() {
            return Err(HarvestError::SourceUnreachable(
                "Identify response without Identify element".to_string(),
            ));
        }
        Ok(())
    }

    fn list_identifiers<'a>(
        &'a self,
        metadata_prefix: &'a str,
        set_spec: Option<&'a str>,
    ) -> BoxStream<'a, Result<String, HarvestError>> {
        stream::try_unfold(PageCursor::Start, move |cursor| {
            self.next_page(cursor, metadata_prefix, set_spec)
        })
        .map_ok(|identifiers| stream::iter(identifiers.into_iter().map(Ok::<String, HarvestError>)))
        .try_flatten()
        .boxed()
    }

    async fn get_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> Result<OaiRecord, HarvestError> {
        let root = self
            .request(&[
                ("verb", "GetRecord".to_string()),
                ("identifier", identifier.to_string()),
                ("metadataPrefix", metadata_prefix.to_string()),
            ])
            .await
            .map_err(|e| HarvestError::fetch_failed(identifier, e))?;

        let record = root
            .child(OAI_PMH_NAMESPACE, "GetRecord")
            .and_then(|g| g.child(OAI_PMH_NAMESPACE, "record"))
            .ok_or_else(|| HarvestError::fetch_failed(identifier, "missing GetRecord/record"))?;

        let header = record
            .child(OAI_PMH_NAMESPACE, "header")
            .ok_or_else(|| HarvestError::fetch_failed(identifier, "record without header"))
            .and_then(|h| parse_header(h).map_err(|e| HarvestError::fetch_failed(identifier, e)))?;

        if header.deleted {
            return Err(HarvestError::fetch_failed(identifier, "record is deleted"));
        }

        let metadata = record
            .child(OAI_PMH_NAMESPACE, "metadata")
            .and_then(|m| m.elements().next())
            .cloned()
            .ok_or_else(|| HarvestError::fetch_failed(identifier, "record without metadata"))?;

        if header.identifier != identifier {
            warn!(
                requested = identifier,
                returned = %header.identifier,
                "GetRecord returned a different identifier"
            );
        }

        Ok(OaiRecord { header, metadata })
    }
}

/// [`ClientFactory`] producing [`HttpOaiClient`]s.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(
        &self,
        source: &HarvestSource,
        config: &SourceConfig,
    ) -> Result<Box<dyn OaiClient>, HarvestError> {
        Ok(Box::new(HttpOaiClient::with_timeout(
            &source.url,
            config,
            self.timeout,
        )?))
    }
}
