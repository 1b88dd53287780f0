//! Three-stage OAI-PMH harvest pipeline.
//!
//! This module provides [`OaipmhHarvester`], the host-facing entry points
//! that turn a remote repository into catalog packages:
//! 1. **Gather**: handshake, list identifiers, create one record per identifier
//! 2. **Fetch**: retrieve each record and persist its normalized content
//! 3. **Import**: assemble a package from the content and hand it to the host
//!
//! Every stage catches its own failures. The caller only sees a success
//! signal; the details go to the host's job or record error sink.

use chrono::{DateTime, NaiveDate};
use futures_util::StreamExt;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::config::SourceConfig;
use crate::harvest::client::HttpClientFactory;
use crate::harvest::formats::SchemaRegistry;
use crate::harvest::mapping::{
    assemble_package, group_names, group_ref, ImportOptions, METADATA_MODIFIED_FIELD,
    SET_SPEC_FIELD,
};
use crate::harvest::traits::{ClientFactory, HarvestError, HarvestHooks, NoHooks, OaiRecord};
use crate::model::{
    ContentMapping, ContentValue, HarvestJob, HarvestRecord, HarvesterInfo, RecordState,
};
use crate::traits::CatalogHost;

/// Format of `metadata_modified`, a naive UTC timestamp without offset
const METADATA_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ============================================================================
// Harvester
// ============================================================================

/// OAI-PMH harvester driving gather, fetch and import against a host.
///
/// # Thread Safety
///
/// The harvester holds no per-record state. A client is built from the
/// source configuration on every call, so `fetch` and `import` may run
/// concurrently for different records.
///
/// # Example
///
/// ```ignore
/// use oaipmh_harvester::harvest::pipeline::OaipmhHarvester;
/// use oaipmh_harvester::harvest::client::HttpClientFactory;
/// use oaipmh_harvester::memory::InMemoryCatalog;
///
/// let harvester = OaipmhHarvester::new(InMemoryCatalog::new(), HttpClientFactory::new());
/// if let Some(ids) = harvester.gather(&job).await {
///     for id in ids {
///         let mut record = harvester.host().load_record(&id).await?;
///         if harvester.fetch(&job, &mut record).await {
///             harvester.import(&job, Some(&mut record)).await;
///         }
///     }
/// }
/// ```
pub struct OaipmhHarvester<H, F = HttpClientFactory>
where
    H: CatalogHost,
    F: ClientFactory,
{
    /// Persistence and catalog collaborator
    host: H,

    /// Builds a fresh protocol client per call
    clients: F,

    /// Metadata formats known to the fetch stage
    registry: SchemaRegistry,

    hooks: Box<dyn HarvestHooks>,

    options: ImportOptions,
}

impl<H, F> OaipmhHarvester<H, F>
where
    H: CatalogHost,
    F: ClientFactory,
{
    /// Creates a harvester with the built-in schemas, no hooks and default
    /// import options.
    pub fn new(host: H, clients: F) -> Self {
        Self {
            host,
            clients,
            registry: SchemaRegistry::with_defaults(),
            hooks: Box::new(NoHooks),
            options: ImportOptions::default(),
        }
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_hooks(mut self, hooks: impl HarvestHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn info(&self) -> HarvesterInfo {
        HarvesterInfo {
            name: "OAI-PMH".to_string(),
            title: "OAI-PMH".to_string(),
            description: "Harvester for OAI-PMH data sources".to_string(),
        }
    }

    // ========================================================================
    // Stage 1: Gather
    // ========================================================================

    /// Discovers all identifiers of the job's source and creates one
    /// `Discovered` record per identifier, in listing order.
    ///
    /// Returns the created record ids, or `None` if the gather was aborted.
    /// An aborted gather writes exactly one job-level error. Records created
    /// before a mid-listing failure are kept.
    #[instrument(skip_all, fields(job_id = %job.id, source_url = %job.source.url))]
    pub async fn gather(&self, job: &HarvestJob) -> Option<Vec<String>> {
        let mut record_ids = Vec::new();
        match self.gather_into(job, &mut record_ids).await {
            Ok(()) => {
                info!(count = record_ids.len(), "Gather completed");
                Some(record_ids)
            }
            Err(e) => {
                error!(error = %e, kept = record_ids.len(), "Gather stage failed");
                let message = format!("Could not gather anything from {}: {}", job.source.url, e);
                self.host.record_job_error(job, &message).await;
                None
            }
        }
    }

    async fn gather_into(
        &self,
        job: &HarvestJob,
        record_ids: &mut Vec<String>,
    ) -> Result<(), HarvestError> {
        let config = SourceConfig::parse(job.source.config.as_deref());
        let client = self.clients.build(&job.source, &config)?;

        client.identify().await?;
        debug!(
            metadata_prefix = %config.metadata_prefix,
            set = ?config.set_spec,
            "Identify succeeded, listing identifiers"
        );

        let mut identifiers =
            client.list_identifiers(&config.metadata_prefix, config.set_spec.as_deref());
        while let Some(identifier) = identifiers.next().await {
            let identifier = identifier?;
            let record = self.host.create_record(job, &identifier).await?;
            debug!(identifier = %identifier, record_id = %record.id, "Record discovered");
            record_ids.push(record.id);
        }
        Ok(())
    }

    // ========================================================================
    // Stage 2: Fetch
    // ========================================================================

    /// Retrieves `record` and stores its normalized content on it.
    ///
    /// On success the record is `Fetched` and persisted, overwriting any
    /// earlier content. On failure the record keeps its previous content and
    /// state, gets one error message, and `false` is returned.
    #[instrument(skip_all, fields(job_id = %job.id, identifier = %record.identifier))]
    pub async fn fetch(&self, job: &HarvestJob, record: &mut HarvestRecord) -> bool {
        let content = match self.fetch_content(job, record).await {
            Ok(content) => content,
            Err(e) => {
                let message = match &e {
                    HarvestError::RecordFetchFailed { .. } => format!("Get record failed: {e}"),
                    HarvestError::ExtractionFailed(_) | HarvestError::UnsupportedFormat(_) => {
                        format!("Dumping the metadata failed: {e}")
                    }
                    _ => format!("Exception in fetch stage: {e}"),
                };
                self.record_failure(record, message).await;
                return false;
            }
        };

        let previous_content = record.content.replace(content);
        let previous_state = std::mem::replace(&mut record.state, RecordState::Fetched);
        if let Err(e) = self.host.save_record(record).await {
            record.content = previous_content;
            record.state = previous_state;
            self.record_failure(record, format!("Exception in fetch stage: {e}"))
                .await;
            return false;
        }

        info!("Record fetched");
        true
    }

    async fn fetch_content(
        &self,
        job: &HarvestJob,
        record: &HarvestRecord,
    ) -> Result<String, HarvestError> {
        let config = SourceConfig::parse(job.source.config.as_deref());
        let client = self.clients.build(&job.source, &config)?;

        debug!(metadata_prefix = %config.metadata_prefix, "Loading record");
        self.hooks.before_record_fetch(record);
        let oai_record = client
            .get_record(&record.identifier, &config.metadata_prefix)
            .await
            .map_err(|e| match e {
                HarvestError::RecordFetchFailed { .. } => e,
                other => HarvestError::fetch_failed(&record.identifier, other),
            })?;
        self.hooks.after_record_fetch(&oai_record);

        let content = self.normalize(&config.metadata_prefix, &oai_record)?;
        serde_json::to_string(&content)
            .map_err(|e| HarvestError::ExtractionFailed(format!("serializing content: {e}")))
    }

    /// Runs the schema extraction and adds the header-derived fields.
    fn normalize(
        &self,
        metadata_prefix: &str,
        record: &OaiRecord,
    ) -> Result<ContentMapping, HarvestError> {
        let mut content = self.registry.extract(metadata_prefix, &record.metadata)?;

        content.insert(
            SET_SPEC_FIELD.to_string(),
            ContentValue::List(record.header.set_specs.clone()),
        );

        match record.header.datestamp.as_deref().map(metadata_modified) {
            Some(Some(modified)) => {
                content.insert(
                    METADATA_MODIFIED_FIELD.to_string(),
                    ContentValue::Text(modified),
                );
            }
            Some(None) => {
                warn!(datestamp = ?record.header.datestamp, "Ignoring unparseable datestamp");
            }
            None => {}
        }

        Ok(content)
    }

    // ========================================================================
    // Stage 3: Import
    // ========================================================================

    /// Builds the catalog package for a fetched record and hands it to the host.
    ///
    /// A missing record, or one without content, fails immediately without
    /// touching the host. Any other failure is recorded on the record, which
    /// keeps its pre-import state; nothing partial is submitted.
    #[instrument(skip_all, fields(job_id = %job.id, identifier = tracing::field::Empty))]
    pub async fn import(&self, job: &HarvestJob, record: Option<&mut HarvestRecord>) -> bool {
        let Some(record) = record.filter(|r| {
            r.content
                .as_deref()
                .is_some_and(|content| !content.trim().is_empty())
        }) else {
            error!(error = %HarvestError::MissingRecord, "Import skipped");
            return false;
        };
        Span::current().record("identifier", record.identifier.as_str());

        let package_id = match self.import_package(job, record).await {
            Ok(package_id) => package_id,
            Err(e) => {
                self.record_failure(record, format!("Exception in import stage: {e}"))
                    .await;
                return false;
            }
        };

        let previous = (record.package_id.take(), record.state, record.current);
        record.package_id = Some(package_id);
        record.state = RecordState::Imported;
        record.current = true;
        if let Err(e) = self.host.save_record(record).await {
            (record.package_id, record.state, record.current) = previous;
            self.record_failure(record, format!("Exception in import stage: {e}"))
                .await;
            return false;
        }

        info!(package_id = ?record.package_id, "Record imported");
        true
    }

    async fn import_package(
        &self,
        job: &HarvestJob,
        record: &HarvestRecord,
    ) -> Result<String, HarvestError> {
        let raw = record.content.as_deref().ok_or(HarvestError::MissingRecord)?;
        let content: ContentMapping = serde_json::from_str(raw)
            .map_err(|e| HarvestError::ImportAssemblyFailed(format!("invalid content: {e}")))?;

        let mut package = assemble_package(&record.identifier, &content, &self.options);
        package.owner_org = self.host.owning_organization(&job.source).await?;

        let (sets, series) = group_names(&content);
        let mut groups = self.find_or_create_groups(&sets).await?;
        groups.extend(self.find_or_create_groups(&series).await?);
        package.groups = groups;

        let package = self.hooks.extend_package(&content, package)?;

        debug!(package_id = %package.id, name = %package.name, "Submitting package");
        Ok(self.host.create_or_update_package(&package, record).await?)
    }

    /// Looks every group up and creates the ones that do not exist yet.
    async fn find_or_create_groups(&self, names: &[String]) -> Result<Vec<String>, HarvestError> {
        let mut group_ids = Vec::with_capacity(names.len());
        for name in names {
            let group = group_ref(name);
            let group_id = match self.host.lookup_group(&group).await {
                Ok(id) => {
                    debug!(group_id = %id, "Found group");
                    id
                }
                Err(_) => {
                    let id = self.host.create_group(&group).await?;
                    info!(group_id = %id, "Created group");
                    id
                }
            };
            group_ids.push(group_id);
        }
        Ok(group_ids)
    }

    async fn record_failure(&self, record: &mut HarvestRecord, message: String) {
        warn!(identifier = %record.identifier, error = %message, "Stage failed");
        self.host.record_object_error(record, &message).await;
        record.errors.push(message);
    }
}

/// Normalizes an OAI datestamp (day or second granularity) to
/// `YYYY-MM-DDTHH:MM:SS`.
fn metadata_modified(datestamp: &str) -> Option<String> {
    let datestamp = datestamp.trim();
    if let Ok(moment) = DateTime::parse_from_rfc3339(datestamp) {
        return Some(
            moment
                .naive_utc()
                .format(METADATA_MODIFIED_FORMAT)
                .to_string(),
        );
    }
    NaiveDate::parse_from_str(datestamp, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|moment| moment.format(METADATA_MODIFIED_FORMAT).to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::mapping::PackageIdPolicy;
    use crate::harvest::traits::{OaiClient, RecordHeader};
    use crate::harvest::xml::XmlElement;
    use crate::memory::InMemoryCatalog;
    use crate::model::{HarvestSource, TargetPackage};
    use async_trait::async_trait;
    use futures_util::stream::{self, BoxStream};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // Scripted repository shared by all clients the factory builds
    #[derive(Default)]
    struct Repository {
        unreachable: bool,
        listing: Vec<Result<&'static str, &'static str>>,
        records: HashMap<String, (RecordHeader, String)>,
        builds: AtomicUsize,
    }

    impl Repository {
        fn listing(mut self, items: &[Result<&'static str, &'static str>]) -> Self {
            self.listing = items.to_vec();
            self
        }

        fn record(mut self, identifier: &str, set_specs: &[&str], metadata: &str) -> Self {
            let header = RecordHeader {
                identifier: identifier.to_string(),
                datestamp: Some("2021-03-04".to_string()),
                set_specs: set_specs.iter().map(|s| s.to_string()).collect(),
                deleted: false,
            };
            self.records
                .insert(identifier.to_string(), (header, metadata.to_string()));
            self
        }
    }

    struct ScriptedClient(Arc<Repository>);

    #[async_trait]
    impl OaiClient for ScriptedClient {
        async fn identify(&self) -> Result<(), HarvestError> {
            if self.0.unreachable {
                return Err(HarvestError::SourceUnreachable("connection refused".into()));
            }
            Ok(())
        }

        fn list_identifiers<'a>(
            &'a self,
            _metadata_prefix: &'a str,
            _set_spec: Option<&'a str>,
        ) -> BoxStream<'a, Result<String, HarvestError>> {
            let items: Vec<_> = self
                .0
                .listing
                .iter()
                .map(|item| match item {
                    Ok(id) => Ok(id.to_string()),
                    Err(reason) => Err(HarvestError::ListingFailed(reason.to_string())),
                })
                .collect();
            stream::iter(items).boxed()
        }

        async fn get_record(
            &self,
            identifier: &str,
            _metadata_prefix: &str,
        ) -> Result<OaiRecord, HarvestError> {
            let (header, metadata) = self
                .0
                .records
                .get(identifier)
                .ok_or_else(|| HarvestError::fetch_failed(identifier, "idDoesNotExist"))?;
            let metadata = XmlElement::parse(metadata)
                .map_err(|e| HarvestError::fetch_failed(identifier, e))?;
            Ok(OaiRecord {
                header: header.clone(),
                metadata,
            })
        }
    }

    struct ScriptedFactory(Arc<Repository>);

    impl ClientFactory for ScriptedFactory {
        fn build(
            &self,
            _source: &HarvestSource,
            _config: &SourceConfig,
        ) -> Result<Box<dyn OaiClient>, HarvestError> {
            self.0.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedClient(self.0.clone())))
        }
    }

    fn dc(fields: &str) -> String {
        format!(
            r#"<oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/"
                          xmlns:dc="http://purl.org/dc/elements/1.1/">{fields}</oai_dc:dc>"#
        )
    }

    fn job() -> HarvestJob {
        HarvestJob::new(
            "job-1",
            HarvestSource {
                id: "src-1".to_string(),
                url: "http://repo.example.org/oai".to_string(),
                config: Some(r#"{"set": "projectA"}"#.to_string()),
                owner_org: Some("org-1".to_string()),
            },
        )
    }

    fn harvester(
        repository: Repository,
    ) -> (OaipmhHarvester<InMemoryCatalog, ScriptedFactory>, Arc<Repository>) {
        let repository = Arc::new(repository);
        let harvester =
            OaipmhHarvester::new(InMemoryCatalog::new(), ScriptedFactory(repository.clone()));
        (harvester, repository)
    }

    async fn gathered_record(
        harvester: &OaipmhHarvester<InMemoryCatalog, ScriptedFactory>,
        job: &HarvestJob,
        identifier: &str,
    ) -> HarvestRecord {
        harvester.host().create_record(job, identifier).await.unwrap()
    }

    #[test]
    fn test_info() {
        let (harvester, _) = harvester(Repository::default());
        let info = harvester.info();
        assert_eq!(info.name, "OAI-PMH");
        assert_eq!(info.title, "OAI-PMH");
        assert_eq!(info.description, "Harvester for OAI-PMH data sources");
    }

    #[test]
    fn test_metadata_modified_formats() {
        assert_eq!(
            metadata_modified("2021-03-04").as_deref(),
            Some("2021-03-04T00:00:00")
        );
        assert_eq!(
            metadata_modified("2021-03-04T10:20:30Z").as_deref(),
            Some("2021-03-04T10:20:30")
        );
        assert_eq!(metadata_modified("last tuesday"), None);
    }

    #[tokio::test]
    async fn test_gather_handshake_failure() {
        let (harvester, _) = harvester(Repository {
            unreachable: true,
            ..Repository::default()
        }
        .listing(&[Ok("a")]));
        let job = job();

        assert!(harvester.gather(&job).await.is_none());

        let errors = harvester.host().job_errors(&job.id);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Could not gather anything from http://repo.example.org/oai"));
        assert!(harvester.host().records_for_job(&job.id).is_empty());
    }

    #[tokio::test]
    async fn test_gather_creates_records_in_order() {
        let (harvester, _) =
            harvester(Repository::default().listing(&[Ok("a"), Ok("b"), Ok("c")]));
        let job = job();

        let ids = harvester.gather(&job).await.unwrap();
        let records = harvester.host().records_for_job(&job.id);

        assert_eq!(ids.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.identifier.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(records.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), ids);
        assert!(records.iter().all(|r| r.state == RecordState::Discovered));
        assert!(harvester.host().job_errors(&job.id).is_empty());
    }

    #[tokio::test]
    async fn test_gather_empty_listing_is_success() {
        let (harvester, _) = harvester(Repository::default());
        assert_eq!(harvester.gather(&job()).await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_gather_listing_error_keeps_created_records() {
        let (harvester, _) =
            harvester(Repository::default().listing(&[Ok("a"), Ok("b"), Err("badResumptionToken")]));
        let job = job();

        assert!(harvester.gather(&job).await.is_none());
        assert_eq!(harvester.host().records_for_job(&job.id).len(), 2);
        assert_eq!(harvester.host().job_errors(&job.id).len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_stores_content() {
        let (harvester, repository) = harvester(Repository::default().record(
            "oai:repo:1",
            &["projectA"],
            &dc("<dc:title>Survey</dc:title><dc:subject>soil</dc:subject>"),
        ));
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert_eq!(record.state, RecordState::Fetched);

        let stored = harvester.host().load_record(&record.id).await.unwrap();
        let content: ContentMapping =
            serde_json::from_str(stored.content.as_deref().unwrap()).unwrap();
        assert_eq!(content["title"], ContentValue::List(vec!["Survey".to_string()]));
        assert_eq!(
            content["set_spec"],
            ContentValue::List(vec!["projectA".to_string()])
        );
        assert_eq!(
            content["metadata_modified"],
            ContentValue::Text("2021-03-04T00:00:00".to_string())
        );
        assert!(!content.contains_key("creator"));
        assert_eq!(repository.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_twice_overwrites_content() {
        let (harvester, _) = harvester(Repository::default().record(
            "oai:repo:1",
            &[],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        let first = record.content.clone();
        assert!(harvester.fetch(&job, &mut record).await);
        assert_eq!(record.content, first);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_record_discovered() {
        let (harvester, _) = harvester(Repository::default());
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:missing").await;

        assert!(!harvester.fetch(&job, &mut record).await);
        assert_eq!(record.state, RecordState::Discovered);
        assert!(record.content.is_none());

        let errors = harvester.host().object_errors(&record.id);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Get record failed"));
        assert_eq!(record.errors, errors);
    }

    #[tokio::test]
    async fn test_fetch_unsupported_format() {
        let (harvester, _) = harvester(Repository::default().record(
            "oai:repo:1",
            &[],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let mut job = job();
        job.source.config = Some(r#"{"metadata_prefix": "marc21"}"#.to_string());
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(!harvester.fetch(&job, &mut record).await);
        let errors = harvester.host().object_errors(&record.id);
        assert!(errors[0].contains("marc21"));
    }

    #[tokio::test]
    async fn test_import_builds_package() {
        let (harvester, _) = harvester(Repository::default().record(
            "http://repo.example.org/item/1",
            &["projectA"],
            &dc(r#"<dc:title>Survey</dc:title>
                   <dc:creator>Doe, J.</dc:creator><dc:creator>Roe, R.</dc:creator>
                   <dc:subject>soil</dc:subject><dc:language>en</dc:language>"#),
        ));
        let job = job();
        let mut record = gathered_record(&harvester, &job, "http://repo.example.org/item/1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert!(harvester.import(&job, Some(&mut record)).await);

        assert_eq!(record.state, RecordState::Imported);
        assert!(record.current);

        let packages = harvester.host().packages();
        assert_eq!(packages.len(), 1);
        let package = &packages[0];
        assert_eq!(Some(&package.id), record.package_id.as_ref());
        assert_eq!(package.id, package.name);
        assert_eq!(package.title.as_deref(), Some("Survey"));
        assert_eq!(package.author.as_deref(), Some("Doe, J., Roe, R."));
        assert_eq!(package.owner_org.as_deref(), Some("org-1"));
        assert_eq!(package.tags, vec!["soil"]);
        assert_eq!(package.resources.len(), 1);
        assert_eq!(package.resources[0].url, "http://repo.example.org/item/1");
        assert_eq!(package.resources[0].format, "HTML");
        assert_eq!(package.groups, vec!["projectA"]);
        assert!(package
            .extras
            .iter()
            .any(|e| e.key == "language" && e.value.as_deref() == Some("en")));
    }

    #[tokio::test]
    async fn test_import_twice_updates_same_package() {
        let (harvester, _) = harvester(Repository::default().record(
            "oai:repo:1",
            &["projectA"],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert!(harvester.import(&job, Some(&mut record)).await);
        let first_id = record.package_id.clone();
        assert!(harvester.import(&job, Some(&mut record)).await);

        assert_eq!(record.package_id, first_id);
        assert_eq!(harvester.host().packages().len(), 1);
        // the group created on the first import is found on the second
        assert_eq!(harvester.host().groups().len(), 1);
    }

    #[tokio::test]
    async fn test_import_set_spec_creates_one_group() {
        let (harvester, _) = harvester(Repository::default().record(
            "oai:repo:1",
            &["projectA"],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert!(harvester.import(&job, Some(&mut record)).await);

        let groups = harvester.host().groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "projecta");
        assert_eq!(groups[0].title, "projectA");
    }

    #[tokio::test]
    async fn test_import_groups_sets_before_series() {
        let codebook = r#"<codeBook xmlns="http://www.icpsr.umich.edu/DDI">
              <stdyDscr><citation>
                <titlStmt><titl>Household Panel</titl></titlStmt>
                <serStmt><serName>SHP</serName><serName>Panels</serName></serStmt>
              </citation></stdyDscr>
            </codeBook>"#;
        let (harvester, _) =
            harvester(Repository::default().record("oai:repo:1", &["projectA"], codebook));
        let mut job = job();
        job.source.config = Some(r#"{"set": "projectA", "metadata_prefix": "oai_ddi"}"#.to_string());
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert!(harvester.import(&job, Some(&mut record)).await);

        let package = harvester.host().package("oai-repo-1").unwrap();
        assert_eq!(package.title.as_deref(), Some("Household Panel"));
        assert_eq!(package.groups, vec!["projectA", "SHP", "Panels"]);

        let mut names: Vec<String> =
            harvester.host().groups().into_iter().map(|g| g.name).collect();
        names.sort();
        assert_eq!(names, vec!["panels", "projecta", "shp"]);
    }

    #[tokio::test]
    async fn test_import_without_record_has_no_side_effects() {
        let (harvester, _) = harvester(Repository::default());
        let job = job();

        assert!(!harvester.import(&job, None).await);

        let mut empty = gathered_record(&harvester, &job, "oai:repo:1").await;
        assert!(!harvester.import(&job, Some(&mut empty)).await);

        assert!(harvester.host().object_errors(&empty.id).is_empty());
        assert!(harvester.host().job_errors(&job.id).is_empty());
        assert!(empty.errors.is_empty());
        assert!(harvester.host().packages().is_empty());
    }

    #[tokio::test]
    async fn test_import_invalid_content_is_recorded() {
        let (harvester, _) = harvester(Repository::default());
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;
        record.content = Some("not json".to_string());
        record.state = RecordState::Fetched;

        assert!(!harvester.import(&job, Some(&mut record)).await);
        assert_eq!(record.state, RecordState::Fetched);
        assert!(record.package_id.is_none());

        let errors = harvester.host().object_errors(&record.id);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Exception in import stage"));
        assert!(harvester.host().packages().is_empty());
    }

    #[tokio::test]
    async fn test_raw_identifier_policy() {
        let (harvester, _) = harvester(Repository::default().record(
            "oai:Repo:1",
            &[],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let harvester = harvester.with_options(ImportOptions {
            id_policy: PackageIdPolicy::RawIdentifier,
            ..ImportOptions::default()
        });
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:Repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert!(harvester.import(&job, Some(&mut record)).await);

        let package = harvester.host().package("oai:Repo:1").unwrap();
        assert_eq!(package.name, "oai-repo-1");
    }

    #[derive(Default)]
    struct CountingHooks {
        before: AtomicUsize,
        after: AtomicUsize,
    }

    impl HarvestHooks for Arc<CountingHooks> {
        fn before_record_fetch(&self, _record: &HarvestRecord) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }

        fn after_record_fetch(&self, _record: &OaiRecord) {
            self.after.fetch_add(1, Ordering::SeqCst);
        }

        fn extend_package(
            &self,
            content: &ContentMapping,
            mut package: TargetPackage,
        ) -> Result<TargetPackage, HarvestError> {
            if content.contains_key("title") {
                package.notes = Some("extended".to_string());
            }
            Ok(package)
        }
    }

    #[tokio::test]
    async fn test_hooks_are_called() {
        let hooks = Arc::new(CountingHooks::default());
        let (harvester, _) = harvester(Repository::default().record(
            "oai:repo:1",
            &[],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let harvester = harvester.with_hooks(hooks.clone());
        let job = job();
        let mut missing = gathered_record(&harvester, &job, "oai:repo:2").await;
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(!harvester.fetch(&job, &mut missing).await);
        assert!(harvester.fetch(&job, &mut record).await);
        assert!(harvester.import(&job, Some(&mut record)).await);

        assert_eq!(hooks.before.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.after.load(Ordering::SeqCst), 1);
        let package = harvester.host().package("oai-repo-1").unwrap();
        assert_eq!(package.notes.as_deref(), Some("extended"));
    }

    struct RejectingHooks;

    impl HarvestHooks for RejectingHooks {
        fn extend_package(
            &self,
            _content: &ContentMapping,
            _package: TargetPackage,
        ) -> Result<TargetPackage, HarvestError> {
            Err(HarvestError::ImportAssemblyFailed("rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_hook_error_submits_nothing() {
        let (harvester, _) = harvester(Repository::default().record(
            "oai:repo:1",
            &["projectA"],
            &dc("<dc:title>Survey</dc:title>"),
        ));
        let harvester = harvester.with_hooks(RejectingHooks);
        let job = job();
        let mut record = gathered_record(&harvester, &job, "oai:repo:1").await;

        assert!(harvester.fetch(&job, &mut record).await);
        assert!(!harvester.import(&job, Some(&mut record)).await);
        assert_eq!(record.state, RecordState::Fetched);
        assert!(harvester.host().packages().is_empty());
    }

    #[tokio::test]
    async fn test_closure_client_factory() {
        let repository = Arc::new(Repository::default().listing(&[Ok("x")]));
        let shared = repository.clone();
        let factory = move |_: &HarvestSource,
                            _: &SourceConfig|
              -> Result<Box<dyn OaiClient>, HarvestError> {
            Ok(Box::new(ScriptedClient(shared.clone())))
        };
        let harvester = OaipmhHarvester::new(InMemoryCatalog::new(), factory);

        assert_eq!(harvester.gather(&job()).await.map(|ids| ids.len()), Some(1));
    }
}
