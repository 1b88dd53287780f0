use crate::harvest::pipeline::OaipmhHarvester;
use crate::harvest::traits::ClientFactory;
use crate::model::{HarvestJob, JobStatus, RecordState};
use crate::traits::CatalogHost;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Counts reported by [`HarvestExecutor::run_job`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub gathered: usize,
    pub fetched: usize,
    pub imported: usize,
    pub failed: usize,
}

/// In-process scheduler: gathers a job, then fetches and imports every
/// record with at most `concurrency_limit` records in flight.
///
/// Records whose fetch or import fails are marked `Errored`; the pipeline
/// itself leaves them in their previous state.
pub struct HarvestExecutor {
    semaphore: Arc<Semaphore>,
}

enum RecordOutcome {
    Imported,
    ImportFailed,
    FetchFailed,
}

impl HarvestExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    #[instrument(skip_all, fields(job_id = %job.id, source_url = %job.source.url))]
    pub async fn run_job<H, F>(
        &self,
        harvester: Arc<OaipmhHarvester<H, F>>,
        job: &mut HarvestJob,
    ) -> JobSummary
    where
        H: CatalogHost + 'static,
        F: ClientFactory + 'static,
    {
        job.status = JobStatus::Running;
        info!("Starting harvest job");

        let Some(record_ids) = harvester.gather(job).await else {
            job.status = JobStatus::Errored;
            warn!("Gather aborted, job errored");
            return JobSummary::default();
        };

        let mut summary = JobSummary {
            gathered: record_ids.len(),
            ..JobSummary::default()
        };

        let mut tasks = JoinSet::new();
        for record_id in record_ids {
            let harvester = harvester.clone();
            let semaphore = self.semaphore.clone();
            let job = job.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(process_record(&harvester, &job, &record_id).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(RecordOutcome::Imported)) => {
                    summary.fetched += 1;
                    summary.imported += 1;
                }
                Ok(Some(RecordOutcome::ImportFailed)) => {
                    summary.fetched += 1;
                    summary.failed += 1;
                }
                Ok(Some(RecordOutcome::FetchFailed)) | Ok(None) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "Record task failed");
                    summary.failed += 1;
                }
            }
        }

        job.status = JobStatus::Finished;
        info!(
            gathered = summary.gathered,
            imported = summary.imported,
            failed = summary.failed,
            "Finished harvest job"
        );
        summary
    }
}

async fn process_record<H, F>(
    harvester: &OaipmhHarvester<H, F>,
    job: &HarvestJob,
    record_id: &str,
) -> RecordOutcome
where
    H: CatalogHost,
    F: ClientFactory,
{
    let mut record = match harvester.host().load_record(record_id).await {
        Ok(record) => record,
        Err(e) => {
            error!(record_id, error = %e, "Could not load record");
            return RecordOutcome::FetchFailed;
        }
    };

    let outcome = if !harvester.fetch(job, &mut record).await {
        RecordOutcome::FetchFailed
    } else if !harvester.import(job, Some(&mut record)).await {
        RecordOutcome::ImportFailed
    } else {
        return RecordOutcome::Imported;
    };

    record.state = RecordState::Errored;
    if let Err(e) = harvester.host().save_record(&record).await {
        error!(record_id, error = %e, "Could not mark record errored");
    }
    outcome
}
