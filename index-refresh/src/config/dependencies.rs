//! Dependency initialization and wiring for the index refresh tool.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use index_refresh_admin::{
    AliasSwitcher, GuardrailConfig, GuardrailValidator, IndexCleaner, Reindexer,
};
use index_refresh_ingest::dlq::QueueArn;
use index_refresh_ingest::{
    ErrorReporter, IngestRunner, ResumeTracker, S3ObjectStore, SourceCatalog, SqsDlqSink,
};
use index_refresh_repository::{OpenSearchClient, SearchIndexProvider};
use tracing::{info, warn};

use super::Settings;
use crate::IndexingError;

/// Container for the initialized search cluster dependencies.
pub struct Dependencies {
    pub settings: Settings,
    pub provider: Arc<dyn SearchIndexProvider>,
    pub validator: Arc<GuardrailValidator>,
}

impl Dependencies {
    /// Connect to the search cluster described by `settings`.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the client cannot be built or the cluster is unreachable
    pub async fn new(settings: Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch.url,
            authenticated = settings.opensearch.credentials().is_some(),
            verify_ssl = settings.opensearch.verify_ssl,
            "Initializing dependencies"
        );

        let client = OpenSearchClient::new(&settings.opensearch).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch client: {}", e))
        })?;
        client
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;
        info!("OpenSearch connection verified");

        let provider: Arc<dyn SearchIndexProvider> = Arc::new(client);
        let validator = Arc::new(GuardrailValidator::new(
            provider.clone(),
            GuardrailConfig {
                count_threshold_percent: settings.count_threshold_percent,
            },
        ));

        Ok(Self {
            settings,
            provider,
            validator,
        })
    }

    pub fn cleaner(&self) -> IndexCleaner {
        IndexCleaner::new(self.provider.clone(), self.validator.clone())
    }

    pub fn reindexer(&self) -> Reindexer {
        Reindexer::new(self.provider.clone(), self.validator.clone())
    }

    pub fn alias_switcher(&self) -> AliasSwitcher {
        AliasSwitcher::new(self.provider.clone(), self.validator.clone())
    }

    /// Build the ingestion runner.
    ///
    /// AWS clients are only created when object storage is read or the DLQ
    /// is enabled.
    pub async fn ingest_runner(&self, use_object_storage: bool) -> Result<IngestRunner, IndexingError> {
        let dlq_arn = self.dlq_arn();
        let aws = if use_object_storage || dlq_arn.is_some() {
            Some(self.aws_config().await)
        } else {
            None
        };

        let catalog = match (&aws, use_object_storage) {
            (Some(aws), true) => SourceCatalog::new(Arc::new(S3ObjectStore::new(
                aws_sdk_s3::Client::new(aws),
            ))),
            _ => SourceCatalog::local_only(),
        };

        let reporter = match (&aws, dlq_arn) {
            (Some(aws), Some(arn)) => {
                let sink = SqsDlqSink::from_arn(aws_sdk_sqs::Client::new(aws), &arn).await?;
                ErrorReporter::new(Arc::new(sink))
            }
            _ => {
                info!("DLQ disabled, failed records will be logged");
                ErrorReporter::disabled()
            }
        };

        let tracker = ResumeTracker::load(&self.settings.tracking_file).await?;

        Ok(IngestRunner::new(
            self.provider.clone(),
            self.validator.clone(),
            Arc::new(catalog),
            Arc::new(reporter),
            Arc::new(tracker),
        ))
    }

    /// The queue ARN when the DLQ is enabled and the ARN is usable.
    fn dlq_arn(&self) -> Option<String> {
        if !self.settings.dlq_enabled {
            return None;
        }
        match &self.settings.dlq_arn {
            None => {
                warn!("DLQ enabled but SQS_DLQ_ARN is not set, disabling DLQ");
                None
            }
            Some(arn) => match QueueArn::parse(arn) {
                Ok(_) => Some(arn.clone()),
                Err(e) => {
                    warn!(error = %e, "Invalid SQS_DLQ_ARN, disabling DLQ");
                    None
                }
            },
        }
    }

    async fn aws_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &self.settings.aws_region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        loader.load().await
    }
}
