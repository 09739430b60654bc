use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::intake::{
    ApplicantStore, HttpScoringClient, InMemoryStore, IntakePipeline, PipelineTimeouts,
    RangePolicy, RestStore, RuleBasedScorer, ScoringService,
};

/// Pipeline over whichever scorer and store the configuration selected.
pub type DynPipeline = IntakePipeline<dyn ScoringService, dyn ApplicantStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) pipeline: Arc<DynPipeline>,
}

/// Construct the scorer and store named by `config` and wire them into a pipeline.
pub fn build_pipeline(config: &AppConfig) -> Result<Arc<DynPipeline>, AppError> {
    let scoring: Arc<dyn ScoringService> = match &config.scoring.base_url {
        Some(base_url) => {
            info!(%base_url, "using remote scoring service");
            Arc::new(HttpScoringClient::new(
                base_url.as_str(),
                config.scoring.timeout,
            )?)
        }
        None => {
            warn!("SCORING_SERVICE_URL not set; falling back to the rule-based scorer");
            Arc::new(RuleBasedScorer)
        }
    };

    let store: Arc<dyn ApplicantStore> = match &config.store.rest {
        Some(rest) => {
            info!(url = %rest.url, table = %config.store.table, "using REST store");
            Arc::new(RestStore::new(
                &rest.url,
                &rest.api_key,
                &config.store.table,
                config.store.timeout,
            )?)
        }
        None => {
            warn!("SUPABASE_URL not set; records are kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    let policy = if config.intake.enforce_ranges {
        RangePolicy::enforced()
    } else {
        RangePolicy::advisory()
    };

    let pipeline = IntakePipeline::new(scoring, store, policy).with_timeouts(PipelineTimeouts {
        scoring: config.scoring.timeout,
        store: config.store.timeout,
    });
    Ok(Arc::new(pipeline))
}
