//! Simulated backend for leads and opportunities.
//!
//! Collections are read once per session from static JSON resources and
//! then served from an in-memory cache that update and create calls
//! mutate. Every uncached read and every mutation waits a random delay
//! first, and may fail with a synthetic network error.
//!
//! Cache locks are never held across an await, so each mutation is one
//! uninterrupted critical section.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand_distr::{Bernoulli, Distribution, Uniform};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ApiError, FETCH_LEADS_FAILED, FETCH_OPPORTUNITIES_FAILED};
use crate::types::{
    ConversionResult, Lead, LeadStatus, LeadUpdate, Opportunity, OpportunityDraft,
};
use crate::validation::{validate_score, INVALID_SCORE};

pub const LEADS_RESOURCE: &str = "data/leads.json";
pub const OPPORTUNITIES_RESOURCE: &str = "data/opportunities.json";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_TOKEN_LEN: usize = 9;

// ============================================================================
// Resource sources
// ============================================================================

/// Raw response for a static resource read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: u16,
    pub body: String,
}

impl ResourceResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where static collections are read from.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn read(&self, path: &str) -> Result<ResourceResponse, ApiError>;
}

/// Serves resources from a directory. A missing file reads as 404.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ResourceSource for DirectorySource {
    async fn read(&self, path: &str) -> Result<ResourceResponse, ApiError> {
        let file = self.root.join(path);
        match tokio::fs::read_to_string(&file).await {
            Ok(body) => Ok(ResourceResponse::ok(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Resource not found: {}", file.display());
                Ok(ResourceResponse {
                    status: 404,
                    body: String::new(),
                })
            }
            Err(e) => Err(ApiError::Unavailable(format!("{}: {}", file.display(), e))),
        }
    }
}

/// Serves resources over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }
}

#[async_trait]
impl ResourceSource for HttpSource {
    async fn read(&self, path: &str) -> Result<ResourceResponse, ApiError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Unavailable(format!("Bad resource URL {}: {}", path, e)))?;
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ResourceResponse { status, body })
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Artificial latency and failure injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
}

fn default_min_delay_ms() -> u64 {
    300
}

fn default_max_delay_ms() -> u64 {
    1000
}

fn default_error_rate() -> f64 {
    0.1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            error_rate: default_error_rate(),
        }
    }
}

impl SimulationConfig {
    /// No delay and no synthetic failures.
    pub fn instant() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            error_rate: 0.0,
        }
    }

    /// Uniform delay in `[min, max]`.
    pub fn sample_delay(&self) -> Duration {
        if self.max_delay_ms <= self.min_delay_ms {
            return Duration::from_millis(self.min_delay_ms);
        }
        match Uniform::new_inclusive(self.min_delay_ms, self.max_delay_ms) {
            Ok(dist) => {
                let mut rng = rand::rng();
                Duration::from_millis(dist.sample(&mut rng))
            }
            Err(_) => Duration::from_millis(self.min_delay_ms),
        }
    }

    pub fn roll_failure(&self) -> bool {
        if self.error_rate <= 0.0 {
            return false;
        }
        match Bernoulli::new(self.error_rate.min(1.0)) {
            Ok(dist) => {
                let mut rng = rand::rng();
                dist.sample(&mut rng)
            }
            Err(_) => false,
        }
    }
}

/// `opp-<unix millis>-<9 base36 chars>`. Collisions are unlikely, not impossible.
pub fn generate_opportunity_id() -> String {
    let token: String = match Uniform::new(0u32, ID_ALPHABET.len() as u32) {
        Ok(dist) => {
            let mut rng = rand::rng();
            (0..ID_TOKEN_LEN)
                .map(|_| ID_ALPHABET[dist.sample(&mut rng) as usize] as char)
                .collect()
        }
        Err(_) => String::new(),
    };
    format!("opp-{}-{}", chrono::Utc::now().timestamp_millis(), token)
}

// ============================================================================
// Store
// ============================================================================

/// Session-scoped store. Construct once and share by `Arc`.
pub struct CrmStore {
    source: Arc<dyn ResourceSource>,
    simulation: SimulationConfig,
    leads: RwLock<Option<Vec<Lead>>>,
    opportunities: RwLock<Option<Vec<Opportunity>>>,
}

impl CrmStore {
    pub fn new(source: Arc<dyn ResourceSource>, simulation: SimulationConfig) -> Self {
        Self {
            source,
            simulation,
            leads: RwLock::new(None),
            opportunities: RwLock::new(None),
        }
    }

    pub async fn fetch_leads(&self) -> Result<Vec<Lead>, ApiError> {
        if let Some(leads) = self.cached_leads() {
            return Ok(leads);
        }
        let mut leads: Vec<Lead> = self.load(LEADS_RESOURCE, FETCH_LEADS_FAILED).await?;
        leads.retain(|lead| {
            let valid = validate_score(lead.score);
            if !valid {
                log::warn!("Skipping lead {}: score {} out of range", lead.id, lead.score);
            }
            valid
        });
        log::info!("Loaded {} leads", leads.len());
        // A concurrent load may have filled the cache first; keep its state.
        Ok(self.leads.write().get_or_insert(leads).clone())
    }

    pub async fn fetch_opportunities(&self) -> Result<Vec<Opportunity>, ApiError> {
        if let Some(opportunities) = self.cached_opportunities() {
            return Ok(opportunities);
        }
        let opportunities: Vec<Opportunity> = self
            .load(OPPORTUNITIES_RESOURCE, FETCH_OPPORTUNITIES_FAILED)
            .await?;
        log::info!("Loaded {} opportunities", opportunities.len());
        Ok(self
            .opportunities
            .write()
            .get_or_insert(opportunities)
            .clone())
    }

    /// Drop the cached leads and read them again.
    pub async fn refresh_leads(&self) -> Result<Vec<Lead>, ApiError> {
        *self.leads.write() = None;
        self.fetch_leads().await
    }

    pub async fn refresh_opportunities(&self) -> Result<Vec<Opportunity>, ApiError> {
        *self.opportunities.write() = None;
        self.fetch_opportunities().await
    }

    /// Merge `update` into the cached lead. Last write wins.
    pub async fn update_lead(&self, id: &str, update: &LeadUpdate) -> Result<Lead, ApiError> {
        self.simulate().await?;
        self.fetch_leads().await?;

        if let Some(score) = update.score {
            if !validate_score(score) {
                return Err(ApiError::Validation {
                    field: "score".to_string(),
                    message: INVALID_SCORE.to_string(),
                });
            }
        }

        let mut guard = self.leads.write();
        let lead = guard
            .as_mut()
            .and_then(|leads| leads.iter_mut().find(|lead| lead.id == id))
            .ok_or_else(ApiError::lead_not_found)?;
        *lead = lead.merged(update);
        log::debug!("Updated lead {}", id);
        Ok(lead.clone())
    }

    pub async fn create_opportunity(&self, draft: OpportunityDraft) -> Result<Opportunity, ApiError> {
        self.simulate().await?;
        self.fetch_opportunities().await?;

        let opportunity = draft.into_opportunity(generate_opportunity_id());
        self.opportunities
            .write()
            .get_or_insert_with(Vec::new)
            .push(opportunity.clone());
        log::info!("Created opportunity {} ({})", opportunity.id, opportunity.name);
        Ok(opportunity)
    }

    /// Qualify the lead, then create an opportunity that references it.
    ///
    /// Not transactional: if creation fails the lead stays qualified.
    pub async fn convert_lead_to_opportunity(
        &self,
        lead_id: &str,
        draft: OpportunityDraft,
    ) -> Result<ConversionResult, ApiError> {
        self.simulate().await?;

        let lead = self
            .update_lead(lead_id, &LeadUpdate::status(LeadStatus::Qualified))
            .await?;
        let draft = OpportunityDraft {
            lead_id: Some(lead_id.to_string()),
            ..draft
        };
        let opportunity = match self.create_opportunity(draft).await {
            Ok(opportunity) => opportunity,
            Err(e) => {
                log::warn!(
                    "Lead {} was qualified but opportunity creation failed: {}",
                    lead_id,
                    e
                );
                return Err(e);
            }
        };

        log::info!("Converted lead {} to opportunity {}", lead_id, opportunity.id);
        Ok(ConversionResult { lead, opportunity })
    }

    fn cached_leads(&self) -> Option<Vec<Lead>> {
        self.leads.read().clone()
    }

    fn cached_opportunities(&self) -> Option<Vec<Opportunity>> {
        self.opportunities.read().clone()
    }

    async fn simulate(&self) -> Result<(), ApiError> {
        let delay = self.simulation.sample_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.simulation.roll_failure() {
            return Err(ApiError::simulated());
        }
        Ok(())
    }

    async fn load<T: DeserializeOwned>(
        &self,
        resource: &str,
        failure_message: &str,
    ) -> Result<Vec<T>, ApiError> {
        self.simulate().await?;
        let response = self.source.read(resource).await?;
        if !response.is_ok() {
            log::warn!("Read of {} returned HTTP {}", resource, response.status);
            return Err(ApiError::Status {
                status: response.status,
                message: failure_message.to_string(),
            });
        }
        serde_json::from_str(&response.body).map_err(|e| ApiError::Parse {
            resource: resource.to_string(),
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{ErrorKind, ErrorState};
    use crate::types::{LeadSource, OpportunityStage};
    use tempfile::TempDir;

    pub(crate) const LEADS_JSON: &str = r#"[
        {"id":"L1","name":"Ada Park","company":"Acme","email":"ada@acme.com","source":"website","score":30,"status":"new"},
        {"id":"L2","name":"Ben Ortiz","company":"Globex","email":"ben@globex.io","source":"referral","score":90,"status":"contacted"},
        {"id":"L3","name":"Cleo Ng","company":"Initech","email":"cleo@initech.com","source":"cold_call","score":55,"status":"unqualified"}
    ]"#;

    pub(crate) const OPPORTUNITIES_JSON: &str = r#"[
        {"id":"O1","name":"Globex renewal","stage":"proposal","amount":12000,"accountName":"Globex"}
    ]"#;

    /// Fixed responses per path; unknown paths read as 404.
    pub(crate) struct StaticSource {
        pub(crate) responses: Vec<(&'static str, ResourceResponse)>,
    }

    #[async_trait]
    impl ResourceSource for StaticSource {
        async fn read(&self, path: &str) -> Result<ResourceResponse, ApiError> {
            Ok(self
                .responses
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, r)| r.clone())
                .unwrap_or(ResourceResponse {
                    status: 404,
                    body: String::new(),
                }))
        }
    }

    pub(crate) fn write_fixtures(dir: &TempDir) {
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("leads.json"), LEADS_JSON).unwrap();
        std::fs::write(data.join("opportunities.json"), OPPORTUNITIES_JSON).unwrap();
    }

    pub(crate) fn fixture_store(dir: &TempDir) -> CrmStore {
        write_fixtures(dir);
        CrmStore::new(
            Arc::new(DirectorySource::new(dir.path())),
            SimulationConfig::instant(),
        )
    }

    fn draft() -> OpportunityDraft {
        OpportunityDraft {
            name: "Deal".to_string(),
            stage: OpportunityStage::Prospecting,
            amount: None,
            account_name: "Acme".to_string(),
            lead_id: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_leads_reads_and_caches() {
        let dir = TempDir::new().unwrap();
        let store = fixture_store(&dir);

        let leads = store.fetch_leads().await.unwrap();
        assert_eq!(leads.len(), 3);
        assert_eq!(leads[2].source, LeadSource::ColdCall);

        // Served from cache even after the file disappears.
        std::fs::remove_file(dir.path().join("data/leads.json")).unwrap();
        assert_eq!(store.fetch_leads().await.unwrap().len(), 3);

        let err = store.refresh_leads().await.unwrap_err();
        assert_eq!(err.to_string(), FETCH_LEADS_FAILED);
    }

    #[tokio::test]
    async fn test_http_500_yields_fixed_message() {
        let source = StaticSource {
            responses: vec![(
                LEADS_RESOURCE,
                ResourceResponse {
                    status: 500,
                    body: "oops".to_string(),
                },
            )],
        };
        let store = CrmStore::new(Arc::new(source), SimulationConfig::instant());

        let err = store.fetch_leads().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch leads");
        assert!(err.is_retryable());

        let err = store.fetch_opportunities().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch opportunities");
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let source = StaticSource {
            responses: vec![(LEADS_RESOURCE, ResourceResponse::ok("[{not json"))],
        };
        let store = CrmStore::new(Arc::new(source), SimulationConfig::instant());
        let err = store.fetch_leads().await.unwrap_err();
        assert!(matches!(err, ApiError::Parse { .. }));
        assert!(err.is_retryable());
        assert_eq!(ErrorState::from(&err).kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_dropped_on_load() {
        let body = r#"[
            {"id":"L1","name":"Ada Park","company":"Acme","email":"ada@acme.com","source":"website","score":250,"status":"new"},
            {"id":"L2","name":"Ben Ortiz","company":"Globex","email":"ben@globex.io","source":"referral","score":90,"status":"contacted"},
            {"id":"L3","name":"Cleo Ng","company":"Initech","email":"cleo@initech.com","source":"cold_call","score":-7,"status":"new"},
            {"id":"L4","name":"Dev Rao","company":"Hooli","email":"dev@hooli.com","source":"linkedin","score":100,"status":"new"}
        ]"#;
        let source = StaticSource {
            responses: vec![(LEADS_RESOURCE, ResourceResponse::ok(body))],
        };
        let store = CrmStore::new(Arc::new(source), SimulationConfig::instant());
        let leads = store.fetch_leads().await.unwrap();
        let ids: Vec<&str> = leads.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["L2", "L4"]);
        assert!(leads.iter().all(|l| validate_score(l.score)));

        let err = store.update_lead("L1", &LeadUpdate::status(LeadStatus::Contacted)).await;
        assert!(matches!(err, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_lead_merges_into_cache() {
        let dir = TempDir::new().unwrap();
        let store = fixture_store(&dir);

        let update = LeadUpdate {
            email: Some("ada@acme.io".to_string()),
            score: Some(64),
            ..LeadUpdate::default()
        };
        let lead = store.update_lead("L1", &update).await.unwrap();
        assert_eq!(lead.email, "ada@acme.io");
        assert_eq!(lead.score, 64);
        assert_eq!(lead.name, "Ada Park");

        let leads = store.fetch_leads().await.unwrap();
        assert_eq!(leads[0], lead);
    }

    #[tokio::test]
    async fn test_update_missing_lead_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = fixture_store(&dir);
        let err = store
            .update_lead("nope", &LeadUpdate::status(LeadStatus::Contacted))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Lead not found");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range_score() {
        let dir = TempDir::new().unwrap();
        let store = fixture_store(&dir);
        let update = LeadUpdate {
            score: Some(101),
            ..LeadUpdate::default()
        };
        let err = store.update_lead("L1", &update).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        assert_eq!(store.fetch_leads().await.unwrap()[0].score, 30);
    }

    #[tokio::test]
    async fn test_create_opportunity_appends() {
        let dir = TempDir::new().unwrap();
        let store = fixture_store(&dir);

        let created = store.create_opportunity(draft()).await.unwrap();
        assert!(created.id.starts_with("opp-"));
        assert_eq!(created.account_name, "Acme");

        let all = store.fetch_opportunities().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], created);
    }

    #[tokio::test]
    async fn test_convert_lead_scenario() {
        let dir = TempDir::new().unwrap();
        let store = fixture_store(&dir);

        let result = store
            .convert_lead_to_opportunity("L1", draft())
            .await
            .unwrap();
        assert_eq!(result.lead.status, LeadStatus::Qualified);
        assert_eq!(result.opportunity.lead_id.as_deref(), Some("L1"));

        let leads = store.fetch_leads().await.unwrap();
        assert_eq!(leads[0].status, LeadStatus::Qualified);
    }

    #[tokio::test]
    async fn test_convert_is_not_transactional() {
        let source = StaticSource {
            responses: vec![(LEADS_RESOURCE, ResourceResponse::ok(LEADS_JSON))],
        };
        let store = CrmStore::new(Arc::new(source), SimulationConfig::instant());

        let err = store
            .convert_lead_to_opportunity("L1", draft())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), FETCH_OPPORTUNITIES_FAILED);

        let leads = store.fetch_leads().await.unwrap();
        assert_eq!(leads[0].status, LeadStatus::Qualified);
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let dir = TempDir::new().unwrap();
        write_fixtures(&dir);
        let simulation = SimulationConfig {
            error_rate: 1.0,
            ..SimulationConfig::instant()
        };
        let store = CrmStore::new(Arc::new(DirectorySource::new(dir.path())), simulation);
        let err = store.fetch_leads().await.unwrap_err();
        assert_eq!(err.to_string(), "Simulated network error");
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncached_read_waits_simulated_delay() {
        let dir = TempDir::new().unwrap();
        write_fixtures(&dir);
        let simulation = SimulationConfig {
            min_delay_ms: 300,
            max_delay_ms: 1000,
            error_rate: 0.0,
        };
        let store = CrmStore::new(Arc::new(DirectorySource::new(dir.path())), simulation);

        let started = tokio::time::Instant::now();
        store.fetch_leads().await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300));
        assert!(waited <= Duration::from_millis(1100));

        let started = tokio::time::Instant::now();
        store.fetch_leads().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[test]
    fn test_sample_delay_bounds() {
        let sim = SimulationConfig::default();
        for _ in 0..50 {
            let d = sim.sample_delay();
            assert!(d >= Duration::from_millis(300) && d <= Duration::from_millis(1000));
        }
        assert_eq!(SimulationConfig::instant().sample_delay(), Duration::ZERO);
        assert!(!SimulationConfig::instant().roll_failure());
    }

    #[test]
    fn test_generate_opportunity_id_format() {
        let id = generate_opportunity_id();
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "opp");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_TOKEN_LEN);
        assert!(parts[2].bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_ne!(generate_opportunity_id(), id);
    }

    #[tokio::test]
    async fn test_bundled_data_parses() {
        let store = CrmStore::new(
            Arc::new(DirectorySource::new(env!("CARGO_MANIFEST_DIR"))),
            SimulationConfig::instant(),
        );
        let leads = store.fetch_leads().await.unwrap();
        assert!(!leads.is_empty());
        assert!(leads.iter().all(|l| validate_score(l.score)));
        let opportunities = store.fetch_opportunities().await.unwrap();
        assert!(opportunities.iter().any(|o| o.amount.is_none()));
    }
}
