//! Leads list view model.
//!
//! Holds the loaded leads, load/error state, search and sort state, and
//! the optimistic overlay. Every read goes through the overlay so an
//! in-flight edit shows up everywhere at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::collection::{
    CollectionOptions, CollectionProcessor, DebounceState, Filter, SortConfig,
};
use crate::error::{ApiError, ErrorState, GENERIC_ERROR};
use crate::optimistic::OptimisticUpdater;
use crate::preferences::{
    default_lead_sort, Choice, LeadFilters, PreferenceStore, LEAD_FILTERS_KEY, LEAD_SORT_KEY,
};
use crate::store::CrmStore;
use crate::types::{ConversionResult, Lead, LeadField, LeadStatus, LeadUpdate, OpportunityDraft};
use crate::validation::{clamp_search_query, validate_lead_update};

pub const LEAD_SEARCH_FIELDS: [LeadField; 3] = [LeadField::Name, LeadField::Company, LeadField::Email];

const LEAD_UPDATED: &str = "Lead updated successfully";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadState {
    pub loading: bool,
    pub error: Option<ErrorState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilterStats {
    pub total: usize,
    pub filtered: usize,
    pub status_counts: Vec<(LeadStatus, usize)>,
    pub is_filtered: bool,
}

fn status_filter(choice: Choice<LeadStatus>) -> Option<Filter<Lead>> {
    match choice {
        Choice::All => None,
        Choice::Only(_) => Some(Arc::new(move |lead: &Lead| choice.matches(&lead.status))),
    }
}

pub struct LeadsView {
    store: Arc<CrmStore>,
    preferences: Arc<PreferenceStore>,
    updater: OptimisticUpdater<String, Lead>,
    update_error: Arc<RwLock<Option<ErrorState>>>,
    leads: RwLock<Vec<Lead>>,
    state: RwLock<LoadState>,
    collection: Mutex<CollectionProcessor<Lead>>,
    filters: Mutex<LeadFilters>,
}

impl LeadsView {
    pub fn new(store: Arc<CrmStore>, preferences: Arc<PreferenceStore>, debounce: Duration) -> Self {
        let filters = preferences.get(LEAD_FILTERS_KEY, LeadFilters::default());
        let sort = preferences.get(LEAD_SORT_KEY, default_lead_sort());

        let mut options = CollectionOptions::default()
            .search_fields(LEAD_SEARCH_FIELDS)
            .sort(sort.field, sort.direction)
            .debounce(debounce);
        options.filter = status_filter(filters.status);

        let update_error = Arc::new(RwLock::new(None));
        let error_slot = update_error.clone();
        let updater = OptimisticUpdater::new()
            .on_success(|lead: &Lead| log::info!("{}: {}", LEAD_UPDATED, lead.id))
            .on_error(move |err: &ApiError| *error_slot.write() = Some(ErrorState::from(err)));

        Self {
            store,
            preferences,
            updater,
            update_error,
            leads: RwLock::new(Vec::new()),
            state: RwLock::new(LoadState::default()),
            collection: Mutex::new(CollectionProcessor::new(options)),
            filters: Mutex::new(filters),
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Fetch leads into the view. Also the retry action after a failure.
    pub async fn load(&self) -> Result<(), ErrorState> {
        self.begin_load();
        let result = self.store.fetch_leads().await;
        self.finish_load(result)
    }

    /// Discard the session cache and read the resource again.
    pub async fn reload(&self) -> Result<(), ErrorState> {
        self.begin_load();
        let result = self.store.refresh_leads().await;
        self.finish_load(result)
    }

    pub fn load_state(&self) -> LoadState {
        self.state.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<ErrorState> {
        self.state.read().error.clone()
    }

    /// Last failed optimistic update, if any.
    pub fn update_error(&self) -> Option<ErrorState> {
        self.update_error.read().clone()
    }

    pub fn clear_update_error(&self) {
        *self.update_error.write() = None;
    }

    fn begin_load(&self) {
        let mut state = self.state.write();
        state.loading = true;
        state.error = None;
    }

    fn finish_load(&self, result: Result<Vec<Lead>, ApiError>) -> Result<(), ErrorState> {
        match result {
            Ok(leads) => {
                *self.leads.write() = leads;
                *self.state.write() = LoadState::default();
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to load leads: {}", e);
                let error = ErrorState::from(&e);
                self.leads.write().clear();
                *self.state.write() = LoadState {
                    loading: false,
                    error: Some(error.clone()),
                };
                Err(error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads (always through the optimistic overlay)
    // ------------------------------------------------------------------

    pub fn leads(&self) -> Vec<Lead> {
        self.leads
            .read()
            .iter()
            .map(|lead| self.updater.get(&lead.id, lead.clone()))
            .collect()
    }

    pub fn lead_by_id(&self, id: &str) -> Option<Lead> {
        self.leads().into_iter().find(|lead| lead.id == id)
    }

    pub fn is_lead_updating(&self, id: &str) -> bool {
        self.updater.has_pending(&id.to_string())
    }

    /// Filtered, searched and sorted leads.
    pub fn visible_leads(&self) -> Vec<Lead> {
        let leads = self.leads();
        let collection = self.collection.lock();
        collection.process(&leads).into_iter().cloned().collect()
    }

    pub fn page(&self, page: usize, page_size: usize) -> Vec<Lead> {
        let leads = self.leads();
        let collection = self.collection.lock();
        collection
            .paginate(&leads, page, page_size)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn total_pages(&self, page_size: usize) -> usize {
        let leads = self.leads();
        self.collection.lock().total_pages(&leads, page_size)
    }

    pub fn filter_stats(&self) -> LeadFilterStats {
        let leads = self.leads();
        let filtered = self.collection.lock().process(&leads).len();
        let status_counts = LeadStatus::ALL
            .iter()
            .map(|status| (*status, leads.iter().filter(|l| l.status == *status).count()))
            .collect();
        let searching = !self.collection.lock().debounced_search_term().is_empty();
        LeadFilterStats {
            total: leads.len(),
            filtered,
            status_counts,
            is_filtered: searching || !self.filters.lock().status.is_all(),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Optimistically apply `update`, then write it through the store.
    pub async fn update_lead(&self, id: &str, update: LeadUpdate) -> Result<Lead, ErrorState> {
        if let Some(invalid) = validate_lead_update(&update).into_iter().next() {
            return Err(ErrorState::from(&ApiError::Validation {
                field: invalid.field.to_string(),
                message: invalid.message,
            }));
        }
        let current = self
            .lead_by_id(id)
            .ok_or_else(|| ErrorState::from(&ApiError::lead_not_found()))?;
        let optimistic = current.merged(&update);

        let mut failure = None;
        let result = self
            .updater
            .perform(id.to_string(), optimistic, async {
                self.store.update_lead(id, &update).await.map_err(|e| {
                    failure = Some(ErrorState::from(&e));
                    e
                })
            })
            .await;

        match result {
            Some(lead) => {
                self.replace_lead(lead.clone());
                Ok(lead)
            }
            None => Err(failure.unwrap_or_else(|| {
                ErrorState::from(&ApiError::Network(GENERIC_ERROR.to_string()))
            })),
        }
    }

    /// Qualify `id` and create its opportunity through the store.
    pub async fn convert_lead(
        &self,
        id: &str,
        draft: OpportunityDraft,
    ) -> Result<ConversionResult, ErrorState> {
        match self.store.convert_lead_to_opportunity(id, draft).await {
            Ok(result) => {
                self.replace_lead(result.lead.clone());
                Ok(result)
            }
            Err(e) => {
                // The lead may be qualified even though creation failed.
                if let Ok(leads) = self.store.fetch_leads().await {
                    if let Some(lead) = leads.into_iter().find(|lead| lead.id == id) {
                        self.replace_lead(lead);
                    }
                }
                Err(ErrorState::from(&e))
            }
        }
    }

    fn replace_lead(&self, updated: Lead) {
        let mut leads = self.leads.write();
        if let Some(slot) = leads.iter_mut().find(|lead| lead.id == updated.id) {
            *slot = updated;
        }
    }

    // ------------------------------------------------------------------
    // Search, filter, sort
    // ------------------------------------------------------------------

    pub fn set_search(&self, term: &str) {
        self.collection.lock().set_search_term(clamp_search_query(term));
    }

    pub fn search_term(&self) -> String {
        self.collection.lock().search_term().to_string()
    }

    pub fn is_searching(&self) -> bool {
        self.collection.lock().is_searching()
    }

    pub fn poll_search(&self) -> bool {
        self.collection.lock().poll_search()
    }

    /// Wait out the pending debounce, if any, then apply it.
    pub async fn settle_search(&self) -> bool {
        let deadline = match self.collection.lock().search_state() {
            DebounceState::Pending { deadline, .. } => deadline,
            _ => return false,
        };
        tokio::time::sleep_until(deadline).await;
        self.collection.lock().poll_search()
    }

    pub fn filters(&self) -> LeadFilters {
        let mut filters = self.filters.lock().clone();
        filters.search = self.search_term();
        filters
    }

    pub fn set_status_filter(&self, status: Choice<LeadStatus>) {
        let mut filters = self.filters.lock();
        filters.status = status;
        self.persist(LEAD_FILTERS_KEY, &*filters);
        self.collection.lock().set_filter(status_filter(status));
    }

    pub fn sort_config(&self) -> Option<SortConfig<LeadField>> {
        self.collection.lock().sort_config()
    }

    pub fn update_sort(&self, field: LeadField) {
        let sort = {
            let mut collection = self.collection.lock();
            collection.handle_sort(field);
            collection.sort_config()
        };
        if let Some(sort) = sort {
            self.persist(LEAD_SORT_KEY, &sort);
        }
    }

    /// Reset the status filter and search; sort is kept.
    pub fn clear_filters(&self) {
        self.set_status_filter(Choice::All);
        self.collection.lock().clear_search();
    }

    /// Reset filters, search and sort to their defaults and forget the
    /// stored filter and sort entries.
    pub fn reset_all(&self) {
        *self.filters.lock() = LeadFilters::default();
        for key in [LEAD_FILTERS_KEY, LEAD_SORT_KEY] {
            if let Err(e) = self.preferences.remove(key) {
                log::warn!("Failed to clear {}: {}", key, e);
            }
        }
        let mut collection = self.collection.lock();
        collection.reset();
        collection.set_filter(None);
        collection.set_sort(Some(default_lead_sort()));
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.preferences.set(key, value) {
            log::warn!("Failed to persist {}: {}", key, e);
        }
    }
}
