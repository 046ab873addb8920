//! Opportunities list view model.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::collection::{CollectionOptions, CollectionProcessor, DebounceState, Filter, SortConfig};
use crate::error::{ApiError, ErrorState};
use crate::leads::LoadState;
use crate::preferences::{
    default_opportunity_sort, Choice, OpportunityFilters, PreferenceStore, UserPreferences,
    OPPORTUNITY_FILTERS_KEY, USER_PREFERENCES_KEY,
};
use crate::store::CrmStore;
use crate::types::{Opportunity, OpportunityField, OpportunityStage};
use crate::validation::clamp_search_query;

pub const OPPORTUNITY_SEARCH_FIELDS: [OpportunityField; 2] =
    [OpportunityField::Name, OpportunityField::AccountName];

fn stage_filter(choice: Choice<OpportunityStage>) -> Option<Filter<Opportunity>> {
    match choice {
        Choice::All => None,
        Choice::Only(_) => Some(Arc::new(move |opp: &Opportunity| choice.matches(&opp.stage))),
    }
}

pub struct OpportunitiesView {
    store: Arc<CrmStore>,
    preferences: Arc<PreferenceStore>,
    opportunities: RwLock<Vec<Opportunity>>,
    state: RwLock<LoadState>,
    collection: Mutex<CollectionProcessor<Opportunity>>,
    filters: Mutex<OpportunityFilters>,
    page_size: usize,
}

impl OpportunitiesView {
    /// `defaults` apply until the user has saved their own preferences.
    pub fn new(
        store: Arc<CrmStore>,
        preferences: Arc<PreferenceStore>,
        defaults: UserPreferences,
    ) -> Self {
        let filters = preferences.get(OPPORTUNITY_FILTERS_KEY, OpportunityFilters::default());
        let user = preferences.get(USER_PREFERENCES_KEY, defaults);
        let sort = default_opportunity_sort();

        let mut options = CollectionOptions::default()
            .search_fields(OPPORTUNITY_SEARCH_FIELDS)
            .sort(sort.field, sort.direction)
            .debounce(Duration::from_millis(user.search_debounce_ms));
        options.filter = stage_filter(filters.stage);

        Self {
            store,
            preferences,
            opportunities: RwLock::new(Vec::new()),
            state: RwLock::new(LoadState::default()),
            collection: Mutex::new(CollectionProcessor::new(options)),
            filters: Mutex::new(filters),
            page_size: user.page_size,
        }
    }

    /// Fetch (or refetch) opportunities. Session-created deals are kept.
    pub async fn load(&self) -> Result<(), ErrorState> {
        self.begin_load();
        let result = self.store.fetch_opportunities().await;
        self.finish_load(result)
    }

    /// Discard the session cache, including created deals, and read again.
    pub async fn reload(&self) -> Result<(), ErrorState> {
        self.begin_load();
        let result = self.store.refresh_opportunities().await;
        self.finish_load(result)
    }

    fn begin_load(&self) {
        let mut state = self.state.write();
        state.loading = true;
        state.error = None;
    }

    fn finish_load(&self, result: Result<Vec<Opportunity>, ApiError>) -> Result<(), ErrorState> {
        match result {
            Ok(opportunities) => {
                *self.opportunities.write() = opportunities;
                *self.state.write() = LoadState::default();
                Ok(())
            }
            Err(e) => Err(self.fail(&e)),
        }
    }

    fn fail(&self, err: &ApiError) -> ErrorState {
        log::warn!("Failed to load opportunities: {}", err);
        let error = ErrorState::from(err);
        *self.state.write() = LoadState {
            loading: false,
            error: Some(error.clone()),
        };
        error
    }

    pub fn load_state(&self) -> LoadState {
        self.state.read().clone()
    }

    pub fn error(&self) -> Option<ErrorState> {
        self.state.read().error.clone()
    }

    pub fn opportunities(&self) -> Vec<Opportunity> {
        self.opportunities.read().clone()
    }

    /// Add a deal created elsewhere (lead conversion) without a refetch.
    pub fn record_created(&self, opportunity: Opportunity) {
        let mut opportunities = self.opportunities.write();
        if !opportunities.iter().any(|o| o.id == opportunity.id) {
            opportunities.push(opportunity);
        }
    }

    pub fn visible_opportunities(&self) -> Vec<Opportunity> {
        let opportunities = self.opportunities.read();
        let collection = self.collection.lock();
        collection.process(&opportunities).into_iter().cloned().collect()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One-based page at the preferred page size.
    pub fn page(&self, page: usize) -> Vec<Opportunity> {
        let opportunities = self.opportunities.read();
        let collection = self.collection.lock();
        collection
            .paginate(&opportunities, page, self.page_size)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn total_pages(&self) -> usize {
        let opportunities = self.opportunities.read();
        self.collection.lock().total_pages(&opportunities, self.page_size)
    }

    /// Sum of known amounts among the visible deals.
    pub fn visible_pipeline(&self) -> f64 {
        self.visible_opportunities()
            .iter()
            .filter_map(|o| o.amount)
            .sum()
    }

    pub fn set_search(&self, term: &str) {
        self.collection.lock().set_search_term(clamp_search_query(term));
    }

    pub fn search_term(&self) -> String {
        self.collection.lock().search_term().to_string()
    }

    pub fn is_searching(&self) -> bool {
        self.collection.lock().is_searching()
    }

    pub async fn settle_search(&self) -> bool {
        let deadline = match self.collection.lock().search_state() {
            DebounceState::Pending { deadline, .. } => deadline,
            _ => return false,
        };
        tokio::time::sleep_until(deadline).await;
        self.collection.lock().poll_search()
    }

    pub fn set_stage_filter(&self, stage: Choice<OpportunityStage>) {
        let mut filters = self.filters.lock();
        filters.stage = stage;
        if let Err(e) = self.preferences.set(OPPORTUNITY_FILTERS_KEY, &*filters) {
            log::warn!("Failed to persist {}: {}", OPPORTUNITY_FILTERS_KEY, e);
        }
        self.collection.lock().set_filter(stage_filter(stage));
    }

    pub fn stage_filter(&self) -> Choice<OpportunityStage> {
        self.filters.lock().stage
    }

    pub fn update_sort(&self, field: OpportunityField) {
        self.collection.lock().handle_sort(field);
    }

    pub fn sort_config(&self) -> Option<SortConfig<OpportunityField>> {
        self.collection.lock().sort_config()
    }
}
