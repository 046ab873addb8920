//! Collection processing for the list views.
//!
//! A `CollectionProcessor` owns the view state (search input, debounced
//! search term, sort) and derives a filtered, searched and sorted view of
//! a borrowed slice. Processing order is fixed: predicate filter, then
//! search, then sort.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A field value as seen by search and sort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Missing,
}

impl FieldValue<'_> {
    /// String form used for search and for mixed-type comparison.
    /// Integral numbers render without a fractional part.
    pub fn stringify(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Cow::Owned(format!("{}", *n as i64))
            }
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Missing => Cow::Borrowed(""),
        }
    }
}

/// A record that exposes named fields to the processor.
pub trait Record {
    type Field: Copy + Eq + std::fmt::Debug;

    fn field_value(&self, field: Self::Field) -> FieldValue<'_>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig<F> {
    pub field: F,
    pub direction: SortDirection,
}

/// Lowercased with diacritics stripped: "Émile" → "emile"
fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Base letters first, then accents, then case (lowercase before uppercase).
fn locale_compare(a: &str, b: &str) -> Ordering {
    fold(a)
        .cmp(&fold(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(a))
}

/// Ascending comparison of two field values.
pub fn compare_values(a: &FieldValue<'_>, b: &FieldValue<'_>) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => locale_compare(x, y),
        (FieldValue::Number(x), FieldValue::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        _ => locale_compare(&a.stringify(), &b.stringify()),
    }
}

/// True when any of `fields` contains `term_lower`. Missing values never match.
fn matches_search<T: Record>(item: &T, fields: &[T::Field], term_lower: &str) -> bool {
    fields.iter().any(|&field| match item.field_value(field) {
        FieldValue::Missing => false,
        value => value.stringify().to_lowercase().contains(term_lower),
    })
}

/// Index range of a 1-indexed page. Out-of-range pages are empty.
pub fn page_bounds(len: usize, page: usize, page_size: usize) -> Range<usize> {
    if page == 0 || page_size == 0 {
        return 0..0;
    }
    let start = (page - 1).saturating_mul(page_size).min(len);
    let end = start.saturating_add(page_size).min(len);
    start..end
}

pub fn total_pages(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    len.div_ceil(page_size)
}

// ============================================================================
// Debounced search
// ============================================================================

/// Observable phase of the debounced search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { term: String, deadline: Instant },
    Settled(String),
}

/// Keystroke-level input plus the coalesced term actually used for filtering.
#[derive(Debug, Clone)]
pub struct DebouncedSearch {
    delay: Duration,
    input: String,
    applied: String,
    deadline: Option<Instant>,
}

impl DebouncedSearch {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            input: String::new(),
            applied: String::new(),
            deadline: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn applied(&self) -> &str {
        &self.applied
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Record a keystroke. Any earlier pending deadline is replaced.
    pub fn set(&mut self, term: impl Into<String>) {
        self.input = term.into();
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Apply the pending term if its deadline has passed.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.apply()
            }
            _ => false,
        }
    }

    /// Wait for the pending deadline, then apply.
    pub async fn settle(&mut self) -> bool {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.poll_at(deadline)
            }
            None => false,
        }
    }

    /// Apply the current input immediately.
    pub fn flush(&mut self) -> bool {
        self.deadline = None;
        self.apply()
    }

    /// Drop the pending deadline; the applied term stays as it was.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Reset both terms synchronously.
    pub fn clear(&mut self) {
        self.input.clear();
        self.applied.clear();
        self.deadline = None;
    }

    pub fn is_searching(&self) -> bool {
        self.input != self.applied
    }

    pub fn state(&self) -> DebounceState {
        match self.deadline {
            Some(deadline) => DebounceState::Pending {
                term: self.input.clone(),
                deadline,
            },
            None if self.applied.is_empty() => DebounceState::Idle,
            None => DebounceState::Settled(self.applied.clone()),
        }
    }

    fn apply(&mut self) -> bool {
        if self.applied == self.input {
            return false;
        }
        self.applied = self.input.clone();
        true
    }
}

// ============================================================================
// Processor
// ============================================================================

pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Declarative processing options.
pub struct CollectionOptions<T: Record> {
    pub search_fields: Vec<T::Field>,
    pub sort_field: Option<T::Field>,
    pub sort_direction: SortDirection,
    pub filter: Option<Filter<T>>,
    pub debounce_delay: Duration,
}

impl<T: Record> Default for CollectionOptions<T> {
    fn default() -> Self {
        Self {
            search_fields: Vec::new(),
            sort_field: None,
            sort_direction: SortDirection::Asc,
            filter: None,
            debounce_delay: DEFAULT_DEBOUNCE,
        }
    }
}

impl<T: Record> CollectionOptions<T> {
    pub fn search_fields(mut self, fields: impl IntoIterator<Item = T::Field>) -> Self {
        self.search_fields = fields.into_iter().collect();
        self
    }

    pub fn sort(mut self, field: T::Field, direction: SortDirection) -> Self {
        self.sort_field = Some(field);
        self.sort_direction = direction;
        self
    }

    pub fn filter(mut self, filter: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }
}

pub struct CollectionProcessor<T: Record> {
    search_fields: Vec<T::Field>,
    filter: Option<Filter<T>>,
    sort: Option<SortConfig<T::Field>>,
    search: DebouncedSearch,
}

impl<T: Record> CollectionProcessor<T> {
    pub fn new(options: CollectionOptions<T>) -> Self {
        let sort = options.sort_field.map(|field| SortConfig {
            field,
            direction: options.sort_direction,
        });
        Self {
            search_fields: options.search_fields,
            filter: options.filter,
            sort,
            search: DebouncedSearch::new(options.debounce_delay),
        }
    }

    pub fn search_term(&self) -> &str {
        self.search.input()
    }

    pub fn debounced_search_term(&self) -> &str {
        self.search.applied()
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search.set(term);
    }

    /// Settle an elapsed debounce. Returns true if the applied term changed.
    pub fn poll_search(&mut self) -> bool {
        self.search.poll()
    }

    pub async fn settle_search(&mut self) -> bool {
        self.search.settle().await
    }

    pub fn flush_search(&mut self) -> bool {
        self.search.flush()
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_searching()
    }

    pub fn search_state(&self) -> DebounceState {
        self.search.state()
    }

    pub fn set_filter(&mut self, filter: Option<Filter<T>>) {
        self.filter = filter;
    }

    /// Same field flips direction; a new field starts ascending.
    pub fn handle_sort(&mut self, field: T::Field) {
        self.sort = Some(match self.sort {
            Some(current) if current.field == field => SortConfig {
                field,
                direction: current.direction.toggled(),
            },
            _ => SortConfig {
                field,
                direction: SortDirection::Asc,
            },
        });
    }

    pub fn set_sort(&mut self, sort: Option<SortConfig<T::Field>>) {
        self.sort = sort;
    }

    pub fn sort_config(&self) -> Option<SortConfig<T::Field>> {
        self.sort
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    pub fn reset(&mut self) {
        self.clear_search();
        self.clear_sort();
    }

    pub fn has_active_filters(&self) -> bool {
        !self.search.applied().is_empty() || self.sort.is_some()
    }

    /// Filter, search and sort `items`. The sort is stable, so ties keep
    /// their input order.
    pub fn process<'a>(&self, items: &'a [T]) -> Vec<&'a T> {
        let mut result: Vec<&T> = match self.filter {
            Some(ref filter) => items.iter().filter(|item| filter(item)).collect(),
            None => items.iter().collect(),
        };

        let term = self.search.applied();
        if !term.is_empty() && !self.search_fields.is_empty() {
            let term_lower = term.to_lowercase();
            result.retain(|item| matches_search(*item, &self.search_fields, &term_lower));
        }

        if let Some(sort) = self.sort {
            result.sort_by(|a, b| {
                let ord = compare_values(&a.field_value(sort.field), &b.field_value(sort.field));
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        result
    }

    pub fn paginate<'a>(&self, items: &'a [T], page: usize, page_size: usize) -> Vec<&'a T> {
        let processed = self.process(items);
        let range = page_bounds(processed.len(), page, page_size);
        processed[range].to_vec()
    }

    pub fn total_pages(&self, items: &[T], page_size: usize) -> usize {
        total_pages(self.process(items).len(), page_size)
    }
}
