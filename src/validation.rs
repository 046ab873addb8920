//! Form validation predicates.
//!
//! Predicates never fail; callers branch on the boolean. The `validate_*`
//! form helpers collect per-field messages for inline rendering.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::types::{LeadUpdate, OpportunityDraft, MAX_SCORE, MIN_SCORE};

pub const INVALID_EMAIL: &str = "Please enter a valid email address";
pub const REQUIRED_FIELD: &str = "This field is required";
pub const INVALID_SCORE: &str = "Score must be between 0 and 100";

/// Inclusive character-count bounds for a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

pub const NAME_BOUNDS: LengthBounds = LengthBounds { min: 1, max: 100 };
pub const COMPANY_BOUNDS: LengthBounds = LengthBounds { min: 1, max: 100 };
pub const OPPORTUNITY_NAME_BOUNDS: LengthBounds = LengthBounds { min: 1, max: 200 };
pub const ACCOUNT_NAME_BOUNDS: LengthBounds = LengthBounds { min: 1, max: 100 };
pub const SEARCH_QUERY_BOUNDS: LengthBounds = LengthBounds { min: 0, max: 100 };

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"))
}

pub fn validate_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn validate_required(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn validate_score(score: i64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}

/// Length check in characters, not bytes.
pub fn validate_length(value: &str, bounds: LengthBounds) -> bool {
    let len = value.chars().count();
    len >= bounds.min && len <= bounds.max
}

/// Search input past the query bound is cut to the first `max` characters.
pub fn clamp_search_query(term: &str) -> String {
    if validate_length(term, SEARCH_QUERY_BOUNDS) {
        return term.to_string();
    }
    term.chars().take(SEARCH_QUERY_BOUNDS.max).collect()
}

/// A validation failure attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn check_text(errors: &mut Vec<FieldError>, field: &'static str, value: &str, bounds: LengthBounds) {
    if !validate_required(value) {
        errors.push(FieldError::new(field, REQUIRED_FIELD));
    } else if !validate_length(value.trim(), bounds) {
        errors.push(FieldError::new(
            field,
            format!("Must be between {} and {} characters", bounds.min, bounds.max),
        ));
    }
}

/// Validate only the fields present in a lead edit.
pub fn validate_lead_update(update: &LeadUpdate) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(ref name) = update.name {
        check_text(&mut errors, "name", name, NAME_BOUNDS);
    }
    if let Some(ref company) = update.company {
        check_text(&mut errors, "company", company, COMPANY_BOUNDS);
    }
    if let Some(ref email) = update.email {
        if !validate_email(email) {
            errors.push(FieldError::new("email", INVALID_EMAIL));
        }
    }
    if let Some(score) = update.score {
        if !validate_score(score) {
            errors.push(FieldError::new("score", INVALID_SCORE));
        }
    }
    errors
}

pub fn validate_opportunity_draft(draft: &OpportunityDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_text(&mut errors, "name", &draft.name, OPPORTUNITY_NAME_BOUNDS);
    check_text(&mut errors, "accountName", &draft.account_name, ACCOUNT_NAME_BOUNDS);
    if let Some(amount) = draft.amount {
        if !amount.is_finite() || amount < 0.0 {
            errors.push(FieldError::new("amount", "Amount must be a non-negative number"));
        }
    }
    errors
}
