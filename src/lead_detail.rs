//! Lead detail panel: editing and conversion form state.
//!
//! State changes go through [`reduce`], a pure function of state and
//! action. [`LeadDetail`] wraps it with the save and convert flows.

use serde::Serialize;

use crate::leads::LeadsView;
use crate::opportunities::OpportunitiesView;
use crate::types::{ConversionResult, Lead, LeadStatus, LeadUpdate, OpportunityDraft, OpportunityStage};
use crate::validation::{validate_email, validate_opportunity_draft, INVALID_EMAIL};

const UPDATE_FAILED: &str = "Failed to update lead";
const CONVERT_FAILED: &str = "Failed to convert lead";
const INVALID_AMOUNT: &str = "Amount must be a number";

/// Conversion form fields as typed. `amount` stays text until submit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityForm {
    pub name: String,
    pub stage: OpportunityStage,
    pub amount: String,
    pub account_name: String,
}

impl OpportunityForm {
    fn for_lead(lead: &Lead) -> Self {
        Self {
            name: format!("{} - {}", lead.company, lead.name),
            stage: OpportunityStage::Prospecting,
            amount: String::new(),
            account_name: lead.company.clone(),
        }
    }

    /// Parse the typed amount. Blank means no amount.
    pub fn to_draft(&self) -> Result<OpportunityDraft, String> {
        let amount = match self.amount.trim() {
            "" => None,
            raw => Some(raw.parse::<f64>().map_err(|_| INVALID_AMOUNT.to_string())?),
        };
        Ok(OpportunityDraft {
            name: self.name.trim().to_string(),
            stage: self.stage,
            amount,
            account_name: self.account_name.trim().to_string(),
            lead_id: None,
        })
    }
}

impl Default for OpportunityForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            stage: OpportunityStage::Prospecting,
            amount: String::new(),
            account_name: String::new(),
        }
    }
}

/// Partial form change; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityFormPatch {
    pub name: Option<String>,
    pub stage: Option<OpportunityStage>,
    pub amount: Option<String>,
    pub account_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetailState {
    pub lead: Option<Lead>,
    pub edited: LeadUpdate,
    pub is_editing: bool,
    pub is_saving: bool,
    pub is_converting: bool,
    pub error: Option<String>,
    pub email_error: Option<String>,
    pub show_conversion_form: bool,
    pub opportunity: OpportunityForm,
}

impl LeadDetailState {
    /// The lead as it would look with the pending edits applied.
    pub fn preview(&self) -> Option<Lead> {
        self.lead.as_ref().map(|lead| lead.merged(&self.edited))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeadDetailAction {
    SetEmail(String),
    SetStatus(LeadStatus),
    SetEditing(bool),
    SetSaving(bool),
    SetConverting(bool),
    SetError(Option<String>),
    SetEmailError(Option<String>),
    ShowConversionForm(bool),
    SetOpportunityData(OpportunityFormPatch),
    Reset(Option<Lead>),
    CancelEditing,
    SaveSuccess(Lead),
}

pub fn reduce(state: LeadDetailState, action: LeadDetailAction) -> LeadDetailState {
    match action {
        LeadDetailAction::SetEmail(email) => LeadDetailState {
            edited: LeadUpdate {
                email: Some(email),
                ..state.edited
            },
            ..state
        },
        LeadDetailAction::SetStatus(status) => LeadDetailState {
            edited: LeadUpdate {
                status: Some(status),
                ..state.edited
            },
            ..state
        },
        LeadDetailAction::SetEditing(is_editing) => LeadDetailState { is_editing, ..state },
        LeadDetailAction::SetSaving(is_saving) => LeadDetailState { is_saving, ..state },
        LeadDetailAction::SetConverting(is_converting) => LeadDetailState {
            is_converting,
            ..state
        },
        LeadDetailAction::SetError(error) => LeadDetailState { error, ..state },
        LeadDetailAction::SetEmailError(email_error) => LeadDetailState {
            email_error,
            ..state
        },
        LeadDetailAction::ShowConversionForm(show_conversion_form) => LeadDetailState {
            show_conversion_form,
            ..state
        },
        LeadDetailAction::SetOpportunityData(patch) => {
            let form = state.opportunity.clone();
            LeadDetailState {
                opportunity: OpportunityForm {
                    name: patch.name.unwrap_or(form.name),
                    stage: patch.stage.unwrap_or(form.stage),
                    amount: patch.amount.unwrap_or(form.amount),
                    account_name: patch.account_name.unwrap_or(form.account_name),
                },
                ..state
            }
        }
        LeadDetailAction::Reset(lead) => LeadDetailState {
            opportunity: lead.as_ref().map(OpportunityForm::for_lead).unwrap_or_default(),
            lead,
            ..LeadDetailState::default()
        },
        LeadDetailAction::CancelEditing => LeadDetailState {
            edited: LeadUpdate::default(),
            is_editing: false,
            error: None,
            email_error: None,
            ..state
        },
        LeadDetailAction::SaveSuccess(lead) => LeadDetailState {
            lead: Some(lead),
            edited: LeadUpdate::default(),
            is_editing: false,
            error: None,
            email_error: None,
            ..state
        },
    }
}

/// Detail panel controller for one selected lead.
#[derive(Debug, Default)]
pub struct LeadDetail {
    state: LeadDetailState,
}

impl LeadDetail {
    pub fn new(lead: Option<Lead>) -> Self {
        Self {
            state: reduce(LeadDetailState::default(), LeadDetailAction::Reset(lead)),
        }
    }

    pub fn state(&self) -> &LeadDetailState {
        &self.state
    }

    pub fn dispatch(&mut self, action: LeadDetailAction) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, action);
    }

    /// Update the edited email and flag it inline when malformed.
    pub fn change_email(&mut self, email: impl Into<String>) {
        let email = email.into();
        let error = (!email.is_empty() && !validate_email(&email)).then(|| INVALID_EMAIL.to_string());
        self.dispatch(LeadDetailAction::SetEmail(email));
        self.dispatch(LeadDetailAction::SetEmailError(error));
    }

    /// Validate and submit the pending edits. Returns true when saved.
    pub async fn save(&mut self, leads: &LeadsView) -> bool {
        let Some(id) = self.state.lead.as_ref().map(|lead| lead.id.clone()) else {
            return false;
        };
        if let Some(ref email) = self.state.edited.email {
            if !validate_email(email) {
                self.dispatch(LeadDetailAction::SetEmailError(Some(INVALID_EMAIL.to_string())));
                return false;
            }
        }
        if self.state.edited.is_empty() {
            self.dispatch(LeadDetailAction::CancelEditing);
            return true;
        }

        self.dispatch(LeadDetailAction::SetSaving(true));
        self.dispatch(LeadDetailAction::SetError(None));
        let saved = match leads.update_lead(&id, self.state.edited.clone()).await {
            Ok(lead) => {
                self.dispatch(LeadDetailAction::SaveSuccess(lead));
                true
            }
            Err(e) => {
                log::warn!("{} {}: {}", UPDATE_FAILED, id, e.message);
                self.dispatch(LeadDetailAction::SetError(Some(e.message)));
                false
            }
        };
        self.dispatch(LeadDetailAction::SetSaving(false));
        saved
    }

    /// Convert the lead using the conversion form.
    pub async fn convert(
        &mut self,
        leads: &LeadsView,
        opportunities: &OpportunitiesView,
    ) -> Option<ConversionResult> {
        let id = self.state.lead.as_ref()?.id.clone();
        let draft = match self.state.opportunity.to_draft() {
            Ok(draft) => draft,
            Err(message) => {
                self.dispatch(LeadDetailAction::SetError(Some(message)));
                return None;
            }
        };
        if let Some(invalid) = validate_opportunity_draft(&draft).into_iter().next() {
            self.dispatch(LeadDetailAction::SetError(Some(invalid.message)));
            return None;
        }

        self.dispatch(LeadDetailAction::SetConverting(true));
        self.dispatch(LeadDetailAction::SetError(None));
        let result = match leads.convert_lead(&id, draft).await {
            Ok(result) => {
                opportunities.record_created(result.opportunity.clone());
                self.dispatch(LeadDetailAction::SaveSuccess(result.lead.clone()));
                self.dispatch(LeadDetailAction::ShowConversionForm(false));
                Some(result)
            }
            Err(e) => {
                log::warn!("{} {}: {}", CONVERT_FAILED, id, e.message);
                self.dispatch(LeadDetailAction::SetError(Some(e.message)));
                None
            }
        };
        self.dispatch(LeadDetailAction::SetConverting(false));
        result
    }
}
