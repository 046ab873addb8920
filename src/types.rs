//! Record types shared by the store, the view models and the collection
//! processor.
//!
//! Wire form matches the static resources: camelCase field names,
//! snake_case enum values.

use serde::{Deserialize, Serialize};

use crate::collection::{FieldValue, Record};

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    Linkedin,
    Conference,
    ColdCall,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::Linkedin => "linkedin",
            LeadSource::Conference => "conference",
            LeadSource::ColdCall => "cold_call",
        }
    }
}

/// Qualification status. Any value may be set by an edit; conversion
/// always forces `Qualified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Unqualified,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 4] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Unqualified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Unqualified => "unqualified",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStage {
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl OpportunityStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStage::Prospecting => "prospecting",
            OpportunityStage::Qualification => "qualification",
            OpportunityStage::Proposal => "proposal",
            OpportunityStage::Negotiation => "negotiation",
            OpportunityStage::ClosedWon => "closed_won",
            OpportunityStage::ClosedLost => "closed_lost",
        }
    }
}

impl std::fmt::Display for OpportunityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub company: String,
    pub email: String,
    pub source: LeadSource,
    pub score: i64,
    pub status: LeadStatus,
}

impl Lead {
    /// Shallow merge of `update` over this lead. Absent fields are kept.
    pub fn merged(&self, update: &LeadUpdate) -> Lead {
        let mut lead = self.clone();
        if let Some(ref name) = update.name {
            lead.name = name.clone();
        }
        if let Some(ref company) = update.company {
            lead.company = company.clone();
        }
        if let Some(ref email) = update.email {
            lead.email = email.clone();
        }
        if let Some(source) = update.source {
            lead.source = source;
        }
        if let Some(score) = update.score {
            lead.score = score;
        }
        if let Some(status) = update.status {
            lead.status = status;
        }
        lead
    }
}

/// Partial lead fields for an edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LeadSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
}

impl LeadUpdate {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A sales deal, optionally derived from a converted lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub name: String,
    pub stage: OpportunityStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub account_name: String,
    /// Weak back-reference to the originating lead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
}

/// Opportunity fields supplied by the caller; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityDraft {
    pub name: String,
    pub stage: OpportunityStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
}

impl OpportunityDraft {
    pub fn into_opportunity(self, id: String) -> Opportunity {
        Opportunity {
            id,
            name: self.name,
            stage: self.stage,
            amount: self.amount,
            account_name: self.account_name,
            lead_id: self.lead_id,
        }
    }
}

/// Result of converting a lead: the qualified lead and the new deal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub lead: Lead,
    pub opportunity: Opportunity,
}

// ============================================================================
// Collection field descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeadField {
    Id,
    Name,
    Company,
    Email,
    Source,
    Score,
    Status,
}

impl Record for Lead {
    type Field = LeadField;

    fn field_value(&self, field: LeadField) -> FieldValue<'_> {
        match field {
            LeadField::Id => FieldValue::Text(&self.id),
            LeadField::Name => FieldValue::Text(&self.name),
            LeadField::Company => FieldValue::Text(&self.company),
            LeadField::Email => FieldValue::Text(&self.email),
            LeadField::Source => FieldValue::Text(self.source.as_str()),
            LeadField::Score => FieldValue::Number(self.score as f64),
            LeadField::Status => FieldValue::Text(self.status.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpportunityField {
    Id,
    Name,
    Stage,
    Amount,
    AccountName,
    LeadId,
}

impl Record for Opportunity {
    type Field = OpportunityField;

    fn field_value(&self, field: OpportunityField) -> FieldValue<'_> {
        match field {
            OpportunityField::Id => FieldValue::Text(&self.id),
            OpportunityField::Name => FieldValue::Text(&self.name),
            OpportunityField::Stage => FieldValue::Text(self.stage.as_str()),
            OpportunityField::Amount => self
                .amount
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing),
            OpportunityField::AccountName => FieldValue::Text(&self.account_name),
            OpportunityField::LeadId => self
                .lead_id
                .as_deref()
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Missing),
        }
    }
}
