//! The deal aggregate, its stage history rows and the project a win can spawn.

use chrono::{DateTime, NaiveDate, Utc};
use entity::deals::{LOST_REASON_MAX_CHARS, TITLE_MAX_CHARS};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::currency_code;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::{LossReasonCategory, Stage, default_probability_for};

pub const MIN_LOSS_NOTES_CHARS: usize = 10;
pub const MAX_LOSS_NOTES_CHARS: usize = LOST_REASON_MAX_CHARS as usize;
pub const MAX_TITLE_CHARS: usize = TITLE_MAX_CHARS as usize;
/// Largest deal value whose weighted value can be computed without overflow.
pub const MAX_VALUE_CENTS: i64 = i64::MAX / 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub owner_id: Uuid,
    pub stage: Stage,
    pub probability: u8,
    pub value_cents: i64,
    pub currency: String,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<NaiveDate>,
    pub lost_reason: Option<String>,
    pub loss_reason_category: Option<LossReasonCategory>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// `value × probability / 100` in minor units.
    pub fn weighted_value_cents(&self) -> i64 {
        weighted_cents(self.value_cents, self.probability)
    }

    pub fn is_open(&self) -> bool {
        !self.stage.is_terminal()
    }

    /// Checks the record-level invariants that every committed deal satisfies.
    pub fn check_invariants(&self) -> PipelineResult<()> {
        if self.probability > 100 {
            return Err(PipelineError::validation(format!(
                "probability {} is outside 0-100",
                self.probability
            )));
        }
        match self.stage {
            Stage::Won | Stage::Lost if self.probability != default_probability_for(self.stage) => {
                return Err(PipelineError::validation(format!(
                    "{} deals must carry probability {}",
                    self.stage,
                    default_probability_for(self.stage)
                )));
            }
            _ => {}
        }
        if self.stage == Stage::Lost {
            if self.loss_reason_category.is_none() {
                return Err(PipelineError::validation(
                    "lost deals require a loss reason category",
                ));
            }
            let notes = self.lost_reason.as_deref().unwrap_or_default();
            validate_loss_notes(notes)?;
        } else if self.loss_reason_category.is_some()
            || self.lost_reason.as_deref().is_some_and(|reason| !reason.is_empty())
        {
            return Err(PipelineError::validation(
                "only lost deals may carry a loss reason",
            ));
        }
        Ok(())
    }
}

pub(crate) fn weighted_cents(value_cents: i64, probability: u8) -> i64 {
    let weighted = i128::from(value_cents) * i128::from(probability) / 100;
    weighted.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// A validated reason for losing a deal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LossReason {
    pub category: LossReasonCategory,
    pub notes: String,
}

impl LossReason {
    pub fn new(category: LossReasonCategory, notes: &str) -> PipelineResult<Self> {
        let notes = validate_loss_notes(notes)?;
        Ok(Self {
            category,
            notes: notes.to_string(),
        })
    }

    /// Parses raw caller input; both parts are required.
    pub fn parse(category: &str, notes: &str) -> PipelineResult<Self> {
        let category = category.parse::<LossReasonCategory>()?;
        Self::new(category, notes)
    }

    pub(crate) fn history_notes(&self) -> String {
        format!("[{}] {}", self.category, self.notes)
    }
}

fn validate_loss_notes(notes: &str) -> PipelineResult<&str> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::validation("loss notes are required"));
    }
    if trimmed.chars().count() < MIN_LOSS_NOTES_CHARS {
        return Err(PipelineError::validation(format!(
            "loss notes must be at least {MIN_LOSS_NOTES_CHARS} characters"
        )));
    }
    if trimmed.chars().count() > MAX_LOSS_NOTES_CHARS {
        return Err(PipelineError::validation(format!(
            "loss notes must be at most {MAX_LOSS_NOTES_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

/// Input for creating a deal.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    pub title: String,
    pub description: Option<String>,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub owner_id: Uuid,
    pub stage: Option<Stage>,
    pub probability: Option<u8>,
    pub value_cents: i64,
    pub currency: Option<String>,
    pub expected_close_date: Option<NaiveDate>,
    pub loss_reason: Option<(LossReasonCategory, String)>,
}

impl NewDeal {
    /// Builds the deal record, applying stage and probability defaults.
    pub(crate) fn into_deal(
        self,
        default_currency: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<Deal> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(PipelineError::validation("title is required"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(PipelineError::validation(format!(
                "title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.value_cents < 0 {
            return Err(PipelineError::validation("value must not be negative"));
        }
        if self.value_cents > MAX_VALUE_CENTS {
            return Err(PipelineError::validation(format!(
                "value must not exceed {MAX_VALUE_CENTS} cents"
            )));
        }
        let stage = self.stage.unwrap_or(Stage::Lead);
        let probability = match (stage, self.probability) {
            (_, Some(p)) if p > 100 => {
                return Err(PipelineError::validation(format!(
                    "probability {p} is outside 0-100"
                )));
            }
            (stage, Some(p)) if !stage.is_terminal() => p,
            (stage, _) => default_probability_for(stage),
        };
        let loss = match (stage, self.loss_reason) {
            (Stage::Lost, Some((category, notes))) => Some(LossReason::new(category, &notes)?),
            (Stage::Lost, None) => {
                return Err(PipelineError::validation(
                    "deals created as lost require a loss reason",
                ));
            }
            (_, Some(_)) => {
                return Err(PipelineError::validation(
                    "only lost deals may carry a loss reason",
                ));
            }
            (_, None) => None,
        };
        let currency = match self.currency.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => currency_code(code)?,
            _ => default_currency.to_string(),
        };
        let actual_close_date = stage.is_terminal().then(|| now.date_naive());

        Ok(Deal {
            id: Uuid::new_v4(),
            title,
            description: self.description,
            company_id: self.company_id,
            customer_id: self.customer_id,
            owner_id: self.owner_id,
            stage,
            probability,
            value_cents: self.value_cents,
            currency,
            expected_close_date: self.expected_close_date,
            actual_close_date,
            lost_reason: loss.as_ref().map(|reason| reason.notes.clone()),
            loss_reason_category: loss.map(|reason| reason.category),
            project_id: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// One append-only row of a deal's stage history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub from_stage: Option<Stage>,
    pub to_stage: Stage,
    pub changed_by: Option<Uuid>,
    pub notes: String,
    pub changed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub(crate) fn record(
        deal_id: Uuid,
        from_stage: Option<Stage>,
        to_stage: Stage,
        changed_by: Option<Uuid>,
        notes: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            deal_id,
            from_stage,
            to_stage,
            changed_by,
            notes: notes.into(),
            changed_at,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    Completed,
    Cancelled,
}

/// Project spawned from a won deal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub deal_id: Option<Uuid>,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub status: ProjectStatus,
    pub value_cents: i64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Seeds a planning-stage project from the deal being won.
    pub fn seeded_from(deal: &Deal, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            deal_id: Some(deal.id),
            company_id: deal.company_id,
            customer_id: deal.customer_id,
            manager_id: Some(deal.owner_id),
            status: ProjectStatus::Planning,
            value_cents: deal.value_cents,
            currency: deal.currency.clone(),
            start_date: now.date_naive(),
            created_at: now,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn deal_in(stage: Stage, value_cents: i64) -> Deal {
        let now = Utc::now();
        let loss = (stage == Stage::Lost).then_some(LossReasonCategory::Price);
        Deal {
            id: Uuid::new_v4(),
            title: "Harbour crane retrofit".into(),
            description: None,
            company_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            stage,
            probability: default_probability_for(stage),
            value_cents,
            currency: "NOK".into(),
            expected_close_date: None,
            actual_close_date: stage.is_terminal().then(|| now.date_naive()),
            lost_reason: loss.map(|_| "Lost to competitor XYZ".to_string()),
            loss_reason_category: loss,
            project_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::deal_in;
    use super::*;

    fn new_deal() -> NewDeal {
        NewDeal {
            title: "  Fjord ferry charging  ".into(),
            company_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            value_cents: 1_250_000,
            ..NewDeal::default()
        }
    }

    #[test]
    fn weighted_value_uses_probability() {
        let mut deal = deal_in(Stage::Proposal, 500_000);
        assert_eq!(deal.weighted_value_cents(), 250_000);
        deal.probability = 33;
        assert_eq!(deal.weighted_value_cents(), 165_000);
    }

    #[test]
    fn new_deal_defaults_to_lead() {
        let deal = new_deal().into_deal("NOK", Utc::now()).unwrap();
        assert_eq!(deal.title, "Fjord ferry charging");
        assert_eq!(deal.stage, Stage::Lead);
        assert_eq!(deal.probability, 10);
        assert_eq!(deal.currency, "NOK");
        assert!(deal.actual_close_date.is_none());
        deal.check_invariants().unwrap();
    }

    #[test]
    fn custom_probability_only_for_open_stages() {
        let mut input = new_deal();
        input.stage = Some(Stage::Proposal);
        input.probability = Some(60);
        assert_eq!(input.into_deal("NOK", Utc::now()).unwrap().probability, 60);

        let mut input = new_deal();
        input.stage = Some(Stage::Won);
        input.probability = Some(60);
        let won = input.into_deal("NOK", Utc::now()).unwrap();
        assert_eq!(won.probability, 100);
        assert!(won.actual_close_date.is_some());

        let mut input = new_deal();
        input.probability = Some(101);
        assert!(matches!(
            input.into_deal("NOK", Utc::now()),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn lost_creation_requires_reason() {
        let mut input = new_deal();
        input.stage = Some(Stage::Lost);
        assert!(matches!(
            input.clone().into_deal("NOK", Utc::now()),
            Err(PipelineError::Validation(_))
        ));
        input.loss_reason = Some((LossReasonCategory::Timing, "Budget frozen until Q3".into()));
        let deal = input.into_deal("NOK", Utc::now()).unwrap();
        assert_eq!(deal.probability, 0);
        assert_eq!(deal.loss_reason_category, Some(LossReasonCategory::Timing));
        deal.check_invariants().unwrap();
    }

    #[test]
    fn blank_title_rejected() {
        let mut input = new_deal();
        input.title = "   ".into();
        assert!(matches!(
            input.into_deal("NOK", Utc::now()),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn loss_reason_requires_ten_characters() {
        for category in LossReasonCategory::ALL {
            assert!(matches!(
                LossReason::new(category, "too short"),
                Err(PipelineError::Validation(_))
            ));
        }
        let reason = LossReason::parse("competitor", "  Lost to competitor XYZ ").unwrap();
        assert_eq!(reason.notes, "Lost to competitor XYZ");
        assert_eq!(reason.history_notes(), "[competitor] Lost to competitor XYZ");
    }

    #[test]
    fn value_bounded_so_weighted_value_fits() {
        let mut input = new_deal();
        input.value_cents = MAX_VALUE_CENTS;
        let deal = input.into_deal("NOK", Utc::now()).unwrap();
        assert_eq!(deal.weighted_value_cents(), MAX_VALUE_CENTS / 10);

        let mut input = new_deal();
        input.value_cents = MAX_VALUE_CENTS + 1;
        assert!(matches!(
            input.into_deal("NOK", Utc::now()),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn weighted_cents_saturates_on_stored_outliers() {
        assert_eq!(weighted_cents(i64::MAX, 100), i64::MAX);
        assert_eq!(weighted_cents(i64::MAX / 2, 10), i64::MAX / 20);
    }

    #[test]
    fn column_widths_enforced_before_storage() {
        let mut input = new_deal();
        input.title = "x".repeat(MAX_TITLE_CHARS);
        assert!(input.into_deal("NOK", Utc::now()).is_ok());

        let mut input = new_deal();
        input.title = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(matches!(
            input.into_deal("NOK", Utc::now()),
            Err(PipelineError::Validation(_))
        ));

        let mut input = new_deal();
        input.currency = Some("EURO".into());
        assert!(matches!(
            input.into_deal("NOK", Utc::now()),
            Err(PipelineError::Validation(_))
        ));

        let mut input = new_deal();
        input.currency = Some(" sek ".into());
        assert_eq!(input.into_deal("NOK", Utc::now()).unwrap().currency, "SEK");

        let long_notes = "n".repeat(MAX_LOSS_NOTES_CHARS + 1);
        assert!(matches!(
            LossReason::new(LossReasonCategory::Price, &long_notes),
            Err(PipelineError::Validation(_))
        ));
        assert!(LossReason::new(LossReasonCategory::Price, &long_notes[1..]).is_ok());
    }

    #[test]
    fn invariants_flag_stray_loss_reason() {
        let mut deal = deal_in(Stage::Qualified, 10_000);
        deal.check_invariants().unwrap();
        deal.loss_reason_category = Some(LossReasonCategory::Other);
        assert!(deal.check_invariants().is_err());

        let mut won = deal_in(Stage::Won, 10_000);
        won.probability = 90;
        assert!(won.check_invariants().is_err());
    }

    #[test]
    fn project_inherits_deal_budget() {
        let deal = deal_in(Stage::Won, 500_000);
        let project = Project::seeded_from(&deal, "P1", Utc::now());
        assert_eq!(project.name, "P1");
        assert_eq!(project.deal_id, Some(deal.id));
        assert_eq!(project.manager_id, Some(deal.owner_id));
        assert_eq!(project.value_cents, 500_000);
        assert_eq!(project.status, ProjectStatus::Planning);
    }
}
