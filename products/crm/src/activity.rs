//! Activity feed rows and user notifications written alongside transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deal::{Deal, LossReason, Project};
use crate::stage::Stage;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTarget {
    Deal,
    Project,
}

/// One entry in a deal's or project's activity feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub target_type: ActivityTarget,
    pub target_id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub body: String,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl Activity {
    fn on_deal(
        deal: &Deal,
        title: &str,
        body: String,
        actor_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_type: ActivityTarget::Deal,
            target_id: deal.id,
            company_id: deal.company_id,
            title: title.to_string(),
            body,
            actor_id,
            occurred_at: at,
        }
    }

    pub fn deal_created(deal: &Deal, actor_id: Option<Uuid>) -> Self {
        let body = format!(
            "Deal '{}' was created with value {}",
            deal.title,
            money(deal.value_cents, &deal.currency)
        );
        Self::on_deal(deal, "Deal created", body, actor_id, deal.created_at)
    }

    pub fn stage_changed(deal: &Deal, from: Stage, actor_id: Option<Uuid>) -> Self {
        let body = format!("Deal '{}' moved from {from} to {}", deal.title, deal.stage);
        Self::on_deal(deal, "Deal stage changed", body, actor_id, deal.updated_at)
    }

    pub fn deal_won(deal: &Deal, actor_id: Option<Uuid>) -> Self {
        let body = format!(
            "Deal '{}' was won with value {}",
            deal.title,
            money(deal.value_cents, &deal.currency)
        );
        Self::on_deal(deal, "Deal won", body, actor_id, deal.updated_at)
    }

    pub fn deal_lost(deal: &Deal, reason: &LossReason, actor_id: Option<Uuid>) -> Self {
        let body = format!(
            "Deal '{}' was lost. Category: {}. Details: {}",
            deal.title, reason.category, reason.notes
        );
        Self::on_deal(deal, "Deal lost", body, actor_id, deal.updated_at)
    }

    pub fn deal_reopened(deal: &Deal, actor_id: Option<Uuid>) -> Self {
        let body = format!("Deal '{}' was reopened as a new lead", deal.title);
        Self::on_deal(deal, "Deal reopened", body, actor_id, deal.updated_at)
    }

    pub fn project_created(project: &Project, actor_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_type: ActivityTarget::Project,
            target_id: project.id,
            company_id: project.company_id,
            title: "Project created from deal".into(),
            body: format!(
                "Project '{}' created from won deal with budget {}",
                project.name,
                money(project.value_cents, &project.currency)
            ),
            actor_id,
            occurred_at: project.created_at,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DealWon,
    DealWonConfirmation,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::DealWon => "deal_won",
            NotificationKind::DealWonConfirmation => "deal_won_confirmation",
        }
    }
}

/// Unread message addressed to one user about a deal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub deal_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// The owner hears about the win unless they closed it themselves; the
    /// closing user, when known, gets a confirmation.
    pub fn deal_won(deal: &Deal, winner: Option<Uuid>) -> Vec<Self> {
        let value = money(deal.value_cents, &deal.currency);
        let mut out = Vec::with_capacity(2);
        if winner != Some(deal.owner_id) {
            out.push(Self {
                id: Uuid::new_v4(),
                user_id: deal.owner_id,
                kind: NotificationKind::DealWon,
                title: "Deal won".into(),
                message: format!("Deal '{}' has been won with value {value}", deal.title),
                deal_id: deal.id,
                created_at: deal.updated_at,
            });
        }
        if let Some(winner) = winner {
            out.push(Self {
                id: Uuid::new_v4(),
                user_id: winner,
                kind: NotificationKind::DealWonConfirmation,
                title: "Deal closed successfully".into(),
                message: format!("You closed deal '{}' with value {value}", deal.title),
                deal_id: deal.id,
                created_at: deal.updated_at,
            });
        }
        out
    }
}

fn money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{currency} {sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::fixtures::deal_in;
    use crate::stage::LossReasonCategory;

    #[test]
    fn money_renders_minor_units() {
        assert_eq!(money(500_000, "NOK"), "NOK 5000.00");
        assert_eq!(money(1_205, "EUR"), "EUR 12.05");
        assert_eq!(money(-7, "EUR"), "EUR -0.07");
    }

    #[test]
    fn transition_activities_target_the_deal() {
        let deal = deal_in(Stage::Qualified, 1_000);
        let moved = Activity::stage_changed(&deal, Stage::Lead, None);
        assert_eq!(moved.target_type, ActivityTarget::Deal);
        assert_eq!(moved.target_id, deal.id);
        assert_eq!(moved.company_id, deal.company_id);
        assert_eq!(
            moved.body,
            "Deal 'Harbour crane retrofit' moved from lead to qualified"
        );

        let reason = LossReason::new(LossReasonCategory::Price, "Lost to competitor XYZ").unwrap();
        let lost = Activity::deal_lost(&deal, &reason, None);
        assert_eq!(
            lost.body,
            "Deal 'Harbour crane retrofit' was lost. Category: price. Details: Lost to competitor XYZ"
        );
    }

    #[test]
    fn win_notifies_owner_and_winner() {
        let deal = deal_in(Stage::Won, 500_000);
        let winner = Uuid::new_v4();
        let sent = Notification::deal_won(&deal, Some(winner));
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].user_id, deal.owner_id);
        assert_eq!(sent[0].kind, NotificationKind::DealWon);
        assert_eq!(sent[1].user_id, winner);
        assert_eq!(sent[1].kind, NotificationKind::DealWonConfirmation);
        assert!(sent[1].message.ends_with("NOK 5000.00"));
    }

    #[test]
    fn owner_closing_own_deal_gets_only_confirmation() {
        let deal = deal_in(Stage::Won, 1);
        let sent = Notification::deal_won(&deal, Some(deal.owner_id));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::DealWonConfirmation);

        let anonymous = Notification::deal_won(&deal, None);
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].user_id, deal.owner_id);
    }
}
