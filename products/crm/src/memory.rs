//! Process-local store. Every transaction holds the store's single lock from
//! `begin` until commit or drop, so units of work run one at a time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::activity::{Activity, ActivityTarget, Notification};
use crate::deal::{Deal, HistoryEntry, Project};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;
use crate::store::{ActivitySink, DealFilter, DealReader, PipelineStore, PipelineTx, ProjectCreator};

#[derive(Clone, Debug, Default)]
struct State {
    deals: HashMap<Uuid, Deal>,
    history: Vec<HistoryEntry>,
    projects: Vec<Project>,
    activities: Vec<Activity>,
    notifications: Vec<Notification>,
}

#[derive(Clone, Default)]
pub struct InMemoryPipelineStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.state.lock().await.projects.clone()
    }

    pub async fn deal(&self, id: Uuid) -> Option<Deal> {
        self.state.lock().await.deals.get(&id).cloned()
    }

    /// Notifications addressed to `user_id`, oldest first.
    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn project_activities(&self, project_id: Uuid) -> Vec<Activity> {
        self.state
            .lock()
            .await
            .activities
            .iter()
            .filter(|a| a.target_type == ActivityTarget::Project && a.target_id == project_id)
            .cloned()
            .collect()
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> PipelineResult<InMemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(InMemoryTx { guard, work })
    }
}

#[async_trait]
impl ProjectCreator for InMemoryTx {
    async fn create_from_deal(&mut self, deal: &Deal, name: &str) -> PipelineResult<Project> {
        if self
            .work
            .projects
            .iter()
            .any(|project| project.deal_id == Some(deal.id))
        {
            return Err(PipelineError::Creation {
                deal_id: deal.id,
                reason: "a project already exists for this deal".into(),
            });
        }
        let project = Project::seeded_from(deal, name, deal.updated_at);
        self.work.projects.push(project.clone());
        Ok(project)
    }
}

#[async_trait]
impl ActivitySink for InMemoryTx {
    async fn record_activity(&mut self, activity: &Activity) -> PipelineResult<()> {
        self.work.activities.push(activity.clone());
        Ok(())
    }

    async fn notify(&mut self, notification: &Notification) -> PipelineResult<()> {
        self.work.notifications.push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl PipelineTx for InMemoryTx {
    async fn load_for_update(&mut self, id: Uuid) -> PipelineResult<Deal> {
        self.work
            .deals
            .get(&id)
            .cloned()
            .ok_or(PipelineError::NotFound(id))
    }

    async fn insert_deal(&mut self, deal: &Deal, entry: &HistoryEntry) -> PipelineResult<()> {
        self.work.deals.insert(deal.id, deal.clone());
        self.work.history.push(entry.clone());
        Ok(())
    }

    async fn save(
        &mut self,
        expected: Stage,
        deal: &Deal,
        entry: &HistoryEntry,
    ) -> PipelineResult<()> {
        let stored = self
            .work
            .deals
            .get_mut(&deal.id)
            .ok_or(PipelineError::NotFound(deal.id))?;
        if stored.stage != expected {
            return Err(PipelineError::invalid_transition(stored.stage, deal.stage));
        }
        *stored = deal.clone();
        self.work.history.push(entry.clone());
        Ok(())
    }

    async fn update_deal(&mut self, deal: &Deal) -> PipelineResult<()> {
        let stored = self
            .work
            .deals
            .get_mut(&deal.id)
            .ok_or(PipelineError::NotFound(deal.id))?;
        *stored = deal.clone();
        Ok(())
    }

    async fn commit(mut self) -> PipelineResult<()> {
        *self.guard = std::mem::take(&mut self.work);
        Ok(())
    }
}

#[async_trait]
impl DealReader for InMemoryPipelineStore {
    async fn list_deals(&self, filter: &DealFilter) -> PipelineResult<Vec<Deal>> {
        let state = self.state.lock().await;
        let mut deals: Vec<Deal> = state
            .deals
            .values()
            .filter(|deal| filter.matches(deal))
            .cloned()
            .collect();
        deals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(deals)
    }

    async fn history_for(&self, deal_ids: &[Uuid]) -> PipelineResult<Vec<HistoryEntry>> {
        let state = self.state.lock().await;
        let mut rows: Vec<HistoryEntry> = state
            .history
            .iter()
            .filter(|entry| deal_ids.contains(&entry.deal_id))
            .cloned()
            .collect();
        rows.sort_by_key(|entry| entry.changed_at);
        Ok(rows)
    }

    async fn stage_history(&self, deal_id: Uuid) -> PipelineResult<Vec<HistoryEntry>> {
        let state = self.state.lock().await;
        if !state.deals.contains_key(&deal_id) {
            return Err(PipelineError::NotFound(deal_id));
        }
        let mut rows: Vec<HistoryEntry> = state
            .history
            .iter()
            .filter(|entry| entry.deal_id == deal_id)
            .cloned()
            .collect();
        rows.sort_by_key(|entry| entry.changed_at);
        rows.reverse();
        Ok(rows)
    }

    async fn activities(&self, deal_id: Uuid, limit: u64) -> PipelineResult<Vec<Activity>> {
        let state = self.state.lock().await;
        if !state.deals.contains_key(&deal_id) {
            return Err(PipelineError::NotFound(deal_id));
        }
        let mut rows: Vec<Activity> = state
            .activities
            .iter()
            .rev()
            .filter(|a| a.target_type == ActivityTarget::Deal && a.target_id == deal_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::fixtures::deal_in;
    use crate::transition;
    use chrono::Utc;

    async fn seeded(store: &InMemoryPipelineStore, stage: Stage) -> Deal {
        let deal = deal_in(stage, 100_000);
        let entry = HistoryEntry::record(deal.id, None, stage, None, "Deal created", Utc::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_deal(&deal, &entry).await.unwrap();
        tx.commit().await.unwrap();
        deal
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryPipelineStore::new();
        let deal = seeded(&store, Stage::Lead).await;

        let mut tx = store.begin().await.unwrap();
        let applied = transition::advance(&deal, Stage::Qualified, "", None, Utc::now()).unwrap();
        tx.save(applied.from, &applied.deal, &applied.entry)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(store.deal(deal.id).await.unwrap().stage, Stage::Lead);
        assert_eq!(store.stage_history(deal.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn activities_land_only_on_commit() {
        let store = InMemoryPipelineStore::new();
        let deal = seeded(&store, Stage::Lead).await;
        let applied = transition::advance(&deal, Stage::Qualified, "", None, Utc::now()).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.record_activity(&applied.activity).await.unwrap();
        drop(tx);
        assert!(store.activities(deal.id, 10).await.unwrap().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.record_activity(&applied.activity).await.unwrap();
        for notification in Notification::deal_won(&deal, None) {
            tx.notify(&notification).await.unwrap();
        }
        tx.commit().await.unwrap();
        let feed = store.activities(deal.id, 10).await.unwrap();
        assert_eq!(feed, vec![applied.activity]);
        assert_eq!(store.notifications_for(deal.owner_id).await.len(), 1);
        assert!(store.activities(deal.id, 0).await.unwrap().is_empty());
        assert!(matches!(
            store.activities(Uuid::new_v4(), 10).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_checks_expected_stage() {
        let store = InMemoryPipelineStore::new();
        let deal = seeded(&store, Stage::Proposal).await;
        let mut tx = store.begin().await.unwrap();
        let applied = transition::advance(&deal, Stage::Negotiation, "", None, Utc::now()).unwrap();
        let err = tx
            .save(Stage::Lead, &applied.deal, &applied.entry)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                current: Stage::Proposal,
                target: Stage::Negotiation
            }
        ));
    }

    #[tokio::test]
    async fn second_project_for_a_deal_is_rejected() {
        let store = InMemoryPipelineStore::new();
        let deal = seeded(&store, Stage::Won).await;
        let mut tx = store.begin().await.unwrap();
        tx.create_from_deal(&deal, "Phase one").await.unwrap();
        let err = tx.create_from_deal(&deal, "Phase two").await.unwrap_err();
        assert!(matches!(err, PipelineError::Creation { deal_id, .. } if deal_id == deal.id));
    }

    #[tokio::test]
    async fn unknown_deal_history_is_not_found() {
        let store = InMemoryPipelineStore::new();
        assert!(matches!(
            store.stage_history(Uuid::new_v4()).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_deals_applies_filter() {
        let store = InMemoryPipelineStore::new();
        let first = seeded(&store, Stage::Lead).await;
        seeded(&store, Stage::Qualified).await;
        let scoped = store
            .list_deals(&DealFilter::for_company(first.company_id))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, first.id);
        assert_eq!(store.list_deals(&DealFilter::default()).await.unwrap().len(), 2);
    }
}
