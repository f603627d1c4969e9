//! Persistence seams the pipeline service runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::activity::{Activity, Notification};
use crate::deal::{Deal, HistoryEntry, Project};
use crate::error::PipelineResult;
use crate::stage::Stage;

/// Creates the project spawned by a win inside the caller's unit of work.
#[async_trait]
pub trait ProjectCreator: Send {
    /// Fails with [`crate::PipelineError::Creation`] when the project cannot be stored.
    async fn create_from_deal(&mut self, deal: &Deal, name: &str) -> PipelineResult<Project>;
}

/// Activity feed and notification writes that ride along with a transition.
#[async_trait]
pub trait ActivitySink: Send {
    async fn record_activity(&mut self, activity: &Activity) -> PipelineResult<()>;

    async fn notify(&mut self, notification: &Notification) -> PipelineResult<()>;
}

/// One unit of work. Dropping it without [`PipelineTx::commit`] discards every
/// write made through it.
#[async_trait]
pub trait PipelineTx: ProjectCreator + ActivitySink + Send {
    /// Loads the deal and holds it exclusively until the transaction ends.
    async fn load_for_update(&mut self, id: Uuid) -> PipelineResult<Deal>;

    async fn insert_deal(&mut self, deal: &Deal, entry: &HistoryEntry) -> PipelineResult<()>;

    /// Writes a stage change and its history row. The write only lands while the
    /// stored stage still equals `expected`; otherwise the call fails with
    /// `InvalidTransition` against the stage found.
    async fn save(
        &mut self,
        expected: Stage,
        deal: &Deal,
        entry: &HistoryEntry,
    ) -> PipelineResult<()>;

    /// Writes a field edit that leaves the stage alone.
    async fn update_deal(&mut self, deal: &Deal) -> PipelineResult<()>;

    async fn commit(self) -> PipelineResult<()>;
}

#[async_trait]
pub trait PipelineStore: Send + Sync {
    type Tx: PipelineTx;

    async fn begin(&self) -> PipelineResult<Self::Tx>;
}

/// Read side used by history queries and analytics.
#[async_trait]
pub trait DealReader: Send + Sync {
    async fn list_deals(&self, filter: &DealFilter) -> PipelineResult<Vec<Deal>>;

    /// History rows for the given deals, oldest first.
    async fn history_for(&self, deal_ids: &[Uuid]) -> PipelineResult<Vec<HistoryEntry>>;

    /// History rows of one deal, newest first. `NotFound` for an unknown deal.
    async fn stage_history(&self, deal_id: Uuid) -> PipelineResult<Vec<HistoryEntry>>;

    /// Newest `limit` activities targeting the deal. `NotFound` for an unknown deal.
    async fn activities(&self, deal_id: Uuid, limit: u64) -> PipelineResult<Vec<Activity>>;
}

/// Tenant and date scoping applied by readers before analytics see the deals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealFilter {
    pub company_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl DealFilter {
    pub fn for_company(company_id: Uuid) -> Self {
        Self {
            company_id: Some(company_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        self.company_id.is_none_or(|id| deal.company_id == id)
            && self.owner_id.is_none_or(|id| deal.owner_id == id)
            && self.created_from.is_none_or(|from| deal.created_at >= from)
            && self.created_to.is_none_or(|to| deal.created_at <= to)
    }
}
