//! sea-orm backed store for Postgres (and SQLite in tests).

use async_trait::async_trait;
use chrono::Utc;
use entity::{activities, deal_stage_history, deals, notifications, projects};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::activity::{Activity, ActivityTarget, Notification};
use crate::deal::{Deal, HistoryEntry, Project, ProjectStatus};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::{LossReasonCategory, Stage};
use crate::store::{ActivitySink, DealFilter, DealReader, PipelineStore, PipelineTx, ProjectCreator};

#[derive(Clone)]
pub struct SeaOrmPipelineStore {
    db: DatabaseConnection,
}

impl SeaOrmPipelineStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

pub struct SeaOrmTx {
    txn: DatabaseTransaction,
}

#[async_trait]
impl PipelineStore for SeaOrmPipelineStore {
    type Tx = SeaOrmTx;

    async fn begin(&self) -> PipelineResult<SeaOrmTx> {
        let txn = self.db.begin().await?;
        Ok(SeaOrmTx { txn })
    }
}

#[async_trait]
impl ProjectCreator for SeaOrmTx {
    async fn create_from_deal(&mut self, deal: &Deal, name: &str) -> PipelineResult<Project> {
        let project = Project::seeded_from(deal, name, deal.updated_at);
        projects::Entity::insert(active_project(&project))
            .exec_without_returning(&self.txn)
            .await
            .map_err(|err| PipelineError::Creation {
                deal_id: deal.id,
                reason: err.to_string(),
            })?;
        Ok(project)
    }
}

#[async_trait]
impl ActivitySink for SeaOrmTx {
    async fn record_activity(&mut self, activity: &Activity) -> PipelineResult<()> {
        activities::Entity::insert(active_activity(activity))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn notify(&mut self, notification: &Notification) -> PipelineResult<()> {
        notifications::Entity::insert(active_notification(notification))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PipelineTx for SeaOrmTx {
    async fn load_for_update(&mut self, id: Uuid) -> PipelineResult<Deal> {
        let mut query = deals::Entity::find_by_id(id);
        // SQLite has no row locks; its writer lock covers the transaction instead.
        if self.txn.get_database_backend() == DatabaseBackend::Postgres {
            query = query.lock_exclusive();
        }
        query
            .one(&self.txn)
            .await?
            .map(Deal::from)
            .ok_or(PipelineError::NotFound(id))
    }

    async fn insert_deal(&mut self, deal: &Deal, entry: &HistoryEntry) -> PipelineResult<()> {
        deals::Entity::insert(active_deal(deal))
            .exec_without_returning(&self.txn)
            .await?;
        deal_stage_history::Entity::insert(active_history(entry))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn save(
        &mut self,
        expected: Stage,
        deal: &Deal,
        entry: &HistoryEntry,
    ) -> PipelineResult<()> {
        let result = deals::Entity::update_many()
            .set(active_deal(deal))
            .filter(deals::Column::Id.eq(deal.id))
            .filter(deals::Column::Stage.eq(deals::DealStage::from(expected)))
            .exec(&self.txn)
            .await?;
        if result.rows_affected == 0 {
            let current = deals::Entity::find_by_id(deal.id)
                .one(&self.txn)
                .await?
                .ok_or(PipelineError::NotFound(deal.id))?;
            debug!(deal_id = %deal.id, expected = %expected, "stage guard rejected update");
            return Err(PipelineError::invalid_transition(
                current.stage.into(),
                deal.stage,
            ));
        }
        deal_stage_history::Entity::insert(active_history(entry))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn update_deal(&mut self, deal: &Deal) -> PipelineResult<()> {
        let result = deals::Entity::update_many()
            .set(active_deal(deal))
            .filter(deals::Column::Id.eq(deal.id))
            .exec(&self.txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(PipelineError::NotFound(deal.id));
        }
        Ok(())
    }

    async fn commit(self) -> PipelineResult<()> {
        self.txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DealReader for SeaOrmPipelineStore {
    async fn list_deals(&self, filter: &DealFilter) -> PipelineResult<Vec<Deal>> {
        let mut query = deals::Entity::find();
        if let Some(company_id) = filter.company_id {
            query = query.filter(deals::Column::CompanyId.eq(company_id));
        }
        if let Some(owner_id) = filter.owner_id {
            query = query.filter(deals::Column::OwnerId.eq(owner_id));
        }
        if let Some(from) = filter.created_from {
            query = query.filter(deals::Column::CreatedAt.gte(DateTimeWithTimeZone::from(from)));
        }
        if let Some(to) = filter.created_to {
            query = query.filter(deals::Column::CreatedAt.lte(DateTimeWithTimeZone::from(to)));
        }
        let rows = query
            .order_by_asc(deals::Column::CreatedAt)
            .order_by_asc(deals::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Deal::from).collect())
    }

    async fn history_for(&self, deal_ids: &[Uuid]) -> PipelineResult<Vec<HistoryEntry>> {
        if deal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = deal_stage_history::Entity::find()
            .filter(deal_stage_history::Column::DealId.is_in(deal_ids.iter().copied()))
            .order_by_asc(deal_stage_history::Column::ChangedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn stage_history(&self, deal_id: Uuid) -> PipelineResult<Vec<HistoryEntry>> {
        if deals::Entity::find_by_id(deal_id).one(&self.db).await?.is_none() {
            return Err(PipelineError::NotFound(deal_id));
        }
        let rows = deal_stage_history::Entity::find()
            .filter(deal_stage_history::Column::DealId.eq(deal_id))
            .order_by_desc(deal_stage_history::Column::ChangedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn activities(&self, deal_id: Uuid, limit: u64) -> PipelineResult<Vec<Activity>> {
        if deals::Entity::find_by_id(deal_id).one(&self.db).await?.is_none() {
            return Err(PipelineError::NotFound(deal_id));
        }
        let rows = activities::Entity::find()
            .filter(activities::Column::TargetType.eq(activities::TargetType::Deal))
            .filter(activities::Column::TargetId.eq(deal_id))
            .order_by_desc(activities::Column::OccurredAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Activity::from).collect())
    }
}

impl From<deals::DealStage> for Stage {
    fn from(value: deals::DealStage) -> Self {
        match value {
            deals::DealStage::Lead => Stage::Lead,
            deals::DealStage::Qualified => Stage::Qualified,
            deals::DealStage::Proposal => Stage::Proposal,
            deals::DealStage::Negotiation => Stage::Negotiation,
            deals::DealStage::Won => Stage::Won,
            deals::DealStage::Lost => Stage::Lost,
        }
    }
}

impl From<Stage> for deals::DealStage {
    fn from(value: Stage) -> Self {
        match value {
            Stage::Lead => deals::DealStage::Lead,
            Stage::Qualified => deals::DealStage::Qualified,
            Stage::Proposal => deals::DealStage::Proposal,
            Stage::Negotiation => deals::DealStage::Negotiation,
            Stage::Won => deals::DealStage::Won,
            Stage::Lost => deals::DealStage::Lost,
        }
    }
}

impl From<deals::LossReasonCategory> for LossReasonCategory {
    fn from(value: deals::LossReasonCategory) -> Self {
        match value {
            deals::LossReasonCategory::Price => LossReasonCategory::Price,
            deals::LossReasonCategory::Timing => LossReasonCategory::Timing,
            deals::LossReasonCategory::Competitor => LossReasonCategory::Competitor,
            deals::LossReasonCategory::Requirements => LossReasonCategory::Requirements,
            deals::LossReasonCategory::Other => LossReasonCategory::Other,
        }
    }
}

impl From<LossReasonCategory> for deals::LossReasonCategory {
    fn from(value: LossReasonCategory) -> Self {
        match value {
            LossReasonCategory::Price => deals::LossReasonCategory::Price,
            LossReasonCategory::Timing => deals::LossReasonCategory::Timing,
            LossReasonCategory::Competitor => deals::LossReasonCategory::Competitor,
            LossReasonCategory::Requirements => deals::LossReasonCategory::Requirements,
            LossReasonCategory::Other => deals::LossReasonCategory::Other,
        }
    }
}

impl From<projects::ProjectStatus> for ProjectStatus {
    fn from(value: projects::ProjectStatus) -> Self {
        match value {
            projects::ProjectStatus::Planning => ProjectStatus::Planning,
            projects::ProjectStatus::Active => ProjectStatus::Active,
            projects::ProjectStatus::Completed => ProjectStatus::Completed,
            projects::ProjectStatus::Cancelled => ProjectStatus::Cancelled,
        }
    }
}

impl From<ProjectStatus> for projects::ProjectStatus {
    fn from(value: ProjectStatus) -> Self {
        match value {
            ProjectStatus::Planning => projects::ProjectStatus::Planning,
            ProjectStatus::Active => projects::ProjectStatus::Active,
            ProjectStatus::Completed => projects::ProjectStatus::Completed,
            ProjectStatus::Cancelled => projects::ProjectStatus::Cancelled,
        }
    }
}

impl From<activities::TargetType> for ActivityTarget {
    fn from(value: activities::TargetType) -> Self {
        match value {
            activities::TargetType::Deal => ActivityTarget::Deal,
            activities::TargetType::Project => ActivityTarget::Project,
        }
    }
}

impl From<ActivityTarget> for activities::TargetType {
    fn from(value: ActivityTarget) -> Self {
        match value {
            ActivityTarget::Deal => activities::TargetType::Deal,
            ActivityTarget::Project => activities::TargetType::Project,
        }
    }
}

impl From<activities::Model> for Activity {
    fn from(model: activities::Model) -> Self {
        Self {
            id: model.id,
            target_type: model.target_type.into(),
            target_id: model.target_id,
            company_id: model.company_id,
            title: model.title,
            body: model.body,
            actor_id: model.actor_id,
            occurred_at: model.occurred_at.with_timezone(&Utc),
        }
    }
}

impl From<deals::Model> for Deal {
    fn from(model: deals::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            company_id: model.company_id,
            customer_id: model.customer_id,
            owner_id: model.owner_id,
            stage: model.stage.into(),
            probability: model.probability.clamp(0, 100) as u8,
            value_cents: model.value_cents,
            currency: model.currency,
            expected_close_date: model.expected_close_date,
            actual_close_date: model.actual_close_date,
            lost_reason: model.lost_reason,
            loss_reason_category: model.loss_reason_category.map(Into::into),
            project_id: model.project_id,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<deal_stage_history::Model> for HistoryEntry {
    fn from(model: deal_stage_history::Model) -> Self {
        Self {
            id: model.id,
            deal_id: model.deal_id,
            from_stage: model.from_stage.map(Into::into),
            to_stage: model.to_stage.into(),
            changed_by: model.changed_by,
            notes: model.notes,
            changed_at: model.changed_at.with_timezone(&Utc),
        }
    }
}

impl From<projects::Model> for Project {
    fn from(model: projects::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            deal_id: model.deal_id,
            company_id: model.company_id,
            customer_id: model.customer_id,
            manager_id: model.manager_id,
            status: model.status.into(),
            value_cents: model.value_cents,
            currency: model.currency,
            start_date: model.start_date,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

fn active_deal(deal: &Deal) -> deals::ActiveModel {
    deals::ActiveModel {
        id: Set(deal.id),
        title: Set(deal.title.clone()),
        description: Set(deal.description.clone()),
        company_id: Set(deal.company_id),
        customer_id: Set(deal.customer_id),
        owner_id: Set(deal.owner_id),
        stage: Set(deal.stage.into()),
        probability: Set(i16::from(deal.probability)),
        value_cents: Set(deal.value_cents),
        currency: Set(deal.currency.clone()),
        expected_close_date: Set(deal.expected_close_date),
        actual_close_date: Set(deal.actual_close_date),
        lost_reason: Set(deal.lost_reason.clone()),
        loss_reason_category: Set(deal.loss_reason_category.map(Into::into)),
        project_id: Set(deal.project_id),
        created_at: Set(deal.created_at.into()),
        updated_at: Set(deal.updated_at.into()),
    }
}

fn active_history(entry: &HistoryEntry) -> deal_stage_history::ActiveModel {
    deal_stage_history::ActiveModel {
        id: Set(entry.id),
        deal_id: Set(entry.deal_id),
        from_stage: Set(entry.from_stage.map(Into::into)),
        to_stage: Set(entry.to_stage.into()),
        changed_by: Set(entry.changed_by),
        notes: Set(entry.notes.clone()),
        changed_at: Set(entry.changed_at.into()),
    }
}

fn active_activity(activity: &Activity) -> activities::ActiveModel {
    activities::ActiveModel {
        id: Set(activity.id),
        target_type: Set(activity.target_type.into()),
        target_id: Set(activity.target_id),
        company_id: Set(activity.company_id),
        title: Set(activity.title.clone()),
        body: Set(activity.body.clone()),
        actor_id: Set(activity.actor_id),
        occurred_at: Set(activity.occurred_at.into()),
    }
}

fn active_notification(notification: &Notification) -> notifications::ActiveModel {
    notifications::ActiveModel {
        id: Set(notification.id),
        user_id: Set(notification.user_id),
        kind: Set(notification.kind.as_str().to_string()),
        title: Set(notification.title.clone()),
        message: Set(notification.message.clone()),
        read: Set(false),
        deal_id: Set(notification.deal_id),
        created_at: Set(notification.created_at.into()),
    }
}

fn active_project(project: &Project) -> projects::ActiveModel {
    projects::ActiveModel {
        id: Set(project.id),
        name: Set(project.name.clone()),
        deal_id: Set(project.deal_id),
        company_id: Set(project.company_id),
        customer_id: Set(project.customer_id),
        manager_id: Set(project.manager_id),
        status: Set(project.status.into()),
        value_cents: Set(project.value_cents),
        currency: Set(project.currency.clone()),
        start_date: Set(project.start_date),
        created_at: Set(project.created_at.into()),
    }
}
