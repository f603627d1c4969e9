use chrono::Utc;
use entity::projects::NAME_MAX_CHARS;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::activity::{Activity, Notification};
use crate::analytics::{
    self, Forecast, Horizon, PipelineAnalytics, PipelineOverview, PipelineStats,
};
use crate::config::{MAX_FORECAST_DAYS, PipelineConfig};
use crate::deal::{Deal, HistoryEntry, LossReason, NewDeal, Project};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;
use crate::store::{ActivitySink, DealFilter, DealReader, PipelineStore, PipelineTx, ProjectCreator};
use crate::transition::{self, Applied, CREATED_NOTES};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinOutcome {
    pub deal: Deal,
    pub project: Option<Project>,
}

/// Entry point for every pipeline operation. Each mutation runs as one store
/// transaction: load under lock, validate, then write the deal with its
/// history row and activity together.
#[derive(Clone)]
pub struct PipelineService<S> {
    store: S,
    config: PipelineConfig,
}

impl<S> PipelineService<S>
where
    S: PipelineStore + DealReader,
{
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create(&self, input: NewDeal, actor: Option<Uuid>) -> PipelineResult<Deal> {
        let deal = input.into_deal(&self.config.default_currency, Utc::now())?;
        deal.check_invariants()?;
        let entry =
            HistoryEntry::record(deal.id, None, deal.stage, actor, CREATED_NOTES, deal.created_at);

        let mut tx = self.store.begin().await?;
        tx.insert_deal(&deal, &entry).await?;
        tx.record_activity(&Activity::deal_created(&deal, actor)).await?;
        tx.commit().await?;
        info!(deal_id = %deal.id, stage = %deal.stage, "deal created");
        Ok(deal)
    }

    #[instrument(skip(self, notes))]
    pub async fn advance(
        &self,
        deal_id: Uuid,
        target: Stage,
        notes: &str,
        actor: Option<Uuid>,
    ) -> PipelineResult<Deal> {
        self.transition(deal_id, "advance", |deal| {
            transition::advance(deal, target, notes, actor, Utc::now())
        })
        .await
    }

    /// Closes the deal as won. With `create_project` a project seeded from the
    /// deal is created in the same transaction and linked through `project_id`;
    /// the project name defaults to the deal title. The owner and the closing
    /// user are notified inside the same transaction.
    #[instrument(skip(self, project_name))]
    pub async fn win(
        &self,
        deal_id: Uuid,
        create_project: bool,
        project_name: Option<&str>,
        actor: Option<Uuid>,
    ) -> PipelineResult<WinOutcome> {
        let mut tx = self.store.begin().await?;
        let current = tx.load_for_update(deal_id).await?;

        let name = match (create_project, project_name) {
            (false, _) => None,
            (true, Some(name)) if name.trim().is_empty() => {
                warn!(%deal_id, "win rejected: blank project name");
                return Err(PipelineError::validation("project name must not be blank"));
            }
            (true, Some(name)) => Some(name.trim().to_string()),
            (true, None) => Some(current.title.clone()),
        };
        if name
            .as_ref()
            .is_some_and(|name| name.chars().count() > NAME_MAX_CHARS as usize)
        {
            warn!(%deal_id, "win rejected: project name too long");
            return Err(PipelineError::validation(format!(
                "project name must be at most {NAME_MAX_CHARS} characters"
            )));
        }

        let Applied {
            from,
            mut deal,
            entry,
            activity,
        } = transition::win(&current, actor, Utc::now())
            .inspect_err(|err| warn!(%deal_id, error = %err, "win rejected"))?;

        let project = match name {
            Some(name) => {
                let project = tx
                    .create_from_deal(&deal, &name)
                    .await
                    .inspect_err(|err| warn!(%deal_id, error = %err, "project creation failed"))?;
                deal.project_id = Some(project.id);
                Some(project)
            }
            None => None,
        };

        tx.save(from, &deal, &entry)
            .await
            .inspect_err(|err| warn!(%deal_id, error = %err, "win rejected"))?;
        tx.record_activity(&activity).await?;
        if let Some(project) = &project {
            tx.record_activity(&Activity::project_created(project, actor)).await?;
        }
        for notification in Notification::deal_won(&deal, actor) {
            tx.notify(&notification).await?;
        }
        tx.commit().await?;
        info!(
            %deal_id,
            from = %from,
            project_id = ?project.as_ref().map(|p| p.id),
            "deal won"
        );
        Ok(WinOutcome { deal, project })
    }

    /// Closes the deal as lost. The category and notes are validated after the
    /// deal is found and before the stage machine is consulted.
    #[instrument(skip(self, notes))]
    pub async fn lose(
        &self,
        deal_id: Uuid,
        category: &str,
        notes: &str,
        actor: Option<Uuid>,
    ) -> PipelineResult<Deal> {
        self.transition(deal_id, "lose", |deal| {
            let reason = LossReason::parse(category, notes)?;
            transition::lose(deal, &reason, actor, Utc::now())
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn reopen(&self, deal_id: Uuid, actor: Option<Uuid>) -> PipelineResult<Deal> {
        self.transition(deal_id, "reopen", |deal| {
            transition::reopen(deal, actor, Utc::now())
        })
        .await
    }

    /// Replaces the probability of an open deal without moving its stage.
    #[instrument(skip(self))]
    pub async fn override_probability(
        &self,
        deal_id: Uuid,
        probability: u8,
        actor: Option<Uuid>,
    ) -> PipelineResult<Deal> {
        let mut tx = self.store.begin().await?;
        let mut deal = tx.load_for_update(deal_id).await?;
        if probability > 100 {
            return Err(PipelineError::validation(format!(
                "probability {probability} is outside 0-100"
            )));
        }
        if deal.stage.is_terminal() {
            return Err(PipelineError::validation(format!(
                "probability of a {} deal is fixed",
                deal.stage
            )));
        }
        deal.probability = probability;
        deal.updated_at = Utc::now();
        tx.update_deal(&deal).await?;
        tx.commit().await?;
        info!(%deal_id, probability, ?actor, "probability overridden");
        Ok(deal)
    }

    pub async fn stage_history(&self, deal_id: Uuid) -> PipelineResult<Vec<HistoryEntry>> {
        self.store.stage_history(deal_id).await
    }

    /// The deal's activity feed, newest first.
    pub async fn activities(&self, deal_id: Uuid, limit: u64) -> PipelineResult<Vec<Activity>> {
        self.store.activities(deal_id, limit).await
    }

    pub fn overview(&self, deals: &[Deal]) -> PipelineOverview {
        analytics::pipeline_overview(deals)
    }

    pub fn stats(&self, deals: &[Deal]) -> PipelineStats {
        analytics::pipeline_stats(deals)
    }

    pub fn analytics(
        &self,
        deals: &[Deal],
        history: &[HistoryEntry],
        horizon: Horizon,
    ) -> PipelineAnalytics {
        analytics::analytics(deals, history, self.resolve(horizon), Utc::now())
    }

    pub fn forecast(&self, deals: &[Deal], horizon: Horizon) -> Forecast {
        analytics::forecast(deals, self.resolve(horizon), Utc::now().date_naive())
    }

    pub async fn overview_for(&self, filter: &DealFilter) -> PipelineResult<PipelineOverview> {
        let deals = self.store.list_deals(filter).await?;
        Ok(self.overview(&deals))
    }

    pub async fn stats_for(&self, filter: &DealFilter) -> PipelineResult<PipelineStats> {
        let deals = self.store.list_deals(filter).await?;
        Ok(self.stats(&deals))
    }

    #[instrument(skip(self))]
    pub async fn analytics_for(
        &self,
        filter: &DealFilter,
        horizon: Horizon,
    ) -> PipelineResult<PipelineAnalytics> {
        let deals = self.store.list_deals(filter).await?;
        let ids: Vec<Uuid> = deals.iter().map(|deal| deal.id).collect();
        let history = self.store.history_for(&ids).await?;
        Ok(self.analytics(&deals, &history, horizon))
    }

    pub async fn forecast_for(
        &self,
        filter: &DealFilter,
        horizon: Horizon,
    ) -> PipelineResult<Forecast> {
        let deals = self.store.list_deals(filter).await?;
        Ok(self.forecast(&deals, horizon))
    }

    fn resolve(&self, horizon: Horizon) -> Horizon {
        match horizon {
            Horizon::Months(n) => Horizon::Months(self.config.forecast_months(n)),
            Horizon::Days(n) => Horizon::Days(n.min(MAX_FORECAST_DAYS)),
        }
    }

    async fn transition<F>(
        &self,
        deal_id: Uuid,
        op: &'static str,
        apply: F,
    ) -> PipelineResult<Deal>
    where
        F: FnOnce(&Deal) -> PipelineResult<Applied> + Send,
    {
        let mut tx = self.store.begin().await?;
        let current = tx.load_for_update(deal_id).await?;
        let applied = apply(&current)
            .inspect_err(|err| warn!(%deal_id, op, error = %err, "transition rejected"))?;
        tx.save(applied.from, &applied.deal, &applied.entry)
            .await
            .inspect_err(|err| warn!(%deal_id, op, error = %err, "transition rejected"))?;
        tx.record_activity(&applied.activity).await?;
        tx.commit().await?;
        info!(
            %deal_id,
            op,
            from = %applied.from,
            to = %applied.deal.stage,
            "transition committed"
        );
        Ok(applied.deal)
    }
}
