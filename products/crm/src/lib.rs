//! Deal pipeline engine: the stage machine, win/lose/reopen orchestration with
//! project conversion, and read-only pipeline analytics.

pub mod activity;
pub mod analytics;
pub mod config;
pub mod deal;
pub mod error;
pub mod memory;
pub mod orm;
pub mod service;
pub mod stage;
pub mod store;
pub mod transition;

pub use activity::{Activity, ActivityTarget, Notification, NotificationKind};
pub use analytics::{
    ConversionRate, Forecast, ForecastBucket, Horizon, PipelineAnalytics, PipelineOverview,
    PipelineStats, StageDuration, StageSummary, StageTotals, VelocityStats, WinRateAnalysis,
};
pub use config::PipelineConfig;
pub use deal::{Deal, HistoryEntry, LossReason, NewDeal, Project, ProjectStatus};
pub use error::{PipelineError, PipelineResult};
pub use memory::InMemoryPipelineStore;
pub use orm::SeaOrmPipelineStore;
pub use service::{PipelineService, WinOutcome};
pub use stage::{LossReasonCategory, Stage, default_probability_for};
pub use store::{
    ActivitySink, DealFilter, DealReader, PipelineStore, PipelineTx, ProjectCreator,
};
