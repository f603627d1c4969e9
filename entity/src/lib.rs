//! sea-orm models backing the deal pipeline.

pub mod activities;
pub mod deal_stage_history;
pub mod deals;
pub mod notifications;
pub mod projects;

pub mod prelude {
    pub use crate::activities::Entity as Activities;
    pub use crate::deal_stage_history::Entity as DealStageHistory;
    pub use crate::deals::Entity as Deals;
    pub use crate::notifications::Entity as Notifications;
    pub use crate::projects::Entity as Projects;
}
