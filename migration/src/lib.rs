pub use sea_orm_migration::prelude::*;

mod m20250301_000001_deals;
mod m20250301_000002_deal_stage_history;
mod m20250301_000003_projects;
mod m20250301_000004_activities_and_notifications;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_deals::Migration),
            Box::new(m20250301_000002_deal_stage_history::Migration),
            Box::new(m20250301_000003_projects::Migration),
            Box::new(m20250301_000004_activities_and_notifications::Migration),
        ]
    }
}
