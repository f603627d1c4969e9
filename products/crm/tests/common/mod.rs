use migration::{Migrator, MigratorTrait};
use products_crm::{
    LossReasonCategory, NewDeal, PipelineConfig, PipelineService, SeaOrmPipelineStore, Stage,
};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

pub async fn sqlite_service() -> PipelineService<SeaOrmPipelineStore> {
    let db = connect_sqlite().await;
    PipelineService::new(SeaOrmPipelineStore::new(db), PipelineConfig::default())
}

pub async fn connect_sqlite() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub fn deal_input(stage: Stage, value_cents: i64) -> NewDeal {
    NewDeal {
        title: "Municipal fleet telematics".into(),
        company_id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        stage: Some(stage),
        value_cents,
        loss_reason: (stage == Stage::Lost)
            .then(|| (LossReasonCategory::Price, "Lost to competitor XYZ".to_string())),
        ..NewDeal::default()
    }
}
