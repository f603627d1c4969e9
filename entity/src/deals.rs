use sea_orm::prelude::{Date, DateTimeWithTimeZone, *};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Column widths shared by the schema and input validation, in characters.
pub const TITLE_MAX_CHARS: u32 = 200;
pub const CURRENCY_CHARS: u32 = 3;
pub const LOST_REASON_MAX_CHARS: u32 = 500;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[sea_orm(indexed)]
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub owner_id: Uuid,
    pub stage: DealStage,
    pub probability: i16,
    pub value_cents: i64,
    pub currency: String,
    pub expected_close_date: Option<Date>,
    pub actual_close_date: Option<Date>,
    pub lost_reason: Option<String>,
    pub loss_reason_category: Option<LossReasonCategory>,
    pub project_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::deal_stage_history::Entity")]
    StageHistory,
}

impl Related<super::deal_stage_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StageHistory.def()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum DealStage {
    #[sea_orm(string_value = "lead")]
    Lead,
    #[sea_orm(string_value = "qualified")]
    Qualified,
    #[sea_orm(string_value = "proposal")]
    Proposal,
    #[sea_orm(string_value = "negotiation")]
    Negotiation,
    #[sea_orm(string_value = "won")]
    Won,
    #[sea_orm(string_value = "lost")]
    Lost,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum LossReasonCategory {
    #[sea_orm(string_value = "price")]
    Price,
    #[sea_orm(string_value = "timing")]
    Timing,
    #[sea_orm(string_value = "competitor")]
    Competitor,
    #[sea_orm(string_value = "requirements")]
    Requirements,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ActiveModelBehavior for ActiveModel {}
