use anyhow::Result;
use platform_api::{ApiError, ErrorPayload};
use products_crm::{Deal, HistoryEntry, PipelineError, WinOutcome};
use serde::Serialize;

/// Deal as printed by the CLI, with its derived weighted value.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealView<'a> {
    #[serde(flatten)]
    pub deal: &'a Deal,
    pub weighted_value_cents: i64,
}

impl<'a> From<&'a Deal> for DealView<'a> {
    fn from(deal: &'a Deal) -> Self {
        Self {
            deal,
            weighted_value_cents: deal.weighted_value_cents(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinView<'a> {
    pub deal: DealView<'a>,
    pub project: Option<&'a products_crm::Project>,
}

impl<'a> From<&'a WinOutcome> for WinView<'a> {
    fn from(outcome: &'a WinOutcome) -> Self {
        Self {
            deal: DealView::from(&outcome.deal),
            project: outcome.project.as_ref(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView<'a> {
    pub deal_id: uuid::Uuid,
    pub entries: &'a [HistoryEntry],
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Maps a failed command onto the caller-facing error payload. Pipeline errors
/// keep their kind; anything else is reported as internal.
pub fn error_payload(err: anyhow::Error) -> ErrorPayload {
    match err.downcast::<PipelineError>() {
        Ok(pipeline) => ApiError::from(pipeline).payload(),
        Err(other) => ApiError::internal(other).payload(),
    }
}
