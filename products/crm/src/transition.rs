//! Pure stage transitions. Each function either returns the next deal state
//! together with the history row and activity recording it, or leaves the
//! input untouched.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::activity::Activity;
use crate::deal::{Deal, HistoryEntry, LossReason};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Stage, default_probability_for};

pub const WON_NOTES: &str = "Deal won";
pub const REOPENED_NOTES: &str = "Deal reopened";
pub const CREATED_NOTES: &str = "Deal created";

/// A transition that passed the stage machine and is ready to persist.
#[derive(Clone, Debug)]
pub struct Applied {
    pub from: Stage,
    pub deal: Deal,
    pub entry: HistoryEntry,
    pub activity: Activity,
}

/// Moves the deal one step forward along [`crate::stage::STAGE_SEQUENCE`].
pub fn advance(
    deal: &Deal,
    target: Stage,
    notes: &str,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> PipelineResult<Applied> {
    if deal.stage.next() != Some(target) {
        return Err(PipelineError::invalid_transition(deal.stage, target));
    }
    let from = deal.stage;
    Ok(apply(deal, target, notes.trim(), actor, now, |_| {}, |next| {
        Activity::stage_changed(next, from, actor)
    }))
}

/// Closes the deal as won from any open stage.
pub fn win(deal: &Deal, actor: Option<Uuid>, now: DateTime<Utc>) -> PipelineResult<Applied> {
    if deal.stage.is_terminal() {
        return Err(PipelineError::invalid_transition(deal.stage, Stage::Won));
    }
    Ok(apply(deal, Stage::Won, WON_NOTES, actor, now, |_| {}, |next| {
        Activity::deal_won(next, actor)
    }))
}

pub fn lose(
    deal: &Deal,
    reason: &LossReason,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> PipelineResult<Applied> {
    if deal.stage.is_terminal() {
        return Err(PipelineError::invalid_transition(deal.stage, Stage::Lost));
    }
    let notes = reason.history_notes();
    Ok(apply(
        deal,
        Stage::Lost,
        &notes,
        actor,
        now,
        |next| {
            next.lost_reason = Some(reason.notes.clone());
            next.loss_reason_category = Some(reason.category);
        },
        |next| Activity::deal_lost(next, reason, actor),
    ))
}

/// Puts a lost deal back at the start of the sequence.
pub fn reopen(deal: &Deal, actor: Option<Uuid>, now: DateTime<Utc>) -> PipelineResult<Applied> {
    if deal.stage != Stage::Lost {
        return Err(PipelineError::invalid_transition(deal.stage, Stage::Lead));
    }
    Ok(apply(
        deal,
        Stage::Lead,
        REOPENED_NOTES,
        actor,
        now,
        |next| {
            next.lost_reason = None;
            next.loss_reason_category = None;
            next.actual_close_date = None;
        },
        |next| Activity::deal_reopened(next, actor),
    ))
}

fn apply(
    deal: &Deal,
    target: Stage,
    notes: &str,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
    extra: impl FnOnce(&mut Deal),
    describe: impl FnOnce(&Deal) -> Activity,
) -> Applied {
    let mut next = deal.clone();
    next.stage = target;
    next.probability = default_probability_for(target);
    if target.is_terminal() {
        next.actual_close_date = Some(now.date_naive());
    }
    next.updated_at = now;
    extra(&mut next);

    let entry = HistoryEntry::record(deal.id, Some(deal.stage), target, actor, notes, now);
    let activity = describe(&next);
    Applied {
        from: deal.stage,
        deal: next,
        entry,
        activity,
    }
}
