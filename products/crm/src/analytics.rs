//! Read-only aggregation over an already-filtered deal collection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{MAX_FORECAST_DAYS, MAX_FORECAST_MONTHS};
use crate::deal::{Deal, HistoryEntry, weighted_cents};
use crate::error::PipelineError;
use crate::stage::{ALL_STAGES, OPEN_STAGES, STAGE_SEQUENCE, Stage};

/// Open deals grouped by stage. All four open stages are always present.
pub type PipelineOverview = BTreeMap<Stage, Vec<Deal>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTotals {
    pub count: u64,
    pub total_value_cents: i64,
    pub total_weighted_value_cents: i64,
}

impl StageTotals {
    fn add(&mut self, deal: &Deal) {
        self.count += 1;
        self.total_value_cents = self.total_value_cents.saturating_add(deal.value_cents);
        self.total_weighted_value_cents = self
            .total_weighted_value_cents
            .saturating_add(deal.weighted_value_cents());
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub stages: BTreeMap<Stage, StageTotals>,
    pub open_count: u64,
    pub open_value_cents: i64,
    pub open_weighted_value_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRate {
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub rate: f64,
    pub deals_converted: u64,
    pub total_deals: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRateAnalysis {
    pub total_closed: u64,
    pub total_won: u64,
    pub total_lost: u64,
    pub win_rate: f64,
    pub economic_win_rate: f64,
    pub won_value_cents: i64,
    pub lost_value_cents: i64,
    pub avg_won_deal_value_cents: f64,
    pub avg_lost_deal_value_cents: f64,
    pub avg_days_to_close: f64,
}

/// Forecast window. `Days(n)` is a single bucket, `Months(n)` one bucket per
/// calendar month starting with the current one. Day horizons longer than
/// [`MAX_FORECAST_DAYS`] are rejected when parsed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Horizon {
    Days(u32),
    Months(u32),
}

impl Horizon {
    pub fn label(self) -> String {
        match self {
            Horizon::Days(n) => format!("{n}d"),
            Horizon::Months(n) => format!("{}m", n.clamp(1, MAX_FORECAST_MONTHS)),
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Horizon {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().to_ascii_lowercase();
        let invalid = || PipelineError::validation(format!("invalid horizon `{}`", value.trim()));
        let unit = trimmed.chars().last().ok_or_else(invalid)?;
        let n: u32 = trimmed[..trimmed.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        match unit {
            'd' if n > MAX_FORECAST_DAYS => Err(PipelineError::validation(format!(
                "day horizon must be at most {MAX_FORECAST_DAYS} days"
            ))),
            'd' => Ok(Horizon::Days(n)),
            'm' => Ok(Horizon::Months(n)),
            _ => Err(invalid()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastBucket {
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub deal_count: u64,
    pub total_value_cents: i64,
    pub weighted_value_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub horizon: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub buckets: Vec<ForecastBucket>,
    pub deal_count: u64,
    pub weighted_value_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub stage: Stage,
    pub count: u64,
    pub total_value_cents: i64,
    pub weighted_value_cents: i64,
    pub avg_probability: f64,
    pub avg_value_cents: f64,
    pub overdue_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityStats {
    pub deals_won: u64,
    pub avg_days_to_win: f64,
    pub p50_days_to_win: f64,
    pub p90_days_to_win: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDuration {
    pub stage: Stage,
    pub avg_days: f64,
    pub samples: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineAnalytics {
    pub conversion_rates: Vec<ConversionRate>,
    pub win_rate_analysis: WinRateAnalysis,
    pub forecast30: Forecast,
    pub forecast90: Forecast,
    pub forecast: Forecast,
    pub summary_by_stage: Vec<StageSummary>,
    pub velocity: VelocityStats,
    pub average_days_in_stage: Vec<StageDuration>,
    pub generated_at: DateTime<Utc>,
}

pub fn pipeline_overview(deals: &[Deal]) -> PipelineOverview {
    let mut overview: PipelineOverview =
        OPEN_STAGES.iter().map(|stage| (*stage, Vec::new())).collect();
    for deal in deals.iter().filter(|deal| deal.is_open()) {
        if let Some(bucket) = overview.get_mut(&deal.stage) {
            bucket.push(deal.clone());
        }
    }
    overview
}

pub fn pipeline_stats(deals: &[Deal]) -> PipelineStats {
    let mut stages: BTreeMap<Stage, StageTotals> = ALL_STAGES
        .iter()
        .map(|stage| (*stage, StageTotals::default()))
        .collect();
    let mut open = StageTotals::default();
    for deal in deals {
        stages.entry(deal.stage).or_default().add(deal);
        if deal.is_open() {
            open.add(deal);
        }
    }
    PipelineStats {
        stages,
        open_count: open.count,
        open_value_cents: open.total_value_cents,
        open_weighted_value_cents: open.total_weighted_value_cents,
    }
}

/// Stages each deal has touched, from its history and its current stage.
fn reached_stages(deals: &[Deal], history: &[HistoryEntry]) -> HashMap<Uuid, HashSet<Stage>> {
    let mut reached: HashMap<Uuid, HashSet<Stage>> = deals
        .iter()
        .map(|deal| (deal.id, HashSet::from([deal.stage])))
        .collect();
    for entry in history {
        if let Some(stages) = reached.get_mut(&entry.deal_id) {
            stages.insert(entry.to_stage);
            if let Some(from) = entry.from_stage {
                stages.insert(from);
            }
        }
    }
    reached
}

/// One entry per adjacent pair of the stage sequence, in order.
pub fn conversion_rates(deals: &[Deal], history: &[HistoryEntry]) -> Vec<ConversionRate> {
    let reached = reached_stages(deals, history);
    STAGE_SEQUENCE
        .windows(2)
        .map(|pair| {
            let (from, to) = (pair[0], pair[1]);
            let entered: Vec<&HashSet<Stage>> =
                reached.values().filter(|stages| stages.contains(&from)).collect();
            let converted = entered.iter().filter(|stages| stages.contains(&to)).count() as u64;
            let total = entered.len() as u64;
            ConversionRate {
                from_stage: from,
                to_stage: to,
                rate: ratio(converted as f64, total as f64),
                deals_converted: converted,
                total_deals: total,
            }
        })
        .collect()
}

pub fn win_rate_analysis(deals: &[Deal]) -> WinRateAnalysis {
    let won: Vec<&Deal> = deals.iter().filter(|d| d.stage == Stage::Won).collect();
    let lost: Vec<&Deal> = deals.iter().filter(|d| d.stage == Stage::Lost).collect();
    let won_value = total(won.iter().map(|d| d.value_cents));
    let lost_value = total(lost.iter().map(|d| d.value_cents));
    let total_closed = (won.len() + lost.len()) as u64;

    let close_days: Vec<f64> = won
        .iter()
        .filter_map(|deal| {
            let closed = deal.actual_close_date?;
            Some((closed - deal.created_at.date_naive()).num_days() as f64)
        })
        .collect();

    WinRateAnalysis {
        total_closed,
        total_won: won.len() as u64,
        total_lost: lost.len() as u64,
        win_rate: ratio(won.len() as f64, total_closed as f64),
        economic_win_rate: ratio(won_value as f64, won_value as f64 + lost_value as f64),
        won_value_cents: won_value,
        lost_value_cents: lost_value,
        avg_won_deal_value_cents: ratio(won_value as f64, won.len() as f64),
        avg_lost_deal_value_cents: ratio(lost_value as f64, lost.len() as f64),
        avg_days_to_close: mean(&close_days),
    }
}

/// Buckets open deals by expected close date. Deals without a date, closed
/// deals and dates outside the horizon are left out. Month horizons cover
/// whole calendar months, so the first bucket starts on the 1st of the
/// current month.
pub fn forecast(deals: &[Deal], horizon: Horizon, today: NaiveDate) -> Forecast {
    let mut buckets = forecast_buckets(horizon, today);
    for deal in deals.iter().filter(|deal| deal.is_open()) {
        let Some(close) = deal.expected_close_date else {
            continue;
        };
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|bucket| bucket.start <= close && close <= bucket.end)
        {
            bucket.deal_count += 1;
            bucket.total_value_cents = bucket.total_value_cents.saturating_add(deal.value_cents);
            bucket.weighted_value_cents = bucket
                .weighted_value_cents
                .saturating_add(weighted_cents(deal.value_cents, deal.probability));
        }
    }
    let from = buckets.first().map_or(today, |bucket| bucket.start);
    let to = buckets.last().map_or(today, |bucket| bucket.end);
    Forecast {
        horizon: horizon.label(),
        from,
        to,
        deal_count: buckets.iter().map(|b| b.deal_count).sum(),
        weighted_value_cents: total(buckets.iter().map(|b| b.weighted_value_cents)),
        buckets,
    }
}

fn forecast_buckets(horizon: Horizon, today: NaiveDate) -> Vec<ForecastBucket> {
    let empty = |period: String, start: NaiveDate, end: NaiveDate| ForecastBucket {
        period,
        start,
        end,
        deal_count: 0,
        total_value_cents: 0,
        weighted_value_cents: 0,
    };
    match horizon {
        Horizon::Days(n) => {
            let end = today
                .checked_add_days(Days::new(u64::from(n)))
                .unwrap_or(NaiveDate::MAX);
            vec![empty(horizon.label(), today, end)]
        }
        Horizon::Months(n) => {
            let mut months = Vec::new();
            let mut cursor = first_of_month(today);
            for _ in 0..n.clamp(1, MAX_FORECAST_MONTHS) {
                let next = next_month(cursor);
                let end = next.pred_opt().unwrap_or(next);
                let period = format!("{:04}-{:02}", cursor.year(), cursor.month());
                months.push(empty(period, cursor, end));
                cursor = next;
            }
            months
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Per-stage summary for stages that currently hold deals.
pub fn summary_by_stage(deals: &[Deal], today: NaiveDate) -> Vec<StageSummary> {
    ALL_STAGES
        .iter()
        .filter_map(|stage| {
            let in_stage: Vec<&Deal> = deals.iter().filter(|d| d.stage == *stage).collect();
            if in_stage.is_empty() {
                return None;
            }
            let count = in_stage.len() as u64;
            let total_value = total(in_stage.iter().map(|d| d.value_cents));
            let probability_sum: u64 = in_stage.iter().map(|d| u64::from(d.probability)).sum();
            let overdue = in_stage
                .iter()
                .filter(|d| d.is_open() && d.expected_close_date.is_some_and(|date| date < today))
                .count() as u64;
            Some(StageSummary {
                stage: *stage,
                count,
                total_value_cents: total_value,
                weighted_value_cents: total(in_stage.iter().map(|d| d.weighted_value_cents())),
                avg_probability: ratio(probability_sum as f64, count as f64),
                avg_value_cents: ratio(total_value as f64, count as f64),
                overdue_count: overdue,
            })
        })
        .collect()
}

/// Days from creation to the first win recorded in history.
pub fn velocity(deals: &[Deal], history: &[HistoryEntry]) -> VelocityStats {
    let created: HashMap<Uuid, DateTime<Utc>> =
        deals.iter().map(|deal| (deal.id, deal.created_at)).collect();
    let mut first_win: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    for entry in history.iter().filter(|entry| entry.to_stage == Stage::Won) {
        first_win
            .entry(entry.deal_id)
            .and_modify(|at| *at = (*at).min(entry.changed_at))
            .or_insert(entry.changed_at);
    }
    let mut durations: Vec<f64> = first_win
        .iter()
        .filter_map(|(id, won_at)| {
            let created_at = created.get(id)?;
            Some(days_between(*created_at, *won_at))
        })
        .collect();
    if durations.is_empty() {
        return VelocityStats::default();
    }
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    VelocityStats {
        deals_won: durations.len() as u64,
        avg_days_to_win: mean(&durations),
        p50_days_to_win: percentile(&durations, 0.5),
        p90_days_to_win: percentile(&durations, 0.9),
    }
}

/// Mean days spent in a stage, measured between consecutive history rows and
/// attributed to the stage being left.
pub fn average_days_in_stage(deals: &[Deal], history: &[HistoryEntry]) -> Vec<StageDuration> {
    let ids: HashSet<Uuid> = deals.iter().map(|deal| deal.id).collect();
    let mut per_deal: HashMap<Uuid, Vec<&HistoryEntry>> = HashMap::new();
    for entry in history.iter().filter(|entry| ids.contains(&entry.deal_id)) {
        per_deal.entry(entry.deal_id).or_default().push(entry);
    }
    let mut samples: HashMap<Stage, Vec<f64>> = HashMap::new();
    for rows in per_deal.values_mut() {
        rows.sort_by_key(|entry| entry.changed_at);
        for pair in rows.windows(2) {
            samples
                .entry(pair[0].to_stage)
                .or_default()
                .push(days_between(pair[0].changed_at, pair[1].changed_at));
        }
    }
    ALL_STAGES
        .iter()
        .filter_map(|stage| {
            let values = samples.get(stage)?;
            Some(StageDuration {
                stage: *stage,
                avg_days: mean(values),
                samples: values.len() as u64,
            })
        })
        .collect()
}

pub fn analytics(
    deals: &[Deal],
    history: &[HistoryEntry],
    horizon: Horizon,
    now: DateTime<Utc>,
) -> PipelineAnalytics {
    let today = now.date_naive();
    PipelineAnalytics {
        conversion_rates: conversion_rates(deals, history),
        win_rate_analysis: win_rate_analysis(deals),
        forecast30: forecast(deals, Horizon::Days(30), today),
        forecast90: forecast(deals, Horizon::Days(90), today),
        forecast: forecast(deals, horizon, today),
        summary_by_stage: summary_by_stage(deals, today),
        velocity: velocity(deals, history),
        average_days_in_stage: average_days_in_stage(deals, history),
        generated_at: now,
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

fn total(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len() as f64)
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let clamped = percentile.clamp(0.0, 1.0);
    let rank = (clamped * values.len() as f64).ceil().max(1.0) as usize - 1;
    let idx = rank.min(values.len() - 1);
    values[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::fixtures::deal_in;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(deal: &Deal, from: Option<Stage>, to: Stage, at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry::record(deal.id, from, to, None, "", at)
    }

    #[test]
    fn overview_lists_every_open_stage() {
        let deals = vec![
            deal_in(Stage::Lead, 100),
            deal_in(Stage::Won, 100),
            deal_in(Stage::Lead, 200),
        ];
        let overview = pipeline_overview(&deals);
        assert_eq!(overview.keys().copied().collect::<Vec<_>>(), OPEN_STAGES.to_vec());
        assert_eq!(overview[&Stage::Lead].len(), 2);
        assert!(overview[&Stage::Negotiation].is_empty());
    }

    #[test]
    fn stats_sum_value_and_weighted_value() {
        let deals = vec![
            deal_in(Stage::Proposal, 100_000),
            deal_in(Stage::Proposal, 50_000),
            deal_in(Stage::Lost, 70_000),
        ];
        let stats = pipeline_stats(&deals);
        assert_eq!(stats.stages.len(), 6);
        let proposal = &stats.stages[&Stage::Proposal];
        assert_eq!(proposal.count, 2);
        assert_eq!(proposal.total_value_cents, 150_000);
        assert_eq!(proposal.total_weighted_value_cents, 75_000);
        assert_eq!(stats.stages[&Stage::Lost].total_weighted_value_cents, 0);
        assert_eq!(stats.open_count, 2);
        assert_eq!(stats.open_value_cents, 150_000);
        assert_eq!(stats.open_weighted_value_cents, 75_000);
    }

    #[test]
    fn conversion_has_four_bounded_entries() {
        let now = Utc::now();
        let advanced = deal_in(Stage::Qualified, 1);
        let stuck = deal_in(Stage::Lead, 1);
        let history = vec![
            row(&advanced, None, Stage::Lead, now),
            row(&advanced, Some(Stage::Lead), Stage::Qualified, now),
            row(&stuck, None, Stage::Lead, now),
        ];
        let rates = conversion_rates(&[advanced, stuck], &history);
        assert_eq!(rates.len(), 4);
        assert_eq!(rates[0].from_stage, Stage::Lead);
        assert_eq!(rates[0].to_stage, Stage::Qualified);
        assert_eq!(rates[0].total_deals, 2);
        assert_eq!(rates[0].deals_converted, 1);
        assert!((rates[0].rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(rates[3].to_stage, Stage::Won);
        for rate in &rates {
            assert!((0.0..=1.0).contains(&rate.rate));
        }
        assert_eq!(rates[1].rate, 0.0);
    }

    #[test]
    fn conversion_on_empty_collection_is_zero() {
        let rates = conversion_rates(&[], &[]);
        assert_eq!(rates.len(), 4);
        assert!(rates.iter().all(|rate| rate.rate == 0.0 && rate.total_deals == 0));
    }

    #[test]
    fn win_rate_without_closed_deals_is_zero() {
        let analysis = win_rate_analysis(&[deal_in(Stage::Lead, 10)]);
        assert_eq!(analysis.total_closed, 0);
        assert_eq!(analysis.win_rate, 0.0);
        assert_eq!(analysis.economic_win_rate, 0.0);
        assert_eq!(analysis.avg_days_to_close, 0.0);
    }

    #[test]
    fn win_rate_by_count_and_value() {
        let deals = vec![
            deal_in(Stage::Won, 300),
            deal_in(Stage::Lost, 100),
            deal_in(Stage::Lost, 200),
            deal_in(Stage::Proposal, 1_000),
        ];
        let analysis = win_rate_analysis(&deals);
        assert_eq!(analysis.total_closed, 3);
        assert_eq!(analysis.total_won, 1);
        assert_eq!(analysis.total_lost, 2);
        assert!((analysis.win_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((analysis.economic_win_rate - 0.5).abs() < 1e-9);
        assert_eq!(analysis.avg_lost_deal_value_cents, 150.0);
    }

    #[test]
    fn day_forecast_is_one_inclusive_bucket() {
        let today = day(2025, 3, 10);
        let mut inside = deal_in(Stage::Proposal, 100_000);
        inside.expected_close_date = Some(day(2025, 4, 9));
        let mut past_end = deal_in(Stage::Proposal, 100_000);
        past_end.expected_close_date = Some(day(2025, 4, 10));
        let undated = deal_in(Stage::Negotiation, 100_000);
        let mut closed = deal_in(Stage::Won, 100_000);
        closed.expected_close_date = Some(day(2025, 3, 15));

        let result = forecast(&[inside, past_end, undated, closed], Horizon::Days(30), today);
        assert_eq!(result.horizon, "30d");
        assert_eq!(result.buckets.len(), 1);
        assert_eq!(result.buckets[0].period, "30d");
        assert_eq!(result.to, day(2025, 4, 9));
        assert_eq!(result.deal_count, 1);
        assert_eq!(result.weighted_value_cents, 50_000);
        assert_eq!(result.buckets[0].total_value_cents, 100_000);
    }

    #[test]
    fn month_forecast_buckets_by_calendar_month() {
        let today = day(2025, 11, 20);
        let mut nov = deal_in(Stage::Lead, 10_000);
        nov.expected_close_date = Some(day(2025, 11, 30));
        let mut jan = deal_in(Stage::Negotiation, 10_000);
        jan.expected_close_date = Some(day(2026, 1, 31));
        let mut earlier_this_month = deal_in(Stage::Lead, 10_000);
        earlier_this_month.expected_close_date = Some(day(2025, 11, 1));
        let mut last_month = deal_in(Stage::Lead, 10_000);
        last_month.expected_close_date = Some(day(2025, 10, 31));

        let result = forecast(
            &[nov, jan, earlier_this_month, last_month],
            Horizon::Months(3),
            today,
        );
        assert_eq!(result.horizon, "3m");
        let periods: Vec<&str> = result.buckets.iter().map(|b| b.period.as_str()).collect();
        assert_eq!(periods, vec!["2025-11", "2025-12", "2026-01"]);
        assert_eq!(result.from, day(2025, 11, 1));
        assert_eq!(result.to, day(2026, 1, 31));
        assert_eq!(result.buckets[0].start, day(2025, 11, 1));
        assert_eq!(result.buckets[0].end, day(2025, 11, 30));
        assert_eq!(result.buckets[0].deal_count, 2);
        assert_eq!(result.buckets[0].weighted_value_cents, 2_000);
        assert_eq!(result.buckets[1].deal_count, 0);
        assert_eq!(result.buckets[2].weighted_value_cents, 7_500);
        assert_eq!(result.deal_count, 3);
    }

    #[test]
    fn month_horizon_is_clamped() {
        let result = forecast(&[], Horizon::Months(40), day(2025, 1, 1));
        assert_eq!(result.buckets.len(), 12);
        assert_eq!(result.horizon, "12m");
    }

    #[test]
    fn parses_horizon_labels() {
        assert_eq!("30d".parse::<Horizon>().unwrap(), Horizon::Days(30));
        assert_eq!(" 6M ".parse::<Horizon>().unwrap(), Horizon::Months(6));
        assert!("thirty".parse::<Horizon>().is_err());
        assert!("".parse::<Horizon>().is_err());
        assert_eq!(
            format!("{MAX_FORECAST_DAYS}d").parse::<Horizon>().unwrap(),
            Horizon::Days(MAX_FORECAST_DAYS)
        );
        assert!(matches!(
            "100000000d".parse::<Horizon>(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn day_horizon_past_calendar_end_saturates() {
        let result = forecast(&[], Horizon::Days(u32::MAX), day(2025, 1, 1));
        assert_eq!(result.to, NaiveDate::MAX);
        assert_eq!(result.deal_count, 0);
    }

    #[test]
    fn huge_values_saturate_totals() {
        let mut a = deal_in(Stage::Lead, i64::MAX / 2);
        a.expected_close_date = Some(day(2025, 1, 5));
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        let c = deal_in(Stage::Won, i64::MAX);
        let deals = vec![a, b.clone(), b, c];

        let stats = pipeline_stats(&deals);
        assert_eq!(stats.stages[&Stage::Lead].count, 3);
        assert_eq!(stats.open_value_cents, i64::MAX);
        assert_eq!(stats.stages[&Stage::Lead].total_weighted_value_cents, 3 * (i64::MAX / 20));

        let result = forecast(&deals, Horizon::Days(30), day(2025, 1, 1));
        assert_eq!(result.buckets[0].total_value_cents, i64::MAX);
        assert!(result.weighted_value_cents > 0);

        let summary = summary_by_stage(&deals, day(2025, 1, 1));
        assert_eq!(summary[0].total_value_cents, i64::MAX);
        assert_eq!(win_rate_analysis(&deals).won_value_cents, i64::MAX);
    }

    #[test]
    fn summary_counts_overdue_open_deals() {
        let today = day(2025, 6, 1);
        let mut late = deal_in(Stage::Proposal, 200);
        late.expected_close_date = Some(day(2025, 5, 1));
        let on_time = deal_in(Stage::Proposal, 400);
        let summary = summary_by_stage(&[late, on_time], today);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].stage, Stage::Proposal);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].overdue_count, 1);
        assert_eq!(summary[0].avg_value_cents, 300.0);
        assert_eq!(summary[0].avg_probability, 50.0);
        assert_eq!(summary[0].weighted_value_cents, 300);
    }

    #[test]
    fn velocity_uses_first_win() {
        let mut deal = deal_in(Stage::Won, 1);
        let created = Utc::now() - Duration::days(20);
        deal.created_at = created;
        let history = vec![
            row(&deal, None, Stage::Lead, created),
            row(&deal, Some(Stage::Negotiation), Stage::Won, created + Duration::days(10)),
            row(&deal, Some(Stage::Lead), Stage::Won, created + Duration::days(15)),
        ];
        let stats = velocity(&[deal], &history);
        assert_eq!(stats.deals_won, 1);
        assert!((stats.avg_days_to_win - 10.0).abs() < 1e-9);
        assert!((stats.p90_days_to_win - 10.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_picks_ranked_value() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 0.5), 5.0);
        assert_eq!(percentile(&values, 0.9), 9.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn time_in_stage_attributed_to_stage_left() {
        let deal = deal_in(Stage::Proposal, 1);
        let start = Utc::now() - Duration::days(10);
        let history = vec![
            row(&deal, None, Stage::Lead, start),
            row(&deal, Some(Stage::Lead), Stage::Qualified, start + Duration::days(2)),
            row(&deal, Some(Stage::Qualified), Stage::Proposal, start + Duration::days(6)),
        ];
        let durations = average_days_in_stage(&[deal], &history);
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[0].stage, Stage::Lead);
        assert!((durations[0].avg_days - 2.0).abs() < 1e-9);
        assert_eq!(durations[1].stage, Stage::Qualified);
        assert!((durations[1].avg_days - 4.0).abs() < 1e-9);
    }

    #[test]
    fn bundle_carries_fixed_horizons() {
        let bundle = analytics(&[], &[], Horizon::Months(3), Utc::now());
        assert_eq!(bundle.conversion_rates.len(), 4);
        assert_eq!(bundle.forecast30.horizon, "30d");
        assert_eq!(bundle.forecast90.horizon, "90d");
        assert_eq!(bundle.forecast.horizon, "3m");
        assert!(bundle.summary_by_stage.is_empty());

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["forecast30"]["horizon"], "30d");
        assert_eq!(json["conversionRates"][0]["fromStage"], "lead");
        assert_eq!(json["winRateAnalysis"]["totalClosed"], 0);
    }
}
