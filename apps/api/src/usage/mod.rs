//! Plans and monthly usage counters.
//!
//! Usage is recorded with a conditional upsert, so two concurrent requests
//! cannot both take the last slot of a month.

pub mod handlers;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{UsageCounterRow, UserPlanRow};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Standard,
    Premium,
}

impl Plan {
    /// Unknown values fall back to `Free`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "standard" => Plan::Standard,
            "premium" => Plan::Premium,
            _ => Plan::Free,
        }
    }

    /// Monthly cap for `kind`; `None` means unlimited.
    pub fn monthly_limit(&self, kind: UsageKind) -> Option<i32> {
        match (self, kind) {
            (Plan::Free, UsageKind::Interview) => Some(3),
            (Plan::Free, UsageKind::EsCorrection) => Some(5),
            (Plan::Standard, UsageKind::Interview) => Some(30),
            (Plan::Standard, UsageKind::EsCorrection) => Some(50),
            (Plan::Premium, _) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Interview,
    EsCorrection,
}

impl UsageKind {
    fn column(&self) -> &'static str {
        match self {
            UsageKind::Interview => "interviews",
            UsageKind::EsCorrection => "es_corrections",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            UsageKind::Interview => "mock interview",
            UsageKind::EsCorrection => "ES correction",
        }
    }
}

/// Billing period key, e.g. `2026-04`.
pub fn period_for(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

pub fn current_period() -> String {
    period_for(Utc::now())
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageLine {
    pub used: i32,
    pub limit: Option<i32>,
    pub remaining: Option<i32>,
}

impl UsageLine {
    fn new(used: i32, limit: Option<i32>) -> Self {
        Self {
            used,
            limit,
            remaining: limit.map(|l| (l - used).max(0)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub plan: Plan,
    pub period: String,
    pub interviews: UsageLine,
    pub es_corrections: UsageLine,
}

pub fn summarize(plan: Plan, period: String, counter: Option<&UsageCounterRow>) -> UsageSummary {
    let (interviews, es_corrections) = counter
        .map(|c| (c.interviews, c.es_corrections))
        .unwrap_or((0, 0));
    UsageSummary {
        plan,
        period,
        interviews: UsageLine::new(interviews, plan.monthly_limit(UsageKind::Interview)),
        es_corrections: UsageLine::new(
            es_corrections,
            plan.monthly_limit(UsageKind::EsCorrection),
        ),
    }
}

pub async fn get_plan(pool: &PgPool, user_id: Uuid) -> Result<Plan, AppError> {
    let row = sqlx::query_as::<_, UserPlanRow>("SELECT * FROM user_plans WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    // No row: the user never subscribed.
    Ok(row.map(|r| Plan::from_db(&r.plan)).unwrap_or_default())
}

pub async fn get_usage_summary(pool: &PgPool, user_id: Uuid) -> Result<UsageSummary, AppError> {
    let plan = get_plan(pool, user_id).await?;
    let period = current_period();
    let counter = sqlx::query_as::<_, UsageCounterRow>(
        "SELECT * FROM usage_counters WHERE user_id = $1 AND period = $2",
    )
    .bind(user_id)
    .bind(&period)
    .fetch_optional(pool)
    .await?;
    Ok(summarize(plan, period, counter.as_ref()))
}

fn quota_exceeded(plan: Plan, kind: UsageKind, limit: i32) -> AppError {
    AppError::QuotaExceeded(format!(
        "Monthly {} limit of {} reached on the {:?} plan",
        kind.label(),
        limit,
        plan
    ))
}

/// Read-only pre-check, run before any paid LLM work. Returns the user's plan.
pub async fn check_quota(pool: &PgPool, user_id: Uuid, kind: UsageKind) -> Result<Plan, AppError> {
    let plan = get_plan(pool, user_id).await?;
    let Some(limit) = plan.monthly_limit(kind) else {
        return Ok(plan);
    };

    let sql = format!(
        "SELECT {} FROM usage_counters WHERE user_id = $1 AND period = $2",
        kind.column()
    );
    let used: Option<i32> = sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(current_period())
        .fetch_optional(pool)
        .await?;

    if used.unwrap_or(0) >= limit {
        return Err(quota_exceeded(plan, kind, limit));
    }
    Ok(plan)
}

/// Takes one unit of `kind` quota for the current month.
/// The increment is conditional, so it fails with `QuotaExceeded` if a
/// concurrent request took the last slot after `check_quota`.
pub async fn record_usage<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    plan: Plan,
    kind: UsageKind,
) -> Result<i32, AppError> {
    let column = kind.column();
    let limit = plan.monthly_limit(kind).unwrap_or(i32::MAX);
    let period = current_period();

    let sql = format!(
        r#"
        INSERT INTO usage_counters (user_id, period, {column})
        VALUES ($1, $2, 1)
        ON CONFLICT (user_id, period) DO UPDATE
            SET {column} = usage_counters.{column} + 1, updated_at = now()
            WHERE usage_counters.{column} < $3
        RETURNING {column}
        "#
    );

    let used: Option<i32> = sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(&period)
        .bind(limit)
        .fetch_optional(executor)
        .await?;

    match used {
        Some(used) => {
            info!("User {user_id} used {used} {} in {period}", kind.label());
            Ok(used)
        }
        None => Err(quota_exceeded(plan, kind, limit)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_period_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(period_for(at), "2026-04");
    }

    #[test]
    fn test_premium_is_unlimited() {
        assert_eq!(Plan::Premium.monthly_limit(UsageKind::Interview), None);
        assert_eq!(Plan::Premium.monthly_limit(UsageKind::EsCorrection), None);
    }

    #[test]
    fn test_free_plan_limits() {
        assert_eq!(Plan::Free.monthly_limit(UsageKind::Interview), Some(3));
        assert_eq!(Plan::Free.monthly_limit(UsageKind::EsCorrection), Some(5));
    }

    #[test]
    fn test_unknown_plan_falls_back_to_free() {
        assert_eq!(Plan::from_db("enterprise"), Plan::Free);
        assert_eq!(Plan::from_db("standard"), Plan::Standard);
    }

    #[test]
    fn test_summary_without_counter_row() {
        let summary = summarize(Plan::Free, "2026-04".into(), None);
        assert_eq!(summary.interviews.used, 0);
        assert_eq!(summary.interviews.remaining, Some(3));
        assert_eq!(summary.es_corrections.remaining, Some(5));
    }

    #[test]
    fn test_remaining_never_negative() {
        let counter = UsageCounterRow {
            user_id: Uuid::nil(),
            period: "2026-04".into(),
            interviews: 7,
            es_corrections: 1,
            updated_at: Utc::now(),
        };
        // a downgrade can leave usage above the new cap
        let summary = summarize(Plan::Free, "2026-04".into(), Some(&counter));
        assert_eq!(summary.interviews.remaining, Some(0));
        assert_eq!(summary.es_corrections.remaining, Some(4));

        let premium = summarize(Plan::Premium, "2026-04".into(), Some(&counter));
        assert_eq!(premium.interviews.remaining, None);
    }
}
