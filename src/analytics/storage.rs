/// Aggregate queries behind the analytics endpoints

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// None unless `year` has four digits and `month` is 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((1..=9999).contains(&year) && (1..=12).contains(&month)).then_some(Self { year, month })
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn current() -> Self {
        Self::of(Utc::now())
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// `YYYY-MM`, the leading characters of every stored timestamp in this month
    fn prefix(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodStats {
    pub workflow_executions: i64,
    pub phase_executions: i64,
    pub credits_consumed: i64,
}

#[derive(Debug, Clone)]
pub struct AnalyticsStorage {
    pool: SqlitePool,
}

impl AnalyticsStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Executions started in `period`, the phases they ran and the credits they used
    pub async fn period_stats(&self, user_id: &str, period: Period) -> Result<PeriodStats> {
        let prefix = period.prefix();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS executions, COALESCE(SUM(credits_consumed), 0) AS credits
            FROM workflow_executions
            WHERE user_id = ? AND substr(started_at, 1, 7) = ?
            "#,
        )
        .bind(user_id)
        .bind(&prefix)
        .fetch_one(&self.pool)
        .await?;

        let phase_executions: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM execution_phases p
            JOIN workflow_executions e ON e.id = p.execution_id
            WHERE e.user_id = ? AND substr(e.started_at, 1, 7) = ?
              AND p.started_at IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(&prefix)
        .fetch_one(&self.pool)
        .await?;

        Ok(PeriodStats {
            workflow_executions: row.get("executions"),
            phase_executions,
            credits_consumed: row.get("credits"),
        })
    }

    /// Every month from the user's first started execution up to `now`, oldest first
    pub async fn periods(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Period>> {
        let earliest: Option<String> =
            sqlx::query_scalar("SELECT MIN(started_at) FROM workflow_executions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let Some(earliest) = earliest else {
            return Ok(Vec::new());
        };
        let earliest = DateTime::parse_from_rfc3339(&earliest)?.with_timezone(&Utc);

        let last = Period::of(now);
        let mut period = Period::of(earliest);
        let mut periods = Vec::new();
        while period <= last {
            periods.push(period);
            period = period.next();
        }

        Ok(periods)
    }
}
