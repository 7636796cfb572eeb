//! Aggregate queries over the `telemetry` table.
//!
//! Every query is scoped to one vehicle and an inclusive time window, and
//! reads only columns named by [`MetricColumn`], so no caller-provided text
//! ever reaches the SQL.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::time::timeout;

use super::errors::{DbError, DbResult};

/// Vehicle and inclusive time window shared by the aggregate queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilters {
    pub vehicle_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Telemetry columns the trend and distribution queries can read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricColumn {
    #[default]
    Speed,
    Temp,
    Power,
    TractionForce,
    BrakePressure,
}

impl MetricColumn {
    /// Look up a metric by its query-string name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "speed" => Some(MetricColumn::Speed),
            "temp" => Some(MetricColumn::Temp),
            "power" => Some(MetricColumn::Power),
            "traction_force" => Some(MetricColumn::TractionForce),
            "brake_pressure" => Some(MetricColumn::BrakePressure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricColumn::Speed => "speed",
            MetricColumn::Temp => "temp",
            MetricColumn::Power => "power",
            MetricColumn::TractionForce => "traction_force",
            MetricColumn::BrakePressure => "brake_pressure",
        }
    }

    /// Column in the `telemetry` table
    pub fn column(&self) -> &'static str {
        match self {
            MetricColumn::Speed => "odometry_vehicle_speed",
            MetricColumn::Temp => "temperature_ambient",
            MetricColumn::Power => "electric_power_demand",
            MetricColumn::TractionForce => "traction_traction_force",
            MetricColumn::BrakePressure => "traction_brake_pressure",
        }
    }
}

// ==================
// KPIs
// ==================

/// Headline numbers for one vehicle over a window; `None` when no row
/// in the window has a value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub avg_speed: Option<f64>,
    pub max_temp: Option<f64>,
    pub total_power: Option<f64>,
    pub avg_brake_pressure: Option<f64>,
    pub door_open_ratio: Option<f64>,
}

const KPI_QUERY: &str = "
    SELECT
        AVG(odometry_vehicle_speed)::float8,
        MAX(temperature_ambient)::float8,
        SUM(electric_power_demand)::float8,
        AVG(traction_brake_pressure)::float8,
        AVG(status_door_is_open)::float8
    FROM telemetry
    WHERE vehicle_id = $1
      AND time_iso >= $2
      AND time_iso <= $3";

type KpiRow = (Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>);

pub async fn kpis(pool: &PgPool, filters: &QueryFilters, deadline: Duration) -> DbResult<Kpis> {
    let (avg_speed, max_temp, total_power, avg_brake_pressure, door_open_ratio) = bounded(
        deadline,
        sqlx::query_as::<_, KpiRow>(KPI_QUERY)
            .bind(&filters.vehicle_id)
            .bind(filters.start)
            .bind(filters.end)
            .fetch_one(pool),
    )
    .await?;

    Ok(Kpis {
        avg_speed,
        max_temp,
        total_power,
        avg_brake_pressure,
        door_open_ratio,
    })
}

// ==================
// Trend
// ==================

/// One raw sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: String,
    pub value: f64,
}

/// Raw samples of `metric` in time order; rows without a value are skipped
pub async fn trend(
    pool: &PgPool,
    filters: &QueryFilters,
    metric: MetricColumn,
    deadline: Duration,
) -> DbResult<Vec<TrendPoint>> {
    let sql = format!(
        "SELECT time_iso, {}::float8 AS value
         FROM telemetry
         WHERE vehicle_id = $1
           AND time_iso >= $2
           AND time_iso <= $3
         ORDER BY time_iso",
        metric.column()
    );

    let rows = bounded(
        deadline,
        sqlx::query_as::<_, (DateTime<Utc>, Option<f64>)>(&sql)
            .bind(&filters.vehicle_id)
            .bind(filters.start)
            .bind(filters.end)
            .fetch_all(pool),
    )
    .await?;

    Ok(trend_points(rows))
}

fn trend_points(rows: Vec<(DateTime<Utc>, Option<f64>)>) -> Vec<TrendPoint> {
    rows.into_iter()
        .filter_map(|(time, value)| {
            value.map(|value| TrendPoint {
                timestamp: time.to_rfc3339_opts(SecondsFormat::Secs, true),
                value,
            })
        })
        .collect()
}

// ==================
// Distribution
// ==================

/// One histogram bucket; bucket numbers start at 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub bucket: i32,
    pub count: i64,
    pub range_min: f64,
    pub range_max: f64,
}

/// Smallest and largest value of `metric` in the window
pub async fn value_range(
    pool: &PgPool,
    filters: &QueryFilters,
    metric: MetricColumn,
    deadline: Duration,
) -> DbResult<(Option<f64>, Option<f64>)> {
    let sql = format!(
        "SELECT MIN({col})::float8, MAX({col})::float8
         FROM telemetry
         WHERE vehicle_id = $1
           AND time_iso >= $2
           AND time_iso <= $3",
        col = metric.column()
    );

    bounded(
        deadline,
        sqlx::query_as::<_, (Option<f64>, Option<f64>)>(&sql)
            .bind(&filters.vehicle_id)
            .bind(filters.start)
            .bind(filters.end)
            .fetch_one(pool),
    )
    .await
}

/// Histogram of `metric` over `bins` equal-width buckets.
///
/// The bounds are recomputed inside the query so the buckets agree with
/// the rows they count. The maximum lands in bucket `bins + 1`, as
/// `width_bucket` puts the upper bound outside the last bucket.
pub async fn histogram(
    pool: &PgPool,
    filters: &QueryFilters,
    metric: MetricColumn,
    bins: i32,
    deadline: Duration,
) -> DbResult<Vec<Bucket>> {
    let sql = format!(
        "WITH bounds AS (
             SELECT MIN({col})::float8 AS minval, MAX({col})::float8 AS maxval
             FROM telemetry
             WHERE vehicle_id = $1
               AND time_iso >= $2
               AND time_iso <= $3
         )
         SELECT sub.bucket, COUNT(*) AS cnt, bounds.minval, bounds.maxval
         FROM (
             SELECT width_bucket({col}::float8, bounds.minval, bounds.maxval, $4) AS bucket
             FROM telemetry, bounds
             WHERE vehicle_id = $1
               AND time_iso >= $2
               AND time_iso <= $3
               AND {col} IS NOT NULL
         ) sub, bounds
         GROUP BY sub.bucket, bounds.minval, bounds.maxval
         ORDER BY sub.bucket",
        col = metric.column()
    );

    let rows = bounded(
        deadline,
        sqlx::query_as::<_, (i32, i64, f64, f64)>(&sql)
            .bind(&filters.vehicle_id)
            .bind(filters.start)
            .bind(filters.end)
            .bind(bins)
            .fetch_all(pool),
    )
    .await?;

    Ok(buckets(rows, bins))
}

fn buckets(rows: Vec<(i32, i64, f64, f64)>, bins: i32) -> Vec<Bucket> {
    rows.into_iter()
        .map(|(bucket, count, min, max)| {
            let width = (max - min) / f64::from(bins);
            Bucket {
                bucket,
                count,
                range_min: min + f64::from(bucket - 1) * width,
                range_max: min + f64::from(bucket) * width,
            }
        })
        .collect()
}

async fn bounded<T, F>(deadline: Duration, query: F) -> DbResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    timeout(deadline, query)
        .await
        .map_err(|_| DbError::Query("timed out".to_string()))?
        .map_err(|e| DbError::Query(e.to_string()))
}
