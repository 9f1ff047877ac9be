//! Job ledger: a filtered, paginated job listing with status rollups.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use indy_db::models::JobStatus;
use indy_db::queries::ledger::{self as ledger_db, LedgerRow, StatusTotal};

use crate::error::{EngineResult, require_positive_id};

pub const DEFAULT_LIMIT: i64 = 200;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerQuery {
    pub project_id: Option<i64>,
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ledger {
    pub entries: Vec<LedgerRow>,
    /// Per status, over the whole filtered set.
    pub totals: Vec<StatusTotal>,
    pub total_jobs: i64,
    pub total_cost_isk: f64,
}

/// Page size actually used: default when unset or non-positive, capped.
pub fn effective_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

pub async fn get_ledger(pool: &PgPool, user_id: &str, query: &LedgerQuery) -> EngineResult<Ledger> {
    if let Some(project_id) = query.project_id {
        require_positive_id("project", project_id)?;
    }
    let limit = effective_limit(query.limit);

    let entries =
        ledger_db::list_ledger(pool, user_id, query.project_id, query.status, limit).await?;
    let totals = ledger_db::ledger_totals(pool, user_id, query.project_id, query.status).await?;

    let total_jobs = totals.iter().map(|t| t.jobs).sum();
    let total_cost_isk = totals.iter().map(|t| t.cost_isk).sum();

    Ok(Ledger {
        entries,
        totals,
        total_jobs,
        total_cost_isk,
    })
}
