//! Material stock allocator.
//!
//! Reconciles every material row of a project against a stock snapshot.
//! The per-type total is ground truth; per-location quantities are advisory
//! and only trusted up to that total. Whatever the breakdown does not
//! explain stays in an unknown-location bucket.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};

use indy_db::models::{MaterialPlan, MaterialSource};
use indy_db::queries::{materials as material_db, projects as project_db, tasks as task_db};

use crate::constraints::TaskConstraints;
use crate::error::{EngineError, EngineResult, require_positive_id};

/// Stock on hand: authoritative totals by type, plus an optional breakdown
/// by type and location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockSnapshot {
    pub totals: BTreeMap<i64, i64>,
    pub by_location: BTreeMap<i64, BTreeMap<i64, i64>>,
}

/// How far allocation may reach beyond a task's preferred warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseScope {
    /// Ignore preferences: unknown-location stock first, then every
    /// location in ascending order.
    Global,
    /// Preferred location first, then unknown, then the other locations.
    #[default]
    PreferLocation,
    /// Only the preferred location when the task names one.
    StrictLocation,
}

impl WarehouseScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PreferLocation => "prefer_location",
            Self::StrictLocation => "strict_location",
        }
    }
}

impl fmt::Display for WarehouseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarehouseScope {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "prefer_location" => Ok(Self::PreferLocation),
            "strict_location" => Ok(Self::StrictLocation),
            other => Err(EngineError::validation(format!(
                "invalid warehouse scope {other:?} \
                 (expected global, prefer_location or strict_location)"
            ))),
        }
    }
}

/// Where the unmet remainder of a requirement goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    Buy,
    Build,
    /// Keep the previous buy/build ratio, else follow the row's source.
    #[default]
    Preserve,
}

impl RebalanceStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Build => "build",
            Self::Preserve => "preserve",
        }
    }
}

impl fmt::Display for RebalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "build" => Ok(Self::Build),
            "preserve" => Ok(Self::Preserve),
            other => Err(EngineError::validation(format!(
                "invalid rebalance strategy {other:?} (expected buy, build or preserve)"
            ))),
        }
    }
}

/// Remaining stock of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypePool {
    pub unknown: i64,
    pub locations: BTreeMap<i64, i64>,
}

impl TypePool {
    fn draw_unknown(&mut self, want: i64) -> i64 {
        let take = want.min(self.unknown).max(0);
        self.unknown -= take;
        take
    }

    fn draw_location(&mut self, location_id: i64, want: i64) -> i64 {
        let Some(qty) = self.locations.get_mut(&location_id) else {
            return 0;
        };
        let take = want.min(*qty).max(0);
        *qty -= take;
        take
    }

    fn draw_others(&mut self, skip: Option<i64>, mut want: i64) -> i64 {
        let mut taken = 0;
        for (loc, qty) in self.locations.iter_mut() {
            if want == 0 {
                break;
            }
            if Some(*loc) == skip {
                continue;
            }
            let take = want.min(*qty).max(0);
            *qty -= take;
            want -= take;
            taken += take;
        }
        taken
    }
}

/// Build per-type pools. A type without a total has no stock.
pub fn build_pools(snapshot: &StockSnapshot) -> HashMap<i64, TypePool> {
    let mut pools = HashMap::new();
    for (&type_id, &total) in &snapshot.totals {
        let total = total.max(0);
        let mut trusted = 0;
        let mut locations = BTreeMap::new();
        if let Some(breakdown) = snapshot.by_location.get(&type_id) {
            for (&loc, &qty) in breakdown {
                let take = qty.max(0).min(total - trusted);
                if take > 0 {
                    locations.insert(loc, take);
                    trusted += take;
                }
            }
        }
        pools.insert(
            type_id,
            TypePool {
                unknown: total - trusted,
                locations,
            },
        );
    }
    pools
}

/// New split for one material row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub id: i64,
    pub available_qty: i64,
    pub buy_qty: i64,
    pub build_qty: i64,
    pub source: MaterialSource,
}

/// Allocate stock to `rows`. `preferred` maps task id to its preferred
/// warehouse location.
pub fn allocate(
    rows: &[MaterialPlan],
    preferred: &HashMap<i64, i64>,
    snapshot: &StockSnapshot,
    scope: WarehouseScope,
    strategy: RebalanceStrategy,
) -> Vec<Allocation> {
    let mut pools = build_pools(snapshot);
    let mut ordered: Vec<&MaterialPlan> = rows.iter().collect();
    ordered.sort_by_key(|r| (r.task_id, r.type_id, r.id));

    let mut out = Vec::with_capacity(ordered.len());
    for row in ordered {
        let need = row.required_qty.max(0);
        let location = row.task_id.and_then(|t| preferred.get(&t).copied());
        let available = match pools.get_mut(&row.type_id) {
            Some(pool) => draw(pool, need, location, scope),
            None => 0,
        };
        let remainder = need - available;
        let (buy_qty, build_qty) = split_remainder(row, remainder, strategy);
        let source = derive_source(row.source, remainder, buy_qty, build_qty);
        debug!(
            material_id = row.id,
            type_id = row.type_id,
            available,
            buy_qty,
            build_qty,
            "allocated"
        );
        out.push(Allocation {
            id: row.id,
            available_qty: available,
            buy_qty,
            build_qty,
            source,
        });
    }
    out
}

fn draw(pool: &mut TypePool, need: i64, location: Option<i64>, scope: WarehouseScope) -> i64 {
    let mut got = 0;
    match (scope, location) {
        (WarehouseScope::StrictLocation, Some(loc)) => {
            got += pool.draw_location(loc, need);
        }
        (WarehouseScope::Global, _) | (_, None) => {
            got += pool.draw_unknown(need);
            got += pool.draw_others(None, need - got);
        }
        (WarehouseScope::PreferLocation, Some(loc)) => {
            got += pool.draw_location(loc, need);
            got += pool.draw_unknown(need - got);
            got += pool.draw_others(Some(loc), need - got);
        }
    }
    got
}

fn split_remainder(row: &MaterialPlan, remainder: i64, strategy: RebalanceStrategy) -> (i64, i64) {
    match strategy {
        RebalanceStrategy::Buy => (remainder, 0),
        RebalanceStrategy::Build => (0, remainder),
        RebalanceStrategy::Preserve => {
            let prev_buy = row.buy_qty.max(0);
            let prev_build = row.build_qty.max(0);
            let prev = prev_buy + prev_build;
            if prev > 0 {
                let build = ((remainder as i128 * prev_build as i128 + prev as i128 / 2)
                    / prev as i128) as i64;
                (remainder - build, build)
            } else if row.source.is_build_like() {
                (0, remainder)
            } else {
                (remainder, 0)
            }
        }
    }
}

fn derive_source(previous: MaterialSource, remainder: i64, buy: i64, build: i64) -> MaterialSource {
    match (remainder, buy, build) {
        (0, _, _) => MaterialSource::Stock,
        (_, 0, _) if previous == MaterialSource::Reprocess => MaterialSource::Reprocess,
        (_, 0, _) => MaterialSource::Build,
        (_, _, 0) if previous == MaterialSource::Contract => MaterialSource::Contract,
        (_, _, 0) => MaterialSource::Market,
        _ if previous == MaterialSource::Stock => MaterialSource::Stock,
        _ => MaterialSource::Market,
    }
}

/// Rebalance a project's material rows against `snapshot` and persist the
/// new splits in one transaction.
pub async fn rebalance_materials_from_stock(
    pool: &PgPool,
    user_id: &str,
    project_id: i64,
    snapshot: &StockSnapshot,
    scope: WarehouseScope,
    strategy: RebalanceStrategy,
) -> EngineResult<Vec<MaterialPlan>> {
    require_positive_id("project", project_id)?;
    let mut tx = pool.begin().await?;

    project_db::lock_project(&mut *tx, user_id, project_id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", project_id))?;

    let tasks = task_db::list_tasks_for_project(&mut *tx, user_id, project_id).await?;
    let preferred: HashMap<i64, i64> = tasks
        .iter()
        .filter_map(|t| {
            TaskConstraints::from_json(&t.constraints)
                .preferred_location_id
                .map(|loc| (t.id, loc))
        })
        .collect();

    let rows = material_db::list_materials_for_project(&mut *tx, user_id, project_id).await?;
    let allocations = allocate(&rows, &preferred, snapshot, scope, strategy);

    let mut updated = Vec::with_capacity(allocations.len());
    for a in &allocations {
        let row = material_db::update_material_allocation(
            &mut *tx,
            user_id,
            a.id,
            a.available_qty,
            a.buy_qty,
            a.build_qty,
            a.source,
        )
        .await?
        .ok_or_else(|| EngineError::not_found("material", a.id))?;
        updated.push(row);
    }

    tx.commit().await?;

    info!(
        user = user_id,
        project_id,
        rows = updated.len(),
        %scope,
        %strategy,
        "rebalanced materials from stock"
    );
    Ok(updated)
}
