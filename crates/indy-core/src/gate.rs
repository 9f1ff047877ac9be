//! Blueprint capacity gate.
//!
//! Caps each task's total runs at what the project's blueprint pool can
//! support. Blueprint originals (BPOs) are unlimited; copies (BPCs) add up
//! their remaining runs. Tasks without a blueprint-type constraint and jobs
//! without a task are never touched.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use indy_db::models::BlueprintPool;
use indy_db::queries::blueprints::BlueprintUpsert;

use crate::constraints::TaskConstraints;
use crate::draft::JobDraft;

/// One row of the pool as the gate sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    pub blueprint_type_id: i64,
    pub location_id: Option<i64>,
    pub is_bpo: bool,
    pub available_runs: i64,
}

impl PoolEntry {
    fn key(&self) -> (i64, Option<i64>, bool) {
        (self.blueprint_type_id, self.location_id, self.is_bpo)
    }
}

impl From<&BlueprintPool> for PoolEntry {
    fn from(row: &BlueprintPool) -> Self {
        Self {
            blueprint_type_id: row.blueprint_type_id,
            location_id: row.location_id,
            is_bpo: row.is_bpo,
            available_runs: if row.is_bpo { 0 } else { row.available_runs.max(0) },
        }
    }
}

impl From<&BlueprintUpsert> for PoolEntry {
    fn from(row: &BlueprintUpsert) -> Self {
        Self {
            blueprint_type_id: row.blueprint_type_id,
            location_id: row.location_id,
            is_bpo: row.is_bpo,
            available_runs: row.stored_runs(),
        }
    }
}

/// Upsert `patch` rows over `persisted`, keyed like the database's unique
/// constraint. Used by previews, which cannot read the merged pool back.
pub fn merge_pool(persisted: &[PoolEntry], patch: &[PoolEntry]) -> Vec<PoolEntry> {
    let mut merged: Vec<PoolEntry> = persisted.to_vec();
    for row in patch {
        match merged.iter_mut().find(|r| r.key() == row.key()) {
            Some(existing) => *existing = *row,
            None => merged.push(*row),
        }
    }
    merged
}

/// Capacity available to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Unlimited,
    Runs(i64),
    /// No row of the blueprint type at all.
    MissingType,
    /// Rows of the type exist, but none at the required location.
    MissingAtLocation,
}

/// Look up capacity for a blueprint type, optionally pinned to a location.
/// A pool row with no location matches any location.
pub fn capacity(pool: &[PoolEntry], blueprint_type_id: i64, location_id: Option<i64>) -> Capacity {
    let mut of_type = pool
        .iter()
        .filter(|r| r.blueprint_type_id == blueprint_type_id)
        .peekable();
    if of_type.peek().is_none() {
        return Capacity::MissingType;
    }

    let matching: Vec<&PoolEntry> = of_type
        .filter(|r| match (location_id, r.location_id) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        })
        .collect();
    if matching.is_empty() {
        return Capacity::MissingAtLocation;
    }
    if matching.iter().any(|r| r.is_bpo) {
        return Capacity::Unlimited;
    }
    Capacity::Runs(
        matching
            .iter()
            .fold(0i64, |acc, r| acc.saturating_add(r.available_runs.max(0))),
    )
}

/// Result of gating one batch of jobs.
#[derive(Debug, Default)]
pub struct GateOutcome {
    pub jobs: Vec<JobDraft>,
    pub warnings: Vec<String>,
}

/// Split `capacity` units over `runs` proportionally. Each share is the
/// floor of its exact share; leftover units go one at a time to entries in
/// input order. The shares sum to `capacity` when `capacity < sum(runs)`.
pub fn prorate(runs: &[i64], capacity: i64) -> Vec<i64> {
    let demand: i128 = runs.iter().map(|r| (*r).max(0) as i128).sum();
    if demand == 0 {
        return vec![0; runs.len()];
    }
    let cap = capacity.max(0) as i128;
    let mut shares: Vec<i64> = runs
        .iter()
        .map(|r| ((*r).max(0) as i128 * cap / demand) as i64)
        .collect();

    let mut leftover = cap.min(demand) as i64 - shares.iter().sum::<i64>();
    while leftover > 0 {
        let before = leftover;
        for (share, want) in shares.iter_mut().zip(runs) {
            if leftover == 0 {
                break;
            }
            if *share < *want {
                *share += 1;
                leftover -= 1;
            }
        }
        if leftover == before {
            break;
        }
    }
    shares
}

/// Apply the gate. `strict` drops jobs whose blueprint is missing from the
/// pool; with `strict == false` such jobs pass through untouched. Capacity
/// shortages are prorated in both modes.
pub fn apply_gate(
    jobs: Vec<JobDraft>,
    constraints: &HashMap<i64, TaskConstraints>,
    pool: &[PoolEntry],
    strict: bool,
) -> GateOutcome {
    // Ordered so warnings come out deterministically.
    let mut by_task: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, job) in jobs.iter().enumerate() {
        let Some(task_id) = job.task_id else { continue };
        let gated = constraints
            .get(&task_id)
            .is_some_and(|c| c.blueprint_type_id.is_some());
        if gated {
            by_task.entry(task_id).or_default().push(idx);
        }
    }

    let mut allotted: Vec<Option<i64>> = jobs.iter().map(|j| Some(j.runs)).collect();
    let mut warnings = Vec::new();

    for (task_id, idxs) in &by_task {
        let c = &constraints[task_id];
        let Some(bp_type) = c.blueprint_type_id else { continue };
        let demand = idxs
            .iter()
            .fold(0i64, |acc, &i| acc.saturating_add(jobs[i].runs.max(0)));
        if demand == 0 {
            continue;
        }

        match capacity(pool, bp_type, c.blueprint_location_id) {
            Capacity::Unlimited => {}
            Capacity::Runs(cap) if cap >= demand => {}
            Capacity::MissingType | Capacity::MissingAtLocation if !strict => {}
            Capacity::MissingType => {
                warn!(task_id, blueprint_type_id = bp_type, "blueprint gate rejected task");
                warnings.push(format!(
                    "blueprint gate: missing owned blueprint type {bp_type} for task {task_id}; \
                     dropped {} job(s) ({demand} runs)",
                    idxs.len()
                ));
                for &i in idxs {
                    allotted[i] = None;
                }
            }
            Capacity::MissingAtLocation => {
                let loc = c.blueprint_location_id.unwrap_or_default();
                warn!(
                    task_id,
                    blueprint_type_id = bp_type,
                    location_id = loc,
                    "blueprint gate rejected task"
                );
                warnings.push(format!(
                    "blueprint gate: missing blueprint at location {loc} for type {bp_type} \
                     (task {task_id}); dropped {} job(s) ({demand} runs)",
                    idxs.len()
                ));
                for &i in idxs {
                    allotted[i] = None;
                }
            }
            Capacity::Runs(cap) => {
                let runs: Vec<i64> = idxs.iter().map(|&i| jobs[i].runs).collect();
                let shares = prorate(&runs, cap);
                let mut scaled = 0;
                let mut dropped = 0;
                for (&i, share) in idxs.iter().zip(shares) {
                    if share <= 0 {
                        allotted[i] = None;
                        dropped += 1;
                    } else {
                        if share < jobs[i].runs {
                            scaled += 1;
                        }
                        allotted[i] = Some(share);
                    }
                }
                warn!(
                    task_id,
                    blueprint_type_id = bp_type,
                    demand,
                    capacity = cap,
                    "blueprint capacity shortage"
                );
                warnings.push(format!(
                    "blueprint gate: capacity shortage for task {task_id} \
                     (blueprint type {bp_type}): \
                     demand {demand} runs, capacity {cap} runs; {scaled} job(s) reduced, \
                     {dropped} job(s) dropped"
                ));
            }
        }
    }

    let mut out = Vec::with_capacity(jobs.len());
    for (job, allot) in jobs.into_iter().zip(allotted) {
        match allot {
            None => {}
            Some(runs) if runs == job.runs => out.push(job),
            Some(runs) => {
                let old = job.runs;
                let mut scaled = job.scaled(runs);
                scaled.append_note(&format!(
                    "blueprint gate: runs reduced from {old} to {runs} by blueprint capacity"
                ));
                out.push(scaled);
            }
        }
    }

    GateOutcome {
        jobs: out,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bpc(type_id: i64, loc: Option<i64>, runs: i64) -> PoolEntry {
        PoolEntry {
            blueprint_type_id: type_id,
            location_id: loc,
            is_bpo: false,
            available_runs: runs,
        }
    }

    fn bpo(type_id: i64, loc: Option<i64>) -> PoolEntry {
        PoolEntry {
            blueprint_type_id: type_id,
            location_id: loc,
            is_bpo: true,
            available_runs: 0,
        }
    }

    fn job(task: i64, runs: i64) -> JobDraft {
        let mut j = JobDraft::new(Some(task), "manufacturing", runs);
        j.duration_seconds = runs * 100;
        j.cost_isk = runs as f64 * 10.0;
        j
    }

    fn constraints(task: i64, bp: i64, loc: Option<i64>) -> HashMap<i64, TaskConstraints> {
        HashMap::from([(
            task,
            TaskConstraints {
                blueprint_type_id: Some(bp),
                blueprint_location_id: loc,
                ..Default::default()
            },
        )])
    }

    #[test]
    fn bpo_upsert_normalises_runs() {
        let row = BlueprintUpsert {
            project_id: 1,
            blueprint_type_id: 5,
            location_id: None,
            is_bpo: true,
            available_runs: 999,
            material_efficiency: 10,
            time_efficiency: 20,
            notes: String::new(),
        };
        assert_eq!(PoolEntry::from(&row).available_runs, 0);
    }

    #[test]
    fn bpo_means_unlimited() {
        let pool = [bpc(5, None, 1), bpo(5, Some(60))];
        assert_eq!(capacity(&pool, 5, Some(60)), Capacity::Unlimited);
        let out = apply_gate(vec![job(1, 1000)], &constraints(1, 5, Some(60)), &pool, true);
        assert_eq!(out.jobs[0].runs, 1000);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn location_matching_accepts_unlocated_rows() {
        let pool = [bpc(5, Some(10), 3), bpc(5, None, 4), bpc(5, Some(20), 100)];
        assert_eq!(capacity(&pool, 5, Some(10)), Capacity::Runs(7));
        assert_eq!(capacity(&pool, 5, None), Capacity::Runs(107));
        assert_eq!(capacity(&[bpc(5, Some(20), 1)], 5, Some(10)), Capacity::MissingAtLocation);
        assert_eq!(capacity(&pool, 6, None), Capacity::MissingType);
    }

    #[test]
    fn strict_missing_type_drops_jobs() {
        let out = apply_gate(vec![job(1, 3), job(2, 4)], &constraints(1, 5, None), &[], true);
        assert_eq!(out.jobs.len(), 1);
        assert_eq!(out.jobs[0].task_id, Some(2));
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("blueprint gate: missing owned blueprint"));
    }

    #[test]
    fn strict_missing_location_has_its_own_warning() {
        let pool = [bpc(5, Some(20), 10)];
        let out = apply_gate(vec![job(1, 3)], &constraints(1, 5, Some(10)), &pool, true);
        assert!(out.jobs.is_empty());
        assert!(out.warnings[0].contains("missing blueprint at location 10"));
    }

    #[test]
    fn bypass_passes_missing_through() {
        let out = apply_gate(vec![job(1, 3)], &constraints(1, 5, None), &[], false);
        assert_eq!(out.jobs.len(), 1);
        assert_eq!(out.jobs[0].runs, 3);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn shortage_prorates_to_exact_capacity() {
        let jobs = vec![job(1, 10), job(1, 5), job(1, 5)];
        let out = apply_gate(jobs, &constraints(1, 5, None), &[bpc(5, None, 7)], true);
        let total: i64 = out.jobs.iter().map(|j| j.runs).sum();
        assert_eq!(total, 7);
        for j in &out.jobs {
            assert_eq!(j.duration_seconds, j.runs * 100);
            assert!((j.cost_isk - j.runs as f64 * 10.0).abs() < 1e-9);
            assert!(j.notes.contains("blueprint gate"));
        }
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("blueprint gate: capacity shortage"));
    }

    #[test]
    fn zero_allotment_jobs_are_dropped() {
        let jobs = vec![job(1, 1), job(1, 1), job(1, 1)];
        let out = apply_gate(jobs, &constraints(1, 5, None), &[bpc(5, None, 1)], true);
        assert_eq!(out.jobs.len(), 1);
        assert_eq!(out.jobs[0].runs, 1);
        assert!(out.warnings[0].contains("2 job(s) dropped"));
    }

    #[test]
    fn prorate_gives_leftovers_in_input_order() {
        assert_eq!(prorate(&[3, 3, 3], 4), vec![2, 1, 1]);
        assert_eq!(prorate(&[10, 5, 5], 7), vec![4, 2, 1]);
        assert_eq!(prorate(&[2, 2], 0), vec![0, 0]);
    }

    #[test]
    fn merge_overrides_matching_key() {
        let persisted = [bpc(5, None, 3), bpo(6, None)];
        let merged = merge_pool(&persisted, &[bpc(5, None, 9), bpc(5, Some(1), 2)]);
        assert_eq!(merged.len(), 3);
        assert_eq!(capacity(&merged, 5, Some(1)), Capacity::Runs(11));
    }
}
