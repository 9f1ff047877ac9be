//! Dependency-aware multi-slot scheduler.
//!
//! # Algorithm
//!
//! 1. Stable-sort jobs by the depth of their task, so parent work is placed
//!    before child work.
//! 2. Split each job into chunks of at most
//!    `min(max_job_runs, floor(max_job_duration / per_run))` runs.
//! 3. Give each chunk to the slot that frees up first (lowest index on
//!    ties), starting no earlier than the task's dependency-ready time.
//! 4. Runs that cannot start inside the horizon become one deferred entry
//!    without timestamps.
//!
//! Slot cursors and anchors are local to one call.

pub mod config;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use indy_db::models::JobStatus;

use crate::draft::JobDraft;
use crate::forest::TaskForest;

pub use config::{SchedulerConfig, SchedulerOptions, StrategyProfile};

/// Scheduled and deferred chunks plus run accounting.
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    pub jobs: Vec<JobDraft>,
    pub total_runs: i64,
    pub scheduled_runs: i64,
    pub deferred_runs: i64,
    pub deferred_jobs: i64,
    pub warnings: Vec<String>,
}

/// Status a chunk is written with: running or finished work keeps its
/// declared status, everything else enters the queue.
pub fn chunk_status(declared: JobStatus, queue_status: JobStatus) -> JobStatus {
    if declared.is_committed() {
        declared
    } else {
        queue_status
    }
}

/// Runs per chunk for a job with the given per-run duration.
pub fn chunk_size(per_run_seconds: f64, config: &SchedulerConfig) -> i64 {
    let by_duration = if per_run_seconds > 0.0 {
        (config.max_job_duration_seconds as f64 / per_run_seconds).floor() as i64
    } else {
        i64::MAX
    };
    config.max_job_runs.min(by_duration).max(1)
}

/// Lay `jobs` out on the configured slots. `forest` holds every task the
/// jobs may reference, persisted and new.
pub fn schedule_jobs(
    jobs: Vec<JobDraft>,
    forest: &mut TaskForest,
    config: &SchedulerConfig,
) -> ScheduleOutcome {
    let horizon_end = config.horizon_end;
    let mut outcome = ScheduleOutcome::default();

    let mut order: Vec<(usize, JobDraft)> = jobs
        .into_iter()
        .map(|job| {
            let depth = job.task_id.map_or(0, |id| forest.depth(id));
            (depth, job)
        })
        .collect();
    order.sort_by_key(|(depth, _)| *depth);

    let mut slots: Vec<DateTime<Utc>> = vec![config.start_at; config.slot_count.max(1)];
    let mut anchors: HashMap<i64, DateTime<Utc>> = HashMap::new();

    for (job_no, (_, job)) in order.into_iter().enumerate() {
        if job.runs <= 0 {
            continue;
        }
        outcome.total_runs += job.runs;

        let per_run = job.per_run_seconds();
        let size = chunk_size(per_run, config);
        let mut local_anchor = config.start_at;
        let mut remaining = job.runs;

        while remaining > 0 {
            let ready = match job.task_id {
                Some(task_id) => dependency_ready(task_id, forest, &anchors),
                None => None,
            };
            let ready = ready.map_or(local_anchor, |r| r.max(local_anchor));

            let slot = earliest_slot(&slots);
            let start = slots[slot].max(ready);

            let mut runs = size.min(remaining);
            let fits = if start >= horizon_end {
                false
            } else if per_run > 0.0 {
                let left = (horizon_end - start).num_seconds();
                let fit = (left as f64 / per_run).floor() as i64;
                runs = runs.min(fit);
                fit >= 1
            } else {
                true
            };

            if !fits {
                let deferred = deferred_entry(&job, remaining, config, horizon_end);
                warn!(
                    task_id = ?job.task_id,
                    runs = remaining,
                    "scheduler deferred runs beyond horizon"
                );
                outcome.warnings.push(format!(
                    "scheduler: deferred {remaining} run(s) of job {} ({}) \
                     beyond the {}-day horizon",
                    job_no + 1,
                    job.activity,
                    config.window_days
                ));
                outcome.deferred_runs += remaining;
                outcome.deferred_jobs += 1;
                outcome.jobs.push(deferred);
                break;
            }

            let mut chunk = job.scaled(runs);
            let finish = Duration::try_seconds(chunk.duration_seconds)
                .and_then(|d| start.checked_add_signed(d))
                .unwrap_or(horizon_end);
            chunk.status = chunk_status(job.status, config.queue_status);
            chunk.started_at = Some(start);
            chunk.finished_at = (chunk.status != JobStatus::Active).then_some(finish);
            chunk.slot = Some(slot);
            debug!(slot, runs, %start, %finish, "scheduled chunk");

            slots[slot] = finish;
            local_anchor = local_anchor.max(finish);
            if let Some(task_id) = job.task_id {
                let anchor = anchors.entry(task_id).or_insert(finish);
                *anchor = (*anchor).max(finish);
            }

            outcome.scheduled_runs += runs;
            outcome.jobs.push(chunk);
            remaining -= runs;
        }
    }

    outcome
}

/// Lowest-index slot among those that free up first.
fn earliest_slot(slots: &[DateTime<Utc>]) -> usize {
    let mut best = 0;
    for (idx, at) in slots.iter().enumerate() {
        if *at < slots[best] {
            best = idx;
        }
    }
    best
}

/// Latest of the ancestors' planned ends and scheduled finishes, and of
/// the task's own scheduled finish.
fn dependency_ready(
    task_id: i64,
    forest: &TaskForest,
    anchors: &HashMap<i64, DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let mut ready = anchors.get(&task_id).copied();
    for ancestor in forest.ancestors(task_id) {
        let planned = forest.get(ancestor).and_then(|n| n.planned_end);
        for at in [planned, anchors.get(&ancestor).copied()].into_iter().flatten() {
            ready = Some(ready.map_or(at, |r| r.max(at)));
        }
    }
    ready
}

fn deferred_entry(
    job: &JobDraft,
    runs: i64,
    config: &SchedulerConfig,
    horizon_end: DateTime<Utc>,
) -> JobDraft {
    let mut entry = job.scaled(runs);
    entry.status = chunk_status(job.status, config.queue_status);
    entry.started_at = None;
    entry.finished_at = None;
    entry.slot = None;
    entry.deferred = true;
    entry.append_note(&format!(
        "scheduler: deferred {runs} run(s); does not fit the {}-day horizon ending {}",
        config.window_days,
        horizon_end.to_rfc3339()
    ));
    entry
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::forest::TaskNode;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn config(slots: usize, max_runs: i64, max_dur: i64, window_days: i64) -> SchedulerConfig {
        SchedulerConfig {
            slot_count: slots,
            max_job_runs: max_runs,
            max_job_duration_seconds: max_dur.min(window_days * 86_400),
            window_days,
            queue_status: JobStatus::Queued,
            start_at: t0(),
            horizon_end: t0() + Duration::days(window_days),
        }
    }

    fn job(task: Option<i64>, runs: i64, per_run: i64) -> JobDraft {
        let mut j = JobDraft::new(task, "manufacturing", runs);
        j.duration_seconds = runs * per_run;
        j.cost_isk = runs as f64 * 100.0;
        j
    }

    fn node(id: i64, parent: Option<i64>) -> TaskNode {
        TaskNode {
            id,
            parent_id: parent,
            planned_end: None,
        }
    }

    #[test]
    fn splits_by_run_cap() {
        let mut forest = TaskForest::new([node(1, None)]);
        let out = schedule_jobs(vec![job(Some(1), 25, 0)], &mut forest, &config(2, 6, 86_400, 30));
        assert_eq!(out.jobs.len(), 5);
        assert!(out.jobs.iter().all(|j| j.runs <= 6));
        assert_eq!(out.jobs.iter().map(|j| j.runs).sum::<i64>(), 25);
        assert_eq!(out.scheduled_runs, 25);
        assert_eq!(out.deferred_jobs, 0);
    }

    #[test]
    fn horizon_defers_the_remainder() {
        let mut forest = TaskForest::new([node(1, None)]);
        let out = schedule_jobs(
            vec![job(Some(1), 10, 12 * 3600)],
            &mut forest,
            &config(2, 200, 24 * 3600, 2),
        );
        let scheduled: Vec<_> = out.jobs.iter().filter(|j| !j.deferred).collect();
        let deferred: Vec<_> = out.jobs.iter().filter(|j| j.deferred).collect();
        assert_eq!(scheduled.len(), 2);
        assert!(scheduled.iter().all(|j| j.runs == 2));
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred[0].runs, 6);
        assert!(deferred[0].started_at.is_none() && deferred[0].finished_at.is_none());
        assert!(deferred[0].notes.contains("6 run(s)"));
        assert_eq!(out.scheduled_runs + out.deferred_runs, 10);
        let horizon = t0() + Duration::days(2);
        assert!(scheduled.iter().all(|j| j.finished_at.unwrap() <= horizon));
    }

    #[test]
    fn chunk_shrinks_to_fit_the_horizon() {
        let mut forest = TaskForest::new([]);
        // One slot, 1 day window. The first job holds the slot for 10h; the
        // second wants a 3-run chunk of 7h runs but only 2 fit in the 14h left.
        let jobs = vec![job(None, 1, 10 * 3600), job(None, 3, 7 * 3600)];
        let out = schedule_jobs(jobs, &mut forest, &config(1, 3, 86_400, 1));
        assert_eq!(out.jobs.len(), 3);
        assert_eq!(out.jobs[1].runs, 2);
        assert!(!out.jobs[1].deferred);
        assert_eq!(out.jobs[1].finished_at, Some(t0() + Duration::hours(24)));
        assert_eq!(out.jobs[2].runs, 1);
        assert!(out.jobs[2].deferred);
    }

    #[test]
    fn child_waits_for_parent() {
        let mut forest = TaskForest::new([node(1, None), node(2, Some(1))]);
        // Child listed first on purpose; depth ordering puts the parent first.
        let jobs = vec![job(Some(2), 1, 300), job(Some(1), 2, 600)];
        let out = schedule_jobs(jobs, &mut forest, &config(2, 200, 86_400, 30));
        let parent = out.jobs.iter().find(|j| j.task_id == Some(1)).unwrap();
        let child = out.jobs.iter().find(|j| j.task_id == Some(2)).unwrap();
        assert!(child.started_at.unwrap() >= parent.finished_at.unwrap());
    }

    #[test]
    fn parent_planned_end_is_an_anchor() {
        let mut parent = node(1, None);
        parent.planned_end = Some(t0() + Duration::hours(5));
        let mut forest = TaskForest::new([parent, node(2, Some(1))]);
        let out = schedule_jobs(vec![job(Some(2), 1, 60)], &mut forest, &config(1, 10, 86_400, 30));
        assert_eq!(out.jobs[0].started_at, Some(t0() + Duration::hours(5)));
    }

    #[test]
    fn no_overlap_within_a_slot() {
        let mut forest = TaskForest::new([node(1, None), node(2, None), node(3, None)]);
        let jobs = vec![job(Some(1), 9, 3600), job(Some(2), 7, 1800), job(Some(3), 4, 7200)];
        let out = schedule_jobs(jobs, &mut forest, &config(2, 3, 86_400, 30));
        for slot in 0..2 {
            let mut chunks: Vec<_> = out.jobs.iter().filter(|j| j.slot == Some(slot)).collect();
            chunks.sort_by_key(|j| j.started_at);
            for pair in chunks.windows(2) {
                assert!(pair[1].started_at.unwrap() >= pair[0].finished_at.unwrap());
            }
        }
    }

    #[test]
    fn committed_statuses_survive_and_active_has_no_finish() {
        let mut forest = TaskForest::new([]);
        let mut active = job(None, 1, 60);
        active.status = JobStatus::Active;
        let mut done = job(None, 1, 60);
        done.status = JobStatus::Completed;
        let paused = {
            let mut j = job(None, 1, 60);
            j.status = JobStatus::Paused;
            j
        };
        let out = schedule_jobs(
            vec![active, done, paused],
            &mut forest,
            &config(1, 10, 86_400, 30),
        );
        assert_eq!(out.jobs[0].status, JobStatus::Active);
        assert!(out.jobs[0].finished_at.is_none());
        assert_eq!(out.jobs[1].status, JobStatus::Completed);
        assert!(out.jobs[1].finished_at.is_some());
        assert_eq!(out.jobs[2].status, JobStatus::Queued);
    }

    #[test]
    fn cyclic_tasks_still_schedule() {
        let mut forest = TaskForest::new([node(1, Some(2)), node(2, Some(1))]);
        let out = schedule_jobs(
            vec![job(Some(1), 1, 60), job(Some(2), 1, 60)],
            &mut forest,
            &config(2, 10, 86_400, 30),
        );
        assert_eq!(out.scheduled_runs, 2);
    }

    #[test]
    fn earliest_slot_prefers_lowest_index() {
        let slots = [t0() + Duration::hours(1), t0(), t0()];
        assert_eq!(earliest_slot(&slots), 1);
    }
}
