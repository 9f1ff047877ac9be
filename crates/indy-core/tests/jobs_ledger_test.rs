//! Integration tests for job status updates, the ledger, stock
//! rebalancing and project lifecycle.

use std::collections::BTreeMap;

use indy_core::EngineError;
use indy_core::jobs::{JobStatusUpdate, update_job_status, update_job_statuses};
use indy_core::ledger::{LedgerQuery, get_ledger};
use indy_core::plan::{JobInput, MaterialInput, PlanPatch, TaskInput, apply_plan};
use indy_core::project::{
    CreateProject, create_project, get_project, list_projects, update_project_status,
};
use indy_core::snapshot::get_project_snapshot;
use indy_core::stock::{
    RebalanceStrategy, StockSnapshot, WarehouseScope, rebalance_materials_from_stock,
};
use indy_db::models::{Job, JobStatus, MaterialSource, Project, ProjectStatus, Strategy};
use indy_test_utils::{OTHER_USER, TEST_USER, TestDb};

async fn project_with_jobs(db: &TestDb, name: &str, costs: &[f64]) -> (Project, Vec<Job>) {
    let project = create_project(&db.pool, TEST_USER, &CreateProject::named(name))
        .await
        .unwrap();
    let patch = PlanPatch {
        jobs: costs
            .iter()
            .map(|&cost| JobInput {
                runs: 1,
                duration_seconds: Some(3600),
                cost_isk: Some(cost),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    apply_plan(&db.pool, TEST_USER, project.id, &patch).await.unwrap();
    let jobs = get_project_snapshot(&db.pool, TEST_USER, project.id)
        .await
        .unwrap()
        .jobs;
    (project, jobs)
}

#[tokio::test]
async fn project_lifecycle() {
    let db = TestDb::new().await;

    let input = CreateProject {
        name: "  Caracals  ".into(),
        strategy: Some(Strategy::Aggressive),
        ..Default::default()
    };
    let p = create_project(&db.pool, TEST_USER, &input).await.unwrap();
    assert_eq!(p.name, "Caracals");
    assert_eq!(p.status, ProjectStatus::Draft);
    assert_eq!(p.strategy, Strategy::Aggressive);

    let err = create_project(&db.pool, TEST_USER, &CreateProject::named("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let updated = update_project_status(&db.pool, TEST_USER, p.id, ProjectStatus::Active)
        .await
        .unwrap();
    assert_eq!(updated.status, ProjectStatus::Active);
    assert!(updated.updated_at >= p.updated_at);

    assert_eq!(list_projects(&db.pool, TEST_USER).await.unwrap().len(), 1);
    assert!(list_projects(&db.pool, OTHER_USER).await.unwrap().is_empty());

    let err = get_project(&db.pool, OTHER_USER, p.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "project", .. }));

    db.teardown().await;
}

#[tokio::test]
async fn status_update_stamps_timestamps() {
    let db = TestDb::new().await;
    let (_, jobs) = project_with_jobs(&db, "Stamps", &[10.0]).await;
    let id = jobs[0].id;

    let active =
        update_job_status(&db.pool, TEST_USER, id, &JobStatusUpdate::new(JobStatus::Active))
            .await
            .unwrap();
    assert_eq!(active.status, JobStatus::Active);
    assert!(active.started_at.is_some());
    assert!(active.finished_at.is_none());

    let mut done = JobStatusUpdate::new(JobStatus::Completed);
    done.notes = Some("delivered".into());
    let completed = update_job_status(&db.pool, TEST_USER, id, &done).await.unwrap();
    assert_eq!(completed.started_at, active.started_at);
    assert!(completed.finished_at.is_some());
    assert_eq!(completed.notes, "delivered");

    let reopened =
        update_job_status(&db.pool, TEST_USER, id, &JobStatusUpdate::new(JobStatus::Paused))
            .await
            .unwrap();
    assert!(reopened.finished_at.is_none());

    db.teardown().await;
}

#[tokio::test]
async fn bad_timestamps_are_rejected() {
    let db = TestDb::new().await;
    let (_, jobs) = project_with_jobs(&db, "Bad", &[10.0]).await;

    let mut update = JobStatusUpdate::new(JobStatus::Active);
    update.started_at = Some("yesterday".into());
    let err = update_job_status(&db.pool, TEST_USER, jobs[0].id, &update)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("RFC3339"), "got {err}");

    db.teardown().await;
}

#[tokio::test]
async fn bulk_update_is_all_or_nothing() {
    let db = TestDb::new().await;
    let (_, jobs) = project_with_jobs(&db, "Bulk", &[10.0, 20.0]).await;
    let (_, foreign) = {
        let p = create_project(&db.pool, OTHER_USER, &CreateProject::named("Theirs"))
            .await
            .unwrap();
        let patch = PlanPatch {
            jobs: vec![JobInput {
                runs: 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        apply_plan(&db.pool, OTHER_USER, p.id, &patch).await.unwrap();
        let jobs = get_project_snapshot(&db.pool, OTHER_USER, p.id).await.unwrap().jobs;
        (p, jobs)
    };

    let update = JobStatusUpdate::new(JobStatus::Cancelled);
    let ids = [jobs[0].id, jobs[1].id, foreign[0].id];
    let err = update_job_statuses(&db.pool, TEST_USER, &ids, &update)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::NotFound { entity: "job", id } if id == foreign[0].id),
        "got {err:?}"
    );

    let snap = get_project_snapshot(&db.pool, TEST_USER, jobs[0].project_id)
        .await
        .unwrap();
    assert!(snap.jobs.iter().all(|j| j.status == JobStatus::Planned));

    let updated = update_job_statuses(&db.pool, TEST_USER, &ids[..2], &update)
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert!(updated.iter().all(|j| j.status == JobStatus::Cancelled && j.finished_at.is_some()));

    db.teardown().await;
}

#[tokio::test]
async fn ledger_filters_and_totals() {
    let db = TestDb::new().await;
    let (first, jobs) = project_with_jobs(&db, "First", &[100.0, 200.0, 300.0]).await;
    project_with_jobs(&db, "Second", &[1000.0]).await;

    update_job_status(&db.pool, TEST_USER, jobs[0].id, &JobStatusUpdate::new(JobStatus::Active))
        .await
        .unwrap();

    let all = get_ledger(&db.pool, TEST_USER, &LedgerQuery::default()).await.unwrap();
    assert_eq!(all.total_jobs, 4);
    assert!((all.total_cost_isk - 1600.0).abs() < 1e-6);
    assert_eq!(all.entries.len(), 4);
    // Most recently updated first.
    assert_eq!(all.entries[0].id, jobs[0].id);
    assert_eq!(all.entries[0].project_name, "First");

    let scoped = LedgerQuery {
        project_id: Some(first.id),
        status: Some(JobStatus::Planned),
        limit: Some(1),
    };
    let page = get_ledger(&db.pool, TEST_USER, &scoped).await.unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.total_jobs, 2);
    assert!((page.total_cost_isk - 500.0).abs() < 1e-6);
    assert_eq!(page.totals.len(), 1);
    assert_eq!(page.totals[0].status, JobStatus::Planned);

    let theirs = get_ledger(&db.pool, OTHER_USER, &LedgerQuery::default()).await.unwrap();
    assert!(theirs.entries.is_empty());
    assert_eq!(theirs.total_jobs, 0);

    db.teardown().await;
}

#[tokio::test]
async fn rebalance_draws_preferred_location_first() {
    let db = TestDb::new().await;
    let p = create_project(&db.pool, TEST_USER, &CreateProject::named("Stock"))
        .await
        .unwrap();

    let patch = PlanPatch {
        tasks: vec![
            TaskInput {
                name: "jita".into(),
                constraints: serde_json::json!({"location_id": 60003760}),
                ..Default::default()
            },
            TaskInput {
                name: "amarr".into(),
                constraints: serde_json::json!({"location_id": 60008494}),
                ..Default::default()
            },
        ],
        materials: vec![
            MaterialInput {
                task_id: Some(-1),
                type_id: 34,
                required_qty: 100,
                ..Default::default()
            },
            MaterialInput {
                task_id: Some(-2),
                type_id: 34,
                required_qty: 100,
                build_qty: 50,
                buy_qty: 50,
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    apply_plan(&db.pool, TEST_USER, p.id, &patch).await.unwrap();

    let snapshot = StockSnapshot {
        totals: BTreeMap::from([(34, 150)]),
        by_location: BTreeMap::from([(34, BTreeMap::from([(60003760, 100), (60008494, 50)]))]),
    };

    let rows = rebalance_materials_from_stock(
        &db.pool,
        TEST_USER,
        p.id,
        &snapshot,
        WarehouseScope::StrictLocation,
        RebalanceStrategy::Preserve,
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);

    let snap = get_project_snapshot(&db.pool, TEST_USER, p.id).await.unwrap();
    let jita_task = snap.tasks.iter().find(|t| t.name == "jita").unwrap().id;
    let jita = snap.materials.iter().find(|m| m.task_id == Some(jita_task)).unwrap();
    let amarr = snap.materials.iter().find(|m| m.task_id != Some(jita_task)).unwrap();

    assert_eq!(jita.available_qty, 100);
    assert_eq!(jita.buy_qty + jita.build_qty, 0);
    assert_eq!(jita.source, MaterialSource::Stock);

    assert_eq!(amarr.available_qty, 50);
    assert_eq!(amarr.buy_qty, 25);
    assert_eq!(amarr.build_qty, 25);

    let err = rebalance_materials_from_stock(
        &db.pool,
        OTHER_USER,
        p.id,
        &snapshot,
        WarehouseScope::Global,
        RebalanceStrategy::Buy,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    db.teardown().await;
}
