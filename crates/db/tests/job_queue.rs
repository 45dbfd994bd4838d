//! Integration tests for the Postgres job queue.

use assert_matches::assert_matches;
use serde_json::json;
use sqlx::PgPool;
use pumpflix_db::models::job::{EnqueueJob, FailOutcome};
use pumpflix_db::repositories::JobRepo;

fn job(max_attempts: i32) -> EnqueueJob {
    EnqueueJob {
        job_type: "usage.check".into(),
        organization_id: None,
        payload: json!({}),
        max_attempts: Some(max_attempts),
        run_after: None,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_claim_is_exclusive(pool: PgPool) {
    let queued = JobRepo::enqueue(&pool, &job(3)).await.unwrap();

    let first = JobRepo::claim_next(&pool, "worker-a").await.unwrap().unwrap();
    assert_eq!(first.id, queued.id);
    assert_eq!(first.status, "running");
    assert_eq!(first.attempts, 1);
    assert_eq!(first.locked_by.as_deref(), Some("worker-a"));

    assert!(JobRepo::claim_next(&pool, "worker-b").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_concurrent_claims_never_share_a_job(pool: PgPool) {
    for _ in 0..10 {
        JobRepo::enqueue(&pool, &job(3)).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(j) = JobRepo::claim_next(&pool, &format!("w{i}")).await.unwrap() {
                ids.push(j.id);
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    all.sort();
    let before = all.len();
    all.dedup();
    assert_eq!(before, 10);
    assert_eq!(all.len(), 10);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_failure_requeues_with_backoff_then_exhausts(pool: PgPool) {
    JobRepo::enqueue(&pool, &job(2)).await.unwrap();

    let attempt1 = JobRepo::claim_next(&pool, "w").await.unwrap().unwrap();
    let outcome = JobRepo::fail(&pool, &attempt1, "boom").await.unwrap();
    assert_matches!(outcome, FailOutcome::Retrying { .. });

    let requeued = JobRepo::find_by_id(&pool, attempt1.id).await.unwrap().unwrap();
    assert_eq!(requeued.status, "pending");
    assert_eq!(requeued.last_error.as_deref(), Some("boom"));
    assert!(requeued.run_after > attempt1.run_after);

    // Not claimable until the backoff elapses.
    assert!(JobRepo::claim_next(&pool, "w").await.unwrap().is_none());
    sqlx::query("UPDATE jobs SET run_after = NOW() WHERE id = $1")
        .bind(attempt1.id)
        .execute(&pool)
        .await
        .unwrap();

    let attempt2 = JobRepo::claim_next(&pool, "w").await.unwrap().unwrap();
    assert_eq!(attempt2.attempts, 2);
    let outcome = JobRepo::fail(&pool, &attempt2, "boom again").await.unwrap();
    assert_eq!(outcome, FailOutcome::Exhausted);

    let failed = JobRepo::find_by_id(&pool, attempt1.id).await.unwrap().unwrap();
    assert_eq!(failed.status, "failed");
    assert!(failed.completed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_stale_running_jobs_are_requeued(pool: PgPool) {
    JobRepo::enqueue(&pool, &job(3)).await.unwrap();
    let claimed = JobRepo::claim_next(&pool, "dead-worker").await.unwrap().unwrap();
    sqlx::query("UPDATE jobs SET locked_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(claimed.id)
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(JobRepo::requeue_stale(&pool, 600).await.unwrap(), 1);
    let again = JobRepo::claim_next(&pool, "live-worker").await.unwrap().unwrap();
    assert_eq!(again.id, claimed.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_stale_job_without_attempts_left_fails(pool: PgPool) {
    JobRepo::enqueue(&pool, &job(1)).await.unwrap();
    let claimed = JobRepo::claim_next(&pool, "dead-worker").await.unwrap().unwrap();
    sqlx::query("UPDATE jobs SET locked_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(claimed.id)
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(JobRepo::requeue_stale(&pool, 600).await.unwrap(), 0);
    let exhausted = JobRepo::fail_stale_exhausted(&pool, 600).await.unwrap();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].id, claimed.id);
    assert_eq!(exhausted[0].status, "failed");
    assert!(exhausted[0].completed_at.is_some());

    assert!(JobRepo::claim_next(&pool, "live-worker").await.unwrap().is_none());
    assert!(JobRepo::fail_stale_exhausted(&pool, 600).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_purge_finished_keeps_recent_and_open_jobs(pool: PgPool) {
    let old = JobRepo::enqueue(&pool, &job(3)).await.unwrap();
    let recent = JobRepo::enqueue(&pool, &job(3)).await.unwrap();
    let pending = JobRepo::enqueue(&pool, &job(3)).await.unwrap();
    JobRepo::complete(&pool, old.id).await.unwrap();
    JobRepo::fail_permanently(&pool, recent.id, "bad payload").await.unwrap();
    sqlx::query("UPDATE jobs SET completed_at = NOW() - INTERVAL '30 days' WHERE id = $1")
        .bind(old.id)
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(JobRepo::purge_finished(&pool, 7).await.unwrap(), 1);
    assert!(JobRepo::find_by_id(&pool, old.id).await.unwrap().is_none());
    assert!(JobRepo::find_by_id(&pool, recent.id).await.unwrap().is_some());
    assert_matches!(
        JobRepo::find_by_id(&pool, pending.id).await.unwrap(),
        Some(j) if j.status == "pending"
    );
}
