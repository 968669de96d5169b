//! Pipeline lock scenarios: commit visibility, holders, release and reconciliation.

use futures::future::join_all;
use gatehouse_core::clock::ManualClock;
use gatehouse_core::ids::{PipelineIdentifier, PipelineName};
use gatehouse_core::pipeline::PipelineConfigs;
use gatehouse_core::ports::PipelineStore;
use gatehouse_core::run::{PipelineInstance, SchedulingContext, StageState};
use gatehouse_core::Error;
use gatehouse_scheduler::LockStatusChange;
use gatehouse_tests::{BuildCauseFixture, PipelineFixture, TestContext};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn up() -> PipelineName {
    PipelineName::new("up")
}

async fn first_run(ctx: &TestContext) -> PipelineInstance {
    ctx.create(&up(), BuildCauseFixture::auto("r1"))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_lock_is_visible_only_after_commit() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    let config = ctx.pipeline_config(&up()).await.unwrap();
    let instance = PipelineInstance::instantiate(
        &config,
        BuildCauseFixture::auto("r1"),
        &SchedulingContext::new("changes"),
        "digest",
        &ManualClock::default(),
    )
    .unwrap();

    let mut uow = ctx.store.begin().await.unwrap();
    let saved = uow.store().save_pipeline(instance).await.unwrap();
    ctx.locks.lock_if_needed(&mut uow, &saved).await.unwrap();

    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert_eq!(ctx.lock_events.count(), 0);

    uow.commit().await.unwrap();

    let holder = ctx.locks.locked_pipeline(&up()).await.unwrap().unwrap();
    assert_eq!(holder, saved.identifier().stage("build", 1));
    assert_eq!(ctx.lock_events.changes(), vec![LockStatusChange::Locked(holder)]);
}

#[tokio::test]
async fn test_rolled_back_lock_never_notifies() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    let config = ctx.pipeline_config(&up()).await.unwrap();
    let instance = PipelineInstance::instantiate(
        &config,
        BuildCauseFixture::auto("r1"),
        &SchedulingContext::new("changes"),
        "digest",
        &ManualClock::default(),
    )
    .unwrap();

    let mut uow = ctx.store.begin().await.unwrap();
    let saved = uow.store().save_pipeline(instance).await.unwrap();
    ctx.locks.lock_if_needed(&mut uow, &saved).await.unwrap();
    uow.rollback().await.unwrap();

    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert_eq!(ctx.lock_events.count(), 0);
    assert!(ctx.store.instances(&up()).is_empty());
}

#[tokio::test]
async fn test_failed_creation_leaves_pipeline_unlocked() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    ctx.store.fail_next_save("disk I/O error");

    let err = ctx
        .schedule_and_create(&up(), BuildCauseFixture::auto("r1"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Database(_)));
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert_eq!(ctx.lock_events.count(), 0);
    assert!(ctx.queue.pending(&up()).await.is_some());
}

#[tokio::test]
async fn test_only_the_holding_run_may_schedule_stages() {
    let ctx = TestContext::new(vec![
        PipelineFixture::lockable("up"),
        PipelineFixture::simple("free"),
    ]);
    let run = first_run(&ctx).await;

    assert!(
        ctx.locks
            .can_schedule_stage_in_pipeline(&run.identifier())
            .await
            .unwrap()
    );
    assert!(
        !ctx.locks
            .can_schedule_stage_in_pipeline(&PipelineIdentifier::new("up", 2))
            .await
            .unwrap()
    );
    assert!(
        ctx.locks
            .can_schedule_stage_in_pipeline(&PipelineIdentifier::new("free", 7))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_second_run_cannot_take_a_held_lock() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    first_run(&ctx).await;

    let err = ctx
        .create(&up(), BuildCauseFixture::manual("r2", "alice"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PipelineLocked { .. }));
    assert_eq!(ctx.store.instances(&up()).len(), 1);
}

#[tokio::test]
async fn test_lock_released_when_last_stage_passes() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    let run = first_run(&ctx).await;
    let id = run.identifier();

    let run = ctx.store.update_stage(&id, "build", StageState::Passed).unwrap();
    assert!(!ctx.locks.unlock_if_necessary(&run, "build").await.unwrap());
    assert!(ctx.locks.is_locked(&up()).await.unwrap());

    let run = ctx.store.update_stage(&id, "test", StageState::Passed).unwrap();
    assert!(ctx.locks.unlock_if_necessary(&run, "test").await.unwrap());
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert_eq!(ctx.lock_events.count(), 2);
    assert_eq!(
        ctx.lock_events.changes().last(),
        Some(&LockStatusChange::Unlocked(up()))
    );
}

#[tokio::test]
async fn test_failed_stage_keeps_lock_until_unlocked() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    let run = first_run(&ctx).await;

    let run = ctx
        .store
        .update_stage(&run.identifier(), "build", StageState::Failed)
        .unwrap();
    assert!(!ctx.locks.unlock_if_necessary(&run, "build").await.unwrap());
    assert!(ctx.locks.is_locked(&up()).await.unwrap());

    ctx.locks.unlock(&up()).await.unwrap();
    ctx.locks.unlock(&up()).await.unwrap();
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert_eq!(ctx.lock_events.count(), 2);
}

#[tokio::test]
async fn test_lock_released_when_last_stage_fails() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    let run = first_run(&ctx).await;
    let id = run.identifier();

    ctx.store.update_stage(&id, "build", StageState::Passed).unwrap();
    let run = ctx.store.update_stage(&id, "test", StageState::Failed).unwrap();

    assert!(ctx.locks.unlock_if_necessary(&run, "test").await.unwrap());
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert_eq!(
        ctx.lock_events.changes().last(),
        Some(&LockStatusChange::Unlocked(up()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unlocks_notify_once() {
    let ctx = Arc::new(TestContext::new(vec![PipelineFixture::lockable("up")]));
    first_run(&ctx).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.locks.unlock(&up()).await })
        })
        .collect();
    for unlocked in join_all(handles).await {
        unlocked.unwrap().unwrap();
    }

    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    let unlocks = ctx
        .lock_events
        .changes()
        .into_iter()
        .filter(|c| matches!(c, LockStatusChange::Unlocked(_)))
        .count();
    assert_eq!(unlocks, 1);
}

#[tokio::test]
async fn test_unlock_when_finished_releases_on_failure() {
    let ctx = TestContext::new(vec![PipelineFixture::unlock_when_finished("up")]);
    let run = first_run(&ctx).await;

    let run = ctx
        .store
        .update_stage(&run.identifier(), "build", StageState::Failed)
        .unwrap();

    assert!(ctx.locks.unlock_if_necessary(&run, "build").await.unwrap());
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
}

#[tokio::test]
async fn test_unlock_when_finished_releases_before_manual_stage() {
    let ctx = TestContext::new(vec![PipelineFixture::with_manual_deploy("up")]);
    let run = first_run(&ctx).await;
    let id = run.identifier();

    let run = ctx.store.update_stage(&id, "build", StageState::Passed).unwrap();
    assert!(!ctx.locks.unlock_if_necessary(&run, "build").await.unwrap());

    let run = ctx.store.update_stage(&id, "test", StageState::Passed).unwrap();
    assert!(ctx.locks.unlock_if_necessary(&run, "test").await.unwrap());
}

#[tokio::test]
async fn test_stage_of_another_run_does_not_release_lock() {
    let ctx = TestContext::new(vec![PipelineFixture::unlock_when_finished("up")]);
    first_run(&ctx).await;
    ctx.locks.unlock(&up()).await.unwrap();
    let second = ctx
        .create(&up(), BuildCauseFixture::manual("r2", "alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.counter, 2);

    let old = ctx
        .store
        .update_stage(&PipelineIdentifier::new("up", 1), "build", StageState::Failed)
        .unwrap();
    assert!(!ctx.locks.unlock_if_necessary(&old, "build").await.unwrap());
    assert!(ctx.locks.is_locked(&up()).await.unwrap());
}

#[tokio::test]
async fn test_reconciliation_unlocks_pipeline_that_is_no_longer_lockable() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    first_run(&ctx).await;

    ctx.config
        .replace(PipelineConfigs::new(vec![PipelineFixture::simple("up")]))
        .await
        .unwrap();
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());

    ctx.config
        .replace(PipelineConfigs::new(vec![PipelineFixture::simple("up")]))
        .await
        .unwrap();

    let unlocks = ctx
        .lock_events
        .changes()
        .into_iter()
        .filter(|c| matches!(c, LockStatusChange::Unlocked(_)))
        .count();
    assert_eq!(unlocks, 1);
}

#[tokio::test]
async fn test_reconciliation_unlocks_removed_pipeline() {
    let ctx = TestContext::new(vec![
        PipelineFixture::lockable("up"),
        PipelineFixture::lockable("down"),
    ]);
    let down = PipelineName::new("down");
    first_run(&ctx).await;
    ctx.create(&down, BuildCauseFixture::auto("r1"))
        .await
        .unwrap()
        .unwrap();

    ctx.config.remove_pipeline(&up()).await.unwrap();

    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
    assert!(ctx.locks.is_locked(&down).await.unwrap());
    assert_eq!(
        ctx.lock_events.changes().last(),
        Some(&LockStatusChange::Unlocked(up()))
    );
}

#[tokio::test]
async fn test_single_pipeline_update_reconciles_its_lock() {
    let ctx = TestContext::new(vec![PipelineFixture::lockable("up")]);
    first_run(&ctx).await;

    ctx.config
        .update_pipeline(PipelineFixture::unlock_when_finished("up"))
        .await
        .unwrap();
    assert!(ctx.locks.is_locked(&up()).await.unwrap());

    ctx.config
        .update_pipeline(PipelineFixture::simple("up"))
        .await
        .unwrap();
    assert!(!ctx.locks.is_locked(&up()).await.unwrap());
}
