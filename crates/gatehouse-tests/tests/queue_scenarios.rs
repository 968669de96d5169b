//! Schedule queue scenarios: trumping, cancellation and duplicate promotion.

use futures::future::join_all;
use gatehouse_core::ids::PipelineName;
use gatehouse_core::pipeline::PipelineConfig;
use gatehouse_tests::{BuildCauseFixture, PipelineFixture, TestContext};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn up() -> PipelineName {
    PipelineName::new("up")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_schedule_keeps_trumping_cause() {
    let ctx = Arc::new(TestContext::new(vec![PipelineFixture::simple("up")]));
    let forced = BuildCauseFixture::manual("r-forced", "alice");

    let mut handles = Vec::new();
    for i in 0..16 {
        let ctx = ctx.clone();
        let cause = if i == 7 {
            forced.clone()
        } else {
            BuildCauseFixture::auto(&format!("r{}", i))
        };
        handles.push(tokio::spawn(
            async move { ctx.queue.schedule(&up(), cause).await },
        ));
    }
    for installed in join_all(handles).await {
        installed.unwrap();
    }

    assert_eq!(ctx.queue.pending(&up()).await, Some(forced));
    assert!(ctx.queue.has_forced_build_cause(&up()).await);
}

#[tokio::test]
async fn test_cancelled_cause_never_becomes_most_recent() {
    let ctx = TestContext::new(vec![PipelineFixture::simple("up")]);

    ctx.queue.schedule(&up(), BuildCauseFixture::auto("r1")).await;
    ctx.queue.cancel_schedule(&up()).await;
    assert!(ctx.queue.most_recent_scheduled(&up()).await.unwrap().has_never_run());

    let created = ctx
        .schedule_and_create(&up(), BuildCauseFixture::auto("r2"))
        .await
        .unwrap()
        .unwrap();

    ctx.queue.schedule(&up(), BuildCauseFixture::auto("r3")).await;
    ctx.queue.cancel_schedule(&up()).await;
    assert!(ctx.queue.pending(&up()).await.is_none());
    assert_eq!(
        ctx.queue.most_recent_scheduled(&up()).await.unwrap(),
        created.build_cause
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_creation_persists_one_run() {
    let ctx = Arc::new(TestContext::new(vec![PipelineFixture::simple("up")]));
    let cause = BuildCauseFixture::auto("r1");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = ctx.clone();
            let cause = cause.clone();
            tokio::spawn(async move { ctx.create(&up(), cause).await })
        })
        .collect();

    let created = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(Option::is_some)
        .count();

    assert_eq!(created, 1);
    assert_eq!(ctx.store.instances(&up()).len(), 1);
}

#[tokio::test]
async fn test_forced_cause_is_never_cancelled_as_duplicate() {
    let ctx = TestContext::new(vec![PipelineFixture::simple("up")]);

    ctx.create(&up(), BuildCauseFixture::auto("r1")).await.unwrap().unwrap();
    let rerun = ctx
        .create(&up(), BuildCauseFixture::manual("r1", "alice"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(rerun.counter, 2);
    assert_eq!(rerun.stages[0].approved_by.as_deref(), Some("alice"));
    assert_eq!(ctx.store.instances(&up()).len(), 2);
}

#[tokio::test]
async fn test_duplicate_automatic_cause_is_dropped() {
    let ctx = TestContext::new(vec![PipelineFixture::simple("up")]);

    ctx.create(&up(), BuildCauseFixture::auto("r1")).await.unwrap().unwrap();
    let again = ctx
        .schedule_and_create(&up(), BuildCauseFixture::timer("r1"))
        .await
        .unwrap();

    assert!(again.is_none());
    assert!(ctx.queue.pending(&up()).await.is_none());
    assert_eq!(ctx.store.instances(&up()).len(), 1);
}

#[tokio::test]
async fn test_cause_goes_stale_when_material_is_removed() {
    let ctx = TestContext::new(vec![PipelineFixture::simple("up")]);
    let cause = BuildCauseFixture::auto("r1");
    ctx.queue.schedule(&up(), cause.clone()).await;

    let reconfigured = PipelineConfig {
        materials: vec!["git:https://example.com/other.git".to_string()],
        ..PipelineFixture::simple("up")
    };
    ctx.config.update_pipeline(reconfigured).await.unwrap();

    assert!(ctx.create(&up(), cause).await.unwrap().is_none());
    assert!(ctx.queue.pending(&up()).await.is_none());
    assert!(ctx.store.instances(&up()).is_empty());
}

#[tokio::test]
async fn test_cause_from_unknown_material_is_stale() {
    let ctx = TestContext::new(vec![PipelineFixture::simple("up")]);

    let created = ctx
        .schedule_and_create(&up(), BuildCauseFixture::from_removed_material("r1"))
        .await
        .unwrap();

    assert!(created.is_none());
    assert!(ctx.queue.to_be_scheduled().await.is_empty());
}

#[tokio::test]
async fn test_counters_increase_per_pipeline() {
    let ctx = TestContext::new(vec![
        PipelineFixture::simple("up"),
        PipelineFixture::simple("down"),
    ]);
    let down = PipelineName::new("down");

    for revision in ["r1", "r2", "r3"] {
        ctx.create(&up(), BuildCauseFixture::auto(revision)).await.unwrap();
    }
    let first_down = ctx
        .create(&down, BuildCauseFixture::auto("r1"))
        .await
        .unwrap()
        .unwrap();

    let counters: Vec<u64> = ctx.store.instances(&up()).iter().map(|r| r.counter).collect();
    assert_eq!(counters, vec![1, 2, 3]);
    assert_eq!(first_down.counter, 1);
}
