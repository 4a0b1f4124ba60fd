//! Worker loop behaviour over a real job store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use accel_media::decode_image;
use accel_models::{Category, JobParams, JobStage, Kernel, Operation, Progress};
use accel_queue::RetentionConfig;
use accel_worker::{HandlerRegistry, ImageHandler, JobExecutor, WorkerConfig};

use common::{jpeg, submit, submit_gray_image, test_config, CountingAccelerator, Counters, FakeCodec, Harness};

fn assert_near(actual: [u8; 3], expected: [u8; 3]) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!(
            (*a as i32 - *e as i32).abs() <= 4,
            "pixel {:?} not within tolerance of {:?}",
            actual,
            expected
        );
    }
}

#[tokio::test]
async fn test_image_grayscale_job_finishes() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let job = submit_gray_image(&h.store).await;

    assert!(h.executor.run_once().await.unwrap());

    let status = h.executor.queue().status();
    assert!(status.is_terminal(&job).await);
    let record = status.read_status(&job).await;
    assert_eq!(record.stage, JobStage::Finished);
    assert_eq!(record.progress, Some(Progress::new(1, 1)));
    assert_eq!(record.percent(), 100);
    assert!(record.note.unwrap().ends_with(" ms"));

    let (name, data) = h.store.read_output(&job).await.unwrap().unwrap();
    assert_eq!(name, "out.jpg");
    let out = decode_image(&data).unwrap();
    assert_eq!((out.width(), out.height()), (16, 16));
    assert_near(out.pixel(8, 8), [76, 76, 76]);

    let timing = h.store.read_timing(&job).await.unwrap();
    assert_eq!(timing.frames, 1);
    assert!(h.store.has_thumbnail(&job).await);
    assert_eq!(h.counters.frames(), 1);
}

#[tokio::test]
async fn test_identity_filter_preserves_image() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let color = [40, 160, 90];
    let job = submit(
        &h.store,
        Category::Image,
        Operation::Filter,
        &JobParams::filter(Kernel::IDENTITY, 1),
        &jpeg(color),
    )
    .await;

    h.drain().await;

    let input = decode_image(&jpeg(color)).unwrap();
    let (_, data) = h.store.read_output(&job).await.unwrap().unwrap();
    let out = decode_image(&data).unwrap();
    assert_near(out.pixel(3, 3), input.pixel(3, 3));
}

#[tokio::test]
async fn test_jobs_run_in_fifo_order() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let first = submit_gray_image(&h.store).await;
    let second = submit_gray_image(&h.store).await;
    let third = submit_gray_image(&h.store).await;
    let status = h.executor.queue().status();

    assert!(h.executor.run_once().await.unwrap());
    assert!(status.is_terminal(&first).await);
    assert!(!status.is_terminal(&second).await);
    assert!(!status.is_terminal(&third).await);

    assert!(h.executor.run_once().await.unwrap());
    assert!(status.is_terminal(&second).await);
    assert!(!status.is_terminal(&third).await);

    assert!(h.executor.run_once().await.unwrap());
    assert!(!h.executor.run_once().await.unwrap());
}

#[tokio::test]
async fn test_failing_job_does_not_stop_the_loop() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let broken = submit(
        &h.store,
        Category::Image,
        Operation::Grayscale,
        &JobParams::grayscale(),
        b"definitely not an image",
    )
    .await;
    let good = submit_gray_image(&h.store).await;

    assert_eq!(h.drain().await, 2);

    let status = h.executor.queue().status();
    let failed = status.read_status(&broken).await;
    assert_eq!(failed.stage, JobStage::Error);
    assert!(failed.note.unwrap().starts_with("Media error"));
    assert!(status.error_message(&broken).await.is_some());
    assert!(h.store.read_output(&broken).await.unwrap().is_none());

    assert_eq!(status.read_status(&good).await.stage, JobStage::Finished);
}

#[tokio::test]
async fn test_job_whose_failure_cannot_be_recorded_is_skipped() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let stuck = submit_gray_image(&h.store).await;
    let next = submit_gray_image(&h.store).await;

    // a directory where the status record belongs makes every status write fail
    tokio::fs::create_dir(stuck.path("status.json")).await.unwrap();

    assert!(h.executor.run_once().await.unwrap());
    assert!(h.executor.run_once().await.unwrap());
    assert!(!h.executor.run_once().await.unwrap());

    let status = h.executor.queue().status();
    assert_eq!(status.read_status(&next).await.stage, JobStage::Finished);
    assert!(!status.is_terminal(&stuck).await);
    assert_eq!(h.counters.frames(), 1);
}

#[tokio::test]
async fn test_unknown_operation_marker_fails_job() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let staged = h.store.create(Category::Image).await.unwrap();
    h.store.store_input(&staged, "in.jpg", &jpeg([1, 2, 3])).await.unwrap();
    h.store
        .set_parameter(&staged, accel_models::PARAM_OPERATION, "sharpen")
        .await
        .unwrap();
    let job = h.store.commit(staged).await.unwrap();

    h.drain().await;

    let record = h.executor.queue().status().read_status(&job).await;
    assert_eq!(record.stage, JobStage::Error);
    assert!(record.note.unwrap().starts_with("Invalid job"));
    assert_eq!(h.counters.loads(), 0);
}

#[tokio::test]
async fn test_unregistered_combination_never_touches_accelerator() {
    let handlers = HandlerRegistry::empty().register(Category::Image, Operation::Grayscale, Arc::new(ImageHandler));
    let h = Harness::with_handlers(test_config(), handlers).await;

    let job = submit(
        &h.store,
        Category::Image,
        Operation::Filter,
        &JobParams::filter(Kernel::IDENTITY, 1),
        &jpeg([9, 9, 9]),
    )
    .await;

    h.drain().await;

    let record = h.executor.queue().status().read_status(&job).await;
    assert_eq!(record.stage, JobStage::Error);
    assert!(record.note.unwrap().contains("image/filter"));
    assert_eq!(h.counters.loads(), 0);
    assert_eq!(h.counters.frames(), 0);
}

#[tokio::test]
async fn test_recovered_job_is_processed() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let job = submit_gray_image(&h.store).await;
    let status = h.executor.queue().status();
    status.write_status(&job, JobStage::Receiving, None, None).await.unwrap();
    status.write_status(&job, JobStage::Processing, None, None).await.unwrap();

    let report = h.executor.recover().await.unwrap();
    assert_eq!(report.reset, vec![job.id().clone()]);
    assert_eq!(status.read_status(&job).await.stage, JobStage::Queued);

    assert!(h.executor.run_once().await.unwrap());
    assert_eq!(status.read_status(&job).await.stage, JobStage::Finished);
}

#[tokio::test]
async fn test_profile_reloaded_only_when_operation_changes() {
    let h = Harness::new(test_config(), FakeCodec::new(1, 8, 8)).await;
    let filter = JobParams::filter(Kernel([1, 1, 1, 1, 1, 1, 1, 1, 1]), 9);

    submit_gray_image(&h.store).await;
    submit_gray_image(&h.store).await;
    submit_gray_image(&h.store).await;
    submit(&h.store, Category::Image, Operation::Filter, &filter, &jpeg([50, 50, 50])).await;
    submit(&h.store, Category::Image, Operation::Filter, &filter, &jpeg([50, 50, 50])).await;
    submit_gray_image(&h.store).await;

    assert_eq!(h.drain().await, 6);
    assert_eq!(h.counters.loads(), 3);
    assert_eq!(h.executor.profile_loads().await, 3);
    assert_eq!(h.counters.frames(), 6);
}

#[tokio::test]
async fn test_retention_keeps_newest_terminal_jobs() {
    let config = WorkerConfig {
        retention: RetentionConfig {
            image_limit: 2,
            video_limit: 1,
        },
        ..test_config()
    };
    let h = Harness::new(config, FakeCodec::new(1, 8, 8)).await;

    let mut jobs = Vec::new();
    for _ in 0..4 {
        jobs.push(submit_gray_image(&h.store).await);
    }
    h.drain().await;

    assert!(!h.store.exists(jobs[0].id()).await);
    assert!(!h.store.exists(jobs[1].id()).await);
    assert!(h.store.exists(jobs[2].id()).await);
    assert!(h.store.exists(jobs[3].id()).await);
}

#[tokio::test]
async fn test_retention_ignores_pending_jobs() {
    let config = WorkerConfig {
        retention: RetentionConfig {
            image_limit: 1,
            video_limit: 1,
        },
        ..test_config()
    };
    let h = Harness::new(config, FakeCodec::new(1, 8, 8)).await;

    let first = submit_gray_image(&h.store).await;
    let second = submit_gray_image(&h.store).await;
    let third = submit_gray_image(&h.store).await;

    assert!(h.executor.run_once().await.unwrap());
    assert!(h.executor.run_once().await.unwrap());

    assert!(!h.store.exists(first.id()).await);
    assert!(h.store.exists(second.id()).await);
    assert!(h.store.exists(third.id()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_loop_picks_up_new_jobs_and_stops() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = accel_storage::JobStore::new(accel_storage::StoreConfig::new(dir.path()));
    let counters = Counters::default();
    let executor = Arc::new(JobExecutor::new(
        test_config(),
        store.clone(),
        Box::new(CountingAccelerator::new(counters.clone())),
        HandlerRegistry::standard(Arc::new(FakeCodec::new(1, 8, 8))),
    ));

    let runner = Arc::clone(&executor);
    let task = tokio::spawn(async move { runner.run().await });

    // jobs arriving while the loop is idle
    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = submit_gray_image(&store).await;

    let status = executor.queue().status().clone();
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        while !status.is_terminal(&job).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "job was not processed");
    assert_eq!(status.read_status(&job).await.stage, JobStage::Finished);

    executor.shutdown();
    let stopped = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert!(stopped.unwrap().unwrap().is_ok());
    assert_eq!(counters.frames(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_at_most_one_job_in_flight() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = accel_storage::JobStore::new(accel_storage::StoreConfig::new(dir.path()));
    store.init().await.unwrap();

    let mut jobs = Vec::new();
    for i in 0..6 {
        let job = if i % 2 == 0 {
            submit_gray_image(&store).await
        } else {
            submit(&store, Category::Video, Operation::Grayscale, &JobParams::grayscale(), b"video").await
        };
        jobs.push(job);
    }

    let executor = Arc::new(JobExecutor::new(
        test_config(),
        store.clone(),
        Box::new(CountingAccelerator::new(Counters::default())),
        HandlerRegistry::standard(Arc::new(FakeCodec::new(40, 64, 36))),
    ));
    let runner = Arc::clone(&executor);
    let task = tokio::spawn(async move { runner.run().await });

    let observer = accel_queue::JobQueue::new(store.clone());
    let mut most_in_flight = 0;
    let drained = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let entries = observer.snapshot().await.unwrap();
            let in_flight = entries.iter().filter(|e| e.status.stage.is_in_flight()).count();
            most_in_flight = most_in_flight.max(in_flight);
            if entries.iter().all(|e| e.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;

    executor.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;

    assert!(drained.is_ok(), "queue was not drained");
    assert!(most_in_flight <= 1, "saw {} jobs in flight at once", most_in_flight);
    for job in &jobs {
        assert_eq!(observer.status().read_status(job).await.stage, JobStage::Finished);
    }
}
