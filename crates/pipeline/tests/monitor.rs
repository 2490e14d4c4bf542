mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use folio_core::progress::{JobOutcome, ProgressStatus};
use folio_core::report::ReportStatus;
use folio_core::types::JobId;
use folio_pipeline::config::MonitorConfig;
use folio_pipeline::memory::{MemoryProgressStore, MemoryReportStore};
use folio_pipeline::monitor::{MonitorEvent, ObservedJob, ProgressMonitor};
use folio_pipeline::store::{ProgressStore, ReportStore};
use tokio::time::Instant;

use common::{drain, next_matching, record, report};

struct Fixture {
    progress: Arc<MemoryProgressStore>,
    reports: Arc<MemoryReportStore>,
    monitor: ProgressMonitor,
}

fn fixture(config: MonitorConfig) -> Fixture {
    let progress = Arc::new(MemoryProgressStore::new());
    let reports = Arc::new(MemoryReportStore::new());
    let monitor = ProgressMonitor::new(progress.clone(), reports.clone(), config);
    Fixture {
        progress,
        reports,
        monitor,
    }
}

fn job(id: &str) -> ObservedJob {
    ObservedJob {
        job_id: JobId::from(id),
        report_id: None,
    }
}

fn finished_count(events: &[MonitorEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, MonitorEvent::Finished(_)))
        .count()
}

fn is_update(event: &MonitorEvent) -> bool {
    matches!(event, MonitorEvent::Update(_))
}

#[tokio::test(start_paused = true)]
async fn completes_once_when_terminal_signals_race() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J1");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J1"));
    next_matching(&mut session, is_update).await;

    report(&f.progress, &id, ProgressStatus::Generating, 100).await;
    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    report(&f.progress, &id, ProgressStatus::Error, 100).await;
    report(&f.progress, &id, ProgressStatus::Completed, 100).await;

    let events = drain(&mut session).await;
    assert_eq!(finished_count(&events), 1);
    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Succeeded)));
}

#[tokio::test(start_paused = true)]
async fn writes_seed_when_no_record_exists() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J-seedless");

    let mut session = f.monitor.observe(job("J-seedless"));
    let first = session.next_event().await.unwrap();

    let MonitorEvent::Update(state) = first else {
        panic!("expected an update, got {first:?}");
    };
    assert_eq!(state.status, ProgressStatus::Generating);
    assert_eq!(state.progress, 5);
    assert_eq!(f.progress.records(&id).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn old_generating_record_goes_stale_immediately() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J-old");
    let created = f.reports.create(3, "Survey").await;
    f.reports
        .set_status(created.id, ReportStatus::Processing, Some(&id))
        .await
        .unwrap();
    f.progress
        .append_at(
            record(&id, ProgressStatus::Generating, 40),
            Utc::now() - chrono::Duration::minutes(20),
        )
        .await;

    let started = Instant::now();
    let mut session = f.monitor.observe(ObservedJob {
        job_id: id.clone(),
        report_id: Some(created.id),
    });
    let events = drain(&mut session).await;

    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Stale)));
    assert_eq!(finished_count(&events), 1);
    assert!(started.elapsed() < Duration::from_secs(1));

    let stored = f.reports.find(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Archived);
    assert_eq!(stored.active_job, None);
}

#[tokio::test(start_paused = true)]
async fn progress_reaching_one_hundred_completes_without_explicit_status() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J1");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J1"));
    next_matching(&mut session, is_update).await;
    report(&f.progress, &id, ProgressStatus::Generating, 60).await;
    report(&f.progress, &id, ProgressStatus::Generating, 100).await;

    let events = drain(&mut session).await;
    let progress: Vec<i16> = events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Update(state) => Some(state.progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![60, 100]);
    assert_eq!(finished_count(&events), 1);
    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Succeeded)));
}

#[tokio::test(start_paused = true)]
async fn silent_job_goes_stale_after_window() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J2");
    let created = f.reports.create(3, "Survey").await;
    f.reports
        .set_status(created.id, ReportStatus::Processing, Some(&id))
        .await
        .unwrap();
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let started = Instant::now();
    let mut session = f.monitor.observe(ObservedJob {
        job_id: id,
        report_id: Some(created.id),
    });
    let events = drain(&mut session).await;

    assert!(started.elapsed() >= Duration::from_secs(15 * 60 - 1));
    assert!(started.elapsed() < Duration::from_secs(16 * 60));
    assert!(events.contains(&MonitorEvent::TakingLonger));
    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Stale)));
    assert!(!events.contains(&MonitorEvent::Finished(JobOutcome::Succeeded)));

    let stored = f.reports.find(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Archived);
}

#[tokio::test(start_paused = true)]
async fn stale_job_leaves_report_of_newer_job_alone() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J-old");
    let created = f.reports.create(3, "Survey").await;
    f.reports
        .set_status(created.id, ReportStatus::Processing, Some(&JobId::from("J-new")))
        .await
        .unwrap();
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(ObservedJob {
        job_id: id,
        report_id: Some(created.id),
    });
    let events = drain(&mut session).await;

    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Stale)));
    let stored = f.reports.find(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn new_records_push_the_stale_deadline_back() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J3");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J3"));
    next_matching(&mut session, is_update).await;

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    report(&f.progress, &id, ProgressStatus::Generating, 50).await;
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    report(&f.progress, &id, ProgressStatus::Completed, 100).await;

    let events = drain(&mut session).await;
    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Succeeded)));
}

#[tokio::test(start_paused = true)]
async fn display_progress_never_regresses() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J4");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J4"));
    next_matching(&mut session, is_update).await;
    report(&f.progress, &id, ProgressStatus::Generating, 70).await;
    report(&f.progress, &id, ProgressStatus::Generating, 30).await;
    report(&f.progress, &id, ProgressStatus::Completed, 100).await;

    let events = drain(&mut session).await;
    let mut last = 0;
    for event in &events {
        if let MonitorEvent::Update(state) = event {
            assert!(state.progress >= last, "progress regressed in {events:?}");
            last = state.progress;
        }
    }
    assert_eq!(last, 100);
}

#[tokio::test(start_paused = true)]
async fn worker_error_is_a_failed_outcome() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J5");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J5"));
    next_matching(&mut session, is_update).await;
    f.progress
        .append(folio_core::progress::NewProgressRecord {
            job_id: id,
            status: ProgressStatus::Error,
            message: "Unsupported file type".into(),
            progress: 20,
        })
        .await
        .unwrap();

    let finished = next_matching(&mut session, |e| matches!(e, MonitorEvent::Finished(_))).await;
    assert_eq!(
        finished,
        MonitorEvent::Finished(JobOutcome::Failed {
            message: "Unsupported file type".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn already_finished_job_completes_on_first_read() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J6");
    report(&f.progress, &id, ProgressStatus::Completed, 100).await;

    let mut session = f.monitor.observe(job("J6"));
    let events = drain(&mut session).await;
    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Succeeded)));
    assert_eq!(f.progress.records(&id).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_twice_is_harmless() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J7");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J7"));
    next_matching(&mut session, is_update).await;

    session.unsubscribe();
    session.unsubscribe();
    assert!(session.is_unsubscribed());

    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    assert_eq!(session.next_event().await, None);
    assert_eq!(session.next_event().await, None);
}

#[tokio::test(start_paused = true)]
async fn polling_finds_completion_without_push() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J8");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;
    f.progress.set_push_enabled(false);

    let mut session = f.monitor.observe(job("J8"));
    next_matching(&mut session, is_update).await;

    let started = Instant::now();
    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    let finished = next_matching(&mut session, |e| matches!(e, MonitorEvent::Finished(_))).await;

    assert_eq!(finished, MonitorEvent::Finished(JobOutcome::Succeeded));
    assert!(started.elapsed() <= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn dropped_feed_is_resubscribed() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J9");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut session = f.monitor.observe(job("J9"));
    next_matching(&mut session, is_update).await;
    assert_eq!(f.progress.subscribe_calls(), 1);

    f.progress.disconnect_feeds();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(f.progress.subscribe_calls(), 2);

    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    let finished = next_matching(&mut session, |e| matches!(e, MonitorEvent::Finished(_))).await;
    assert_eq!(finished, MonitorEvent::Finished(JobOutcome::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn gives_up_resubscribing_but_keeps_polling() {
    let f = fixture(MonitorConfig {
        max_poll_attempts: 1_000,
        ..Default::default()
    });
    let id = JobId::from("J10");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;
    f.progress.fail_next_subscribes(u32::MAX);

    let mut session = f.monitor.observe(job("J10"));
    let lost = next_matching(&mut session, |e| *e == MonitorEvent::SubscriptionLost).await;
    assert_eq!(lost, MonitorEvent::SubscriptionLost);
    assert_eq!(f.progress.subscribe_calls(), 6);

    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    let events = drain(&mut session).await;
    assert_eq!(finished_count(&events), 1);
    assert_matches!(
        events.last(),
        Some(MonitorEvent::Finished(JobOutcome::Succeeded))
    );
}

#[tokio::test(start_paused = true)]
async fn slow_job_is_reported_once_and_still_finishes() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J11");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let started = Instant::now();
    let mut session = f.monitor.observe(job("J11"));
    next_matching(&mut session, |e| *e == MonitorEvent::TakingLonger).await;
    assert!(started.elapsed() >= Duration::from_secs(60));

    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    let events = drain(&mut session).await;
    assert!(!events.contains(&MonitorEvent::TakingLonger));
    assert_eq!(events.last(), Some(&MonitorEvent::Finished(JobOutcome::Succeeded)));
}

#[tokio::test(start_paused = true)]
async fn sessions_on_the_same_job_latch_independently() {
    let f = fixture(MonitorConfig::default());
    let id = JobId::from("J12");
    report(&f.progress, &id, ProgressStatus::Generating, 5).await;

    let mut first = f.monitor.observe(job("J12"));
    let mut second = f.monitor.observe(job("J12"));
    next_matching(&mut first, is_update).await;
    next_matching(&mut second, is_update).await;

    report(&f.progress, &id, ProgressStatus::Completed, 100).await;
    assert_eq!(finished_count(&drain(&mut first).await), 1);
    assert_eq!(finished_count(&drain(&mut second).await), 1);
}
