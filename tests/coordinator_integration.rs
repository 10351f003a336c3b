use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_migrate::classify::RuleClassifier;
use chat_migrate::config::{CommandProfile, TierOverrides};
use chat_migrate::error::{ApiError, MigrateError};
use chat_migrate::executor::BackoffExecutor;
use chat_migrate::rate_limit::{RateLimitConfig, RateLimiterRegistry, RetryPolicy, ServiceTier};
use chat_migrate::sequencer::{AttachmentRef, Sequencer, UploadPhase, UploadPhases, UploadSlot};

fn build_executor(registry: Arc<RateLimiterRegistry>) -> BackoffExecutor {
    BackoffExecutor::new(registry, Arc::new(RuleClassifier::standard()))
}

async fn fast_registry() -> Arc<RateLimiterRegistry> {
    // Generous buckets and millisecond backoff so tests never sit idle.
    let registry = Arc::new(RateLimiterRegistry::new());
    let retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10));
    for tier in ServiceTier::ALL {
        registry
            .configure(tier, RateLimitConfig::new(1000, 100.0).with_retry(retry))
            .await;
    }
    registry
}

#[tokio::test]
async fn test_racing_thread_roots_record_one_id() {
    let sequencer = Arc::new(Sequencer::new(build_executor(fast_registry().await)));
    let root_posts = Arc::new(AtomicU32::new(0));

    let race = |root_id: &'static str| {
        let sequencer = Arc::clone(&sequencer);
        let root_posts = Arc::clone(&root_posts);
        async move {
            sequencer
                .resolve_thread(
                    "src-thread-42",
                    || {
                        let root_posts = Arc::clone(&root_posts);
                        async move {
                            root_posts.fetch_add(1, Ordering::SeqCst);
                            // Hold the root post open so the other racer
                            // also misses the mapping.
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok(root_id.to_string())
                        }
                    },
                    |root| async move { Ok(format!("reply-under-{root}")) },
                )
                .await
        }
    };

    let (a, b) = tokio::join!(race("dest-A"), race("dest-B"));
    let (a, b) = (a.unwrap(), b.unwrap());

    // Both racers posted a root (the duplicate on the destination is a known
    // gap), but exactly one id won the mapping.
    assert_eq!(root_posts.load(Ordering::SeqCst), 2);
    assert_eq!(a.root_id, b.root_id);
    assert_eq!(sequencer.threads().len().await, 1);

    // Every later message for that key replies to the recorded winner.
    let follow_up = sequencer
        .resolve_thread(
            "src-thread-42",
            || async { panic!("root already resolved") },
            |root| async move { Ok(format!("reply-under-{root}")) },
        )
        .await
        .unwrap();
    assert!(!follow_up.posted_root);
    assert_eq!(follow_up.root_id, a.root_id);
    assert_eq!(follow_up.message_id, format!("reply-under-{}", a.root_id));
}

struct CallLogPhases {
    log: Arc<Mutex<Vec<String>>>,
}

impl CallLogPhases {
    fn record(&self, phase: &str, attachment: &AttachmentRef) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{phase}:{}", attachment.id));
    }
}

impl UploadPhases for CallLogPhases {
    async fn allocate(&self, attachment: &AttachmentRef) -> Result<UploadSlot, MigrateError> {
        self.record("allocate", attachment);
        Ok(UploadSlot {
            upload_target: format!("https://upload.example/{}", attachment.id),
            handle: format!("pending-{}", attachment.id),
        })
    }

    async fn transfer(
        &self,
        attachment: &AttachmentRef,
        _slot: &UploadSlot,
    ) -> Result<(), MigrateError> {
        self.record("transfer", attachment);
        Ok(())
    }

    async fn finalize(
        &self,
        attachment: &AttachmentRef,
        _slot: &UploadSlot,
    ) -> Result<String, MigrateError> {
        self.record("finalize", attachment);
        Ok(format!("att-{}", attachment.id))
    }
}

#[tokio::test]
async fn test_upload_phases_stay_in_order_per_message() {
    let sequencer = Sequencer::new(build_executor(fast_registry().await));
    let log = Arc::new(Mutex::new(Vec::new()));
    let phases = CallLogPhases {
        log: Arc::clone(&log),
    };

    let attachments = vec![
        AttachmentRef::new("F1", "notes.pdf"),
        AttachmentRef::new("F2", "diagram.png"),
    ];
    let sessions = sequencer
        .upload_attachments(&attachments, &phases)
        .await
        .unwrap();

    // Finalize of attachment 1 completes before Allocate of attachment 2.
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "allocate:F1",
            "transfer:F1",
            "finalize:F1",
            "allocate:F2",
            "transfer:F2",
            "finalize:F2",
        ]
    );

    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.phase == UploadPhase::Finalized));
    assert_eq!(sessions[0].remote_handle.as_deref(), Some("att-F1"));
}

#[tokio::test]
async fn test_upload_failure_stops_the_sequence() {
    struct FailingTransfer {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl UploadPhases for FailingTransfer {
        async fn allocate(&self, attachment: &AttachmentRef) -> Result<UploadSlot, MigrateError> {
            self.log.lock().unwrap().push(format!("allocate:{}", attachment.id));
            Ok(UploadSlot {
                upload_target: "https://upload.example/x".into(),
                handle: "pending-x".into(),
            })
        }

        async fn transfer(
            &self,
            _attachment: &AttachmentRef,
            _slot: &UploadSlot,
        ) -> Result<(), MigrateError> {
            Err(MigrateError::Api(ApiError::http(400, "checksum mismatch")))
        }

        async fn finalize(
            &self,
            _attachment: &AttachmentRef,
            _slot: &UploadSlot,
        ) -> Result<String, MigrateError> {
            panic!("finalize must not run after a failed transfer");
        }
    }

    let sequencer = Sequencer::new(build_executor(fast_registry().await));
    let log = Arc::new(Mutex::new(Vec::new()));
    let phases = FailingTransfer {
        log: Arc::clone(&log),
    };

    let attachments = vec![
        AttachmentRef::new("F1", "notes.pdf"),
        AttachmentRef::new("F2", "diagram.png"),
    ];
    let error = sequencer
        .upload_attachments(&attachments, &phases)
        .await
        .unwrap_err();

    assert!(matches!(error, MigrateError::WorkFailed { .. }));
    // The second attachment was never allocated.
    assert_eq!(*log.lock().unwrap(), vec!["allocate:F1"]);
}

#[tokio::test]
async fn test_governor_composes_with_token_bucket() {
    // Two slots, and a bucket that starts with a single token: a worker may
    // hold its slot while waiting on a token.
    let registry = Arc::new(RateLimiterRegistry::new());
    let retry = RetryPolicy::new(5, Duration::from_millis(5), Duration::from_millis(40));
    registry
        .configure(
            ServiceTier::DestMessagePost,
            RateLimitConfig::new(1, 50.0).with_retry(retry),
        )
        .await;

    let executor = build_executor(Arc::clone(&registry));
    let governor = chat_migrate::ConcurrencyGovernor::new(2);
    let completed = Arc::new(AtomicU32::new(0));

    let workers = (0..4).map(|_| {
        let executor = executor.clone();
        let governor = governor.clone();
        let completed = Arc::clone(&completed);
        async move {
            governor
                .with_slot(|| async {
                    executor
                        .run(ServiceTier::DestMessagePost, || async {
                            Ok::<_, MigrateError>(())
                        })
                        .await
                })
                .await
                .unwrap();
            completed.fetch_add(1, Ordering::SeqCst);
        }
    });
    futures_util::future::join_all(workers).await;

    assert_eq!(completed.load(Ordering::SeqCst), 4);
    assert_eq!(governor.available_slots(), 2);
}

#[tokio::test]
async fn test_run_continues_past_item_failures() {
    // The driver contract: a terminal failure on one work item does not
    // abort its siblings; only auth failures halt the run.
    let executor = build_executor(fast_registry().await);

    let mut migrated = 0u32;
    let mut failures = Vec::new();

    for message in 0..5u32 {
        let result = executor
            .run(ServiceTier::DestMessagePost, || async move {
                if message == 2 {
                    Err(MigrateError::Api(ApiError::http(404, "member left")))
                } else {
                    Ok(message)
                }
            })
            .await;

        match result {
            Ok(_) => migrated += 1,
            Err(error) => {
                assert!(!error.is_auth(), "auth failures abort the run");
                failures.push(error);
            }
        }
    }

    assert_eq!(migrated, 4);
    assert_eq!(failures.len(), 1);
    match &failures[0] {
        MigrateError::WorkFailed { tier, attempts, .. } => {
            assert_eq!(*tier, ServiceTier::DestMessagePost);
            assert_eq!(*attempts, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_profile_overrides_reach_the_executor() {
    // A profile's per-tier retry override drives the executor's attempt
    // count end to end.
    let registry = Arc::new(RateLimiterRegistry::new());
    let profile = CommandProfile::bulk_write().override_tier(
        ServiceTier::DestFileUpload,
        TierOverrides {
            capacity: Some(100),
            refill_rate: Some(1000.0),
            max_retries: Some(1),
            base_delay_ms: Some(1),
            max_delay_ms: Some(2),
        },
    );
    profile.apply(&registry).await;

    let executor = build_executor(registry);
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = executor
        .run(ServiceTier::DestFileUpload, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MigrateError::Api(ApiError::http(503, "Service Unavailable"))) }
        })
        .await;

    // max_retries = 1: initial attempt plus one retry.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(matches!(
        result.unwrap_err(),
        MigrateError::WorkFailed { attempts: 2, .. }
    ));
}
