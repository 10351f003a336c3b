//! Example: wiring the coordinator for a bulk-write run.
//!
//! Run with: cargo run --example coordinator

use std::sync::Arc;
use std::time::Duration;

use chat_migrate::classify::RuleClassifier;
use chat_migrate::config::{CommandProfile, TierOverrides};
use chat_migrate::error::MigrateError;
use chat_migrate::executor::BackoffExecutor;
use chat_migrate::rate_limit::{RateLimiterRegistry, ServiceTier};
use chat_migrate::sequencer::{AttachmentRef, Sequencer, UploadPhases, UploadSlot};

struct FakeUploader;

impl UploadPhases for FakeUploader {
    async fn allocate(&self, attachment: &AttachmentRef) -> Result<UploadSlot, MigrateError> {
        println!("allocate {}", attachment.name);
        Ok(UploadSlot {
            upload_target: format!("https://upload.example/{}", attachment.id),
            handle: format!("pending-{}", attachment.id),
        })
    }

    async fn transfer(
        &self,
        attachment: &AttachmentRef,
        slot: &UploadSlot,
    ) -> Result<(), MigrateError> {
        println!("transfer {} -> {}", attachment.name, slot.upload_target);
        Ok(())
    }

    async fn finalize(
        &self,
        attachment: &AttachmentRef,
        _slot: &UploadSlot,
    ) -> Result<String, MigrateError> {
        println!("finalize {}", attachment.name);
        Ok(format!("att-{}", attachment.id))
    }
}

#[tokio::main]
async fn main() -> chat_migrate::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_migrate=debug".into()),
        )
        .init();

    // A bulk-write profile with a slightly loosened upload tier.
    let profile = CommandProfile::bulk_write().override_tier(
        ServiceTier::DestFileUpload,
        TierOverrides {
            capacity: Some(5),
            ..Default::default()
        },
    );

    let registry = Arc::new(RateLimiterRegistry::new());
    profile.apply(&registry).await;

    let executor = BackoffExecutor::new(
        Arc::clone(&registry),
        Arc::new(RuleClassifier::standard()),
    );
    let governor = profile.governor();
    let sequencer = Sequencer::new(executor.clone());

    // One channel's worth of work under one concurrency slot.
    governor
        .with_slot(|| async {
            // Thread root for the first message, reply for the second.
            let root = sequencer
                .resolve_thread(
                    "channel-7:1700000000.000100",
                    || async { Ok("spaces/AAA/messages/1".to_string()) },
                    |root| async move { Ok(format!("reply-under-{root}")) },
                )
                .await?;
            println!("posted root {}", root.message_id);

            let reply = sequencer
                .resolve_thread(
                    "channel-7:1700000000.000100",
                    || async { unreachable!("root already mapped") },
                    |root| async move { Ok(format!("reply-under-{root}")) },
                )
                .await?;
            println!("posted reply {}", reply.message_id);

            // Two attachments, phases strictly in order.
            let sessions = sequencer
                .upload_attachments(
                    &[
                        AttachmentRef::new("F1", "notes.pdf"),
                        AttachmentRef::new("F2", "diagram.png"),
                    ],
                    &FakeUploader,
                )
                .await?;
            for session in &sessions {
                println!(
                    "uploaded {} as {}",
                    session.attachment.name,
                    session.remote_handle.as_deref().unwrap_or("?")
                );
            }
            Ok(())
        })
        .await?;

    let status = registry.status(ServiceTier::DestMessagePost).await;
    println!(
        "message-post tier: {:.1}/{} tokens left",
        status.available, status.capacity
    );

    // Let the debug logs flush before exiting.
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}
