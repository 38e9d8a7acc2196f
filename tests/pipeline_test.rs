//! End-to-end pipeline behaviour against in-memory backends and scripted
//! collaborators.

mod fixtures;
mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use fixtures::*;
use helpers::*;
use video_pipeline::config::PipelineConfig;
use video_pipeline::error::PipelineError;
use video_pipeline::ledger::Ledger;
use video_pipeline::models::job::{JobStatus, ProcessingJob, Stage};
use video_pipeline::models::moderation::{ReviewDecision, Severity};
use video_pipeline::models::variant::{QualityProfile, VariantStatus};
use video_pipeline::models::video::{VideoAsset, VideoStatus};
use video_pipeline::pipeline::handlers::moderation::CLASSIFIER_UNAVAILABLE;
use video_pipeline::pipeline::runner::{self, Outcome};
use video_pipeline::pipeline::coordinator::Regeneration;
use video_pipeline::pipeline::{coordinator, gates, status, PipelineContext, PipelineJob};
use video_pipeline::services::contracts::AccessProjection;
use video_pipeline::services::encoder::master_playlist_key;
use video_pipeline::services::queue::JobQueue;

async fn ingest(pipeline: &TestPipeline, fixture: &VideoFixture) -> VideoAsset {
    let video = fixture.seed(pipeline.ledger.as_ref()).await;
    let created = coordinator::enqueue_ingest(
        &pipeline.ctx,
        video.id,
        fixture.media_ref,
        fixture.language_hint,
    )
    .await
    .unwrap();
    assert!(created);
    video
}

async fn video(pipeline: &TestPipeline, id: Uuid) -> VideoAsset {
    pipeline.ledger.get_video(id).await.unwrap().unwrap()
}

async fn job_status(pipeline: &TestPipeline, id: Uuid, stage: Stage) -> JobStatus {
    pipeline.ledger.get_job(id, stage).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_clean_video_is_published() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    let published = video(&p, v.id).await;
    assert_eq!(published.status, VideoStatus::Published);
    assert_eq!(job_status(&p, v.id, Stage::MalwareScan).await, JobStatus::Skipped);
    for stage in [
        Stage::Transcription,
        Stage::ThumbnailGeneration,
        Stage::ContentModeration,
        Stage::SearchIndexing,
        Stage::AiHighlights,
    ] {
        assert_eq!(job_status(&p, v.id, stage).await, JobStatus::Completed, "{stage}");
    }

    assert_eq!(
        published.thumbnail_path.as_deref(),
        Some(format!("videos/{}/thumbnail.png", v.id).as_str())
    );
    assert_eq!(published.master_playlist_path, Some(master_playlist_key(v.id)));
    assert_eq!(published.duration_ms, Some(14_500));
    assert_eq!(published.tags, ["cooking", "pasta", "dinner"]);
    assert_eq!(published.description.as_deref(), Some("A short cooking lesson"));

    // Title, description and three transcript segments.
    assert_eq!(p.classifier.analyzed.lock().len(), 5);

    let docs = p.search.documents_for(v.id);
    assert_eq!(docs.len(), 3);
    assert!(docs.iter().all(|d| d.access == AccessProjection::Unrestricted));

    assert!(p.ledger.get_highlights(v.id).await.unwrap().is_some());
    assert!(p.ledger.get_summary(v.id).await.unwrap().is_some());
    assert!(p.queue.pending().is_empty());
}

#[tokio::test]
async fn test_ingest_creates_one_variant_per_profile() {
    let config = PipelineConfig {
        quality_profiles: ["240p", "480p", "720p", "1440p"]
            .iter()
            .filter_map(|name| QualityProfile::from_name(name))
            .collect(),
        ..test_config()
    };
    let p = TestPipeline::with_config(config);
    let v = ingest(&p, &COOKING_VIDEO).await;

    let variants = p.ledger.list_variants(v.id).await.unwrap();
    assert_eq!(variants.len(), 4);
    assert!(variants.iter().all(|v| v.status == VariantStatus::Pending));

    let encoding_jobs: Vec<Uuid> = p
        .queue
        .pending()
        .into_iter()
        .filter_map(|job| match job {
            PipelineJob::Encoding { variant_id, .. } => Some(variant_id),
            _ => None,
        })
        .collect();
    assert_eq!(encoding_jobs.len(), 4);
    for variant in &variants {
        assert!(encoding_jobs.contains(&variant.id));
    }
}

#[tokio::test]
async fn test_duplicate_ingest_runs_each_stage_once() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;

    let again = coordinator::enqueue_ingest(&p.ctx, v.id, COOKING_VIDEO.media_ref, None)
        .await
        .unwrap();
    assert!(!again);
    assert_eq!(p.ledger.list_variants(v.id).await.unwrap().len(), 3);

    p.drain().await;

    assert_eq!(p.transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.encoder.encoded.lock().len(), 3);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);

    // Once everything is terminal a late duplicate enqueues nothing.
    coordinator::enqueue_ingest(&p.ctx, v.id, COOKING_VIDEO.media_ref, None)
        .await
        .unwrap();
    assert!(p.queue.pending().is_empty());
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_interrupted_ingest_is_finished_by_redelivery() {
    let p = TestPipeline::new();
    let v = COOKING_VIDEO.seed(p.ledger.as_ref()).await;
    let flaky = PipelineContext {
        queue: Arc::new(FlakyQueue::new(p.queue.clone(), 1)),
        ..p.ctx.clone()
    };

    let first = coordinator::enqueue_ingest(&flaky, v.id, COOKING_VIDEO.media_ref, None).await;
    assert!(matches!(first, Err(PipelineError::Queue(_))));
    assert_eq!(job_status(&p, v.id, Stage::Transcription).await, JobStatus::Pending);

    let redelivered = coordinator::enqueue_ingest(&flaky, v.id, COOKING_VIDEO.media_ref, None)
        .await
        .unwrap();
    assert!(!redelivered);

    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    assert_eq!(job_status(&p, v.id, Stage::Transcription).await, JobStatus::Completed);
    assert_eq!(p.ledger.list_variants(v.id).await.unwrap().len(), 3);
    assert!(p.store.text(&master_playlist_key(v.id)).is_some());
}

#[tokio::test]
async fn test_ingest_redelivery_creates_missing_variants() {
    let p = TestPipeline::new();
    let v = COOKING_VIDEO.seed(p.ledger.as_ref()).await;
    let jobs: Vec<ProcessingJob> = Stage::ALL
        .iter()
        .map(|&stage| match stage {
            Stage::MalwareScan => ProcessingJob::new(v.id, stage, JobStatus::Skipped),
            _ => ProcessingJob::new(v.id, stage, JobStatus::Pending),
        })
        .collect();
    assert!(p.ledger.create_jobs(&jobs).await.unwrap());

    coordinator::enqueue_ingest(&p.ctx, v.id, COOKING_VIDEO.media_ref, None)
        .await
        .unwrap();

    let profiles: Vec<String> = p
        .ledger
        .list_variants(v.id)
        .await
        .unwrap()
        .into_iter()
        .map(|variant| variant.quality_profile)
        .collect();
    assert_eq!(profiles, ["360p", "720p", "1080p"]);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Queued);

    p.drain().await;
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_ingest_of_unknown_video_is_not_found() {
    let p = TestPipeline::new();
    let err = coordinator::enqueue_ingest(&p.ctx, Uuid::new_v4(), "uploads/x.mp4", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

#[tokio::test]
async fn test_failed_variant_is_left_out_of_master_playlist() {
    let p = TestPipeline::new();
    p.encoder.fail_profile("720p");
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    let variants = p.ledger.list_variants(v.id).await.unwrap();
    let failed: Vec<_> = variants
        .iter()
        .filter(|v| v.status == VariantStatus::Failed)
        .map(|v| v.quality_profile.as_str())
        .collect();
    assert_eq!(failed, ["720p"]);

    // Fired once, when the last sibling turned terminal.
    assert_eq!(*p.encoder.manifests.lock(), vec![vec!["1080p", "360p"]]);

    let manifest = p.store.text(&master_playlist_key(v.id)).unwrap();
    assert!(!manifest.contains("720p"));
    let hi = manifest.find("NAME=\"1080p\"").unwrap();
    let lo = manifest.find("NAME=\"360p\"").unwrap();
    assert!(hi < lo);

    // A failed rendition is not a failed video.
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_encoding_job_for_foreign_variant_leaves_it_untouched() {
    let p = TestPipeline::new();
    let a = ingest(&p, &COOKING_VIDEO).await;
    let b = ingest(&p, &SILENT_VIDEO).await;
    let foreign = p.ledger.list_variants(b.id).await.unwrap()[0].clone();

    let err = dispatch_encoding(&p, a.id, foreign.id).await;
    assert!(matches!(err, PipelineError::Validation(_)));

    let untouched = p.ledger.get_variant(foreign.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, VariantStatus::Pending);

    p.drain().await;
    assert!(p.store.text(&master_playlist_key(b.id)).is_some());
}

async fn dispatch_encoding(p: &TestPipeline, video_id: Uuid, variant_id: Uuid) -> PipelineError {
    video_pipeline::pipeline::dispatch(
        &p.ctx,
        &PipelineJob::Encoding {
            video_id,
            variant_id,
        },
    )
    .await
    .unwrap_err()
}

#[tokio::test]
async fn test_no_master_playlist_when_every_variant_fails() {
    let p = TestPipeline::new();
    for profile in ["360p", "720p", "1080p"] {
        p.encoder.fail_profile(profile);
    }
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    assert!(p.encoder.manifests.lock().is_empty());
    assert!(video(&p, v.id).await.master_playlist_path.is_none());
}

#[tokio::test]
async fn test_master_playlist_gate_is_idempotent() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;
    p.drain().await;
    let first = p.store.text(&master_playlist_key(v.id)).unwrap();

    for _ in 0..3 {
        gates::master_playlist_gate(&p.ctx, v.id).await.unwrap();
    }

    let manifests = p.encoder.manifests.lock().clone();
    assert_eq!(manifests.len(), 4);
    assert!(manifests.iter().all(|m| m == &manifests[0]));
    assert_eq!(p.store.text(&master_playlist_key(v.id)).unwrap(), first);
    assert_eq!(video(&p, v.id).await.master_playlist_path, Some(master_playlist_key(v.id)));
}

#[tokio::test]
async fn test_master_playlist_claim_makes_generation_once_only() {
    let p = TestPipeline::with_config(PipelineConfig {
        master_playlist_claim: true,
        ..test_config()
    });
    let v = ingest(&p, &COOKING_VIDEO).await;
    p.drain().await;

    for _ in 0..3 {
        gates::master_playlist_gate(&p.ctx, v.id).await.unwrap();
    }

    assert_eq!(p.encoder.manifests.lock().len(), 1);
}

#[tokio::test]
async fn test_manifest_does_not_depend_on_completion_order() {
    async fn manifest_with_order(reverse: bool) -> String {
        let p = TestPipeline::new();
        let v = ingest(&p, &COOKING_VIDEO).await;

        let mut deliveries = Vec::new();
        while let Some(delivery) = p.queue.dequeue().await.unwrap() {
            deliveries.push(delivery);
        }
        if reverse {
            deliveries.reverse();
        }
        for delivery in &deliveries {
            runner::process_delivery(&p.ctx, delivery).await.unwrap();
        }
        p.drain().await;

        p.store.text(&master_playlist_key(v.id)).unwrap()
    }

    assert_eq!(manifest_with_order(false).await, manifest_with_order(true).await);
}

#[tokio::test]
async fn test_flagged_title_quarantines_video() {
    let p = TestPipeline::new();
    let v = ingest(&p, &FLAGGED_TITLE_VIDEO).await;

    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Quarantined);
    assert_eq!(job_status(&p, v.id, Stage::ContentModeration).await, JobStatus::Completed);
    assert_eq!(job_status(&p, v.id, Stage::SearchIndexing).await, JobStatus::Skipped);

    let moderation = p.ledger.get_moderation(v.id).await.unwrap().unwrap();
    assert!(moderation.flagged);
    assert!(!moderation.uncertain);
    assert_eq!(moderation.severity, Severity::High);
    assert_eq!(moderation.reasons, ["violence"]);

    assert!(p.search.documents_for(v.id).is_empty());
    // Highlights are independent of moderation.
    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::Completed);
}

#[tokio::test]
async fn test_approval_releases_quarantine_exactly_once() {
    let p = TestPipeline::new();
    let v = ingest(&p, &FLAGGED_TITLE_VIDEO).await;
    p.drain().await;

    coordinator::review(&p.ctx, v.id, ReviewDecision::Approve, Some("historical context"))
        .await
        .unwrap();
    coordinator::review(&p.ctx, v.id, ReviewDecision::Approve, None)
        .await
        .unwrap();

    assert_eq!(
        p.queue.pending(),
        vec![PipelineJob::SearchIndexing { video_id: v.id }]
    );
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Indexing);

    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    assert_eq!(job_status(&p, v.id, Stage::SearchIndexing).await, JobStatus::Completed);
    assert_eq!(p.search.documents_for(v.id).len(), 3);

    let moderation = p.ledger.get_moderation(v.id).await.unwrap().unwrap();
    assert_eq!(moderation.reviewer_decision, Some(ReviewDecision::Approve));
    assert!(moderation.reviewed_at.is_some());

    // Approving a published video changes nothing.
    let batches = p.search.batches.load(Ordering::SeqCst);
    coordinator::review(&p.ctx, v.id, ReviewDecision::Approve, None)
        .await
        .unwrap();
    assert!(p.queue.pending().is_empty());
    p.drain().await;
    assert_eq!(p.search.batches.load(Ordering::SeqCst), batches);
}

#[tokio::test]
async fn test_concurrent_approvals_rearm_indexing_once() {
    let p = TestPipeline::new();
    let v = ingest(&p, &FLAGGED_TITLE_VIDEO).await;
    p.drain().await;

    let approvals = (0..5).map(|_| coordinator::review(&p.ctx, v.id, ReviewDecision::Approve, None));
    let results = futures::future::join_all(approvals).await;
    assert!(results.iter().all(|r| r.is_ok()));

    assert_eq!(
        p.queue.pending(),
        vec![PipelineJob::SearchIndexing { video_id: v.id }]
    );
}

#[tokio::test]
async fn test_rejection_keeps_video_out_of_search() {
    let p = TestPipeline::new();
    let v = ingest(&p, &FLAGGED_TITLE_VIDEO).await;
    p.drain().await;

    coordinator::review(&p.ctx, v.id, ReviewDecision::Reject, Some("incitement"))
        .await
        .unwrap();
    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Rejected);
    assert_eq!(job_status(&p, v.id, Stage::SearchIndexing).await, JobStatus::Skipped);
    assert!(p.search.documents_for(v.id).is_empty());
}

#[tokio::test]
async fn test_review_without_moderation_result_is_rejected() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;

    let err = tokio_test::assert_err!(
        coordinator::review(&p.ctx, v.id, ReviewDecision::Approve, None).await
    );
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_classifier_outage_fails_open_by_default() {
    let p = TestPipeline::new();
    p.classifier.unavailable.store(true, Ordering::SeqCst);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    let moderation = p.ledger.get_moderation(v.id).await.unwrap().unwrap();
    assert!(!moderation.flagged);
    assert_eq!(moderation.classifier_errors, 5);
}

#[tokio::test]
async fn test_classifier_outage_quarantines_when_failing_closed() {
    let p = TestPipeline::with_config(PipelineConfig {
        moderation_fail_open: false,
        ..test_config()
    });
    p.classifier.unavailable.store(true, Ordering::SeqCst);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Quarantined);
    let moderation = p.ledger.get_moderation(v.id).await.unwrap().unwrap();
    assert!(moderation.uncertain);
    assert_eq!(moderation.reasons, [CLASSIFIER_UNAVAILABLE]);
}

#[tokio::test]
async fn test_transcription_recovers_on_third_attempt() {
    let p = TestPipeline::new();
    p.transcriber.fail_next(2);
    let v = ingest(&p, &COOKING_VIDEO).await;

    let mut steps = 0;
    loop {
        p.queue.release_delayed();
        if !p.step().await {
            break;
        }
        steps += 1;
        assert!(steps < 100);
        assert_ne!(video(&p, v.id).await.status, VideoStatus::Failed);
    }

    let transcription = p.ledger.get_job(v.id, Stage::Transcription).await.unwrap().unwrap();
    assert_eq!(transcription.status, JobStatus::Completed);
    assert_eq!(transcription.attempts, 3);
    assert_eq!(p.transcriber.calls.load(Ordering::SeqCst), 3);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_transcription_exhaustion_fails_video() {
    let p = TestPipeline::new();
    p.transcriber.fail_next(3);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    let transcription = p.ledger.get_job(v.id, Stage::Transcription).await.unwrap().unwrap();
    assert_eq!(transcription.status, JobStatus::Failed);
    assert_eq!(transcription.attempts, 3);
    assert!(transcription.last_error.is_some());

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Failed);
    for stage in [Stage::ContentModeration, Stage::SearchIndexing, Stage::AiHighlights] {
        assert_eq!(job_status(&p, v.id, stage).await, JobStatus::Skipped, "{stage}");
    }
    assert!(p.classifier.analyzed.lock().is_empty());
    assert!(p.search.documents_for(v.id).is_empty());
}

#[tokio::test]
async fn test_empty_transcript_skips_highlights() {
    let p = TestPipeline::new();
    p.transcriber.set_segments(&[]);
    let v = ingest(&p, &SILENT_VIDEO).await;

    p.drain().await;

    assert_eq!(job_status(&p, v.id, Stage::Transcription).await, JobStatus::Completed);
    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::Skipped);
    assert_eq!(p.highlights.calls.load(Ordering::SeqCst), 0);

    // Moderation and indexing are unaffected.
    assert_eq!(job_status(&p, v.id, Stage::ContentModeration).await, JobStatus::Completed);
    assert_eq!(job_status(&p, v.id, Stage::SearchIndexing).await, JobStatus::Completed);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    assert_eq!(*p.classifier.analyzed.lock(), ["Timelapse of clouds"]);

    let outcome = coordinator::regenerate_ai(&p.ctx, v.id).await.unwrap();
    assert_eq!(outcome, Regeneration::EmptyTranscript);
    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::Skipped);
}

#[tokio::test]
async fn test_moderation_waits_for_both_prerequisites() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;

    // Stray deliveries ahead of their gates.
    p.queue
        .enqueue(&PipelineJob::ContentModeration { video_id: v.id })
        .await
        .unwrap();
    p.queue
        .enqueue(&PipelineJob::SearchIndexing { video_id: v.id })
        .await
        .unwrap();
    let mut deliveries = Vec::new();
    while let Some(delivery) = p.queue.dequeue().await.unwrap() {
        deliveries.push(delivery);
    }
    for delivery in deliveries.iter().rev().take(2) {
        runner::process_delivery(&p.ctx, delivery).await.unwrap();
    }

    assert_eq!(job_status(&p, v.id, Stage::ContentModeration).await, JobStatus::Pending);
    assert_eq!(job_status(&p, v.id, Stage::SearchIndexing).await, JobStatus::Pending);
    assert!(p.classifier.analyzed.lock().is_empty());

    for delivery in deliveries.iter().rev().skip(2) {
        runner::process_delivery(&p.ctx, delivery).await.unwrap();
    }
    p.drain().await;
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_gating_holds_under_any_delivery_order() {
    for rotation in 0..5 {
        let p = TestPipeline::new();
        let v = ingest(&p, &COOKING_VIDEO).await;

        loop {
            p.queue.release_delayed();
            let mut batch = Vec::new();
            while let Some(delivery) = p.queue.dequeue().await.unwrap() {
                batch.push(delivery);
            }
            if batch.is_empty() {
                break;
            }
            let shift = rotation % batch.len();
            batch.rotate_left(shift);

            for delivery in &batch {
                runner::process_delivery(&p.ctx, delivery).await.unwrap();

                let prerequisites_done = job_status(&p, v.id, Stage::Transcription)
                    .await
                    .is_terminal()
                    && job_status(&p, v.id, Stage::ThumbnailGeneration)
                        .await
                        .is_terminal();
                for stage in [Stage::ContentModeration, Stage::SearchIndexing] {
                    let status = job_status(&p, v.id, stage).await;
                    assert!(
                        status == JobStatus::Pending || prerequisites_done,
                        "{stage} is {status} before its prerequisites (rotation {rotation})"
                    );
                }
            }
        }

        assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    }
}

#[tokio::test]
async fn test_thumbnail_failure_does_not_block_moderation() {
    let p = TestPipeline::new();
    *p.encoder.frame.lock() = b"not an image".to_vec();
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    let thumbnail = p
        .ledger
        .get_job(v.id, Stage::ThumbnailGeneration)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(thumbnail.status, JobStatus::Failed);
    assert!(thumbnail.last_error.unwrap().contains("not an image"));
    assert!(video(&p, v.id).await.thumbnail_path.is_none());
    assert_eq!(job_status(&p, v.id, Stage::ContentModeration).await, JobStatus::Completed);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_search_restriction_lifted_after_failed_publish_batch() {
    let p = TestPipeline::new();
    // First batch writes restricted documents; the second opens them up.
    p.search.fail_call.store(2, Ordering::SeqCst);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    let indexing = p.ledger.get_job(v.id, Stage::SearchIndexing).await.unwrap().unwrap();
    assert_eq!(indexing.status, JobStatus::Completed);
    assert_eq!(indexing.attempts, 2);
    assert_eq!(p.search.calls.load(Ordering::SeqCst), 3);

    let documents = p.search.documents_for(v.id);
    assert_eq!(documents.len(), 3);
    assert!(documents
        .iter()
        .all(|doc| doc.access == AccessProjection::Unrestricted));
}

#[tokio::test]
async fn test_indexing_failure_fails_video_without_retry() {
    let p = TestPipeline::new();
    p.search.fail.store(true, Ordering::SeqCst);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    let indexing = p.ledger.get_job(v.id, Stage::SearchIndexing).await.unwrap().unwrap();
    assert_eq!(indexing.status, JobStatus::Failed);
    assert_eq!(indexing.attempts, 1);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Failed);
}

#[tokio::test]
async fn test_highlights_tolerate_one_failed_sub_call() {
    let p = TestPipeline::new();
    p.highlights.extract_fails.store(true, Ordering::SeqCst);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::Completed);
    assert!(p.ledger.get_highlights(v.id).await.unwrap().is_none());
    assert!(p.ledger.get_summary(v.id).await.unwrap().is_some());
    assert_eq!(video(&p, v.id).await.tags, ["pasta", "dinner"]);
}

#[tokio::test]
async fn test_highlights_fail_when_both_sub_calls_fail() {
    let p = TestPipeline::new();
    p.highlights.extract_fails.store(true, Ordering::SeqCst);
    p.highlights.summarize_fails.store(true, Ordering::SeqCst);
    let v = ingest(&p, &COOKING_VIDEO).await;

    p.drain().await;

    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::Failed);
    // Best effort: the video still publishes.
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}

#[tokio::test]
async fn test_regenerate_ai_reruns_highlights_only() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;
    p.drain().await;
    let transcriptions = p.transcriber.calls.load(Ordering::SeqCst);

    let outcome = coordinator::regenerate_ai(&p.ctx, v.id).await.unwrap();
    assert_eq!(outcome, Regeneration::Enqueued);
    assert_eq!(p.queue.pending(), vec![PipelineJob::AiHighlights { video_id: v.id }]);

    p.drain().await;

    assert_eq!(p.highlights.calls.load(Ordering::SeqCst), 2);
    assert_eq!(p.transcriber.calls.load(Ordering::SeqCst), transcriptions);
    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::Completed);
}

#[tokio::test]
async fn test_regenerate_ai_reports_a_run_in_progress() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;
    p.drain().await;

    // A worker holds the highlights row.
    coordinator::regenerate_ai(&p.ctx, v.id).await.unwrap();
    p.ledger.claim_job(v.id, Stage::AiHighlights).await.unwrap();

    let outcome = coordinator::regenerate_ai(&p.ctx, v.id).await.unwrap();
    assert_eq!(outcome, Regeneration::AlreadyRunning);
    assert_eq!(job_status(&p, v.id, Stage::AiHighlights).await, JobStatus::InProgress);
}

#[tokio::test]
async fn test_regenerate_ai_requires_transcript() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;

    let err = tokio_test::assert_err!(coordinator::regenerate_ai(&p.ctx, v.id).await);
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_reprocess_leaves_no_orphans() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;
    p.drain().await;
    let old_variants = p.ledger.list_variants(v.id).await.unwrap();

    coordinator::reprocess(&p.ctx, v.id).await.unwrap();

    for old in &old_variants {
        assert!(p.ledger.get_variant(old.id).await.unwrap().is_none());
    }
    let variants = p.ledger.list_variants(v.id).await.unwrap();
    assert_eq!(variants.len(), 3);
    assert!(variants.iter().all(|v| v.status == VariantStatus::Pending));

    let jobs = p.ledger.list_jobs(v.id).await.unwrap();
    assert_eq!(jobs.len(), Stage::ALL.len());
    for job in &jobs {
        let expected = if job.stage == Stage::MalwareScan {
            JobStatus::Skipped
        } else {
            JobStatus::Pending
        };
        assert_eq!(job.status, expected, "{}", job.stage);
        if job.stage != Stage::MalwareScan {
            assert_eq!(job.attempts, 0);
        }
    }

    assert!(p.ledger.list_transcript(v.id).await.unwrap().is_empty());
    assert!(p.ledger.get_moderation(v.id).await.unwrap().is_none());
    assert!(p.ledger.get_highlights(v.id).await.unwrap().is_none());
    assert!(p.ledger.get_summary(v.id).await.unwrap().is_none());
    assert!(p.search.documents_for(v.id).is_empty());

    let reset = video(&p, v.id).await;
    assert_eq!(reset.status, VideoStatus::Queued);
    assert!(reset.master_playlist_path.is_none());

    p.drain().await;
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
    assert_eq!(p.search.documents_for(v.id).len(), 3);
}

#[tokio::test]
async fn test_processing_status_tracks_progress() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;

    let fresh = status::processing_status(&p.ctx, v.id).await.unwrap();
    assert_eq!(fresh.video_status, VideoStatus::Queued);
    assert_eq!(fresh.stages.len(), 6);
    assert_eq!(fresh.variants.len(), 3);
    // Only the skipped malware scan counts: 100 / 9 rows.
    assert_eq!(fresh.overall_progress, 11);

    p.drain().await;

    let done = status::processing_status(&p.ctx, v.id).await.unwrap();
    assert_eq!(done.video_status, VideoStatus::Published);
    assert_eq!(done.overall_progress, 100);
    assert_eq!(done.master_playlist_path, Some(master_playlist_key(v.id)));

    let err = status::processing_status(&p.ctx, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

#[tokio::test]
async fn test_jobs_for_unknown_videos_are_dropped() {
    let p = TestPipeline::new();
    p.queue
        .enqueue(&PipelineJob::Transcription {
            video_id: Uuid::new_v4(),
        })
        .await
        .unwrap();

    let outcome = runner::process_next(&p.ctx).await.unwrap();

    assert_eq!(outcome, Some(Outcome::Dropped));
    assert!(p.queue.pending().is_empty());
    assert_eq!(p.queue.delayed_count(), 0);
}

#[tokio::test]
async fn test_redelivered_jobs_are_harmless() {
    let p = TestPipeline::new();
    let v = ingest(&p, &COOKING_VIDEO).await;
    p.drain().await;
    let batches = p.search.batches.load(Ordering::SeqCst);

    for stage in Stage::ALL {
        if let Some(job) = PipelineJob::for_stage(stage, v.id) {
            p.queue.enqueue(&job).await.unwrap();
        }
    }
    p.drain().await;

    assert_eq!(p.transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.highlights.calls.load(Ordering::SeqCst), 1);
    assert_eq!(p.search.batches.load(Ordering::SeqCst), batches);
    assert_eq!(video(&p, v.id).await.status, VideoStatus::Published);
}
