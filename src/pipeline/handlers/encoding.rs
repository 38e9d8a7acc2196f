use tracing::{debug, error, info};
use uuid::Uuid;

use super::load_video;
use crate::error::{PipelineError, Result};
use crate::pipeline::{gates, record_completed, record_failed, PipelineContext};

/// Coarse progress milestones reported on the variant row.
const PROGRESS_DOWNLOADED: i32 = 10;
const PROGRESS_ENCODING: i32 = 30;

/// Encode one rendition. Siblings are independent; every outcome re-checks
/// the master playlist fan-in.
pub async fn run(ctx: &PipelineContext, video_id: Uuid, variant_id: Uuid) -> Result<()> {
    // Checked before claiming so a mismatched payload never touches the row.
    match ctx.ledger.get_variant(variant_id).await? {
        Some(variant) if variant.video_id == video_id => {}
        Some(_) => {
            return Err(PipelineError::Validation(format!(
                "variant {variant_id} does not belong to video {video_id}"
            )));
        }
        None => {
            return Err(PipelineError::NotFound {
                entity: "Variant",
                id: variant_id,
            });
        }
    }
    let Some(variant) = ctx.ledger.claim_variant(variant_id).await? else {
        debug!(video_id = %video_id, variant_id = %variant_id, "Variant already terminal");
        return gates::master_playlist_gate(ctx, video_id).await;
    };
    let video = load_video(ctx, video_id).await?;
    let profile = variant.profile();

    ctx.ledger
        .set_variant_progress(variant_id, PROGRESS_DOWNLOADED)
        .await?;
    info!(
        video_id = %video_id,
        variant_id = %variant_id,
        profile = %profile.name,
        "Encoding variant"
    );
    ctx.ledger
        .set_variant_progress(variant_id, PROGRESS_ENCODING)
        .await?;

    match ctx
        .encoder
        .encode_variant(video_id, &video.media_ref, &profile)
        .await
    {
        Ok(output) => {
            ctx.ledger.complete_variant(variant_id, &output).await?;
            record_completed("encoding");
            info!(
                video_id = %video_id,
                variant_id = %variant_id,
                profile = %profile.name,
                size_bytes = output.size_bytes,
                "Variant encoded"
            );
        }
        Err(e) => {
            ctx.ledger.fail_variant(variant_id, &e.to_string()).await?;
            record_failed("encoding");
            error!(
                video_id = %video_id,
                variant_id = %variant_id,
                profile = %profile.name,
                error = %e,
                "Variant encoding failed"
            );
        }
    }

    gates::master_playlist_gate(ctx, video_id).await
}
