//! Single signup processing: verify → score → render → publish

use crate::error::{ProcessError, ProcessResult};
use crate::models::{PullRequestRef, SignupRecord};
use crate::state::AppContext;
use tracing::{debug, info};

/// Run one record through the pipeline up to (not including) acknowledgement
pub async fn process_signup(ctx: &AppContext, record: &SignupRecord) -> ProcessResult<PullRequestRef> {
    let profile = ctx.verifier.verify(&record.credentials()).await?;

    record.require_name()?;

    let score = ctx.scorer.score(&profile, &record.personal_page);
    if !ctx.scorer.accepts(score) {
        info!("Not creating pull for {} ({}) due to score {}", record.user_id, profile.handle, score);
        return Err(ProcessError::ScoreRejected { score });
    }
    debug!("Score {} for {} ({})", score, record.user_id, profile.handle);

    let rendered = ctx.renderer.render(record, &profile)?;

    let pull = ctx
        .publisher
        .publish(
            &record.user_id,
            &rendered.path,
            &rendered.document,
            &rendered.commit_title,
            &rendered.review_body,
        )
        .await?;

    Ok(pull)
}
