use futures::StreamExt;
use std::fmt::Write as _;
use underwrite_ai::error::AppError;
use underwrite_ai::workflows::underwriting::{
    ndjson_lines, AssessmentRequest, AssessmentResult, PipelineError, PipelineEvent,
    UnderwritingPipeline,
};

/// Prints the raw NDJSON wire format, sentinel included.
pub(crate) async fn stream_assessment(
    pipeline: &UnderwritingPipeline,
    request: AssessmentRequest,
) -> Result<(), AppError> {
    let mut lines = Box::pin(ndjson_lines(pipeline.run(request)));
    while let Some(line) = lines.next().await {
        print!("{line}");
    }
    Ok(())
}

/// Prints stage progress as it happens, then the assessment summary.
pub(crate) async fn print_assessment(
    pipeline: &UnderwritingPipeline,
    request: AssessmentRequest,
) -> Result<(), AppError> {
    println!(
        "Underwriting assessment for {}, {}",
        request.address, request.postcode
    );

    let mut events = pipeline.run(request);
    while let Some(event) = events.next().await {
        match event {
            PipelineEvent::PipelineCompleted { result } => {
                print!("{}", render_assessment(&result));
                return Ok(());
            }
            PipelineEvent::PipelineFailed { error } => return Err(error.into()),
            other => println!("{}", render_progress(&other)),
        }
    }

    Err(PipelineError::Internal {
        reason: "event stream closed without a terminal event".to_string(),
    }
    .into())
}

pub(crate) fn render_progress(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::StageStarted { stage_id } => format!("  > {stage_id} started"),
        PipelineEvent::StageCompleted { stage_id, warnings } if warnings.is_empty() => {
            format!("  + {stage_id} completed")
        }
        PipelineEvent::StageCompleted { stage_id, warnings } => {
            format!("  + {stage_id} completed ({} warning(s))", warnings.len())
        }
        PipelineEvent::StageFailed { stage_id, error } => format!("  x {stage_id} failed: {error}"),
        PipelineEvent::PipelineCompleted { .. } => "  pipeline completed".to_string(),
        PipelineEvent::PipelineFailed { error } => format!("  pipeline failed: {error}"),
    }
}

pub(crate) fn render_assessment(result: &AssessmentResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nDecision: {}", result.decision().label());
    let _ = writeln!(out, "Overall risk score: {:.1}/100", result.outcome.overall_score);
    let _ = writeln!(
        out,
        "Premium multiplier: {:.2}x",
        result.outcome.premium_multiplier
    );

    let _ = writeln!(out, "\nRisk factors");
    for factor in &result.risk_factors {
        let _ = writeln!(
            out,
            "- {} ({:.0}% weight): {:.1}",
            factor.name,
            factor.weight * 100.0,
            factor.score
        );
        let _ = writeln!(out, "    {}", factor.reasoning);
    }

    let _ = writeln!(out, "\nUnderwriter reasoning\n{}", result.underwriter_reasoning);
    let _ = writeln!(out, "\nSummary\n{}", result.narrative);

    if !result.policy_citations.is_empty() {
        let _ = writeln!(out, "\nPolicy citations");
        for citation in &result.policy_citations {
            let _ = writeln!(out, "- {citation}");
        }
    }

    if !result.data_warnings.is_empty() {
        let _ = writeln!(out, "\nData warnings");
        for warning in &result.data_warnings {
            let _ = writeln!(out, "- {warning}");
        }
    }

    out
}
