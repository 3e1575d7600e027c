use anyhow::Result;
use clap::Args;
use obstruction_analyzer::{Diagnosis, ObstructionAnalyzer};
use tracing::debug;

use super::context::CliContext;
use super::output::{emit, read_source};

#[derive(Args, Clone, Debug)]
pub struct AnalyzeArgs {
    /// Markup file, or `-` for stdin
    #[arg(value_name = "FILE")]
    pub source: String,
}

pub async fn cmd_analyze(args: AnalyzeArgs, ctx: &CliContext) -> Result<()> {
    let markup = read_source(&args.source).await?;
    debug!(bytes = markup.len(), "analyzing markup");
    let diagnosis = ObstructionAnalyzer::new().analyze(&markup);
    emit(ctx.output(), &diagnosis, render_diagnosis)
}

fn render_diagnosis(diagnosis: &Diagnosis) -> String {
    let mut lines = vec![
        format!(
            "obstructed:       {}",
            if diagnosis.is_obstructed() { "yes" } else { "no" }
        ),
        format!("overlay:          {}", diagnosis.has_overlay),
        format!("popup:            {}", diagnosis.has_popup),
        format!("multi-step:       {}", diagnosis.is_multi_step),
        format!("layers:           {}", diagnosis.layer_count),
        format!("pointer blocking: {}", diagnosis.pointer_blocking),
        format!("confidence:       {:.2}", diagnosis.confidence),
    ];
    if !diagnosis.recommendations.is_empty() {
        let names: Vec<&str> = diagnosis
            .recommendations
            .iter()
            .map(|recommendation| recommendation.as_str())
            .collect();
        lines.push(format!("recommendations:  {}", names.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_markup_renders_without_recommendations() {
        let rendered = render_diagnosis(&Diagnosis::clear());
        assert!(rendered.starts_with("obstructed:       no"));
        assert!(!rendered.contains("recommendations"));
    }
}
