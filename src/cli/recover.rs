use anyhow::Result;
use clap::Args;
use dismissal_executor::TOUR_PRIORITY_SELECTORS;
use serde::Serialize;
use vision_oracle::{parse_verdict, recover_json, OracleVerdict};

use super::context::CliContext;
use super::output::{emit, read_source};

#[derive(Args, Clone, Debug)]
pub struct RecoverArgs {
    /// Raw oracle response, or `-` for stdin
    #[arg(value_name = "FILE")]
    pub source: String,

    /// Selector to put first when the answer reports a popup (repeatable)
    #[arg(long = "priority", value_name = "SELECTOR")]
    pub priority: Vec<String>,

    /// Use the guided-tour priority selectors
    #[arg(long, conflicts_with = "priority")]
    pub tour: bool,
}

#[derive(Debug, Serialize)]
struct RecoveryReport {
    recovered: bool,
    verdict: OracleVerdict,
}

pub async fn cmd_recover_json(args: RecoverArgs, ctx: &CliContext) -> Result<()> {
    let raw = read_source(&args.source).await?;
    let priority: Vec<String> = if args.tour {
        TOUR_PRIORITY_SELECTORS.iter().map(|s| s.to_string()).collect()
    } else {
        args.priority
    };

    let report = RecoveryReport {
        recovered: recover_json(&raw).is_some(),
        verdict: parse_verdict(&raw, &priority),
    };
    emit(ctx.output(), &report, render_report)
}

fn render_report(report: &RecoveryReport) -> String {
    let verdict = &report.verdict;
    let mut lines = vec![
        format!("recovered:   {}", report.recovered),
        format!("has popup:   {}", verdict.has_popup),
        format!("confidence:  {:.2}", verdict.confidence),
        format!("multi-click: {} ({} steps)", verdict.multi_click, verdict.steps),
        format!("reason:      {}", verdict.reason),
    ];
    lines.extend(
        verdict
            .selectors
            .iter()
            .enumerate()
            .map(|(idx, selector)| format!("  {}. {selector}", idx + 1)),
    );
    lines.join("\n")
}
