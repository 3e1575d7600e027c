use anyhow::{bail, Result};
use clap::Args;
use obstruction_analyzer::ContextCheck;
use serde::Serialize;

use super::context::CliContext;
use super::output::{emit, read_source};

#[derive(Args, Clone, Debug)]
pub struct ContextArgs {
    /// Page URL
    pub url: String,

    /// Markup file to check the context markers against (`-` for stdin)
    #[arg(long, value_name = "FILE")]
    pub markup: Option<String>,

    /// Context to verify instead of the detected one
    #[arg(long, value_name = "CTX")]
    pub expect: Option<String>,
}

#[derive(Debug, Serialize)]
struct ContextReport {
    url: String,
    detected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<ContextCheck>,
}

pub async fn cmd_context(args: ContextArgs, ctx: &CliContext) -> Result<()> {
    if args.url.trim().is_empty() {
        bail!("URL must not be empty");
    }
    let rules = ctx.config().context_rules();
    let detected = rules.detect(&args.url);

    let check = match &args.markup {
        Some(source) => {
            let markup = read_source(source).await?;
            let expected = args.expect.as_deref().unwrap_or(detected.as_str());
            Some(rules.verify(expected, &markup, Some(&args.url)))
        }
        None => None,
    };

    let report = ContextReport {
        url: args.url,
        detected,
        check,
    };
    emit(ctx.output(), &report, |report| match &report.check {
        None => report.detected.clone(),
        Some(ContextCheck::Matched) => format!("{} (verified)", report.detected),
        Some(ContextCheck::Unverified) => format!("{} (unverified)", report.detected),
        Some(ContextCheck::Mismatch { detected }) => format!(
            "{} (mismatch; page looks like {})",
            report.detected,
            detected.as_deref().unwrap_or("unknown")
        ),
    })
}
