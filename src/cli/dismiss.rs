use anyhow::Result;
use clap::Args;

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct DismissArgs {
    /// Page to open
    pub url: String,

    /// Context tag; detected from the URL when omitted
    #[arg(long)]
    pub context: Option<String>,

    /// Keep watching the page until Ctrl-C
    #[arg(long)]
    pub monitor: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Never capture screenshots for the vision oracle
    #[arg(long)]
    pub no_screenshot: bool,
}

#[cfg(feature = "chromium")]
pub async fn cmd_dismiss(args: DismissArgs, ctx: &CliContext) -> Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use dismissal_cascade::DismissTarget;
    use page_driver::chromium::{ChromiumLaunch, ChromiumSession};
    use tracing::{info, warn};

    use super::output::emit;

    let warden = ctx.warden()?;
    let browser = &ctx.config().browser;
    let launch = ChromiumLaunch {
        headless: browser.headless && !args.headed,
        chrome_path: browser.chrome_path.clone(),
        ..ChromiumLaunch::default()
    };

    let session = ChromiumSession::launch(&launch)
        .await
        .context("Failed to launch Chromium")?;
    let page = match session.open(&args.url).await {
        Ok(page) => page,
        Err(err) => {
            session.shutdown().await;
            return Err(err).with_context(|| format!("Failed to open {}", args.url));
        }
    };
    info!(url = %args.url, "page opened");

    let outcome = if args.monitor {
        let handle = warden.start_monitoring(Arc::new(page), args.context.as_deref());
        info!("monitoring; press Ctrl-C to stop");
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C; stopping monitor");
        }
        let summary = handle.stop().await;
        emit(ctx.output(), &summary, |s| {
            format!(
                "checks: {}\ncascades: {}\nsuccesses: {}\nsession lost: {}",
                s.checks, s.cascades, s.successes, s.session_lost
            )
        })
    } else {
        let mut target = DismissTarget::for_url(args.url.clone());
        if !args.no_screenshot {
            target = target.capturing();
        }
        match warden.dismiss(&page, args.context.as_deref(), &target).await {
            Ok(result) => emit(ctx.output(), &result, render_result),
            Err(err) => Err(err).context("Page session lost during dismissal"),
        }
    };

    session.shutdown().await;
    outcome
}

#[cfg(feature = "chromium")]
fn render_result(result: &dismissal_cascade::DismissalResult) -> String {
    let mut lines = vec![
        format!(
            "{} in {} via {}",
            if result.success { "cleared" } else { "not cleared" },
            result.context,
            result.method
        ),
        format!("selectors tried: {}", result.selectors_tried.len()),
    ];
    if let Some(selector) = &result.selector_used {
        lines.push(format!("selector: {selector}"));
    }
    if let Some(action) = &result.force_action {
        lines.push(format!("force action: {}", action.as_str()));
    }
    lines.extend(result.errors.iter().map(|err| format!("  - {err}")));
    lines.join("\n")
}

#[cfg(not(feature = "chromium"))]
pub async fn cmd_dismiss(args: DismissArgs, _ctx: &CliContext) -> Result<()> {
    anyhow::bail!(
        "cannot open {}: this build has no browser driver; rebuild with `--features chromium`",
        args.url
    )
}
