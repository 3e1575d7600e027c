use clap::Subcommand;

use super::analyze::AnalyzeArgs;
use super::detect::ContextArgs;
use super::dismiss::DismissArgs;
use super::knowledge::KnowledgeArgs;
use super::recover::RecoverArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Diagnose obstructions in saved page markup
    Analyze(AnalyzeArgs),

    /// Detect the context of a URL and optionally verify it against markup
    Context(ContextArgs),

    /// Inspect or edit the selector knowledge store
    Knowledge(KnowledgeArgs),

    /// Repair a raw oracle response and print the verdict it yields
    RecoverJson(RecoverArgs),

    /// Open a page in Chromium and clear whatever obstructs it
    Dismiss(DismissArgs),
}
