use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use knowledge_store::{validate_selector_format, LearnedSelector, SharedKnowledgeStore};
use serde::Serialize;
use tracing::info;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct KnowledgeArgs {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum KnowledgeAction {
    /// List contexts that hold any selector
    List,
    /// Show keyed and learned selectors of a context
    Show { context: String },
    /// Learned selectors of a context, most recent first
    Learned { context: String },
    /// Store a selector under an element key
    Set {
        context: String,
        key: String,
        selector: String,
        /// Store even if the selector looks like a loading-state artefact
        #[arg(long)]
        force: bool,
    },
    /// Remove a keyed selector
    Remove { context: String, key: String },
    /// Drop every selector of a context
    Clear { context: String },
    /// Record a selector as a successful dismissal
    Learn { context: String, selector: String },
    /// Store counters and sizes
    Stats,
}

#[derive(Debug, Serialize)]
struct ContextView {
    context: String,
    selectors: BTreeMap<String, String>,
    learned: Vec<LearnedSelector>,
}

#[derive(Debug, Serialize)]
struct Mutation {
    action: &'static str,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    changed: bool,
}

pub async fn cmd_knowledge(args: KnowledgeArgs, ctx: &CliContext) -> Result<()> {
    let store = ctx.store();
    let output = ctx.output();

    match args.action {
        KnowledgeAction::List => emit(output, &store.list_contexts(), |contexts| {
            if contexts.is_empty() {
                "no contexts stored".to_string()
            } else {
                contexts.join("\n")
            }
        }),
        KnowledgeAction::Show { context } => {
            let view = ContextView {
                selectors: store.selectors_for(&context),
                learned: store.learned_entries(&context),
                context,
            };
            emit(output, &view, render_context)
        }
        KnowledgeAction::Learned { context } => {
            emit(output, &store.list_learned(&context), |learned| {
                learned.join("\n")
            })
        }
        KnowledgeAction::Set {
            context,
            key,
            selector,
            force,
        } => {
            if !force && !validate_selector_format(&selector) {
                bail!("'{selector}' does not look like a usable selector (pass --force to store it anyway)");
            }
            if !store.set(&context, &key, &selector) {
                bail!("refusing to store '{key}' in {context}: empty selector or reserved key");
            }
            persist(&store)?;
            info!(context = %context, key = %key, "selector stored");
            emit_mutation(
                ctx,
                Mutation {
                    action: "set",
                    context,
                    key: Some(key),
                    selector: Some(selector),
                    changed: true,
                },
            )
        }
        KnowledgeAction::Remove { context, key } => {
            let removed = store.remove(&context, &key);
            if removed.is_some() {
                persist(&store)?;
            }
            emit_mutation(
                ctx,
                Mutation {
                    action: "remove",
                    context,
                    key: Some(key),
                    changed: removed.is_some(),
                    selector: removed,
                },
            )
        }
        KnowledgeAction::Clear { context } => {
            let changed = store.clear_context(&context);
            if changed {
                persist(&store)?;
            }
            emit_mutation(
                ctx,
                Mutation {
                    action: "clear",
                    context,
                    key: None,
                    selector: None,
                    changed,
                },
            )
        }
        KnowledgeAction::Learn { context, selector } => {
            let Some(learned) = store.learn(&context, &selector) else {
                bail!("cannot learn an empty selector");
            };
            persist(&store)?;
            emit_mutation(
                ctx,
                Mutation {
                    action: "learn",
                    context,
                    key: Some(learned.storage_key()),
                    selector: Some(learned.selector),
                    changed: true,
                },
            )
        }
        KnowledgeAction::Stats => emit(output, &store.stats(), |stats| {
            format!(
                "contexts: {}\nkeyed: {}\nlearned: {}\nevictions: {}\nflush failures: {}",
                stats.contexts,
                stats.keyed_entries,
                stats.learned_entries,
                stats.evictions,
                stats.flush_failures
            )
        }),
    }
}

/// Mutations already flush on their own; this surfaces a failed write as an error.
fn persist(store: &SharedKnowledgeStore) -> Result<()> {
    store.flush().context("Failed to persist knowledge store")
}

fn emit_mutation(ctx: &CliContext, mutation: Mutation) -> Result<()> {
    emit(ctx.output(), &mutation, |m| {
        let target = match &m.key {
            Some(key) => format!("{}/{}", m.context, key),
            None => m.context.clone(),
        };
        if m.changed {
            format!("{} {}: ok", m.action, target)
        } else {
            format!("{} {}: nothing to do", m.action, target)
        }
    })
}

fn render_context(view: &ContextView) -> String {
    let mut lines = vec![format!("[{}]", view.context)];
    if view.selectors.is_empty() && view.learned.is_empty() {
        lines.push("  (empty)".to_string());
    }
    lines.extend(
        view.selectors
            .iter()
            .map(|(key, selector)| format!("  {key} = {selector}")),
    );
    lines.extend(
        view.learned
            .iter()
            .map(|entry| format!("  {} = {}", entry.storage_key(), entry.selector)),
    );
    lines.join("\n")
}
