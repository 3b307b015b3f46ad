//! Command execution.
//!
//! Builds the engine from CLI flags and dispatches subcommands. The
//! search/answer/facets commands emit the JSON shapes of the query
//! surface; ingest and links cover the write paths.

use crate::app::{Engine, EngineConfig};
use crate::cli::parser::{Cli, Commands, FilterArgs, LinkCommands, WorkflowCommands};
use crate::error::{Error, Result};
use crate::ingest::normalize_tags;
use crate::model::PendingStatus;
use crate::search::{Preferences, SearchRequest};
use crate::store::{DateField, FilterSpec};
use crate::time::parse_window;
use crate::workflow::StepSpec;
use chrono::Utc;
use serde::Deserialize;

fn filter_spec(args: &FilterArgs) -> Result<(FilterSpec, DateField)> {
    let now = Utc::now();
    let (since, until) = parse_window(args.since.as_deref(), args.until.as_deref(), now);
    let tags = args
        .tags
        .as_deref()
        .map(|t| normalize_tags([t]))
        .unwrap_or_default();
    let date_field = DateField::parse(&args.date_field).ok_or_else(|| {
        Error::invalid_input(format!("unknown date_field '{}'", args.date_field))
    })?;
    Ok((
        FilterSpec {
            tags,
            require_all: args.require_all_tags,
            since,
            until,
            path_prefix: args.path_prefix.clone(),
        },
        date_field,
    ))
}

fn applied_filters(args: &FilterArgs, spec: &FilterSpec, sort: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "tags": spec.tags,
        "require_all_tags": spec.require_all,
        "since": spec.since.format("%Y-%m-%d").to_string(),
        "until": spec.until.format("%Y-%m-%d").to_string(),
        "date_field": args.date_field,
        "path_prefix": spec.path_prefix,
        "sort": sort,
    })
}

/// JSON workflow definition accepted by `workflow create`.
#[derive(Debug, Deserialize)]
struct WorkflowFile {
    name: String,
    #[serde(default)]
    description: String,
    steps: Vec<StepSpec>,
}

/// Executes a parsed CLI invocation, returning the rendered output.
///
/// # Errors
///
/// Returns an error for invalid arguments or failed operations; the
/// caller renders it per the selected format.
pub async fn execute(cli: &Cli) -> Result<serde_json::Value> {
    let config = EngineConfig {
        db_path: cli.get_db_path(),
        workflow_db_path: cli.get_workflow_db_path(),
        notes_root: cli.notes_root.clone(),
        ..EngineConfig::default()
    };

    match &cli.command {
        Commands::Init => {
            let _engine = Engine::open(&config)?;
            Ok(serde_json::json!({
                "success": true,
                "db_path": config.db_path,
                "workflow_db_path": config.workflow_db_path,
            }))
        }

        Commands::Ingest {
            prefix,
            force,
            no_link,
        } => {
            let engine = Engine::open(&config)?;
            engine.start()?;
            let report = engine
                .pipeline
                .ingest_prefix(engine.source.as_ref(), prefix, *force)
                .await?;

            let mut links_created = 0usize;
            let mut links_pending = 0usize;
            if !no_link {
                for outcome in report.outcomes.iter().filter(|o| !o.skipped) {
                    for chunk in engine.chunks.chunks_for_path(&outcome.path)? {
                        match engine.linking.link_chunk(&chunk.id) {
                            Ok(link_report) => {
                                links_created += link_report.created + link_report.updated;
                                links_pending += link_report.pending;
                            }
                            Err(e) => {
                                tracing::warn!(chunk = %chunk.id, error = %e, "link pass failed");
                            }
                        }
                    }
                }
            }
            let orphans = engine.vectors.remove_orphans()?;
            engine.shutdown().await?;

            let mut value = serde_json::to_value(&report)?;
            if let Some(map) = value.as_object_mut() {
                map.insert("links_created".to_string(), serde_json::json!(links_created));
                map.insert("links_pending".to_string(), serde_json::json!(links_pending));
                map.insert("orphans_removed".to_string(), serde_json::json!(orphans));
            }
            Ok(value)
        }

        Commands::Search {
            query,
            k,
            sort,
            prefer_semantic,
            prefer_graph,
            filters,
        } => {
            let engine = Engine::open(&config)?;
            let (spec, date_field) = filter_spec(filters)?;
            let request = SearchRequest {
                query: query.clone(),
                filters: spec.clone(),
                date_field,
                preferences: Preferences {
                    prefer_semantic: *prefer_semantic,
                    prefer_graph: *prefer_graph,
                },
            };
            let outcome = engine.retriever.search(&request)?;

            let mut results = outcome.results;
            match sort.as_str() {
                "date_desc" => results.sort_by(|a, b| b.date.cmp(&a.date)),
                "date_asc" => results.sort_by_key(|r| r.date),
                _ => {}
            }
            results.truncate(*k);

            Ok(serde_json::json!({
                "query": outcome.query,
                "query_class": outcome.class,
                "strategy": outcome.strategy,
                "applied_filters": applied_filters(filters, &spec, Some(sort.as_str())),
                "total_candidates": outcome.total_candidates,
                "results": results.iter().map(|r| serde_json::json!({
                    "path": r.path,
                    "heading": r.heading,
                    "score": r.score,
                    "snippet": r.snippet,
                    "start_line": r.start_line,
                    "signals": r.signals,
                })).collect::<Vec<_>>(),
                "fell_back": outcome.fell_back,
                "generated_at": Utc::now().to_rfc3339(),
            }))
        }

        Commands::Answer { query, k, filters } => {
            let engine = Engine::open(&config)?;
            let (spec, date_field) = filter_spec(filters)?;
            let request = SearchRequest {
                query: query.clone(),
                filters: spec,
                date_field,
                preferences: Preferences::default(),
            };
            let outcome = engine.retriever.search(&request)?;
            let results: Vec<_> = outcome.results.iter().take(*k).collect();

            let answer: Vec<String> = results.iter().map(|r| format!("- {}", r.snippet)).collect();
            let citations: Vec<serde_json::Value> = results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "ref": format!("{}#{}", r.path, r.heading.as_deref().unwrap_or(""))
                    })
                })
                .collect();
            let related: Vec<&str> = results.iter().take(3).map(|r| r.path.as_str()).collect();

            Ok(serde_json::json!({
                "answer": answer,
                "citations": citations,
                "related": related,
            }))
        }

        Commands::Facets { filters } => {
            let engine = Engine::open(&config)?;
            let (spec, _) = filter_spec(filters)?;
            let report =
                engine
                    .chunks
                    .fetch_facets(spec.since, spec.until, spec.path_prefix.as_deref())?;
            Ok(serde_json::to_value(&report)?)
        }

        Commands::Links(command) => {
            let engine = Engine::open(&config)?;
            match command {
                LinkCommands::Pending => {
                    let pending = engine.links.pending(PendingStatus::Pending)?;
                    Ok(serde_json::to_value(&pending)?)
                }
                LinkCommands::Approve { id } => {
                    let edge = engine.linking.approve_pending(*id)?;
                    Ok(serde_json::json!({ "success": true, "approved": edge }))
                }
                LinkCommands::Reject { id } => {
                    let rejected = engine.linking.reject_pending(*id)?;
                    Ok(serde_json::json!({ "success": true, "rejected": rejected }))
                }
                LinkCommands::Suggest { chunk_id } => {
                    let candidates = engine.linking.score_candidates(chunk_id)?;
                    Ok(serde_json::json!(
                        candidates
                            .iter()
                            .map(|c| serde_json::json!({
                                "target_id": c.target_id,
                                "vector_score": c.vector_score,
                                "entity_score": c.entity_score,
                                "combined": c.combined,
                                "rationale": c.rationale,
                            }))
                            .collect::<Vec<_>>()
                    ))
                }
            }
        }

        Commands::Workflow(command) => {
            let engine = Engine::open(&config)?;
            match command {
                WorkflowCommands::Create { file } => {
                    let raw = std::fs::read_to_string(file)?;
                    let definition: WorkflowFile = serde_json::from_str(&raw)
                        .map_err(|e| Error::invalid_input(format!("workflow file: {e}")))?;
                    let id = engine.workflows.create_workflow(
                        &definition.name,
                        &definition.description,
                        definition.steps,
                        "cli",
                    )?;
                    Ok(serde_json::json!({ "success": true, "workflow_id": id }))
                }
                WorkflowCommands::Run { id } => {
                    engine.start()?;
                    let status = engine.workflows.run_workflow(id).await?;
                    let progress = engine.workflows.progress(id)?;
                    engine.shutdown().await?;
                    Ok(serde_json::json!({
                        "success": status == crate::workflow::WorkflowStatus::Completed,
                        "status": status,
                        "progress": progress,
                    }))
                }
                WorkflowCommands::Status { id } => {
                    let progress = engine.workflows.progress(id)?;
                    Ok(serde_json::to_value(&progress)?)
                }
                WorkflowCommands::Cancel { id } => {
                    engine.workflows.cancel_workflow(id)?;
                    Ok(serde_json::json!({ "success": true }))
                }
            }
        }

        Commands::Status => {
            let engine = Engine::open(&config)?;
            let counts = engine.chunks.counts()?;
            Ok(serde_json::json!({
                "files": counts.files,
                "chunks": counts.chunks,
                "tags": counts.tags,
                "embeddings": engine.vectors.count()?,
                "edges": engine.links.edge_count()?,
                "pending_links": engine.links.pending(PendingStatus::Pending)?.len(),
                "workflows": engine.workflows.store().list()?.len(),
            }))
        }
    }
}
