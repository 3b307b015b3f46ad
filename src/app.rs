//! Process-level wiring.
//!
//! Constructs the concrete stores once and hands capability handles to
//! the pipeline, retriever, linking engine, synthesizer, and workflow
//! engine. The message bus is the only backchannel between agents: on
//! [`Engine::start`] each agent subscribes to its request topics and the
//! workflow engine's built-in actions are pointed at them.

use crate::bus::{BusConfig, Handler, Message, MessageBus, Payload};
use crate::embedding::{DEFAULT_DIMENSIONS, Embedder, HashEmbedder};
use crate::entity::{EntityExtractor, EntityIndex};
use crate::error::Result;
use crate::index::VectorIndex;
use crate::ingest::{FsObjectStore, IngestPipeline, ObjectStore};
use crate::link::{LinkConfig, LinkingEngine};
use crate::search::{Retriever, RetrieverConfig, SearchRequest};
use crate::store::{ChunkStore, Db, LinkStore, SCHEMA_SQL};
use crate::synthesis::Synthesizer;
use crate::workflow::{WorkflowEngine, WorkflowStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Primary index database path.
    pub db_path: PathBuf,
    /// Workflow database path (second namespace).
    pub workflow_db_path: PathBuf,
    /// Root directory the filesystem object store serves documents from.
    pub notes_root: PathBuf,
    /// Linking tunables.
    pub link: LinkConfig,
    /// Retrieval tunables.
    pub retriever: RetrieverConfig,
    /// Batch ingestion fan-out.
    pub max_concurrent_ingest: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(crate::store::DEFAULT_DB_PATH),
            workflow_db_path: PathBuf::from(crate::store::DEFAULT_WORKFLOW_DB_PATH),
            notes_root: PathBuf::from("."),
            link: LinkConfig::default(),
            retriever: RetrieverConfig::default(),
            max_concurrent_ingest: crate::ingest::DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// The assembled engine: stores, agents, bus, and workflow executor.
pub struct Engine {
    /// Chunk store handle.
    pub chunks: ChunkStore,
    /// Link store handle.
    pub links: LinkStore,
    /// Vector index handle.
    pub vectors: VectorIndex,
    /// Entity index handle.
    pub entities: EntityIndex,
    /// Document source.
    pub source: Arc<dyn ObjectStore>,
    /// Ingestion pipeline.
    pub pipeline: Arc<IngestPipeline>,
    /// Linking engine.
    pub linking: Arc<LinkingEngine>,
    /// Query planner and retriever.
    pub retriever: Arc<Retriever>,
    /// Extractive assembler.
    pub synthesizer: Arc<Synthesizer>,
    /// Message bus.
    pub bus: Arc<MessageBus>,
    /// Workflow executor.
    pub workflows: Arc<WorkflowEngine>,
}

impl Engine {
    /// Opens the engine over on-disk databases.
    ///
    /// # Errors
    ///
    /// Returns an error if a database cannot be opened or a component
    /// fails to initialize.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let db = Db::open(&config.db_path)?;
        db.init(SCHEMA_SQL)?;
        let workflow_store = WorkflowStore::open(&config.workflow_db_path)?;
        let source: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.notes_root));
        Self::assemble(db, workflow_store, source, config)
    }

    /// Builds a fully in-memory engine. Useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if a component fails to initialize.
    pub fn in_memory(notes_root: &Path) -> Result<Self> {
        let db = Db::in_memory_index()?;
        let workflow_store = WorkflowStore::in_memory()?;
        let source: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(notes_root));
        let config = EngineConfig::default();
        Self::assemble(db, workflow_store, source, &config)
    }

    fn assemble(
        db: Db,
        workflow_store: WorkflowStore,
        source: Arc<dyn ObjectStore>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let chunks = ChunkStore::new(db.clone());
        let links = LinkStore::new(db.clone());
        let vectors = VectorIndex::new(db.clone());
        let entities = EntityIndex::new(db);
        let extractor = Arc::new(EntityExtractor::new()?);
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DEFAULT_DIMENSIONS));

        let bus = MessageBus::new(BusConfig::default());
        let pipeline = Arc::new(
            IngestPipeline::new(
                chunks.clone(),
                vectors.clone(),
                entities.clone(),
                Arc::clone(&extractor),
                Arc::clone(&embedder),
            )
            .with_bus(Arc::clone(&bus))
            .with_max_concurrent(config.max_concurrent_ingest),
        );
        let linking = Arc::new(LinkingEngine::new(
            chunks.clone(),
            links.clone(),
            vectors.clone(),
            entities.clone(),
            config.link,
        ));
        let retriever = Arc::new(Retriever::new(
            chunks.clone(),
            vectors.clone(),
            entities.clone(),
            Arc::clone(&linking),
            Arc::clone(&extractor),
            embedder,
            config.retriever,
        ));
        let synthesizer = Arc::new(Synthesizer::new(
            Arc::clone(&retriever),
            Arc::clone(&linking),
            chunks.clone(),
        ));
        let workflows = WorkflowEngine::new(workflow_store);
        workflows.register_agent_handlers(&bus);

        Ok(Self {
            chunks,
            links,
            vectors,
            entities,
            source,
            pipeline,
            linking,
            retriever,
            synthesizer,
            bus,
            workflows,
        })
    }

    /// Starts the bus and subscribes the agents to their request topics.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot start or a subscription fails.
    pub fn start(&self) -> Result<()> {
        self.bus.start()?;
        self.subscribe_agents()?;
        Ok(())
    }

    /// Stops the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if bus state is unavailable.
    pub async fn shutdown(&self) -> Result<()> {
        self.bus.stop().await
    }

    fn subscribe_agents(&self) -> Result<()> {
        self.subscribe_ingestion()?;
        self.subscribe_entities()?;
        self.subscribe_linking()?;
        self.subscribe_synthesis()?;
        self.subscribe_retrieval()?;
        Ok(())
    }

    fn subscribe_ingestion(&self) -> Result<()> {
        let bus = Arc::clone(&self.bus);
        let pipeline = Arc::clone(&self.pipeline);
        let source = Arc::clone(&self.source);
        let handler: Handler = Arc::new(move |message: Message| {
            let bus = Arc::clone(&bus);
            let pipeline = Arc::clone(&pipeline);
            let source = Arc::clone(&source);
            Box::pin(async move {
                let path = payload_str(&message, "document_path");
                let force = message
                    .payload
                    .get("force_update")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);

                let outcome = match source.get(&path).await {
                    Ok(object) => {
                        pipeline
                            .ingest(crate::ingest::IngestRequest {
                                path: path.clone(),
                                raw: object.bytes,
                                etag: object.etag,
                                modified_at: object.modified,
                                force_update: force,
                            })
                            .await
                    }
                    Err(e) => Err(e),
                };

                let payload = match outcome {
                    Ok(result) => {
                        let mut payload = to_payload(&result);
                        payload.insert("success".to_string(), serde_json::json!(true));
                        payload
                    }
                    Err(e) => failure_payload(&e.to_string()),
                };
                bus.respond(&message, "ingestion_agent", payload)
                    .map_err(|e| e.to_string())
            })
        });
        self.bus
            .subscribe("ingestion_agent", "ingestion.process_document", handler)?;
        Ok(())
    }

    fn subscribe_entities(&self) -> Result<()> {
        let bus = Arc::clone(&self.bus);
        let extractor = Arc::new(EntityExtractor::new()?);
        let handler: Handler = Arc::new(move |message: Message| {
            let bus = Arc::clone(&bus);
            let extractor = Arc::clone(&extractor);
            Box::pin(async move {
                let content = payload_str(&message, "content");
                let extraction = extractor.extract(&content);
                let entities: Vec<serde_json::Value> = extraction
                    .mentions
                    .iter()
                    .map(|(entity, start, end)| {
                        serde_json::json!({
                            "text": entity.text,
                            "label": entity.label.as_str(),
                            "confidence": entity.confidence,
                            "start": start,
                            "end": end,
                        })
                    })
                    .collect();

                let mut payload = Payload::new();
                payload.insert("success".to_string(), serde_json::json!(true));
                payload.insert("entities".to_string(), serde_json::json!(entities));
                payload.insert(
                    "keyphrases".to_string(),
                    serde_json::json!(extraction.keyphrases),
                );
                bus.respond(&message, "entity_agent", payload)
                    .map_err(|e| e.to_string())
            })
        });
        self.bus
            .subscribe("entity_agent", "entities.extract", handler)?;
        Ok(())
    }

    fn subscribe_linking(&self) -> Result<()> {
        let bus = Arc::clone(&self.bus);
        let linking = Arc::clone(&self.linking);
        let chunks = self.chunks.clone();
        let handler: Handler = Arc::new(move |message: Message| {
            let bus = Arc::clone(&bus);
            let linking = Arc::clone(&linking);
            let chunks = chunks.clone();
            Box::pin(async move {
                // Accept either one chunk id or a whole document path.
                let chunk_ids: Vec<String> =
                    match message.payload.get("document_id").and_then(|v| v.as_str()) {
                        Some(id) => vec![id.to_string()],
                        None => {
                            let path = payload_str(&message, "document_path");
                            chunks
                                .chunks_for_path(&path)
                                .map(|list| list.into_iter().map(|c| c.id).collect())
                                .unwrap_or_default()
                        }
                    };

                let mut created = 0usize;
                let mut pending = 0usize;
                let mut failed = 0usize;
                for chunk_id in &chunk_ids {
                    match linking.link_chunk(chunk_id) {
                        Ok(report) => {
                            created += report.created + report.updated;
                            pending += report.pending;
                        }
                        Err(e) => {
                            tracing::warn!(chunk = %chunk_id, error = %e, "link pass failed");
                            failed += 1;
                        }
                    }
                }

                let mut payload = Payload::new();
                payload.insert("success".to_string(), serde_json::json!(failed == 0));
                payload.insert("links_created".to_string(), serde_json::json!(created));
                payload.insert("links_pending".to_string(), serde_json::json!(pending));
                payload.insert("failed".to_string(), serde_json::json!(failed));
                bus.respond(&message, "linking_agent", payload)
                    .map_err(|e| e.to_string())
            })
        });
        self.bus
            .subscribe("linking_agent", "linking.create_links", handler)?;
        Ok(())
    }

    fn subscribe_synthesis(&self) -> Result<()> {
        let bus = Arc::clone(&self.bus);
        let synthesizer = Arc::clone(&self.synthesizer);
        let chunks = self.chunks.clone();
        let handler: Handler = Arc::new(move |message: Message| {
            let bus = Arc::clone(&bus);
            let synthesizer = Arc::clone(&synthesizer);
            let chunks = chunks.clone();
            Box::pin(async move {
                let payload = match message.topic.as_str() {
                    "synthesis.answer_question" => {
                        let question = payload_str(&message, "question");
                        let limit = payload_usize(&message, "context_limit", 5);
                        match synthesizer.answer_question(&question, limit) {
                            Ok(output) => synthesis_payload(&output),
                            Err(e) => failure_payload(&e.to_string()),
                        }
                    }
                    _ => {
                        let path = payload_str(&message, "document_path");
                        let max_words = payload_usize(&message, "max_length", 200);
                        match chunks.chunks_for_path(&path) {
                            Ok(list) => {
                                synthesis_payload(&synthesizer.generate_summary(&list, max_words))
                            }
                            Err(e) => failure_payload(&e.to_string()),
                        }
                    }
                };
                bus.respond(&message, "synthesis_agent", payload)
                    .map_err(|e| e.to_string())
            })
        });
        self.bus
            .subscribe("synthesis_agent", "synthesis.*", handler)?;
        Ok(())
    }

    fn subscribe_retrieval(&self) -> Result<()> {
        let bus = Arc::clone(&self.bus);
        let retriever = Arc::clone(&self.retriever);
        let handler: Handler = Arc::new(move |message: Message| {
            let bus = Arc::clone(&bus);
            let retriever = Arc::clone(&retriever);
            Box::pin(async move {
                let query = payload_str(&message, "query");
                let limit = payload_usize(&message, "limit", 10);
                let payload = match retriever.search(&SearchRequest::query(query)) {
                    Ok(outcome) => {
                        let results: Vec<serde_json::Value> = outcome
                            .results
                            .iter()
                            .take(limit)
                            .filter_map(|r| serde_json::to_value(r).ok())
                            .collect();
                        let mut payload = Payload::new();
                        payload.insert("success".to_string(), serde_json::json!(true));
                        payload.insert("results".to_string(), serde_json::json!(results));
                        payload.insert(
                            "total".to_string(),
                            serde_json::json!(outcome.total_candidates),
                        );
                        payload
                    }
                    Err(e) => failure_payload(&e.to_string()),
                };
                bus.respond(&message, "retrieval_agent", payload)
                    .map_err(|e| e.to_string())
            })
        });
        self.bus
            .subscribe("retrieval_agent", "retrieval.search", handler)?;
        Ok(())
    }
}

fn payload_str(message: &Message, key: &str) -> String {
    message
        .payload
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn payload_usize(message: &Message, key: &str, default: usize) -> usize {
    message
        .payload
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .map_or(default, |v| v as usize)
}

fn to_payload<T: serde::Serialize>(value: &T) -> Payload {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => Payload::new(),
    }
}

fn failure_payload(error: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("success".to_string(), serde_json::json!(false));
    payload.insert("error".to_string(), serde_json::json!(error));
    payload
}

fn synthesis_payload(output: &crate::synthesis::SynthesisOutput) -> Payload {
    let mut payload = Payload::new();
    payload.insert("success".to_string(), serde_json::json!(true));
    payload.insert("content".to_string(), serde_json::json!(output.content));
    payload.insert(
        "confidence".to_string(),
        serde_json::json!(output.confidence),
    );
    payload.insert(
        "sources".to_string(),
        serde_json::json!(
            output
                .sources
                .iter()
                .map(crate::synthesis::SourceRef::reference)
                .collect::<Vec<_>>()
        ),
    );
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepSpec;

    #[tokio::test]
    async fn test_workflow_drives_agents_over_bus() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("note.md"),
            "---\ntitle: Note\ntags: [ai]\n---\n# Intro\nA searchable test body.\n",
        )
        .expect("write");

        let engine = Engine::in_memory(dir.path()).expect("engine");
        engine.start().expect("start");

        let id = engine
            .workflows
            .create_workflow(
                "ingest-then-search",
                "",
                vec![
                    StepSpec::new("ingest", "ingest_document")
                        .parameter("document_path", serde_json::json!("note.md"))
                        .timeout_secs(10)
                        .retries(0, 0),
                    StepSpec::new("search", "search_knowledge")
                        .parameter("query", serde_json::json!("searchable test"))
                        .depends_on("ingest")
                        .timeout_secs(10)
                        .retries(0, 0),
                ],
                "tester",
            )
            .expect("create");

        let status = engine.workflows.run_workflow(&id).await.expect("run");
        assert_eq!(status, crate::workflow::WorkflowStatus::Completed);

        let workflow = engine
            .workflows
            .store()
            .load(&id)
            .expect("load")
            .expect("present");
        let search_ctx = workflow
            .context
            .get("search_result")
            .and_then(|v| v.as_object())
            .expect("search result in context");
        assert_eq!(search_ctx.get("success"), Some(&serde_json::json!(true)));
        let results = search_ctx
            .get("results")
            .and_then(|v| v.as_array())
            .expect("results array");
        assert!(!results.is_empty());

        engine.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_entity_agent_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::in_memory(dir.path()).expect("engine");
        engine.start().expect("start");

        let mut payload = Payload::new();
        payload.insert(
            "content".to_string(),
            serde_json::json!("Alice Johnson works at Acme Corp."),
        );
        let response = engine
            .bus
            .request(
                "entities.extract",
                payload,
                "tester",
                Some("entity_agent".to_string()),
                std::time::Duration::from_secs(2),
                crate::bus::MessagePriority::Normal,
            )
            .await
            .expect("request")
            .expect("response");

        let entities = response
            .payload
            .get("entities")
            .and_then(|v| v.as_array())
            .expect("entities");
        assert!(!entities.is_empty());
        engine.shutdown().await.expect("shutdown");
    }
}
