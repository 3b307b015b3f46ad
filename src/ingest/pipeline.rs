//! Document ingestion pipeline.
//!
//! Transforms a raw markdown payload into chunks, tags, entity mentions,
//! and embeddings, idempotently. Unchanged documents short-circuit on the
//! stored content hash. Within one document the stages run strictly in
//! order (parse, chunk, persist, extract, embed); across documents the
//! batch entry point fans out under a counting semaphore.

use crate::bus::{MessageBus, Payload, Publish};
use crate::embedding::Embedder;
use crate::entity::{EntityExtractor, EntityIndex};
use crate::error::{Error, Result};
use crate::index::{EmbeddingMetadata, VectorIndex};
use crate::ingest::chunker::HeadingChunker;
use crate::ingest::frontmatter::parse_document;
use crate::ingest::source::ObjectStore;
use crate::ingest::tags::tags_from_frontmatter;
use crate::model::{FileRecord, NoteChunk};
use crate::store::ChunkStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default cross-document ingestion concurrency.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Bus topic carrying per-document ingestion results.
pub const TOPIC_INGESTION_COMPLETED: &str = "ingestion.completed";

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Canonical document path.
    pub path: String,
    /// Raw UTF-8 markdown bytes.
    pub raw: Vec<u8>,
    /// Source etag, when available.
    pub etag: Option<String>,
    /// Source modification instant.
    pub modified_at: DateTime<Utc>,
    /// Re-ingest even when the content hash is unchanged.
    pub force_update: bool,
}

/// Per-document ingestion result.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Document path.
    pub path: String,
    /// True when the unchanged-hash short-circuit fired.
    pub skipped: bool,
    /// Reason for skipping, when skipped.
    pub skip_reason: Option<String>,
    /// Chunks inserted or rewritten.
    pub chunks_written: usize,
    /// Stale chunks removed after re-ingestion.
    pub chunks_removed: usize,
    /// Normalized tag set applied to every chunk.
    pub tags: Vec<String>,
    /// Entity mentions stored.
    pub mentions: usize,
    /// Embeddings stored.
    pub embedded: usize,
    /// Chunks whose embedding failed (logged and skipped).
    pub embedding_failures: usize,
}

impl IngestOutcome {
    fn skipped(path: String, reason: &str) -> Self {
        Self {
            path,
            skipped: true,
            skip_reason: Some(reason.to_string()),
            chunks_written: 0,
            chunks_removed: 0,
            tags: Vec::new(),
            mentions: 0,
            embedded: 0,
            embedding_failures: 0,
        }
    }
}

/// One failed document in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    /// Document path.
    pub path: String,
    /// Error rendered as text.
    pub error: String,
}

/// Aggregate result of a batch ingestion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Documents ingested with writes.
    pub successful: usize,
    /// Documents skipped as unchanged.
    pub skipped: usize,
    /// Documents that failed.
    pub failed: usize,
    /// Per-document failures.
    pub errors: Vec<BatchError>,
    /// Per-document outcomes for ingested and skipped documents.
    pub outcomes: Vec<IngestOutcome>,
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// The ingestion pipeline.
pub struct IngestPipeline {
    chunks: ChunkStore,
    vectors: VectorIndex,
    entities: EntityIndex,
    extractor: Arc<EntityExtractor>,
    embedder: Arc<dyn Embedder>,
    bus: Option<Arc<MessageBus>>,
    chunker: HeadingChunker,
    max_concurrent: usize,
}

impl IngestPipeline {
    /// Creates a pipeline over the given stores and embedder.
    #[must_use]
    pub fn new(
        chunks: ChunkStore,
        vectors: VectorIndex,
        entities: EntityIndex,
        extractor: Arc<EntityExtractor>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            chunks,
            vectors,
            entities,
            extractor,
            embedder,
            bus: None,
            chunker: HeadingChunker::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Attaches a bus for `ingestion.completed` events.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Overrides the batch fan-out limit.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Ingests one document.
    ///
    /// Per-chunk extraction and embedding failures are logged and
    /// skipped; the rest of the document continues.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for non-UTF-8 payloads or malformed
    /// front-matter, and `Dependency` for store failures.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let IngestRequest {
            path,
            raw,
            etag,
            modified_at,
            force_update,
        } = request;

        let text = String::from_utf8(raw).map_err(|e| {
            Error::invalid_input(format!("{path}: not UTF-8 at byte {}", e.utf8_error().valid_up_to()))
        })?;
        let hash = sha1_hex(text.as_bytes());

        // Unchanged content short-circuits with zero writes.
        if !force_update
            && let Some(stored) = self.chunks.file(&path)?
            && stored.is_unchanged(&hash)
        {
            tracing::debug!(%path, "unchanged, skipping");
            let outcome = IngestOutcome::skipped(path, "unchanged");
            self.emit_completed(&outcome);
            return Ok(outcome);
        }

        let document = parse_document(&text)?;
        let title = document.title_or_stem(&path);
        let created_at = document.created_at();
        let tags = tags_from_frontmatter(&document.frontmatter);

        let record = FileRecord {
            path: path.clone(),
            title: title.clone(),
            frontmatter: document.frontmatter.clone(),
            hash: hash.clone(),
            etag,
            size: text.len() as u64,
            created_at,
            modified_at,
        };
        self.chunks.upsert_file(&record)?;

        let spans = self.chunker.chunk(&document.body);
        let mut outcome = IngestOutcome {
            path: path.clone(),
            skipped: false,
            skip_reason: None,
            chunks_written: 0,
            chunks_removed: 0,
            tags: tags.clone(),
            mentions: 0,
            embedded: 0,
            embedding_failures: 0,
        };

        let mut kept_ids = Vec::with_capacity(spans.len());
        for span in &spans {
            let chunk = NoteChunk::new(
                &path,
                span.heading.clone(),
                span.heading_level,
                span.start_line,
                span.text.clone(),
                created_at,
                modified_at,
                hash.clone(),
            );
            self.chunks.upsert_chunk(&chunk)?;
            self.chunks.replace_chunk_tags(&chunk.id, &tags)?;
            kept_ids.push(chunk.id.clone());
            outcome.chunks_written += 1;

            // Entity extraction failures never abort the document.
            let extraction = self.extractor.extract(&chunk.text);
            match self.entities.replace_mentions(&chunk.id, &extraction.mentions) {
                Ok(stored) => outcome.mentions += stored,
                Err(e) => {
                    tracing::warn!(%path, chunk = %chunk.id, error = %e, "entity extraction skipped");
                }
            }

            // A single failed embedding is logged and skipped.
            match self.embed_chunk(&record, span.heading.as_deref(), span.heading_level, &tags, &chunk) {
                Ok(()) => outcome.embedded += 1,
                Err(e) => {
                    tracing::warn!(%path, chunk = %chunk.id, error = %e, "embedding skipped");
                    outcome.embedding_failures += 1;
                }
            }
        }

        // Spans that no longer exist after an edit are removed; their
        // tags, mentions, and embeddings cascade away.
        outcome.chunks_removed = self.chunks.delete_chunks_for_path(&path, &kept_ids)?;

        tracing::info!(
            %path,
            chunks = outcome.chunks_written,
            removed = outcome.chunks_removed,
            embedded = outcome.embedded,
            "document ingested"
        );
        self.emit_completed(&outcome);
        Ok(outcome)
    }

    fn embed_chunk(
        &self,
        record: &FileRecord,
        heading: Option<&str>,
        heading_level: u8,
        tags: &[String],
        chunk: &NoteChunk,
    ) -> Result<()> {
        let vector = self.embedder.embed(&chunk.text)?;
        let metadata = EmbeddingMetadata {
            path: record.path.clone(),
            title: record.title.clone(),
            heading: heading.map(str::to_string),
            heading_level,
            tags: tags.to_vec(),
            frontmatter: record.frontmatter.clone(),
        };
        self.vectors.upsert(&chunk.id, &vector, None, &metadata)
    }

    fn emit_completed(&self, outcome: &IngestOutcome) {
        let Some(bus) = &self.bus else { return };
        let payload = match serde_json::to_value(outcome) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Payload::new(),
        };
        if let Err(e) = bus.publish(
            Publish::event(TOPIC_INGESTION_COMPLETED, payload).source("ingestion"),
        ) {
            tracing::warn!(error = %e, "failed to publish ingestion event");
        }
    }

    /// Ingests a batch of documents, fanning out up to the concurrency
    /// limit. Per-document failures are aggregated, never propagated.
    pub async fn ingest_batch(&self, requests: Vec<IngestRequest>) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let tasks = requests.into_iter().map(|request| {
            let semaphore = Arc::clone(&semaphore);
            let path = request.path.clone();
            async move {
                let permit = semaphore.acquire().await;
                let result = match permit {
                    Ok(_permit) => self.ingest(request).await,
                    Err(_) => Err(Error::Cancelled {
                        operation: format!("ingest {path}"),
                    }),
                };
                (path, result)
            }
        });

        let mut report = BatchReport::default();
        for (path, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(outcome) => {
                    if outcome.skipped {
                        report.skipped += 1;
                    } else {
                        report.successful += 1;
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(%path, error = %e, "document failed");
                    report.failed += 1;
                    report.errors.push(BatchError {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Lists a prefix on the object store and ingests every document.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing itself fails; per-document
    /// fetch and ingest failures land in the report.
    pub async fn ingest_prefix(
        &self,
        source: &dyn ObjectStore,
        prefix: &str,
        force_update: bool,
    ) -> Result<BatchReport> {
        let objects = source.list(prefix).await?;
        let mut requests = Vec::with_capacity(objects.len());
        let mut report = BatchReport::default();

        for info in objects {
            match source.get(&info.name).await {
                Ok(payload) => requests.push(IngestRequest {
                    path: info.name,
                    raw: payload.bytes,
                    etag: payload.etag,
                    modified_at: payload.modified,
                    force_update,
                }),
                Err(e) => {
                    tracing::error!(path = %info.name, error = %e, "fetch failed");
                    report.failed += 1;
                    report.errors.push(BatchError {
                        path: info.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        let batch = self.ingest_batch(requests).await;
        report.successful = batch.successful;
        report.skipped = batch.skipped;
        report.failed += batch.failed;
        report.errors.extend(batch.errors);
        report.outcomes = batch.outcomes;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DEFAULT_DIMENSIONS, HashEmbedder};
    use crate::store::Db;

    fn pipeline() -> IngestPipeline {
        let db = Db::in_memory_index().expect("db");
        IngestPipeline::new(
            ChunkStore::new(db.clone()),
            VectorIndex::new(db.clone()),
            EntityIndex::new(db),
            Arc::new(EntityExtractor::new().expect("extractor")),
            Arc::new(HashEmbedder::new(DEFAULT_DIMENSIONS)),
        )
    }

    fn request(path: &str, body: &str) -> IngestRequest {
        IngestRequest {
            path: path.to_string(),
            raw: body.as_bytes().to_vec(),
            etag: None,
            modified_at: Utc::now(),
            force_update: false,
        }
    }

    const DOC: &str = "---\ntitle: Note\ntags: [AI, ml]\n---\n# Intro\nA test.\n\n## Deep\nMore text.\n";

    #[tokio::test]
    async fn test_ingest_writes_chunks_tags_embeddings() {
        let pipeline = pipeline();
        let outcome = pipeline.ingest(request("n.md", DOC)).await.expect("ingest");

        assert!(!outcome.skipped);
        assert_eq!(outcome.chunks_written, 2);
        assert_eq!(outcome.tags, vec!["ai", "ml"]);
        assert_eq!(outcome.embedded, 2);
        assert_eq!(outcome.embedding_failures, 0);

        let chunks = pipeline.chunks.chunks_for_path("n.md").expect("chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading.as_deref(), Some("Intro"));
        assert_eq!(chunks[0].start_line, 2);
        assert_eq!(
            pipeline.chunks.tags_for_chunk(&chunks[0].id).expect("tags"),
            vec!["ai", "ml"]
        );
        assert_eq!(pipeline.vectors.count().expect("count"), 2);
    }

    #[tokio::test]
    async fn test_second_ingest_short_circuits() {
        let pipeline = pipeline();
        let first = pipeline.ingest(request("n.md", DOC)).await.expect("ingest");
        assert!(!first.skipped);

        let counts_before = pipeline.chunks.counts().expect("counts");
        let second = pipeline.ingest(request("n.md", DOC)).await.expect("ingest");
        assert!(second.skipped);
        assert_eq!(second.skip_reason.as_deref(), Some("unchanged"));
        assert_eq!(second.chunks_written, 0);

        let counts_after = pipeline.chunks.counts().expect("counts");
        assert_eq!(counts_before.chunks, counts_after.chunks);
    }

    #[tokio::test]
    async fn test_force_update_reingests() {
        let pipeline = pipeline();
        pipeline.ingest(request("n.md", DOC)).await.expect("ingest");

        let mut forced = request("n.md", DOC);
        forced.force_update = true;
        let outcome = pipeline.ingest(forced).await.expect("ingest");
        assert!(!outcome.skipped);
        assert_eq!(outcome.chunks_written, 2);
    }

    #[tokio::test]
    async fn test_edited_document_drops_stale_chunks() {
        let pipeline = pipeline();
        pipeline.ingest(request("n.md", DOC)).await.expect("ingest");

        let edited = "# Intro\nA test.\n";
        let outcome = pipeline
            .ingest(request("n.md", edited))
            .await
            .expect("ingest");
        assert_eq!(outcome.chunks_written, 1);
        assert_eq!(outcome.chunks_removed, 1);
        assert_eq!(pipeline.chunks.chunks_for_path("n.md").expect("chunks").len(), 1);
        // Embeddings of removed chunks cascade away.
        assert_eq!(pipeline.vectors.count().expect("count"), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_invalid_input() {
        let pipeline = pipeline();
        let request = IngestRequest {
            path: "bad.md".to_string(),
            raw: vec![0xff, 0xfe],
            etag: None,
            modified_at: Utc::now(),
            force_update: false,
        };
        let err = pipeline.ingest(request).await.expect_err("bad bytes");
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_batch_aggregates_outcomes() {
        let pipeline = pipeline();
        let requests = vec![
            request("a.md", DOC),
            request("b.md", "# Only\nBody.\n"),
            IngestRequest {
                path: "broken.md".to_string(),
                raw: vec![0xff],
                etag: None,
                modified_at: Utc::now(),
                force_update: false,
            },
        ];
        let report = pipeline.ingest_batch(requests).await;
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "broken.md");

        // Ingest the same two again: both skip.
        let report = pipeline
            .ingest_batch(vec![request("a.md", DOC), request("b.md", "# Only\nBody.\n")])
            .await;
        assert_eq!(report.successful, 0);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn test_ingest_emits_bus_event() {
        let bus = MessageBus::with_defaults();
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        bus.subscribe(
            "listener",
            TOPIC_INGESTION_COMPLETED,
            Arc::new(move |message: crate::bus::Message| {
                let log = Arc::clone(&log);
                Box::pin(async move {
                    if let Ok(mut guard) = log.lock() {
                        guard.push(message.payload);
                    }
                    Ok(())
                })
            }),
        )
        .expect("subscribe");
        bus.start().expect("start");

        let pipeline = pipeline().with_bus(Arc::clone(&bus));
        pipeline.ingest(request("n.md", DOC)).await.expect("ingest");
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        bus.stop().await.expect("stop");

        let events = received.lock().expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("path").and_then(|v| v.as_str()), Some("n.md"));
    }
}
