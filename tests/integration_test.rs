//! End-to-end integration tests.
//!
//! Exercises the full engine through the public API: ingest documents,
//! search them, link them, and drive workflows, plus binary smoke tests.

use assert_cmd::Command;
use chrono::Utc;
use notegraph::bus::{MessageBus, Payload};
use notegraph::index::EmbeddingMetadata;
use notegraph::ingest::IngestRequest;
use notegraph::model::{Entity, EntityLabel, LinkType, PendingStatus};
use notegraph::search::SearchRequest;
use notegraph::store::{DateField, FilterSpec};
use notegraph::workflow::{StepSpec, WorkflowStatus};
use notegraph::{Engine, MessagePriority};
use predicates::prelude::*;
use std::time::{Duration, Instant};

fn engine() -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = Engine::in_memory(dir.path()).expect("engine");
    (dir, engine)
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

#[tokio::test]
async fn ingest_then_search_finds_the_matching_section() {
    let (_dir, engine) = engine();
    let doc = "---\ntitle: Note\ntags: [AI, ml]\n---\n# Intro\nA test.\n\n## Deep\nMore text.\n";
    let outcome = engine
        .pipeline
        .ingest(request("note.md", doc))
        .await
        .expect("ingest");
    assert_eq!(outcome.chunks_written, 2);
    assert_eq!(outcome.tags, vec!["ai", "ml"]);

    let result = engine
        .retriever
        .search(&SearchRequest::query("test"))
        .expect("search");
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].heading.as_deref(), Some("Intro"));
    assert_eq!(result.results[0].start_line, 2);
}

#[tokio::test]
async fn oversized_section_splits_into_paragraph_chunks() {
    let (_dir, engine) = engine();
    let long = "x".repeat(1300);
    let doc = format!("# Big\nP1\n\n{long}\n\nP3\n");
    let outcome = engine
        .pipeline
        .ingest(request("big.md", &doc))
        .await
        .expect("ingest");
    assert_eq!(outcome.chunks_written, 3);

    let chunks = engine.chunks.chunks_for_path("big.md").expect("chunks");
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "P1");
    assert_eq!(chunks[0].start_line, 2);
    // The middle paragraph starts at its line offset within the section.
    assert_eq!(chunks[1].start_line, 4);
    assert_eq!(chunks[2].text, "P3");
    for chunk in &chunks {
        assert_eq!(chunk.heading.as_deref(), Some("Big"));
    }
}

#[tokio::test]
async fn tag_filters_distinguish_and_from_or() {
    let (_dir, engine) = engine();
    for (path, tags, body) in [
        ("one.md", "[ai]", "only ai here"),
        ("two.md", "[ai, ml]", "both tags here"),
        ("three.md", "[ml]", "only ml here"),
    ] {
        let doc = format!("---\ntags: {tags}\n---\n{body}\n");
        engine
            .pipeline
            .ingest(request(path, &doc))
            .await
            .expect("ingest");
    }

    let mut filters = FilterSpec::unfiltered();
    filters.until = Utc::now() + chrono::Duration::minutes(1);
    filters.tags = vec!["ai".to_string(), "ml".to_string()];

    filters.require_all = true;
    let hits = engine
        .chunks
        .fetch_candidates(&filters, DateField::Auto, 100)
        .expect("fetch");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "two.md");

    filters.require_all = false;
    let hits = engine
        .chunks
        .fetch_candidates(&filters, DateField::Auto, 100)
        .expect("fetch");
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn link_scores_combine_vector_and_entity_evidence() {
    let (_dir, engine) = engine();
    // Two chunks with controlled evidence: cosine 0.80 and one shared
    // entity at confidence 0.70.
    engine
        .pipeline
        .ingest(request("a.md", "alpha body text\n"))
        .await
        .expect("ingest");
    engine
        .pipeline
        .ingest(request("b.md", "beta body text\n"))
        .await
        .expect("ingest");
    let a = &engine.chunks.chunks_for_path("a.md").expect("chunks")[0];
    let b = &engine.chunks.chunks_for_path("b.md").expect("chunks")[0];

    engine
        .vectors
        .upsert(&a.id, &[1.0, 0.0, 0.0, 0.0], None, &EmbeddingMetadata::default())
        .expect("vector");
    engine
        .vectors
        .upsert(&b.id, &[0.8, 0.6, 0.0, 0.0], None, &EmbeddingMetadata::default())
        .expect("vector");

    let entity = Entity {
        text: "Quantum Computing".to_string(),
        label: EntityLabel::Technology,
        confidence: 0.7,
        description: None,
    };
    engine
        .entities
        .replace_mentions(&a.id, &[(entity.clone(), 0, 17)])
        .expect("mentions");
    engine
        .entities
        .replace_mentions(&b.id, &[(entity, 5, 22)])
        .expect("mentions");

    let report = engine.linking.link_chunk(&a.id).expect("link");
    assert_eq!(report.created, 1);

    // 0.6 * 0.80 + 0.4 * 0.70 = 0.76, which lands in the references band.
    let edge = engine
        .links
        .edge(&a.id, &b.id, LinkType::References)
        .expect("edge")
        .expect("present");
    assert!((edge.strength - 0.76).abs() < 1e-6);
    assert!(edge.rationale.contains("Vector similarity: 0.800"));
    assert!(edge.rationale.contains("Shared entity 'Quantum Computing': 0.700"));

    // Symmetric row with a reverse rationale.
    let mirror = engine
        .links
        .edge(&b.id, &a.id, LinkType::References)
        .expect("edge")
        .expect("present");
    assert!((mirror.strength - edge.strength).abs() < 1e-9);
    assert!(mirror.rationale.starts_with("Reverse of: "));
}

#[tokio::test]
async fn pending_link_approval_materializes_a_manual_edge() {
    let (_dir, engine) = engine();
    let id = engine
        .links
        .create_pending("s", "t", LinkType::Related, 0.55, "Shared entity 'X': 0.550")
        .expect("pending");

    let edge = engine.linking.approve_pending(id).expect("approve");
    assert_eq!(edge.strength, 0.55);
    assert!(engine
        .links
        .edge("s", "t", LinkType::Related)
        .expect("edge")
        .is_some());
    assert!(engine
        .links
        .edge("t", "s", LinkType::Related)
        .expect("edge")
        .is_some());
    assert!(engine.links.pending(PendingStatus::Pending).expect("list").is_empty());
}

#[tokio::test]
async fn dependent_wait_steps_complete_in_order_within_a_second() {
    let (_dir, engine) = engine();
    engine.start().expect("start");

    let wait = |name: &str| {
        StepSpec::new(name, "wait")
            .parameter("duration", serde_json::json!(0.1))
            .retries(0, 0)
    };
    let id = engine
        .workflows
        .create_workflow(
            "chain",
            "three dependent waits",
            vec![
                wait("a"),
                wait("b").depends_on("a"),
                wait("c").depends_on("b"),
            ],
            "tester",
        )
        .expect("create");

    let started = Instant::now();
    let status = engine.workflows.run_workflow(&id).await.expect("run");
    assert_eq!(status, WorkflowStatus::Completed);
    assert!(started.elapsed() <= Duration::from_secs(1));

    let progress = engine.workflows.progress(&id).expect("progress");
    assert!((progress.progress - 100.0).abs() < f64::EPSILON);

    let workflow = engine
        .workflows
        .store()
        .load(&id)
        .expect("load")
        .expect("present");
    let completed: Vec<_> = workflow
        .steps
        .iter()
        .map(|s| s.completed_at.expect("completed"))
        .collect();
    assert!(completed[0] <= completed[1] && completed[1] <= completed[2]);

    engine.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn request_with_no_subscriber_times_out_cleanly() {
    let bus = MessageBus::with_defaults();
    bus.start().expect("start");

    let started = Instant::now();
    let response = bus
        .request(
            "q",
            Payload::new(),
            "tester",
            None,
            Duration::from_millis(200),
            MessagePriority::Normal,
        )
        .await
        .expect("request");

    assert!(response.is_none());
    assert!(started.elapsed() < Duration::from_millis(250));
    // The reply subscription was cleaned up.
    assert_eq!(bus.subscription_count().expect("count"), 0);
    bus.stop().await.expect("stop");
}

#[tokio::test]
async fn reingestion_short_circuits_without_writes() {
    let (_dir, engine) = engine();
    let doc = "# Only\nSome body.\n";
    let first = engine
        .pipeline
        .ingest(request("same.md", doc))
        .await
        .expect("ingest");
    assert!(!first.skipped);

    let embeddings_before = engine.vectors.count().expect("count");
    let second = engine
        .pipeline
        .ingest(request("same.md", doc))
        .await
        .expect("ingest");
    assert!(second.skipped);
    assert_eq!(second.skip_reason.as_deref(), Some("unchanged"));
    assert_eq!(engine.vectors.count().expect("count"), embeddings_before);
}

// ==================== Binary smoke tests ====================

fn write_corpus(dir: &std::path::Path) {
    std::fs::write(
        dir.join("note.md"),
        "---\ntitle: Note\ntags: [AI, ml]\n---\n# Intro\nA test.\n\n## Deep\nMore text.\n",
    )
    .expect("write");
}

#[test]
fn cli_init_ingest_search_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("index.db");
    let wf_db = dir.path().join("workflows.db");
    write_corpus(dir.path());

    let base = |cmd: &mut Command| {
        cmd.arg("--db-path")
            .arg(&db)
            .arg("--workflow-db-path")
            .arg(&wf_db)
            .arg("--notes-root")
            .arg(dir.path())
            .arg("--format")
            .arg("json");
    };

    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    base(&mut cmd);
    cmd.arg("init").assert().success();

    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    base(&mut cmd);
    cmd.arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"successful\": 1"));

    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    base(&mut cmd);
    cmd.args(["search", "--query", "test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"heading\": \"Intro\""))
        .stdout(predicate::str::contains("\"start_line\": 2"));

    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    base(&mut cmd);
    cmd.args(["answer", "--query", "what is a test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("citations"));

    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    base(&mut cmd);
    cmd.arg("facets")
        .assert()
        .success()
        .stdout(predicate::str::contains("top_tags"));

    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    base(&mut cmd);
    cmd.arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunks\": 2"));
}

#[test]
fn cli_unknown_date_field_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = Command::cargo_bin("notegraph").expect("binary");
    cmd.arg("--db-path")
        .arg(dir.path().join("index.db"))
        .arg("--workflow-db-path")
        .arg(dir.path().join("wf.db"))
        .arg("--notes-root")
        .arg(dir.path())
        .args(["search", "--query", "x", "--date-field", "bogus"])
        .assert()
        .failure();
}
