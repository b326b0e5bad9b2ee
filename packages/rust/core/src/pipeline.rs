//! End-to-end `generate` pipeline: URL → crawl → index → capability
//! registry → external servers → staged generation → final document.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, instrument, warn};
use url::Url;

use sitescribe_capabilities::{
    AnalysisFn, Capability, CapabilityRegistry, servers,
};
use sitescribe_crawler::{CrawlOptions, Crawler};
use sitescribe_engine::{GenerationBackend, PipelineEngine, RetryPolicy};
use sitescribe_indexer::IndexBuilder;
use sitescribe_shared::{Result, ServerConfig, StoreId};
use sitescribe_storage::Storage;

use crate::stages;

/// Configuration for one document pipeline run.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Site to ingest.
    pub url: Url,
    /// Human-readable site/company name.
    pub name: String,
    /// Optional topic hint; without one the topic stage chooses.
    pub topic_hint: Option<String>,
    /// Output language for the document.
    pub language: String,
    /// Root directory for the content-store database.
    pub output_root: PathBuf,
    /// Crawl tuning.
    pub crawl: CrawlOptions,
    /// Maximum results per index query.
    pub index_max_results: usize,
    /// Backend retry policy.
    pub retry: RetryPolicy,
    /// External capability servers.
    pub servers: Vec<ServerConfig>,
}

/// Result of a completed document pipeline run.
#[derive(Debug)]
pub struct DocumentRun {
    /// The generated document.
    pub document: String,
    /// Handle of the content store built for this run.
    pub store_id: StoreId,
    /// Number of pages indexed.
    pub page_count: usize,
    /// External servers attempted.
    pub servers_configured: usize,
    /// External servers that actually connected. Fewer than configured
    /// means the run proceeded with reduced capabilities.
    pub servers_connected: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
}

impl DocumentRun {
    /// True when some configured server did not make it into the run.
    pub fn degraded(&self) -> bool {
        self.servers_connected < self.servers_configured
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &DocumentRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &DocumentRun) {}
}

/// Run the full document pipeline.
///
/// 1. Crawl the site into a corpus
/// 2. Build the content index
/// 3. Assemble the capability registry (index + servers)
/// 4. Connect external servers (failures degrade, never abort)
/// 5. Run the stage plan
/// 6. Clean up servers — on the failure path too
#[instrument(skip_all, fields(url = %config.url, name = %config.name))]
pub async fn run_document_pipeline(
    config: &DocumentConfig,
    backend: &dyn GenerationBackend,
    progress: &dyn ProgressReporter,
) -> Result<DocumentRun> {
    let start = Instant::now();

    // --- Phase 1: Crawl ---
    progress.phase("Crawling site");
    let crawler = Crawler::new(config.crawl.clone())?;
    let (corpus, crawl_summary) = crawler.crawl(&config.url).await?;
    info!(
        pages = crawl_summary.pages_collected,
        skipped = crawl_summary.pages_skipped,
        "corpus collected"
    );

    // --- Phase 2: Index ---
    progress.phase("Building content index");
    let db_path = config
        .output_root
        .join("indexes")
        .join("sitescribe.db");
    let storage = Storage::open(&db_path).await?;
    let page_count = corpus.len();
    let store_id = IndexBuilder::new(&storage).build(&corpus, &config.name).await?;

    // --- Phase 3: Capability registry ---
    let registry = CapabilityRegistry::new(vec![
        Capability::network_search(),
        Capability::local_function(AnalysisFn::KeywordDensity),
        Capability::local_function(AnalysisFn::ReadingEase),
    ]);
    // The editor works on finished text; it gets the analysis functions but
    // not web search.
    registry
        .register_stage(
            "editor",
            vec![
                Capability::local_function(AnalysisFn::KeywordDensity),
                Capability::local_function(AnalysisFn::ReadingEase),
            ],
        )
        .await;
    registry.set_index(&store_id, config.index_max_results).await;

    // --- Phase 4: External servers ---
    progress.phase("Connecting external servers");
    let connections = servers::instantiate(&config.servers);
    let servers_configured = connections.len();
    let connected = servers::connect_all(connections).await;
    let servers_connected = connected.len();

    if servers_connected < servers_configured {
        warn!(
            configured = servers_configured,
            connected = servers_connected,
            "running with reduced capabilities"
        );
    }
    registry.set_external_servers(&connected.views()).await;

    // --- Phase 5: Generation ---
    progress.phase("Generating document");
    let plan = stages::document_plan(&config.language);
    let brief = json!({
        "site": config.url.as_str(),
        "name": config.name,
        "topic_hint": config.topic_hint,
        "language": config.language,
    });

    let engine = PipelineEngine::new(config.retry.clone());
    let outcome = engine.run(&plan, backend, &registry, "brief", brief).await;

    // --- Phase 6: Server cleanup, on both the success and failure path ---
    progress.phase("Cleaning up external servers");
    let cleanup_outcomes = connected.cleanup().await;
    for (name, result) in &cleanup_outcomes {
        if let Err(e) = result {
            warn!(server = %name, error = %e, "server cleanup failed");
        }
    }

    let final_value = outcome?;
    let document = match final_value.as_str() {
        Some(text) => text.to_string(),
        None => final_value.to_string(),
    };

    let run = DocumentRun {
        document,
        store_id,
        page_count,
        servers_configured,
        servers_connected,
        elapsed: start.elapsed(),
    };

    progress.done(&run);

    info!(
        store = %run.store_id,
        pages = run.page_count,
        servers_connected = run.servers_connected,
        servers_configured = run.servers_configured,
        elapsed_ms = run.elapsed.as_millis(),
        "document pipeline complete"
    );

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitescribe_engine::{BackendError, GenerationRequest, GenerationResponse};
    use sitescribe_shared::ServerKind;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Deterministic stub: echoes the stage instructions' first word plus
    /// the names of the inputs and capabilities it was handed.
    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> std::result::Result<GenerationResponse, BackendError> {
            let head = request.instructions.split_whitespace().next().unwrap_or("");
            let inputs: Vec<&str> = request.inputs.keys().map(String::as_str).collect();
            let caps: Vec<&str> = request.capabilities.iter().map(|c| c.name.as_str()).collect();
            Ok(GenerationResponse {
                text: format!("{head}({})[{}]", inputs.join(","), caps.join(",")),
                tokens_in: 0,
                tokens_out: 0,
                model: "echo".into(),
                latency_ms: 0,
            })
        }
    }

    async fn mock_site() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><main><h1>Acme</h1><p>We build widgets.</p>
                <a href="/about">About</a></main></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><main><p>Founded long ago.</p></main></body></html>",
            ))
            .mount(&server)
            .await;
        server
    }

    fn test_config(site: &MockServer, servers: Vec<ServerConfig>) -> DocumentConfig {
        DocumentConfig {
            url: Url::parse(&site.uri()).unwrap(),
            name: "Acme".into(),
            topic_hint: Some("widgets".into()),
            language: "en".into(),
            output_root: std::env::temp_dir().join(format!("ss_core_test_{}", Uuid::now_v7())),
            crawl: CrawlOptions {
                limit: 10,
                concurrency: 2,
                timeout: Duration::from_secs(5),
            },
            index_max_results: 4,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            servers,
        }
    }

    #[tokio::test]
    async fn end_to_end_with_stub_backend() {
        let site = mock_site().await;
        let config = test_config(&site, vec![]);

        let run = run_document_pipeline(&config, &EchoBackend, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(run.page_count, 2);
        assert_eq!(run.servers_configured, 0);
        assert!(!run.degraded());
        // The final artifact came from the editor stage, whose only input
        // is the selection, and whose capability set is the editor override
        // plus the index binding.
        assert!(run.document.starts_with("Polish(selection)"));
        assert!(run.document.contains("keyword_density"));
        assert!(run.document.contains("index_query"));
        assert!(!run.document.contains("network_search"));

        let _ = std::fs::remove_dir_all(&config.output_root);
    }

    #[tokio::test]
    async fn degraded_run_proceeds_without_failed_servers() {
        let site = mock_site().await;
        let servers = vec![
            ServerConfig {
                name: "working".into(),
                kind: ServerKind::LocalProcess,
                command: Some("bash".into()),
                args: vec![
                    "-c".into(),
                    r#"echo '{"type":"ready"}'; read -r _; echo '{"type":"tools","tools":[{"name":"lookup"}]}'; read -r _; exit 0"#.into(),
                ],
                url: None,
                enabled: true,
            },
            ServerConfig {
                name: "broken".into(),
                kind: ServerKind::LocalProcess,
                command: Some("false".into()),
                args: vec![],
                url: None,
                enabled: true,
            },
        ];
        let config = test_config(&site, servers);

        let run = run_document_pipeline(&config, &EchoBackend, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(run.servers_configured, 2);
        assert_eq!(run.servers_connected, 1);
        assert!(run.degraded());

        let _ = std::fs::remove_dir_all(&config.output_root);
    }

    #[tokio::test]
    async fn unreachable_site_fails_the_run() {
        let site = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&site)
            .await;
        let config = test_config(&site, vec![]);

        let err = run_document_pipeline(&config, &EchoBackend, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, sitescribe_shared::SiteScribeError::RootFetch { .. }));

        let _ = std::fs::remove_dir_all(&config.output_root);
    }
}
