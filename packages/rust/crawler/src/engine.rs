//! Breadth-first frontier crawler.
//!
//! The crawler starts from a root URL, traverses same-host links in FIFO
//! order, and collects readability-filtered page text into a [`Corpus`].
//! Fetches run concurrently in bounded batches; frontier and corpus
//! mutations stay on the driving task so no URL is ever fetched twice.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use sitescribe_shared::{Corpus, MAX_PAGE_TEXT_LEN, Page, Result, SiteScribeError};

use crate::extract;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("SiteScribe/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options & summary
// ---------------------------------------------------------------------------

/// Crawl tuning knobs.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Stop once the corpus holds this many pages.
    pub limit: usize,
    /// Maximum concurrent in-flight fetches.
    pub concurrency: usize,
    /// Per-fetch timeout.
    pub timeout: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            limit: 30,
            concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Summary of a completed crawl, for logging and progress display.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Number of pages that made it into the corpus.
    pub pages_collected: usize,
    /// URLs dequeued but skipped (fetch failures, empty text).
    pub pages_skipped: usize,
    /// Total crawl duration.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Bounded, deduplicated breadth-first crawler.
pub struct Crawler {
    options: CrawlOptions,
    client: Client,
}

impl Crawler {
    /// Create a new crawler with the given options.
    pub fn new(options: CrawlOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(options.timeout)
            .build()
            .map_err(|e| SiteScribeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { options, client })
    }

    /// Crawl starting from `root`, returning the collected corpus.
    ///
    /// Fails with [`SiteScribeError::RootFetch`] only if the root page
    /// itself cannot be fetched; all other per-page failures are skipped.
    #[instrument(skip_all, fields(root = %root))]
    pub async fn crawl(&self, root: &Url) -> Result<(Corpus, CrawlSummary)> {
        let start = std::time::Instant::now();

        let root_host = root
            .host_str()
            .ok_or_else(|| SiteScribeError::validation(format!("root URL has no host: {root}")))?
            .to_string();

        let mut root_url = root.clone();
        root_url.set_fragment(None);

        // Frontier state. Lives on this task only; fetch tasks never touch it.
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<Url> = VecDeque::new();
        let mut corpus = Corpus::new();
        let mut pages_skipped = 0usize;

        info!(
            limit = self.options.limit,
            concurrency = self.options.concurrency,
            "starting crawl"
        );

        // The root page is fetched first and is the only fatal fetch.
        visited.insert(root_url.to_string());
        let root_html = fetch(&self.client, &root_url).await.map_err(|e| {
            SiteScribeError::RootFetch {
                url: root_url.to_string(),
                message: e.to_string(),
            }
        })?;
        self.absorb(
            &root_url, &root_html, &root_host, &mut corpus, &mut queue, &visited,
        );

        while corpus.len() < self.options.limit && !queue.is_empty() {
            // Dequeue-time dedup: duplicates may sit in the queue, but a URL
            // is handed to a fetch task at most once.
            let mut batch: Vec<Url> = Vec::new();
            while batch.len() < self.options.concurrency {
                let Some(url) = queue.pop_front() else { break };
                let key = url.to_string();
                if visited.contains(&key) {
                    continue;
                }
                visited.insert(key);
                batch.push(url);
            }

            if batch.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for url in batch {
                let client = self.client.clone();
                handles.push(tokio::spawn(async move {
                    let result = fetch(&client, &url).await;
                    (url, result)
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok((url, Ok(html))) => {
                        self.absorb(&url, &html, &root_host, &mut corpus, &mut queue, &visited);
                    }
                    Ok((url, Err(e))) => {
                        debug!(%url, error = %e, "page fetch failed, skipping");
                        pages_skipped += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "fetch task failed, skipping");
                        pages_skipped += 1;
                    }
                }
            }
        }

        let summary = CrawlSummary {
            pages_collected: corpus.len(),
            pages_skipped,
            duration: start.elapsed(),
        };

        info!(
            pages_collected = summary.pages_collected,
            pages_skipped = summary.pages_skipped,
            duration_ms = summary.duration.as_millis(),
            "crawl complete"
        );

        Ok((corpus, summary))
    }

    /// Fold a fetched page into the frontier: collect its text (if the
    /// corpus still has room) and enqueue its same-host links.
    fn absorb(
        &self,
        url: &Url,
        html: &str,
        root_host: &str,
        corpus: &mut Corpus,
        queue: &mut VecDeque<Url>,
        visited: &HashSet<String>,
    ) {
        if corpus.len() < self.options.limit {
            if let Some(text) = extract::main_text(html) {
                let (text, truncated_at) = truncate_text(text);
                corpus.insert(Page {
                    url: url.to_string(),
                    text,
                    truncated_at,
                });
            }
        }

        for link in extract::links(html, url) {
            if link.scheme() != "http" && link.scheme() != "https" {
                continue;
            }
            if link.host_str() != Some(root_host) {
                continue;
            }
            // Known-visited URLs are not re-enqueued. The dequeue-time check
            // above remains the dedup enforcement point.
            if !visited.contains(link.as_str()) {
                queue.push_back(link);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fetching & truncation
// ---------------------------------------------------------------------------

/// Fetch a single page body as text.
async fn fetch(client: &Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| SiteScribeError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteScribeError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| SiteScribeError::Network(format!("{url}: body read failed: {e}")))
}

/// Truncate page text to [`MAX_PAGE_TEXT_LEN`] characters on a char
/// boundary, recording the cut point.
fn truncate_text(text: String) -> (String, Option<usize>) {
    if text.len() <= MAX_PAGE_TEXT_LEN {
        return (text, None);
    }

    let mut cut = MAX_PAGE_TEXT_LEN;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    (text[..cut].to_string(), Some(cut))
}

#[cfg(test)]
mod crawler_tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(body.to_string())
    }

    fn options(limit: usize) -> CrawlOptions {
        CrawlOptions {
            limit,
            concurrency: 2,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let short = "short".to_string();
        assert_eq!(truncate_text(short.clone()), (short, None));

        // Multi-byte char straddling the limit must not split.
        let mut long = "a".repeat(MAX_PAGE_TEXT_LEN - 1);
        long.push('é');
        long.push_str("tail");
        let (text, cut) = truncate_text(long);
        assert_eq!(cut, Some(MAX_PAGE_TEXT_LEN - 1));
        assert!(text.is_char_boundary(text.len()));
        assert!(!text.contains("tail"));
    }

    #[tokio::test]
    async fn single_page_site_yields_one_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                "<html><body><main><p>Only page.</p></main></body></html>",
            ))
            .mount(&server)
            .await;

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, summary) = crawler.crawl(&root).await.unwrap();

        assert_eq!(corpus.len(), 1);
        assert!(corpus.contains(root.as_str()));
        assert_eq!(summary.pages_collected, 1);
    }

    #[tokio::test]
    async fn link_cycle_terminates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                r#"<html><body><main><p>A.</p><a href="/b">B</a></main></body></html>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(page(
                r#"<html><body><main><p>B.</p><a href="/">A</a></main></body></html>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, _) = crawler.crawl(&root).await.unwrap();

        // Terminates, and neither page is fetched twice (expect(1) above).
        assert_eq!(corpus.len(), 2);
    }

    #[tokio::test]
    async fn limit_bounds_the_corpus() {
        let server = MockServer::start().await;
        let links: String = (1..=5).map(|i| format!(r#"<a href="/p{i}">p{i}</a>"#)).collect();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(&format!(
                "<html><body><main><p>Index.</p>{links}</main></body></html>"
            )))
            .mount(&server)
            .await;
        for i in 1..=5 {
            Mock::given(method("GET"))
                .and(path(format!("/p{i}")))
                .respond_with(page(&format!(
                    "<html><body><main><p>Page {i}.</p></main></body></html>"
                )))
                .mount(&server)
                .await;
        }

        let crawler = Crawler::new(options(3)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, _) = crawler.crawl(&root).await.unwrap();

        assert_eq!(corpus.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_links_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                r#"<html><body><main><p>Index.</p>
                <a href="/dup">one</a><a href="/dup">two</a><a href="/dup">three</a>
                </main></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dup"))
            .respond_with(page(
                "<html><body><main><p>Dup target.</p></main></body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, _) = crawler.crawl(&root).await.unwrap();

        assert_eq!(corpus.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_root_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let err = crawler.crawl(&root).await.unwrap_err();

        assert!(matches!(err, SiteScribeError::RootFetch { .. }));
    }

    #[tokio::test]
    async fn failed_page_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                r#"<html><body><main><p>Index.</p>
                <a href="/missing">missing</a><a href="/ok">ok</a>
                </main></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(page("<html><body><main><p>Fine.</p></main></body></html>"))
            .mount(&server)
            .await;
        // /missing is unmatched and 404s.

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, summary) = crawler.crawl(&root).await.unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(summary.pages_skipped, 1);
    }

    #[tokio::test]
    async fn offsite_links_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                r#"<html><body><main><p>Index.</p>
                <a href="https://elsewhere.example.com/page">offsite</a>
                </main></body></html>"#,
            ))
            .mount(&server)
            .await;

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, _) = crawler.crawl(&root).await.unwrap();

        assert_eq!(corpus.len(), 1);
    }

    #[tokio::test]
    async fn empty_pages_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(page(
                r#"<html><body><main><p>Index.</p><a href="/blank">blank</a></main></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blank"))
            .respond_with(page("<html><body><main></main></body></html>"))
            .mount(&server)
            .await;

        let crawler = Crawler::new(options(10)).unwrap();
        let root = Url::parse(&server.uri()).unwrap();
        let (corpus, _) = crawler.crawl(&root).await.unwrap();

        assert_eq!(corpus.len(), 1);
        assert!(!corpus.contains(&format!("{}blank", server.uri())));
    }
}
