//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use catalog_harvest::config::{
    Config, CrawlerConfig, LocaleConfig, OutputConfig, SiteConfig, UserAgentConfig,
};
use catalog_harvest::crawler::{Coordinator, RunMode};
use catalog_harvest::output::{OutputResult, ProductSink};
use catalog_harvest::state::{PageKind, PageState};
use catalog_harvest::storage::{SqliteStorage, Storage};
use catalog_harvest::ProductRecord;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COOKIE: &str = "locality=%7B%22cityId%22%3A55%7D";

/// Collects every record it is handed
#[derive(Clone, Default)]
struct CollectingSink {
    records: Arc<Mutex<Vec<ProductRecord>>>,
    finished: Arc<Mutex<bool>>,
}

impl ProductSink for CollectingSink {
    fn accept(&mut self, record: &ProductRecord) -> OutputResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        *self.finished.lock().unwrap() = true;
        Ok(())
    }
}

/// Creates a test configuration for the mock shop
fn create_test_config(server: &MockServer, dir: &TempDir, start_path: &str) -> Config {
    let host = url::Url::parse(&server.uri())
        .unwrap()
        .host_str()
        .unwrap()
        .to_string();

    let mut cookies = BTreeMap::new();
    cookies.insert(
        "locality".to_string(),
        "%7B%22cityId%22%3A55%7D".to_string(),
    );

    Config {
        crawler: CrawlerConfig {
            max_concurrent_requests: 4,
            download_delay: 0,
            max_domain_requests: 100,
            max_retries: 2,
            retry_delay: 10,
            request_timeout: 5,
            rate_limit_cooldown: 50,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        site: SiteConfig {
            allowed_domains: vec![host],
            start_urls: vec![format!("{}{}", server.uri(), start_path)],
            obey_robots: false,
            cookies,
        },
        output: OutputConfig {
            database_path: db_path(dir),
            feed_path: Some(dir.path().join("products.jsonl").display().to_string()),
            summary_path: dir.path().join("summary.md").display().to_string(),
        },
        locale: LocaleConfig::default(),
    }
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("harvest.db").display().to_string()
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

fn product_page(rpc: &str, title: &str, listed: &str, promo: Option<&str>) -> String {
    let script = promo
        .map(|price| format!(r#"<script>window.product = {{specialPrice: {{price:"{}"}}}};</script>"#, price))
        .unwrap_or_default();

    format!(
        r#"<html><head>{script}</head><body>
        <span class="value">{rpc}</span>
        <div class="breadcrumbs"><span>Catalog</span><span> </span><span>Soap</span></div>
        <h1 class="title">{title}</h1>
        <div class="price-quantity-block"><div><meta itemprop="price" content="{listed}"></div></div>
        <meta itemprop="availability" content="https://schema.org/InStock">
        <div class="properties">
            <p class="property"><span class="title">Brand</span><span class="value"><a>Clean Co</a></span></p>
        </div>
        </body></html>"#
    )
}

async fn mount_shop(server: &MockServer) {
    let base = server.uri();

    // Page two of the listing, mounted first so it wins over the page one mock
    Mock::given(method("GET"))
        .and(path("/catalog/soap"))
        .and(query_param("page", "2"))
        .and(header("cookie", COOKIE))
        .respond_with(html(
            r#"<a class="title" href="/p/2">Shampoo</a>
               <a class="title" href="/p/3">Gone</a>
               <a class="pagination-next" href="javascript:void(0)">Next</a>
               <div class="pagination">
                   <a class="number" href="/catalog/soap">1</a>
                   <a class="number" href="/catalog/soap?page=2">2</a>
               </div>"#
                .to_string(),
        ))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/catalog/soap"))
        .and(header("cookie", COOKIE))
        .respond_with(html(format!(
            r#"<a class="title" href="/p/1">Soap</a>
               <a class="title" href="{base}/p/2#reviews">Shampoo</a>
               <a class="title" href="https://elsewhere.example.org/p/9">Offsite</a>
               <a class="pagination-next" href="?page=2">Next</a>
               <div class="pagination">
                   <a class="number" href="?page=2">2</a>
                   <a class="number" href="?page=3">3</a>
               </div>"#
        )))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(html(product_page("A-100", "Soap", "199.00", Some("149.00"))))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/2"))
        .respond_with(html(product_page("A-200", "Shampoo", "50.00", None)))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/3"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(server)
        .await;
}

fn page_state(storage: &SqliteStorage, url: &str) -> PageState {
    storage
        .get_page_by_url(url)
        .unwrap()
        .unwrap_or_else(|| panic!("{} was never recorded", url))
        .state
}

#[tokio::test]
async fn test_full_catalog_crawl() {
    let server = MockServer::start().await;
    mount_shop(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, "/catalog/soap");
    let feed_path = config.output.feed_path.clone().unwrap();

    let sink = CollectingSink::default();
    let mut coordinator = Coordinator::new(config, RunMode::Fresh, "test-hash")
        .unwrap()
        .with_sink(Box::new(sink.clone()));
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.listings_processed, 2);
    assert_eq!(report.products_extracted, 2);
    assert_eq!(report.pages_failed, 1);
    assert!(*sink.finished.lock().unwrap());

    let mut records = sink.records.lock().unwrap().clone();
    records.sort_by(|a, b| a.rpc.cmp(&b.rpc));
    assert_eq!(records.len(), 2);

    let soap = &records[0];
    assert_eq!(soap.url, format!("{}/p/1", server.uri()));
    assert_eq!(soap.title, "Soap");
    assert_eq!(soap.section, vec!["Catalog", "Soap"]);
    assert_eq!(soap.price.current, Some(149.0));
    assert_eq!(soap.price.original, Some(199.0));
    assert_eq!(soap.price.discount_label.as_deref(), Some("Discount 25.13%"));
    assert!(soap.stock.in_stock);
    assert_eq!(soap.variant_count, 1);

    let shampoo = &records[1];
    assert_eq!(shampoo.price.current, Some(50.0));
    assert_eq!(shampoo.price.original, Some(50.0));
    assert_eq!(shampoo.price.discount_label, None);

    // Pages: two listings and three products; the offsite link and page 3 never got a row
    let storage = SqliteStorage::new(Path::new(&db_path(&dir))).unwrap();
    assert_eq!(storage.count_total_pages().unwrap(), 5);
    assert_eq!(storage.count_pages_by_kind(PageKind::Listing).unwrap(), 2);
    assert_eq!(
        page_state(&storage, &format!("{}/p/3", server.uri())),
        PageState::DeadLink
    );
    assert!(storage
        .get_page_by_url(&format!("{}/catalog/soap?page=3", server.uri()))
        .unwrap()
        .is_none());
    assert!(storage
        .get_page_by_url("https://elsewhere.example.org/p/9")
        .unwrap()
        .is_none());

    assert_eq!(storage.count_products().unwrap(), 2);
    assert_eq!(storage.count_discounted_products().unwrap(), 1);
    assert!(storage.load_frontier().unwrap().is_empty());

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.id, report.run_id);
    assert_eq!(run.config_hash, "test-hash");
    assert!(run.finished_at.is_some());

    // The coordinator only writes the feed through sinks it was given
    assert!(!Path::new(&feed_path).exists());
}

#[tokio::test]
async fn test_crawl_writes_feed() {
    let server = MockServer::start().await;
    mount_shop(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, "/catalog/soap");
    let feed_path = config.output.feed_path.clone().unwrap();

    let report = catalog_harvest::crawler::crawl(config, "test-hash", Default::default())
        .await
        .unwrap();
    assert_eq!(report.products_extracted, 2);

    let feed = std::fs::read_to_string(&feed_path).unwrap();
    let titles: Vec<String> = feed
        .lines()
        .map(|line| serde_json::from_str::<ProductRecord>(line).unwrap().title)
        .collect();

    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Soap".to_string()));
    assert!(titles.contains(&"Shampoo".to_string()));
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /p/2"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(
            r#"<a class="title" href="/p/1">Soap</a>
               <a class="title" href="/p/2">Private</a>"#
                .to_string(),
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(html(product_page("A-100", "Soap", "10.00", None)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/2"))
        .respond_with(html(product_page("A-200", "Private", "10.00", None)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &dir, "/catalog");
    config.site.obey_robots = true;

    let mut coordinator = Coordinator::new(config, RunMode::Fresh, "test-hash").unwrap();
    let report = coordinator.run().await.unwrap();
    assert_eq!(report.products_extracted, 1);

    let storage = SqliteStorage::new(Path::new(&db_path(&dir))).unwrap();
    assert_eq!(
        page_state(&storage, &format!("{}/p/2", server.uri())),
        PageState::RobotsDenied
    );
    assert!(storage
        .get_product(&format!("{}/p/2", server.uri()))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(r#"<a class="title" href="/p/1">Soap</a>"#.to_string()))
        .mount(&server)
        .await;

    // First answer is a 429, the retry gets the page
    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(html(product_page("A-100", "Soap", "10.00", None)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, "/catalog");

    let mut coordinator = Coordinator::new(config, RunMode::Fresh, "test-hash").unwrap();
    let report = coordinator.run().await.unwrap();
    assert_eq!(report.products_extracted, 1);

    let storage = SqliteStorage::new(Path::new(&db_path(&dir))).unwrap();
    let page = storage
        .get_page_by_url(&format!("{}/p/1", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(page.state, PageState::Processed);
    assert_eq!(page.retry_count, 1);
}

#[tokio::test]
async fn test_content_type_handling() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(r#"<a class="title" href="/p/1.pdf">Leaflet</a>"#.to_string()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/1.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, "/catalog");

    let mut coordinator = Coordinator::new(config, RunMode::Fresh, "test-hash").unwrap();
    let report = coordinator.run().await.unwrap();
    assert_eq!(report.products_extracted, 0);

    let storage = SqliteStorage::new(Path::new(&db_path(&dir))).unwrap();
    assert_eq!(
        page_state(&storage, &format!("{}/p/1.pdf", server.uri())),
        PageState::ContentMismatch
    );
}

#[tokio::test]
async fn test_resume_requires_interrupted_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, "/catalog");

    assert!(Coordinator::new(config, RunMode::Resume, "test-hash").is_err());
}

#[tokio::test]
async fn test_auto_mode_resumes_interrupted_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(r#"<a class="title" href="/p/1">Soap</a>"#.to_string()))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/1"))
        .respond_with(html(product_page("A-100", "Soap", "10.00", None)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir, "/catalog");

    // A run that died while fetching /p/1, after the listing was processed
    let interrupted_run = {
        let mut storage = SqliteStorage::new(Path::new(&db_path(&dir))).unwrap();
        let run = storage.create_run("test-hash").unwrap();
        let listing = storage
            .insert_page_if_new(
                &format!("{}/catalog", server.uri()),
                "127.0.0.1",
                PageKind::Listing,
                run,
            )
            .unwrap()
            .unwrap();
        storage
            .update_page_state(listing, PageState::Processed, Some(200), Some("text/html"), None)
            .unwrap();
        let product = storage
            .insert_page_if_new(&format!("{}/p/1", server.uri()), "127.0.0.1", PageKind::Product, run)
            .unwrap()
            .unwrap();
        storage
            .update_page_state(product, PageState::Fetching, None, None, None)
            .unwrap();
        run
    };

    let mut coordinator = Coordinator::new(config, RunMode::Auto, "test-hash").unwrap();
    assert!(coordinator.is_resumed());
    assert_eq!(coordinator.run_id(), interrupted_run);

    let report = coordinator.run().await.unwrap();
    assert_eq!(report.listings_processed, 0);
    assert_eq!(report.products_extracted, 1);
}
