// Tests for validate -> scan -> record dispatch

use scriptsleuth_core::{CrawlArgs, Database, DispatchError, ValidationError, crawl, dispatch, validate};
use scriptsleuth_scanner::{ScanConfig, Scanner};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const BATCH: &str = "5f0c6f5e-8a2b-4d8e-9a57-0c1b2d3e4f50";

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

fn scanner() -> Scanner {
    Scanner::with_config(ScanConfig {
        timeout_secs: 2,
        ..ScanConfig::default()
    })
    .unwrap()
}

fn args_for(url: String) -> CrawlArgs {
    CrawlArgs {
        url: Some(url),
        batch: Some(BATCH.to_string()),
        terms: Some(vec!["fbq".to_string()]),
        domains: Some(vec!["127.0.0.1".to_string()]),
        tags: Some(vec!["smoke".to_string()]),
        rank: Some(3),
        ..CrawlArgs::default()
    }
}

async fn mount_page(server: &MockServer) {
    let html = r#"<html><head>
        <script src="/fbevents.js"></script>
        </head><body>
        <script>fbq('init', '1234')</script>
        </body></html>"#;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_bytes(html.as_bytes()),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fbevents.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("window.fbq = function() {}"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_dispatch_records_crawl() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server).await;
    let (_temp_dir, mut db) = create_test_db();

    let dispatched = dispatch(&scanner(), &mut db, args_for(format!("{}/", mock_server.uri())))
        .await
        .unwrap();

    let finding = &dispatched.result.terms["fbq"];
    assert_eq!(finding.inline_matches().len(), 1);
    assert_eq!(finding.remote_matches().len(), 1);

    let crawl = db.get_crawl(dispatched.crawl_id).unwrap().unwrap();
    assert_eq!(crawl.batch_uuid, BATCH);
    assert_eq!(crawl.rank, Some(3));

    assert_eq!(db.inline_matches_for_crawl(dispatched.crawl_id).unwrap().len(), 1);
    assert_eq!(db.remote_term_matches_for_crawl(dispatched.crawl_id).unwrap().len(), 1);
    assert_eq!(db.domain_matches_for_crawl(dispatched.crawl_id).unwrap().len(), 1);
    assert_eq!(db.tags_for_batch(BATCH).unwrap(), vec!["smoke"]);
}

#[tokio::test]
async fn test_invalid_args_skip_network_and_storage() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    let (_temp_dir, mut db) = create_test_db();

    let mut args = args_for(format!("{}/", mock_server.uri()));
    args.batch = Some("batch-1".to_string());
    let err = dispatch(&scanner(), &mut db, args).await.unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Validation(ValidationError::InvalidBatch(_))
    ));
    assert_eq!(db.crawl_count().unwrap(), 0);
}

#[tokio::test]
async fn test_page_failure_records_nothing() {
    let (_temp_dir, mut db) = create_test_db();

    let err = dispatch(&scanner(), &mut db, args_for("http://127.0.0.1:1/".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Scan { .. }));
    assert_eq!(db.crawl_count().unwrap(), 0);
}

#[tokio::test]
async fn test_crawl_without_storage() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server).await;

    let args = validate(args_for(format!("{}/", mock_server.uri()))).unwrap();
    let result = crawl(&scanner(), &args).await.unwrap();

    assert!(result.terms.contains_key("fbq"));
    assert_eq!(result.domains["127.0.0.1"].matches.len(), 1);
}
