//! Integration tests for the harvester
//!
//! These tests use wiremock to serve listing pages and run whole jobs
//! end-to-end against temporary artifact, ledger and bucket directories.

use std::fs;
use std::path::{Path, PathBuf};
use story_harvest::archive::ArchiveError;
use story_harvest::config::{
    ArchiveConfig, BackoffConfig, Config, CrawlerConfig, OutputConfig, UserAgentConfig,
};
use story_harvest::crawler::{ArchiveOutcome, Coordinator, CrawlOutcome, JobOptions, RunDecision};
use story_harvest::output::read_artifact;
use story_harvest::storage::{RunStatus, Storage};
use story_harvest::{HarvestError, JobId};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "test_bucket";

/// Creates a test configuration rooted in `dir`
fn create_test_config(dir: &Path, batch_size: usize) -> Config {
    Config {
        crawler: CrawlerConfig {
            page_delay_ms: 0,
            batch_size,
            ..CrawlerConfig::default()
        },
        backoff: BackoffConfig {
            safety_margin_secs: 0,
            default_retry_after_secs: 0,
            max_consecutive_rate_limits: 3,
            ..BackoffConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            artifact_path: dir.join("story_metas.gz"),
            state_path: dir.join("harvest_state.db"),
            ..OutputConfig::default()
        },
        archive: ArchiveConfig {
            bucket: BUCKET.to_string(),
            store_root: dir.join("bucket"),
            credentials_path: dir.join("client_secrets.json"),
            work_dir: dir.join("work"),
            ..ArchiveConfig::default()
        },
    }
}

fn coordinator(config: &Config, id: &str) -> Coordinator {
    Coordinator::new(
        config.clone(),
        "test-hash".to_string(),
        JobId::parse(id).unwrap(),
    )
    .unwrap()
}

fn local_only(url: Url) -> JobOptions {
    JobOptions {
        fresh: false,
        upload: false,
        url_override: Some(url),
    }
}

fn works_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/works?tag_id=Poetry", server.uri())).unwrap()
}

fn object_path(config: &Config, name: &str) -> PathBuf {
    config.archive.store_root.join(BUCKET).join(name)
}

fn work(id: u32) -> String {
    format!(
        r#"<li role="article" class="work blurb group">
             <h4 class="heading"><a href="/works/{id}">Work {id}</a> by <a rel="author" href="/users/a{id}">a{id}</a></h4>
             <blockquote class="userstuff summary"><p>About {id}</p></blockquote>
             <dl class="stats">
               <dd class="language">English</dd>
               <dd class="words">1,000</dd>
               <dd class="chapters">1/1</dd>
               <dd class="kudos"><a href="/works/{id}#kudos">7</a></dd>
               <dd class="hits">99</dd>
             </dl>
           </li>"#,
        id = id
    )
}

fn listing(total_pages: u32, total_results: u64, items: &[String]) -> String {
    let nav = if total_pages > 1 {
        let links: String = (2..=total_pages)
            .map(|n| format!(r#"<li><a href="/works?page={n}">{n}</a></li>"#, n = n))
            .collect();
        format!(
            r#"<ol class="pagination actions" role="navigation">
                 <li><span class="current">1</span></li>{}
                 <li class="next"><a rel="next" href="/works?page=2">Next</a></li>
               </ol>"#,
            links
        )
    } else {
        String::new()
    };

    format!(
        r#"<html><body>
             <h3 class="heading">{} Found</h3>
             <ol class="work index group">{}</ol>
             {}
           </body></html>"#,
        total_results,
        items.join("\n"),
        nav
    )
}

/// Mounts a listing of `total_pages` pages with two works each
///
/// Page-specific mocks are mounted first so the catch-all only answers page 1.
async fn mount_pages(server: &MockServer, total_pages: u32, page_one_hits: u64) {
    let total = total_pages as u64 * 2;
    for page in 2..=total_pages {
        let items = [work(page * 10 + 1), work(page * 10 + 2)];
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("page", page.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(total_pages, total, &items)))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing(total_pages, total, &[work(11), work(12)])),
        )
        .expect(page_one_hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_single_page_job_flushes_once_and_archives() {
    let server = MockServer::start().await;
    mount_pages(&server, 1, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);

    // The job id resolves through a URL file in the bucket
    let url_dir = config.archive.store_root.join(BUCKET).join("urldir");
    fs::create_dir_all(&url_dir).unwrap();
    fs::write(url_dir.join("77.txt"), format!("{}\n", works_url(&server))).unwrap();

    let mut coordinator = coordinator(&config, "77");
    let outcome = coordinator.run(&JobOptions::default()).await.unwrap();

    let CrawlOutcome::Harvested(stats) = &outcome.crawl else {
        panic!("expected a crawl, got {:?}", outcome.crawl);
    };
    assert_eq!(stats.total_pages, 1);
    assert_eq!(stats.records_extracted, 2);
    assert_eq!(stats.flushes, 1);
    assert_eq!(
        outcome.archive,
        ArchiveOutcome::Uploaded {
            remote_path: "story_metas_77.gz".to_string()
        }
    );

    let rows = read_artifact(&config.output.artifact_path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "Work 11");
    assert_eq!(rows[0][2], "11");
    assert_eq!(rows[0][3], "a11");
    assert_eq!(rows[0][9], "0");

    let uploaded = object_path(&config, "story_metas_77.gz");
    assert_eq!(read_artifact(&uploaded).unwrap(), rows);

    let run = coordinator.storage().get_run(outcome.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Archived);
    assert_eq!(run.last_flushed_page, Some(1));
    assert_eq!(run.rows_written, 2);
    assert_eq!(run.flushes, 1);
}

#[tokio::test]
async fn test_archived_job_is_not_crawled_again() {
    let server = MockServer::start().await;
    mount_pages(&server, 1, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);
    let options = JobOptions {
        url_override: Some(works_url(&server)),
        ..JobOptions::default()
    };

    let first = coordinator(&config, "5").run(&options).await.unwrap();
    let second = coordinator(&config, "5").run(&options).await.unwrap();

    assert_eq!(second.run_id, first.run_id);
    assert!(matches!(second.crawl, CrawlOutcome::AlreadyHarvested));
    assert_eq!(second.archive, ArchiveOutcome::AlreadyArchived);
}

#[tokio::test]
async fn test_three_pages_flush_once_at_completion() {
    let server = MockServer::start().await;
    // Page 1 is fetched once and its content reused for its records
    mount_pages(&server, 3, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);

    let mut coordinator = coordinator(&config, "3");
    let outcome = coordinator.run(&local_only(works_url(&server))).await.unwrap();

    let CrawlOutcome::Harvested(stats) = &outcome.crawl else {
        panic!("expected a crawl");
    };
    assert_eq!(stats.pages_fetched, 3);
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.rows_written, 6);
    assert_eq!(stats.drift(), 0);
    assert_eq!(outcome.archive, ArchiveOutcome::Skipped);

    let rows = read_artifact(&config.output.artifact_path).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
    assert_eq!(ids, vec!["11", "12", "21", "22", "31", "32"]);

    let run = coordinator.storage().get_run(outcome.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_pages, Some(3));
    assert_eq!(run.total_results, Some(6));
}

#[tokio::test]
async fn test_flush_count_is_ceiling_of_rows_over_batch() {
    let server = MockServer::start().await;
    mount_pages(&server, 3, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 4);

    let outcome = coordinator(&config, "4")
        .run(&local_only(works_url(&server)))
        .await
        .unwrap();

    let CrawlOutcome::Harvested(stats) = &outcome.crawl else {
        panic!("expected a crawl");
    };
    // 6 rows in batches of 4
    assert_eq!(stats.flushes, 2);
    assert_eq!(read_artifact(&config.output.artifact_path).unwrap().len(), 6);
}

#[tokio::test]
async fn test_malformed_third_element_truncates_page() {
    let server = MockServer::start().await;
    let items = [
        work(1),
        work(2),
        r#"<li role="article"><a href="/works/3">Lonely link</a></li>"#.to_string(),
        work(4),
    ];
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(1, 4, &items)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);

    let outcome = coordinator(&config, "8")
        .run(&local_only(works_url(&server)))
        .await
        .unwrap();

    let CrawlOutcome::Harvested(stats) = &outcome.crawl else {
        panic!("expected a crawl");
    };
    assert_eq!(stats.truncated_pages, 1);
    assert_eq!(stats.drift(), -2);

    let rows = read_artifact(&config.output.artifact_path).unwrap();
    let titles: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(titles, vec!["Work 1", "Work 2"]);
}

#[tokio::test]
async fn test_empty_listing_yields_empty_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(1, 0, &[])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);

    let mut coordinator = coordinator(&config, "0");
    let outcome = coordinator.run(&local_only(works_url(&server))).await.unwrap();

    let CrawlOutcome::Harvested(stats) = &outcome.crawl else {
        panic!("expected a crawl");
    };
    assert_eq!(stats.flushes, 0);
    assert!(config.output.artifact_path.exists());
    assert!(read_artifact(&config.output.artifact_path).unwrap().is_empty());

    let run = coordinator.storage().get_run(outcome.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_failed_run_resumes_after_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Page 1 is fetched by both runs for its pagination metadata
    mount_pages(&server, 3, 2).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);
    let options = local_only(works_url(&server));

    let mut first = coordinator(&config, "12");
    let result = first.run(&options).await;
    assert!(matches!(
        result,
        Err(HarvestError::HttpStatus { status: 500, .. })
    ));

    let failed = first.storage().get_latest_run("12").unwrap().unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.last_flushed_page, Some(2));
    assert_eq!(failed.rows_written, 4);
    assert!(failed.error_message.is_some());
    drop(first);

    let mut second = coordinator(&config, "12");
    assert_eq!(
        second.decision(false).unwrap(),
        RunDecision::Resume {
            run_id: failed.id,
            start_page: 3
        }
    );
    let outcome = second.run(&options).await.unwrap();
    assert_eq!(outcome.run_id, failed.id);

    let rows = read_artifact(&config.output.artifact_path).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
    assert_eq!(ids, vec!["11", "12", "21", "22", "31", "32"]);

    let run = second.storage().get_run(failed.id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.last_flushed_page, Some(3));
    assert_eq!(run.rows_written, 6);
    assert_eq!(run.flushes, 3);
}

#[tokio::test]
async fn test_resume_drops_torn_tail_after_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_pages(&server, 3, 2).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 2);
    let options = local_only(works_url(&server));
    let artifact = config.output.artifact_path.clone();

    let mut first = coordinator(&config, "12");
    assert!(first.run(&options).await.is_err());
    let failed = first.storage().get_latest_run("12").unwrap().unwrap();
    let checkpoint = failed.artifact_bytes.unwrap();
    assert_eq!(fs::metadata(&artifact).unwrap().len(), checkpoint);
    drop(first);

    // A crash mid-flush leaves the start of a gzip member behind
    let mut bytes = fs::read(&artifact).unwrap();
    bytes.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x4b]);
    fs::write(&artifact, &bytes).unwrap();
    assert!(read_artifact(&artifact).is_err());

    let mut second = coordinator(&config, "12");
    second.run(&options).await.unwrap();

    let rows = read_artifact(&artifact).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
    assert_eq!(ids, vec!["11", "12", "21", "22", "31", "32"]);

    let run = second.storage().get_run(failed.id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.artifact_bytes,
        Some(fs::metadata(&artifact).unwrap().len())
    );
}

#[tokio::test]
async fn test_stop_signal_interrupts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);

    let mut coordinator = coordinator(&config, "21");
    coordinator.stop_signal().request_stop();
    let result = coordinator.run(&local_only(works_url(&server))).await;

    assert!(matches!(result, Err(HarvestError::Cancelled { next_page: 1 })));
    let run = coordinator.storage().get_latest_run("21").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_upload_conflict_keeps_local_artifact() {
    let server = MockServer::start().await;
    mount_pages(&server, 1, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);

    let existing = object_path(&config, "story_metas_9.gz");
    fs::create_dir_all(existing.parent().unwrap()).unwrap();
    fs::write(&existing, b"older upload").unwrap();

    let options = JobOptions {
        url_override: Some(works_url(&server)),
        ..JobOptions::default()
    };
    let mut coordinator = coordinator(&config, "9");
    let result = coordinator.run(&options).await;

    assert!(matches!(
        result,
        Err(HarvestError::Archive(ArchiveError::UploadConflict { .. }))
    ));
    assert_eq!(fs::read(&existing).unwrap(), b"older upload");
    assert_eq!(read_artifact(&config.output.artifact_path).unwrap().len(), 2);

    // The crawl stays complete, so a rerun only retries archival
    let run = coordinator.storage().get_latest_run("9").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        coordinator.decision(false).unwrap(),
        RunDecision::ArchiveOnly {
            run_id: run.id,
            mark_completed: false
        }
    );
}

#[tokio::test]
async fn test_fresh_run_replaces_artifact() {
    let server = MockServer::start().await;
    mount_pages(&server, 1, 2).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 100);
    let options = local_only(works_url(&server));

    coordinator(&config, "6").run(&options).await.unwrap();
    let fresh = JobOptions {
        fresh: true,
        ..options
    };
    let outcome = coordinator(&config, "6").run(&fresh).await.unwrap();

    assert!(matches!(outcome.crawl, CrawlOutcome::Harvested(_)));
    assert_eq!(read_artifact(&config.output.artifact_path).unwrap().len(), 2);
}
