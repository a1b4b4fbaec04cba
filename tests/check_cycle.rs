//! End-to-end check cycles over a scratch friends directory, with the status
//! lookup service and the friend sites served by wiremock.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use friendlink::friends::{load_entities, FriendStatus};
use friendlink::status::{CheckError, CycleReport, ProbeStrategy, Prober, StatusChecker};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOOKUP_PATH: &str = "/api/status";

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    dir: tempfile::TempDir,
    lookup: MockServer,
    sites: MockServer,
}

impl Harness {
    async fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            lookup: MockServer::start().await,
            sites: MockServer::start().await,
        }
    }

    fn site_url(&self, name: &str) -> String {
        format!("{}/{}", self.sites.uri(), name)
    }

    fn write_friend(&self, id: &str, frontmatter: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(format!("{id}.md"));
        std::fs::write(&path, format!("---\n{frontmatter}\n---\n{body}")).unwrap();
        path
    }

    fn checker(&self, pace: Duration) -> StatusChecker {
        let prober = Prober::new(
            reqwest::Client::new(),
            vec![
                ProbeStrategy::StatusLookup {
                    endpoint: format!("{}{}", self.lookup.uri(), LOOKUP_PATH),
                    timeout: Duration::from_secs(2),
                },
                ProbeStrategy::DirectHead {
                    timeout: Duration::from_secs(2),
                },
            ],
        );
        StatusChecker::new(prober, self.dir.path(), pace)
    }

    /// Lookup answers "site returned `code`" for `site`.
    async fn lookup_reports(&self, site: &str, code: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(LOOKUP_PATH))
            .and(query_param("url", site))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 200, "data": code})),
            )
            .expect(times)
            .mount(&self.lookup)
            .await;
    }

    async fn site_answers(&self, name: &str, status: u16, times: u64) {
        Mock::given(method("HEAD"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(&self.sites)
            .await;
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Frontmatter lines of a document, without the delimiters.
fn block_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .skip(1)
        .take_while(|line| line.trim() != "---")
        .map(str::to_string)
        .collect()
}

fn managed_line<'a>(lines: &'a [String], key: &str) -> Option<&'a str> {
    lines
        .iter()
        .find(|l| l.starts_with(&format!("{key}:")))
        .map(String::as_str)
}

// ============================================================================
// Cycles
// ============================================================================

#[tokio::test]
async fn test_online_friend_is_reset() {
    let h = Harness::new().await;
    let site = h.site_url("alice");
    let path = h.write_friend(
        "alice",
        &format!("name: Alice\nwebsite: {site}\nstatus: 'inactive'\nfailedCount: 2"),
        "Hello from Alice\n",
    );
    h.lookup_reports(&site, "200", 1).await;
    h.site_answers("alice", 200, 0).await;

    let report = h.checker(Duration::ZERO).run_check_cycle().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.online, 1);

    let text = read(&path);
    let lines = block_lines(&text);
    assert_eq!(lines[0], "name: Alice");
    assert_eq!(managed_line(&lines, "status"), Some("status: 'active'"));
    assert_eq!(managed_line(&lines, "failedCount"), Some("failedCount: 0"));
    assert!(managed_line(&lines, "lastChecked").is_some());
    assert!(text.ends_with("---\nHello from Alice\n"));

    let entities = load_entities(h.dir.path()).await.unwrap();
    assert_eq!(entities[0].status, FriendStatus::Active);
    assert_eq!(entities[0].failed_count, 0);
    assert!(entities[0].last_checked.is_some());
}

#[tokio::test]
async fn test_direct_probe_rescues_unconfirmed_lookup() {
    let h = Harness::new().await;
    let site = h.site_url("bob");
    let path = h.write_friend("bob", &format!("name: Bob\nwebsite: {site}"), "");
    h.lookup_reports(&site, "0", 1).await;
    h.site_answers("bob", 301, 1).await;

    let report = h.checker(Duration::ZERO).run_check_cycle().await.unwrap();
    assert_eq!(report.online, 1);
    assert!(read(&path).contains("status: 'active'"));
}

#[tokio::test]
async fn test_offline_friend_accumulates_failures_until_hidden() {
    let h = Harness::new().await;
    let site = h.site_url("carol");
    let path = h.write_friend(
        "carol",
        &format!("name: Carol\nwebsite: {site}\nfailedCount: 1"),
        "body\n",
    );
    h.lookup_reports(&site, "503", 2).await;
    h.site_answers("carol", 503, 2).await;
    let checker = h.checker(Duration::ZERO);

    let report = checker.run_check_cycle().await.unwrap();
    assert_eq!(report.offline, 1);
    assert_eq!(report.hidden, 0);
    let lines = block_lines(&read(&path));
    assert_eq!(managed_line(&lines, "status"), Some("status: 'inactive'"));
    assert_eq!(managed_line(&lines, "failedCount"), Some("failedCount: 2"));
    assert_eq!(managed_line(&lines, "hidden"), None);

    let report = checker.run_check_cycle().await.unwrap();
    assert_eq!(report.hidden, 1);
    let lines = block_lines(&read(&path));
    assert_eq!(managed_line(&lines, "failedCount"), Some("failedCount: 3"));
    assert_eq!(managed_line(&lines, "hidden"), Some("hidden: true"));

    let entities = load_entities(h.dir.path()).await.unwrap();
    assert!(entities[0].hidden);
    assert_eq!(entities[0].failed_count, 3);
}

#[tokio::test]
async fn test_recovery_clears_hidden_flag() {
    let h = Harness::new().await;
    let site = h.site_url("dave");
    let path = h.write_friend(
        "dave",
        &format!("name: Dave\nwebsite: {site}\nstatus: 'inactive'\nfailedCount: 5\nhidden: true"),
        "",
    );
    h.lookup_reports(&site, "200", 1).await;

    h.checker(Duration::ZERO).run_check_cycle().await.unwrap();

    let lines = block_lines(&read(&path));
    assert_eq!(managed_line(&lines, "hidden"), None);
    assert_eq!(managed_line(&lines, "failedCount"), Some("failedCount: 0"));
}

#[tokio::test]
async fn test_friend_without_website_is_untouched() {
    let h = Harness::new().await;
    let original = "---\nname: Eve\nstatus: 'inactive'\n---\nNo site yet.\n";
    let doc = h.dir.path().join("eve.md");
    std::fs::write(&doc, original).unwrap();

    Mock::given(method("GET"))
        .and(path(LOOKUP_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.lookup)
        .await;

    let report = h.checker(Duration::ZERO).run_check_cycle().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.checked, 0);
    assert_eq!(read(&doc), original);
}

#[tokio::test]
async fn test_non_document_files_are_ignored() {
    let h = Harness::new().await;
    std::fs::write(h.dir.path().join("notes.txt"), "website: http://x").unwrap();
    std::fs::create_dir(h.dir.path().join("drafts.md")).unwrap();

    let report = h.checker(Duration::ZERO).run_check_cycle().await.unwrap();
    assert_eq!(report, CycleReport::default());
}

#[tokio::test]
async fn test_persist_failure_aborts_remaining_friends() {
    let h = Harness::new().await;
    let site = h.site_url("frank");
    let later = h.write_friend("later", &format!("name: Later\nwebsite: {site}"), "");
    let before = read(&later);

    h.lookup_reports(&site, "200", 1).await;

    let mut entities = load_entities(h.dir.path()).await.unwrap();
    let mut ghost = entities[0].clone();
    ghost.id = "ghost".into();
    ghost.path = h.dir.path().join("ghost.md");
    entities.insert(0, ghost);

    let err = h
        .checker(Duration::ZERO)
        .check_entities(&entities)
        .await
        .unwrap_err();

    match err {
        CheckError::Persist { friend, .. } => assert_eq!(friend, "ghost"),
        other => panic!("Expected Persist error, got {:?}", other),
    }
    assert_eq!(read(&later), before);
}

#[tokio::test]
async fn test_pacing_between_probed_friends() {
    let h = Harness::new().await;
    for id in ["a", "b"] {
        let site = h.site_url(id);
        h.write_friend(id, &format!("name: {id}\nwebsite: {site}"), "");
        h.lookup_reports(&site, "200", 1).await;
    }
    h.write_friend("c", "name: c", "");

    let started = Instant::now();
    let report = h
        .checker(Duration::from_millis(150))
        .run_check_cycle()
        .await
        .unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.skipped, 1);
    assert!(started.elapsed() >= Duration::from_millis(300));
}
