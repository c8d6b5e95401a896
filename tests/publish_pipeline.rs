// Integration tests for the publish pipeline: identifier gate, per-target
// skip/success/failure classification, and the report written to disk.
// Network-facing cases run against a local one-shot HTTP listener.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread;

use serde_json::Value;

use audit_bucket::config::{AppConfig, Endpoint, PublishTargets};
use audit_bucket::identifiers::EnterpriseIdentifiers;
use audit_bucket::publish::{run_publish, PublishOutcome};

fn base_config() -> AppConfig {
    AppConfig {
        mail: None,
        sms: None,
        mdm: None,
        publish: PublishTargets::default(),
        enterprise: EnterpriseIdentifiers::default(),
        archive: None,
    }
}

fn gated_enterprise() -> EnterpriseIdentifiers {
    EnterpriseIdentifiers {
        uei: "UEI123456789".into(),
        cage: "1AB23".into(),
        ..EnterpriseIdentifiers::default()
    }
}

fn write_ledger(input: &Path) {
    let mut file = File::create(input.join("ledger.csv")).unwrap();
    writeln!(file, "message_id,from,amount,currency,subject").unwrap();
    writeln!(file, "m-1,vendor-a@example.com,100.5,USD,Invoice A").unwrap();
    writeln!(file, "m-2,vendor-b@example.com,,USD,Invoice B").unwrap();
    writeln!(file, "m-3,vendor-c@example.com,120.0,USD,Invoice C").unwrap();
}

fn read_report(input: &Path) -> Value {
    let raw = fs::read_to_string(input.join("integrations_report.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn read_http_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).unwrap();
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Accept exactly one request, answer with the given status/body, and hand
/// the captured request back through the join handle.
fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_http_request(&mut stream);
        let reason = match status {
            200 => "OK",
            500 => "Internal Server Error",
            _ => "Status",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
        request
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn missing_required_identifiers_abort_before_any_attempt() {
    let input = tempfile::tempdir().unwrap();
    write_ledger(input.path());
    // A configured target must still never be attempted: the URL points at a
    // listener that would panic the test if contacted.
    let mut config = base_config();
    config.publish.coupa = Some(Endpoint {
        url: "http://127.0.0.1:1/never".into(),
        key: "unused".into(),
    });

    let outcome = run_publish(&config, input.path()).await.unwrap();
    match outcome {
        PublishOutcome::MissingIdentifiers(missing) => {
            assert_eq!(missing, vec!["UEI", "CAGE_CODE"]);
        }
        other => panic!("expected MissingIdentifiers, got {other:?}"),
    }

    let report = read_report(input.path());
    assert_eq!(report["error"], "missing_identifiers");
    assert_eq!(report["missing"], serde_json::json!(["UEI", "CAGE_CODE"]));
    assert!(report["run_ts"].is_string());
    assert!(
        report.get("results").is_none(),
        "the gate error document and the full report are mutually exclusive"
    );

    let log = fs::read_to_string(input.path().join("integrations.log")).unwrap();
    assert!(log.contains("Aborting integrations"));
}

#[tokio::test]
async fn unconfigured_targets_are_reported_as_skipped() {
    let input = tempfile::tempdir().unwrap();
    let mut config = base_config();
    config.enterprise = gated_enterprise();

    let outcome = run_publish(&config, input.path()).await.unwrap();
    let PublishOutcome::Completed(report) = outcome else {
        panic!("gate should have passed");
    };
    assert_eq!(report.counts.ledger_rows, 0);

    let report = read_report(input.path());
    for target in ["coupa", "piee", "sam"] {
        assert_eq!(report["results"][target]["outcome"], "skipped");
    }

    let log = fs::read_to_string(input.path().join("integrations.log")).unwrap();
    assert!(log.contains("Skipping Coupa: credentials or URL not set"));
    assert!(log.contains("Skipping PIEE: credentials or URL not set"));
    assert!(log.contains("Skipping SAM.gov: credentials or URL not set"));
    // Recommended identifiers were absent: one warning, not a failure.
    assert!(log.contains("Warning: recommended enterprise identifiers missing"));
}

#[tokio::test]
async fn coupa_only_run_posts_and_marks_others_skipped() {
    let input = tempfile::tempdir().unwrap();
    write_ledger(input.path());
    let (url, server) = serve_once(200, r#"{"accepted":true}"#);

    let mut config = base_config();
    config.enterprise = gated_enterprise();
    config.publish.coupa = Some(Endpoint {
        url,
        key: "test-key".into(),
    });

    let outcome = run_publish(&config, input.path()).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Completed(_)));

    let request = server.join().unwrap();
    assert!(request.starts_with("POST "));
    assert!(request.to_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains("vendor-a@example.com"));
    assert!(request.contains("\"summary_ts\""));

    let report = read_report(input.path());
    assert_eq!(report["counts"]["ledger_rows"], 3);
    assert_eq!(report["results"]["coupa"]["outcome"], "success");
    assert_eq!(report["results"]["coupa"]["status"], 200);
    assert_eq!(report["results"]["piee"]["outcome"], "skipped");
    assert_eq!(report["results"]["sam"]["outcome"], "skipped");
    assert_eq!(report["enterprise"]["uei"], "UEI123456789");
}

#[tokio::test]
async fn piee_payload_aggregates_over_the_wire() {
    let input = tempfile::tempdir().unwrap();
    write_ledger(input.path());
    let (url, server) = serve_once(200, "{}");

    let mut config = base_config();
    config.enterprise = gated_enterprise();
    config.publish.piee = Some(Endpoint {
        url,
        key: "piee-key".into(),
    });

    run_publish(&config, input.path()).await.unwrap();

    let request = server.join().unwrap();
    assert!(request.contains("\"items_count\":3"));
    // The blank amount row contributes zero to the sum.
    assert!(request.contains("\"total_amount\":220.5"));
}

#[tokio::test]
async fn non_success_status_is_an_http_failure_and_the_run_still_completes() {
    let input = tempfile::tempdir().unwrap();
    write_ledger(input.path());
    let (url, server) = serve_once(500, "server error");

    let mut config = base_config();
    config.enterprise = gated_enterprise();
    config.publish.coupa = Some(Endpoint {
        url,
        key: "test-key".into(),
    });

    let outcome = run_publish(&config, input.path()).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Completed(_)));
    server.join().unwrap();

    let report = read_report(input.path());
    assert_eq!(report["results"]["coupa"]["outcome"], "http_failure");
    assert_eq!(report["results"]["coupa"]["status"], 500);
    assert_eq!(report["results"]["coupa"]["body"], "server error");
}

#[tokio::test]
async fn transport_failure_is_captured_into_the_target_result() {
    let input = tempfile::tempdir().unwrap();
    // Bind and immediately drop to get a port with nothing listening.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut config = base_config();
    config.enterprise = gated_enterprise();
    config.publish.sam = Some(Endpoint {
        url: format!("http://127.0.0.1:{port}/sam"),
        key: "sam-key".into(),
    });

    let outcome = run_publish(&config, input.path()).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Completed(_)));

    let report = read_report(input.path());
    assert_eq!(report["results"]["sam"]["outcome"], "transport_failure");
    assert!(report["results"]["sam"]["error"].is_string());
}
