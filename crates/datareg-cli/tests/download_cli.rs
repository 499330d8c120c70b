mod common;

use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use common::{datareg, registry_rows, sha256_hex, Fixture};
use predicates::prelude::*;
use tempfile::TempDir;

const PAYLOAD: &[u8] = b"0123456789";

#[test]
fn fresh_download_installs_and_records() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved: data/raw/test/f.bin (10 bytes"));

    let dest = tmp.path().join("data/raw/test/f.bin");
    assert_eq!(fs::read(&dest).unwrap(), PAYLOAD);

    let rows = registry_rows(tmp.path());
    assert_eq!(rows.len(), 1);
    let fields: Vec<&str> = rows[0].split(',').collect();
    assert_eq!(fields.len(), 8);
    assert_eq!(fields[0], "test");
    assert_eq!(fields[2], "data/raw/test/f.bin");
    assert_eq!(fields[3], sha256_hex(PAYLOAD));
    assert_eq!(fields[4], "10");
    assert_eq!(fields[6], "succeeded");

    // no temp files left next to the destination
    let entries: Vec<_> = fs::read_dir(dest.parent().unwrap()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn second_run_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);
    let url = server.url("f.bin");

    for _ in 0..2 {
        datareg(tmp.path())
            .args(["download", "--name", "test", "--dest-subdir", "raw", "--url", &url])
            .assert()
            .success();
    }

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url", &url])
        .arg("--sha256")
        .arg(sha256_hex(PAYLOAD).to_uppercase())
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "test is already present at data/raw/test/f.bin (sha256 {})",
            sha256_hex(PAYLOAD)
        )));

    assert_eq!(server.hits(), 1);
    assert_eq!(registry_rows(tmp.path()).len(), 1);
}

#[test]
fn hash_mismatch_installs_nothing() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .args(["--sha256", &"0".repeat(64)])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SHA-256 mismatch"));

    let dir = tmp.path().join("data/raw/test");
    assert!(!dir.join("f.bin").exists());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

    let rows = registry_rows(tmp.path());
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains(",failed,"));
    assert!(rows[0].contains(&sha256_hex(PAYLOAD)));
}

#[test]
fn not_found_is_not_retried() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::serve(vec![(404, b"nope".to_vec())]);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("missing.bin"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("404"));

    assert_eq!(server.hits(), 1);
    let rows = registry_rows(tmp.path());
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains(",failed,"));
    assert!(!tmp.path().join("data/raw/test/missing.bin").exists());
}

#[test]
fn server_error_then_success_retries() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::serve(vec![(503, b"busy".to_vec()), (200, PAYLOAD.to_vec())]);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "external", "--url"])
        .arg(server.url("f.bin"))
        .args(["--retry-base-ms", "1"])
        .assert()
        .success();

    assert_eq!(server.hits(), 2);
    assert_eq!(fs::read(tmp.path().join("data/external/test/f.bin")).unwrap(), PAYLOAD);
    assert_eq!(registry_rows(tmp.path()).len(), 1);
}

#[test]
fn retries_exhausted_exits_network() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::serve(vec![(503, b"busy".to_vec())]);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .args(["--max-attempts", "3"])
        .assert()
        .code(1);

    assert_eq!(server.hits(), 3);
}

#[test]
fn traversal_in_name_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);

    datareg(tmp.path())
        .args(["download", "--name", "../../etc", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .assert()
        .code(3);

    datareg(tmp.path())
        .args(["download", "--name", "ok", "--filename", "a/b.bin", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .assert()
        .code(3);

    assert_eq!(server.hits(), 0);
    assert!(!tmp.path().join("data/_registry.csv").exists());
}

#[test]
fn force_refetches_and_appends() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);
    let url = server.url("f.bin");

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url", &url])
        .assert()
        .success();
    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--force", "--url", &url])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved:"));

    assert_eq!(server.hits(), 2);
    let rows = registry_rows(tmp.path());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.contains(",succeeded,")));
}

#[test]
fn missing_file_is_fetched_again() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);
    let url = server.url("f.bin");

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url", &url])
        .assert()
        .success();
    fs::remove_file(tmp.path().join("data/raw/test/f.bin")).unwrap();
    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url", &url])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved:"));

    assert_eq!(server.hits(), 2);
    assert_eq!(registry_rows(tmp.path()).len(), 2);
}

#[test]
fn bearer_and_header_secrets_are_sent_not_recorded() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("secrets")).unwrap();
    fs::write(
        tmp.path().join("secrets/.env"),
        "# portal credentials\nPORTAL_TOKEN=tok-123\nexport PORTAL_KEY=\"key-456\"\n",
    )
    .unwrap();
    let server = Fixture::ok(PAYLOAD);

    datareg(tmp.path())
        .args(["-vv", "download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .args(["--bearer-secret", "PORTAL_TOKEN", "--header-secret", "X-Api-Key=PORTAL_KEY"])
        .assert()
        .success()
        .stderr(predicate::str::contains("tok-123").not())
        .stderr(predicate::str::contains("key-456").not());

    assert_eq!(server.header(0, "Authorization").as_deref(), Some("Bearer tok-123"));
    assert_eq!(server.header(0, "X-Api-Key").as_deref(), Some("key-456"));
    let registry = fs::read_to_string(tmp.path().join("data/_registry.csv")).unwrap();
    assert!(!registry.contains("tok-123"));
    assert!(!registry.contains("key-456"));
}

#[test]
fn unknown_secret_key_exits_local() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .args(["--bearer-secret", "NOT_THERE"])
        .assert()
        .code(3);
    assert_eq!(server.hits(), 0);
}

#[test]
fn invalid_expected_hash_exits_local() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);

    datareg(tmp.path())
        .args(["download", "--name", "test", "--dest-subdir", "raw", "--url"])
        .arg(server.url("f.bin"))
        .args(["--sha256", "not-a-hash"])
        .assert()
        .code(3);
    assert_eq!(server.hits(), 0);
}

#[test]
fn usage_errors_exit_local_and_help_succeeds() {
    let tmp = TempDir::new().unwrap();
    datareg(tmp.path())
        .args(["download", "--name", "x", "--url", "http://127.0.0.1:9/x", "--dest-subdir", "final"])
        .assert()
        .code(3);
    datareg(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("download"));
    datareg(tmp.path()).arg("--version").assert().success();
}

#[test]
fn concurrent_processes_write_whole_rows() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::ok(PAYLOAD);
    let bin = assert_cmd::cargo::cargo_bin("datareg");
    const N: usize = 6;

    let children: Vec<_> = (0..N)
        .map(|i| {
            std::process::Command::new(&bin)
                .arg("--root")
                .arg(tmp.path())
                .args(["download", "--dest-subdir", "raw", "--name"])
                .arg(format!("set{i}"))
                .arg("--url")
                .arg(server.url(&format!("f{i}.bin")))
                .env_remove("DATAREG_ROOT")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .unwrap()
        })
        .collect();
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    let text = fs::read_to_string(tmp.path().join("data/_registry.csv")).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("name,url,dest_path,sha256,size_bytes,timestamp_utc,status,http_etag")
    );
    let rows: Vec<_> = lines.collect();
    assert_eq!(rows.len(), N);
    for row in rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 8, "torn row: {row}");
        assert_eq!(fields[3], sha256_hex(PAYLOAD));
        assert_eq!(fields[6], "succeeded");
    }
    assert!(text.ends_with('\n'));
}

fn part_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with('.') && n.ends_with(".part"))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn killed_mid_body_leaves_no_destination_or_row() {
    let tmp = TempDir::new().unwrap();
    let server = Fixture::stalling(vec![b'x'; 256 * 1024], 4 * 1024 * 1024);
    let dir = tmp.path().join("data/raw/slow");

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("datareg"))
        .arg("--root")
        .arg(tmp.path())
        .args(["download", "--name", "slow", "--dest-subdir", "raw", "--url"])
        .arg(server.url("big.bin"))
        .env_remove("DATAREG_ROOT")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while part_files(&dir).is_empty() {
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("download never started streaming");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    child.kill().unwrap();
    child.wait().unwrap();

    assert!(!dir.join("big.bin").exists());
    assert!(registry_rows(tmp.path()).iter().all(|r| !r.contains(",succeeded,")));
    assert_eq!(part_files(&dir).len(), 1);

    datareg(tmp.path())
        .args(["clean", "--min-age-mins", "0", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 temp file(s)."));
    assert!(part_files(&dir).is_empty());
    assert!(!dir.join("big.bin").exists());
}
