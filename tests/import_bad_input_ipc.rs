use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_catalogd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn catalogd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

#[test]
fn malformed_sources_abort_with_nothing_persisted() {
    let workspace = temp_dir("catalogd-bad-input");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected.get("ok"), Some(&json!(true)));

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.importWorkbook",
        json!({ "path": workspace.join("nope.csv").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "not_found");

    // Two header rows instead of three.
    let short = workspace.join("short.csv");
    std::fs::write(&short, ",Kitchen\n,Knives\n").expect("write short csv");
    let bad_shape = request(
        &mut stdin,
        &mut reader,
        "3",
        "catalog.importWorkbook",
        json!({ "path": short.to_string_lossy() }),
    );
    assert_eq!(error_code(&bad_shape), "bad_shape");

    // No index column.
    let narrow = workspace.join("narrow.csv");
    std::fs::write(&narrow, "a\nb\nc\nd\n").expect("write narrow csv");
    let too_narrow = request(
        &mut stdin,
        &mut reader,
        "4",
        "catalog.importWorkbook",
        json!({ "path": narrow.to_string_lossy() }),
    );
    assert_eq!(error_code(&too_narrow), "bad_shape");

    let stats = request(&mut stdin, &mut reader, "5", "catalog.stats", json!({}));
    let result = stats.get("result").expect("stats result");
    assert_eq!(result.get("themes"), Some(&json!(0)));
    assert_eq!(result.get("names"), Some(&json!(0)));
    assert_eq!(result.get("importRuns"), Some(&json!(0)));

    // A good import still succeeds on the same connection afterwards.
    let good = workspace.join("good.csv");
    std::fs::write(&good, ",Kitchen\n,Kitchen - Knives\n,Knives\nChef Knife,x\n")
        .expect("write good csv");
    let imported = request(
        &mut stdin,
        &mut reader,
        "6",
        "catalog.importWorkbook",
        json!({ "path": good.to_string_lossy() }),
    );
    assert_eq!(imported.get("ok"), Some(&json!(true)));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn import_without_workspace_is_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "catalog.importWorkbook",
        json!({ "path": "/tmp/whatever.csv" }),
    );
    assert_eq!(error_code(&resp), "no_workspace");
}
