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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "request failed: {}",
        value
    );
    value.get("result").cloned().expect("result")
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

#[test]
fn adds_report_created_then_ignored() {
    let workspace = temp_dir("catalogd-admin-add");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "themes.add",
        json!({ "name": "Kitchen" }),
    );
    assert_eq!(first.get("outcome"), Some(&json!("created")));
    let theme_id = str_field(&first, "themeId");

    // Labels are normalized before the natural-key lookup.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "themes.add",
        json!({ "name": "  Kitchen  " }),
    );
    assert_eq!(again.get("outcome"), Some(&json!("ignored")));
    assert_eq!(str_field(&again, "themeId"), theme_id);

    let sub = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subthemes.add",
        json!({ "themeId": theme_id, "name": "Kitchen - Knives" }),
    );
    assert_eq!(sub.get("outcome"), Some(&json!("created")));
    let subtheme_id = str_field(&sub, "subthemeId");

    let cat = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "categories.add",
        json!({ "subthemeId": subtheme_id, "name": "Knives" }),
    );
    assert_eq!(cat.get("outcome"), Some(&json!("created")));
    let cat_again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "categories.add",
        json!({ "subthemeId": subtheme_id, "name": "Knives" }),
    );
    assert_eq!(cat_again.get("outcome"), Some(&json!("ignored")));
    assert_eq!(str_field(&cat_again, "categoryId"), str_field(&cat, "categoryId"));

    let name = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "names.add",
        json!({ "name": "Chef Knife" }),
    );
    assert_eq!(name.get("outcome"), Some(&json!("created")));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn validation_rejects_empty_labels_and_unknown_parents() {
    let workspace = temp_dir("catalogd-admin-validate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let empty = request(
        &mut stdin,
        &mut reader,
        "2",
        "themes.add",
        json!({ "name": "   " }),
    );
    assert_eq!(error_code(&empty), "bad_params");

    let missing_parent = request(
        &mut stdin,
        &mut reader,
        "3",
        "subthemes.add",
        json!({ "name": "Orphan" }),
    );
    assert_eq!(error_code(&missing_parent), "bad_params");

    let unknown_parent = request(
        &mut stdin,
        &mut reader,
        "4",
        "subthemes.add",
        json!({ "themeId": "no-such-theme", "name": "Orphan" }),
    );
    assert_eq!(error_code(&unknown_parent), "not_found");

    let unknown_category = request(
        &mut stdin,
        &mut reader,
        "5",
        "categories.add",
        json!({ "subthemeId": "no-such-subtheme", "name": "Orphan" }),
    );
    assert_eq!(error_code(&unknown_category), "not_found");

    // A rejected request leaves the store untouched.
    let stats = request_ok(&mut stdin, &mut reader, "6", "catalog.stats", json!({}));
    assert_eq!(stats.get("themes"), Some(&json!(0)));
    assert_eq!(stats.get("subthemes"), Some(&json!(0)));
    assert_eq!(stats.get("categories"), Some(&json!(0)));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn toggle_removes_exactly_one_pair_and_delete_cascades() {
    let workspace = temp_dir("catalogd-admin-toggle");
    let source = workspace.join("catalog.csv");
    std::fs::write(
        &source,
        ",Kitchen,Kitchen\n,Kitchen - Knives,Kitchen - Boards\n,Knives,Boards\nChef Knife,x,x\nEnd Grain Board,,x\n",
    )
    .expect("write csv");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.importWorkbook",
        json!({ "path": source.to_string_lossy() }),
    );

    let table = request_ok(&mut stdin, &mut reader, "3", "catalog.adminTable", json!({}));
    let names = table.get("names").and_then(|v| v.as_array()).expect("names");
    let chef_id = names
        .iter()
        .find(|n| n.get("name") == Some(&json!("Chef Knife")))
        .and_then(|n| n.get("id"))
        .and_then(|v| v.as_str())
        .expect("chef id")
        .to_string();
    let categories = table
        .get("categories")
        .and_then(|v| v.as_array())
        .expect("categories");
    let boards_id = categories
        .iter()
        .find(|c| c.get("name") == Some(&json!("Boards")))
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_str())
        .expect("boards id")
        .to_string();

    // Chef Knife is in both categories; untick Boards only.
    let off = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "associations.toggle",
        json!({ "nameId": chef_id, "categoryId": boards_id, "checked": false }),
    );
    assert_eq!(off.get("outcome"), Some(&json!("removed")));

    let off_again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "associations.toggle",
        json!({ "nameId": chef_id, "categoryId": boards_id, "checked": false }),
    );
    assert_eq!(off_again.get("outcome"), Some(&json!("ignored")));

    let stats = request_ok(&mut stdin, &mut reader, "6", "catalog.stats", json!({}));
    assert_eq!(stats.get("associations"), Some(&json!(2)));
    assert_eq!(stats.get("names"), Some(&json!(2)));

    let on = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "associations.toggle",
        json!({ "nameId": chef_id, "categoryId": boards_id, "checked": true }),
    );
    assert_eq!(on.get("outcome"), Some(&json!("created")));
    let on_again = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "associations.toggle",
        json!({ "nameId": chef_id, "categoryId": boards_id, "checked": true }),
    );
    assert_eq!(on_again.get("outcome"), Some(&json!("ignored")));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "names.delete",
        json!({ "nameId": chef_id }),
    );
    assert_eq!(deleted.get("outcome"), Some(&json!("deleted")));

    let missing = request(
        &mut stdin,
        &mut reader,
        "10",
        "names.delete",
        json!({ "nameId": chef_id }),
    );
    assert_eq!(error_code(&missing), "not_found");

    // Only End Grain Board and its single association remain.
    let stats = request_ok(&mut stdin, &mut reader, "11", "catalog.stats", json!({}));
    assert_eq!(stats.get("names"), Some(&json!(1)));
    assert_eq!(stats.get("associations"), Some(&json!(1)));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reset_requires_confirm_token_and_empties_the_catalog() {
    let workspace = temp_dir("catalogd-admin-reset");
    let source = workspace.join("catalog.csv");
    std::fs::write(
        &source,
        ",Kitchen\n,Kitchen - Knives\n,Knives\nChef Knife,x\n",
    )
    .expect("write csv");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "catalog.importWorkbook",
        json!({ "path": source.to_string_lossy() }),
    );

    let refused = request(&mut stdin, &mut reader, "3", "catalog.reset", json!({}));
    assert_eq!(error_code(&refused), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "catalog.reset",
        json!({ "confirm": "reset" }),
    );

    let stats = request_ok(&mut stdin, &mut reader, "5", "catalog.stats", json!({}));
    for key in [
        "themes",
        "subthemes",
        "categories",
        "names",
        "associations",
        "importRuns",
    ] {
        assert_eq!(stats.get(key), Some(&json!(0)), "{} not reset", key);
    }

    // A fresh import passes the guard again after a reset.
    let re = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "catalog.importWorkbook",
        json!({ "path": source.to_string_lossy() }),
    );
    assert_eq!(re.get("skippedExisting"), Some(&json!(false)));
    assert_eq!(re.get("createdThemes"), Some(&json!(1)));

    let _ = std::fs::remove_dir_all(workspace);
}
