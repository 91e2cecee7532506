use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map};
use std::collections::HashMap;

fn table_count(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
}

/// Read model for the back-portal editing table: the full hierarchy in
/// display order, every name, the association map, and the header span
/// counts the table needs to merge theme/subtheme cells.
fn handle_catalog_admin_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let themes = {
        let mut stmt = match conn.prepare("SELECT id, name FROM themes ORDER BY name") {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                Ok(json!({ "id": id, "name": name }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        match rows {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let subthemes = {
        let mut stmt = match conn.prepare(
            "SELECT s.id, s.theme_id, s.name, t.name
             FROM subthemes s
             JOIN themes t ON t.id = s.theme_id
             ORDER BY t.name, s.name",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let theme_id: String = row.get(1)?;
                let name: String = row.get(2)?;
                let theme_name: String = row.get(3)?;
                Ok(json!({
                    "id": id,
                    "themeId": theme_id,
                    "name": name,
                    "themeName": theme_name
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        match rows {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    // Categories drive the table columns; spans count categories per theme
    // and per (theme, subtheme) pair.
    let mut theme_spans: HashMap<String, i64> = HashMap::new();
    let mut subtheme_spans: HashMap<String, i64> = HashMap::new();
    let categories = {
        let mut stmt = match conn.prepare(
            "SELECT c.id, c.subtheme_id, c.name, s.name, t.name
             FROM categories c
             JOIN subthemes s ON s.id = c.subtheme_id
             JOIN themes t ON t.id = s.theme_id
             ORDER BY t.name, s.name, c.name",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let subtheme_id: String = row.get(1)?;
                let name: String = row.get(2)?;
                let subtheme_name: String = row.get(3)?;
                let theme_name: String = row.get(4)?;
                Ok((id, subtheme_id, name, subtheme_name, theme_name))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let rows = match rows {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };

        let mut out = Vec::with_capacity(rows.len());
        for (id, subtheme_id, name, subtheme_name, theme_name) in rows {
            *theme_spans.entry(theme_name.clone()).or_insert(0) += 1;
            *subtheme_spans
                .entry(format!("{}-{}", theme_name, subtheme_name))
                .or_insert(0) += 1;
            out.push(json!({
                "id": id,
                "subthemeId": subtheme_id,
                "name": name,
                "subthemeName": subtheme_name,
                "themeName": theme_name
            }));
        }
        out
    };

    let names = {
        let mut stmt = match conn.prepare("SELECT id, name FROM names ORDER BY name") {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                Ok(json!({ "id": id, "name": name }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        match rows {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let associations = {
        let mut stmt = match conn.prepare("SELECT name_id, category_id FROM name_categories") {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let pairs = stmt
            .query_map([], |row| {
                let name_id: String = row.get(0)?;
                let category_id: String = row.get(1)?;
                Ok((name_id, category_id))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let pairs = match pairs {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };

        let mut map: Map<String, serde_json::Value> = Map::new();
        for (name_id, category_id) in pairs {
            if let Some(arr) = map
                .entry(name_id)
                .or_insert_with(|| json!([]))
                .as_array_mut()
            {
                arr.push(json!(category_id));
            }
        }
        serde_json::Value::Object(map)
    };

    ok(
        &req.id,
        json!({
            "themes": themes,
            "subthemes": subthemes,
            "categories": categories,
            "names": names,
            "associations": associations,
            "themeSpans": theme_spans,
            "subthemeSpans": subtheme_spans
        }),
    )
}

fn handle_catalog_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut counts = Map::new();
    for (key, table) in [
        ("themes", "themes"),
        ("subthemes", "subthemes"),
        ("categories", "categories"),
        ("names", "names"),
        ("associations", "name_categories"),
        ("importRuns", "import_runs"),
    ] {
        match table_count(conn, table) {
            Ok(n) => {
                counts.insert(key.to_string(), json!(n));
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    ok(&req.id, serde_json::Value::Object(counts))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.adminTable" => Some(handle_catalog_admin_table(state, req)),
        "catalog.stats" => Some(handle_catalog_stats(state, req)),
        _ => None,
    }
}
