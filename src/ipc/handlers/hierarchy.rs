use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_themes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

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
        Ok(themes) => ok(&req.id, json!({ "themes": themes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subthemes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let theme_id = match req.params.get("themeId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing themeId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.name, t.name
         FROM subthemes s
         JOIN themes t ON t.id = s.theme_id
         WHERE s.theme_id = ?
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&theme_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let theme_name: String = row.get(2)?;
            Ok(json!({
                "id": id,
                "name": name,
                // Subtheme labels repeat across themes; the display form
                // carries the owning theme for disambiguation.
                "displayName": format!("{} - {}", theme_name, name)
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subthemes) => ok(&req.id, json!({ "subthemes": subthemes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_categories_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subtheme_id = match req.params.get("subthemeId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing subthemeId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT c.id, c.name, s.name, t.name
         FROM categories c
         JOIN subthemes s ON s.id = c.subtheme_id
         JOIN themes t ON t.id = s.theme_id
         WHERE c.subtheme_id = ?
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&subtheme_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let subtheme_name: String = row.get(2)?;
            let theme_name: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "displayName": format!("{} - {} - {}", theme_name, subtheme_name, name)
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(categories) => ok(&req.id, json!({ "categories": categories })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_names_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

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
        Ok(names) => ok(&req.id, json!({ "names": names })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_names_pick_random(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let category_id = match req.params.get("categoryId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing categoryId", None),
    };

    // An unknown category and an empty one both yield the explicit empty
    // result, never an error.
    let context = match conn
        .query_row(
            "SELECT c.name, s.name, t.name
             FROM categories c
             JOIN subthemes s ON s.id = c.subtheme_id
             JOIN themes t ON t.id = s.theme_id
             WHERE c.id = ?",
            [&category_id],
            |row| {
                let category: String = row.get(0)?;
                let subtheme: String = row.get(1)?;
                let theme: String = row.get(2)?;
                Ok((category, subtheme, theme))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((category, subtheme, theme)) = context else {
        return ok(&req.id, json!({ "name": null, "count": 0 }));
    };

    let count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM name_categories WHERE category_id = ?",
        [&category_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if count == 0 {
        return ok(&req.id, json!({ "name": null, "count": 0 }));
    }

    let picked = match conn
        .query_row(
            "SELECT n.id, n.name
             FROM names n
             JOIN name_categories nc ON nc.name_id = n.id
             WHERE nc.category_id = ?
             ORDER BY RANDOM()
             LIMIT 1",
            [&category_id],
            |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                Ok((id, name))
            },
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return ok(&req.id, json!({ "name": null, "count": 0 })),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "nameId": picked.0,
            "name": picked.1,
            "count": count,
            "theme": theme,
            "subtheme": subtheme,
            "category": category
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "themes.list" => Some(handle_themes_list(state, req)),
        "subthemes.list" => Some(handle_subthemes_list(state, req)),
        "categories.list" => Some(handle_categories_list(state, req)),
        "names.list" => Some(handle_names_list(state, req)),
        "names.pickRandom" => Some(handle_names_pick_random(state, req)),
        _ => None,
    }
}
