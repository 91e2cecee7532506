use crate::catalog;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn outcome(created: bool) -> &'static str {
    if created {
        "created"
    } else {
        "ignored"
    }
}

fn label_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let raw = match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    };
    if raw.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(raw)
}

fn id_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

fn row_exists(
    conn: &Connection,
    req: &Request,
    table: &str,
    id: &str,
    what: &str,
) -> Result<bool, serde_json::Value> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    match conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
    {
        Ok(Some(_)) => Ok(true),
        Ok(None) => Err(err(
            &req.id,
            "not_found",
            format!("{} not found", what),
            Some(json!({ "id": id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_themes_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match label_param(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match catalog::get_or_create_theme(conn, &name) {
        Ok(up) => ok(
            &req.id,
            json!({ "themeId": up.id, "name": name, "outcome": outcome(up.created) }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_subthemes_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let theme_id = match id_param(req, "themeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match label_param(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = row_exists(conn, req, "themes", &theme_id, "theme") {
        return resp;
    }

    match catalog::get_or_create_subtheme(conn, &theme_id, &name) {
        Ok(up) => ok(
            &req.id,
            json!({
                "subthemeId": up.id,
                "themeId": theme_id,
                "name": name,
                "outcome": outcome(up.created)
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_categories_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subtheme_id = match id_param(req, "subthemeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match label_param(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = row_exists(conn, req, "subthemes", &subtheme_id, "subtheme") {
        return resp;
    }

    match catalog::get_or_create_category(conn, &subtheme_id, &name) {
        Ok(up) => ok(
            &req.id,
            json!({
                "categoryId": up.id,
                "subthemeId": subtheme_id,
                "name": name,
                "outcome": outcome(up.created)
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_names_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match label_param(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match catalog::get_or_create_name(conn, &name) {
        Ok(up) => ok(
            &req.id,
            json!({ "nameId": up.id, "name": name, "outcome": outcome(up.created) }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_associations_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name_id = match id_param(req, "nameId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let category_id = match id_param(req, "categoryId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let checked = match req.params.get("checked").and_then(|v| v.as_bool()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing checked", None),
    };
    if let Err(resp) = row_exists(conn, req, "names", &name_id, "name") {
        return resp;
    }
    if let Err(resp) = row_exists(conn, req, "categories", &category_id, "category") {
        return resp;
    }

    match catalog::toggle_association(conn, &name_id, &category_id, checked) {
        Ok(result) => ok(
            &req.id,
            json!({
                "nameId": name_id,
                "categoryId": category_id,
                "checked": checked,
                "outcome": result.as_str()
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_names_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name_id = match id_param(req, "nameId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match catalog::delete_name(conn, &name_id) {
        Ok(true) => ok(&req.id, json!({ "nameId": name_id, "outcome": "deleted" })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "name not found",
            Some(json!({ "id": name_id })),
        ),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_catalog_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    // Destructive; require the literal confirm token.
    let confirm = req.params.get("confirm").and_then(|v| v.as_str());
    if confirm != Some("reset") {
        return err(
            &req.id,
            "bad_params",
            "catalog.reset requires confirm: \"reset\"",
            None,
        );
    }

    match catalog::reset_catalog(conn) {
        Ok(()) => ok(&req.id, json!({ "reset": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "themes.add" => Some(handle_themes_add(state, req)),
        "subthemes.add" => Some(handle_subthemes_add(state, req)),
        "categories.add" => Some(handle_categories_add(state, req)),
        "names.add" => Some(handle_names_add(state, req)),
        "associations.toggle" => Some(handle_associations_toggle(state, req)),
        "names.delete" => Some(handle_names_delete(state, req)),
        "catalog.reset" => Some(handle_catalog_reset(state, req)),
        _ => None,
    }
}
