use crate::catalog;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::workbook;
use serde_json::json;
use std::path::PathBuf;

fn handle_catalog_import_workbook(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let path = match req.params.get("path").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => return err(&req.id, "bad_params", "missing path", None),
    };
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if !path.is_file() {
        return err(
            &req.id,
            "not_found",
            "source file not found",
            Some(json!({ "path": path.to_string_lossy() })),
        );
    }

    let grid = match workbook::read_grid(&path) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "workbook_read_failed",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };

    let matrix = match workbook::build_matrix(grid) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_shape",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };

    let source_file = path.to_string_lossy().to_string();
    match catalog::import_matrix(conn, &matrix, &source_file, force) {
        Ok(s) => ok(
            &req.id,
            json!({
                "skippedExisting": s.skipped_existing,
                "createdThemes": s.created_themes,
                "createdSubthemes": s.created_subthemes,
                "createdCategories": s.created_categories,
                "createdNames": s.created_names,
                "createdAssociations": s.created_associations,
                "skippedColumns": s.skipped_columns,
                "skippedRows": s.skipped_rows
            }),
        ),
        // A failed walk rolls back wholesale; nothing partial persists.
        Err(e) => err(
            &req.id,
            "import_failed",
            e.to_string(),
            Some(json!({ "path": source_file })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.importWorkbook" => Some(handle_catalog_import_workbook(state, req)),
        _ => None,
    }
}
