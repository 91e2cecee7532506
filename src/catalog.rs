use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

use crate::workbook::{is_marked, normalize_label, WorkbookMatrix};

pub struct Upserted {
    pub id: String,
    pub created: bool,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn get_or_create_theme(conn: &Connection, label: &str) -> anyhow::Result<Upserted> {
    if let Some(id) = conn
        .query_row("SELECT id FROM themes WHERE name = ?", [label], |r| r.get(0))
        .optional()?
    {
        return Ok(Upserted { id, created: false });
    }
    let id = Uuid::new_v4().to_string();
    match conn.execute("INSERT INTO themes(id, name) VALUES(?, ?)", (&id, label)) {
        Ok(_) => Ok(Upserted { id, created: true }),
        // A concurrent writer can win between the lookup and the insert;
        // the UNIQUE constraint decides, so re-fetch the winning row.
        Err(e) if is_unique_violation(&e) => {
            let id =
                conn.query_row("SELECT id FROM themes WHERE name = ?", [label], |r| r.get(0))?;
            Ok(Upserted { id, created: false })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_or_create_subtheme(
    conn: &Connection,
    theme_id: &str,
    label: &str,
) -> anyhow::Result<Upserted> {
    if let Some(id) = conn
        .query_row(
            "SELECT id FROM subthemes WHERE theme_id = ? AND name = ?",
            [theme_id, label],
            |r| r.get(0),
        )
        .optional()?
    {
        return Ok(Upserted { id, created: false });
    }
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO subthemes(id, theme_id, name) VALUES(?, ?, ?)",
        (&id, theme_id, label),
    ) {
        Ok(_) => Ok(Upserted { id, created: true }),
        Err(e) if is_unique_violation(&e) => {
            let id = conn.query_row(
                "SELECT id FROM subthemes WHERE theme_id = ? AND name = ?",
                [theme_id, label],
                |r| r.get(0),
            )?;
            Ok(Upserted { id, created: false })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_or_create_category(
    conn: &Connection,
    subtheme_id: &str,
    label: &str,
) -> anyhow::Result<Upserted> {
    if let Some(id) = conn
        .query_row(
            "SELECT id FROM categories WHERE subtheme_id = ? AND name = ?",
            [subtheme_id, label],
            |r| r.get(0),
        )
        .optional()?
    {
        return Ok(Upserted { id, created: false });
    }
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO categories(id, subtheme_id, name) VALUES(?, ?, ?)",
        (&id, subtheme_id, label),
    ) {
        Ok(_) => Ok(Upserted { id, created: true }),
        Err(e) if is_unique_violation(&e) => {
            let id = conn.query_row(
                "SELECT id FROM categories WHERE subtheme_id = ? AND name = ?",
                [subtheme_id, label],
                |r| r.get(0),
            )?;
            Ok(Upserted { id, created: false })
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_or_create_name(conn: &Connection, label: &str) -> anyhow::Result<Upserted> {
    if let Some(id) = conn
        .query_row("SELECT id FROM names WHERE name = ?", [label], |r| r.get(0))
        .optional()?
    {
        return Ok(Upserted { id, created: false });
    }
    let id = Uuid::new_v4().to_string();
    match conn.execute("INSERT INTO names(id, name) VALUES(?, ?)", (&id, label)) {
        Ok(_) => Ok(Upserted { id, created: true }),
        Err(e) if is_unique_violation(&e) => {
            let id =
                conn.query_row("SELECT id FROM names WHERE name = ?", [label], |r| r.get(0))?;
            Ok(Upserted { id, created: false })
        }
        Err(e) => Err(e.into()),
    }
}

/// Insert-if-absent on the (name_id, category_id) pair. Returns true when
/// the pair is new. Foreign key violations still surface.
pub fn get_or_create_association(
    conn: &Connection,
    name_id: &str,
    category_id: &str,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO name_categories(name_id, category_id) VALUES(?, ?)",
        [name_id, category_id],
    )?;
    Ok(n > 0)
}

/// Per-run lookup memo keyed by natural key. Purely a cost bound; the
/// store's UNIQUE constraints stay the correctness authority.
#[derive(Default)]
pub struct ResolverCache {
    themes: HashMap<String, String>,
    subthemes: HashMap<(String, String), String>,
    categories: HashMap<(String, String), String>,
    names: HashMap<String, String>,
}

impl ResolverCache {
    fn resolve_theme(
        &mut self,
        conn: &Connection,
        label: &str,
        summary: &mut ImportSummary,
    ) -> anyhow::Result<String> {
        if let Some(id) = self.themes.get(label) {
            return Ok(id.clone());
        }
        let up = get_or_create_theme(conn, label)?;
        if up.created {
            summary.created_themes += 1;
        }
        self.themes.insert(label.to_string(), up.id.clone());
        Ok(up.id)
    }

    fn resolve_subtheme(
        &mut self,
        conn: &Connection,
        theme_id: &str,
        label: &str,
        summary: &mut ImportSummary,
    ) -> anyhow::Result<String> {
        let key = (theme_id.to_string(), label.to_string());
        if let Some(id) = self.subthemes.get(&key) {
            return Ok(id.clone());
        }
        let up = get_or_create_subtheme(conn, theme_id, label)?;
        if up.created {
            summary.created_subthemes += 1;
        }
        self.subthemes.insert(key, up.id.clone());
        Ok(up.id)
    }

    fn resolve_category(
        &mut self,
        conn: &Connection,
        subtheme_id: &str,
        label: &str,
        summary: &mut ImportSummary,
    ) -> anyhow::Result<String> {
        let key = (subtheme_id.to_string(), label.to_string());
        if let Some(id) = self.categories.get(&key) {
            return Ok(id.clone());
        }
        let up = get_or_create_category(conn, subtheme_id, label)?;
        if up.created {
            summary.created_categories += 1;
        }
        self.categories.insert(key, up.id.clone());
        Ok(up.id)
    }

    fn resolve_name(
        &mut self,
        conn: &Connection,
        label: &str,
        summary: &mut ImportSummary,
    ) -> anyhow::Result<String> {
        if let Some(id) = self.names.get(label) {
            return Ok(id.clone());
        }
        let up = get_or_create_name(conn, label)?;
        if up.created {
            summary.created_names += 1;
        }
        self.names.insert(label.to_string(), up.id.clone());
        Ok(up.id)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ImportSummary {
    pub created_themes: usize,
    pub created_subthemes: usize,
    pub created_categories: usize,
    pub created_names: usize,
    pub created_associations: usize,
    pub skipped_columns: usize,
    pub skipped_rows: usize,
    pub skipped_existing: bool,
}

/// Walk the matrix and materialize the Theme -> Subtheme -> Category chain
/// per column, then names and memberships per row, all in one transaction.
/// Re-running over the same input creates nothing new.
pub fn import_matrix(
    conn: &Connection,
    matrix: &WorkbookMatrix,
    source_file: &str,
    force: bool,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    if !force {
        let themes: i64 = conn.query_row("SELECT COUNT(*) FROM themes", [], |r| r.get(0))?;
        if themes > 0 {
            summary.skipped_existing = true;
            return Ok(summary);
        }
    }

    let tx = conn.unchecked_transaction()?;
    let mut cache = ResolverCache::default();

    let mut column_categories: Vec<Option<String>> = Vec::with_capacity(matrix.columns.len());
    for col in &matrix.columns {
        let (Some(theme), Some(subtheme), Some(category)) = (
            normalize_label(&col.theme),
            normalize_label(&col.subtheme),
            normalize_label(&col.category),
        ) else {
            // A column cannot partially specify its hierarchy path.
            summary.skipped_columns += 1;
            column_categories.push(None);
            continue;
        };

        let theme_id = cache.resolve_theme(&tx, &theme, &mut summary)?;
        let subtheme_id = cache.resolve_subtheme(&tx, &theme_id, &subtheme, &mut summary)?;
        let category_id = cache.resolve_category(&tx, &subtheme_id, &category, &mut summary)?;
        column_categories.push(Some(category_id));
    }

    for row in &matrix.rows {
        let Some(label) = normalize_label(&row.label) else {
            summary.skipped_rows += 1;
            continue;
        };

        // The name row is materialized lazily: a row with no marked cell
        // under a surviving column creates nothing.
        let mut name_id: Option<String> = None;
        for (cell, category_id) in row.cells.iter().zip(&column_categories) {
            let Some(category_id) = category_id else {
                continue;
            };
            if !is_marked(cell) {
                continue;
            }
            let nid = match &name_id {
                Some(v) => v.clone(),
                None => {
                    let id = cache.resolve_name(&tx, &label, &mut summary)?;
                    name_id = Some(id.clone());
                    id
                }
            };
            if get_or_create_association(&tx, &nid, category_id)? {
                summary.created_associations += 1;
            }
        }
    }

    record_import_run(&tx, source_file, &summary)?;
    tx.commit()?;
    Ok(summary)
}

fn record_import_run(
    conn: &Connection,
    source_file: &str,
    summary: &ImportSummary,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO import_runs(
            id, imported_at, source_file,
            created_themes, created_subthemes, created_categories,
            created_names, created_associations, skipped_columns, skipped_rows
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            chrono::Utc::now().to_rfc3339(),
            source_file,
            summary.created_themes as i64,
            summary.created_subthemes as i64,
            summary.created_categories as i64,
            summary.created_names as i64,
            summary.created_associations as i64,
            summary.skipped_columns as i64,
            summary.skipped_rows as i64,
        ),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToggleOutcome {
    Created,
    Removed,
    Ignored,
}

impl ToggleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Removed => "removed",
            Self::Ignored => "ignored",
        }
    }
}

pub fn toggle_association(
    conn: &Connection,
    name_id: &str,
    category_id: &str,
    checked: bool,
) -> anyhow::Result<ToggleOutcome> {
    if checked {
        if get_or_create_association(conn, name_id, category_id)? {
            Ok(ToggleOutcome::Created)
        } else {
            Ok(ToggleOutcome::Ignored)
        }
    } else {
        let n = conn.execute(
            "DELETE FROM name_categories WHERE name_id = ? AND category_id = ?",
            [name_id, category_id],
        )?;
        if n > 0 {
            Ok(ToggleOutcome::Removed)
        } else {
            Ok(ToggleOutcome::Ignored)
        }
    }
}

/// Associations first, then the row itself. Returns false when the name
/// did not exist.
pub fn delete_name(conn: &Connection, name_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM name_categories WHERE name_id = ?", [name_id])?;
    let n = tx.execute("DELETE FROM names WHERE id = ?", [name_id])?;
    tx.commit()?;
    Ok(n > 0)
}

pub fn reset_catalog(conn: &Connection) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM name_categories", [])?;
    tx.execute("DELETE FROM categories", [])?;
    tx.execute("DELETE FROM subthemes", [])?;
    tx.execute("DELETE FROM themes", [])?;
    tx.execute("DELETE FROM names", [])?;
    tx.execute("DELETE FROM import_runs", [])?;
    tx.commit()?;
    Ok(())
}
