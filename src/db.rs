use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("catalog.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS themes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subthemes(
            id TEXT PRIMARY KEY,
            theme_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(theme_id) REFERENCES themes(id),
            UNIQUE(theme_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subthemes_theme ON subthemes(theme_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            subtheme_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(subtheme_id) REFERENCES subthemes(id),
            UNIQUE(subtheme_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_subtheme ON categories(subtheme_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS names(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS name_categories(
            name_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            PRIMARY KEY(name_id, category_id),
            FOREIGN KEY(name_id) REFERENCES names(id),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_name_categories_name ON name_categories(name_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_name_categories_category ON name_categories(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            imported_at TEXT NOT NULL,
            source_file TEXT NOT NULL,
            created_themes INTEGER NOT NULL,
            created_subthemes INTEGER NOT NULL,
            created_categories INTEGER NOT NULL,
            created_names INTEGER NOT NULL,
            created_associations INTEGER NOT NULL,
            skipped_columns INTEGER NOT NULL,
            skipped_rows INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}
