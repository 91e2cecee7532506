use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

/// Collapse a raw cell into a usable label. Whitespace-only and empty
/// strings are absent, numbers drop a trailing ".0" when integral.
pub fn normalize_label(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Empty => None,
        CellValue::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        CellValue::Number(v) => {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                Some(format!("{}", *v as i64))
            } else {
                Some(format!("{}", v))
            }
        }
        CellValue::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
    }
}

/// Whether a data cell marks membership. Any non-absent value counts as a
/// mark except an explicit FALSE.
pub fn is_marked(cell: &CellValue) -> bool {
    match cell {
        CellValue::Bool(b) => *b,
        _ => normalize_label(cell).is_some(),
    }
}

#[derive(Debug, Clone)]
pub struct HeaderTriple {
    pub theme: CellValue,
    pub subtheme: CellValue,
    pub category: CellValue,
}

#[derive(Debug)]
pub struct MatrixRow {
    pub label: CellValue,
    pub cells: Vec<CellValue>,
}

/// The source sheet as a 2-D matrix: one header triple per data column,
/// one row per candidate name. Cells are raw; skip policy is the
/// importer's call, not the reader's.
#[derive(Debug)]
pub struct WorkbookMatrix {
    pub columns: Vec<HeaderTriple>,
    pub rows: Vec<MatrixRow>,
}

pub fn read_matrix(path: &Path) -> anyhow::Result<WorkbookMatrix> {
    let grid = read_grid(path)?;
    build_matrix(grid)
}

/// Load the raw cell grid from the first sheet of a spreadsheet, or from a
/// CSV file. Layout interpretation happens later in build_matrix.
pub fn read_grid(path: &Path) -> anyhow::Result<Vec<Vec<CellValue>>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "csv" {
        read_csv_grid(path)
    } else {
        read_sheet_grid(path)
    }
}

fn read_csv_grid(path: &Path) -> anyhow::Result<Vec<Vec<CellValue>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut grid: Vec<Vec<CellValue>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        grid.push(row);
    }
    Ok(grid)
}

fn read_sheet_grid(path: &Path) -> anyhow::Result<Vec<Vec<CellValue>>> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("workbook has no sheets"))?;
    let range = workbook.worksheet_range(&sheet)?;

    let Some(end) = range.end() else {
        return Ok(Vec::new());
    };
    let height = end.0 as usize + 1;
    let width = end.1 as usize + 1;

    let mut grid: Vec<Vec<CellValue>> = Vec::with_capacity(height);
    for r in 0..height {
        let mut row: Vec<CellValue> = Vec::with_capacity(width);
        for c in 0..width {
            let cell = match range.get_value((r as u32, c as u32)) {
                Some(Data::String(s)) => CellValue::Text(s.clone()),
                Some(Data::Float(v)) => CellValue::Number(*v),
                Some(Data::Int(v)) => CellValue::Number(*v as f64),
                Some(Data::Bool(b)) => CellValue::Bool(*b),
                Some(Data::DateTime(dt)) => CellValue::Number(dt.as_f64()),
                Some(Data::DateTimeIso(s)) | Some(Data::DurationIso(s)) => {
                    CellValue::Text(s.clone())
                }
                Some(Data::Error(_)) | Some(Data::Empty) | None => CellValue::Empty,
            };
            row.push(cell);
        }
        grid.push(row);
    }
    Ok(grid)
}

/// Interpret the grid: rows 0-2 are the Theme/Subtheme/Category header
/// rows, column 0 is the name index column, data cells start at (3, 1).
pub fn build_matrix(grid: Vec<Vec<CellValue>>) -> anyhow::Result<WorkbookMatrix> {
    let width = grid.iter().map(|r| r.len()).max().unwrap_or(0);
    if grid.len() < 3 || width < 2 {
        anyhow::bail!(
            "expected 3 header rows and an index column, got {} row(s) x {} column(s)",
            grid.len(),
            width
        );
    }

    let at = |r: usize, c: usize| -> CellValue {
        grid.get(r)
            .and_then(|row| row.get(c))
            .cloned()
            .unwrap_or(CellValue::Empty)
    };

    let mut columns = Vec::with_capacity(width - 1);
    for c in 1..width {
        columns.push(HeaderTriple {
            theme: at(0, c),
            subtheme: at(1, c),
            category: at(2, c),
        });
    }

    let mut rows = Vec::new();
    for r in 3..grid.len() {
        let cells = (1..width).map(|c| at(r, c)).collect();
        rows.push(MatrixRow {
            label: at(r, 0),
            cells,
        });
    }

    Ok(WorkbookMatrix { columns, rows })
}
