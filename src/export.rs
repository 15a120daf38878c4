use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::schema::{MATCH_GROUPS_TABLE, object_type, quote_ident};
use crate::team::Team;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    fn to_field(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => v.to_string(),
            Cell::Text(v) => v.clone(),
        }
    }
}

/// A table or view read into memory, header first.
#[derive(Debug, Clone, Default)]
pub struct TableDump {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

pub struct ExportReport {
    pub match_groups: usize,
    pub yb_latest: usize,
    pub enemy_latest: usize,
}

pub fn read_table(conn: &Connection, table: &str) -> Result<TableDump> {
    if object_type(conn, table)?.is_none() {
        return Err(anyhow!("no table or view named {table}"));
    }
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", quote_ident(table)))
        .with_context(|| format!("prepare dump of {table}"))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).with_context(|| format!("query {table}"))?;
    while let Some(row) = cursor.next().with_context(|| format!("read {table}"))? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            let cell = match row.get_ref(idx).context("read cell")? {
                ValueRef::Null => Cell::Empty,
                ValueRef::Integer(v) => Cell::Int(v),
                ValueRef::Real(v) => Cell::Float(v),
                ValueRef::Text(v) => Cell::Text(String::from_utf8_lossy(v).into_owned()),
                ValueRef::Blob(_) => {
                    return Err(anyhow!("{table}.{} holds a blob", columns[idx]));
                }
            };
            cells.push(cell);
        }
        rows.push(cells);
    }
    Ok(TableDump { columns, rows })
}

/// Writes a table or view to CSV with a header row. Returns the data row
/// count.
pub fn export_table_csv(conn: &Connection, table: &str, path: &Path) -> Result<usize> {
    let dump = read_table(conn, table)?;
    ensure_parent(path)?;
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    wtr.write_record(&dump.columns)
        .context("write csv header")?;
    for row in &dump.rows {
        wtr.write_record(row.iter().map(Cell::to_field))
            .context("write csv row")?;
    }
    wtr.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    tracing::info!(table, rows = dump.rows.len(), path = %path.display(), "exported csv");
    Ok(dump.rows.len())
}

/// Writes the match groups and both latest views to one workbook.
pub fn export_workbook(conn: &Connection, path: &Path) -> Result<ExportReport> {
    let groups = read_table(conn, MATCH_GROUPS_TABLE)?;
    let yb = read_table(conn, Team::Yb.latest_view())?;
    let enemy = read_table(conn, Team::Enemy.latest_view())?;

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("MatchGroups")?;
        write_dump(sheet, &groups)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("YbLatest")?;
        write_dump(sheet, &yb)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("EnemyLatest")?;
        write_dump(sheet, &enemy)?;
    }

    ensure_parent(path)?;
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        match_groups: groups.rows.len(),
        yb_latest: yb.rows.len(),
        enemy_latest: enemy.rows.len(),
    })
}

fn write_dump(worksheet: &mut Worksheet, dump: &TableDump) -> Result<()> {
    for (col_idx, name) in dump.columns.iter().enumerate() {
        worksheet
            .write_string(0, col_idx as u16, name)
            .with_context(|| format!("write header {name}"))?;
    }
    for (row_idx, row) in dump.rows.iter().enumerate() {
        let r = row_idx as u32 + 1;
        for (col_idx, cell) in row.iter().enumerate() {
            let c = col_idx as u16;
            let written = match cell {
                Cell::Empty => continue,
                Cell::Int(v) => worksheet.write_number(r, c, *v as f64),
                Cell::Float(v) => worksheet.write_number(r, c, *v),
                Cell::Text(v) => worksheet.write_string(r, c, v),
            };
            written.with_context(|| format!("write cell ({r},{c})"))?;
        }
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}
