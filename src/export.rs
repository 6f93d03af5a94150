use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::db;

/// Page number given to imported announcements; they sort ahead of scraped pages.
pub const IMPORT_PAGE: u32 = 0;

/// Load a JSON array of raw announcement strings into the announcements
/// table, replacing whatever an earlier import stored.
pub fn import_announcements(conn: &Connection, path: &Path) -> Result<usize> {
    let body = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let lines: Vec<String> = serde_json::from_str(&body)
        .with_context(|| format!("{} is not a JSON array of strings", path.display()))?;
    db::replace_page(conn, IMPORT_PAGE, &lines)
}

/// Pretty-printed UTF-8 JSON (no `\u` escapes for ä/ö).
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
