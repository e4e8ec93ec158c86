use crate::error::{QmdError, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

/// A registered collection: a directory plus the glob it was indexed with.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRow {
    pub id: i64,
    pub name: String,
    pub pwd: String,
    pub glob_pattern: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct Collections<'a> {
    conn: &'a Connection,
}

impl<'a> Collections<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CollectionRow> {
        Ok(CollectionRow {
            id: row.get(0)?,
            name: row.get(1)?,
            pwd: row.get(2)?,
            glob_pattern: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    const COLS: &'static str = "id, name, pwd, glob_pattern, created_at, updated_at";

    pub fn list(&self) -> Result<Vec<CollectionRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM collections ORDER BY name",
            Self::COLS
        ))?;
        let rows = stmt.query_map([], Self::row)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<CollectionRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM collections WHERE name = ?", Self::COLS),
                [name],
                Self::row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<CollectionRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM collections WHERE id = ?", Self::COLS),
                [id],
                Self::row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_by_pwd_glob(&self, pwd: &str, glob: &str) -> Result<Option<CollectionRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM collections WHERE pwd = ? AND glob_pattern = ?",
                    Self::COLS
                ),
                [pwd, glob],
                Self::row,
            )
            .optional()?;
        Ok(row)
    }

    /// Create a collection with an explicit name. Duplicate names and
    /// duplicate (pwd, glob) pairs are validation errors; the store is
    /// left untouched.
    pub fn create(&self, name: &str, pwd: &str, glob: &str) -> Result<CollectionRow> {
        if self.get_by_name(name)?.is_some() {
            return Err(QmdError::Validation(format!(
                "collection '{name}' already exists"
            )));
        }
        if self.get_by_pwd_glob(pwd, glob)?.is_some() {
            return Err(QmdError::Validation(format!(
                "collection for {pwd} with glob '{glob}' already exists"
            )));
        }
        let ts = super::now();
        self.conn.execute(
            "INSERT INTO collections (name, pwd, glob_pattern, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![name, pwd, glob, ts, ts],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(self.get_by_id(id)?.expect("row just inserted"))
    }

    /// Get the collection keyed by (pwd, glob), creating it with a name
    /// auto-generated from the pwd basename if it does not exist.
    pub fn get_or_create(&self, pwd: &str, glob: &str) -> Result<CollectionRow> {
        if let Some(existing) = self.get_by_pwd_glob(pwd, glob)? {
            return Ok(existing);
        }
        let name = self.generate_name(pwd)?;
        self.create(&name, pwd, glob)
    }

    /// Auto-generate a unique name from the basename of `pwd`. On
    /// collision, append `-N` with the smallest N producing uniqueness,
    /// starting at 2.
    fn generate_name(&self, pwd: &str) -> Result<String> {
        let base = Path::new(pwd)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "collection".to_string());

        if self.get_by_name(&base)?.is_none() {
            return Ok(base);
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{base}-{n}");
            if self.get_by_name(&candidate)?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Rename a collection. Renaming to an existing name fails with a
    /// validation error and no mutation.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let collection = self
            .get_by_name(old_name)?
            .ok_or_else(|| QmdError::not_found(format!("collection '{old_name}'")))?;
        if self.get_by_name(new_name)?.is_some() {
            return Err(QmdError::Validation(format!(
                "collection '{new_name}' already exists"
            )));
        }
        self.conn.execute(
            "UPDATE collections SET name = ?, updated_at = ? WHERE id = ?",
            rusqlite::params![new_name, super::now(), collection.id],
        )?;
        Ok(())
    }

    /// Remove a collection. Documents and path contexts cascade via
    /// foreign keys; the FTS mirror follows through the delete trigger.
    pub fn remove(&self, name: &str) -> Result<CollectionRow> {
        let collection = self
            .get_by_name(name)?
            .ok_or_else(|| QmdError::not_found(format!("collection '{name}'")))?;
        self.conn
            .execute("DELETE FROM collections WHERE id = ?", [collection.id])?;
        Ok(collection)
    }

    pub fn touch_updated_at(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE collections SET updated_at = ? WHERE id = ?",
            rusqlite::params![super::now(), id],
        )?;
        Ok(())
    }
}
