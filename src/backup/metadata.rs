//! Persistent record of the last backed-up mtime per source file.

use crate::backup::change_detector::MetadataLookup;
use crate::backup::found_file::FoundFile;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};

use function_name::named;
use rusqlite::{params, Connection, OptionalExtension, MAIN_DB};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    pub key: String,
    pub mtime: f64,
}

impl From<&FoundFile> for Metadata {
    fn from(value: &FoundFile) -> Self {
        Metadata {
            key: value.key().clone(),
            mtime: value.mtime(),
        }
    }
}

pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Opens the database file, creating it and its table when missing.
    #[named]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(Error::from)
            .with_msg(format!("Cannot open metadata database {:?}", path))
            .with_debug_object_and_fn_name(path.to_path_buf(), function_path!())?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS fileinfo (path TEXT PRIMARY KEY, mtime REAL NOT NULL)",
            [],
        )?;
        Ok(MetadataStore { conn })
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        Ok(self
            .conn
            .query_row(
                "SELECT path, mtime FROM fileinfo WHERE path = ?1",
                params![key],
                |row| {
                    Ok(Metadata {
                        key: row.get(0)?,
                        mtime: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn all_metadatas(&self) -> Result<BTreeMap<String, Metadata>> {
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM fileinfo")?;
        let rows = stmt.query_map([], |row| {
            Ok(Metadata {
                key: row.get(0)?,
                mtime: row.get(1)?,
            })
        })?;

        let mut result = BTreeMap::new();
        for row in rows {
            let metadata = row?;
            result.insert(metadata.key.clone(), metadata);
        }
        Ok(result)
    }

    /// Stored keys that are not in `present`.
    pub fn uncontained_keys<'a, I: IntoIterator<Item = &'a String>>(
        &self,
        present: I,
    ) -> Result<Vec<String>> {
        let present = present.into_iter().collect::<BTreeSet<_>>();
        Ok(self
            .all_metadatas()?
            .into_keys()
            .filter(|k| !present.contains(k))
            .collect())
    }

    pub fn remove_metadata(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM fileinfo WHERE path = ?1", params![key])?;
        tracing::debug!("DELETE_FROM_DB: {}", key);
        Ok(())
    }

    /// Removes all keys in a single transaction.
    #[named]
    pub fn remove_metadatas<'a, I: IntoIterator<Item = &'a String>>(&mut self, keys: I) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM fileinfo WHERE path = ?1")?;
            for key in keys {
                stmt.execute(params![key])
                    .map_err(Error::from)
                    .with_debug_object_and_fn_name(key.clone(), function_path!())?;
                tracing::debug!("DELETE_FROM_DB: {}", key);
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn update_metadata(&self, metadata: &Metadata) -> Result<()> {
        self.conn.execute(
            "REPLACE INTO fileinfo (path, mtime) VALUES (?1, ?2)",
            params![metadata.key, metadata.mtime],
        )?;
        tracing::debug!("REPLACE_INTO_DB: {}", metadata.key);
        Ok(())
    }

    /// Copies the whole database to `path`.
    pub fn snapshot_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.conn.backup(MAIN_DB, path.as_ref(), None)?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}

impl MetadataLookup for MetadataStore {
    fn stored_mtime(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.get_metadata(key)?.map(|m| m.mtime))
    }
}
