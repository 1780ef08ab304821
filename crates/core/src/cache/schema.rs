//! Store schema description and fingerprinting.
//!
//! The layout is declared as data rather than as a SQL script. The DDL and the
//! fingerprint stored in the `version` table are both rendered from the same
//! description, so any structural change yields a new fingerprint and the
//! store is rebuilt on next open. There are no migrations: the store only
//! holds recomputable data.

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

/// A single column: name plus its SQL type and constraints.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub decl: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

#[derive(Debug, Clone, Copy)]
pub struct Index {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

/// Structural description of the whole store.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub tables: &'static [Table],
    pub indexes: &'static [Index],
}

/// The layout this build expects to find on disk.
pub const SCHEMA: Schema = Schema {
    tables: &[
        Table {
            name: "version",
            columns: &[
                Column { name: "nonce", decl: "INTEGER PRIMARY KEY CHECK (nonce = 0)" },
                Column { name: "fingerprint", decl: "TEXT NOT NULL" },
            ],
        },
        Table {
            name: "cache",
            columns: &[
                Column { name: "key", decl: "TEXT PRIMARY KEY" },
                Column { name: "value", decl: "BLOB NOT NULL" },
                Column { name: "last_access", decl: "INTEGER NOT NULL" },
            ],
        },
        Table {
            name: "cache_size",
            columns: &[
                Column { name: "key", decl: "TEXT PRIMARY KEY REFERENCES cache(key) ON DELETE CASCADE" },
                Column { name: "size", decl: "INTEGER NOT NULL" },
            ],
        },
    ],
    indexes: &[Index { name: "cache__last_access", table: "cache", columns: &["last_access"] }],
};

impl Schema {
    /// Canonical, language-neutral rendering used as fingerprint input.
    ///
    /// One line per table, column and index, in declaration order.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for table in self.tables {
            out.push_str(&format!("table {}\n", table.name));
            for column in table.columns {
                out.push_str(&format!("  column {} {}\n", column.name, column.decl));
            }
        }
        for index in self.indexes {
            out.push_str(&format!("index {} on {} ({})\n", index.name, index.table, index.columns.join(", ")));
        }
        out
    }

    /// Hex SHA-256 of the canonical rendering.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }

    /// SQL statements creating every table and index.
    pub fn ddl(&self) -> String {
        let mut out = String::new();
        for table in self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|column| format!("    {} {}", column.name, column.decl))
                .collect();
            out.push_str(&format!("CREATE TABLE {} (\n{}\n);\n", table.name, columns.join(",\n")));
        }
        for index in self.indexes {
            out.push_str(&format!("CREATE INDEX {} ON {} ({});\n", index.name, index.table, index.columns.join(", ")));
        }
        out
    }
}

/// Read the fingerprint recorded in the store, if any.
///
/// A store without a `version` table (fresh file), or whose `version` table
/// lacks the `nonce`/`fingerprint` columns (foreign layout), reports `None`
/// rather than an error.
pub fn stored_fingerprint(conn: &Connection) -> rusqlite::Result<Option<String>> {
    let columns: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('version')")?;
        stmt.query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    if !["nonce", "fingerprint"].iter().all(|wanted| columns.iter().any(|c| c == wanted)) {
        return Ok(None);
    }

    let fingerprint = conn
        .query_row("SELECT CAST(fingerprint AS TEXT) FROM version WHERE nonce = 0", [], |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()?;
    Ok(fingerprint.flatten())
}

/// Drop every user table, recreate the schema and record its fingerprint.
///
/// Callers run this inside a transaction with foreign keys disabled.
pub fn rebuild(conn: &Connection, schema: &Schema) -> rusqlite::Result<()> {
    let existing: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")?;
        stmt.query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    for table in &existing {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", table.replace('"', "\"\"")))?;
    }

    conn.execute_batch(&schema.ddl())?;
    conn.execute(
        "INSERT INTO version (nonce, fingerprint) VALUES (0, ?1)",
        params![schema.fingerprint()],
    )?;
    Ok(())
}
