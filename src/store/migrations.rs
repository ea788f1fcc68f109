use rusqlite::{Connection, Transaction};

use super::StoreError;

pub const CURRENT_SCHEMA_VERSION: i32 = 5;

pub fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    migrate_to(conn, CURRENT_SCHEMA_VERSION)
}

/// Apply every pending migration up to `target` inside one transaction.
///
/// Each step only adds tables, columns or indexes, so rows written under an
/// older schema survive with `NULL` in the new columns.
pub(crate) fn migrate_to(conn: &mut Connection, target: i32) -> Result<(), StoreError> {
    let mut version = schema_version(conn)?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }

    if version >= target {
        return Ok(());
    }

    let tx = conn.transaction()?;

    while version < target {
        let next_version = version + 1;
        apply_migration(&tx, next_version)?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", target)?;
    tx.commit()?;

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32, StoreError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), StoreError> {
    let sql = match version {
        1 => include_str!("schemas/schema_v1.sql"),
        2 => include_str!("schemas/schema_v2.sql"),
        3 => include_str!("schemas/schema_v3.sql"),
        4 => include_str!("schemas/schema_v4.sql"),
        5 => include_str!("schemas/schema_v5.sql"),
        _ => {
            return Err(StoreError::Migration(format!(
                "unknown migration target version: {version}"
            )))
        }
    };
    tx.execute_batch(sql)
        .map_err(|e| StoreError::Migration(format!("migration to version {version} failed: {e}")))
}
