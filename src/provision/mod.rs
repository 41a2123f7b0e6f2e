//! Per-instance storage provisioning.
//!
//! For every resolved [`NodeConfiguration`] this module makes sure the
//! storage and log directories exist and that the instance's store file is
//! present with its schema bootstrapped. Provisioning is pure local I/O,
//! idempotent per path, and safe to run concurrently for configurations
//! with distinct storage paths. Callers serialize calls that target the
//! same path.

pub mod schema;

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use rusqlite::Connection;
use sha3::Digest;
use sha3::Sha3_256;
use thiserror::Error;
use tracing::info;
use zeroize::Zeroize;

use crate::config_models::node_configuration::NodeConfiguration;

/// Passphrase from which the store key is derived until operator-supplied
/// keys land.
///
/// TODO: source the passphrase from the operator (prompt or keyring) instead
/// of this fixed default.
const STORE_PASSPHRASE: &str = "passphrase";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("could not create directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        source: io::Error,
    },

    #[error("could not bootstrap store {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

/// What [`provision`] did for a given configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provisioned {
    /// Directories and a fresh schema-bootstrapped store were created.
    Created,
    /// The store already existed; nothing was touched.
    AlreadyExisted,
}

/// Ensures directories exist and the store is bootstrapped for one instance.
///
/// A pre-existing store file makes this a no-op: provisioning never touches
/// existing data and never re-runs schema creation.
pub fn provision(config: &NodeConfiguration) -> Result<Provisioned, ProvisionError> {
    if let Some(storage_dir) = config.storage_path.parent() {
        ensure_dir(storage_dir)?;
    }
    if let Some(log_dir) = config.log_path.parent() {
        ensure_dir(log_dir)?;
    }

    if config.storage_path.exists() {
        return Ok(Provisioned::AlreadyExisted);
    }

    info!(store = %config.storage_path.display(), "bootstrapping instance store");
    bootstrap_store(&config.storage_path, config.storage_encryption_disabled).map_err(
        |source| ProvisionError::Storage {
            path: config.storage_path.clone(),
            source,
        },
    )?;

    Ok(Provisioned::Created)
}

/// Creates `dir` and its missing parents; owner gets rwx.
fn ensure_dir(dir: &Path) -> Result<(), ProvisionError> {
    let create = |path: &Path| -> io::Result<()> {
        fs::create_dir_all(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    };

    create(dir).map_err(|source| ProvisionError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })
}

/// Creates the store file and applies the bootstrap schema.
///
/// The encryption key must be in place before the first schema statement so
/// that the store never exists on disk in an unencrypted state.
fn bootstrap_store(path: &Path, encryption_disabled: bool) -> rusqlite::Result<()> {
    let connection = Connection::open(path)?;

    if !encryption_disabled {
        let mut key = derive_store_key(STORE_PASSPHRASE);
        let keyed = connection.pragma_update(None, "key", key.as_str());
        key.zeroize();
        keyed?;
    }

    schema::bootstrap_schema(&connection)
}

/// Hex-encoded SHA3-256 of the passphrase, the form `PRAGMA key` expects.
fn derive_store_key(passphrase: &str) -> String {
    Sha3_256::digest(passphrase.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod provision_tests {
    use std::env;

    use assert2::assert;
    use rand::distr::Alphanumeric;
    use rand::distr::SampleString;

    use super::*;
    use crate::config_models::node_configuration::NodeConfigurationBuilder;

    fn scratch_config() -> NodeConfiguration {
        let name = Alphanumeric.sample_string(&mut rand::rng(), 16);
        let root = env::temp_dir().join(format!("bazaar-provision-{name}"));

        let mut builder = NodeConfigurationBuilder::default();
        builder.storage_path = root.join("db").join("bazaar.db");
        builder.log_path = root.join("logs").join("production.log");
        builder.storage_encryption_disabled = true;
        builder.seal()
    }

    #[test]
    fn provisioning_creates_directories_and_store() {
        let config = scratch_config();

        let outcome = provision(&config).unwrap();

        assert!(outcome == Provisioned::Created);
        assert!(config.storage_path.is_file());
        assert!(config.log_path.parent().unwrap().is_dir());
    }

    #[test]
    fn provisioning_twice_is_a_no_op() {
        let config = scratch_config();

        assert!(provision(&config).unwrap() == Provisioned::Created);

        let connection = Connection::open(&config.storage_path).unwrap();
        connection
            .execute(
                "INSERT INTO peers(uri, nickname) VALUES ('tcp://203.0.113.9:12345', 'mallory')",
                [],
            )
            .unwrap();
        drop(connection);

        // second call must not recreate the schema or touch existing rows
        assert!(provision(&config).unwrap() == Provisioned::AlreadyExisted);

        let connection = Connection::open(&config.storage_path).unwrap();
        let peers: i64 = connection
            .query_row("SELECT COUNT(*) FROM peers", [], |row| row.get(0))
            .unwrap();
        assert!(peers == 1);
    }

    #[test]
    fn provisioned_store_has_the_full_schema() {
        let config = scratch_config();
        provision(&config).unwrap();

        let connection = Connection::open(&config.storage_path).unwrap();
        let tables = schema::table_names(&connection).unwrap();
        for migration in schema::SCHEMA_MIGRATIONS {
            assert!(
                tables.iter().any(|table| table == migration.table),
                "table {} must exist",
                migration.table
            );
        }
    }

    #[test]
    fn store_key_derivation_is_stable_hex() {
        let key = derive_store_key("passphrase");
        assert!(key.len() == 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(key == derive_store_key("passphrase"));
        assert!(key != derive_store_key("other"));
    }
}
