//! Bootstrap schema of an instance's relational store.
//!
//! The schema is expressed as an ordered list of named migrations, one
//! idempotent "create if absent" step per table, so the bootstrap-once
//! contract can be exercised in isolation. Column sets match the stores
//! written by earlier deployments; table presence and key relationships are
//! the compatibility surface.

use rusqlite::Connection;

/// One idempotent schema step.
#[derive(Clone, Copy, Debug)]
pub struct Migration {
    pub table: &'static str,
    pub sql: &'static str,
}

/// The fixed bootstrap schema, applied in order.
///
/// `markets` is the top-level store record; most tables reference it.
pub const SCHEMA_MIGRATIONS: [Migration; 10] = [
    Migration {
        table: "markets",
        sql: "CREATE TABLE IF NOT EXISTS markets(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT,
                value TEXT,
                lastPublished TEXT,
                originallyPublished TEXT,
                originallyPublisherID INT,
                secret TEXT)",
    },
    Migration {
        table: "contracts",
        sql: "CREATE TABLE IF NOT EXISTS contracts(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INT,
                item_images TEXT,
                contract_body TEXT,
                signed_contract_body TEXT,
                unit_price INT,
                item_title TEXT,
                deleted INT DEFAULT 0,
                item_desc TEXT,
                item_condition TEXT,
                item_quantity_available INT,
                state TEXT,
                key TEXT,
                FOREIGN KEY(market_id) REFERENCES markets(id))",
    },
    Migration {
        table: "events",
        sql: "CREATE TABLE IF NOT EXISTS events(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id TEXT,
                event_id TEXT,
                event_description TEXT,
                updated INT,
                created INT)",
    },
    Migration {
        table: "products",
        sql: "CREATE TABLE IF NOT EXISTS products(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INT,
                productTitle TEXT,
                productDescription TEXT,
                productPrice INT,
                productShippingPrice TEXT,
                imageData BLOB,
                productQuantity INT,
                productTags TEXT,
                key TEXT,
                FOREIGN KEY(market_id) REFERENCES markets(id))",
    },
    Migration {
        table: "orders",
        sql: "CREATE TABLE IF NOT EXISTS orders(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INT,
                market_id INT,
                state TEXT,
                type TEXT,
                item_price TEXT,
                shipping_price TEXT,
                address TEXT,
                buyer_order_id TEXT,
                notary TEXT,
                payment_address TEXT,
                shipping_address TEXT,
                refund_requested INT DEFAULT 0,
                refund_address TEXT,
                cancelled INT DEFAULT 0,
                buyer TEXT,
                merchant TEXT,
                note_for_merchant TEXT,
                escrows TEXT,
                text TEXT,
                contract_key TEXT,
                signed_contract_body TEXT,
                updated INT,
                created INT,
                FOREIGN KEY(market_id) REFERENCES markets(id))",
    },
    Migration {
        table: "peers",
        sql: "CREATE TABLE IF NOT EXISTS peers(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uri TEXT,
                pubkey TEXT,
                nickname TEXT,
                market_id TEXT,
                guid TEXT,
                updated INT,
                created INT)",
    },
    Migration {
        table: "settings",
        sql: "CREATE TABLE IF NOT EXISTS settings(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INT,
                nickname TEXT,
                secret TEXT,
                sin TEXT,
                pubkey TEXT,
                guid TEXT,
                email TEXT,
                PGPPubKey TEXT,
                PGPPubkeyFingerprint TEXT,
                bcAddress TEXT,
                bitmessage TEXT,
                storeDescription TEXT,
                street1 TEXT,
                street2 TEXT,
                city TEXT,
                stateRegion TEXT,
                stateProvinceRegion TEXT,
                zip TEXT,
                country TEXT,
                countryCode TEXT,
                welcome TEXT,
                recipient_name TEXT,
                arbiter BOOLEAN,
                arbiterDescription TEXT,
                trustedArbiters TEXT,
                privkey TEXT,
                notaries TEXT,
                notary BOOLEAN,
                FOREIGN KEY(market_id) REFERENCES markets(id))",
    },
    Migration {
        table: "escrows",
        sql: "CREATE TABLE IF NOT EXISTS escrows(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INT,
                address TEXT,
                FOREIGN KEY(order_id) REFERENCES orders(id))",
    },
    Migration {
        table: "reviews",
        sql: "CREATE TABLE IF NOT EXISTS reviews(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pubKey TEXT,
                subject TEXT,
                signature TEXT,
                text TEXT,
                rating INT)",
    },
    Migration {
        table: "datastore",
        sql: "CREATE TABLE IF NOT EXISTS datastore(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INT,
                key TEXT,
                lastPublished TEXT,
                originallyPublished TEXT,
                originalPublisherID TEXT,
                value TEXT,
                FOREIGN KEY(market_id) REFERENCES markets(id))",
    },
];

/// Applies every migration. Re-running against an already bootstrapped
/// store changes nothing.
pub fn bootstrap_schema(connection: &Connection) -> rusqlite::Result<()> {
    for migration in SCHEMA_MIGRATIONS {
        connection.execute_batch(migration.sql)?;
    }
    Ok(())
}

/// Names of the user tables present in the store.
pub fn table_names(connection: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut statement = connection.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}
