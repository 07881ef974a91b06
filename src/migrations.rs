//! Forward-only schema migrations.
//!
//! The applied schema version lives in SQLite's `user_version` pragma.
//! Each migration is one SQL batch applied in its own transaction;
//! re-running [`migrate_up`] after all versions are applied is a no-op.

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create sync tables",
    sql: r#"
CREATE TABLE "blocks" (
  "hash" TEXT PRIMARY KEY NOT NULL,
  "chainId" INTEGER NOT NULL,
  "number" TEXT NOT NULL,
  "timestamp" TEXT NOT NULL,
  "baseFeePerGas" TEXT,
  "difficulty" TEXT NOT NULL,
  "extraData" TEXT NOT NULL,
  "gasLimit" TEXT NOT NULL,
  "gasUsed" TEXT NOT NULL,
  "logsBloom" TEXT NOT NULL,
  "miner" TEXT NOT NULL,
  "mixHash" TEXT NOT NULL,
  "nonce" TEXT NOT NULL,
  "parentHash" TEXT NOT NULL,
  "receiptsRoot" TEXT NOT NULL,
  "sha3Uncles" TEXT NOT NULL,
  "size" TEXT NOT NULL,
  "stateRoot" TEXT NOT NULL,
  "totalDifficulty" TEXT NOT NULL,
  "transactionsRoot" TEXT NOT NULL
);
CREATE INDEX "blocksChainNumberIndex" ON "blocks" ("chainId", "number");

CREATE TABLE "transactions" (
  "hash" TEXT PRIMARY KEY NOT NULL,
  "chainId" INTEGER NOT NULL,
  "blockHash" TEXT NOT NULL,
  "blockNumber" TEXT NOT NULL,
  "transactionIndex" INTEGER NOT NULL,
  "from" TEXT NOT NULL,
  "to" TEXT,
  "value" TEXT NOT NULL,
  "input" TEXT NOT NULL,
  "gas" TEXT NOT NULL,
  "gasPrice" TEXT,
  "maxFeePerGas" TEXT,
  "maxPriorityFeePerGas" TEXT,
  "nonce" INTEGER NOT NULL,
  "r" TEXT NOT NULL,
  "s" TEXT NOT NULL,
  "v" TEXT NOT NULL,
  "type" TEXT NOT NULL,
  "accessList" TEXT
);
CREATE INDEX "transactionsChainNumberIndex" ON "transactions" ("chainId", "blockNumber");

CREATE TABLE "logs" (
  "id" TEXT PRIMARY KEY NOT NULL,
  "chainId" INTEGER NOT NULL,
  "address" TEXT NOT NULL,
  "blockHash" TEXT NOT NULL,
  "blockNumber" TEXT NOT NULL,
  "data" TEXT NOT NULL,
  "logIndex" INTEGER NOT NULL,
  "topic0" TEXT,
  "topic1" TEXT,
  "topic2" TEXT,
  "topic3" TEXT,
  "transactionHash" TEXT NOT NULL,
  "transactionIndex" INTEGER NOT NULL
);
CREATE INDEX "logsChainNumberIndex" ON "logs" ("chainId", "blockNumber");
CREATE INDEX "logsBlockHashIndex" ON "logs" ("blockHash");
CREATE INDEX "logsAddressSelectorIndex" ON "logs" ("address", "topic0");

CREATE TABLE "logFilters" (
  "id" TEXT PRIMARY KEY NOT NULL,
  "chainId" INTEGER NOT NULL,
  "address" TEXT,
  "topic0" TEXT,
  "topic1" TEXT,
  "topic2" TEXT,
  "topic3" TEXT
);

CREATE TABLE "logFilterIntervals" (
  "id" INTEGER PRIMARY KEY AUTOINCREMENT,
  "logFilterId" TEXT NOT NULL REFERENCES "logFilters" ("id"),
  "startBlock" TEXT NOT NULL,
  "endBlock" TEXT NOT NULL
);
CREATE INDEX "logFilterIntervalsFilterIndex" ON "logFilterIntervals" ("logFilterId");

CREATE TABLE "factories" (
  "id" TEXT PRIMARY KEY NOT NULL,
  "chainId" INTEGER NOT NULL,
  "address" TEXT NOT NULL,
  "eventSelector" TEXT NOT NULL,
  "childAddressLocation" TEXT NOT NULL,
  "topic0" TEXT,
  "topic1" TEXT,
  "topic2" TEXT,
  "topic3" TEXT
);

CREATE TABLE "factoryLogFilterIntervals" (
  "id" INTEGER PRIMARY KEY AUTOINCREMENT,
  "factoryId" TEXT NOT NULL REFERENCES "factories" ("id"),
  "startBlock" TEXT NOT NULL,
  "endBlock" TEXT NOT NULL
);
CREATE INDEX "factoryLogFilterIntervalsFactoryIndex"
  ON "factoryLogFilterIntervals" ("factoryId");

CREATE TABLE "rpcRequestResults" (
  "request" TEXT NOT NULL,
  "blockNumber" TEXT NOT NULL,
  "chainId" INTEGER NOT NULL,
  "result" TEXT NOT NULL,
  PRIMARY KEY ("request", "blockNumber", "chainId")
);
"#,
}];

/// Apply every pending migration, oldest first.
pub fn migrate_up(conn: &mut Connection) -> StoreResult<()> {
    for migration in MIGRATIONS {
        let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if migration.version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            StoreError::Migration(format!(
                "{} (v{}): {e}",
                migration.name, migration.version
            ))
        })?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
        log::info!(
            "applied sync store migration v{} ({})",
            migration.version,
            migration.name
        );
    }
    Ok(())
}

/// The schema version the connection is currently at.
pub fn current_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
