//! The sync store: transactional writer and reader for chain data.
//!
//! One SQLite connection serves the whole process, serialized behind a
//! mutex. Every public method completes one unit of work — a transaction
//! or a read — per call. Raw inserts use `ON CONFLICT DO NOTHING` on the
//! natural key, so replaying a batch after a crash or retry is safe.
//!
//! Note: the API is synchronous. Callers that live on an async runtime
//! wrap calls in their blocking facility; reads are cheap and writes are
//! batch-sized.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction as SqlTransaction};

use crate::encoding::{decode_to_u64, encode_as_text, encode_u64, hex_text};
use crate::error::{StoreError, StoreResult};
use crate::events::{FactoryChildAddresses, FactorySource, LogEventStream, LogFilterSource};
use crate::filter::{
    build_factory_fragments, build_log_filter_fragments, FactoryCriteria, FactoryFragment,
    LogFilterCriteria, LogFilterFragment,
};
use crate::interval::{interval_intersection_many, interval_union, BlockRange};
use crate::migrations;
use crate::types::{Block, Log, Transaction, TransactionKind};

const INSERT_BLOCK: &str = r#"
INSERT INTO "blocks" (
  "hash", "chainId", "number", "timestamp", "baseFeePerGas", "difficulty",
  "extraData", "gasLimit", "gasUsed", "logsBloom", "miner", "mixHash",
  "nonce", "parentHash", "receiptsRoot", "sha3Uncles", "size", "stateRoot",
  "totalDifficulty", "transactionsRoot"
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
ON CONFLICT ("hash") DO NOTHING
"#;

const INSERT_TRANSACTION: &str = r#"
INSERT INTO "transactions" (
  "hash", "chainId", "blockHash", "blockNumber", "transactionIndex", "from",
  "to", "value", "input", "gas", "gasPrice", "maxFeePerGas",
  "maxPriorityFeePerGas", "nonce", "r", "s", "v", "type", "accessList"
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
ON CONFLICT ("hash") DO NOTHING
"#;

const INSERT_LOG: &str = r#"
INSERT INTO "logs" (
  "id", "chainId", "address", "blockHash", "blockNumber", "data", "logIndex",
  "topic0", "topic1", "topic2", "topic3", "transactionHash", "transactionIndex"
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
ON CONFLICT ("id") DO NOTHING
"#;

const UPSERT_LOG_FILTER: &str = r#"
INSERT INTO "logFilters" ("id", "chainId", "address", "topic0", "topic1", "topic2", "topic3")
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT ("id") DO NOTHING
"#;

const TAKE_LOG_FILTER_INTERVALS: &str = r#"
DELETE FROM "logFilterIntervals" WHERE "logFilterId" = ?1
RETURNING "startBlock", "endBlock"
"#;

const INSERT_LOG_FILTER_INTERVAL: &str = r#"
INSERT INTO "logFilterIntervals" ("logFilterId", "startBlock", "endBlock")
VALUES (?1, ?2, ?3)
"#;

const UPSERT_FACTORY: &str = r#"
INSERT INTO "factories" (
  "id", "chainId", "address", "eventSelector", "childAddressLocation",
  "topic0", "topic1", "topic2", "topic3"
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT ("id") DO NOTHING
"#;

const TAKE_FACTORY_INTERVALS: &str = r#"
DELETE FROM "factoryLogFilterIntervals" WHERE "factoryId" = ?1
RETURNING "startBlock", "endBlock"
"#;

const INSERT_FACTORY_INTERVAL: &str = r#"
INSERT INTO "factoryLogFilterIntervals" ("factoryId", "startBlock", "endBlock")
VALUES (?1, ?2, ?3)
"#;

const UPSERT_RPC_REQUEST_RESULT: &str = r#"
INSERT INTO "rpcRequestResults" ("request", "blockNumber", "chainId", "result")
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT ("request", "blockNumber", "chainId") DO UPDATE SET "result" = excluded."result"
"#;

/// Embedded store for blocks, transactions, logs, filter coverage, and the
/// rpc request cache.
pub struct SyncStore {
    conn: Arc<Mutex<Connection>>,
}

impl SyncStore {
    /// Open (or create) the store at `path`.
    ///
    /// Enables WAL journaling and foreign keys. Schema creation is a
    /// separate, explicit step: call [`SyncStore::migrate_up`] before the
    /// first read or write.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self::from_connection(conn)?;
        log::info!("opened sync store at {}", path.as_ref().display());
        Ok(store)
    }

    /// Open a private in-memory store. Used by tests and dry runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "wal", |_row| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply all pending schema migrations. Fatal at startup on failure.
    pub fn migrate_up(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        migrations::migrate_up(&mut conn)
    }

    /// Release the database handle.
    ///
    /// Pages still held by in-flight iterators keep the connection alive
    /// until they drop.
    pub fn close(self) -> StoreResult<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => mutex
                .into_inner()
                .close()
                .map_err(|(_conn, e)| StoreError::from(e)),
            Err(_shared) => Ok(()),
        }
    }

    // ==================== Ingestion ====================

    /// Record a historical batch for a log filter: the raw chain data plus
    /// one confirmed coverage interval for every fragment of the filter.
    pub fn insert_log_filter_interval(
        &self,
        chain_id: u64,
        criteria: &LogFilterCriteria,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> StoreResult<()> {
        let fragments = build_log_filter_fragments(chain_id, criteria);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_chain_data(&tx, chain_id, block, transactions, logs)?;
        for fragment in &fragments {
            merge_log_filter_fragment(&tx, fragment, Some(interval))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record logs scanned off a factory emitter contract. No coverage is
    /// claimed; the factory interval is written by
    /// [`SyncStore::insert_factory_log_filter_interval`].
    pub fn insert_factory_child_address_logs(
        &self,
        chain_id: u64,
        logs: &[Log],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for log in logs {
            insert_log_row(&tx, chain_id, log)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record a historical batch for a factory filter.
    pub fn insert_factory_log_filter_interval(
        &self,
        chain_id: u64,
        factory: &FactoryCriteria,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
        interval: BlockRange,
    ) -> StoreResult<()> {
        let fragments = build_factory_fragments(chain_id, factory);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_chain_data(&tx, chain_id, block, transactions, logs)?;
        for fragment in &fragments {
            merge_factory_fragment(&tx, fragment, Some(interval))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record a block observed at the chain tip. Raw inserts only:
    /// coverage is claimed in bulk by
    /// [`SyncStore::insert_realtime_interval`] once the range confirms.
    pub fn insert_realtime_block(
        &self,
        chain_id: u64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_chain_data(&tx, chain_id, block, transactions, logs)?;
        tx.commit()?;
        Ok(())
    }

    /// Claim a confirmed realtime interval for every fragment of every
    /// given filter and factory.
    ///
    /// Each factory is additionally recorded as a plain log filter on
    /// `(address, eventSelector)`, so the emitter scan coverage can be
    /// reused by later historical syncs.
    pub fn insert_realtime_interval(
        &self,
        chain_id: u64,
        log_filters: &[LogFilterCriteria],
        factories: &[FactoryCriteria],
        interval: BlockRange,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for criteria in log_filters {
            for fragment in build_log_filter_fragments(chain_id, criteria) {
                merge_log_filter_fragment(&tx, &fragment, Some(interval))?;
            }
        }
        for factory in factories {
            for fragment in build_factory_fragments(chain_id, factory) {
                merge_factory_fragment(&tx, &fragment, Some(interval))?;
            }
            let emitter = LogFilterFragment::new(
                chain_id,
                Some(factory.address),
                [Some(factory.event_selector), None, None, None],
            );
            merge_log_filter_fragment(&tx, &emitter, Some(interval))?;
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== Coverage queries ====================

    /// Confirmed coverage of a log filter: the intersection of its
    /// fragments' merged intervals.
    pub fn get_log_filter_intervals(
        &self,
        chain_id: u64,
        criteria: &LogFilterCriteria,
    ) -> StoreResult<Vec<BlockRange>> {
        let fragments = build_log_filter_fragments(chain_id, criteria);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut per_fragment = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            // Re-running the merge canonicalizes any rows written before a
            // crash; with nothing new to add it is cheap.
            per_fragment.push(merge_log_filter_fragment(&tx, fragment, None)?);
        }
        tx.commit()?;
        Ok(interval_intersection_many(&per_fragment))
    }

    /// Confirmed coverage of a factory filter.
    pub fn get_factory_log_filter_intervals(
        &self,
        chain_id: u64,
        factory: &FactoryCriteria,
    ) -> StoreResult<Vec<BlockRange>> {
        let fragments = build_factory_fragments(chain_id, factory);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut per_fragment = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            per_fragment.push(merge_factory_fragment(&tx, fragment, None)?);
        }
        tx.commit()?;
        Ok(interval_intersection_many(&per_fragment))
    }

    // ==================== Iterators ====================

    /// Ordered, cursor-paginated stream of joined events between two
    /// timestamps. See [`LogEventStream`].
    pub fn get_log_events(
        &self,
        from_timestamp: u64,
        to_timestamp: u64,
        log_filters: &[LogFilterSource],
        factories: &[FactorySource],
        page_size: usize,
    ) -> LogEventStream {
        LogEventStream::new(
            Arc::clone(&self.conn),
            from_timestamp,
            to_timestamp,
            log_filters.to_vec(),
            factories.to_vec(),
            page_size,
        )
    }

    /// Paginated child addresses derived from a factory's announcement
    /// logs up to `up_to_block`. See [`FactoryChildAddresses`].
    pub fn get_factory_child_addresses(
        &self,
        chain_id: u64,
        factory: &FactoryCriteria,
        up_to_block: u64,
        page_size: usize,
    ) -> FactoryChildAddresses {
        FactoryChildAddresses::new(
            Arc::clone(&self.conn),
            chain_id,
            factory.clone(),
            up_to_block,
            page_size,
        )
    }

    // ==================== RPC request cache ====================

    /// Memoize a contract read pinned to a block height. Overwrites the
    /// previous result on conflict.
    pub fn insert_rpc_request_result(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
        result: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            UPSERT_RPC_REQUEST_RESULT,
            params![request, encode_u64(block_number), chain_id as i64, result],
        )?;
        Ok(())
    }

    /// Look up a memoized contract read.
    pub fn get_rpc_request_result(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
    ) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                r#"SELECT "result" FROM "rpcRequestResults"
                   WHERE "request" = ?1 AND "blockNumber" = ?2 AND "chainId" = ?3"#,
                params![request, encode_u64(block_number), chain_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    // ==================== Reorg truncation ====================

    /// Remove all speculative data above `from_block` on one chain, in a
    /// single transaction: chain rows and rpc cache rows above the pivot
    /// are deleted, and coverage intervals are dropped or clamped so no
    /// claim extends past the pivot.
    pub fn delete_realtime_data(&self, chain_id: u64, from_block: u64) -> StoreResult<()> {
        let pivot = encode_u64(from_block);
        let chain = chain_id as i64;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let blocks = tx.execute(
            r#"DELETE FROM "blocks" WHERE "chainId" = ?1 AND "number" > ?2"#,
            params![chain, pivot],
        )?;
        let transactions = tx.execute(
            r#"DELETE FROM "transactions" WHERE "chainId" = ?1 AND "blockNumber" > ?2"#,
            params![chain, pivot],
        )?;
        let logs = tx.execute(
            r#"DELETE FROM "logs" WHERE "chainId" = ?1 AND "blockNumber" > ?2"#,
            params![chain, pivot],
        )?;
        tx.execute(
            r#"DELETE FROM "rpcRequestResults" WHERE "chainId" = ?1 AND "blockNumber" > ?2"#,
            params![chain, pivot],
        )?;

        tx.execute(
            r#"DELETE FROM "logFilterIntervals"
               WHERE "startBlock" > ?2
                 AND "logFilterId" IN (SELECT "id" FROM "logFilters" WHERE "chainId" = ?1)"#,
            params![chain, pivot],
        )?;
        tx.execute(
            r#"UPDATE "logFilterIntervals" SET "endBlock" = ?2
               WHERE "endBlock" > ?2
                 AND "logFilterId" IN (SELECT "id" FROM "logFilters" WHERE "chainId" = ?1)"#,
            params![chain, pivot],
        )?;
        tx.execute(
            r#"DELETE FROM "factoryLogFilterIntervals"
               WHERE "startBlock" > ?2
                 AND "factoryId" IN (SELECT "id" FROM "factories" WHERE "chainId" = ?1)"#,
            params![chain, pivot],
        )?;
        tx.execute(
            r#"UPDATE "factoryLogFilterIntervals" SET "endBlock" = ?2
               WHERE "endBlock" > ?2
                 AND "factoryId" IN (SELECT "id" FROM "factories" WHERE "chainId" = ?1)"#,
            params![chain, pivot],
        )?;

        tx.commit()?;
        log::debug!(
            "truncated chain {chain_id} above block {from_block}: \
             {blocks} blocks, {transactions} transactions, {logs} logs"
        );
        Ok(())
    }
}

// ==================== Row writers ====================

fn insert_chain_data(
    tx: &SqlTransaction<'_>,
    chain_id: u64,
    block: &Block,
    transactions: &[Transaction],
    logs: &[Log],
) -> StoreResult<()> {
    insert_block_row(tx, chain_id, block)?;
    for transaction in transactions {
        insert_transaction_row(tx, chain_id, transaction)?;
    }
    for log in logs {
        insert_log_row(tx, chain_id, log)?;
    }
    Ok(())
}

fn insert_block_row(tx: &SqlTransaction<'_>, chain_id: u64, block: &Block) -> StoreResult<()> {
    let mut stmt = tx.prepare_cached(INSERT_BLOCK)?;
    stmt.execute(params![
        hex_text(block.hash),
        chain_id as i64,
        encode_u64(block.number),
        encode_u64(block.timestamp),
        block.base_fee_per_gas.map(encode_as_text),
        encode_as_text(block.difficulty),
        hex_text(&block.extra_data),
        encode_as_text(block.gas_limit),
        encode_as_text(block.gas_used),
        hex_text(&block.logs_bloom),
        hex_text(block.miner),
        hex_text(block.mix_hash),
        hex_text(block.nonce),
        hex_text(block.parent_hash),
        hex_text(block.receipts_root),
        hex_text(block.sha3_uncles),
        encode_as_text(block.size),
        hex_text(block.state_root),
        encode_as_text(block.total_difficulty),
        hex_text(block.transactions_root),
    ])?;
    Ok(())
}

fn insert_transaction_row(
    tx: &SqlTransaction<'_>,
    chain_id: u64,
    transaction: &Transaction,
) -> StoreResult<()> {
    let (gas_price, max_fee, max_priority, access_list) = match &transaction.kind {
        TransactionKind::Legacy { gas_price } => (Some(*gas_price), None, None, None),
        TransactionKind::Eip2930 {
            gas_price,
            access_list,
        } => (Some(*gas_price), None, None, Some(access_list)),
        TransactionKind::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            access_list,
        } => (
            None,
            Some(*max_fee_per_gas),
            Some(*max_priority_fee_per_gas),
            Some(access_list),
        ),
        TransactionKind::Deposit | TransactionKind::Unknown { .. } => (None, None, None, None),
    };
    let access_list_json = access_list.map(serde_json::to_string).transpose()?;

    let mut stmt = tx.prepare_cached(INSERT_TRANSACTION)?;
    stmt.execute(params![
        hex_text(transaction.hash),
        chain_id as i64,
        hex_text(transaction.block_hash),
        encode_u64(transaction.block_number),
        transaction.transaction_index as i64,
        hex_text(transaction.from),
        transaction.to.map(hex_text),
        encode_as_text(transaction.value),
        hex_text(&transaction.input),
        encode_as_text(transaction.gas),
        gas_price.map(encode_as_text),
        max_fee.map(encode_as_text),
        max_priority.map(encode_as_text),
        transaction.nonce as i64,
        encode_as_text(transaction.r),
        encode_as_text(transaction.s),
        encode_as_text(transaction.v),
        transaction.kind.type_tag(),
        access_list_json,
    ])?;
    Ok(())
}

fn insert_log_row(tx: &SqlTransaction<'_>, chain_id: u64, log: &Log) -> StoreResult<()> {
    let mut stmt = tx.prepare_cached(INSERT_LOG)?;
    stmt.execute(params![
        log.id(),
        chain_id as i64,
        hex_text(log.address),
        hex_text(log.block_hash),
        encode_u64(log.block_number),
        hex_text(&log.data),
        log.log_index as i64,
        log.topic(0).map(hex_text),
        log.topic(1).map(hex_text),
        log.topic(2).map(hex_text),
        log.topic(3).map(hex_text),
        hex_text(log.transaction_hash),
        log.transaction_index as i64,
    ])?;
    Ok(())
}

// ==================== Interval merge ====================

/// Merge one fragment's intervals: upsert the fragment row, atomically
/// take every existing interval, union in the new range, and write the
/// canonical rows back. Returns the merged list.
fn merge_log_filter_fragment(
    tx: &SqlTransaction<'_>,
    fragment: &LogFilterFragment,
    new_range: Option<BlockRange>,
) -> StoreResult<Vec<BlockRange>> {
    tx.prepare_cached(UPSERT_LOG_FILTER)?.execute(params![
        fragment.id,
        fragment.chain_id as i64,
        fragment.address.map(hex_text),
        fragment.topic0.map(hex_text),
        fragment.topic1.map(hex_text),
        fragment.topic2.map(hex_text),
        fragment.topic3.map(hex_text),
    ])?;
    write_merged_intervals(
        tx,
        TAKE_LOG_FILTER_INTERVALS,
        INSERT_LOG_FILTER_INTERVAL,
        &fragment.id,
        new_range,
    )
}

fn merge_factory_fragment(
    tx: &SqlTransaction<'_>,
    fragment: &FactoryFragment,
    new_range: Option<BlockRange>,
) -> StoreResult<Vec<BlockRange>> {
    tx.prepare_cached(UPSERT_FACTORY)?.execute(params![
        fragment.id,
        fragment.chain_id as i64,
        hex_text(fragment.address),
        hex_text(fragment.event_selector),
        fragment.child_address_location.as_column_text(),
        fragment.topic0.map(hex_text),
        fragment.topic1.map(hex_text),
        fragment.topic2.map(hex_text),
        fragment.topic3.map(hex_text),
    ])?;
    write_merged_intervals(
        tx,
        TAKE_FACTORY_INTERVALS,
        INSERT_FACTORY_INTERVAL,
        &fragment.id,
        new_range,
    )
}

fn write_merged_intervals(
    tx: &SqlTransaction<'_>,
    take_sql: &str,
    insert_sql: &str,
    fragment_id: &str,
    new_range: Option<BlockRange>,
) -> StoreResult<Vec<BlockRange>> {
    let mut ranges = {
        let mut stmt = tx.prepare_cached(take_sql)?;
        let mut rows = stmt.query(params![fragment_id])?;
        let mut taken = Vec::new();
        while let Some(row) = rows.next()? {
            let start: String = row.get(0)?;
            let end: String = row.get(1)?;
            taken.push((decode_to_u64(&start)?, decode_to_u64(&end)?));
        }
        taken
    };
    ranges.extend(new_range);

    let merged = interval_union(&ranges);
    let mut insert = tx.prepare_cached(insert_sql)?;
    for (start, end) in &merged {
        insert.execute(params![fragment_id, encode_u64(*start), encode_u64(*end)])?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ChildAddressLocation, FilterAddress, FilterTopic};
    use crate::types::testutil::{make_block, make_log, make_transaction};
    use alloy_primitives::{Address, Bytes, B256};

    fn new_store() -> SyncStore {
        let store = SyncStore::open_in_memory().unwrap();
        store.migrate_up().unwrap();
        store
    }

    fn address_criteria(address: Address) -> LogFilterCriteria {
        LogFilterCriteria {
            address: Some(FilterAddress::Single(address)),
            topics: Default::default(),
        }
    }

    fn count_rows(store: &SyncStore, table: &str) -> i64 {
        let conn = store.conn.lock();
        conn.query_row(&format!("SELECT count(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    /// Touching intervals recorded separately must merge into one row.
    #[test]
    fn test_interval_union_merge() {
        let store = new_store();
        let criteria = address_criteria(Address::repeat_byte(1));

        let block_a = make_block(1, 5, 500);
        let block_b = make_block(1, 10, 1000);
        store
            .insert_log_filter_interval(1, &criteria, &block_a, &[], &[], (0, 5))
            .unwrap();
        store
            .insert_log_filter_interval(1, &criteria, &block_b, &[], &[], (6, 10))
            .unwrap();

        assert_eq!(
            store.get_log_filter_intervals(1, &criteria).unwrap(),
            vec![(0, 10)]
        );
        assert_eq!(count_rows(&store, "logFilterIntervals"), 1);
    }

    /// Coverage of a compound filter is the intersection across its
    /// fragments: ranges synced for only one alternative do not count.
    #[test]
    fn test_cross_fragment_intersection() {
        let store = new_store();
        let topic_a = B256::repeat_byte(0xa);
        let topic_b = B256::repeat_byte(0xb);

        let compound = LogFilterCriteria {
            address: None,
            topics: [
                Some(FilterTopic::Multiple(vec![topic_a, topic_b])),
                None,
                None,
                None,
            ],
        };
        let only_a = LogFilterCriteria {
            address: None,
            topics: [Some(FilterTopic::Single(topic_a)), None, None, None],
        };
        let only_b = LogFilterCriteria {
            address: None,
            topics: [Some(FilterTopic::Single(topic_b)), None, None, None],
        };

        // Disjoint per-fragment coverage: the compound filter has none.
        let block = make_block(1, 4, 400);
        store
            .insert_log_filter_interval(1, &only_a, &block, &[], &[], (0, 4))
            .unwrap();
        let block = make_block(1, 15, 1500);
        store
            .insert_log_filter_interval(1, &only_b, &block, &[], &[], (6, 15))
            .unwrap();
        assert!(store.get_log_filter_intervals(1, &compound).unwrap().is_empty());

        // Overlapping coverage: only the common range counts.
        let block = make_block(1, 10, 1000);
        store
            .insert_log_filter_interval(1, &only_a, &block, &[], &[], (0, 10))
            .unwrap();
        assert_eq!(
            store.get_log_filter_intervals(1, &compound).unwrap(),
            vec![(6, 10)]
        );

        // Equal coverage on both fragments: fully confirmed.
        store
            .insert_log_filter_interval(1, &only_b, &block, &[], &[], (0, 10))
            .unwrap();
        assert_eq!(
            store.get_log_filter_intervals(1, &compound).unwrap(),
            vec![(0, 10)]
        );
    }

    /// Replaying the exact same batch must leave the store unchanged.
    #[test]
    fn test_ingestion_is_idempotent() {
        let store = new_store();
        let criteria = address_criteria(Address::repeat_byte(7));
        let block = make_block(1, 3, 300);
        let transaction = make_transaction(&block, 0);
        let log = make_log(
            &block,
            &transaction,
            0,
            Address::repeat_byte(7),
            vec![B256::repeat_byte(0xe1)],
            Bytes::new(),
        );

        for _ in 0..2 {
            store
                .insert_log_filter_interval(
                    1,
                    &criteria,
                    &block,
                    std::slice::from_ref(&transaction),
                    std::slice::from_ref(&log),
                    (0, 3),
                )
                .unwrap();
        }

        assert_eq!(count_rows(&store, "blocks"), 1);
        assert_eq!(count_rows(&store, "transactions"), 1);
        assert_eq!(count_rows(&store, "logs"), 1);
        assert_eq!(count_rows(&store, "logFilterIntervals"), 1);
        assert_eq!(
            store.get_log_filter_intervals(1, &criteria).unwrap(),
            vec![(0, 3)]
        );
    }

    #[test]
    fn test_realtime_interval_records_factory_as_emitter_filter() {
        let store = new_store();
        let factory = FactoryCriteria {
            address: Address::repeat_byte(0xfa),
            event_selector: B256::repeat_byte(0xee),
            child_address_location: ChildAddressLocation::Topic1,
            topics: Default::default(),
        };

        store
            .insert_realtime_interval(1, &[], std::slice::from_ref(&factory), (100, 120))
            .unwrap();

        assert_eq!(
            store.get_factory_log_filter_intervals(1, &factory).unwrap(),
            vec![(100, 120)]
        );

        // The emitter scan is reusable as a plain (address, selector) filter.
        let emitter = LogFilterCriteria {
            address: Some(FilterAddress::Single(factory.address)),
            topics: [
                Some(FilterTopic::Single(factory.event_selector)),
                None,
                None,
                None,
            ],
        };
        assert_eq!(
            store.get_log_filter_intervals(1, &emitter).unwrap(),
            vec![(100, 120)]
        );
    }

    #[test]
    fn test_rpc_request_cache_upserts() {
        let store = new_store();
        assert!(store.get_rpc_request_result(1, 50, "0xreq").unwrap().is_none());

        store.insert_rpc_request_result(1, 50, "0xreq", "0x01").unwrap();
        assert_eq!(
            store.get_rpc_request_result(1, 50, "0xreq").unwrap().as_deref(),
            Some("0x01")
        );

        store.insert_rpc_request_result(1, 50, "0xreq", "0x02").unwrap();
        assert_eq!(
            store.get_rpc_request_result(1, 50, "0xreq").unwrap().as_deref(),
            Some("0x02")
        );

        // Distinct heights are distinct cache keys.
        assert!(store.get_rpc_request_result(1, 51, "0xreq").unwrap().is_none());
    }

    /// Truncation removes everything above the pivot and clamps coverage,
    /// leaving other chains untouched.
    #[test]
    fn test_delete_realtime_data() {
        let store = new_store();
        let criteria = address_criteria(Address::repeat_byte(1));

        for number in 1..=10 {
            let block = make_block(1, number, number * 100);
            let transaction = make_transaction(&block, 0);
            let log = make_log(
                &block,
                &transaction,
                0,
                Address::repeat_byte(1),
                vec![B256::repeat_byte(2)],
                Bytes::new(),
            );
            store
                .insert_log_filter_interval(
                    1,
                    &criteria,
                    &block,
                    std::slice::from_ref(&transaction),
                    std::slice::from_ref(&log),
                    (number, number),
                )
                .unwrap();
        }
        let other_chain_block = make_block(2, 9, 900);
        store
            .insert_realtime_block(2, &other_chain_block, &[], &[])
            .unwrap();
        store.insert_rpc_request_result(1, 0, "0xtip", "0xaa").unwrap();
        store.insert_rpc_request_result(1, 9, "0xpinned", "0xbb").unwrap();

        assert_eq!(
            store.get_log_filter_intervals(1, &criteria).unwrap(),
            vec![(1, 10)]
        );

        store.delete_realtime_data(1, 6).unwrap();

        assert_eq!(count_rows(&store, "blocks"), 6 + 1);
        assert_eq!(count_rows(&store, "transactions"), 6);
        assert_eq!(count_rows(&store, "logs"), 6);
        assert_eq!(
            store.get_log_filter_intervals(1, &criteria).unwrap(),
            vec![(1, 6)]
        );

        // Rows pinned above the pivot are evicted; height-zero rows stay.
        assert!(store.get_rpc_request_result(1, 9, "0xpinned").unwrap().is_none());
        assert_eq!(
            store.get_rpc_request_result(1, 0, "0xtip").unwrap().as_deref(),
            Some("0xaa")
        );
    }

    /// Intervals that start strictly above the pivot are dropped, not
    /// clamped into an inverted range.
    #[test]
    fn test_delete_realtime_data_drops_intervals_above_pivot() {
        let store = new_store();
        let criteria = address_criteria(Address::repeat_byte(3));

        let block = make_block(1, 20, 2000);
        store
            .insert_log_filter_interval(1, &criteria, &block, &[], &[], (8, 20))
            .unwrap();
        let block = make_block(1, 40, 4000);
        store
            .insert_log_filter_interval(1, &criteria, &block, &[], &[], (30, 40))
            .unwrap();

        store.delete_realtime_data(1, 10).unwrap();

        assert_eq!(
            store.get_log_filter_intervals(1, &criteria).unwrap(),
            vec![(8, 10)]
        );
    }

    #[test]
    fn test_close_releases_handle() {
        let store = new_store();
        store.close().unwrap();
    }
}
