//! The event iterator: an ordered, cursor-paginated stream of joined
//! events, and the factory child-address paginator.
//!
//! Both iterators are lazy, finite, and non-restartable. Each page is one
//! SQL query against the shared connection; a consumer may stop between
//! pages with no store-side cleanup. Pages observe writes that sort
//! strictly after the cursor and never anything at or before it.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::encoding::{decode_to_u256, decode_to_u64, encode_u64, hex_text, parse_hex};
use crate::error::{StoreError, StoreResult};
use crate::filter::{ChildAddressLocation, FactoryCriteria, LogFilterCriteria};
use crate::types::{
    Block, EventCount, Log, LogEvent, LogEventPage, PageMetadata, Transaction, TransactionKind,
};

/// A requested log filter event source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilterSource {
    /// Label attached to every event this source matches.
    pub name: String,
    pub chain_id: u64,
    pub criteria: LogFilterCriteria,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    /// When set, only events whose `topic0` is listed are yielded. Count
    /// metadata ignores this restriction.
    pub include_event_selectors: Option<Vec<B256>>,
}

/// A requested factory event source: events of the factory's derived
/// child contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorySource {
    pub name: String,
    pub chain_id: u64,
    pub criteria: FactoryCriteria,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub include_event_selectors: Option<Vec<B256>>,
}

#[derive(Debug, Clone)]
enum Source {
    LogFilter(LogFilterSource),
    Factory(FactorySource),
}

impl Source {
    fn name(&self) -> &str {
        match self {
            Source::LogFilter(source) => &source.name,
            Source::Factory(source) => &source.name,
        }
    }
}

/// Position of the last yielded row in the total event order.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    timestamp: u64,
    chain_id: u64,
    block_number: u64,
    log_index: u64,
}

/// SQL text plus its positional parameters, appended in lockstep.
struct QueryBuilder {
    sql: String,
    params: Vec<Value>,
}

impl QueryBuilder {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn bind_text(&mut self, value: String) {
        self.params.push(Value::Text(value));
    }

    fn bind_int(&mut self, value: i64) {
        self.params.push(Value::Integer(value));
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// The SQL expression deriving a child address from a factory
/// announcement log in table alias `factoryLogs`.
///
/// Topics are 66-char hex strings; the low 20 bytes are the last 40
/// chars. An `offset<k>` location reads 20 bytes of `data` starting at
/// byte `k`, i.e. 40 hex chars starting at string position `3 + 2k`.
fn child_address_expr(location: ChildAddressLocation) -> String {
    match location {
        ChildAddressLocation::Topic1 => r#"'0x' || substr("factoryLogs"."topic1", 27)"#.to_string(),
        ChildAddressLocation::Topic2 => r#"'0x' || substr("factoryLogs"."topic2", 27)"#.to_string(),
        ChildAddressLocation::Topic3 => r#"'0x' || substr("factoryLogs"."topic3", 27)"#.to_string(),
        ChildAddressLocation::Offset(offset) => format!(
            r#"'0x' || substr("factoryLogs"."data", {}, 40)"#,
            3 + 2 * offset
        ),
    }
}

/// Append one source's match predicate, parenthesized.
///
/// `with_selectors` controls whether the `include_event_selectors`
/// restriction participates; the counts query leaves it out.
fn push_source_predicate(builder: &mut QueryBuilder, source: &Source, with_selectors: bool) {
    builder.push("(\"logs\".\"chainId\" = ?");
    let (chain_id, topics, from_block, to_block, selectors) = match source {
        Source::LogFilter(s) => (
            s.chain_id,
            &s.criteria.topics,
            s.from_block,
            s.to_block,
            s.include_event_selectors.as_ref(),
        ),
        Source::Factory(s) => (
            s.chain_id,
            &s.criteria.topics,
            s.from_block,
            s.to_block,
            s.include_event_selectors.as_ref(),
        ),
    };
    builder.bind_int(chain_id as i64);

    match source {
        Source::LogFilter(s) => {
            if let Some(address) = &s.criteria.address {
                push_in_list(builder, "\"logs\".\"address\"", address.values());
            }
        }
        Source::Factory(s) => {
            // Children announced after the event's own block do not count.
            builder.push(&format!(
                " AND \"logs\".\"address\" IN (SELECT {} FROM \"logs\" AS \"factoryLogs\" \
                 WHERE \"factoryLogs\".\"chainId\" = ? \
                 AND \"factoryLogs\".\"address\" = ? \
                 AND \"factoryLogs\".\"topic0\" = ? \
                 AND \"factoryLogs\".\"blockNumber\" <= \"logs\".\"blockNumber\")",
                child_address_expr(s.criteria.child_address_location)
            ));
            builder.bind_int(s.chain_id as i64);
            builder.bind_text(hex_text(s.criteria.address));
            builder.bind_text(hex_text(s.criteria.event_selector));
        }
    }

    for (slot, topic) in topics.iter().enumerate() {
        if let Some(topic) = topic {
            push_in_list(builder, &format!("\"logs\".\"topic{slot}\""), topic.values());
        }
    }

    if let Some(from_block) = from_block {
        builder.push(" AND \"blocks\".\"number\" >= ?");
        builder.bind_text(encode_u64(from_block));
    }
    if let Some(to_block) = to_block {
        builder.push(" AND \"blocks\".\"number\" <= ?");
        builder.bind_text(encode_u64(to_block));
    }

    if with_selectors {
        if let Some(selectors) = selectors {
            push_in_list(builder, "\"logs\".\"topic0\"", selectors);
        }
    }

    builder.push(")");
}

/// `AND <column> IN (?, …)`. An empty alternative list can never match.
fn push_in_list<T: AsRef<[u8]>>(builder: &mut QueryBuilder, column: &str, values: &[T]) {
    if values.is_empty() {
        builder.push(" AND 1 = 0");
        return;
    }
    builder.push(&format!(
        " AND {column} IN ({})",
        placeholders(values.len())
    ));
    for value in values {
        builder.bind_text(hex_text(value));
    }
}

/// `CASE WHEN <pred> THEN <name> …` attributing each row to the first
/// matching source in request order.
fn push_source_case(builder: &mut QueryBuilder, sources: &[Source], with_selectors: bool) {
    builder.push("CASE");
    for source in sources {
        builder.push(" WHEN ");
        push_source_predicate(builder, source, with_selectors);
        builder.push(" THEN ?");
        builder.bind_text(source.name().to_string());
    }
    builder.push(" END AS \"eventSourceName\"");
}

fn push_source_disjunction(builder: &mut QueryBuilder, sources: &[Source], with_selectors: bool) {
    builder.push("(");
    for (i, source) in sources.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        push_source_predicate(builder, source, with_selectors);
    }
    builder.push(")");
}

fn push_timestamp_window(builder: &mut QueryBuilder, from_timestamp: u64, to_timestamp: u64) {
    builder.push(" AND \"blocks\".\"timestamp\" >= ? AND \"blocks\".\"timestamp\" <= ?");
    builder.bind_text(encode_u64(from_timestamp));
    builder.bind_text(encode_u64(to_timestamp));
}

/// Strict `(timestamp, chainId, blockNumber, logIndex) > cursor`, spelled
/// as the nested OR/AND chain so ties advance correctly.
fn push_cursor_clause(builder: &mut QueryBuilder, cursor: &Cursor) {
    builder.push(
        " AND (\"blocks\".\"timestamp\" > ? \
         OR (\"blocks\".\"timestamp\" = ? AND \"logs\".\"chainId\" > ?) \
         OR (\"blocks\".\"timestamp\" = ? AND \"logs\".\"chainId\" = ? AND \"blocks\".\"number\" > ?) \
         OR (\"blocks\".\"timestamp\" = ? AND \"logs\".\"chainId\" = ? AND \"blocks\".\"number\" = ? \
             AND \"logs\".\"logIndex\" > ?))",
    );
    let timestamp = encode_u64(cursor.timestamp);
    let block_number = encode_u64(cursor.block_number);
    let chain_id = cursor.chain_id as i64;

    builder.bind_text(timestamp.clone());
    builder.bind_text(timestamp.clone());
    builder.bind_int(chain_id);
    builder.bind_text(timestamp.clone());
    builder.bind_int(chain_id);
    builder.bind_text(block_number.clone());
    builder.bind_text(timestamp);
    builder.bind_int(chain_id);
    builder.bind_text(block_number);
    builder.bind_int(cursor.log_index as i64);
}

const LOG_COLUMNS: &[&str] = &[
    "chainId",
    "address",
    "blockHash",
    "blockNumber",
    "data",
    "logIndex",
    "topic0",
    "topic1",
    "topic2",
    "topic3",
    "transactionHash",
    "transactionIndex",
];

const BLOCK_COLUMNS: &[&str] = &[
    "hash",
    "number",
    "timestamp",
    "baseFeePerGas",
    "difficulty",
    "extraData",
    "gasLimit",
    "gasUsed",
    "logsBloom",
    "miner",
    "mixHash",
    "nonce",
    "parentHash",
    "receiptsRoot",
    "sha3Uncles",
    "size",
    "stateRoot",
    "totalDifficulty",
    "transactionsRoot",
];

const TX_COLUMNS: &[&str] = &[
    "hash",
    "blockHash",
    "blockNumber",
    "transactionIndex",
    "from",
    "to",
    "value",
    "input",
    "gas",
    "gasPrice",
    "maxFeePerGas",
    "maxPriorityFeePerGas",
    "nonce",
    "r",
    "s",
    "v",
    "type",
    "accessList",
];

fn push_select_columns(sql: &mut String, table: &str, prefix: &str, columns: &[&str]) {
    for column in columns {
        sql.push_str(&format!(
            ", \"{table}\".\"{column}\" AS \"{prefix}{column}\""
        ));
    }
}

const JOINED_TABLES: &str = " FROM \"logs\" \
     JOIN \"blocks\" ON \"blocks\".\"hash\" = \"logs\".\"blockHash\" \
     JOIN \"transactions\" ON \"transactions\".\"hash\" = \"logs\".\"transactionHash\"";

/// Cursor-paginated stream of fully-joined events between two
/// timestamps, ordered by `(timestamp, chainId, blockNumber, logIndex)`.
///
/// Obtained from [`crate::SyncStore::get_log_events`]. Call
/// [`LogEventStream::next_page`] until it returns `None`; the final page
/// is the first one shorter than the page size (possibly empty).
pub struct LogEventStream {
    conn: Arc<Mutex<Connection>>,
    from_timestamp: u64,
    to_timestamp: u64,
    sources: Vec<Source>,
    page_size: usize,
    counts: Option<Vec<EventCount>>,
    cursor: Option<Cursor>,
    done: bool,
}

impl LogEventStream {
    pub(crate) fn new(
        conn: Arc<Mutex<Connection>>,
        from_timestamp: u64,
        to_timestamp: u64,
        log_filters: Vec<LogFilterSource>,
        factories: Vec<FactorySource>,
        page_size: usize,
    ) -> Self {
        let mut sources: Vec<Source> = log_filters.into_iter().map(Source::LogFilter).collect();
        sources.extend(factories.into_iter().map(Source::Factory));
        Self {
            conn,
            from_timestamp,
            to_timestamp,
            sources,
            page_size,
            counts: None,
            cursor: None,
            done: false,
        }
    }

    /// Fetch the next page. Each page is a consistent snapshot at the
    /// time of its own query.
    pub fn next_page(&mut self) -> StoreResult<Option<LogEventPage>> {
        if self.done {
            return Ok(None);
        }
        if self.sources.is_empty() {
            self.done = true;
            return Ok(Some(LogEventPage {
                events: Vec::new(),
                metadata: PageMetadata {
                    page_ends_at_timestamp: self.to_timestamp,
                    counts: Vec::new(),
                },
            }));
        }

        let conn = Arc::clone(&self.conn);
        let conn = conn.lock();

        if self.counts.is_none() {
            self.counts = Some(fetch_counts(
                &conn,
                self.from_timestamp,
                self.to_timestamp,
                &self.sources,
            )?);
        }
        let events = fetch_event_page(
            &conn,
            self.from_timestamp,
            self.to_timestamp,
            &self.sources,
            self.cursor.as_ref(),
            self.page_size,
        )?;
        drop(conn);

        if events.len() < self.page_size {
            self.done = true;
        }
        if let Some(last) = events.last() {
            self.cursor = Some(Cursor {
                timestamp: last.block.timestamp,
                chain_id: last.chain_id,
                block_number: last.block.number,
                log_index: last.log.log_index,
            });
        }

        let page_ends_at_timestamp = events
            .last()
            .map(|event| event.block.timestamp)
            .unwrap_or(self.to_timestamp);
        Ok(Some(LogEventPage {
            events,
            metadata: PageMetadata {
                page_ends_at_timestamp,
                counts: self.counts.clone().unwrap_or_default(),
            },
        }))
    }
}

fn fetch_counts(
    conn: &Connection,
    from_timestamp: u64,
    to_timestamp: u64,
    sources: &[Source],
) -> StoreResult<Vec<EventCount>> {
    let mut builder = QueryBuilder::new();
    builder.push("SELECT ");
    push_source_case(&mut builder, sources, false);
    builder.push(", \"logs\".\"topic0\" AS \"selector\", count(*) AS \"count\"");
    builder.push(JOINED_TABLES);
    builder.push(" WHERE ");
    push_source_disjunction(&mut builder, sources, false);
    push_timestamp_window(&mut builder, from_timestamp, to_timestamp);
    builder.push(" GROUP BY \"eventSourceName\", \"selector\"");
    builder.push(" ORDER BY \"eventSourceName\" ASC, \"selector\" ASC");

    let mut stmt = conn.prepare(&builder.sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(builder.params))?;
    let mut counts = Vec::new();
    while let Some(row) = rows.next()? {
        let selector: Option<String> = row.get("selector")?;
        counts.push(EventCount {
            event_source_name: row.get("eventSourceName")?,
            selector: selector.as_deref().map(parse_hex).transpose()?,
            count: row.get::<_, i64>("count")? as u64,
        });
    }
    Ok(counts)
}

fn fetch_event_page(
    conn: &Connection,
    from_timestamp: u64,
    to_timestamp: u64,
    sources: &[Source],
    cursor: Option<&Cursor>,
    page_size: usize,
) -> StoreResult<Vec<LogEvent>> {
    let mut builder = QueryBuilder::new();
    builder.push("SELECT ");
    push_source_case(&mut builder, sources, true);
    {
        let mut select = String::new();
        push_select_columns(&mut select, "logs", "log_", LOG_COLUMNS);
        push_select_columns(&mut select, "blocks", "block_", BLOCK_COLUMNS);
        push_select_columns(&mut select, "transactions", "tx_", TX_COLUMNS);
        builder.push(&select);
    }
    builder.push(JOINED_TABLES);
    builder.push(" WHERE ");
    push_source_disjunction(&mut builder, sources, true);
    push_timestamp_window(&mut builder, from_timestamp, to_timestamp);
    if let Some(cursor) = cursor {
        push_cursor_clause(&mut builder, cursor);
    }
    builder.push(
        " ORDER BY \"blocks\".\"timestamp\" ASC, \"logs\".\"chainId\" ASC, \
         \"blocks\".\"number\" ASC, \"logs\".\"logIndex\" ASC",
    );
    builder.push(" LIMIT ?");
    builder.bind_int(page_size as i64);

    let mut stmt = conn.prepare(&builder.sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(builder.params))?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(event_from_row(row)?);
    }
    Ok(events)
}

// ==================== Row decoding ====================

fn required<T>(value: Option<T>, what: &str) -> StoreResult<T> {
    value.ok_or_else(|| StoreError::Corrupt(format!("missing column value: {what}")))
}

fn event_from_row(row: &Row<'_>) -> StoreResult<LogEvent> {
    Ok(LogEvent {
        event_source_name: row.get("eventSourceName")?,
        chain_id: row.get::<_, i64>("log_chainId")? as u64,
        log: log_from_row(row)?,
        block: block_from_row(row)?,
        transaction: transaction_from_row(row)?,
    })
}

fn log_from_row(row: &Row<'_>) -> StoreResult<Log> {
    let mut topics = Vec::new();
    for name in ["log_topic0", "log_topic1", "log_topic2", "log_topic3"] {
        match row.get::<_, Option<String>>(name)? {
            Some(topic) => topics.push(parse_hex(&topic)?),
            None => break,
        }
    }
    Ok(Log {
        address: parse_hex(&row.get::<_, String>("log_address")?)?,
        block_hash: parse_hex(&row.get::<_, String>("log_blockHash")?)?,
        block_number: decode_to_u64(&row.get::<_, String>("log_blockNumber")?)?,
        data: parse_hex(&row.get::<_, String>("log_data")?)?,
        log_index: row.get::<_, i64>("log_logIndex")? as u64,
        topics,
        transaction_hash: parse_hex(&row.get::<_, String>("log_transactionHash")?)?,
        transaction_index: row.get::<_, i64>("log_transactionIndex")? as u64,
    })
}

fn block_from_row(row: &Row<'_>) -> StoreResult<Block> {
    Ok(Block {
        hash: parse_hex(&row.get::<_, String>("block_hash")?)?,
        number: decode_to_u64(&row.get::<_, String>("block_number")?)?,
        timestamp: decode_to_u64(&row.get::<_, String>("block_timestamp")?)?,
        base_fee_per_gas: row
            .get::<_, Option<String>>("block_baseFeePerGas")?
            .as_deref()
            .map(decode_to_u256)
            .transpose()?,
        difficulty: decode_to_u256(&row.get::<_, String>("block_difficulty")?)?,
        extra_data: parse_hex(&row.get::<_, String>("block_extraData")?)?,
        gas_limit: decode_to_u256(&row.get::<_, String>("block_gasLimit")?)?,
        gas_used: decode_to_u256(&row.get::<_, String>("block_gasUsed")?)?,
        logs_bloom: parse_hex(&row.get::<_, String>("block_logsBloom")?)?,
        miner: parse_hex(&row.get::<_, String>("block_miner")?)?,
        mix_hash: parse_hex(&row.get::<_, String>("block_mixHash")?)?,
        nonce: parse_hex(&row.get::<_, String>("block_nonce")?)?,
        parent_hash: parse_hex(&row.get::<_, String>("block_parentHash")?)?,
        receipts_root: parse_hex(&row.get::<_, String>("block_receiptsRoot")?)?,
        sha3_uncles: parse_hex(&row.get::<_, String>("block_sha3Uncles")?)?,
        size: decode_to_u256(&row.get::<_, String>("block_size")?)?,
        state_root: parse_hex(&row.get::<_, String>("block_stateRoot")?)?,
        total_difficulty: decode_to_u256(&row.get::<_, String>("block_totalDifficulty")?)?,
        transactions_root: parse_hex(&row.get::<_, String>("block_transactionsRoot")?)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> StoreResult<Transaction> {
    let gas_price = row
        .get::<_, Option<String>>("tx_gasPrice")?
        .as_deref()
        .map(decode_to_u256)
        .transpose()?;
    let max_fee_per_gas = row
        .get::<_, Option<String>>("tx_maxFeePerGas")?
        .as_deref()
        .map(decode_to_u256)
        .transpose()?;
    let max_priority_fee_per_gas = row
        .get::<_, Option<String>>("tx_maxPriorityFeePerGas")?
        .as_deref()
        .map(decode_to_u256)
        .transpose()?;
    let access_list = row
        .get::<_, Option<String>>("tx_accessList")?
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?
        .unwrap_or_default();

    let type_tag: String = row.get("tx_type")?;
    let kind = match type_tag.as_str() {
        "0x0" => TransactionKind::Legacy {
            gas_price: required(gas_price, "gasPrice")?,
        },
        "0x1" => TransactionKind::Eip2930 {
            gas_price: required(gas_price, "gasPrice")?,
            access_list,
        },
        "0x2" => TransactionKind::Eip1559 {
            max_fee_per_gas: required(max_fee_per_gas, "maxFeePerGas")?,
            max_priority_fee_per_gas: required(max_priority_fee_per_gas, "maxPriorityFeePerGas")?,
            access_list,
        },
        "0x7e" => TransactionKind::Deposit,
        _ => TransactionKind::Unknown { raw: type_tag },
    };

    let to: Option<String> = row.get("tx_to")?;
    Ok(Transaction {
        hash: parse_hex(&row.get::<_, String>("tx_hash")?)?,
        block_hash: parse_hex(&row.get::<_, String>("tx_blockHash")?)?,
        block_number: decode_to_u64(&row.get::<_, String>("tx_blockNumber")?)?,
        transaction_index: row.get::<_, i64>("tx_transactionIndex")? as u64,
        from: parse_hex(&row.get::<_, String>("tx_from")?)?,
        to: to.as_deref().map(parse_hex).transpose()?,
        value: decode_to_u256(&row.get::<_, String>("tx_value")?)?,
        input: parse_hex(&row.get::<_, String>("tx_input")?)?,
        gas: decode_to_u256(&row.get::<_, String>("tx_gas")?)?,
        nonce: row.get::<_, i64>("tx_nonce")? as u64,
        r: decode_to_u256(&row.get::<_, String>("tx_r")?)?,
        s: decode_to_u256(&row.get::<_, String>("tx_s")?)?,
        v: decode_to_u256(&row.get::<_, String>("tx_v")?)?,
        kind,
    })
}

// ==================== Factory child addresses ====================

/// Paginated stream of child addresses derived from a factory's
/// announcement logs at block numbers up to a fixed bound.
///
/// Obtained from [`crate::SyncStore::get_factory_child_addresses`].
/// Yields pages in ascending block order; announcements landing above
/// the bound after iteration starts are never observed.
pub struct FactoryChildAddresses {
    conn: Arc<Mutex<Connection>>,
    chain_id: u64,
    factory: FactoryCriteria,
    up_to_block: u64,
    page_size: usize,
    cursor: Option<u64>,
    done: bool,
}

impl FactoryChildAddresses {
    pub(crate) fn new(
        conn: Arc<Mutex<Connection>>,
        chain_id: u64,
        factory: FactoryCriteria,
        up_to_block: u64,
        page_size: usize,
    ) -> Self {
        Self {
            conn,
            chain_id,
            factory,
            up_to_block,
            page_size,
            cursor: None,
            done: false,
        }
    }

    /// Fetch the next page of derived addresses, or `None` when the
    /// announcements are exhausted.
    pub fn next_page(&mut self) -> StoreResult<Option<Vec<Address>>> {
        if self.done {
            return Ok(None);
        }

        let mut builder = QueryBuilder::new();
        builder.push(&format!(
            "SELECT {} AS \"childAddress\", \"blockNumber\" \
             FROM \"logs\" AS \"factoryLogs\" \
             WHERE \"factoryLogs\".\"chainId\" = ? \
             AND \"factoryLogs\".\"address\" = ? \
             AND \"factoryLogs\".\"topic0\" = ? \
             AND \"factoryLogs\".\"blockNumber\" <= ?",
            child_address_expr(self.factory.child_address_location)
        ));
        builder.bind_int(self.chain_id as i64);
        builder.bind_text(hex_text(self.factory.address));
        builder.bind_text(hex_text(self.factory.event_selector));
        builder.bind_text(encode_u64(self.up_to_block));
        if let Some(cursor) = self.cursor {
            builder.push(" AND \"factoryLogs\".\"blockNumber\" > ?");
            builder.bind_text(encode_u64(cursor));
        }
        builder.push(" ORDER BY \"factoryLogs\".\"blockNumber\" ASC LIMIT ?");
        builder.bind_int(self.page_size as i64);

        let conn = Arc::clone(&self.conn);
        let conn = conn.lock();
        let mut stmt = conn.prepare(&builder.sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(builder.params))?;
        let mut addresses = Vec::new();
        let mut last_block = None;
        while let Some(row) = rows.next()? {
            addresses.push(parse_hex(&row.get::<_, String>("childAddress")?)?);
            last_block = Some(decode_to_u64(&row.get::<_, String>("blockNumber")?)?);
        }

        if addresses.len() < self.page_size {
            self.done = true;
        }
        if addresses.is_empty() {
            return Ok(None);
        }
        self.cursor = last_block;
        Ok(Some(addresses))
    }
}
