//! Data types stored by and read back from the sync store.
//!
//! These are storage-shaped values: the chain client hands them in when
//! ingesting, and the event iterator reconstructs them from stored columns
//! when emitting. Quantities wider than 64 bits are `U256`; block numbers,
//! timestamps, and positional indexes are `u64`.

use alloy_primitives::{Address, Bytes, B256, B64, U256};
use serde::{Deserialize, Serialize};

use crate::encoding::hex_text;

/// A block header, keyed by `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: B256,
    pub number: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub base_fee_per_gas: Option<U256>,
    pub difficulty: U256,
    pub extra_data: Bytes,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub logs_bloom: Bytes,
    pub miner: Address,
    pub mix_hash: B256,
    pub nonce: B64,
    pub parent_hash: B256,
    pub receipts_root: B256,
    pub sha3_uncles: B256,
    pub size: U256,
    pub state_root: B256,
    pub total_difficulty: U256,
    pub transactions_root: B256,
}

/// A transaction, keyed by `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas: U256,
    pub nonce: u64,
    pub r: U256,
    pub s: U256,
    pub v: U256,
    #[serde(flatten)]
    pub kind: TransactionKind,
}

/// Type-specific transaction payload, discriminated by the wire `type` tag.
///
/// Each variant carries exactly the fields valid for that tag; a tag this
/// build does not know keeps only the raw type string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransactionKind {
    Legacy {
        gas_price: U256,
    },
    Eip2930 {
        gas_price: U256,
        access_list: Vec<AccessListItem>,
    },
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
        access_list: Vec<AccessListItem>,
    },
    Deposit,
    Unknown {
        raw: String,
    },
}

impl TransactionKind {
    /// The wire tag stored in the `type` column.
    pub fn type_tag(&self) -> &str {
        match self {
            TransactionKind::Legacy { .. } => "0x0",
            TransactionKind::Eip2930 { .. } => "0x1",
            TransactionKind::Eip1559 { .. } => "0x2",
            TransactionKind::Deposit => "0x7e",
            TransactionKind::Unknown { raw } => raw,
        }
    }
}

/// Access list entry (EIP-2930).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

/// A log, keyed by the synthetic id `blockHash-logIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub block_hash: B256,
    pub block_number: u64,
    pub data: Bytes,
    pub log_index: u64,
    /// The non-null topic prefix, at most four entries.
    pub topics: Vec<B256>,
    pub transaction_hash: B256,
    pub transaction_index: u64,
}

impl Log {
    /// Synthetic primary key: unique per chain because block hashes are.
    pub fn id(&self) -> String {
        format!("{}-{}", hex_text(self.block_hash), self.log_index)
    }

    pub fn topic(&self, slot: usize) -> Option<B256> {
        self.topics.get(slot).copied()
    }
}

/// One fully-joined event emitted by the event iterator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Caller-supplied label of the filter or factory the event belongs to.
    pub event_source_name: String,
    pub chain_id: u64,
    pub log: Log,
    pub block: Block,
    pub transaction: Transaction,
}

/// Per-call event totals, grouped by source and `topic0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCount {
    pub event_source_name: String,
    /// `None` for anonymous logs.
    pub selector: Option<B256>,
    pub count: u64,
}

/// Metadata attached to every page of events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    /// Timestamp of the page's last row, or the requested upper bound for
    /// an empty page.
    pub page_ends_at_timestamp: u64,
    /// Constant across all pages of one call.
    pub counts: Vec<EventCount>,
}

/// One page of ordered events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEventPage {
    pub events: Vec<LogEvent>,
    pub metadata: PageMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_id_shape() {
        let log = Log {
            address: Address::repeat_byte(1),
            block_hash: B256::repeat_byte(0xab),
            block_number: 7,
            data: Bytes::new(),
            log_index: 3,
            topics: vec![B256::repeat_byte(2)],
            transaction_hash: B256::repeat_byte(3),
            transaction_index: 0,
        };
        let id = log.id();
        assert!(id.starts_with("0xabab"));
        assert!(id.ends_with("-3"));
    }

    #[test]
    fn test_transaction_kind_tags() {
        assert_eq!(
            TransactionKind::Legacy {
                gas_price: U256::ZERO
            }
            .type_tag(),
            "0x0"
        );
        assert_eq!(TransactionKind::Deposit.type_tag(), "0x7e");
        assert_eq!(
            TransactionKind::Unknown {
                raw: "0x42".to_string()
            }
            .type_tag(),
            "0x42"
        );
    }

    #[test]
    fn test_transaction_serializes_with_type_tag() {
        let tx = testutil::make_transaction(&testutil::make_block(1, 10, 1000), 0);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "legacy");
        assert_eq!(json["transactionIndex"], 0);
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Deterministic block hash: `tag` keeps hashes distinct across chains.
    pub(crate) fn block_hash(tag: u8, number: u64) -> B256 {
        let mut seed = [0u8; 32];
        seed[0] = tag;
        seed[24..].copy_from_slice(&number.to_be_bytes());
        B256::from(seed)
    }

    pub(crate) fn make_block(tag: u8, number: u64, timestamp: u64) -> Block {
        Block {
            hash: block_hash(tag, number),
            number,
            timestamp,
            base_fee_per_gas: Some(U256::from(7u64)),
            difficulty: U256::from(1u64),
            extra_data: Bytes::new(),
            gas_limit: U256::from(30_000_000u64),
            gas_used: U256::from(21_000u64),
            logs_bloom: Bytes::from(vec![0u8; 8]),
            miner: Address::repeat_byte(0xdd),
            mix_hash: B256::repeat_byte(0x11),
            nonce: B64::ZERO,
            parent_hash: block_hash(tag, number.saturating_sub(1)),
            receipts_root: B256::repeat_byte(0x22),
            sha3_uncles: B256::repeat_byte(0x33),
            size: U256::from(520u64),
            state_root: B256::repeat_byte(0x44),
            total_difficulty: U256::from(1_000u64),
            transactions_root: B256::repeat_byte(0x55),
        }
    }

    pub(crate) fn make_transaction(block: &Block, index: u64) -> Transaction {
        let mut seed = block.hash.0;
        seed[16..24].copy_from_slice(&index.to_be_bytes());
        seed[15] = 0xcc;
        Transaction {
            hash: B256::from(seed),
            block_hash: block.hash,
            block_number: block.number,
            transaction_index: index,
            from: Address::repeat_byte(0x01),
            to: Some(Address::repeat_byte(0x02)),
            value: U256::from(100u64),
            input: Bytes::new(),
            gas: U256::from(21_000u64),
            nonce: index,
            r: U256::ZERO,
            s: U256::ZERO,
            v: U256::from(27u64),
            kind: TransactionKind::Legacy {
                gas_price: U256::from(1_000_000_000u64),
            },
        }
    }

    pub(crate) fn make_log(
        block: &Block,
        transaction: &Transaction,
        log_index: u64,
        address: Address,
        topics: Vec<B256>,
        data: Bytes,
    ) -> Log {
        Log {
            address,
            block_hash: block.hash,
            block_number: block.number,
            data,
            log_index,
            topics,
            transaction_hash: transaction.hash,
            transaction_index: transaction.transaction_index,
        }
    }
}
