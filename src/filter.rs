//! Log filter criteria and their cartesian fragment expansion.
//!
//! A user-facing filter may name several addresses and several alternative
//! values per topic position. Coverage bookkeeping works on *fragments*: the
//! cartesian product of fully-bound single-value criteria. Storing many
//! narrow fragments lets arbitrary compound filters be answered with
//! single-value equality lookups, with coverage equal to the intersection
//! of the fragments' intervals.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::encoding::hex_text;
use crate::error::{StoreError, StoreResult};

/// Number of indexed topic positions on an EVM log.
pub const TOPIC_COUNT: usize = 4;

/// Address criterion: a single address or any of several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterAddress {
    Single(Address),
    Multiple(Vec<Address>),
}

impl FilterAddress {
    /// The alternative addresses this criterion accepts.
    pub fn values(&self) -> &[Address] {
        match self {
            FilterAddress::Single(address) => std::slice::from_ref(address),
            FilterAddress::Multiple(addresses) => addresses,
        }
    }
}

/// Topic criterion: a single value or any of several alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterTopic {
    Single(B256),
    Multiple(Vec<B256>),
}

impl FilterTopic {
    /// The alternative values this criterion accepts.
    pub fn values(&self) -> &[B256] {
        match self {
            FilterTopic::Single(topic) => std::slice::from_ref(topic),
            FilterTopic::Multiple(topics) => topics,
        }
    }
}

/// Criteria for a plain log filter. `None` slots are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilterCriteria {
    pub address: Option<FilterAddress>,
    #[serde(default)]
    pub topics: [Option<FilterTopic>; TOPIC_COUNT],
}

/// Where a factory log announces the deployed child's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAddressLocation {
    Topic1,
    Topic2,
    Topic3,
    /// Byte offset into the log `data`.
    Offset(usize),
}

impl ChildAddressLocation {
    /// The stored text form: `topic1`..`topic3` or `offset<N>`.
    pub fn as_column_text(&self) -> String {
        match self {
            ChildAddressLocation::Topic1 => "topic1".to_string(),
            ChildAddressLocation::Topic2 => "topic2".to_string(),
            ChildAddressLocation::Topic3 => "topic3".to_string(),
            ChildAddressLocation::Offset(offset) => format!("offset{offset}"),
        }
    }

    /// Parse the stored text form.
    pub fn parse(text: &str) -> StoreResult<Self> {
        match text {
            "topic1" => Ok(ChildAddressLocation::Topic1),
            "topic2" => Ok(ChildAddressLocation::Topic2),
            "topic3" => Ok(ChildAddressLocation::Topic3),
            _ => match text.strip_prefix("offset").and_then(|n| n.parse().ok()) {
                Some(offset) => Ok(ChildAddressLocation::Offset(offset)),
                None => Err(StoreError::Corrupt(format!(
                    "invalid child address location: {text:?}"
                ))),
            },
        }
    }
}

impl Serialize for ChildAddressLocation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_column_text())
    }
}

impl<'de> Deserialize<'de> for ChildAddressLocation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ChildAddressLocation::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Criteria for a factory filter: events of children deployed by a factory
/// contract, where the child address is derived from the factory's own
/// announcement logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryCriteria {
    /// The factory (emitter) contract.
    pub address: Address,
    /// `topic0` of the factory's announcement event.
    pub event_selector: B256,
    pub child_address_location: ChildAddressLocation,
    /// Topic constraints applied to the *child* events.
    #[serde(default)]
    pub topics: [Option<FilterTopic>; TOPIC_COUNT],
}

/// A fully-bound single-value row of a log filter's cartesian expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilterFragment {
    pub id: String,
    pub chain_id: u64,
    pub address: Option<Address>,
    pub topic0: Option<B256>,
    pub topic1: Option<B256>,
    pub topic2: Option<B256>,
    pub topic3: Option<B256>,
}

impl LogFilterFragment {
    pub fn new(chain_id: u64, address: Option<Address>, topics: [Option<B256>; TOPIC_COUNT]) -> Self {
        let id = fragment_id(&[
            chain_id.to_string(),
            opt_hex(&address),
            opt_hex(&topics[0]),
            opt_hex(&topics[1]),
            opt_hex(&topics[2]),
            opt_hex(&topics[3]),
        ]);
        Self {
            id,
            chain_id,
            address,
            topic0: topics[0],
            topic1: topics[1],
            topic2: topics[2],
            topic3: topics[3],
        }
    }
}

/// A fully-bound row of a factory filter's cartesian expansion. The
/// emitter fields are always bound; only topics expand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryFragment {
    pub id: String,
    pub chain_id: u64,
    pub address: Address,
    pub event_selector: B256,
    pub child_address_location: ChildAddressLocation,
    pub topic0: Option<B256>,
    pub topic1: Option<B256>,
    pub topic2: Option<B256>,
    pub topic3: Option<B256>,
}

impl FactoryFragment {
    pub fn new(
        chain_id: u64,
        criteria: &FactoryCriteria,
        topics: [Option<B256>; TOPIC_COUNT],
    ) -> Self {
        let id = fragment_id(&[
            chain_id.to_string(),
            hex_text(criteria.address),
            hex_text(criteria.event_selector),
            criteria.child_address_location.as_column_text(),
            opt_hex(&topics[0]),
            opt_hex(&topics[1]),
            opt_hex(&topics[2]),
            opt_hex(&topics[3]),
        ]);
        Self {
            id,
            chain_id,
            address: criteria.address,
            event_selector: criteria.event_selector,
            child_address_location: criteria.child_address_location,
            topic0: topics[0],
            topic1: topics[1],
            topic2: topics[2],
            topic3: topics[3],
        }
    }
}

/// Expand log filter criteria into the cartesian product of fragments.
///
/// `None` slots stay `None` in every fragment. A `Single(x)` slot expands
/// exactly like `Multiple(vec![x])`.
pub fn build_log_filter_fragments(
    chain_id: u64,
    criteria: &LogFilterCriteria,
) -> Vec<LogFilterFragment> {
    let addresses = expand_slot(&criteria.address, FilterAddress::values);
    let topics = expand_topics(&criteria.topics);

    let mut fragments = Vec::new();
    for address in &addresses {
        for t0 in &topics[0] {
            for t1 in &topics[1] {
                for t2 in &topics[2] {
                    for t3 in &topics[3] {
                        fragments.push(LogFilterFragment::new(
                            chain_id,
                            *address,
                            [*t0, *t1, *t2, *t3],
                        ));
                    }
                }
            }
        }
    }
    fragments
}

/// Expand factory criteria into fragments; emitter fields are carried into
/// every fragment unchanged.
pub fn build_factory_fragments(chain_id: u64, criteria: &FactoryCriteria) -> Vec<FactoryFragment> {
    let topics = expand_topics(&criteria.topics);

    let mut fragments = Vec::new();
    for t0 in &topics[0] {
        for t1 in &topics[1] {
            for t2 in &topics[2] {
                for t3 in &topics[3] {
                    fragments.push(FactoryFragment::new(chain_id, criteria, [*t0, *t1, *t2, *t3]));
                }
            }
        }
    }
    fragments
}

fn expand_slot<C, T: Copy>(slot: &Option<C>, values: impl Fn(&C) -> &[T]) -> Vec<Option<T>> {
    match slot {
        None => vec![None],
        Some(criterion) => values(criterion).iter().copied().map(Some).collect(),
    }
}

fn expand_topics(topics: &[Option<FilterTopic>; TOPIC_COUNT]) -> [Vec<Option<B256>>; TOPIC_COUNT] {
    [
        expand_slot(&topics[0], FilterTopic::values),
        expand_slot(&topics[1], FilterTopic::values),
        expand_slot(&topics[2], FilterTopic::values),
        expand_slot(&topics[3], FilterTopic::values),
    ]
}

fn opt_hex<T: AsRef<[u8]>>(value: &Option<T>) -> String {
    match value {
        Some(value) => hex_text(value),
        None => "null".to_string(),
    }
}

/// SHA-256 over the `-`-joined canonical rendering of a bound tuple.
fn fragment_id(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"-");
        }
        hasher.update(part.as_bytes());
    }
    format!("0x{}", alloy_primitives::hex::encode(hasher.finalize()))
}
