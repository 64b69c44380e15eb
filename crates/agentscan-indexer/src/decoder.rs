//! Event decoder - parses transaction log lines into typed events

use crate::rpc::TxRecord;
use agentscan_core::events::{DecodedEvent, RegistryEvent};
use base64::Engine;
use tracing::{debug, warn};

/// Log line prefix framing an emitted event payload.
const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// Decodes transaction records into registry events.
pub struct EventDecoder;

impl EventDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode every event in a transaction, in log order.
    ///
    /// Failed transactions emit nothing. A malformed log line is logged and
    /// dropped; the rest of the transaction still decodes.
    pub fn decode_transaction(&self, tx: &TxRecord) -> Vec<DecodedEvent> {
        if tx.failed {
            debug!("Skipping failed tx {}", tx.signature);
            return Vec::new();
        }

        let mut events = Vec::new();
        for line in &tx.log_messages {
            let Some(encoded) = line.strip_prefix(PROGRAM_DATA_PREFIX) else {
                continue;
            };

            let payload = match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Dropping malformed log line in {}: {e}", tx.signature);
                    continue;
                }
            };

            match RegistryEvent::decode(&payload) {
                Ok(event) => {
                    debug!(
                        "Decoded {} event in {} ordinal {}",
                        event.kind().name(),
                        tx.signature,
                        events.len()
                    );
                    events.push(DecodedEvent {
                        signature: tx.signature.clone(),
                        slot: tx.slot,
                        tx_index: tx.tx_index,
                        event_ordinal: events.len() as i32,
                        block_time: tx.block_time,
                        event,
                    });
                }
                Err(e) => {
                    warn!("Dropping undecodable event in {}: {e}", tx.signature);
                }
            }
        }
        events
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentscan_core::events::{encode, AgentRegistered, EventKind, UriUpdated};
    use agentscan_core::Address;

    fn data_line(payload: &[u8]) -> String {
        format!(
            "{PROGRAM_DATA_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(payload)
        )
    }

    fn registered(asset: u8) -> AgentRegistered {
        AgentRegistered {
            asset: Address([asset; 32]),
            owner: Address([2u8; 32]),
            collection: Address([3u8; 32]),
            creator: Address([4u8; 32]),
            parent_asset: None,
            agent_uri: "ipfs://x".to_string(),
            atom_enabled: true,
        }
    }

    fn tx(signature: &str, logs: Vec<String>, failed: bool) -> TxRecord {
        TxRecord {
            signature: signature.to_string(),
            slot: 100,
            block_time: Some(1_700_000_000),
            tx_index: Some(0),
            log_messages: logs,
            failed,
        }
    }

    #[test]
    fn test_decodes_events_with_ordinals() {
        let logs = vec![
            "Program Reg11111 invoke [1]".to_string(),
            data_line(&encode::agent_registered(&registered(1))),
            data_line(&encode::uri_updated(&UriUpdated {
                asset: Address([1u8; 32]),
                agent_uri: "ipfs://y".to_string(),
            })),
            "Program Reg11111 success".to_string(),
        ];
        let events = EventDecoder::new().decode_transaction(&tx("sig1", logs, false));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_ordinal, 0);
        assert_eq!(events[1].event_ordinal, 1);
        assert_eq!(events[0].event.kind(), EventKind::AgentRegistered);
        assert_eq!(events[1].event.kind(), EventKind::UriUpdated);
        assert_eq!(events[0].slot, 100);
        assert_eq!(events[0].signature, "sig1");
    }

    #[test]
    fn test_failed_tx_emits_nothing() {
        let logs = vec![data_line(&encode::agent_registered(&registered(1)))];
        let events = EventDecoder::new().decode_transaction(&tx("sig1", logs, true));
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_line_does_not_abort_tx() {
        let logs = vec![
            format!("{PROGRAM_DATA_PREFIX}%%%not-base64%%%"),
            data_line(&[0xFF; 16]), // unknown discriminator
            data_line(&encode::agent_registered(&registered(7))),
        ];
        let events = EventDecoder::new().decode_transaction(&tx("sig2", logs, false));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_ordinal, 0);
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let logs = vec![
            "Program log: Instruction: RegisterAgent".to_string(),
            "Program consumed 4500 compute units".to_string(),
        ];
        let events = EventDecoder::new().decode_transaction(&tx("sig3", logs, false));
        assert!(events.is_empty());
    }
}
