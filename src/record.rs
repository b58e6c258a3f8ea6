use jiff::Timestamp;
use serde::Serialize;

use crate::binxml::tree::XmlNode;
use crate::utils::time::timestamp_from_filetime;

/// `[signature:u32][size:u32][id:u64][filetime:u64]`
pub const EVENT_RECORD_HEADER_SIZE: usize = 24;

/// Header plus the trailing size copy.
pub const EVENT_RECORD_MIN_SIZE: u32 = 28;

#[derive(Debug, PartialEq, Eq)]
pub struct EvtxRecordHeader {
    pub size: u32,
    pub record_id: u64,
    pub filetime: u64,
}

impl EvtxRecordHeader {
    pub const SIGNATURE: u32 = 0x0000_2a2a;

    /// Read a record header from the start of `buf`. Returns `None` when
    /// the buffer is too short or the signature does not match (which ends
    /// record iteration, it is not an error).
    pub fn read(buf: &[u8]) -> Option<EvtxRecordHeader> {
        if buf.len() < EVENT_RECORD_HEADER_SIZE {
            return None;
        }

        let signature = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if signature != Self::SIGNATURE {
            return None;
        }

        Some(EvtxRecordHeader {
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            record_id: u64::from_le_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            filetime: u64::from_le_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
        })
    }
}

/// A single `<Data Name="...">value</Data>` style entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventField {
    pub name: String,
    pub value: String,
}

/// The structured view of one event record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEventRecord {
    pub record_id: u64,
    pub timestamp: Timestamp,
    pub provider: Option<String>,
    pub event_id: Option<u32>,
    pub level: Option<u8>,
    pub channel: Option<String>,
    pub computer: Option<String>,
    /// Canonical XML rendering of the record.
    #[serde(skip_serializing)]
    pub xml: String,
    pub fields: Vec<EventField>,
}

impl ParsedEventRecord {
    /// Extract the well-known `System` fields and `EventData`/`UserData`
    /// entries from a materialized record tree.
    pub fn extract(record_id: u64, filetime: u64, xml: String, nodes: &[XmlNode]) -> Self {
        let event = nodes
            .iter()
            .find(|node| node.name() == Some("Event"))
            .or_else(|| nodes.iter().find(|node| node.name().is_some()));

        let system = event.and_then(|e| e.child_element("System"));

        let provider = system
            .and_then(|s| s.child_element("Provider"))
            .and_then(|p| p.attribute("Name"))
            .map(str::to_string);

        let event_id = system
            .and_then(|s| s.child_element("EventID"))
            .and_then(|e| e.text().trim().parse().ok());

        let level = system
            .and_then(|s| s.child_element("Level"))
            .and_then(|l| l.text().trim().parse().ok());

        let channel = system
            .and_then(|s| s.child_element("Channel"))
            .map(|c| c.text());

        let computer = system
            .and_then(|s| s.child_element("Computer"))
            .map(|c| c.text());

        let mut fields = Vec::new();
        if let Some(event) = event {
            if let Some(data) = event
                .child_element("EventData")
                .or_else(|| event.child_element("UserData"))
            {
                collect_fields(data, &mut fields);
            }
        }

        ParsedEventRecord {
            record_id,
            timestamp: timestamp_from_filetime(filetime).unwrap_or(Timestamp::UNIX_EPOCH),
            provider,
            event_id,
            level,
            channel,
            computer,
            xml,
            fields,
        }
    }
}

fn collect_fields(container: &XmlNode, fields: &mut Vec<EventField>) {
    for child in container.children() {
        let Some(name) = child.name() else { continue };

        if name == "Data" {
            fields.push(EventField {
                name: child
                    .attribute("Name")
                    .unwrap_or("Data")
                    .to_string(),
                value: child.text(),
            });
        } else if child.children().iter().any(|c| c.name().is_some()) {
            // UserData wraps provider-defined elements one level deep.
            collect_fields(child, fields);
        } else {
            fields.push(EventField {
                name: name.to_string(),
                value: child.text(),
            });
        }
    }
}
