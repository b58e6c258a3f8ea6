//! Record selection applied on top of a parse result.
//!
//! Predicates compose with AND semantics; `first`/`last` bound the
//! already-filtered list.

use crate::record::ParsedEventRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvtxFilter {
    record_id: Option<u64>,
    provider: Option<String>,
    event_id: Option<u32>,
    level: Option<u8>,
    first: Option<usize>,
    last: Option<usize>,
}

impl EvtxFilter {
    pub fn new() -> Self {
        EvtxFilter::default()
    }

    pub fn record_id(mut self, id: u64) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn event_id(mut self, id: u32) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    pub fn last(mut self, n: usize) -> Self {
        self.last = Some(n);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == EvtxFilter::default()
    }

    pub fn matches(&self, record: &ParsedEventRecord) -> bool {
        if let Some(id) = self.record_id {
            if record.record_id != id {
                return false;
            }
        }
        if let Some(provider) = &self.provider {
            if record.provider.as_deref() != Some(provider.as_str()) {
                return false;
            }
        }
        if let Some(event_id) = self.event_id {
            if record.event_id != Some(event_id) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if record.level != Some(level) {
                return false;
            }
        }
        true
    }

    /// Filter `records`, then apply the `first`/`last` bounds.
    pub fn apply<'r>(&self, records: &'r [ParsedEventRecord]) -> Vec<&'r ParsedEventRecord> {
        let mut selected: Vec<&ParsedEventRecord> =
            records.iter().filter(|r| self.matches(r)).collect();

        if let Some(first) = self.first {
            selected.truncate(first);
        }
        if let Some(last) = self.last {
            if selected.len() > last {
                selected.drain(..selected.len() - last);
            }
        }

        selected
    }
}
