//! Snapshot reassembly: paginated account snapshots → one merged update.
//!
//! Pages are stored by number and may arrive in any order. A sequence is
//! complete once the last page is known and every page in `1..=last` is
//! present. Incomplete sequences older than the configured lifetime are
//! evicted by [`Reassembler::evict_expired`].
//!
//! Each conversion worker owns one `Reassembler`; buffers are never shared and
//! never outlive the connection.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::account::wire::{Entities, MergedUpdate, PartialUpdate};
use crate::error::{DecodeError, ReassemblyTimeout};
use crate::shared::Topic;

/// In-flight pages of one snapshot sequence.
#[derive(Debug)]
struct PageBuffer {
    pages: BTreeMap<u32, PartialUpdate>,
    last_page: Option<u32>,
    created_at: Instant,
}

impl PageBuffer {
    fn new(now: Instant) -> Self {
        Self {
            pages: BTreeMap::new(),
            last_page: None,
            created_at: now,
        }
    }

    fn is_complete(&self) -> bool {
        match self.last_page {
            Some(last) => (1..=last).all(|n| self.pages.contains_key(&n)),
            None => false,
        }
    }

    fn accepts_kind(&self, entities: &Entities) -> bool {
        self.pages
            .values()
            .next()
            .map_or(true, |p| p.entities.same_kind(entities))
    }

    /// Concatenate pages `1..=last` in order; summary from page `last`.
    fn merge(mut self, topic: &Topic) -> Result<MergedUpdate, DecodeError> {
        let last = self.last_page.ok_or(DecodeError::MixedSnapshot {
            topic: topic.clone(),
        })?;

        let mut merged: Option<Entities> = None;
        let mut summary = None;
        for n in 1..=last {
            let page = self.pages.remove(&n).ok_or(DecodeError::MixedSnapshot {
                topic: topic.clone(),
            })?;
            if n == last {
                summary = Some(page.summary);
            }
            match merged.as_mut() {
                None => merged = Some(page.entities),
                Some(acc) => acc
                    .extend(page.entities)
                    .map_err(|_| DecodeError::MixedSnapshot {
                        topic: topic.clone(),
                    })?,
            }
        }

        match (merged, summary) {
            (Some(entities), Some(summary)) => Ok(MergedUpdate {
                topic: topic.clone(),
                page_count: last,
                entities,
                summary,
            }),
            _ => Err(DecodeError::MixedSnapshot {
                topic: topic.clone(),
            }),
        }
    }
}

/// Per-topic page buffers.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffers: HashMap<Topic, PageBuffer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one page. Returns the merged update when the sequence completes.
    ///
    /// A page whose entity kind disagrees with the buffered pages discards the
    /// whole sequence.
    pub fn accept(
        &mut self,
        topic: &Topic,
        page: PartialUpdate,
        now: Instant,
    ) -> Result<Option<MergedUpdate>, DecodeError> {
        let buffer = self
            .buffers
            .entry(topic.clone())
            .or_insert_with(|| PageBuffer::new(now));

        if !buffer.accepts_kind(&page.entities) {
            self.buffers.remove(topic);
            return Err(DecodeError::MixedSnapshot {
                topic: topic.clone(),
            });
        }

        let number = page.page_number;
        if page.is_last_page {
            buffer.last_page = Some(number);
        }
        if buffer.pages.insert(number, page).is_some() {
            tracing::debug!("Duplicate snapshot page {} on {}, overwritten", number, topic);
        }

        if !buffer.is_complete() {
            return Ok(None);
        }

        match self.buffers.remove(topic) {
            Some(complete) => complete.merge(topic).map(Some),
            None => Ok(None),
        }
    }

    /// Drop any in-flight sequence for `topic`.
    pub fn discard(&mut self, topic: &Topic) -> bool {
        self.buffers.remove(topic).is_some()
    }

    /// Remove every sequence at least `ttl` old.
    pub fn evict_expired(&mut self, now: Instant, ttl: Duration) -> Vec<ReassemblyTimeout> {
        let expired: Vec<Topic> = self
            .buffers
            .iter()
            .filter(|(_, b)| now.saturating_duration_since(b.created_at) >= ttl)
            .map(|(t, _)| t.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|topic| {
                let buffer = self.buffers.remove(&topic)?;
                Some(ReassemblyTimeout {
                    pages_received: buffer.pages.len(),
                    last_page: buffer.last_page,
                    age: now.saturating_duration_since(buffer.created_at),
                    topic,
                })
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.buffers.clear();
    }

    /// Number of topics with an incomplete sequence.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}
