//! Fan-out delivery: conversion workers and bounded output queues.
//!
//! The router hands native events to `workers[hash(topic) % n]` over an
//! unbounded intake, so per-topic ordering holds and the read loop never
//! waits on conversion. Workers convert, reassemble snapshot pages, and push
//! into one bounded queue per output category. A full queue drops the event
//! and counts it against both the topic and the category.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::account::{AccountUpdate, Balance, Order, Position};
use crate::domain::market::{Candle, Depth, Ticker, Trade};
use crate::domain::{Category, DomainEvent};
use crate::error::DecodeError;
use crate::shared::Topic;
use crate::ws::config::WsConfig;
use crate::ws::convert::Converter;
use crate::ws::reassembly::Reassembler;
use crate::ws::{NativeEvent, SystemError, SystemMessage};

// ─── EventQueue ──────────────────────────────────────────────────────────────

/// Bounded single-producer queue with any number of consumers.
pub struct EventQueue<T> {
    tx: mpsc::Sender<T>,
    rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T: Send> EventQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            capacity,
        }
    }

    /// Non-blocking push. Returns `false` when the queue is full and `item` was dropped.
    pub(crate) fn push(&self, item: T) -> bool {
        self.tx.try_send(item).is_ok()
    }

    /// Wait for the next event.
    ///
    /// The queue owns a sender for its whole life, so this only yields `None`
    /// if the client itself is being torn down.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Next event if one is ready and no other consumer holds the queue.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Events as a stream. Consumers sharing the queue split the events between them.
    pub fn stream(&self) -> impl Stream<Item = T> + Send + '_ {
        async_stream::stream! {
            while let Some(item) = self.recv().await {
                yield item;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─── Counters & stats ────────────────────────────────────────────────────────

/// Point-in-time observability snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub delivered: u64,
    pub drops_by_topic: BTreeMap<Topic, u64>,
    pub drops_by_category: BTreeMap<Category, u64>,
    pub decode_errors: u64,
    pub reassembly_timeouts: u64,
    pub snapshots_merged: u64,
    /// Events handed to workers and not yet processed.
    pub intake_backlog: usize,
    pub queue_depths: BTreeMap<Category, usize>,
}

impl StreamStats {
    pub fn total_drops(&self) -> u64 {
        self.drops_by_category.values().sum()
    }

    pub fn drops_for(&self, topic: &Topic) -> u64 {
        self.drops_by_topic.get(topic).copied().unwrap_or(0)
    }
}

#[derive(Default)]
pub(crate) struct StreamCounters {
    delivered: AtomicU64,
    decode_errors: AtomicU64,
    reassembly_timeouts: AtomicU64,
    snapshots_merged: AtomicU64,
    backlog: Arc<AtomicUsize>,
    drops_by_topic: Mutex<HashMap<Topic, u64>>,
    drops_by_category: Mutex<BTreeMap<Category, u64>>,
}

impl StreamCounters {
    fn record_drop(&self, topic: Option<&Topic>, category: Category) {
        if let Some(topic) = topic {
            let mut by_topic = self
                .drops_by_topic
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *by_topic.entry(topic.clone()).or_insert(0) += 1;
        }
        let mut by_category = self
            .drops_by_category
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *by_category.entry(category).or_insert(0) += 1;
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn backlog(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.backlog)
    }
}

// ─── OutputQueues ────────────────────────────────────────────────────────────

/// One bounded queue per output category, plus the shared counters.
pub(crate) struct OutputQueues {
    pub tickers: EventQueue<Ticker>,
    pub depth: EventQueue<Depth>,
    pub trades: EventQueue<Trade>,
    pub candles: EventQueue<Candle>,
    pub orders: EventQueue<Order>,
    pub balances: EventQueue<Balance>,
    pub positions: EventQueue<Position>,
    pub accounts: EventQueue<AccountUpdate>,
    pub system_messages: EventQueue<SystemMessage>,
    pub system_errors: EventQueue<SystemError>,
    pub counters: StreamCounters,
}

impl OutputQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            tickers: EventQueue::new(capacity),
            depth: EventQueue::new(capacity),
            trades: EventQueue::new(capacity),
            candles: EventQueue::new(capacity),
            orders: EventQueue::new(capacity),
            balances: EventQueue::new(capacity),
            positions: EventQueue::new(capacity),
            accounts: EventQueue::new(capacity),
            system_messages: EventQueue::new(capacity),
            system_errors: EventQueue::new(capacity),
            counters: StreamCounters::default(),
        }
    }

    /// Push a converted event into its category queue.
    pub fn deliver(&self, topic: &Topic, event: DomainEvent) {
        let category = event.category();
        let accepted = match event {
            DomainEvent::Ticker(e) => self.tickers.push(e),
            DomainEvent::Depth(e) => self.depth.push(e),
            DomainEvent::Trade(e) => self.trades.push(e),
            DomainEvent::Candle(e) => self.candles.push(e),
            DomainEvent::Order(e) => self.orders.push(e),
            DomainEvent::Balance(e) => self.balances.push(e),
            DomainEvent::Position(e) => self.positions.push(e),
            DomainEvent::Account(e) => self.accounts.push(e),
        };
        self.settle(accepted, Some(topic), category);
    }

    pub fn system_message(&self, message: SystemMessage) {
        let topic = message.topic.clone();
        let accepted = self.system_messages.push(message);
        self.settle(accepted, topic.as_ref(), Category::SystemMessage);
    }

    pub fn system_error(&self, error: SystemError) {
        let topic = error.topic.clone();
        let accepted = self.system_errors.push(error);
        self.settle(accepted, topic.as_ref(), Category::SystemError);
    }

    fn settle(&self, accepted: bool, topic: Option<&Topic>, category: Category) {
        if accepted {
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.record_drop(topic, category);
            tracing::warn!(
                "Output queue full, dropped {} event{}",
                category,
                topic.map(|t| format!(" on {}", t)).unwrap_or_default()
            );
        }
    }

    fn depth_of(&self, category: Category) -> usize {
        match category {
            Category::Ticker => self.tickers.len(),
            Category::Depth => self.depth.len(),
            Category::Trade => self.trades.len(),
            Category::Candle => self.candles.len(),
            Category::Order => self.orders.len(),
            Category::Balance => self.balances.len(),
            Category::Position => self.positions.len(),
            Category::Account => self.accounts.len(),
            Category::SystemMessage => self.system_messages.len(),
            Category::SystemError => self.system_errors.len(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        let c = &self.counters;
        StreamStats {
            delivered: c.delivered.load(Ordering::Relaxed),
            drops_by_topic: c
                .drops_by_topic
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(t, n)| (t.clone(), *n))
                .collect(),
            drops_by_category: c
                .drops_by_category
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            decode_errors: c.decode_errors.load(Ordering::Relaxed),
            reassembly_timeouts: c.reassembly_timeouts.load(Ordering::Relaxed),
            snapshots_merged: c.snapshots_merged.load(Ordering::Relaxed),
            intake_backlog: c.backlog.load(Ordering::Relaxed),
            queue_depths: Category::ALL
                .iter()
                .map(|cat| (*cat, self.depth_of(*cat)))
                .collect(),
        }
    }
}

// ─── Worker pool ─────────────────────────────────────────────────────────────

/// Unit of work for a conversion worker.
pub(crate) enum Job {
    Event {
        topic: Topic,
        event: NativeEvent,
        paginated: bool,
    },
    /// Drop any in-flight snapshot for the topic.
    Discard(Topic),
}

impl Job {
    fn topic(&self) -> &Topic {
        match self {
            Job::Event { topic, .. } | Job::Discard(topic) => topic,
        }
    }
}

pub(crate) fn worker_index(topic: &Topic, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

/// Routes jobs to workers. Workers exit once every clone is dropped.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    intakes: Vec<mpsc::UnboundedSender<Job>>,
    backlog: Arc<AtomicUsize>,
    warn_threshold: usize,
}

impl Dispatcher {
    /// Queue `job` on its topic's worker. Returns `false` if the worker is gone.
    pub fn dispatch(&self, job: Job) -> bool {
        if self.intakes.is_empty() {
            return false;
        }
        let idx = worker_index(job.topic(), self.intakes.len());
        let depth = self.backlog.fetch_add(1, Ordering::Relaxed) + 1;
        if depth == self.warn_threshold.saturating_add(1) {
            tracing::warn!("Conversion backlog above {} events", self.warn_threshold);
        }
        if self.intakes[idx].send(job).is_err() {
            self.backlog.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }
}

struct Worker<C> {
    id: usize,
    converter: Arc<C>,
    outputs: Arc<OutputQueues>,
    reassembler: Reassembler,
    ttl: Duration,
}

impl<C: Converter> Worker<C> {
    async fn run(
        mut self,
        mut intake: mpsc::UnboundedReceiver<Job>,
        sweep_interval: Duration,
    ) {
        let backlog = self.outputs.counters.backlog();
        let mut sweep = tokio::time::interval(sweep_interval.max(Duration::from_millis(1)));
        sweep.reset();

        loop {
            tokio::select! {
                job = intake.recv() => match job {
                    Some(job) => {
                        backlog.fetch_sub(1, Ordering::Relaxed);
                        self.handle(job);
                    }
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        if self.reassembler.pending() > 0 {
            tracing::debug!(
                "Worker {} dropping {} incomplete snapshot(s) on shutdown",
                self.id,
                self.reassembler.pending()
            );
        }
        self.reassembler.reset();
    }

    fn handle(&mut self, job: Job) {
        match job {
            Job::Discard(topic) => {
                if self.reassembler.discard(&topic) {
                    tracing::debug!("Discarded in-flight snapshot on {}", topic);
                }
            }
            Job::Event {
                topic,
                event: NativeEvent::Snapshot(page),
                paginated: true,
            } => match self.reassembler.accept(&topic, page, tokio::time::Instant::now()) {
                Ok(Some(merged)) => {
                    self.outputs
                        .counters
                        .snapshots_merged
                        .fetch_add(1, Ordering::Relaxed);
                    let result = self.converter.convert_merged(merged);
                    self.finish(&topic, result);
                }
                Ok(None) => {}
                Err(e) => self.decode_failed(&topic, e),
            },
            Job::Event { topic, event, .. } => {
                let result = self.converter.convert(&topic, event);
                self.finish(&topic, result);
            }
        }
    }

    fn finish(&self, topic: &Topic, result: Result<DomainEvent, DecodeError>) {
        match result {
            Ok(event) => self.outputs.deliver(topic, event),
            Err(e) => self.decode_failed(topic, e),
        }
    }

    fn decode_failed(&self, topic: &Topic, error: DecodeError) {
        let error = match error {
            DecodeError::Malformed(message) => DecodeError::Conversion {
                topic: topic.clone(),
                message,
            },
            other => other,
        };
        tracing::warn!("Dropped event on {}: {}", topic, error);
        self.outputs.counters.decode_error();
        self.outputs
            .system_error(SystemError::new(Some(topic.clone()), error));
    }

    fn sweep(&mut self) {
        for timeout in self
            .reassembler
            .evict_expired(tokio::time::Instant::now(), self.ttl)
        {
            tracing::warn!("{}", timeout);
            self.outputs
                .counters
                .reassembly_timeouts
                .fetch_add(1, Ordering::Relaxed);
            self.outputs
                .system_error(SystemError::new(Some(timeout.topic.clone()), timeout));
        }
    }
}

/// Start `config.conversion_workers` workers for one connection.
pub(crate) fn spawn_workers<C: Converter>(
    config: &WsConfig,
    converter: Arc<C>,
    outputs: Arc<OutputQueues>,
) -> (Dispatcher, Vec<JoinHandle<()>>) {
    let count = config.worker_count();
    let backlog = outputs.counters.backlog();
    backlog.store(0, Ordering::Relaxed);

    let mut intakes = Vec::with_capacity(count);
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            id,
            converter: Arc::clone(&converter),
            outputs: Arc::clone(&outputs),
            reassembler: Reassembler::new(),
            ttl: config.reassembly_ttl,
        };
        handles.push(tokio::spawn(worker.run(rx, config.reassembly_sweep_interval)));
        intakes.push(tx);
    }

    let dispatcher = Dispatcher {
        intakes,
        backlog,
        warn_threshold: config.intake_warn_threshold,
    };
    (dispatcher, handles)
}
