//! Aggregate sinks: where completed periods go

use super::aggregate::MetricAggregate;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{info, warn};

/// Receives the aggregates of every series at the end of a period
pub trait AggregateSink: Send + Sync {
    fn accept(&self, aggregates: Vec<MetricAggregate>);
}

/// Keeps every aggregate in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    aggregates: Mutex<Vec<MetricAggregate>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything received so far
    pub fn drain(&self) -> Vec<MetricAggregate> {
        std::mem::take(&mut *self.aggregates.lock())
    }

    pub fn len(&self) -> usize {
        self.aggregates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.lock().is_empty()
    }
}

impl AggregateSink for MemorySink {
    fn accept(&self, aggregates: Vec<MetricAggregate>) {
        self.aggregates.lock().extend(aggregates);
    }
}

/// Forwards each batch over a channel to an exporter thread
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Vec<MetricAggregate>>,
}

impl ChannelSink {
    /// Unbounded sink paired with its receiving end
    pub fn unbounded() -> (Self, Receiver<Vec<MetricAggregate>>) {
        let (sender, receiver) = crossbeam::channel::unbounded();
        (ChannelSink { sender }, receiver)
    }

    /// Bounded sink; batches are dropped (and logged) when the channel is full
    pub fn bounded(capacity: usize) -> (Self, Receiver<Vec<MetricAggregate>>) {
        let (sender, receiver) = crossbeam::channel::bounded(capacity);
        (ChannelSink { sender }, receiver)
    }
}

impl AggregateSink for ChannelSink {
    fn accept(&self, aggregates: Vec<MetricAggregate>) {
        if aggregates.is_empty() {
            return;
        }
        if let Err(e) = self.sender.try_send(aggregates) {
            let dropped = e.into_inner().len();
            warn!(dropped, "aggregate channel unavailable, dropping batch");
        }
    }
}

/// Emits each aggregate as a JSON log line
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AggregateSink for LogSink {
    fn accept(&self, aggregates: Vec<MetricAggregate>) {
        for aggregate in aggregates {
            match aggregate.to_json() {
                Ok(json) => info!(target: "metric_cube::aggregates", "{}", json),
                Err(e) => warn!(metric_id = %aggregate.metric_id, error = %e, "failed to encode aggregate"),
            }
        }
    }
}
