use crate::domain::events::NegotiationEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::{Mutex, broadcast};

/// Fans events out to in-process subscribers.
///
/// Having no subscriber at the moment of publication is not a failure.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<NegotiationEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NegotiationEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &NegotiationEvent) -> Result<()> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                tracing::debug!(event_id = %event.id, receivers, "Escrow event broadcast");
            }
            Err(_) => {
                tracing::debug!(event_id = %event.id, "No subscribers for escrow event");
            }
        }
        Ok(())
    }
}

/// Wraps a publisher and parks events it fails to deliver.
///
/// Parked events are redelivered in order by [`OutboxPublisher::flush`],
/// which the server calls on a fixed interval. When the outbox is full the
/// oldest parked event is dropped and logged.
pub struct OutboxPublisher<P: EventPublisher> {
    inner: P,
    pending: Mutex<VecDeque<NegotiationEvent>>,
    capacity: usize,
}

impl<P: EventPublisher> OutboxPublisher<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Redelivers parked events, stopping at the first failure.
    ///
    /// Returns how many events were delivered.
    pub async fn flush(&self) -> Result<usize> {
        let mut pending = self.pending.lock().await;
        let mut delivered = 0;
        while let Some(event) = pending.front() {
            if let Err(e) = self.inner.publish(event).await {
                tracing::warn!(
                    event_id = %event.id,
                    remaining = pending.len(),
                    error = %e,
                    "Outbox redelivery failed, will retry"
                );
                break;
            }
            pending.pop_front();
            delivered += 1;
        }
        if delivered > 0 {
            tracing::info!(delivered, "Outbox redelivered escrow events");
        }
        Ok(delivered)
    }

    async fn park(&self, event: &NegotiationEvent) {
        let mut pending = self.pending.lock().await;
        if pending.len() >= self.capacity
            && let Some(dropped) = pending.pop_front()
        {
            tracing::error!(
                event_id = %dropped.id,
                event_type = dropped.event_type.as_str(),
                "Outbox full, dropping oldest undelivered escrow event"
            );
        }
        pending.push_back(event.clone());
    }
}

#[async_trait]
impl<P: EventPublisher> EventPublisher for OutboxPublisher<P> {
    async fn publish(&self, event: &NegotiationEvent) -> Result<()> {
        // Keep ordering: anything already parked goes out first.
        if self.pending_len().await > 0 {
            self.park(event).await;
            self.flush().await?;
            return Ok(());
        }

        if let Err(e) = self.inner.publish(event).await {
            tracing::warn!(
                event_id = %event.id,
                error = %e,
                "Escrow event parked in outbox for redelivery"
            );
            self.park(event).await;
        }
        Ok(())
    }
}
