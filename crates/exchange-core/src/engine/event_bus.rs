//! Broadcast channel for exchange events.
//!
//! Every subscriber sees every event published after it subscribed. Slow
//! subscribers lose the oldest events instead of blocking publishers.

use exchange_types::ExchangeEvent;
use tokio::sync::broadcast;

/// Cloneable handle to the shared event channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ExchangeEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is listening.
	pub fn publish(
		&self,
		event: ExchangeEvent,
	) -> Result<(), broadcast::error::SendError<ExchangeEvent>> {
		self.sender.send(event).map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use exchange_types::OrderEvent;

	#[tokio::test]
	async fn test_publish_reaches_subscribers() {
		let bus = EventBus::new(8);
		let event = ExchangeEvent::Order(OrderEvent::Created {
			order_id: "order-1".into(),
		});
		assert!(bus.publish(event.clone()).is_err());

		let mut receiver = bus.subscribe();
		bus.publish(event.clone()).unwrap();
		assert_eq!(receiver.recv().await.unwrap(), event);
	}
}
