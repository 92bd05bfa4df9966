//! Simple stateless pub-sub event handler
//!
//! This module provides a small hook system that lets components subscribe to settlement events and react to them.
//! The handler is stateless: a hook receives the event itself and nothing else, which is exactly the contract a
//! fire-and-forget notification sink wants. Hooks can be async.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop the internal sender so the handler shuts down once the last producer is dropped.
        drop(self.sender);
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                (handler)(ev).await;
                trace!("📬️ Event handled");
            });
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Publish an event to the subscribed handler. Delivery is best-effort: a full or closed channel is logged and
    /// forgotten, because notification sinks must never stall or fail a settlement transaction.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            warn!("📬️ Could not publish event: {e}");
        }
    }
}
