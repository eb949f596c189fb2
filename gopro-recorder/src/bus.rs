//! In-process message bus with string topics and request/response services.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

use crate::{Error, Result};

const TOPIC_CAPACITY: usize = 16;
const SERVICE_QUEUE: usize = 8;

/// Response to a boolean service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAck {
    pub success: bool,
    pub message: String,
}

impl RecordAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Publish side of a topic.
#[async_trait::async_trait]
pub trait Publish: Send + Sync {
    fn topic(&self) -> &str;

    async fn publish(&self, payload: String) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TopicPublisher {
    topic: String,
    sender: broadcast::Sender<String>,
}

#[async_trait::async_trait]
impl Publish for TopicPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, payload: String) -> Result<()> {
        match self.sender.send(payload) {
            Ok(receivers) => tracing::debug!(topic = %self.topic, receivers, "Published"),
            // Nobody listening is not a failure.
            Err(_) => tracing::debug!(topic = %self.topic, "Published without subscribers"),
        }
        Ok(())
    }
}

/// A request waiting for its response.
#[derive(Debug)]
pub struct ServiceCall {
    request: bool,
    reply: oneshot::Sender<RecordAck>,
}

impl ServiceCall {
    pub fn request(&self) -> bool {
        self.request
    }

    pub fn respond(self, ack: RecordAck) {
        if self.reply.send(ack).is_err() {
            tracing::debug!("Caller went away before the response");
        }
    }
}

/// Receiving end of an advertised service.
#[derive(Debug)]
pub struct ServiceServer {
    name: String,
    calls: mpsc::Receiver<ServiceCall>,
}

impl ServiceServer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn next(&mut self) -> Option<ServiceCall> {
        self.calls.recv().await
    }
}

#[derive(Debug, Default)]
struct Registry {
    topics: HashMap<String, broadcast::Sender<String>>,
    services: HashMap<String, mpsc::Sender<ServiceCall>>,
}

#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    registry: Arc<Mutex<Registry>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn topic_sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut registry = self.registry.lock().await;
        registry
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub async fn publisher(&self, topic: &str) -> TopicPublisher {
        TopicPublisher {
            topic: topic.to_string(),
            sender: self.topic_sender(topic).await,
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.topic_sender(topic).await.subscribe()
    }

    /// Registers `name`, replacing any previous server for it.
    pub async fn advertise(&self, name: &str) -> ServiceServer {
        let (sender, calls) = mpsc::channel(SERVICE_QUEUE);
        self.registry
            .lock()
            .await
            .services
            .insert(name.to_string(), sender);

        tracing::info!(service = name, "Advertised service");
        ServiceServer {
            name: name.to_string(),
            calls,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn call(&self, name: &str, request: bool) -> Result<RecordAck> {
        let sender = self
            .registry
            .lock()
            .await
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ChannelClosed(name.to_string()))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(ServiceCall { request, reply })
            .await
            .map_err(|_| Error::ChannelClosed(name.to_string()))?;

        response
            .await
            .map_err(|_| Error::ChannelClosed(name.to_string()))
    }
}
