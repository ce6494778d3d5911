use std::sync::Arc;

use catalog_ingest_breaker::CircuitBreaker;

use crate::errors::IngestError;
use crate::queue::{LogProducer, OutboundMessage};

/// A producer whose sends go through the broker circuit breaker.
///
/// While the breaker is open, sends fail immediately with
/// [`IngestError::BreakerOpen`] instead of waiting on the broker.
#[derive(Clone)]
pub struct GuardedProducer {
    producer: Arc<dyn LogProducer>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedProducer {
    pub fn new(producer: Arc<dyn LogProducer>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { producer, breaker }
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<(), IngestError> {
        if !self.breaker.allow_request().await {
            return Err(IngestError::breaker_open(self.breaker.name()));
        }

        match self.producer.send(message).await {
            Ok(()) => {
                self.breaker.record_success().await;
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure().await;
                Err(e)
            }
        }
    }
}
