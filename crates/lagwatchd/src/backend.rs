//! Kafka client backend selection.

use std::sync::Arc;

use lagwatch_client::{ClientError, ClientFactory};

#[cfg(feature = "rdkafka")]
pub fn factory() -> Result<Arc<dyn ClientFactory>, ClientError> {
    Ok(Arc::new(lagwatch_client::librdkafka::RdKafkaFactory))
}

#[cfg(not(feature = "rdkafka"))]
pub fn factory() -> Result<Arc<dyn ClientFactory>, ClientError> {
    Err(ClientError::Unsupported(
        "built without a Kafka client backend, rebuild with `--features rdkafka`".to_string(),
    ))
}
