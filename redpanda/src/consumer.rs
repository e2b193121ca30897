//! rdkafka-backed [`TableConsumer`].

use crate::defaults::{self, DEFAULT_CLIENT_NAME};
use crate::deserializer::Deserializer;
use chrono::{DateTime, Utc};
use eventsource_core::config::TableConfig;
use eventsource_core::consumer::{ConsumerEvent, TableConsumer};
use eventsource_core::error::ConsumerError;
use eventsource_core::message::{Header, Message, PartitionId, PartitionWatermark};
use rdkafka::Offset as KafkaOffset;
use rdkafka::config::ClientConfig;
use rdkafka::TopicPartitionList;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers, Message as _};
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout for watermark fetches.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// A blocking Kafka/Redpanda consumer feeding an event-sourced table.
///
/// Partition assignment happens inside `poll`. After every poll the consumer
/// compares its assignment with the last one it reported, and reports a change
/// as [`ConsumerEvent::Assigned`] before any message from the same poll.
///
/// # Example
///
/// ```no_run
/// use eventsource_core::TableConfig;
/// use eventsource_redpanda::RedpandaTableConsumer;
/// use eventsource_redpanda::deserializer::Utf8Deserializer;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TableConfig::new("alarm-registrations")
///     .with_client_property("bootstrap.servers", "localhost:9092");
/// let consumer = RedpandaTableConsumer::from_config(&config, Utf8Deserializer, Utf8Deserializer)?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaTableConsumer<KD: Deserializer, VD: Deserializer> {
    consumer: BaseConsumer,
    key_deserializer: KD,
    value_deserializer: VD,
    metadata_timeout: Duration,
    topic: Option<String>,
    assigned: Vec<PartitionId>,
    /// A message polled together with an assignment change, delivered next.
    stashed: Option<Message<KD::Output, VD::Output>>,
}

impl<KD: Deserializer, VD: Deserializer> RedpandaTableConsumer<KD, VD> {
    /// Create a consumer from a table configuration.
    ///
    /// `config.client_properties` override the [defaults](crate::defaults).
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::CreationFailed`] if rdkafka rejects the configuration.
    pub fn from_config(
        config: &TableConfig,
        key_deserializer: KD,
        value_deserializer: VD,
    ) -> Result<Self, ConsumerError> {
        config
            .client_properties
            .iter()
            .fold(Self::builder(), |builder, (key, value)| {
                builder.property(key, value)
            })
            .build(key_deserializer, value_deserializer)
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedpandaTableConsumerBuilder {
        RedpandaTableConsumerBuilder::default()
    }

    fn subscribed_topic(&self) -> Result<&str, ConsumerError> {
        self.topic.as_deref().ok_or(ConsumerError::NotSubscribed)
    }

    /// Report the current assignment if it differs from the last one reported.
    fn assignment_change(&mut self) -> Result<Option<Vec<PartitionId>>, ConsumerError> {
        let topic = self.subscribed_topic()?.to_string();
        let assignment = self
            .consumer
            .assignment()
            .map_err(|e| ConsumerError::TransportError(format!("Failed to read assignment: {e}")))?;

        let mut partitions: Vec<PartitionId> = assignment
            .elements_for_topic(&topic)
            .iter()
            .map(rdkafka::topic_partition_list::TopicPartitionListElem::partition)
            .collect();
        partitions.sort_unstable();

        if partitions == self.assigned {
            return Ok(None);
        }
        self.assigned.clone_from(&partitions);
        if partitions.is_empty() {
            tracing::info!(topic = %topic, "Partitions revoked");
            return Ok(None);
        }
        Ok(Some(partitions))
    }
}

impl<KD: Deserializer, VD: Deserializer> TableConsumer for RedpandaTableConsumer<KD, VD>
where
    KD::Output: Eq + std::hash::Hash,
{
    type Key = KD::Output;
    type Value = VD::Output;

    fn subscribe(&mut self, topic: &str) -> Result<(), ConsumerError> {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| ConsumerError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(topic = %topic, "Subscribed");
        self.topic = Some(topic.to_string());
        Ok(())
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumerEvent<Self::Key, Self::Value>>, ConsumerError> {
        self.subscribed_topic()?;
        if let Some(message) = self.stashed.take() {
            return Ok(Some(ConsumerEvent::Message(message)));
        }

        let message = match self.consumer.poll(timeout) {
            None => None,
            Some(Err(e)) => {
                return Err(ConsumerError::TransportError(format!(
                    "Failed to receive message: {e}"
                )));
            }
            Some(Ok(borrowed)) => Some(convert(
                &self.key_deserializer,
                &self.value_deserializer,
                &borrowed,
            )?),
        };

        if let Some(partitions) = self.assignment_change()? {
            self.stashed = message;
            return Ok(Some(ConsumerEvent::Assigned(partitions)));
        }
        Ok(message.map(ConsumerEvent::Message))
    }

    fn seek_to_beginning(&mut self, partitions: &[PartitionId]) -> Result<(), ConsumerError> {
        let topic = self.subscribed_topic()?.to_string();
        let current = self
            .consumer
            .assignment()
            .map_err(|e| seek_failed(partitions, &e))?;
        let rewound =
            rewound_assignment(&topic, &current, partitions).map_err(|e| seek_failed(partitions, &e))?;
        // Explicit offsets override any offset committed by the group.
        self.consumer
            .assign(&rewound)
            .map_err(|e| seek_failed(partitions, &e))?;
        tracing::debug!(topic = %topic, partitions = ?partitions, "Rewound to beginning");

        // The rewound partitions will yield the stashed message again.
        if self
            .stashed
            .as_ref()
            .is_some_and(|message| partitions.contains(&message.partition()))
        {
            self.stashed = None;
        }
        Ok(())
    }

    fn watermarks(&mut self, partition: PartitionId) -> Result<PartitionWatermark, ConsumerError> {
        let topic = self.subscribed_topic()?.to_string();
        let (low, high) = self
            .consumer
            .fetch_watermarks(&topic, partition, self.metadata_timeout)
            .map_err(|e| ConsumerError::WatermarkFetchFailed {
                partition,
                reason: e.to_string(),
            })?;
        Ok(PartitionWatermark::new(low, high))
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
        self.stashed = None;
        tracing::info!(topic = ?self.topic, "Consumer closed");
    }
}

/// The current assignment with `partitions` set to start from the beginning.
fn rewound_assignment(
    topic: &str,
    current: &TopicPartitionList,
    partitions: &[PartitionId],
) -> Result<TopicPartitionList, KafkaError> {
    let mut list = TopicPartitionList::new();
    for element in current.elements() {
        if element.topic() != topic || !partitions.contains(&element.partition()) {
            list.add_partition_offset(element.topic(), element.partition(), element.offset())?;
        }
    }
    for &partition in partitions {
        list.add_partition_offset(topic, partition, KafkaOffset::Beginning)?;
    }
    Ok(list)
}

fn seek_failed(partitions: &[PartitionId], error: &KafkaError) -> ConsumerError {
    ConsumerError::SeekFailed {
        partition: partitions.first().copied().unwrap_or_default(),
        reason: error.to_string(),
    }
}

/// Decode a record key. Table records are keyed, so a null key is rejected
/// rather than conflated with an empty one.
fn decode_key<KD: Deserializer>(
    key_deserializer: &KD,
    key: Option<&[u8]>,
) -> Result<KD::Output, String> {
    let bytes = key.ok_or_else(|| "null key, table records must be keyed".to_string())?;
    key_deserializer.deserialize(bytes).map_err(|e| e.to_string())
}

/// Decode a polled Kafka message.
fn convert<KD: Deserializer, VD: Deserializer>(
    key_deserializer: &KD,
    value_deserializer: &VD,
    borrowed: &BorrowedMessage<'_>,
) -> Result<Message<KD::Output, VD::Output>, ConsumerError> {
    let partition = borrowed.partition();
    let offset = borrowed.offset();
    let decode_error = |what: &str, e: &dyn std::fmt::Display| {
        ConsumerError::DeserializationFailed(format!(
            "{what} at {}/{partition}@{offset}: {e}",
            borrowed.topic()
        ))
    };

    let key = decode_key(key_deserializer, borrowed.key()).map_err(|e| decode_error("key", &e))?;
    let value = borrowed
        .payload()
        .map(|payload| value_deserializer.deserialize(payload))
        .transpose()
        .map_err(|e| decode_error("value", &e))?;

    let headers = borrowed
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| Header::new(header.key, header.value.map(<[u8]>::to_vec)))
                .collect()
        })
        .unwrap_or_default();

    tracing::trace!(
        topic = borrowed.topic(),
        partition = partition,
        offset = offset,
        tombstone = value.is_none(),
        "Received message"
    );

    let message = Message::new(key, value, partition, offset).with_headers(headers);
    Ok(match borrowed.timestamp().to_millis().and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(timestamp) => message.with_timestamp(timestamp),
        None => message,
    })
}

/// Builder for a [`RedpandaTableConsumer`].
///
/// Unset properties fall back to [`defaults::client_defaults`].
#[derive(Debug, Default)]
pub struct RedpandaTableConsumerBuilder {
    client_name: Option<String>,
    properties: BTreeMap<String, String>,
    metadata_timeout: Option<Duration>,
}

impl RedpandaTableConsumerBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(self, brokers: impl Into<String>) -> Self {
        self.property("bootstrap.servers", brokers)
    }

    /// Set an explicit consumer group id instead of the generated one.
    #[must_use]
    pub fn group_id(self, group_id: impl Into<String>) -> Self {
        self.property("group.id", group_id)
    }

    /// Set the client name, used as the generated group id prefix.
    ///
    /// Default: `eventsource-table`
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Set any rdkafka client property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the timeout for watermark fetches.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = Some(timeout);
        self
    }

    /// The client properties the consumer will be created with.
    #[must_use]
    pub fn resolved_properties(&self) -> BTreeMap<String, String> {
        let client_name = self.client_name.as_deref().unwrap_or(DEFAULT_CLIENT_NAME);
        defaults::merge(defaults::client_defaults(client_name), &self.properties)
    }

    /// Build the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::CreationFailed`] if rdkafka rejects the configuration.
    pub fn build<KD: Deserializer, VD: Deserializer>(
        self,
        key_deserializer: KD,
        value_deserializer: VD,
    ) -> Result<RedpandaTableConsumer<KD, VD>, ConsumerError> {
        let properties = self.resolved_properties();
        let mut client_config = ClientConfig::new();
        for (key, value) in &properties {
            client_config.set(key, value);
        }

        let consumer: BaseConsumer = client_config
            .create()
            .map_err(|e| ConsumerError::CreationFailed(e.to_string()))?;

        tracing::info!(
            brokers = properties.get("bootstrap.servers").map(String::as_str),
            group_id = properties.get("group.id").map(String::as_str),
            "Table consumer created"
        );

        Ok(RedpandaTableConsumer {
            consumer,
            key_deserializer,
            value_deserializer,
            metadata_timeout: self.metadata_timeout.unwrap_or(DEFAULT_METADATA_TIMEOUT),
            topic: None,
            assigned: Vec::new(),
            stashed: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::deserializer::{BytesDeserializer, Utf8Deserializer};

    #[test]
    fn consumer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<RedpandaTableConsumer<Utf8Deserializer, BytesDeserializer>>();
    }

    #[test]
    fn builder_properties_override_defaults() {
        let properties = RedpandaTableConsumer::<Utf8Deserializer, Utf8Deserializer>::builder()
            .brokers("broker:9092")
            .client_name("alarms")
            .property("session.timeout.ms", "6000")
            .resolved_properties();

        assert_eq!(properties["bootstrap.servers"], "broker:9092");
        assert!(properties["group.id"].starts_with("alarms"));
        assert_eq!(properties["session.timeout.ms"], "6000");
        assert_eq!(properties["enable.auto.commit"], "false");
    }

    #[test]
    fn explicit_group_id_wins() {
        let properties = RedpandaTableConsumerBuilder::default()
            .group_id("fixed")
            .resolved_properties();
        assert_eq!(properties["group.id"], "fixed");
    }

    #[test]
    fn polling_before_subscribe_fails() {
        // Creating a consumer does not contact the broker.
        let mut consumer = RedpandaTableConsumerBuilder::default()
            .brokers("localhost:1")
            .build(Utf8Deserializer, Utf8Deserializer)
            .unwrap();
        assert_eq!(
            consumer.poll(Duration::ZERO).unwrap_err(),
            ConsumerError::NotSubscribed
        );
        assert_eq!(
            consumer.watermarks(0).unwrap_err(),
            ConsumerError::NotSubscribed
        );
        assert_eq!(
            consumer.seek_to_beginning(&[0]).unwrap_err(),
            ConsumerError::NotSubscribed
        );
    }

    #[test]
    fn builders_generate_distinct_groups() {
        let first = RedpandaTableConsumerBuilder::default().resolved_properties();
        let second = RedpandaTableConsumerBuilder::default().resolved_properties();
        assert_ne!(first["group.id"], second["group.id"]);
    }

    #[test]
    fn rewound_assignment_starts_requested_partitions_at_beginning() {
        let mut current = TopicPartitionList::new();
        current
            .add_partition_offset("alarms", 0, KafkaOffset::Offset(42))
            .unwrap();
        current
            .add_partition_offset("alarms", 1, KafkaOffset::Stored)
            .unwrap();
        current
            .add_partition_offset("other", 0, KafkaOffset::Offset(7))
            .unwrap();

        let rewound = rewound_assignment("alarms", &current, &[0, 2]).unwrap();

        let offset = |topic: &str, partition| {
            rewound
                .find_partition(topic, partition)
                .map(|element| element.offset())
        };
        assert_eq!(rewound.count(), 4);
        assert_eq!(offset("alarms", 0), Some(KafkaOffset::Beginning));
        assert_eq!(offset("alarms", 2), Some(KafkaOffset::Beginning));
        assert_eq!(offset("alarms", 1), Some(KafkaOffset::Stored));
        assert_eq!(offset("other", 0), Some(KafkaOffset::Offset(7)));
    }

    #[test]
    fn null_keys_are_rejected_not_treated_as_empty() {
        let error = decode_key(&Utf8Deserializer, None).unwrap_err();
        assert!(error.contains("null key"), "unexpected error: {error}");
        assert_eq!(decode_key(&Utf8Deserializer, Some(b"")).unwrap(), "");
        assert_eq!(decode_key(&Utf8Deserializer, Some(b"lobby")).unwrap(), "lobby");
    }
}
