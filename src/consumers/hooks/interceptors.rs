//! A collection of interceptors.

use crate::consumers::{
    get_message_local_item, set_message_local_item, Interceptor, Message, ProcessingOutcome,
    CORRELATION_ID_ATTRIBUTE,
};
use uuid::Uuid;

/// The correlation id of the message being processed.
///
/// Stored in message-local storage by [`CorrelationIdInterceptor`]: retrieve it with
/// [`get_message_local_item`] from anywhere within the pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Stamp a correlation id on every message.
///
/// The id sent by the producer (the `correlationId` attribute) is kept when present, otherwise a
/// short random one is generated. The id is then available:
///
/// - as the `correlationId` attribute of the message;
/// - in message-local storage, as a [`CorrelationId`].
pub struct CorrelationIdInterceptor;

#[async_trait::async_trait]
impl Interceptor for CorrelationIdInterceptor {
    fn name(&self) -> &str {
        "correlation-id"
    }

    async fn before(&self, message: &mut Message) -> Result<(), anyhow::Error> {
        let correlation_id = match message.correlation_id() {
            Some(id) => id.to_owned(),
            None => {
                let id = Uuid::new_v4().simple().to_string()[..8].to_owned();
                message
                    .attributes
                    .insert(CORRELATION_ID_ATTRIBUTE.into(), id.clone());
                id
            }
        };
        tracing::info!(
            message_id = %message.id,
            correlation_id = %correlation_id,
            "[interceptor:before] correlationId={}",
            correlation_id
        );
        set_message_local_item(CorrelationId(correlation_id));
        Ok(())
    }

    async fn after(
        &self,
        message: &Message,
        outcome: &ProcessingOutcome,
    ) -> Result<(), anyhow::Error> {
        let correlation_id = get_message_local_item::<CorrelationId>()
            .map(|c| c.0)
            .or_else(|| message.correlation_id().map(ToOwned::to_owned))
            .unwrap_or_default();
        match outcome.error() {
            None => tracing::info!(
                message_id = %message.id,
                correlation_id = %correlation_id,
                "[interceptor:after] correlationId={} processed successfully",
                correlation_id
            ),
            Some(e) => tracing::info!(
                message_id = %message.id,
                correlation_id = %correlation_id,
                error = %e,
                "[interceptor:after] correlationId={} failed",
                correlation_id
            ),
        }
        Ok(())
    }
}
