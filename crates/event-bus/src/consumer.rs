//! Subscription loop that decodes messages and dispatches them to a handler.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Subscription;

/// Spawns the consume loop for `subscription`.
///
/// Each message body is decoded into `T` and handed to `handler` on its own
/// task, so a handler that waits on another subscription never blocks this
/// one. Decode failures and handler errors are logged and the message is
/// dropped; there is no redelivery. The loop ends when `shutdown` is
/// cancelled or the bus goes away.
pub fn consume<T, F, Fut, E>(
    mut subscription: Subscription,
    shutdown: CancellationToken,
    handler: F,
) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        let exchange = subscription.exchange().to_string();
        let pattern = subscription.pattern().to_string();
        tracing::info!(%exchange, %pattern, "consuming");

        loop {
            let message = tokio::select! {
                () = shutdown.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let routing_key = message.routing_key;
            let value: T = match serde_json::from_value(message.payload) {
                Ok(value) => value,
                Err(e) => {
                    metrics::counter!("bus_decode_errors_total").increment(1);
                    tracing::warn!(%exchange, %routing_key, error = %e, "failed to decode message");
                    continue;
                }
            };

            let handler = Arc::clone(&handler);
            let exchange = exchange.clone();
            tokio::spawn(async move {
                if let Err(e) = handler(value).await {
                    metrics::counter!("bus_handler_errors_total").increment(1);
                    tracing::error!(%exchange, %routing_key, error = %e, "failed to handle message");
                }
            });
        }

        tracing::info!(%exchange, %pattern, "subscription closed");
    })
}
