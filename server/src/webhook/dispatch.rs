//! Event routing and the payment-succeeded handler.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tracing::{error, info};

use super::error::WebhookError;
use super::event::{EventEnvelope, EventType, PaymentIntent};
use crate::notify::{Notifier, SendError};

/// How an acknowledged event was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// A handler ran (its side effects may still have failed)
    Handled,
    /// No handler for this type; acknowledged so the provider stops sending it
    Ignored,
}

/// Result of running one delivery through the pipeline.
#[derive(Debug)]
pub enum DispatchOutcome {
    Acknowledged(Acknowledgement),
    Rejected(WebhookError),
}

impl DispatchOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Acknowledged(_) => StatusCode::OK,
            Self::Rejected(e) => e.status_code(),
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged(_))
    }
}

/// Routes decoded events to their handlers.
pub struct EventDispatcher {
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl EventDispatcher {
    /// `notify_timeout` caps each notifier call, whatever the notifier's own
    /// client does.
    pub fn new(notifier: Arc<dyn Notifier>, notify_timeout: Duration) -> Self {
        Self {
            notifier,
            notify_timeout,
        }
    }

    /// Route one event. Unrecognized types are always acknowledged.
    pub async fn dispatch(&self, event: &EventEnvelope) -> DispatchOutcome {
        match event.kind() {
            EventType::PaymentIntentSucceeded => {
                let intent = match event.data_as::<PaymentIntent>("payment intent") {
                    Ok(intent) => intent,
                    Err(e) => {
                        error!(
                            event_id = ?event.id,
                            event_type = %event.event_type,
                            error = %e,
                            "stripe_event_schema_mismatch"
                        );
                        return DispatchOutcome::Rejected(e.into());
                    }
                };

                self.handle_payment_succeeded(&intent).await;
                DispatchOutcome::Acknowledged(Acknowledgement::Handled)
            }
            EventType::Unrecognized => {
                info!(
                    event_id = ?event.id,
                    event_type = %event.event_type,
                    "stripe_event_unhandled"
                );
                DispatchOutcome::Acknowledged(Acknowledgement::Ignored)
            }
        }
    }

    /// Send the receipt notification for a successful payment.
    ///
    /// A missing address is not an error. Send failures are logged and
    /// swallowed: the event itself was processed.
    pub async fn handle_payment_succeeded(&self, intent: &PaymentIntent) {
        let Some(email) = intent.notification_target() else {
            info!(payment_intent = ?intent.id, "payment_intent_no_receipt_email");
            return;
        };

        info!(
            payment_intent = ?intent.id,
            amount = ?intent.amount,
            currency = ?intent.currency,
            to = %email,
            "payment_intent_succeeded"
        );

        let sent = tokio::time::timeout(self.notify_timeout, self.notifier.send(email))
            .await
            .unwrap_or(Err(SendError::Timeout));

        if let Err(e) = sent {
            error!(
                payment_intent = ?intent.id,
                to = %email,
                error = %e,
                "payment_notification_failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, address: &str) -> Result<(), SendError> {
            self.sent.lock().unwrap().push(address.to_string());
            if self.fail {
                Err(SendError::Rejected { status: 500 })
            } else {
                Ok(())
            }
        }
    }

    /// Never finishes a send.
    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        async fn send(&self, _address: &str) -> Result<(), SendError> {
            std::future::pending().await
        }
    }

    const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

    fn dispatcher_for(notifier: Arc<dyn Notifier>) -> EventDispatcher {
        EventDispatcher::new(notifier, NOTIFY_TIMEOUT)
    }

    fn envelope(json: &str) -> EventEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_payment_succeeded_sends() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher_for(notifier.clone());

        let outcome = dispatcher
            .dispatch(&envelope(
                r#"{"type":"payment_intent.succeeded","data":{"receipt_email":"a@b.com"}}"#,
            ))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Acknowledged(Acknowledgement::Handled)
        ));
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["a@b.com".to_string()]);
    }

    #[tokio::test]
    async fn test_payment_succeeded_without_email() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher_for(notifier.clone());

        let outcome = dispatcher
            .dispatch(&envelope(
                r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","receipt_email":null}}}"#,
            ))
            .await;

        assert_eq!(outcome.status_code(), StatusCode::OK);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_swallowed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let dispatcher = dispatcher_for(notifier.clone());

        let outcome = dispatcher
            .dispatch(&envelope(
                r#"{"type":"payment_intent.succeeded","data":{"receipt_email":"a@b.com"}}"#,
            ))
            .await;

        assert_eq!(outcome.status_code(), StatusCode::OK);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_notifier_is_cut_off() {
        let dispatcher = EventDispatcher::new(Arc::new(StalledNotifier), Duration::from_millis(50));

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch(&envelope(
                r#"{"type":"payment_intent.succeeded","data":{"receipt_email":"a@b.com"}}"#,
            )),
        )
        .await
        .expect("dispatch must not wait on the notifier past its budget");

        assert!(matches!(
            outcome,
            DispatchOutcome::Acknowledged(Acknowledgement::Handled)
        ));
    }

    #[tokio::test]
    async fn test_payment_succeeded_bad_schema() {
        let dispatcher = dispatcher_for(Arc::new(RecordingNotifier::default()));

        let outcome = dispatcher
            .dispatch(&envelope(r#"{"type":"payment_intent.succeeded","data":"oops"}"#))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected(WebhookError::Schema(_))
        ));
        assert_eq!(outcome.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unrecognized_ignored() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher_for(notifier.clone());

        let outcome = dispatcher
            .dispatch(&envelope(r#"{"type":"charge.refunded","data":{"object":{}}}"#))
            .await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Acknowledged(Acknowledgement::Ignored)
        ));
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_dispatch_total_for_unrecognized(tag in "\\PC*", data in prop::option::of("[a-z]{0,8}")) {
            prop_assume!(tag != "payment_intent.succeeded");

            let event = EventEnvelope {
                id: None,
                event_type: tag,
                raw_data: data.map(serde_json::Value::String).unwrap_or_default(),
            };
            let dispatcher = dispatcher_for(Arc::new(RecordingNotifier::default()));

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let outcome = rt.block_on(dispatcher.dispatch(&event));

            prop_assert!(matches!(
                outcome,
                DispatchOutcome::Acknowledged(Acknowledgement::Ignored)
            ));
        }
    }
}
