//! Messaging Gateway boundary.
//!
//! The messaging platform itself is a black box: it authenticates the
//! sender, delivers inbound events and accepts outbound send requests.
//! The core only sees [`InboundEvent`] in and opaque text/photo payloads
//! out through the [`Gateway`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CustomerId;

/// Delivery to one recipient failed. During broadcast this is counted,
/// never fatal for the batch.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("delivery to {to} failed: {reason}")]
    Delivery { to: CustomerId, reason: String },
}

/// Outbound send surface. Payloads are opaque to the core.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    async fn send_text(&self, to: CustomerId, text: &str) -> Result<(), GatewayError>;

    async fn send_photo(
        &self,
        to: CustomerId,
        photo_ref: &str,
        caption: &str,
    ) -> Result<(), GatewayError>;
}

/// One inbound chat event, as delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Slash command with its raw argument string.
    Command {
        name: String,
        #[serde(default)]
        args: String,
    },
    /// Inline button press payload (e.g. `country_India`).
    Button { payload: String },
    /// Contact-share: the platform-verified phone-equivalent token.
    ContactShared { token: String },
    /// Photo upload (payment screenshot); opaque file reference.
    Photo { file_ref: String },
    /// Free text outside the command/button surface.
    Text { body: String },
}

/// Stdout gateway for running the core against a piped event stream:
/// every outbound send is printed as one JSON line.
pub struct ConsoleGateway;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ConsoleOutbound<'a> {
    Text {
        to: CustomerId,
        text: &'a str,
    },
    Photo {
        to: CustomerId,
        photo_ref: &'a str,
        caption: &'a str,
    },
}

#[async_trait]
impl Gateway for ConsoleGateway {
    async fn send_text(&self, to: CustomerId, text: &str) -> Result<(), GatewayError> {
        let line =
            serde_json::to_string(&ConsoleOutbound::Text { to, text }).map_err(|e| {
                GatewayError::Delivery {
                    to,
                    reason: e.to_string(),
                }
            })?;
        println!("{line}");
        Ok(())
    }

    async fn send_photo(
        &self,
        to: CustomerId,
        photo_ref: &str,
        caption: &str,
    ) -> Result<(), GatewayError> {
        let line = serde_json::to_string(&ConsoleOutbound::Photo {
            to,
            photo_ref,
            caption,
        })
        .map_err(|e| GatewayError::Delivery {
            to,
            reason: e.to_string(),
        })?;
        println!("{line}");
        Ok(())
    }
}

#[cfg(any(test, feature = "mock-gateway"))]
pub mod mock {
    //! Recording gateway for tests and dry runs.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Text {
            to: CustomerId,
            text: String,
        },
        Photo {
            to: CustomerId,
            photo_ref: String,
            caption: String,
        },
    }

    #[derive(Default)]
    pub struct MockGateway {
        sent: Mutex<Vec<Sent>>,
        unreachable: Mutex<HashSet<CustomerId>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make deliveries to `id` fail, simulating a blocked or invalid
        /// recipient.
        pub fn set_unreachable(&self, id: CustomerId) {
            self.unreachable.lock().expect("Mutex poisoned").insert(id);
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().expect("Mutex poisoned").clone()
        }

        /// Text payloads delivered to one recipient, in send order.
        pub fn texts_to(&self, id: CustomerId) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text { to, text } if to == id => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn check_reachable(&self, to: CustomerId) -> Result<(), GatewayError> {
            if self
                .unreachable
                .lock()
                .expect("Mutex poisoned")
                .contains(&to)
            {
                return Err(GatewayError::Delivery {
                    to,
                    reason: "recipient unreachable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn send_text(&self, to: CustomerId, text: &str) -> Result<(), GatewayError> {
            self.check_reachable(to)?;
            self.sent.lock().expect("Mutex poisoned").push(Sent::Text {
                to,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_photo(
            &self,
            to: CustomerId,
            photo_ref: &str,
            caption: &str,
        ) -> Result<(), GatewayError> {
            self.check_reachable(to)?;
            self.sent.lock().expect("Mutex poisoned").push(Sent::Photo {
                to,
                photo_ref: photo_ref.to_string(),
                caption: caption.to_string(),
            });
            Ok(())
        }
    }
}
