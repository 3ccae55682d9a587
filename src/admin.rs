//! Admin Command Authority - privileged operations gated by one identity.
//!
//! Every operation first compares the invoking identity against the
//! single configured admin id. A mismatch is silently ignored, not an
//! error: the messaging platform already authenticated the identity, and
//! answering "not authorized" would only advertise the command surface.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::gateway::Gateway;
use crate::ledger::Ledger;
use crate::registry::Registry;
use crate::store::KvStore;
use crate::types::{Amount, CustomerId};
use crate::workflow::OrderWorkflow;

/// The privileged command surface. Literal command strings are just the
/// parse layer; semantics live in [`AdminAuthority::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Credit {
        customer_id: CustomerId,
        amount: Amount,
    },
    Debit {
        customer_id: CustomerId,
        amount: Amount,
    },
    /// Deliver number/credential text and fulfill pending orders.
    DeliverCredential {
        customer_id: CustomerId,
        text: String,
    },
    Broadcast {
        text: String,
    },
    /// Direct admin-to-customer message.
    Message {
        customer_id: CustomerId,
        text: String,
    },
}

impl AdminCommand {
    /// Parse a slash command. `None` means the name is not part of the
    /// privileged surface; `Some(Err(usage))` means the name matched but
    /// the arguments did not.
    pub fn parse(name: &str, args: &str) -> Option<Result<Self, &'static str>> {
        match name {
            "/add_balance" => Some(
                parse_id_amount(args)
                    .map(|(customer_id, amount)| AdminCommand::Credit {
                        customer_id,
                        amount,
                    })
                    .ok_or("usage: /add_balance <customer_id> <amount>"),
            ),
            "/take_balance" => Some(
                parse_id_amount(args)
                    .map(|(customer_id, amount)| AdminCommand::Debit {
                        customer_id,
                        amount,
                    })
                    .ok_or("usage: /take_balance <customer_id> <amount>"),
            ),
            "/send_number" => Some(
                parse_id_text(args)
                    .map(|(customer_id, text)| AdminCommand::DeliverCredential {
                        customer_id,
                        text,
                    })
                    .ok_or("usage: /send_number <customer_id> <credential text>"),
            ),
            // The confirmation code that follows the number is credential
            // delivery too; fulfilling an already-fulfilled order is a no-op.
            "/send_code" => Some(
                parse_id_text(args)
                    .map(|(customer_id, text)| AdminCommand::DeliverCredential {
                        customer_id,
                        text,
                    })
                    .ok_or("usage: /send_code <customer_id> <code>"),
            ),
            "/msg" => Some(
                parse_id_text(args)
                    .map(|(customer_id, text)| AdminCommand::Message { customer_id, text })
                    .ok_or("usage: /msg <customer_id> <text>"),
            ),
            "/broadcast" => {
                let text = args.trim();
                Some(if text.is_empty() {
                    Err("usage: /broadcast <text>")
                } else {
                    Ok(AdminCommand::Broadcast {
                        text: text.to_string(),
                    })
                })
            }
            _ => None,
        }
    }
}

fn parse_id_amount(args: &str) -> Option<(CustomerId, Amount)> {
    let mut parts = args.split_whitespace();
    let id = parts.next()?.parse().ok()?;
    let amount: Amount = parts.next()?.parse().ok()?;
    // Zero does nothing; anything above i64::MAX cannot be expressed as a
    // signed ledger delta and would otherwise wrap into a debit.
    if amount == 0 || i64::try_from(amount).is_err() || parts.next().is_some() {
        return None;
    }
    Some((id, amount))
}

fn parse_id_text(args: &str) -> Option<(CustomerId, String)> {
    let args = args.trim_start();
    let (id_str, rest) = args.split_once(char::is_whitespace)?;
    let id = id_str.parse().ok()?;
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some((id, text.to_string()))
}

/// What an executed command did, for the reply to the admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    Credited {
        customer_id: CustomerId,
        amount: Amount,
        balance: Amount,
    },
    Debited {
        customer_id: CustomerId,
        amount: Amount,
        balance: Amount,
    },
    CredentialDelivered {
        customer_id: CustomerId,
        fulfilled: usize,
    },
    Broadcast {
        delivered: usize,
        attempted: usize,
    },
    MessageSent {
        customer_id: CustomerId,
    },
}

pub struct AdminAuthority<S, G> {
    admin_id: CustomerId,
    ledger: Ledger<S>,
    registry: Registry<S>,
    workflow: Arc<OrderWorkflow<S>>,
    gateway: Arc<G>,
}

impl<S: KvStore, G: Gateway> AdminAuthority<S, G> {
    pub fn new(
        admin_id: CustomerId,
        ledger: Ledger<S>,
        registry: Registry<S>,
        workflow: Arc<OrderWorkflow<S>>,
        gateway: Arc<G>,
    ) -> Self {
        Self {
            admin_id,
            ledger,
            registry,
            workflow,
            gateway,
        }
    }

    pub fn admin_id(&self) -> CustomerId {
        self.admin_id
    }

    pub fn is_admin(&self, id: CustomerId) -> bool {
        id == self.admin_id
    }

    /// Execute a privileged command. `Ok(None)` means the invoker was not
    /// the admin and the command was silently dropped.
    pub async fn execute(
        &self,
        invoker: CustomerId,
        command: AdminCommand,
    ) -> Result<Option<AdminOutcome>, CoreError> {
        if !self.is_admin(invoker) {
            debug!(invoker, ?command, "privileged command from non-admin ignored");
            return Ok(None);
        }

        let outcome = match command {
            AdminCommand::Credit {
                customer_id,
                amount,
            } => {
                let delta = i64::try_from(amount).map_err(|_| CoreError::Overflow)?;
                let balance = self.ledger.adjust(customer_id, delta).await?;
                info!(customer_id, amount, balance, "admin credit");
                self.notify_best_effort(customer_id, &format!("Balance credited: +{amount}"))
                    .await;
                AdminOutcome::Credited {
                    customer_id,
                    amount,
                    balance,
                }
            }
            AdminCommand::Debit {
                customer_id,
                amount,
            } => {
                let delta = i64::try_from(amount).map_err(|_| CoreError::Overflow)?;
                // InsufficientFunds propagates; the balance is unchanged.
                let balance = self.ledger.adjust(customer_id, -delta).await?;
                info!(customer_id, amount, balance, "admin debit");
                self.notify_best_effort(customer_id, &format!("Balance debited: -{amount}"))
                    .await;
                AdminOutcome::Debited {
                    customer_id,
                    amount,
                    balance,
                }
            }
            AdminCommand::DeliverCredential { customer_id, text } => {
                self.gateway
                    .send_text(customer_id, &text)
                    .await
                    .map_err(|e| CoreError::DeliveryFailed(e.to_string()))?;
                let fulfilled = self.workflow.fulfill(customer_id);
                info!(customer_id, fulfilled, "credential delivered");
                AdminOutcome::CredentialDelivered {
                    customer_id,
                    fulfilled,
                }
            }
            AdminCommand::Broadcast { text } => {
                let recipients = self.registry.all().await?;
                let attempted = recipients.len();
                let mut delivered = 0;
                for (customer_id, _) in recipients {
                    match self.gateway.send_text(customer_id, &text).await {
                        Ok(()) => delivered += 1,
                        // One unreachable recipient never aborts the batch.
                        Err(e) => warn!(customer_id, %e, "broadcast delivery failed"),
                    }
                }
                info!(delivered, attempted, "broadcast finished");
                AdminOutcome::Broadcast {
                    delivered,
                    attempted,
                }
            }
            AdminCommand::Message { customer_id, text } => {
                self.gateway
                    .send_text(customer_id, &format!("Message from admin:\n{text}"))
                    .await
                    .map_err(|e| CoreError::DeliveryFailed(e.to_string()))?;
                AdminOutcome::MessageSent { customer_id }
            }
        };
        Ok(Some(outcome))
    }

    async fn notify_best_effort(&self, customer_id: CustomerId, text: &str) {
        if let Err(e) = self.gateway.send_text(customer_id, text).await {
            debug!(customer_id, %e, "balance notification not delivered");
        }
    }
}
