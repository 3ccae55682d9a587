//! Dispatch - routes inbound gateway events to core operations.
//!
//! One call to [`Dispatcher::dispatch`] handles one inbound chat event;
//! many such calls run concurrently as independent tasks sharing the
//! store. Menu/keyboard composition is the platform layer's job - the
//! texts produced here are minimal payloads, opaque to the core contract.
//!
//! Failure policy: insufficient funds routes to the top-up/referral
//! prompt; every other component failure degrades to a generic "try
//! again" without exposing internal detail.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::admin::{AdminAuthority, AdminCommand, AdminOutcome};
use crate::error::CoreError;
use crate::gateway::{EventKind, Gateway, InboundEvent};
use crate::ledger::Ledger;
use crate::referral::ReferralEngine;
use crate::registry::Registry;
use crate::store::KvStore;
use crate::types::CustomerId;
use crate::workflow::{Admission, OrderWorkflow, SessionMap};

const TRY_AGAIN: &str = "Something went wrong. Please try again.";

pub struct Dispatcher<S, G> {
    ledger: Ledger<S>,
    registry: Registry<S>,
    referral: ReferralEngine<S>,
    workflow: Arc<OrderWorkflow<S>>,
    sessions: SessionMap,
    authority: AdminAuthority<S, G>,
    gateway: Arc<G>,
}

impl<S: KvStore, G: Gateway> Dispatcher<S, G> {
    pub fn new(
        ledger: Ledger<S>,
        registry: Registry<S>,
        referral: ReferralEngine<S>,
        workflow: Arc<OrderWorkflow<S>>,
        authority: AdminAuthority<S, G>,
        gateway: Arc<G>,
    ) -> Self {
        Self {
            ledger,
            registry,
            referral,
            workflow,
            sessions: SessionMap::new(),
            authority,
            gateway,
        }
    }

    /// Handle one inbound event. Never returns an error: transient
    /// failures degrade to a generic retry prompt for the customer.
    pub async fn dispatch(&self, event: InboundEvent) {
        let customer_id = event.customer_id;
        if let Err(e) = self.route(event).await {
            warn!(customer_id, %e, "event handling failed");
            if let Err(e) = self.gateway.send_text(customer_id, TRY_AGAIN).await {
                debug!(customer_id, %e, "retry prompt not delivered");
            }
        }
    }

    async fn route(&self, event: InboundEvent) -> Result<(), CoreError> {
        let customer_id = event.customer_id;
        let display_name = event.display_name.as_deref();
        match event.kind {
            EventKind::Command { name, args } => {
                self.on_command(customer_id, display_name, &name, &args)
                    .await
            }
            EventKind::Button { payload } => {
                self.on_button(customer_id, display_name, &payload).await
            }
            EventKind::ContactShared { token } => {
                self.on_contact_shared(customer_id, display_name, &token)
                    .await
            }
            EventKind::Photo { file_ref } => {
                self.on_photo(customer_id, display_name, &file_ref).await
            }
            EventKind::Text { body } => self.on_text(customer_id, display_name, &body).await,
        }
    }

    async fn on_command(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        name: &str,
        args: &str,
    ) -> Result<(), CoreError> {
        if name == "/start" {
            // Referral argument comes from unauthenticated input; parse
            // best-effort, drop anything unparseable.
            let referrer = args.split_whitespace().next().and_then(|a| a.parse().ok());
            self.registry
                .register_if_absent(customer_id, display_name, referrer)
                .await?;
            self.send(customer_id, "Welcome! Use the menu below.").await;
            return Ok(());
        }

        match AdminCommand::parse(name, args) {
            Some(Ok(command)) => match self.authority.execute(customer_id, command).await {
                Ok(Some(outcome)) => {
                    self.send(customer_id, &outcome_reply(&outcome)).await;
                    Ok(())
                }
                // Non-admin invoker: silently ignored.
                Ok(None) => Ok(()),
                Err(CoreError::InsufficientFunds { balance, debit }) => {
                    self.send(
                        customer_id,
                        &format!("Insufficient funds: balance {balance}, debit {debit}"),
                    )
                    .await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Some(Err(usage)) => {
                // Only the admin gets format feedback; everyone else sees
                // nothing, same as a denied command.
                if self.authority.is_admin(customer_id) {
                    self.send(customer_id, usage).await;
                }
                Ok(())
            }
            None => {
                debug!(customer_id, name, "unknown command ignored");
                Ok(())
            }
        }
    }

    async fn on_button(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        payload: &str,
    ) -> Result<(), CoreError> {
        match payload {
            "balance" => {
                let balance = self.ledger.get_balance(customer_id).await?;
                self.send(customer_id, &format!("Your balance: {balance}"))
                    .await;
                Ok(())
            }
            "catalog" => {
                let listing: Vec<String> = self
                    .workflow
                    .catalog()
                    .entries()
                    .map(|e| format!("{} - {}", e.label, e.price))
                    .collect();
                self.send(
                    customer_id,
                    &format!("Available numbers:\n{}", listing.join("\n")),
                )
                .await;
                Ok(())
            }
            "topup" => {
                self.send(
                    customer_id,
                    "Send a payment screenshot to top up your balance.",
                )
                .await;
                Ok(())
            }
            "contact_admin" | "country_Other" => {
                self.sessions.enter_contacting_admin(customer_id);
                self.send(customer_id, "Send your message for the admin.")
                    .await;
                Ok(())
            }
            _ => {
                if let Some(product_key) = payload.strip_prefix("country_") {
                    self.on_select(customer_id, display_name, product_key).await
                } else {
                    debug!(customer_id, payload, "unknown button payload ignored");
                    Ok(())
                }
            }
        }
    }

    async fn on_select(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        product_key: &str,
    ) -> Result<(), CoreError> {
        let Some(selection) = self.workflow.select(customer_id, product_key).await? else {
            return Ok(());
        };

        match selection.admission {
            Admission::Denied { shortfall } => {
                self.send(
                    customer_id,
                    &format!(
                        "Balance too low for {}: {} more needed. \
                         Top up or invite a friend to earn a referral bonus.",
                        selection.product.label, shortfall
                    ),
                )
                .await;
            }
            Admission::Admitted => {
                self.send(
                    customer_id,
                    &format!(
                        "Order received: {}. The admin will contact you.",
                        selection.product.label
                    ),
                )
                .await;

                let notice = format!(
                    "New order\ncustomer: {}\nname: {}\nproduct: {}\nprice: {}\nbalance: {}",
                    customer_id,
                    display_name.unwrap_or("-"),
                    selection.product.label,
                    selection.product.price,
                    selection.balance,
                );
                match self
                    .gateway
                    .send_text(self.authority.admin_id(), &notice)
                    .await
                {
                    Ok(()) => self.workflow.mark_admin_notified(selection.seq),
                    // Attempt stays Admitted; the customer can re-select.
                    Err(e) => warn!(customer_id, seq = selection.seq, %e, "admin notification failed"),
                }
            }
        }
        Ok(())
    }

    async fn on_contact_shared(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        token: &str,
    ) -> Result<(), CoreError> {
        // A contact share can be the first event we ever see from this
        // customer; make sure a record exists (without a referrer).
        self.registry
            .register_if_absent(customer_id, display_name, None)
            .await?;

        let transitioned = self
            .registry
            .set_verified_contact(customer_id, token)
            .await?;
        self.send(customer_id, "Contact verified.").await;

        if transitioned
            && let Some(grant) = self.referral.on_contact_verified(customer_id).await?
        {
            self.send(
                customer_id,
                &format!(
                    "Referral bonus +{}. Your balance: {}",
                    grant.amount, grant.customer_balance
                ),
            )
            .await;
            self.send(
                grant.referrer_id,
                &format!(
                    "A friend you invited joined. Referral bonus +{}. Your balance: {}",
                    grant.amount, grant.referrer_balance
                ),
            )
            .await;
        }
        Ok(())
    }

    async fn on_photo(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        file_ref: &str,
    ) -> Result<(), CoreError> {
        self.send(
            customer_id,
            "Screenshot received. Your balance will be updated after review.",
        )
        .await;

        let caption = format!(
            "Payment screenshot\ncustomer: {}\nname: {}",
            customer_id,
            display_name.unwrap_or("-")
        );
        if let Err(e) = self
            .gateway
            .send_photo(self.authority.admin_id(), file_ref, &caption)
            .await
        {
            warn!(customer_id, %e, "screenshot forward to admin failed");
        }
        Ok(())
    }

    async fn on_text(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        body: &str,
    ) -> Result<(), CoreError> {
        if !self.sessions.take_contacting_admin(customer_id) {
            // Plain text outside a flow belongs to the menu layer.
            debug!(customer_id, "free text outside a flow ignored");
            return Ok(());
        }

        let relay = format!(
            "Message from customer {} ({}):\n{}",
            customer_id,
            display_name.unwrap_or("-"),
            body
        );
        if let Err(e) = self.gateway.send_text(self.authority.admin_id(), &relay).await {
            // Keep the flow open so the customer can retry.
            self.sessions.enter_contacting_admin(customer_id);
            return Err(CoreError::DeliveryFailed(e.to_string()));
        }
        self.send(customer_id, "Your message was sent to the admin.")
            .await;
        Ok(())
    }

    /// Customer-facing sends are best-effort; a lost acknowledgment never
    /// fails the operation that already applied.
    async fn send(&self, to: CustomerId, text: &str) {
        if let Err(e) = self.gateway.send_text(to, text).await {
            debug!(to, %e, "outbound text not delivered");
        }
    }
}

fn outcome_reply(outcome: &AdminOutcome) -> String {
    match outcome {
        AdminOutcome::Credited {
            customer_id,
            amount,
            balance,
        } => format!("Credited {amount} to {customer_id}. New balance: {balance}"),
        AdminOutcome::Debited {
            customer_id,
            amount,
            balance,
        } => format!("Debited {amount} from {customer_id}. New balance: {balance}"),
        AdminOutcome::CredentialDelivered {
            customer_id,
            fulfilled,
        } => format!("Credential sent to {customer_id}; {fulfilled} order(s) fulfilled"),
        AdminOutcome::Broadcast {
            delivered,
            attempted,
        } => format!("Broadcast delivered to {delivered}/{attempted} customers"),
        AdminOutcome::MessageSent { customer_id } => format!("Message sent to {customer_id}"),
    }
}
