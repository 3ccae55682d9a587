//! Referral Bonus Engine - one-time dual credit on contact verification.
//!
//! The exactly-once guard is the `bonus_granted` flag on the customer
//! record, flipped through the store's CAS, not ledger atomicity. Only the
//! caller that wins the flip performs the two credits, in a fixed order:
//! flip, credit the verified customer, credit the referrer. A crash inside
//! that sequence under-delivers (at most the referrer-side credit is
//! lost), never duplicates; the window is logged at error level so it is
//! visible in monitoring instead of papered over.

use tracing::{error, info};

use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::registry::Registry;
use crate::store::KvStore;
use crate::types::{Amount, CustomerId};

/// Result of a granted bonus, for notifying both parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusGrant {
    pub customer_id: CustomerId,
    pub referrer_id: CustomerId,
    pub amount: Amount,
    pub customer_balance: Amount,
    pub referrer_balance: Amount,
}

pub struct ReferralEngine<S> {
    registry: Registry<S>,
    ledger: Ledger<S>,
    bonus: Amount,
}

impl<S: KvStore> ReferralEngine<S> {
    pub fn new(registry: Registry<S>, ledger: Ledger<S>, bonus: Amount) -> Self {
        Self {
            registry,
            ledger,
            bonus,
        }
    }

    /// Called after a successful absent -> set contact verification.
    /// Returns the grant if this call won the flip, `None` if there is no
    /// referrer or the bonus was already granted.
    pub async fn on_contact_verified(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<BonusGrant>, CoreError> {
        let Some(record) = self.registry.get(customer_id).await? else {
            return Ok(None);
        };
        let Some(referrer_id) = record.referrer_id else {
            return Ok(None);
        };
        if record.bonus_granted {
            return Ok(None);
        }

        // A bonus beyond the signed delta range is a misconfiguration;
        // reject it before touching the guard flag.
        let bonus = i64::try_from(self.bonus).map_err(|_| {
            error!(customer_id, bonus = self.bonus, "configured bonus exceeds ledger delta range");
            CoreError::Overflow
        })?;

        if !self.registry.mark_bonus_granted(customer_id).await? {
            // A concurrent retry of the same verification event won.
            return Ok(None);
        }

        // From here on a failure under-delivers the bonus permanently:
        // the flag is already set, so no retry will re-enter.
        let customer_balance = match self.ledger.adjust(customer_id, bonus).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(
                    customer_id,
                    referrer_id,
                    bonus = self.bonus,
                    %e,
                    "bonus flag set but customer credit failed; bonus under-delivered"
                );
                return Err(e);
            }
        };

        // Unconditional: creates the referrer account if they never started.
        let referrer_balance = match self.ledger.adjust(referrer_id, bonus).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(
                    customer_id,
                    referrer_id,
                    bonus = self.bonus,
                    %e,
                    "bonus flag set but referrer credit failed; referrer side under-delivered"
                );
                return Err(e);
            }
        };

        info!(
            customer_id,
            referrer_id,
            bonus = self.bonus,
            "referral bonus granted to both parties"
        );
        Ok(Some(BonusGrant {
            customer_id,
            referrer_id,
            amount: self.bonus,
            customer_balance,
            referrer_balance,
        }))
    }
}
