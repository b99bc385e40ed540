//! Registration workflow: turns a confirmed payment into tickets.
//!
//! The inventory check and decrement happen as one conditional write at the
//! store. Backends with transactions also fold the ledger upsert into that
//! write. Without transactions the workflow runs a saga: inventory first,
//! then an idempotent ledger upsert with bounded retries, and a compensating
//! restore once the ledger is known not to hold the claim. The registrant
//! set is append-only, so compensation never removes a user from it.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{bounded, retrying, WorkflowSettings};
use super::payment::PaymentConfirmation;
use crate::models::{Event, PaymentMethod, Registration, RegistrationUpsert, User};
use crate::store::RegistrationStore;
use crate::utils::error::AppError;

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub event_id: Uuid,
    pub user: User,
    pub requested_tickets: u32,
    pub payment: PaymentConfirmation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    pub registration: Registration,
    /// Tickets this user now holds for the event.
    pub tickets_held: u32,
    /// Tickets the event has left after this registration.
    pub event_ticket_count: u32,
    /// False when the request merged into an existing registration.
    pub created: bool,
}

#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    settings: WorkflowSettings,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>, settings: WorkflowSettings) -> Self {
        Self { store, settings }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(event_id = %request.event_id, user_id = %request.user.id, tickets = request.requested_tickets)
    )]
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationReceipt, AppError> {
        let RegistrationRequest {
            event_id,
            user,
            requested_tickets,
            payment,
        } = request;

        if !payment.succeeded {
            return Err(AppError::PaymentNotConfirmed(
                "Payment must succeed before registering".to_string(),
            ));
        }
        if requested_tickets < 1 {
            return Err(AppError::ValidationError(
                "Ticket count must be positive".to_string(),
            ));
        }

        let event =
            retrying(&self.settings, "get_event", || self.store.get_event(event_id)).await?;
        // Fast rejection only; the decrement re-checks atomically.
        if requested_tickets > event.ticket_count {
            return Err(AppError::InsufficientInventory {
                requested: requested_tickets,
                available: event.ticket_count,
            });
        }
        check_payment(&event, requested_tickets, &payment)?;

        let existing = retrying(&self.settings, "find_registration", || {
            self.store.find_registration(event_id, &user.id)
        })
        .await?;

        let claim = RegistrationUpsert {
            claim_id: Uuid::new_v4(),
            event_id,
            user_id: user.id.clone(),
            ticket_delta: requested_tickets,
            payment_method: payment.method,
            payment_amount: payment.amount,
            attendee_phone: user.phone_number.clone().unwrap_or_default(),
        };

        let (event, registration) = if self.store.supports_transactions() {
            // Keyed by the claim id, so a replay after a timeout is safe.
            retrying(&self.settings, "commit_claim", || {
                self.store.commit_claim(&claim)
            })
            .await?
        } else {
            self.commit_with_saga(&claim).await?
        };

        info!(
            claim_id = %claim.claim_id,
            tickets_held = registration.tickets_bought,
            remaining = event.ticket_count,
            "Registration confirmed"
        );

        Ok(RegistrationReceipt {
            tickets_held: registration.tickets_bought,
            event_ticket_count: event.ticket_count,
            created: existing.is_none(),
            registration,
        })
    }

    async fn commit_with_saga(
        &self,
        claim: &RegistrationUpsert,
    ) -> Result<(Event, Registration), AppError> {
        // Not retried: a decrement that timed out may still have been applied.
        let event = bounded(
            self.settings.store_timeout,
            "decrement_tickets",
            self.store
                .decrement_tickets(claim.event_id, claim.ticket_delta, &claim.user_id),
        )
        .await?;

        let ledger_error = match retrying(&self.settings, "upsert_registration", || {
            self.store.upsert_registration(claim)
        })
        .await
        {
            Ok(registration) => return Ok((event, registration)),
            Err(e) => e,
        };

        // A write that timed out or lost its connection may have landed.
        // Inventory goes back only once the ledger shows it did not.
        if write_outcome_unknown(&ledger_error) {
            match retrying(&self.settings, "find_registration", || {
                self.store.find_registration(claim.event_id, &claim.user_id)
            })
            .await
            {
                Ok(Some(registration)) if registration.has_applied(claim.claim_id) => {
                    info!(
                        claim_id = %claim.claim_id,
                        error = %ledger_error,
                        "Ledger write landed despite the error"
                    );
                    return Ok((event, registration));
                }
                Ok(_) => {}
                Err(check_error) => {
                    return Err(partial_failure(
                        claim,
                        format!(
                            "ledger write failed ({}); ledger state unknown ({})",
                            ledger_error, check_error
                        ),
                    ))
                }
            }
        }

        warn!(
            claim_id = %claim.claim_id,
            error = %ledger_error,
            "Ledger rejected claim, restoring inventory"
        );
        match bounded(
            self.settings.store_timeout,
            "restore_tickets",
            self.store.restore_tickets(claim.event_id, claim.ticket_delta),
        )
        .await
        {
            Ok(_) => Err(ledger_error),
            Err(restore_error) => Err(partial_failure(
                claim,
                format!(
                    "ledger write failed ({}); inventory restore failed ({})",
                    ledger_error, restore_error
                ),
            )),
        }
    }
}

fn write_outcome_unknown(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Timeout { .. } | AppError::StoreUnavailable(_) | AppError::DatabaseError(_)
    )
}

fn partial_failure(claim: &RegistrationUpsert, reason: String) -> AppError {
    AppError::PartialFailure {
        event_id: claim.event_id,
        user_id: claim.user_id.clone(),
        claim_id: claim.claim_id,
        tickets: claim.ticket_delta,
        reason,
    }
}

fn check_payment(
    event: &Event,
    tickets: u32,
    payment: &PaymentConfirmation,
) -> Result<(), AppError> {
    let due = event.registration_fee * Decimal::from(tickets);
    match (event.is_free(), payment.method) {
        (true, PaymentMethod::Free) | (false, PaymentMethod::Card)
        | (false, PaymentMethod::Upi) | (false, PaymentMethod::GPay) => {}
        (true, _) => {
            return Err(AppError::ValidationError(
                "This event is free; no payment method is needed".to_string(),
            ))
        }
        (false, PaymentMethod::Free) => {
            return Err(AppError::ValidationError(format!(
                "This event costs {} per ticket",
                event.registration_fee
            )))
        }
    }
    if payment.amount != due {
        return Err(AppError::ValidationError(format!(
            "Payment of {} does not match the {} due",
            payment.amount, due
        )));
    }
    Ok(())
}
