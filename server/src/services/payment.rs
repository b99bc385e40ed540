//! Simulated payment confirmation.
//!
//! There is no gateway behind this: the details are checked for shape, the
//! configured processing delay elapses, and the payment is declared successful.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::PaymentMethod;
use crate::utils::error::AppError;

const CARD_NUMBER_DIGITS: usize = 16;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method")]
pub enum PaymentDetails {
    #[serde(rename_all = "camelCase")]
    Card {
        card_number: String,
        expiry: String,
        cvv: String,
        name_on_card: String,
    },
    #[serde(rename = "UPI", rename_all = "camelCase")]
    Upi { upi_id: String },
    #[serde(rename = "GPay", rename_all = "camelCase")]
    GPay { upi_id: String },
    Free,
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentDetails::Card { .. } => PaymentMethod::Card,
            PaymentDetails::Upi { .. } => PaymentMethod::Upi,
            PaymentDetails::GPay { .. } => PaymentMethod::GPay,
            PaymentDetails::Free => PaymentMethod::Free,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        match self {
            PaymentDetails::Card {
                card_number,
                expiry,
                cvv,
                name_on_card,
            } => {
                if [card_number, expiry, cvv, name_on_card]
                    .iter()
                    .any(|field| field.trim().is_empty())
                {
                    return Err(AppError::ValidationError(
                        "Please fill out all card details".to_string(),
                    ));
                }
                let digits: String = card_number.chars().filter(|c| !c.is_whitespace()).collect();
                if digits.len() != CARD_NUMBER_DIGITS || !digits.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(AppError::ValidationError("Invalid card number".to_string()));
                }
                Ok(())
            }
            PaymentDetails::Upi { upi_id } | PaymentDetails::GPay { upi_id } => {
                if upi_id.trim().is_empty() {
                    return Err(AppError::ValidationError(
                        "Please enter a valid UPI ID".to_string(),
                    ));
                }
                Ok(())
            }
            PaymentDetails::Free => Ok(()),
        }
    }
}

/// Outcome reported by the payment step. Workflows proceed only when
/// `succeeded` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub succeeded: bool,
    pub reference: Uuid,
}

impl PaymentConfirmation {
    /// Confirmation for a zero-amount registration.
    pub fn free() -> Self {
        Self {
            method: PaymentMethod::Free,
            amount: Decimal::ZERO,
            succeeded: true,
            reference: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    processing_delay: Duration,
}

impl SimulatedPaymentGateway {
    pub fn new(processing_delay: Duration) -> Self {
        Self { processing_delay }
    }

    pub async fn confirm(
        &self,
        amount: Decimal,
        details: &PaymentDetails,
    ) -> Result<PaymentConfirmation, AppError> {
        if amount.is_sign_negative() {
            return Err(AppError::ValidationError(
                "Payment amount cannot be negative".to_string(),
            ));
        }
        match (amount.is_zero(), details) {
            (true, PaymentDetails::Free) => return Ok(PaymentConfirmation::free()),
            (true, _) => {
                return Err(AppError::ValidationError(
                    "Nothing to pay; use the Free method".to_string(),
                ))
            }
            (false, PaymentDetails::Free) => {
                return Err(AppError::ValidationError(
                    "A payment method is required for paid registrations".to_string(),
                ))
            }
            (false, _) => {}
        }
        details.validate()?;

        tokio::time::sleep(self.processing_delay).await;

        let confirmation = PaymentConfirmation {
            method: details.method(),
            amount,
            succeeded: true,
            reference: Uuid::new_v4(),
        };
        info!(
            reference = %confirmation.reference,
            method = %confirmation.method,
            %amount,
            "Simulated payment confirmed"
        );
        Ok(confirmation)
    }
}
