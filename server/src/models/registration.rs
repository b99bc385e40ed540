use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    #[serde(rename = "UPI")]
    Upi,
    #[serde(rename = "GPay")]
    GPay,
    /// Marker for registrations on events without a fee.
    Free,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::GPay => "GPay",
            PaymentMethod::Free => "Free",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Card" => Ok(PaymentMethod::Card),
            "UPI" => Ok(PaymentMethod::Upi),
            "GPay" => Ok(PaymentMethod::GPay),
            "Free" => Ok(PaymentMethod::Free),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// Only `Confirmed` is ever written; the others exist so stored data round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Confirmed,
    Pending,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "pending" => Ok(RegistrationStatus::Pending),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(format!("unknown registration status '{}'", other)),
        }
    }
}

/// A user's cumulative ticket claim on one event. One per (event, user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub tickets_bought: u32,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: RegistrationStatus,
    pub attendee_phone: String,
    #[serde(skip_serializing, default)]
    pub applied_claims: Vec<Uuid>,
}

impl Registration {
    pub fn has_applied(&self, claim_id: Uuid) -> bool {
        self.applied_claims.contains(&claim_id)
    }

    pub fn create(upsert: &RegistrationUpsert, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: upsert.event_id,
            user_id: upsert.user_id.clone(),
            tickets_bought: upsert.ticket_delta,
            registered_at: now,
            updated_at: now,
            payment_amount: upsert.payment_amount,
            payment_method: upsert.payment_method,
            status: RegistrationStatus::Confirmed,
            attendee_phone: upsert.attendee_phone.clone(),
            applied_claims: vec![upsert.claim_id],
        }
    }

    /// Folds another claim into this record. Replaying an applied claim is a no-op.
    pub fn merge(&mut self, upsert: &RegistrationUpsert, now: DateTime<Utc>) {
        if self.has_applied(upsert.claim_id) {
            return;
        }
        self.tickets_bought += upsert.ticket_delta;
        self.payment_amount += upsert.payment_amount;
        self.payment_method = upsert.payment_method;
        self.updated_at = now;
        self.applied_claims.push(upsert.claim_id);
    }
}

/// One registration attempt's write to the ledger.
///
/// `claim_id` identifies the attempt so the write can be retried without
/// double counting.
#[derive(Debug, Clone)]
pub struct RegistrationUpsert {
    pub claim_id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub ticket_delta: u32,
    pub payment_method: PaymentMethod,
    pub payment_amount: Decimal,
    pub attendee_phone: String,
}

impl RegistrationUpsert {
    pub fn validate(&self) -> Result<(), String> {
        if self.ticket_delta < 1 {
            return Err("Ticket quantity must be at least 1".to_string());
        }
        if self.user_id.trim().is_empty() {
            return Err("User ID is required".to_string());
        }
        if self.payment_amount.is_sign_negative() {
            return Err("Payment amount cannot be negative".to_string());
        }
        Ok(())
    }
}
