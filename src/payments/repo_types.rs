use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    InProcess,
}

/// Outcome of applying an incoming status to a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply(PaymentStatus),
    /// Already in this state; replayed webhooks land here.
    Noop,
    /// Would move a terminal or settled record backwards.
    Invalid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::InProcess => "in_process",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            "in_process" | "in_mediation" => Some(PaymentStatus::InProcess),
            _ => None,
        }
    }

    /// One-directional status machine: pending may move to any settled
    /// state, in_process may settle, approved/rejected are terminal.
    /// Identical statuses are no-ops, which makes webhook replays harmless.
    pub fn transition(self, incoming: PaymentStatus) -> Transition {
        use PaymentStatus::*;
        if self == incoming {
            return Transition::Noop;
        }
        match (self, incoming) {
            (Pending, Approved | Rejected | InProcess) => Transition::Apply(incoming),
            (InProcess, Approved | Rejected) => Transition::Apply(incoming),
            _ => Transition::Invalid,
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PaymentStatus::parse(&value).ok_or_else(|| format!("unknown payment status: {value}"))
    }
}

/// Fields required to open a checkout flow.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub external_reference: String,
    pub buyer_uid: String,
    pub creator_uid: Option<String>,
    pub amount: f64,
    pub currency: String,
}

/// Local correlation record for one gateway checkout flow, keyed by the
/// locally generated external reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub external_reference: String,
    pub buyer_uid: String,
    pub creator_uid: Option<String>,
    pub amount: f64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub preference_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
