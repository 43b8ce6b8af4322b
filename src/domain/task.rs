use super::account::{Amount, UserId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

/// Highest priority a task may carry.
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Credit,
    Debit,
    Transfer,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Credit => "credit",
            TaskKind::Debit => "debit",
            TaskKind::Transfer => "transfer",
        }
    }
}

/// A unit of ledger work submitted to the processor.
///
/// `counterparty_id` is only meaningful for transfers. It stays optional in the model so that
/// malformed transfers can still be submitted and fail as results rather than panics.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Task {
    #[serde(default = "generate_task_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(rename = "user", alias = "user_id")]
    pub user_id: UserId,
    #[serde(rename = "counterparty", alias = "to_user_id", default)]
    pub counterparty_id: Option<UserId>,
    pub amount: Decimal,
    #[serde(default)]
    pub priority: u8,
}

pub fn generate_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Task {
    /// Creates a new credit task with a generated id.
    pub fn credit(user_id: UserId, amount: Decimal) -> Self {
        Self::with_kind(TaskKind::Credit, user_id, None, amount)
    }

    pub fn debit(user_id: UserId, amount: Decimal) -> Self {
        Self::with_kind(TaskKind::Debit, user_id, None, amount)
    }

    /// Creates a new transfer task from `from` to `to`.
    pub fn transfer(from: UserId, to: UserId, amount: Decimal) -> Self {
        Self::with_kind(TaskKind::Transfer, from, Some(to), amount)
    }

    fn with_kind(
        kind: TaskKind,
        user_id: UserId,
        counterparty_id: Option<UserId>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: generate_task_id(),
            kind,
            user_id,
            counterparty_id,
            amount,
            priority: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Checks the fields a submitter is accountable for.
    ///
    /// A transfer missing its counterparty passes here; the worker rejects it.
    pub fn validate(&self) -> Result<Amount, LedgerError> {
        if self.id.is_empty() {
            return Err(LedgerError::InvalidTask(
                "task id cannot be empty".to_string(),
            ));
        }
        if self.priority > MAX_PRIORITY {
            return Err(LedgerError::InvalidTask(format!(
                "priority must be between 0 and {}",
                MAX_PRIORITY
            )));
        }
        Amount::new(self.amount)
    }
}

/// Outcome of processing exactly one task.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub message: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<LedgerError>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Creates a successful result stamped with the current time.
    pub fn success(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            message: "Task processed successfully".to_string(),
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// Creates a failed result carrying `error`.
    pub fn failure(task_id: impl Into<String>, error: LedgerError) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            message: error.to_string(),
            error: Some(error),
            completed_at: Utc::now(),
        }
    }
}

pub(crate) fn serialize_error<S>(error: &Option<LedgerError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
