use crate::model::{ModelId, OrderStatus};
use serde::Serialize;
use thiserror::Error;

/// Stable machine-readable class attached to every user-visible
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    NotFound,
    PreconditionFailed,
    Conflict,
    UpstreamFailure,
    Internal,
}

/// Failures of the order lifecycle engine and its collaborators.
///
/// User-scoped lookups of an order that exists under a different user
/// report `OrderNotFound`, identical to a genuinely absent order, so
/// the existence of other users' orders never leaks.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("address book entry {0} not found")]
    AddressNotFound(ModelId),

    #[error("order not found")]
    OrderNotFound,

    #[error("catalog item {0} not found")]
    ItemNotFound(ModelId),

    #[error("shopping cart is empty")]
    EmptyCart,

    #[error("cart selection names neither a dish nor a set meal")]
    InvalidSelection,

    #[error("order is {current}, operation requires {expected}")]
    InvalidTransition {
        current: OrderStatus,
        expected: String,
    },

    #[error("order can no longer be cancelled by the customer (currently {0})")]
    CancellationNotAllowed(OrderStatus),

    /// A conditional update found the order already moved by a
    /// concurrent writer. The reconciler treats this as benign;
    /// request paths surface it as a conflict.
    #[error("conditional update lost to a concurrent writer")]
    RaceLost { current: Option<OrderStatus> },

    #[error("payment gateway: {0}")]
    PaymentFailed(String),

    #[error("internal failure: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::AddressNotFound(_)
            | OrderError::OrderNotFound
            | OrderError::ItemNotFound(_) => ErrorCode::NotFound,
            OrderError::EmptyCart
            | OrderError::InvalidSelection
            | OrderError::InvalidTransition { .. }
            | OrderError::CancellationNotAllowed(_) => ErrorCode::PreconditionFailed,
            OrderError::RaceLost { .. } => ErrorCode::Conflict,
            OrderError::PaymentFailed(_) => ErrorCode::UpstreamFailure,
            OrderError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        OrderError::Internal(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_taxonomy() {
        assert_eq!(OrderError::AddressNotFound(7).code(), ErrorCode::NotFound);
        assert_eq!(OrderError::OrderNotFound.code(), ErrorCode::NotFound);
        assert_eq!(OrderError::EmptyCart.code(), ErrorCode::PreconditionFailed);
        assert_eq!(
            OrderError::InvalidTransition {
                current: OrderStatus::Completed,
                expected: "ToBeConfirmed".to_string(),
            }
            .code(),
            ErrorCode::PreconditionFailed
        );
        assert_eq!(
            OrderError::RaceLost {
                current: Some(OrderStatus::Cancelled)
            }
            .code(),
            ErrorCode::Conflict
        );
        assert_eq!(
            OrderError::PaymentFailed("declined".to_string()).code(),
            ErrorCode::UpstreamFailure
        );
    }

    #[test]
    fn messages_name_current_and_expected_state() {
        let err = OrderError::InvalidTransition {
            current: OrderStatus::PendingPayment,
            expected: "ToBeConfirmed".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("PendingPayment"));
        assert!(message.contains("ToBeConfirmed"));
    }
}
