use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("broker unreachable: {0}")]
    Network(String),
}

/// Bracket entry: a limit buy with linked stop-loss and take-profit legs
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOrder {
    pub ticker: String,
    pub quantity: u64,
    pub reference_price: f64, // Ask at decision time
    pub limit_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub fill_price: f64,
    pub quantity: u64,
}

#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn place_entry(&self, order: &EntryOrder) -> Result<OrderAck, OrderError>;

    async fn place_exit(&self, ticker: &str, quantity: u64, price: f64)
        -> Result<OrderAck, OrderError>;
}

/// Simulated fills: entries at the reference price, exits at the requested price
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn place_entry(&self, order: &EntryOrder) -> Result<OrderAck, OrderError> {
        if order.quantity == 0 {
            return Err(OrderError::Rejected("zero quantity".to_string()));
        }
        if order.reference_price <= 0.0 || order.reference_price > order.limit_price {
            return Err(OrderError::Rejected(format!(
                "price ${:.2} outside limit ${:.2}",
                order.reference_price, order.limit_price
            )));
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        info!(
            "🧪 [DRY RUN] BUY {} x{} @ ${:.2} (limit ${:.2}, stop ${:.2}, target ${:.2}) [{}]",
            order.ticker,
            order.quantity,
            order.reference_price,
            order.limit_price,
            order.stop_price,
            order.target_price,
            order_id
        );

        Ok(OrderAck {
            order_id,
            fill_price: order.reference_price,
            quantity: order.quantity,
        })
    }

    async fn place_exit(
        &self,
        ticker: &str,
        quantity: u64,
        price: f64,
    ) -> Result<OrderAck, OrderError> {
        if price <= 0.0 {
            return Err(OrderError::Rejected(format!("invalid exit price {}", price)));
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        info!(
            "🧪 [DRY RUN] SELL {} x{} @ ${:.2} [{}]",
            ticker, quantity, price, order_id
        );

        Ok(OrderAck {
            order_id,
            fill_price: price,
            quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(quantity: u64, reference_price: f64) -> EntryOrder {
        EntryOrder {
            ticker: "AAPL".to_string(),
            quantity,
            reference_price,
            limit_price: 150.0 * 1.002,
            stop_price: 142.5,
            target_price: 180.0,
        }
    }

    #[tokio::test]
    async fn test_dry_run_entry_fills_at_reference() {
        let ack = DryRunExecutor::new().place_entry(&order(13, 150.0)).await.unwrap();
        assert_eq!(ack.fill_price, 150.0);
        assert_eq!(ack.quantity, 13);
        assert!(uuid::Uuid::parse_str(&ack.order_id).is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_rejects_bad_orders() {
        let executor = DryRunExecutor::new();
        tokio_test::assert_err!(executor.place_entry(&order(0, 150.0)).await);
        tokio_test::assert_err!(executor.place_entry(&order(10, 151.0)).await);
        tokio_test::assert_err!(executor.place_exit("AAPL", 10, 0.0).await);
    }

    #[tokio::test]
    async fn test_dry_run_exit() {
        let ack = DryRunExecutor::new().place_exit("AAPL", 5, 99.5).await.unwrap();
        assert_eq!(ack.fill_price, 99.5);
        assert_eq!(ack.quantity, 5);
    }
}
