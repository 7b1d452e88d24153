//! Low-stock alerts raised after a sale commits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use duka_core::Product;

/// Receives products whose stock fell to or below their reorder level.
#[async_trait]
pub trait ReorderNotifier: Send + Sync {
    async fn reorder_needed(&self, product: &Product);
}

/// Writes reorder alerts to the log.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl ReorderNotifier for LoggingNotifier {
    async fn reorder_needed(&self, product: &Product) {
        warn!(
            organization_id = %product.organization_id,
            product_id = %product.id,
            product_name = %product.name,
            quantity = product.quantity,
            reorder_level = product.reorder_level,
            "Product at or below reorder level"
        );
    }
}

/// Fires a reorder alert in the background if `product` needs one.
///
/// Never waits on the notifier.
pub fn dispatch_reorder(notifier: &Arc<dyn ReorderNotifier>, product: &Product) {
    if !product.needs_reorder() {
        return;
    }

    info!(product_id = %product.id, quantity = product.quantity, "Dispatching reorder alert");

    let notifier = Arc::clone(notifier);
    let product = product.clone();
    tokio::spawn(async move {
        notifier.reorder_needed(&product).await;
    });
}
