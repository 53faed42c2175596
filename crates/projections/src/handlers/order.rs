//! Order handlers.

use async_trait::async_trait;
use chrono::Utc;
use domain::keys::{self, fields};
use domain::{EventKind, Order, OrderStatusChanged};
use read_store::{DocumentStoreExt, FieldSet, Filter, StoreError};
use serde_json::Value;

use crate::handler::SyncHandler;
use crate::{HandlerError, HandlerOutcome, Result, SoftStep, Stores};

/// Turns every top-level field of a serialized record into an assignment.
fn assignments(record: Value) -> FieldSet {
    match record {
        Value::Object(map) => map
            .into_iter()
            .fold(FieldSet::new(), |set, (field, value)| set.set(field, value)),
        _ => FieldSet::new(),
    }
}

/// Handles `OrderCreated`.
///
/// The order-history append is guarded: if the customer already holds an
/// entry for the order (a retried event), that entry is refreshed instead of
/// duplicated.
#[derive(Clone)]
pub struct OrderCreatedHandler {
    stores: Stores,
}

impl OrderCreatedHandler {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    async fn record_history(&self, order: &Order) -> Result<u64> {
        let entry = serde_json::to_value(order.history_entry()).map_err(StoreError::from)?;
        let by_customer = Filter::eq(fields::CUSTOMER_ID, order.customer_id.as_str());

        let refreshed = self
            .stores
            .documents
            .update_list_elements(
                keys::CUSTOMERS,
                &by_customer,
                fields::ORDER_HISTORY,
                &Filter::eq(fields::ORDER_ID, order.order_id.as_str()),
                &assignments(entry.clone()),
            )
            .await?;
        if refreshed > 0 {
            return Ok(refreshed);
        }

        Ok(self
            .stores
            .documents
            .append_to_list(keys::CUSTOMERS, &by_customer, fields::ORDER_HISTORY, entry)
            .await?)
    }
}

#[async_trait]
impl SyncHandler for OrderCreatedHandler {
    const KIND: EventKind = EventKind::OrderCreated;
    type Payload = Order;

    #[tracing::instrument(
        skip(self, order),
        fields(order_id = %order.order_id, customer_id = %order.customer_id)
    )]
    async fn apply(&self, order: Order) -> Result<HandlerOutcome> {
        if order.order_id.is_blank() {
            return Err(HandlerError::MissingId {
                kind: Self::KIND,
                field: fields::ORDER_ID,
            });
        }

        self.stores
            .documents
            .upsert_entity(keys::ORDERS, order.order_id.as_str(), &order)
            .await?;

        if self.record_history(&order).await? == 0 {
            tracing::warn!("customer not found, order history not recorded");
        }

        let stale = [
            keys::customer_orders(&order.customer_id),
            keys::customer(&order.customer_id),
        ];
        let result = self.stores.cache.delete_many(&stale).await;

        tracing::info!(order_number = %order.order_number, "order created");
        Ok(HandlerOutcome::Completed.soft(SoftStep::Invalidate, &stale, result))
    }
}

/// Handles `OrderStatusChanged`.
#[derive(Clone)]
pub struct OrderStatusChangedHandler {
    stores: Stores,
}

impl OrderStatusChangedHandler {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl SyncHandler for OrderStatusChangedHandler {
    const KIND: EventKind = EventKind::OrderStatusChanged;
    type Payload = OrderStatusChanged;

    #[tracing::instrument(
        skip(self, change),
        fields(order_id = %change.order_id, status = %change.status)
    )]
    async fn apply(&self, change: OrderStatusChanged) -> Result<HandlerOutcome> {
        if change.order_id.is_blank() {
            return Err(HandlerError::MissingId {
                kind: Self::KIND,
                field: fields::ORDER_ID,
            });
        }

        let by_order = Filter::eq(fields::ORDER_ID, change.order_id.as_str());
        let order: Order = self
            .stores
            .documents
            .find_entity(keys::ORDERS, &by_order)
            .await?
            .ok_or_else(|| HandlerError::NotFound {
                entity: "order",
                id: change.order_id.to_string(),
            })?;

        let updated = serde_json::to_value(Utc::now()).map_err(StoreError::from)?;
        self.stores
            .documents
            .update_fields(
                keys::ORDERS,
                &by_order,
                &FieldSet::new()
                    .set(fields::STATUS, change.status.as_str())
                    .set(fields::UPDATED, updated),
            )
            .await?;

        let history_updated = self
            .stores
            .documents
            .update_list_elements(
                keys::CUSTOMERS,
                &Filter::eq(fields::CUSTOMER_ID, order.customer_id.as_str()),
                fields::ORDER_HISTORY,
                &by_order,
                &FieldSet::new().set(fields::STATUS, change.status.as_str()),
            )
            .await?;
        if history_updated == 0 {
            tracing::warn!(customer_id = %order.customer_id, "no order history entry to update");
        }

        let stale = [
            keys::order(&change.order_id),
            keys::customer_orders(&order.customer_id),
            keys::customer(&order.customer_id),
        ];
        let result = self.stores.cache.delete_many(&stale).await;

        tracing::info!("order status changed");
        Ok(HandlerOutcome::Completed.soft(SoftStep::Invalidate, &stale, result))
    }
}
