use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_core::{Aggregate, AggregateRoot, BookId, DomainError, DomainResult, OrderId, ensure_positive};
use bookstore_events::{DomainEvent, Event, ItemQuantity, OrderChanged};

/// Order status lifecycle.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order line: book and requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub book_id: BookId,
    pub quantity: i64,
}

impl From<&OrderItem> for ItemQuantity {
    fn from(item: &OrderItem) -> Self {
        ItemQuantity {
            book_id: item.book_id.clone(),
            quantity: item.quantity,
        }
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    items: Vec<OrderItem>,
    status: OrderStatus,
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fulfilled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Order {
    /// Blank aggregate for `id`; it exists only after a `PlaceOrder` is applied.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            items: Vec::new(),
            status: OrderStatus::Pending,
            created_at: None,
            fulfilled_at: None,
            cancelled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn fulfilled_at(&self) -> Option<DateTime<Utc>> {
        self.fulfilled_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_pending(&self) -> bool {
        self.created && self.status == OrderStatus::Pending
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfillOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    FulfillOrder(FulfillOrder),
    CancelOrder(CancelOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderFulfilled.
///
/// Carries the items by value so subscribers never need to look the order up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilled {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderFulfilled(OrderFulfilled),
    OrderCancelled(OrderCancelled),
}

impl OrderEvent {
    /// The cross-service form of this event, as published on the bus.
    pub fn to_domain_event(&self) -> DomainEvent {
        let changed = |order_id: OrderId, items: &[OrderItem], at: DateTime<Utc>| OrderChanged {
            order_id,
            items: items.iter().map(ItemQuantity::from).collect(),
            timestamp: at,
        };

        match self {
            OrderEvent::OrderPlaced(e) => {
                DomainEvent::OrderCreated(changed(e.order_id, &e.items, e.occurred_at))
            }
            OrderEvent::OrderFulfilled(e) => {
                DomainEvent::OrderFulfilled(changed(e.order_id, &e.items, e.occurred_at))
            }
            OrderEvent::OrderCancelled(e) => {
                DomainEvent::OrderCancelled(changed(e.order_id, &e.items, e.occurred_at))
            }
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "order.created",
            OrderEvent::OrderFulfilled(_) => "order.fulfilled",
            OrderEvent::OrderCancelled(_) => "order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderFulfilled(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.items = e.items.clone();
                self.status = OrderStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderFulfilled(e) => {
                self.status = OrderStatus::Fulfilled;
                self.fulfilled_at = Some(e.occurred_at);
            }
            OrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> DomainResult<Vec<Self::Event>> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::FulfillOrder(cmd) => self.handle_fulfill(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> DomainResult<()> {
        if self.id != order_id {
            return Err(DomainError::validation("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self, order_id: OrderId, action: &str) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::order_not_found(order_id.to_string()));
        }
        self.ensure_order_id(order_id)?;

        if self.status != OrderStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} order {} in status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> DomainResult<Vec<OrderEvent>> {
        if self.created {
            return Err(DomainError::invalid_state(format!(
                "order {} already exists",
                cmd.order_id
            )));
        }
        self.ensure_order_id(cmd.order_id)?;

        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        for item in &cmd.items {
            ensure_positive(item.quantity)?;
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfill(&self, cmd: &FulfillOrder) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_pending(cmd.order_id, "fulfill")?;

        Ok(vec![OrderEvent::OrderFulfilled(OrderFulfilled {
            order_id: cmd.order_id,
            items: self.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_pending(cmd.order_id, "cancel")?;

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            items: self.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn item(book: &str, quantity: i64) -> OrderItem {
        OrderItem {
            book_id: BookId::from(book),
            quantity,
        }
    }

    fn placed(items: Vec<OrderItem>) -> Order {
        let order_id = OrderId::new();
        let mut order = Order::empty(order_id);
        let cmd = PlaceOrder {
            order_id,
            items,
            occurred_at: test_time(),
        };
        execute(&mut order, &OrderCommand::PlaceOrder(cmd)).unwrap();
        order
    }

    #[test]
    fn place_order_emits_order_placed_event() {
        let order_id = OrderId::new();
        let order = Order::empty(order_id);
        let cmd = PlaceOrder {
            order_id,
            items: vec![item("b1", 2)],
            occurred_at: test_time(),
        };

        let events = order.handle(&OrderCommand::PlaceOrder(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            OrderEvent::OrderPlaced(e) => {
                assert_eq!(e.order_id, order_id);
                assert_eq!(e.items, vec![item("b1", 2)]);
            }
            _ => panic!("Expected OrderPlaced event"),
        }
    }

    #[test]
    fn placed_order_is_pending_with_created_at() {
        let order = placed(vec![item("b1", 2), item("b2", 1)]);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.created_at().is_some());
        assert!(order.fulfilled_at().is_none());
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn place_rejects_non_positive_quantity() {
        let order_id = OrderId::new();
        let order = Order::empty(order_id);
        let cmd = PlaceOrder {
            order_id,
            items: vec![item("b1", 2), item("b2", 0)],
            occurred_at: test_time(),
        };

        let err = order.handle(&OrderCommand::PlaceOrder(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn place_rejects_empty_order() {
        let order_id = OrderId::new();
        let order = Order::empty(order_id);
        let cmd = PlaceOrder {
            order_id,
            items: vec![],
            occurred_at: test_time(),
        };

        let err = order.handle(&OrderCommand::PlaceOrder(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn fulfill_moves_pending_to_fulfilled() {
        let mut order = placed(vec![item("b1", 2)]);
        let cmd = FulfillOrder {
            order_id: order.id_typed(),
            occurred_at: test_time(),
        };

        let events = execute(&mut order, &OrderCommand::FulfillOrder(cmd)).unwrap();
        assert_eq!(order.status(), OrderStatus::Fulfilled);
        assert!(order.fulfilled_at().is_some());
        assert_eq!(order.version(), 2);

        match &events[0] {
            OrderEvent::OrderFulfilled(e) => assert_eq!(e.items, vec![item("b1", 2)]),
            _ => panic!("Expected OrderFulfilled event"),
        }
    }

    #[test]
    fn cannot_fulfill_twice() {
        let mut order = placed(vec![item("b1", 2)]);
        let cmd = OrderCommand::FulfillOrder(FulfillOrder {
            order_id: order.id_typed(),
            occurred_at: test_time(),
        });

        execute(&mut order, &cmd).unwrap();
        let err = execute(&mut order, &cmd).unwrap_err();
        match err {
            DomainError::InvalidState(msg) if msg.contains("fulfilled") => {}
            other => panic!("Expected InvalidState for second fulfillment, got {other:?}"),
        }
        assert_eq!(order.version(), 2);
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut order = placed(vec![item("b1", 1)]);
        let order_id = order.id_typed();

        execute(
            &mut order,
            &OrderCommand::CancelOrder(CancelOrder { order_id, occurred_at: test_time() }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.status().is_terminal());

        let err = execute(
            &mut order,
            &OrderCommand::FulfillOrder(FulfillOrder { order_id, occurred_at: test_time() }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn commands_on_unplaced_order_are_not_found() {
        let order_id = OrderId::new();
        let order = Order::empty(order_id);

        let err = order
            .handle(&OrderCommand::FulfillOrder(FulfillOrder { order_id, occurred_at: test_time() }))
            .unwrap_err();
        assert!(matches!(err, DomainError::OrderNotFound(_)));
    }

    #[test]
    fn placing_twice_is_invalid_state() {
        let order = placed(vec![item("b1", 1)]);
        let cmd = PlaceOrder {
            order_id: order.id_typed(),
            items: vec![item("b1", 1)],
            occurred_at: test_time(),
        };

        let err = order.handle(&OrderCommand::PlaceOrder(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn domain_event_copies_items_by_value() {
        let order = placed(vec![item("b1", 3)]);
        let event = OrderEvent::OrderPlaced(OrderPlaced {
            order_id: order.id_typed(),
            items: order.items().to_vec(),
            occurred_at: test_time(),
        });

        match event.to_domain_event() {
            DomainEvent::OrderCreated(e) => {
                assert_eq!(e.order_id, order.id_typed());
                assert_eq!(e.items, vec![ItemQuantity { book_id: BookId::from("b1"), quantity: 3 }]);
            }
            other => panic!("Expected OrderCreated, got {other:?}"),
        }
        assert_eq!(event.event_type(), event.to_domain_event().event_type());
    }

    #[test]
    fn serializes_status_in_lowercase() {
        let order = placed(vec![item("b1", 1)]);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["items"][0]["bookId"], "b1");
        assert!(json.get("fulfilledAt").is_none());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Step {
            Fulfill,
            Cancel,
        }

        proptest! {
            #[test]
            fn at_most_one_terminal_transition(steps in prop::collection::vec(
                prop_oneof![Just(Step::Fulfill), Just(Step::Cancel)], 1..8)
            ) {
                let mut order = placed(vec![item("b1", 1)]);
                let order_id = order.id_typed();
                let mut succeeded = 0;

                for step in steps {
                    let cmd = match step {
                        Step::Fulfill => OrderCommand::FulfillOrder(FulfillOrder { order_id, occurred_at: Utc::now() }),
                        Step::Cancel => OrderCommand::CancelOrder(CancelOrder { order_id, occurred_at: Utc::now() }),
                    };
                    if execute(&mut order, &cmd).is_ok() {
                        succeeded += 1;
                    }
                }

                prop_assert_eq!(succeeded, 1);
                prop_assert!(order.status().is_terminal());
                prop_assert_eq!(order.version(), 2);
            }
        }
    }
}
