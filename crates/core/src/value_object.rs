//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two stock
/// locations naming the same shelf and quantity are the same location. To
/// "modify" one, build a new value.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct StockLocation {
///     shelf_id: ShelfId,
///     quantity: i64,
/// }
///
/// impl ValueObject for StockLocation {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
