//! Multi-shelf allocation: turn "take N copies of book X" into per-shelf removals.
//!
//! Shelves are depleted in ascending `ShelfId` order (byte-wise string order),
//! so the same record and quantity always yield the same plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookstore_core::{BookId, DomainError, DomainResult, ShelfId, ensure_positive};

use crate::record::{InventoryRecord, StockChange};

/// Copies to take from one shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfPick {
    pub shelf_id: ShelfId,
    pub quantity: i64,
}

/// A feasible removal plan for one book.
///
/// Only [`plan_allocation`] builds plans, and only after checking that the
/// record holds enough stock in aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPlan {
    book_id: BookId,
    requested: i64,
    picks: Vec<ShelfPick>,
}

impl AllocationPlan {
    pub fn book_id(&self) -> &BookId {
        &self.book_id
    }

    pub fn requested(&self) -> i64 {
        self.requested
    }

    pub fn picks(&self) -> &[ShelfPick] {
        &self.picks
    }
}

/// Decide which shelves to draw `quantity` copies from.
///
/// Pre-check first: fails with `InsufficientStock` when the total across all
/// shelves is short, before any pick is chosen.
pub fn plan_allocation(record: &InventoryRecord, quantity: i64) -> DomainResult<AllocationPlan> {
    ensure_positive(quantity)?;

    let available = record.total();
    if available < quantity {
        return Err(DomainError::insufficient_stock(
            record.book_id().as_str(),
            quantity,
            available,
        ));
    }

    let mut remaining = quantity;
    let mut picks = Vec::new();
    for location in record.locations() {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(location.quantity);
        picks.push(ShelfPick {
            shelf_id: location.shelf_id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(AllocationPlan {
        book_id: record.book_id().clone(),
        requested: quantity,
        picks,
    })
}

impl InventoryRecord {
    /// Execute a plan all-or-nothing.
    ///
    /// Removals run against a working copy; `self` is replaced only when every
    /// pick succeeded, so a stale plan leaves the record untouched.
    pub fn apply_plan(
        &mut self,
        plan: &AllocationPlan,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<StockChange>> {
        if plan.book_id() != self.book_id() {
            return Err(DomainError::validation(format!(
                "plan for book {} applied to record of book {}",
                plan.book_id(),
                self.book_id()
            )));
        }

        let mut working = self.clone();
        let changes = plan
            .picks()
            .iter()
            .map(|pick| working.remove_stock(&pick.shelf_id, pick.quantity, occurred_at))
            .collect::<DomainResult<Vec<_>>>()?;

        *self = working;
        Ok(changes)
    }

    /// Plan and execute in one step against this record.
    pub fn allocate(
        &mut self,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<(AllocationPlan, Vec<StockChange>)> {
        let plan = plan_allocation(self, quantity)?;
        let changes = self.apply_plan(&plan, occurred_at)?;
        Ok((plan, changes))
    }
}
