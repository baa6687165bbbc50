//! Typed notification events pushed to connected clients.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{InventoryPart, MaintenancePlan, MaintenanceTask, WorkOrder, WorkOrderStatus};

/// An event delivered to every live session of one organization.
///
/// Serialized as a JSON object whose `type` field names the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    WorkOrderCreated {
        work_order: WorkOrderPayload,
    },
    WorkOrderStatusChange {
        work_order: WorkOrderPayload,
        old_status: WorkOrderStatus,
        new_status: WorkOrderStatus,
    },
    LowInventory {
        part: PartPayload,
    },
    MaintenanceDue {
        maintenance_id: i64,
        asset_id: i64,
        scheduled_date: NaiveDate,
    },
    MaintenanceOverdue {
        maintenance_id: i64,
        asset_id: i64,
        scheduled_date: NaiveDate,
    },
}

impl BroadcastEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::WorkOrderCreated { .. } => "work_order_created",
            BroadcastEvent::WorkOrderStatusChange { .. } => "work_order_status_change",
            BroadcastEvent::LowInventory { .. } => "low_inventory",
            BroadcastEvent::MaintenanceDue { .. } => "maintenance_due",
            BroadcastEvent::MaintenanceOverdue { .. } => "maintenance_overdue",
        }
    }

    pub fn work_order_created(work_order: &WorkOrder) -> Self {
        BroadcastEvent::WorkOrderCreated {
            work_order: work_order.into(),
        }
    }

    pub fn work_order_status_change(work_order: &WorkOrder, old_status: WorkOrderStatus) -> Self {
        BroadcastEvent::WorkOrderStatusChange {
            work_order: work_order.into(),
            old_status,
            new_status: work_order.status,
        }
    }

    pub fn low_inventory(part: &InventoryPart) -> Self {
        BroadcastEvent::LowInventory { part: part.into() }
    }

    /// `maintenance_id` carries the plan id for due notifications.
    pub fn maintenance_due(plan: &MaintenancePlan) -> Self {
        BroadcastEvent::MaintenanceDue {
            maintenance_id: plan.id,
            asset_id: plan.asset_id,
            scheduled_date: plan.next_maintenance_date,
        }
    }

    /// `maintenance_id` carries the task id for overdue notifications.
    pub fn maintenance_overdue(task: &MaintenanceTask) -> Self {
        BroadcastEvent::MaintenanceOverdue {
            maintenance_id: task.id,
            asset_id: task.asset_id,
            scheduled_date: task.scheduled_date,
        }
    }
}

/// Work order fields exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderPayload {
    pub id: i64,
    pub asset_id: i64,
    pub title: String,
    pub status: WorkOrderStatus,
    pub priority: String,
    pub technician_id: Option<i64>,
}

impl From<&WorkOrder> for WorkOrderPayload {
    fn from(wo: &WorkOrder) -> Self {
        Self {
            id: wo.id,
            asset_id: wo.asset_id,
            title: wo.title.clone(),
            status: wo.status,
            priority: wo.priority.to_string(),
            technician_id: wo.technician_id,
        }
    }
}

/// Inventory part fields exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartPayload {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub quantity: i64,
    pub min_threshold: i64,
}

impl From<&InventoryPart> for PartPayload {
    fn from(part: &InventoryPart) -> Self {
        Self {
            id: part.id,
            name: part.name.clone(),
            sku: part.sku.clone(),
            quantity: part.quantity,
            min_threshold: part.min_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    #[test]
    fn test_serialized_type_matches_kind() {
        let task = MaintenanceTask {
            id: 42,
            organization_id: 1,
            maintenance_plan_id: 3,
            asset_id: 9,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            status: TaskStatus::Overdue,
            completed_date: None,
            notes: None,
        };
        let event = BroadcastEvent::maintenance_overdue(&task);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], event.kind());
        assert_eq!(value["maintenance_id"], 42);
        assert_eq!(value["asset_id"], 9);
        assert_eq!(value["scheduled_date"], "2026-01-15");
    }

    #[test]
    fn test_status_change_carries_both_statuses() {
        let wo = WorkOrder {
            id: 5,
            organization_id: 1,
            asset_id: 2,
            technician_id: Some(11),
            title: "Replace belt".to_string(),
            description: None,
            status: WorkOrderStatus::InProgress,
            priority: crate::models::Priority::High,
            total_cost: 0.0,
            notes: None,
            created_by: None,
        };
        let event = BroadcastEvent::work_order_status_change(&wo, WorkOrderStatus::Pending);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "work_order_status_change");
        assert_eq!(value["old_status"], "pending");
        assert_eq!(value["new_status"], "in_progress");
        assert_eq!(value["work_order"]["priority"], "high");
    }
}
