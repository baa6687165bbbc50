//! Data models for organizations, maintenance, work orders and inventory.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tenant identifier. Every hub and scheduler operation is partitioned by it.
pub type OrgId = i64;

/// Authenticated user identifier, as supplied by the upstream gateway.
pub type UserId = i64;

/// An organization (tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
}

/// Status of a maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    /// Whether a task in this status can still go overdue.
    pub fn is_open(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Overdue => write!(f, "overdue"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "overdue" => Ok(TaskStatus::Overdue),
            other => Err(anyhow::anyhow!("unknown task status: {}", other)),
        }
    }
}

/// Status of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkOrderStatus::Pending => write!(f, "pending"),
            WorkOrderStatus::InProgress => write!(f, "in_progress"),
            WorkOrderStatus::Completed => write!(f, "completed"),
            WorkOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for WorkOrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkOrderStatus::Pending),
            "in_progress" => Ok(WorkOrderStatus::InProgress),
            "completed" => Ok(WorkOrderStatus::Completed),
            "cancelled" => Ok(WorkOrderStatus::Cancelled),
            other => Err(anyhow::anyhow!("unknown work order status: {}", other)),
        }
    }
}

/// Priority of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(anyhow::anyhow!("unknown priority: {}", other)),
        }
    }
}

/// A recurring maintenance obligation on an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenancePlan {
    pub id: i64,
    pub organization_id: OrgId,
    pub asset_id: i64,
    pub frequency_days: i64,
    pub estimated_duration_hours: Option<f64>,
    pub assigned_role: Option<String>,
    pub last_maintenance_date: Option<NaiveDate>,
    pub next_maintenance_date: NaiveDate,
}

impl MaintenancePlan {
    /// The due date that follows `next_maintenance_date`, or `None` if it falls
    /// outside the representable calendar.
    ///
    /// A non-positive frequency is treated as daily so a plan can never stay due forever.
    pub fn following_due_date(&self) -> Option<NaiveDate> {
        let days = self.frequency_days.max(1).unsigned_abs();
        self.next_maintenance_date.checked_add_days(Days::new(days))
    }
}

/// Fields for a plan that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaintenancePlan {
    pub organization_id: OrgId,
    pub asset_id: i64,
    pub frequency_days: i64,
    pub estimated_duration_hours: Option<f64>,
    pub assigned_role: Option<String>,
    pub next_maintenance_date: NaiveDate,
}

/// One concrete occurrence of a maintenance plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceTask {
    pub id: i64,
    pub organization_id: OrgId,
    pub maintenance_plan_id: i64,
    pub asset_id: i64,
    pub scheduled_date: NaiveDate,
    pub status: TaskStatus,
    pub completed_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Fields for a task that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaintenanceTask {
    pub organization_id: OrgId,
    pub maintenance_plan_id: i64,
    pub asset_id: i64,
    pub scheduled_date: NaiveDate,
    pub status: TaskStatus,
    pub notes: Option<String>,
}

impl NewMaintenanceTask {
    /// A pending task for the plan's current due date.
    pub fn pending_for(plan: &MaintenancePlan) -> Self {
        Self {
            organization_id: plan.organization_id,
            maintenance_plan_id: plan.id,
            asset_id: plan.asset_id,
            scheduled_date: plan.next_maintenance_date,
            status: TaskStatus::Pending,
            notes: None,
        }
    }
}

/// A work order against an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: i64,
    pub organization_id: OrgId,
    pub asset_id: i64,
    pub technician_id: Option<UserId>,
    pub title: String,
    pub description: Option<String>,
    pub status: WorkOrderStatus,
    pub priority: Priority,
    pub total_cost: f64,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
}

/// Fields for a work order that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub asset_id: i64,
    #[serde(default)]
    pub technician_id: Option<UserId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A stocked spare part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryPart {
    pub id: i64,
    pub organization_id: OrgId,
    pub name: String,
    pub sku: String,
    pub quantity: i64,
    pub min_threshold: i64,
    pub cost_per_unit: f64,
    pub location: Option<String>,
}

impl InventoryPart {
    /// Whether the part is at or below its reorder threshold.
    pub fn is_low(&self) -> bool {
        self.quantity <= self.min_threshold
    }
}

/// Fields for a part that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryPart {
    pub name: String,
    pub sku: String,
    pub quantity: i64,
    pub min_threshold: i64,
    #[serde(default)]
    pub cost_per_unit: f64,
    #[serde(default)]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(next: NaiveDate, frequency_days: i64) -> MaintenancePlan {
        MaintenancePlan {
            id: 1,
            organization_id: 1,
            asset_id: 7,
            frequency_days,
            estimated_duration_hours: None,
            assigned_role: None,
            last_maintenance_date: None,
            next_maintenance_date: next,
        }
    }

    #[test]
    fn test_following_due_date_adds_frequency() {
        let next = NaiveDate::from_ymd_opt(2026, 3, 30).unwrap();
        let p = plan(next, 7);
        assert_eq!(p.following_due_date(), NaiveDate::from_ymd_opt(2026, 4, 6));
    }

    #[test]
    fn test_following_due_date_never_stalls() {
        let next = NaiveDate::from_ymd_opt(2026, 3, 30).unwrap();
        assert_eq!(plan(next, 0).following_due_date(), next.succ_opt());
        assert_eq!(plan(next, -5).following_due_date(), next.succ_opt());
    }

    #[test]
    fn test_following_due_date_out_of_range_is_none() {
        let next = NaiveDate::from_ymd_opt(2026, 3, 30).unwrap();
        assert_eq!(plan(next, 200_000_000).following_due_date(), None);
        assert_eq!(plan(next, i64::MAX).following_due_date(), None);
        assert_eq!(plan(NaiveDate::MAX, 1).following_due_date(), None);
    }

    #[test]
    fn test_task_status_round_trips_through_text() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Overdue,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_only_pending_and_in_progress_are_open() {
        assert!(TaskStatus::Pending.is_open());
        assert!(TaskStatus::InProgress.is_open());
        assert!(!TaskStatus::Completed.is_open());
        assert!(!TaskStatus::Overdue.is_open());
    }

    #[test]
    fn test_part_is_low_at_threshold() {
        let mut part = InventoryPart {
            id: 1,
            organization_id: 1,
            name: "Filter".to_string(),
            sku: "F-1".to_string(),
            quantity: 11,
            min_threshold: 10,
            cost_per_unit: 2.5,
            location: None,
        };
        assert!(!part.is_low());
        part.quantity = 10;
        assert!(part.is_low());
    }
}
