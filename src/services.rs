//! Work-order and inventory operations that notify connected clients.
//!
//! Every mutation commits first; the matching event is broadcast afterwards and a
//! failed broadcast is only logged.

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::BroadcastEvent;
use crate::models::{
    InventoryPart, MaintenancePlan, NewInventoryPart, NewMaintenancePlan, NewWorkOrder, OrgId,
    Priority, UserId, WorkOrder, WorkOrderStatus,
};
use crate::storage::{Deduction, Storage};
use crate::websocket::Hub;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn notify(hub: &Hub, organization_id: OrgId, event: &BroadcastEvent) {
    match hub.broadcast_to_organization(organization_id, event) {
        Ok(()) => debug!(org_id = organization_id, kind = event.kind(), "event queued"),
        Err(e) => warn!(org_id = organization_id, kind = event.kind(), error = %e, "failed to broadcast"),
    }
}

/// Fields of a work order that may be changed. Absent fields are left as stored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkOrderUpdate {
    pub technician_id: Option<UserId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<WorkOrderStatus>,
    pub priority: Option<Priority>,
    pub total_cost: Option<f64>,
    pub notes: Option<String>,
}

impl WorkOrderUpdate {
    fn apply(self, wo: &mut WorkOrder) -> Result<(), ServiceError> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(ServiceError::InvalidInput("title must not be empty".into()));
            }
            wo.title = title;
        }
        if let Some(cost) = self.total_cost {
            if cost < 0.0 {
                return Err(ServiceError::InvalidInput("total_cost must not be negative".into()));
            }
            wo.total_cost = cost;
        }
        if self.technician_id.is_some() {
            wo.technician_id = self.technician_id;
        }
        if self.description.is_some() {
            wo.description = self.description;
        }
        if let Some(status) = self.status {
            wo.status = status;
        }
        if let Some(priority) = self.priority {
            wo.priority = priority;
        }
        if self.notes.is_some() {
            wo.notes = self.notes;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct WorkOrderService {
    storage: Storage,
    hub: Hub,
}

impl WorkOrderService {
    pub fn new(storage: Storage, hub: Hub) -> Self {
        Self { storage, hub }
    }

    pub async fn create(
        &self,
        organization_id: OrgId,
        created_by: Option<UserId>,
        new: NewWorkOrder,
    ) -> Result<WorkOrder, ServiceError> {
        if new.title.trim().is_empty() {
            return Err(ServiceError::InvalidInput("title must not be empty".into()));
        }

        let wo = self
            .storage
            .create_work_order(organization_id, created_by, &new)
            .await?;
        info!(org_id = organization_id, work_order_id = wo.id, "work order created");

        notify(&self.hub, organization_id, &BroadcastEvent::work_order_created(&wo));
        Ok(wo)
    }

    /// Apply `update` and announce a status change if the stored status differs.
    pub async fn update(
        &self,
        organization_id: OrgId,
        id: i64,
        update: WorkOrderUpdate,
    ) -> Result<WorkOrder, ServiceError> {
        let mut wo = self
            .storage
            .get_work_order(id, organization_id)
            .await?
            .ok_or(ServiceError::NotFound("work order"))?;
        update.apply(&mut wo)?;

        let previous = self
            .storage
            .update_work_order(&wo)
            .await?
            .ok_or(ServiceError::NotFound("work order"))?;

        if previous != wo.status {
            info!(
                org_id = organization_id,
                work_order_id = wo.id,
                old_status = %previous,
                new_status = %wo.status,
                "work order status changed"
            );
            notify(
                &self.hub,
                organization_id,
                &BroadcastEvent::work_order_status_change(&wo, previous),
            );
        }
        Ok(wo)
    }
}

/// Longest accepted plan interval, ten years.
pub const MAX_FREQUENCY_DAYS: i64 = 3660;

/// A plan as submitted by a client; the organization comes from the caller's identity.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub asset_id: i64,
    pub frequency_days: i64,
    #[serde(default)]
    pub estimated_duration_hours: Option<f64>,
    #[serde(default)]
    pub assigned_role: Option<String>,
    pub next_maintenance_date: NaiveDate,
}

#[derive(Clone)]
pub struct MaintenancePlanService {
    storage: Storage,
}

impl MaintenancePlanService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn create(
        &self,
        organization_id: OrgId,
        request: PlanRequest,
    ) -> Result<MaintenancePlan, ServiceError> {
        if !(1..=MAX_FREQUENCY_DAYS).contains(&request.frequency_days) {
            return Err(ServiceError::InvalidInput(format!(
                "frequency_days must be between 1 and {}",
                MAX_FREQUENCY_DAYS
            )));
        }
        if request.estimated_duration_hours.is_some_and(|h| h < 0.0) {
            return Err(ServiceError::InvalidInput(
                "estimated_duration_hours must not be negative".into(),
            ));
        }

        let plan = self
            .storage
            .create_maintenance_plan(&NewMaintenancePlan {
                organization_id,
                asset_id: request.asset_id,
                frequency_days: request.frequency_days,
                estimated_duration_hours: request.estimated_duration_hours,
                assigned_role: request.assigned_role,
                next_maintenance_date: request.next_maintenance_date,
            })
            .await?;
        info!(
            org_id = organization_id,
            plan_id = plan.id,
            next_date = %plan.next_maintenance_date,
            "maintenance plan created"
        );
        Ok(plan)
    }

    pub async fn list(&self, organization_id: OrgId) -> Result<Vec<MaintenancePlan>, ServiceError> {
        Ok(self.storage.list_maintenance_plans(organization_id).await?)
    }

    pub async fn get(&self, organization_id: OrgId, id: i64) -> Result<MaintenancePlan, ServiceError> {
        self.storage
            .get_maintenance_plan(id, organization_id)
            .await?
            .ok_or(ServiceError::NotFound("maintenance plan"))
    }

    /// Remove a plan and every task generated from it.
    pub async fn delete(&self, organization_id: OrgId, id: i64) -> Result<(), ServiceError> {
        if !self.storage.delete_maintenance_plan(id, organization_id).await? {
            return Err(ServiceError::NotFound("maintenance plan"));
        }
        info!(org_id = organization_id, plan_id = id, "maintenance plan deleted");
        Ok(())
    }
}

/// Fields of an inventory part that may be changed. Absent fields are left as stored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryUpdate {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub quantity: Option<i64>,
    pub min_threshold: Option<i64>,
    pub cost_per_unit: Option<f64>,
    pub location: Option<String>,
}

impl InventoryUpdate {
    fn apply(self, part: &mut InventoryPart) -> Result<(), ServiceError> {
        if let Some(quantity) = self.quantity {
            if quantity < 0 {
                return Err(ServiceError::InvalidInput("quantity must not be negative".into()));
            }
            part.quantity = quantity;
        }
        if let Some(min_threshold) = self.min_threshold {
            if min_threshold < 0 {
                return Err(ServiceError::InvalidInput(
                    "min_threshold must not be negative".into(),
                ));
            }
            part.min_threshold = min_threshold;
        }
        if let Some(name) = self.name {
            part.name = name;
        }
        if let Some(sku) = self.sku {
            part.sku = sku;
        }
        if let Some(cost) = self.cost_per_unit {
            part.cost_per_unit = cost;
        }
        if self.location.is_some() {
            part.location = self.location;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct InventoryService {
    storage: Storage,
    hub: Hub,
}

impl InventoryService {
    pub fn new(storage: Storage, hub: Hub) -> Self {
        Self { storage, hub }
    }

    /// Add a part. No `low_inventory` event: the part never crossed its threshold.
    pub async fn create(
        &self,
        organization_id: OrgId,
        new: NewInventoryPart,
    ) -> Result<InventoryPart, ServiceError> {
        if new.name.trim().is_empty() || new.sku.trim().is_empty() {
            return Err(ServiceError::InvalidInput("name and sku must not be empty".into()));
        }
        if new.quantity < 0 || new.min_threshold < 0 {
            return Err(ServiceError::InvalidInput(
                "quantity and min_threshold must not be negative".into(),
            ));
        }

        let part = self.storage.create_inventory_part(organization_id, &new).await?;
        info!(org_id = organization_id, part_id = part.id, sku = %part.sku, "inventory part created");
        Ok(part)
    }

    pub async fn list(&self, organization_id: OrgId) -> Result<Vec<InventoryPart>, ServiceError> {
        Ok(self.storage.list_inventory_parts(organization_id).await?)
    }

    pub async fn delete(&self, organization_id: OrgId, id: i64) -> Result<(), ServiceError> {
        if !self.storage.delete_inventory_part(id, organization_id).await? {
            return Err(ServiceError::NotFound("inventory part"));
        }
        info!(org_id = organization_id, part_id = id, "inventory part deleted");
        Ok(())
    }

    pub async fn update(
        &self,
        organization_id: OrgId,
        id: i64,
        update: InventoryUpdate,
    ) -> Result<InventoryPart, ServiceError> {
        let mut part = self
            .storage
            .get_inventory_part(id, organization_id)
            .await?
            .ok_or(ServiceError::NotFound("inventory part"))?;
        update.apply(&mut part)?;

        let previous_quantity = self
            .storage
            .update_inventory_part(&part)
            .await?
            .ok_or(ServiceError::NotFound("inventory part"))?;

        self.check_low_stock(previous_quantity, &part);
        Ok(part)
    }

    /// Take `quantity` units out of stock.
    pub async fn deduct(
        &self,
        organization_id: OrgId,
        id: i64,
        quantity: i64,
    ) -> Result<InventoryPart, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput("quantity must be positive".into()));
        }

        match self.storage.deduct_inventory(id, organization_id, quantity).await? {
            Deduction::NotFound => Err(ServiceError::NotFound("inventory part")),
            Deduction::Insufficient { available } => Err(ServiceError::InvalidInput(format!(
                "insufficient stock: {} available, {} requested",
                available, quantity
            ))),
            Deduction::Deducted {
                previous_quantity,
                part,
            } => {
                self.check_low_stock(previous_quantity, &part);
                Ok(part)
            }
        }
    }

    pub async fn low_stock(&self, organization_id: OrgId) -> Result<Vec<InventoryPart>, ServiceError> {
        Ok(self.storage.get_low_stock_parts(organization_id).await?)
    }

    // Fires only when this write moved the part across its threshold.
    fn check_low_stock(&self, previous_quantity: i64, part: &InventoryPart) {
        if previous_quantity > part.min_threshold && part.is_low() {
            info!(
                org_id = part.organization_id,
                part_id = part.id,
                quantity = part.quantity,
                min_threshold = part.min_threshold,
                "inventory below threshold"
            );
            notify(
                &self.hub,
                part.organization_id,
                &BroadcastEvent::low_inventory(part),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::start_session;
    use crate::websocket::transport::testing::{channel_transport, Peer};
    use std::time::Duration;

    async fn setup() -> (Storage, Hub, OrgId) {
        let storage = Storage::in_memory().await.unwrap();
        storage.initialize().await.unwrap();
        let org = storage.create_organization("Plant").await.unwrap();
        let (hub, _task) = Hub::spawn(64);
        (storage, hub, org.id)
    }

    async fn connect(hub: &Hub, org: OrgId) -> Peer {
        let (reader, writer, peer) = channel_transport();
        start_session(hub, org, 1, reader, writer, 64).await.unwrap();
        peer
    }

    async fn assert_quiet(peer: &mut Peer) {
        let next = tokio::time::timeout(Duration::from_millis(50), peer.outbound.recv()).await;
        assert!(next.is_err(), "unexpected delivery: {:?}", next);
    }

    fn new_work_order(title: &str) -> NewWorkOrder {
        NewWorkOrder {
            asset_id: 9,
            technician_id: None,
            title: title.to_string(),
            description: None,
            priority: Priority::High,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_work_order_status_change_reaches_same_org_only() {
        let (storage, hub, org) = setup().await;
        let other = storage.create_organization("Other").await.unwrap();
        let mut peer = connect(&hub, org).await;
        let mut outsider = connect(&hub, other.id).await;
        let service = WorkOrderService::new(storage, hub);

        let wo = service
            .create(org, Some(1), new_work_order("Replace belt"))
            .await
            .unwrap();
        let created = peer.next_json().await.unwrap();
        assert_eq!(created["type"], "work_order_created");
        assert_eq!(created["work_order"]["id"], wo.id);

        let update = WorkOrderUpdate {
            status: Some(WorkOrderStatus::InProgress),
            ..Default::default()
        };
        let updated = service.update(org, wo.id, update).await.unwrap();
        assert_eq!(updated.status, WorkOrderStatus::InProgress);

        let changed = peer.next_json().await.unwrap();
        assert_eq!(changed["type"], "work_order_status_change");
        assert_eq!(changed["old_status"], "pending");
        assert_eq!(changed["new_status"], "in_progress");
        assert_eq!(changed["work_order"]["id"], wo.id);

        assert_quiet(&mut outsider).await;
    }

    #[tokio::test]
    async fn test_update_without_status_change_is_silent() {
        let (storage, hub, org) = setup().await;
        let mut peer = connect(&hub, org).await;
        let service = WorkOrderService::new(storage, hub);

        let wo = service.create(org, None, new_work_order("Oil")).await.unwrap();
        peer.next_json().await.unwrap();

        let update = WorkOrderUpdate {
            notes: Some("parts ordered".into()),
            status: Some(WorkOrderStatus::Pending),
            ..Default::default()
        };
        let updated = service.update(org, wo.id, update).await.unwrap();
        assert_eq!(updated.notes.as_deref(), Some("parts ordered"));
        assert_quiet(&mut peer).await;
    }

    #[tokio::test]
    async fn test_work_order_update_is_tenant_scoped() {
        let (storage, hub, org) = setup().await;
        let other = storage.create_organization("Other").await.unwrap();
        let service = WorkOrderService::new(storage, hub);

        let wo = service.create(org, None, new_work_order("Oil")).await.unwrap();
        let result = service
            .update(other.id, wo.id, WorkOrderUpdate::default())
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let (storage, hub, org) = setup().await;
        let service = WorkOrderService::new(storage, hub);
        let result = service.create(org, None, new_work_order("  ")).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_low_inventory_fires_on_threshold_crossing_only() {
        let (storage, hub, org) = setup().await;
        let part = storage
            .create_inventory_part(
                org,
                &NewInventoryPart {
                    name: "Filter".into(),
                    sku: "F-1".into(),
                    quantity: 12,
                    min_threshold: 10,
                    cost_per_unit: 4.5,
                    location: None,
                },
            )
            .await
            .unwrap();
        let mut peer = connect(&hub, org).await;
        let service = InventoryService::new(storage, hub);

        let update = |quantity| InventoryUpdate {
            quantity: Some(quantity),
            ..Default::default()
        };

        service.update(org, part.id, update(9)).await.unwrap();
        let msg = peer.next_json().await.unwrap();
        assert_eq!(msg["type"], "low_inventory");
        assert_eq!(msg["part"]["id"], part.id);
        assert_eq!(msg["part"]["quantity"], 9);

        service.update(org, part.id, update(5)).await.unwrap();
        assert_quiet(&mut peer).await;

        // Restocking re-arms the trigger.
        service.update(org, part.id, update(20)).await.unwrap();
        service.deduct(org, part.id, 10).await.unwrap();
        let msg = peer.next_json().await.unwrap();
        assert_eq!(msg["type"], "low_inventory");
        assert_eq!(msg["part"]["quantity"], 10);
        assert_quiet(&mut peer).await;
    }

    #[tokio::test]
    async fn test_deduct_validates_quantity() {
        let (storage, hub, org) = setup().await;
        let part = storage
            .create_inventory_part(
                org,
                &NewInventoryPart {
                    name: "Belt".into(),
                    sku: "B-1".into(),
                    quantity: 3,
                    min_threshold: 1,
                    cost_per_unit: 0.0,
                    location: None,
                },
            )
            .await
            .unwrap();
        let service = InventoryService::new(storage, hub);

        assert!(matches!(
            service.deduct(org, part.id, 0).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.deduct(org, part.id, 4).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.deduct(org, part.id + 100, 1).await,
            Err(ServiceError::NotFound(_))
        ));

        let part = service.deduct(org, part.id, 2).await.unwrap();
        assert_eq!(part.quantity, 1);
        assert_eq!(service.low_stock(org).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mutation_succeeds_when_hub_is_gone() {
        let (storage, hub, org) = setup().await;
        hub.shutdown().await.unwrap();
        let service = WorkOrderService::new(storage.clone(), hub);

        let wo = service.create(org, None, new_work_order("Oil")).await.unwrap();
        assert!(storage.get_work_order(wo.id, org).await.unwrap().is_some());
    }

    fn plan_request(frequency_days: i64) -> PlanRequest {
        PlanRequest {
            asset_id: 12,
            frequency_days,
            estimated_duration_hours: Some(1.0),
            assigned_role: None,
            next_maintenance_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_plan_frequency_is_bounded() {
        let (storage, _hub, org) = setup().await;
        let service = MaintenancePlanService::new(storage);

        for frequency in [0, -5, MAX_FREQUENCY_DAYS + 1, 200_000_000] {
            let err = service.create(org, plan_request(frequency)).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)), "{}", frequency);
        }
        assert!(service.list(org).await.unwrap().is_empty());

        let plan = service.create(org, plan_request(MAX_FREQUENCY_DAYS)).await.unwrap();
        assert_eq!(plan.organization_id, org);
        assert_eq!(service.get(org, plan.id).await.unwrap().frequency_days, MAX_FREQUENCY_DAYS);
    }

    #[tokio::test]
    async fn test_plan_delete_is_tenant_scoped() {
        let (storage, _hub, org) = setup().await;
        let other = storage.create_organization("Other").await.unwrap();
        let service = MaintenancePlanService::new(storage);
        let plan = service.create(org, plan_request(30)).await.unwrap();

        let err = service.delete(other.id, plan.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        service.delete(org, plan.id).await.unwrap();
        assert!(matches!(
            service.get(org, plan.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_part_create_validates_and_stays_quiet() {
        let (storage, hub, org) = setup().await;
        let mut peer = connect(&hub, org).await;
        let service = InventoryService::new(storage, hub);

        let bad = NewInventoryPart {
            name: "Seal".into(),
            sku: " ".into(),
            quantity: 1,
            min_threshold: 0,
            cost_per_unit: 0.0,
            location: None,
        };
        assert!(matches!(
            service.create(org, bad.clone()).await.unwrap_err(),
            ServiceError::InvalidInput(_)
        ));
        let negative = NewInventoryPart {
            sku: "S-1".into(),
            quantity: -1,
            ..bad.clone()
        };
        assert!(matches!(
            service.create(org, negative).await.unwrap_err(),
            ServiceError::InvalidInput(_)
        ));

        // Created already below threshold: listed as low, but no event.
        let low = NewInventoryPart {
            sku: "S-1".into(),
            quantity: 0,
            min_threshold: 3,
            ..bad
        };
        let part = service.create(org, low).await.unwrap();
        assert_eq!(service.list(org).await.unwrap().len(), 1);
        assert_eq!(service.low_stock(org).await.unwrap()[0].id, part.id);
        assert_quiet(&mut peer).await;

        service.delete(org, part.id).await.unwrap();
        assert!(service.list(org).await.unwrap().is_empty());
        assert!(matches!(
            service.delete(org, part.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
