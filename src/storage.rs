//! SQLite storage layer for organizations, maintenance, work orders and inventory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;

use crate::models::{
    InventoryPart, MaintenancePlan, MaintenanceTask, NewInventoryPart, NewMaintenancePlan,
    NewMaintenanceTask, NewWorkOrder, OrgId, Organization, UserId, WorkOrder, WorkOrderStatus,
};

/// Durable state the scheduler reads and writes.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    async fn list_organizations(&self) -> Result<Vec<Organization>>;

    /// Plans whose next maintenance date is on or before `today`.
    async fn get_maintenance_plans_due(
        &self,
        organization_id: OrgId,
        today: NaiveDate,
    ) -> Result<Vec<MaintenancePlan>>;

    async fn create_maintenance_task(&self, task: &NewMaintenanceTask) -> Result<MaintenanceTask>;

    /// Create the pending task for a due plan and advance the plan's next due
    /// date, atomically. Fails if the plan was rescheduled since it was read.
    async fn schedule_due_task(&self, plan: &MaintenancePlan) -> Result<MaintenanceTask>;

    /// Pending or in-progress tasks scheduled strictly before `today`.
    async fn get_overdue_maintenance_tasks(
        &self,
        organization_id: OrgId,
        today: NaiveDate,
    ) -> Result<Vec<MaintenanceTask>>;

    /// Move an open task to `overdue`. Returns `false` if the task is no longer
    /// open (another scan or a user got there first) or does not exist.
    async fn mark_task_overdue(&self, organization_id: OrgId, task_id: i64) -> Result<bool>;
}

/// Outcome of a stock deduction.
#[derive(Debug)]
pub enum Deduction {
    NotFound,
    Insufficient { available: i64 },
    Deducted { previous_quantity: i64, part: InventoryPart },
}

/// Storage manager backed by a SQLite pool.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<SqlitePool>,
}

impl Storage {
    /// Open (creating if needed) the database file at `db_path`.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// A private in-memory database. One connection, so every query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize the database schema.
    pub async fn initialize(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS maintenance_plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id INTEGER NOT NULL,
                asset_id INTEGER NOT NULL,
                frequency_days INTEGER NOT NULL,
                estimated_duration_hours REAL,
                assigned_role TEXT,
                last_maintenance_date TEXT,
                next_maintenance_date TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (organization_id) REFERENCES organizations(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS maintenance_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id INTEGER NOT NULL,
                maintenance_plan_id INTEGER NOT NULL,
                asset_id INTEGER NOT NULL,
                scheduled_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK(status IN ('pending', 'in_progress', 'completed', 'overdue')),
                completed_date TEXT,
                notes TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (maintenance_plan_id) REFERENCES maintenance_plans(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS work_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id INTEGER NOT NULL,
                asset_id INTEGER NOT NULL,
                technician_id INTEGER,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                priority TEXT NOT NULL DEFAULT 'medium',
                total_cost REAL NOT NULL DEFAULT 0,
                notes TEXT,
                created_by INTEGER,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS inventory_parts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                organization_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                sku TEXT NOT NULL,
                quantity INTEGER NOT NULL DEFAULT 0,
                min_threshold INTEGER NOT NULL DEFAULT 0,
                cost_per_unit REAL NOT NULL DEFAULT 0,
                location TEXT,
                deleted_at TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_plans_org_next ON maintenance_plans(organization_id, next_maintenance_date)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_org_status ON maintenance_tasks(organization_id, status, scheduled_date)",
            "CREATE INDEX IF NOT EXISTS idx_work_orders_org ON work_orders(organization_id)",
            "CREATE INDEX IF NOT EXISTS idx_parts_org ON inventory_parts(organization_id)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&*self.pool).await?;
        }

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Organizations and plans
    // ---------------------------------------------------------------------

    pub async fn create_organization(&self, name: &str) -> Result<Organization> {
        let result = sqlx::query("INSERT INTO organizations (name) VALUES (?)")
            .bind(name)
            .execute(&*self.pool)
            .await?;

        Ok(Organization {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub async fn create_maintenance_plan(&self, plan: &NewMaintenancePlan) -> Result<MaintenancePlan> {
        let result = sqlx::query(
            r#"
            INSERT INTO maintenance_plans (
                organization_id, asset_id, frequency_days, estimated_duration_hours,
                assigned_role, next_maintenance_date
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.organization_id)
        .bind(plan.asset_id)
        .bind(plan.frequency_days)
        .bind(plan.estimated_duration_hours)
        .bind(&plan.assigned_role)
        .bind(fmt_date(plan.next_maintenance_date))
        .execute(&*self.pool)
        .await?;

        Ok(MaintenancePlan {
            id: result.last_insert_rowid(),
            organization_id: plan.organization_id,
            asset_id: plan.asset_id,
            frequency_days: plan.frequency_days,
            estimated_duration_hours: plan.estimated_duration_hours,
            assigned_role: plan.assigned_role.clone(),
            last_maintenance_date: None,
            next_maintenance_date: plan.next_maintenance_date,
        })
    }

    pub async fn get_maintenance_plan(
        &self,
        id: i64,
        organization_id: OrgId,
    ) -> Result<Option<MaintenancePlan>> {
        let row = sqlx::query("SELECT * FROM maintenance_plans WHERE id = ? AND organization_id = ?")
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(row_to_plan).transpose()
    }

    /// All plans of an organization, soonest due first.
    pub async fn list_maintenance_plans(&self, organization_id: OrgId) -> Result<Vec<MaintenancePlan>> {
        let rows = sqlx::query(
            "SELECT * FROM maintenance_plans WHERE organization_id = ? ORDER BY next_maintenance_date ASC, id ASC",
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect()
    }

    /// Delete a plan together with its tasks. `false` if no such plan in that organization.
    pub async fn delete_maintenance_plan(&self, id: i64, organization_id: OrgId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM maintenance_tasks WHERE maintenance_plan_id = ? AND organization_id = ?")
            .bind(id)
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM maintenance_plans WHERE id = ? AND organization_id = ?")
            .bind(id)
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    pub async fn get_maintenance_task(
        &self,
        id: i64,
        organization_id: OrgId,
    ) -> Result<Option<MaintenanceTask>> {
        let row = sqlx::query("SELECT * FROM maintenance_tasks WHERE id = ? AND organization_id = ?")
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    /// All tasks of an organization, oldest scheduled first.
    pub async fn list_maintenance_tasks(&self, organization_id: OrgId) -> Result<Vec<MaintenanceTask>> {
        let rows = sqlx::query(
            "SELECT * FROM maintenance_tasks WHERE organization_id = ? ORDER BY scheduled_date ASC, id ASC",
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    // ---------------------------------------------------------------------
    // Work orders
    // ---------------------------------------------------------------------

    pub async fn create_work_order(
        &self,
        organization_id: OrgId,
        created_by: Option<UserId>,
        wo: &NewWorkOrder,
    ) -> Result<WorkOrder> {
        let result = sqlx::query(
            r#"
            INSERT INTO work_orders (
                organization_id, asset_id, technician_id, title, description,
                status, priority, notes, created_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(organization_id)
        .bind(wo.asset_id)
        .bind(wo.technician_id)
        .bind(&wo.title)
        .bind(&wo.description)
        .bind(WorkOrderStatus::Pending.to_string())
        .bind(wo.priority.to_string())
        .bind(&wo.notes)
        .bind(created_by)
        .execute(&*self.pool)
        .await?;

        Ok(WorkOrder {
            id: result.last_insert_rowid(),
            organization_id,
            asset_id: wo.asset_id,
            technician_id: wo.technician_id,
            title: wo.title.clone(),
            description: wo.description.clone(),
            status: WorkOrderStatus::Pending,
            priority: wo.priority,
            total_cost: 0.0,
            notes: wo.notes.clone(),
            created_by,
        })
    }

    pub async fn get_work_order(&self, id: i64, organization_id: OrgId) -> Result<Option<WorkOrder>> {
        let row = sqlx::query("SELECT * FROM work_orders WHERE id = ? AND organization_id = ?")
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(row_to_work_order).transpose()
    }

    /// Persist a work order, returning the status it had before the write.
    /// `None` if the work order does not exist in that organization.
    pub async fn update_work_order(&self, wo: &WorkOrder) -> Result<Option<WorkOrderStatus>> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT status FROM work_orders WHERE id = ? AND organization_id = ?")
                .bind(wo.id)
                .bind(wo.organization_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous) = previous else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE work_orders SET
                technician_id = ?, title = ?, description = ?, status = ?,
                priority = ?, total_cost = ?, notes = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(wo.technician_id)
        .bind(&wo.title)
        .bind(&wo.description)
        .bind(wo.status.to_string())
        .bind(wo.priority.to_string())
        .bind(wo.total_cost)
        .bind(&wo.notes)
        .bind(wo.id)
        .bind(wo.organization_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(previous.parse()?))
    }

    // ---------------------------------------------------------------------
    // Inventory
    // ---------------------------------------------------------------------

    pub async fn create_inventory_part(
        &self,
        organization_id: OrgId,
        part: &NewInventoryPart,
    ) -> Result<InventoryPart> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_parts (
                organization_id, name, sku, quantity, min_threshold, cost_per_unit, location
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(organization_id)
        .bind(&part.name)
        .bind(&part.sku)
        .bind(part.quantity)
        .bind(part.min_threshold)
        .bind(part.cost_per_unit)
        .bind(&part.location)
        .execute(&*self.pool)
        .await?;

        Ok(InventoryPart {
            id: result.last_insert_rowid(),
            organization_id,
            name: part.name.clone(),
            sku: part.sku.clone(),
            quantity: part.quantity,
            min_threshold: part.min_threshold,
            cost_per_unit: part.cost_per_unit,
            location: part.location.clone(),
        })
    }

    pub async fn get_inventory_part(
        &self,
        id: i64,
        organization_id: OrgId,
    ) -> Result<Option<InventoryPart>> {
        let row = sqlx::query(
            "SELECT * FROM inventory_parts WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(row_to_part).transpose()
    }

    pub async fn list_inventory_parts(&self, organization_id: OrgId) -> Result<Vec<InventoryPart>> {
        let rows = sqlx::query(
            "SELECT * FROM inventory_parts WHERE organization_id = ? AND deleted_at IS NULL ORDER BY name ASC, id ASC",
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_part).collect()
    }

    /// Soft-delete a part. `false` if it does not exist or is already deleted.
    pub async fn delete_inventory_part(&self, id: i64, organization_id: OrgId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_parts
            SET deleted_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND organization_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(organization_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Persist a part, returning the quantity it had before the write.
    /// `None` if the part does not exist in that organization.
    pub async fn update_inventory_part(&self, part: &InventoryPart) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM inventory_parts WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
        )
        .bind(part.id)
        .bind(part.organization_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(previous) = previous else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE inventory_parts SET
                name = ?, sku = ?, quantity = ?, min_threshold = ?, cost_per_unit = ?,
                location = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(&part.name)
        .bind(&part.sku)
        .bind(part.quantity)
        .bind(part.min_threshold)
        .bind(part.cost_per_unit)
        .bind(&part.location)
        .bind(part.id)
        .bind(part.organization_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(previous))
    }

    /// Remove `quantity` units from stock if enough are on hand.
    pub async fn deduct_inventory(
        &self,
        id: i64,
        organization_id: OrgId,
        quantity: i64,
    ) -> Result<Deduction> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT * FROM inventory_parts WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(Deduction::NotFound);
        };

        let mut part = row_to_part(&row)?;
        if part.quantity < quantity {
            return Ok(Deduction::Insufficient {
                available: part.quantity,
            });
        }

        sqlx::query(
            "UPDATE inventory_parts SET quantity = quantity - ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND organization_id = ?",
        )
        .bind(quantity)
        .bind(id)
        .bind(organization_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let previous_quantity = part.quantity;
        part.quantity -= quantity;
        Ok(Deduction::Deducted {
            previous_quantity,
            part,
        })
    }

    pub async fn get_low_stock_parts(&self, organization_id: OrgId) -> Result<Vec<InventoryPart>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM inventory_parts
            WHERE organization_id = ? AND quantity <= min_threshold AND deleted_at IS NULL
            ORDER BY name ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_part).collect()
    }
}

#[async_trait]
impl MaintenanceStore for Storage {
    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let rows = sqlx::query("SELECT id, name FROM organizations ORDER BY id ASC")
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Organization {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    async fn get_maintenance_plans_due(
        &self,
        organization_id: OrgId,
        today: NaiveDate,
    ) -> Result<Vec<MaintenancePlan>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_plans
            WHERE organization_id = ? AND next_maintenance_date <= ?
            ORDER BY next_maintenance_date ASC, id ASC
            "#,
        )
        .bind(organization_id)
        .bind(fmt_date(today))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect()
    }

    async fn create_maintenance_task(&self, task: &NewMaintenanceTask) -> Result<MaintenanceTask> {
        let result = sqlx::query(
            r#"
            INSERT INTO maintenance_tasks (
                organization_id, maintenance_plan_id, asset_id, scheduled_date, status, notes
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.organization_id)
        .bind(task.maintenance_plan_id)
        .bind(task.asset_id)
        .bind(fmt_date(task.scheduled_date))
        .bind(task.status.to_string())
        .bind(&task.notes)
        .execute(&*self.pool)
        .await?;

        Ok(stored_task(result.last_insert_rowid(), task))
    }

    async fn schedule_due_task(&self, plan: &MaintenancePlan) -> Result<MaintenanceTask> {
        let task = NewMaintenanceTask::pending_for(plan);
        let following = plan.following_due_date().ok_or_else(|| {
            anyhow!(
                "maintenance plan {} has no representable due date after {} (frequency {} days)",
                plan.id,
                plan.next_maintenance_date,
                plan.frequency_days
            )
        })?;
        let mut tx = self.pool.begin().await?;

        let advanced = sqlx::query(
            r#"
            UPDATE maintenance_plans SET
                last_maintenance_date = ?, next_maintenance_date = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND organization_id = ? AND next_maintenance_date = ?
            "#,
        )
        .bind(fmt_date(plan.next_maintenance_date))
        .bind(fmt_date(following))
        .bind(plan.id)
        .bind(plan.organization_id)
        .bind(fmt_date(plan.next_maintenance_date))
        .execute(&mut *tx)
        .await?;

        if advanced.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(anyhow!(
                "maintenance plan {} was rescheduled or removed since it was read",
                plan.id
            ));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO maintenance_tasks (
                organization_id, maintenance_plan_id, asset_id, scheduled_date, status, notes
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.organization_id)
        .bind(task.maintenance_plan_id)
        .bind(task.asset_id)
        .bind(fmt_date(task.scheduled_date))
        .bind(task.status.to_string())
        .bind(&task.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored_task(result.last_insert_rowid(), &task))
    }

    async fn get_overdue_maintenance_tasks(
        &self,
        organization_id: OrgId,
        today: NaiveDate,
    ) -> Result<Vec<MaintenanceTask>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_tasks
            WHERE organization_id = ? AND scheduled_date < ?
              AND status IN ('pending', 'in_progress')
            ORDER BY scheduled_date ASC, id ASC
            "#,
        )
        .bind(organization_id)
        .bind(fmt_date(today))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn mark_task_overdue(&self, organization_id: OrgId, task_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE maintenance_tasks SET status = 'overdue', updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND organization_id = ? AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(task_id)
        .bind(organization_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn stored_task(id: i64, task: &NewMaintenanceTask) -> MaintenanceTask {
    MaintenanceTask {
        id,
        organization_id: task.organization_id,
        maintenance_plan_id: task.maintenance_plan_id,
        asset_id: task.asset_id,
        scheduled_date: task.scheduled_date,
        status: task.status,
        completed_date: None,
        notes: task.notes.clone(),
    }
}

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}

fn row_to_plan(row: &SqliteRow) -> Result<MaintenancePlan> {
    let last: Option<String> = row.get("last_maintenance_date");
    let next: String = row.get("next_maintenance_date");

    Ok(MaintenancePlan {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        asset_id: row.get("asset_id"),
        frequency_days: row.get("frequency_days"),
        estimated_duration_hours: row.get("estimated_duration_hours"),
        assigned_role: row.get("assigned_role"),
        last_maintenance_date: last.as_deref().map(parse_date).transpose()?,
        next_maintenance_date: parse_date(&next)?,
    })
}

fn row_to_task(row: &SqliteRow) -> Result<MaintenanceTask> {
    let scheduled: String = row.get("scheduled_date");
    let completed: Option<String> = row.get("completed_date");
    let status: String = row.get("status");

    Ok(MaintenanceTask {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        maintenance_plan_id: row.get("maintenance_plan_id"),
        asset_id: row.get("asset_id"),
        scheduled_date: parse_date(&scheduled)?,
        status: status.parse()?,
        completed_date: completed.as_deref().map(parse_date).transpose()?,
        notes: row.get("notes"),
    })
}

fn row_to_work_order(row: &SqliteRow) -> Result<WorkOrder> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");

    Ok(WorkOrder {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        asset_id: row.get("asset_id"),
        technician_id: row.get("technician_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: status.parse()?,
        priority: priority.parse()?,
        total_cost: row.get("total_cost"),
        notes: row.get("notes"),
        created_by: row.get("created_by"),
    })
}

fn row_to_part(row: &SqliteRow) -> Result<InventoryPart> {
    Ok(InventoryPart {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        name: row.get("name"),
        sku: row.get("sku"),
        quantity: row.get("quantity"),
        min_threshold: row.get("min_threshold"),
        cost_per_unit: row.get("cost_per_unit"),
        location: row.get("location"),
    })
}
