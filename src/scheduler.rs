//! Background maintenance scheduler.
//!
//! On every tick the scheduler scans all organizations twice: once for plans
//! that have come due (creating a pending task and announcing it) and once for
//! open tasks whose scheduled date has passed (marking them overdue and
//! announcing that). Failures are logged per organization or per item and the
//! scan moves on; the next tick re-queries the same state.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::events::BroadcastEvent;
use crate::models::{OrgId, Organization, TaskStatus};
use crate::storage::MaintenanceStore;
use crate::websocket::Hub;

/// Counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub organizations: usize,
    pub plans_due: usize,
    pub tasks_created: usize,
    pub tasks_overdue: usize,
    pub events_emitted: usize,
    pub errors: usize,
}

impl ScanReport {
    fn merge(self, other: ScanReport) -> ScanReport {
        ScanReport {
            organizations: self.organizations.max(other.organizations),
            plans_due: self.plans_due + other.plans_due,
            tasks_created: self.tasks_created + other.tasks_created,
            tasks_overdue: self.tasks_overdue + other.tasks_overdue,
            events_emitted: self.events_emitted + other.events_emitted,
            errors: self.errors + other.errors,
        }
    }
}

/// The scans themselves, independent of any timer.
#[derive(Clone)]
pub struct Scanner {
    store: Arc<dyn MaintenanceStore>,
    hub: Hub,
}

impl Scanner {
    pub fn new(store: Arc<dyn MaintenanceStore>, hub: Hub) -> Self {
        Self { store, hub }
    }

    /// Run both scans for `today`.
    pub async fn run_once(&self, today: NaiveDate) -> ScanReport {
        let due = self.check_maintenance_due(today).await;
        let overdue = self.check_overdue_tasks(today).await;
        due.merge(overdue)
    }

    /// Run both scans for `today`, touching only `organization_id`.
    pub async fn run_once_for(&self, organization_id: OrgId, today: NaiveDate) -> ScanReport {
        let mut report = ScanReport {
            organizations: 1,
            ..ScanReport::default()
        };
        self.scan_due(organization_id, today, &mut report).await;
        self.scan_overdue(organization_id, today, &mut report).await;
        report
    }

    /// Create a pending task and emit `maintenance_due` for every due plan.
    pub async fn check_maintenance_due(&self, today: NaiveDate) -> ScanReport {
        let mut report = ScanReport::default();
        let Some(orgs) = self.organizations(&mut report).await else {
            return report;
        };

        for org in orgs {
            report.organizations += 1;
            self.scan_due(org.id, today, &mut report).await;
        }
        report
    }

    /// Mark open tasks scheduled before `today` as overdue and emit `maintenance_overdue`.
    pub async fn check_overdue_tasks(&self, today: NaiveDate) -> ScanReport {
        let mut report = ScanReport::default();
        let Some(orgs) = self.organizations(&mut report).await else {
            return report;
        };

        for org in orgs {
            report.organizations += 1;
            self.scan_overdue(org.id, today, &mut report).await;
        }
        report
    }

    async fn organizations(&self, report: &mut ScanReport) -> Option<Vec<Organization>> {
        match self.store.list_organizations().await {
            Ok(orgs) => Some(orgs),
            Err(e) => {
                error!(error = %e, "failed to list organizations");
                report.errors += 1;
                None
            }
        }
    }

    async fn scan_due(&self, organization_id: OrgId, today: NaiveDate, report: &mut ScanReport) {
        let plans = match self.store.get_maintenance_plans_due(organization_id, today).await {
            Ok(plans) => plans,
            Err(e) => {
                error!(org_id = organization_id, error = %e, "failed to fetch due maintenance plans");
                report.errors += 1;
                return;
            }
        };

        for plan in plans {
            report.plans_due += 1;
            match self.store.schedule_due_task(&plan).await {
                Ok(task) => {
                    report.tasks_created += 1;
                    info!(
                        org_id = organization_id,
                        plan_id = plan.id,
                        task_id = task.id,
                        scheduled_date = %task.scheduled_date,
                        "created maintenance task"
                    );
                }
                Err(e) => {
                    error!(org_id = organization_id, plan_id = plan.id, error = %e, "failed to create maintenance task");
                    report.errors += 1;
                    continue;
                }
            }

            self.emit(organization_id, &BroadcastEvent::maintenance_due(&plan), report);
        }
    }

    async fn scan_overdue(&self, organization_id: OrgId, today: NaiveDate, report: &mut ScanReport) {
        let tasks = match self.store.get_overdue_maintenance_tasks(organization_id, today).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(org_id = organization_id, error = %e, "failed to fetch overdue tasks");
                report.errors += 1;
                return;
            }
        };

        for mut task in tasks {
            if !task.status.is_open() {
                continue;
            }
            match self.store.mark_task_overdue(organization_id, task.id).await {
                Ok(true) => {}
                Ok(false) => {
                    // Closed or already marked by a concurrent scan.
                    debug!(org_id = organization_id, task_id = task.id, "task no longer open");
                    continue;
                }
                Err(e) => {
                    error!(org_id = organization_id, task_id = task.id, error = %e, "failed to mark task overdue");
                    report.errors += 1;
                    continue;
                }
            }

            let previous = task.status;
            task.status = TaskStatus::Overdue;
            report.tasks_overdue += 1;
            info!(
                org_id = organization_id,
                task_id = task.id,
                previous_status = %previous,
                "maintenance task overdue"
            );

            self.emit(organization_id, &BroadcastEvent::maintenance_overdue(&task), report);
        }
    }

    fn emit(&self, organization_id: OrgId, event: &BroadcastEvent, report: &mut ScanReport) {
        match self.hub.broadcast_to_organization(organization_id, event) {
            Ok(()) => report.events_emitted += 1,
            Err(e) => {
                warn!(org_id = organization_id, kind = event.kind(), error = %e, "failed to broadcast");
                report.errors += 1;
            }
        }
    }
}

struct Running {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Longest accepted scan period; longer values are clamped to it.
pub const MAX_SCAN_PERIOD: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Runs a [`Scanner`] on a fixed cadence until stopped.
pub struct Scheduler {
    scanner: Scanner,
    period: Duration,
    initial_scan: bool,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(scanner: Scanner, period: Duration) -> Self {
        Self {
            scanner,
            period: period.clamp(Duration::from_secs(1), MAX_SCAN_PERIOD),
            initial_scan: false,
            running: Mutex::new(None),
        }
    }

    /// Run the first scan immediately instead of one period after start.
    pub fn with_initial_scan(mut self, initial_scan: bool) -> Self {
        self.initial_scan = initial_scan;
        self
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Start the timer loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let Ok(mut running) = self.running.lock() else {
            error!("scheduler state lock poisoned");
            return false;
        };
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("scheduler already running");
            return false;
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let now = Instant::now();
        let first_tick = if self.initial_scan {
            now
        } else {
            now.checked_add(self.period).unwrap_or(now)
        };
        let task = tokio::spawn(run_loop(
            self.scanner.clone(),
            first_tick,
            self.period,
            stop_rx,
        ));
        *running = Some(Running { stop_tx, task });

        info!(period_secs = self.period.as_secs(), "scheduler started");
        true
    }

    /// Signal the loop to stop and wait for it. A scan already in progress finishes first.
    pub async fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                error!("scheduler state lock poisoned");
                return;
            }
        };
        let Some(Running { stop_tx, task }) = running else {
            return;
        };

        let _ = stop_tx.try_send(());
        if let Err(e) = task.await {
            error!(error = %e, "scheduler loop ended abnormally");
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|r| r.as_ref().is_some_and(|r| !r.task.is_finished()))
            .unwrap_or(false)
    }
}

async fn run_loop(
    scanner: Scanner,
    first_tick: Instant,
    period: Duration,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // The stop signal is only checked between ticks.
                let today = Local::now().date_naive();
                let report = scanner.run_once(today).await;
                info!(
                    organizations = report.organizations,
                    tasks_created = report.tasks_created,
                    tasks_overdue = report.tasks_overdue,
                    events_emitted = report.events_emitted,
                    errors = report.errors,
                    "maintenance scan complete"
                );
            }
            _ = stop_rx.recv() => break,
        }
    }
}
