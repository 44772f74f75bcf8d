//! Resource-usage sampling attached to activities when they are stopped.

use std::sync::Mutex;

use sysinfo::{Pid, System};

use crate::Timestamp;
use crate::snapshot::{Property, PropertyValue, Snapshot};

/// Category of snapshots produced by usage samplers.
pub const USAGE_CATEGORY: &str = "Usage";

/// Produces a snapshot of resource usage at a point in time.
pub trait UsageSampler: Send + Sync {
    fn sample(&self, at: Timestamp) -> Option<Snapshot>;
}

/// Sampler that never produces a snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUsage;

impl UsageSampler for NoUsage {
    fn sample(&self, _at: Timestamp) -> Option<Snapshot> {
        None
    }
}

/// Samples memory, CPU and run time of the current process.
pub struct ProcessUsage {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessUsage {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::debug!(target: "logtrack::usage", "cannot resolve current pid: {e}");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageSampler for ProcessUsage {
    fn sample(&self, at: Timestamp) -> Option<Snapshot> {
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();

        let mut snapshot = Snapshot::new(USAGE_CATEGORY, "process", at);
        snapshot.add(
            Property::new("system.total_memory", PropertyValue::Long(saturate(system.total_memory())))
                .with_value_type("bytes"),
        );
        snapshot.add(
            Property::new("system.used_memory", PropertyValue::Long(saturate(system.used_memory())))
                .with_value_type("bytes"),
        );

        if let Some(pid) = self.pid
            && system.refresh_process(pid)
            && let Some(process) = system.process(pid)
        {
            snapshot.add(Property::new("process.pid", PropertyValue::Long(pid.as_u32() as i64)));
            snapshot.add(
                Property::new("process.memory", PropertyValue::Long(saturate(process.memory())))
                    .with_value_type("bytes"),
            );
            snapshot.add(
                Property::new(
                    "process.virtual_memory",
                    PropertyValue::Long(saturate(process.virtual_memory())),
                )
                .with_value_type("bytes"),
            );
            snapshot.add(
                Property::new("process.cpu_usage", PropertyValue::Float(process.cpu_usage()))
                    .with_value_type("percent"),
            );
            snapshot.add(
                Property::new("process.run_time", PropertyValue::Long(saturate(process.run_time())))
                    .with_value_type("seconds"),
            );
        }

        Some(snapshot)
    }
}

fn saturate(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}
