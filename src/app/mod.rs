//! Application composition root
//!
//! Owns one [`ModuleContainer`] and one [`JobScheduler`], fans
//! configuration out to the registered modules, drives startup and runs
//! the scheduler loop. Modules call back into the activation context to
//! declare dependencies ([`ModuleCx::require`]) and to register jobs
//! ([`ModuleCx::add_job`], which namespaces job names with the registering
//! module's name).
//!
//! The startup ordering is load-bearing: configuration is applied to every
//! descriptor before any module activates, and all explicitly-enabled
//! modules finish activating — including any jobs they register — before
//! the run loop starts, so the first scheduler tick never races a
//! half-initialized module.

use serde_json::Value;

use crate::container::{ModuleContainer, ModuleCx, ModuleFactory, ModuleRef};
use crate::error::Result;
use crate::scheduler::{Job, JobScheduler};

impl ModuleCx<'_, JobScheduler> {
    /// Register a job under this module's namespace
    ///
    /// The job name becomes `"{module}.{name}"` so two modules can both
    /// register, say, a `poll` job without colliding.
    pub fn add_job(&mut self, mut job: Job) -> Result<()> {
        job.name = format!("{}.{}", self.module_name(), job.name);
        self.services.add(job)
    }
}

/// The long-lived application: module registry plus job scheduler
pub struct App {
    modules: ModuleContainer<JobScheduler>,
    scheduler: JobScheduler,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create an empty application
    pub fn new() -> Self {
        Self {
            modules: ModuleContainer::new(),
            scheduler: JobScheduler::new(),
        }
    }

    /// Register a module factory under a unique name
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory<JobScheduler>) -> Result<()> {
        self.modules.register(name, factory)
    }

    /// Distribute per-module config subtrees (must precede any activation)
    pub fn apply_config(&mut self, config: &Value) -> Result<()> {
        self.modules.apply_config(config)
    }

    /// Resolve a module by name, activating it on first use
    pub fn require(&mut self, name: &str) -> Result<ModuleRef> {
        self.modules.require(&mut self.scheduler, name)
    }

    /// Activate every module whose enable flag is explicitly true
    pub fn start_enabled(&mut self) -> Result<()> {
        self.modules.start_enabled(&mut self.scheduler)
    }

    /// Run the scheduler loop until the queue drains or a job fails
    /// non-recoverably
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(jobs = self.scheduler.len(), "entering run loop");
        self.scheduler.run_loop().await
    }

    /// Per-module log verbosity values from the reserved `_log_level` keys
    ///
    /// Forwarded by the binary to the tracing env-filter before the
    /// subscriber initializes.
    pub fn log_directives(&self) -> Vec<(String, String)> {
        self.modules.log_directives()
    }

    /// Number of registered jobs (startup diagnostics and tests)
    pub fn job_count(&self) -> usize {
        self.scheduler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Trigger;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_module_jobs_are_namespaced() {
        // two modules each register a job called "poll": no collision,
        // because job names are prefixed with the module name
        let mut app = App::new();
        for name in ["alpha", "beta"] {
            app.register(
                name,
                Box::new(|cx| {
                    cx.add_job(Job::new(
                        "poll",
                        Trigger::Interval(Duration::from_secs(30)),
                        || async { Ok(()) },
                    ))?;
                    Ok(Arc::new(()) as ModuleRef)
                }),
            )
            .unwrap();
        }
        app.apply_config(&json!({
            "alpha": { "_enabled": true },
            "beta": { "_enabled": true },
        }))
        .unwrap();
        app.start_enabled().unwrap();

        assert_eq!(app.job_count(), 2);
    }

    #[test]
    fn test_enabled_modules_activate_with_dependencies() {
        let mut app = App::new();
        app.register(
            "client",
            Box::new(|_cx| Ok(Arc::new(41_u32) as ModuleRef)),
        )
        .unwrap();
        app.register(
            "worker",
            Box::new(|cx| {
                let client = cx.require("client")?;
                let value = *client.downcast::<u32>().unwrap();
                Ok(Arc::new(value + 1) as ModuleRef)
            }),
        )
        .unwrap();
        // only the worker is flagged; the client is pulled in transitively
        app.apply_config(&json!({ "worker": { "_enabled": true } }))
            .unwrap();
        app.start_enabled().unwrap();

        let worker = app.require("worker").unwrap();
        assert_eq!(*worker.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_log_directives_surface_reserved_key() {
        let mut app = App::new();
        app.register("worker", Box::new(|_cx| Ok(Arc::new(()) as ModuleRef)))
            .unwrap();
        app.apply_config(&json!({ "worker": { "_log_level": "trace" } }))
            .unwrap();
        assert_eq!(
            app.log_directives(),
            vec![("worker".to_string(), "trace".to_string())]
        );
    }
}
