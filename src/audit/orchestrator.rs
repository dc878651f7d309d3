//! Audit orchestrator
//!
//! Drives one run through `Created -> Running -> {terminal}`: validates the
//! invocation and the requested services, then executes registered checks one
//! section at a time. A section failure is recorded and the run moves on; only storage
//! failures abort the run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::{CredentialProvider, ServiceStatus, ServiceValidator, WorkspaceApi};
use crate::checks::{Check, CheckContext, CheckError, CheckOutput, CheckRegistry};
use crate::config::AuditConfig;
use crate::db::{FindingsStore, StoreError};
use crate::error::{AuditError, Result};
use crate::models::{InvocationParams, RunStatus, SectionStatus, Severity};
use crate::utils::validation::{validate_domain, validate_service_name};

use super::progress::{CancelFlag, ProgressChannel};

pub const DEFAULT_SECTION_TIMEOUT: Duration = Duration::from_secs(300);

/// How often a running section polls the caller for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Parameters of one audit invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub domain: String,
    /// Empty means the services configured through [`Orchestrator::with_config`]
    pub requested_services: Vec<String>,
    #[serde(default)]
    pub skipped_services: Vec<String>,
    #[serde(default)]
    pub intensive: bool,
}

/// What the caller gets back once a run reached a terminal status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run_id: i64,
    pub status: RunStatus,
    /// Human-readable explanation for anything other than a clean run
    pub reason: Option<String>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// How a single check execution ended
enum CheckOutcome {
    Finished(CheckOutput),
    Failed(String),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy)]
struct SectionTally {
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

impl SectionTally {
    fn record(&mut self, status: SectionStatus) {
        match status {
            SectionStatus::Succeeded => self.succeeded += 1,
            SectionStatus::Failed => self.failed += 1,
            _ => self.skipped += 1,
        }
    }

    fn overall_status(&self, cancelled: bool) -> RunStatus {
        if cancelled {
            RunStatus::Cancelled
        } else if self.failed == 0 {
            RunStatus::Completed
        } else if self.succeeded > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Failed
        }
    }
}

/// Services the run may use and the full set recorded as skipped
struct ServicePlan {
    enabled: BTreeSet<String>,
    skipped: Vec<String>,
    failures: Vec<String>,
}

pub struct Orchestrator {
    store: FindingsStore,
    registry: Arc<CheckRegistry>,
    validator: Arc<dyn ServiceValidator>,
    credentials: Arc<dyn CredentialProvider>,
    section_timeout: Duration,
    /// Requested when a [`RunRequest`] names no services
    default_services: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        store: FindingsStore,
        registry: Arc<CheckRegistry>,
        validator: Arc<dyn ServiceValidator>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            store,
            registry,
            validator,
            credentials,
            section_timeout: DEFAULT_SECTION_TIMEOUT,
            default_services: Vec::new(),
        }
    }

    /// Take the section timeout and default service set from `config`
    pub fn with_config(mut self, config: &AuditConfig) -> Self {
        self.section_timeout = config.section_timeout();
        self.default_services = config.api_services.clone();
        self
    }

    /// Bound on the wall time of a single check
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.section_timeout = timeout;
        self
    }

    pub fn store(&self) -> &FindingsStore {
        &self.store
    }

    pub fn into_store(self) -> FindingsStore {
        self.store
    }

    /// Execute one audit run to a terminal status
    ///
    /// Section failures and timeouts are recorded in the store and reflected
    /// in the returned status. Errors are returned only for invalid requests,
    /// zero usable services, and storage failures.
    ///
    /// The returned future is `Send`, so a whole run can be handed to
    /// `tokio::spawn` together with the orchestrator that owns it.
    pub async fn run(
        &mut self,
        mut request: RunRequest,
        progress: &dyn ProgressChannel,
    ) -> Result<RunOutcome> {
        if request.requested_services.is_empty() {
            request.requested_services = self.default_services.clone();
        }
        let domain = self.validate_request(&request)?;
        let plan = self.plan_services(&request);

        let params = InvocationParams {
            requested_services: request.requested_services.clone(),
            intensive: request.intensive,
            section_timeout_secs: Some(self.section_timeout.as_secs()),
        };

        if plan.enabled.is_empty() {
            let detail = if plan.failures.is_empty() {
                "no requested service is enabled for this run".to_string()
            } else {
                plan.failures.join("; ")
            };
            return Err(self.fail_validation(&domain, &params, &plan.skipped, detail));
        }

        let api = match self.credentials.authorized_client() {
            Ok(api) => api,
            Err(e) => {
                let detail = format!("credential provider failed: {}", e);
                return Err(self.fail_validation(&domain, &params, &plan.skipped, detail));
            }
        };

        let run_id = self.store.create_run(Some(&domain), Some(&params), &plan.skipped)?;
        tracing::info!(
            run_id,
            domain = %domain,
            enabled = ?plan.enabled,
            skipped = ?plan.skipped,
            "audit run started"
        );

        match self.execute_run(run_id, &domain, &request, plan.enabled, api, progress).await {
            Ok((tally, cancelled)) => {
                let status = tally.overall_status(cancelled);
                self.store.finalize_run(run_id, status)?;
                tracing::info!(
                    run_id,
                    %status,
                    succeeded = tally.succeeded,
                    failed = tally.failed,
                    skipped = tally.skipped,
                    "audit run finished"
                );
                Ok(RunOutcome {
                    run_id,
                    status,
                    reason: describe(status, &tally),
                    succeeded: tally.succeeded,
                    failed: tally.failed,
                    skipped: tally.skipped,
                })
            }
            Err(e) => {
                tracing::error!(run_id, error = %e, "audit run aborted by storage failure");
                if let Err(finalize_err) = self.store.finalize_run(run_id, RunStatus::Failed) {
                    tracing::error!(run_id, error = %finalize_err, "could not mark aborted run as failed");
                }
                Err(AuditError::Storage(e))
            }
        }
    }

    fn validate_request(&self, request: &RunRequest) -> Result<String> {
        let domain =
            validate_domain(&request.domain).map_err(|e| AuditError::Configuration(e.to_string()))?;

        if request.requested_services.is_empty() {
            return Err(AuditError::Configuration(
                "at least one service must be requested".to_string(),
            ));
        }
        for service in request.requested_services.iter().chain(&request.skipped_services) {
            validate_service_name(service).map_err(|e| AuditError::Configuration(e.to_string()))?;
        }
        Ok(domain)
    }

    fn plan_services(&self, request: &RunRequest) -> ServicePlan {
        let mut skipped: BTreeSet<String> = request.skipped_services.iter().cloned().collect();
        let candidates: Vec<String> = request
            .requested_services
            .iter()
            .filter(|s| !skipped.contains(*s))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut enabled = BTreeSet::new();
        let mut failures = Vec::new();
        if !candidates.is_empty() {
            let statuses = self.validator.validate_services(&candidates);
            for service in candidates {
                match statuses.get(&service) {
                    Some(status) if status.is_ok() => {
                        enabled.insert(service);
                    }
                    other => {
                        let detail = match other {
                            Some(ServiceStatus::Error(detail)) => detail.clone(),
                            _ => "no validation result".to_string(),
                        };
                        tracing::warn!(service = %service, %detail, "service failed validation");
                        failures.push(format!("{}: {}", service, detail));
                        skipped.insert(service);
                    }
                }
            }
        }

        ServicePlan {
            enabled,
            skipped: skipped.into_iter().collect(),
            failures,
        }
    }

    /// Persist a run that could not start and build the matching error
    fn fail_validation(
        &self,
        domain: &str,
        params: &InvocationParams,
        skipped: &[String],
        detail: String,
    ) -> AuditError {
        let recorded = self
            .store
            .create_run(Some(domain), Some(params), skipped)
            .and_then(|run_id| {
                self.store.finalize_run(run_id, RunStatus::Failed)?;
                Ok(run_id)
            });

        match recorded {
            Ok(run_id) => {
                tracing::error!(run_id, %detail, "no usable services, run failed");
                AuditError::Validation {
                    run_id: Some(run_id),
                    detail,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "could not record failed run");
                AuditError::Storage(e)
            }
        }
    }

    async fn execute_run(
        &mut self,
        run_id: i64,
        domain: &str,
        request: &RunRequest,
        enabled: BTreeSet<String>,
        api: Arc<dyn WorkspaceApi>,
        progress: &dyn ProgressChannel,
    ) -> std::result::Result<(SectionTally, bool), StoreError> {
        let checks: Vec<Arc<dyn Check>> = self.registry.iter().cloned().collect();
        let total = checks.len();
        let mut tally = SectionTally::default();
        let mut cancelled = false;

        for (i, check) in checks.into_iter().enumerate() {
            let index = i + 1;
            let name = check.name().to_string();

            if progress.is_cancelled() {
                tracing::info!(run_id, section = %name, "cancellation observed, stopping run");
                self.store.record_skipped_section(run_id, &name)?;
                tally.record(SectionStatus::Skipped);
                progress.report_progress(&name, index, total);
                cancelled = true;
                break;
            }

            let missing: Vec<&String> = check
                .required_services()
                .iter()
                .filter(|s| !enabled.contains(*s))
                .collect();
            if !missing.is_empty() {
                tracing::info!(run_id, section = %name, ?missing, "skipping section, services unavailable");
                self.store.record_skipped_section(run_id, &name)?;
                tally.record(SectionStatus::Skipped);
                progress.report_progress(&name, index, total);
                continue;
            }

            let ctx = CheckContext {
                run_id,
                domain: domain.to_string(),
                enabled_services: enabled.clone(),
                intensive: request.intensive,
                api: Arc::clone(&api),
                cancel: CancelFlag::new(),
            };
            let status = self.run_section(run_id, check, ctx, progress).await?;
            tally.record(status);
            progress.report_progress(&name, index, total);
        }

        Ok((tally, cancelled || progress.is_cancelled()))
    }

    async fn run_section(
        &mut self,
        run_id: i64,
        check: Arc<dyn Check>,
        ctx: CheckContext,
        progress: &dyn ProgressChannel,
    ) -> std::result::Result<SectionStatus, StoreError> {
        let name = check.name().to_string();
        let section_id = self.store.start_section(run_id, &name)?;
        tracing::debug!(run_id, section_id, section = %name, "section started");

        let started = Instant::now();
        let outcome = Self::execute_check(check, ctx, self.section_timeout, progress).await;
        let elapsed = started.elapsed().as_secs_f64();

        let status = match outcome {
            CheckOutcome::Finished(output) => match output
                .validate()
                .map_err(StoreError::InvalidArgument)
                .and_then(|()| self.persist_output(section_id, &output))
            {
                Ok(()) => SectionStatus::Succeeded,
                Err(e) if !e.is_storage_failure() => {
                    let message = format!("Check '{}' produced unusable output: {}", name, e);
                    self.record_failure(section_id, &message)?;
                    SectionStatus::Failed
                }
                Err(e) => return Err(e),
            },
            CheckOutcome::Failed(message) => {
                self.record_failure(section_id, &message)?;
                SectionStatus::Failed
            }
            CheckOutcome::TimedOut => {
                let message = format!(
                    "Check '{}' timed out after {}s",
                    name,
                    self.section_timeout.as_secs_f64()
                );
                tracing::warn!(run_id, section = %name, "section timed out");
                self.record_failure(section_id, &message)?;
                SectionStatus::Failed
            }
            CheckOutcome::Cancelled => SectionStatus::Skipped,
        };

        self.store.complete_section(section_id, status, elapsed)?;
        tracing::info!(run_id, section = %name, %status, elapsed_s = elapsed, "section finished");
        Ok(status)
    }

    /// Run the check on a blocking worker, bounded by the section timeout
    ///
    /// A timed-out worker cannot be interrupted; its cancel flag is raised and
    /// whatever it returns later is dropped.
    async fn execute_check(
        check: Arc<dyn Check>,
        ctx: CheckContext,
        timeout: Duration,
        progress: &dyn ProgressChannel,
    ) -> CheckOutcome {
        let name = check.name().to_string();
        let cancel = ctx.cancel.clone();
        let mut handle = tokio::task::spawn_blocking(move || check.run(&ctx));

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);

        loop {
            tokio::select! {
                joined = &mut handle => {
                    return match joined {
                        Ok(Ok(output)) => CheckOutcome::Finished(output),
                        Ok(Err(CheckError::Cancelled)) if progress.is_cancelled() => CheckOutcome::Cancelled,
                        Ok(Err(CheckError::Cancelled)) => {
                            tracing::warn!(section = %name, "check stopped without a cancellation request");
                            CheckOutcome::Failed(format!(
                                "Check '{}' stopped without a cancellation request",
                                name
                            ))
                        }
                        Ok(Err(e)) => {
                            if e.is_retryable() {
                                tracing::warn!(section = %name, error = %e, "check hit API quota");
                            } else {
                                tracing::warn!(section = %name, error = %e, "check failed");
                            }
                            CheckOutcome::Failed(format!("Check '{}' failed: {}", name, e))
                        }
                        Err(join_err) => {
                            tracing::error!(section = %name, error = %join_err, "check panicked");
                            CheckOutcome::Failed(format!("Check '{}' crashed: {}", name, join_err))
                        }
                    };
                }
                _ = &mut deadline => {
                    cancel.cancel();
                    return CheckOutcome::TimedOut;
                }
                _ = poll.tick() => {
                    if progress.is_cancelled() {
                        cancel.cancel();
                    }
                }
            }
        }
    }

    fn persist_output(&self, section_id: i64, output: &CheckOutput) -> std::result::Result<(), StoreError> {
        for (severity, message) in &output.findings {
            self.store.insert_finding(section_id, *severity, message)?;
        }
        for (key, value) in &output.stats {
            self.store.insert_stat(section_id, key, value)?;
        }
        for payload in &output.raw_objects {
            self.store.insert_raw(section_id, payload)?;
        }
        Ok(())
    }

    fn record_failure(&self, section_id: i64, message: &str) -> std::result::Result<(), StoreError> {
        self.store.insert_finding(section_id, Severity::High, message)?;
        Ok(())
    }
}

fn describe(status: RunStatus, tally: &SectionTally) -> Option<String> {
    match status {
        RunStatus::Completed => None,
        RunStatus::CompletedWithErrors => Some(format!(
            "{} of {} attempted sections failed",
            tally.failed,
            tally.failed + tally.succeeded
        )),
        RunStatus::Failed => Some("every attempted section failed".to_string()),
        RunStatus::Cancelled => Some("run cancelled by caller".to_string()),
        RunStatus::Running => None,
    }
}
