// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RPC jobs: submission, completion polling and task collection.
//!
//! A job moves through `Created -> Submitted -> Completed | TimedOut`. The
//! Created state is [`JobRequest`]; submitting consumes it, so a request is
//! dispatched at most once and every [`Job`] carries a server-assigned id.
//! A local timeout never cancels the remote job, and a later poll of a
//! timed-out job may still observe completion.

use std::sync::Arc;
use std::time::Duration;

use mercury_http::{ErrorEnvelope, HttpError, HttpTransport};
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SdkError};
use crate::types::{
    Instruction, StatusRecord, SubmitReceipt, TargetDescriptor, Task, decode_tasks,
};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Local lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Dispatched, completion not yet observed.
    Submitted,
    /// The service reported a completion timestamp.
    Completed,
    /// A join gave up waiting. The remote job keeps running.
    TimedOut,
}

/// A job that has not been submitted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    target: TargetDescriptor,
    instruction: Instruction,
}

impl JobRequest {
    /// Create a request calling `method` on `target` with no arguments.
    pub fn new(target: TargetDescriptor, method: impl Into<String>) -> Self {
        Self {
            target,
            instruction: Instruction {
                method: method.into(),
                args: Vec::new(),
                kwargs: Map::new(),
            },
        }
    }

    /// Replace the positional arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.instruction.args = args;
        self
    }

    /// Append one positional argument.
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.instruction.args.push(arg.into());
        self
    }

    /// Replace the keyword arguments.
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.instruction.kwargs = kwargs;
        self
    }

    /// Set one keyword argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.instruction.kwargs.insert(key.into(), value.into());
        self
    }

    /// The target descriptor.
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// The instruction.
    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    /// Check the request before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.instruction.method.trim().is_empty() {
            return Err(SdkError::Validation("method must not be empty".to_string()));
        }
        if let TargetDescriptor::Device(id) = &self.target {
            if id.is_empty() {
                return Err(SdkError::Validation("target device id is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Submit the request, consuming it.
    pub async fn submit(self, engine: &JobEngine) -> Result<Job> {
        engine.dispatch(self).await
    }
}

/// A submitted job.
#[derive(Debug, Clone)]
pub struct Job {
    job_id: String,
    target: TargetDescriptor,
    instruction: Instruction,
    targets: Value,
    state: JobState,
    last_status: Option<StatusRecord>,
}

impl Job {
    /// Server-assigned identifier.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The descriptor the job was submitted against.
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// The instruction the job performs.
    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    /// Targets as resolved by the service at submission.
    pub fn targets(&self) -> &Value {
        &self.targets
    }

    /// Local lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// The most recent status observed, if any poll happened.
    pub fn last_status(&self) -> Option<&StatusRecord> {
        self.last_status.as_ref()
    }

    /// The submission response.
    pub fn receipt(&self) -> SubmitReceipt {
        SubmitReceipt {
            job_id: self.job_id.clone(),
            targets: self.targets.clone(),
        }
    }

    fn observe(&mut self, status: &StatusRecord) {
        if status.is_complete() {
            self.state = JobState::Completed;
        }
        self.last_status = Some(status.clone());
    }
}

/// Options for [`JobEngine::join`].
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Interval between status polls. `None` uses the engine's interval.
    pub poll_interval: Option<Duration>,
    /// Stops the wait early when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: None,
            cancel: None,
        }
    }
}

impl JoinOptions {
    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// How a join ended. Every variant carries the last status polled.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The service reported completion.
    Completed(StatusRecord),
    /// The timeout elapsed first.
    TimedOut(StatusRecord),
    /// The cancellation token fired first.
    Cancelled(StatusRecord),
}

impl JoinOutcome {
    /// The last status polled.
    pub fn status(&self) -> &StatusRecord {
        match self {
            JoinOutcome::Completed(status)
            | JoinOutcome::TimedOut(status)
            | JoinOutcome::Cancelled(status) => status,
        }
    }

    /// Consume the outcome, keeping the status.
    pub fn into_status(self) -> StatusRecord {
        match self {
            JoinOutcome::Completed(status)
            | JoinOutcome::TimedOut(status)
            | JoinOutcome::Cancelled(status) => status,
        }
    }

    /// Whether the job completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, JoinOutcome::Completed(_))
    }
}

/// Client for the RPC job service.
#[derive(Clone)]
pub struct JobEngine {
    transport: Arc<dyn HttpTransport>,
    service_uri: String,
    poll_interval: Duration,
}

impl JobEngine {
    /// Create an engine for the job service mounted at `service_uri`.
    pub fn new(transport: Arc<dyn HttpTransport>, service_uri: impl Into<String>) -> Self {
        Self {
            transport,
            service_uri: service_uri.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the poll interval used when [`JoinOptions`] leaves it unset.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The service prefix this engine talks to.
    pub fn service_uri(&self) -> &str {
        &self.service_uri
    }

    /// The default poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submit `method` against `target`.
    ///
    /// Issues exactly one request. Not idempotent: retrying after a transport
    /// failure of unknown outcome may create a second remote job.
    pub async fn submit(
        &self,
        target: TargetDescriptor,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Job> {
        JobRequest::new(target, method)
            .with_args(args)
            .with_kwargs(kwargs)
            .submit(self)
            .await
    }

    #[instrument(skip(self, request), fields(method = %request.instruction.method))]
    async fn dispatch(&self, request: JobRequest) -> Result<Job> {
        request.validate()?;

        let body = json!({
            "query": request.target,
            "instruction": request.instruction,
        });
        let response = self.transport.post(&self.service_uri, &body, &[]).await?;

        // The job service reports some rejections inside a 2xx body.
        if let Some(envelope) = ErrorEnvelope::from_value(&response) {
            return Err(HttpError::Status(envelope).into());
        }

        let receipt: SubmitReceipt = serde_json::from_value(response)
            .map_err(|e| SdkError::UnexpectedResponse(format!("invalid submit response: {}", e)))?;
        if receipt.job_id.is_empty() {
            return Err(SdkError::UnexpectedResponse(
                "submit response carries an empty job_id".to_string(),
            ));
        }

        info!(
            job_id = %receipt.job_id,
            target = %request.target,
            "Job submitted"
        );

        Ok(Job {
            job_id: receipt.job_id,
            target: request.target,
            instruction: request.instruction,
            targets: receipt.targets,
            state: JobState::Submitted,
            last_status: None,
        })
    }

    /// Poll the job status once and record it on the job.
    pub async fn status(&self, job: &mut Job) -> Result<StatusRecord> {
        let status = self.status_of(&job.job_id).await?;
        job.observe(&status);
        Ok(status)
    }

    /// Poll the status of a job by id.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn status_of(&self, job_id: &str) -> Result<StatusRecord> {
        let endpoint = self.job_endpoint(job_id, "status")?;
        let response = self.transport.get(&endpoint, &[]).await?;
        let status: StatusRecord = serde_json::from_value(response)
            .map_err(|e| SdkError::UnexpectedResponse(format!("invalid status record: {}", e)))?;
        debug!(complete = status.is_complete(), "Polled job status");
        Ok(status)
    }

    /// Poll once and report whether the job has completed.
    pub async fn is_complete(&self, job: &mut Job) -> Result<bool> {
        Ok(self.status(job).await?.is_complete())
    }

    /// Poll until the job completes, the timeout elapses, or the token is
    /// cancelled.
    ///
    /// Always polls before sleeping, and sleeps are clamped to the remaining
    /// timeout, so a timed-out join returns within `timeout + poll_interval`.
    pub async fn join(&self, job: &mut Job, options: JoinOptions) -> Result<JoinOutcome> {
        let job_id = job.job_id.clone();
        let outcome = self
            .poll_until_complete(&job_id, &options, |status| job.observe(status))
            .await?;
        if matches!(outcome, JoinOutcome::TimedOut(_)) {
            job.state = JobState::TimedOut;
        }
        Ok(outcome)
    }

    /// Wait for a job known only by id, such as one submitted by another
    /// process. Same polling rules as [`JobEngine::join`].
    pub async fn wait_for(&self, job_id: &str, options: JoinOptions) -> Result<JoinOutcome> {
        self.poll_until_complete(job_id, &options, |_| {}).await
    }

    #[instrument(skip(self, options, observe), fields(job_id = %job_id))]
    async fn poll_until_complete(
        &self,
        job_id: &str,
        options: &JoinOptions,
        mut observe: impl FnMut(&StatusRecord),
    ) -> Result<JoinOutcome> {
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        let interval = options.poll_interval.unwrap_or(self.poll_interval);
        let mut polls: u32 = 0;

        loop {
            let status = self.status_of(job_id).await?;
            observe(&status);
            polls += 1;

            if status.is_complete() {
                info!(polls, "Job completed");
                return Ok(JoinOutcome::Completed(status));
            }

            let mut wait = interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    warn!(polls, "Timed out waiting for job; it keeps running remotely");
                    return Ok(JoinOutcome::TimedOut(status));
                }
                wait = wait.min(deadline - now);
            }

            match &options.cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            info!(polls, "Join cancelled");
                            return Ok(JoinOutcome::Cancelled(status));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Fetch per-device results. Partial results are allowed before
    /// completion.
    pub async fn tasks(&self, job: &Job) -> Result<Vec<Task>> {
        self.tasks_of(&job.job_id).await
    }

    /// Fetch per-device results of a job by id.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn tasks_of(&self, job_id: &str) -> Result<Vec<Task>> {
        let endpoint = self.job_endpoint(job_id, "tasks")?;
        let response = self.transport.get(&endpoint, &[]).await?;
        let tasks = decode_tasks(response)?;
        debug!(tasks = tasks.len(), "Fetched tasks");
        Ok(tasks)
    }

    /// Fetch the full job record.
    pub async fn raw(&self, job: &Job) -> Result<Value> {
        let endpoint = self.job_endpoint(&job.job_id, "")?;
        Ok(self.transport.get(&endpoint, &[]).await?)
    }

    fn job_endpoint(&self, job_id: &str, suffix: &str) -> Result<String> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(SdkError::Validation("job_id is empty".to_string()));
        }
        if suffix.is_empty() {
            Ok(format!("{}/{}", self.service_uri, job_id))
        } else {
            Ok(format!("{}/{}/{}", self.service_uri, job_id, suffix))
        }
    }
}
