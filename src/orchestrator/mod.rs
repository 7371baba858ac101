//! # UpdateOrchestrator: concurrent environment updates and the verdict.
//!
//! One [`EnvironmentWatcher`] per target environment, bounded by a semaphore,
//! collected through a `JoinSet`; the per-environment outcomes are folded into
//! one [`RunSummary`].
//!
//! ## Architecture
//! ```text
//! UpdateTarget{app, label, envs, fail_fast}
//!        │
//!        ▼
//! run(target, token) ── publish RunStarted
//!        │
//!        ├─ envs empty ─► NoEnvironments ─► success = !fail_fast
//!        │
//!        ├─ for env in envs:  (run_token = token.child_token())
//!        │     set.spawn( acquire permit (cancellable)
//!        │                └─► spawn watcher.run(child) ─► Outcome
//!        │                     (panic ─► WatcherPanicked ─► AttemptsExhausted) )
//!        │
//!        ├─ select loop:
//!        │     join_next()        ─► record outcome
//!        │     deadline elapsed   ─► DeadlineReached, run_token.cancel()
//!        │     token cancelled    ─► DeadlineReached
//!        │     grace elapsed      ─► GraceExceeded, abort_all()
//!        │
//!        └─ missing outcomes ─► AttemptsExhausted
//!           all_succeeded = AND(Succeeded) ; success = all_succeeded || !fail_fast
//! ```
//!
//! A failing environment never stops the others: fail-fast only decides the
//! verdict.

mod config;
mod shutdown;

pub use config::OrchestratorConfig;
pub use shutdown::{cancel_on_signal, wait_for_shutdown_signal};

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::Instrument;

use crate::error::PlatformError;
use crate::events::{Bus, Event, EventKind};
use crate::observability::watcher_span;
use crate::platform::{Environment, PlatformClient};
use crate::resolver::{EnvironmentLookup, ResolveContext, resolve_all};
use crate::subscribers::panic_message;
use crate::substitution::Substitute;
use crate::watcher::{EnvironmentWatcher, Outcome};

/// Immutable description of one update run.
#[derive(Clone, Debug)]
pub struct UpdateTarget {
    pub application: String,
    pub version_label: String,
    /// Ordered, unique by id.
    pub environments: Vec<Environment>,
    /// When set, any non-successful environment fails the run.
    pub fail_fast: bool,
}

impl UpdateTarget {
    /// Builds a target; duplicate environment ids keep their first position.
    pub fn new(
        application: impl Into<String>,
        version_label: impl Into<String>,
        environments: Vec<Environment>,
        fail_fast: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        let environments = environments
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .collect();
        Self {
            application: application.into(),
            version_label: version_label.into(),
            environments,
            fail_fast,
        }
    }
}

/// Outcome of one environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub id: String,
    pub name: String,
    pub outcome: Outcome,
}

/// Result of [`UpdateOrchestrator::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Every environment succeeded (false when there were none).
    pub all_succeeded: bool,
    /// The verdict: `all_succeeded || !fail_fast`, or `!fail_fast` without environments.
    pub success: bool,
    /// Per-environment outcomes in target order.
    pub reports: Vec<EnvironmentReport>,
}

impl RunSummary {
    fn new(reports: Vec<EnvironmentReport>, fail_fast: bool) -> Self {
        let all_succeeded =
            !reports.is_empty() && reports.iter().all(|r| r.outcome.is_success());
        Self {
            all_succeeded,
            success: all_succeeded || !fail_fast,
            reports,
        }
    }

    /// Outcomes in target order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.reports.iter().map(|r| r.outcome).collect()
    }
}

/// Runs watchers for every environment of an [`UpdateTarget`].
pub struct UpdateOrchestrator {
    cfg: OrchestratorConfig,
    client: Arc<dyn PlatformClient>,
    bus: Bus,
}

impl UpdateOrchestrator {
    pub fn new(cfg: OrchestratorConfig, client: Arc<dyn PlatformClient>, bus: Bus) -> Self {
        Self { cfg, client, bus }
    }

    /// Resolves `lookups` for `application`, then runs the update.
    ///
    /// Only resolution can fail; watcher failures are reported in the summary.
    pub async fn resolve_and_run(
        &self,
        application: &str,
        lookups: &[EnvironmentLookup],
        vars: &dyn Substitute,
        version_label: &str,
        fail_fast: bool,
        token: &CancellationToken,
    ) -> Result<RunSummary, PlatformError> {
        let ctx = ResolveContext {
            client: self.client.as_ref(),
            vars,
        };
        let environments = resolve_all(lookups, application, &ctx).await?;
        let target = UpdateTarget::new(application, version_label, environments, fail_fast);
        Ok(self.run(&target, token).await)
    }

    /// Updates every environment of `target` and waits for all outcomes.
    pub async fn run(&self, target: &UpdateTarget, token: &CancellationToken) -> RunSummary {
        let label = format!("{}@{}", target.application, target.version_label);
        self.bus
            .publish(
                Event::new(EventKind::RunStarted)
                    .with_reason(label.as_str())
                    .with_count(target.environments.len()),
            )
            .await;

        if target.environments.is_empty() {
            self.bus
                .publish(Event::new(EventKind::NoEnvironments).with_reason(label))
                .await;
            return self.finish(RunSummary::new(Vec::new(), target.fail_fast)).await;
        }

        let run_token = token.child_token();
        let mut set = JoinSet::new();
        self.spawn_watchers(&mut set, target, &run_token);
        let outcomes = self.collect(&mut set, target.environments.len(), token, &run_token).await;

        let reports = target
            .environments
            .iter()
            .zip(outcomes)
            .map(|(env, outcome)| EnvironmentReport {
                id: env.id.clone(),
                name: env.name.clone(),
                outcome: outcome.unwrap_or(Outcome::AttemptsExhausted),
            })
            .collect();
        self.finish(RunSummary::new(reports, target.fail_fast)).await
    }

    async fn finish(&self, summary: RunSummary) -> RunSummary {
        let verdict = if summary.success { "success" } else { "failure" };
        self.bus
            .publish(Event::new(EventKind::RunFinished).with_reason(verdict))
            .await;
        summary
    }

    fn spawn_watchers(
        &self,
        set: &mut JoinSet<(usize, Outcome)>,
        target: &UpdateTarget,
        run_token: &CancellationToken,
    ) {
        let semaphore = self
            .cfg
            .concurrency_limit()
            .map(Semaphore::new)
            .map(Arc::new);
        let params = self.cfg.watcher_params();

        for (idx, env) in target.environments.iter().enumerate() {
            let span = watcher_span(&target.application, &env.name, &target.version_label);
            let name = env.name.clone();
            let watcher = EnvironmentWatcher::new(
                Arc::clone(&self.client),
                self.bus.clone(),
                target.application.as_str(),
                target.version_label.as_str(),
                env.clone(),
                params,
            );
            let child = run_token.child_token();
            let semaphore = semaphore.clone();
            let bus = self.bus.clone();

            set.spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => tokio::select! {
                        permit = sem.acquire_owned() => match permit {
                            Ok(p) => Some(p),
                            Err(_closed) => return (idx, Outcome::AttemptsExhausted),
                        },
                        _ = child.cancelled() => return (idx, Outcome::AttemptsExhausted),
                    },
                    None => None,
                };

                let inner = AbortOnDropHandle::new(tokio::spawn(watcher.run(child).instrument(span)));
                match inner.await {
                    Ok(outcome) => (idx, outcome),
                    Err(err) => {
                        let info = if err.is_panic() {
                            panic_message(err.into_panic().as_ref())
                        } else {
                            "watcher task cancelled".to_string()
                        };
                        bus.publish(
                            Event::new(EventKind::WatcherPanicked)
                                .with_environment(name)
                                .with_reason(info),
                        )
                        .await;
                        (idx, Outcome::AttemptsExhausted)
                    }
                }
            });
        }
    }

    async fn collect(
        &self,
        set: &mut JoinSet<(usize, Outcome)>,
        count: usize,
        token: &CancellationToken,
        run_token: &CancellationToken,
    ) -> Vec<Option<Outcome>> {
        let mut outcomes = vec![None; count];
        let deadline = self.cfg.deadline_limit().map(|d| Instant::now() + d);
        let mut grace_until: Option<Instant> = None;

        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(Ok((idx, outcome))) => outcomes[idx] = Some(outcome),
                    Some(Err(err)) => tracing::warn!(error = %err, "watcher slot failed"),
                    None => break,
                },
                _ = sleep_until(deadline), if grace_until.is_none() => {
                    self.bus
                        .publish(Event::new(EventKind::DeadlineReached).with_reason("deadline elapsed"))
                        .await;
                    run_token.cancel();
                    grace_until = Some(Instant::now() + self.cfg.grace);
                }
                _ = token.cancelled(), if grace_until.is_none() => {
                    self.bus
                        .publish(Event::new(EventKind::DeadlineReached).with_reason("cancelled"))
                        .await;
                    grace_until = Some(Instant::now() + self.cfg.grace);
                }
                _ = sleep_until(grace_until) => {
                    self.bus
                        .publish(Event::new(EventKind::GraceExceeded).with_count(set.len()))
                        .await;
                    set.abort_all();
                    while let Some(joined) = set.join_next().await {
                        if let Ok((idx, outcome)) = joined {
                            outcomes[idx] = Some(outcome);
                        }
                    }
                    break;
                }
            }
        }
        outcomes
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::platform::{EnvironmentFilter, InMemoryPlatform, PlatformEvent};
    use crate::resolver::ByName;
    use crate::substitution::BuildVariables;

    fn orchestrator(p: &Arc<InMemoryPlatform>, cfg: OrchestratorConfig) -> UpdateOrchestrator {
        UpdateOrchestrator::new(cfg, p.clone(), Bus::channel(4096).0)
    }

    fn three_envs(p: &InMemoryPlatform) -> Vec<String> {
        ["shop-a", "shop-b", "shop-c"]
            .iter()
            .map(|n| p.add_environment("shop", n, &format!("{n}.example.com")))
            .collect()
    }

    fn target(p: &InMemoryPlatform, ids: &[String], fail_fast: bool) -> UpdateTarget {
        let envs = ids.iter().map(|id| p.environment(id).unwrap()).collect();
        UpdateTarget::new("shop", "v7", envs, fail_fast)
    }

    #[tokio::test(start_paused = true)]
    async fn one_watcher_per_environment() {
        let p = Arc::new(InMemoryPlatform::new());
        let ids = three_envs(&p);

        let summary = orchestrator(&p, OrchestratorConfig::default())
            .run(&target(&p, &ids, true), &CancellationToken::new())
            .await;

        assert!(summary.success && summary.all_succeeded);
        for id in &ids {
            assert_eq!(p.call_count("update_environment_version", id), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_environment_fails_fast_run_but_not_others() {
        let p = Arc::new(InMemoryPlatform::new());
        let ids = three_envs(&p);
        p.set_settle_after(&ids[0], 2);
        p.set_stuck(&ids[2]);

        let cfg = OrchestratorConfig {
            max_polls: 5,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator(&p, cfg);

        let summary = orch
            .run(&target(&p, &ids, true), &CancellationToken::new())
            .await;
        assert_eq!(
            summary.outcomes(),
            [Outcome::Succeeded, Outcome::Succeeded, Outcome::AttemptsExhausted]
        );
        assert!(!summary.success);

        let p = Arc::new(InMemoryPlatform::new());
        let ids = three_envs(&p);
        p.set_stuck(&ids[2]);
        let summary = orchestrator(&p, OrchestratorConfig { max_polls: 5, ..Default::default() })
            .run(&target(&p, &ids, false), &CancellationToken::new())
            .await;
        assert!(summary.success);
        assert!(!summary.all_succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_follows_fail_fast() {
        let p = Arc::new(InMemoryPlatform::new());
        let orch = orchestrator(&p, OrchestratorConfig::default());
        let token = CancellationToken::new();

        let strict = orch
            .run(&UpdateTarget::new("shop", "v7", Vec::new(), true), &token)
            .await;
        assert!(!strict.success);

        let lenient = orch
            .run(&UpdateTarget::new("shop", "v7", Vec::new(), false), &token)
            .await;
        assert!(lenient.success);
        assert!(p.calls().is_empty());
    }

    #[test]
    fn target_drops_duplicate_ids() {
        let p = InMemoryPlatform::new();
        let id = p.add_environment("shop", "shop-a", "a.example.com");
        let env = p.environment(&id).unwrap();
        let t = UpdateTarget::new("shop", "v7", vec![env.clone(), env], true);
        assert_eq!(t.environments.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_reports_attempts_exhausted() {
        let p = Arc::new(InMemoryPlatform::new());
        let ids = three_envs(&p);
        for id in &ids {
            p.set_stuck(id);
        }
        let orch = Arc::new(orchestrator(&p, OrchestratorConfig::default()));
        let token = CancellationToken::new();

        let t = target(&p, &ids, false);
        let handle = {
            let orch = Arc::clone(&orch);
            let token = token.clone();
            tokio::spawn(async move { orch.run(&t, &token).await })
        };
        time::sleep(Duration::from_secs(75)).await;
        token.cancel();

        let summary = handle.await.unwrap();
        assert!(summary.outcomes().iter().all(|o| *o == Outcome::AttemptsExhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_watchers() {
        let p = Arc::new(InMemoryPlatform::new());
        let ids = three_envs(&p);
        p.set_stuck(&ids[1]);
        let cfg = OrchestratorConfig {
            max_polls: 0,
            deadline: Duration::from_secs(600),
            ..OrchestratorConfig::default()
        };

        let started = Instant::now();
        let summary = orchestrator(&p, cfg)
            .run(&target(&p, &ids, true), &CancellationToken::new())
            .await;
        assert_eq!(
            summary.outcomes(),
            [Outcome::Succeeded, Outcome::AttemptsExhausted, Outcome::Succeeded]
        );
        assert!(started.elapsed() < Duration::from_secs(700));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_client_is_contained() {
        let p = Arc::new(InMemoryPlatform::new());
        let ids = three_envs(&p);
        p.panic_on_update(&ids[1]);

        let (bus, mut rx) = Bus::channel(4096);
        let summary = UpdateOrchestrator::new(OrchestratorConfig::default(), p.clone(), bus)
            .run(&target(&p, &ids, false), &CancellationToken::new())
            .await;

        assert_eq!(
            summary.outcomes(),
            [Outcome::Succeeded, Outcome::AttemptsExhausted, Outcome::Succeeded]
        );
        let mut panicked = false;
        let mut started = None;
        while let Ok(ev) = rx.try_recv() {
            panicked |= ev.kind == EventKind::WatcherPanicked
                && ev.environment.as_deref() == Some("shop-b");
            if ev.kind == EventKind::RunStarted {
                started = Some((ev.count, ev.attempt));
            }
        }
        assert!(panicked);
        assert_eq!(started, Some((Some(3), None)));
    }

    /// Delegates to [`InMemoryPlatform`] and tracks in-flight update watchers.
    struct Gauge {
        inner: InMemoryPlatform,
        active: AtomicUsize,
        peak: AtomicUsize,
        finished: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl PlatformClient for Gauge {
        async fn describe_environments(
            &self,
            application: &str,
            filter: &EnvironmentFilter,
        ) -> Result<Vec<Environment>, PlatformError> {
            let envs = self.inner.describe_environments(application, filter).await?;
            for env in envs.iter().filter(|e| e.status.is_ready() && e.version_label == "v7") {
                if self.finished.lock().unwrap().insert(env.id.clone()) {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                }
            }
            Ok(envs)
        }

        async fn describe_events(
            &self,
            environment_id: &str,
            since: Option<DateTime<Utc>>,
            max_records: Option<usize>,
        ) -> Result<Vec<PlatformEvent>, PlatformError> {
            self.inner
                .describe_events(environment_id, since, max_records)
                .await
        }

        async fn update_environment_version(
            &self,
            environment_id: &str,
            version_label: &str,
        ) -> Result<(), PlatformError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.inner
                .update_environment_version(environment_id, version_label)
                .await
        }

        async fn create_application_version(
            &self,
            application: &str,
            version_label: &str,
            bucket: &str,
            key: &str,
        ) -> Result<(), PlatformError> {
            self.inner
                .create_application_version(application, version_label, bucket, key)
                .await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_bound_is_respected() {
        let inner = InMemoryPlatform::new();
        let mut ids = Vec::new();
        for n in 0..8 {
            let id = inner.add_environment("shop", &format!("shop-{n:02}"), "x");
            inner.set_settle_after(&id, 3);
            ids.push(id);
        }
        let envs = ids.iter().map(|id| inner.environment(id).unwrap()).collect();
        let gauge = Arc::new(Gauge {
            inner,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            finished: Mutex::new(HashSet::new()),
        });

        let cfg = OrchestratorConfig {
            max_concurrent: 3,
            ..OrchestratorConfig::default()
        };
        let summary = UpdateOrchestrator::new(cfg, gauge.clone(), Bus::channel(4096).0)
            .run(
                &UpdateTarget::new("shop", "v7", envs, true),
                &CancellationToken::new(),
            )
            .await;

        assert!(summary.success);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_and_run_uses_lookups() {
        let p = Arc::new(InMemoryPlatform::new());
        three_envs(&p);
        let vars = BuildVariables::new().with("SUFFIX", "b");

        let summary = orchestrator(&p, OrchestratorConfig::default())
            .resolve_and_run(
                "shop",
                &[EnvironmentLookup::ByName(ByName::new(["shop-${SUFFIX}"]))],
                &vars,
                "v7",
                true,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].name, "shop-b");
        assert!(summary.success);
    }
}
