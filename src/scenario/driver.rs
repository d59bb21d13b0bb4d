//! Scenario Driver
//!
//! Runs each scenario in a fresh namespace and records the outcome as a
//! [`ScenarioReport`]. The namespace of a failed scenario is left in place
//! for inspection; a passed scenario's namespace is deleted.
//!
//! Independent scenarios run concurrently. Exclusive scenarios (those that
//! read node capacity or count volumes across the cluster) run one at a time
//! afterwards; nothing stops an outside actor from changing either meanwhile.

use super::context::Harness;
use super::manifest;
use super::Scenario;
use crate::cluster::Target;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

// =============================================================================
// Reports
// =============================================================================

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

/// Result of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    /// Namespace the scenario ran in; `None` if it never got one
    pub namespace: Option<String>,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Results of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.scenarios.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.scenarios.iter().filter(|r| r.failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.scenarios.len() - self.passed() - self.failed()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Namespace name made of `prefix` and a random lowercase suffix
pub fn namespace_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..10])
}

pub struct Driver {
    harness: Arc<Harness>,
    sequential: bool,
}

impl Driver {
    pub fn new(harness: Arc<Harness>) -> Self {
        Self {
            harness,
            sequential: false,
        }
    }

    /// Run every scenario one after another
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// Reason to skip `scenario` on this cluster, if any
    fn skip_reason(&self, scenario: &dyn Scenario) -> Result<Option<String>> {
        let Some(min_minor) = scenario.min_minor_version() else {
            return Ok(None);
        };
        let version = self.harness.config.kubernetes_version.ok_or_else(|| {
            Error::Configuration(format!(
                "{} needs TEST_KUBERNETES_VERSION to decide whether it can run",
                scenario.name()
            ))
        })?;
        if version.supports_minor(min_minor) {
            Ok(None)
        } else {
            Ok(Some(format!(
                "{} is not supported on Kubernetes version: {}. Min supported version is 1.{}",
                scenario.description(),
                version,
                min_minor
            )))
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let yaml = manifest::render(&manifest::namespace(name))?;
        self.harness.control_plane.apply(None, &yaml).await?;

        let observer = self.harness.observer();
        self.harness
            .eventually(format!("default service account in {}", name))
            .run(|| observer.default_service_account(name))
            .await
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.harness
            .control_plane
            .delete(None, "namespaces", &Target::Name(name.to_string()))
            .await
            .map(|_| ())
    }

    /// Run one scenario to completion
    pub async fn run_one(&self, scenario: &dyn Scenario) -> ScenarioReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut report = ScenarioReport {
            name: scenario.name().to_string(),
            namespace: None,
            outcome: Outcome::Passed,
            started_at,
            duration: Duration::ZERO,
        };

        match self.skip_reason(scenario) {
            Ok(None) => {}
            Ok(Some(reason)) => {
                info!(scenario = scenario.name(), "Skipped: {}", reason);
                report.outcome = Outcome::Skipped(reason);
                return report;
            }
            Err(e) => {
                error!(scenario = scenario.name(), "{}", e);
                report.outcome = Outcome::Failed(e.to_string());
                return report;
            }
        }

        let namespace = namespace_name(&scenario.namespace_prefix(&self.harness.config));
        report.namespace = Some(namespace.clone());
        info!(scenario = scenario.name(), namespace = %namespace, "Starting scenario");

        let result = match self.create_namespace(&namespace).await {
            Ok(()) => {
                let ctx = self.harness.context(scenario.name(), namespace.clone());
                scenario.run(&ctx).await
            }
            Err(e) => Err(e),
        };

        report.outcome = match result {
            Ok(()) => match self.delete_namespace(&namespace).await {
                Ok(()) => {
                    info!(scenario = scenario.name(), "Passed");
                    Outcome::Passed
                }
                Err(e) => {
                    warn!(scenario = scenario.name(), "Teardown of {} failed: {}", namespace, e);
                    Outcome::Failed(format!("teardown failed: {}", e))
                }
            },
            Err(e) => {
                error!(
                    scenario = scenario.name(),
                    namespace = %namespace,
                    "Failed, keeping namespace for inspection: {}",
                    e
                );
                Outcome::Failed(e.to_string())
            }
        };
        report.duration = start.elapsed();
        report
    }

    async fn run_indexed(&self, index: usize, scenario: &Arc<dyn Scenario>) -> (usize, ScenarioReport) {
        (index, self.run_one(&**scenario).await)
    }

    /// Run a batch of scenarios and collect their reports in input order
    pub async fn run_all(&self, scenarios: &[Arc<dyn Scenario>]) -> SuiteReport {
        let (exclusive, independent): (Vec<_>, Vec<_>) = scenarios
            .iter()
            .enumerate()
            .partition(|(_, s)| s.exclusive());

        let mut reports: Vec<(usize, ScenarioReport)> = Vec::with_capacity(scenarios.len());

        if self.sequential {
            for (i, scenario) in independent {
                reports.push(self.run_indexed(i, scenario).await);
            }
        } else {
            let batch = independent
                .into_iter()
                .map(|(i, scenario)| self.run_indexed(i, scenario));
            reports.extend(join_all(batch).await);
        }

        for (i, scenario) in exclusive {
            reports.push(self.run_indexed(i, scenario).await);
        }

        reports.sort_by_key(|(i, _)| *i);
        SuiteReport {
            scenarios: reports.into_iter().map(|(_, r)| r).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::config::{HarnessConfig, KubernetesVersion};
    use crate::eventually::ManualClock;
    use crate::scenario::context::ScenarioContext;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        fail: bool,
        min_minor: Option<u32>,
        sensitive: bool,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Scenario for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "recorded scenario"
        }

        fn min_minor_version(&self) -> Option<u32> {
            self.min_minor
        }

        fn capacity_sensitive(&self) -> bool {
            self.sensitive
        }

        async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
            self.order.lock().push(self.name);
            ctx.by("recording");
            if self.fail {
                Err(Error::assertion("recorded failure"))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> Recorder {
        Recorder {
            name,
            fail: false,
            min_minor: None,
            sensitive: false,
            order: order.clone(),
        }
    }

    /// Not capacity sensitive, but must not overlap anything
    struct Exclusive(Recorder);

    #[async_trait]
    impl Scenario for Exclusive {
        fn name(&self) -> &'static str {
            self.0.name
        }

        fn description(&self) -> &'static str {
            "exclusive scenario"
        }

        fn exclusive(&self) -> bool {
            true
        }

        async fn run(&self, ctx: &ScenarioContext) -> Result<()> {
            self.0.run(ctx).await
        }
    }

    fn driver(fake: Arc<FakeCluster>, version: Option<KubernetesVersion>) -> Driver {
        let config = HarnessConfig {
            kubernetes_version: version,
            ..Default::default()
        };
        Driver::new(Harness::new(config, fake.clone(), fake, ManualClock::new()))
    }

    #[test]
    fn test_namespace_name() {
        let name = namespace_name("e2etest-");
        assert_eq!(name.len(), "e2etest-".len() + 10);
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert_ne!(name, namespace_name("e2etest-"));
    }

    #[tokio::test]
    async fn test_version_gating() {
        let fake = FakeCluster::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let gated = Recorder {
            min_minor: Some(16),
            ..recorder("gated", &order)
        };

        let report = driver(fake.clone(), Some(KubernetesVersion::new(1, 15)))
            .run_one(&gated)
            .await;
        assert_matches::assert_matches!(report.outcome, Outcome::Skipped(ref r) if r.contains("1.16"));
        assert!(report.namespace.is_none());

        let report = driver(fake, None).run_one(&gated).await;
        assert!(report.failed());
        assert!(order.lock().is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_and_teardown() {
        let fake = FakeCluster::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let driver = driver(fake.clone(), Some(KubernetesVersion::new(1, 18)));

        let scenarios: Vec<Arc<dyn Scenario>> = vec![
            Arc::new(Recorder {
                sensitive: true,
                ..recorder("capacity", &order)
            }),
            Arc::new(recorder("pass", &order)),
            Arc::new(Recorder {
                fail: true,
                ..recorder("fail", &order)
            }),
            Arc::new(Exclusive(recorder("counting", &order))),
        ];
        let suite = driver.run_all(&scenarios).await;

        let names: Vec<_> = suite.scenarios.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["capacity", "pass", "fail", "counting"]);
        assert_eq!((suite.passed(), suite.failed(), suite.skipped()), (3, 1, 0));
        assert!(!suite.success());

        // exclusive scenarios run after the concurrent batch, in input order
        assert_eq!(&order.lock()[2..], &["capacity", "counting"]);

        let deleted = fake.deleted();
        let ns_of = |i: usize| suite.scenarios[i].namespace.clone().unwrap();
        assert!(deleted.contains(&format!("namespaces/{}", ns_of(0))));
        assert!(deleted.contains(&format!("namespaces/{}", ns_of(1))));
        assert!(!deleted.contains(&format!("namespaces/{}", ns_of(2))));
        assert!(fake.contains("namespaces", None, &ns_of(2)));
    }
}
