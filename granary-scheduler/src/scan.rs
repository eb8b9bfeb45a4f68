//! Suite scanning
//!
//! One scheduler pass per suite: load the archive state, decide every
//! action as a value, then apply the plan. Keeping the decisions pure makes
//! the build policy testable without a database.

use std::collections::{HashMap, HashSet};

use granary_core::arch::any_matches;
use granary_core::domain::job::{Job, JobKind, JobModule, JobResult, JobStatus, NewJob};
use granary_core::domain::package::SourcePackage;
use granary_core::domain::suite::Suite;
use granary_core::version::version_newer;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;

/// Key identifying one build slot: (trigger, version, architecture).
type SlotKey = (Uuid, String, String);

/// Everything the planner needs to know about one suite.
pub struct SuiteState {
    pub suite: Suite,
    /// Newest published version per source package.
    pub sources: Vec<SourcePackage>,
    /// Latest job per build slot for those sources.
    pub jobs: HashMap<SlotKey, Job>,
    /// (name, version, architecture) keys with unsatisfiable dependencies.
    pub issues: HashSet<(String, String, String)>,
    /// (source name, version, architecture) keys that already have binaries.
    pub binaries: HashSet<(String, String, String)>,
}

/// One decision out of a suite scan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// Create a build job for a slot that has none.
    CreateJob { package: String, job: NewJob },
    /// An existing job gained dependency issues.
    MarkDependencyWait {
        job: Uuid,
        package: String,
        architecture: String,
    },
    /// A blocked job's dependency issues went away.
    MarkRunnable {
        job: Uuid,
        package: String,
        architecture: String,
    },
}

/// Totals from one suite pass.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub created: usize,
    pub blocked: usize,
    pub unblocked: usize,
}

/// Scan one suite end to end.
pub async fn scan_suite(
    pool: &PgPool,
    suite: Suite,
    config: &Config,
) -> Result<ScanStats, sqlx::Error> {
    let state = load_suite_state(pool, suite, &config.repo_name).await?;
    info!(
        suite = %state.suite.name,
        sources = state.sources.len(),
        "scanning suite"
    );
    let plan = plan_suite(&state, &config.arch_affinity);
    apply_plan(pool, plan, config.simulate).await
}

/// Load everything a suite scan needs from the database.
pub async fn load_suite_state(
    pool: &PgPool,
    suite: Suite,
    repo: &str,
) -> Result<SuiteState, sqlx::Error> {
    let published = granary_db::packages::sources_in_suite(pool, &suite.name).await?;
    let sources = newest_per_source(published);

    let triggers: Vec<Uuid> = sources.iter().map(|s| s.source_id).collect();
    let mut jobs = HashMap::new();
    for job in granary_db::jobs::find_for_triggers(pool, &triggers).await? {
        let Some(trigger) = job.trigger else { continue };
        // rows come oldest first, so the newest job wins the slot
        jobs.insert(
            (trigger, job.version.clone(), job.architecture.clone()),
            job,
        );
    }

    let issues = granary_db::debcheck::source_issue_index(pool, repo, &suite.name)
        .await?
        .into_iter()
        .collect();
    let binaries = granary_db::packages::binary_index(pool, &suite.name)
        .await?
        .into_iter()
        .collect();

    Ok(SuiteState {
        suite,
        sources,
        jobs,
        issues,
        binaries,
    })
}

/// Keep only the newest published version of each source package.
pub fn newest_per_source(published: Vec<SourcePackage>) -> Vec<SourcePackage> {
    let mut newest: HashMap<Uuid, SourcePackage> = HashMap::new();
    for package in published {
        match newest.get(&package.source_id) {
            Some(kept) if !version_newer(&package.version, &kept.version) => {}
            _ => {
                newest.insert(package.source_id, package);
            }
        }
    }
    let mut sources: Vec<_> = newest.into_values().collect();
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    sources
}

/// Decide every action for a suite. Pure: no database, no clock.
pub fn plan_suite(state: &SuiteState, affinity: &str) -> Vec<PlannedAction> {
    let mut actions = Vec::new();
    for package in &state.sources {
        plan_package(state, package, affinity, &mut actions);
    }
    actions
}

fn plan_package(
    state: &SuiteState,
    package: &SourcePackage,
    affinity: &str,
    actions: &mut Vec<PlannedAction>,
) {
    let declared = &package.architectures;

    // arch:all-only package: one job on the pseudo-architecture
    if declared.len() == 1 && declared[0] == "all" {
        if !state.suite.has_architecture("all") {
            warn!(
                package = %package.name,
                suite = %state.suite.name,
                "architecture-independent package in a suite without `all`, skipping"
            );
            return;
        }
        plan_slot(state, package, "all", false, actions);
        return;
    }

    let targets: Vec<&str> = state
        .suite
        .architectures
        .iter()
        .map(String::as_str)
        .filter(|arch| *arch != "all")
        .filter(|arch| any_matches(declared, arch))
        .collect();

    // A package building for exactly one real architecture plus `all` would
    // never produce its arch-independent artifacts unless that architecture
    // happens to be the affinity one; flag the job to build them anyway.
    let builds_all = declared.iter().any(|a| a == "all");
    let force_indep = builds_all
        && targets.len() == 1
        && targets[0] != affinity
        && !state.binaries.contains(&(
            package.name.clone(),
            package.version.clone(),
            "all".to_string(),
        ));

    for target in targets {
        plan_slot(state, package, target, force_indep, actions);
    }
}

fn plan_slot(
    state: &SuiteState,
    package: &SourcePackage,
    architecture: &str,
    force_indep: bool,
    actions: &mut Vec<PlannedAction>,
) {
    let slot = (
        package.source_id,
        package.version.clone(),
        architecture.to_string(),
    );
    let key = (
        package.name.clone(),
        package.version.clone(),
        architecture.to_string(),
    );
    let has_issues = state.issues.contains(&key);

    if let Some(job) = state.jobs.get(&slot) {
        reconcile_job(job, package, architecture, has_issues, actions);
        return;
    }

    // never rebuild what already exists
    if state.binaries.contains(&key) {
        debug!(
            package = %package.name,
            architecture,
            "binaries already present, no job needed"
        );
        return;
    }

    let status = if has_issues {
        JobStatus::Depwait
    } else {
        JobStatus::Waiting
    };
    let mut data = Map::new();
    if force_indep {
        data.insert("do_indep".to_string(), Value::Bool(true));
    }

    actions.push(PlannedAction::CreateJob {
        package: package.name.clone(),
        job: NewJob {
            module: JobModule::Scheduler,
            kind: JobKind::PackageBuild,
            trigger: Some(package.source_id),
            version: package.version.clone(),
            architecture: architecture.to_string(),
            suite: Some(package.suite.clone()),
            status,
            priority: 0,
            data,
        },
    });
}

fn reconcile_job(
    job: &Job,
    package: &SourcePackage,
    architecture: &str,
    has_issues: bool,
    actions: &mut Vec<PlannedAction>,
) {
    if has_issues {
        // unscheduled jobs get parked; failed ones return to depwait so a
        // later retry starts from a clean slate once dependencies land
        let blockable = matches!(job.status, JobStatus::Unknown | JobStatus::Waiting)
            || (job.status == JobStatus::Done && job.result == JobResult::Failure);
        if blockable {
            actions.push(PlannedAction::MarkDependencyWait {
                job: job.id,
                package: package.name.clone(),
                architecture: architecture.to_string(),
            });
        }
    } else if job.status == JobStatus::Depwait {
        actions.push(PlannedAction::MarkRunnable {
            job: job.id,
            package: package.name.clone(),
            architecture: architecture.to_string(),
        });
    }
}

/// Apply a plan, or only narrate it in simulate mode.
pub async fn apply_plan(
    pool: &PgPool,
    plan: Vec<PlannedAction>,
    simulate: bool,
) -> Result<ScanStats, sqlx::Error> {
    let mut stats = ScanStats::default();

    for action in plan {
        match action {
            PlannedAction::CreateJob { package, job } => {
                info!(
                    package = %package,
                    version = %job.version,
                    architecture = %job.architecture,
                    status = %job.status,
                    "scheduling build"
                );
                stats.created += 1;
                if !simulate && granary_db::jobs::create(pool, &job).await?.is_none() {
                    debug!(package = %package, "equivalent job already present, skipped");
                    stats.created -= 1;
                }
            }
            PlannedAction::MarkDependencyWait {
                job,
                package,
                architecture,
            } => {
                info!(
                    package = %package,
                    architecture = %architecture,
                    "build dependencies unsatisfiable, parking job"
                );
                stats.blocked += 1;
                if !simulate {
                    granary_db::jobs::mark_dependency_wait(pool, job).await?;
                }
            }
            PlannedAction::MarkRunnable {
                job,
                package,
                architecture,
            } => {
                info!(
                    package = %package,
                    architecture = %architecture,
                    "build dependencies resolved, queueing job"
                );
                stats.unblocked += 1;
                if !simulate {
                    granary_db::jobs::mark_runnable(pool, job).await?;
                }
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn suite(arches: &[&str]) -> Suite {
        Suite {
            name: "landing".to_string(),
            architectures: arches.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn package(name: &str, version: &str, arches: &[&str]) -> SourcePackage {
        SourcePackage {
            uuid: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            name: name.to_string(),
            version: version.to_string(),
            suite: "landing".to_string(),
            component: "main".to_string(),
            architectures: arches.iter().map(|s| s.to_string()).collect(),
            deleted: false,
        }
    }

    fn job_for(
        package: &SourcePackage,
        architecture: &str,
        status: JobStatus,
        result: JobResult,
    ) -> Job {
        Job {
            id: Uuid::new_v4(),
            module: JobModule::Scheduler,
            kind: JobKind::PackageBuild,
            trigger: Some(package.source_id),
            version: package.version.clone(),
            architecture: architecture.to_string(),
            suite: Some("landing".to_string()),
            status,
            result,
            priority: 0,
            data: Map::new(),
            worker: None,
            time_created: Utc::now(),
            time_assigned: None,
            time_finished: None,
            latest_log_excerpt: None,
        }
    }

    fn state_for(suite: Suite, sources: Vec<SourcePackage>) -> SuiteState {
        SuiteState {
            suite,
            sources,
            jobs: HashMap::new(),
            issues: HashSet::new(),
            binaries: HashSet::new(),
        }
    }

    fn with_job(mut state: SuiteState, job: Job) -> SuiteState {
        let trigger = job.trigger.unwrap();
        state.jobs.insert(
            (trigger, job.version.clone(), job.architecture.clone()),
            job,
        );
        state
    }

    fn created_architectures(plan: &[PlannedAction]) -> Vec<String> {
        plan.iter()
            .map(|action| match action {
                PlannedAction::CreateJob { job, .. } => job.architecture.clone(),
                other => panic!("unexpected action {other:?}"),
            })
            .collect()
    }

    #[test]
    fn any_package_gets_one_job_per_real_architecture() {
        let pkg = package("curl", "8.1.0-1", &["any"]);
        let state = state_for(suite(&["amd64", "arm64", "all"]), vec![pkg]);
        let plan = plan_suite(&state, "amd64");
        assert_eq!(created_architectures(&plan), vec!["amd64", "arm64"]);
    }

    #[test]
    fn planning_is_idempotent_once_jobs_exist() {
        let pkg = package("curl", "8.1.0-1", &["any"]);
        let mut state = state_for(suite(&["amd64", "all"]), vec![pkg.clone()]);
        state = with_job(
            state,
            job_for(&pkg, "amd64", JobStatus::Waiting, JobResult::Unknown),
        );
        assert!(plan_suite(&state, "amd64").is_empty());
    }

    #[test]
    fn all_only_packages_build_on_the_all_slot() {
        let pkg = package("docs", "1.0", &["all"]);
        let state = state_for(suite(&["amd64", "all"]), vec![pkg]);
        let plan = plan_suite(&state, "amd64");
        assert_eq!(created_architectures(&plan), vec!["all"]);
    }

    #[test]
    fn all_only_packages_are_skipped_in_suites_without_all() {
        let pkg = package("docs", "1.0", &["all"]);
        let state = state_for(suite(&["amd64", "arm64"]), vec![pkg]);
        assert!(plan_suite(&state, "amd64").is_empty());
    }

    #[test]
    fn sole_non_affinity_builder_is_flagged_for_indep_artifacts() {
        let pkg = package("armtool", "2.0-1", &["arm64", "all"]);
        let state = state_for(suite(&["amd64", "arm64", "all"]), vec![pkg]);
        let plan = plan_suite(&state, "amd64");

        assert_eq!(plan.len(), 1);
        match &plan[0] {
            PlannedAction::CreateJob { job, .. } => {
                assert_eq!(job.architecture, "arm64");
                assert_eq!(job.data.get("do_indep"), Some(&Value::Bool(true)));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn indep_flag_is_withheld_when_all_binaries_exist() {
        let pkg = package("armtool", "2.0-1", &["arm64", "all"]);
        let mut state = state_for(suite(&["amd64", "arm64", "all"]), vec![pkg]);
        state.binaries.insert((
            "armtool".to_string(),
            "2.0-1".to_string(),
            "all".to_string(),
        ));
        let plan = plan_suite(&state, "amd64");

        match &plan[0] {
            PlannedAction::CreateJob { job, .. } => assert!(!job.data.contains_key("do_indep")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn affinity_builder_needs_no_indep_flag() {
        let pkg = package("amdtool", "1.0-1", &["amd64", "all"]);
        let state = state_for(suite(&["amd64", "arm64", "all"]), vec![pkg]);
        let plan = plan_suite(&state, "amd64");

        assert_eq!(created_architectures(&plan), vec!["amd64"]);
        match &plan[0] {
            PlannedAction::CreateJob { job, .. } => assert!(job.data.is_empty()),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn existing_binaries_suppress_new_jobs() {
        let pkg = package("curl", "8.1.0-1", &["any"]);
        let mut state = state_for(suite(&["amd64", "all"]), vec![pkg]);
        state.binaries.insert((
            "curl".to_string(),
            "8.1.0-1".to_string(),
            "amd64".to_string(),
        ));
        assert!(plan_suite(&state, "amd64").is_empty());
    }

    #[test]
    fn dependency_issues_park_new_jobs_in_depwait() {
        let pkg = package("broken", "1.0-1", &["any"]);
        let mut state = state_for(suite(&["amd64", "all"]), vec![pkg]);
        state.issues.insert((
            "broken".to_string(),
            "1.0-1".to_string(),
            "amd64".to_string(),
        ));
        let plan = plan_suite(&state, "amd64");

        match &plan[0] {
            PlannedAction::CreateJob { job, .. } => assert_eq!(job.status, JobStatus::Depwait),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn issues_appearing_later_park_waiting_jobs() {
        let pkg = package("pkg-p", "1.0", &["any"]);
        let mut state = state_for(suite(&["amd64", "all"]), vec![pkg.clone()]);
        state = with_job(
            state,
            job_for(&pkg, "amd64", JobStatus::Waiting, JobResult::Unknown),
        );
        state
            .issues
            .insert(("pkg-p".to_string(), "1.0".to_string(), "amd64".to_string()));

        let plan = plan_suite(&state, "amd64");
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], PlannedAction::MarkDependencyWait { .. }));
    }

    #[test]
    fn cleared_issues_requeue_depwait_jobs() {
        let pkg = package("pkg-p", "1.0", &["any"]);
        let mut state = state_for(suite(&["amd64", "all"]), vec![pkg.clone()]);
        state = with_job(
            state,
            job_for(&pkg, "amd64", JobStatus::Depwait, JobResult::Unknown),
        );

        let plan = plan_suite(&state, "amd64");
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], PlannedAction::MarkRunnable { .. }));
    }

    #[test]
    fn failed_jobs_return_to_depwait_when_issues_appear() {
        let pkg = package("flaky", "3.2-1", &["any"]);
        let mut state = state_for(suite(&["amd64", "all"]), vec![pkg.clone()]);
        state = with_job(
            state,
            job_for(&pkg, "amd64", JobStatus::Done, JobResult::Failure),
        );
        state.issues.insert((
            "flaky".to_string(),
            "3.2-1".to_string(),
            "amd64".to_string(),
        ));

        let plan = plan_suite(&state, "amd64");
        assert!(matches!(plan[0], PlannedAction::MarkDependencyWait { .. }));
    }

    #[test]
    fn scheduled_and_running_jobs_are_left_alone() {
        let pkg = package("busy", "1.0", &["any"]);
        for status in [JobStatus::Scheduled, JobStatus::Running] {
            let mut state = state_for(suite(&["amd64", "all"]), vec![pkg.clone()]);
            state = with_job(state, job_for(&pkg, "amd64", status, JobResult::Unknown));
            state
                .issues
                .insert(("busy".to_string(), "1.0".to_string(), "amd64".to_string()));
            assert!(plan_suite(&state, "amd64").is_empty(), "{status}");
        }
    }

    #[test]
    fn only_the_newest_version_is_scanned() {
        let old = package("curl", "8.0.0-1", &["any"]);
        let mut new = package("curl", "8.1.0-1", &["any"]);
        new.source_id = old.source_id;

        let sources = newest_per_source(vec![new.clone(), old]);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].version, "8.1.0-1");
    }

    #[test]
    fn tuple_wildcards_restrict_targets() {
        let pkg = package("linuxish", "1.0", &["linux-any"]);
        let state = state_for(suite(&["amd64", "kfreebsd-amd64", "all"]), vec![pkg]);
        let plan = plan_suite(&state, "amd64");
        assert_eq!(created_architectures(&plan), vec!["amd64"]);
    }
}
