//! Scenario files: a repository, an optional core configuration and a list
//! of steps run in order against a fresh in-memory core.
//!
//! ```toml
//! name = "concurrent renames"
//! repository = "snomed"
//!
//! [config.clock]
//! kind = "logical"
//! start = 100
//!
//! [[step]]
//! action = "create-branch"
//! parent = "MAIN"
//! name = "task1"
//!
//! [[step]]
//! action = "conflicts"
//! source = "MAIN/task1"
//! target = "MAIN"
//! ```

use std::sync::Arc;
use std::time::Duration;

use arbor_core::{
    BranchPath, CommitDetail, CommitQuery, CoreConfig, CoreError, LockContext, NewCommit, Repositories,
    Repository, ReviewStatus, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

fn default_repository() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_repository")]
    pub repository: String,
    /// Replaces the configuration given on the command line.
    #[serde(default)]
    pub config: Option<CoreConfig>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// The step must fail with an error containing this text.
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    CreateBranch {
        parent: BranchPath,
        name: String,
    },
    DeleteBranch {
        path: BranchPath,
    },
    Commit {
        branch: BranchPath,
        author: String,
        #[serde(default)]
        comment: String,
        /// Commit at this timestamp instead of asking the clock.
        #[serde(default)]
        timestamp: Option<i64>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        details: Vec<CommitDetail>,
    },
    Search {
        #[serde(default)]
        query: CommitQuery,
    },
    Review {
        source: BranchPath,
        target: BranchPath,
    },
    Conflicts {
        source: BranchPath,
        target: BranchPath,
    },
    Compare {
        left: BranchPath,
        right: BranchPath,
    },
    Validate {
        branch: BranchPath,
    },
    /// Without targets the whole repository is locked.
    Lock {
        user: String,
        description: String,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        session: Option<String>,
        #[serde(default)]
        targets: Vec<BranchPath>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Unlock {
        user: String,
        description: String,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        targets: Vec<BranchPath>,
    },
    ReleaseSession {
        session: String,
    },
    Maintain,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateBranch { .. } => "create-branch",
            Action::DeleteBranch { .. } => "delete-branch",
            Action::Commit { .. } => "commit",
            Action::Search { .. } => "search",
            Action::Review { .. } => "review",
            Action::Conflicts { .. } => "conflicts",
            Action::Compare { .. } => "compare",
            Action::Validate { .. } => "validate",
            Action::Lock { .. } => "lock",
            Action::Unlock { .. } => "unlock",
            Action::ReleaseSession { .. } => "release-session",
            Action::Maintain => "maintain",
        }
    }
}

/// Result of one step.
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: String,
    pub passed: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub repository: String,
    pub steps: Vec<StepReport>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|step| step.passed)
    }
}

struct Executed {
    summary: String,
    output: Value,
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(e.to_string()))
}

fn context(user: &str, description: &str, parent: &Option<String>, session: &Option<String>) -> LockContext {
    let mut context = LockContext::new(user, description);
    context.parent_description = parent.clone();
    context.session_id = session.clone();
    context
}

/// Run `scenario` on a fresh core built from `base` (or the scenario's own
/// configuration). Stops at the first failing step unless `keep_going`.
pub async fn run(scenario: &Scenario, base: &CoreConfig, keep_going: bool) -> anyhow::Result<ScenarioReport> {
    let mut config = scenario.config.clone().unwrap_or_else(|| base.clone());
    if !config.repositories.contains(&scenario.repository) {
        config.repositories.push(scenario.repository.clone());
    }
    let repos = Arc::new(Repositories::new(config)?);
    let _maintenance = repos.start_maintenance();
    let repo = repos.get(&scenario.repository)?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let result = execute(&repos, &repo, &step.action).await;
        let passed = match (&result, &step.expect_error) {
            (Ok(_), None) => true,
            (Err(e), Some(expected)) => e.to_string().contains(expected.as_str()),
            _ => false,
        };
        debug!(step = index + 1, action = step.action.name(), passed, "scenario step");
        let report = match result {
            Ok(executed) => StepReport {
                step: index + 1,
                action: step.action.name().to_string(),
                passed,
                summary: executed.summary,
                output: Some(executed.output),
                error: None,
            },
            Err(e) => StepReport {
                step: index + 1,
                action: step.action.name().to_string(),
                passed,
                summary: if passed { "failed as expected".into() } else { "failed".into() },
                output: None,
                error: Some(e.to_string()),
            },
        };
        let stop = !report.passed && !keep_going;
        steps.push(report);
        if stop {
            break;
        }
    }

    Ok(ScenarioReport {
        name: scenario.name.clone().unwrap_or_else(|| "unnamed".into()),
        repository: scenario.repository.clone(),
        steps,
    })
}

async fn execute(repos: &Repositories, repo: &Repository, action: &Action) -> Result<Executed, CoreError> {
    match action {
        Action::CreateBranch { parent, name } => {
            let branch = repo.create_branch(parent, name)?;
            Ok(Executed {
                summary: format!(
                    "{} base={} head={}",
                    branch.path, branch.base_timestamp, branch.head_timestamp
                ),
                output: to_json(&branch)?,
            })
        }
        Action::DeleteBranch { path } => {
            let branch = repo.delete_branch(path)?;
            Ok(Executed {
                summary: format!("{} deleted", branch.path),
                output: to_json(&branch)?,
            })
        }
        Action::Commit {
            branch,
            author,
            comment,
            timestamp,
            group,
            details,
        } => {
            let mut commit = NewCommit::new(branch.clone(), author.as_str(), comment.as_str());
            commit.details = details.clone();
            if let Some(group) = group {
                commit = commit.with_group(group.as_str());
            }
            let commit = match timestamp {
                Some(ts) => repo.commit_at(commit, Timestamp::new(*ts))?,
                None => repo.commit(commit)?,
            };
            Ok(Executed {
                summary: format!(
                    "{} on {} at {} ({} details)",
                    commit.id.short_id(),
                    commit.branch,
                    commit.timestamp,
                    commit.details.len()
                ),
                output: to_json(&commit)?,
            })
        }
        Action::Search { query } => {
            let page = repo.search_commits(query)?;
            Ok(Executed {
                summary: format!("{} of {} commits", page.items.len(), page.total),
                output: to_json(&page)?,
            })
        }
        Action::Review { source, target } => {
            let review = repo.create_review(source, target)?;
            let changes = match review.status {
                ReviewStatus::Current => Some(repo.get_concept_changes(&review.id)?),
                _ => None,
            };
            let summary = match &changes {
                Some(changes) => format!(
                    "{} {} (+{} ~{} -{})",
                    review.id.short_id(),
                    review.status,
                    changes.new_ids().count(),
                    changes.changed_ids().count(),
                    changes.deleted_ids().count()
                ),
                None => format!("{} {}", review.id.short_id(), review.status),
            };
            Ok(Executed {
                summary,
                output: json!({ "review": to_json(&review)?, "changes": to_json(&changes)? }),
            })
        }
        Action::Conflicts { source, target } => {
            let conflicts = repo.detect_conflicts(source, target)?;
            let mut summary = format!("{} conflict(s)", conflicts.len());
            for conflict in &conflicts {
                summary.push_str("\n    ");
                summary.push_str(conflict.kind.as_str());
                summary.push_str(": ");
                summary.push_str(&conflict.message());
            }
            Ok(Executed {
                summary,
                output: to_json(&conflicts)?,
            })
        }
        Action::Compare { left, right } => {
            let state = repo.compare(left, right)?;
            let output = to_json(&state)?;
            Ok(Executed {
                summary: format!("{left} vs {right}: {}", output.as_str().unwrap_or_default()),
                output,
            })
        }
        Action::Validate { branch } => {
            let report = repo.validate_history(branch)?;
            let summary = if report.is_valid() {
                format!("{branch}: {} commits, history valid", report.commit_count)
            } else {
                format!("{branch}: {} violation(s)", report.violations.len())
            };
            Ok(Executed {
                summary,
                output: to_json(&report)?,
            })
        }
        Action::Lock {
            user,
            description,
            parent,
            session,
            targets,
            timeout_ms,
        } => {
            let context = context(user, description, parent, session);
            let timeout = timeout_ms.map(Duration::from_millis);
            if targets.is_empty() {
                repo.lock_repository(&context, timeout).await?;
            } else {
                repo.lock(&context, timeout, targets).await?;
            }
            Ok(Executed {
                summary: format!("locked by {context}"),
                output: to_json(&repos.locks().locks()?)?,
            })
        }
        Action::Unlock {
            user,
            description,
            parent,
            targets,
        } => {
            let context = context(user, description, parent, &None);
            let released = if targets.is_empty() {
                repo.unlock_repository(&context)?
            } else {
                repo.unlock(&context, targets)?
            };
            Ok(Executed {
                summary: if released { "released".into() } else { "nothing held".into() },
                output: json!(released),
            })
        }
        Action::ReleaseSession { session } => {
            let count = repos.locks().release_session(session)?;
            Ok(Executed {
                summary: format!("{count} lock(s) released"),
                output: json!(count),
            })
        }
        Action::Maintain => {
            let report = repos.maintain(Utc::now())?;
            Ok(Executed {
                summary: format!("{} stale, {} swept", report.stale, report.swept),
                output: to_json(&report)?,
            })
        }
    }
}
