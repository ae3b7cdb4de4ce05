use error_set::error_set;
use std::path::Path;

pub mod classify;
pub mod convert;
pub mod git;
pub mod project;
pub mod reconcile;
pub mod resolve;
pub mod stage;

pub use classify::{ChangeSet, ClassifyOptions};
pub use convert::ConvertError;
pub use git::{GitError, GitRepo};
pub use project::{ProjectContext, ProjectError};
pub use resolve::{DescriptorPolicy, Registry};
pub use stage::StageError;

error_set! {
    /// Top-level error for sf-delta operations
    DeltaError := {
        #[display("No deployable changes found between {target} and {source}")]
        NoChanges { target: String, source: String },
        #[display("{source} is behind {target} by {behind} commit(s); pass --force to package anyway")]
        BehindTarget { target: String, source: String, behind: u32 },
        GitError(GitError),
        ProjectError(ProjectError),
        StageError(StageError),
        ConvertError(ConvertError),
    }
}

/// Inputs for one packaging run.
pub struct PackageOptions {
    /// Baseline revision the package deploys against.
    pub target: String,
    /// Revision being packaged; `None` means the working copy.
    pub source: Option<String>,
    /// Destination directory for the converted package.
    pub output: std::path::PathBuf,
    /// Drop entries whose content changed only in whitespace.
    pub ignore_whitespace: bool,
    /// Classify removals but skip the destructive-changes artifact.
    pub skip_deletions: bool,
    /// Proceed when the packaged side is behind the target.
    pub force: bool,
    /// Bundle descriptor counting policy for reconciliation.
    pub descriptor_policy: DescriptorPolicy,
}

/// What a completed run produced.
pub struct PackageSummary {
    pub changed: usize,
    pub removed: usize,
    pub destructive: bool,
}

/// Main interface: derives a minimal deployable package from the diff
/// between two revisions of a Salesforce DX project.
pub struct DeltaPackager {
    repo: GitRepo,
    project: ProjectContext,
    registry: Registry,
}

impl DeltaPackager {
    /// Build a packager over an already-opened repository and project.
    pub fn new(repo: GitRepo, project: ProjectContext) -> Self {
        Self {
            repo,
            project,
            registry: Registry::standard(),
        }
    }

    /// Discover the repository containing `dir` and load the project
    /// context from its root.
    pub fn discover(dir: &Path) -> Result<Self, DeltaError> {
        let repo = GitRepo::discover(dir)?;
        let project = ProjectContext::load(repo.root())?;
        Ok(Self::new(repo, project))
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    /// Classify and reconcile the diff into the final change plan.
    ///
    /// Fails with [`DeltaError::BehindTarget`] when the packaged side is
    /// missing commits from the target (unless forced), and with
    /// [`DeltaError::NoChanges`] when nothing survives filtering.
    pub fn plan(&self, opts: &PackageOptions) -> Result<ChangeSet, DeltaError> {
        let source_label = opts.source.as_deref().unwrap_or("working copy");

        let (behind, ahead) = self.repo.ahead_behind(&opts.target, opts.source.as_deref())?;
        if behind > 0 {
            if opts.force {
                log::warn!(
                    "{} is behind {} by {} commit(s); packaging anyway",
                    source_label,
                    opts.target,
                    behind
                );
            } else {
                return Err(DeltaError::BehindTarget {
                    target: opts.target.clone(),
                    source: source_label.to_string(),
                    behind,
                });
            }
        }
        log::debug!(
            "{} is ahead of {} by {} commit(s)",
            source_label,
            opts.target,
            ahead
        );

        let diff = self
            .repo
            .diff_name_status(&opts.target, opts.source.as_deref())?;
        let classify_opts = ClassifyOptions {
            target: opts.target.clone(),
            source: opts.source.clone(),
            ignore_whitespace: opts.ignore_whitespace,
        };
        let mut set = classify::classify(&diff, &self.project, &classify_opts, &self.repo)?;

        let reconciled = reconcile::reconcile(
            &set.removed,
            opts.source.as_deref(),
            &self.registry,
            &self.repo,
            opts.descriptor_policy,
        )?;
        set.removed = reconciled.removed;
        set.changed.extend(reconciled.additional_changed);

        if set.is_empty() {
            return Err(DeltaError::NoChanges {
                target: opts.target.clone(),
                source: source_label.to_string(),
            });
        }

        Ok(set)
    }

    /// Stage and convert an already-computed plan into the output
    /// directory.
    ///
    /// The changed set is copied from the packaged side; the removed set
    /// is copied from the target revision, where the removed files last
    /// existed, and its converted manifest becomes
    /// `destructiveChanges.xml`.
    pub fn package(
        &self,
        plan: &ChangeSet,
        opts: &PackageOptions,
    ) -> Result<PackageSummary, DeltaError> {
        let staged = stage::assemble(
            &plan.changed,
            opts.source.as_deref(),
            &self.project,
            &self.registry,
            &self.repo,
            opts.descriptor_policy,
        )?;
        convert::convert_source(staged.path(), &opts.output)?;

        let mut destructive = false;
        if plan.removed.is_empty() {
            log::debug!("No removals to declare");
        } else if opts.skip_deletions {
            log::warn!(
                "Skipping removal declaration for {} component(s)",
                plan.removed.len()
            );
        } else {
            let staged = stage::assemble(
                &plan.removed,
                Some(&opts.target),
                &self.project,
                &self.registry,
                &self.repo,
                opts.descriptor_policy,
            )?;
            convert::convert_removals(staged.path(), &opts.output)?;
            destructive = true;
        }

        Ok(PackageSummary {
            changed: plan.changed.len(),
            removed: plan.removed.len(),
            destructive,
        })
    }

    /// Plan and package in one call.
    ///
    /// # Examples
    /// ```no_run
    /// # use sf_delta::{DeltaPackager, DescriptorPolicy, PackageOptions};
    /// let packager = DeltaPackager::discover(std::path::Path::new(".")).unwrap();
    /// let summary = packager
    ///     .run(&PackageOptions {
    ///         target: "master".to_string(),
    ///         source: None,
    ///         output: "dist/release".into(),
    ///         ignore_whitespace: false,
    ///         skip_deletions: false,
    ///         force: false,
    ///         descriptor_policy: DescriptorPolicy::default(),
    ///     })
    ///     .unwrap();
    /// println!("{} changed file(s)", summary.changed);
    /// ```
    pub fn run(&self, opts: &PackageOptions) -> Result<PackageSummary, DeltaError> {
        let plan = self.plan(opts)?;
        self.package(&plan, opts)
    }
}
