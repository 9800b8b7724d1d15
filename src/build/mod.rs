//! Build Orchestrator
//!
//! Linear pipeline: configure with CMake, verify the generated solution,
//! compile with MSBuild. Progress moves in fixed milestones (30% / 40% /
//! 100%) because neither tool reports a usable overall percentage.

pub mod cmake;
pub mod msbuild;

use std::path::PathBuf;
use std::time::Instant;

use crate::config::AppConfig;
use crate::logging::{log_build, log_error, log_warning};
use crate::paths::Workspace;
use crate::process::{kill_processes_by_name, ToolCommand};
use crate::source::is_git_checkout;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};

use cmake::{configure_args, generator_for, solution_path, CMAKE_TIMEOUT};
use msbuild::{locate_msbuild, msbuild_args, MSBUILD_IMAGE, MSBUILD_TIMEOUT};

const CONFIGURED_MILESTONE: f32 = 0.30;
const GENERATED_MILESTONE: f32 = 0.40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Idle,
    Configuring,
    Generated,
    Compiling,
    Done,
    Cancelled,
    Failed,
}

impl BuildStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStage::Done | BuildStage::Cancelled | BuildStage::Failed)
    }

    /// Forward-only transitions; `Cancelled` from any in-progress stage,
    /// `Failed` only from a stage that runs a tool.
    pub fn can_advance_to(self, next: BuildStage) -> bool {
        use BuildStage::*;
        match (self, next) {
            (Idle, Configuring) => true,
            (Configuring, Generated) => true,
            (Generated, Compiling) => true,
            (Compiling, Done) => true,
            (Configuring | Generated | Compiling, Cancelled) => true,
            (Configuring | Compiling, Failed) => true,
            _ => false,
        }
    }
}

/// Tracks the current stage and reports every change.
pub struct BuildTracker<'a> {
    stage: BuildStage,
    on_stage: Box<dyn Fn(BuildStage) + 'a>,
}

impl<'a> BuildTracker<'a> {
    pub fn new(on_stage: impl Fn(BuildStage) + 'a) -> Self {
        Self {
            stage: BuildStage::Idle,
            on_stage: Box::new(on_stage),
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn advance(&mut self, next: BuildStage) -> TaskResult<()> {
        if !self.stage.can_advance_to(next) {
            return Err(TaskError::other(
                "Build state",
                format!("illegal transition {:?} -> {:?}", self.stage, next),
            ));
        }
        self.stage = next;
        (self.on_stage)(next);
        Ok(())
    }

    /// Move to the terminal state matching `err`.
    fn settle(&mut self, err: &TaskError) {
        let terminal = if err.is_cancelled() {
            BuildStage::Cancelled
        } else {
            BuildStage::Failed
        };
        if self.stage.can_advance_to(terminal) {
            self.stage = terminal;
            (self.on_stage)(terminal);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Also build the map/vmap/mmap extractors (`-DTOOLS_BUILD=all`)
    pub generate_extractors: bool,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub solution: PathBuf,
    pub output_dir: PathBuf,
    pub elapsed_secs: u64,
}

/// Resolved tool paths, checked before anything is started.
#[derive(Debug, Clone)]
pub struct BuildTools {
    pub cmake: PathBuf,
    pub visual_studio: PathBuf,
}

pub fn preflight(workspace: &Workspace, config: &AppConfig) -> TaskResult<BuildTools> {
    let cmake = config
        .dependency_path("CMake")
        .ok_or_else(|| TaskError::MissingTool { name: "CMake".into() })?;
    let visual_studio = config
        .dependency_path("Visual Studio")
        .ok_or_else(|| TaskError::MissingTool {
            name: "Visual Studio".into(),
        })?;

    let source = workspace.source_dir();
    if !is_git_checkout(&source) {
        return Err(TaskError::precondition(format!(
            "a cloned source in {}",
            source.display()
        )));
    }
    Ok(BuildTools { cmake, visual_studio })
}

/// Run the whole pipeline, reporting each stage through `on_stage`.
pub fn run_build(
    workspace: &Workspace,
    config: &AppConfig,
    options: BuildOptions,
    ctx: &TaskContext,
    on_stage: impl Fn(BuildStage),
) -> TaskResult<BuildReport> {
    let tools = preflight(workspace, config)?;
    let mut tracker = BuildTracker::new(on_stage);
    let started = Instant::now();

    let result = run_stages(workspace, &tools, options, ctx, &mut tracker);
    match &result {
        Ok(_) => log_build(&format!(
            "Build finished in {} min",
            started.elapsed().as_secs() / 60
        )),
        Err(e) => {
            if tracker.stage() == BuildStage::Compiling && e.is_cancelled() {
                // /T on the tool PID misses nodes MSBuild detached
                if kill_processes_by_name(MSBUILD_IMAGE, true) {
                    log_warning("Killed leftover MSBuild processes");
                }
            }
            tracker.settle(e);
            log_error(&format!("Build stopped at {:?}: {}", tracker.stage(), e));
        }
    }

    result.map(|(solution, output_dir)| BuildReport {
        solution,
        output_dir,
        elapsed_secs: started.elapsed().as_secs(),
    })
}

fn run_stages(
    workspace: &Workspace,
    tools: &BuildTools,
    options: BuildOptions,
    ctx: &TaskContext,
    tracker: &mut BuildTracker<'_>,
) -> TaskResult<(PathBuf, PathBuf)> {
    let source = workspace.source_dir();
    let build = workspace.build_dir();

    // Configure
    check_cancelled(ctx)?;
    tracker.advance(BuildStage::Configuring)?;
    ctx.set_status("Configuring with CMake...");
    ctx.set_progress(0.0);
    std::fs::create_dir_all(&build)
        .map_err(|e| TaskError::io(format!("Creating {}", build.display()), e))?;
    let generator = generator_for(&tools.visual_studio);
    log_build(&format!("CMake generator: {}", generator));
    ToolCommand::new(&tools.cmake)
        .args(configure_args(&source, &build, generator, options.generate_extractors))
        .label("CMake")
        .timeout(CMAKE_TIMEOUT)
        .run(ctx)?
        .into_result("CMake configure")?;
    ctx.set_progress(CONFIGURED_MILESTONE);

    // Verify
    check_cancelled(ctx)?;
    let solution = solution_path(&build);
    if !solution.exists() {
        return Err(TaskError::precondition(format!(
            "{} (CMake reported success but produced no solution)",
            solution.display()
        )));
    }
    tracker.advance(BuildStage::Generated)?;
    ctx.set_progress(GENERATED_MILESTONE);

    // Compile
    check_cancelled(ctx)?;
    tracker.advance(BuildStage::Compiling)?;
    let msbuild = locate_msbuild().ok_or_else(|| TaskError::MissingTool {
        name: "MSBuild".into(),
    })?;
    ctx.set_status("Compiling (this takes a while)...");
    log_build(&format!("Using {}", msbuild.display()));
    ToolCommand::new(&msbuild)
        .args(msbuild_args(&solution))
        .current_dir(&build)
        .label("MSBuild")
        .timeout(MSBUILD_TIMEOUT)
        .run(ctx)?
        .into_result("MSBuild")?;

    tracker.advance(BuildStage::Done)?;
    ctx.set_progress(1.0);
    ctx.set_status("Build complete");
    Ok((solution, workspace.build_output_dir()))
}
