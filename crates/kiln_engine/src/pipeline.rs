//! The incremental build pipeline.
//!
//! [`Pipeline`] coordinates one project's builds: it diffs the file tree
//! against persisted state, propagates changes through the recorded
//! dependency graph, and drives the staged toolchain (clean, resources,
//! compile, link, combine, package). Build state is persisted on every
//! exit path by a scoped guard, so an aborted run can never leave stale
//! state that the next build would trust.

use crate::cancel::CancelToken;
use crate::error::BuildError;
use crate::external::ToolSet;
use crate::fsops;
use crate::layout::VariantLayout;
use crate::session::{BuildSession, Stage};
use crate::tools::{
    Compiler, Eliminator, LinkMode, LinkRequest, Linker, ResourceAssembler, ToolInvocation,
};
use kiln_common::{BuildVariant, ContentHash};
use kiln_config::{
    config_fingerprint, resolve_profile, ProjectConfig, ProjectType, ResolvedProfile,
};
use kiln_deps::WorkspaceRegistry;
use kiln_diagnostics::{Diagnostic, DiagnosticSink};
use kiln_pack::{create_packager, PackError, PackageContext, Packager};
use kiln_state::{
    compute_diff, BuildResult, BuildState, BuildStateStore, FileSnapshot, TreeDiff,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Receives one-line progress messages as pipeline stages run.
pub trait BuildLog {
    /// Reports one progress line.
    fn line(&self, message: &str);
}

/// Writes progress lines to standard error.
pub struct ConsoleLog {
    quiet: bool,
}

impl ConsoleLog {
    /// Creates a console log; `quiet` suppresses all output.
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl BuildLog for ConsoleLog {
    fn line(&self, message: &str) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }
}

/// Discards all progress output.
pub struct SilentLog;

impl BuildLog for SilentLog {
    fn line(&self, _message: &str) {}
}

/// What one variant build produced.
#[derive(Debug)]
pub struct BuildReport {
    /// The outcome summary, as persisted in the variant's build state.
    pub result: BuildResult,
    /// Number of source files compiled.
    pub compiled: usize,
    /// Whether the build stopped early because it was canceled.
    pub canceled: bool,
    /// Every diagnostic emitted during the build.
    pub diagnostics: Vec<Diagnostic>,
    /// Projects that link this one and now need relinking. Populated when
    /// this build produced a fresh library artifact.
    pub dependents: Vec<String>,
}

/// Mutable bookkeeping threaded through the stages of one variant build.
#[derive(Default)]
struct StageFlow {
    artifact: Option<PathBuf>,
    compiled: usize,
    canceled: bool,
    assembled: bool,
    objects_affected: bool,
    relinked: bool,
    refresh: bool,
}

impl StageFlow {
    fn new() -> Self {
        Self {
            refresh: true,
            ..Default::default()
        }
    }
}

/// Read-only inputs shared by the stages of one variant build.
struct VariantContext<'a> {
    session: &'a BuildSession,
    variant: &'a BuildVariant,
    resolved: &'a ResolvedProfile,
    layout: &'a VariantLayout,
    current: &'a FileSnapshot,
    diff: Option<&'a TreeDiff>,
    packager: Option<&'a dyn Packager>,
    is_library: bool,
}

/// A dependency project's library artifact, resolved for one variant.
struct DependencyLib {
    name: String,
    dir: PathBuf,
    artifact: PathBuf,
}

/// Coordinates incremental builds of one project.
///
/// One pipeline serves one project directory. Each [`run`](Self::run)
/// executes a [`BuildSession`] across its variants. Configuration problems
/// (unknown profile or configuration, unknown packaging platform) abort
/// before any tool runs; everything that goes wrong mid-pipeline is folded
/// into that variant's failed [`BuildReport`] and the remaining variants
/// still build.
pub struct Pipeline<'a> {
    project_dir: PathBuf,
    config: &'a ProjectConfig,
    registry: &'a WorkspaceRegistry,
    store: BuildStateStore,
    tools: ToolSet,
    log: Box<dyn BuildLog>,
    cancel: CancelToken,
    resolve_packager: fn(&str) -> Result<Box<dyn Packager>, PackError>,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline with process-backed tools and console output.
    pub fn new(
        project_dir: &Path,
        config: &'a ProjectConfig,
        registry: &'a WorkspaceRegistry,
    ) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            config,
            registry,
            store: BuildStateStore::new(project_dir, env!("CARGO_PKG_VERSION")),
            tools: ToolSet::from_config(&config.toolchain, project_dir),
            log: Box::new(ConsoleLog::new(false)),
            cancel: CancelToken::new(),
            resolve_packager: create_packager,
        }
    }

    /// Replaces the toolchain implementations.
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Replaces the progress log.
    pub fn with_log(mut self, log: Box<dyn BuildLog>) -> Self {
        self.log = log;
        self
    }

    /// Shares a cancellation token with the caller.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the packager factory.
    pub fn with_packager_resolver(
        mut self,
        resolve: fn(&str) -> Result<Box<dyn Packager>, PackError>,
    ) -> Self {
        self.resolve_packager = resolve;
        self
    }

    /// Runs a build session, returning one report per variant built.
    pub fn run(&self, session: &BuildSession) -> Result<Vec<BuildReport>, BuildError> {
        self.registry.set_project_dependencies(
            &self.config.project.name,
            self.config.dependencies.keys().cloned(),
        );

        let mut reports = Vec::with_capacity(session.variants().len());
        for variant in session.variants() {
            reports.push(self.run_variant(session, variant)?);
            if self.cancel.is_canceled() {
                break;
            }
        }
        Ok(reports)
    }

    fn run_variant(
        &self,
        session: &BuildSession,
        variant: &BuildVariant,
    ) -> Result<BuildReport, BuildError> {
        // Step 1: resolve everything that can fail before a tool runs.
        let resolved =
            resolve_profile(self.config, &variant.profile, variant.config_id.as_deref())?;
        let fingerprint = config_fingerprint(self.config, &resolved)?;
        let is_library = self.config.project.project_type == ProjectType::Library;
        let packager = if session.is_requested(Stage::Package) && !is_library {
            Some((self.resolve_packager)(&resolved.platform)?)
        } else {
            None
        };

        self.log.line(&format!(
            "   Building {} v{} [{}]",
            self.config.project.name, self.config.project.version, variant
        ));

        // Step 2: load persisted state and decide incremental or full.
        let layout = VariantLayout::new(&self.project_dir, variant);
        let state = self.store.load_or_default(variant);
        let current = FileSnapshot::scan(&self.project_dir, &self.tracked_dirs());
        let clean_requested = session.is_requested(Stage::Clean);
        let diff = compute_diff(&state, &current, &fingerprint, clean_requested);

        // Step 3: run the stages under a guard that persists state on
        // every exit path.
        let sink = DiagnosticSink::new();
        let mut guard = FinalizeGuard::new(
            &self.store,
            state,
            self.config.policy.canceled_build_full_rebuild,
        );
        let mut flow = StageFlow::new();
        let ctx = VariantContext {
            session,
            variant,
            resolved: &resolved,
            layout: &layout,
            current: &current,
            diff: diff.as_ref(),
            packager: packager.as_deref(),
            is_library,
        };
        let failure = self
            .run_stages(&ctx, guard.state_mut(), &sink, &mut flow)
            .err();
        if let Some(e) = &failure {
            sink.emit(Diagnostic::error(e.to_string()));
        }

        // Step 4: summarize and finalize.
        let canceled = flow.canceled;
        let success = failure.is_none() && sink.error_count() == 0 && !canceled;
        let artifact = if success { flow.artifact.clone() } else { None };
        let result = BuildResult::now(variant.clone(), success, artifact, sink.error_count());
        let refresh = if success && flow.refresh {
            Some((current, fingerprint))
        } else {
            None
        };
        guard.complete(result.clone(), canceled, refresh);
        drop(guard);

        // Step 5: report which projects link this one, so the embedding
        // tool can queue relinks after a library rebuild.
        let dependents = if flow.relinked {
            self.registry
                .dependents_of(&[self.config.project.name.clone()])
        } else {
            Vec::new()
        };

        Ok(BuildReport {
            result,
            compiled: flow.compiled,
            canceled,
            diagnostics: sink.take_all(),
            dependents,
        })
    }

    fn run_stages(
        &self,
        ctx: &VariantContext<'_>,
        state: &mut BuildState,
        sink: &DiagnosticSink,
        flow: &mut StageFlow,
    ) -> Result<(), BuildError> {
        if ctx.session.is_requested(Stage::Clean) {
            self.clean(ctx, state)?;
        }
        if ctx.session.stages().is_clean_only() {
            flow.refresh = false;
            return Ok(());
        }

        if self.check_canceled(flow) {
            return Ok(());
        }
        if ctx.session.is_requested(Stage::BuildResources) {
            self.build_resources(ctx, sink, flow)?;
        }

        if self.check_canceled(flow) {
            return Ok(());
        }
        self.compile(ctx, state, sink, flow)?;
        if sink.has_errors() {
            // Linking a known-broken image helps nobody.
            return Ok(());
        }

        if self.check_canceled(flow) {
            return Ok(());
        }
        if self.link_needed(ctx, flow) {
            self.link(ctx, sink, flow)?;
        }
        self.combine(ctx, flow)?;

        if self.check_canceled(flow) {
            return Ok(());
        }
        if let Some(packager) = ctx.packager {
            self.package(ctx, packager, flow)?;
        }
        Ok(())
    }

    fn check_canceled(&self, flow: &mut StageFlow) -> bool {
        if self.cancel.is_canceled() {
            flow.canceled = true;
            return true;
        }
        false
    }

    fn clean(&self, ctx: &VariantContext<'_>, state: &mut BuildState) -> Result<(), BuildError> {
        self.log.line(&format!(
            "   Cleaning {}",
            ctx.layout.build_dir().display()
        ));
        ctx.layout.clean().map_err(|e| BuildError::Io {
            path: ctx.layout.build_dir().to_path_buf(),
            source: e,
        })?;
        state.snapshot = FileSnapshot::empty();
        state.dependencies.clear();
        state.config_fingerprint = None;
        Ok(())
    }

    fn build_resources(
        &self,
        ctx: &VariantContext<'_>,
        sink: &DiagnosticSink,
        flow: &mut StageFlow,
    ) -> Result<(), BuildError> {
        let resources = self.resource_files(ctx.current);
        let bundle = ctx.layout.resource_bundle();

        if resources.is_empty() {
            // A bundle lingering from since-deleted resources must not
            // combine into the artifact.
            if bundle.exists() {
                fsops::remove_file_if_exists(&bundle).map_err(|e| BuildError::Io {
                    path: bundle.clone(),
                    source: e,
                })?;
                flow.assembled = true;
            }
            return Ok(());
        }

        let needed = match ctx.diff {
            None => true,
            Some(diff) => {
                !bundle.exists()
                    || diff
                        .touched()
                        .iter()
                        .any(|path| self.is_resource(path))
            }
        };
        if !needed {
            return Ok(());
        }

        self.log
            .line(&format!(" Assembling {} resources", resources.len()));
        self.ensure_dir(ctx.layout.build_dir())?;
        self.tools
            .assembler
            .assemble(&resources, &bundle, ctx.diff, sink)?;
        flow.assembled = true;
        Ok(())
    }

    /// Compiles what the diff dirties plus everything the dependency graph
    /// says is affected, and drops objects of removed sources.
    fn compile(
        &self,
        ctx: &VariantContext<'_>,
        state: &mut BuildState,
        sink: &DiagnosticSink,
        flow: &mut StageFlow,
    ) -> Result<(), BuildError> {
        let sources = self.source_files(ctx.current);

        let (to_compile, removed) = match ctx.diff {
            None => {
                // Full rebuild: recorded edges and objects may belong to
                // sources that no longer exist, so start from nothing.
                state.dependencies.clear();
                let obj_dir = ctx.layout.obj_dir();
                fsops::remove_tree(&obj_dir).map_err(|e| BuildError::Io {
                    path: obj_dir,
                    source: e,
                })?;
                (sources.clone(), Vec::new())
            }
            Some(diff) => {
                let mut set: BTreeSet<PathBuf> = diff
                    .added
                    .iter()
                    .chain(diff.changed.iter())
                    .filter(|path| self.is_source(path))
                    .cloned()
                    .collect();
                for path in state.dependencies.dependents_of(&diff.touched()) {
                    if self.is_source(&path) && ctx.current.get(&path).is_some() {
                        set.insert(path);
                    }
                }
                let removed: Vec<PathBuf> = diff
                    .removed
                    .iter()
                    .filter(|path| self.is_source(path))
                    .cloned()
                    .collect();
                (set.into_iter().collect(), removed)
            }
        };

        for source in &removed {
            let object = ctx.layout.object_path(source);
            fsops::remove_file_if_exists(&object).map_err(|e| BuildError::Io {
                path: object.clone(),
                source: e,
            })?;
            state.dependencies.remove(source);
        }

        if to_compile.is_empty() {
            flow.objects_affected = !removed.is_empty();
            return Ok(());
        }

        self.log.line(&format!(
            "  Compiling {} of {} sources",
            to_compile.len(),
            sources.len()
        ));
        let obj_dir = ctx.layout.obj_dir();
        self.ensure_dir(&obj_dir)?;
        let options = ToolInvocation {
            flags: ctx.resolved.compiler_flags.clone(),
            defines: ctx.resolved.defines.clone(),
            runtime: ctx.resolved.runtime.clone(),
        };
        let output = self
            .tools
            .compiler
            .compile(&to_compile, &obj_dir, &options, sink)?;

        flow.compiled = output.object_files.len();
        flow.objects_affected = !output.object_files.is_empty() || !removed.is_empty();
        for (source, deps) in output.dependencies {
            state.dependencies.set_dependencies(source, deps);
        }
        Ok(())
    }

    /// The link decision: requested, and either objects moved, the artifact
    /// is missing, or a dependency library is newer than our last link.
    fn link_needed(&self, ctx: &VariantContext<'_>, flow: &StageFlow) -> bool {
        if !ctx.session.is_requested(Stage::Link) {
            return false;
        }
        if flow.objects_affected {
            return true;
        }
        let reference = self.link_reference(ctx);
        if !reference.exists() {
            return true;
        }
        self.dependency_libraries(ctx.variant)
            .iter()
            .any(|lib| fsops::newer_than(&lib.artifact, &reference))
    }

    /// The artifact whose age stands for "our last link".
    fn link_reference(&self, ctx: &VariantContext<'_>) -> PathBuf {
        if ctx.is_library {
            return ctx.layout.library(&self.config.project.name);
        }
        let combined = ctx.layout.combined();
        if combined.exists() {
            combined
        } else {
            ctx.layout.image()
        }
    }

    fn link(
        &self,
        ctx: &VariantContext<'_>,
        sink: &DiagnosticSink,
        flow: &mut StageFlow,
    ) -> Result<(), BuildError> {
        self.ensure_dir(ctx.layout.build_dir())?;
        let objects: Vec<PathBuf> = self
            .source_files(ctx.current)
            .iter()
            .map(|source| ctx.layout.object_path(source))
            .collect();

        if ctx.is_library {
            let output = ctx.layout.library(&self.config.project.name);
            self.log
                .line(&format!("    Linking {}", file_name(&output)));
            self.link_once(ctx, objects, LinkMode::Library, output, sink)?;
        } else if ctx.resolved.dead_code_elim {
            let listing = ctx.layout.ir_listing();
            self.log
                .line(&format!("    Linking {}", file_name(&listing)));
            self.link_once(ctx, objects, LinkMode::Intermediate, listing.clone(), sink)?;

            let trimmed = ctx.layout.eliminated_listing();
            self.log.line("Eliminating unused code");
            self.tools.eliminator.eliminate(&listing, &trimmed, sink)?;

            let image = ctx.layout.image();
            self.log.line(&format!("    Linking {}", file_name(&image)));
            self.link_once(ctx, vec![trimmed], LinkMode::Application, image, sink)?;
        } else {
            let image = ctx.layout.image();
            self.log.line(&format!("    Linking {}", file_name(&image)));
            self.link_once(ctx, objects.clone(), LinkMode::Application, image, sink)?;
            if ctx.resolved.ir_link_pass {
                self.link_once(
                    ctx,
                    objects,
                    LinkMode::Intermediate,
                    ctx.layout.ir_listing(),
                    sink,
                )?;
            }
        }
        flow.relinked = true;
        Ok(())
    }

    /// Runs one linker invocation. Application links carry the runtime and
    /// the dependency libraries; library and IR links carry neither.
    fn link_once(
        &self,
        ctx: &VariantContext<'_>,
        inputs: Vec<PathBuf>,
        mode: LinkMode,
        output: PathBuf,
        sink: &DiagnosticSink,
    ) -> Result<(), BuildError> {
        let (library_paths, libraries) = if mode == LinkMode::Application {
            let libs = self.dependency_libraries(ctx.variant);
            (
                libs.iter().map(|lib| lib.dir.clone()).collect(),
                libs.into_iter().map(|lib| lib.name).collect(),
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let request = LinkRequest {
            inputs,
            library_paths,
            libraries,
            mode,
            output,
            flags: ctx.resolved.linker_flags.clone(),
            runtime: if mode == LinkMode::Application {
                ctx.resolved.runtime.clone()
            } else {
                None
            },
        };
        self.tools.linker.link(&request, sink)
    }

    /// Concatenates the image and the resource bundle into the combined
    /// artifact, or settles on the image alone when there is no bundle.
    fn combine(&self, ctx: &VariantContext<'_>, flow: &mut StageFlow) -> Result<(), BuildError> {
        if ctx.is_library {
            let library = ctx.layout.library(&self.config.project.name);
            if library.exists() {
                flow.artifact = Some(library);
            }
            return Ok(());
        }

        let image = ctx.layout.image();
        if !image.exists() {
            return Ok(());
        }
        let bundle = ctx.layout.resource_bundle();
        let combined = ctx.layout.combined();

        if flow.relinked || flow.assembled {
            if bundle.exists() {
                self.log
                    .line(&format!("  Combining {}", file_name(&combined)));
                fsops::concat_files(&[&image, &bundle], &combined).map_err(|e| BuildError::Io {
                    path: combined.clone(),
                    source: e,
                })?;
                flow.artifact = Some(combined);
            } else {
                fsops::remove_file_if_exists(&combined).map_err(|e| BuildError::Io {
                    path: combined.clone(),
                    source: e,
                })?;
                flow.artifact = Some(image);
            }
            return Ok(());
        }

        // Nothing moved; report whichever artifact already stands.
        flow.artifact = Some(if combined.exists() { combined } else { image });
        Ok(())
    }

    fn package(
        &self,
        ctx: &VariantContext<'_>,
        packager: &dyn Packager,
        flow: &mut StageFlow,
    ) -> Result<(), BuildError> {
        let Some(input) = flow.artifact.clone() else {
            return Ok(());
        };
        let output_dir = ctx.layout.package_dir();
        self.ensure_dir(output_dir)?;
        self.log.line(&format!(
            "  Packaging {} for {}",
            self.config.project.name, ctx.resolved.platform
        ));

        let context = PackageContext {
            app_name: self.config.project.name.clone(),
            app_id: ctx.session.app_id(self.config.project.app_id.as_deref()),
            version: self.config.project.version.clone(),
            vendor: self.config.project.vendor.clone().unwrap_or_default(),
            variant: ctx.variant.clone(),
            parameters: ctx.resolved.pack_params.clone(),
            input_image: input,
            output_dir: output_dir.to_path_buf(),
        };
        let artifact = packager.create_package(&context)?;
        if !artifact.exists() {
            return Err(BuildError::ArtifactMissing { path: artifact });
        }
        flow.artifact = Some(artifact);
        Ok(())
    }

    /// Source and resource directories, deduplicated, for the tree scan.
    fn tracked_dirs(&self) -> Vec<String> {
        let mut dirs = self.config.build.source_dirs.clone();
        for dir in &self.config.build.resource_dirs {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    fn is_source(&self, path: &Path) -> bool {
        let under_source_dir = self
            .config
            .build
            .source_dirs
            .iter()
            .any(|dir| path.starts_with(dir));
        let extension_matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .build
                    .source_extensions
                    .iter()
                    .any(|known| known == ext)
            })
            .unwrap_or(false);
        under_source_dir && extension_matches
    }

    fn is_resource(&self, path: &Path) -> bool {
        self.config
            .build
            .resource_dirs
            .iter()
            .any(|dir| path.starts_with(dir))
    }

    fn source_files(&self, snapshot: &FileSnapshot) -> Vec<PathBuf> {
        snapshot
            .paths()
            .filter(|path| self.is_source(path))
            .cloned()
            .collect()
    }

    fn resource_files(&self, snapshot: &FileSnapshot) -> Vec<PathBuf> {
        snapshot
            .paths()
            .filter(|path| self.is_resource(path))
            .cloned()
            .collect()
    }

    /// Library artifacts of the configured dependency projects, located in
    /// each project's work tree for this variant.
    fn dependency_libraries(&self, variant: &BuildVariant) -> Vec<DependencyLib> {
        self.config
            .dependencies
            .iter()
            .map(|(name, spec)| {
                let dep_layout =
                    VariantLayout::new(&self.project_dir.join(spec.path()), variant);
                DependencyLib {
                    name: name.clone(),
                    dir: dep_layout.build_dir().to_path_buf(),
                    artifact: dep_layout.library(name),
                }
            })
            .collect()
    }

    fn ensure_dir(&self, dir: &Path) -> Result<(), BuildError> {
        std::fs::create_dir_all(dir).map_err(|e| BuildError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Persists build state on every exit path of a variant build.
///
/// Normal completion goes through [`complete`](Self::complete). If the
/// build aborts before that (a panic in a stage), `Drop` records a failed
/// result and forces a full rebuild, so the next build never trusts
/// whatever the broken run left behind.
struct FinalizeGuard<'a> {
    store: &'a BuildStateStore,
    state: BuildState,
    canceled_full_rebuild: bool,
    completed: bool,
}

impl<'a> FinalizeGuard<'a> {
    fn new(store: &'a BuildStateStore, state: BuildState, canceled_full_rebuild: bool) -> Self {
        Self {
            store,
            state,
            canceled_full_rebuild,
            completed: false,
        }
    }

    fn state_mut(&mut self) -> &mut BuildState {
        &mut self.state
    }

    fn complete(
        &mut self,
        result: BuildResult,
        canceled: bool,
        refresh: Option<(FileSnapshot, ContentHash)>,
    ) {
        if result.success {
            if let Some((snapshot, fingerprint)) = refresh {
                self.state.snapshot = snapshot;
                self.state.config_fingerprint = Some(fingerprint);
            }
            self.state.valid = true;
            self.state.full_rebuild_needed = false;
            if let Err(e) = self.store.clear_failure_marker(&result.variant) {
                eprintln!("warning: could not clear failure marker: {e}");
            }
        } else if canceled {
            // Not a failure: no marker, and the state stays as trustworthy
            // as it was. The policy decides whether the next build is full.
            if self.canceled_full_rebuild {
                self.state.full_rebuild_needed = true;
            }
        } else {
            self.state.invalidate();
            self.state.full_rebuild_needed = true;
            if let Err(e) = self.store.write_failure_marker(&result.variant) {
                eprintln!("warning: could not write failure marker: {e}");
            }
        }
        self.state.last_result = Some(result);
        self.persist();
        self.completed = true;
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            eprintln!("warning: could not persist build state: {e}");
        }
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let variant = self.state.variant.clone();
        self.state.invalidate();
        self.state.full_rebuild_needed = true;
        self.state.last_result = Some(BuildResult::now(variant.clone(), false, None, 0));
        if let Err(e) = self.store.write_failure_marker(&variant) {
            eprintln!("warning: could not write failure marker: {e}");
        }
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::load_config_from_str;
    use std::fs::File;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};

    const CONFIG: &str = r#"
[project]
name = "snake"
version = "1.0.0"

[profiles.handset]
platform = "flat"
"#;

    #[derive(Default)]
    struct ToolTrace {
        compiled: Vec<PathBuf>,
        assembled: usize,
        links: Vec<(LinkMode, PathBuf, Vec<PathBuf>)>,
        eliminated: usize,
    }

    type SharedTrace = Arc<Mutex<ToolTrace>>;

    struct FakeCompiler {
        trace: SharedTrace,
        fail_with_errors: bool,
        deps: Vec<(PathBuf, Vec<PathBuf>)>,
    }

    impl Compiler for FakeCompiler {
        fn compile(
            &self,
            sources: &[PathBuf],
            obj_dir: &Path,
            _options: &ToolInvocation,
            sink: &DiagnosticSink,
        ) -> Result<crate::tools::CompileOutput, BuildError> {
            let mut out = crate::tools::CompileOutput::default();
            for source in sources {
                self.trace.lock().unwrap().compiled.push(source.clone());
                if self.fail_with_errors {
                    sink.emit(Diagnostic::error("something broke").with_location(source.clone(), 1));
                    out.error_count += 1;
                    continue;
                }
                let object = obj_dir.join(crate::layout::object_file_name(source));
                std::fs::write(&object, b"obj").unwrap();
                out.object_files.push(object);
                let deps = self
                    .deps
                    .iter()
                    .find(|(s, _)| s == source)
                    .map(|(_, d)| d.clone())
                    .unwrap_or_default();
                out.dependencies.push((source.clone(), deps));
            }
            Ok(out)
        }
    }

    struct FakeAssembler {
        trace: SharedTrace,
    }

    impl ResourceAssembler for FakeAssembler {
        fn assemble(
            &self,
            resources: &[PathBuf],
            bundle: &Path,
            _diff: Option<&TreeDiff>,
            _sink: &DiagnosticSink,
        ) -> Result<Vec<PathBuf>, BuildError> {
            self.trace.lock().unwrap().assembled += 1;
            std::fs::write(bundle, b"RES").unwrap();
            Ok(resources.to_vec())
        }
    }

    struct FakeLinker {
        trace: SharedTrace,
    }

    impl Linker for FakeLinker {
        fn link(&self, request: &LinkRequest, _sink: &DiagnosticSink) -> Result<(), BuildError> {
            self.trace.lock().unwrap().links.push((
                request.mode,
                request.output.clone(),
                request.inputs.clone(),
            ));
            std::fs::write(&request.output, b"IMG").unwrap();
            Ok(())
        }
    }

    struct FailingLinker;

    impl Linker for FailingLinker {
        fn link(&self, _request: &LinkRequest, _sink: &DiagnosticSink) -> Result<(), BuildError> {
            Err(BuildError::ToolFailed {
                tool: "kiln-ld".to_string(),
                detail: "exit code 9".to_string(),
            })
        }
    }

    struct FakeEliminator {
        trace: SharedTrace,
    }

    impl Eliminator for FakeEliminator {
        fn eliminate(
            &self,
            _listing: &Path,
            output: &Path,
            _sink: &DiagnosticSink,
        ) -> Result<(), BuildError> {
            self.trace.lock().unwrap().eliminated += 1;
            std::fs::write(output, b"ELIM").unwrap();
            Ok(())
        }
    }

    fn fake_tools(trace: &SharedTrace) -> ToolSet {
        tools_with_compiler(
            trace,
            FakeCompiler {
                trace: Arc::clone(trace),
                fail_with_errors: false,
                deps: Vec::new(),
            },
        )
    }

    fn tools_with_compiler(trace: &SharedTrace, compiler: FakeCompiler) -> ToolSet {
        ToolSet {
            compiler: Box::new(compiler),
            assembler: Box::new(FakeAssembler {
                trace: Arc::clone(trace),
            }),
            linker: Box::new(FakeLinker {
                trace: Arc::clone(trace),
            }),
            eliminator: Box::new(FakeEliminator {
                trace: Arc::clone(trace),
            }),
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn project(toml: &str, files: &[(&str, &str)]) -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            write(dir.path(), rel, content);
        }
        (dir, load_config_from_str(toml).unwrap())
    }

    fn make_pipeline<'a>(
        dir: &Path,
        config: &'a ProjectConfig,
        registry: &'a WorkspaceRegistry,
        trace: &SharedTrace,
    ) -> Pipeline<'a> {
        Pipeline::new(dir, config, registry)
            .with_tools(fake_tools(trace))
            .with_log(Box::new(SilentLog))
    }

    fn variant() -> BuildVariant {
        BuildVariant::new("handset")
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn first_build_compiles_everything_and_packages() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/main.c", "int main() {}"),
                ("src/game.c", "void tick() {}"),
                ("res/icon.png", "png bytes"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();
        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);

        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!(report.result.success);
        assert_eq!(report.compiled, 2);
        assert!(!report.canceled);
        assert!(report.diagnostics.is_empty());

        {
            let t = trace.lock().unwrap();
            assert_eq!(t.compiled.len(), 2);
            assert_eq!(t.assembled, 1);
            assert_eq!(t.links.len(), 1);
        }

        // The combined artifact is image + bundle, and the flat packager
        // copied it next to a manifest.
        let combined = dir.path().join("build/handset/app.cmb");
        assert_eq!(std::fs::read(&combined).unwrap(), b"IMGRES");
        let artifact = report.result.artifact.clone().unwrap();
        assert_eq!(artifact, dir.path().join("build/handset/snake.img"));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"IMGRES");
        assert!(dir.path().join("build/handset/snake.json").exists());
    }

    #[test]
    fn unchanged_tree_builds_nothing() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/main.c", "int main() {}"),
                ("src/game.c", "void tick() {}"),
                ("res/icon.png", "png bytes"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        // First build does everything
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 2);
        }

        // Second build finds nothing to do but still reports the artifact
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(report.result.success);
            assert_eq!(report.compiled, 0);
            assert!(report.result.artifact.is_some());

            let t = trace.lock().unwrap();
            assert_eq!(t.compiled.len(), 2);
            assert_eq!(t.assembled, 1);
            assert_eq!(t.links.len(), 1);
        }
    }

    #[test]
    fn changed_file_recompiles_only_itself() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/main.c", "int main() {}"),
                ("src/game.c", "void tick() {}"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        write(dir.path(), "src/game.c", "void tick() { score++; }");
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 1);

            let t = trace.lock().unwrap();
            assert_eq!(t.compiled.last().unwrap(), Path::new("src/game.c"));
            // The link ran again because an object moved
            assert_eq!(t.links.len(), 2);
        }
    }

    #[test]
    fn header_change_recompiles_dependents() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/main.c", "#include \"game.h\"\nint main() {}"),
                ("src/game.c", "#include \"game.h\"\nvoid tick() {}"),
                ("src/util.c", "int helper() { return 7; }"),
                ("src/game.h", "#pragma once"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();
        let header_deps = vec![
            (
                PathBuf::from("src/main.c"),
                vec![PathBuf::from("src/game.h")],
            ),
            (
                PathBuf::from("src/game.c"),
                vec![PathBuf::from("src/game.h")],
            ),
        ];

        {
            let compiler = FakeCompiler {
                trace: Arc::clone(&trace),
                fail_with_errors: false,
                deps: header_deps.clone(),
            };
            let pipeline = Pipeline::new(dir.path(), &config, &registry)
                .with_tools(tools_with_compiler(&trace, compiler))
                .with_log(Box::new(SilentLog));
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 3);
        }

        // Touching the header recompiles its two readers, not util.c
        write(dir.path(), "src/game.h", "#pragma once\n#define SCORE 1");
        {
            let compiler = FakeCompiler {
                trace: Arc::clone(&trace),
                fail_with_errors: false,
                deps: header_deps,
            };
            let pipeline = Pipeline::new(dir.path(), &config, &registry)
                .with_tools(tools_with_compiler(&trace, compiler))
                .with_log(Box::new(SilentLog));
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 2);

            let t = trace.lock().unwrap();
            let recompiled: Vec<_> = t.compiled[3..].to_vec();
            assert!(recompiled.contains(&PathBuf::from("src/main.c")));
            assert!(recompiled.contains(&PathBuf::from("src/game.c")));
            assert!(!recompiled.contains(&PathBuf::from("src/util.c")));
        }
    }

    #[test]
    fn compile_errors_suppress_linking() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        // Broken compile: no link, no package, failure marker left behind
        {
            let compiler = FakeCompiler {
                trace: Arc::clone(&trace),
                fail_with_errors: true,
                deps: Vec::new(),
            };
            let pipeline = Pipeline::new(dir.path(), &config, &registry)
                .with_tools(tools_with_compiler(&trace, compiler))
                .with_log(Box::new(SilentLog));
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(!report.result.success);
            assert_eq!(report.result.error_count, 1);
            assert!(report.result.artifact.is_none());
            assert_eq!(report.diagnostics.len(), 1);
            assert!(trace.lock().unwrap().links.is_empty());
            assert!(dir.path().join(".kiln/state/handset/.failed").exists());
        }

        // Fixing the source gives a full rebuild and clears the marker
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert!(reports[0].result.success);
            assert_eq!(reports[0].compiled, 1);
            assert!(!dir.path().join(".kiln/state/handset/.failed").exists());
        }
    }

    #[test]
    fn linker_failure_fails_the_build() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();
        let mut tools = fake_tools(&trace);
        tools.linker = Box::new(FailingLinker);

        let pipeline = Pipeline::new(dir.path(), &config, &registry)
            .with_tools(tools)
            .with_log(Box::new(SilentLog));
        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        let report = &reports[0];
        assert!(!report.result.success);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.message.contains("exit code 9")));
        assert!(dir.path().join(".kiln/state/handset/.failed").exists());

        // The failed build forces the next one to recompile everything
        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        assert!(reports[0].result.success);
        assert_eq!(reports[0].compiled, 1);
    }

    #[test]
    fn dependency_library_mtime_forces_relink() {
        let toml = r#"
[project]
name = "snake"
version = "1.0.0"

[profiles.handset]
platform = "flat"

[dependencies]
geo = "deps/geo"
"#;
        let (dir, config) = project(toml, &[("src/main.c", "int main() {}")]);
        write(dir.path(), "deps/geo/build/handset/libgeo.ka", "LIB");
        let lib = dir.path().join("deps/geo/build/handset/libgeo.ka");
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(trace.lock().unwrap().links.len(), 1);
        }

        // Library older than our image: nothing to relink
        set_mtime(&lib, SystemTime::now() - Duration::from_secs(3600));
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 0);
            assert_eq!(trace.lock().unwrap().links.len(), 1);
        }

        // A freshly rebuilt library relinks us even with no source changes
        set_mtime(&lib, SystemTime::now() + Duration::from_secs(3600));
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 0);
            assert_eq!(trace.lock().unwrap().links.len(), 2);
        }
    }

    #[test]
    fn compile_only_then_default_build_links() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        // Compile-only: no link, no artifact, still a success
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::compile_only(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(report.result.success);
            assert_eq!(report.compiled, 1);
            assert!(report.result.artifact.is_none());
            assert!(trace.lock().unwrap().links.is_empty());
        }

        // The follow-up build compiles nothing but links the missing image
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(report.result.success);
            assert_eq!(report.compiled, 0);
            assert!(report.result.artifact.is_some());
            assert_eq!(trace.lock().unwrap().links.len(), 1);
        }
    }

    #[test]
    fn clean_only_resets_state() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert!(dir.path().join("build/handset").exists());
        }

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline.run(&BuildSession::clean_only(variant())).unwrap();
            assert!(reports[0].result.success);
            assert!(!dir.path().join("build/handset").exists());
        }

        // After a clean the next build is full again
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 1);
        }
    }

    #[test]
    fn clean_build_rebuilds_from_scratch() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        // clean-build wipes and recompiles even with no changes
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline.run(&BuildSession::clean_build(variant())).unwrap();
            assert!(reports[0].result.success);
            assert_eq!(reports[0].compiled, 1);
        }

        // and leaves trustworthy state behind
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 0);
        }
    }

    #[test]
    fn config_change_forces_full_rebuild() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/main.c", "int main() {}"),
                ("src/game.c", "void tick() {}"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        let changed = CONFIG.replace(
            "[profiles.handset]",
            "[toolchain]\ncompiler_flags = [\"-O2\"]\n\n[profiles.handset]",
        );
        let config2 = load_config_from_str(&changed).unwrap();
        {
            let pipeline = make_pipeline(dir.path(), &config2, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 2);
        }
    }

    #[test]
    fn full_rebuild_drops_edges_and_objects_of_removed_sources() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/old.c", "#include \"util.h\""),
                ("src/main.c", "int main() {}"),
                ("src/util.h", "#pragma once"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();
        let deps = vec![(
            PathBuf::from("src/old.c"),
            vec![PathBuf::from("src/util.h")],
        )];

        {
            let compiler = FakeCompiler {
                trace: Arc::clone(&trace),
                fail_with_errors: false,
                deps,
            };
            let pipeline = Pipeline::new(dir.path(), &config, &registry)
                .with_tools(tools_with_compiler(&trace, compiler))
                .with_log(Box::new(SilentLog));
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }
        let old_object = dir.path().join("build/handset/obj/src__old.c.o");
        assert!(old_object.exists());

        // Delete the source, then change a build-affecting setting so the
        // next build is a fingerprint-forced full rebuild rather than an
        // incremental diff that would report the removal.
        std::fs::remove_file(dir.path().join("src/old.c")).unwrap();
        let changed = CONFIG.replace(
            "[profiles.handset]",
            "[toolchain]\ncompiler_flags = [\"-O2\"]\n\n[profiles.handset]",
        );
        let config2 = load_config_from_str(&changed).unwrap();
        {
            let pipeline = make_pipeline(dir.path(), &config2, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert!(reports[0].result.success);
            assert_eq!(reports[0].compiled, 1);
        }

        // The deleted source leaves neither an object nor edges behind.
        assert!(!old_object.exists());
        let store = BuildStateStore::new(dir.path(), env!("CARGO_PKG_VERSION"));
        let state = store.load(&variant()).unwrap();
        assert!(state
            .dependencies
            .dependencies_of(&PathBuf::from("src/old.c"))
            .is_none());
    }

    #[test]
    fn unknown_platform_fails_before_any_work() {
        let toml = CONFIG.replace("platform = \"flat\"", "platform = \"vms\"");
        let (dir, config) = project(&toml, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
        let err = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap_err();
        assert!(matches!(err, BuildError::Pack(PackError::UnknownPlatform(_))));

        // Nothing ran and nothing was persisted
        assert!(trace.lock().unwrap().compiled.is_empty());
        assert!(!dir.path().join(".kiln").exists());
        assert!(!dir.path().join("build").exists());
    }

    #[derive(Debug)]
    struct VanishingPackager;

    impl Packager for VanishingPackager {
        fn platform(&self) -> &'static str {
            "flat"
        }

        fn create_package(&self, ctx: &PackageContext) -> Result<PathBuf, PackError> {
            Ok(ctx.output_dir.join("ghost.img"))
        }
    }

    fn vanishing_resolver(_platform: &str) -> Result<Box<dyn Packager>, PackError> {
        Ok(Box::new(VanishingPackager))
    }

    #[test]
    fn vanished_package_artifact_fails_the_build() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace)
            .with_packager_resolver(vanishing_resolver);
        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        let report = &reports[0];
        assert!(!report.result.success);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.message.contains("no artifact exists")));
        assert!(dir.path().join(".kiln/state/handset/.failed").exists());
    }

    #[test]
    fn canceled_build_forces_full_rebuild_by_default() {
        let (dir, config) = project(CONFIG, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        // A canceled run is not a failure: no marker, no error diagnostics
        {
            let cancel = CancelToken::new();
            cancel.cancel();
            let pipeline =
                make_pipeline(dir.path(), &config, &registry, &trace).with_cancel_token(cancel);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(report.canceled);
            assert!(!report.result.success);
            assert!(report.diagnostics.is_empty());
            assert!(!dir.path().join(".kiln/state/handset/.failed").exists());
        }

        // The default policy rebuilds everything after a cancel
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 1);
        }
    }

    #[test]
    fn canceled_build_policy_can_keep_increments() {
        let toml = format!("{CONFIG}\n[policy]\ncanceled_build_full_rebuild = false\n");
        let (dir, config) = project(&toml, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }
        {
            let cancel = CancelToken::new();
            cancel.cancel();
            let pipeline =
                make_pipeline(dir.path(), &config, &registry, &trace).with_cancel_token(cancel);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert!(reports[0].canceled);
        }
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 0);
        }
    }

    #[test]
    fn resource_change_recombines_without_recompiling() {
        let (dir, config) = project(
            CONFIG,
            &[("src/main.c", "int main() {}"), ("res/icon.png", "v1")],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        write(dir.path(), "res/icon.png", "v2, bigger");
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(report.result.success);
            assert_eq!(report.compiled, 0);

            let t = trace.lock().unwrap();
            assert_eq!(t.assembled, 2);
            assert_eq!(t.links.len(), 1);
        }
        // The combined artifact was rebuilt from the fresh bundle
        let combined = dir.path().join("build/handset/app.cmb");
        assert_eq!(std::fs::read(combined).unwrap(), b"IMGRES");
    }

    #[test]
    fn library_project_links_library_and_reports_dependents() {
        let toml = r#"
[project]
name = "geo"
version = "0.2.0"
type = "library"

[profiles.handset]
platform = "flat"
"#;
        let (dir, config) = project(toml, &[("src/vec.c", "int dot() { return 0; }")]);
        let registry = WorkspaceRegistry::new();
        registry.set_project_dependencies("snake", vec!["geo".to_string()]);
        let trace = SharedTrace::default();

        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        let report = &reports[0];
        assert!(report.result.success);
        assert_eq!(report.dependents, vec!["snake"]);

        let t = trace.lock().unwrap();
        assert_eq!(t.links.len(), 1);
        assert_eq!(t.links[0].0, LinkMode::Library);
        let library = dir.path().join("build/handset/libgeo.ka");
        assert_eq!(report.result.artifact.as_deref(), Some(library.as_path()));
        assert!(library.exists());
        // Libraries are never packaged, even with the package stage requested
        assert!(!dir.path().join("build/handset/geo.img").exists());
    }

    #[test]
    fn dead_code_elim_links_through_eliminator() {
        let toml = format!("{CONFIG}\n[build]\ndead_code_elim = true\n");
        let (dir, config) = project(
            &toml,
            &[
                ("src/main.c", "int main() {}"),
                ("src/unused.c", "void never() {}"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        assert!(reports[0].result.success);

        let t = trace.lock().unwrap();
        assert_eq!(t.eliminated, 1);
        assert_eq!(t.links.len(), 2);
        // First link produces the IR listing from all objects
        assert_eq!(t.links[0].0, LinkMode::Intermediate);
        assert_eq!(t.links[0].2.len(), 2);
        // Second link builds the image from the trimmed listing alone
        assert_eq!(t.links[1].0, LinkMode::Application);
        assert_eq!(
            t.links[1].2,
            vec![dir.path().join("build/handset/app.elim")]
        );
    }

    #[test]
    fn ir_link_pass_emits_listing_alongside_image() {
        let toml = CONFIG.replace(
            "platform = \"flat\"",
            "platform = \"flat\"\nir_link_pass = true",
        );
        let (dir, config) = project(&toml, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
        let reports = pipeline
            .run(&BuildSession::default_build(variant()))
            .unwrap();
        assert!(reports[0].result.success);

        let t = trace.lock().unwrap();
        assert_eq!(t.eliminated, 0);
        assert_eq!(t.links.len(), 2);
        assert_eq!(t.links[0].0, LinkMode::Application);
        assert_eq!(t.links[1].0, LinkMode::Intermediate);
        assert_eq!(
            t.links[1].1,
            dir.path().join("build/handset/app.ir")
        );
    }

    #[test]
    fn removed_source_drops_object_and_relinks() {
        let (dir, config) = project(
            CONFIG,
            &[
                ("src/main.c", "int main() {}"),
                ("src/game.c", "void tick() {}"),
            ],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        std::fs::remove_file(dir.path().join("src/game.c")).unwrap();
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            let report = &reports[0];
            assert!(report.result.success);
            assert_eq!(report.compiled, 0);

            let t = trace.lock().unwrap();
            assert_eq!(t.links.len(), 2);
            // The stale object is gone and only main's object was linked
            assert!(!dir
                .path()
                .join("build/handset/obj/src__game.c.o")
                .exists());
            assert_eq!(
                t.links[1].2,
                vec![dir.path().join("build/handset/obj/src__main.c.o")]
            );
        }
    }

    #[test]
    fn finalizer_build_packages_into_dist() {
        let (dir, config) = project(
            CONFIG,
            &[("src/main.c", "int main() {}"), ("res/icon.png", "png")],
        );
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        // Prime the normal variant so isolation can be observed
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
        }

        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let session = BuildSession::finalizer_build(vec![variant().as_finalizer()]);
            let reports = pipeline.run(&session).unwrap();
            let report = &reports[0];
            assert!(report.result.success);
            assert_eq!(report.compiled, 1);
            assert_eq!(
                report.result.artifact.as_deref(),
                Some(dir.path().join("dist/handset/snake.img").as_path())
            );
            assert!(dir.path().join("dist/handset/snake.json").exists());
            assert!(dir.path().join("build/handset-final").exists());
        }

        // The finalizer variant kept its own state; the normal one is intact
        {
            let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
            let reports = pipeline
                .run(&BuildSession::default_build(variant()))
                .unwrap();
            assert_eq!(reports[0].compiled, 0);
        }
    }

    #[test]
    fn generated_app_id_shared_across_variants() {
        let toml = r#"
[project]
name = "snake"
version = "1.0.0"

[profiles.handset]
platform = "flat"

[profiles.emulator]
platform = "flat"
"#;
        let (dir, config) = project(toml, &[("src/main.c", "int main() {}")]);
        let registry = WorkspaceRegistry::new();
        let trace = SharedTrace::default();

        let stages = crate::session::StageSet::new(&[
            Stage::BuildResources,
            Stage::Link,
            Stage::Package,
        ])
        .unwrap();
        let session = BuildSession::new(
            stages,
            vec![BuildVariant::new("handset"), BuildVariant::new("emulator")],
        );

        let pipeline = make_pipeline(dir.path(), &config, &registry, &trace);
        let reports = pipeline.run(&session).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.result.success));

        let manifest_id = |profile: &str| -> String {
            let path = dir.path().join(format!("build/{profile}/snake.json"));
            let manifest: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
            manifest["app_id"].as_str().unwrap().to_string()
        };
        let handset_id = manifest_id("handset");
        assert!(handset_id.starts_with("app-"));
        assert_eq!(handset_id, manifest_id("emulator"));
    }
}
