use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use cipherstudio_project::Project;
use cipherstudio_settings::{AppEvent, Preferences, ThemeKind};
use thiserror::Error;

use crate::compile::{CompileError, Compiler, StandaloneBabel};
use crate::document::{assemble, PreviewDocument, RuntimeAssets};
use crate::entry::{collect_stylesheets, select_entry, EntryRules};
use crate::rewrite::{RegexRewriter, SourceRewriter};
use crate::sandbox::{ExecutionContext, ExecutionError, RunTicket, SandboxPolicy};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("No file to preview")]
    NoEntry,
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Context(#[from] ExecutionError),
}

/// Where the pipeline is in a run.
/// 預覽管線目前所處的階段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewState {
    Idle,
    Compiling,
    /// The document was handed to the execution context and is loading.
    Running,
    /// Terminal until the next run; holds the message shown to the user.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    pub rules: EntryRules,
    pub load_timeout: Duration,
    pub assets: RuntimeAssets,
    pub compiler_url: String,
    pub policy: SandboxPolicy,
}

impl PreviewConfig {
    pub fn from_preferences(preferences: &Preferences) -> Self {
        Self {
            rules: EntryRules {
                source_extension: preferences.editor.source_extension.clone(),
                stylesheet_extension: preferences.editor.stylesheet_extension.clone(),
            },
            load_timeout: preferences.preview.load_timeout(),
            assets: RuntimeAssets {
                react_url: preferences.preview.react_url.clone(),
                react_dom_url: preferences.preview.react_dom_url.clone(),
            },
            compiler_url: preferences.preview.compiler_url.clone(),
            policy: SandboxPolicy::default(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self::from_preferences(&Preferences::default())
    }
}

/// Turns a project into a running preview and tracks the run's outcome.
/// 將專案轉為執行中的預覽並追蹤其結果。
///
/// Completion signals race the load timeout; whichever arrives first moves
/// the run back to [`PreviewState::Idle`] and the other is ignored. A new run
/// abandons the previous one, so signals carrying an older ticket are ignored
/// too. Theme changes are picked up at the start of the next run only.
#[derive(Debug)]
pub struct PreviewPipeline<R = RegexRewriter, C = StandaloneBabel> {
    config: PreviewConfig,
    rewriter: R,
    compiler: C,
    theme: ThemeKind,
    events: Option<Receiver<AppEvent>>,
    state: PreviewState,
    generation: u64,
    current: Option<RunTicket>,
    deadline: Option<Instant>,
    entry: Option<String>,
    document: Option<PreviewDocument>,
}

impl PreviewPipeline {
    /// Pipeline with the regex rewriter and the standalone Babel compiler.
    pub fn standard(config: PreviewConfig, theme: ThemeKind) -> Result<Self, regex::Error> {
        let compiler = StandaloneBabel::new(config.compiler_url.clone());
        Ok(Self::new(config, RegexRewriter::react()?, compiler, theme))
    }
}

impl<R: SourceRewriter, C: Compiler> PreviewPipeline<R, C> {
    pub fn new(config: PreviewConfig, rewriter: R, compiler: C, theme: ThemeKind) -> Self {
        Self {
            config,
            rewriter,
            compiler,
            theme,
            events: None,
            state: PreviewState::Idle,
            generation: 0,
            current: None,
            deadline: None,
            entry: None,
            document: None,
        }
    }

    /// Follows theme broadcasts from an app store subscription.
    pub fn listen(&mut self, events: Receiver<AppEvent>) {
        self.events = Some(events);
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PreviewState::Compiling | PreviewState::Running)
    }

    pub fn theme(&self) -> ThemeKind {
        self.theme
    }

    /// Theme for the next assembled document; a loaded preview keeps its own.
    pub fn set_theme(&mut self, theme: ThemeKind) {
        self.theme = theme;
    }

    pub fn current_ticket(&self) -> Option<RunTicket> {
        self.current
    }

    pub fn entry_name(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn last_document(&self) -> Option<&PreviewDocument> {
        self.document.as_ref()
    }

    /// Builds the document for `project` and loads it into `context`.
    /// 為專案組合預覽文件並載入執行環境。
    ///
    /// Failures are also recorded as [`PreviewState::Failed`]; the caller can
    /// display either.
    pub fn run(
        &mut self,
        project: &Project,
        context: &mut dyn ExecutionContext,
        now: Instant,
    ) -> Result<RunTicket, PreviewError> {
        self.drain_events();
        self.generation += 1;
        let ticket = RunTicket(self.generation);
        self.current = Some(ticket);
        self.deadline = None;
        self.entry = None;
        self.transition(PreviewState::Compiling);

        let document = match self.build(project) {
            Ok(document) => document,
            Err(err) => return Err(self.fail(err)),
        };
        if let Err(err) = context.load(&document, &self.config.policy, ticket) {
            return Err(self.fail(err.into()));
        }

        self.document = Some(document);
        self.deadline = Some(now + self.config.load_timeout);
        self.transition(PreviewState::Running);
        Ok(ticket)
    }

    /// The execution context finished loading the document for `ticket`.
    pub fn on_context_loaded(&mut self, ticket: RunTicket) -> bool {
        if self.current != Some(ticket) || self.state != PreviewState::Running {
            tracing::trace!(ticket = ticket.value(), "stale load signal ignored");
            return false;
        }
        self.deadline = None;
        self.transition(PreviewState::Idle);
        true
    }

    /// The host observed an error inside the document for `ticket`.
    pub fn on_context_error(&mut self, ticket: RunTicket, message: impl Into<String>) -> bool {
        let reportable = matches!(self.state, PreviewState::Running | PreviewState::Idle);
        if self.current != Some(ticket) || !reportable {
            return false;
        }
        self.deadline = None;
        self.transition(PreviewState::Failed(message.into()));
        true
    }

    /// Applies the load timeout; returns `true` when it fired.
    /// 套用載入逾時；逾時觸發時回傳 `true`。
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now && self.state == PreviewState::Running => {
                self.deadline = None;
                tracing::debug!(ticket = ?self.current.map(RunTicket::value), "preview load timed out");
                self.transition(PreviewState::Idle);
                true
            }
            _ => false,
        }
    }

    fn build(&mut self, project: &Project) -> Result<PreviewDocument, PreviewError> {
        let rules = &self.config.rules;
        let entry = select_entry(&project.files, project.entry_point.as_deref(), rules)
            .ok_or(PreviewError::NoEntry)?;
        self.entry = Some(entry.name.clone());
        tracing::debug!(project = %project.id, entry = %entry.name, theme = %self.theme, "compiling preview");

        let stylesheet = collect_stylesheets(&project.files, rules);
        let source = self.rewriter.rewrite(&entry.content);
        let compiled = self.compiler.compile(&entry.name, &source)?;
        Ok(assemble(&compiled, &stylesheet, self.theme, &self.config.assets))
    }

    fn fail(&mut self, err: PreviewError) -> PreviewError {
        tracing::warn!(error = %err, "preview failed");
        self.deadline = None;
        self.transition(PreviewState::Failed(err.to_string()));
        err
    }

    fn transition(&mut self, next: PreviewState) {
        tracing::trace!(from = ?self.state, to = ?next, "preview state");
        self.state = next;
    }

    fn drain_events(&mut self) {
        if let Some(events) = &self.events {
            for event in events.try_iter() {
                match event {
                    AppEvent::ThemeChanged(theme) => self.theme = theme,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompiledScript;
    use cipherstudio_project::FileNodeDraft;
    use cipherstudio_settings::AppStore;
    use cipherstudio_storage::MemoryStorage;

    #[derive(Default)]
    struct RecordingContext {
        loaded: Vec<(RunTicket, String)>,
        fail: bool,
    }

    impl ExecutionContext for RecordingContext {
        fn load(
            &mut self,
            document: &PreviewDocument,
            _policy: &SandboxPolicy,
            ticket: RunTicket,
        ) -> Result<(), ExecutionError> {
            if self.fail {
                return Err(ExecutionError::Unavailable("frame detached".into()));
            }
            self.loaded.push((ticket, document.html().to_string()));
            Ok(())
        }
    }

    struct RejectingCompiler;

    impl Compiler for RejectingCompiler {
        fn compile(&self, file_name: &str, _source: &str) -> Result<CompiledScript, CompileError> {
            Err(CompileError::Rejected {
                file: file_name.to_string(),
                message: "Unexpected token (1:7)".into(),
            })
        }
    }

    fn standard_pipeline() -> PreviewPipeline {
        PreviewPipeline::standard(PreviewConfig::default(), ThemeKind::Dark).unwrap()
    }

    #[test]
    fn successful_run_loads_and_completes() {
        let mut pipeline = standard_pipeline();
        let mut context = RecordingContext::default();
        let now = Instant::now();
        let ticket = pipeline.run(&Project::new_default(), &mut context, now).unwrap();

        assert_eq!(pipeline.state(), &PreviewState::Running);
        assert!(pipeline.is_loading());
        assert_eq!(pipeline.entry_name(), Some("App.tsx"));
        assert_eq!(context.loaded.len(), 1);
        assert!(context.loaded[0].1.contains("Babel.transform"));

        assert!(pipeline.on_context_loaded(ticket));
        assert_eq!(pipeline.state(), &PreviewState::Idle);
        assert!(!pipeline.poll(now + DEFAULT_LOAD_TIMEOUT));
        assert!(!pipeline.on_context_loaded(ticket));
    }

    #[test]
    fn timeout_clears_loading_when_no_signal_arrives() {
        let mut pipeline = standard_pipeline();
        let mut context = RecordingContext::default();
        let now = Instant::now();
        let ticket = pipeline.run(&Project::new_default(), &mut context, now).unwrap();

        assert!(!pipeline.poll(now + Duration::from_millis(2999)));
        assert!(pipeline.poll(now + DEFAULT_LOAD_TIMEOUT));
        assert_eq!(pipeline.state(), &PreviewState::Idle);
        assert!(!pipeline.on_context_loaded(ticket));
    }

    #[test]
    fn signals_from_an_abandoned_run_are_ignored() {
        let mut pipeline = standard_pipeline();
        let mut context = RecordingContext::default();
        let now = Instant::now();
        let project = Project::new_default();
        let first = pipeline.run(&project, &mut context, now).unwrap();
        let second = pipeline.run(&project, &mut context, now).unwrap();
        assert_ne!(first, second);

        assert!(!pipeline.on_context_loaded(first));
        assert_eq!(pipeline.state(), &PreviewState::Running);
        assert!(pipeline.on_context_loaded(second));
    }

    #[test]
    fn stylesheet_only_project_fails_without_loading() {
        let mut pipeline = standard_pipeline();
        let mut context = RecordingContext::default();
        let mut project = Project::new("styles");
        project.files = project
            .files
            .insert(None, FileNodeDraft::file("a.css", "body {}"))
            .0;

        let err = pipeline.run(&project, &mut context, Instant::now()).unwrap_err();
        assert!(matches!(err, PreviewError::NoEntry));
        assert_eq!(pipeline.state(), &PreviewState::Failed("No file to preview".into()));
        assert!(context.loaded.is_empty());
        assert!(!pipeline.is_loading());
    }

    #[test]
    fn compile_and_context_failures_are_reported_as_state() {
        let mut pipeline = PreviewPipeline::new(
            PreviewConfig::default(),
            RegexRewriter::react().unwrap(),
            RejectingCompiler,
            ThemeKind::Light,
        );
        let mut context = RecordingContext::default();
        let err = pipeline
            .run(&Project::new_default(), &mut context, Instant::now())
            .unwrap_err();
        assert!(matches!(err, PreviewError::Compile(_)));
        assert!(matches!(pipeline.state(), PreviewState::Failed(msg) if msg.contains("Unexpected token")));

        let mut pipeline = standard_pipeline();
        let mut broken = RecordingContext {
            fail: true,
            ..RecordingContext::default()
        };
        let err = pipeline
            .run(&Project::new_default(), &mut broken, Instant::now())
            .unwrap_err();
        assert!(matches!(err, PreviewError::Context(_)));
    }

    #[test]
    fn runtime_errors_reported_by_the_host_fail_the_run() {
        let mut pipeline = standard_pipeline();
        let mut context = RecordingContext::default();
        let ticket = pipeline
            .run(&Project::new_default(), &mut context, Instant::now())
            .unwrap();
        pipeline.on_context_loaded(ticket);
        assert!(pipeline.on_context_error(ticket, "App is not defined"));
        assert_eq!(pipeline.state(), &PreviewState::Failed("App is not defined".into()));
    }

    #[test]
    fn theme_broadcasts_apply_to_the_next_run_only() {
        let mut store = AppStore::new(MemoryStorage::new(), true);
        let mut pipeline = standard_pipeline();
        pipeline.listen(store.subscribe());
        let mut context = RecordingContext::default();
        let project = Project::new_default();

        pipeline.run(&project, &mut context, Instant::now()).unwrap();
        assert!(context.loaded[0].1.contains(r#"<html class="dark">"#));

        store.toggle_theme().unwrap();
        assert_eq!(pipeline.theme(), ThemeKind::Dark);
        assert_eq!(context.loaded.len(), 1);

        pipeline.run(&project, &mut context, Instant::now()).unwrap();
        assert_eq!(pipeline.theme(), ThemeKind::Light);
        assert!(context.loaded[1].1.contains(r#"<html class="light">"#));
    }
}
