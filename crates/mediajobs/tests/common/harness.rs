//! Test harness for isolated conversion runs.
//!
//! The `TestHarness` owns a temp directory with media storage and scratch
//! space, an in-memory job database, a set of in-memory targets and a
//! scripted transcoder that writes small placeholder files.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use tempfile::TempDir;

use mediajobs::availability::{AvailabilityHook, ConversionTarget, ConvertedFlag, TargetRegistry};
use mediajobs::error::{TargetError, TranscodeError};
use mediajobs::jobs::{Job, JobEventBroadcaster, JobLedger, MediaKind, TargetRef};
use mediajobs::storage::{FileSystemStorage, MediaStorage};
use mediajobs::worker::{
    ConversionRequest, Dispatcher, QueuedTask, RunnerRegistry, StageRequest, TaskExecutor,
    TaskHandle, TaskOutcome, TaskSubmitter, Transcoder,
};
use mediajobs::{Config, Database, WorkerError};

/// A domain object kept in memory.
#[derive(Default)]
pub struct MemoryTarget {
    pub kind: String,
    pub id: String,
    pub fields: Mutex<HashMap<String, String>>,
    pub converted: AtomicBool,
    pub fired: AtomicBool,
    pub fire_count: AtomicUsize,
}

impl MemoryTarget {
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.lock().unwrap().get(name).cloned()
    }

    pub fn is_converted(&self) -> bool {
        self.converted.load(Ordering::SeqCst)
    }

    pub fn fire_count(&self) -> usize {
        self.fire_count.load(Ordering::SeqCst)
    }
}

impl ConvertedFlag for MemoryTarget {
    fn is_converted(&self) -> bool {
        self.converted.load(Ordering::SeqCst)
    }

    fn set_converted(&self, converted: bool) -> Result<(), TargetError> {
        self.converted.store(converted, Ordering::SeqCst);
        Ok(())
    }
}

impl AvailabilityHook for MemoryTarget {
    fn is_available(&self) -> bool {
        true
    }

    fn on_available(&self) -> Result<(), TargetError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.fire_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl ConversionTarget for MemoryTarget {
    fn target_ref(&self) -> TargetRef {
        TargetRef::new(&self.kind, &self.id)
    }

    fn attach_media(&self, field: &str, relative_path: &str) -> Result<Vec<String>, TargetError> {
        self.fields
            .lock()
            .unwrap()
            .insert(field.to_string(), relative_path.to_string());
        Ok(vec![field.to_string()])
    }

    fn converted_flag(&self) -> Option<&dyn ConvertedFlag> {
        Some(self)
    }

    fn availability(&self) -> Option<&dyn AvailabilityHook> {
        Some(self)
    }
}

/// Targets shared between the harness and the registry resolvers.
#[derive(Default, Clone)]
pub struct TargetStore {
    targets: Arc<Mutex<HashMap<TargetRef, Arc<MemoryTarget>>>>,
}

impl TargetStore {
    pub fn insert(&self, kind: &str, id: &str) -> Arc<MemoryTarget> {
        let target = Arc::new(MemoryTarget {
            kind: kind.to_string(),
            id: id.to_string(),
            ..MemoryTarget::default()
        });
        self.targets
            .lock()
            .unwrap()
            .insert(TargetRef::new(kind, id), Arc::clone(&target));
        target
    }

    pub fn remove(&self, target: &TargetRef) {
        self.targets.lock().unwrap().remove(target);
    }

    pub fn registry(&self, kinds: &[&str]) -> TargetRegistry {
        let mut registry = TargetRegistry::new();
        for kind in kinds {
            let store = self.clone();
            let kind_name = kind.to_string();
            registry.register(
                *kind,
                move |id: &str| -> Result<Arc<dyn ConversionTarget>, TargetError> {
                    store
                        .targets
                        .lock()
                        .unwrap()
                        .get(&TargetRef::new(&kind_name, id))
                        .cloned()
                        .map(|t| t as Arc<dyn ConversionTarget>)
                        .ok_or_else(|| TargetError::NotFound {
                            kind: kind_name.clone(),
                            id: id.to_string(),
                        })
                },
            );
        }
        registry
    }
}

type StageHook = Box<dyn Fn(&str) + Send + Sync>;

/// Codec double that writes placeholder files named after the stage.
#[derive(Default)]
pub struct ScriptedTranscoder {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    empty: Mutex<HashSet<String>>,
    on_stage: Mutex<Option<StageHook>>,
}

impl ScriptedTranscoder {
    pub fn fail_stage(&self, stage: &str) {
        self.failing.lock().unwrap().insert(stage.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.empty.lock().unwrap().clear();
    }

    pub fn produce_nothing(&self, stage: &str) {
        self.empty.lock().unwrap().insert(stage.to_string());
    }

    /// Runs `hook` before each stage executes.
    pub fn on_stage(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_stage.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn files_for(request: &StageRequest<'_>) -> Vec<(String, &'static [u8])> {
        let playlist: &'static [u8] = b"#EXTM3U\n";
        match (request.kind, request.stage) {
            (_, "thumbnail") => vec![("poster.jpg".to_string(), &b"jpeg"[..])],
            (MediaKind::Video, "finalize") => vec![("master.m3u8".to_string(), playlist)],
            (MediaKind::Video, rendition) => vec![
                (format!("{}.m3u8", rendition), playlist),
                (format!("{}_000.ts", rendition), &b"ts"[..]),
            ],
            (MediaKind::Image, _) => vec![("image.webp".to_string(), &b"webp"[..])],
            (MediaKind::Audio, _) => vec![("audio.m4a".to_string(), &b"m4a"[..])],
        }
    }
}

impl Transcoder for ScriptedTranscoder {
    fn run_stage(
        &self,
        request: &StageRequest<'_>,
        progress: &dyn Fn(f64),
    ) -> Result<Vec<PathBuf>, TranscodeError> {
        self.calls.lock().unwrap().push(request.stage.to_string());
        if let Some(hook) = self.on_stage.lock().unwrap().as_ref() {
            hook(request.stage);
        }
        if self.failing.lock().unwrap().contains(request.stage) {
            return Err(TranscodeError::Codec {
                stage: request.stage.to_string(),
                message: "encoder exited with status 1".to_string(),
            });
        }
        if self.empty.lock().unwrap().contains(request.stage) {
            return Ok(Vec::new());
        }

        progress(0.5);
        let mut written = Vec::new();
        for (name, bytes) in Self::files_for(request) {
            let path = request.work_dir.join(name);
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
        progress(1.0);
        Ok(written)
    }
}

/// Test harness providing an isolated conversion environment.
pub struct TestHarness {
    temp_dir: TempDir,
    pub storage_root: PathBuf,
    pub work_root: PathBuf,
    pub config: Config,
    pub ledger: JobLedger,
    pub events: JobEventBroadcaster,
    pub storage: Arc<FileSystemStorage>,
    pub targets: TargetStore,
    pub registry: Arc<TargetRegistry>,
    pub transcoder: Arc<ScriptedTranscoder>,
    pub executor: Arc<TaskExecutor>,
    dispatcher: Dispatcher,
    queue: Receiver<QueuedTask>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage_root = temp_dir.path().join("media");
        let work_root = temp_dir.path().join("work");
        std::fs::create_dir_all(&storage_root).expect("Failed to create storage root");

        let mut config = Config::new(storage_root.to_string_lossy());
        config.worker_count = 1;
        adjust(&mut config);

        let events = JobEventBroadcaster::default();
        let ledger = JobLedger::with_events(
            Database::open_in_memory().expect("Failed to open database"),
            events.clone(),
        );
        let storage = Arc::new(FileSystemStorage::new(&storage_root));
        let targets = TargetStore::default();
        let registry = Arc::new(targets.registry(&["post", "track"]));
        let transcoder = Arc::new(ScriptedTranscoder::default());

        let executor = Arc::new(TaskExecutor::new(
            ledger.clone(),
            Arc::clone(&storage) as Arc<dyn MediaStorage>,
            Arc::clone(&registry),
            RunnerRegistry::with_defaults(Arc::clone(&transcoder) as Arc<dyn Transcoder>),
            &work_root,
        ));

        let (sender, queue) = crossbeam_channel::unbounded();
        let dispatcher = Dispatcher::new(ledger.clone(), TaskSubmitter::for_channel(sender), &config);

        Self {
            temp_dir,
            storage_root,
            work_root,
            config,
            ledger,
            events,
            storage,
            targets,
            registry,
            transcoder,
            executor,
            dispatcher,
            queue,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Writes an upload into storage and returns its relative path.
    pub fn write_upload(&self, name: &str, content: &[u8]) -> String {
        let dir = self.storage_root.join("uploads");
        std::fs::create_dir_all(&dir).expect("Failed to create uploads dir");
        std::fs::write(dir.join(name), content).expect("Failed to write upload");
        format!("uploads/{}", name)
    }

    pub fn enqueue(&self, request: ConversionRequest) -> Result<TaskHandle, WorkerError> {
        self.dispatcher.enqueue(request)
    }

    /// Pops the next queued task without running it.
    pub fn next_task(&self) -> Option<QueuedTask> {
        self.queue.try_recv().ok()
    }

    /// Runs every queued task on the calling thread.
    pub fn drain(&self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Some(task) = self.next_task() {
            outcomes.push(self.executor.execute(&task));
        }
        outcomes
    }

    /// Enqueues `request` and runs it to completion.
    pub fn convert(&self, request: ConversionRequest) -> (TaskHandle, TaskOutcome) {
        let handle = self.enqueue(request).expect("enqueue failed");
        let task = self.next_task().expect("no task queued");
        assert_eq!(task.job_id, handle.job_id);
        let outcome = self.executor.execute(&task);
        (handle, outcome)
    }

    pub fn job(&self, job_id: &str) -> Job {
        self.ledger.get(job_id).expect("job not found")
    }

    pub fn stored(&self, relative_path: &str) -> bool {
        self.storage.exists(relative_path)
    }
}
