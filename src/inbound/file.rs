//! Polled file-system inbound endpoint.
//!
//! One instance per deployed `protocol="file"` inbound runs for the process
//! lifetime. Each poll tick launches a processing cycle; each cycle lists
//! matching files and dispatches them either sequentially or fanned out.
//! Cross-process coordination uses advisory `<path>.lock` sidecar files with
//! stale-lock reclamation; duplicate work inside one adapter is prevented by
//! an atomic in-processing set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fs::{FileSystem, file_uri_to_path, resolve_backend};
use super::InboundError;
use crate::artifacts::InboundDef;
use crate::artifacts::inbound::PROTOCOL_FILE;
use crate::lifecycle::{Lifecycle, WorkerTracker};
use crate::mediation::InboundMessageMediator;
use crate::message::{
    Message, MessageContext, PROP_ARTIFACT_NAME, PROP_CLIENT_API_NON_BLOCKING,
    PROP_INBOUND_ENDPOINT_NAME, PROP_IS_INBOUND,
};

const PARAM_INTERVAL: &str = "interval";
const PARAM_FILE_URI: &str = "transport.vfs.FileURI";
const PARAM_CONTENT_TYPE: &str = "transport.vfs.ContentType";
const PARAM_FILE_NAME_PATTERN: &str = "transport.vfs.FileNamePattern";
const PARAM_SEQUENTIAL: &str = "sequential";
const PARAM_COORDINATION: &str = "coordination";
const PARAM_LOCK_RELEASE_INTERVAL: &str = "transport.vfs.AutoLockReleaseInterval";

const LOCK_SUFFIX: &str = ".lock";
const DEFAULT_LOCK_RELEASE_MS: u64 = 20_000;

/// What to do with a file once its message has been dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    Delete,
    /// Destination directory URI; the file keeps its base name.
    Move(String),
}

/// Stale-lock reclamation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRelease {
    /// `AutoLockReleaseInterval = -1`: locks are never considered stale.
    Never,
    /// Locks older than this are reclaimed.
    After(Duration),
}

/// Validated adapter configuration.
///
/// Validation happens once, before polling begins; any violation aborts
/// startup of this adapter with a diagnostic.
#[derive(Debug, Clone)]
pub struct FileInboundSettings {
    pub interval: Duration,
    pub file_uri: String,
    pub content_type: String,
    pub pattern: Option<Regex>,
    pub sequential: bool,
    pub after_process: PostAction,
    pub after_failure: PostAction,
    pub lock_release: LockRelease,
}

impl FileInboundSettings {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, InboundError> {
        let interval_raw = required(params, PARAM_INTERVAL)?;
        let interval_ms: i64 =
            interval_raw
                .parse()
                .map_err(|_| InboundError::InvalidParameter {
                    name: PARAM_INTERVAL.to_string(),
                    value: interval_raw.clone(),
                    reason: "must be an integer".to_string(),
                })?;
        if interval_ms <= 0 {
            return Err(InboundError::InvalidParameter {
                name: PARAM_INTERVAL.to_string(),
                value: interval_raw,
                reason: "must be positive".to_string(),
            });
        }

        let sequential = optional_bool(params, PARAM_SEQUENTIAL)?.unwrap_or(false);
        // Validated for well-formedness; coordination beyond the advisory
        // lock files is out of scope.
        let _coordination = optional_bool(params, PARAM_COORDINATION)?.unwrap_or(false);

        let file_uri = required(params, PARAM_FILE_URI)?;
        let content_type = required(params, PARAM_CONTENT_TYPE)?;

        let pattern = match params.get(PARAM_FILE_NAME_PATTERN).filter(|v| !v.is_empty()) {
            Some(raw) => Some(Regex::new(raw).map_err(|err| InboundError::InvalidParameter {
                name: PARAM_FILE_NAME_PATTERN.to_string(),
                value: raw.clone(),
                reason: err.to_string(),
            })?),
            None => None,
        };

        let after_process = parse_action(params, "Process")?;
        let after_failure = parse_action(params, "Failure")?;

        let lock_release = match params.get(PARAM_LOCK_RELEASE_INTERVAL).filter(|v| !v.is_empty()) {
            None => LockRelease::After(Duration::from_millis(DEFAULT_LOCK_RELEASE_MS)),
            Some(raw) => {
                let ms: i64 = raw.parse().map_err(|_| InboundError::InvalidParameter {
                    name: PARAM_LOCK_RELEASE_INTERVAL.to_string(),
                    value: raw.clone(),
                    reason: "must be an integer".to_string(),
                })?;
                match ms {
                    -1 => LockRelease::Never,
                    ms if ms > 0 => LockRelease::After(Duration::from_millis(ms as u64)),
                    _ => {
                        return Err(InboundError::InvalidParameter {
                            name: PARAM_LOCK_RELEASE_INTERVAL.to_string(),
                            value: raw.clone(),
                            reason: "must be -1 or a positive integer".to_string(),
                        });
                    }
                }
            }
        };

        Ok(Self {
            interval: Duration::from_millis(interval_ms as u64),
            file_uri,
            content_type,
            pattern,
            sequential,
            after_process,
            after_failure,
            lock_release,
        })
    }
}

fn required(params: &HashMap<String, String>, name: &str) -> Result<String, InboundError> {
    params
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| InboundError::MissingParameter {
            name: name.to_string(),
        })
}

fn optional_bool(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<bool>, InboundError> {
    match params.get(name).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| InboundError::InvalidParameter {
                name: name.to_string(),
                value: raw.clone(),
                reason: "must be true/false".to_string(),
            }),
    }
}

fn parse_action(params: &HashMap<String, String>, suffix: &str) -> Result<PostAction, InboundError> {
    let action_key = format!("transport.vfs.ActionAfter{suffix}");
    match params.get(&action_key).map(String::as_str) {
        None | Some("") | Some("DELETE") => Ok(PostAction::Delete),
        Some("MOVE") => {
            let move_key = format!("transport.vfs.MoveAfter{suffix}");
            let dest = params
                .get(&move_key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or(InboundError::MissingParameter { name: move_key })?;
            Ok(PostAction::Move(dest))
        }
        Some(other) => Err(InboundError::InvalidParameter {
            name: action_key,
            value: other.to_string(),
            reason: "must be DELETE or MOVE".to_string(),
        }),
    }
}

/// The running adapter.
pub struct FileInbound {
    name: String,
    sequence_name: String,
    settings: FileInboundSettings,
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    in_processing: Arc<DashMap<PathBuf, ()>>,
    mediator: Arc<dyn InboundMessageMediator>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for FileInbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInbound")
            .field("name", &self.name)
            .field("sequence_name", &self.sequence_name)
            .field("settings", &self.settings)
            .field("fs", &self.fs)
            .field("root", &self.root)
            .field("in_processing", &self.in_processing)
            .field("mediator", &"<dyn InboundMessageMediator>")
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl FileInbound {
    pub fn new(
        def: &InboundDef,
        mediator: Arc<dyn InboundMessageMediator>,
        lifecycle: Lifecycle,
    ) -> Result<Arc<Self>, InboundError> {
        if def.protocol != PROTOCOL_FILE {
            return Err(InboundError::InvalidProtocol {
                expected: PROTOCOL_FILE,
                actual: def.protocol.clone(),
            });
        }
        let settings = FileInboundSettings::from_params(&def.parameters)?;
        let (fs, root) = resolve_backend(&settings.file_uri)?;

        Ok(Arc::new(Self {
            name: def.name.clone(),
            sequence_name: def.sequence.clone(),
            settings,
            fs,
            root,
            in_processing: Arc::new(DashMap::new()),
            mediator,
            lifecycle,
        }))
    }

    /// Run the polling loop until cancellation.
    ///
    /// Does not return until the poll loop has stopped and every dispatched
    /// per-file worker has completed (and released its lock).
    pub async fn start(self: Arc<Self>, token: CancellationToken) -> Result<(), InboundError> {
        if token.is_cancelled() {
            return Ok(());
        }

        info!(
            target: "flowgate::inbound::file",
            inbound = %self.name,
            dir = %self.root.display(),
            interval_ms = self.settings.interval.as_millis() as u64,
            sequential = self.settings.sequential,
            "starting file inbound endpoint"
        );

        self.poll(token).await;

        info!(
            target: "flowgate::inbound::file",
            inbound = %self.name,
            "file inbound endpoint stopped"
        );
        Ok(())
    }

    async fn poll(self: &Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let cycles = Arc::new(WorkerTracker::new());

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(
                        target: "flowgate::inbound::file",
                        inbound = %self.name,
                        "received shutdown signal, stopping file polling"
                    );
                    cycles.wait().await;
                    return;
                }
                _ = ticker.tick() => {
                    let cycle_guard = cycles.enter();
                    let worker_guard = self.lifecycle.track_worker();
                    let adapter = Arc::clone(self);
                    let cycle_token = token.clone();
                    tokio::spawn(async move {
                        let _cycle = cycle_guard;
                        let _worker = worker_guard;
                        if let Err(err) = adapter.processing_cycle(cycle_token).await {
                            error!(
                                target: "flowgate::inbound::file",
                                inbound = %adapter.name,
                                error = %err,
                                "error in processing cycle"
                            );
                        }
                    });
                }
            }
        }
    }

    async fn processing_cycle(self: &Arc<Self>, token: CancellationToken) -> Result<(), InboundError> {
        let files = self.list_files()?;
        self.process_files(token, files).await;
        Ok(())
    }

    /// Matching files in listing order. Sidecar lock files are never
    /// candidates.
    fn list_files(&self) -> Result<Vec<String>, InboundError> {
        let mut names: Vec<String> = self
            .fs
            .list_dir(&self.root)?
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.name)
            .filter(|name| !name.ends_with(LOCK_SUFFIX))
            .filter(|name| {
                self.settings
                    .pattern
                    .as_ref()
                    .map(|p| p.is_match(name))
                    .unwrap_or(true)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn process_files(self: &Arc<Self>, token: CancellationToken, files: Vec<String>) {
        let workers = Arc::new(WorkerTracker::new());

        for name in files {
            if token.is_cancelled() {
                info!(
                    target: "flowgate::inbound::file",
                    inbound = %self.name,
                    "cancelling remaining file processing"
                );
                break;
            }

            let path = self.root.join(&name);
            let claim = match self.claim(&path) {
                Some(claim) => claim,
                None => {
                    debug!(
                        target: "flowgate::inbound::file",
                        file = %path.display(),
                        "skipping file - already being processed"
                    );
                    continue;
                }
            };

            if self.settings.sequential {
                if let Err(err) = self.process_file(&path, token.clone()).await {
                    error!(
                        target: "flowgate::inbound::file",
                        file = %path.display(),
                        error = %err,
                        "failed to process file"
                    );
                }
                drop(claim);
            } else {
                let guard = workers.enter();
                let adapter = Arc::clone(self);
                let file_token = token.clone();
                tokio::spawn(async move {
                    let _worker = guard;
                    let _claim = claim;
                    if let Err(err) = adapter.process_file(&path, file_token).await {
                        error!(
                            target: "flowgate::inbound::file",
                            file = %path.display(),
                            error = %err,
                            "failed to process file"
                        );
                    }
                });
            }
        }

        workers.wait().await;
    }

    /// Atomic insert-if-absent into the in-processing set.
    fn claim(&self, path: &Path) -> Option<ClaimGuard> {
        use dashmap::mapref::entry::Entry;
        match self.in_processing.entry(path.to_path_buf()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(ClaimGuard {
                    set: Arc::clone(&self.in_processing),
                    key: path.to_path_buf(),
                })
            }
        }
    }

    async fn process_file(
        self: &Arc<Self>,
        path: &Path,
        token: CancellationToken,
    ) -> Result<(), InboundError> {
        let Some(_lock) = self.try_lock(path)? else {
            // Someone else owns the lock; nothing to do here.
            return Ok(());
        };

        let mut msg = self.read_message(path)?;

        if token.is_cancelled() {
            return Ok(());
        }

        match self
            .mediator
            .mediate_inbound(token.clone(), &self.sequence_name, &mut msg)
            .await
        {
            Ok(()) => self.apply_post_action(path, &self.settings.after_process)?,
            Err(err) => {
                warn!(
                    target: "flowgate::inbound::file",
                    file = %path.display(),
                    error = %err,
                    "mediation failed, applying failure action"
                );
                self.apply_post_action(path, &self.settings.after_failure)?;
            }
        }
        Ok(())
    }

    /// Advisory lock protocol: exclusively create `<path>.lock` carrying
    /// owner info; an existing lock older than the reclamation interval is
    /// deleted and the acquisition retried once.
    fn try_lock(&self, path: &Path) -> Result<Option<LockGuard>, InboundError> {
        let lock_path = lock_path_of(path);

        match self.fs.create_new(&lock_path, owner_info().as_bytes()) {
            Ok(()) => Ok(Some(self.lock_guard(lock_path))),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let LockRelease::After(stale_after) = self.settings.lock_release else {
                    return Ok(None);
                };

                let meta = match self.fs.stat(&lock_path) {
                    Ok(meta) => meta,
                    // The owner released between our create and stat.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return self.try_lock_once(&lock_path);
                    }
                    Err(err) => return Err(InboundError::Io(err)),
                };

                let age = meta
                    .modified
                    .elapsed()
                    .unwrap_or_else(|_| Duration::ZERO);
                if age > stale_after {
                    warn!(
                        target: "flowgate::inbound::file",
                        lock = %lock_path.display(),
                        age_ms = age.as_millis() as u64,
                        "reclaiming stale lock"
                    );
                    match self.fs.remove(&lock_path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => return Err(InboundError::Io(err)),
                    }
                    self.try_lock_once(&lock_path)
                } else {
                    Ok(None)
                }
            }
            Err(err) => Err(InboundError::Io(err)),
        }
    }

    fn try_lock_once(&self, lock_path: &Path) -> Result<Option<LockGuard>, InboundError> {
        match self.fs.create_new(lock_path, owner_info().as_bytes()) {
            Ok(()) => Ok(Some(self.lock_guard(lock_path.to_path_buf()))),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(InboundError::Io(err)),
        }
    }

    fn lock_guard(&self, lock_path: PathBuf) -> LockGuard {
        LockGuard {
            fs: Arc::clone(&self.fs),
            path: lock_path,
        }
    }

    /// Build the message context for one file: payload from its contents,
    /// metadata in the reserved headers, source flags in the properties.
    fn read_message(&self, path: &Path) -> Result<MessageContext, InboundError> {
        let meta = self.fs.stat(path)?;
        let content = self.fs.read(path)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let last_modified = meta
            .modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut msg = MessageContext {
            message: Message {
                raw_payload: content.into(),
                content_type: self.settings.content_type.clone(),
            },
            ..MessageContext::new()
        };

        msg.headers
            .insert("FILE_LENGTH".to_string(), meta.len.to_string());
        msg.headers
            .insert("LAST_MODIFIED".to_string(), last_modified.to_string());
        msg.headers
            .insert("FILE_URI".to_string(), self.file_uri_of(&file_name));
        msg.headers
            .insert("FILE_PATH".to_string(), path.display().to_string());
        msg.headers.insert("FILE_NAME".to_string(), file_name);

        msg.properties
            .insert(PROP_IS_INBOUND.to_string(), Value::String("true".to_string()));
        msg.properties.insert(
            PROP_ARTIFACT_NAME.to_string(),
            Value::String("inboundendpointfile".to_string()),
        );
        msg.properties.insert(
            PROP_INBOUND_ENDPOINT_NAME.to_string(),
            Value::String("file".to_string()),
        );
        msg.properties.insert(
            PROP_CLIENT_API_NON_BLOCKING.to_string(),
            Value::String("true".to_string()),
        );

        Ok(msg)
    }

    fn file_uri_of(&self, file_name: &str) -> String {
        format!(
            "{}/{}",
            self.settings.file_uri.trim_end_matches('/'),
            file_name
        )
    }

    fn apply_post_action(&self, path: &Path, action: &PostAction) -> Result<(), InboundError> {
        match action {
            PostAction::Delete => {
                self.fs.remove(path)?;
                info!(
                    target: "flowgate::inbound::file",
                    file = %path.display(),
                    "file deleted successfully"
                );
                Ok(())
            }
            PostAction::Move(dest_uri) => self.move_file(path, dest_uri),
        }
    }

    /// Move `source` into the destination directory, keeping its base name.
    /// Falls back to copy-then-remove when rename fails (e.g. across
    /// devices); permissions are replicated best-effort.
    fn move_file(&self, source: &Path, dest_uri: &str) -> Result<(), InboundError> {
        let dest_dir = file_uri_to_path(dest_uri)?;
        let file_name = source.file_name().ok_or_else(|| InboundError::InvalidUri {
            uri: source.display().to_string(),
            reason: "source has no file name".to_string(),
        })?;
        let dest = dest_dir.join(file_name);

        self.fs.mkdir_all(&dest_dir, 0o755)?;
        let source_meta = self.fs.stat(source)?;

        if let Err(rename_err) = self.fs.rename(source, &dest) {
            debug!(
                target: "flowgate::inbound::file",
                error = %rename_err,
                "rename failed, falling back to copy"
            );
            self.fs.copy(source, &dest)?;
            if let Err(err) = self.fs.remove(source) {
                warn!(
                    target: "flowgate::inbound::file",
                    file = %source.display(),
                    error = %err,
                    "failed to remove source file after copy"
                );
            }
        }

        if let Err(err) = self.fs.set_mode(&dest, source_meta.mode) {
            warn!(
                target: "flowgate::inbound::file",
                file = %dest.display(),
                error = %err,
                "failed to replicate permissions"
            );
        }

        info!(
            target: "flowgate::inbound::file",
            from = %source.display(),
            to = %dest.display(),
            "file moved successfully"
        );
        Ok(())
    }
}

fn lock_path_of(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(LOCK_SUFFIX);
    PathBuf::from(os_string)
}

fn owner_info() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    format!(
        "pid:{}\nhost:{}\ntime:{}\n",
        std::process::id(),
        host,
        chrono::Utc::now().to_rfc3339()
    )
}

/// Removes the in-processing entry on every exit path.
struct ClaimGuard {
    set: Arc<DashMap<PathBuf, ()>>,
    key: PathBuf,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Deletes the sidecar lock file on every exit path.
struct LockGuard {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.fs.remove(&self.path);
    }
}
