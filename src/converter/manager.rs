use std::any::Any;
use std::cell::Cell;
use std::fs::{self, File};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use thiserror::Error;

use super::engine::{ConversionOutput, ConvertError, ConverterFactory, ConverterOptions, StreamInfo};
use super::progress::ConversionProgress;
use crate::notifications::Notifier;

const LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;
const SOURCE: &str = "conversion";

pub type ProgressCallback = Arc<dyn Fn(&ConversionProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionParameters {
    pub extension: Option<String>,
    pub mimetype: Option<String>,
    pub charset: Option<String>,
    pub enable_plugins: bool,
    pub keep_data_uris: bool,
    pub docintel_endpoint: Option<String>,
}

impl Default for ConversionParameters {
    fn default() -> Self {
        Self {
            extension: None,
            mimetype: None,
            charset: None,
            enable_plugins: true,
            keep_data_uris: false,
            docintel_endpoint: None,
        }
    }
}

/// Reasons `convert` refuses to start.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("File path must be provided")]
    EmptyPath,
    #[error("Conversion already in progress")]
    AlreadyInProgress,
    #[error("failed to start conversion worker: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Default)]
struct Shared {
    progress: ConversionProgress,
    result: Option<ConversionOutput>,
    callback: Option<ProgressCallback>,
}

type SharedState = Arc<Mutex<Shared>>;

fn lock(shared: &SharedState) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the in-flight flag exactly once: on the final publish, or on drop
/// when the worker never got that far.
struct InFlight {
    flag: Arc<AtomicBool>,
    released: Cell<bool>,
}

impl InFlight {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            released: Cell::new(false),
        }
    }

    fn release(&self) {
        if !self.released.replace(true) {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs one conversion at a time on a background thread.
pub struct ConverterManager {
    factory: Arc<dyn ConverterFactory>,
    notifier: Notifier,
    shared: SharedState,
    in_flight: Arc<AtomicBool>,
}

impl ConverterManager {
    pub fn new(factory: Arc<dyn ConverterFactory>, notifier: Notifier) -> Self {
        Self {
            factory,
            notifier,
            shared: Arc::new(Mutex::new(Shared::default())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_progress_callback(&self, callback: ProgressCallback) {
        lock(&self.shared).callback = Some(callback);
    }

    /// Start converting `path`. Fails without spawning anything when the path
    /// is empty or another conversion is still running.
    pub fn convert(
        &self,
        path: impl AsRef<Path>,
        parameters: ConversionParameters,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<(), ConversionError> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(ConversionError::EmptyPath);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ConversionError::AlreadyInProgress);
        }

        {
            let mut shared = lock(&self.shared);
            shared.progress = ConversionProgress::new();
            shared.result = None;
            if progress_callback.is_some() {
                shared.callback = progress_callback;
            }
        }

        let worker = Worker {
            factory: Arc::clone(&self.factory),
            notifier: self.notifier.clone(),
            shared: Arc::clone(&self.shared),
            in_flight: InFlight::new(Arc::clone(&self.in_flight)),
            path,
            parameters,
        };
        tracing::info!(path = %worker.path.display(), "starting conversion");

        thread::Builder::new()
            .name("conversion".to_string())
            .spawn(move || worker.run())
            .map(|_| ())
            // On spawn failure the worker, and its flag guard, drop with the closure.
            .map_err(ConversionError::Spawn)
    }

    pub fn get_result(&self) -> Option<ConversionOutput> {
        lock(&self.shared).result.clone()
    }

    pub fn get_progress(&self) -> ConversionProgress {
        lock(&self.shared).progress.clone()
    }

    pub fn is_converting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn validate_file(&self, path: &Path) -> (bool, String) {
        validate_file(path)
    }

    pub fn validate_parameters(&self, parameters: &ConversionParameters) -> (bool, String) {
        validate_parameters(parameters)
    }
}

pub fn validate_file(path: &Path) -> (bool, String) {
    if path.as_os_str().is_empty() {
        return (false, "No file selected".to_string());
    }
    let shown = path.display();
    if !path.exists() {
        return (false, format!("File not found: {shown}"));
    }
    if !path.is_file() {
        return (false, format!("Not a file: {shown}"));
    }
    if File::open(path).is_err() {
        return (false, format!("File not readable: {shown}"));
    }
    (true, String::new())
}

pub fn validate_parameters(parameters: &ConversionParameters) -> (bool, String) {
    let endpoint = parameters.docintel_endpoint.as_deref().unwrap_or_default();
    if !endpoint.is_empty() && !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return (false, "Document Intelligence endpoint must be a valid URL".to_string());
    }
    (true, String::new())
}

/// User-facing text for a backend failure.
pub fn failure_message(error: &ConvertError) -> String {
    match error {
        ConvertError::NoConverterMatched { attempts: 0 } => {
            "Unable to convert file format. No suitable converter found for this file.".to_string()
        }
        ConvertError::NoConverterMatched { attempts } => {
            format!("Unable to convert file format. Tried {attempts} converters, but none succeeded.")
        }
        ConvertError::Library(message) => message.clone(),
        ConvertError::Io(e) => format!("Unexpected error: {e}"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

struct Worker {
    factory: Arc<dyn ConverterFactory>,
    notifier: Notifier,
    shared: SharedState,
    in_flight: InFlight,
    path: PathBuf,
    parameters: ConversionParameters,
}

impl Worker {
    fn run(self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.stages()));
        let message = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => failure_message(&e),
            Err(payload) => format!("Unexpected error: {}", panic_message(payload)),
        };
        tracing::error!(path = %self.path.display(), notify = false, "conversion failed: {message}");
        self.notifier.add_error(message.as_str(), None, None, Some(SOURCE));
        self.finish(|p| p.error(message));
    }

    fn stages(&self) -> Result<(), ConvertError> {
        let params = &self.parameters;
        self.stage("Initializing conversion...", 0.1);

        let options = ConverterOptions {
            enable_plugins: params.enable_plugins,
            docintel_endpoint: params.docintel_endpoint.clone().filter(|e| !e.is_empty()),
        };
        let converter = self.factory.create(&options)?;
        self.stage("Analyzing file...", 0.2);

        let stream_info = StreamInfo::from_hints(
            params.extension.clone(),
            params.mimetype.clone(),
            params.charset.clone(),
        );

        let size = fs::metadata(&self.path)?.len();
        if size > LARGE_FILE_BYTES {
            let mb = size as f64 / 1024.0 / 1024.0;
            self.stage(&format!("Processing large file ({mb:.1} MB)..."), 0.3);
        }

        self.stage("Converting...", 0.4);
        let output = converter.convert(&self.path, stream_info.as_ref(), params.keep_data_uris)?;

        let warnings = output.warnings.clone();
        for warning in &warnings {
            self.notifier.add_warning(warning.as_str(), None, None, Some(SOURCE));
        }
        let characters = output.markdown.chars().count();
        tracing::info!(backend = converter.name(), characters, "conversion complete");

        lock(&self.shared).result = Some(output);
        self.finish(|p| {
            for warning in warnings {
                p.add_warning(warning);
            }
            let status = p.with_counts(&format!("Conversion complete: {characters} characters"));
            p.complete(status);
        });
        Ok(())
    }

    fn stage(&self, status: &str, fraction: f32) {
        self.publish(|p| {
            let status = p.with_counts(status);
            p.update(status, Some(fraction));
        });
    }

    /// Mutate the progress record, then hand a snapshot to the callback
    /// outside the lock.
    fn publish(&self, change: impl FnOnce(&mut ConversionProgress)) {
        let (snapshot, callback) = {
            let mut shared = lock(&self.shared);
            change(&mut shared.progress);
            (shared.progress.clone(), shared.callback.clone())
        };
        if let Some(callback) = callback {
            callback(&snapshot);
        }
    }

    /// Terminal publish. The flag clears while the lock is held, so the
    /// callback sees an idle manager and a follow-up `convert` cannot reset
    /// progress before this state lands.
    fn finish(&self, change: impl FnOnce(&mut ConversionProgress)) {
        let (snapshot, callback) = {
            let mut shared = lock(&self.shared);
            change(&mut shared.progress);
            self.in_flight.release();
            (shared.progress.clone(), shared.callback.clone())
        };
        if let Some(callback) = callback {
            callback(&snapshot);
        }
    }
}
