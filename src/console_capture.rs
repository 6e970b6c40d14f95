//! Tee for the process console streams.
//!
//! Every byte written through a [`CapturedWriter`] reaches the underlying
//! stream unchanged. While capture is started, complete lines are also
//! classified against an ordered rule list and warnings or errors are raised
//! as notifications. A capture built with [`ConsoleCapture::new`] also takes
//! over the process stdout and stderr descriptors on unix, so `println!`
//! and native library output are classified as well.

mod fd_redirect;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use regex::{Regex, RegexBuilder};

use self::fd_redirect::FdRedirect;
use crate::logging::CONSOLE_TARGET;
use crate::notifications::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn source(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "console_stdout",
            StreamKind::Stderr => "console_stderr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Ignore,
    Error,
    Warning,
    Info,
}

impl LineClass {
    fn rank(&self) -> u8 {
        match self {
            LineClass::Ignore => 0,
            LineClass::Error => 1,
            LineClass::Warning => 2,
            LineClass::Info => 3,
        }
    }
}

/// Accepted by the `add_*_pattern` methods: a pattern string, compiled
/// case-insensitively, or a regex the caller already built.
pub trait IntoPattern {
    fn into_pattern(self) -> Result<Regex, regex::Error>;
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<Regex, regex::Error> {
        RegexBuilder::new(self).case_insensitive(true).build()
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<Regex, regex::Error> {
        self.as_str().into_pattern()
    }
}

impl IntoPattern for Regex {
    fn into_pattern(self) -> Result<Regex, regex::Error> {
        Ok(self)
    }
}

const IGNORE_PATTERNS: &[&str] = &[r"^\s*$", r"^debug:"];
const ERROR_PATTERNS: &[&str] = &["error", "exception", "fail", "critical"];
const WARNING_PATTERNS: &[&str] = &["warning", "warn:", "libpng warning", "deprecation"];

/// Rules kept sorted by class priority; first match wins.
#[derive(Debug, Clone)]
pub struct PatternSet {
    rules: Vec<(Regex, LineClass)>,
}

impl PatternSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn defaults() -> Self {
        let mut set = Self::empty();
        let groups = [
            (IGNORE_PATTERNS, LineClass::Ignore),
            (ERROR_PATTERNS, LineClass::Error),
            (WARNING_PATTERNS, LineClass::Warning),
        ];
        for (patterns, class) in groups {
            for pattern in patterns {
                match pattern.into_pattern() {
                    Ok(re) => set.insert(re, class),
                    Err(e) => tracing::error!(%pattern, "bad builtin console pattern: {e}"),
                }
            }
        }
        set
    }

    /// Append to the end of `class`'s group.
    pub fn insert(&mut self, pattern: Regex, class: LineClass) {
        let at = self
            .rules
            .iter()
            .position(|(_, c)| c.rank() > class.rank())
            .unwrap_or(self.rules.len());
        self.rules.insert(at, (pattern, class));
    }

    pub fn classify(&self, line: &str) -> LineClass {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(line))
            .map(|(_, class)| *class)
            .unwrap_or(LineClass::Info)
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Forwards writes to `original` and, while redirecting, buffers and
/// classifies complete lines.
pub struct StreamRedirector<W: Write> {
    kind: StreamKind,
    original: W,
    buffer: Vec<u8>,
    redirecting: bool,
    patterns: PatternSet,
    notifier: Notifier,
}

impl<W: Write> StreamRedirector<W> {
    pub fn new(kind: StreamKind, original: W, notifier: Notifier) -> Self {
        Self {
            kind,
            original,
            buffer: Vec::new(),
            redirecting: false,
            patterns: PatternSet::defaults(),
            notifier,
        }
    }

    pub fn start_redirect(&mut self) {
        self.redirecting = true;
    }

    /// Any partial line still buffered is processed before switching off.
    pub fn stop_redirect(&mut self) {
        if self.redirecting {
            self.process_buffer(true);
            self.redirecting = false;
        }
    }

    /// Swap the stream that receives the tee, returning the previous one.
    pub fn replace_original(&mut self, original: W) -> W {
        std::mem::replace(&mut self.original, original)
    }

    pub fn patterns_mut(&mut self) -> &mut PatternSet {
        &mut self.patterns
    }

    pub fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.original.write_all(buf)?;
        if self.redirecting {
            self.buffer.extend_from_slice(buf);
            if buf.contains(&b'\n') {
                self.process_buffer(false);
            }
        }
        Ok(buf.len())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.original.flush()?;
        if self.redirecting {
            self.process_buffer(false);
        }
        Ok(())
    }

    fn process_buffer(&mut self, include_partial: bool) {
        let end = if include_partial {
            self.buffer.len()
        } else {
            match self.buffer.iter().rposition(|b| *b == b'\n') {
                Some(pos) => pos + 1,
                None => return,
            }
        };
        let complete: Vec<u8> = self.buffer.drain(..end).collect();
        let text = String::from_utf8_lossy(&complete);
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if !line.is_empty() {
                self.analyze(line);
            }
        }
    }

    fn analyze(&self, line: &str) {
        let source = self.kind.source();
        match self.patterns.classify(line) {
            LineClass::Ignore => {}
            LineClass::Error => {
                tracing::error!(target: CONSOLE_TARGET, stream = source, "{line}");
                self.notifier.add_error(line, None, None, Some(source));
            }
            LineClass::Warning => {
                tracing::warn!(target: CONSOLE_TARGET, stream = source, "{line}");
                self.notifier.add_warning(line, None, None, Some(source));
            }
            LineClass::Info => {
                tracing::info!(target: CONSOLE_TARGET, stream = source, "{line}");
            }
        }
    }
}

type BoxedStream = Box<dyn Write + Send>;

struct Redirected {
    kind: StreamKind,
    fd: FdRedirect,
    previous: BoxedStream,
}

struct CaptureState {
    stdout: StreamRedirector<BoxedStream>,
    stderr: StreamRedirector<BoxedStream>,
    capturing: bool,
    process_streams: bool,
    redirects: Vec<Redirected>,
}

impl CaptureState {
    fn stream(&mut self, kind: StreamKind) -> &mut StreamRedirector<BoxedStream> {
        match kind {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        }
    }
}

/// Shared handle over both redirectors. Clones refer to the same streams.
#[derive(Clone)]
pub struct ConsoleCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl ConsoleCapture {
    /// Capture over the real process streams.
    pub fn new(notifier: Notifier) -> Self {
        let capture = Self::with_streams(notifier, Box::new(io::stdout()), Box::new(io::stderr()));
        capture.lock().process_streams = true;
        capture
    }

    /// Capture that only sees bytes written through [`ConsoleCapture::writer`].

    pub fn with_streams(notifier: Notifier, stdout: BoxedStream, stderr: BoxedStream) -> Self {
        let state = CaptureState {
            stdout: StreamRedirector::new(StreamKind::Stdout, stdout, notifier.clone()),
            stderr: StreamRedirector::new(StreamKind::Stderr, stderr, notifier),
            capturing: false,
            process_streams: false,
            redirects: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false when capture was already running.
    pub fn start_capture(&self) -> bool {
        let mut state = self.lock();
        if state.capturing {
            return false;
        }
        state.stdout.start_redirect();
        state.stderr.start_redirect();
        state.capturing = true;
        if state.process_streams {
            for kind in [StreamKind::Stdout, StreamKind::Stderr] {
                match FdRedirect::install(kind, sink(self.clone(), kind)) {
                    Ok((fd, tee)) => {
                        let previous = state.stream(kind).replace_original(Box::new(tee));
                        state.redirects.push(Redirected { kind, fd, previous });
                    }
                    Err(e) => {
                        tracing::warn!(stream = kind.source(), notify = false, "process stream not redirected: {e}");
                    }
                }
            }
        }
        tracing::debug!("console capture started");
        true
    }

    pub fn stop_capture(&self) {
        let mut redirects = {
            let mut state = self.lock();
            if !state.capturing {
                return;
            }
            std::mem::take(&mut state.redirects)
        };
        // Outside the lock: the readers need it to drain the pipes.
        for redirect in &mut redirects {
            redirect.fd.restore();
        }

        let mut state = self.lock();
        for Redirected { kind, previous, .. } in redirects {
            state.stream(kind).replace_original(previous);
        }
        state.stdout.stop_redirect();
        state.stderr.stop_redirect();
        state.capturing = false;
        tracing::debug!("console capture stopped");
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().capturing
    }

    pub fn add_warning_pattern(&self, pattern: impl IntoPattern) -> Result<(), regex::Error> {
        self.add_pattern(pattern.into_pattern()?, LineClass::Warning);
        Ok(())
    }

    pub fn add_error_pattern(&self, pattern: impl IntoPattern) -> Result<(), regex::Error> {
        self.add_pattern(pattern.into_pattern()?, LineClass::Error);
        Ok(())
    }

    pub fn add_ignore_pattern(&self, pattern: impl IntoPattern) -> Result<(), regex::Error> {
        self.add_pattern(pattern.into_pattern()?, LineClass::Ignore);
        Ok(())
    }

    fn add_pattern(&self, pattern: Regex, class: LineClass) {
        let mut state = self.lock();
        state.stdout.patterns_mut().insert(pattern.clone(), class);
        state.stderr.patterns_mut().insert(pattern, class);
    }

    pub fn writer(&self, kind: StreamKind) -> CapturedWriter {
        CapturedWriter {
            capture: self.clone(),
            kind,
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.stdout.flush()?;
        state.stderr.flush()
    }
}

/// Feeds bytes read off a redirected descriptor into its redirector.
fn sink(capture: ConsoleCapture, kind: StreamKind) -> impl FnMut(&[u8]) + Send + 'static {
    move |bytes: &[u8]| {
        if let Err(e) = capture.lock().stream(kind).write_bytes(bytes) {
            tracing::debug!(stream = kind.source(), "console tee failed: {e}");
        }
    }
}

/// `Write` end of one captured stream.
pub struct CapturedWriter {
    capture: ConsoleCapture,
    kind: StreamKind,
}

impl Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.capture.lock().stream(self.kind).write_bytes(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.capture.lock().stream(self.kind).flush()
    }
}
