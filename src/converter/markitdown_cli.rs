use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;

use super::engine::{ConversionOutput, ConvertError, ConverterOptions, DocumentConverter, StreamInfo};
use crate::console_capture::{ConsoleCapture, StreamKind};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

static ATTEMPTS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"failed after (\d+) attempts").ok());
static EXCEPTION_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w.]*(?:Exception|Error): ").ok());

/// Runs the external `markitdown` program for each conversion.
pub struct MarkItDownCli {
    program: PathBuf,
    options: ConverterOptions,
    timeout: Option<Duration>,
    console: Option<ConsoleCapture>,
}

impl MarkItDownCli {
    pub fn new(program: PathBuf, options: ConverterOptions, timeout: Option<Duration>) -> Self {
        Self {
            program,
            options,
            timeout,
            console: None,
        }
    }

    pub fn with_console(mut self, console: ConsoleCapture) -> Self {
        self.console = Some(console);
        self
    }

    pub fn build_args(
        &self,
        path: &Path,
        stream_info: Option<&StreamInfo>,
        keep_data_uris: bool,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![path.as_os_str().to_owned()];
        if let Some(info) = stream_info {
            if let Some(ext) = info.normalized_extension() {
                args.push("-x".into());
                args.push(ext.into());
            }
            if let Some(mime) = &info.mimetype {
                args.push("-m".into());
                args.push(mime.into());
            }
            if let Some(charset) = &info.charset {
                args.push("-c".into());
                args.push(charset.into());
            }
        }
        if self.options.enable_plugins {
            args.push("--use-plugins".into());
        }
        if keep_data_uris {
            args.push("--keep-data-uris".into());
        }
        if let Some(endpoint) = &self.options.docintel_endpoint {
            args.push("-d".into());
            args.push("-e".into());
            args.push(endpoint.into());
        }
        args
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ConvertError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                if let Err(e) = child.kill() {
                    tracing::warn!("failed to kill timed out markitdown: {e}");
                }
                let _ = child.wait();
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                return Err(ConvertError::Library(format!(
                    "Conversion timed out after {secs} seconds"
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl DocumentConverter for MarkItDownCli {
    fn convert(
        &self,
        path: &Path,
        stream_info: Option<&StreamInfo>,
        keep_data_uris: bool,
    ) -> Result<ConversionOutput, ConvertError> {
        let args = self.build_args(path, stream_info, keep_data_uris);
        tracing::info!(program = %self.program.display(), ?args, "running markitdown");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ConvertError::Library(format!(
                    "markitdown program not found: {}",
                    self.program.display()
                )),
                _ => ConvertError::Io(e),
            })?;

        let stdout = child.stdout.take();
        let stdout_reader = thread::spawn(move || -> io::Result<String> {
            let mut out = String::new();
            if let Some(mut pipe) = stdout {
                pipe.read_to_string(&mut out)?;
            }
            Ok(out)
        });

        let stderr = child.stderr.take();
        let console = self.console.clone();
        let stderr_reader = thread::spawn(move || -> Vec<String> {
            let Some(pipe) = stderr else { return Vec::new() };
            let mut sink = console.map(|c| c.writer(StreamKind::Stderr));
            let mut lines = Vec::new();
            for line in BufReader::new(pipe).lines().map_while(Result::ok) {
                if let Some(w) = sink.as_mut() {
                    let _ = writeln!(w, "{line}");
                }
                lines.push(line);
            }
            lines
        });

        let status = self.wait(&mut child)?;
        let stdout = stdout_reader
            .join()
            .map_err(|_| ConvertError::Library("stdout reader panicked".to_string()))??;
        let stderr_lines = stderr_reader
            .join()
            .map_err(|_| ConvertError::Library("stderr reader panicked".to_string()))?;

        if status.success() {
            Ok(ConversionOutput::new(stdout))
        } else {
            Err(failure_from_stderr(&stderr_lines, status))
        }
    }

    fn name(&self) -> &'static str {
        "markitdown"
    }
}

pub fn failure_from_stderr(lines: &[String], status: ExitStatus) -> ConvertError {
    let attempts = lines.iter().rev().find_map(|line| {
        ATTEMPTS
            .as_ref()?
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
    });
    if let Some(attempts) = attempts {
        return ConvertError::NoConverterMatched { attempts };
    }

    match lines.iter().rev().map(|l| l.trim()).find(|l| !l.is_empty()) {
        Some(last) => {
            let text = match EXCEPTION_PREFIX.as_ref() {
                Some(re) => re.replace(last, "").into_owned(),
                None => last.to_string(),
            };
            ConvertError::Library(text)
        }
        None => ConvertError::Library(format!("markitdown exited with {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(options: ConverterOptions) -> MarkItDownCli {
        MarkItDownCli::new(PathBuf::from("markitdown"), options, None)
    }

    #[cfg(unix)]
    fn failed_status() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(1 << 8)
    }

    #[test]
    fn args_carry_every_hint() {
        let options = ConverterOptions {
            enable_plugins: true,
            docintel_endpoint: Some("https://di.example.com".into()),
        };
        let info = StreamInfo::from_hints(Some(".PDF".into()), Some("application/pdf".into()), Some("utf-8".into()));
        let args = cli(options).build_args(Path::new("in.pdf"), info.as_ref(), true);

        let expected: Vec<OsString> = [
            "in.pdf", "-x", "pdf", "-m", "application/pdf", "-c", "utf-8", "--use-plugins",
            "--keep-data-uris", "-d", "-e", "https://di.example.com",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn bare_args_are_just_the_path() {
        let args = cli(ConverterOptions::default()).build_args(Path::new("a.docx"), None, false);
        assert_eq!(args, vec![OsString::from("a.docx")]);
    }

    #[cfg(unix)]
    #[test]
    fn attempts_are_parsed_from_stderr() {
        let lines = vec![
            "Traceback (most recent call last):".to_string(),
            "markitdown._exceptions.FileConversionException: File conversion failed after 3 attempts:".to_string(),
        ];
        let err = failure_from_stderr(&lines, failed_status());
        assert!(matches!(err, ConvertError::NoConverterMatched { attempts: 3 }));
    }

    #[cfg(unix)]
    #[test]
    fn last_stderr_line_becomes_message() {
        let lines = vec![
            "something".to_string(),
            "markitdown._exceptions.UnsupportedFormatException: Could not convert stream".to_string(),
            "".to_string(),
        ];
        let err = failure_from_stderr(&lines, failed_status());
        assert_eq!(err.to_string(), "Could not convert stream");
    }

    #[cfg(unix)]
    #[test]
    fn silent_failure_reports_status() {
        let err = failure_from_stderr(&[], failed_status());
        assert!(err.to_string().starts_with("markitdown exited with"));
    }

    #[test]
    fn missing_program_is_a_library_error() {
        let converter = MarkItDownCli::new(
            PathBuf::from("no-such-markitdown-program-xyz"),
            ConverterOptions::default(),
            None,
        );
        let err = converter.convert(Path::new("x.pdf"), None, false).unwrap_err();
        assert!(matches!(err, ConvertError::Library(m) if m.starts_with("markitdown program not found")));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_child() {
        let converter = MarkItDownCli::new(
            PathBuf::from("sleep"),
            ConverterOptions::default(),
            Some(Duration::from_millis(200)),
        );
        let started = Instant::now();
        let err = converter.convert(Path::new("5"), None, false).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(err.to_string().starts_with("Conversion timed out"));
    }
}
