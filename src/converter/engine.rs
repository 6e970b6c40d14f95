//! Boundary between the UI and whatever actually turns documents into
//! Markdown.

use std::env;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use super::builtin::BuiltinConverter;
use super::markitdown_cli::MarkItDownCli;
use crate::console_capture::ConsoleCapture;

pub const UNSUPPORTED_MESSAGE: &str = "Could not convert stream to Markdown. No converter attempted a conversion, suggesting that the filetype is simply not supported.";

/// Optional hints about the input stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub extension: Option<String>,
    pub mimetype: Option<String>,
    pub charset: Option<String>,
}

impl StreamInfo {
    /// `None` when no hint is set.
    pub fn from_hints(
        extension: Option<String>,
        mimetype: Option<String>,
        charset: Option<String>,
    ) -> Option<Self> {
        if extension.is_none() && mimetype.is_none() && charset.is_none() {
            return None;
        }
        Some(Self {
            extension,
            mimetype,
            charset,
        })
    }

    /// Extension without the leading dot, lowercased.
    pub fn normalized_extension(&self) -> Option<String> {
        self.extension
            .as_deref()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConverterOptions {
    pub enable_plugins: bool,
    pub docintel_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOutput {
    pub markdown: String,
    pub title: Option<String>,
    /// Non-fatal problems the backend reported.
    pub warnings: Vec<String>,
}

impl ConversionOutput {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            title: None,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    /// Converters accepted the input but every one of them failed.
    #[error("File conversion failed after {attempts} attempts")]
    NoConverterMatched { attempts: usize },
    #[error("{0}")]
    Library(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ConvertError {
    pub fn unsupported() -> Self {
        ConvertError::Library(UNSUPPORTED_MESSAGE.to_string())
    }
}

pub trait DocumentConverter: Send {
    fn convert(
        &self,
        path: &Path,
        stream_info: Option<&StreamInfo>,
        keep_data_uris: bool,
    ) -> Result<ConversionOutput, ConvertError>;

    fn name(&self) -> &'static str;
}

/// Builds one converter per conversion.
pub trait ConverterFactory: Send + Sync {
    fn create(&self, options: &ConverterOptions) -> Result<Box<dyn DocumentConverter>, ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    #[default]
    Auto,
    MarkItDown,
    Builtin,
}

impl BackendChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendChoice::Auto => "auto",
            BackendChoice::MarkItDown => "markitdown",
            BackendChoice::Builtin => "builtin",
        }
    }
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown backend `{0}`, expected auto, markitdown or builtin")]
pub struct UnknownBackend(String);

impl FromStr for BackendChoice {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(BackendChoice::Auto),
            "markitdown" | "cli" => Ok(BackendChoice::MarkItDown),
            "builtin" => Ok(BackendChoice::Builtin),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

pub struct DefaultConverterFactory {
    backend: BackendChoice,
    program: PathBuf,
    timeout: Option<Duration>,
    console: Option<ConsoleCapture>,
}

impl DefaultConverterFactory {
    pub fn new(backend: BackendChoice, program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            backend,
            program: program.into(),
            timeout,
            console: None,
        }
    }

    /// Route the external program's stderr through `console`.
    pub fn with_console(mut self, console: ConsoleCapture) -> Self {
        self.console = Some(console);
        self
    }

    fn resolve(&self) -> BackendChoice {
        match self.backend {
            BackendChoice::Auto if find_program(&self.program).is_some() => BackendChoice::MarkItDown,
            BackendChoice::Auto => BackendChoice::Builtin,
            chosen => chosen,
        }
    }
}

impl ConverterFactory for DefaultConverterFactory {
    fn create(&self, options: &ConverterOptions) -> Result<Box<dyn DocumentConverter>, ConvertError> {
        let backend = self.resolve();
        tracing::debug!(%backend, plugins = options.enable_plugins, "building converter");
        match backend {
            BackendChoice::MarkItDown => {
                let program = find_program(&self.program).unwrap_or_else(|| self.program.clone());
                let mut cli = MarkItDownCli::new(program, options.clone(), self.timeout);
                if let Some(console) = &self.console {
                    cli = cli.with_console(console.clone());
                }
                Ok(Box::new(cli))
            }
            _ => Ok(Box::new(BuiltinConverter::new(options.clone())?)),
        }
    }
}

/// Resolve `program` against `PATH` unless it already names a file.
pub fn find_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hints_give_no_stream_info() {
        assert_eq!(StreamInfo::from_hints(None, None, None), None);
        let info = StreamInfo::from_hints(Some(".PDF".into()), None, None).unwrap();
        assert_eq!(info.normalized_extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Builtin".parse::<BackendChoice>().unwrap(), BackendChoice::Builtin);
        assert_eq!("markitdown".parse::<BackendChoice>().unwrap(), BackendChoice::MarkItDown);
        assert!("pandoc".parse::<BackendChoice>().is_err());
    }

    #[test]
    fn missing_program_falls_back_to_builtin() {
        let factory = DefaultConverterFactory::new(
            BackendChoice::Auto,
            "definitely-not-a-real-markitdown-binary",
            None,
        );
        let converter = factory.create(&ConverterOptions::default()).unwrap();
        assert_eq!(converter.name(), "builtin");
    }

    #[test]
    fn no_converter_matched_message_counts_attempts() {
        let err = ConvertError::NoConverterMatched { attempts: 2 };
        assert_eq!(err.to_string(), "File conversion failed after 2 attempts");
    }
}
