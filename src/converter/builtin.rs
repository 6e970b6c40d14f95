//! Fallback engine used when the `markitdown` program is unavailable.
//!
//! It handles a handful of text formats and ZIP archives of them. Formats are
//! tried in order; a format either declines the input or attempts it, and the
//! engine reports "unsupported" when nobody attempted and "no converter
//! matched" when every attempt failed.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::engine::{ConversionOutput, ConvertError, ConverterOptions, DocumentConverter, StreamInfo};

static DATA_URI_IMAGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(data:([^;,)]+);base64,[^)\s]*\)").ok()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Csv,
    Json,
    Zip,
}

const FORMATS: [Format; 4] = [Format::Zip, Format::Csv, Format::Json, Format::Text];

impl Format {
    fn accepts(&self, extension: Option<&str>, mimetype: Option<&str>) -> bool {
        let mime = mimetype.map(|m| m.to_ascii_lowercase());
        let mime = mime.as_deref();
        match self {
            Format::Text => {
                matches!(extension, Some("txt" | "text" | "md" | "markdown" | "log"))
                    || mime.is_some_and(|m| m.starts_with("text/plain") || m.starts_with("text/markdown"))
            }
            Format::Csv => {
                extension == Some("csv") || mime.is_some_and(|m| m.starts_with("text/csv"))
            }
            Format::Json => {
                extension == Some("json") || mime.is_some_and(|m| m.starts_with("application/json"))
            }
            Format::Zip => {
                extension == Some("zip") || mime.is_some_and(|m| m.starts_with("application/zip"))
            }
        }
    }
}

pub struct BuiltinConverter;

impl BuiltinConverter {
    pub fn new(options: ConverterOptions) -> Result<Self, ConvertError> {
        if options.docintel_endpoint.is_some() {
            return Err(ConvertError::Library(
                "Document Intelligence requires the markitdown backend".to_string(),
            ));
        }
        if options.enable_plugins {
            tracing::debug!("builtin converter has no plugins, ignoring enable_plugins");
        }
        Ok(Self)
    }

    fn convert_bytes(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
        mimetype: Option<&str>,
        charset: Option<&str>,
        allow_archives: bool,
    ) -> Result<ConversionOutput, ConvertError> {
        let mut attempts = 0;
        for format in FORMATS {
            if format == Format::Zip && !allow_archives {
                continue;
            }
            if !format.accepts(extension, mimetype) {
                continue;
            }
            attempts += 1;
            let result = match format {
                Format::Text => decode(bytes, charset).map(text_to_output),
                Format::Csv => decode(bytes, charset).and_then(|s| csv_to_markdown(&s)),
                Format::Json => json_to_markdown(bytes),
                Format::Zip => self.zip_to_markdown(bytes),
            };
            match result {
                Ok(output) => return Ok(output),
                Err(reason) => tracing::debug!(?format, "builtin converter attempt failed: {reason}"),
            }
        }
        if attempts == 0 {
            Err(ConvertError::unsupported())
        } else {
            Err(ConvertError::NoConverterMatched { attempts })
        }
    }

    fn zip_to_markdown(&self, bytes: &[u8]) -> Result<ConversionOutput, String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
        let mut output = ConversionOutput::default();
        let mut body = String::new();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|e| e.to_string())?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(|e| e.to_string())?;

            let extension = extension_of(Path::new(&name));
            match self.convert_bytes(&data, extension.as_deref(), None, None, false) {
                Ok(converted) => {
                    body.push_str(&format!("## File: {name}\n\n{}\n\n", converted.markdown.trim_end()));
                    output.warnings.extend(converted.warnings);
                }
                Err(e) => output.warnings.push(format!("Skipped {name}: {e}")),
            }
        }
        output.markdown = body;
        Ok(output)
    }
}

impl DocumentConverter for BuiltinConverter {
    fn convert(
        &self,
        path: &Path,
        stream_info: Option<&StreamInfo>,
        keep_data_uris: bool,
    ) -> Result<ConversionOutput, ConvertError> {
        let bytes = fs::read(path)?;
        let extension = stream_info
            .and_then(StreamInfo::normalized_extension)
            .or_else(|| extension_of(path));
        let mimetype = stream_info.and_then(|s| s.mimetype.as_deref());
        let charset = stream_info.and_then(|s| s.charset.as_deref());

        let mut output = self.convert_bytes(&bytes, extension.as_deref(), mimetype, charset, true)?;
        if extension.as_deref() == Some("zip") {
            let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            output.markdown = format!("Content from the zip file `{file_name}`:\n\n{}", output.markdown);
        }
        if !keep_data_uris {
            output.markdown = shorten_data_uris(&output.markdown);
        }
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn decode(bytes: &[u8], charset: Option<&str>) -> Result<String, String> {
    let charset = charset.map(|c| c.trim().to_ascii_lowercase());
    match charset.as_deref() {
        None | Some("utf-8" | "utf8" | "ascii" | "us-ascii") => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8(bytes.to_vec()).map_err(|e| format!("input is not valid UTF-8: {e}"))
        }
        Some("latin-1" | "latin1" | "iso-8859-1") => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        Some(other) => Err(format!("unsupported charset {other}")),
    }
}

fn text_to_output(text: String) -> ConversionOutput {
    let title = text
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string());
    ConversionOutput {
        markdown: text,
        title,
        warnings: Vec::new(),
    }
}

fn csv_to_markdown(text: &str) -> Result<ConversionOutput, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(escape_cell).collect());
    }
    let Some(header) = rows.first() else {
        return Err("CSV input has no rows".to_string());
    };
    let width = header.len();

    let mut output = ConversionOutput::default();
    let mut md = String::new();
    md.push_str(&format!("| {} |\n", header.join(" | ")));
    md.push_str(&format!("|{}\n", " --- |".repeat(width)));
    for (index, row) in rows.iter().enumerate().skip(1) {
        if row.len() != width {
            output
                .warnings
                .push(format!("Row {} has {} columns, expected {width}", index + 1, row.len()));
        }
        let mut cells = row.clone();
        cells.resize(width, String::new());
        md.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    output.markdown = md;
    Ok(output)
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn json_to_markdown(bytes: &[u8]) -> Result<ConversionOutput, String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    let pretty = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
    Ok(ConversionOutput::new(format!("```json\n{pretty}\n```\n")))
}

/// `![alt](data:image/png;base64,AAAA)` becomes `![alt](data:image/png;base64...)`.
pub fn shorten_data_uris(markdown: &str) -> String {
    match DATA_URI_IMAGE.as_ref() {
        Some(re) => re.replace_all(markdown, "![$1](data:$2;base64...)").into_owned(),
        None => markdown.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    fn converter() -> BuiltinConverter {
        BuiltinConverter::new(ConverterOptions::default()).unwrap()
    }

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn csv_becomes_table() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "people.csv", b"name,role\nAda,engineer\nGrace,admiral|navy\n");

        let out = converter().convert(&path, None, false).unwrap();
        assert_eq!(
            out.markdown,
            "| name | role |\n| --- | --- |\n| Ada | engineer |\n| Grace | admiral\\|navy |\n"
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn ragged_csv_rows_warn() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ragged.csv", b"a,b,c\n1,2\n");

        let out = converter().convert(&path, None, false).unwrap();
        assert_eq!(out.warnings, vec!["Row 2 has 2 columns, expected 3"]);
        assert!(out.markdown.ends_with("| 1 | 2 |  |\n"));
    }

    #[test]
    fn markdown_title_is_first_heading() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.md", b"intro\n# Release Notes\nbody\n");

        let out = converter().convert(&path, None, true).unwrap();
        assert_eq!(out.title.as_deref(), Some("Release Notes"));
    }

    #[test]
    fn extension_hint_overrides_file_name() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "data.bin", br#"{"a":1}"#);

        let info = StreamInfo::from_hints(Some(".json".into()), None, None);
        let out = converter().convert(&path, info.as_ref(), false).unwrap();
        assert_eq!(out.markdown, "```json\n{\n  \"a\": 1\n}\n```\n");
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "slides.key", b"\x00\x01");

        let err = converter().convert(&path, None, false).unwrap_err();
        assert_eq!(err.to_string(), super::super::engine::UNSUPPORTED_MESSAGE);
    }

    #[test]
    fn failed_attempts_are_counted() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.json", b"{ nope");

        let err = converter().convert(&path, None, false).unwrap_err();
        assert!(matches!(err, ConvertError::NoConverterMatched { attempts: 1 }));
    }

    #[test]
    fn latin1_charset_decodes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "legacy.txt", b"caf\xe9\n");

        let info = StreamInfo::from_hints(None, None, Some("ISO-8859-1".into()));
        let out = converter().convert(&path, info.as_ref(), false).unwrap();
        assert_eq!(out.markdown, "café\n");
    }

    #[test]
    fn data_uris_are_shortened_unless_kept() {
        let dir = TempDir::new().unwrap();
        let md = b"![logo](data:image/png;base64,iVBORw0KGgo=) and [link](https://x.io)\n";
        let path = write(&dir, "img.md", md);

        let short = converter().convert(&path, None, false).unwrap();
        assert_eq!(short.markdown, "![logo](data:image/png;base64...) and [link](https://x.io)\n");

        let kept = converter().convert(&path, None, true).unwrap();
        assert_eq!(kept.markdown.as_bytes(), md);
    }

    #[test]
    fn zip_entries_are_converted_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.zip");
        {
            let file = fs::File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let opts = zip::write::SimpleFileOptions::default();
            zip.start_file("readme.txt", opts).unwrap();
            zip.write_all(b"hello").unwrap();
            zip.start_file("photo.jpg", opts).unwrap();
            zip.write_all(b"\xff\xd8").unwrap();
            zip.start_file("t.csv", opts).unwrap();
            zip.write_all(b"x\n1\n").unwrap();
            zip.finish().unwrap();
        }

        let out = converter().convert(&path, None, false).unwrap();
        assert_eq!(
            out.markdown,
            "Content from the zip file `bundle.zip`:\n\n## File: readme.txt\n\nhello\n\n## File: t.csv\n\n| x |\n| --- |\n| 1 |\n\n"
        );
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].starts_with("Skipped photo.jpg"));
    }

    #[test]
    fn endpoint_is_rejected() {
        let options = ConverterOptions {
            enable_plugins: false,
            docintel_endpoint: Some("https://example.cognitiveservices.azure.com".into()),
        };
        assert!(matches!(BuiltinConverter::new(options), Err(ConvertError::Library(_))));
    }
}
