#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use cf_columnar::{ColumnError, format_scalar};
use cf_frame::{ColumnLabel, DataFrame, FrameData, FrameError};
use cf_runtime::options;
use cf_types::Scalar;
use csv::{ReaderBuilder, WriterBuilder};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("unsupported json shape: {0}")]
    UnsupportedJsonShape(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn has_extension(path: &Path, accepted: &[&str]) -> bool {
    extension(path).is_some_and(|ext| accepted.contains(&ext.as_str()))
}

// ── Reading ────────────────────────────────────────────────────────────

/// Raw CSV records; rows may differ in width.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<Vec<String>>, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    reader
        .records()
        .map(|record| Ok(record?.iter().map(str::to_owned).collect()))
        .collect()
}

pub fn read_rows_path(path: impl AsRef<Path>) -> Result<Vec<Vec<String>>, IoError> {
    read_rows(File::open(path)?)
}

fn field_scalar(field: String) -> Scalar {
    if field.trim().is_empty() {
        Scalar::Null
    } else {
        Scalar::Utf8(field)
    }
}

fn frame_from_rows(mut rows: Vec<Vec<String>>, has_header: bool) -> Result<DataFrame, IoError> {
    let names = if has_header {
        if rows.is_empty() {
            return Err(IoError::MissingHeaders);
        }
        let header = rows.remove(0);
        if header.iter().all(|name| name.is_empty()) {
            return Err(IoError::MissingHeaders);
        }
        Some(header.into_iter().map(ColumnLabel::Utf8).collect::<Vec<_>>())
    } else {
        None
    };

    if rows.is_empty() {
        let width = names.as_ref().map_or(0, Vec::len);
        return Ok(DataFrame::new(FrameData::Columns(vec![Vec::new(); width]), names, None)?);
    }
    let values = rows
        .into_iter()
        .map(|row| row.into_iter().map(field_scalar).collect())
        .collect();
    Ok(DataFrame::new(FrameData::Rows(values), names, None)?)
}

/// Frame from CSV text. Fields go through the same ingestion as any untyped
/// values, so mostly-numeric columns come back numeric.
pub fn read_csv_str(input: &str, has_header: bool) -> Result<DataFrame, IoError> {
    frame_from_rows(read_rows(input.as_bytes())?, has_header)
}

pub fn load_csv(path: impl AsRef<Path>, has_header: bool) -> Result<DataFrame, IoError> {
    let path = path.as_ref();
    if !has_extension(path, CsvWriter::EXTENSIONS) {
        log::warn!("loading {} as csv without a .csv extension", path.display());
    }
    let frame = frame_from_rows(read_rows_path(path)?, has_header)?;
    log::info!("loaded {} rows from {}", frame.len(), path.display());
    Ok(frame)
}

fn json_scalar(name: &str, value: Value) -> Result<Scalar, IoError> {
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(flag) => Ok(Scalar::Int64(i64::from(flag))),
        Value::Number(number) => Ok(number
            .as_i64()
            .map(Scalar::Int64)
            .or_else(|| number.as_f64().map(Scalar::Float64))
            .unwrap_or(Scalar::Null)),
        Value::String(text) => Ok(Scalar::Utf8(text)),
        Value::Array(_) | Value::Object(_) => Err(IoError::UnsupportedJsonShape(format!(
            "column {name} holds a nested value"
        ))),
    }
}

/// Frame from a JSON object mapping column names to value arrays, the shape
/// [`JsonWriter`] produces.
pub fn read_json_str(input: &str) -> Result<DataFrame, IoError> {
    let Value::Object(fields) = serde_json::from_str::<Value>(input)? else {
        return Err(IoError::UnsupportedJsonShape(
            "expected an object of column arrays".to_owned(),
        ));
    };
    let columns = fields
        .into_iter()
        .map(|(name, values)| {
            let Value::Array(items) = values else {
                return Err(IoError::UnsupportedJsonShape(format!(
                    "column {name} is not an array"
                )));
            };
            let values = items
                .into_iter()
                .map(|item| json_scalar(&name, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((name, values))
        })
        .collect::<Result<Vec<_>, IoError>>()?;
    Ok(DataFrame::new(FrameData::Object(columns), None, None)?)
}

pub fn load_json(path: impl AsRef<Path>) -> Result<DataFrame, IoError> {
    let path = path.as_ref();
    let frame = read_json_str(&fs::read_to_string(path)?)?;
    log::info!("loaded {} rows from {}", frame.len(), path.display());
    Ok(frame)
}

/// Load by file extension: `.csv` (with a header row) or `.json`.
pub fn load(path: impl AsRef<Path>) -> Result<DataFrame, IoError> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("csv") => load_csv(path, true),
        Some("json") => load_json(path),
        _ => Err(IoError::NotImplemented(format!(
            "no reader for {}",
            path.display()
        ))),
    }
}

// ── Writing ────────────────────────────────────────────────────────────

/// Serialises a whole frame into one output format.
pub trait FrameWriter {
    /// Lowercase file extensions this format is saved under.
    fn extensions(&self) -> &'static [&'static str];

    fn write(&self, frame: &DataFrame) -> Result<Vec<u8>, IoError>;
}

/// CSV with a header row. Values are written in full unless a display
/// precision is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvWriter {
    precision: Option<usize>,
}

impl CsvWriter {
    const EXTENSIONS: &'static [&'static str] = &["csv"];

    #[must_use]
    pub fn with_precision(precision: usize) -> Self {
        Self {
            precision: Some(precision),
        }
    }
}

fn csv_field(value: &Scalar) -> String {
    match value {
        Scalar::Null => String::new(),
        Scalar::Float64(v) if v.is_nan() => String::new(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) => v.to_string(),
        Scalar::Utf8(v) => v.clone(),
    }
}

impl FrameWriter for CsvWriter {
    fn extensions(&self) -> &'static [&'static str] {
        Self::EXTENSIONS
    }

    fn write(&self, frame: &DataFrame) -> Result<Vec<u8>, IoError> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(frame.names().iter().map(ToString::to_string))?;

        let dtypes = frame.dtypes();
        for row in frame.rows() {
            let fields = row.iter().zip(&dtypes).map(|(value, dtype)| match self.precision {
                Some(precision) if !value.is_missing() => format_scalar(value, *dtype, precision),
                _ => csv_field(value),
            });
            writer.write_record(fields)?;
        }
        writer.into_inner().map_err(|err| err.into_error().into())
    }
}

/// JSON object of column name to value array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonWriter {
    pub pretty: bool,
}

impl JsonWriter {
    const EXTENSIONS: &'static [&'static str] = &["json"];
}

fn json_value(value: Scalar) -> Value {
    match value {
        Scalar::Null => Value::Null,
        Scalar::Int64(v) => Value::from(v),
        Scalar::Float64(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        Scalar::Utf8(v) => Value::String(v),
    }
}

impl FrameWriter for JsonWriter {
    fn extensions(&self) -> &'static [&'static str] {
        Self::EXTENSIONS
    }

    fn write(&self, frame: &DataFrame) -> Result<Vec<u8>, IoError> {
        let object: Map<String, Value> = frame
            .names()
            .iter()
            .zip(frame.columns())
            .map(|(name, column)| {
                let values = column.iter().map(json_value).collect();
                (name.to_string(), Value::Array(values))
            })
            .collect();
        let value = Value::Object(object);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&value)?
        } else {
            serde_json::to_vec(&value)?
        };
        Ok(bytes)
    }
}

/// HTML `<table>` with a header row, values rendered by the formatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HtmlWriter;

impl HtmlWriter {
    const EXTENSIONS: &'static [&'static str] = &["html", "htm", "xhtml"];
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

impl FrameWriter for HtmlWriter {
    fn extensions(&self) -> &'static [&'static str] {
        Self::EXTENSIONS
    }

    fn write(&self, frame: &DataFrame) -> Result<Vec<u8>, IoError> {
        let precision = options().print_precision;
        let dtypes = frame.dtypes();
        let mut html = String::from("<table><tr>");
        for name in frame.names() {
            html.push_str(&format!("<th>{}</th>", escape_html(&name.to_string())));
        }
        html.push_str("</tr>");
        for row in frame.rows() {
            html.push_str("<tr>");
            for (value, dtype) in row.iter().zip(&dtypes) {
                let text = format_scalar(value, *dtype, precision);
                html.push_str(&format!("<td>{}</td>", escape_html(&text)));
            }
            html.push_str("</tr>");
        }
        html.push_str("</table>");
        Ok(html.into_bytes())
    }
}

/// Write `frame` to `path` with `writer`, warning when the extension does
/// not match the format.
pub fn save(frame: &DataFrame, path: impl AsRef<Path>, writer: &dyn FrameWriter) -> Result<(), IoError> {
    let path = path.as_ref();
    if !has_extension(path, writer.extensions()) {
        log::warn!(
            "saving to {}, expected one of the extensions {:?}",
            path.display(),
            writer.extensions()
        );
    }
    fs::write(path, writer.write(frame)?)?;
    log::info!("saved {} rows to {}", frame.len(), path.display());
    Ok(())
}

/// Save with the writer matching the file extension.
pub fn save_as(frame: &DataFrame, path: impl AsRef<Path>) -> Result<(), IoError> {
    let path = path.as_ref();
    let writer: Box<dyn FrameWriter> = match extension(path).as_deref() {
        Some(ext) if CsvWriter::EXTENSIONS.contains(&ext) => Box::new(CsvWriter::default()),
        Some(ext) if JsonWriter::EXTENSIONS.contains(&ext) => Box::new(JsonWriter::default()),
        Some(ext) if HtmlWriter::EXTENSIONS.contains(&ext) => Box::new(HtmlWriter),
        _ => {
            return Err(IoError::NotImplemented(format!(
                "no writer for {}",
                path.display()
            )));
        }
    };
    save(frame, path, writer.as_ref())
}

#[cfg(test)]
mod tests {
    use cf_columnar::Column;
    use cf_frame::{ColumnLabel, DataFrame, FrameError};
    use cf_types::{DType, Scalar};

    use super::{
        CsvWriter, FrameWriter, HtmlWriter, IoError, JsonWriter, load, load_csv, read_csv_str,
        read_json_str, read_rows, save, save_as,
    };

    fn sample_frame() -> DataFrame {
        DataFrame::from_columns(
            vec![
                Column::of([1, 2, 3]),
                Column::from_f64_values(&[0.5, f64::NAN, 2.25], DType::F64),
                Column::from_strings(["a", "b<c", "d"]),
            ],
            Some(vec!["id".into(), "value".into(), "tag".into()]),
        )
        .expect("frame")
    }

    #[test]
    fn read_rows_keeps_ragged_records() {
        let rows = read_rows("a,b\n1\n2,3,4\n".as_bytes()).expect("rows");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["1".to_owned()]);
        assert_eq!(rows[2].len(), 3);
    }

    #[test]
    fn csv_ingestion_coerces_numeric_columns() {
        let input = "id,value,tag\n1,10,x\n2,,y\n3,3.5,z\n4,4,w\n5,5,v\n6,6,u\n";
        let frame = read_csv_str(input, true).expect("read");
        assert_eq!(frame.names()[0], ColumnLabel::from("id"));
        assert_eq!(frame.dtype("id").expect("col"), DType::U8);
        assert!(frame.dtype("value").expect("col").is_float());
        assert!(frame.val(1, "value").expect("value").is_missing());
        assert_eq!(frame.dtype("tag").expect("col"), DType::Utf8);
    }

    #[test]
    fn csv_without_header_uses_positions() {
        let frame = read_csv_str("1,a\n2,b\n", false).expect("read");
        assert_eq!(frame.names(), &[ColumnLabel::Int64(0), ColumnLabel::Int64(1)]);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn csv_header_only_and_missing_header() {
        let frame = read_csv_str("x,y,z\n", true).expect("header only");
        assert_eq!(frame.n_cols(), 3);
        assert!(frame.is_empty());
        assert!(matches!(read_csv_str("", true), Err(IoError::MissingHeaders)));
    }

    #[test]
    fn ragged_csv_is_a_shape_mismatch() {
        let err = read_csv_str("a,b\n1,2\n3\n", true).expect_err("ragged");
        assert!(matches!(err, IoError::Frame(FrameError::ShapeMismatch(_))));
    }

    #[test]
    fn csv_writer_round_trips() {
        let frame = sample_frame();
        let bytes = CsvWriter::default().write(&frame).expect("write");
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("id,value,tag\n"));
        assert!(text.contains("2,,b<c\n"));
        let back = read_csv_str(&text, true).expect("read back");
        assert_eq!(back.col("id").expect("col"), frame.col("id").expect("col"));
        // two numbers and a gap fall under the parse ratio, so the column stays text
        assert_eq!(back.dtype("value").expect("col"), DType::Utf8);
        assert_eq!(back.val(2, "value").expect("value"), Scalar::from("2.25"));

        let rounded = CsvWriter::with_precision(1).write(&frame).expect("write");
        assert!(String::from_utf8(rounded).expect("utf8").contains("1,0.5,a"));
    }

    #[test]
    fn json_writer_round_trips() {
        let frame = sample_frame();
        let bytes = JsonWriter::default().write(&frame).expect("write");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(
            text,
            r#"{"id":[1,2,3],"value":[0.5,null,2.25],"tag":["a","b<c","d"]}"#
        );
        let back = read_json_str(&text).expect("read back");
        assert_eq!(back.names(), frame.names());
        assert_eq!(back.col("tag").expect("col"), frame.col("tag").expect("col"));
        assert!(back.val(1, "value").expect("value").is_missing());
    }

    #[test]
    fn json_rejects_other_shapes() {
        assert!(matches!(read_json_str("[1, 2]"), Err(IoError::UnsupportedJsonShape(_))));
        assert!(matches!(read_json_str(r#"{"a": 1}"#), Err(IoError::UnsupportedJsonShape(_))));
        assert!(matches!(read_json_str(r#"{"a": [[1]]}"#), Err(IoError::UnsupportedJsonShape(_))));
        assert!(matches!(read_json_str("{"), Err(IoError::Json(_))));
        assert!(matches!(
            read_json_str(r#"{"a": [1, 2], "b": [1]}"#),
            Err(IoError::Frame(FrameError::ShapeMismatch(_)))
        ));
    }

    #[test]
    fn html_writer_escapes_and_formats() {
        let bytes = HtmlWriter.write(&sample_frame()).expect("write");
        let html = String::from_utf8(bytes).expect("utf8");
        assert!(html.starts_with("<table><tr><th>id</th><th>value</th><th>tag</th></tr>"));
        assert!(html.contains("<td>b&lt;c</td>"));
        assert!(html.contains("<td>0.50</td>"));
        assert!(html.ends_with("</table>"));
    }

    #[test]
    fn save_and_load_by_extension() {
        let frame = sample_frame();
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("frame.csv");
        save_as(&frame, &csv_path).expect("save csv");
        let back = load(&csv_path).expect("load csv");
        assert_eq!(back.len(), 3);
        assert_eq!(load_csv(&csv_path, true).expect("load csv").n_cols(), 3);

        let json_path = dir.path().join("frame.json");
        save(&frame, &json_path, &JsonWriter { pretty: true }).expect("save json");
        assert_eq!(load(&json_path).expect("load json").names(), frame.names());

        let html_path = dir.path().join("frame.html");
        save_as(&frame, &html_path).expect("save html");
        assert!(matches!(load(&html_path), Err(IoError::NotImplemented(_))));
        let gz_path = dir.path().join("frame.csv.gz");
        assert!(matches!(save_as(&frame, &gz_path), Err(IoError::NotImplemented(_))));
        assert!(!gz_path.exists());
    }
}
