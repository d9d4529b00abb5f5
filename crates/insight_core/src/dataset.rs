use crate::error::ParseError;
use serde::{Deserialize, Serialize};

/// Declared upload formats. Extension-based, like the originals' file pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Tsv,
    Txt,
    Json,
    Html,
    Xlsx,
    Pdf,
    Docx,
}

impl FileFormat {
    pub fn from_name(name: &str) -> Result<FileFormat, ParseError> {
        let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "tsv" => Ok(FileFormat::Tsv),
            "txt" => Ok(FileFormat::Txt),
            "json" => Ok(FileFormat::Json),
            "html" | "htm" => Ok(FileFormat::Html),
            "xlsx" | "xls" => Ok(FileFormat::Xlsx),
            "pdf" => Ok(FileFormat::Pdf),
            "docx" => Ok(FileFormat::Docx),
            _ => Err(ParseError::UnknownFormat(name.to_string())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Tsv => "TSV",
            FileFormat::Txt => "text",
            FileFormat::Json => "JSON",
            FileFormat::Html => "HTML",
            FileFormat::Xlsx => "Excel",
            FileFormat::Pdf => "PDF",
            FileFormat::Docx => "Word",
        }
    }
}

/// One typed table value. Cells are typed individually; a column may mix
/// numbers and text if the source file does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Infer a cell from one raw field, the way a loose CSV reader would.
    pub fn infer(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Cell::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Cell::Bool(false);
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return Cell::Number(n);
            }
        }
        Cell::Text(trimmed.to_string())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Cell::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

/// Ordered named columns. Owned by the session for the lifetime of one
/// upload; replaced wholesale by the next upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Dataset {
        Dataset { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.cells.len()).unwrap_or(0)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn head(&self, n: usize) -> Dataset {
        Dataset {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    cells: c.cells.iter().take(n).cloned().collect(),
                })
                .collect(),
        }
    }

    /// Keep the rows whose index the mask selects, preserving order.
    pub fn take_rows(&self, keep: &[usize]) -> Dataset {
        Dataset {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    cells: keep.iter().map(|&i| c.cells[i].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Aligned plain-text rendering, header first, at most `max_rows` rows.
    pub fn render_text(&self, max_rows: usize) -> String {
        if self.is_empty() {
            return String::from("(empty table)");
        }
        let rows = self.row_count().min(max_rows);
        let rendered: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| c.cells.iter().take(rows).map(|v| v.render()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&rendered)
            .map(|(c, cells)| {
                cells
                    .iter()
                    .map(|s| s.chars().count())
                    .chain(std::iter::once(c.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let mut out = String::new();
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&pad(&c.name, widths[i]));
        }
        for r in 0..rows {
            out.push('\n');
            for (i, cells) in rendered.iter().enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                out.push_str(&pad(&cells[r], widths[i]));
            }
        }
        if self.row_count() > rows {
            out.push_str(&format!("\n... {} more row(s)", self.row_count() - rows));
        }
        out
    }
}

fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    let mut out = String::with_capacity(width);
    for _ in len..width {
        out.push(' ');
    }
    out.push_str(s);
    out
}

/// What one upload parsed into. Exactly one side is populated per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadedContent {
    Table(Dataset),
    Text(String),
}

impl UploadedContent {
    /// The bounded prefix embedded in prompts: the head of the table rendered
    /// as text, or the leading characters of the body.
    pub fn prompt_text(&self, head_rows: usize, max_chars: usize) -> String {
        let full = match self {
            UploadedContent::Table(ds) => ds.head(head_rows).render_text(head_rows),
            UploadedContent::Text(body) => body.clone(),
        };
        truncate_chars(&full, max_chars).to_string()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        match self {
            UploadedContent::Table(ds) => Some(ds),
            UploadedContent::Text(_) => None,
        }
    }
}

/// Char-boundary-safe prefix. Byte slicing would panic on multibyte input.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn parse_upload(bytes: &[u8], format: FileFormat) -> Result<UploadedContent, ParseError> {
    if bytes.is_empty() {
        return Err(ParseError::Empty);
    }
    match format {
        FileFormat::Csv => Ok(UploadedContent::Table(parse_delimited(bytes, b',')?)),
        FileFormat::Tsv => Ok(UploadedContent::Table(parse_delimited(bytes, b'\t')?)),
        FileFormat::Txt => Ok(UploadedContent::Text(decode_utf8(bytes, "text")?)),
        FileFormat::Json => parse_json(bytes),
        FileFormat::Html => Ok(UploadedContent::Text(strip_html(&decode_utf8(bytes, "HTML")?))),
        FileFormat::Xlsx | FileFormat::Pdf | FileFormat::Docx => {
            Err(ParseError::UnsupportedFormat(format.label().to_string()))
        }
    }
}

fn decode_utf8(bytes: &[u8], format: &'static str) -> Result<String, ParseError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ParseError::Decode {
        format,
        reason: e.to_string(),
    })
}

fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<Dataset, ParseError> {
    let format = if delimiter == b'\t' { "TSV" } else { "CSV" };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| ParseError::Decode { format, reason: e.to_string() })?
        .clone();
    if headers.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut columns: Vec<Column> = headers
        .iter()
        .map(|h| Column { name: h.trim().to_string(), cells: vec![] })
        .collect();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Decode { format, reason: e.to_string() })?;
        for (i, col) in columns.iter_mut().enumerate() {
            let raw = record.get(i).unwrap_or("");
            col.cells.push(Cell::infer(raw));
        }
    }
    Ok(Dataset::new(columns))
}

/// A JSON array of flat objects becomes a table; anything else becomes
/// pretty-printed text, the way the originals fell back to a JSON dump.
fn parse_json(bytes: &[u8]) -> Result<UploadedContent, ParseError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::Decode {
            format: "JSON",
            reason: e.to_string(),
        })?;
    if let Some(rows) = value.as_array() {
        if !rows.is_empty() && rows.iter().all(|r| r.is_object()) {
            return Ok(UploadedContent::Table(json_rows_to_dataset(rows)));
        }
    }
    let pretty = serde_json::to_string_pretty(&value).map_err(|e| ParseError::Decode {
        format: "JSON",
        reason: e.to_string(),
    })?;
    Ok(UploadedContent::Text(pretty))
}

fn json_rows_to_dataset(rows: &[serde_json::Value]) -> Dataset {
    let mut names: Vec<String> = vec![];
    for row in rows {
        if let Some(obj) = row.as_object() {
            for key in obj.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }
    }
    let columns = names
        .into_iter()
        .map(|name| {
            let cells = rows
                .iter()
                .map(|row| match row.get(&name) {
                    None | Some(serde_json::Value::Null) => Cell::Null,
                    Some(serde_json::Value::Bool(b)) => Cell::Bool(*b),
                    Some(serde_json::Value::Number(n)) => {
                        n.as_f64().map(Cell::Number).unwrap_or(Cell::Null)
                    }
                    Some(serde_json::Value::String(s)) => Cell::Text(s.clone()),
                    Some(other) => Cell::Text(other.to_string()),
                })
                .collect();
            Column { name, cells }
        })
        .collect();
    Dataset::new(columns)
}

/// Minimal tag stripper: drops markup plus script/style bodies, decodes the
/// common entities. Enough to hand readable text to the model.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        let lower = rest.to_ascii_lowercase();
        let skip_to = if lower.starts_with("<script") {
            lower.find("</script>").map(|i| i + "</script>".len())
        } else if lower.starts_with("<style") {
            lower.find("</style>").map(|i| i + "</style>".len())
        } else {
            rest.find('>').map(|i| i + 1)
        };
        match skip_to {
            Some(end) => rest = &rest[end..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let lines: Vec<&str> = decoded
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_infers_cell_types() {
        let data = b"region,sales,active\nNorth,100,true\nSouth,250.5,false\nEast,,true\n";
        let content = parse_upload(data, FileFormat::Csv).unwrap();
        let ds = content.dataset().unwrap();
        assert_eq!(ds.column_names(), vec!["region", "sales", "active"]);
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column("sales").unwrap().cells[1], Cell::Number(250.5));
        assert_eq!(ds.column("sales").unwrap().cells[2], Cell::Null);
        assert_eq!(ds.column("active").unwrap().cells[0], Cell::Bool(true));
        assert_eq!(
            ds.column("region").unwrap().cells[0],
            Cell::Text("North".into())
        );
    }

    #[test]
    fn tsv_uses_tab_delimiter() {
        let data = b"a\tb\n1\t2\n";
        let ds = parse_upload(data, FileFormat::Tsv).unwrap();
        assert_eq!(ds.dataset().unwrap().row_count(), 1);
    }

    #[test]
    fn short_rows_pad_with_null() {
        let data = b"a,b,c\n1,2\n";
        let content = parse_upload(data, FileFormat::Csv).unwrap();
        let ds = content.dataset().unwrap();
        assert_eq!(ds.column("c").unwrap().cells[0], Cell::Null);
    }

    #[test]
    fn json_array_of_objects_becomes_table() {
        let data = br#"[{"name":"a","n":1},{"name":"b","n":2}]"#;
        let content = parse_upload(data, FileFormat::Json).unwrap();
        let ds = content.dataset().unwrap();
        // serde_json orders object keys, so "n" sorts before "name"
        assert_eq!(ds.column_names(), vec!["n", "name"]);
        assert_eq!(ds.column("n").unwrap().cells[1], Cell::Number(2.0));
        assert_eq!(ds.column("name").unwrap().cells[0], Cell::Text("a".into()));
    }

    #[test]
    fn other_json_becomes_pretty_text() {
        let data = br#"{"title":"report","pages":3}"#;
        match parse_upload(data, FileFormat::Json).unwrap() {
            UploadedContent::Text(body) => assert!(body.contains("\"title\": \"report\"")),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn html_is_stripped_to_text() {
        let data = b"<html><style>p{color:red}</style><body><h1>Q3 Report</h1><p>Sales &amp; margins</p></body></html>";
        match parse_upload(data, FileFormat::Html).unwrap() {
            UploadedContent::Text(body) => {
                assert!(body.contains("Q3 Report"));
                assert!(body.contains("Sales & margins"));
                assert!(!body.contains("color:red"));
            }
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(
            parse_upload(b"", FileFormat::Csv),
            Err(ParseError::Empty)
        ));
    }

    #[test]
    fn binary_formats_report_unsupported() {
        let err = parse_upload(b"PK\x03\x04", FileFormat::Xlsx).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn format_from_name() {
        assert_eq!(FileFormat::from_name("sales.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_name("page.htm").unwrap(), FileFormat::Html);
        assert!(FileFormat::from_name("archive.zip").is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 4), "héll");
        assert_eq!(truncate_chars(s, 100), s);
    }

    #[test]
    fn render_text_is_aligned_and_bounded() {
        let ds = Dataset::new(vec![
            Column {
                name: "region".into(),
                cells: vec![Cell::Text("North".into()), Cell::Text("S".into())],
            },
            Column {
                name: "sales".into(),
                cells: vec![Cell::Number(100.0), Cell::Number(2.0)],
            },
        ]);
        let text = ds.render_text(1);
        assert!(text.starts_with("region  sales"));
        assert!(text.contains("North"));
        assert!(text.contains("1 more row"));
        assert!(!text.contains('\u{0}'));
    }

    #[test]
    fn prompt_text_bounds_table_and_body() {
        let body = "x".repeat(5000);
        let content = UploadedContent::Text(body);
        assert_eq!(content.prompt_text(15, 3000).chars().count(), 3000);
    }
}
