use crate::chart::ChartSpec;
use crate::dataset::Dataset;
use crate::runs::{append_manifest, ManifestEntry};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;

/// Everything the pipeline may show the user. The executor only ever emits
/// chart and table renders; the orchestration adds text, code, and errors.
pub trait RenderSurface: Send + Sync {
    fn text(&self, body: &str);
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    /// The audit step: the extracted code, shown before it runs.
    fn code(&self, code: &str);
    fn table(&self, table: &Dataset);
    fn chart(&self, spec: &ChartSpec);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rendered {
    Text { body: String },
    Info { message: String },
    Error { message: String },
    Code { code: String },
    Table { table: Dataset },
    Chart { spec: ChartSpec },
}

/// Captures renders in order. Backs tests and the HTTP responses.
#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<Rendered>>,
}

impl RecordingSurface {
    pub fn new() -> RecordingSurface {
        RecordingSurface::default()
    }

    pub fn events(&self) -> Vec<Rendered> {
        self.events.lock().clone()
    }

    pub fn charts(&self) -> Vec<ChartSpec> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Rendered::Chart { spec } => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Rendered) {
        self.events.lock().push(event);
    }
}

impl RenderSurface for RecordingSurface {
    fn text(&self, body: &str) {
        self.push(Rendered::Text { body: body.to_string() });
    }
    fn info(&self, message: &str) {
        self.push(Rendered::Info { message: message.to_string() });
    }
    fn error(&self, message: &str) {
        self.push(Rendered::Error { message: message.to_string() });
    }
    fn code(&self, code: &str) {
        self.push(Rendered::Code { code: code.to_string() });
    }
    fn table(&self, table: &Dataset) {
        self.push(Rendered::Table { table: table.clone() });
    }
    fn chart(&self, spec: &ChartSpec) {
        self.push(Rendered::Chart { spec: spec.clone() });
    }
}

/// Prints to stdout. The CLI's display layer.
pub struct TerminalSurface {
    pub table_rows: usize,
}

impl Default for TerminalSurface {
    fn default() -> Self {
        TerminalSurface { table_rows: 20 }
    }
}

impl RenderSurface for TerminalSurface {
    fn text(&self, body: &str) {
        println!("{}", body);
    }
    fn info(&self, message: &str) {
        println!("{}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("error: {}", message);
    }
    fn code(&self, code: &str) {
        println!("--- generated code ---\n{}\n----------------------", code.trim_end());
    }
    fn table(&self, table: &Dataset) {
        println!("{}", table.render_text(self.table_rows));
    }
    fn chart(&self, spec: &ChartSpec) {
        let title = spec.title.as_deref().unwrap_or("untitled");
        println!("[{} chart] {}", spec.kind.label(), title);
    }
}

/// Wraps another surface and additionally persists each chart as a vega-lite
/// artifact in the run directory's manifest. Writes are best-effort: a failed
/// artifact write is logged and the render still reaches the inner surface.
pub struct ArtifactSurface<S> {
    inner: S,
    run_dir: PathBuf,
    seq: Mutex<usize>,
}

impl<S: RenderSurface> ArtifactSurface<S> {
    pub fn new(run_dir: PathBuf, inner: S) -> ArtifactSurface<S> {
        ArtifactSurface { inner, run_dir, seq: Mutex::new(0) }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn persist(&self, spec: &ChartSpec) {
        let n = {
            let mut seq = self.seq.lock();
            *seq += 1;
            *seq
        };
        let name = format!("chart-{:02}.vl.json", n);
        let path = self.run_dir.join(&name);
        let write = serde_json::to_vec_pretty(&spec.to_vega_lite())
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(anyhow::Error::from))
            .and_then(|_| {
                append_manifest(
                    &self.run_dir,
                    ManifestEntry {
                        r#type: "vega_lite".into(),
                        path: name.clone(),
                        mime: "application/vnd.vegalite+json".into(),
                        title: spec.title.clone(),
                    },
                )
            });
        if let Err(e) = write {
            tracing::warn!(artifact = %name, "failed to persist chart artifact: {e}");
        }
    }
}

impl<S: RenderSurface> RenderSurface for ArtifactSurface<S> {
    fn text(&self, body: &str) {
        self.inner.text(body);
    }
    fn info(&self, message: &str) {
        self.inner.info(message);
    }
    fn error(&self, message: &str) {
        self.inner.error(message);
    }
    fn code(&self, code: &str) {
        self.inner.code(code);
    }
    fn table(&self, table: &Dataset) {
        self.inner.table(table);
    }
    fn chart(&self, spec: &ChartSpec) {
        self.persist(spec);
        self.inner.chart(spec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Axis, ChartKind};
    use crate::dataset::Cell;
    use tempfile::tempdir;

    fn spec() -> ChartSpec {
        ChartSpec {
            kind: ChartKind::Bar,
            title: Some("t".into()),
            x: Axis { name: "x".into(), values: vec![Cell::Text("a".into())] },
            y: Some(Axis { name: "y".into(), values: vec![Cell::Number(1.0)] }),
            bins: None,
        }
    }

    #[test]
    fn recording_surface_keeps_order() {
        let surface = RecordingSurface::new();
        surface.text("answer");
        surface.code("chart.bar(df)");
        surface.chart(&spec());
        let events = surface.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Rendered::Text { .. }));
        assert!(matches!(events[2], Rendered::Chart { .. }));
        assert_eq!(surface.charts().len(), 1);
    }

    #[test]
    fn artifact_surface_writes_manifest_entries() {
        let dir = tempdir().unwrap();
        let surface = ArtifactSurface::new(dir.path().to_path_buf(), RecordingSurface::new());
        surface.chart(&spec());
        surface.chart(&spec());
        assert!(dir.path().join("chart-01.vl.json").exists());
        assert!(dir.path().join("chart-02.vl.json").exists());
        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 2);
        assert_eq!(manifest["artifacts"][0]["type"], "vega_lite");
        assert_eq!(surface.inner().charts().len(), 2);
    }
}
