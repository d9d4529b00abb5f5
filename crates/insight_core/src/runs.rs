use anyhow::Result;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::{Path, PathBuf}};
use uuid::Uuid;

pub fn app_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "InsightBot", "InsightBot")
        .ok_or_else(|| anyhow::anyhow!("ProjectDirs unavailable"))
}

pub fn default_runs_root() -> Result<PathBuf> {
    if let Ok(custom_dir) = env::var("INSIGHT_RUNS_DIR") {
        let root = PathBuf::from(custom_dir);
        fs::create_dir_all(&root)?;
        return Ok(root);
    }
    let pd = app_dirs()?;
    let root = pd.data_dir().join("runs");
    fs::create_dir_all(&root)?;
    Ok(root)
}

#[derive(Debug, Clone)]
pub struct RunInfo {
    pub id: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    pub artifacts: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub r#type: String, // e.g., "vega_lite"
    pub path: String,   // relative path under run dir
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One question/answer turn, persisted under the run's cards/ directory so
/// past turns can be inspected after the session is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnCard {
    pub ts_utc: DateTime<Utc>,
    pub run_id: String,
    pub question: String,
    pub answer: Option<String>,
    pub code: Option<String>,
    pub outcome: String,
}

impl TurnCard {
    pub fn save(&self, run_dir: &Path) -> Result<PathBuf> {
        let ts = self.ts_utc.format("%Y%m%d-%H%M%S").to_string();
        let file = run_dir.join("cards").join(format!("{}-{}.json", ts, self.outcome));
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file, serde_json::to_vec_pretty(self)?)?;
        Ok(file)
    }
}

pub fn create_new_run(base: Option<&Path>) -> Result<RunInfo> {
    let id = Uuid::new_v4().to_string();
    let root = match base {
        Some(b) => b.to_path_buf(),
        None => default_runs_root()?,
    };
    let dir = root.join(&id);
    fs::create_dir_all(dir.join("cards"))?;
    let manifest_path = dir.join("manifest.json");
    fs::write(&manifest_path, serde_json::to_vec_pretty(&Manifest::default())?)?;
    Ok(RunInfo { id, dir })
}

pub fn append_manifest(run_dir: &Path, entry: ManifestEntry) -> Result<()> {
    let path = run_dir.join("manifest.json");
    let mut manifest: Manifest = if path.exists() {
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).unwrap_or_default()
    } else {
        Manifest::default()
    };
    manifest.artifacts.push(entry);
    fs::write(&path, serde_json::to_vec_pretty(&manifest)?)?;
    Ok(())
}

pub fn read_manifest(run_dir: &Path) -> Result<Manifest> {
    let bytes = fs::read(run_dir.join("manifest.json"))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn list_runs(root: &Path, limit: usize) -> Result<Vec<RunInfo>> {
    let mut runs = vec![];
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            runs.push(RunInfo {
                id: entry.file_name().to_string_lossy().to_string(),
                dir: entry.path(),
            });
        }
    }
    runs.sort_by(|a, b| b.id.cmp(&a.id));
    if runs.len() > limit {
        runs.truncate(limit);
    }
    Ok(runs)
}

pub fn is_path_within(base: &Path, candidate: &Path) -> bool {
    match candidate.canonicalize().and_then(|p| base.canonicalize().map(|b| (b, p))) {
        Ok((b, p)) => p.starts_with(b),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_run_has_cards_dir_and_empty_manifest() {
        let base = tempdir().unwrap();
        let run = create_new_run(Some(base.path())).unwrap();
        assert!(run.dir.join("cards").is_dir());
        let manifest = read_manifest(&run.dir).unwrap();
        assert!(manifest.artifacts.is_empty());
    }

    #[test]
    fn manifest_appends_accumulate() {
        let base = tempdir().unwrap();
        let run = create_new_run(Some(base.path())).unwrap();
        for i in 0..2 {
            append_manifest(
                &run.dir,
                ManifestEntry {
                    r#type: "vega_lite".into(),
                    path: format!("chart-{:02}.vl.json", i + 1),
                    mime: "application/vnd.vegalite+json".into(),
                    title: None,
                },
            )
            .unwrap();
        }
        assert_eq!(read_manifest(&run.dir).unwrap().artifacts.len(), 2);
    }

    #[test]
    fn turn_card_round_trips() {
        let base = tempdir().unwrap();
        let run = create_new_run(Some(base.path())).unwrap();
        let card = TurnCard {
            ts_utc: Utc::now(),
            run_id: run.id.clone(),
            question: "show sales by region".into(),
            answer: Some("Here is the chart.".into()),
            code: Some("chart.bar(df, x=\"region\", y=\"sales\")".into()),
            outcome: "chart_rendered".into(),
        };
        let path = card.save(&run.dir).unwrap();
        let loaded: TurnCard = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(loaded.question, card.question);
        assert_eq!(loaded.outcome, "chart_rendered");
    }

    #[test]
    fn list_runs_is_bounded() {
        let base = tempdir().unwrap();
        for _ in 0..3 {
            create_new_run(Some(base.path())).unwrap();
        }
        assert_eq!(list_runs(base.path(), 2).unwrap().len(), 2);
        assert_eq!(list_runs(base.path(), 10).unwrap().len(), 3);
    }

    #[test]
    fn path_containment_rejects_escape() {
        let base = tempdir().unwrap();
        let run = create_new_run(Some(base.path())).unwrap();
        let inside = run.dir.join("manifest.json");
        assert!(is_path_within(&run.dir, &inside));
        assert!(!is_path_within(&run.dir, &base.path().join("..")));
    }
}
