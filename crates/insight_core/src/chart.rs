use crate::dataset::Cell;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
}

impl ChartKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<Cell>,
}

/// A fully-resolved chart: pure data, no drawing. Rendering surfaces decide
/// what to do with it (terminal summary, vega-lite artifact, HTTP payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub x: Axis,
    /// Absent for histograms, which bin a single axis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,
}

impl ChartSpec {
    /// Encode as a vega-lite v5 spec, the artifact format stored in run
    /// manifests.
    pub fn to_vega_lite(&self) -> serde_json::Value {
        let values: Vec<serde_json::Value> = (0..self.x.values.len())
            .map(|i| {
                let mut row = serde_json::Map::new();
                row.insert(self.x.name.clone(), cell_json(&self.x.values[i]));
                if let Some(y) = &self.y {
                    row.insert(
                        y.name.clone(),
                        y.values.get(i).map(cell_json).unwrap_or(serde_json::Value::Null),
                    );
                }
                serde_json::Value::Object(row)
            })
            .collect();

        let encoding = match self.kind {
            ChartKind::Bar | ChartKind::Line | ChartKind::Scatter => {
                let y = self.y.as_ref().expect("xy chart carries a y axis");
                json!({
                    "x": {"field": self.x.name, "type": "nominal"},
                    "y": {"field": y.name, "type": "quantitative"},
                })
            }
            ChartKind::Pie => {
                let y = self.y.as_ref().expect("pie carries a value axis");
                json!({
                    "theta": {"field": y.name, "type": "quantitative"},
                    "color": {"field": self.x.name, "type": "nominal"},
                })
            }
            ChartKind::Histogram => json!({
                "x": {
                    "field": self.x.name,
                    "type": "quantitative",
                    "bin": {"maxbins": self.bins.unwrap_or(10)},
                },
                "y": {"aggregate": "count", "type": "quantitative"},
            }),
        };

        let mark = match self.kind {
            ChartKind::Bar | ChartKind::Histogram => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "point",
            ChartKind::Pie => "arc",
        };

        let mut spec = json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "mark": mark,
            "data": {"values": values},
            "encoding": encoding,
        });
        if let Some(title) = &self.title {
            spec["title"] = json!(title);
        }
        spec
    }
}

fn cell_json(cell: &Cell) -> serde_json::Value {
    match cell {
        Cell::Null => serde_json::Value::Null,
        Cell::Bool(b) => json!(b),
        Cell::Number(n) => json!(n),
        Cell::Text(s) => json!(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(kind: ChartKind) -> ChartSpec {
        ChartSpec {
            kind,
            title: Some("Sales by region".into()),
            x: Axis {
                name: "region".into(),
                values: vec![Cell::Text("North".into()), Cell::Text("South".into())],
            },
            y: Some(Axis {
                name: "sales".into(),
                values: vec![Cell::Number(100.0), Cell::Number(250.0)],
            }),
            bins: None,
        }
    }

    #[test]
    fn bar_encodes_nominal_x_quantitative_y() {
        let spec = xy(ChartKind::Bar).to_vega_lite();
        assert_eq!(spec["mark"], "bar");
        assert_eq!(spec["encoding"]["x"]["field"], "region");
        assert_eq!(spec["encoding"]["y"]["field"], "sales");
        assert_eq!(spec["data"]["values"][1]["sales"], 250.0);
        assert_eq!(spec["title"], "Sales by region");
    }

    #[test]
    fn pie_uses_theta_and_color() {
        let spec = xy(ChartKind::Pie).to_vega_lite();
        assert_eq!(spec["mark"], "arc");
        assert_eq!(spec["encoding"]["theta"]["field"], "sales");
        assert_eq!(spec["encoding"]["color"]["field"], "region");
    }

    #[test]
    fn histogram_bins_single_axis() {
        let spec = ChartSpec {
            kind: ChartKind::Histogram,
            title: None,
            x: Axis {
                name: "sales".into(),
                values: vec![Cell::Number(1.0), Cell::Number(2.0), Cell::Number(2.5)],
            },
            y: None,
            bins: Some(4),
        }
        .to_vega_lite();
        assert_eq!(spec["mark"], "bar");
        assert_eq!(spec["encoding"]["x"]["bin"]["maxbins"], 4);
        assert_eq!(spec["encoding"]["y"]["aggregate"], "count");
        assert!(spec.get("title").is_none());
    }
}
