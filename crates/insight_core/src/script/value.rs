use crate::dataset::{Cell, Column, Dataset};

/// Runtime values. The capability values (`ChartModule`, `TableModule`,
/// `ShowFn`) exist only so the fixed context names can flow through the same
/// evaluator as data; they carry no state.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Table(Dataset),
    Column(Column),
    Grouped(Grouped),
    ChartModule,
    TableModule,
    ShowFn,
}

/// Result of `df.group_by(col)`: the source rows plus the grouping key,
/// waiting for an aggregation method.
#[derive(Debug, Clone)]
pub struct Grouped {
    pub table: Dataset,
    pub key: String,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "nothing",
            Value::Bool(_) => "a boolean",
            Value::Num(_) => "a number",
            Value::Str(_) => "a string",
            Value::List(_) => "a list",
            Value::Table(_) => "a table",
            Value::Column(_) => "a column",
            Value::Grouped(_) => "a grouping",
            Value::ChartModule => "the chart module",
            Value::TableModule => "the table module",
            Value::ShowFn => "the show function",
        }
    }

    pub fn to_cell(&self) -> Option<Cell> {
        match self {
            Value::Unit => Some(Cell::Null),
            Value::Bool(b) => Some(Cell::Bool(*b)),
            Value::Num(n) => Some(Cell::Number(*n)),
            Value::Str(s) => Some(Cell::Text(s.clone())),
            _ => None,
        }
    }

    pub fn from_cell(cell: &Cell) -> Value {
        match cell {
            Cell::Null => Value::Unit,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Number(n) => Value::Num(*n),
            Cell::Text(s) => Value::Str(s.clone()),
        }
    }

    /// Display form for `show()` on scalar-ish values.
    pub fn render(&self) -> String {
        match self {
            Value::Unit => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => Cell::Number(*n).render(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", parts.join(", "))
            }
            other => other.type_name().to_string(),
        }
    }
}
