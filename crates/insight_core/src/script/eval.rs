use super::parser::{parse, Arg, BinOp, Expr, Stmt};
use super::value::{Grouped, Value};
use super::ScriptError;
use crate::chart::{Axis, ChartKind, ChartSpec};
use crate::dataset::{Cell, Column, Dataset};
use crate::error::ExecutionError;
use crate::render::RenderSurface;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

/// Evaluation bounds. Scripts have no loops, so the step budget mostly guards
/// against degenerate generated code; the depth limit bounds parser recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_steps: 10_000, max_depth: 64 }
    }
}

/// The complete name set visible to a script. Built fresh per execution and
/// dropped right after; nothing else from the host resolves.
pub struct ExecutionContext<'a> {
    pub dataset: &'a Dataset,
    pub surface: &'a dyn RenderSurface,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub charts: usize,
    pub tables: usize,
}

/// Run one extracted code fragment. Exactly one attempt; every fault comes
/// back as an [`ExecutionError`] instead of unwinding into the session.
pub fn execute(code: &str, ctx: &ExecutionContext) -> Result<ExecutionReport, ExecutionError> {
    let stmts = parse(code, ctx.limits.max_depth)?;
    let mut ev = Evaluator {
        ctx,
        locals: HashMap::new(),
        steps: 0,
        report: ExecutionReport::default(),
    };
    for stmt in &stmts {
        ev.eval_stmt(stmt)?;
    }
    Ok(ev.report)
}

struct Evaluator<'a, 'b> {
    ctx: &'b ExecutionContext<'a>,
    locals: HashMap<String, Value>,
    steps: usize,
    report: ExecutionReport,
}

struct EvArg {
    name: Option<String>,
    value: Value,
}

impl<'a, 'b> Evaluator<'a, 'b> {
    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.ctx.limits.max_steps {
            return Err(ScriptError::Budget(self.ctx.limits.max_steps));
        }
        Ok(())
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        match stmt {
            Stmt::Assign { name, value } => {
                let v = self.eval_expr(value)?;
                self.locals.insert(name.clone(), v);
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(())
            }
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.tick()?;
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::List(items) => {
                let mut out = vec![];
                for item in items {
                    out.push(self.eval_expr(item)?);
                }
                Ok(Value::List(out))
            }
            Expr::Name(name) => self.lookup(name),
            Expr::Attr { name, .. } => Err(ScriptError::Type(format!(
                "'{}' is a method; call it with (...)",
                name
            ))),
            Expr::Call { target, args } => self.eval_call(target, args),
            Expr::Index { recv, key } => {
                let recv = self.eval_expr(recv)?;
                let key = self.eval_expr(key)?;
                match (recv, key) {
                    (Value::Table(ds), Value::Str(name)) => ds
                        .column(&name)
                        .cloned()
                        .map(Value::Column)
                        .ok_or(ScriptError::UnknownColumn(name)),
                    (Value::Table(_), other) => Err(ScriptError::Type(format!(
                        "column selection needs a string name, got {}",
                        other.type_name()
                    ))),
                    (other, _) => Err(ScriptError::Type(format!(
                        "{} cannot be indexed",
                        other.type_name()
                    ))),
                }
            }
            Expr::Neg(inner) => match self.eval_expr(inner)? {
                Value::Num(n) => Ok(Value::Num(-n)),
                other => Err(ScriptError::Type(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                self.binary(*op, lhs, rhs)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(v) = self.locals.get(name) {
            return Ok(v.clone());
        }
        match name {
            "df" => Ok(Value::Table(self.ctx.dataset.clone())),
            "chart" => Ok(Value::ChartModule),
            "table" => Ok(Value::TableModule),
            "show" => Ok(Value::ShowFn),
            _ => Err(ScriptError::NameNotDefined(name.to_string())),
        }
    }

    fn binary(&self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
        match (op, lhs, rhs) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (BinOp::Div, Value::Num(_), Value::Num(b)) if b == 0.0 => {
                Err(ScriptError::Type("division by zero".into()))
            }
            (op, Value::Num(a), Value::Num(b)) => Ok(Value::Num(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
            })),
            (_, lhs, rhs) => Err(ScriptError::Type(format!(
                "arithmetic needs numbers, got {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    fn eval_call(&mut self, target: &Expr, args: &[Arg]) -> Result<Value, ScriptError> {
        if let Expr::Attr { recv, name } = target {
            let recv = self.eval_expr(recv)?;
            let args = self.eval_args(args)?;
            return self.call_method(recv, name, args);
        }
        let f = self.eval_expr(target)?;
        match f {
            Value::ShowFn => {
                let args = self.eval_args(args)?;
                self.show(args)
            }
            other => Err(ScriptError::Type(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    fn eval_args(&mut self, args: &[Arg]) -> Result<Vec<EvArg>, ScriptError> {
        let mut out = vec![];
        for arg in args {
            out.push(EvArg {
                name: arg.name.clone(),
                value: self.eval_expr(&arg.value)?,
            });
        }
        Ok(out)
    }

    fn call_method(
        &mut self,
        recv: Value,
        name: &str,
        args: Vec<EvArg>,
    ) -> Result<Value, ScriptError> {
        match recv {
            Value::Table(ds) => self.table_method(ds, name, args),
            Value::Grouped(g) => self.grouped_method(g, name, args),
            Value::Column(c) => self.column_method(c, name, args),
            Value::ChartModule => self.chart_method(name, args),
            Value::TableModule => self.table_module_method(name, args),
            other => Err(ScriptError::UnknownMethod {
                type_name: other.type_name(),
                method: name.to_string(),
            }),
        }
    }

    fn table_method(
        &mut self,
        ds: Dataset,
        name: &str,
        args: Vec<EvArg>,
    ) -> Result<Value, ScriptError> {
        let call = format!("df.{}", name);
        let mut args = CallArgs::new(&call, args)?;
        match name {
            "columns" => {
                args.finish()?;
                Ok(Value::List(
                    ds.column_names().into_iter().map(Value::Str).collect(),
                ))
            }
            "count" => {
                args.finish()?;
                Ok(Value::Num(ds.row_count() as f64))
            }
            "head" => {
                let n = expect_num(args.require_pos("row count")?, &call)?;
                args.finish()?;
                Ok(Value::Table(ds.head(n.max(0.0) as usize)))
            }
            "select" => {
                let names = expect_str_list(args.require_pos("column list")?, &call)?;
                args.finish()?;
                let mut columns = vec![];
                for n in names {
                    columns.push(
                        ds.column(&n).cloned().ok_or(ScriptError::UnknownColumn(n))?,
                    );
                }
                Ok(Value::Table(Dataset::new(columns)))
            }
            "filter" => {
                let col = expect_str(args.require_pos("column name")?, &call)?;
                let op = parse_cmp(&expect_str(args.require_pos("operator")?, &call)?, &call)?;
                let rhs = args
                    .require_pos("comparison value")?
                    .to_cell()
                    .ok_or_else(|| ScriptError::Arguments {
                        call: call.clone(),
                        message: "comparison value must be a number, string, or boolean".into(),
                    })?;
                args.finish()?;
                let column = ds
                    .column(&col)
                    .ok_or(ScriptError::UnknownColumn(col))?
                    .clone();
                let keep: Vec<usize> = column
                    .cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cmp_matches(cell, op, &rhs))
                    .map(|(i, _)| i)
                    .collect();
                Ok(Value::Table(ds.take_rows(&keep)))
            }
            "sort_by" => {
                let col = expect_str(args.require_pos("column name")?, &call)?;
                let desc = match args.next_pos() {
                    Some(v) => expect_bool(v, &call)?,
                    None => match args.kw("desc") {
                        Some(v) => expect_bool(v, &call)?,
                        None => false,
                    },
                };
                args.finish()?;
                let column = ds
                    .column(&col)
                    .ok_or(ScriptError::UnknownColumn(col))?
                    .clone();
                let mut order: Vec<usize> = (0..ds.row_count()).collect();
                order.sort_by(|&a, &b| cmp_cells(&column.cells[a], &column.cells[b]));
                if desc {
                    order.reverse();
                }
                Ok(Value::Table(ds.take_rows(&order)))
            }
            "group_by" => {
                let key = expect_str(args.require_pos("column name")?, &call)?;
                args.finish()?;
                if ds.column(&key).is_none() {
                    return Err(ScriptError::UnknownColumn(key));
                }
                Ok(Value::Grouped(Grouped { table: ds, key }))
            }
            _ => Err(ScriptError::UnknownMethod {
                type_name: "a table",
                method: name.to_string(),
            }),
        }
    }

    fn grouped_method(
        &mut self,
        g: Grouped,
        name: &str,
        args: Vec<EvArg>,
    ) -> Result<Value, ScriptError> {
        let call = format!("group_by(\"{}\").{}", g.key, name);
        let mut args = CallArgs::new(&call, args)?;
        let (agg_name, value_col) = match name {
            "count" => {
                args.finish()?;
                (name, None)
            }
            "sum" | "mean" | "min" | "max" => {
                let col = expect_str(args.require_pos("column name")?, &call)?;
                args.finish()?;
                (name, Some(col))
            }
            _ => {
                return Err(ScriptError::UnknownMethod {
                    type_name: "a grouping",
                    method: name.to_string(),
                })
            }
        };

        let key_col = g
            .table
            .column(&g.key)
            .cloned()
            .ok_or_else(|| ScriptError::UnknownColumn(g.key.clone()))?;
        let values = match &value_col {
            Some(col) => Some(
                g.table
                    .column(col)
                    .cloned()
                    .ok_or_else(|| ScriptError::UnknownColumn(col.clone()))?,
            ),
            None => None,
        };

        // Groups in first-appearance order so results are deterministic.
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Cell, Vec<f64>, usize)> = vec![];
        for (i, key_cell) in key_col.cells.iter().enumerate() {
            let key = key_cell.render();
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push((key_cell.clone(), vec![], 0));
                groups.len() - 1
            });
            groups[slot].2 += 1;
            if let Some(values) = &values {
                if let Some(n) = values.cells[i].as_number() {
                    groups[slot].1.push(n);
                }
            }
        }

        let out_name = value_col.unwrap_or_else(|| "count".to_string());
        let mut keys = vec![];
        let mut cells = vec![];
        for (key_cell, nums, count) in groups {
            keys.push(key_cell);
            let cell = match agg_name {
                "count" => Cell::Number(count as f64),
                "sum" => Cell::Number(nums.iter().sum()),
                "mean" => {
                    if nums.is_empty() {
                        Cell::Null
                    } else {
                        Cell::Number(nums.iter().sum::<f64>() / nums.len() as f64)
                    }
                }
                "min" => nums
                    .iter()
                    .cloned()
                    .fold(None, |acc: Option<f64>, n| {
                        Some(acc.map_or(n, |a| a.min(n)))
                    })
                    .map(Cell::Number)
                    .unwrap_or(Cell::Null),
                _ => nums
                    .iter()
                    .cloned()
                    .fold(None, |acc: Option<f64>, n| {
                        Some(acc.map_or(n, |a| a.max(n)))
                    })
                    .map(Cell::Number)
                    .unwrap_or(Cell::Null),
            };
            cells.push(cell);
        }
        Ok(Value::Table(Dataset::new(vec![
            Column { name: g.key, cells: keys },
            Column { name: out_name, cells },
        ])))
    }

    fn column_method(
        &mut self,
        c: Column,
        name: &str,
        args: Vec<EvArg>,
    ) -> Result<Value, ScriptError> {
        let call = format!("df[\"{}\"].{}", c.name, name);
        let mut args = CallArgs::new(&call, args)?;
        args.finish()?;
        let nums: Vec<f64> = c.cells.iter().filter_map(|cell| cell.as_number()).collect();
        match name {
            "sum" => Ok(Value::Num(nums.iter().sum())),
            "count" => Ok(Value::Num(
                c.cells.iter().filter(|cell| **cell != Cell::Null).count() as f64,
            )),
            "mean" | "min" | "max" => {
                if nums.is_empty() {
                    return Err(ScriptError::Type(format!(
                        "column '{}' has no numeric values",
                        c.name
                    )));
                }
                let v = match name {
                    "mean" => nums.iter().sum::<f64>() / nums.len() as f64,
                    "min" => nums.iter().cloned().fold(f64::INFINITY, f64::min),
                    _ => nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                };
                Ok(Value::Num(v))
            }
            "unique" => {
                let mut seen: Vec<Cell> = vec![];
                for cell in &c.cells {
                    if *cell != Cell::Null && !seen.contains(cell) {
                        seen.push(cell.clone());
                    }
                }
                Ok(Value::List(seen.iter().map(Value::from_cell).collect()))
            }
            _ => Err(ScriptError::UnknownMethod {
                type_name: "a column",
                method: name.to_string(),
            }),
        }
    }

    fn chart_method(&mut self, name: &str, args: Vec<EvArg>) -> Result<Value, ScriptError> {
        let call = format!("chart.{}", name);
        let mut args = CallArgs::new(&call, args)?;
        let kind = match name {
            "bar" => ChartKind::Bar,
            "line" => ChartKind::Line,
            "scatter" => ChartKind::Scatter,
            "pie" => ChartKind::Pie,
            "hist" => ChartKind::Histogram,
            _ => {
                return Err(ScriptError::UnknownMethod {
                    type_name: "the chart module",
                    method: name.to_string(),
                })
            }
        };
        let title = match args.kw("title") {
            Some(v) => Some(expect_str(v, &call)?),
            None => None,
        };

        let spec = match kind {
            ChartKind::Bar | ChartKind::Line | ChartKind::Scatter => {
                let first = args.require_pos("data")?;
                let (x, y) = match first {
                    Value::Table(ds) => {
                        let x_name = expect_str(
                            args.kw("x").ok_or_else(|| missing_kw(&call, "x"))?,
                            &call,
                        )?;
                        let y_name = expect_str(
                            args.kw("y").ok_or_else(|| missing_kw(&call, "y"))?,
                            &call,
                        )?;
                        let x = ds
                            .column(&x_name)
                            .cloned()
                            .ok_or(ScriptError::UnknownColumn(x_name))?;
                        let y = ds
                            .column(&y_name)
                            .cloned()
                            .ok_or(ScriptError::UnknownColumn(y_name))?;
                        (
                            Axis { name: x.name, values: x.cells },
                            Axis { name: y.name, values: y.cells },
                        )
                    }
                    other => {
                        let x = axis_from(other, "x", &call)?;
                        let y = axis_from(args.require_pos("y values")?, "y", &call)?;
                        if x.values.len() != y.values.len() {
                            return Err(ScriptError::Arguments {
                                call: call.clone(),
                                message: "x and y lengths differ".into(),
                            });
                        }
                        (x, y)
                    }
                };
                args.finish()?;
                ChartSpec { kind, title, x, y: Some(y), bins: None }
            }
            ChartKind::Pie => {
                let labels = axis_from(args.require_pos("labels")?, "label", &call)?;
                let values = axis_from(args.require_pos("values")?, "value", &call)?;
                args.finish()?;
                if labels.values.len() != values.values.len() {
                    return Err(ScriptError::Arguments {
                        call,
                        message: "labels and values lengths differ".into(),
                    });
                }
                ChartSpec { kind, title, x: labels, y: Some(values), bins: None }
            }
            ChartKind::Histogram => {
                let values = axis_from(args.require_pos("values")?, "value", &call)?;
                let bins = match args.kw("bins") {
                    Some(v) => {
                        let n = expect_num(v, &call)?;
                        if n < 1.0 {
                            return Err(ScriptError::Arguments {
                                call,
                                message: "bins must be at least 1".into(),
                            });
                        }
                        Some(n as usize)
                    }
                    None => None,
                };
                args.finish()?;
                ChartSpec { kind, title, x: values, y: None, bins }
            }
        };

        self.ctx.surface.chart(&spec);
        self.report.charts += 1;
        Ok(Value::Unit)
    }

    fn table_module_method(
        &mut self,
        name: &str,
        args: Vec<EvArg>,
    ) -> Result<Value, ScriptError> {
        let call = format!("table.{}", name);
        let mut args = CallArgs::new(&call, args)?;
        match name {
            "new" => {
                let names = expect_str_list(args.require_pos("column names")?, &call)?;
                let rows = match args.require_pos("rows")? {
                    Value::List(rows) => rows,
                    other => {
                        return Err(ScriptError::Arguments {
                            call,
                            message: format!("rows must be a list, got {}", other.type_name()),
                        })
                    }
                };
                args.finish()?;
                let mut columns: Vec<Column> = names
                    .iter()
                    .map(|n| Column { name: n.clone(), cells: vec![] })
                    .collect();
                for row in rows {
                    let items = match row {
                        Value::List(items) => items,
                        other => {
                            return Err(ScriptError::Arguments {
                                call,
                                message: format!(
                                    "each row must be a list, got {}",
                                    other.type_name()
                                ),
                            })
                        }
                    };
                    if items.len() != columns.len() {
                        return Err(ScriptError::Arguments {
                            call,
                            message: format!(
                                "row has {} values but there are {} columns",
                                items.len(),
                                columns.len()
                            ),
                        });
                    }
                    for (col, item) in columns.iter_mut().zip(items) {
                        let cell = item.to_cell().ok_or_else(|| ScriptError::Arguments {
                            call: call.clone(),
                            message: format!(
                                "cells must be numbers, strings, or booleans, got {}",
                                item.type_name()
                            ),
                        })?;
                        col.cells.push(cell);
                    }
                }
                Ok(Value::Table(Dataset::new(columns)))
            }
            _ => Err(ScriptError::UnknownMethod {
                type_name: "the table module",
                method: name.to_string(),
            }),
        }
    }

    fn show(&mut self, args: Vec<EvArg>) -> Result<Value, ScriptError> {
        let mut args = CallArgs::new("show", args)?;
        let value = args.require_pos("value")?;
        args.finish()?;
        match value {
            Value::Table(ds) => {
                self.ctx.surface.table(&ds);
                self.report.tables += 1;
            }
            Value::Column(c) => {
                self.ctx.surface.table(&Dataset::new(vec![c]));
                self.report.tables += 1;
            }
            Value::Grouped(_) => {
                return Err(ScriptError::Type(
                    "apply an aggregation (sum, mean, count, ...) before showing a grouping"
                        .into(),
                ))
            }
            other => self.ctx.surface.text(&other.render()),
        }
        Ok(Value::Unit)
    }
}

// --- call-argument plumbing ---

struct CallArgs {
    call: String,
    positional: VecDeque<Value>,
    keyword: Vec<(String, Value)>,
}

impl CallArgs {
    fn new(call: &str, args: Vec<EvArg>) -> Result<CallArgs, ScriptError> {
        let mut positional = VecDeque::new();
        let mut keyword = vec![];
        for arg in args {
            match arg.name {
                Some(name) => keyword.push((name, arg.value)),
                None => {
                    if !keyword.is_empty() {
                        return Err(ScriptError::Arguments {
                            call: call.to_string(),
                            message: "positional argument after keyword argument".into(),
                        });
                    }
                    positional.push_back(arg.value);
                }
            }
        }
        Ok(CallArgs { call: call.to_string(), positional, keyword })
    }

    fn next_pos(&mut self) -> Option<Value> {
        self.positional.pop_front()
    }

    fn require_pos(&mut self, what: &str) -> Result<Value, ScriptError> {
        self.positional.pop_front().ok_or_else(|| ScriptError::Arguments {
            call: self.call.clone(),
            message: format!("missing {}", what),
        })
    }

    fn kw(&mut self, name: &str) -> Option<Value> {
        let idx = self.keyword.iter().position(|(n, _)| n == name)?;
        Some(self.keyword.remove(idx).1)
    }

    fn finish(self) -> Result<(), ScriptError> {
        if !self.positional.is_empty() {
            return Err(ScriptError::Arguments {
                call: self.call,
                message: "too many arguments".into(),
            });
        }
        if let Some((name, _)) = self.keyword.into_iter().next() {
            return Err(ScriptError::Arguments {
                call: self.call,
                message: format!("unexpected keyword argument '{}'", name),
            });
        }
        Ok(())
    }
}

fn missing_kw(call: &str, name: &str) -> ScriptError {
    ScriptError::Arguments {
        call: call.to_string(),
        message: format!("missing keyword argument '{}'", name),
    }
}

fn expect_str(v: Value, call: &str) -> Result<String, ScriptError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Arguments {
            call: call.to_string(),
            message: format!("expected a string, got {}", other.type_name()),
        }),
    }
}

fn expect_num(v: Value, call: &str) -> Result<f64, ScriptError> {
    match v {
        Value::Num(n) => Ok(n),
        other => Err(ScriptError::Arguments {
            call: call.to_string(),
            message: format!("expected a number, got {}", other.type_name()),
        }),
    }
}

fn expect_bool(v: Value, call: &str) -> Result<bool, ScriptError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(ScriptError::Arguments {
            call: call.to_string(),
            message: format!("expected a boolean, got {}", other.type_name()),
        }),
    }
}

fn expect_str_list(v: Value, call: &str) -> Result<Vec<String>, ScriptError> {
    match v {
        Value::List(items) => items.into_iter().map(|item| expect_str(item, call)).collect(),
        other => Err(ScriptError::Arguments {
            call: call.to_string(),
            message: format!("expected a list of strings, got {}", other.type_name()),
        }),
    }
}

fn axis_from(v: Value, default_name: &str, call: &str) -> Result<Axis, ScriptError> {
    match v {
        Value::Column(c) => Ok(Axis { name: c.name, values: c.cells }),
        Value::List(items) => {
            let cells: Option<Vec<Cell>> = items.iter().map(|item| item.to_cell()).collect();
            match cells {
                Some(values) => Ok(Axis { name: default_name.to_string(), values }),
                None => Err(ScriptError::Arguments {
                    call: call.to_string(),
                    message: "chart data lists may only hold numbers, strings, or booleans"
                        .into(),
                }),
            }
        }
        other => Err(ScriptError::Arguments {
            call: call.to_string(),
            message: format!("expected a column or a list, got {}", other.type_name()),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

fn parse_cmp(op: &str, call: &str) -> Result<Cmp, ScriptError> {
    match op {
        "==" => Ok(Cmp::Eq),
        "!=" => Ok(Cmp::Ne),
        ">" => Ok(Cmp::Gt),
        ">=" => Ok(Cmp::Ge),
        "<" => Ok(Cmp::Lt),
        "<=" => Ok(Cmp::Le),
        other => Err(ScriptError::Arguments {
            call: call.to_string(),
            message: format!("unknown comparison operator '{}'", other),
        }),
    }
}

/// Null cells and mismatched types never match, whatever the operator.
fn cmp_matches(cell: &Cell, op: Cmp, rhs: &Cell) -> bool {
    let ord = match (cell.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (cell, rhs) {
            (Cell::Text(a), Cell::Text(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    match ord {
        None => false,
        Some(ord) => match op {
            Cmp::Eq => ord == Ordering::Equal,
            Cmp::Ne => ord != Ordering::Equal,
            Cmp::Gt => ord == Ordering::Greater,
            Cmp::Ge => ord != Ordering::Less,
            Cmp::Lt => ord == Ordering::Less,
            Cmp::Le => ord != Ordering::Greater,
        },
    }
}

/// Total order for sorting: nulls first, then numbers/booleans, then text.
fn cmp_cells(a: &Cell, b: &Cell) -> Ordering {
    fn rank(c: &Cell) -> u8 {
        match c {
            Cell::Null => 0,
            Cell::Bool(_) | Cell::Number(_) => 1,
            Cell::Text(_) => 2,
        }
    }
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a, b) {
            (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingSurface, Rendered};

    fn sales_dataset() -> Dataset {
        Dataset::new(vec![
            Column {
                name: "region".into(),
                cells: vec![
                    Cell::Text("North".into()),
                    Cell::Text("South".into()),
                    Cell::Text("North".into()),
                    Cell::Text("East".into()),
                ],
            },
            Column {
                name: "sales".into(),
                cells: vec![
                    Cell::Number(100.0),
                    Cell::Number(250.0),
                    Cell::Number(50.0),
                    Cell::Number(75.0),
                ],
            },
        ])
    }

    fn run(code: &str, ds: &Dataset) -> (Result<ExecutionReport, ExecutionError>, RecordingSurface) {
        let surface = RecordingSurface::new();
        let result = {
            let ctx = ExecutionContext {
                dataset: ds,
                surface: &surface,
                limits: Limits::default(),
            };
            execute(code, &ctx)
        };
        (result, surface)
    }

    #[test]
    fn group_sum_bar_chart_renders() {
        let ds = sales_dataset();
        let code = "by_region = df.group_by(\"region\").sum(\"sales\")\nchart.bar(by_region, x=\"region\", y=\"sales\", title=\"Sales by region\")";
        let (result, surface) = run(code, &ds);
        let report = result.unwrap();
        assert_eq!(report.charts, 1);
        let charts = surface.charts();
        assert_eq!(charts[0].x.values.len(), 3);
        // first-appearance order: North, South, East
        assert_eq!(charts[0].x.values[0], Cell::Text("North".into()));
        assert_eq!(charts[0].y.as_ref().unwrap().values[0], Cell::Number(150.0));
        assert_eq!(charts[0].title.as_deref(), Some("Sales by region"));
    }

    #[test]
    fn unknown_name_fails_without_rendering() {
        let ds = sales_dataset();
        let (result, surface) = run("open(\"/etc/passwd\")", &ds);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("'open' is not defined"));
        assert!(surface.events().is_empty());
    }

    #[test]
    fn host_names_do_not_leak() {
        let ds = sales_dataset();
        for code in ["std.fs.read(\"x\")", "os.environ", "import(\"net\")"] {
            let (result, surface) = run(code, &ds);
            assert!(result.is_err(), "{:?} should not execute", code);
            assert!(surface.events().is_empty());
        }
    }

    #[test]
    fn filter_sort_head_pipeline() {
        let ds = sales_dataset();
        let code = "top = df.filter(\"sales\", \">\", 60).sort_by(\"sales\", desc=True).head(2)\nshow(top)";
        let (result, surface) = run(code, &ds);
        assert_eq!(result.unwrap().tables, 1);
        match &surface.events()[0] {
            Rendered::Table { table } => {
                assert_eq!(table.row_count(), 2);
                assert_eq!(table.column("sales").unwrap().cells[0], Cell::Number(250.0));
                assert_eq!(table.column("sales").unwrap().cells[1], Cell::Number(100.0));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn filter_skips_nulls() {
        let ds = Dataset::new(vec![Column {
            name: "v".into(),
            cells: vec![Cell::Number(1.0), Cell::Null, Cell::Number(3.0)],
        }]);
        let (result, _) = run("show(df.filter(\"v\", \"!=\", 99).count())", &ds);
        assert!(result.is_ok());
        let (result, surface) = run("show(df.filter(\"v\", \">\", 0).count())", &ds);
        result.unwrap();
        assert_eq!(surface.events(), vec![Rendered::Text { body: "2".into() }]);
    }

    #[test]
    fn column_aggregates() {
        let ds = sales_dataset();
        let (result, surface) = run("show(df[\"sales\"].mean())", &ds);
        result.unwrap();
        assert_eq!(surface.events(), vec![Rendered::Text { body: "118.75".into() }]);
        let (result, _) = run("df[\"region\"].mean()", &ds);
        assert!(result.unwrap_err().to_string().contains("no numeric values"));
    }

    #[test]
    fn unique_preserves_first_appearance() {
        let ds = sales_dataset();
        let (result, surface) = run("show(df[\"region\"].unique())", &ds);
        result.unwrap();
        assert_eq!(
            surface.events(),
            vec![Rendered::Text { body: "[North, South, East]".into() }]
        );
    }

    #[test]
    fn grouped_count_and_mean() {
        let ds = sales_dataset();
        let (result, surface) = run("show(df.group_by(\"region\").count())", &ds);
        result.unwrap();
        match &surface.events()[0] {
            Rendered::Table { table } => {
                assert_eq!(table.column_names(), vec!["region", "count"]);
                assert_eq!(table.column("count").unwrap().cells[0], Cell::Number(2.0));
            }
            other => panic!("expected table, got {:?}", other),
        }
        let (result, surface) = run("show(df.group_by(\"region\").mean(\"sales\"))", &ds);
        result.unwrap();
        match &surface.events()[0] {
            Rendered::Table { table } => {
                assert_eq!(table.column("sales").unwrap().cells[0], Cell::Number(75.0));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn charts_from_lists_and_columns() {
        let ds = sales_dataset();
        let code = "chart.pie(df[\"region\"].unique(), [150, 250, 75], title=\"Share\")";
        let (result, surface) = run(code, &ds);
        assert_eq!(result.unwrap().charts, 1);
        assert_eq!(surface.charts()[0].kind, ChartKind::Pie);

        let (result, surface) = run("chart.hist(df[\"sales\"], bins=4)", &ds);
        assert_eq!(result.unwrap().charts, 1);
        assert_eq!(surface.charts()[0].bins, Some(4));
    }

    #[test]
    fn mismatched_chart_lengths_fail() {
        let ds = sales_dataset();
        let (result, surface) = run("chart.bar([1, 2], [1])", &ds);
        assert!(result.is_err());
        assert!(surface.charts().is_empty());
    }

    #[test]
    fn table_new_builds_dataset() {
        let ds = Dataset::default();
        let code = "t = table.new([\"k\", \"v\"], [[\"a\", 1], [\"b\", 2]])\nchart.bar(t, x=\"k\", y=\"v\")";
        let (result, _) = run(code, &ds);
        assert_eq!(result.unwrap().charts, 1);
    }

    #[test]
    fn empty_dataset_behaves_like_empty_table() {
        let ds = Dataset::default();
        let (result, _) = run("show(df.count())", &ds);
        assert!(result.is_ok());
        let (result, _) = run("chart.bar(df, x=\"region\", y=\"sales\")", &ds);
        assert!(result.unwrap_err().to_string().contains("unknown column"));
    }

    #[test]
    fn arithmetic_and_locals() {
        let ds = sales_dataset();
        let code = "total = df[\"sales\"].sum()\nshow(total / 2 + 1)";
        let (result, surface) = run(code, &ds);
        result.unwrap();
        assert_eq!(surface.events(), vec![Rendered::Text { body: "238.5".into() }]);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let ds = sales_dataset();
        let (result, _) = run("show(1 / 0)", &ds);
        assert!(result.unwrap_err().to_string().contains("division by zero"));
    }

    #[test]
    fn budget_is_enforced() {
        let ds = sales_dataset();
        let surface = RecordingSurface::new();
        let ctx = ExecutionContext {
            dataset: &ds,
            surface: &surface,
            limits: Limits { max_steps: 5, max_depth: 64 },
        };
        let err = execute("x = 1 + 2 + 3 + 4 + 5 + 6", &ctx).unwrap_err();
        assert!(err.to_string().contains("budget"));
    }

    #[test]
    fn unexpected_keyword_is_rejected() {
        let ds = sales_dataset();
        let (result, _) = run("df.head(2, reverse=True)", &ds);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unexpected keyword argument 'reverse'"));
    }
}
