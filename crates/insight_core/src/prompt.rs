//! Prompt templates. The content prefix handed in here is already bounded by
//! the caller; these functions only do the wording.

/// The approved surface, spelled out for the model so replies stay inside
/// what the interpreter accepts.
pub const SCRIPT_REFERENCE: &str = r#"CHARTING LANGUAGE REFERENCE:

The code block may only use these names:
- df — the uploaded table (empty when the upload was not tabular)
- chart — chart building
- table — table building
- show — display a value

Table methods:
  df.columns()                        -> list of column names
  df.count()                          -> row count
  df.head(n)                          -> first n rows
  df.select(["a", "b"])               -> keep listed columns
  df.filter("col", ">", 100)          -> rows matching; operators "==", "!=", ">", ">=", "<", "<="
  df.sort_by("col", desc=true)        -> sorted copy
  df.group_by("col").sum("other")     -> aggregate; also .mean, .min, .max, .count()
  df["col"]                           -> one column; .sum() .mean() .min() .max() .count() .unique()

Charts (each renders immediately):
  chart.bar(t, x="col", y="col", title="...")
  chart.line(t, x="col", y="col")
  chart.scatter(t, x="col", y="col")
  chart.bar(xs, ys)                   -> from two lists or columns
  chart.pie(labels, values, title="...")
  chart.hist(values, bins=10)

Other:
  table.new(["k", "v"], [["a", 1], ["b", 2]])
  show(value)                         -> display a table, column, or number
  name = expression                   -> assignment

There are no loops, imports, or any other functions.

Example:

```
by_region = df.group_by("region").sum("sales")
chart.bar(by_region, x="region", y="sales", title="Sales by region")
```"#;

pub fn overview_prompt(content: &str) -> String {
    format!(
        "You are a business analyst. Give a high-level overview of the following content.\n\
         - Summarize key points or data columns.\n\
         - If it looks like structured data, mention patterns and numeric summaries.\n\
         - Otherwise, summarize the topic and structure.\n\
         \n\
         Content:\n\
         {content}\n"
    )
}

pub fn question_prompt(content: &str, question: &str) -> String {
    format!(
        "You are a data and content analyst. The user uploaded the following content:\n\
         \n\
         {content}\n\
         \n\
         Their question is: \"{question}\"\n\
         \n\
         Reply in 2 parts:\n\
         1. A brief explanation in natural language.\n\
         2. If a chart or table would help, exactly ONE code block (in triple backticks) \
         written in the charting language below.\n\
         \n\
         Return at most one code block.\n\
         \n\
         {SCRIPT_REFERENCE}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_prompt_embeds_content_and_question() {
        let p = question_prompt("region  sales\nNorth   100", "show sales by region");
        assert!(p.contains("North   100"));
        assert!(p.contains("\"show sales by region\""));
        assert!(p.contains("ONE code block"));
        assert!(p.contains("chart.bar"));
    }

    #[test]
    fn overview_prompt_frames_an_analyst() {
        let p = overview_prompt("some text");
        assert!(p.starts_with("You are a business analyst."));
        assert!(p.contains("some text"));
    }
}
