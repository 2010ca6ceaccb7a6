//! End-to-end runs of `run_report` against generated sources.

use reportsmith::error::{PipelineResult, PostprocessError};
use reportsmith::parser::xlsx::read_sheet;
use reportsmith::{
    run_report, settings, AssemblyError, ConfigError, ExportError, PipelineError, QueryError, ReportOutcome, RunLog,
    RunOptions, Stage,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn file(&self, name: &str, content: &str) -> &Self {
        fs::write(self.dir.path().join(name), content).unwrap();
        self
    }

    fn config(&self, yaml: &str) -> PathBuf {
        let path = self.dir.path().join("report.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.out(name)).unwrap()
    }
}

fn run(config: &Path, options: RunOptions) -> (PipelineResult<ReportOutcome>, RunLog) {
    let mut log = RunLog::new();
    let result = run_report(config, options, &mut log);
    (result, log)
}

fn forced() -> RunOptions {
    RunOptions {
        database: false,
        force: true,
    }
}

const PEOPLE: &str = "id,name,phone\n1,Ann,555-0101\n2,Bo,555-0102\n3,Cy,\n";

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_single_csv_tables_only() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output:
  basename: directory
  dir: out
  export_tables: csv
"#,
    );

    let (result, log) = run(&config, RunOptions::default());
    let outcome = result.unwrap();

    assert_eq!(outcome.tables, vec!["people"]);
    assert!(outcome.queries.is_empty());
    assert_eq!(outcome.files, vec![ws.out("people.csv")]);
    assert_eq!(ws.read("people.csv"), PEOPLE);
    assert!(log.contains(settings::MSG_EXPORT_TABLES_ONLY));
    assert!(log.contains(settings::MSG_SUCCESS_REPORT_COMPLETE));
}

#[test]
fn test_two_sources_merge_into_workbook() {
    let ws = Workspace::new();
    ws.file("customers.csv", "id,name\n1,Ann\n2,Bo\n")
        .file("orders.csv", "id;total\n3;7\n2;10.5\n");
    let config = ws.config(
        r#"
tables_config:
  customers:
    - path: customers.csv
    - path: orders.csv
output:
  basename: sales
  dir: out
queries:
  - name: all_customers
    sql: SELECT id, name, total FROM customers ORDER BY id
"#,
    );

    let outcome = run(&config, RunOptions::default()).0.unwrap();
    assert_eq!(outcome.files, vec![ws.out("sales.xlsx")]);

    let result = &outcome.queries[0].frame;
    assert_eq!(result.row_count(), 3);
    assert_eq!(result.rows[0], vec![json!(1), json!("Ann"), Value::Null]);
    assert_eq!(result.rows[2], vec![json!(3), Value::Null, json!(7.0)]);

    let sheet = read_sheet(&ws.out("sales.xlsx"), None).unwrap();
    assert_eq!(sheet.sheet, "all_customers");
    assert_eq!(sheet.frame.columns, vec!["id", "name", "total"]);
    assert_eq!(sheet.frame.rows[1], vec![json!(2), json!("Bo"), json!(10.5)]);
}

#[test]
fn test_replace_rewrites_query_results() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output:
  basename: phones
  dir: out
  export_queries: csv
queries:
  - name: phones
    sql: SELECT name, phone FROM people ORDER BY id
    replace:
      phone:
        '(\d{3})-(\d{4})': '\2/\1'
        '[broken': 'x'
        '^0': 'zero-'
      email:
        '@': ' at '
"#,
    );

    let (result, log) = run(&config, RunOptions::default());
    result.unwrap();

    assert_eq!(ws.read("phones.csv"), "name,phone\nAnn,zero-101/555\nBo,zero-102/555\nCy,\n");
    let warnings: Vec<String> = log.warnings().map(|w| w.message.clone()).collect();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains(settings::MSG_QUERY_REPLACE_MATCH_ERROR));
    assert!(warnings[1].contains(settings::MSG_QUERY_REPLACE_COLUMN_ERROR));
}

// =============================================================================
// Table assembly
// =============================================================================

#[test]
fn test_pivot_keeps_index_column() {
    let ws = Workspace::new();
    ws.file("long.csv", "region,month,sales\nn,jan,1\nn,feb,2\ns,jan,3\n");
    let config = ws.config(
        r#"
tables_config:
  sales:
    - path: long.csv
      pivot:
        index: region
        columns: month
        values: sales
output:
  basename: wide
  dir: out
  export_tables: csv
"#,
    );

    let (result, log) = run(&config, RunOptions::default());
    result.unwrap();
    assert_eq!(ws.read("sales.csv"), "region,feb,jan\nn,2,1\ns,,3\n");
    assert!(log.contains(settings::MSG_INCLUDE_INDEX_TABLE_PIVOT));
}

#[test]
fn test_explicit_include_index_wins() {
    let ws = Workspace::new();
    ws.file("long.csv", "region,month,sales\nn,jan,1\n")
        .file("plain.csv", "a\nx\ny\n");
    let config = ws.config(
        r#"
tables_config:
  sales:
    - path: long.csv
      include_index: false
      pivot: { index: region, columns: month, values: sales }
  plain:
    - path: plain.csv
input:
  include_index: true
output:
  basename: idx
  dir: out
  export_tables: csv
"#,
    );

    run(&config, RunOptions::default()).0.unwrap();
    assert_eq!(ws.read("sales.csv"), "jan\n1\n");
    assert_eq!(ws.read("plain.csv"), "index,a\n0,x\n1,y\n");
}

#[test]
fn test_datetime_keeps_raw_column() {
    let ws = Workspace::new();
    ws.file("orders.csv", "id,shipped\n1,2023-01-05\n2,\n");
    let config = ws.config(
        r#"
tables_config:
  orders:
    - path: orders.csv
      datetime:
        shipped: '%d/%m/%Y'
output:
  basename: dates
  dir: out
  export_tables: csv
"#,
    );

    run(&config, RunOptions::default()).0.unwrap();
    assert_eq!(ws.read("orders.csv"), "id,shipped,shipped_raw\n1,05/01/2023,2023-01-05\n2,,\n");
}

#[test]
fn test_missing_datetime_column_aborts() {
    let ws = Workspace::new();
    ws.file("orders.csv", "id,shipped\n1,2023-01-05\n");
    let config = ws.config(
        r#"
tables_config:
  orders:
    - path: orders.csv
      datetime:
        delivered:
output: { basename: dates, dir: out, export_tables: csv }
"#,
    );

    let err = run(&config, RunOptions::default()).0.unwrap_err();
    assert!(err.to_string().contains("delivered"));
    assert_eq!(err.stage(), Stage::AssembleTables);
    assert!(!ws.out("orders.csv").exists());
}

#[test]
fn test_existing_raw_column_aborts_with_file() {
    let ws = Workspace::new();
    ws.file("orders.csv", "id,shipped,shipped_raw
1,2023-01-05,x
");
    let config = ws.config(
        r#"
tables_config:
  orders:
    - path: orders.csv
      datetime:
        shipped:
output: { basename: dates, dir: out, export_tables: csv }
"#,
    );

    let err = run(&config, RunOptions::default()).0.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Assembly(AssemblyError::DuplicateColumn { ref column, .. }) if column == "shipped_raw"
    ));
    assert!(err.to_string().contains("orders.csv"));
}

#[test]
fn test_xlsx_source_by_sheet_name() {
    let ws = Workspace::new();
    let mut workbook = rust_xlsxwriter::Workbook::new();
    workbook.add_worksheet().set_name("Notes").unwrap().write_string(0, 0, "ignored").unwrap();
    let sheet = workbook.add_worksheet().set_name("Orders").unwrap();
    sheet.write_string(0, 0, "Order ID").unwrap();
    sheet.write_string(0, 1, "Customer").unwrap();
    sheet.write_number(1, 0, 7).unwrap();
    sheet.write_string(1, 1, " ann ").unwrap();
    workbook.save(ws.dir.path().join("orders.xlsx")).unwrap();

    let config = ws.config(
        r#"
tables_config:
  orders:
    - path: orders.xlsx
      sheet: Orders
input:
  strip: true
  slugify_columns: true
  lowercase_columns: true
output:
  basename: sheets
  dir: out
  export_queries: csv
queries:
  - name: q
    sql: SELECT order_id, customer FROM orders
"#,
    );

    run(&config, RunOptions::default()).0.unwrap();
    assert_eq!(ws.read("q.csv"), "order_id,customer\n7,ann\n");
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_zero_row_query_warns_and_succeeds() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output: { basename: empty, dir: out, export_queries: csv }
queries:
  - name: nobody
    sql: SELECT name FROM people WHERE id > 100
"#,
    );

    let (result, log) = run(&config, RunOptions::default());
    result.unwrap();
    assert!(log.warnings().any(|w| w.message.contains(settings::MSG_QUERY_EMPTY)));
    assert_eq!(ws.read("nobody.csv"), "name\n");
}

#[test]
fn test_later_queries_read_earlier_results() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output: { basename: chain, dir: out, export_queries: csv }
queries:
  - name: with_phone
    sql: SELECT id, name FROM people WHERE phone IS NOT NULL
  - name: how_many
    sql: SELECT COUNT(*) AS n FROM with_phone
"#,
    );

    let outcome = run(&config, RunOptions::default()).0.unwrap();
    assert_eq!(outcome.queries[1].frame.rows, vec![vec![json!(2)]]);
}

#[test]
fn test_duplicate_query_name_aborts() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output: { basename: dupes, dir: out, export_queries: csv }
queries:
  - name: totals
    sql: SELECT 1 AS n
  - name: Totals
    sql: SELECT 2 AS n
"#,
    );

    let err = run(&config, RunOptions::default()).0.unwrap_err();
    assert!(matches!(err, PipelineError::Query(QueryError::Duplicate(ref name)) if name == "Totals"));
    assert_eq!(err.stage(), Stage::RunQueries);
    assert!(!ws.out("totals.csv").exists());
}

const CUSTOM: &str = r#"
function add_total(df)
    table.insert(df.columns, "total")
    for _, row in ipairs(df.rows) do
        row.total = row.id * 10
    end
    return df
end

function two_args(df, other)
    return df
end

function crash(df)
    error("column missing")
end

function not_a_table(df)
    return 42
end

function nothing_left(df)
    return { columns = {}, rows = {} }
end
"#;

fn postprocess_config(ws: &Workspace, function: &str) -> PathBuf {
    ws.file("people.csv", PEOPLE).file("custom.lua", CUSTOM);
    ws.config(&format!(
        r#"
tables_config:
  people:
    - path: people.csv
import:
  - path: custom.lua
output: {{ basename: post, dir: out, export_queries: csv }}
queries:
  - name: result
    sql: SELECT id, name FROM people ORDER BY id
    postprocess: {}
"#,
        function
    ))
}

#[test]
fn test_postprocess_result_is_exported() {
    let ws = Workspace::new();
    let config = postprocess_config(&ws, "add_total");
    run(&config, RunOptions::default()).0.unwrap();
    assert_eq!(ws.read("result.csv"), "id,name,total\n1,Ann,10\n2,Bo,20\n3,Cy,30\n");
}

#[test]
fn test_postprocess_failures() {
    let cases: [(&str, fn(&PostprocessError) -> bool); 4] = [
        ("two_args", |e| matches!(e, PostprocessError::WrongArity { params: 2, .. })),
        ("crash", |e| matches!(e, PostprocessError::Failed { message, .. } if message.contains("column missing"))),
        ("not_a_table", |e| matches!(e, PostprocessError::NotTabular { .. })),
        ("nothing_left", |e| matches!(e, PostprocessError::Empty(_))),
    ];

    for (function, expected) in cases {
        let ws = Workspace::new();
        let config = postprocess_config(&ws, function);
        match run(&config, RunOptions::default()).0 {
            Err(PipelineError::Query(QueryError::Postprocess { source, .. })) => {
                assert!(expected(&source), "{}: {}", function, source)
            }
            other => panic!("{}: unexpected {:?}", function, other.map(|_| ())),
        }
        assert!(!ws.out("result.csv").exists());
    }
}

#[test]
fn test_unknown_postprocess_rejected_at_validation() {
    let ws = Workspace::new();
    let config = postprocess_config(&ws, "missing_function");
    let err = run(&config, RunOptions::default()).0.unwrap_err();
    assert!(matches!(err, PipelineError::Config(ConfigError::PostprocessNotFound { .. })));
}

// =============================================================================
// Outputs
// =============================================================================

#[test]
fn test_existing_outputs_need_force() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output: { basename: again, dir: out, export_tables: csv }
"#,
    );

    run(&config, RunOptions::default()).0.unwrap();
    let err = run(&config, RunOptions::default()).0.unwrap_err();
    assert!(matches!(err, PipelineError::Export(ExportError::Exists(ref p)) if p.ends_with("people.csv")));
    assert_eq!(err.stage(), Stage::Export);
    run(&config, forced()).0.unwrap();
}

#[test]
fn test_runs_are_deterministic() {
    let ws = Workspace::new();
    ws.file("a.csv", "k,x\nb,1\na,2\nc,3\n").file("b.csv", "k,y\nc,9\na,8\nd,7\n");
    let config = ws.config(
        r#"
tables_config:
  joined:
    - path: a.csv
    - path: b.csv
output: { basename: same, dir: out, export_tables: csv, export_queries: csv }
queries:
  - name: summary
    sql: SELECT k, x, y FROM joined
"#,
    );

    let first = run(&config, forced()).0.unwrap();
    let tables = ws.read("joined.csv");
    let summary = ws.read("summary.csv");

    let second = run(&config, forced()).0.unwrap();
    assert_eq!(first.queries, second.queries);
    assert_eq!(ws.read("joined.csv"), tables);
    assert_eq!(ws.read("summary.csv"), summary);
    assert_eq!(tables, "k,x,y\na,2,8\nb,1,\nc,3,9\nd,,7\n");
}

#[test]
fn test_database_export() {
    let ws = Workspace::new();
    ws.file("people.csv", PEOPLE);
    let config = ws.config(
        r#"
tables_config:
  people:
    - path: people.csv
output: { basename: archive, dir: out, export_queries: csv }
queries:
  - name: names
    sql: SELECT name FROM people
"#,
    );

    let options = RunOptions {
        database: true,
        force: false,
    };
    let outcome = run(&config, options).0.unwrap();
    assert!(outcome.files.contains(&ws.out("archive.db")));

    let conn = rusqlite::Connection::open(ws.out("archive.db")).unwrap();
    let names: i64 = conn.query_row("SELECT COUNT(*) FROM names", [], |r| r.get(0)).unwrap();
    assert_eq!(names, 3);
}

#[test]
fn test_template_must_be_edited() {
    let ws = Workspace::new();
    let config = ws.config("output:\n  basename: CHANGE_ME\n  export_tables: csv\n");
    let err = run(&config, RunOptions::default()).0.unwrap_err();
    assert!(matches!(err, PipelineError::Config(ConfigError::NotEdited(_))));
    assert_eq!(err.stage(), Stage::Validate);
}
