//! Postprocess function registry.
//!
//! Modules listed under `import` are Lua files. Every function a module
//! defines at top level (or returns in a table) is registered under its
//! name; a later module redefining a name replaces the earlier function.
//!
//! A postprocess function receives the query result as a table
//!
//! ```lua
//! { columns = { "id", "name" }, rows = { { id = 1, name = "Ann" }, ... } }
//! ```
//!
//! and must return a table of the same shape. Columns missing from
//! `columns` but present in rows are appended in name order. Returning a
//! plain list of row tables is also accepted.

use mlua::{Function, Lua, Table, Value as LuaValue};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult, PostprocessError, PostprocessResult};
use crate::logs::RunLog;
use crate::models::{real, Frame};
use crate::settings;

struct Registered {
    function: Function,
    module: PathBuf,
}

/// Functions loaded from user modules, by name.
#[derive(Default)]
pub struct FunctionRegistry {
    lua: Option<Lua>,
    functions: BTreeMap<String, Registered>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.functions.iter().map(|(name, r)| (name, r.module.display().to_string())))
            .finish()
    }
}

impl FunctionRegistry {
    /// Load every module, in order.
    pub fn load(paths: &[PathBuf], log: &mut RunLog) -> ConfigResult<Self> {
        let mut registry = Self::default();
        for path in paths {
            log.info_with_data(settings::MSG_IMPORTING_MODULE, path.display(), 1, 0);
            let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Module {
                path: path.clone(),
                message: e.to_string(),
            })?;
            registry.load_source(&source, path, log)?;
        }
        Ok(registry)
    }

    /// Safe standard libraries only: no `debug`, no C modules.
    fn lua(&mut self) -> &Lua {
        self.lua.get_or_insert_with(Lua::new)
    }

    /// Run one module's code and register the functions it defines.
    pub fn load_source(&mut self, source: &str, path: &Path, log: &mut RunLog) -> ConfigResult<()> {
        let module_error = |e: mlua::Error| ConfigError::Module {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let found = module_functions(self.lua(), source, path).map_err(module_error)?;

        for (name, function) in found {
            if let Some(previous) = self.functions.get(&name) {
                log.warning(
                    format!(
                        "{}: {} ({} replaces {})",
                        settings::MSG_FUNCTION_OVERRIDDEN,
                        name,
                        path.display(),
                        previous.module.display()
                    ),
                    1,
                );
            }
            self.functions.insert(
                name,
                Registered {
                    function,
                    module: path.to_path_buf(),
                },
            );
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Handle of a registered function.
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name).map(|r| &r.function)
    }

    /// Call `name` with `frame` as its only argument.
    pub fn call(&self, name: &str, frame: &Frame) -> PostprocessResult<Frame> {
        let function = self
            .get(name)
            .ok_or_else(|| PostprocessError::NotFound(name.to_string()))?;
        let lua = self
            .lua
            .as_ref()
            .ok_or_else(|| PostprocessError::NotFound(name.to_string()))?;

        let failed = |e: mlua::Error| PostprocessError::Failed {
            function: name.to_string(),
            message: e.to_string(),
        };

        let (params, vararg) = arity(function).map_err(|message| PostprocessError::Failed {
            function: name.to_string(),
            message,
        })?;
        if params != 1 && !vararg {
            return Err(PostprocessError::WrongArity {
                function: name.to_string(),
                params,
            });
        }

        let argument = frame_to_lua(lua, frame).map_err(failed)?;
        let result: LuaValue = function.call(argument).map_err(failed)?;

        let result = frame_from_lua(result).map_err(|message| PostprocessError::NotTabular {
            function: name.to_string(),
            message,
        })?;
        if result.is_empty() {
            return Err(PostprocessError::Empty(name.to_string()));
        }
        Ok(result)
    }
}

/// Run a module in its own environment and collect its functions.
///
/// Globals stay readable from the module; its own definitions land in the
/// environment table.
fn module_functions(lua: &Lua, source: &str, path: &Path) -> mlua::Result<Vec<(String, Function)>> {
    let env: Table = lua.load("return setmetatable({}, { __index = _G })").eval()?;
    let returned: LuaValue = lua
        .load(source)
        .set_name(path.display().to_string())
        .set_environment(env.clone())
        .eval()?;

    let mut found = BTreeMap::new();
    collect_functions(&env, &mut found)?;
    if let LuaValue::Table(exports) = returned {
        collect_functions(&exports, &mut found)?;
    }
    Ok(found.into_iter().collect())
}

fn collect_functions(table: &Table, found: &mut BTreeMap<String, Function>) -> mlua::Result<()> {
    for pair in table.pairs::<LuaValue, LuaValue>() {
        if let (LuaValue::String(key), LuaValue::Function(function)) = pair? {
            found.insert(key.to_string_lossy(), function);
        }
    }
    Ok(())
}

/// Declared parameter count and whether the function is variadic.
///
/// Read from the function's Lua 5.4 bytecode header, since the `debug`
/// library is not loaded.
fn arity(function: &Function) -> Result<(usize, bool), String> {
    let chunk = function.dump(false);
    if chunk.is_empty() {
        return Err("not a Lua function".to_string());
    }
    let mut reader = ChunkReader { chunk: &chunk, pos: 0 };

    if reader.take(4)? != b"\x1bLua" {
        return Err("not a Lua function".to_string());
    }
    // version, format, LUAC_DATA, then the sizes of Instruction,
    // lua_Integer and lua_Number
    reader.take(2 + 6)?;
    let sizes = reader.take(3)?;
    reader.take(sizes[1] as usize + sizes[2] as usize)?;
    // upvalue count
    reader.byte()?;

    let source = reader.size()?;
    if source > 0 {
        reader.take(source - 1)?;
    }
    reader.size()?;
    reader.size()?;
    let params = reader.byte()? as usize;
    let vararg = reader.byte()? != 0;
    Ok((params, vararg))
}

struct ChunkReader<'a> {
    chunk: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos + n;
        let bytes = self
            .chunk
            .get(self.pos..end)
            .ok_or_else(|| "truncated bytecode".to_string())?;
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    /// Big-endian 7-bit groups; the last byte has its high bit set.
    fn size(&mut self) -> Result<usize, String> {
        let mut value = 0usize;
        loop {
            let b = self.byte()?;
            value = (value << 7) | (b & 0x7f) as usize;
            if b & 0x80 != 0 {
                return Ok(value);
            }
        }
    }
}

// =============================================================================
// Frame <-> Lua
// =============================================================================

fn frame_to_lua(lua: &Lua, frame: &Frame) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("columns", lua.create_sequence_from(frame.columns.iter().map(String::as_str))?)?;

    let rows = lua.create_table()?;
    for (i, row) in frame.rows.iter().enumerate() {
        let record = lua.create_table()?;
        for (column, cell) in frame.columns.iter().zip(row) {
            record.set(column.as_str(), cell_to_lua(lua, cell)?)?;
        }
        rows.set(i + 1, record)?;
    }
    table.set("rows", rows)?;
    Ok(table)
}

fn cell_to_lua(lua: &Lua, cell: &Value) -> mlua::Result<LuaValue> {
    Ok(match cell {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        other => LuaValue::String(lua.create_string(other.to_string())?),
    })
}

fn frame_from_lua(value: LuaValue) -> Result<Frame, String> {
    let table = match value {
        LuaValue::Table(table) => table,
        other => return Err(format!("returned {}", other.type_name())),
    };

    let rows_table = match table.get::<LuaValue>("rows").map_err(|e| e.to_string())? {
        LuaValue::Table(rows) => rows,
        LuaValue::Nil => table.clone(),
        other => return Err(format!("'rows' is {}", other.type_name())),
    };

    let mut columns: Vec<String> = match table.get::<LuaValue>("columns").map_err(|e| e.to_string())? {
        LuaValue::Table(names) => names
            .sequence_values::<String>()
            .collect::<mlua::Result<_>>()
            .map_err(|e| format!("'columns' must list names: {}", e))?,
        LuaValue::Nil => Vec::new(),
        other => return Err(format!("'columns' is {}", other.type_name())),
    };

    let mut records: Vec<BTreeMap<String, Value>> = Vec::new();
    let mut extra = BTreeSet::new();
    for row in rows_table.sequence_values::<LuaValue>() {
        let row = match row.map_err(|e| e.to_string())? {
            LuaValue::Table(row) => row,
            other => return Err(format!("row is {}", other.type_name())),
        };
        let mut record = BTreeMap::new();
        for pair in row.pairs::<String, LuaValue>() {
            let (column, cell) = pair.map_err(|e| e.to_string())?;
            let cell = cell_from_lua(&cell).ok_or_else(|| format!("column '{}' holds {}", column, cell.type_name()))?;
            if !columns.contains(&column) {
                extra.insert(column.clone());
            }
            record.insert(column, cell);
        }
        records.push(record);
    }
    columns.extend(extra);

    let rows = records
        .into_iter()
        .map(|mut record| {
            columns
                .iter()
                .map(|c| record.remove(c).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok(Frame::new(columns, rows))
}

fn cell_from_lua(value: &LuaValue) -> Option<Value> {
    match value {
        LuaValue::Nil => Some(Value::Null),
        LuaValue::Boolean(b) => Some(Value::Bool(*b)),
        LuaValue::Integer(i) => Some(Value::from(*i)),
        LuaValue::Number(f) => Some(real(*f)),
        LuaValue::String(s) => Some(Value::String(s.to_string_lossy())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CUSTOM: &str = r#"
function test(df)
    for _, row in ipairs(df.rows) do
        row.name = string.upper(row.name)
    end
    table.insert(df.columns, "flag")
    df.rows[1].flag = true
    return df
end

function wrong_args_1()
    return {}
end

function wrong_args_2(df, extra)
    return df
end

function key_error(df)
    return df.rows[1].missing.field
end

function return_other_type(df)
    return "done"
end

function return_empty_df(df)
    return { columns = { "id" }, rows = {} }
end

function passthrough(...)
    local df = ...
    return df
end

local function helper() end
"#;

    fn registry() -> (FunctionRegistry, RunLog) {
        let mut log = RunLog::new();
        let mut registry = FunctionRegistry::default();
        registry.load_source(CUSTOM, Path::new("custom.lua"), &mut log).unwrap();
        (registry, log)
    }

    fn frame() -> Frame {
        Frame::new(
            vec!["id".into(), "name".into()],
            vec![vec![json!(1), json!("ann")], vec![json!(2), Value::Null]],
        )
    }

    #[test]
    fn test_functions_registered() {
        let (registry, _) = registry();
        assert!(registry.contains("test"));
        assert!(registry.contains("wrong_args_2"));
        assert!(!registry.contains("helper"));
        assert!(!registry.contains("print"));
        assert!(registry.get("test").is_some());
        assert!(registry.get("helper").is_none());
    }

    #[test]
    fn test_call_transforms_frame() {
        let (registry, _) = registry();
        let mut input = frame();
        input.rows[1][1] = json!("bo");
        let out = registry.call("test", &input).unwrap();

        assert_eq!(out.columns, vec!["id", "name", "flag"]);
        assert_eq!(out.rows[0], vec![json!(1), json!("ANN"), json!(true)]);
        assert_eq!(out.rows[1], vec![json!(2), json!("BO"), Value::Null]);
    }

    #[test]
    fn test_varargs_accepted() {
        let (registry, _) = registry();
        let out = registry.call("passthrough", &frame()).unwrap();
        assert_eq!(out, frame());
    }

    #[test]
    fn test_wrong_arity() {
        let (registry, _) = registry();
        for (name, expected) in [("wrong_args_1", 0), ("wrong_args_2", 2)] {
            match registry.call(name, &frame()) {
                Err(PostprocessError::WrongArity { params, .. }) => assert_eq!(params, expected),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_runtime_error() {
        let (registry, _) = registry();
        let err = registry.call("key_error", &frame()).unwrap_err();
        assert!(matches!(err, PostprocessError::Failed { .. }));
        assert!(err.to_string().contains(settings::MSG_POSTPROCESS_EXAMINE_CODE));
    }

    #[test]
    fn test_non_tabular_and_empty() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.call("return_other_type", &frame()),
            Err(PostprocessError::NotTabular { .. })
        ));
        assert!(matches!(
            registry.call("return_empty_df", &frame()),
            Err(PostprocessError::Empty(_))
        ));
    }

    #[test]
    fn test_not_found() {
        let (registry, _) = registry();
        assert!(matches!(registry.call("nope", &frame()), Err(PostprocessError::NotFound(_))));
    }

    #[test]
    fn test_later_module_overrides_with_warning() {
        let (mut registry, mut log) = registry();
        let other = "function test(df) return { { id = 9 } } end\nreturn { extra = function(df) return df end }";
        registry.load_source(other, Path::new("other.lua"), &mut log).unwrap();

        assert!(registry.contains("extra"));
        let out = registry.call("test", &frame()).unwrap();
        assert_eq!(out.columns, vec!["id"]);
        assert_eq!(out.rows, vec![vec![json!(9)]]);
        assert!(log.warnings().any(|w| w.message.contains("other.lua") && w.message.contains("custom.lua")));
    }

    #[test]
    fn test_debug_library_hidden() {
        let mut registry = FunctionRegistry::default();
        let mut log = RunLog::new();
        let err = registry
            .load_source("local x = debug.getinfo", Path::new("bad.lua"), &mut log)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Module { .. }));

        let err = registry
            .load_source("local d = require('debug')", Path::new("bad.lua"), &mut log)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Module { .. }));

        let source = r#"
function reachable(df)
    local ok = pcall(require, "debug")
    return { { loaded = package.loaded.debug ~= nil, required = ok } }
end
"#;
        registry.load_source(source, Path::new("check.lua"), &mut log).unwrap();
        let out = registry.call("reachable", &frame()).unwrap();
        assert_eq!(out.columns, vec!["loaded", "required"]);
        assert_eq!(out.rows, vec![vec![json!(false), json!(false)]]);
    }

    #[test]
    fn test_arity_of_closures_and_exports() {
        let mut registry = FunctionRegistry::default();
        let source = r#"
local prefix = "x"
local function make(n)
    return function(df, a, b) return df end
end
three = make(1)
return { one = function(df) df.rows[1].id = prefix return df end }
"#;
        registry.load_source(source, Path::new("closures.lua"), &mut RunLog::new()).unwrap();
        assert!(matches!(
            registry.call("three", &frame()),
            Err(PostprocessError::WrongArity { params: 3, .. })
        ));
        let out = registry.call("one", &frame()).unwrap();
        assert_eq!(out.rows[0][0], json!("x"));
    }

    #[test]
    fn test_host_functions_rejected() {
        let mut registry = FunctionRegistry::default();
        registry
            .load_source("shout = string.upper", Path::new("alias.lua"), &mut RunLog::new())
            .unwrap();
        assert!(matches!(
            registry.call("shout", &frame()),
            Err(PostprocessError::Failed { .. })
        ));
    }

    #[test]
    fn test_syntax_error_names_module() {
        let mut registry = FunctionRegistry::default();
        let err = registry
            .load_source("function (", Path::new("broken.lua"), &mut RunLog::new())
            .unwrap_err();
        assert!(err.to_string().contains("broken.lua"));
    }
}
