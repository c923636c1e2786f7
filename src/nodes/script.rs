/// Lua script node
///
/// Runs a user-supplied Lua script in a sandboxed interpreter. Declared
/// input names become data input ports reachable from the script as the
/// global `inputs` table; the script's returned table is mapped onto the
/// declared output ports. The interpreter lives entirely inside a
/// synchronous helper so no Lua value ever crosses an await point.

use crate::graph::socket::{DataType, Port};
use crate::graph::types::DataMap;
use crate::nodes::{NodeBehavior, NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::actor::ActorContext;
use crate::runtime::controlflow::ExecCx;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

pub const SCRIPT_KIND: &str = "script";

fn name_list(settings: &DataMap, key: &str) -> Vec<String> {
    match settings.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn json_to_lua(lua: &mlua::Lua, value: &Value) -> mlua::Result<mlua::Value> {
    Ok(match value {
        Value::Null => mlua::Value::Nil,
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                mlua::Value::Integer(i)
            } else {
                mlua::Value::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => mlua::Value::String(lua.create_string(s)?),
        Value::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, val) in map {
                table.set(key.as_str(), json_to_lua(lua, val)?)?;
            }
            mlua::Value::Table(table)
        }
    })
}

fn lua_to_json(value: mlua::Value) -> anyhow::Result<Value> {
    match value {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Bool(b)),
        mlua::Value::Integer(i) => Ok(Value::Number(serde_json::Number::from(i))),
        mlua::Value::Number(f) => Ok(serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        mlua::Value::String(s) => Ok(Value::String(
            s.to_str()
                .map_err(|e| anyhow!("non UTF-8 Lua string: {e}"))?
                .to_string(),
        )),
        mlua::Value::Table(table) => {
            // Contiguous 1-based integer keys read back as a JSON array.
            let mut is_array = true;
            let mut max_index = 0usize;
            let mut count = 0usize;
            for pair in table.clone().pairs::<mlua::Value, mlua::Value>() {
                let (key, _) = pair.map_err(|e| anyhow!("iterating Lua table: {e}"))?;
                count += 1;
                match key {
                    mlua::Value::Integer(i) if i > 0 => {
                        max_index = max_index.max(i as usize);
                    }
                    _ => {
                        is_array = false;
                        break;
                    }
                }
            }
            if is_array && count > 0 && count == max_index {
                let mut arr = Vec::with_capacity(max_index);
                for i in 1..=max_index {
                    let item: mlua::Value = table
                        .get(i)
                        .map_err(|e| anyhow!("indexing Lua array: {e}"))?;
                    arr.push(lua_to_json(item)?);
                }
                Ok(Value::Array(arr))
            } else {
                let mut obj = serde_json::Map::new();
                for pair in table.pairs::<mlua::Value, mlua::Value>() {
                    let (key, val) = pair.map_err(|e| anyhow!("iterating Lua table: {e}"))?;
                    let key = match key {
                        mlua::Value::String(s) => s
                            .to_str()
                            .map_err(|e| anyhow!("non UTF-8 Lua key: {e}"))?
                            .to_string(),
                        mlua::Value::Integer(i) => i.to_string(),
                        mlua::Value::Number(f) => f.to_string(),
                        _ => continue,
                    };
                    obj.insert(key, lua_to_json(val)?);
                }
                Ok(Value::Object(obj))
            }
        }
        _ => Ok(Value::Null),
    }
}

/// Run the script synchronously and map its result onto declared outputs
fn run_script(settings: &DataMap, inputs: &DataMap) -> anyhow::Result<DataMap> {
    let script = settings
        .get("script")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("script node missing 'script' setting"))?;

    let lua = mlua::Lua::new();
    let globals = lua.globals();
    // Strip the escape hatches before any user code runs.
    globals.set("os", mlua::Nil).map_err(|e| anyhow!("sandboxing failed: {e}"))?;
    globals.set("io", mlua::Nil).map_err(|e| anyhow!("sandboxing failed: {e}"))?;
    globals.set("debug", mlua::Nil).map_err(|e| anyhow!("sandboxing failed: {e}"))?;
    globals.set("package", mlua::Nil).map_err(|e| anyhow!("sandboxing failed: {e}"))?;

    let input_table = lua
        .create_table()
        .map_err(|e| anyhow!("creating inputs table: {e}"))?;
    for (key, value) in inputs {
        let lua_value = json_to_lua(&lua, value)
            .map_err(|e| anyhow!("converting input '{key}': {e}"))?;
        input_table
            .set(key.as_str(), lua_value)
            .map_err(|e| anyhow!("setting input '{key}': {e}"))?;
    }
    globals
        .set("inputs", input_table)
        .map_err(|e| anyhow!("exposing inputs: {e}"))?;

    let result: mlua::Value = lua
        .load(script)
        .eval()
        .map_err(|e| anyhow!("script failed: {e}"))?;
    let result = lua_to_json(result)?;

    let declared = name_list(settings, "outputs");
    let mut outputs = DataMap::new();
    match result {
        Value::Object(map) if !declared.is_empty() => {
            for name in declared {
                outputs.insert(name.clone(), map.get(&name).cloned().unwrap_or(Value::Null));
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                outputs.insert(key, value);
            }
        }
        other if !declared.is_empty() => {
            // A scalar return feeds the first declared output.
            let mut names = declared.into_iter();
            if let Some(first) = names.next() {
                outputs.insert(first, other);
            }
            for name in names {
                outputs.insert(name, Value::Null);
            }
        }
        other => {
            outputs.insert("result".to_string(), other);
        }
    }
    Ok(outputs)
}

pub struct ScriptNode;

#[async_trait]
impl NodeBehavior for ScriptNode {
    fn kind(&self) -> &'static str {
        SCRIPT_KIND
    }

    fn ports(&self, settings: &DataMap) -> NodePorts {
        let mut ports = NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT));
        for name in name_list(settings, "inputs") {
            ports.inputs.insert(name.clone(), Port::data(name, DataType::Any));
        }
        for name in name_list(settings, "outputs") {
            ports.outputs.insert(name.clone(), Port::data(name, DataType::Any));
        }
        ports
    }

    fn data(
        &self,
        _node_id: &str,
        inputs: &DataMap,
        ctx: &ActorContext,
    ) -> anyhow::Result<DataMap> {
        run_script(&ctx.settings, inputs)
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        let outputs = run_script(&cx.settings(), cx.inputs())?;
        for (key, value) in outputs {
            cx.set_output(key, value);
        }
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}
