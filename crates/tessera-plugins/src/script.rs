//! Script adapter for downloaded plugins.
//!
//! A plugin is a single rhai module. Its top-level statements form the
//! constructor and run once, with two values in scope:
//!
//! - `host`: the global channel
//! - `tool`: the plugin's own channel
//!
//! The constructor's final expression is the plugin state: an object map, or
//! nothing for an empty one. Both channels are copied into the state, so the
//! hooks reach them through `this`:
//!
//! ```rhai
//! fn on_create(card) { this.tool.emit("created", card.name); }
//! fn on_delete(card) { }
//! fn on_load(card)   { this.loaded += 1; }
//! fn on_unload(id)   { true }
//!
//! #{ loaded: 0 }
//! ```
//!
//! Channels expose to scripts:
//!
//! - `emit(event)`, `emit(event, payload)`, `get_data(event)`, `toggle(event)`
//! - `on(event, fn)` and `on_request(event, fn)`, returning a subscription
//!   that `off(event, subscription)` removes. Callbacks get the payload and
//!   run without `this`; a request callback's non-unit result is the reply.
//! - `card_fs(request)`, which sends a `"card-fs"` request such as
//!   `#{ cardName: card.name, op: "writeFile", path: "a.md", contents: "" }`
//!   and returns the reply or throws the host's error
//!
//! A hook returning nothing succeeds, a bool is the status, and an object
//! map is read as `#{status, message, error}`.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope};
use serde_json::Value;
use tracing::{debug, info, warn};

use tessera_core::{CardId, CardRecord, HookOutcome, ToolName};
use tessera_events::{Channel, SubscriptionId, topics};

use crate::error::{PluginError, PluginResult};
use crate::plugin::{Plugin, PluginContext};

/// Hooks a script must define, with their arity.
const REQUIRED_HOOKS: [(&str, usize, &str); 4] = [
    ("on_create", 1, "on_create(card)"),
    ("on_delete", 1, "on_delete(card)"),
    ("on_load", 1, "on_load(card)"),
    ("on_unload", 1, "on_unload(id)"),
];

/// Resource limits applied to every script engine. Zero disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Maximum operations per constructor or hook call.
    pub max_operations: u64,
    /// Maximum function call nesting.
    pub max_call_levels: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
        }
    }
}

impl ScriptLimits {
    /// No limits at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 0,
        }
    }
}

/// Engine and module shared by the hooks and the listeners a script
/// registers.
struct ScriptHost {
    engine: Engine,
    ast: AST,
}

/// Filled once the module is compiled. Listeners hold the slot, never the
/// host, so dropping the plugin silences them.
type HostSlot = Arc<OnceLock<Weak<ScriptHost>>>;

/// A plugin implemented by a rhai module.
pub struct ScriptPlugin {
    tool: ToolName,
    host: Arc<ScriptHost>,
    state: Dynamic,
}

impl std::fmt::Debug for ScriptPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPlugin")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

impl ScriptPlugin {
    /// Compile `source`, check the hook interface and run the constructor.
    ///
    /// Listeners registered by the constructor stay silent until it returns.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Script`] if the source does not compile, the
    /// constructor throws or yields something other than an object map, and
    /// [`PluginError::MissingHook`] if a lifecycle hook is not defined.
    pub fn load(source: &str, ctx: &PluginContext, limits: ScriptLimits) -> PluginResult<Self> {
        let tool = ctx.tool.clone();
        let slot = HostSlot::default();
        let engine = build_engine(&tool, limits, &slot);
        let script_error = |message: String| PluginError::Script {
            tool: tool.clone(),
            message,
        };

        let ast = engine
            .compile(source)
            .map_err(|e| script_error(e.to_string()))?;

        for (name, arity, hook) in REQUIRED_HOOKS {
            let defined = ast
                .iter_functions()
                .any(|f| f.name == name && f.params.len() == arity);
            if !defined {
                return Err(PluginError::MissingHook {
                    tool: tool.clone(),
                    hook,
                });
            }
        }

        let mut scope = Scope::new();
        scope.push("host", ctx.host.clone());
        scope.push("tool", ctx.channel.clone());
        let constructed = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| script_error(format!("constructor failed: {e}")))?;

        let mut state: Map = if constructed.is_unit() {
            Map::new()
        } else {
            let type_name = constructed.type_name();
            constructed.try_cast::<Map>().ok_or_else(|| {
                script_error(format!(
                    "constructor must yield an object map, got {type_name}"
                ))
            })?
        };
        state.insert("host".into(), Dynamic::from(ctx.host.clone()));
        state.insert("tool".into(), Dynamic::from(ctx.channel.clone()));

        let host = Arc::new(ScriptHost { engine, ast });
        if slot.set(Arc::downgrade(&host)).is_err() {
            warn!(tool = %tool, "Script host was already set");
        }

        debug!(tool = %tool, "Script plugin constructed");
        Ok(Self {
            tool,
            host,
            state: Dynamic::from_map(state),
        })
    }

    fn call(&mut self, hook: &str, arg: Dynamic) -> HookOutcome {
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut self.state);
        let mut scope = Scope::new();
        match self
            .host
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut scope, &self.host.ast, hook, (arg,))
        {
            Ok(result) => outcome_from(result),
            Err(e) => HookOutcome::error(format!("{hook} failed"), e),
        }
    }

    fn card_arg(card: &CardRecord) -> Result<Dynamic, HookOutcome> {
        rhai::serde::to_dynamic(card)
            .map_err(|e| HookOutcome::error("card could not be passed to the script", e))
    }
}

#[async_trait]
impl Plugin for ScriptPlugin {
    async fn on_create(&mut self, card: &CardRecord) -> HookOutcome {
        match Self::card_arg(card) {
            Ok(arg) => self.call("on_create", arg),
            Err(outcome) => outcome,
        }
    }

    async fn on_delete(&mut self, card: &CardRecord) -> HookOutcome {
        match Self::card_arg(card) {
            Ok(arg) => self.call("on_delete", arg),
            Err(outcome) => outcome,
        }
    }

    async fn on_load(&mut self, card: &CardRecord) -> HookOutcome {
        match Self::card_arg(card) {
            Ok(arg) => self.call("on_load", arg),
            Err(outcome) => outcome,
        }
    }

    async fn on_unload(&mut self, card_id: &CardId) -> HookOutcome {
        self.call("on_unload", Dynamic::from(card_id.as_str().to_string()))
    }
}

/// Map a hook's return value onto an outcome.
fn outcome_from(result: Dynamic) -> HookOutcome {
    if result.is_unit() {
        return HookOutcome::ok();
    }
    if let Ok(status) = result.as_bool() {
        return if status {
            HookOutcome::ok()
        } else {
            HookOutcome::failed("hook returned false")
        };
    }
    if result.is_map() {
        return rhai::serde::from_dynamic::<HookOutcome>(&result)
            .unwrap_or_else(|e| HookOutcome::error("hook returned a malformed outcome", e));
    }
    HookOutcome::failed(format!(
        "hook returned unsupported type {}",
        result.type_name()
    ))
}

fn build_engine(tool: &ToolName, limits: ScriptLimits, slot: &HostSlot) -> Engine {
    let mut engine = Engine::new();
    if limits.max_operations > 0 {
        engine.set_max_operations(limits.max_operations);
    }
    if limits.max_call_levels > 0 {
        engine.set_max_call_levels(limits.max_call_levels);
    }

    let print_tool = tool.clone();
    engine.on_print(move |text| info!(tool = %print_tool, "{text}"));
    let debug_tool = tool.clone();
    engine.on_debug(move |text, _source, pos| {
        debug!(tool = %debug_tool, position = %pos, "{text}");
    });

    register_channel(&mut engine, tool, slot);
    engine
}

fn to_json(payload: &Dynamic) -> Result<Value, Box<EvalAltResult>> {
    rhai::serde::from_dynamic::<Value>(payload)
}

/// Run a script callback for one emission. Failures are logged and read as
/// no reply.
fn run_callback(
    slot: &HostSlot,
    tool: &ToolName,
    event: &str,
    callback: &FnPtr,
    payload: &Value,
) -> Option<Dynamic> {
    let Some(host) = slot.get().and_then(Weak::upgrade) else {
        debug!(tool = %tool, event, "Script callback skipped, script is not running");
        return None;
    };
    let arg = match rhai::serde::to_dynamic(payload) {
        Ok(arg) => arg,
        Err(e) => {
            warn!(tool = %tool, event, error = %e, "Payload could not be passed to the script");
            return None;
        },
    };
    match callback.call::<Dynamic>(&host.engine, &host.ast, (arg,)) {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(tool = %tool, event, error = %e, "Script callback failed");
            None
        },
    }
}

/// Send a `"card-fs"` request and wait for the host's reply.
///
/// The host answers with `tokio::fs` work, which runs on the blocking pool
/// and so completes while this thread waits.
fn card_fs_request(channel: &Channel, request: &Dynamic) -> Result<Dynamic, Box<EvalAltResult>> {
    let payload = to_json(request)?;
    let reply = futures::executor::block_on(channel.emit_async(topics::CARD_FS, payload))
        .map_err(|e| e.to_string())?;
    match reply {
        Some(reply) => rhai::serde::to_dynamic(reply),
        None => Err(format!("card-fs is not served on channel {}", channel.label()).into()),
    }
}

fn register_channel(engine: &mut Engine, tool: &ToolName, slot: &HostSlot) {
    let (listen_slot, listen_tool) = (Arc::clone(slot), tool.clone());
    let (request_slot, request_tool) = (Arc::clone(slot), tool.clone());

    engine
        .register_type_with_name::<SubscriptionId>("Subscription")
        .register_type_with_name::<Channel>("Channel")
        .register_fn(
            "emit",
            |channel: &mut Channel, event: &str, payload: Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
                let reply = channel.emit(event, to_json(&payload)?);
                rhai::serde::to_dynamic(reply.unwrap_or(Value::Null))
            },
        )
        .register_fn(
            "emit",
            |channel: &mut Channel, event: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                let reply = channel.emit(event, Value::Null);
                rhai::serde::to_dynamic(reply.unwrap_or(Value::Null))
            },
        )
        .register_fn(
            "get_data",
            |channel: &mut Channel, event: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                rhai::serde::to_dynamic(channel.get_data(event).unwrap_or(Value::Null))
            },
        )
        .register_fn("toggle", |channel: &mut Channel, event: &str| {
            channel.toggle(event)
        })
        .register_fn(
            "on",
            move |channel: &mut Channel, event: &str, callback: FnPtr| -> SubscriptionId {
                let (slot, tool) = (Arc::clone(&listen_slot), listen_tool.clone());
                let name = event.to_string();
                channel.on(event, move |payload| {
                    run_callback(&slot, &tool, &name, &callback, payload);
                })
            },
        )
        .register_fn(
            "on_request",
            move |channel: &mut Channel, event: &str, callback: FnPtr| -> SubscriptionId {
                let (slot, tool) = (Arc::clone(&request_slot), request_tool.clone());
                let name = event.to_string();
                channel.on_request(event, move |payload| {
                    let reply = run_callback(&slot, &tool, &name, &callback, payload)?;
                    if reply.is_unit() {
                        return None;
                    }
                    match to_json(&reply) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!(tool = %tool, event = %name, error = %e, "Script reply is not JSON");
                            None
                        },
                    }
                })
            },
        )
        .register_fn(
            "off",
            |channel: &mut Channel, event: &str, subscription: SubscriptionId| {
                channel.off(event, subscription)
            },
        )
        .register_fn("card_fs", |channel: &mut Channel, request: Dynamic| {
            card_fs_request(channel, &request)
        })
        .register_get("label", |channel: &mut Channel| channel.label().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tessera_core::Realm;
    use tessera_storage::MemoryKvStore;

    const COMPLETE: &str = r#"
        fn on_create(card) {
            this.created += 1;
            this.tool.emit("created", card.name);
        }
        fn on_delete(card) { true }
        fn on_load(card) {
            if card.name == "broken" {
                return #{ status: false, message: "cannot render" };
            }
            this.host.emit("loaded", #{ id: card.id, created: this.created });
        }
        fn on_unload(id) { throw "unload exploded"; }

        #{ created: 0 }
    "#;

    fn context() -> PluginContext {
        PluginContext {
            tool: ToolName::from_static("weather"),
            host: Channel::new("host"),
            channel: Channel::new("weather"),
            config: Arc::new(MemoryKvStore::new()),
        }
    }

    fn card(name: &str) -> CardRecord {
        CardRecord::new(ToolName::from_static("weather"), name, "*").with_id("node-1")
    }

    #[tokio::test]
    async fn test_hooks_share_state_and_channels() {
        let ctx = context();
        let loaded = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&loaded);
        ctx.host.on("loaded", move |payload| {
            *sink.lock().unwrap() = Some(payload.clone());
        });

        let mut plugin = ScriptPlugin::load(COMPLETE, &ctx, ScriptLimits::default()).unwrap();
        assert!(plugin.on_create(&card("forecast")).await.is_ok());
        assert_eq!(ctx.channel.get_data("created"), Some(json!("forecast")));

        assert!(plugin.on_load(&card("forecast")).await.is_ok());
        assert_eq!(
            loaded.lock().unwrap().clone(),
            Some(json!({"id": "node-1", "created": 1}))
        );
    }

    #[tokio::test]
    async fn test_return_values_map_to_outcomes() {
        let mut plugin = ScriptPlugin::load(COMPLETE, &context(), ScriptLimits::default()).unwrap();

        assert!(plugin.on_delete(&card("x")).await.is_ok());

        let refused = plugin.on_load(&card("broken")).await;
        assert!(!refused.is_ok());
        assert_eq!(refused.message.as_deref(), Some("cannot render"));

        let thrown = plugin.on_unload(&CardId::new("node-1")).await;
        assert!(!thrown.is_ok());
        assert_eq!(thrown.message.as_deref(), Some("on_unload failed"));
        assert!(thrown.error.unwrap().contains("unload exploded"));
    }

    const LISTENING: &str = r#"
        fn on_create(card) {}
        fn on_delete(card) {}
        fn on_load(card) {
            let host = this.host;
            this.ping = this.tool.on("ping", |payload| host.emit("pong", payload));
            this.ask = this.tool.on_request("ask", |payload| payload * 2);
        }
        fn on_unload(id) {
            this.tool.off("ping", this.ping)
        }

        #{}
    "#;

    #[tokio::test]
    async fn test_script_listeners_subscribe_and_unsubscribe() {
        let ctx = context();
        let mut plugin = ScriptPlugin::load(LISTENING, &ctx, ScriptLimits::default()).unwrap();
        assert!(plugin.on_load(&card("radar")).await.is_ok());

        ctx.channel.emit("ping", json!({"n": 1}));
        assert_eq!(ctx.host.get_data("pong"), Some(json!({"n": 1})));
        assert_eq!(ctx.channel.emit("ask", json!(21)), Some(json!(42)));

        // `off` found the subscription, so the hook reports success.
        assert!(plugin.on_unload(&CardId::new("node-1")).await.is_ok());
        assert_eq!(ctx.channel.subscriber_count("ping"), 0);
        ctx.channel.emit("ping", json!("late"));
        assert_eq!(ctx.host.get_data("pong"), Some(json!({"n": 1})));

        // Listeners outliving the plugin stay silent.
        drop(plugin);
        assert_eq!(ctx.channel.emit("ask", json!(1)), None);
    }

    #[tokio::test]
    async fn test_card_fs_requests_reach_the_host() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context();
        crate::card_fs::serve(&ctx.channel, &Realm::new(tmp.path()), &ctx.tool);
        let source = r#"
            fn on_create(card) {
                this.tool.card_fs(#{
                    cardName: card.name, op: "writeFile", path: "notes/a.md", contents: "hello"
                });
            }
            fn on_delete(card) {}
            fn on_load(card) {
                let reply = this.tool.card_fs(#{ cardName: card.name, op: "readFile", path: "notes/a.md" });
                this.tool.emit("read", reply.contents);
            }
            fn on_unload(id) {
                this.tool.card_fs(#{ cardName: "../escape", op: "readDir" });
            }

            #{}
        "#;
        let mut plugin = ScriptPlugin::load(source, &ctx, ScriptLimits::default()).unwrap();

        assert!(plugin.on_create(&card("forecast")).await.is_ok());
        let written = tmp.path().join("main/weather/forecast/notes/a.md");
        assert_eq!(std::fs::read_to_string(written).unwrap(), "hello");

        assert!(plugin.on_load(&card("forecast")).await.is_ok());
        assert_eq!(ctx.channel.get_data("read"), Some(json!("hello")));

        let escaped = plugin.on_unload(&CardId::new("node-1")).await;
        assert!(!escaped.is_ok());
        assert!(!tmp.path().join("main/weather/escape").exists());
    }

    #[test]
    fn test_card_fs_without_a_server_throws() {
        let source = "fn on_create(card) {} fn on_delete(card) {} fn on_load(card) {} \
                      fn on_unload(id) {} tool.card_fs(#{ cardName: \"x\", op: \"readDir\" })";
        assert!(matches!(
            ScriptPlugin::load(source, &context(), ScriptLimits::default()),
            Err(PluginError::Script { .. })
        ));
    }

    #[test]
    fn test_missing_hook_is_rejected() {
        let source = "fn on_create(card) {} fn on_delete(card) {} fn on_load(card) {}";
        let err = ScriptPlugin::load(source, &context(), ScriptLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            PluginError::MissingHook {
                hook: "on_unload(id)",
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_arity_counts_as_missing() {
        let source = "fn on_create() {} fn on_delete(card) {} fn on_load(card) {} fn on_unload(id) {}";
        assert!(matches!(
            ScriptPlugin::load(source, &context(), ScriptLimits::default()),
            Err(PluginError::MissingHook {
                hook: "on_create(card)",
                ..
            })
        ));
    }

    #[test]
    fn test_compile_and_constructor_errors() {
        let ctx = context();
        assert!(matches!(
            ScriptPlugin::load("fn on_create(card) {", &ctx, ScriptLimits::default()),
            Err(PluginError::Script { .. })
        ));

        let throwing = "fn on_create(card) {} fn on_delete(card) {} fn on_load(card) {} \
                        fn on_unload(id) {} throw \"no\";";
        assert!(matches!(
            ScriptPlugin::load(throwing, &ctx, ScriptLimits::default()),
            Err(PluginError::Script { .. })
        ));

        let not_a_map = "fn on_create(card) {} fn on_delete(card) {} fn on_load(card) {} \
                         fn on_unload(id) {} 42";
        assert!(matches!(
            ScriptPlugin::load(not_a_map, &ctx, ScriptLimits::default()),
            Err(PluginError::Script { .. })
        ));
    }

    #[test]
    fn test_constructor_sees_channels() {
        let ctx = context();
        ctx.channel.emit("units", json!("metric"));
        let source = "fn on_create(card) {} fn on_delete(card) {} fn on_load(card) {} \
                      fn on_unload(id) {} #{ units: tool.get_data(\"units\") }";
        let plugin = ScriptPlugin::load(source, &ctx, ScriptLimits::default()).unwrap();
        let state = plugin.state.read_lock::<Map>().unwrap();
        assert_eq!(state["units"].clone().into_string().unwrap(), "metric");
    }

    #[tokio::test]
    async fn test_operation_limit_stops_runaway_hooks() {
        let source = "fn on_create(card) { loop { } } fn on_delete(card) {} \
                      fn on_load(card) {} fn on_unload(id) {}";
        let limits = ScriptLimits {
            max_operations: 1_000,
            max_call_levels: 8,
        };
        let mut plugin = ScriptPlugin::load(source, &context(), limits).unwrap();
        let outcome = plugin.on_create(&card("spin")).await;
        assert!(!outcome.is_ok());
    }
}
