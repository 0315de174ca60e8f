//! 工具注册表：显式声明宿主函数并生成函数定义
//!
//! Explicit tool registration. Types list their operations through
//! [`ToolProvider`]; the registry turns them into [`FunctionDefinition`]s and
//! keeps the active tool set behind an atomically swapped snapshot.

use super::handler::{
    AsyncFn, AsyncMethod, Invoke, Operation, ParamSignature, SyncFn, SyncMethod,
};
use super::output::ResultType;
use super::schema::{ParamDecl, SchemaCompiler};
use crate::types::tool::{FunctionDefinition, Owner, ToolDefinition};
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Declaration of one tool operation. Finish it with a handler.
///
/// ```rust
/// use ai_lib_realtime::tools::Tool;
///
/// let add = Tool::new("add")
///     .description("Adds two integers")
///     .param("a", "first operand")
///     .param("b", "second operand")
///     .handler(|a: i64, b: i64| a + b);
/// ```
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    description: Option<String>,
    params: Vec<ParamDecl>,
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare the next handler parameter. Required unless its type is `Option<T>`.
    pub fn param(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            description: Some(description.into()),
            optional: false,
            enum_override: None,
        });
        self
    }

    /// Declare the next handler parameter as optional.
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            description: Some(description.into()),
            optional: true,
            enum_override: None,
        });
        self
    }

    /// Declare an enum parameter whose exported values are the comma-separated
    /// `values` instead of the member names.
    pub fn enum_param(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: impl Into<String>,
    ) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            description: Some(description.into()),
            optional: false,
            enum_override: Some(values.into()),
        });
        self
    }

    /// Mark the most recently declared parameter optional.
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.params.last_mut() {
            last.optional = true;
        }
        self
    }

    /// Bind a free function returning its result immediately.
    pub fn handler<Args, F: SyncFn<Args>>(self, f: F) -> StaticOperation {
        StaticOperation(Pending::new(self, Operation::from_fn(f)))
    }

    /// Bind a free function returning a future.
    pub fn handler_async<Args, F: AsyncFn<Args>>(self, f: F) -> StaticOperation {
        StaticOperation(Pending::new(self, Operation::from_async_fn(f)))
    }

    /// Bind a method taking the owner instance as its first argument.
    pub fn method<T, Args, F>(self, f: F) -> InstanceOperation<T>
    where
        T: Send + Sync + 'static,
        F: SyncMethod<T, Args>,
    {
        InstanceOperation(Pending::new(self, Operation::from_method(f)), PhantomData)
    }

    /// Bind an asynchronous method taking the owner instance as its first argument.
    pub fn method_async<T, Args, F>(self, f: F) -> InstanceOperation<T>
    where
        T: Send + Sync + 'static,
        F: AsyncMethod<T, Args>,
    {
        InstanceOperation(
            Pending::new(self, Operation::from_async_method(f)),
            PhantomData,
        )
    }
}

struct Pending {
    tool: Tool,
    signature: Vec<ParamSignature>,
    result_type: ResultType,
    invoke: Box<Invoke>,
}

impl Pending {
    fn new(tool: Tool, parts: (Vec<ParamSignature>, ResultType, Box<Invoke>)) -> Self {
        let (signature, result_type, invoke) = parts;
        Self {
            tool,
            signature,
            result_type,
            invoke,
        }
    }

    fn into_definition(self, owner: Owner) -> Result<FunctionDefinition> {
        let Pending {
            tool,
            signature,
            result_type,
            invoke,
        } = self;

        if tool.name.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "Tool name must not be empty",
                ErrorContext::new()
                    .with_field_path("name")
                    .with_source("registry"),
            ));
        }

        let parameters = SchemaCompiler::compile(&tool.name, &tool.params, &signature)?;
        let params = tool
            .params
            .into_iter()
            .map(|p| p.name)
            .zip(signature)
            .collect();

        Ok(FunctionDefinition {
            name: tool.name,
            description: tool.description,
            parameters,
            owner,
            operation: Arc::new(Operation::new(params, result_type, invoke)),
        })
    }
}

/// A tool bound to a free function.
pub struct StaticOperation(Pending);

impl StaticOperation {
    pub fn name(&self) -> &str {
        &self.0.tool.name
    }

    /// Compile into an unowned definition.
    pub fn into_definition(self) -> Result<FunctionDefinition> {
        self.0.into_definition(Owner::Static)
    }
}

/// A tool bound to a method of `T`.
pub struct InstanceOperation<T>(Pending, PhantomData<fn() -> T>);

impl<T> InstanceOperation<T> {
    pub fn name(&self) -> &str {
        &self.0.tool.name
    }
}

/// Collector for a provider's static operations.
#[derive(Default)]
pub struct StaticTools {
    ops: Vec<StaticOperation>,
}

impl StaticTools {
    pub fn add(&mut self, op: StaticOperation) -> &mut Self {
        self.ops.push(op);
        self
    }
}

/// Collector for a provider's instance operations.
pub struct InstanceTools<T> {
    ops: Vec<InstanceOperation<T>>,
}

impl<T> InstanceTools<T> {
    fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn add(&mut self, op: InstanceOperation<T>) -> &mut Self {
        self.ops.push(op);
        self
    }
}

/// A type exposing host operations as tools.
///
/// ```rust
/// use ai_lib_realtime::tools::{InstanceTools, StaticTools, Tool, ToolProvider};
/// use std::sync::Arc;
///
/// struct Counter(std::sync::atomic::AtomicI64);
///
/// impl ToolProvider for Counter {
///     fn static_tools(tools: &mut StaticTools) {
///         tools.add(Tool::new("ping").handler(|| "pong"));
///     }
///
///     fn instance_tools(tools: &mut InstanceTools<Self>) {
///         tools.add(
///             Tool::new("increment")
///                 .param("by", "amount to add")
///                 .method(|this: Arc<Counter>, by: i64| {
///                     this.0.fetch_add(by, std::sync::atomic::Ordering::SeqCst) + by
///                 }),
///         );
///     }
/// }
/// ```
pub trait ToolProvider: Sized + Send + Sync + 'static {
    fn static_tools(_tools: &mut StaticTools) {}

    fn instance_tools(_tools: &mut InstanceTools<Self>) {}
}

/// Named function definitions. Inserting an existing name replaces it in place.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    definitions: Vec<FunctionDefinition>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the static operations of `T`.
    pub fn with_type<T: ToolProvider>(mut self) -> Result<Self> {
        self.extend(CallableRegistry::register_type::<T>()?);
        Ok(self)
    }

    /// Add every operation of `T`, bound to `instance`.
    pub fn with_instance<T: ToolProvider>(mut self, instance: &Arc<T>) -> Result<Self> {
        self.extend(CallableRegistry::register_instance(instance)?);
        Ok(self)
    }

    /// Add a single free-function tool.
    pub fn with_tool(mut self, op: StaticOperation) -> Result<Self> {
        self.insert(op.into_definition()?);
        Ok(self)
    }

    pub fn insert(&mut self, definition: FunctionDefinition) {
        match self.index.get(&definition.name) {
            Some(&i) => self.definitions[i] = definition,
            None => {
                self.index
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.definitions.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Export every definition in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.iter().map(FunctionDefinition::to_tool).collect()
    }
}

impl Extend<FunctionDefinition> for ToolSet {
    fn extend<I: IntoIterator<Item = FunctionDefinition>>(&mut self, iter: I) {
        for def in iter {
            self.insert(def);
        }
    }
}

impl FromIterator<FunctionDefinition> for ToolSet {
    fn from_iter<I: IntoIterator<Item = FunctionDefinition>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        set.extend(iter);
        set
    }
}

/// Holder of the active tool set.
///
/// Replacing the set swaps one immutable snapshot, so a concurrent lookup sees
/// either the old or the new set in full.
pub struct CallableRegistry {
    tools: ArcSwap<ToolSet>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self {
            tools: ArcSwap::from_pointee(ToolSet::new()),
        }
    }

    /// Definitions for the static operations of `T`. No owner is bound.
    pub fn register_type<T: ToolProvider>() -> Result<Vec<FunctionDefinition>> {
        let mut statics = StaticTools::default();
        T::static_tools(&mut statics);
        statics
            .ops
            .into_iter()
            .map(StaticOperation::into_definition)
            .collect()
    }

    /// Definitions for the static and instance operations of `T`, all bound to
    /// `instance` without keeping it alive.
    pub fn register_instance<T: ToolProvider>(
        instance: &Arc<T>,
    ) -> Result<Vec<FunctionDefinition>> {
        let mut statics = StaticTools::default();
        T::static_tools(&mut statics);
        let mut methods = InstanceTools::<T>::new();
        T::instance_tools(&mut methods);

        let owner = Owner::instance(instance);
        statics
            .ops
            .into_iter()
            .map(|op| op.0)
            .chain(methods.ops.into_iter().map(|op| op.0))
            .map(|pending| pending.into_definition(owner.clone()))
            .collect()
    }

    /// Replace the active tool set.
    pub fn replace(&self, tools: ToolSet) {
        tracing::debug!(tools = ?tools.names(), "Replacing active tool set");
        self.tools.store(Arc::new(tools));
    }

    pub fn snapshot(&self) -> Arc<ToolSet> {
        self.tools.load_full()
    }

    pub fn get(&self, name: &str) -> Option<FunctionDefinition> {
        self.tools.load().get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.tools.load().iter().cloned().collect()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.load().tool_definitions()
    }

    pub fn len(&self) -> usize {
        self.tools.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.load().is_empty()
    }
}

impl Default for CallableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableRegistry")
            .field("tools", &self.tools.load().names())
            .finish()
    }
}
