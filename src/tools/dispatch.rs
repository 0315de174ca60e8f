//! Function call dispatch: resolve a call against the registry, coerce its
//! arguments and run the bound operation.

use super::coerce::ArgumentCoercer;
use super::handler::{NativeArgs, Target};
use super::output::ToolValue;
use super::registry::CallableRegistry;
use crate::types::tool::{FunctionCall, FunctionDefinition};
use crate::{Error, ErrorContext, Result};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A call ready to run: the definition, its live owner and native arguments.
pub struct Resolved<T> {
    definition: FunctionDefinition,
    target: Option<Target>,
    args: NativeArgs,
    _result: PhantomData<fn() -> T>,
}

impl<T> Resolved<T> {
    pub fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    pub fn args(&self) -> &NativeArgs {
        &self.args
    }
}

impl<T> std::fmt::Debug for Resolved<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("function", &self.definition.name)
            .field("args", &self.args)
            .field("result", &std::any::type_name::<T>())
            .finish()
    }
}

/// Resolves and invokes function calls against a [`CallableRegistry`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CallableRegistry>,
    partial_arguments: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<CallableRegistry>) -> Self {
        Self {
            registry,
            partial_arguments: false,
        }
    }

    /// Parse arguments in partial mode for [`call`](Self::call) and
    /// [`call_as`](Self::call_as).
    pub fn with_partial_arguments(mut self, partial: bool) -> Self {
        self.partial_arguments = partial;
        self
    }

    pub fn partial_arguments(&self) -> bool {
        self.partial_arguments
    }

    pub fn registry(&self) -> &Arc<CallableRegistry> {
        &self.registry
    }

    /// Resolve `call` to a runnable operation producing `T`.
    ///
    /// Use [`ToolValue`] as `T` to accept any result type.
    pub fn resolve<T: 'static>(&self, call: &FunctionCall, partial: bool) -> Result<Resolved<T>> {
        if call.name.trim().is_empty() {
            return Err(Error::invalid_call_with_context(
                "Function name is empty",
                ErrorContext::new()
                    .with_field_path("name")
                    .with_source("dispatcher"),
            ));
        }

        let definition = self.registry.get(&call.name).ok_or_else(|| {
            Error::invalid_call_with_context(
                format!("Unknown function '{}'", call.name),
                ErrorContext::new()
                    .with_field_path("name")
                    .with_source("dispatcher"),
            )
        })?;
        self.resolve_definition(definition, call, partial)
    }

    /// Resolve `call` against an explicit definition.
    pub fn resolve_definition<T: 'static>(
        &self,
        definition: FunctionDefinition,
        call: &FunctionCall,
        partial: bool,
    ) -> Result<Resolved<T>> {
        let target = definition.resolve_owner().map_err(|()| {
            Error::invalid_call(format!(
                "Owner of function '{}' is no longer available",
                definition.name
            ))
        })?;

        let result_type = definition.result_type();
        if !result_type.is_compatible_with::<T>() {
            return Err(Error::invalid_call_with_context(
                format!(
                    "Function '{}' returns '{}', which is not compatible with '{}'",
                    definition.name,
                    result_type.display(),
                    std::any::type_name::<T>()
                ),
                ErrorContext::new()
                    .with_field_path("result")
                    .with_source("dispatcher"),
            ));
        }

        let arguments = ArgumentCoercer::parse(&call.arguments, partial)?;
        let args = ArgumentCoercer::coerce(&definition.operation.params, &arguments)?;
        debug!(function = %definition.name, args = args.len(), "Resolved function call");

        Ok(Resolved {
            definition,
            target,
            args,
            _result: PhantomData,
        })
    }

    /// Run a resolved call, awaiting deferred results.
    pub async fn invoke<T: 'static>(&self, resolved: Resolved<T>) -> Result<T> {
        let Resolved {
            definition,
            target,
            args,
            ..
        } = resolved;
        let outcome = definition.operation.invoke(target, args)?;
        let deferred = outcome.is_deferred();
        let value = outcome.resolve().await?;
        debug!(
            function = %definition.name,
            deferred,
            result = %value.as_text(),
            "Function call completed"
        );
        value.into_typed::<T>()
    }

    /// Resolve and invoke `call`, returning the erased value.
    pub async fn call(&self, call: &FunctionCall) -> Result<ToolValue> {
        self.call_as::<ToolValue>(call).await
    }

    /// Resolve and invoke `call`, returning a value of the operation's result type.
    pub async fn call_as<T: 'static>(&self, call: &FunctionCall) -> Result<T> {
        let resolved = self.resolve::<T>(call, self.partial_arguments)?;
        self.invoke(resolved).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Deferred, InstanceTools, StaticTools, Tool, ToolProvider, ToolSet};
    use std::cell::Cell;

    crate::tool_enum! {
        enum Color { Red, Green, Blue }
    }

    thread_local! {
        static INVOCATIONS: Cell<usize> = const { Cell::new(0) };
    }

    struct Palette {
        prefix: String,
    }

    impl ToolProvider for Palette {
        fn static_tools(tools: &mut StaticTools) {
            tools
                .add(
                    Tool::new("pick")
                        .param("color", "a color")
                        .handler(|c: Color| {
                            INVOCATIONS.with(|n| n.set(n.get() + 1));
                            c
                        }),
                )
                .add(
                    Tool::new("later")
                        .param("n", "a number")
                        .handler_async(|n: i64| async move { n * 2 }),
                )
                .add(Tool::new("nested").handler(|| {
                    Deferred::new(async { Deferred::new(async { "inner".to_string() }) })
                }))
                .add(
                    Tool::new("fails")
                        .handler(|| -> std::result::Result<i32, String> { Err("boom".into()) }),
                );
        }

        fn instance_tools(tools: &mut InstanceTools<Self>) {
            tools.add(
                Tool::new("label")
                    .param("text", "text to label")
                    .method(|this: Arc<Palette>, text: String| format!("{}{}", this.prefix, text)),
            );
        }
    }

    fn dispatcher(palette: &Arc<Palette>) -> Dispatcher {
        let registry = Arc::new(CallableRegistry::new());
        registry.replace(ToolSet::new().with_instance(palette).unwrap());
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_enum_argument_is_case_insensitive() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let d = dispatcher(&palette);
        let color: Color = d
            .call_as(&FunctionCall::new("pick", r#"{"color":"red"}"#))
            .await
            .unwrap();
        assert_eq!(color, Color::Red);
    }

    #[tokio::test]
    async fn test_unknown_enum_value_lists_options() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let err = dispatcher(&palette)
            .call(&FunctionCall::new("pick", r#"{"color":"purple"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCall { .. }));
        assert!(err.to_string().contains("Red, Green, Blue"));
    }

    #[tokio::test]
    async fn test_unknown_function_invokes_nothing() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let d = dispatcher(&palette);
        let before = INVOCATIONS.with(Cell::get);
        for name in ["", "missing"] {
            let err = d.call(&FunctionCall::new(name, "{}")).await.unwrap_err();
            assert!(matches!(err, Error::InvalidCall { .. }));
        }
        assert_eq!(INVOCATIONS.with(Cell::get), before);
    }

    #[tokio::test]
    async fn test_result_type_check() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let d = dispatcher(&palette);
        let doubled: i64 = d
            .call_as(&FunctionCall::new("later", r#"{"n": 21}"#))
            .await
            .unwrap();
        assert_eq!(doubled, 42);

        let err = d
            .resolve::<String>(&FunctionCall::new("later", "{}"), false)
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Future<i64>"), "{}", text);
        assert!(text.contains("String"), "{}", text);
    }

    #[tokio::test]
    async fn test_nested_deferred_is_awaited() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let value = dispatcher(&palette)
            .call(&FunctionCall::new("nested", ""))
            .await
            .unwrap();
        assert_eq!(value.as_text(), "inner");
    }

    #[tokio::test]
    async fn test_invocation_failure_propagates() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let err = dispatcher(&palette)
            .call(&FunctionCall::new("fails", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invocation(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn test_method_uses_live_owner() {
        let palette = Arc::new(Palette { prefix: "#".into() });
        let d = dispatcher(&palette);
        let call = FunctionCall::new("label", r#"{"text":"ff0000"}"#);
        assert_eq!(d.call(&call).await.unwrap().as_text(), "#ff0000");

        drop(palette);
        let err = d.call(&call).await.unwrap_err();
        assert!(err.to_string().contains("no longer available"));
    }

    #[tokio::test]
    async fn test_partial_arguments() {
        let palette = Arc::new(Palette { prefix: ">".into() });
        let d = dispatcher(&palette).with_partial_arguments(true);
        let value = d
            .call(&FunctionCall::new("label", r#"{"text":"hel"#))
            .await
            .unwrap();
        assert_eq!(value.as_text(), ">hel");
    }
}
