//! Handler traits binding closures of any arity to tool operations.
//!
//! The parameter types of a handler are taken from its signature at compile
//! time; names and descriptions come from the [`Tool`](super::Tool) builder.

use super::output::{erase, IntoToolResult, Outcome, ResultType, ToolValue};
use super::param::{SemanticType, ToolParam};
use crate::{Error, Result};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Owner instance as seen by an erased operation.
pub type Target = Arc<dyn Any + Send + Sync>;

type Coercer = fn(&str, Option<&Value>) -> Result<Box<dyn Any + Send>>;

/// Static description of one handler parameter.
#[derive(Clone, Copy)]
pub struct ParamSignature {
    pub semantic_type: SemanticType,
    pub optional_by_type: bool,
    pub type_name: &'static str,
    coerce: Coercer,
}

impl ParamSignature {
    pub fn of<T: ToolParam>() -> Self {
        Self {
            semantic_type: T::semantic_type(),
            optional_by_type: T::optional_by_type(),
            type_name: std::any::type_name::<T>(),
            coerce: coerce_param::<T>,
        }
    }

    /// Convert one raw argument (or its absence) into the native value.
    pub(crate) fn coerce(&self, name: &str, raw: Option<&Value>) -> Result<Box<dyn Any + Send>> {
        (self.coerce)(name, raw)
    }
}

impl std::fmt::Debug for ParamSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSignature")
            .field("semantic_type", &self.semantic_type)
            .field("optional_by_type", &self.optional_by_type)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn coerce_param<T: ToolParam>(name: &str, raw: Option<&Value>) -> Result<Box<dyn Any + Send>> {
    let value = match raw {
        None => T::absent(),
        Some(raw) => T::coerce(name, raw)?,
    };
    Ok(Box::new(value))
}

/// Coerced native arguments, in declaration order.
#[derive(Default)]
pub struct NativeArgs {
    values: Vec<Box<dyn Any + Send>>,
}

impl NativeArgs {
    pub(crate) fn new(values: Vec<Box<dyn Any + Send>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the argument at `index` as `T`.
    pub fn get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for NativeArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeArgs")
            .field("len", &self.values.len())
            .finish()
    }
}

fn next_arg<T: 'static>(args: &mut std::vec::IntoIter<Box<dyn Any + Send>>) -> Result<T> {
    let boxed = args
        .next()
        .ok_or_else(|| Error::invalid_call("Missing argument for handler"))?;
    boxed.downcast::<T>().map(|b| *b).map_err(|_| {
        Error::invalid_call(format!(
            "Argument does not match handler parameter type '{}'",
            std::any::type_name::<T>()
        ))
    })
}

fn owner_as<T: Send + Sync + 'static>(target: Option<Target>) -> Result<Arc<T>> {
    target
        .ok_or_else(|| Error::invalid_call("Instance operation invoked without an owner"))?
        .downcast::<T>()
        .map_err(|_| {
            Error::invalid_call(format!(
                "Owner is not an instance of '{}'",
                std::any::type_name::<T>()
            ))
        })
}

/// A closure `Fn(A1, .., An) -> R` returning its result immediately.
pub trait SyncFn<Args>: Send + Sync + 'static {
    fn signature() -> Vec<ParamSignature>;
    fn result_type() -> ResultType;
    fn call(&self, args: NativeArgs) -> Result<Outcome<ToolValue>>;
}

/// A closure `Fn(A1, .., An) -> impl Future<Output = R>`.
pub trait AsyncFn<Args>: Send + Sync + 'static {
    fn signature() -> Vec<ParamSignature>;
    fn result_type() -> ResultType;
    fn call(&self, args: NativeArgs) -> Result<Outcome<ToolValue>>;
}

/// A closure `Fn(Arc<T>, A1, .., An) -> R` bound to an instance of `T`.
pub trait SyncMethod<T, Args>: Send + Sync + 'static {
    fn signature() -> Vec<ParamSignature>;
    fn result_type() -> ResultType;
    fn call(&self, owner: Arc<T>, args: NativeArgs) -> Result<Outcome<ToolValue>>;
}

/// A closure `Fn(Arc<T>, A1, .., An) -> impl Future<Output = R>` bound to an instance of `T`.
pub trait AsyncMethod<T, Args>: Send + Sync + 'static {
    fn signature() -> Vec<ParamSignature>;
    fn result_type() -> ResultType;
    fn call(&self, owner: Arc<T>, args: NativeArgs) -> Result<Outcome<ToolValue>>;
}

fn deferred<Fut>(fut: Fut) -> Outcome<ToolValue>
where
    Fut: Future + Send + 'static,
    Fut::Output: IntoToolResult,
{
    Outcome::Pending(Box::pin(async move { erase(fut.await).resolve().await }))
}

macro_rules! impl_handlers {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> SyncFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: IntoToolResult,
            $($arg: ToolParam,)*
        {
            fn signature() -> Vec<ParamSignature> {
                vec![$(ParamSignature::of::<$arg>()),*]
            }

            fn result_type() -> ResultType {
                ResultType::of::<R::Value>(false)
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, args: NativeArgs) -> Result<Outcome<ToolValue>> {
                let mut args = args.values.into_iter();
                $(let $arg = next_arg::<$arg>(&mut args)?;)*
                Ok(erase((self)($($arg),*)))
            }
        }

        impl<F, Fut, $($arg,)*> AsyncFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: IntoToolResult,
            $($arg: ToolParam,)*
        {
            fn signature() -> Vec<ParamSignature> {
                vec![$(ParamSignature::of::<$arg>()),*]
            }

            fn result_type() -> ResultType {
                ResultType::of::<<Fut::Output as IntoToolResult>::Value>(true)
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, args: NativeArgs) -> Result<Outcome<ToolValue>> {
                let mut args = args.values.into_iter();
                $(let $arg = next_arg::<$arg>(&mut args)?;)*
                Ok(deferred((self)($($arg),*)))
            }
        }

        impl<T, F, R, $($arg,)*> SyncMethod<T, ($($arg,)*)> for F
        where
            T: Send + Sync + 'static,
            F: Fn(Arc<T>, $($arg),*) -> R + Send + Sync + 'static,
            R: IntoToolResult,
            $($arg: ToolParam,)*
        {
            fn signature() -> Vec<ParamSignature> {
                vec![$(ParamSignature::of::<$arg>()),*]
            }

            fn result_type() -> ResultType {
                ResultType::of::<R::Value>(false)
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, owner: Arc<T>, args: NativeArgs) -> Result<Outcome<ToolValue>> {
                let mut args = args.values.into_iter();
                $(let $arg = next_arg::<$arg>(&mut args)?;)*
                Ok(erase((self)(owner, $($arg),*)))
            }
        }

        impl<T, F, Fut, $($arg,)*> AsyncMethod<T, ($($arg,)*)> for F
        where
            T: Send + Sync + 'static,
            F: Fn(Arc<T>, $($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: IntoToolResult,
            $($arg: ToolParam,)*
        {
            fn signature() -> Vec<ParamSignature> {
                vec![$(ParamSignature::of::<$arg>()),*]
            }

            fn result_type() -> ResultType {
                ResultType::of::<<Fut::Output as IntoToolResult>::Value>(true)
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, owner: Arc<T>, args: NativeArgs) -> Result<Outcome<ToolValue>> {
                let mut args = args.values.into_iter();
                $(let $arg = next_arg::<$arg>(&mut args)?;)*
                Ok(deferred((self)(owner, $($arg),*)))
            }
        }
    };
}

impl_handlers!();
impl_handlers!(A1);
impl_handlers!(A1, A2);
impl_handlers!(A1, A2, A3);
impl_handlers!(A1, A2, A3, A4);
impl_handlers!(A1, A2, A3, A4, A5);
impl_handlers!(A1, A2, A3, A4, A5, A6);

pub(crate) type Invoke = dyn Fn(Option<Target>, NativeArgs) -> Result<Outcome<ToolValue>> + Send + Sync;

/// Type-erased operation stored in the registry.
pub struct Operation {
    pub(crate) params: Vec<(String, ParamSignature)>,
    pub(crate) result_type: ResultType,
    invoke: Box<Invoke>,
}

impl Operation {
    pub(crate) fn from_fn<Args, F: SyncFn<Args>>(f: F) -> (Vec<ParamSignature>, ResultType, Box<Invoke>) {
        (
            F::signature(),
            F::result_type(),
            Box::new(move |_target, args| f.call(args)),
        )
    }

    pub(crate) fn from_async_fn<Args, F: AsyncFn<Args>>(
        f: F,
    ) -> (Vec<ParamSignature>, ResultType, Box<Invoke>) {
        (
            F::signature(),
            F::result_type(),
            Box::new(move |_target, args| f.call(args)),
        )
    }

    pub(crate) fn from_method<T, Args, F>(f: F) -> (Vec<ParamSignature>, ResultType, Box<Invoke>)
    where
        T: Send + Sync + 'static,
        F: SyncMethod<T, Args>,
    {
        (
            F::signature(),
            F::result_type(),
            Box::new(move |target, args| f.call(owner_as::<T>(target)?, args)),
        )
    }

    pub(crate) fn from_async_method<T, Args, F>(
        f: F,
    ) -> (Vec<ParamSignature>, ResultType, Box<Invoke>)
    where
        T: Send + Sync + 'static,
        F: AsyncMethod<T, Args>,
    {
        (
            F::signature(),
            F::result_type(),
            Box::new(move |target, args| f.call(owner_as::<T>(target)?, args)),
        )
    }

    pub(crate) fn new(
        params: Vec<(String, ParamSignature)>,
        result_type: ResultType,
        invoke: Box<Invoke>,
    ) -> Self {
        Self {
            params,
            result_type,
            invoke,
        }
    }

    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.params.iter().map(|(n, _)| n.as_str())
    }

    pub(crate) fn invoke(&self, target: Option<Target>, args: NativeArgs) -> Result<Outcome<ToolValue>> {
        (self.invoke)(target, args)
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("params", &self.params)
            .field("result_type", &self.result_type.display())
            .finish()
    }
}
