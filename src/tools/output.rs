//! Tool results: immediate or deferred values, stringification, and the erased
//! [`ToolValue`] handed back by the dispatcher.

use crate::{Error, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;

/// A value a tool operation can produce.
///
/// `render` yields the text sent back to the remote model; `None` renders as `"null"`.
pub trait ToolReturn: Send + 'static {
    fn render(&self) -> Option<String>;
}

macro_rules! display_return {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToolReturn for $ty {
                fn render(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )+
    };
}

display_return!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
display_return!(f32, f64, bool, char, String, &'static str);
display_return!(uuid::Uuid, url::Url, chrono::DateTime<chrono::Utc>, chrono::NaiveDate);

impl ToolReturn for chrono::Duration {
    fn render(&self) -> Option<String> {
        Some(super::param::format_duration(self))
    }
}

impl ToolReturn for () {
    fn render(&self) -> Option<String> {
        None
    }
}

impl<T: ToolReturn> ToolReturn for Option<T> {
    fn render(&self) -> Option<String> {
        self.as_ref().and_then(ToolReturn::render)
    }
}

impl ToolReturn for serde_json::Value {
    fn render(&self) -> Option<String> {
        match self {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Wrapper returning any serializable value as JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize + Send + 'static> ToolReturn for Json<T> {
    fn render(&self) -> Option<String> {
        serde_json::to_value(&self.0)
            .ok()
            .and_then(|v| v.render())
    }
}

/// Result of invoking an operation before it has been awaited.
pub enum Outcome<T> {
    Ready(Result<T>),
    Pending(BoxFuture<'static, Result<T>>),
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(r) => f.debug_tuple("Ready").field(r).finish(),
            Outcome::Pending(_) => f.debug_tuple("Pending").field(&"..").finish(),
        }
    }
}

impl<T: Send + 'static> Outcome<T> {
    /// Await a pending outcome; ready outcomes resolve immediately.
    pub async fn resolve(self) -> Result<T> {
        match self {
            Outcome::Ready(r) => r,
            Outcome::Pending(fut) => fut.await,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }
}

/// Anything a handler may return: a plain [`ToolReturn`], a `Result` of one, or a
/// [`Deferred`] that completes later.
pub trait IntoToolResult: Send + 'static {
    type Value: ToolReturn;

    fn into_outcome(self) -> Outcome<Self::Value>;
}

impl<T: ToolReturn> IntoToolResult for T {
    type Value = T;

    fn into_outcome(self) -> Outcome<T> {
        Outcome::Ready(Ok(self))
    }
}

impl<T, E> IntoToolResult for std::result::Result<T, E>
where
    T: ToolReturn,
    E: fmt::Display + Send + 'static,
{
    type Value = T;

    fn into_outcome(self) -> Outcome<T> {
        Outcome::Ready(self.map_err(|e| Error::Invocation(e.to_string())))
    }
}

/// A result that completes later than the call that produced it.
///
/// If the inner future itself yields another deferred value, that value is
/// awaited too before the result is handed back.
pub struct Deferred<O>(BoxFuture<'static, O>);

impl<O: IntoToolResult> Deferred<O> {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = O> + Send + 'static,
    {
        Self(Box::pin(fut))
    }
}

impl<O: IntoToolResult> IntoToolResult for Deferred<O> {
    type Value = O::Value;

    fn into_outcome(self) -> Outcome<O::Value> {
        let fut = self.0;
        Outcome::Pending(Box::pin(async move { fut.await.into_outcome().resolve().await }))
    }
}

/// Declared result type of an operation, compared at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultType {
    pub id: TypeId,
    pub name: &'static str,
    /// The operation produces its value asynchronously.
    pub deferred: bool,
}

impl ResultType {
    pub fn of<T: 'static>(deferred: bool) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            deferred,
        }
    }

    /// Whether a caller asking for `T` can receive this result.
    ///
    /// [`ToolValue`] accepts every result type.
    pub fn is_compatible_with<T: 'static>(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<ToolValue>() || TypeId::of::<T>() == self.id
    }

    pub fn display(&self) -> String {
        if self.deferred {
            format!("Future<{}>", self.name)
        } else {
            self.name.to_string()
        }
    }
}

/// Type-erased value returned by a tool invocation.
pub struct ToolValue {
    value: Box<dyn Any + Send>,
    rendered: Option<String>,
    type_name: &'static str,
}

impl ToolValue {
    pub fn new<T: ToolReturn>(value: T) -> Self {
        let rendered = value.render();
        Self {
            value: Box::new(value),
            rendered,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Text sent back to the remote model; `"null"` when the value is absent.
    pub fn as_text(&self) -> &str {
        self.rendered.as_deref().unwrap_or("null")
    }

    pub fn is_null(&self) -> bool {
        self.rendered.is_none()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the concrete value.
    pub fn downcast<T: 'static>(self) -> std::result::Result<T, Self> {
        let Self {
            value,
            rendered,
            type_name,
        } = self;
        match value.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(value) => Err(Self {
                value,
                rendered,
                type_name,
            }),
        }
    }

    pub(crate) fn into_typed<T: 'static>(self) -> Result<T> {
        let any: Box<dyn Any + Send> = Box::new(self);
        match any.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(any) => match any.downcast::<ToolValue>() {
                Ok(tv) => {
                    let actual = tv.type_name;
                    tv.downcast::<T>().map_err(|_| {
                        Error::invalid_call(format!(
                            "Function result of type '{}' cannot be returned as '{}'",
                            actual,
                            std::any::type_name::<T>()
                        ))
                    })
                }
                Err(_) => Err(Error::invalid_call("Function result has an unknown type")),
            },
        }
    }
}

impl fmt::Display for ToolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

impl fmt::Debug for ToolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolValue")
            .field("type", &self.type_name)
            .field("text", &self.as_text())
            .finish()
    }
}

/// Erase an [`IntoToolResult`] into an outcome producing a [`ToolValue`].
pub(crate) fn erase<O: IntoToolResult>(output: O) -> Outcome<ToolValue> {
    match output.into_outcome() {
        Outcome::Ready(r) => Outcome::Ready(r.map(ToolValue::new)),
        Outcome::Pending(fut) => {
            Outcome::Pending(Box::pin(async move { fut.await.map(ToolValue::new) }))
        }
    }
}
