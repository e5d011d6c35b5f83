//! User-defined SQL functions.
//!
//! A [`Function`] bundles host closures in one of three shapes (scalar,
//! aggregate, window). Registering it through
//! [`Database::create_function`](crate::db::Database::create_function)
//! stores the closures under a host-issued id that the engine hands back on
//! every invocation; [`shim`] turns those invocations into closure calls.

pub(crate) mod shim;

use crate::types::{
    constants::{func_flags, func_mode},
    Error, ExtendedValue, Result, Value,
};

/// Closure taking the row's arguments.
pub type Callable = Box<dyn FnMut(&[Value]) -> Result<ExtendedValue> + Send>;

/// Closure producing the current or final aggregate value.
pub type Finisher = Box<dyn FnMut() -> Result<ExtendedValue> + Send>;

/// Shape of a registered function.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// One call per row, no state between calls.
    Scalar,
    /// `step` per row, `final` once per group.
    Aggregate,
    /// Aggregate that can also drop rows from a sliding frame.
    Window,
}

impl FunctionKind {
    pub(crate) fn mode(self) -> i32 {
        match self {
            FunctionKind::Scalar => func_mode::SCALAR,
            FunctionKind::Aggregate => func_mode::AGGREGATE,
            FunctionKind::Window => func_mode::WINDOW,
        }
    }

    /// Whether the engine sends a destroy notification for this shape.
    pub(crate) fn engine_destroys(self) -> bool {
        !matches!(self, FunctionKind::Aggregate)
    }
}

/// Which engine callback is running.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Invocation {
    Func,
    Step,
    Inverse,
    Value,
    Final,
}

impl Invocation {
    /// Callbacks that receive an argument vector.
    pub(crate) fn takes_args(self) -> bool {
        matches!(self, Invocation::Func | Invocation::Step | Invocation::Inverse)
    }

    /// Callbacks whose return value becomes the SQL result.
    pub(crate) fn reports_value(self) -> bool {
        matches!(self, Invocation::Func | Invocation::Value | Invocation::Final)
    }
}

#[derive(Default)]
struct Callables {
    func: Option<Callable>,
    step: Option<Callable>,
    inverse: Option<Callable>,
    value: Option<Finisher>,
    finish: Option<Finisher>,
}

/// A user-defined function ready to be registered.
pub struct Function {
    kind: FunctionKind,
    n_arg: i32,
    deterministic: bool,
    callables: Callables,
}

fn boxed<F, R>(mut f: F) -> Callable
where
    F: FnMut(&[Value]) -> Result<R> + Send + 'static,
    R: Into<ExtendedValue>,
{
    Box::new(move |args| f(args).map(Into::into))
}

fn boxed_finisher<F, R>(mut f: F) -> Finisher
where
    F: FnMut() -> Result<R> + Send + 'static,
    R: Into<ExtendedValue>,
{
    Box::new(move || f().map(Into::into))
}

impl Function {
    /// Scalar function.
    pub fn scalar<F, R>(func: F) -> Self
    where
        F: FnMut(&[Value]) -> Result<R> + Send + 'static,
        R: Into<ExtendedValue>,
    {
        Self::from_callables(
            FunctionKind::Scalar,
            Callables {
                func: Some(boxed(func)),
                ..Callables::default()
            },
        )
    }

    /// Aggregate function. State lives in the closures.
    pub fn aggregate<S, SR, F, FR>(step: S, finish: F) -> Self
    where
        S: FnMut(&[Value]) -> Result<SR> + Send + 'static,
        SR: Into<ExtendedValue>,
        F: FnMut() -> Result<FR> + Send + 'static,
        FR: Into<ExtendedValue>,
    {
        Self::from_callables(
            FunctionKind::Aggregate,
            Callables {
                step: Some(boxed(step)),
                finish: Some(boxed_finisher(finish)),
                ..Callables::default()
            },
        )
    }

    /// Aggregate window function.
    pub fn window<S, SR, V, VR, I, IR, F, FR>(step: S, value: V, inverse: I, finish: F) -> Self
    where
        S: FnMut(&[Value]) -> Result<SR> + Send + 'static,
        SR: Into<ExtendedValue>,
        V: FnMut() -> Result<VR> + Send + 'static,
        VR: Into<ExtendedValue>,
        I: FnMut(&[Value]) -> Result<IR> + Send + 'static,
        IR: Into<ExtendedValue>,
        F: FnMut() -> Result<FR> + Send + 'static,
        FR: Into<ExtendedValue>,
    {
        Self::from_callables(
            FunctionKind::Window,
            Callables {
                step: Some(boxed(step)),
                value: Some(boxed_finisher(value)),
                inverse: Some(boxed(inverse)),
                finish: Some(boxed_finisher(finish)),
                ..Callables::default()
            },
        )
    }

    /// Starts a builder for callable sets assembled at runtime.
    pub fn builder() -> FunctionBuilder {
        FunctionBuilder::default()
    }

    fn from_callables(kind: FunctionKind, callables: Callables) -> Self {
        Self {
            kind,
            n_arg: -1,
            deterministic: false,
            callables,
        }
    }

    /// Fixes the argument count; -1 (the default) accepts any.
    pub fn n_arg(mut self, n_arg: i32) -> Self {
        self.n_arg = n_arg;
        self
    }

    /// Marks the function as returning the same result for the same input.
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Shape of the function.
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub(crate) fn arity(&self) -> i32 {
        self.n_arg
    }

    pub(crate) fn flags(&self) -> i32 {
        if self.deterministic {
            func_flags::UTF8 | func_flags::DETERMINISTIC
        } else {
            func_flags::UTF8
        }
    }

    pub(crate) fn into_entry(self, name: &str) -> FunctionEntry {
        FunctionEntry {
            name: name.to_owned(),
            callables: self.callables,
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("kind", &self.kind)
            .field("n_arg", &self.n_arg)
            .field("deterministic", &self.deterministic)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Function`] from individually supplied callables.
///
/// `build` accepts exactly the sets: `func`; `step` + `finish`;
/// `step` + `value` + `inverse` + `finish`.
#[derive(Default)]
pub struct FunctionBuilder {
    callables: Callables,
    n_arg: Option<i32>,
    deterministic: bool,
}

impl FunctionBuilder {
    /// Scalar entry point.
    pub fn func<F, R>(mut self, func: F) -> Self
    where
        F: FnMut(&[Value]) -> Result<R> + Send + 'static,
        R: Into<ExtendedValue>,
    {
        self.callables.func = Some(boxed(func));
        self
    }

    /// Per-row aggregate entry point.
    pub fn step<F, R>(mut self, step: F) -> Self
    where
        F: FnMut(&[Value]) -> Result<R> + Send + 'static,
        R: Into<ExtendedValue>,
    {
        self.callables.step = Some(boxed(step));
        self
    }

    /// Current window value.
    pub fn value<F, R>(mut self, value: F) -> Self
    where
        F: FnMut() -> Result<R> + Send + 'static,
        R: Into<ExtendedValue>,
    {
        self.callables.value = Some(boxed_finisher(value));
        self
    }

    /// Removes a row from the window.
    pub fn inverse<F, R>(mut self, inverse: F) -> Self
    where
        F: FnMut(&[Value]) -> Result<R> + Send + 'static,
        R: Into<ExtendedValue>,
    {
        self.callables.inverse = Some(boxed(inverse));
        self
    }

    /// Final aggregate value.
    pub fn finish<F, R>(mut self, finish: F) -> Self
    where
        F: FnMut() -> Result<R> + Send + 'static,
        R: Into<ExtendedValue>,
    {
        self.callables.finish = Some(boxed_finisher(finish));
        self
    }

    /// See [`Function::n_arg`].
    pub fn n_arg(mut self, n_arg: i32) -> Self {
        self.n_arg = Some(n_arg);
        self
    }

    /// See [`Function::deterministic`].
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Validates the callable set.
    pub fn build(self) -> Result<Function> {
        let c = &self.callables;
        let kind = match (
            c.func.is_some(),
            c.step.is_some(),
            c.value.is_some(),
            c.inverse.is_some(),
            c.finish.is_some(),
        ) {
            (true, false, false, false, false) => FunctionKind::Scalar,
            (false, true, false, false, true) => FunctionKind::Aggregate,
            (false, true, true, true, true) => FunctionKind::Window,
            _ => {
                return Err(Error::misuse(
                    "function needs func, step+finish, or step+value+inverse+finish",
                ))
            }
        };
        Ok(Function::from_callables(kind, self.callables)
            .n_arg(self.n_arg.unwrap_or(-1))
            .deterministic(self.deterministic))
    }
}

/// A registered function as stored in the host's function table.
pub struct FunctionEntry {
    name: String,
    callables: Callables,
}

impl FunctionEntry {
    /// SQL name the function was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the callable behind `which`.
    ///
    /// The outer `Result` is a protocol failure (the engine invoked a
    /// callback this function never supplied); the inner one is the
    /// callable's own outcome.
    pub(crate) fn call(
        &mut self,
        which: Invocation,
        args: &[Value],
    ) -> Result<Result<ExtendedValue>> {
        let c = &mut self.callables;
        let outcome = match which {
            Invocation::Func => c.func.as_mut().map(|f| f(args)),
            Invocation::Step => c.step.as_mut().map(|f| f(args)),
            Invocation::Inverse => c.inverse.as_mut().map(|f| f(args)),
            Invocation::Value => c.value.as_mut().map(|f| f()),
            Invocation::Final => c.finish.as_mut().map(|f| f()),
        };
        outcome.ok_or_else(|| {
            Error::abi(format!("function {} has no {which:?} callback", self.name))
        })
    }
}
