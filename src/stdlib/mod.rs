//! The standard library: builtin functions dispatched by name
//!
//! A flat namespace of pure functions over values. The registry is built
//! once at first use and is immutable afterwards, so it is safe to read
//! from any number of transformations running on separate threads.
//!
//! Every function declares its name, arity bounds and parameter kind tags;
//! argument count is validated before dispatch and kind mismatches raise
//! `FunctionArgumentError` with the offending value's type in the message.
//! Functions taking lambda arguments (`map`, `filter`, `reduce`, …) call
//! back into the evaluator through the [`FnCtx`] trait.

mod array;
mod compress;
mod crypto;
mod datetime;
mod encoding;
mod jwt;
mod math;
mod object;
mod regional;
mod string;
mod types;
mod xmlfn;

use crate::error::{EngineError, EngineResult};
use crate::udm::{LambdaValue, Udm, UdmKind, UdmObject};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::rc::Rc;

/// Callback surface the evaluator hands to builtin implementations so they
/// can apply lambda arguments
pub trait FnCtx {
    /// Applies a lambda value to the given arguments
    fn apply(&mut self, lambda: &LambdaValue, args: Vec<Udm>) -> EngineResult<Udm>;
}

/// A registered builtin function
pub struct FnDef {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    /// Parameter kind tags used in arity/kind error messages
    pub params: &'static [&'static str],
    pub run: fn(&mut dyn FnCtx, Vec<Udm>) -> EngineResult<Udm>,
}

impl FnDef {
    /// Validates the argument count against the declared bounds
    pub fn check_arity(&self, got: usize) -> EngineResult<()> {
        if got < self.min_args || got > self.max_args {
            let expected = if self.min_args == self.max_args {
                format!("{} argument(s)", self.min_args)
            } else if self.max_args == usize::MAX {
                format!("at least {} argument(s)", self.min_args)
            } else {
                format!("{} to {} arguments", self.min_args, self.max_args)
            };
            return Err(EngineError::Arity {
                callee: self.name.to_string(),
                expected,
                got,
            });
        }
        Ok(())
    }
}

/// The registry map type each category module registers into
pub(crate) type Registry = HashMap<&'static str, FnDef>;

/// Registers one function: name, arity range, parameter tags, implementation
macro_rules! fndef {
    ($reg:expr, $name:literal, $min:literal..=$max:expr, [$($p:literal),*], $f:expr) => {
        $crate::stdlib::define(
            $reg,
            $crate::stdlib::FnDef {
                name: $name,
                min_args: $min,
                max_args: $max,
                params: &[$($p),*],
                run: $f,
            },
        )
    };
}
pub(crate) use fndef;

/// Inserts a definition, panicking on duplicate names at startup
pub(crate) fn define(registry: &mut Registry, def: FnDef) {
    let name = def.name;
    if registry.insert(name, def).is_some() {
        panic!("duplicate stdlib function name: {}", name);
    }
}

/// The process-wide function table, built once and read-only thereafter
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::new();
    array::register(&mut registry);
    string::register(&mut registry);
    object::register(&mut registry);
    math::register(&mut registry);
    datetime::register(&mut registry);
    types::register(&mut registry);
    encoding::register(&mut registry);
    crypto::register(&mut registry);
    compress::register(&mut registry);
    xmlfn::register(&mut registry);
    regional::register(&mut registry);
    jwt::register(&mut registry);
    log::debug!("stdlib registry initialised with {} functions", registry.len());
    registry
});

/// Looks up a builtin by name
pub fn lookup(name: &str) -> Option<&'static FnDef> {
    REGISTRY.get(name)
}

/// Names of all registered builtins (for tooling and tests)
pub fn function_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

// ---- argument helpers ----------------------------------------------------

/// Ordered access to a call's argument list with kind checking
pub(crate) struct Args {
    function: &'static str,
    items: std::vec::IntoIter<Udm>,
    index: usize,
}

impl Args {
    pub fn new(function: &'static str, args: Vec<Udm>) -> Self {
        Self {
            function,
            items: args.into_iter(),
            index: 0,
        }
    }

    fn bad(&self, expected: &str, got: &Udm) -> EngineError {
        EngineError::FunctionArgument {
            function: self.function,
            expected: format!("{} (argument {})", expected, self.index),
            got: got.type_name().to_string(),
            hint: format!("check the value passed to {}()", self.function),
        }
    }

    /// The next argument; arity was validated before dispatch
    pub fn next(&mut self) -> EngineResult<Udm> {
        self.index += 1;
        self.items.next().ok_or(EngineError::FunctionArgument {
            function: self.function,
            expected: "another argument".to_string(),
            got: "nothing".to_string(),
            hint: String::new(),
        })
    }

    /// The next argument, if present (for trailing optionals)
    pub fn opt_next(&mut self) -> Option<Udm> {
        self.index += 1;
        self.items.next()
    }

    pub fn next_array(&mut self) -> EngineResult<Vec<Udm>> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Array(items) => Ok(items),
            _ => Err(self.bad("an array", &value)),
        }
    }

    /// Sequence coercion for the iteration builtins: arrays pass through,
    /// null is empty, any other value is a one-element sequence (repeated
    /// XML elements parse to a plain value when they occur once)
    pub fn next_seq(&mut self) -> EngineResult<Vec<Udm>> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Array(items) => Ok(items),
            UdmKind::Null => Ok(Vec::new()),
            _ => Ok(vec![value]),
        }
    }

    pub fn next_object(&mut self) -> EngineResult<UdmObject> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Object(map) => Ok(map),
            _ => Err(self.bad("an object", &value)),
        }
    }

    pub fn next_str(&mut self) -> EngineResult<String> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Str(s) => Ok(s),
            _ => Err(self.bad("a string", &value)),
        }
    }

    pub fn next_number(&mut self) -> EngineResult<f64> {
        let value = self.next()?;
        value
            .as_number()
            .ok_or_else(|| self.bad("a number", &value))
    }

    pub fn next_int(&mut self) -> EngineResult<i64> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Int(i) => Ok(i),
            UdmKind::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            _ => Err(self.bad("an integer", &value)),
        }
    }

    pub fn next_bool(&mut self) -> EngineResult<bool> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Bool(b) => Ok(b),
            _ => Err(self.bad("a boolean", &value)),
        }
    }

    pub fn next_lambda(&mut self) -> EngineResult<Rc<LambdaValue>> {
        let value = self.next()?;
        match &value.kind {
            UdmKind::Lambda(lambda) => Ok(lambda.clone()),
            _ => Err(self.bad("a function", &value)),
        }
    }

    /// String or binary argument, as raw bytes
    pub fn next_bytes(&mut self) -> EngineResult<Vec<u8>> {
        let value = self.next()?;
        match value.kind {
            UdmKind::Str(s) => Ok(s.into_bytes()),
            UdmKind::Binary(b) => Ok(b),
            _ => Err(self.bad("a string or binary", &value)),
        }
    }
}

/// A function-specific precondition failure
pub(crate) fn fail(
    function: &'static str,
    expected: impl Into<String>,
    got: impl Into<String>,
    hint: impl Into<String>,
) -> EngineError {
    EngineError::FunctionArgument {
        function,
        expected: expected.into(),
        got: got.into(),
        hint: hint.into(),
    }
}

/// Applies a caller-supplied lambda, adapting the argument list to the
/// lambda's declared parameter count (trailing arguments such as the index
/// or the key are optional for the script author)
pub(crate) fn apply_adaptive(
    ctx: &mut dyn FnCtx,
    lambda: &LambdaValue,
    args: Vec<Udm>,
) -> EngineResult<Udm> {
    let wanted = lambda.params.len();
    if wanted < args.len() {
        let args = args.into_iter().take(wanted).collect();
        ctx.apply(lambda, args)
    } else {
        ctx.apply(lambda, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_the_documented_families() {
        for name in [
            "map", "filter", "reduce", "groupBy", "sum", "upper", "split", "keys",
            "fromEntries", "mapEntries", "abs", "percentile", "now", "formatDate",
            "getType", "toNumber", "base64Encode", "sha256", "hmacSha256", "gzip",
            "zipArchive", "localName", "parseRegionalNumber", "decodeJwt",
        ] {
            assert!(lookup(name).is_some(), "missing builtin: {}", name);
        }
    }

    #[test]
    fn arity_bounds_are_enforced() {
        let def = lookup("upper").unwrap();
        assert!(def.check_arity(1).is_ok());
        assert!(matches!(
            def.check_arity(0),
            Err(EngineError::Arity { .. })
        ));
        assert!(def.check_arity(2).is_err());
    }

    #[test]
    fn lookup_is_by_exact_name() {
        assert!(lookup("Map").is_none());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn registry_is_reasonably_large() {
        assert!(function_names().count() >= 150);
    }
}
