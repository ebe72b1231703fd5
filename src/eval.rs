//! Tree-walking evaluator
//!
//! Executes a parsed expression against an environment of bound inputs and
//! produces a new value tree. Evaluation is eager and strictly
//! left-to-right; `&&`, `||`, `??` and conditionals short-circuit. The
//! first error aborts evaluation and propagates out unchanged.

use crate::ast::{ArrayItem, BinaryOp, Callee, Expr, ObjectItem, Pattern, UnaryOp};
use crate::env::Env;
use crate::error::{EngineError, EngineResult, Position};
use crate::stdlib::{self, FnCtx};
use crate::udm::{LambdaValue, Udm, UdmKind, UdmObject};
use indexmap::IndexMap;

/// Evaluator limits
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Maximum evaluation recursion depth
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self { max_depth: 1024 }
    }
}

/// The expression evaluator
pub struct Evaluator {
    config: EvalConfig,
    depth: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Creates an evaluator with default limits
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    /// Creates an evaluator with custom limits
    pub fn with_config(config: EvalConfig) -> Self {
        Self { config, depth: 0 }
    }

    /// Evaluates an expression in the given environment
    pub fn evaluate(&mut self, expr: &Expr, env: &Env) -> EngineResult<Udm> {
        self.depth += 1;
        let result = if self.depth > self.config.max_depth {
            Err(EngineError::RecursionLimit {
                limit: self.config.max_depth,
            })
        } else {
            self.eval_inner(expr, env)
        };
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env) -> EngineResult<Udm> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::InputRef { name, position } => env
                .lookup(&format!("${}", name))
                .cloned()
                .ok_or_else(|| EngineError::UndefinedVariable {
                    name: format!("${}", name),
                    position: *position,
                }),
            Expr::Identifier { name, position } => {
                env.lookup(name)
                    .cloned()
                    .ok_or_else(|| EngineError::UndefinedVariable {
                        name: name.clone(),
                        position: *position,
                    })
            }
            Expr::Property {
                target,
                key,
                position,
            } => {
                let value = self.evaluate(target, env)?;
                property_access(&value, key, *position)
            }
            Expr::Attribute {
                target,
                name,
                position,
            } => {
                let value = self.evaluate(target, env)?;
                value
                    .attribute(name)
                    .cloned()
                    .ok_or_else(|| EngineError::AttributeNotFound {
                        name: name.clone(),
                        position: *position,
                    })
            }
            Expr::Index {
                target,
                index,
                position,
            } => {
                let value = self.evaluate(target, env)?;
                let index = self.evaluate(index, env)?;
                index_access(&value, &index, *position)
            }
            Expr::MetadataAccess { target } => {
                let value = self.evaluate(target, env)?;
                Ok(metadata_object(&value))
            }
            Expr::SafeNav { target, key } => {
                let value = match self.evaluate(target, env) {
                    Ok(v) => v,
                    Err(e) if e.is_absent_condition() => return Ok(Udm::null()),
                    Err(e) => return Err(e),
                };
                if value.is_null() {
                    return Ok(Udm::null());
                }
                match property_access(&value, key, target.position()) {
                    Ok(v) => Ok(v),
                    Err(e) if e.is_absent_condition() => Ok(Udm::null()),
                    Err(e) => Err(e),
                }
            }
            Expr::ArrayLit(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Item(expr) => out.push(self.evaluate(expr, env)?),
                        ArrayItem::Spread(expr, position) => {
                            let value = self.evaluate(expr, env)?;
                            match value.kind {
                                UdmKind::Array(items) => out.extend(items),
                                _ => {
                                    return Err(EngineError::type_error(
                                        format!(
                                            "spread in an array literal requires an array, got {}",
                                            value.type_name()
                                        ),
                                        *position,
                                    ));
                                }
                            }
                        }
                    }
                }
                Ok(Udm::array(out))
            }
            Expr::ObjectLit(items) => {
                let mut scope = env.clone();
                let mut map: UdmObject = IndexMap::new();
                for item in items {
                    match item {
                        ObjectItem::Let { name, value } => {
                            let value = self.evaluate(value, &scope)?;
                            scope = scope.bind(name.clone(), value);
                        }
                        ObjectItem::Field { key, value } => {
                            let value = self.evaluate(value, &scope)?;
                            // last value wins, first position is retained
                            map.insert(key.clone(), value);
                        }
                        ObjectItem::Spread(expr, position) => {
                            let value = self.evaluate(expr, &scope)?;
                            // spreading a parsed document drops its root
                            // wrapper and merges the root's children
                            let value = unwrap_document(value);
                            match value.kind {
                                UdmKind::Object(entries) => {
                                    for (key, value) in entries {
                                        map.insert(key, value);
                                    }
                                }
                                _ => {
                                    return Err(EngineError::type_error(
                                        format!(
                                            "spread in an object literal requires an object, got {}",
                                            value.type_name()
                                        ),
                                        *position,
                                    ));
                                }
                            }
                        }
                    }
                }
                Ok(Udm::object(map))
            }
            Expr::Unary {
                op,
                operand,
                position,
            } => {
                let value = self.evaluate(operand, env)?;
                unary_op(*op, &value, *position)
            }
            Expr::Binary {
                op,
                left,
                right,
                position,
            } => self.eval_binary(*op, left, right, env, *position),
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.evaluate(condition, env)?;
                if cond.is_truthy() {
                    self.evaluate(then_branch, env)
                } else {
                    self.evaluate(else_branch, env)
                }
            }
            Expr::Match {
                subject,
                arms,
                position,
            } => {
                let subject = self.evaluate(subject, env)?;
                for arm in arms {
                    let (matched, arm_env) = match &arm.pattern {
                        Pattern::Literal(lit) => (subject == *lit, env.clone()),
                        Pattern::Wildcard => (true, env.clone()),
                        Pattern::Binding(name) => {
                            (true, env.bind(name.clone(), subject.clone()))
                        }
                    };
                    if !matched {
                        continue;
                    }
                    if let Some(guard) = &arm.guard {
                        if !self.evaluate(guard, &arm_env)?.is_truthy() {
                            continue;
                        }
                    }
                    return self.evaluate(&arm.body, &arm_env);
                }
                Err(EngineError::MatchExhaustiveness {
                    position: *position,
                })
            }
            Expr::Let { name, value, body } => {
                let value = self.evaluate(value, env)?;
                let env = env.bind(name.clone(), value);
                self.evaluate(body, &env)
            }
            Expr::Lambda { params, body } => Ok(Udm::lambda(LambdaValue {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            })),
            Expr::Call {
                callee,
                args,
                position,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, env)?);
                }
                self.eval_call(callee, values, env, *position)
            }
            Expr::Pipe {
                left,
                right,
                position,
            } => {
                let piped = self.evaluate(left, env)?;
                match right.as_ref() {
                    // `a |> f(b)` is exactly `f(a, b)`
                    Expr::Call {
                        callee,
                        args,
                        position,
                    } => {
                        let mut values = Vec::with_capacity(args.len() + 1);
                        values.push(piped);
                        for arg in args {
                            values.push(self.evaluate(arg, env)?);
                        }
                        self.eval_call(callee, values, env, *position)
                    }
                    // `a |> f` passes a single argument
                    Expr::Identifier { name, position } => {
                        self.eval_call(&Callee::Named(name.clone()), vec![piped], env, *position)
                    }
                    Expr::Lambda { .. } => {
                        let lambda = self.evaluate(right, env)?;
                        match &lambda.kind {
                            UdmKind::Lambda(l) => {
                                let l = l.clone();
                                self.apply(&l, vec![piped])
                            }
                            _ => unreachable!("lambda expression evaluates to a lambda"),
                        }
                    }
                    _ => Err(EngineError::type_error(
                        "right-hand side of '|>' must be a call or function",
                        *position,
                    )),
                }
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Env,
        position: Position,
    ) -> EngineResult<Udm> {
        match op {
            BinaryOp::And => {
                let l = self.evaluate(left, env)?;
                if !l.is_truthy() {
                    return Ok(Udm::bool(false));
                }
                let r = self.evaluate(right, env)?;
                Ok(Udm::bool(r.is_truthy()))
            }
            BinaryOp::Or => {
                let l = self.evaluate(left, env)?;
                if l.is_truthy() {
                    return Ok(Udm::bool(true));
                }
                let r = self.evaluate(right, env)?;
                Ok(Udm::bool(r.is_truthy()))
            }
            BinaryOp::Coalesce => {
                // the right operand is evaluated only when the left is null
                // or represents the absent condition
                match self.evaluate(left, env) {
                    Ok(v) if v.is_null() => self.evaluate(right, env),
                    Ok(v) => Ok(v),
                    Err(e) if e.is_absent_condition() => self.evaluate(right, env),
                    Err(e) => Err(e),
                }
            }
            _ => {
                let l = self.evaluate(left, env)?;
                let r = self.evaluate(right, env)?;
                binary_op(op, &l, &r, position)
            }
        }
    }

    fn eval_call(
        &mut self,
        callee: &Callee,
        args: Vec<Udm>,
        env: &Env,
        position: Position,
    ) -> EngineResult<Udm> {
        match callee {
            Callee::Named(name) => {
                if let Some(bound) = env.lookup(name) {
                    match &bound.kind {
                        UdmKind::Lambda(lambda) => {
                            let lambda = lambda.clone();
                            return self.apply(&lambda, args);
                        }
                        _ => {
                            return Err(EngineError::type_error(
                                format!("'{}' is not a function", name),
                                position,
                            ));
                        }
                    }
                }
                match stdlib::lookup(name) {
                    Some(def) => {
                        def.check_arity(args.len())?;
                        log::trace!("stdlib call: {}", name);
                        (def.run)(self, args)
                    }
                    None => Err(EngineError::UndefinedVariable {
                        name: name.clone(),
                        position,
                    }),
                }
            }
            Callee::Expr(expr) => {
                let value = self.evaluate(expr, env)?;
                match &value.kind {
                    UdmKind::Lambda(lambda) => {
                        let lambda = lambda.clone();
                        self.apply(&lambda, args)
                    }
                    _ => Err(EngineError::type_error(
                        format!("cannot call a {}", value.type_name()),
                        position,
                    )),
                }
            }
        }
    }
}

impl FnCtx for Evaluator {
    /// Applies a lambda value: new frame, positional binding, arity checked
    fn apply(&mut self, lambda: &LambdaValue, args: Vec<Udm>) -> EngineResult<Udm> {
        if lambda.params.len() != args.len() {
            return Err(EngineError::Arity {
                callee: "lambda".to_string(),
                expected: format!("{} argument(s)", lambda.params.len()),
                got: args.len(),
            });
        }
        let mut vars = std::collections::HashMap::with_capacity(args.len());
        for (param, arg) in lambda.params.iter().zip(args) {
            vars.insert(param.clone(), arg);
        }
        let call_env = lambda.env.push_frame(vars);
        self.evaluate(&lambda.body, &call_env)
    }
}

/// For document wrappers (single-root parsed XML), returns the root
/// element's content so its children can merge; otherwise returns the
/// value unchanged. A scalar-content root has no children to merge.
fn unwrap_document(value: Udm) -> Udm {
    if !value.metadata().document {
        return value;
    }
    match value.kind {
        UdmKind::Object(mut map) if map.len() == 1 => {
            let (_, root) = map.swap_remove_index(0).expect("single-entry map");
            if root.as_object().is_some() {
                root
            } else {
                Udm::empty_object()
            }
        }
        kind => kind.into(),
    }
}

/// `v.k` access: object key lookup, or XPath-style auto-descent over arrays
pub(crate) fn property_access(value: &Udm, key: &str, position: Position) -> EngineResult<Udm> {
    match &value.kind {
        UdmKind::Object(map) => map.get(key).cloned().ok_or_else(|| {
            EngineError::PropertyNotFound {
                key: key.to_string(),
                position,
            }
        }),
        UdmKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(property_access(item, key, position)?);
            }
            Ok(Udm::array(out))
        }
        _ => Err(EngineError::PropertyNotFound {
            key: key.to_string(),
            position,
        }),
    }
}

fn index_access(value: &Udm, index: &Udm, position: Position) -> EngineResult<Udm> {
    match (&value.kind, &index.kind) {
        (UdmKind::Array(items), UdmKind::Int(i)) => {
            if *i < 0 || *i as usize >= items.len() {
                return Err(EngineError::IndexOutOfBounds {
                    index: *i,
                    length: items.len(),
                    position,
                });
            }
            Ok(items[*i as usize].clone())
        }
        // string indexing doubles as property access, useful for keys that
        // are not valid identifiers (namespaced XML names, spaces)
        (UdmKind::Object(_), UdmKind::Str(key)) => property_access(value, key, position),
        (UdmKind::Array(_), other) => Err(EngineError::type_error(
            format!("array index must be an integer, got {}", other_name(other)),
            position,
        )),
        _ => Err(EngineError::type_error(
            format!("cannot index a {}", value.type_name()),
            position,
        )),
    }
}

fn other_name(kind: &UdmKind) -> &'static str {
    match kind {
        UdmKind::Null => "null",
        UdmKind::Bool(_) => "boolean",
        UdmKind::Int(_) | UdmKind::Float(_) => "number",
        UdmKind::Str(_) => "string",
        _ => "value",
    }
}

/// Builds the object returned by the `__metadata` accessor
fn metadata_object(value: &Udm) -> Udm {
    let meta = value.metadata();
    let mut map: UdmObject = IndexMap::new();
    if let Some(schema_type) = &meta.schema_type {
        map.insert("__schemaType".to_string(), Udm::string(schema_type.clone()));
    }
    if let Some(encoding) = &meta.encoding {
        map.insert("__encoding".to_string(), Udm::string(encoding.clone()));
    }
    if !meta.namespaces.is_empty() {
        let namespaces: UdmObject = meta
            .namespaces
            .iter()
            .map(|(prefix, uri)| (prefix.clone(), Udm::string(uri.clone())))
            .collect();
        map.insert("__namespaces".to_string(), Udm::object(namespaces));
    }
    Udm::object(map)
}

fn unary_op(op: UnaryOp, value: &Udm, position: Position) -> EngineResult<Udm> {
    match op {
        UnaryOp::Neg => match value.kind {
            UdmKind::Int(i) => Ok(Udm::int(-i)),
            UdmKind::Float(f) => Ok(Udm::float(-f)),
            _ => Err(EngineError::type_error(
                format!("unary '-' requires a number, got {}", value.type_name()),
                position,
            )),
        },
        UnaryOp::Not => match value.kind {
            UdmKind::Bool(b) => Ok(Udm::bool(!b)),
            _ => Err(EngineError::type_error(
                format!("'!' requires a boolean, got {}", value.type_name()),
                position,
            )),
        },
    }
}

fn binary_op(op: BinaryOp, l: &Udm, r: &Udm, position: Position) -> EngineResult<Udm> {
    match op {
        BinaryOp::Add => add(l, r, position),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow => {
            arithmetic(op, l, r, position)
        }
        BinaryOp::Eq => Ok(Udm::bool(l == r)),
        BinaryOp::Ne => Ok(Udm::bool(l != r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, l, r, position),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => {
            unreachable!("short-circuit operators are handled by the evaluator")
        }
    }
}

/// `+` adds numbers; when either operand is a string it concatenates,
/// coercing the other operand to its canonical string form
fn add(l: &Udm, r: &Udm, position: Position) -> EngineResult<Udm> {
    match (&l.kind, &r.kind) {
        (UdmKind::Str(a), _) => Ok(Udm::string(format!("{}{}", a, r.to_display_string()))),
        (_, UdmKind::Str(b)) => Ok(Udm::string(format!("{}{}", l.to_display_string(), b))),
        (UdmKind::Int(a), UdmKind::Int(b)) => match a.checked_add(*b) {
            Some(sum) => Ok(Udm::int(sum)),
            None => Ok(Udm::float(*a as f64 + *b as f64)),
        },
        _ => {
            let (a, b) = numeric_pair(l, r, "+", position)?;
            Ok(Udm::float(a + b))
        }
    }
}

fn arithmetic(op: BinaryOp, l: &Udm, r: &Udm, position: Position) -> EngineResult<Udm> {
    if let (UdmKind::Int(a), UdmKind::Int(b)) = (&l.kind, &r.kind) {
        let (a, b) = (*a, *b);
        match op {
            BinaryOp::Sub => {
                if let Some(v) = a.checked_sub(b) {
                    return Ok(Udm::int(v));
                }
            }
            BinaryOp::Mul => {
                if let Some(v) = a.checked_mul(b) {
                    return Ok(Udm::int(v));
                }
            }
            BinaryOp::Div => {
                if b == 0 {
                    return Err(EngineError::type_error("division by zero", position));
                }
                if a % b == 0 {
                    return Ok(Udm::int(a / b));
                }
                return Ok(Udm::float(a as f64 / b as f64));
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(EngineError::type_error("modulo by zero", position));
                }
                return Ok(Udm::int(a % b));
            }
            BinaryOp::Pow => {
                if (0..=u32::MAX as i64).contains(&b) {
                    if let Some(v) = a.checked_pow(b as u32) {
                        return Ok(Udm::int(v));
                    }
                }
                return Ok(Udm::float((a as f64).powf(b as f64)));
            }
            _ => unreachable!(),
        }
        // integer overflow widens to float
        let (a, b) = (a as f64, b as f64);
        return Ok(Udm::float(match op {
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            _ => unreachable!(),
        }));
    }

    let (a, b) = numeric_pair(l, r, op.symbol(), position)?;
    Ok(Udm::float(match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Pow => a.powf(b),
        _ => unreachable!(),
    }))
}

fn compare(op: BinaryOp, l: &Udm, r: &Udm, position: Position) -> EngineResult<Udm> {
    use std::cmp::Ordering;
    let ordering: Option<Ordering> = match (&l.kind, &r.kind) {
        (UdmKind::Str(a), UdmKind::Str(b)) => Some(a.as_str().cmp(b.as_str())),
        (UdmKind::Date(a), UdmKind::Date(b)) => Some(a.cmp(b)),
        (UdmKind::Time(a), UdmKind::Time(b)) => Some(a.cmp(b)),
        (UdmKind::LocalDateTime(a), UdmKind::LocalDateTime(b)) => Some(a.cmp(b)),
        (UdmKind::DateTime(a), UdmKind::DateTime(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = numeric_pair(l, r, op.symbol(), position)?;
            // IEEE-754: comparisons with NaN are false
            a.partial_cmp(&b)
        }
    };
    let result = match ordering {
        None => false,
        Some(ord) => match op {
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::Ge => ord != Ordering::Less,
            _ => unreachable!(),
        },
    };
    Ok(Udm::bool(result))
}

fn numeric_pair(l: &Udm, r: &Udm, op: &str, position: Position) -> EngineResult<(f64, f64)> {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EngineError::type_error(
            format!(
                "'{}' requires numeric operands, got {} and {}",
                op,
                l.type_name(),
                r.type_name()
            ),
            position,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn eval_source(body: &str, input: Udm) -> EngineResult<Udm> {
        let source = format!("%utlx 1.0\ninput json\noutput json\n---\n{}", body);
        let program = parse_program(&source)?;
        let env = Env::new().bind("$input", input);
        Evaluator::new().evaluate(&program.body, &env)
    }

    fn obj(pairs: &[(&str, Udm)]) -> Udm {
        Udm::object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn identity_transform_returns_input() {
        let input = obj(&[("a", Udm::int(1))]);
        assert_eq!(eval_source("$input", input.clone()).unwrap(), input);
    }

    #[test]
    fn string_concatenation_coerces() {
        assert_eq!(
            eval_source("\"n=\" + 2", Udm::null()).unwrap(),
            Udm::string("n=2")
        );
        assert_eq!(
            eval_source("1 + \"x\"", Udm::null()).unwrap(),
            Udm::string("1x")
        );
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval_source("2 + 3 * 4", Udm::null()).unwrap(), Udm::int(14));
        assert_eq!(eval_source("10 / 2", Udm::null()).unwrap(), Udm::int(5));
        assert_eq!(eval_source("5 / 2", Udm::null()).unwrap(), Udm::float(2.5));
        assert_eq!(eval_source("2 ** 10", Udm::null()).unwrap(), Udm::int(1024));
    }

    #[test]
    fn division_by_zero_errors() {
        assert!(matches!(
            eval_source("1 / 0", Udm::null()),
            Err(EngineError::Type { .. })
        ));
    }

    #[test]
    fn truthiness_drives_logic_operators() {
        assert_eq!(
            eval_source("[] || \"x\"", Udm::null()).unwrap(),
            Udm::bool(true)
        );
        assert_eq!(
            eval_source("1 && 0", Udm::null()).unwrap(),
            Udm::bool(false)
        );
    }

    #[test]
    fn null_propagation_laws() {
        assert_eq!(
            eval_source("null ?? \"fallback\"", Udm::null()).unwrap(),
            Udm::string("fallback")
        );
        assert_eq!(
            eval_source("\"kept\" ?? \"fallback\"", Udm::null()).unwrap(),
            Udm::string("kept")
        );
        assert_eq!(eval_source("null?.k", Udm::null()).unwrap(), Udm::null());
    }

    #[test]
    fn coalesce_absorbs_missing_keys() {
        let input = obj(&[("present", Udm::int(1))]);
        assert_eq!(
            eval_source("$input.missing ?? 9", input.clone()).unwrap(),
            Udm::int(9)
        );
        assert_eq!(
            eval_source("$input.present ?? 9", input).unwrap(),
            Udm::int(1)
        );
    }

    #[test]
    fn property_auto_descends_arrays() {
        let input = obj(&[(
            "items",
            Udm::array(vec![obj(&[("p", Udm::int(1))]), obj(&[("p", Udm::int(2))])]),
        )]);
        assert_eq!(
            eval_source("$input.items.p", input).unwrap(),
            Udm::array(vec![Udm::int(1), Udm::int(2)])
        );
    }

    #[test]
    fn missing_property_errors() {
        let input = obj(&[("a", Udm::int(1))]);
        assert!(matches!(
            eval_source("$input.b", input),
            Err(EngineError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn index_out_of_bounds() {
        let input = obj(&[("xs", Udm::array(vec![Udm::int(1)]))]);
        assert!(matches!(
            eval_source("$input.xs[3]", input),
            Err(EngineError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn spread_laws() {
        assert_eq!(
            eval_source("{ ...{}, k: 1 }", Udm::null()).unwrap(),
            obj(&[("k", Udm::int(1))])
        );
        assert_eq!(
            eval_source("[ ...[], 5 ]", Udm::null()).unwrap(),
            Udm::array(vec![Udm::int(5)])
        );
        let a = obj(&[("x", Udm::int(1))]);
        assert_eq!(
            eval_source("{ ...$input, ...$input }", a.clone()).unwrap(),
            a
        );
    }

    #[test]
    fn spread_kind_mismatch_errors() {
        assert!(matches!(
            eval_source("[ ...{} ]", Udm::null()),
            Err(EngineError::Type { .. })
        ));
        assert!(matches!(
            eval_source("{ ...[] }", Udm::null()),
            Err(EngineError::Type { .. })
        ));
    }

    #[test]
    fn spread_tiebreak_keeps_first_position_last_value() {
        let result = eval_source("{ a: 1, b: 2, a: 3 }", Udm::null()).unwrap();
        let map = result.as_object().unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map["a"], Udm::int(3));
    }

    #[test]
    fn lambda_application_and_closures() {
        assert_eq!(
            eval_source("((x, y) => x + y)(2, 3)", Udm::null()).unwrap(),
            Udm::int(5)
        );
        // closure captures the object-literal let binding
        assert_eq!(
            eval_source("{ let n = 10; f: (x => x + n)(1) }", Udm::null()).unwrap(),
            obj(&[("f", Udm::int(11))])
        );
    }

    #[test]
    fn lambda_arity_mismatch() {
        assert!(matches!(
            eval_source("((x, y) => x)(1)", Udm::null()),
            Err(EngineError::Arity { .. })
        ));
    }

    #[test]
    fn pipe_is_call_rewriting() {
        let input = obj(&[("xs", Udm::array(vec![Udm::int(1), Udm::int(2)]))]);
        assert_eq!(
            eval_source("$input.xs |> sum()", input.clone()).unwrap(),
            Udm::int(3)
        );
        assert_eq!(
            eval_source("sum($input.xs)", input).unwrap(),
            Udm::int(3)
        );
    }

    #[test]
    fn match_arms_and_exhaustiveness() {
        assert_eq!(
            eval_source("match 2 { 1 => \"a\", n if n > 1 => \"b\", _ => \"c\" }", Udm::null())
                .unwrap(),
            Udm::string("b")
        );
        assert!(matches!(
            eval_source("match 5 { 1 => \"a\" }", Udm::null()),
            Err(EngineError::MatchExhaustiveness { .. })
        ));
    }

    #[test]
    fn sequential_lets_in_object_literal() {
        assert_eq!(
            eval_source("{ let a = 1; let b = a + 1; v: b }", Udm::null()).unwrap(),
            obj(&[("v", Udm::int(2))])
        );
    }

    #[test]
    fn recursion_limit_is_enforced() {
        // deeply right-nested additions evaluated recursively
        let mut body = String::new();
        for _ in 0..3000 {
            body.push_str("(1 + ");
        }
        body.push('1');
        for _ in 0..3000 {
            body.push(')');
        }
        let source = format!("%utlx 1.0\ninput json\noutput json\n---\n{}", body);
        match parse_program(&source) {
            // parser depth limit may fire first depending on configuration
            Err(_) => {}
            Ok(program) => {
                let env = Env::new().bind("$input", Udm::null());
                let result = Evaluator::new().evaluate(&program.body, &env);
                assert!(matches!(result, Err(EngineError::RecursionLimit { .. })));
            }
        }
    }

    #[test]
    fn comparison_is_ieee_and_codepoint() {
        assert_eq!(eval_source("1 < 1.5", Udm::null()).unwrap(), Udm::bool(true));
        assert_eq!(
            eval_source("\"a\" < \"b\"", Udm::null()).unwrap(),
            Udm::bool(true)
        );
        assert_eq!(
            eval_source("(0.0 / 0.0) == (0.0 / 0.0)", Udm::null()).unwrap(),
            Udm::bool(false)
        );
    }

    #[test]
    fn cross_variant_numeric_equality() {
        assert_eq!(eval_source("1 == 1.0", Udm::null()).unwrap(), Udm::bool(true));
    }
}
