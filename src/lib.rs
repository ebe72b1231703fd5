//! # UTL-X
//!
//! A format-agnostic data transformation language and engine. A script
//! declares one or more named typed inputs, an output format, and a single
//! expression; the engine parses the input documents into a unified data
//! model (UDM), evaluates the expression, and serialises the result in the
//! declared output format.
//!
//! ## Overview
//!
//! The pipeline is a strict left-to-right flow:
//!
//! ```text
//! bytes ──adapter.parse──▶ UDM ──evaluate(AST)──▶ UDM ──adapter.serialise──▶ bytes
//! ```
//!
//! - **UDM** ([`Udm`]) — the single in-memory representation every format
//!   round-trips through: scalars, binaries, four disjoint temporal
//!   variants, ordered arrays and objects, first-class lambdas, plus an
//!   attribute side-channel (`.@name`) and format metadata.
//! - **Front-end** ([`Lexer`], [`Parser`]) — script source to AST.
//! - **Evaluator** ([`Evaluator`]) — a tree-walking interpreter with
//!   short-circuit operators, spread, pattern matching and closures.
//! - **Adapters** ([`format`]) — JSON, XML, CSV and YAML in and out, plus
//!   XSD/JSON-Schema read as data.
//! - **Stdlib** ([`stdlib`]) — the builtin function table dispatched by
//!   name at evaluation time.
//!
//! ## Quick start
//!
//! ```rust
//! let script = r#"%utlx 1.0
//! input json
//! output json
//! ---
//! { total: $input.items |> map(i => i.price * i.qty) |> sum() }
//! "#;
//!
//! let input = br#"{"items":[{"price":10,"qty":2},{"price":5,"qty":3}]}"#;
//! let output = utlx::transform(script, &[("input", input)])?;
//! assert_eq!(output, br#"{"total":35}"#.to_vec());
//! # Ok::<(), utlx::EngineError>(())
//! ```
//!
//! ## Scripts
//!
//! A script is a header and a body expression separated by a `---` line:
//!
//! ```text
//! %utlx 1.0
//! input: customers xml, orders csv { headers: true }
//! output json { pretty: true }
//! ---
//! $customers.Customers.Customer |> map(c => {
//!   id: c.@id,
//!   orders: $orders |> filter(o => o.CustomerID == c.@id)
//! })
//! ```
//!
//! ## Error handling
//!
//! Every failure across the pipeline is an [`EngineError`]; the first error
//! aborts the transformation. Name-lookup failures are enriched with
//! suggestions drawn from the fields of the bound inputs (typo detection,
//! missing-lambda-parameter detection) before they reach the caller.
//!
//! The engine reads no environment variables, opens no files or sockets,
//! and is single-threaded; transformations are deterministic apart from
//! the `now()` builtin.

pub mod ast;
pub mod env;
pub mod enhance;
pub mod error;
pub mod eval;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod stdlib;
pub mod udm;

use indexmap::IndexMap;

// Re-export the main types and functions
pub use ast::{Expr, Header, InputDecl, OutputDecl, Program};
pub use enhance::FieldIndex;
pub use error::{EngineError, EngineResult, Position, Span};
pub use eval::{EvalConfig, Evaluator};
pub use format::{parse_format, serialise_format, Format, FormatOptions};
pub use lexer::{Lexer, Token};
pub use parser::{Parser, ParserConfig};
pub use udm::{Metadata, Udm, UdmKind, UdmObject};

/// Parses script source into a program AST
///
/// Side-effect free; imposes no IO.
pub fn parse(source: &str) -> EngineResult<Program> {
    parser::parse_program(source)
}

/// Executes a parsed program against pre-parsed inputs
///
/// The caller is responsible for having parsed each input with the adapter
/// matching the declared header (or via [`transform`], which does both).
/// Every declared input must be present in `inputs`.
pub fn execute(program: &Program, inputs: IndexMap<String, Udm>) -> EngineResult<Udm> {
    for decl in &program.header.inputs {
        if !inputs.contains_key(&decl.name) {
            return Err(EngineError::UndefinedVariable {
                name: format!("${}", decl.name),
                position: decl.position,
            });
        }
    }
    let field_index = FieldIndex::from_inputs(inputs.iter());

    let mut env = env::Env::new();
    for (name, value) in inputs {
        env = env.bind(format!("${}", name), value);
    }

    log::debug!("evaluating program with {} input(s)", program.header.inputs.len());
    Evaluator::new()
        .evaluate(&program.body, &env)
        .map_err(|error| enhance::enhance(error, &field_index))
}

/// The full pipeline: parse the script, parse each input document with its
/// declared adapter, evaluate, and serialise in the declared output format
pub fn transform(source: &str, inputs: &[(&str, &[u8])]) -> EngineResult<Vec<u8>> {
    let program = parse(source)?;
    let mut bound: IndexMap<String, Udm> = IndexMap::with_capacity(program.header.inputs.len());
    for decl in &program.header.inputs {
        let bytes = inputs
            .iter()
            .find(|(name, _)| *name == decl.name)
            .map(|(_, bytes)| *bytes)
            .ok_or_else(|| EngineError::UndefinedVariable {
                name: format!("${}", decl.name),
                position: decl.position,
            })?;
        let value = format::parse_format(bytes, decl.format, &decl.options)?;
        bound.insert(decl.name.clone(), value);
    }
    let result = execute(&program, bound)?;
    format::serialise_format(&result, program.header.output.format, &program.header.output.options)
}
