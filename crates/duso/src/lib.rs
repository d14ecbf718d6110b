#![doc = include_str!("../../../README.md")]
#![expect(clippy::needless_pass_by_value, reason = "builtin call APIs take argument maps by value")]

mod args;
mod ast;
mod builtins;
pub mod capability;
mod context;
mod datastore;
mod embed;
mod engine;
mod error;
mod eval;
mod http;
mod io;
mod lexer;
mod modules;
mod parse;
mod scope;
mod tasks;
pub mod tracer;
mod value;

pub use crate::{
    args::ArgMap,
    ast::Pos,
    builtins::Builtins,
    context::{CancelToken, DispatchFrame, UnitKind},
    datastore::PersistConfig,
    embed::EmbeddedResources,
    engine::{DatastoreHandle, Engine, EngineBuilder},
    error::{ErrorKind, ErrorValue, RunError, RunResult, ScriptError, StackFrame},
    eval::Evaluator,
    http::{HttpClient, HttpRequest, HttpResponse},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    value::{Value, format_number},
};
