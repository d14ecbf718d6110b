use std::{env, process::ExitCode};

use duso::{Engine, ScriptError, Value, tracer::StderrTracer};

const USAGE: &str = "\
usage: duso [options] <script> | -e <code>

options:
  -e <code>        run inline code instead of a script file
  --lib <dir>      prepend a module search path (repeatable)
  --no-files       restrict file capabilities to EMBED/ and STORE/ sources
  --verbose        trace unit and call activity to stderr
  --help           show this help
  --version        show the version
";

struct Options {
    script: Option<String>,
    inline: Option<String>,
    lib_paths: Vec<String>,
    no_files: bool,
    verbose: bool,
}

/// A flag that short-circuits execution with informational output.
enum EarlyExit {
    Info(String),
    Error(String),
}

fn parse_args(args: &[String]) -> Result<Options, EarlyExit> {
    let mut options = Options {
        script: None,
        inline: None,
        lib_paths: Vec::new(),
        no_files: false,
        verbose: false,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Err(EarlyExit::Info(USAGE.to_owned())),
            "--version" => {
                return Err(EarlyExit::Info(format!("duso {}", env!("CARGO_PKG_VERSION"))));
            }
            "--no-files" => options.no_files = true,
            "--verbose" => options.verbose = true,
            "-e" => {
                let code = iter
                    .next()
                    .ok_or_else(|| EarlyExit::Error("-e requires an argument".to_owned()))?;
                options.inline = Some(code.clone());
            }
            "--lib" => {
                let dir = iter
                    .next()
                    .ok_or_else(|| EarlyExit::Error("--lib requires an argument".to_owned()))?;
                options.lib_paths.push(dir.clone());
            }
            other if other.starts_with('-') => {
                return Err(EarlyExit::Error(format!("unknown option '{other}'\n\n{USAGE}")));
            }
            script => {
                if options.script.is_some() {
                    return Err(EarlyExit::Error(format!(
                        "unexpected extra argument '{script}'\n\n{USAGE}"
                    )));
                }
                options.script = Some(script.to_owned());
            }
        }
    }
    if options.script.is_none() && options.inline.is_none() {
        return Err(EarlyExit::Error(USAGE.to_owned()));
    }
    Ok(options)
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(EarlyExit::Info(message)) => {
            println!("{message}");
            return ExitCode::SUCCESS;
        }
        Err(EarlyExit::Error(message)) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let mut builder = Engine::builder().search_paths_from_env();
    for dir in &options.lib_paths {
        builder = builder.search_path(dir);
    }
    if options.no_files {
        builder = builder.no_files();
    }
    if options.verbose {
        builder = builder.tracer(StderrTracer);
    }
    let engine = builder.build();

    let result = match (&options.inline, &options.script) {
        (Some(code), _) => engine.eval(code),
        (None, Some(script)) => engine.run_path(script, None),
        (None, None) => unreachable!("parse_args requires a script or -e"),
    };

    match result {
        Ok(Value::Nil) => ExitCode::SUCCESS,
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &ScriptError) {
    if env::var_os("NO_COLOR").is_some() {
        eprintln!("{err}");
    } else {
        eprintln!("\x1b[31m{err}\x1b[0m");
    }
}
