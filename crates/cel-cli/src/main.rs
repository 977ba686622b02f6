//! Command-line driver for the `cel` expression engine.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use tracing::{debug, info, instrument};

use cel::{CheckResult, Environment, Value};

#[derive(ClapParser)]
#[command(name = "cel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate and type-check Common Expression Language expressions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, type-check and evaluate an expression
    Eval {
        /// The expression source text
        expression: String,

        /// JSON file supplying the evaluation context (an object)
        #[arg(long, value_name = "PATH")]
        context: Option<PathBuf>,

        /// Treat variables absent from the context as dyn instead of rejecting them
        #[arg(long)]
        unlisted_variables_as_dyn: bool,
    },

    /// Parse and type-check an expression without evaluating it
    Check {
        /// The expression source text
        expression: String,

        /// Treat variables absent from the context as dyn instead of rejecting them
        #[arg(long)]
        unlisted_variables_as_dyn: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("cel_cli=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Eval {
            expression,
            context,
            unlisted_variables_as_dyn,
        } => run_eval(&expression, context.as_deref(), unlisted_variables_as_dyn),
        Commands::Check {
            expression,
            unlisted_variables_as_dyn,
        } => run_check(&expression, unlisted_variables_as_dyn),
    }
}

fn build_environment(unlisted_variables_as_dyn: bool) -> Environment {
    Environment::standard().with_unlisted_variables_as_dyn(unlisted_variables_as_dyn)
}

fn load_context(path: Option<&std::path::Path>) -> Value {
    match path {
        None => Value::Null,
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading {}: {}", path.display(), e);
                process::exit(2);
            });
            let json: serde_json::Value = serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("Error parsing {} as JSON: {}", path.display(), e);
                process::exit(2);
            });
            json_to_value(&json)
        }
    }
}

/// JSON has no `uint`/`bytes`/timestamp/duration notion, so a context
/// loaded from JSON only ever produces the subset of `Value` that JSON
/// can express (null, bool, int-as-i64, double, string, list, map).
fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(fields) => {
            let mut map = cel::CelMap::new();
            for (k, v) in fields {
                map.insert(cel::MapKey::String(k.as_str().into()), json_to_value(v));
            }
            Value::map(map)
        }
    }
}

#[instrument(skip(expression, context_path))]
fn run_eval(expression: &str, context_path: Option<&std::path::Path>, unlisted_variables_as_dyn: bool) {
    let env = build_environment(unlisted_variables_as_dyn);
    let context = load_context(context_path);
    debug!("evaluating expression against {:?}", context_path);

    match cel::parse(expression) {
        Ok(compiled) => match compiled.evaluate(&env, &context) {
            Ok(value) => println!("{value}"),
            Err(e) => {
                eprintln!("{}", e.format_with_source(expression));
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{}", e.format_with_source(expression));
            process::exit(1);
        }
    }
}

#[instrument(skip(expression))]
fn run_check(expression: &str, unlisted_variables_as_dyn: bool) {
    let env = build_environment(unlisted_variables_as_dyn);

    match cel::parse(expression) {
        Ok(compiled) => match compiled.check(&env) {
            CheckResult::Valid(ty) => {
                info!("type-check succeeded");
                println!("{ty}");
            }
            CheckResult::Invalid(e) => {
                eprintln!("{}", e.format_with_source(expression));
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{}", e.format_with_source(expression));
            process::exit(1);
        }
    }
}
