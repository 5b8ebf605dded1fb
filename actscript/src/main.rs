use std::fs;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use actscript::parser::lexer;
use actscript::runtime::natives::{NativeType, Output, Transcript, standard_library};
use actscript::runtime::{VariableDefinition, VariableTable};
use actscript::{Script, ScriptState};

#[derive(Parser)]
#[command(name = "actscript")]
#[command(about = "Runner for indented action scripts", version)]
struct Cli {
    /// Подробный лог (debug) в stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Показать токены лексера
    Tokens {
        /// Исходник
        input: String,
    },

    /// Распарсить и показать дерево без запуска
    Parse {
        /// Исходник
        input: String,

        /// Вывести дерево в JSON
        #[arg(long)]
        json: bool,
    },

    /// Запустить скрипт со стандартными действиями
    Run {
        /// Исходник
        input: String,

        /// Начальная переменная, name=value
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Не останавливаться на ожидании: ввод читается из stdin, таймеры опрашиваются
        #[arg(long)]
        auto_resume: bool,

        /// Интервал опроса таймеров
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },

    /// Список встроенных действий
    Functions,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "actscript=debug" } else { "actscript=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Tokens { input } => {
            let source = fs::read_to_string(&input)?;
            for token in lexer::tokenize(&source) {
                println!("{:>4}:{:<4} {}", token.line(), token.column(), token);
            }
        }
        Commands::Parse { input, json } => {
            let source = fs::read_to_string(&input)?;
            let mut parser = actscript::Parser::new(&source);
            let result = parser.parse();

            if json {
                println!("{}", serde_json::to_string_pretty(&result.nodes)?);
            } else {
                println!("{}", result.render());
            }
            for error in &result.errors {
                eprintln!("Error: {}", error);
            }
            if let Some(error) = result.errors.first() {
                return Err(error.clone().into());
            }
        }
        Commands::Run { input, vars, auto_resume, poll_ms } => {
            let source = fs::read_to_string(&input)?;
            let transcript = Transcript::default();
            let functions = Arc::new(standard_library(&transcript)?);
            let variables = VariableTable::with(
                vars.into_iter().map(|(name, value)| VariableDefinition::new(name).with_value(value)),
            );

            let mut script = actscript::load(&source, functions)?.with_variables(variables);
            info!(input = %input, "running");
            let mut state = script.start()?;

            loop {
                print_outputs(&transcript);
                if state != ScriptState::Waiting {
                    break;
                }
                let waiting_on = script.waiting_on().unwrap_or_default().to_string();
                if !auto_resume {
                    println!("Waiting on {} at node {:?}", waiting_on, script.current_node());
                    break;
                }
                if waiting_on == NativeType::WaitForInput.name() {
                    if !deliver_input(&mut script)? {
                        state = script.cancel()?;
                        continue;
                    }
                } else {
                    thread::sleep(Duration::from_millis(poll_ms));
                }
                state = script.resume()?;
            }

            println!("Script {}", state);
        }
        Commands::Functions => {
            println!("Built-in functions:");
            for native in NativeType::all() {
                println!("  {:14} - {}", native.name(), native.description());
            }
        }
    }

    Ok(())
}

fn print_outputs(transcript: &Transcript) {
    for output in transcript.drain() {
        match output {
            Output::Say(text) => println!("{}", text),
            Output::Clear => println!("[clear]"),
        }
    }
}

// Кладет строку stdin в переменную `input`. `false` на конце ввода.
fn deliver_input(script: &mut Script) -> Result<bool, Box<dyn std::error::Error>> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        debug!("stdin closed");
        return Ok(false);
    }
    let value = line.trim_end_matches(['\r', '\n']);
    let variables = script.variables_mut();
    if !variables.set("input", value) {
        variables.add("input")?.set(value);
    }
    Ok(true)
}
