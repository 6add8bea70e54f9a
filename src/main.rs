use std::io::Write;

use clap::{Args, Parser, Subcommand};
use fasti::{
    parser::{parse_source, SyntaxError},
    tree_walk_interpreter::{evaluate, ExecutionError, Session, Step, Stepper, Value},
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Step through a tiny Lisp one evaluation at a time")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a file and print its value
    Run(RunArgs),
    /// Print a snapshot after every evaluation step
    Step(StepArgs),
    Repl,
    Benchmark,
}

#[derive(Debug, Args)]
struct RunArgs {
    file: String,

    /// Evaluate in one recursive pass instead of stepping
    #[arg(long)]
    direct: bool,
}

#[derive(Debug, Args)]
struct StepArgs {
    file: String,

    /// Stop with an error after this many steps
    #[arg(long)]
    max_steps: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
enum InterpretError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Step limit of {0} reached before evaluation finished")]
    StepLimit(usize),
}

fn main() {
    let args = Cli::parse();
    install_tracing(&args.log_level);

    let result = match args.command() {
        Command::Run(args) => run_command(args),
        Command::Step(args) => step_command(args),
        Command::Repl => repl_command(),
        Command::Benchmark => benchmark_command(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn install_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(args: &RunArgs) -> Result<(), InterpretError> {
    let source = std::fs::read_to_string(&args.file)?;
    let tree = parse_source(&source)?;
    let value = if args.direct {
        evaluate(&tree, &Session::new())?
    } else {
        Stepper::start(tree).run()?
    };
    println!("{value}");
    Ok(())
}

fn step_command(args: &StepArgs) -> Result<(), InterpretError> {
    let source = std::fs::read_to_string(&args.file)?;
    let mut stepper = Stepper::start(parse_source(&source)?);

    loop {
        if let Step::Done(value) = stepper.advance()? {
            println!("done: {value}");
            return Ok(());
        }
        println!("{}", stepper.snapshot());

        if let Some(limit) = args.max_steps {
            if stepper.snapshot().steps() >= limit {
                return Err(InterpretError::StepLimit(limit));
            }
        }
    }
}

fn repl_command() -> Result<(), InterpretError> {
    println!("Welcome to the fasti REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let session = Session::new();
    loop {
        let mut input = String::new();

        print!("> ");
        std::io::stdout().flush()?;

        let read = std::io::stdin().read_line(&mut input)?;
        if read == 0 {
            break;
        }

        match interpret(&session, input.trim()) {
            Ok(value) => println!("{value}"),
            Err(e) => println!("Error: {e}"),
        }
    }

    Ok(())
}

fn interpret(session: &Session, source: &str) -> Result<Value, InterpretError> {
    let tree = session.parse(source)?;
    Ok(Stepper::start_in(tree, session).run()?)
}

fn benchmark_command() -> Result<(), InterpretError> {
    let source = fib_source();

    let start = std::time::Instant::now();
    let stepped = Stepper::start(parse_source(source)?).run()?;
    let stepped_elapsed = start.elapsed();
    println!("Stepped: {stepped} took {:?}", stepped_elapsed);

    let start = std::time::Instant::now();
    let direct = evaluate(&parse_source(source)?, &Session::new())?;
    let direct_elapsed = start.elapsed();
    println!("Direct: {direct} took {:?}", direct_elapsed);

    println!(
        "Stepping costs {:.2}x the direct walk",
        stepped_elapsed.as_secs_f64() / direct_elapsed.as_secs_f64()
    );
    Ok(())
}

fn fib_source() -> &'static str {
    r#"
    (define fib
      (lambda (n)
        (if (< n 2)
            n
            (+ (fib (- n 1)) (fib (- n 2))))))
    (fib 20)
    "#
}
