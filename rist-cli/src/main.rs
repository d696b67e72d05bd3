use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use rist_core::cipher;
use rist_core::{compile_file, execute, write_compiled, ConfigError, CoreError, Flags};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command line interface of the Rist language.
#[derive(Parser, Debug)]
#[command(name = "rist", version, about = "Rist Lang", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a .rist file to Python and run it
    Lang(LangArgs),
    /// Encrypt an argument or a file
    Encrypt(CipherArgs),
    /// Decrypt an argument or a file
    Decrypt(CipherArgs),
}

#[derive(Args, Debug)]
struct LangArgs {
    #[arg(value_name = "FILE", help = "The .rist file to compile")]
    file: PathBuf,

    #[arg(
        short = 'c',
        long,
        value_name = "FILEPATH",
        help = "Only compile the code and write it to this .py file"
    )]
    compile_to: Option<PathBuf>,

    #[arg(short, long, help = "Also run the code, used together with --compile-to")]
    eval: bool,
}

#[derive(Args, Debug)]
struct CipherArgs {
    #[arg(value_name = "ARGUMENT", help = "The text, or a file path with --filepath")]
    arg: String,

    #[arg(short, long, help = "Integer key (random when encrypting without one)")]
    key: Option<i64>,

    #[arg(short, long, default_value_t = 1, help = "Number of cipher layers")]
    depth: u32,

    #[arg(short, long, help = "Treat the argument as a file path")]
    filepath: bool,

    #[arg(short, long, value_name = "FILEPATH", help = "Write the result here instead of printing it")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Lang(args) => lang(args),
        Command::Encrypt(args) => encrypt(args),
        Command::Decrypt(args) => decrypt(args),
    }
}

fn usage_error(kind: ErrorKind, message: &str) -> ! {
    Cli::command().error(kind, message).exit()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

fn lang(args: LangArgs) -> Result<()> {
    if !has_extension(&args.file, "rist") {
        usage_error(
            ErrorKind::InvalidValue,
            "You must provide file with extension '.rist'",
        );
    }
    if args.compile_to.as_deref().is_some_and(|target| !has_extension(target, "py")) {
        usage_error(
            ErrorKind::InvalidValue,
            "You must provide file which will be written with extension '.py'",
        );
    }
    if args.eval && args.compile_to.is_none() {
        usage_error(
            ErrorKind::ArgumentConflict,
            "--eval should only be used when --compile-to is used",
        );
    }

    let code = compile_file(&args.file)
        .with_context(|| format!("failed to compile {}", args.file.display()))?;

    if let Some(target) = &args.compile_to {
        write_compiled(&code, target)?;
        println!("successfully compiled code at {}", target.display());
        if !args.eval {
            return Ok(());
        }
    }

    debug!(file = %code.file, "running unit");
    match execute(&code, Flags::E, None) {
        Ok(_) => Ok(()),
        Err(CoreError::Runtime(err)) => {
            eprint!("{}", err.traceback);
            Err(CoreError::Runtime(err).into())
        }
        Err(err) => Err(err.into()),
    }
}

fn read_argument(args: &CipherArgs) -> Result<String> {
    if args.filepath {
        fs::read_to_string(&args.arg).with_context(|| format!("failed to read input file {}", args.arg))
    } else {
        Ok(args.arg.clone())
    }
}

fn encrypt(args: CipherArgs) -> Result<()> {
    let text = read_argument(&args)?;
    let (key, generated) = match args.key {
        Some(key) => (key, false),
        None => (cipher::random_key(), true),
    };
    let encrypted = cipher::encrypt(&text, key, args.depth)?;

    match &args.output {
        Some(path) => write_output(path, encrypted.as_bytes())?,
        None => println!("Encryption success\n\n{encrypted}"),
    }
    if generated {
        println!("\nYour encryption key is: {key}\nKeep it, it is needed to decrypt the text");
    }
    Ok(())
}

fn decrypt(args: CipherArgs) -> Result<()> {
    let Some(key) = args.key else {
        return Err(ConfigError::MissingKey.into());
    };
    let text = read_argument(&args)?;
    let decrypted = cipher::decrypt(text.trim_end(), key, args.depth)?;

    match &args.output {
        Some(path) => write_output(path, decrypted.as_bytes())?,
        None => println!("Decryption success\n\n{decrypted}"),
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
