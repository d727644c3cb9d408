//! `tplc` command line: compile one template into `<Class>.h` and `<Class>.cpp`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use tplc::compiler::default_output_base;
use tplc::tpl::dump;
use tplc::{CompileOptions, Compiler};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DumpFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "tplc")]
#[command(about = "Compile templates into C++ classes")]
#[command(version)]
struct Args {
    /// Template to compile
    template: PathBuf,

    /// Output base path; `.h` and `.cpp` are appended
    #[arg(short, long, value_name = "BASE")]
    output: Option<PathBuf>,

    /// Print the parsed AST instead of generating code
    #[arg(short, long)]
    dump: bool,

    /// Format used by --dump
    #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
    format: DumpFormat,

    /// Keep the newline after lines holding only a command tag
    #[arg(long)]
    no_trim: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> anyhow::Result<()> {
    let options = CompileOptions::new().trim_command_lines(!args.no_trim);
    let compiler = Compiler::new(options);

    let ast = compiler
        .parse_file(&args.template)
        .with_context(|| format!("failed to parse {}", args.template.display()))?;

    if args.dump {
        let out = match args.format {
            DumpFormat::Text => dump::to_text(&ast),
            DumpFormat::Json => dump::to_json(&ast)?,
        };
        println!("{out}");
        return Ok(());
    }

    let unit = compiler.generate(&ast)?;
    let base = args
        .output
        .unwrap_or_else(|| default_output_base(&args.template, &unit.class_name));
    compiler
        .write_unit(&unit, &base)
        .with_context(|| format!("failed to write {}", base.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
