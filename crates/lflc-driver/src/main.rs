use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use lflc_codegen::listing;
use lflc_lexer::tokenize;
use lflc_parser::parse;
use lflc_sema::analyze;

#[derive(Parser)]
#[command(name = "lflc")]
#[command(about = "LFL compiler targeting the LFC stack machine")]
#[command(version)]
struct Cli {
    /// Input .lfl source file
    source: PathBuf,

    /// Print the assembly listing before the blueprint string
    #[arg(long)]
    assembly: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.source)
        .with_context(|| format!("failed to read {}", cli.source.display()))?;

    let mut files = SimpleFiles::new();
    let file_id = files.add(cli.source.display().to_string(), source.clone());

    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = term::Config::default();

    // Lex
    let tokens = match tokenize(&source) {
        Ok(t) => t,
        Err(e) => {
            let diagnostic = Diagnostic::error()
                .with_message(e.to_string())
                .with_labels(vec![Label::primary(file_id, e.span)]);
            term::emit(&mut writer.lock(), &config, &files, &diagnostic)?;
            std::process::exit(1);
        }
    };

    // Parse
    let program = match parse(tokens) {
        Ok(p) => p,
        Err(e) => {
            let diagnostic = Diagnostic::error()
                .with_message(e.to_string())
                .with_labels(vec![Label::primary(file_id, e.span)]);
            term::emit(&mut writer.lock(), &config, &files, &diagnostic)?;
            std::process::exit(1);
        }
    };

    // Resolve and check
    let sema = analyze(&program);
    if sema.has_errors() {
        for diagnostic in sema.to_diagnostics(file_id) {
            term::emit(&mut writer.lock(), &config, &files, &diagnostic)?;
        }
        std::process::exit(1);
    }

    // Generate and link
    let rom = match lflc_codegen::compile(&program, &sema) {
        Ok(rom) => rom,
        Err(e) => {
            let mut diagnostic = Diagnostic::error().with_message(e.to_string());
            if let Some(span) = e.span {
                diagnostic = diagnostic.with_labels(vec![Label::primary(file_id, span)]);
            }
            term::emit(&mut writer.lock(), &config, &files, &diagnostic)?;
            std::process::exit(1);
        }
    };

    if cli.assembly {
        println!("{}", listing(&rom));
    }

    let blueprint = lflc_blueprint::encode_rom(&rom)?;
    println!("{blueprint}");

    Ok(())
}
