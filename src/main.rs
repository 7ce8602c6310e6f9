use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use kiln::vm::{InterpretResult, VM};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(about = "Bytecode compiler and virtual machine for the Kiln scripting language", long_about = None)]
struct Cli {
    /// Script to run; starts a REPL when omitted.
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut vm = VM::new();

    match cli.script {
        Some(path) => run_file(&mut vm, &path),
        None => repl(&mut vm),
    }
}

fn run_file(vm: &mut VM, path: &PathBuf) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read \"{}\": {}", path.display(), err);
            return ExitCode::from(74);
        }
    };

    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}

fn repl(vm: &mut VM) -> ExitCode {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                vm.interpret(&line);
            }
            Err(_) => break,
        }
    }
    println!();
    ExitCode::SUCCESS
}
