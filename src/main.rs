// eva - A bytecode VM for the Eva programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use eva_vm::Vm;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut trace = false;
    let mut gc_threshold = eva_vm::GC_THRESHOLD;
    let mut files: Vec<String> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" | "-v" => {
                println!("Eva v0.1.0");
                return;
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            "--trace" => trace = true,
            "--gc-threshold" => match iter.next().and_then(|value| value.parse().ok()) {
                Some(bytes) => gc_threshold = bytes,
                None => {
                    eprintln!("Error: --gc-threshold expects a byte count");
                    process::exit(1);
                }
            },
            flag if flag.starts_with('-') => {
                eprintln!("Error: unknown flag '{}'", flag);
                print_usage();
                process::exit(1);
            }
            file => files.push(file.to_string()),
        }
    }

    let mut vm = Vm::with_config(eva_vm::STACK_LIMIT, gc_threshold);
    vm.set_trace(trace);

    // If files provided, execute them; otherwise start the REPL
    if !files.is_empty() {
        run_files(&files, &mut vm);
    } else {
        run_repl(&mut vm);
    }
}

fn print_usage() {
    println!(
        "Usage: eva [OPTIONS] [FILE.eva ...]

Options:
    --trace              Print disassembly before execution
    --gc-threshold N     GC allocation threshold in bytes
    -v, --version        Print version
    -h, --help           Show this message

With no files, starts an interactive REPL."
    );
}

/// Execute a sequence of source files.
fn run_files(files: &[String], vm: &mut Vm) {
    for file_path in files {
        if let Err(e) = exec_file(file_path, vm) {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

/// Execute a single source file.
fn exec_file(file_path: &str, vm: &mut Vm) -> Result<(), String> {
    let path = Path::new(file_path);

    match path.extension().and_then(|e| e.to_str()) {
        Some("eva") => {}
        Some(ext) => {
            return Err(format!(
                "Error: unsupported file extension '.{}' for '{}'",
                ext, file_path
            ));
        }
        None => {
            return Err(format!(
                "Error: file '{}' has no extension (expected .eva)",
                file_path
            ));
        }
    }

    let source =
        fs::read_to_string(path).map_err(|e| format!("Error reading '{}': {}", file_path, e))?;

    let result = vm
        .exec(&source)
        .map_err(|e| format!("Error in '{}': {}", file_path, e))?;
    println!("{}", vm.render(&result));

    if vm.trace_enabled() {
        eprintln!("Heap: {}", vm.heap_stats());
    }

    Ok(())
}

/// Run the interactive REPL.
fn run_repl(vm: &mut Vm) {
    println!("Eva v0.1.0");

    loop {
        print!("eva> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                match vm.exec(input) {
                    Ok(result) => println!("{}", vm.render(&result)),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}
