//! tern reference CLI.
//!
//! Thin front-end over the embedding API; see `ternc::Context` for the
//! actual pipeline. Workspace scanning and change watching live outside
//! the core.

use ternc::{reporting, Config, Context};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(2);
    }

    let mut config = Config::default();
    let mut command = None;
    let mut path = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--disable-optimizations" => config.disable_optimizations = true,
            "--log-instructions" => config.log_instructions = true,
            flag if flag.starts_with("--stack-size=") => {
                match flag["--stack-size=".len()..].parse() {
                    Ok(size) => config.stack_size = size,
                    Err(_) => {
                        eprintln!("ternc: invalid --stack-size value");
                        std::process::exit(2);
                    }
                }
            }
            other if command.is_none() => command = Some(other.to_owned()),
            other if path.is_none() => path = Some(other.to_owned()),
            other => {
                eprintln!("ternc: unexpected argument `{other}`");
                std::process::exit(2);
            }
        }
    }

    let (Some(command), Some(path)) = (command, path) else {
        print_usage();
        std::process::exit(2);
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("ternc: cannot read `{path}`: {err}");
            std::process::exit(1);
        }
    };
    let module_name = module_name_of(&path);

    match command.as_str() {
        "check" => {
            let mut context = Context::new(config);
            let _ = context.compile_module(&module_name, &path, &source);
            let diagnostics = context.diags.take();
            let map = tern_ir::SourceMap::new(&source);
            let errors = reporting::emit_all(&diagnostics, &path, &map);
            std::process::exit(if errors > 0 { 1 } else { 0 });
        }
        "run" => {
            let mut context = Context::new(config);
            let result = context.compile_module(&module_name, &path, &source);
            let diagnostics = context.diags.take();
            let map = tern_ir::SourceMap::new(&source);
            let errors = reporting::emit_all(&diagnostics, &path, &map);
            if errors > 0 || result.is_err() {
                std::process::exit(1);
            }
            // Module initialization already ran; a `main` function is
            // the conventional entry point when present.
            if let Some(main_fn) = context.function(&module_name, "main") {
                if let Err(err) = context.execute(main_fn, &[]) {
                    eprintln!("ternc: runtime error: {err}");
                    std::process::exit(1);
                }
            }
        }
        other => {
            eprintln!("ternc: unknown command `{other}`");
            print_usage();
            std::process::exit(2);
        }
    }
}

fn module_name_of(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_owned())
}

fn print_usage() {
    eprintln!("Usage: ternc <check|run> <file.tn> [--disable-optimizations] [--log-instructions] [--stack-size=BYTES]");
}
