/// Opfusion - bytecode fusion CLI
use alloy_primitives::{hex, Address};
use opfusion::bytecode::scan::disassemble;
use opfusion::{CodeIdentity, OpcodeProcessor, OptimizerConfig};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Opfusion v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    opfusion [OPTIONS] <INPUT>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help           Print this help message");
    eprintln!("    -V, --version        Print version information");
    eprintln!("    -o, --output <FILE>  Write output to FILE (default: stdout)");
    eprintln!("    --disasm             Print a disassembly of the fused code");
    eprintln!("    --stats              Print fusion statistics to stderr");
    eprintln!("    -v, --verbose        Log optimizer activity to stderr");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <INPUT>              File holding hex bytecode (use '-' for stdin)");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    opfusion contract.hex");
    eprintln!("    opfusion --disasm --stats contract.hex");
    eprintln!("    echo 0x6005600360021b0300 | opfusion -");
}

fn print_version() {
    println!("Opfusion {}", VERSION);
}

struct Options {
    input: Option<String>,
    output: Option<String>,
    disasm: bool,
    stats: bool,
    verbose: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut output = None;
    let mut disasm = false;
    let mut stats = false;
    let mut verbose = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing output file after -o".to_string());
                }
                output = Some(args[i].clone());
            }
            "--disasm" => disasm = true,
            "--stats" => stats = true,
            "-v" | "--verbose" => verbose = true,
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => {
                if input.is_some() {
                    return Err("Multiple input files specified".to_string());
                }
                input = Some(arg.to_string());
            }
        }
        i += 1;
    }

    Ok(Options {
        input,
        output,
        disasm,
        stats,
        verbose,
    })
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        Ok(buffer)
    } else {
        let path = Path::new(input);
        if !path.exists() {
            return Err(format!("Input file not found: {}", input));
        }
        fs::read_to_string(path).map_err(|e| format!("Failed to read file '{}': {}", input, e))
    }
}

/// Decode hex bytecode, ignoring whitespace and an optional `0x` prefix
fn decode_bytecode(text: &str) -> Result<Vec<u8>, String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| format!("Invalid hex bytecode: {}", e))
}

fn write_output(output: Option<&str>, content: &str) -> Result<(), String> {
    match output {
        Some(path) => fs::write(path, content)
            .map_err(|e| format!("Failed to write to output file '{}': {}", path, e)),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

/// One worker and a single queue slot: the CLI compiles on its own thread
fn cli_config() -> OptimizerConfig {
    OptimizerConfig::default()
        .with_workers(1)
        .with_queue_capacity(1)
        .with_enabled(true)
}

fn run(options: &Options, input: &str) -> Result<String, String> {
    let code = decode_bytecode(input)?;

    let processor = OpcodeProcessor::new(cli_config());
    let identity = CodeIdentity::from_code(Address::ZERO, &code);
    let fused = processor
        .compile_sync(identity, &code)
        .map_err(|e| e.to_string())?;

    if options.stats {
        let stats = processor.stats();
        eprintln!("bytes:            {}", stats.fusion.bytes_scanned);
        eprintln!("fusions:          {}", stats.fusion.total_fusions());
        eprintln!("nops written:     {}", stats.fusion.nops_written);
        eprintln!("push data bytes:  {}", stats.fusion.data_bytes_skipped);
        eprintln!("memoized consts:  {}", stats.fusion.constants_memoized);
        for (opcode, count) in stats.fusion.by_idiom() {
            eprintln!("  {:<28} {}", opcode.mnemonic(), count);
        }
    }

    if options.disasm {
        Ok(disassemble(&fused))
    } else {
        Ok(format!("{}\n", hex::encode_prefixed(&fused)))
    }
}

fn main() {
    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if options.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    }

    let Some(input) = options.input.as_deref() else {
        eprintln!("Error: Missing input file");
        eprintln!();
        print_usage();
        process::exit(1);
    };

    let content = match read_input(input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let output = match run(&options, &content) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_output(options.output.as_deref(), &output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
