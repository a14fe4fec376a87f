use std::fs;

use dynbridge::{ContextOptions, inspect_json};

fn main() {
    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error}");
        std::process::exit(2);
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut input_path: Option<&str> = None;
    let mut options_path: Option<&str> = None;
    let mut trace_id: Option<&str> = None;
    let mut events = false;
    let mut report_json = false;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--input" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| "--input requires a path".to_string())?;
                input_path = Some(value);
            }
            "--options" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| "--options requires a path".to_string())?;
                options_path = Some(value);
            }
            "--trace-id" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| "--trace-id requires a value".to_string())?;
                trace_id = Some(value);
            }
            "--events" => events = true,
            "--json" => report_json = true,
            "help" | "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            flag => return Err(format!("unknown flag: {flag}\n\n{}", usage())),
        }
        index += 1;
    }

    let path = input_path.ok_or_else(|| format!("missing required --input <path>\n\n{}", usage()))?;
    let text = fs::read_to_string(path).map_err(|error| format!("failed to read `{path}`: {error}"))?;

    let mut options = match options_path {
        Some(options_path) => {
            let raw = fs::read_to_string(options_path)
                .map_err(|error| format!("failed to read `{options_path}`: {error}"))?;
            ContextOptions::from_json_str(&raw)
                .map_err(|error| format!("failed to parse context options: {error}"))?
        }
        None => ContextOptions::default(),
    };
    if let Some(trace_id) = trace_id {
        options = options.with_trace_id(trace_id);
    }

    let report = inspect_json(&text, options).map_err(|error| format!("{error:#}"))?;

    if report_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|error| format!("failed to encode dump report: {error}"))?
        );
        return Ok(());
    }

    println!("{}", report.rendering);
    println!("kind: {:?} (typeof {})", report.kind, report.typeof_name);
    println!("json: {}", report.json);
    println!("live objects: {}", report.live_objects);
    if events {
        for event in &report.events {
            println!(
                "{}",
                serde_json::to_string(event).map_err(|error| format!("failed to encode event: {error}"))?
            );
        }
    }
    Ok(())
}

fn usage() -> String {
    [
        "dynbridge_dump usage:",
        "  dynbridge_dump --input <path> [--options <path>] [--trace-id <id>] [--events] [--json]",
    ]
    .join("\n")
}
