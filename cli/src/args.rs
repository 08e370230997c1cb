//! Command line parsing.

use std::path::PathBuf;

use filexfer_core::files::naming::NamingRule;

/// A parsed invocation.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    Version,
    Help,
    Run { config: PathBuf, command: Command },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Upload {
        source: PathBuf,
        container: String,
        name: Option<String>,
        dest_path: Option<String>,
        naming_rule: Option<NamingRule>,
        overwrite: bool,
    },
    Download {
        path: String,
        destination: PathBuf,
        overwrite: bool,
    },
    Cat {
        path: String,
    },
    Delete {
        path: String,
    },
    Exists {
        path: String,
    },
}

pub fn usage() -> &'static str {
    "\
Usage: filexfer --config <file> <command> [args]

Commands:
  upload <file> <container> [--name <name>] [--dest-path <dir>]
         [--naming literal|contentHash|randomId] [--overwrite]
  download <path> <local-file> [--overwrite]
  cat <path>
  delete <path>
  exists <path>

Options:
  --config <file>   JSON transfer configuration
  --version         Print version and exit
  --help            Print this help message"
}

/// Parse the arguments following the program name.
pub fn parse(args: &[String]) -> Result<Invocation, String> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => return Ok(Invocation::Version),
            "--help" | "-h" => return Ok(Invocation::Help),
            "--config" => {
                let value = iter.next().ok_or("--config requires a value")?;
                config = Some(PathBuf::from(value));
            }
            _ => rest.push(arg.as_str()),
        }
    }

    let config = config.ok_or("missing --config <file>")?;
    let (name, operands) = rest.split_first().ok_or("missing command")?;
    let command = parse_command(name, operands)?;
    Ok(Invocation::Run { config, command })
}

fn parse_command(name: &str, operands: &[&str]) -> Result<Command, String> {
    let mut positional = Vec::new();
    let mut overwrite = false;
    let mut file_name = None;
    let mut dest_path = None;
    let mut naming_rule = None;

    let mut iter = operands.iter();
    while let Some(arg) = iter.next() {
        match *arg {
            "--overwrite" => overwrite = true,
            "--name" => file_name = Some(value(&mut iter, "--name")?),
            "--dest-path" => dest_path = Some(value(&mut iter, "--dest-path")?),
            "--naming" => {
                let raw = value(&mut iter, "--naming")?;
                let rule = serde_json::from_value(serde_json::Value::String(raw.clone()))
                    .map_err(|_| format!("unknown naming rule: {raw}"))?;
                naming_rule = Some(rule);
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option: {flag}")),
            operand => positional.push(operand.to_string()),
        }
    }

    let expect = |count: usize| {
        if positional.len() == count {
            Ok(())
        } else {
            Err(format!("{name} expects {count} argument(s), got {}", positional.len()))
        }
    };

    let command = match name {
        "upload" => {
            expect(2)?;
            Command::Upload {
                source: PathBuf::from(&positional[0]),
                container: positional[1].clone(),
                name: file_name,
                dest_path,
                naming_rule,
                overwrite,
            }
        }
        "download" => {
            expect(2)?;
            Command::Download {
                path: positional[0].clone(),
                destination: PathBuf::from(&positional[1]),
                overwrite,
            }
        }
        "cat" => {
            expect(1)?;
            Command::Cat {
                path: positional[0].clone(),
            }
        }
        "delete" => {
            expect(1)?;
            Command::Delete {
                path: positional[0].clone(),
            }
        }
        "exists" => {
            expect(1)?;
            Command::Exists {
                path: positional[0].clone(),
            }
        }
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(command)
}

fn value(iter: &mut std::slice::Iter<'_, &str>, flag: &str) -> Result<String, String> {
    iter.next()
        .map(|v| v.to_string())
        .ok_or_else(|| format!("{flag} requires a value"))
}
